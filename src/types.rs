//! Common types and data structures used across the acquisition front end
//!
//! This module contains shared types, enums, and structures that are used
//! by multiple modules in the application.

use heapless::Vec;

use crate::accumulator::GroupConfig;
use crate::config::*;

/// Number of distinct channel groups the firmware knows about
pub const GROUP_COUNT: usize = 6;

/// One physical sensor's independent acquisition stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelGroup {
    /// First ADS131M08 (8-channel precision ADC)
    AdcA,
    /// Second ADS131M08, sampled synchronously with the first
    AdcB,
    /// MAX30102 optical pulse sensor
    Pulse,
    /// MPU6050 accelerometer + gyroscope
    Inertial,
    /// QMC5883L magnetometer
    Magnetometer,
    /// BME280 barometric sensor
    Barometer,
}

impl ChannelGroup {
    /// Every group, in pipe order
    pub const ALL: [ChannelGroup; GROUP_COUNT] = [
        ChannelGroup::AdcA,
        ChannelGroup::AdcB,
        ChannelGroup::Pulse,
        ChannelGroup::Inertial,
        ChannelGroup::Magnetometer,
        ChannelGroup::Barometer,
    ];

    /// Dense index, used for bitmasks and per-group tables
    pub const fn index(self) -> usize {
        match self {
            ChannelGroup::AdcA => 0,
            ChannelGroup::AdcB => 1,
            ChannelGroup::Pulse => 2,
            ChannelGroup::Inertial => 3,
            ChannelGroup::Magnetometer => 4,
            ChannelGroup::Barometer => 5,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Wireless data pipe carrying this group's batches
    pub const fn pipe(self) -> PipeId {
        PipeId(self.index() as u8)
    }

    pub const fn name(self) -> &'static str {
        match self {
            ChannelGroup::AdcA => "ADS131M08-A",
            ChannelGroup::AdcB => "ADS131M08-B",
            ChannelGroup::Pulse => "MAX30102",
            ChannelGroup::Inertial => "MPU6050",
            ChannelGroup::Magnetometer => "QMC5883L",
            ChannelGroup::Barometer => "BME280",
        }
    }

    /// Raw frame length returned by this group's reader
    pub const fn frame_len(self) -> usize {
        match self {
            ChannelGroup::AdcA | ChannelGroup::AdcB => ADS_FRAME_LEN,
            ChannelGroup::Pulse => PULSE_FRAME_LEN,
            ChannelGroup::Inertial => INERTIAL_FRAME_LEN,
            ChannelGroup::Magnetometer => MAG_FRAME_LEN,
            ChannelGroup::Barometer => BARO_FRAME_LEN,
        }
    }

    /// Batch layout for this group
    pub const fn layout(self) -> GroupConfig {
        match self {
            ChannelGroup::AdcA | ChannelGroup::AdcB => GroupConfig::new(
                ADS_HEADER_LEN,
                ADS_RECORD_SIZE,
                ADS_RECORDS_PER_BATCH,
                ADS_PAYLOAD_LEN,
            ),
            ChannelGroup::Pulse => {
                GroupConfig::new(0, PULSE_RECORD_SIZE, PULSE_RECORDS_PER_BATCH, PULSE_PAYLOAD_LEN)
            }
            ChannelGroup::Inertial => GroupConfig::new(
                0,
                INERTIAL_RECORD_SIZE,
                INERTIAL_RECORDS_PER_BATCH,
                INERTIAL_PAYLOAD_LEN,
            ),
            ChannelGroup::Magnetometer => {
                GroupConfig::new(0, MAG_RECORD_SIZE, MAG_RECORDS_PER_BATCH, MAG_PAYLOAD_LEN)
            }
            ChannelGroup::Barometer => {
                GroupConfig::new(0, BARO_RECORD_SIZE, BARO_RECORDS_PER_BATCH, BARO_PAYLOAD_LEN)
            }
        }
    }

    /// Bit used for this group in pending/subscription masks
    pub(crate) const fn bit(self) -> u8 {
        1 << self.index()
    }
}

/// Logical wireless data pipe (one per channel group)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PipeId(pub u8);

impl PipeId {
    pub fn group(self) -> Option<ChannelGroup> {
        ChannelGroup::from_index(self.0 as usize)
    }
}

/// Tag sent with every serial-link batch so a host can tell groups apart
/// and detect dropped batches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SequenceTag {
    pub pipe: PipeId,
    pub sequence: u8,
}

/// Batch payload as handed to a transport task
#[derive(Clone, Debug, PartialEq)]
pub struct Packet {
    pub pipe: PipeId,
    pub sequence: u8,
    pub payload: Vec<u8, BLE_MAX_NOTIFY_LEN>,
}

impl Packet {
    /// Copy a payload into an owned packet. `None` if it exceeds the notify limit.
    pub fn new(pipe: PipeId, sequence: u8, payload: &[u8]) -> Option<Self> {
        let payload = Vec::from_slice(payload).ok()?;
        Some(Self {
            pipe,
            sequence,
            payload,
        })
    }
}

/// Firmware version reported in the start-up banner
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

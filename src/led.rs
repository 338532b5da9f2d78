//! Packed 12-bit grayscale frame for daisy-chained TLC5940 LED drivers
//!
//! Each driver has 16 channels of 12 bits, i.e. 24 bytes, and two channels
//! share every three bytes. The buffer is laid out in shift order: the first
//! byte out is the most significant byte of the last driver's highest
//! channel, so channel numbers are reversed into slot numbers before packing.

use core::fmt;

use crate::config::{LED_BYTES_PER_DRIVER, LED_CHANNELS_PER_DRIVER};

/// Largest grayscale value a channel can hold
pub const MAX_VALUE: u16 = 0x0FFF;

/// Frame length in bytes for `drivers` chained drivers
pub const fn frame_len(drivers: usize) -> usize {
    drivers * LED_BYTES_PER_DRIVER
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LedError {
    ChannelOutOfRange { channel: usize, channels: usize },
    ValueOutOfRange(u16),
    /// Command bytes could not be decoded
    BadCommand,
}

impl fmt::Display for LedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedError::ChannelOutOfRange { channel, channels } => {
                write!(f, "channel {channel} out of range (0..{channels})")
            }
            LedError::ValueOutOfRange(v) => write!(f, "value {v:#x} exceeds 12 bits"),
            LedError::BadCommand => f.write_str("malformed LED command"),
        }
    }
}

/// Write a 12-bit value into `slot`, leaving the neighboring slot untouched.
///
/// Even slots start on a byte boundary ("clean"): the value fills one byte and
/// the high nibble of the next. Odd slots start mid-byte: the value fills the
/// low nibble of one byte and the whole next byte.
pub fn pack_slot(buf: &mut [u8], slot: usize, value: u16) {
    let at = slot * 3 / 2;
    let value = value & MAX_VALUE;
    if slot % 2 == 0 {
        buf[at] = (value >> 4) as u8;
        buf[at + 1] = ((value << 4) as u8) | (buf[at + 1] & 0x0F);
    } else {
        buf[at] = (buf[at] & 0xF0) | (value >> 8) as u8;
        buf[at + 1] = value as u8;
    }
}

/// Read the 12-bit value stored in `slot`
pub fn unpack_slot(buf: &[u8], slot: usize) -> u16 {
    let at = slot * 3 / 2;
    let (hi, lo) = (buf[at] as u16, buf[at + 1] as u16);
    if slot % 2 == 0 {
        (hi << 4) | (lo >> 4)
    } else {
        ((hi & 0x0F) << 8) | lo
    }
}

/// Grayscale buffer for a chain of drivers. `BYTES` must be a multiple of
/// 24; use [`frame_len`] to derive it from the driver count.
pub struct GrayscaleFrame<const BYTES: usize> {
    data: [u8; BYTES],
}

impl<const BYTES: usize> GrayscaleFrame<BYTES> {
    pub const fn new() -> Self {
        assert!(
            BYTES > 0 && BYTES % LED_BYTES_PER_DRIVER == 0,
            "LED frame must hold whole drivers"
        );
        Self { data: [0; BYTES] }
    }

    pub const fn drivers(&self) -> usize {
        BYTES / LED_BYTES_PER_DRIVER
    }

    pub const fn channels(&self) -> usize {
        self.drivers() * LED_CHANNELS_PER_DRIVER
    }

    fn slot(&self, channel: usize) -> Result<usize, LedError> {
        let channels = self.channels();
        if channel >= channels {
            return Err(LedError::ChannelOutOfRange { channel, channels });
        }
        Ok(channels - 1 - channel)
    }

    pub fn set(&mut self, channel: usize, value: u16) -> Result<(), LedError> {
        let slot = self.slot(channel)?;
        if value > MAX_VALUE {
            return Err(LedError::ValueOutOfRange(value));
        }
        pack_slot(&mut self.data, slot, value);
        Ok(())
    }

    pub fn get(&self, channel: usize) -> Result<u16, LedError> {
        let slot = self.slot(channel)?;
        Ok(unpack_slot(&self.data, slot))
    }

    pub fn set_all(&mut self, value: u16) -> Result<(), LedError> {
        if value > MAX_VALUE {
            return Err(LedError::ValueOutOfRange(value));
        }
        for channel in 0..self.channels() {
            self.set(channel, value)?;
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Bytes in the order the drivers' shift register expects
    pub fn serialize_for_output(&self) -> &[u8] {
        &self.data
    }
}

impl<const BYTES: usize> Default for GrayscaleFrame<BYTES> {
    fn default() -> Self {
        Self::new()
    }
}

/// LED control command received over one of the links
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LedCommand {
    Set { channel: u8, value: u16 },
    SetAll(u16),
    Clear,
}

impl LedCommand {
    pub const SET: u8 = 0x01;
    pub const SET_ALL: u8 = 0x02;
    pub const CLEAR: u8 = 0x03;

    /// Decode `[opcode, args...]`. Values are big-endian.
    pub fn parse(bytes: &[u8]) -> Result<Self, LedError> {
        match bytes {
            [Self::SET, channel, hi, lo] => Ok(LedCommand::Set {
                channel: *channel,
                value: u16::from_be_bytes([*hi, *lo]),
            }),
            [Self::SET_ALL, hi, lo] => Ok(LedCommand::SetAll(u16::from_be_bytes([*hi, *lo]))),
            [Self::CLEAR] => Ok(LedCommand::Clear),
            _ => Err(LedError::BadCommand),
        }
    }

    pub fn apply<const BYTES: usize>(self, frame: &mut GrayscaleFrame<BYTES>) -> Result<(), LedError> {
        match self {
            LedCommand::Set { channel, value } => frame.set(channel as usize, value),
            LedCommand::SetAll(value) => frame.set_all(value),
            LedCommand::Clear => {
                frame.clear();
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type OneDriver = GrayscaleFrame<{ frame_len(1) }>;
    type TwoDrivers = GrayscaleFrame<{ frame_len(2) }>;

    #[test]
    fn geometry_follows_driver_count() {
        let frame = TwoDrivers::new();
        assert_eq!(frame.drivers(), 2);
        assert_eq!(frame.channels(), 32);
        assert_eq!(frame.serialize_for_output().len(), 48);
    }

    #[test]
    fn clear_zeroes_every_channel() {
        let mut frame = TwoDrivers::new();
        frame.set_all(0xABC).unwrap();
        frame.clear();
        for channel in 0..frame.channels() {
            assert_eq!(frame.get(channel), Ok(0));
        }
        assert!(frame.serialize_for_output().iter().all(|&b| b == 0));
    }

    #[test]
    fn writes_keep_neighbors_intact() {
        let mut frame = TwoDrivers::new();
        frame.set_all(0xFFF).unwrap();
        for channel in 0..frame.channels() {
            frame.set(channel, 0x5A3).unwrap();
            assert_eq!(frame.get(channel), Ok(0x5A3));
            if channel > 0 {
                assert_eq!(frame.get(channel - 1), Ok(0x5A3));
            }
            if channel + 1 < frame.channels() {
                assert_eq!(frame.get(channel + 1), Ok(0xFFF));
            }
        }
    }

    #[test]
    fn every_value_round_trips_on_clean_and_mid_slots() {
        // channel 6 is slot 9 (mid), channel 7 is slot 8 (clean)
        for background in [0x000, 0xFFF, 0x00F, 0xF00] {
            let mut frame = OneDriver::new();
            frame.set_all(background).unwrap();
            for channel in [6, 7] {
                for value in 0..=MAX_VALUE {
                    frame.set(channel, value).unwrap();
                    assert_eq!(frame.get(channel), Ok(value));
                    assert_eq!(frame.get(channel - 1), Ok(background));
                    assert_eq!(frame.get(channel + 1), Ok(background));
                }
                frame.set(channel, background).unwrap();
            }
        }
    }

    #[test]
    fn out_of_range_leaves_buffer_unchanged() {
        let mut frame = OneDriver::new();
        frame.set_all(0x123).unwrap();
        let before = frame.serialize_for_output().to_vec();

        assert_eq!(
            frame.set(16, 0),
            Err(LedError::ChannelOutOfRange { channel: 16, channels: 16 })
        );
        assert_eq!(frame.set(3, 0x1000), Err(LedError::ValueOutOfRange(0x1000)));
        assert_eq!(frame.set_all(0xFFFF), Err(LedError::ValueOutOfRange(0xFFFF)));
        assert_eq!(
            frame.get(16),
            Err(LedError::ChannelOutOfRange { channel: 16, channels: 16 })
        );
        for channel in 16..300 {
            let err = Err(LedError::ChannelOutOfRange { channel, channels: 16 });
            assert_eq!(frame.set(channel, 0xFFF), err);
            assert_eq!(frame.get(channel).map(|_| ()), err);
        }
        assert_eq!(frame.serialize_for_output(), &before[..]);

        frame.set(15, 0x0AB).unwrap();
        assert_eq!(frame.get(15), Ok(0x0AB));
    }

    #[test]
    fn last_two_channels_of_single_driver() {
        let mut frame = OneDriver::new();
        frame.set(0, 0xFFF).unwrap();
        frame.set(1, 0).unwrap();

        // channel 0 is slot 15 (mid), channel 1 is slot 14 (clean); they share byte 22
        let out = frame.serialize_for_output();
        assert_eq!(&out[21..24], &[0x00, 0x0F, 0xFF]);
        assert_eq!(frame.get(0), Ok(0xFFF));
        assert_eq!(frame.get(1), Ok(0));
    }

    #[test]
    fn clean_and_mid_slot_packing() {
        let mut buf = [0u8; 3];
        pack_slot(&mut buf, 0, 0xABC);
        assert_eq!(buf, [0xAB, 0xC0, 0x00]);
        pack_slot(&mut buf, 1, 0x123);
        assert_eq!(buf, [0xAB, 0xC1, 0x23]);
        assert_eq!(unpack_slot(&buf, 0), 0xABC);
        assert_eq!(unpack_slot(&buf, 1), 0x123);

        pack_slot(&mut buf, 0, 0);
        assert_eq!(buf, [0x00, 0x01, 0x23]);
    }

    #[test]
    fn commands_decode_and_apply() {
        let mut frame = OneDriver::new();
        let set = LedCommand::parse(&[0x01, 4, 0x0F, 0xFF]).unwrap();
        assert_eq!(set, LedCommand::Set { channel: 4, value: 0xFFF });
        set.apply(&mut frame).unwrap();
        assert_eq!(frame.get(4), Ok(0xFFF));

        LedCommand::parse(&[0x02, 0x00, 0x10]).unwrap().apply(&mut frame).unwrap();
        assert_eq!(frame.get(9), Ok(0x010));

        LedCommand::parse(&[0x03]).unwrap().apply(&mut frame).unwrap();
        assert_eq!(frame.get(4), Ok(0));

        assert_eq!(LedCommand::parse(&[0x01, 4]), Err(LedError::BadCommand));
        assert_eq!(LedCommand::parse(&[0x7F]), Err(LedError::BadCommand));
        assert_eq!(LedCommand::parse(&[]), Err(LedError::BadCommand));
        assert_eq!(
            LedCommand::Set { channel: 20, value: 1 }.apply(&mut frame),
            Err(LedError::ChannelOutOfRange { channel: 20, channels: 16 })
        );
    }
}

//! Frame readers for the board's sensors
//!
//! Each reader performs exactly one bus transaction per frame. Device bring-up
//! (register configuration, resets) happens before the readers are registered
//! and is not handled here.

use embedded_hal::i2c::I2c;
use embedded_hal::spi::SpiDevice;

use crate::acquisition::{FrameReader, ReadError};
use crate::config::*;
use crate::types::ChannelGroup;

fn check_len(frame: &[u8], expected: usize) -> Result<(), ReadError> {
    if frame.len() != expected {
        return Err(ReadError::FrameLength {
            expected,
            got: frame.len(),
        });
    }
    Ok(())
}

/// ADS131M08 on its own SPI device.
///
/// Clocking out a NULL command (all zero words) returns the status word, eight
/// 24-bit conversions and the CRC word in one full-duplex transfer.
pub struct Ads131m08<SPI> {
    spi: SPI,
    group: ChannelGroup,
}

impl<SPI: SpiDevice> Ads131m08<SPI> {
    pub fn new(spi: SPI, group: ChannelGroup) -> Self {
        Self { spi, group }
    }
}

impl<SPI: SpiDevice> FrameReader for Ads131m08<SPI> {
    fn group(&self) -> ChannelGroup {
        self.group
    }

    fn frame_len(&self) -> usize {
        ADS_FRAME_LEN
    }

    fn read_frame(&mut self, frame: &mut [u8]) -> Result<(), ReadError> {
        check_len(frame, ADS_FRAME_LEN)?;
        frame.fill(0);
        self.spi.transfer_in_place(frame).map_err(|_| ReadError::Bus)
    }
}

/// I2C sensor whose frame is one burst read starting at a data register
pub struct I2cBurstReader<I2C> {
    i2c: I2C,
    group: ChannelGroup,
    address: u8,
    register: u8,
}

impl<I2C: I2c> I2cBurstReader<I2C> {
    pub fn new(i2c: I2C, group: ChannelGroup, address: u8, register: u8) -> Self {
        Self {
            i2c,
            group,
            address,
            register,
        }
    }

    /// MAX30102: one red + IR sample from the FIFO
    pub fn max30102(i2c: I2C) -> Self {
        Self::new(i2c, ChannelGroup::Pulse, MAX30102_ADDR, MAX30102_FIFO_DATA)
    }

    /// MPU6050: accelerometer, temperature and gyroscope block
    pub fn mpu6050(i2c: I2C) -> Self {
        Self::new(i2c, ChannelGroup::Inertial, MPU6050_ADDR, MPU6050_ACCEL_XOUT_H)
    }

    /// QMC5883L: X/Y/Z little-endian
    pub fn qmc5883l(i2c: I2C) -> Self {
        Self::new(i2c, ChannelGroup::Magnetometer, QMC5883L_ADDR, QMC5883L_DATA_X_LSB)
    }

    /// BME280: raw pressure, temperature and humidity
    pub fn bme280(i2c: I2C) -> Self {
        Self::new(i2c, ChannelGroup::Barometer, BME280_ADDR, BME280_PRESS_MSB)
    }

    pub fn address(&self) -> u8 {
        self.address
    }
}

impl<I2C: I2c> FrameReader for I2cBurstReader<I2C> {
    fn group(&self) -> ChannelGroup {
        self.group
    }

    fn read_frame(&mut self, frame: &mut [u8]) -> Result<(), ReadError> {
        check_len(frame, self.group.frame_len())?;
        self.i2c
            .write_read(self.address, &[self.register], frame)
            .map_err(|_| ReadError::Bus)
    }
}

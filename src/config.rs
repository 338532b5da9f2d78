//! Hardware and pipeline configuration for the biosensing front end
//! RP2040-based acquisition board with dual ADS131M08 and I2C sensor bus

// ===================================================================
// Transport Limits
// ===================================================================

pub const BLE_MAX_NOTIFY_LEN: usize = 227; // Largest notification the radio accepts
pub const BATCH_BUFFER_CAPACITY: usize = 247; // ATT MTU sized batch buffer
pub const MAX_FRAME_LEN: usize = 32; // Largest raw frame any reader returns

// ===================================================================
// Channel Group Layouts
// ===================================================================

// ADS131M08: status word + 8 channels + CRC word, 24-bit words
pub const ADS_WORD_LEN: usize = 3;
pub const ADS_WORDS_IN_FRAME: usize = 10;
pub const ADS_FRAME_LEN: usize = ADS_WORD_LEN * ADS_WORDS_IN_FRAME; // 30 bytes
pub const ADS_HEADER_LEN: usize = ADS_WORD_LEN; // status word
pub const ADS_RECORD_SIZE: usize = 8 * ADS_WORD_LEN + 1; // 24 data + counter
pub const ADS_RECORDS_PER_BATCH: usize = 9; // 9 x 25 = 225
pub const ADS_PAYLOAD_LEN: usize = BLE_MAX_NOTIFY_LEN; // 2 bytes of padding

// MAX30102: one red + one IR sample, 3 bytes each
pub const PULSE_FRAME_LEN: usize = 6;
pub const PULSE_RECORD_SIZE: usize = PULSE_FRAME_LEN + 1;
pub const PULSE_RECORDS_PER_BATCH: usize = 32; // 224 bytes
pub const PULSE_PAYLOAD_LEN: usize = PULSE_RECORD_SIZE * PULSE_RECORDS_PER_BATCH;

// MPU6050: accel xyz, temperature, gyro xyz
pub const INERTIAL_FRAME_LEN: usize = 14;
pub const INERTIAL_RECORD_SIZE: usize = INERTIAL_FRAME_LEN + 1;
pub const INERTIAL_RECORDS_PER_BATCH: usize = 15; // 225 bytes
pub const INERTIAL_PAYLOAD_LEN: usize = INERTIAL_RECORD_SIZE * INERTIAL_RECORDS_PER_BATCH;

// QMC5883L: field xyz, little endian
pub const MAG_FRAME_LEN: usize = 6;
pub const MAG_RECORD_SIZE: usize = MAG_FRAME_LEN + 1;
pub const MAG_RECORDS_PER_BATCH: usize = 32; // 224 bytes
pub const MAG_PAYLOAD_LEN: usize = MAG_RECORD_SIZE * MAG_RECORDS_PER_BATCH;

// BME280: raw pressure, temperature, humidity burst
pub const BARO_FRAME_LEN: usize = 8;
pub const BARO_RECORD_SIZE: usize = BARO_FRAME_LEN + 1;
pub const BARO_RECORDS_PER_BATCH: usize = 25; // 225 bytes
pub const BARO_PAYLOAD_LEN: usize = BARO_RECORD_SIZE * BARO_RECORDS_PER_BATCH;
pub const BARO_SAMPLE_PERIOD_MS: u64 = 40; // BME280 has no data-ready line

// ===================================================================
// I2C Sensor Addresses and Data Registers
// ===================================================================

pub const MAX30102_ADDR: u8 = 0x57;
pub const MAX30102_FIFO_DATA: u8 = 0x07;
pub const MPU6050_ADDR: u8 = 0x68;
pub const MPU6050_ACCEL_XOUT_H: u8 = 0x3B;
pub const QMC5883L_ADDR: u8 = 0x0D;
pub const QMC5883L_DATA_X_LSB: u8 = 0x00;
pub const BME280_ADDR: u8 = 0x76;
pub const BME280_PRESS_MSB: u8 = 0xF7;

// ===================================================================
// Queue Depths
// ===================================================================

pub const DEFERRED_QUEUE_DEPTH: usize = 8; // >= number of channel groups
pub const RADIO_QUEUE_DEPTH: usize = 4;
pub const SERIAL_QUEUE_DEPTH: usize = 4;
pub const LED_COMMAND_QUEUE_DEPTH: usize = 4;

// ===================================================================
// LED Drivers (TLC5940)
// ===================================================================

pub const LED_DRIVER_COUNT: usize = 2;
pub const LED_CHANNELS_PER_DRIVER: usize = 16;
pub const LED_BYTES_PER_DRIVER: usize = 24; // 16 channels x 12 bits

// ===================================================================
// USB Configuration
// ===================================================================

pub const USB_VID: u16 = 0xc0de;
pub const USB_PID: u16 = 0xcafe;
pub const USB_MANUFACTURER: &str = "Biosense";
pub const USB_SERIAL: &str = "BIOSENSE0001";
pub const USB_MAX_PACKET_SIZE: u16 = 64; // RP2040 full-speed limit

// ===================================================================
// Radio Co-processor Link
// ===================================================================

pub const RADIO_UART_BAUDRATE: u32 = 1_000_000;
pub const RADIO_TX_BUFFER_LEN: usize = 256;
pub const RADIO_RX_BUFFER_LEN: usize = 256;

// ===================================================================
// GPIO Pin Assignments - Raspberry Pi Pico
// ===================================================================

// ADS131M08 "A" on SPI0
pub const ADS_A_SCK_PIN: u8 = 18;
pub const ADS_A_MOSI_PIN: u8 = 19;
pub const ADS_A_MISO_PIN: u8 = 16;
pub const ADS_A_CS_PIN: u8 = 17;
pub const ADS_A_DRDY_PIN: u8 = 20; // active low
pub const ADS_A_RESET_PIN: u8 = 21;

// ADS131M08 "B" on SPI1
pub const ADS_B_SCK_PIN: u8 = 10;
pub const ADS_B_MOSI_PIN: u8 = 11;
pub const ADS_B_MISO_PIN: u8 = 12;
pub const ADS_B_CS_PIN: u8 = 13;
pub const ADS_B_DRDY_PIN: u8 = 14; // active low
pub const ADS_B_RESET_PIN: u8 = 15;
pub const ADS_SPI_FREQUENCY_HZ: u32 = 8_000_000;

// Shared I2C0 sensor bus
pub const I2C_SDA_PIN: u8 = 4;
pub const I2C_SCL_PIN: u8 = 5;
pub const I2C_FREQUENCY_HZ: u32 = 400_000;
pub const MAX30102_INT_PIN: u8 = 6; // active low
pub const MPU6050_INT_PIN: u8 = 7; // active low
pub const QMC5883L_DRDY_PIN: u8 = 8; // active high

// Radio co-processor on UART0
pub const RADIO_TX_PIN: u8 = 0;
pub const RADIO_RX_PIN: u8 = 1;

// TLC5940 control lines
pub const TLC_GSCLK_PIN: u8 = 2;
pub const TLC_XLAT_PIN: u8 = 3;
pub const TLC_BLANK_PIN: u8 = 9;
pub const TLC_SIN_PIN: u8 = 22;
pub const TLC_SCLK_PIN: u8 = 26;

pub const LED_STATUS_PIN: u8 = 25; // Built-in LED on Pico

// ===================================================================
// Supervision
// ===================================================================

pub const STATUS_INTERVAL_SECS: u64 = 10;
pub const STATUS_REPORT_SECS: u32 = 60;
pub const PIPELINE_REPORT_EVERY_BATCHES: u32 = 1000;

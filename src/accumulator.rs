//! Batch accumulation for one channel group
//!
//! Successive sample frames are copied into a fixed-size payload buffer as
//! records of `data bytes + 1 running counter byte`. When the configured number
//! of records is reached the whole payload is handed out and the write cursor
//! starts over. The buffer is only ever touched from the cooperative executor.

use core::fmt;

use crate::types::ChannelGroup;

/// Record layout of one channel group's batches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GroupConfig {
    /// Status/header bytes at the start of every frame, skipped on copy
    pub header_len: usize,
    /// Bytes per record, including the trailing counter byte
    pub record_size: usize,
    /// Records collected before a batch is dispatched
    pub records_per_batch: usize,
    /// Length reported for a full batch (may include trailing padding)
    pub payload_len: usize,
}

impl GroupConfig {
    pub const fn new(
        header_len: usize,
        record_size: usize,
        records_per_batch: usize,
        payload_len: usize,
    ) -> Self {
        Self {
            header_len,
            record_size,
            records_per_batch,
            payload_len,
        }
    }

    /// Channel-value bytes taken from each frame
    pub const fn data_len(&self) -> usize {
        self.record_size.saturating_sub(1)
    }

    /// Shortest frame this layout can accept
    pub const fn min_frame_len(&self) -> usize {
        self.header_len + self.data_len()
    }

    /// Bytes actually written per batch
    pub const fn used_len(&self) -> usize {
        self.record_size * self.records_per_batch
    }

    /// Check the layout against a batch buffer of `capacity` bytes
    pub fn validate(&self, capacity: usize) -> Result<(), ConfigError> {
        if self.record_size < 2 {
            return Err(ConfigError::RecordTooSmall);
        }
        if self.records_per_batch == 0 {
            return Err(ConfigError::EmptyBatch);
        }
        if self.used_len() > self.payload_len {
            return Err(ConfigError::RecordsExceedPayload {
                used: self.used_len(),
                payload: self.payload_len,
            });
        }
        if self.payload_len > capacity {
            return Err(ConfigError::PayloadExceedsCapacity {
                payload: self.payload_len,
                capacity,
            });
        }
        Ok(())
    }
}

/// Programming/configuration errors. Never recovered at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Frame is shorter than `header_len + record_size - 1`
    FrameTooShort { needed: usize, got: usize },
    /// Reader frames do not fit the pipeline's frame buffer
    FrameTooLong { max: usize, got: usize },
    /// A record must hold at least one data byte and the counter
    RecordTooSmall,
    /// `records_per_batch` is zero
    EmptyBatch,
    RecordsExceedPayload { used: usize, payload: usize },
    PayloadExceedsCapacity { payload: usize, capacity: usize },
    /// A reader for this group is already registered
    DuplicateGroup,
    RegistryFull,
    /// The profile enables a group that got no reader
    MissingReader(ChannelGroup),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FrameTooShort { needed, got } => {
                write!(f, "frame too short: need {needed} bytes, got {got}")
            }
            ConfigError::FrameTooLong { max, got } => {
                write!(f, "frame too long: max {max} bytes, got {got}")
            }
            ConfigError::RecordTooSmall => f.write_str("record size must be at least 2"),
            ConfigError::EmptyBatch => f.write_str("records per batch must be non-zero"),
            ConfigError::RecordsExceedPayload { used, payload } => {
                write!(f, "{used} record bytes exceed {payload} byte payload")
            }
            ConfigError::PayloadExceedsCapacity { payload, capacity } => {
                write!(f, "{payload} byte payload exceeds {capacity} byte buffer")
            }
            ConfigError::DuplicateGroup => f.write_str("channel group registered twice"),
            ConfigError::RegistryFull => f.write_str("pipeline registry is full"),
            ConfigError::MissingReader(group) => write!(f, "no reader for enabled group {group:?}"),
        }
    }
}

/// Result of accepting one frame
#[derive(Debug, PartialEq)]
pub enum Accumulate<'a> {
    /// Record stored, batch not yet full
    Accumulating,
    /// Batch complete; `payload` is exactly `payload_len` bytes
    BatchReady { payload: &'a [u8], sequence: u8 },
}

/// Per-group batch buffer, write cursor and running sample counter
pub struct BatchAccumulator<const CAP: usize> {
    config: GroupConfig,
    buffer: [u8; CAP],
    cursor: usize,
    counter: u8,
    sequence: u8,
}

impl<const CAP: usize> BatchAccumulator<CAP> {
    /// Create an empty accumulator. Fails fast on a layout that cannot fit.
    pub fn new(config: GroupConfig) -> Result<Self, ConfigError> {
        config.validate(CAP)?;
        Ok(Self {
            config,
            buffer: [0; CAP],
            cursor: 0,
            counter: 0,
            sequence: 0,
        })
    }

    /// Start the running sample counter at `counter` instead of 0
    pub fn with_first_counter(mut self, counter: u8) -> Self {
        self.counter = counter;
        self
    }

    pub fn config(&self) -> &GroupConfig {
        &self.config
    }

    /// Records stored in the current (incomplete) batch
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Counter value the next accepted frame will be tagged with
    pub fn counter(&self) -> u8 {
        self.counter
    }

    /// Sequence number the next full batch will carry
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    /// Copy one frame into the next record slot.
    ///
    /// A frame shorter than the layout needs is rejected before anything is
    /// written, so buffer, cursor and counter stay as they were.
    pub fn accept(&mut self, frame: &[u8]) -> Result<Accumulate<'_>, ConfigError> {
        let data_len = self.config.data_len();
        let start = self.config.header_len;
        let Some(data) = frame.get(start..start + data_len) else {
            return Err(ConfigError::FrameTooShort {
                needed: start + data_len,
                got: frame.len(),
            });
        };

        let offset = self.config.record_size * self.cursor;
        let record = &mut self.buffer[offset..offset + self.config.record_size];
        record[..data_len].copy_from_slice(data);
        record[data_len] = self.counter;

        self.counter = self.counter.wrapping_add(1);
        self.cursor += 1;

        if self.cursor < self.config.records_per_batch {
            return Ok(Accumulate::Accumulating);
        }

        self.cursor = 0;
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        Ok(Accumulate::BatchReady {
            payload: &self.buffer[..self.config.payload_len],
            sequence,
        })
    }

    /// Drop the partial batch and zero the buffer. Counters keep running.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.buffer.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BATCH_BUFFER_CAPACITY;

    const ADC_A: GroupConfig = GroupConfig::new(3, 25, 9, 227);

    fn adc_frame(fill: u8) -> [u8; 27] {
        let mut frame = [fill; 27];
        // status word
        frame[..3].copy_from_slice(&[0xAA, 0xBB, 0xCC]);
        frame
    }

    #[test]
    fn adc_scenario_produces_one_227_byte_batch() {
        let mut acc = BatchAccumulator::<BATCH_BUFFER_CAPACITY>::new(ADC_A)
            .unwrap()
            .with_first_counter(40);

        for i in 0..8u8 {
            assert_eq!(acc.accept(&adc_frame(i + 1)).unwrap(), Accumulate::Accumulating);
        }

        let Accumulate::BatchReady { payload, sequence } = acc.accept(&adc_frame(9)).unwrap() else {
            panic!("ninth frame must complete the batch");
        };
        assert_eq!(payload.len(), 227);
        assert_eq!(sequence, 0);
        for k in 0..9 {
            let record = &payload[25 * k..25 * k + 25];
            assert!(record[..24].iter().all(|&b| b == k as u8 + 1));
            assert_eq!(record[24], 40 + k as u8);
        }
        assert_eq!(payload[24], 40);
        assert_eq!(payload[49], 41);
        assert_eq!(payload[224], 48);
        assert_eq!(&payload[225..227], &[0, 0]);
    }

    #[test]
    fn header_bytes_are_never_copied() {
        let mut acc = BatchAccumulator::<64>::new(GroupConfig::new(3, 5, 2, 10)).unwrap();
        acc.accept(&[0xFF, 0xFF, 0xFF, 1, 2, 3, 4]).unwrap();
        let Accumulate::BatchReady { payload, .. } =
            acc.accept(&[0xFF, 0xFF, 0xFF, 5, 6, 7, 8, 0xEE]).unwrap()
        else {
            panic!("expected batch");
        };
        assert_eq!(payload, &[1, 2, 3, 4, 0, 5, 6, 7, 8, 1]);
    }

    #[test]
    fn batch_ready_fires_once_per_records_per_batch() {
        let config = GroupConfig::new(0, 7, 32, 224);
        let mut acc = BatchAccumulator::<BATCH_BUFFER_CAPACITY>::new(config).unwrap();
        let mut ready = 0;
        for n in 1..=(32 * 5) {
            match acc.accept(&[0u8; 6]).unwrap() {
                Accumulate::BatchReady { payload, sequence } => {
                    ready += 1;
                    assert_eq!(n % 32, 0);
                    assert_eq!(payload.len(), 224);
                    assert_eq!(sequence, (ready - 1) as u8);
                }
                Accumulate::Accumulating => assert_ne!(n % 32, 0),
            }
        }
        assert_eq!(ready, 5);
        assert_eq!(acc.cursor(), 0);
    }

    #[test]
    fn counter_wraps_modulo_256_across_batches() {
        let config = GroupConfig::new(0, 2, 4, 8);
        let mut acc = BatchAccumulator::<8>::new(config).unwrap().with_first_counter(254);
        for _ in 0..3 {
            acc.accept(&[0]).unwrap();
        }
        let Accumulate::BatchReady { payload, .. } = acc.accept(&[0]).unwrap() else {
            panic!("expected batch");
        };
        assert_eq!([payload[1], payload[3], payload[5], payload[7]], [254, 255, 0, 1]);
        assert_eq!(acc.counter(), 2);
    }

    #[test]
    fn short_frame_is_rejected_without_side_effects() {
        let mut acc = BatchAccumulator::<BATCH_BUFFER_CAPACITY>::new(ADC_A).unwrap();
        acc.accept(&adc_frame(1)).unwrap();

        let err = acc.accept(&[0u8; 26]).unwrap_err();
        assert_eq!(err, ConfigError::FrameTooShort { needed: 27, got: 26 });
        assert_eq!(acc.cursor(), 1);
        assert_eq!(acc.counter(), 1);
    }

    #[test]
    fn reset_discards_partial_batch_but_keeps_counter() {
        let config = GroupConfig::new(0, 2, 3, 6);
        let mut acc = BatchAccumulator::<6>::new(config).unwrap();
        acc.accept(&[9]).unwrap();
        acc.accept(&[9]).unwrap();
        acc.reset();
        assert_eq!(acc.cursor(), 0);
        assert_eq!(acc.counter(), 2);

        acc.accept(&[1]).unwrap();
        acc.accept(&[2]).unwrap();
        let Accumulate::BatchReady { payload, .. } = acc.accept(&[3]).unwrap() else {
            panic!("expected batch");
        };
        assert_eq!(payload, &[1, 2, 2, 3, 3, 4]);
    }

    #[test]
    fn invalid_layouts_fail_fast() {
        assert_eq!(
            BatchAccumulator::<227>::new(GroupConfig::new(0, 25, 10, 227)).err(),
            Some(ConfigError::RecordsExceedPayload { used: 250, payload: 227 })
        );
        assert_eq!(
            BatchAccumulator::<200>::new(ADC_A).err(),
            Some(ConfigError::PayloadExceedsCapacity { payload: 227, capacity: 200 })
        );
        assert_eq!(
            BatchAccumulator::<16>::new(GroupConfig::new(0, 1, 4, 4)).err(),
            Some(ConfigError::RecordTooSmall)
        );
        assert_eq!(
            BatchAccumulator::<16>::new(GroupConfig::new(0, 4, 0, 4)).err(),
            Some(ConfigError::EmptyBatch)
        );
    }
}

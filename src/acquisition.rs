//! Acquisition pipeline: frame read -> batch accumulation -> dispatch
//!
//! One [`GroupPipeline`] exists per enabled channel group. The [`Registry`]
//! owns them all and is driven exclusively by the deferred task queue, so a
//! pipeline's buffer is never reachable from interrupt context.

use core::fmt;

use heapless::Vec;

use crate::accumulator::{Accumulate, BatchAccumulator, ConfigError};
use crate::config::{BATCH_BUFFER_CAPACITY, MAX_FRAME_LEN};
use crate::dispatch::Dispatch;
use crate::profile::Profile;
use crate::types::{ChannelGroup, GROUP_COUNT};

/// Failure of a single frame read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReadError {
    /// Bus transaction failed (NACK, arbitration loss, SPI fault, ...)
    Bus,
    /// Caller passed a frame buffer of the wrong length
    FrameLength { expected: usize, got: usize },
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadError::Bus => f.write_str("bus error"),
            ReadError::FrameLength { expected, got } => {
                write!(f, "frame buffer is {got} bytes, reader needs {expected}")
            }
        }
    }
}

/// Reads one raw frame for a channel group.
///
/// `read_frame` is a single bounded bus transaction; it may briefly block the
/// cooperative executor but never waits for data to become ready.
pub trait FrameReader {
    fn group(&self) -> ChannelGroup;

    /// Statically known frame length
    fn frame_len(&self) -> usize {
        self.group().frame_len()
    }

    /// Fill `frame` (exactly `frame_len()` bytes) or report an error.
    /// On error the contents of `frame` are unspecified and must not be used.
    fn read_frame(&mut self, frame: &mut [u8]) -> Result<(), ReadError>;
}

impl<R: FrameReader + ?Sized> FrameReader for &mut R {
    fn group(&self) -> ChannelGroup {
        (**self).group()
    }

    fn frame_len(&self) -> usize {
        (**self).frame_len()
    }

    fn read_frame(&mut self, frame: &mut [u8]) -> Result<(), ReadError> {
        (**self).read_frame(frame)
    }
}

/// Why a deferred acquisition task produced no record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PipelineError {
    /// Transient: this cycle's sample is dropped
    Read(ReadError),
    /// Programming error: frame/layout mismatch
    Config(ConfigError),
    /// Task submitted for a group nobody registered
    UnknownGroup(ChannelGroup),
}

impl From<ReadError> for PipelineError {
    fn from(e: ReadError) -> Self {
        PipelineError::Read(e)
    }
}

impl From<ConfigError> for PipelineError {
    fn from(e: ConfigError) -> Self {
        PipelineError::Config(e)
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Read(e) => write!(f, "read failed: {e}"),
            PipelineError::Config(e) => write!(f, "configuration error: {e}"),
            PipelineError::UnknownGroup(g) => write!(f, "no pipeline for {}", g.name()),
        }
    }
}

/// Outcome of one successful acquisition cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Cycle {
    Accumulating,
    Dispatched { sequence: u8 },
}

/// Per-group counters, reported by the deferred queue loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PipelineStats {
    pub frames: u32,
    pub batches: u32,
    pub read_errors: u32,
}

/// Reader + accumulator for one channel group
pub struct GroupPipeline<R, const CAP: usize = BATCH_BUFFER_CAPACITY> {
    reader: R,
    accumulator: BatchAccumulator<CAP>,
    stats: PipelineStats,
}

impl<R: FrameReader, const CAP: usize> GroupPipeline<R, CAP> {
    /// Pair a reader with its group's layout. Rejects readers whose frames
    /// cannot satisfy the layout, so short frames are caught at start-up.
    pub fn new(reader: R) -> Result<Self, ConfigError> {
        let accumulator = BatchAccumulator::new(reader.group().layout())?;
        Self::with_accumulator(reader, accumulator)
    }

    pub fn with_accumulator(
        reader: R,
        accumulator: BatchAccumulator<CAP>,
    ) -> Result<Self, ConfigError> {
        let frame_len = reader.frame_len();
        if frame_len > MAX_FRAME_LEN {
            return Err(ConfigError::FrameTooLong {
                max: MAX_FRAME_LEN,
                got: frame_len,
            });
        }
        let needed = accumulator.config().min_frame_len();
        if frame_len < needed {
            return Err(ConfigError::FrameTooShort {
                needed,
                got: frame_len,
            });
        }
        Ok(Self {
            reader,
            accumulator,
            stats: PipelineStats::default(),
        })
    }

    pub fn group(&self) -> ChannelGroup {
        self.reader.group()
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn accumulator(&self) -> &BatchAccumulator<CAP> {
        &self.accumulator
    }

    /// Read one frame, append it and dispatch the batch if it is full.
    ///
    /// Any error leaves the accumulator untouched; the counter only advances
    /// on the next successful read.
    pub fn run_cycle<D: Dispatch>(&mut self, dispatcher: &mut D) -> Result<Cycle, PipelineError> {
        let mut storage = [0u8; MAX_FRAME_LEN];
        let frame = &mut storage[..self.reader.frame_len()];

        if let Err(e) = self.reader.read_frame(frame) {
            self.stats.read_errors = self.stats.read_errors.wrapping_add(1);
            return Err(e.into());
        }

        let group = self.reader.group();
        match self.accumulator.accept(frame)? {
            Accumulate::Accumulating => {
                self.stats.frames = self.stats.frames.wrapping_add(1);
                Ok(Cycle::Accumulating)
            }
            Accumulate::BatchReady { payload, sequence } => {
                self.stats.frames = self.stats.frames.wrapping_add(1);
                self.stats.batches = self.stats.batches.wrapping_add(1);
                dispatcher.dispatch(group, payload, sequence);
                Ok(Cycle::Dispatched { sequence })
            }
        }
    }
}

/// Statically sized set of enabled group pipelines
pub struct Registry<R, const CAP: usize = BATCH_BUFFER_CAPACITY> {
    pipelines: Vec<GroupPipeline<R, CAP>, GROUP_COUNT>,
}

impl<R: FrameReader, const CAP: usize> Registry<R, CAP> {
    pub const fn new() -> Self {
        Self {
            pipelines: Vec::new(),
        }
    }

    /// Add a reader for a group that has no pipeline yet
    pub fn register(&mut self, reader: R) -> Result<(), ConfigError> {
        self.insert(GroupPipeline::new(reader)?)
    }

    /// Register the readers for every group `profile` enables.
    ///
    /// Readers for other groups are skipped. Any rejected reader, or an enabled
    /// group left without one, fails the whole set: a group without a pipeline
    /// would still have its data-ready source running.
    pub fn register_profile<I>(&mut self, profile: Profile, readers: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = R>,
    {
        for reader in readers {
            if profile.includes(reader.group()) {
                self.register(reader)?;
            }
        }
        match profile.groups().iter().find(|g| self.pipeline(**g).is_none()) {
            Some(group) => Err(ConfigError::MissingReader(*group)),
            None => Ok(()),
        }
    }

    pub fn insert(&mut self, pipeline: GroupPipeline<R, CAP>) -> Result<(), ConfigError> {
        let group = pipeline.group();
        if self.pipelines.iter().any(|p| p.group() == group) {
            return Err(ConfigError::DuplicateGroup);
        }
        self.pipelines
            .push(pipeline)
            .map_err(|_| ConfigError::RegistryFull)
    }

    pub fn groups(&self) -> impl Iterator<Item = ChannelGroup> + '_ {
        self.pipelines.iter().map(|p| p.group())
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    pub fn pipeline(&self, group: ChannelGroup) -> Option<&GroupPipeline<R, CAP>> {
        self.pipelines.iter().find(|p| p.group() == group)
    }

    pub fn stats(&self, group: ChannelGroup) -> Option<PipelineStats> {
        self.pipeline(group).map(|p| p.stats())
    }

    /// Run one deferred acquisition task for `group`
    pub fn service<D: Dispatch>(
        &mut self,
        group: ChannelGroup,
        dispatcher: &mut D,
    ) -> Result<Cycle, PipelineError> {
        let pipeline = self
            .pipelines
            .iter_mut()
            .find(|p| p.group() == group)
            .ok_or(PipelineError::UnknownGroup(group))?;
        pipeline.run_cycle(dispatcher)
    }
}

impl<R: FrameReader, const CAP: usize> Default for Registry<R, CAP> {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod tests {
    use super::mock::{RecordingDispatcher, ScriptedReader};
    use super::*;

    #[test]
    fn full_batch_is_dispatched_once() {
        let mut pipeline: GroupPipeline<_> =
            GroupPipeline::new(ScriptedReader::new(ChannelGroup::AdcA)).unwrap();
        let mut dispatcher = RecordingDispatcher::default();

        for _ in 0..8 {
            assert_eq!(pipeline.run_cycle(&mut dispatcher), Ok(Cycle::Accumulating));
        }
        assert_eq!(
            pipeline.run_cycle(&mut dispatcher),
            Ok(Cycle::Dispatched { sequence: 0 })
        );

        assert_eq!(dispatcher.batches.len(), 1);
        let (group, payload, sequence) = &dispatcher.batches[0];
        assert_eq!(*group, ChannelGroup::AdcA);
        assert_eq!(*sequence, 0);
        assert_eq!(payload.len(), 227);
        assert_eq!(payload[0], 0);
        assert_eq!(payload[25], 1);
        assert_eq!(payload[224], 8);
        assert_eq!(pipeline.stats().batches, 1);
        assert_eq!(pipeline.stats().frames, 9);
    }

    #[test]
    fn read_error_drops_sample_without_advancing_counter() {
        let mut reader = ScriptedReader::new(ChannelGroup::Magnetometer);
        reader.fail_next = 1;
        let mut pipeline: GroupPipeline<_> = GroupPipeline::new(reader).unwrap();
        let mut dispatcher = RecordingDispatcher::default();

        assert_eq!(
            pipeline.run_cycle(&mut dispatcher),
            Err(PipelineError::Read(ReadError::Bus))
        );
        assert_eq!(pipeline.accumulator().cursor(), 0);
        assert_eq!(pipeline.accumulator().counter(), 0);

        assert_eq!(pipeline.run_cycle(&mut dispatcher), Ok(Cycle::Accumulating));
        assert_eq!(pipeline.accumulator().counter(), 1);
        assert_eq!(pipeline.stats().read_errors, 1);
        assert_eq!(pipeline.stats().frames, 1);
    }

    #[test]
    fn short_reader_is_rejected_at_registration() {
        let mut reader = ScriptedReader::new(ChannelGroup::AdcB);
        reader.frame_len = 26;
        let err = GroupPipeline::<_, BATCH_BUFFER_CAPACITY>::new(reader).err();
        assert_eq!(err, Some(ConfigError::FrameTooShort { needed: 27, got: 26 }));

        let mut reader = ScriptedReader::new(ChannelGroup::AdcB);
        reader.frame_len = MAX_FRAME_LEN + 1;
        let err = GroupPipeline::<_, BATCH_BUFFER_CAPACITY>::new(reader).err();
        assert_eq!(
            err,
            Some(ConfigError::FrameTooLong { max: MAX_FRAME_LEN, got: MAX_FRAME_LEN + 1 })
        );
    }

    #[test]
    fn registry_routes_by_group_and_keeps_buffers_apart() {
        let mut registry: Registry<ScriptedReader> = Registry::new();
        registry.register(ScriptedReader::new(ChannelGroup::AdcA)).unwrap();
        let mut b = ScriptedReader::new(ChannelGroup::AdcB);
        b.next = 100;
        registry.register(b).unwrap();
        let mut dispatcher = RecordingDispatcher::default();

        for _ in 0..9 {
            registry.service(ChannelGroup::AdcA, &mut dispatcher).unwrap();
            registry.service(ChannelGroup::AdcB, &mut dispatcher).unwrap();
        }

        assert_eq!(dispatcher.batches.len(), 2);
        let (group_a, payload_a, _) = &dispatcher.batches[0];
        let (group_b, payload_b, _) = &dispatcher.batches[1];
        assert_eq!(*group_a, ChannelGroup::AdcA);
        assert_eq!(*group_b, ChannelGroup::AdcB);
        assert_eq!(payload_a[0], 0);
        assert_eq!(payload_b[0], 100);
        // both groups count independently from zero
        assert_eq!(payload_a[24], 0);
        assert_eq!(payload_b[24], 0);
        assert_eq!(registry.stats(ChannelGroup::AdcA).unwrap().batches, 1);
    }

    #[test]
    fn registry_rejects_duplicates_and_unknown_groups() {
        let mut registry: Registry<ScriptedReader> = Registry::new();
        registry.register(ScriptedReader::new(ChannelGroup::Pulse)).unwrap();
        assert_eq!(
            registry.register(ScriptedReader::new(ChannelGroup::Pulse)),
            Err(ConfigError::DuplicateGroup)
        );
        let mut dispatcher = RecordingDispatcher::default();
        assert_eq!(
            registry.service(ChannelGroup::Barometer, &mut dispatcher),
            Err(PipelineError::UnknownGroup(ChannelGroup::Barometer))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn profile_registration_skips_disabled_groups() {
        let mut registry: Registry<ScriptedReader> = Registry::new();
        let readers = [ChannelGroup::Pulse, ChannelGroup::AdcB, ChannelGroup::AdcA]
            .map(ScriptedReader::new);
        registry.register_profile(Profile::DualAdc, readers).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.pipeline(ChannelGroup::Pulse).is_none());
    }

    #[test]
    fn profile_registration_fails_on_rejected_or_missing_reader() {
        let mut registry: Registry<ScriptedReader> = Registry::new();
        assert_eq!(
            registry.register_profile(Profile::DualAdc, [ScriptedReader::new(ChannelGroup::AdcA)]),
            Err(ConfigError::MissingReader(ChannelGroup::AdcB))
        );

        let mut registry: Registry<ScriptedReader> = Registry::new();
        let mut short = ScriptedReader::new(ChannelGroup::AdcB);
        short.frame_len = 10;
        assert_eq!(
            registry.register_profile(
                Profile::DualAdc,
                [ScriptedReader::new(ChannelGroup::AdcA), short]
            ),
            Err(ConfigError::FrameTooShort { needed: 27, got: 10 })
        );

        let mut registry: Registry<ScriptedReader> = Registry::new();
        let readers = [ChannelGroup::AdcA, ChannelGroup::AdcA].map(ScriptedReader::new);
        assert_eq!(
            registry.register_profile(Profile::DualAdc, readers),
            Err(ConfigError::DuplicateGroup)
        );
    }
}

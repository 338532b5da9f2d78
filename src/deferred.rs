//! Deferred task queue
//!
//! Data-ready interrupts must not touch a bus, so they only post the channel
//! group that became ready. A single consumer drains the queue in FIFO order
//! and runs the acquisition cycle for each entry on the cooperative executor.
//!
//! At most one task per group is outstanding: a second interrupt for a group
//! whose task has not started yet is folded into the pending one. The pending
//! flag is cleared when the consumer takes the task, so an interrupt arriving
//! while the read is in progress schedules one more cycle.

use core::convert::Infallible;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;
use portable_atomic::{AtomicU32, AtomicU8, Ordering};

use crate::acquisition::{Cycle, FrameReader, PipelineError, Registry};
use crate::config::PIPELINE_REPORT_EVERY_BATCHES;
use crate::dispatch::Dispatch;
use crate::types::{ChannelGroup, GROUP_COUNT};

/// Result of posting a task from interrupt context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Submission {
    Queued,
    /// A task for this group is already waiting; nothing was added
    AlreadyPending,
    /// Queue full. Cannot happen while the depth covers every group.
    Overflow,
}

/// Submission counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QueueStats {
    pub queued: u32,
    pub coalesced: u32,
    pub overflowed: u32,
}

pub struct DeferredQueue<M: RawMutex, const N: usize> {
    pending: AtomicU8,
    tasks: Channel<M, ChannelGroup, N>,
    queued: AtomicU32,
    coalesced: AtomicU32,
    overflowed: AtomicU32,
}

impl<M: RawMutex, const N: usize> DeferredQueue<M, N> {
    pub const fn new() -> Self {
        assert!(N >= GROUP_COUNT, "deferred queue must hold one task per group");
        Self {
            pending: AtomicU8::new(0),
            tasks: Channel::new(),
            queued: AtomicU32::new(0),
            coalesced: AtomicU32::new(0),
            overflowed: AtomicU32::new(0),
        }
    }

    /// Post an acquisition task for `group`. Safe to call from interrupt context.
    pub fn submit(&self, group: ChannelGroup) -> Submission {
        let bit = group.bit();
        if self.pending.fetch_or(bit, Ordering::AcqRel) & bit != 0 {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
            return Submission::AlreadyPending;
        }
        match self.tasks.try_send(group) {
            Ok(()) => {
                self.queued.fetch_add(1, Ordering::Relaxed);
                Submission::Queued
            }
            Err(_) => {
                self.pending.fetch_and(!bit, Ordering::AcqRel);
                self.overflowed.fetch_add(1, Ordering::Relaxed);
                Submission::Overflow
            }
        }
    }

    /// Wait for the next task
    pub async fn next(&self) -> ChannelGroup {
        let group = self.tasks.receive().await;
        self.pending.fetch_and(!group.bit(), Ordering::AcqRel);
        group
    }

    pub fn try_next(&self) -> Option<ChannelGroup> {
        let group = self.tasks.try_receive().ok()?;
        self.pending.fetch_and(!group.bit(), Ordering::AcqRel);
        Some(group)
    }

    pub fn is_pending(&self, group: ChannelGroup) -> bool {
        self.pending.load(Ordering::Acquire) & group.bit() != 0
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            queued: self.queued.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            overflowed: self.overflowed.load(Ordering::Relaxed),
        }
    }
}

impl<M: RawMutex, const N: usize> Default for DeferredQueue<M, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer side of the queue: runs each task against the registry
pub struct Worker<'a, R, D, const CAP: usize> {
    registry: &'a mut Registry<R, CAP>,
    dispatcher: &'a mut D,
    batches: u32,
}

impl<'a, R: FrameReader, D: Dispatch, const CAP: usize> Worker<'a, R, D, CAP> {
    pub fn new(registry: &'a mut Registry<R, CAP>, dispatcher: &'a mut D) -> Self {
        Self {
            registry,
            dispatcher,
            batches: 0,
        }
    }

    /// Run one acquisition cycle. Errors are logged here and go no further.
    pub fn handle(&mut self, group: ChannelGroup) -> Result<Cycle, PipelineError> {
        let result = self.registry.service(group, &mut *self.dispatcher);
        match &result {
            Ok(Cycle::Accumulating) => {}
            Ok(Cycle::Dispatched { sequence }) => {
                trace!("{}: batch {} dispatched", group, sequence);
                self.batches = self.batches.wrapping_add(1);
                if self.batches % PIPELINE_REPORT_EVERY_BATCHES == 0 {
                    self.report();
                }
            }
            Err(PipelineError::Read(e)) => warn!("{}: sample dropped, {:?}", group, e),
            Err(e) => error!("{}: {:?}", group, e),
        }
        result
    }

    /// Run every task queued right now, without waiting
    pub fn drain<M: RawMutex, const N: usize>(&mut self, queue: &DeferredQueue<M, N>) -> usize {
        let mut handled = 0;
        while let Some(group) = queue.try_next() {
            let _ = self.handle(group);
            handled += 1;
        }
        handled
    }

    /// Consume tasks forever
    pub async fn run<M: RawMutex, const N: usize>(
        &mut self,
        queue: &DeferredQueue<M, N>,
    ) -> Infallible {
        info!("Deferred queue consumer running for {} groups", self.registry.len());
        loop {
            let group = queue.next().await;
            let _ = self.handle(group);
        }
    }

    pub fn batches(&self) -> u32 {
        self.batches
    }

    fn report(&self) {
        for group in self.registry.groups() {
            if let Some(stats) = self.registry.stats(group) {
                info!(
                    "{}: {} frames, {} batches, {} read errors",
                    group,
                    stats.frames,
                    stats.batches,
                    stats.read_errors
                );
            }
        }
    }
}

/// Drive the registry from `queue` forever
pub async fn run<M, R, D, const N: usize, const CAP: usize>(
    queue: &DeferredQueue<M, N>,
    registry: &mut Registry<R, CAP>,
    dispatcher: &mut D,
) -> Infallible
where
    M: RawMutex,
    R: FrameReader,
    D: Dispatch,
{
    Worker::new(registry, dispatcher).run(queue).await
}

//! Output transports for completed batches
//!
//! The pipeline only sees the two sender traits. The firmware implementations
//! copy the batch into a bounded channel and return immediately; dedicated
//! transport tasks drain those channels, so a slow or absent link can never
//! stall the deferred task queue.

use core::fmt;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;
use portable_atomic::{AtomicBool, AtomicU8, Ordering};

use crate::types::{ChannelGroup, Packet, PipeId, SequenceTag};

/// Transport-local delivery failure. Never surfaced past the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// No central has enabled notifications on this pipe
    NotSubscribed,
    /// Wired link not connected
    LinkDown,
    /// Transport task has not drained earlier batches yet
    QueueFull,
    /// Payload exceeds the transport's maximum packet size
    PayloadTooLarge,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransportError::NotSubscribed => "no subscriber",
            TransportError::LinkDown => "link down",
            TransportError::QueueFull => "transport queue full",
            TransportError::PayloadTooLarge => "payload too large",
        })
    }
}

/// Wireless notification sender (one logical data pipe per channel group)
pub trait WirelessSender {
    fn notify(&mut self, pipe: PipeId, payload: &[u8]) -> Result<(), TransportError>;
}

/// Wired serial-link sender, mirroring every wireless batch
pub trait SerialSender {
    fn send(&mut self, payload: &[u8], tag: SequenceTag) -> Result<(), TransportError>;
}

/// Per-pipe notification subscription state, written by the radio link
/// receiver and read by the wireless sender
pub struct Subscriptions {
    mask: AtomicU8,
}

impl Subscriptions {
    pub const fn new() -> Self {
        Self {
            mask: AtomicU8::new(0),
        }
    }

    pub fn set(&self, pipe: PipeId, enabled: bool) {
        let Some(group) = pipe.group() else {
            warn!("Subscription change for unknown pipe {}", pipe.0);
            return;
        };
        if enabled {
            self.mask.fetch_or(group.bit(), Ordering::AcqRel);
        } else {
            self.mask.fetch_and(!group.bit(), Ordering::AcqRel);
        }
        info!("Notifications for {} {}", group, if enabled { "enabled" } else { "disabled" });
    }

    pub fn is_enabled(&self, pipe: PipeId) -> bool {
        pipe.group()
            .is_some_and(|g| self.mask.load(Ordering::Acquire) & g.bit() != 0)
    }

    /// Drop every subscription, e.g. when the central disconnects
    pub fn clear(&self) {
        self.mask.store(0, Ordering::Release);
    }
}

impl Default for Subscriptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection state of the wired serial link
pub struct LinkState {
    up: AtomicBool,
}

impl LinkState {
    pub const fn new() -> Self {
        Self {
            up: AtomicBool::new(false),
        }
    }

    pub fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::Release);
    }

    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::Acquire)
    }
}

impl Default for LinkState {
    fn default() -> Self {
        Self::new()
    }
}

/// Wireless sender that queues notifications for the radio link task
pub struct RadioSender<'a, M: RawMutex, const N: usize> {
    queue: &'a Channel<M, Packet, N>,
    subscriptions: &'a Subscriptions,
    sequences: [u8; crate::types::GROUP_COUNT],
}

impl<'a, M: RawMutex, const N: usize> RadioSender<'a, M, N> {
    pub fn new(queue: &'a Channel<M, Packet, N>, subscriptions: &'a Subscriptions) -> Self {
        Self {
            queue,
            subscriptions,
            sequences: [0; crate::types::GROUP_COUNT],
        }
    }
}

impl<M: RawMutex, const N: usize> WirelessSender for RadioSender<'_, M, N> {
    fn notify(&mut self, pipe: PipeId, payload: &[u8]) -> Result<(), TransportError> {
        let group = pipe.group().ok_or(TransportError::NotSubscribed)?;
        if !self.subscriptions.is_enabled(pipe) {
            return Err(TransportError::NotSubscribed);
        }
        // Radio frames carry their own per-pipe sequence so the co-processor
        // can spot queue drops independently of the serial link.
        let sequence = self.sequences[group.index()];
        let packet = Packet::new(pipe, sequence, payload).ok_or(TransportError::PayloadTooLarge)?;
        self.queue
            .try_send(packet)
            .map_err(|_| TransportError::QueueFull)?;
        self.sequences[group.index()] = sequence.wrapping_add(1);
        Ok(())
    }
}

/// Serial sender that queues batches for the USB serial task
pub struct SerialLinkSender<'a, M: RawMutex, const N: usize> {
    queue: &'a Channel<M, Packet, N>,
    link: &'a LinkState,
}

impl<'a, M: RawMutex, const N: usize> SerialLinkSender<'a, M, N> {
    pub fn new(queue: &'a Channel<M, Packet, N>, link: &'a LinkState) -> Self {
        Self { queue, link }
    }

    /// Host opened the port: start from an empty queue
    pub fn open_session(&self) {
        self.queue.clear();
        self.link.set_up(true);
    }

    /// Host went away: stop queueing and drop what the old session left
    pub fn close_session(&self) {
        self.link.set_up(false);
        self.queue.clear();
    }
}

impl<M: RawMutex, const N: usize> SerialSender for SerialLinkSender<'_, M, N> {
    fn send(&mut self, payload: &[u8], tag: SequenceTag) -> Result<(), TransportError> {
        if !self.link.is_up() {
            return Err(TransportError::LinkDown);
        }
        let packet =
            Packet::new(tag.pipe, tag.sequence, payload).ok_or(TransportError::PayloadTooLarge)?;
        self.queue
            .try_send(packet)
            .map_err(|_| TransportError::QueueFull)
    }
}

/// Pipes with notifications enabled, for status reports
pub fn subscribed_groups(subscriptions: &Subscriptions) -> impl Iterator<Item = ChannelGroup> + '_ {
    ChannelGroup::ALL
        .into_iter()
        .filter(move |g| subscriptions.is_enabled(g.pipe()))
}

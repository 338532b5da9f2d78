//! Inter-task communication channels
//!
//! Statics shared between the data-ready tasks, the deferred queue consumer
//! and the transport tasks. The data-ready tasks run on a higher priority
//! executor, so everything here uses the critical-section mutex.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::config::*;
use crate::deferred::DeferredQueue;
use crate::led::LedCommand;
use crate::transport::{LinkState, RadioSender, SerialLinkSender, Subscriptions};
use crate::types::Packet;

/// Pending acquisition tasks posted by the data-ready tasks
pub static DEFERRED: DeferredQueue<CriticalSectionRawMutex, DEFERRED_QUEUE_DEPTH> =
    DeferredQueue::new();

/// Batches waiting for the radio co-processor UART
pub static RADIO_CHANNEL: Channel<CriticalSectionRawMutex, Packet, RADIO_QUEUE_DEPTH> =
    Channel::new();

/// Batches waiting for the USB serial link
pub static SERIAL_CHANNEL: Channel<CriticalSectionRawMutex, Packet, SERIAL_QUEUE_DEPTH> =
    Channel::new();

/// LED commands from either link to the LED task
pub static LED_COMMAND_CHANNEL: Channel<CriticalSectionRawMutex, LedCommand, LED_COMMAND_QUEUE_DEPTH> =
    Channel::new();

/// Wireless pipes a central has subscribed to
pub static SUBSCRIPTIONS: Subscriptions = Subscriptions::new();

/// USB serial link connection state
pub static SERIAL_LINK: LinkState = LinkState::new();

pub type RadioLink = RadioSender<'static, CriticalSectionRawMutex, RADIO_QUEUE_DEPTH>;
pub type SerialLink = SerialLinkSender<'static, CriticalSectionRawMutex, SERIAL_QUEUE_DEPTH>;

pub fn radio_link() -> RadioLink {
    RadioSender::new(&RADIO_CHANNEL, &SUBSCRIPTIONS)
}

pub fn serial_link() -> SerialLink {
    SerialLinkSender::new(&SERIAL_CHANNEL, &SERIAL_LINK)
}

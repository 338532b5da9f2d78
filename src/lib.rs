//! Biosense front end - sensor acquisition firmware for RP2040
//!
//! Collects raw frames from a set of sensors, packs them into counter-tagged
//! batches and forwards every batch to a BLE co-processor and a USB serial
//! link. A separate codec maintains the packed grayscale buffer for a chain
//! of TLC5940 LED drivers.
//!
//! ## Architecture
//! - **Data-ready tasks**: high priority interrupt executor, post to the deferred queue only
//! - **Deferred queue**: one consumer on the thread-mode executor runs every bus read
//! - **Pipelines**: one reader + batch accumulator per channel group
//! - **Transports**: bounded channels drained by the radio UART and USB tasks
//! - **Profiles**: compile-time sensor population selected per binary
//!
//! Everything except the hardware wiring builds on the host for unit tests.

#![cfg_attr(not(test), no_std)]

mod fmt;

pub mod accumulator;
pub mod acquisition;
pub mod channels;
pub mod config;
pub mod deferred;
pub mod dispatch;
pub mod led;
pub mod link;
pub mod profile;
pub mod sensors;
pub mod transport;
pub mod types;

#[cfg(target_os = "none")]
pub mod hardware;
#[cfg(target_os = "none")]
pub mod radio;
#[cfg(target_os = "none")]
pub mod supervisor;
#[cfg(target_os = "none")]
pub mod usb;

#[cfg(target_os = "none")]
use embassy_rp::{bind_interrupts, peripherals};

// Interrupt bindings shared by all binaries
#[cfg(target_os = "none")]
bind_interrupts!(pub struct Irqs {
    USBCTRL_IRQ => embassy_rp::usb::InterruptHandler<peripherals::USB>;
    UART0_IRQ => embassy_rp::uart::BufferedInterruptHandler<peripherals::UART0>;
});

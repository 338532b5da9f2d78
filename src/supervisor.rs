//! Application supervisor and monitoring
//!
//! Prints the start-up banner and a periodic health line: uptime, deferred
//! queue counters and transport state.

use embassy_time::{Duration, Timer};

use crate::channels::{DEFERRED, SERIAL_LINK, SUBSCRIPTIONS};
use crate::config::*;
use crate::profile::Profile;
use crate::transport::subscribed_groups;
use crate::types::APP_VERSION;

/// Application supervisor responsible for monitoring and lifecycle management
pub struct AppSupervisor {
    profile: Profile,
    uptime_seconds: u32,
    last_heartbeat: u32,
}

impl AppSupervisor {
    pub fn new(profile: Profile) -> Self {
        Self {
            profile,
            uptime_seconds: 0,
            last_heartbeat: 0,
        }
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// Print application startup banner with the enabled groups
    pub fn print_startup_banner(&self) {
        info!("========================================");
        info!("Biosense front end v{}", APP_VERSION);
        info!("========================================");
        info!("Hardware: RP2040");
        info!("Profile: {}", self.profile.name());
        info!("USB: VID=0x{:04X} PID=0x{:04X}", USB_VID, USB_PID);
        for group in self.profile.groups() {
            let layout = group.layout();
            info!(
                "  pipe {}: {} ({} x {}-byte records -> {} bytes)",
                group.pipe().0,
                group.name(),
                layout.records_per_batch,
                layout.record_size,
                layout.payload_len
            );
        }
        info!("========================================");
    }

    pub fn print_init_success(&self, pipelines: usize) {
        info!("Acquisition running with {} pipelines", pipelines);
        info!("Waiting for radio subscribers and USB host...");
    }

    /// Run the supervisor loop
    pub async fn run(&mut self) {
        info!("Application supervisor started");

        loop {
            Timer::after(Duration::from_secs(STATUS_INTERVAL_SECS)).await;
            self.uptime_seconds += STATUS_INTERVAL_SECS as u32;

            if self.uptime_seconds - self.last_heartbeat >= STATUS_REPORT_SECS {
                self.print_status();
                self.last_heartbeat = self.uptime_seconds;
            }
        }
    }

    fn print_status(&self) {
        let minutes = self.uptime_seconds / 60;
        let hours = minutes / 60;
        let remaining_minutes = minutes % 60;

        if hours > 0 {
            info!("Status: Uptime {}h{}m", hours, remaining_minutes);
        } else {
            info!("Status: Uptime {}m", minutes);
        }

        let queue = DEFERRED.stats();
        info!(
            "Deferred queue: {} queued, {} coalesced, {} overflowed",
            queue.queued,
            queue.coalesced,
            queue.overflowed
        );
        if queue.overflowed > 0 {
            warn!("Deferred queue overflowed; depth below group count?");
        }
        info!(
            "Links: serial {}, {} wireless subscribers",
            if SERIAL_LINK.is_up() { "up" } else { "down" },
            subscribed_groups(&SUBSCRIPTIONS).count()
        );
    }

    pub fn uptime(&self) -> u32 {
        self.uptime_seconds
    }
}

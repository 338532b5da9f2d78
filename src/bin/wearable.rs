//! Biosense front end - wearable build
//!
//! Full sensor population:
//! - 2x ADS131M08 (16 precision channels)
//! - MAX30102 pulse, MPU6050 inertial, QMC5883L magnetometer, BME280 barometer
//! - BLE co-processor on UART0, USB CDC-ACM serial link

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use panic_halt as _;
use defmt_rtt as _;

use biosense_frontend::profile::Profile;
use biosense_frontend::{hardware, supervisor};

// Compile-time profile selection
const PROFILE: Profile = Profile::Wearable;

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_rp::init(Default::default());

    let mut supervisor = supervisor::AppSupervisor::new(PROFILE);
    supervisor.print_startup_banner();

    // Only returns on a spawn or pipeline configuration error
    if let Err(e) = hardware::run(spawner, p, PROFILE, &mut supervisor).await {
        error!("Hardware initialization failed: {:?}", e);
        core::panic!("Hardware initialization failed");
    }
}

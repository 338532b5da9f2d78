//! Biosense front end - dual ADC build
//!
//! Both ADS131M08 converters only; the I2C sensor bus is not brought up.

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use panic_halt as _;
use defmt_rtt as _;

use biosense_frontend::profile::Profile;
use biosense_frontend::{hardware, supervisor};

const PROFILE: Profile = Profile::DualAdc;

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_rp::init(Default::default());

    let mut supervisor = supervisor::AppSupervisor::new(PROFILE);
    supervisor.print_startup_banner();

    if let Err(e) = hardware::run(spawner, p, PROFILE, &mut supervisor).await {
        error!("Hardware initialization failed: {:?}", e);
        core::panic!("Hardware initialization failed");
    }
}

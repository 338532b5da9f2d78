//! Hardware initialization and task wiring
//!
//! Brings up the buses for the selected profile, registers one pipeline per
//! enabled channel group and spawns the transport tasks. Data-ready edges are
//! watched on a higher priority interrupt executor whose tasks only post to
//! the deferred queue; every bus transaction happens on the thread-mode
//! executor that runs the queue consumer.

use core::cell::RefCell;
use core::convert::Infallible;

use embassy_executor::{InterruptExecutor, SpawnError, Spawner};
use embassy_futures::join::join;
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::i2c::{self, I2c};
use embassy_rp::interrupt;
use embassy_rp::interrupt::{InterruptExt, Priority};
use embassy_rp::spi::{self, Phase, Polarity, Spi};
use embassy_rp::uart::{self, BufferedUart};
use embassy_rp::usb::Driver;
use embassy_rp::Peripherals;
use embassy_time::{Duration, Ticker, Timer};
use embedded_hal_bus::i2c::RefCellDevice;
use embedded_hal_bus::spi::ExclusiveDevice;
use static_cell::StaticCell;

use crate::accumulator::ConfigError;
use crate::acquisition::{FrameReader, Registry};
use crate::channels::{self, DEFERRED, LED_COMMAND_CHANNEL, SERIAL_LINK};
use crate::config::*;
use crate::deferred::{self, Submission};
use crate::dispatch::DualDispatcher;
use crate::led::{self, GrayscaleFrame};
use crate::profile::Profile;
use crate::radio::{radio_rx_task, radio_tx_task};
use crate::sensors::{Ads131m08, I2cBurstReader};
use crate::supervisor::AppSupervisor;
use crate::types::ChannelGroup;
use crate::usb::serial_link_task;

static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();

#[interrupt]
unsafe fn SWI_IRQ_1() {
    EXECUTOR_HIGH.on_interrupt()
}

/// Edge that signals new data on a sensor's ready line
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReadyEdge {
    Falling,
    Rising,
}

/// TLC5940 control lines, held in their idle state.
///
/// BLANK stays high so all outputs remain off; the shift-out and grayscale
/// clocking are not driven from this firmware.
pub struct Tlc5940Pins {
    pub gsclk: Output<'static>,
    pub xlat: Output<'static>,
    pub blank: Output<'static>,
    pub sin: Output<'static>,
    pub sclk: Output<'static>,
}

impl Tlc5940Pins {
    pub fn park(&mut self) {
        self.gsclk.set_low();
        self.xlat.set_low();
        self.blank.set_high();
        self.sin.set_low();
        self.sclk.set_low();
    }
}

/// Start-up failure; the binaries halt on it
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitError {
    Spawn(SpawnError),
    Config(ConfigError),
}

impl From<SpawnError> for InitError {
    fn from(e: SpawnError) -> Self {
        InitError::Spawn(e)
    }
}

impl From<ConfigError> for InitError {
    fn from(e: ConfigError) -> Self {
        InitError::Config(e)
    }
}

fn infallible<T>(result: Result<T, Infallible>) -> T {
    match result {
        Ok(value) => value,
        Err(never) => match never {},
    }
}

/// ADS131M08 bus settings: SPI mode 1
fn ads_spi_config() -> spi::Config {
    let mut config = spi::Config::default();
    config.frequency = ADS_SPI_FREQUENCY_HZ;
    config.phase = Phase::CaptureOnSecondTransition;
    config.polarity = Polarity::IdleLow;
    config
}

fn log_pin_map(profile: Profile) {
    info!(
        "ADC A: SPI0 SCK={} MOSI={} MISO={} CS={} DRDY={} RESET={}",
        ADS_A_SCK_PIN,
        ADS_A_MOSI_PIN,
        ADS_A_MISO_PIN,
        ADS_A_CS_PIN,
        ADS_A_DRDY_PIN,
        ADS_A_RESET_PIN
    );
    info!(
        "ADC B: SPI1 SCK={} MOSI={} MISO={} CS={} DRDY={} RESET={}",
        ADS_B_SCK_PIN,
        ADS_B_MOSI_PIN,
        ADS_B_MISO_PIN,
        ADS_B_CS_PIN,
        ADS_B_DRDY_PIN,
        ADS_B_RESET_PIN
    );
    if profile.uses_i2c() {
        info!(
            "I2C0: SDA={} SCL={} @ {} Hz, INT MAX30102={} MPU6050={} QMC5883L={}",
            I2C_SDA_PIN,
            I2C_SCL_PIN,
            I2C_FREQUENCY_HZ,
            MAX30102_INT_PIN,
            MPU6050_INT_PIN,
            QMC5883L_DRDY_PIN
        );
    }
    info!("Radio UART0: TX={} RX={} @ {} baud", RADIO_TX_PIN, RADIO_RX_PIN, RADIO_UART_BAUDRATE);
    info!(
        "TLC5940 x{}: GSCLK={} XLAT={} BLANK={} SIN={} SCLK={}",
        LED_DRIVER_COUNT,
        TLC_GSCLK_PIN,
        TLC_XLAT_PIN,
        TLC_BLANK_PIN,
        TLC_SIN_PIN,
        TLC_SCLK_PIN
    );
}

/// Initialize the board for `profile` and run the acquisition pipeline.
/// Only returns if a task could not be spawned or a pipeline was rejected.
pub async fn run(
    spawner: Spawner,
    p: Peripherals,
    profile: Profile,
    supervisor: &mut AppSupervisor,
) -> Result<Infallible, InitError> {
    log_pin_map(profile);

    interrupt::SWI_IRQ_1.set_priority(Priority::P2);
    let isr_spawner = EXECUTOR_HIGH.start(interrupt::SWI_IRQ_1);

    // Transports
    let driver = Driver::new(p.USB, crate::Irqs);
    spawner.spawn(serial_link_task(driver, profile.usb_product()))?;

    // RX ring is filled from the UART interrupt, not by the executor
    static RADIO_TX_BUF: StaticCell<[u8; RADIO_TX_BUFFER_LEN]> = StaticCell::new();
    static RADIO_RX_BUF: StaticCell<[u8; RADIO_RX_BUFFER_LEN]> = StaticCell::new();
    let mut uart_config = uart::Config::default();
    uart_config.baudrate = RADIO_UART_BAUDRATE;
    let radio = BufferedUart::new(
        p.UART0,
        p.PIN_0,
        p.PIN_1,
        crate::Irqs,
        RADIO_TX_BUF.init([0; RADIO_TX_BUFFER_LEN]),
        RADIO_RX_BUF.init([0; RADIO_RX_BUFFER_LEN]),
        uart_config,
    );
    let (radio_tx, radio_rx) = radio.split();
    spawner.spawn(radio_tx_task(radio_tx))?;
    spawner.spawn(radio_rx_task(radio_rx))?;

    // LED bank
    let mut tlc = Tlc5940Pins {
        gsclk: Output::new(p.PIN_2, Level::Low),
        xlat: Output::new(p.PIN_3, Level::Low),
        blank: Output::new(p.PIN_9, Level::High),
        sin: Output::new(p.PIN_22, Level::Low),
        sclk: Output::new(p.PIN_26, Level::Low),
    };
    tlc.park();
    spawner.spawn(led_task(tlc))?;
    spawner.spawn(status_task(Output::new(p.PIN_25, Level::Low)))?;

    let _adc_a_reset = Output::new(p.PIN_21, Level::High);
    let _adc_b_reset = Output::new(p.PIN_15, Level::High);
    // power-on reset of the converters
    Timer::after(Duration::from_millis(5)).await;

    let spi0 = Spi::new_blocking(p.SPI0, p.PIN_18, p.PIN_19, p.PIN_16, ads_spi_config());
    let spi1 = Spi::new_blocking(p.SPI1, p.PIN_10, p.PIN_11, p.PIN_12, ads_spi_config());
    let mut adc_a = Ads131m08::new(
        infallible(ExclusiveDevice::new_no_delay(spi0, Output::new(p.PIN_17, Level::High))),
        ChannelGroup::AdcA,
    );
    let mut adc_b = Ads131m08::new(
        infallible(ExclusiveDevice::new_no_delay(spi1, Output::new(p.PIN_13, Level::High))),
        ChannelGroup::AdcB,
    );

    // Shared I2C sensor bus
    let i2c_bus = profile.uses_i2c().then(|| {
        let mut config = i2c::Config::default();
        config.frequency = I2C_FREQUENCY_HZ;
        RefCell::new(I2c::new_blocking(p.I2C0, p.PIN_5, p.PIN_4, config))
    });
    let mut pulse = i2c_bus
        .as_ref()
        .filter(|_| profile.includes(ChannelGroup::Pulse))
        .map(|bus| I2cBurstReader::max30102(RefCellDevice::new(bus)));
    let mut inertial = i2c_bus
        .as_ref()
        .filter(|_| profile.includes(ChannelGroup::Inertial))
        .map(|bus| I2cBurstReader::mpu6050(RefCellDevice::new(bus)));
    let mut magnetometer = i2c_bus
        .as_ref()
        .filter(|_| profile.includes(ChannelGroup::Magnetometer))
        .map(|bus| I2cBurstReader::qmc5883l(RefCellDevice::new(bus)));
    let mut barometer = i2c_bus
        .as_ref()
        .filter(|_| profile.includes(ChannelGroup::Barometer))
        .map(|bus| I2cBurstReader::bme280(RefCellDevice::new(bus)));

    let mut registry: Registry<&mut dyn FrameReader> = Registry::new();
    let readers: [Option<&mut dyn FrameReader>; 6] = [
        Some(&mut adc_a),
        Some(&mut adc_b),
        pulse.as_mut().map(|r| r as &mut dyn FrameReader),
        inertial.as_mut().map(|r| r as &mut dyn FrameReader),
        magnetometer.as_mut().map(|r| r as &mut dyn FrameReader),
        barometer.as_mut().map(|r| r as &mut dyn FrameReader),
    ];
    // before any data-ready source is started
    registry.register_profile(profile, readers.into_iter().flatten())?;

    // Data-ready sources, high priority
    isr_spawner.spawn(data_ready_task(
        Input::new(p.PIN_20, Pull::Up),
        ChannelGroup::AdcA,
        ReadyEdge::Falling,
    ))?;
    isr_spawner.spawn(data_ready_task(
        Input::new(p.PIN_14, Pull::Up),
        ChannelGroup::AdcB,
        ReadyEdge::Falling,
    ))?;
    if profile.includes(ChannelGroup::Pulse) {
        isr_spawner.spawn(data_ready_task(
            Input::new(p.PIN_6, Pull::Up),
            ChannelGroup::Pulse,
            ReadyEdge::Falling,
        ))?;
    }
    if profile.includes(ChannelGroup::Inertial) {
        isr_spawner.spawn(data_ready_task(
            Input::new(p.PIN_7, Pull::Up),
            ChannelGroup::Inertial,
            ReadyEdge::Falling,
        ))?;
    }
    if profile.includes(ChannelGroup::Magnetometer) {
        isr_spawner.spawn(data_ready_task(
            Input::new(p.PIN_8, Pull::Down),
            ChannelGroup::Magnetometer,
            ReadyEdge::Rising,
        ))?;
    }
    if profile.includes(ChannelGroup::Barometer) {
        isr_spawner.spawn(sample_timer_task(ChannelGroup::Barometer))?;
    }

    supervisor.print_init_success(registry.len());

    let mut dispatcher = DualDispatcher::new(channels::radio_link(), channels::serial_link());
    let (never, ()) = join(
        deferred::run(&DEFERRED, &mut registry, &mut dispatcher),
        supervisor.run(),
    )
    .await;
    match never {}
}

fn post(group: ChannelGroup) {
    if DEFERRED.submit(group) == Submission::Overflow {
        error!("{}: deferred queue overflow", group);
    }
}

/// Watches one data-ready line and posts an acquisition task per edge
#[embassy_executor::task(pool_size = 5)]
async fn data_ready_task(mut pin: Input<'static>, group: ChannelGroup, edge: ReadyEdge) {
    debug!("{}: waiting for {:?} edges", group, edge);
    loop {
        match edge {
            ReadyEdge::Falling => pin.wait_for_falling_edge().await,
            ReadyEdge::Rising => pin.wait_for_rising_edge().await,
        }
        post(group);
    }
}

/// Periodic source for sensors without a ready line
#[embassy_executor::task]
async fn sample_timer_task(group: ChannelGroup) {
    let mut ticker = Ticker::every(Duration::from_millis(BARO_SAMPLE_PERIOD_MS));
    loop {
        ticker.next().await;
        post(group);
    }
}

type LedFrame = GrayscaleFrame<{ led::frame_len(LED_DRIVER_COUNT) }>;

/// Owns the grayscale buffer and applies incoming LED commands
#[embassy_executor::task]
async fn led_task(mut pins: Tlc5940Pins) {
    let mut frame = LedFrame::new();
    info!(
        "LED task started: {} drivers, {} channels",
        frame.drivers(),
        frame.channels()
    );

    loop {
        let command = LED_COMMAND_CHANNEL.receive().await;
        match command.apply(&mut frame) {
            Ok(()) => debug!("LED {:?} applied", command),
            Err(e) => warn!("LED {:?} rejected: {:?}", command, e),
        }
        // outputs stay blanked until the shift-out timing is settled
        pins.park();
        trace!("LED frame: {=[u8]:x}", frame.serialize_for_output());
    }
}

/// Status LED: short blink, doubled while the serial link is up
#[embassy_executor::task]
async fn status_task(mut status_led: Output<'static>) {
    info!("Status LED task started");

    loop {
        status_led.set_high();
        Timer::after(Duration::from_millis(100)).await;
        status_led.set_low();
        if SERIAL_LINK.is_up() {
            Timer::after(Duration::from_millis(100)).await;
            status_led.set_high();
            Timer::after(Duration::from_millis(100)).await;
            status_led.set_low();
            Timer::after(Duration::from_millis(700)).await;
        } else {
            Timer::after(Duration::from_millis(900)).await;
        }
    }
}

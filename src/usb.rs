//! USB CDC-ACM serial link
//!
//! Mirrors every batch to the host PC as link frames of kind `SerialBatch`.
//! In the other direction it accepts the same command frames as the radio
//! link. Batches are only queued while the host holds the port open.

use embassy_futures::join::join3;
use embassy_rp::peripherals;
use embassy_rp::usb::Driver;
use embassy_usb::class::cdc_acm::{CdcAcmClass, Receiver, Sender, State};
use embassy_usb::driver::EndpointError;
use embassy_usb::{Builder, Config};
use static_cell::StaticCell;

use crate::channels::{self, LED_COMMAND_CHANNEL, SERIAL_CHANNEL, SUBSCRIPTIONS};
use crate::config::*;
use crate::link::{self, FrameDecoder, FrameKind};

type UsbDriver = Driver<'static, peripherals::USB>;

// ===================================================================
// USB Configuration
// ===================================================================

fn create_usb_config(product: &'static str) -> Config<'static> {
    let mut config = Config::new(USB_VID, USB_PID);
    config.manufacturer = Some(USB_MANUFACTURER);
    config.product = Some(product);
    config.serial_number = Some(USB_SERIAL);
    config.max_power = 100;
    config.max_packet_size_0 = USB_MAX_PACKET_SIZE as u8;

    // IAD required for CDC-ACM on Windows
    config.device_class = 0xEF;
    config.device_sub_class = 0x02;
    config.device_protocol = 0x01;
    config.composite_with_iads = true;

    config
}

// ===================================================================
// USB Task Implementation
// ===================================================================

#[embassy_executor::task]
pub async fn serial_link_task(driver: UsbDriver, product: &'static str) {
    info!("USB serial link task started");

    static CONFIG_DESC_BUF: StaticCell<[u8; 256]> = StaticCell::new();
    static BOS_DESC_BUF: StaticCell<[u8; 256]> = StaticCell::new();
    static MSOS_DESC_BUF: StaticCell<[u8; 64]> = StaticCell::new();
    static CONTROL_BUF: StaticCell<[u8; 64]> = StaticCell::new();
    static CDC_STATE: StaticCell<State> = StaticCell::new();

    let mut builder = Builder::new(
        driver,
        create_usb_config(product),
        CONFIG_DESC_BUF.init([0; 256]),
        BOS_DESC_BUF.init([0; 256]),
        MSOS_DESC_BUF.init([0; 64]),
        CONTROL_BUF.init([0; 64]),
    );
    let class = CdcAcmClass::new(&mut builder, CDC_STATE.init(State::new()), USB_MAX_PACKET_SIZE);
    let mut usb = builder.build();
    let (mut sender, mut receiver) = class.split();

    let session = channels::serial_link();
    let tx_fut = async {
        loop {
            sender.wait_connection().await;
            session.open_session();
            info!("USB serial link connected");
            if let Err(e) = forward_batches(&mut sender).await {
                debug!("USB write stopped: {:?}", e);
            }
            session.close_session();
            info!("USB serial link disconnected");
        }
    };

    let rx_fut = async {
        let mut decoder = FrameDecoder::new();
        loop {
            receiver.wait_connection().await;
            if let Err(e) = receive_commands(&mut receiver, &mut decoder).await {
                debug!("USB read stopped: {:?}", e);
            }
        }
    };

    join3(usb.run(), tx_fut, rx_fut).await;
}

/// Write queued batches until the endpoint goes away or the host drops DTR
async fn forward_batches(sender: &mut Sender<'static, UsbDriver>) -> Result<(), EndpointError> {
    let max_packet = USB_MAX_PACKET_SIZE as usize;
    loop {
        let packet = SERIAL_CHANNEL.receive().await;
        // port closed while we were waiting; the batch belongs to no session
        if !sender.dtr() {
            return Ok(());
        }
        let frame = match link::encode_packet(FrameKind::SerialBatch, &packet) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Cannot frame serial batch: {:?}", e);
                continue;
            }
        };
        for chunk in frame.chunks(max_packet) {
            sender.write_packet(chunk).await?;
        }
        // a full-size last packet needs a ZLP to end the transfer
        if frame.len() % max_packet == 0 {
            sender.write_packet(&[]).await?;
        }
    }
}

async fn receive_commands(
    receiver: &mut Receiver<'static, UsbDriver>,
    decoder: &mut FrameDecoder,
) -> Result<(), EndpointError> {
    let mut buf = [0u8; USB_MAX_PACKET_SIZE as usize];
    loop {
        let n = receiver.read_packet(&mut buf).await?;
        decoder.feed(&buf[..n], |frame| {
            match link::route_inbound(&frame, &SUBSCRIPTIONS, &LED_COMMAND_CHANNEL) {
                Ok(event) => debug!("USB command: {:?}", event),
                Err(e) => warn!("USB frame rejected: {:?}", e),
            }
        });
    }
}

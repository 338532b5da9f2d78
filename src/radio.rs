//! UART link to the BLE co-processor
//!
//! The co-processor owns the GATT service. It receives one `Notification`
//! frame per batch and reports subscription changes and LED control writes
//! back as link frames.

use embassy_rp::uart::{BufferedUartRx, BufferedUartTx};
use embedded_io_async::{Read, Write};

use crate::channels::{LED_COMMAND_CHANNEL, RADIO_CHANNEL, SUBSCRIPTIONS};
use crate::config::RADIO_RX_BUFFER_LEN;
use crate::link::{self, FrameDecoder, FrameKind};

#[embassy_executor::task]
pub async fn radio_tx_task(mut tx: BufferedUartTx) {
    info!("Radio TX task started");

    loop {
        let packet = RADIO_CHANNEL.receive().await;
        let frame = match link::encode_packet(FrameKind::Notification, &packet) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Cannot frame notification: {:?}", e);
                continue;
            }
        };
        if let Err(e) = tx.write_all(&frame).await {
            warn!("Radio UART write failed: {:?}", e);
        }
    }
}

#[embassy_executor::task]
pub async fn radio_rx_task(mut rx: BufferedUartRx) {
    info!("Radio RX task started");

    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; RADIO_RX_BUFFER_LEN];
    loop {
        let n = match rx.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                // framing/overrun: drop the partial frame, the decoder resyncs
                warn!("Radio UART read failed: {:?}", e);
                decoder = FrameDecoder::new();
                continue;
            }
        };
        decoder.feed(&buf[..n], |frame| {
            match link::route_inbound(&frame, &SUBSCRIPTIONS, &LED_COMMAND_CHANNEL) {
                Ok(event) => debug!("Radio event: {:?}", event),
                Err(e) => warn!("Radio frame rejected: {:?}", e),
            }
        });
    }
}

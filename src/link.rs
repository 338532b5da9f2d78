//! Byte framing shared by the radio co-processor UART and the USB serial link
//!
//! ```text
//! [0xA5, kind, pipe, sequence, len, payload[len], crc-lo, crc-hi]
//! ```
//!
//! The CRC is CRC-16/CCITT-FALSE over everything after the sync byte.

use core::fmt;

use crc16::{State, CCITT_FALSE};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;
use heapless::Vec;

use crate::config::BLE_MAX_NOTIFY_LEN;
use crate::led::{LedCommand, LedError};
use crate::transport::Subscriptions;
use crate::types::{Packet, PipeId};

pub const SYNC: u8 = 0xA5;
pub const HEADER_LEN: usize = 5;
pub const CRC_LEN: usize = 2;
pub const MAX_PAYLOAD_LEN: usize = BLE_MAX_NOTIFY_LEN;
pub const MAX_FRAME_LEN: usize = HEADER_LEN + MAX_PAYLOAD_LEN + CRC_LEN;

pub type FrameBuf = Vec<u8, MAX_FRAME_LEN>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FrameKind {
    /// Batch to notify on a wireless pipe (host -> radio)
    Notification = 0x10,
    /// Batch mirrored on the wired link (host -> PC)
    SerialBatch = 0x11,
    /// Central changed notification state on a pipe (radio -> host)
    Subscription = 0x20,
    /// LED control command (radio or PC -> host)
    LedCommand = 0x30,
}

impl FrameKind {
    pub fn from_u8(kind: u8) -> Option<Self> {
        match kind {
            0x10 => Some(FrameKind::Notification),
            0x11 => Some(FrameKind::SerialBatch),
            0x20 => Some(FrameKind::Subscription),
            0x30 => Some(FrameKind::LedCommand),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    PayloadTooLarge(usize),
    BadLength(usize),
    BadCrc { expected: u16, got: u16 },
    UnknownKind(u8),
    /// Well-formed frame that this side never accepts
    UnexpectedKind(FrameKind),
    BadPayload,
    Led(LedError),
    /// Consumer queue full, command dropped
    Busy,
}

impl From<LedError> for LinkError {
    fn from(e: LedError) -> Self {
        LinkError::Led(e)
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::PayloadTooLarge(len) => write!(f, "payload of {len} bytes too large"),
            LinkError::BadLength(len) => write!(f, "bad length field {len}"),
            LinkError::BadCrc { expected, got } => {
                write!(f, "CRC mismatch: {expected:04X} vs {got:04X}")
            }
            LinkError::UnknownKind(kind) => write!(f, "unknown frame kind {kind:#04x}"),
            LinkError::UnexpectedKind(kind) => write!(f, "unexpected frame kind {kind:?}"),
            LinkError::BadPayload => f.write_str("malformed payload"),
            LinkError::Led(e) => write!(f, "{e}"),
            LinkError::Busy => f.write_str("command queue full"),
        }
    }
}

/// Build one frame
pub fn encode(kind: FrameKind, pipe: PipeId, sequence: u8, payload: &[u8]) -> Result<FrameBuf, LinkError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(LinkError::PayloadTooLarge(payload.len()));
    }
    let mut frame = FrameBuf::new();
    // capacity covers header, payload and CRC, so pushes below cannot fail
    let _ = frame.extend_from_slice(&[SYNC, kind as u8, pipe.0, sequence, payload.len() as u8]);
    let _ = frame.extend_from_slice(payload);
    let crc = State::<CCITT_FALSE>::calculate(&frame[1..]);
    let _ = frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

pub fn encode_packet(kind: FrameKind, packet: &Packet) -> Result<FrameBuf, LinkError> {
    encode(kind, packet.pipe, packet.sequence, &packet.payload)
}

/// Decoded frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub kind: FrameKind,
    pub pipe: PipeId,
    pub sequence: u8,
    pub payload: Vec<u8, MAX_PAYLOAD_LEN>,
}

/// Something the host must act on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InboundEvent {
    Subscription { pipe: PipeId, enabled: bool },
    Led(LedCommand),
}

impl Frame {
    fn parse(bytes: &[u8]) -> Result<Self, LinkError> {
        let body_end = bytes.len() - CRC_LEN;
        let expected = State::<CCITT_FALSE>::calculate(&bytes[1..body_end]);
        let got = u16::from_le_bytes([bytes[body_end], bytes[body_end + 1]]);
        if expected != got {
            return Err(LinkError::BadCrc { expected, got });
        }
        let kind = FrameKind::from_u8(bytes[1]).ok_or(LinkError::UnknownKind(bytes[1]))?;
        let payload =
            Vec::from_slice(&bytes[HEADER_LEN..body_end]).map_err(|_| LinkError::BadLength(body_end))?;
        Ok(Self {
            kind,
            pipe: PipeId(bytes[2]),
            sequence: bytes[3],
            payload,
        })
    }

    /// Interpret a frame received by the acquisition host
    pub fn event(&self) -> Result<InboundEvent, LinkError> {
        match self.kind {
            FrameKind::Subscription => match self.payload.as_slice() {
                [enabled] => Ok(InboundEvent::Subscription {
                    pipe: self.pipe,
                    enabled: *enabled != 0,
                }),
                _ => Err(LinkError::BadPayload),
            },
            FrameKind::LedCommand => Ok(InboundEvent::Led(LedCommand::parse(&self.payload)?)),
            kind => Err(LinkError::UnexpectedKind(kind)),
        }
    }
}

/// Apply a received frame: subscription changes update `subscriptions`,
/// LED commands are queued for the LED task.
pub fn route_inbound<M: RawMutex, const N: usize>(
    frame: &Frame,
    subscriptions: &Subscriptions,
    led_commands: &Channel<M, LedCommand, N>,
) -> Result<InboundEvent, LinkError> {
    let event = frame.event()?;
    match event {
        InboundEvent::Subscription { pipe, enabled } => subscriptions.set(pipe, enabled),
        InboundEvent::Led(command) => led_commands
            .try_send(command)
            .map_err(|_| LinkError::Busy)?,
    }
    Ok(event)
}

/// Streaming frame decoder. Garbage and corrupted frames are skipped by
/// resynchronising on the next sync byte.
pub struct FrameDecoder {
    buf: FrameBuf,
    errors: u32,
}

impl FrameDecoder {
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            errors: 0,
        }
    }

    /// Frames dropped for bad length, CRC or kind
    pub fn errors(&self) -> u32 {
        self.errors
    }

    pub fn push(&mut self, byte: u8) -> Option<Frame> {
        if self.buf.is_empty() && byte != SYNC {
            return None;
        }
        if self.buf.push(byte).is_err() {
            self.reject(LinkError::BadLength(self.buf.len()));
        }
        self.scan()
    }

    /// Feed a chunk, calling `on_frame` for every complete frame
    pub fn feed(&mut self, bytes: &[u8], mut on_frame: impl FnMut(Frame)) {
        for &byte in bytes {
            if let Some(frame) = self.push(byte) {
                on_frame(frame);
            }
        }
    }

    fn scan(&mut self) -> Option<Frame> {
        loop {
            if self.buf.len() < HEADER_LEN {
                return None;
            }
            let len = self.buf[4] as usize;
            if len > MAX_PAYLOAD_LEN {
                self.reject(LinkError::BadLength(len));
                continue;
            }
            let total = HEADER_LEN + len + CRC_LEN;
            if self.buf.len() < total {
                return None;
            }
            match Frame::parse(&self.buf[..total]) {
                Ok(frame) => {
                    self.discard(total);
                    return Some(frame);
                }
                Err(e) => self.reject(e),
            }
        }
    }

    fn reject(&mut self, e: LinkError) {
        debug!("Link frame dropped: {:?}", e);
        self.errors = self.errors.wrapping_add(1);
        self.discard(1);
    }

    /// Drop `n` bytes, then anything before the next sync byte
    fn discard(&mut self, n: usize) {
        let n = n.min(self.buf.len());
        let skip = self.buf[n..]
            .iter()
            .position(|&b| b == SYNC)
            .map_or(self.buf.len(), |p| n + p);
        let keep = self.buf.len() - skip;
        self.buf.copy_within(skip.., 0);
        self.buf.truncate(keep);
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(decoder: &mut FrameDecoder, bytes: &[u8]) -> std::vec::Vec<Frame> {
        let mut frames = std::vec::Vec::new();
        decoder.feed(bytes, |f| frames.push(f));
        frames
    }

    #[test]
    fn frame_layout_and_crc() {
        let frame = encode(FrameKind::Subscription, PipeId(3), 0, &[1]).unwrap();
        assert_eq!(&frame[..6], &[SYNC, 0x20, 3, 0, 1, 1]);
        let crc = State::<CCITT_FALSE>::calculate(&frame[1..6]);
        assert_eq!(&frame[6..], &crc.to_le_bytes());

        let mut decoder = FrameDecoder::new();
        let frames = decode_all(&mut decoder, &frame);
        assert_eq!(
            frames[0].event(),
            Ok(InboundEvent::Subscription { pipe: PipeId(3), enabled: true })
        );
    }

    #[test]
    fn full_size_batch_survives_the_link() {
        let payload = [0x5Au8; MAX_PAYLOAD_LEN];
        let packet = Packet::new(PipeId(0), 200, &payload).unwrap();
        let bytes = encode_packet(FrameKind::Notification, &packet).unwrap();
        assert_eq!(bytes.len(), MAX_FRAME_LEN);

        let mut decoder = FrameDecoder::new();
        let frames = decode_all(&mut decoder, &bytes);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].sequence, 200);
        assert_eq!(frames[0].payload.as_slice(), &payload[..]);
        assert_eq!(
            encode(FrameKind::Notification, PipeId(0), 0, &[0; MAX_PAYLOAD_LEN + 1]),
            Err(LinkError::PayloadTooLarge(MAX_PAYLOAD_LEN + 1))
        );
    }

    #[test]
    fn decoder_resyncs_after_garbage_and_corruption() {
        let good = encode(FrameKind::LedCommand, PipeId(0), 1, &[0x03]).unwrap();
        let mut corrupt = encode(FrameKind::LedCommand, PipeId(0), 2, &[0x02, 0x0F, 0xFF]).unwrap();
        corrupt[6] ^= 0xFF;

        let mut stream = std::vec::Vec::new();
        stream.extend_from_slice(&[0x00, 0x13, SYNC, 0x99]);
        stream.extend_from_slice(&corrupt);
        stream.extend_from_slice(&good);

        let mut decoder = FrameDecoder::new();
        let frames = decode_all(&mut decoder, &stream);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].sequence, 1);
        assert_eq!(frames[0].event(), Ok(InboundEvent::Led(LedCommand::Clear)));
        assert!(decoder.errors() >= 1);
    }

    #[test]
    fn frames_split_across_uart_reads_are_reassembled() {
        let mut stream = std::vec::Vec::new();
        stream.extend_from_slice(&encode(FrameKind::Subscription, PipeId(2), 0, &[1]).unwrap());
        stream.extend_from_slice(&encode(FrameKind::LedCommand, PipeId(0), 1, &[0x01, 3, 0x0A, 0xBC]).unwrap());
        stream.extend_from_slice(&encode(FrameKind::Subscription, PipeId(2), 2, &[0]).unwrap());

        for chunk_len in [1, 3, 7, 32] {
            let mut decoder = FrameDecoder::new();
            let mut frames = std::vec::Vec::new();
            for chunk in stream.chunks(chunk_len) {
                frames.extend(decode_all(&mut decoder, chunk));
            }
            let sequences: std::vec::Vec<_> = frames.iter().map(|f| f.sequence).collect();
            assert_eq!(sequences, [0, 1, 2], "chunks of {chunk_len}");
            assert_eq!(
                frames[1].event(),
                Ok(InboundEvent::Led(LedCommand::Set { channel: 3, value: 0xABC }))
            );
            assert_eq!(decoder.errors(), 0);
        }
    }

    #[test]
    fn frame_hidden_behind_false_sync_is_found() {
        let good = encode(FrameKind::Subscription, PipeId(1), 0, &[0]).unwrap();
        // false header claims 4 payload bytes and overlaps the real frame
        let mut stream = std::vec::Vec::from([SYNC, 0x10, 0, 0, 4]);
        stream.extend_from_slice(&good);

        let mut decoder = FrameDecoder::new();
        let frames = decode_all(&mut decoder, &stream);
        assert_eq!(frames.len(), 1);
        assert_eq!(
            frames[0].event(),
            Ok(InboundEvent::Subscription { pipe: PipeId(1), enabled: false })
        );
    }

    #[test]
    fn inbound_frames_reach_subscriptions_and_led_queue() {
        use embassy_sync::blocking_mutex::raw::NoopRawMutex;

        let subs = Subscriptions::new();
        let leds: Channel<NoopRawMutex, LedCommand, 1> = Channel::new();
        let mut decoder = FrameDecoder::new();
        let mut stream = std::vec::Vec::new();
        stream.extend_from_slice(&encode(FrameKind::Subscription, PipeId(4), 0, &[1]).unwrap());
        stream.extend_from_slice(&encode(FrameKind::LedCommand, PipeId(0), 0, &[0x01, 2, 0, 9]).unwrap());
        stream.extend_from_slice(&encode(FrameKind::LedCommand, PipeId(0), 1, &[0x03]).unwrap());

        let results: std::vec::Vec<_> = decode_all(&mut decoder, &stream)
            .iter()
            .map(|f| route_inbound(f, &subs, &leds))
            .collect();

        assert!(subs.is_enabled(PipeId(4)));
        assert_eq!(leds.try_receive(), Ok(LedCommand::Set { channel: 2, value: 9 }));
        assert_eq!(results[2], Err(LinkError::Busy));
    }

    #[test]
    fn host_rejects_outbound_kinds_and_bad_payloads() {
        let mut decoder = FrameDecoder::new();
        let notification = encode(FrameKind::Notification, PipeId(0), 0, &[1, 2]).unwrap();
        let bad_led = encode(FrameKind::LedCommand, PipeId(0), 0, &[0x01, 2]).unwrap();
        let bad_sub = encode(FrameKind::Subscription, PipeId(0), 0, &[]).unwrap();

        let frames: std::vec::Vec<_> = [notification, bad_led, bad_sub]
            .iter()
            .flat_map(|bytes| decode_all(&mut decoder, bytes))
            .collect();
        assert_eq!(
            frames[0].event(),
            Err(LinkError::UnexpectedKind(FrameKind::Notification))
        );
        assert_eq!(frames[1].event(), Err(LinkError::Led(LedError::BadCommand)));
        assert_eq!(frames[2].event(), Err(LinkError::BadPayload));
    }
}

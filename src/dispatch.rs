//! Dual-transport dispatch of completed batches
//!
//! Every full batch goes to the wireless notification sender and to the
//! serial-link sender. The two sends are independent and fire-and-forget:
//! a failure on one transport is logged and counted, never retried, and
//! never keeps the other transport from getting the batch.

use crate::transport::{SerialSender, TransportError, WirelessSender};
use crate::types::{ChannelGroup, SequenceTag};

/// What happened to one batch on each transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DispatchReport {
    pub wireless: Result<(), TransportError>,
    pub serial: Result<(), TransportError>,
}

/// Hands a completed batch to the output transports
pub trait Dispatch {
    fn dispatch(&mut self, group: ChannelGroup, payload: &[u8], sequence: u8) -> DispatchReport;
}

/// Per-transport delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DispatchStats {
    pub wireless_sent: u32,
    pub wireless_dropped: u32,
    pub serial_sent: u32,
    pub serial_dropped: u32,
}

/// Wireless + serial dispatcher
pub struct DualDispatcher<W, S> {
    wireless: W,
    serial: S,
    stats: DispatchStats,
}

impl<W: WirelessSender, S: SerialSender> DualDispatcher<W, S> {
    pub fn new(wireless: W, serial: S) -> Self {
        Self {
            wireless,
            serial,
            stats: DispatchStats::default(),
        }
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn wireless(&self) -> &W {
        &self.wireless
    }

    pub fn serial(&self) -> &S {
        &self.serial
    }
}

impl<W: WirelessSender, S: SerialSender> Dispatch for DualDispatcher<W, S> {
    fn dispatch(&mut self, group: ChannelGroup, payload: &[u8], sequence: u8) -> DispatchReport {
        let pipe = group.pipe();

        let wireless = self.wireless.notify(pipe, payload);
        match wireless {
            Ok(()) => self.stats.wireless_sent = self.stats.wireless_sent.wrapping_add(1),
            Err(e) => {
                self.stats.wireless_dropped = self.stats.wireless_dropped.wrapping_add(1);
                if e == TransportError::NotSubscribed {
                    trace!("{}: no wireless subscriber, batch {} dropped", group, sequence);
                } else {
                    warn!("{}: wireless send failed: {:?}", group, e);
                }
            }
        }

        let serial = self.serial.send(payload, SequenceTag { pipe, sequence });
        match serial {
            Ok(()) => self.stats.serial_sent = self.stats.serial_sent.wrapping_add(1),
            Err(e) => {
                self.stats.serial_dropped = self.stats.serial_dropped.wrapping_add(1);
                if e == TransportError::LinkDown {
                    trace!("{}: serial link down, batch {} dropped", group, sequence);
                } else {
                    warn!("{}: serial send failed: {:?}", group, e);
                }
            }
        }

        DispatchReport { wireless, serial }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PipeId;
    use std::vec::Vec as StdVec;

    #[derive(Default)]
    struct FakeRadio {
        sent: StdVec<(PipeId, StdVec<u8>)>,
        fail: Option<TransportError>,
    }

    impl WirelessSender for FakeRadio {
        fn notify(&mut self, pipe: PipeId, payload: &[u8]) -> Result<(), TransportError> {
            if let Some(e) = self.fail {
                return Err(e);
            }
            self.sent.push((pipe, payload.to_vec()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeSerial {
        sent: StdVec<(StdVec<u8>, SequenceTag)>,
        fail: Option<TransportError>,
    }

    impl SerialSender for FakeSerial {
        fn send(&mut self, payload: &[u8], tag: SequenceTag) -> Result<(), TransportError> {
            if let Some(e) = self.fail {
                return Err(e);
            }
            self.sent.push((payload.to_vec(), tag));
            Ok(())
        }
    }

    #[test]
    fn identical_payload_reaches_both_transports() {
        let mut dispatcher = DualDispatcher::new(FakeRadio::default(), FakeSerial::default());
        let payload = [7u8; 227];

        let report = dispatcher.dispatch(ChannelGroup::AdcB, &payload, 3);
        assert_eq!(report, DispatchReport { wireless: Ok(()), serial: Ok(()) });

        let (pipe, radio_bytes) = &dispatcher.wireless().sent[0];
        let (serial_bytes, tag) = &dispatcher.serial().sent[0];
        assert_eq!(*pipe, ChannelGroup::AdcB.pipe());
        assert_eq!(radio_bytes.as_slice(), &payload[..]);
        assert_eq!(serial_bytes.as_slice(), &payload[..]);
        assert_eq!(*tag, SequenceTag { pipe: PipeId(1), sequence: 3 });
    }

    #[test]
    fn wireless_failure_does_not_block_serial() {
        let radio = FakeRadio {
            fail: Some(TransportError::NotSubscribed),
            ..Default::default()
        };
        let mut dispatcher = DualDispatcher::new(radio, FakeSerial::default());

        let report = dispatcher.dispatch(ChannelGroup::Pulse, &[1, 2, 3], 0);
        assert_eq!(report.wireless, Err(TransportError::NotSubscribed));
        assert_eq!(report.serial, Ok(()));
        assert_eq!(dispatcher.serial().sent.len(), 1);
        assert_eq!(dispatcher.stats().wireless_dropped, 1);
        assert_eq!(dispatcher.stats().serial_sent, 1);
    }

    #[test]
    fn serial_failure_does_not_block_wireless() {
        let serial = FakeSerial {
            fail: Some(TransportError::LinkDown),
            ..Default::default()
        };
        let mut dispatcher = DualDispatcher::new(FakeRadio::default(), serial);

        dispatcher.dispatch(ChannelGroup::Inertial, &[9; 10], 0);
        let report = dispatcher.dispatch(ChannelGroup::Inertial, &[9; 10], 1);
        assert_eq!(report.serial, Err(TransportError::LinkDown));
        assert_eq!(dispatcher.wireless().sent.len(), 2);
        assert_eq!(
            dispatcher.stats(),
            DispatchStats {
                wireless_sent: 2,
                wireless_dropped: 0,
                serial_sent: 0,
                serial_dropped: 2,
            }
        );
    }
}

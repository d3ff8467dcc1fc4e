//! Demand-satisfying receive loop

use crate::classify::{classify, ErrorClass};
use crate::shutdown::ShutdownSignal;
use crate::sys;
use std::io::{self, Read};
use tracing::debug;

/// Result of one attempt to fill a demand
#[derive(Debug)]
pub enum ReceiveOutcome {
    /// The whole demand was received
    Completed(usize),
    /// The peer shut down before the demand was met
    PeerClosed {
        /// Bytes received before the close; discarded by the caller
        received: usize,
    },
    /// Transient network fault (reset, timeout)
    Recoverable {
        /// The classified error
        error: io::Error,
        /// Bytes received before the fault; discarded by the caller
        received: usize,
    },
    /// Unclassified failure; the stream cannot continue
    Fatal {
        /// The classified error
        error: io::Error,
        /// Bytes received before the failure; discarded by the caller
        received: usize,
    },
    /// Shutdown was requested while waiting for data
    Cancelled {
        /// Bytes received before cancellation
        received: usize,
    },
}

impl ReceiveOutcome {
    /// Whether the demand was fully satisfied
    pub fn is_completed(&self) -> bool {
        matches!(self, ReceiveOutcome::Completed(_))
    }
}

/// Fill `out` completely from `reader`.
///
/// Issues as many reads as needed, each for at most the bytes still missing,
/// so the result never depends on how the peer fragmented its writes. Returns
/// early on orderly close, on an error, or when `shutdown` is triggered
/// during a read-timeout tick.
pub fn receive<R: Read + ?Sized>(
    reader: &mut R,
    out: &mut [u8],
    shutdown: &ShutdownSignal,
) -> ReceiveOutcome {
    let demand = out.len();
    let mut filled = 0;

    while filled < demand {
        match reader.read(&mut out[filled..]) {
            Ok(0) => {
                debug!(
                    "Peer closed with {} of {} demanded bytes received",
                    filled, demand
                );
                return ReceiveOutcome::PeerClosed { received: filled };
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if sys::is_poll_tick(&e) => {
                if shutdown.is_triggered() {
                    return ReceiveOutcome::Cancelled { received: filled };
                }
            }
            Err(error) => {
                return match classify(&error) {
                    ErrorClass::Recoverable => ReceiveOutcome::Recoverable {
                        error,
                        received: filled,
                    },
                    ErrorClass::Fatal => ReceiveOutcome::Fatal {
                        error,
                        received: filled,
                    },
                }
            }
        }
    }

    ReceiveOutcome::Completed(demand)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::VecDeque;
    use std::io::Cursor;

    /// Reader that replays a script of chunks and errors
    struct Scripted {
        steps: VecDeque<io::Result<Vec<u8>>>,
        reads: usize,
    }

    impl Scripted {
        fn new(steps: Vec<io::Result<Vec<u8>>>) -> Self {
            Self {
                steps: steps.into(),
                reads: 0,
            }
        }

        fn chunks(data: &[u8], sizes: &[usize]) -> Self {
            let mut steps = Vec::new();
            let mut offset = 0;
            let mut i = 0;
            while offset < data.len() {
                let size = sizes[i % sizes.len()].max(1).min(data.len() - offset);
                steps.push(Ok(data[offset..offset + size].to_vec()));
                offset += size;
                i += 1;
            }
            Self::new(steps)
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads += 1;
            match self.steps.pop_front() {
                None => Ok(0),
                Some(Err(e)) => Err(e),
                Some(Ok(mut chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        self.steps.push_front(Ok(chunk.split_off(n)));
                    }
                    Ok(n)
                }
            }
        }
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 251) as u8).collect()
    }

    #[test]
    fn test_single_burst_completes() {
        let data = payload(40);
        let mut reader = Cursor::new(data.clone());
        let mut out = vec![0u8; 40];
        let outcome = receive(&mut reader, &mut out, &ShutdownSignal::new());
        assert!(matches!(outcome, ReceiveOutcome::Completed(40)));
        assert_eq!(out, data);
    }

    #[test]
    fn test_one_byte_at_a_time_matches_burst() {
        let data = payload(64);

        let mut trickle = Scripted::chunks(&data, &[1]);
        let mut trickled = vec![0u8; 64];
        let outcome = receive(&mut trickle, &mut trickled, &ShutdownSignal::new());
        assert!(outcome.is_completed());
        assert_eq!(trickle.reads, 64);

        let mut burst = Cursor::new(data.clone());
        let mut bursted = vec![0u8; 64];
        assert!(receive(&mut burst, &mut bursted, &ShutdownSignal::new()).is_completed());

        assert_eq!(trickled, bursted);
        assert_eq!(trickled, data);
    }

    #[test]
    fn test_extra_data_left_unread() {
        let data = payload(20);
        let mut reader = Cursor::new(data.clone());
        let mut out = vec![0u8; 8];
        assert!(receive(&mut reader, &mut out, &ShutdownSignal::new()).is_completed());
        assert_eq!(out, &data[..8]);
        assert_eq!(reader.position(), 8);
    }

    #[test]
    fn test_short_stream_reports_peer_closed() {
        let mut reader = Cursor::new(payload(15));
        let mut out = vec![0u8; 16];
        let outcome = receive(&mut reader, &mut out, &ShutdownSignal::new());
        assert!(matches!(outcome, ReceiveOutcome::PeerClosed { received: 15 }));
    }

    #[test]
    fn test_zero_demand_reads_nothing() {
        let mut reader = Scripted::new(vec![]);
        let outcome = receive(&mut reader, &mut [], &ShutdownSignal::new());
        assert!(matches!(outcome, ReceiveOutcome::Completed(0)));
        assert_eq!(reader.reads, 0);
    }

    #[test]
    fn test_reset_is_recoverable() {
        let mut reader = Scripted::new(vec![
            Ok(vec![1, 2, 3]),
            Err(io::Error::from(io::ErrorKind::ConnectionReset)),
        ]);
        let mut out = vec![0u8; 8];
        let outcome = receive(&mut reader, &mut out, &ShutdownSignal::new());
        match outcome {
            ReceiveOutcome::Recoverable { error, received } => {
                assert_eq!(error.kind(), io::ErrorKind::ConnectionReset);
                assert_eq!(received, 3);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_unclassified_error_is_fatal_and_stops() {
        let mut reader = Scripted::new(vec![
            Err(io::Error::from(io::ErrorKind::PermissionDenied)),
            Ok(vec![1, 2, 3, 4]),
        ]);
        let mut out = vec![0u8; 4];
        let outcome = receive(&mut reader, &mut out, &ShutdownSignal::new());
        assert!(matches!(outcome, ReceiveOutcome::Fatal { received: 0, .. }));
        assert_eq!(reader.reads, 1);
    }

    #[test]
    fn test_fatal_reports_partial_bytes() {
        let mut reader = Scripted::new(vec![
            Ok(vec![5, 6]),
            Err(io::Error::from(io::ErrorKind::PermissionDenied)),
        ]);
        let mut out = vec![0u8; 4];
        let outcome = receive(&mut reader, &mut out, &ShutdownSignal::new());
        assert!(matches!(outcome, ReceiveOutcome::Fatal { received: 2, .. }));
    }

    #[test]
    fn test_interrupted_is_retried() {
        let mut reader = Scripted::new(vec![
            Ok(vec![1, 2]),
            Err(io::Error::from(io::ErrorKind::Interrupted)),
            Ok(vec![3, 4]),
        ]);
        let mut out = vec![0u8; 4];
        assert!(receive(&mut reader, &mut out, &ShutdownSignal::new()).is_completed());
        assert_eq!(out, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_poll_tick_without_shutdown_keeps_waiting() {
        let mut reader = Scripted::new(vec![
            Err(io::Error::from(io::ErrorKind::WouldBlock)),
            Err(io::Error::from(io::ErrorKind::WouldBlock)),
            Ok(vec![9, 9]),
        ]);
        let mut out = vec![0u8; 2];
        assert!(receive(&mut reader, &mut out, &ShutdownSignal::new()).is_completed());
    }

    #[test]
    fn test_poll_tick_with_shutdown_cancels() {
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();
        let mut reader = Scripted::new(vec![
            Ok(vec![1]),
            Err(io::Error::from(io::ErrorKind::WouldBlock)),
            Ok(vec![2, 3, 4]),
        ]);
        let mut out = vec![0u8; 4];
        let outcome = receive(&mut reader, &mut out, &shutdown);
        assert!(matches!(outcome, ReceiveOutcome::Cancelled { received: 1 }));
    }

    proptest! {
        #[test]
        fn prop_fragmentation_does_not_change_output(
            blocks in 1usize..32,
            block_size in 1usize..16,
            sizes in prop::collection::vec(1usize..24, 1..8),
        ) {
            let data = payload(blocks * block_size);
            let mut reader = Scripted::chunks(&data, &sizes);
            let mut out = vec![0u8; data.len()];
            let outcome = receive(&mut reader, &mut out, &ShutdownSignal::new());
            prop_assert!(outcome.is_completed());
            prop_assert_eq!(out, data);
        }
    }
}

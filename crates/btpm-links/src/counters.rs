//! Counter sanity check for untrusted sequence counters.
//!
//! # Purpose
//!
//! Counters come from remote nodes. A node restart, a re-deployed message
//! center or a protocol bug can all make them move backwards or report more
//! received than sent. This module is the single decision point for what
//! such a pair means; the engine logs the verdict and keeps going.
//!
//! # Policy
//!
//! - **Non-decreasing**: each counter is expected to be ≥ its value in the
//!   prior status for the same connection.
//! - **Receive never ahead**: `rx_seq` is expected to be ≤ `tx_seq`.
//! - **Never fatal**: an anomaly is reported, the remote node stays the source
//!   of truth, and the status is computed from the fresh counters
//!   (pending count saturating at zero).

use crate::{LinkStatus, SeqSample};

/// Verdict on a freshly fetched counter pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CounterCheck {
    /// Counters moved forward (or stayed put) and `rx_seq <= tx_seq`.
    Consistent,

    /// At least one counter is lower than in the prior status.
    Regressed {
        prev_tx: u64,
        prev_rx: u64,
        tx_seq: u64,
        rx_seq: u64,
    },

    /// More messages received than sent.
    RxAhead { tx_seq: u64, rx_seq: u64 },
}

impl CounterCheck {
    pub fn is_consistent(&self) -> bool {
        matches!(self, CounterCheck::Consistent)
    }

    pub fn is_anomaly(&self) -> bool {
        !self.is_consistent()
    }
}

impl std::fmt::Display for CounterCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CounterCheck::Consistent => write!(f, "consistent"),
            CounterCheck::Regressed {
                prev_tx,
                prev_rx,
                tx_seq,
                rx_seq,
            } => write!(
                f,
                "counter regression: tx {prev_tx}->{tx_seq}, rx {prev_rx}->{rx_seq}"
            ),
            CounterCheck::RxAhead { tx_seq, rx_seq } => {
                write!(f, "rx_seq ahead of tx_seq: tx={tx_seq} rx={rx_seq}")
            }
        }
    }
}

/// Check a fresh sample against the prior status (if any).
///
/// Regression takes precedence over rx-ahead when both apply. A missing prior
/// status can only yield [`CounterCheck::RxAhead`] or `Consistent`.
pub fn check_counters(prev: Option<&LinkStatus>, sample: SeqSample) -> CounterCheck {
    if let Some(prev) = prev.map(LinkStatus::sample) {
        if sample.tx_seq < prev.tx_seq || sample.rx_seq < prev.rx_seq {
            return CounterCheck::Regressed {
                prev_tx: prev.tx_seq,
                prev_rx: prev.rx_seq,
                tx_seq: sample.tx_seq,
                rx_seq: sample.rx_seq,
            };
        }
    }
    if sample.rx_seq > sample.tx_seq {
        return CounterCheck::RxAhead {
            tx_seq: sample.tx_seq,
            rx_seq: sample.rx_seq,
        };
    }
    CounterCheck::Consistent
}

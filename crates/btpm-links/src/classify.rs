//! Hysteresis classifier.
//!
//! Pure functions: the caller supplies the prior status, the fresh counters
//! and the poll time. No clock, no IO.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::{LinkState, LinkStatus, SeqSample};

/// Classify one connection for the poll at `now`.
///
/// - Nothing pending: GOOD, streak cleared, regardless of elapsed time.
/// - Pending, no open streak in `prev`: the streak starts at `now`; GOOD.
/// - Pending, open streak: BAD once `now - pending_since >= grace`.
///
/// A missing `prev` is the implicit GOOD, zero-pending baseline.
pub fn classify(
    prev: Option<&LinkStatus>,
    sample: SeqSample,
    now: DateTime<Utc>,
    grace: Duration,
) -> LinkStatus {
    let pending_count = sample.pending_count();

    let (pending_since, state) = if pending_count == 0 {
        (None, LinkState::Good)
    } else {
        match prev.and_then(|p| p.pending_since) {
            None => (Some(now), LinkState::Good),
            Some(since) => {
                let elapsed = (now - since).to_std().unwrap_or(Duration::ZERO);
                let state = if elapsed >= grace {
                    LinkState::Bad
                } else {
                    LinkState::Good
                };
                (Some(since), state)
            }
        }
    };

    LinkStatus {
        tx_seq: sample.tx_seq,
        rx_seq: sample.rx_seq,
        pending_count,
        pending_since,
        state,
        polled_at: now,
    }
}

/// Grace-free classification for one-shot inspection: pending is BAD.
pub fn classify_instant(sample: SeqSample, now: DateTime<Utc>) -> LinkStatus {
    let pending_count = sample.pending_count();
    let pending = pending_count > 0;
    LinkStatus {
        tx_seq: sample.tx_seq,
        rx_seq: sample.rx_seq,
        pending_count,
        pending_since: pending.then_some(now),
        state: if pending { LinkState::Bad } else { LinkState::Good },
        polled_at: now,
    }
}

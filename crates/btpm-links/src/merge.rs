use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{Connection, LinkMap, LinkStatus};

/// Forward and (when present) backward status of one relay link.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedLink {
    /// The forward direction; `conn.reverse()` is the backward one.
    pub conn: Connection,
    pub forward: LinkStatus,
    pub backward: Option<LinkStatus>,
}

impl MergedLink {
    /// `[forward, backward]`, or `[forward]` for a forward-only link.
    pub fn statuses(&self) -> Vec<&LinkStatus> {
        let mut out = vec![&self.forward];
        if let Some(bw) = &self.backward {
            out.push(bw);
        }
        out
    }
}

/// Group directed statuses into undirected pairs.
///
/// Pairs come out in map order, keyed by whichever direction sorts first.
/// A connection whose reverse is missing from `map` is reported alone.
pub fn merge_status(map: &LinkMap) -> Vec<MergedLink> {
    let mut done: BTreeSet<&Connection> = BTreeSet::new();
    let mut out = Vec::new();

    for (conn, status) in map {
        if done.contains(conn) {
            continue;
        }
        let rev = conn.reverse();
        let backward = map.get_key_value(&rev).map(|(k, s)| {
            done.insert(k);
            s.clone()
        });
        done.insert(conn);
        out.push(MergedLink {
            conn: conn.clone(),
            forward: status.clone(),
            backward,
        });
    }

    out
}

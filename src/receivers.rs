// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The configured set of peer IPv4 addresses captured broadcasts are
//! relayed to.
//!
//! All mutation and the per-packet snapshot share one [`parking_lot::Mutex`].
//! `snapshot` always returns an owned copy rather than a guard, so the
//! capture loop forwards packets without holding the lock across egress
//! I/O - the same shape as the `engine_lock`/snapshot-under-lock pattern
//! described for the receiver set, and the general "copy out, then work
//! lock-free" style `s2n-quic-dc` uses for its own shared-state snapshots
//! (e.g. `fixed_map`'s upgradable read locks).

use parking_lot::Mutex;
use std::net::Ipv4Addr;

/// A concurrently-mutable set of peer IPv4 addresses.
#[derive(Default)]
pub struct ReceiverSet {
    members: Mutex<Vec<Ipv4Addr>>,
}

impl ReceiverSet {
    /// Creates an empty receiver set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `ip` as a dotted-quad IPv4 address and inserts it if absent.
    ///
    /// Returns `true` iff the address parsed successfully. Idempotent: a
    /// repeated `add` with the same address leaves the set unchanged.
    pub fn add(&self, ip: &str) -> bool {
        let Ok(addr) = ip.parse::<Ipv4Addr>() else {
            return false;
        };

        let mut members = self.members.lock();
        if !members.contains(&addr) {
            members.push(addr);
        }
        true
    }

    /// Removes the entry matching `ip`, if present. A no-op if `ip` fails
    /// to parse or is not a member.
    pub fn remove(&self, ip: &str) {
        let Ok(addr) = ip.parse::<Ipv4Addr>() else {
            return;
        };
        self.members.lock().retain(|member| *member != addr);
    }

    /// Empties the set.
    pub fn clear(&self) {
        self.members.lock().clear();
    }

    /// Returns a deep copy of the current members.
    #[inline]
    pub fn snapshot(&self) -> Vec<Ipv4Addr> {
        self.members.lock().clone()
    }

    /// Returns the dotted-quad rendering of [`Self::snapshot`].
    pub fn list_strings(&self) -> Vec<String> {
        self.snapshot().iter().map(Ipv4Addr::to_string).collect()
    }
}

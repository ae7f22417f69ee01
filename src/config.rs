// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Knobs the engine itself needs at `start()`.
//!
//! This does not cover the peer list (that is persisted by the external
//! control surface, see `src/bin/lan-relay.rs`) - only the knobs the
//! engine needs before opening its sockets, following the
//! `Options`-builder convention `s2n-quic-platform`/`s2n-quic-dc` use for
//! socket construction parameters.

/// The port the promiscuous socket binds to. Never used for filtering;
/// promiscuous mode delivers every IPv4 datagram on the interface
/// regardless of port.
pub const DEFAULT_CAPTURE_PORT: u16 = 6000;

/// Minimum buffer capacity, matching the largest possible IPv4 datagram.
pub const MAX_PACKET_SIZE: usize = 65_536;

/// Default number of receive-operation contexts parked in the idle pool.
pub const DEFAULT_POOL_CAPACITY: usize = 4;

/// The limited broadcast address this engine forwards.
pub const BROADCAST_ADDR: std::net::Ipv4Addr = std::net::Ipv4Addr::new(255, 255, 255, 255);

/// Configuration for [`crate::engine::Engine::start`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Local port the capture socket binds to. Arbitrary; not used for
    /// filtering.
    pub capture_port: u16,

    /// Buffer capacity used for both captured and rewritten packets.
    pub max_packet_size: usize,

    /// Number of buffers preallocated in the pool at start.
    pub pool_capacity: usize,

    /// How long `stop()` waits for the capture task to exit before
    /// abandoning the wait.
    pub stop_timeout: std::time::Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture_port: DEFAULT_CAPTURE_PORT,
            max_packet_size: MAX_PACKET_SIZE,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            stop_timeout: std::time::Duration::from_secs(2),
        }
    }
}

// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Platform-specific raw-socket backends behind a small pair of traits.
//!
//! `engine.rs` and `capture.rs` only ever see [`CaptureSocket`] and
//! [`EgressSocket`]; which concrete backend they're talking to is picked
//! at compile time (`cfg(windows)` vs `cfg(unix)`), and the test suite
//! substitutes a third, channel-backed implementation. This mirrors how
//! `s2n_quic_dc::socket` picks between a Linux `bpf`-based `Pair` and a
//! portable `pair`-based `Pair` behind one `pub use`.

use crate::error::{Error, Kind};
use std::net::Ipv4Addr;
use std::time::Duration;

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(test)]
pub mod test_double;

/// A raw socket delivering whole IPv4 datagrams, first byte of each
/// buffer being the start of the IPv4 header.
///
/// Implementations poll with a short read timeout rather than blocking
/// indefinitely, so the capture loop can re-check its cancellation signal
/// between reads without true async cancellation support on the raw fd.
pub trait CaptureSocket: Send + Sync {
    /// Blocking receive of one datagram into `buf`.
    ///
    /// Returns `Ok(len)` on success. A timeout (no datagram arrived within
    /// the backend's poll interval) is surfaced as
    /// `io::ErrorKind::WouldBlock` / `io::ErrorKind::TimedOut`, which the
    /// caller treats as "keep polling", not a per-packet failure.
    fn recv(&self, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Unblocks any in-progress or future [`Self::recv`] call so the
    /// capture loop can exit during `stop()`.
    fn close(&self);
}

/// A raw socket with the header-included option set, used to transmit
/// rewritten packets.
pub trait EgressSocket: Send + Sync {
    /// Transmits `buf` verbatim (IP header included) to `dst`.
    fn send_to(&self, buf: &[u8], dst: Ipv4Addr) -> std::io::Result<usize>;
}

/// Resolves the local machine's primary IPv4 address: the first IPv4
/// address associated with the machine's host name.
pub fn local_ipv4() -> Result<Ipv4Addr, Error> {
    #[cfg(unix)]
    {
        unix::local_ipv4()
    }
    #[cfg(windows)]
    {
        windows::local_ipv4()
    }
    #[cfg(not(any(unix, windows)))]
    {
        Err(Error::new(Kind::HostAddress))
    }
}

/// Opens the capture socket: bind to `(local_ip, port)`, switch into
/// promiscuous receive-all mode.
pub fn open_capture(
    local_ip: Ipv4Addr,
    port: u16,
    poll_interval: Duration,
) -> Result<Box<dyn CaptureSocket>, Error> {
    #[cfg(unix)]
    {
        unix::Capture::open(local_ip, port, poll_interval).map(|c| Box::new(c) as _)
    }
    #[cfg(windows)]
    {
        windows::Capture::open(local_ip, port, poll_interval).map(|c| Box::new(c) as _)
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = (local_ip, port, poll_interval);
        Err(Error::new(Kind::PlatformInit))
    }
}

/// Opens the egress socket with the header-included option set. Never
/// bound.
pub fn open_egress() -> Result<Box<dyn EgressSocket>, Error> {
    #[cfg(unix)]
    {
        unix::Egress::open().map(|e| Box::new(e) as _)
    }
    #[cfg(windows)]
    {
        windows::Egress::open().map(|e| Box::new(e) as _)
    }
    #[cfg(not(any(unix, windows)))]
    {
        Err(Error::new(Kind::PlatformInit))
    }
}

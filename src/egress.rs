// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Rewrite + egress: takes one captured packet and a receiver address,
//! rewrites the destination and both checksums, and transmits the copy on
//! the raw egress socket.
//!
//! The rewrite below runs in a fixed sequence of steps; the send itself
//! is serialized behind the egress socket's own internal lock (see
//! `platform::unix::Egress`/`platform::windows::Egress`), the same
//! snapshot-then-serialize shape `s2n-quic-dc`'s `socket::bpf::Pair` uses
//! for its writer/reader socket pair.

use crate::codec;
use crate::platform::EgressSocket;
use crate::pool::Pool;
use std::net::Ipv4Addr;

/// Per-packet failure from [`Sender::send`]. Always logged and never
/// fatal to the capture loop - see `engine.rs`.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("malformed datagram: {0}")]
    Malformed(&'static str),

    #[error("egress socket send failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Owns the egress socket and the buffer pool used to stage rewritten
/// packets.
pub struct Sender {
    socket: Box<dyn EgressSocket>,
    pool: Pool,
}

impl Sender {
    pub fn new(socket: Box<dyn EgressSocket>, pool: Pool) -> Self {
        Self { socket, pool }
    }

    /// Rewrites `packet[..length]` for `receiver_ip` and transmits the
    /// copy. Drops (returns `Err`, never panics) on a malformed input
    /// datagram instead of attempting a best-effort rewrite.
    pub fn send(&self, receiver_ip: Ipv4Addr, packet: &[u8], length: usize) -> Result<(), SendError> {
        if length < 20 {
            return Err(SendError::Malformed("shorter than a minimal IPv4 header"));
        }

        let ihl = ((packet[0] & 0x0f) as usize) * 4;
        if ihl < 20 || ihl + 8 > length {
            return Err(SendError::Malformed("IHL out of range"));
        }

        let udp_len = codec::read_u16_be(packet, ihl + 4) as usize;
        if udp_len < 8 || ihl + udp_len > length {
            return Err(SendError::Malformed("UDP length out of range"));
        }
        let udp_payload_len = udp_len - 8;

        // step 3: copy into a rented buffer
        let mut rewritten = self.pool.rent(length);
        rewritten[..length].copy_from_slice(&packet[..length]);
        let rewritten = &mut rewritten[..length];

        // step 4: rewrite the destination address
        let receiver_octets = receiver_ip.octets();
        rewritten[16..20].copy_from_slice(&receiver_octets);

        // step 5: recompute the IP checksum over the IP header only
        codec::write_u16_be(rewritten, 10, 0);
        let ip_checksum = codec::ipv4_checksum(&rewritten[..ihl]);
        codec::write_u16_be(rewritten, 10, ip_checksum);

        // step 6: recompute the UDP checksum over pseudo-header + UDP
        // header + payload
        codec::write_u16_be(rewritten, ihl + 6, 0);
        let saddr = codec::read_u32_be(rewritten, 12);
        let daddr = codec::read_u32_be(rewritten, 16);

        let mut udp_header = [0u8; 8];
        udp_header.copy_from_slice(&rewritten[ihl..ihl + 8]);

        let mut payload = self.pool.rent(udp_payload_len);
        payload[..udp_payload_len]
            .copy_from_slice(&rewritten[ihl + 8..ihl + 8 + udp_payload_len]);

        let udp_checksum = codec::udpv4_checksum(
            saddr,
            daddr,
            &udp_header,
            udp_len as u16,
            &payload[..udp_payload_len],
        );
        codec::write_u16_be(rewritten, ihl + 6, udp_checksum);

        // step 7: transmit under the egress socket's send lock
        self.socket.send_to(rewritten, receiver_ip)?;

        // step 8: both rented buffers are released here via `Drop`,
        // whether the send above succeeded or failed.
        Ok(())
    }
}

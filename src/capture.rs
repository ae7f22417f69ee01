// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The capture loop: read one datagram, filter to broadcast UDP, snapshot
//! the receiver set, fan the rewritten packet out to each receiver.
//!
//! Runs on a dedicated blocking thread rather than true async, since
//! promiscuous raw-socket receives have no portable non-blocking form.
//! This is exactly the shape of
//! `s2n_quic_dc::socket::recv::udp::blocking`, which loops on a blocking
//! `UdpSocket` and dispatches each datagram into a `Router`; here the
//! "router" is just "filter, then fan out to the receiver snapshot".

use crate::egress::Sender as EgressSender;
use crate::platform::CaptureSocket;
use crate::pool::Pool;
use crate::receivers::ReceiverSet;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const IPPROTO_UDP: u8 = 17;
const BROADCAST: [u8; 4] = [255, 255, 255, 255];

/// Runs the capture loop until `cancelled` is set or the socket reports
/// that it was closed. Intended to be driven from
/// `tokio::task::spawn_blocking`.
pub fn run(
    socket: Arc<dyn CaptureSocket>,
    pool: Pool,
    max_packet_size: usize,
    receivers: Arc<ReceiverSet>,
    egress: Arc<EgressSender>,
    cancelled: Arc<AtomicBool>,
) {
    while !cancelled.load(Ordering::Acquire) {
        let mut buffer = pool.rent(max_packet_size);

        match socket.recv(&mut buffer) {
            Ok(0) => continue,
            Ok(len) => dispatch(&buffer[..len], &receivers, &egress),
            Err(err) if is_poll_timeout(&err) => continue,
            Err(err) if is_clean_shutdown(&err) => break,
            Err(err) => {
                tracing::warn!(error = %err, "capture socket recv error, continuing");
            }
        }
    }

    tracing::debug!("capture loop exited");
}

#[inline]
fn dispatch(packet: &[u8], receivers: &ReceiverSet, egress: &EgressSender) {
    if packet.len() < 20 {
        tracing::debug!(len = packet.len(), "dropping runt datagram");
        return;
    }

    if packet[9] != IPPROTO_UDP {
        tracing::debug!(protocol = packet[9], "dropping non-UDP datagram");
        return;
    }

    if packet[16..20] != BROADCAST {
        tracing::debug!("dropping non-broadcast datagram");
        return;
    }

    // snapshot under the receiver set's lock, then forward lock-free
    let snapshot = receivers.snapshot();
    for receiver in snapshot {
        if let Err(err) = egress.send(receiver, packet, packet.len()) {
            tracing::warn!(%receiver, error = %err, "egress send failed, continuing");
        }
    }
}

#[inline]
fn is_poll_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

#[inline]
fn is_clean_shutdown(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted | io::ErrorKind::Interrupted | io::ErrorKind::NotConnected
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::test_double::FakeEgress;

    fn broadcast_udp_packet(proto: u8, daddr: [u8; 4]) -> Vec<u8> {
        let mut packet = vec![0u8; 20 + 12];
        packet[0] = 0x45;
        packet[9] = proto;
        packet[12..16].copy_from_slice(&[192, 168, 1, 10]);
        packet[16..20].copy_from_slice(&daddr);
        crate::codec::write_u16_be(&mut packet, 20, 5000);
        crate::codec::write_u16_be(&mut packet, 22, 6000);
        crate::codec::write_u16_be(&mut packet, 24, 12);
        packet[28..32].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        packet
    }

    #[test]
    fn fans_out_to_every_receiver() {
        let receivers = ReceiverSet::new();
        receivers.add("10.0.0.2");
        receivers.add("10.0.0.3");

        let egress = FakeEgress::new();
        let sender = EgressSender::new(Box::new(egress.clone()), Pool::new(128, 4));

        let packet = broadcast_udp_packet(17, [255, 255, 255, 255]);
        dispatch(&packet, &receivers, &sender);

        let sent = egress.sent();
        assert_eq!(sent.len(), 2);
        let dsts: Vec<_> = sent.iter().map(|(dst, _)| dst.to_string()).collect();
        assert!(dsts.contains(&"10.0.0.2".to_string()));
        assert!(dsts.contains(&"10.0.0.3".to_string()));
    }

    #[test]
    fn filters_non_udp() {
        let receivers = ReceiverSet::new();
        receivers.add("10.0.0.2");
        let egress = FakeEgress::new();
        let sender = EgressSender::new(Box::new(egress.clone()), Pool::new(128, 4));

        let packet = broadcast_udp_packet(6, [255, 255, 255, 255]);
        dispatch(&packet, &receivers, &sender);

        assert!(egress.sent().is_empty());
    }

    #[test]
    fn filters_non_broadcast_destination() {
        let receivers = ReceiverSet::new();
        receivers.add("10.0.0.2");
        let egress = FakeEgress::new();
        let sender = EgressSender::new(Box::new(egress.clone()), Pool::new(128, 4));

        let packet = broadcast_udp_packet(17, [192, 168, 1, 20]);
        dispatch(&packet, &receivers, &sender);

        assert!(egress.sent().is_empty());
    }

    #[test]
    fn empty_receiver_set_emits_nothing() {
        let receivers = ReceiverSet::new();
        let egress = FakeEgress::new();
        let sender = EgressSender::new(Box::new(egress.clone()), Pool::new(128, 4));

        let packet = broadcast_udp_packet(17, [255, 255, 255, 255]);
        dispatch(&packet, &receivers, &sender);

        assert!(egress.sent().is_empty());
    }
}

// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Channel-backed `CaptureSocket`/`EgressSocket` implementations used by
//! `engine.rs`'s tests so the orchestration logic (filter, snapshot,
//! fan-out, lifecycle) can be exercised without elevated privileges or a
//! real raw socket.

use super::{CaptureSocket, EgressSocket};
use parking_lot::Mutex;
use std::net::Ipv4Addr;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

/// A fake capture socket fed by injecting whole packets through a channel.
pub struct FakeCapture {
    rx: Mutex<Receiver<Vec<u8>>>,
    poll_interval: Duration,
}

impl FakeCapture {
    pub fn new(poll_interval: Duration) -> (Self, Sender<Vec<u8>>) {
        let (tx, rx) = mpsc::channel();
        (
            Self {
                rx: Mutex::new(rx),
                poll_interval,
            },
            tx,
        )
    }
}

impl CaptureSocket for FakeCapture {
    fn recv(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        use mpsc::RecvTimeoutError::*;
        match self.rx.lock().recv_timeout(self.poll_interval) {
            Ok(packet) => {
                let len = packet.len().min(buf.len());
                buf[..len].copy_from_slice(&packet[..len]);
                Ok(len)
            }
            Err(Timeout) => Err(std::io::Error::from(std::io::ErrorKind::WouldBlock)),
            // the test dropped its sender handle to simulate the capture
            // socket being closed by `stop()`.
            Err(Disconnected) => Err(std::io::Error::from(std::io::ErrorKind::ConnectionAborted)),
        }
    }

    fn close(&self) {
        // the test ends the loop by dropping its `Sender`, which turns the
        // next `recv_timeout` into `Disconnected`; nothing to do here.
    }
}

/// A fake egress socket that records every rewritten packet instead of
/// transmitting it.
#[derive(Clone, Default)]
pub struct FakeEgress {
    sent: Arc<Mutex<Vec<(Ipv4Addr, Vec<u8>)>>>,
}

impl FakeEgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every packet sent so far, in send order.
    pub fn sent(&self) -> Vec<(Ipv4Addr, Vec<u8>)> {
        self.sent.lock().clone()
    }
}

impl EgressSocket for FakeEgress {
    fn send_to(&self, buf: &[u8], dst: Ipv4Addr) -> std::io::Result<usize> {
        self.sent.lock().push((dst, buf.to_vec()));
        Ok(buf.len())
    }
}

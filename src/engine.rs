// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The capture engine: owns both raw sockets, the buffer pool, and the
//! `Stopped <-> Running` lifecycle that wraps the capture loop.
//!
//! `engine_lock` (a [`parking_lot::Mutex`]) guards the state transitions
//! and the receiver set, held only across those operations and never
//! across an `.await` on the capture socket - the same shape as
//! `s2n-quic-dc`'s general rule of copying shared state out from under a
//! lock before doing I/O against it.

use crate::config::Config;
use crate::egress::Sender as EgressSender;
use crate::error::{Error, Kind};
use crate::platform::{self, CaptureSocket, EgressSocket};
use crate::pool::Pool;
use crate::receivers::ReceiverSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

enum State {
    Stopped,
    Running(Running),
}

struct Running {
    capture_socket: Arc<dyn CaptureSocket>,
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Captures local broadcast UDP datagrams and relays rewritten unicast
/// copies to every configured receiver.
pub struct Engine {
    config: Config,
    receivers: Arc<ReceiverSet>,
    state: parking_lot::Mutex<State>,
}

impl Engine {
    /// Constructs the engine in `Stopped` state with an empty receiver
    /// set.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            receivers: Arc::new(ReceiverSet::new()),
            state: parking_lot::Mutex::new(State::Stopped),
        }
    }

    /// Transitions `Stopped -> Running`. A no-op if already running.
    ///
    /// Opens the platform capture and egress sockets, preallocates the
    /// buffer pool, and spawns the capture task. Any failure releases
    /// everything acquired so far and is returned to the caller.
    pub async fn start(&self) -> Result<(), Error> {
        let local_ip = platform::local_ipv4()?;
        let capture_socket = platform::open_capture(
            local_ip,
            self.config.capture_port,
            std::time::Duration::from_millis(200),
        )?;
        let egress_socket = platform::open_egress()?;

        self.start_with_backends(capture_socket, egress_socket).await;
        Ok(())
    }

    /// Same as [`Self::start`] but takes already-opened backends. Used
    /// directly by `start()` in production and by tests that inject
    /// [`crate::platform::test_double`] sockets instead of real raw
    /// sockets.
    pub(crate) async fn start_with_backends(
        &self,
        capture_socket: Box<dyn CaptureSocket>,
        egress_socket: Box<dyn EgressSocket>,
    ) {
        let mut state = self.state.lock();
        if matches!(*state, State::Running(_)) {
            return;
        }

        let pool = Pool::new(self.config.max_packet_size, self.config.pool_capacity);
        let egress = Arc::new(EgressSender::new(egress_socket, pool.clone()));
        let capture_socket: Arc<dyn CaptureSocket> = Arc::from(capture_socket);
        let cancelled = Arc::new(AtomicBool::new(false));

        let task = {
            let socket = capture_socket.clone();
            let pool = pool.clone();
            let max_packet_size = self.config.max_packet_size;
            let receivers = self.receivers.clone();
            let egress = egress.clone();
            let cancelled = cancelled.clone();
            tokio::task::spawn_blocking(move || {
                crate::capture::run(socket, pool, max_packet_size, receivers, egress, cancelled);
            })
        };

        tracing::info!("engine started");

        *state = State::Running(Running {
            capture_socket,
            cancelled,
            task,
        });
    }

    /// Transitions `Running -> Stopped`. A no-op if already stopped.
    /// Never fails observably: teardown errors are logged and swallowed.
    pub async fn stop(&self) {
        let running = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, State::Stopped) {
                State::Running(running) => running,
                State::Stopped => return,
            }
        };

        // closing the socket unblocks any in-flight receive; the
        // cancellation flag stops the loop from starting another one.
        running.capture_socket.close();
        running.cancelled.store(true, Ordering::Release);

        match tokio::time::timeout(self.config.stop_timeout, running.task).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(error = %err, "capture task panicked"),
            Err(_) => tracing::warn!("capture task did not exit within the stop timeout"),
        }

        tracing::info!("engine stopped");
    }

    /// Idempotent: performs `stop` if needed and releases all resources.
    pub async fn dispose(&self) {
        self.stop().await;
    }

    /// `true` iff the engine is currently `Running`.
    pub fn is_running(&self) -> bool {
        matches!(*self.state.lock(), State::Running(_))
    }

    /// Parses `ip` and inserts it into the receiver set if absent.
    /// Returns `true` iff `ip` parsed successfully.
    pub fn add_receiver(&self, ip: &str) -> bool {
        self.receivers.add(ip)
    }

    /// Removes `ip` from the receiver set if present.
    pub fn remove_receiver(&self, ip: &str) {
        self.receivers.remove(ip)
    }

    /// Empties the receiver set.
    pub fn clear_receivers(&self) {
        self.receivers.clear()
    }

    /// Dotted-quad snapshot of the receiver set.
    pub fn list_receivers(&self) -> Vec<String> {
        self.receivers.list_strings()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::test_double::{FakeCapture, FakeEgress};
    use std::time::Duration;

    fn sample_broadcast_packet() -> Vec<u8> {
        let mut packet = vec![0u8; 20 + 12];
        packet[0] = 0x45;
        packet[9] = 17;
        packet[12..16].copy_from_slice(&[192, 168, 1, 10]);
        packet[16..20].copy_from_slice(&[255, 255, 255, 255]);
        crate::codec::write_u16_be(&mut packet, 20, 5000);
        crate::codec::write_u16_be(&mut packet, 22, 6000);
        crate::codec::write_u16_be(&mut packet, 24, 12);
        packet[28..32].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        packet
    }

    #[tokio::test]
    async fn start_stop_is_idempotent() {
        crate::testing::init_tracing();
        let engine = Engine::default();
        let (capture, _tx) = FakeCapture::new(Duration::from_millis(20));
        let egress = FakeEgress::new();

        engine
            .start_with_backends(Box::new(capture), Box::new(egress))
            .await;
        assert!(engine.is_running());

        // a second start while running is a no-op
        let (capture2, _tx2) = FakeCapture::new(Duration::from_millis(20));
        engine
            .start_with_backends(Box::new(capture2), Box::new(FakeEgress::new()))
            .await;
        assert!(engine.is_running());

        engine.stop().await;
        assert!(!engine.is_running());

        // a second stop while stopped is a no-op
        engine.stop().await;
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn live_reconfiguration_and_fan_out() {
        crate::testing::init_tracing();
        let engine = Engine::default();
        let (capture, tx) = FakeCapture::new(Duration::from_millis(10));
        let egress = FakeEgress::new();

        engine
            .start_with_backends(Box::new(capture), Box::new(egress.clone()))
            .await;

        assert!(engine.add_receiver("10.0.0.2"));
        tx.send(sample_broadcast_packet()).unwrap();

        // give the blocking capture task a chance to run
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(egress.sent().len(), 1);

        assert!(engine.add_receiver("10.0.0.3"));
        tx.send(sample_broadcast_packet()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(egress.sent().len(), 3);

        engine.stop().await;
    }

    #[tokio::test]
    async fn clean_shutdown_within_timeout() {
        crate::testing::init_tracing();
        let engine = Engine::default();
        let (capture, tx) = FakeCapture::new(Duration::from_millis(10));
        let egress = FakeEgress::new();

        engine
            .start_with_backends(Box::new(capture), Box::new(egress))
            .await;

        tx.send(sample_broadcast_packet()).unwrap();

        let started = std::time::Instant::now();
        engine.stop().await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!engine.is_running());

        // a subsequent start succeeds
        let (capture2, _tx2) = FakeCapture::new(Duration::from_millis(10));
        engine
            .start_with_backends(Box::new(capture2), Box::new(FakeEgress::new()))
            .await;
        assert!(engine.is_running());
        engine.stop().await;
    }
}

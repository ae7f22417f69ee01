// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Test-only helpers, mirrored on `s2n_quic_dc::testing`.

/// Initializes a `tracing` subscriber once per process, controlled by the
/// `LAN_RELAY_LOG` environment variable. Safe to call from every test;
/// subsequent calls are no-ops.
pub fn init_tracing() {
    use std::sync::Once;

    static TRACING: Once = Once::new();

    TRACING.call_once(|| {
        let env_filter = tracing_subscriber::EnvFilter::builder()
            .with_default_directive(tracing::Level::DEBUG.into())
            .with_env_var("LAN_RELAY_LOG")
            .from_env()
            .unwrap_or_default();

        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .compact()
            .with_test_writer()
            .try_init();
    });
}

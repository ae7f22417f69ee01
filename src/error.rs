// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Error types surfaced by [`crate::engine::Engine::start`].
//!
//! Per-packet failures in the capture/egress path never produce one of
//! these: they are logged (see the `tracing` calls in `capture.rs` and
//! `egress.rs`) and the capture loop continues. Only failures that prevent
//! the engine from reaching `Running` at all surface here.

use std::fmt;

/// Failure returned from [`crate::engine::Engine::start`].
#[derive(Debug)]
pub struct Error {
    kind: Kind,
}

impl Error {
    #[inline]
    pub(crate) fn new(kind: Kind) -> Self {
        Self { kind }
    }

    /// The specific failure kind, for callers that want to branch on it.
    #[inline]
    pub fn kind(&self) -> &Kind {
        &self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            Kind::Bind(err) => Some(err),
            _ => None,
        }
    }
}

impl From<Kind> for Error {
    #[inline]
    fn from(kind: Kind) -> Self {
        Self::new(kind)
    }
}

/// The specific reason [`Error`] was raised.
#[derive(Debug, thiserror::Error)]
pub enum Kind {
    /// Raw socket creation, promiscuous-mode enable, or the header-included
    /// option failed, most likely because the process is not elevated.
    #[error("insufficient privilege to open a raw socket; re-run elevated")]
    Privilege,

    /// Platform networking subsystem (e.g. Winsock) failed to initialise.
    #[error("platform networking subsystem failed to initialise")]
    PlatformInit,

    /// No IPv4 address could be determined for the local host.
    #[error("could not determine the local host's primary IPv4 address")]
    HostAddress,

    /// Bind to the capture port failed (port in use, interface down, ...).
    #[error("failed to bind the capture socket: {0}")]
    Bind(#[source] std::io::Error),
}

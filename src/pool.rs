// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! A fixed-capacity byte-buffer pool used by the capture and egress paths
//! to avoid per-packet allocation.
//!
//! Grounded on the `Pool`/`Free` split in
//! `s2n_quic_dc::socket::recv::pool` - that pool is an unsafe,
//! self-referential arena built to support GRO/segmented receives with
//! zero-copy descriptors. Nothing here needs segmented receives, so this
//! is the safe version: a `Mutex`-guarded free list of same-capacity
//! `Vec<u8>` buffers, with the pool itself just an `Arc` handle to that
//! list, keeping the same two-type shape (an owning `Pool` + a `Free`
//! list behind a lock).

use parking_lot::Mutex;
use std::sync::Arc;

struct Inner {
    capacity: usize,
    free: Mutex<Vec<Vec<u8>>>,
}

/// A cloneable handle to a pool of same-sized buffers.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<Inner>,
}

impl Pool {
    /// Creates a pool that hands out buffers of at least `capacity` bytes,
    /// pre-populated with `initial_count` idle buffers.
    pub fn new(capacity: usize, initial_count: usize) -> Self {
        let mut free = Vec::with_capacity(initial_count);
        for _ in 0..initial_count {
            free.push(vec![0u8; capacity]);
        }

        Self {
            inner: Arc::new(Inner {
                capacity,
                free: Mutex::new(free),
            }),
        }
    }

    /// Rents a buffer of at least `min_capacity` bytes from the pool,
    /// growing the pool's buffer if the request exceeds its size class.
    ///
    /// Contents of a freshly rented buffer are unspecified.
    #[inline]
    pub fn rent(&self, min_capacity: usize) -> Buffer {
        let mut buf = self
            .inner
            .free
            .lock()
            .pop()
            .unwrap_or_else(|| vec![0u8; self.inner.capacity]);

        if buf.len() < min_capacity {
            buf.resize(min_capacity, 0);
        }

        Buffer {
            data: buf,
            pool: self.inner.clone(),
        }
    }
}

/// A buffer rented from a [`Pool`]. Returned to the pool automatically on
/// drop; must not be used after that.
pub struct Buffer {
    data: Vec<u8>,
    pool: Arc<Inner>,
}

impl std::ops::Deref for Buffer {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl std::ops::DerefMut for Buffer {
    #[inline]
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for Buffer {
    #[inline]
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.data);
        self.pool.free.lock().push(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rent_returns_requested_capacity() {
        let pool = Pool::new(64, 2);
        let buf = pool.rent(64);
        assert_eq!(buf.len(), 64);
    }

    #[test]
    fn rent_grows_for_larger_request() {
        let pool = Pool::new(64, 1);
        let buf = pool.rent(128);
        assert_eq!(buf.len(), 128);
    }

    #[test]
    fn buffers_are_reused_after_drop() {
        let pool = Pool::new(32, 1);
        {
            let _buf = pool.rent(32);
            assert_eq!(pool.inner.free.lock().len(), 0);
        }
        assert_eq!(pool.inner.free.lock().len(), 1);
    }

    #[test]
    fn concurrent_rent_and_return_is_safe() {
        let pool = Pool::new(65_536, 4);
        std::thread::scope(|s| {
            for _ in 0..8 {
                let pool = pool.clone();
                s.spawn(move || {
                    for _ in 0..1000 {
                        let mut buf = pool.rent(65_536);
                        buf[0] = 1;
                    }
                });
            }
        });
    }
}

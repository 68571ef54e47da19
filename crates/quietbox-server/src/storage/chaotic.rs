//! Chaotic storage wrapper for fault injection testing
//!
//! Randomly fails operations so tests can check that the request handler
//! turns backend failures into `Failed` replies without corrupting state.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::sync::{Arc, Mutex};

use quietbox_proto::Identifier;

use super::{MailboxStorage, StorageError};

/// Chaotic storage wrapper that randomly injects failures
///
/// Delegates to an underlying storage but fails each operation with the
/// configured probability. A failed operation never reaches the inner
/// storage, so it has no effect. Uses `Arc<Mutex<>>` for the RNG state,
/// making it Clone and thread-safe.
#[derive(Clone)]
pub struct ChaoticStorage<S: MailboxStorage> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// RNG state for deterministic chaos
    rng: Arc<Mutex<ChaoticRng>>,
    /// Operations attempted, failed or not
    operation_count: Arc<Mutex<usize>>,
}

/// Linear congruential generator; reproducible for a given seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next value in [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // Numerical Recipes constants
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }

    fn should_fail(&mut self, failure_rate: f64) -> bool {
        self.next() < failure_rate
    }
}

impl<S: MailboxStorage> ChaoticStorage<S> {
    /// Wrap `inner` with a fixed default seed.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Wrap `inner` with an explicit seed for reproducible chaos.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            operation_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Underlying storage (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Total number of storage operations attempted.
    pub fn operation_count(&self) -> usize {
        #[allow(clippy::expect_used)]
        *self.operation_count.lock().expect("operation_count mutex poisoned")
    }

    /// Count the operation and decide whether it fails.
    fn inject(&self) -> Result<(), StorageError> {
        {
            #[allow(clippy::expect_used)]
            let mut count = self.operation_count.lock().expect("operation_count mutex poisoned");
            *count += 1;
        }

        #[allow(clippy::expect_used)]
        let fail = self.rng.lock().expect("ChaoticRng mutex poisoned").should_fail(self.failure_rate);
        if fail {
            return Err(StorageError::Io("chaotic failure injection".to_string()));
        }
        Ok(())
    }
}

impl<S: MailboxStorage> MailboxStorage for ChaoticStorage<S> {
    fn get(&self, identifier: &Identifier) -> Result<Option<Vec<u8>>, StorageError> {
        self.inject()?;
        self.inner.get(identifier)
    }

    fn insert_if_absent(&self, identifier: &Identifier, value: &[u8]) -> Result<bool, StorageError> {
        self.inject()?;
        self.inner.insert_if_absent(identifier, value)
    }

    fn remove(&self, identifier: &Identifier) -> Result<bool, StorageError> {
        self.inject()?;
        self.inner.remove(identifier)
    }

    fn len(&self) -> Result<usize, StorageError> {
        self.inject()?;
        self.inner.len()
    }
}

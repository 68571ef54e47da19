//! Environment abstraction for deterministic testing.
//!
//! Protocol code draws every random byte through [`Environment`], so tests can
//! replay a run exactly by swapping in a seeded implementation.

use rand::{CryptoRng, RngCore};

/// Source of randomness for protocol operations.
///
/// # Invariants
///
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - Given the same seed, a test implementation produces the same sequence
pub trait Environment: Clone + Send + Sync + 'static {
    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random fixed-size array.
    fn random_array<const N: usize>(&self) -> [u8; N] {
        let mut bytes = [0u8; N];
        self.random_bytes(&mut bytes);
        bytes
    }

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        u64::from_be_bytes(self.random_array())
    }
}

/// Production environment backed by the OS RNG.
///
/// # Panics
///
/// Panics if the OS RNG fails. Without working entropy no key, nonce or
/// revocation token can be generated safely.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}

/// Adapter exposing an [`Environment`] as a `rand` RNG.
///
/// Needed by primitives that take an RNG object (X25519 key generation,
/// RSA-OAEP padding).
pub struct EnvRng<'a, E: Environment>(&'a E);

impl<'a, E: Environment> EnvRng<'a, E> {
    /// Borrow `env` as an RNG.
    pub fn new(env: &'a E) -> Self {
        Self(env)
    }
}

impl<E: Environment> RngCore for EnvRng<'_, E> {
    fn next_u32(&mut self) -> u32 {
        u32::from_le_bytes(self.0.random_array())
    }

    fn next_u64(&mut self) -> u64 {
        u64::from_le_bytes(self.0.random_array())
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.random_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.0.random_bytes(dest);
        Ok(())
    }
}

// Sound as long as the wrapped environment honors the `Environment` contract.
impl<E: Environment> CryptoRng for EnvRng<'_, E> {}

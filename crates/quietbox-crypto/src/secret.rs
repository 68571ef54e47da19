//! Container for sensitive bytes.

use std::fmt;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use zeroize::ZeroizeOnDrop;

/// Fixed-size secret bytes.
///
/// Zeroized on drop, compared in constant time and never printed. Cloning is
/// possible but explicit; APIs hand out references wherever they can.
#[derive(Clone, Eq, Serialize, Deserialize, ZeroizeOnDrop)]
pub struct Secret<const N: usize>(#[serde(with = "serde_bytes")] [u8; N]);

impl<const N: usize> Secret<N> {
    /// Take ownership of secret bytes.
    pub fn from_bytes(bytes: [u8; N]) -> Self {
        Self(bytes)
    }

    /// Borrow the secret bytes.
    pub fn as_bytes(&self) -> &[u8; N] {
        &self.0
    }
}

impl<const N: usize> PartialEq for Secret<N> {
    fn eq(&self, other: &Self) -> bool {
        bool::from(self.0.ct_eq(&other.0))
    }
}

impl<const N: usize> fmt::Debug for Secret<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret").field("len", &N).field("value", &"***").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_value() {
        let secret = Secret::from_bytes([0x5A; 4]);
        let rendered = format!("{secret:?}");

        assert!(rendered.contains("***"));
        assert!(!rendered.contains("90"));
    }

    #[test]
    fn equality_compares_contents() {
        assert_eq!(Secret::from_bytes([1u8; 8]), Secret::from_bytes([1u8; 8]));
        assert_ne!(Secret::from_bytes([1u8; 8]), Secret::from_bytes([2u8; 8]));
    }
}

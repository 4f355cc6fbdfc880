/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    Value types shared by the PCR0 reproduction engine.

--*/

mod error;

pub use error::{Error, Result};

use core::fmt;

/// Hash algorithm of a PCR bank.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DigestAlg {
    /// Legacy SHA-1 bank (20-byte digests)
    Sha1,

    /// SHA-256 bank (32-byte digests)
    Sha256,
}

impl DigestAlg {
    /// Digest length in bytes produced by this algorithm.
    pub const fn output_len(&self) -> usize {
        match self {
            DigestAlg::Sha1 => 20,
            DigestAlg::Sha256 => 32,
        }
    }
}

/// A digest value from one of the supported algorithms.
///
/// Equality is byte equality; no algorithm tag is carried, the caller
/// fixes a single algorithm per reproduction call.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Digest(Vec<u8>);

impl Digest {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The all-zero reset value a PCR holds before the first extend.
    pub fn zeroed(alg: DigestAlg) -> Self {
        Self(vec![0u8; alg.output_len()])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Digest {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::LowerHex for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({self:x})")
    }
}

/// Identifier of one boot-time measurement kind.
///
/// Identity is the variant, not the position in the chain; the boot flow
/// defines the fixed order.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum MeasurementId {
    /// ACM and boot-policy data measured as the PCR0 initialization event
    Pcr0Data,

    /// Key-manifest digest, measured only when the ACM policy requests it
    KeyManifestDigest,

    /// Boot-policy-manifest digest, policy-gated
    BootPolicyManifestDigest,

    /// FIT table digest, policy-gated
    FitDigest,

    /// PCD firmware vendor version data
    PcdFirmwareVendorVersionData,

    /// EV_SEPARATOR event closing the static-root measurements
    Separator,

    /// Aggregate digest over the DXE volume
    DxeDigest,
}

/// One entry contributed to the PCR0 hash chain.
///
/// Whether the entry is actually extended is decided by the enablement
/// resolver for the active flow and register value, never stored here.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Measurement {
    /// Measurement kind
    pub id: MeasurementId,

    /// Content digest (length fixed by the active algorithm)
    pub digest: Digest,
}

impl Measurement {
    pub fn new(id: MeasurementId, digest: Digest) -> Self {
        Self { id, digest }
    }
}

/// Named boot flow: fixed measurement order plus conditional enablement
/// rules for a platform generation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BootFlow {
    /// Intel CBnT, profile 0T
    IntelCbnt0t,

    /// Legacy TXT measured launch
    IntelLegacyTxt,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_zeroed_len() {
        assert_eq!(Digest::zeroed(DigestAlg::Sha1).len(), 20);
        assert_eq!(Digest::zeroed(DigestAlg::Sha256).len(), 32);
        assert!(Digest::zeroed(DigestAlg::Sha1)
            .as_bytes()
            .iter()
            .all(|b| *b == 0));
    }

    #[test]
    fn test_digest_hex_format() {
        let digest = Digest::new(vec![0xf4, 0xd6, 0xd4, 0x80]);
        assert_eq!(format!("{digest:x}"), "f4d6d480");
        assert_eq!(format!("{digest:?}"), "Digest(f4d6d480)");
    }

    #[test]
    fn test_digest_equality_is_byte_equality() {
        let a = Digest::new(vec![1, 2, 3]);
        let b = Digest::from(vec![1, 2, 3]);
        assert_eq!(a, b);
        assert_ne!(a, Digest::new(vec![1, 2, 4]));
    }
}

/*++

Licensed under the Apache-2.0 license.

File Name:

    chain.rs

Abstract:

    Digest chain evaluator. Replays the sequential hash-extend
    operation `current = Hash(current || digest)` used by TPM PCRs.

--*/

use pcr0_types::{Digest, DigestAlg, Error, Result};
use sha1::Sha1;
use sha2::{Digest as _, Sha256};

/// Extend `current` in place with `digest`: `current = Hash(current || digest)`.
///
/// Lengths must already be validated against `alg`; this is the hot
/// path shared by every search candidate.
pub(crate) fn extend_into(alg: DigestAlg, current: &mut Vec<u8>, digest: &[u8]) {
    match alg {
        DigestAlg::Sha1 => {
            let mut hasher = Sha1::new();
            hasher.update(&*current);
            hasher.update(digest);
            current.clear();
            current.extend_from_slice(&hasher.finalize());
        }
        DigestAlg::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(&*current);
            hasher.update(digest);
            current.clear();
            current.extend_from_slice(&hasher.finalize());
        }
    }
}

/// Replay a hash-extend chain over `digests`, in order, starting from
/// `initial`, and return the final accumulated digest.
///
/// `digests` must already be filtered to enabled measurements. Any
/// digest whose length does not match `alg` is a fatal input error.
pub fn evaluate<'a, I>(alg: DigestAlg, initial: &Digest, digests: I) -> Result<Digest>
where
    I: IntoIterator<Item = &'a Digest>,
{
    let expected = alg.output_len();
    if initial.len() != expected {
        return Err(Error::DigestLengthMismatch {
            alg,
            expected,
            actual: initial.len(),
        });
    }

    let mut current = initial.as_bytes().to_vec();
    for digest in digests {
        if digest.len() != expected {
            return Err(Error::DigestLengthMismatch {
                alg,
                expected,
                actual: digest.len(),
            });
        }
        extend_into(alg, &mut current, digest.as_bytes());
    }
    Ok(Digest::new(current))
}

/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    PCR0 reproduction engine. Determines whether an observed PCR0
    digest is explainable by a corrected status register value and/or
    a subset of disabled measurements, via a bounded search over the
    hash-extend chain.

--*/

pub mod chain;
pub mod enablement;
pub mod registers;
mod search;
mod settings;

pub use pcr0_types::{BootFlow, Digest, DigestAlg, Error, Measurement, MeasurementId, Result};
pub use settings::{CancelToken, ReproduceSettings};

use crate::registers::AcmPolicyStatus;
use log::debug;
use std::collections::BTreeSet;
use std::time::Instant;

/// Explanation of an observed PCR0 digest.
#[derive(Debug, Clone)]
pub struct ReproductionResult {
    /// Register value that reproduces the target digest
    pub corrected_register: AcmPolicyStatus,

    /// Measurements force-disabled to obtain the match, in chain order;
    /// empty when the baseline or linear phase matched
    pub disabled_measurements: Vec<Measurement>,
}

/// Outcome of a reproduction attempt.
///
/// `NotFound` is a first-class result, not an error: the observed
/// digest is unexplainable within the configured bounds and should be
/// treated as a potential integrity failure. `interrupted` marks a
/// search abandoned on deadline or cancellation, so the caller can
/// retry with a larger bound instead of concluding non-explainability.
#[derive(Debug, Clone)]
pub enum Outcome {
    Found(ReproductionResult),
    NotFound { interrupted: bool },
}

impl Outcome {
    pub fn is_found(&self) -> bool {
        matches!(self, Outcome::Found(_))
    }

    pub fn result(&self) -> Option<&ReproductionResult> {
        match self {
            Outcome::Found(result) => Some(result),
            Outcome::NotFound { .. } => None,
        }
    }
}

/// Search for a register correction and/or disabled-measurement subset
/// that reproduces `target_pcr0` from `measurements`.
///
/// `measurements` is the ordered list extracted from the firmware for
/// `flow`; `register` is the raw ACM Policy Status value as read, which
/// may be corrupted. All digest lengths must match `alg`; mismatches,
/// unsupported flows and malformed settings are input errors and the
/// search never starts.
pub fn reproduce_expected_pcr0(
    target_pcr0: &Digest,
    alg: DigestAlg,
    flow: BootFlow,
    measurements: &[Measurement],
    register: AcmPolicyStatus,
    settings: &ReproduceSettings,
) -> Result<Outcome> {
    settings.validate()?;

    let expected = alg.output_len();
    if target_pcr0.len() != expected {
        return Err(Error::DigestLengthMismatch {
            alg,
            expected,
            actual: target_pcr0.len(),
        });
    }

    let rules = enablement::flow_rules(flow)?;
    let mut seen = BTreeSet::new();
    for measurement in measurements {
        if measurement.digest.len() != expected {
            return Err(Error::DigestLengthMismatch {
                alg,
                expected,
                actual: measurement.digest.len(),
            });
        }
        if !rules.iter().any(|entry| entry.id == measurement.id) {
            return Err(Error::UnknownMeasurement {
                flow,
                id: measurement.id,
            });
        }
        if !seen.insert(measurement.id) {
            return Err(Error::DuplicateMeasurement(measurement.id));
        }
    }

    let deadline = settings.deadline.map(|timeout| Instant::now() + timeout);
    let searcher = search::Searcher::new(
        alg,
        target_pcr0.as_bytes(),
        measurements,
        rules,
        enablement::omittable_ids(flow)?,
        settings,
        deadline,
    );

    debug!(
        "reproducing PCR0 {target_pcr0:x} for {flow:?} from {} measurements, register {register:?}",
        measurements.len()
    );

    match searcher.run(register) {
        Some(found) => Ok(Outcome::Found(ReproductionResult {
            corrected_register: found.register,
            disabled_measurements: measurements
                .iter()
                .filter(|measurement| found.disabled.contains(&measurement.id))
                .cloned()
                .collect(),
        })),
        None => Ok(Outcome::NotFound {
            interrupted: searcher.interrupted(),
        }),
    }
}

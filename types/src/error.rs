// Licensed under the Apache-2.0 license

use crate::{BootFlow, DigestAlg, MeasurementId};

/// Input errors that prevent a reproduction search from starting.
///
/// Search exhaustion is not an error; it is reported as a first-class
/// not-found outcome by the engine.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("digest is {actual} bytes, {alg:?} produces {expected}")]
    DigestLengthMismatch {
        alg: DigestAlg,
        expected: usize,
        actual: usize,
    },

    #[error("boot flow {0:?} is not supported")]
    UnsupportedFlow(BootFlow),

    #[error("measurement {id:?} is not part of flow {flow:?}")]
    UnknownMeasurement { flow: BootFlow, id: MeasurementId },

    #[error("measurement {0:?} supplied more than once")]
    DuplicateMeasurement(MeasurementId),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

pub type Result<T> = core::result::Result<T, Error>;

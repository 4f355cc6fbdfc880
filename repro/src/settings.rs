/*++

Licensed under the Apache-2.0 license.

File Name:

    settings.rs

Abstract:

    Search settings and cancellation token for the PCR0 reproduction
    engine.

--*/

use pcr0_types::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cloneable handle used to stop a running search from another thread.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the search stop at the next batch boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Tunables for [`reproduce_expected_pcr0`](crate::reproduce_expected_pcr0).
///
/// The defaults keep the search cheap: the combinatorial phase is off
/// until explicitly enabled.
#[derive(Clone, Debug)]
pub struct ReproduceSettings {
    /// Escalate beyond single/low-order bit flips to disabling subsets
    /// of BIOS-omittable measurements.
    pub enable_combinatorial_strategy: bool,

    /// Upper bound on simultaneous register bit flips tried.
    pub max_bit_flips: usize,

    /// Upper bound on the size of disabled-measurement subsets tried by
    /// the combinatorial phase.
    pub max_disabled_measurements: usize,

    /// Worker threads evaluating candidates.
    pub worker_count: usize,

    /// Wall-clock bound on the whole search.
    pub deadline: Option<Duration>,

    /// External cancellation handle.
    pub cancel: Option<CancelToken>,
}

impl Default for ReproduceSettings {
    fn default() -> Self {
        Self {
            enable_combinatorial_strategy: false,
            max_bit_flips: 3,
            max_disabled_measurements: 2,
            worker_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            deadline: None,
            cancel: None,
        }
    }
}

impl ReproduceSettings {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(Error::InvalidSettings("worker_count must be >= 1".into()));
        }
        if self.max_bit_flips > 64 {
            return Err(Error::InvalidSettings(
                "max_bit_flips exceeds the register width".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = ReproduceSettings::default();
        assert!(!settings.enable_combinatorial_strategy);
        assert_eq!(settings.max_bit_flips, 3);
        assert_eq!(settings.max_disabled_measurements, 2);
        assert!(settings.worker_count >= 1);
        assert!(settings.deadline.is_none());
        settings.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_bounds() {
        let settings = ReproduceSettings {
            worker_count: 0,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(Error::InvalidSettings(_))
        ));

        let settings = ReproduceSettings {
            max_bit_flips: 65,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(Error::InvalidSettings(_))
        ));
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}

/*++

Licensed under the Apache-2.0 license.

File Name:

    search.rs

Abstract:

    Search strategy engine. Explores candidate register values and
    disabled-measurement subsets in escalating phases, evaluating the
    hash-extend chain for each candidate until one reproduces the
    target PCR0 digest.

--*/

use crate::chain;
use crate::enablement::{FlowEntry, Rule};
use crate::registers::{AcmPolicyStatus, ACM_POLICY_STATUS};
use crate::settings::ReproduceSettings;
use log::debug;
use pcr0_types::{DigestAlg, Measurement, MeasurementId};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Candidates handed to a worker per pull from the shared index.
const CHUNK_SIZE: usize = 1024;

/// Bit masks drawn from the lazy enumerator per worker-pool round.
/// Bounds the memory of a Hamming-distance level regardless of how
/// many combinations the level holds.
const BLOCK_SIZE: usize = 1 << 16;

/// A candidate that reproduced the target digest.
#[derive(Debug, Clone)]
pub(crate) struct SearchMatch {
    pub register: AcmPolicyStatus,

    /// Measurements force-disabled on top of the register's enablement,
    /// in chain order.
    pub disabled: Vec<MeasurementId>,
}

pub(crate) struct Searcher<'a> {
    alg: DigestAlg,
    target: &'a [u8],

    /// (rule, id, digest) per caller-supplied measurement, in chain order
    entries: Vec<(Rule, MeasurementId, &'a [u8])>,

    /// Combinatorial-phase candidates present in the supplied measurements
    omittable: Vec<MeasurementId>,

    settings: &'a ReproduceSettings,
    deadline: Option<Instant>,
    stop: AtomicBool,
    interrupted: AtomicBool,
}

impl<'a> Searcher<'a> {
    pub fn new(
        alg: DigestAlg,
        target: &'a [u8],
        measurements: &'a [Measurement],
        rules: &'static [FlowEntry],
        omittable: Vec<MeasurementId>,
        settings: &'a ReproduceSettings,
        deadline: Option<Instant>,
    ) -> Self {
        let entries = measurements
            .iter()
            .filter_map(|m| {
                rules
                    .iter()
                    .find(|entry| entry.id == m.id)
                    .map(|entry| (entry.rule, m.id, m.digest.as_bytes()))
            })
            .collect::<Vec<_>>();
        let omittable = omittable
            .into_iter()
            .filter(|id| entries.iter().any(|(_, entry_id, _)| entry_id == id))
            .collect();
        Self {
            alg,
            target,
            entries,
            omittable,
            settings,
            deadline,
            stop: AtomicBool::new(false),
            interrupted: AtomicBool::new(false),
        }
    }

    /// Whether the search stopped on deadline expiry or external
    /// cancellation rather than by exhausting its bounded space.
    pub fn interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    /// Run all enabled phases and return the first match, if any.
    pub fn run(&self, register: AcmPolicyStatus) -> Option<SearchMatch> {
        // Phase 1: the supplied register, nothing disabled.
        if !self.should_stop() && self.chain_matches(register, &[], &mut Vec::new()) {
            debug!("baseline register {register:?} reproduces the target");
            return Some(SearchMatch {
                register,
                disabled: Vec::new(),
            });
        }

        // Phase 2: registers at increasing Hamming distance.
        for flips in 1..=self.settings.max_bit_flips {
            if self.should_stop() {
                return None;
            }
            debug!("linear phase: distance {flips}");
            if let Some(found) = self.run_distance_level(register, flips, &[Vec::new()]) {
                return Some(found);
            }
        }

        // Phase 3: register candidates crossed with disabled-measurement
        // subsets, register-distance-major so cheaper explanations win.
        if self.settings.enable_combinatorial_strategy {
            let subsets =
                disable_subsets(&self.omittable, self.settings.max_disabled_measurements);
            if !subsets.is_empty() {
                for flips in 0..=self.settings.max_bit_flips {
                    if self.should_stop() {
                        return None;
                    }
                    debug!(
                        "combinatorial phase: {} subsets at distance {flips}",
                        subsets.len()
                    );
                    if let Some(found) = self.run_distance_level(register, flips, &subsets) {
                        return Some(found);
                    }
                }
            }
        }

        None
    }

    /// Evaluate one Hamming-distance level, streaming masks from the
    /// lazy enumerator in bounded blocks so memory stays small even for
    /// levels with billions of combinations, and so the deadline is
    /// consulted while the level is still being generated.
    fn run_distance_level(
        &self,
        base: AcmPolicyStatus,
        flips: usize,
        subsets: &[Vec<MeasurementId>],
    ) -> Option<SearchMatch> {
        let mut masks = bit_masks(ACM_POLICY_STATUS.bits, flips);
        let mut block = Vec::with_capacity(BLOCK_SIZE);
        loop {
            if self.should_stop() {
                return None;
            }
            block.clear();
            block.extend(masks.by_ref().take(BLOCK_SIZE));
            if block.is_empty() {
                return None;
            }
            if let Some(found) = self.run_level(base, &block, subsets) {
                return Some(found);
            }
        }
    }

    /// Evaluate one block of a level across the worker pool.
    ///
    /// Workers pull fixed-size chunks of the (mask, subset) cross
    /// product through an atomic index; the first match wins the slot
    /// and raises the stop flag. The pool joins before returning, so
    /// ordering across levels stays deterministic.
    fn run_level(
        &self,
        base: AcmPolicyStatus,
        masks: &[u64],
        subsets: &[Vec<MeasurementId>],
    ) -> Option<SearchMatch> {
        let total = masks.len() * subsets.len();
        if total == 0 {
            return None;
        }
        let workers = self
            .settings
            .worker_count
            .min((total + CHUNK_SIZE - 1) / CHUNK_SIZE)
            .max(1);
        let next = AtomicUsize::new(0);
        let winner: Mutex<Option<SearchMatch>> = Mutex::new(None);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    let mut scratch = Vec::with_capacity(self.alg.output_len());
                    loop {
                        if self.should_stop() {
                            break;
                        }
                        let start = next.fetch_add(CHUNK_SIZE, Ordering::Relaxed);
                        if start >= total {
                            break;
                        }
                        let end = (start + CHUNK_SIZE).min(total);
                        for idx in start..end {
                            // Stop mid-chunk too: a raised flag must not
                            // wait out the in-flight batch.
                            if self.stop.load(Ordering::Acquire) {
                                return;
                            }
                            let register = base.xor(masks[idx / subsets.len()]);
                            let disabled = &subsets[idx % subsets.len()];
                            if self.chain_matches(register, disabled, &mut scratch) {
                                let mut slot = winner.lock().unwrap();
                                // First writer wins; later matches are dropped.
                                if slot.is_none() {
                                    *slot = Some(SearchMatch {
                                        register,
                                        disabled: disabled.clone(),
                                    });
                                }
                                self.stop.store(true, Ordering::Release);
                                break;
                            }
                        }
                    }
                });
            }
        });

        winner.into_inner().unwrap()
    }

    /// Replay the chain for one candidate and compare against the target.
    fn chain_matches(
        &self,
        register: AcmPolicyStatus,
        disabled: &[MeasurementId],
        scratch: &mut Vec<u8>,
    ) -> bool {
        scratch.clear();
        scratch.resize(self.alg.output_len(), 0);
        for (rule, id, digest) in &self.entries {
            if rule.enabled(register) && !disabled.contains(id) {
                chain::extend_into(self.alg, scratch, digest);
            }
        }
        scratch.as_slice() == self.target
    }

    fn should_stop(&self) -> bool {
        if self.stop.load(Ordering::Acquire) {
            return true;
        }
        let expired = self.deadline.is_some_and(|d| Instant::now() >= d);
        let cancelled = self
            .settings
            .cancel
            .as_ref()
            .is_some_and(|token| token.is_cancelled());
        if expired || cancelled {
            self.interrupted.store(true, Ordering::Release);
            self.stop.store(true, Ordering::Release);
            return true;
        }
        false
    }
}

/// Lazy enumerator of all bit masks over `n` positions with exactly
/// `k` bits set, in lexicographic order of the bit-position subsets.
/// O(k) state; never materializes the combination space.
struct BitMasks {
    n: usize,
    idx: Vec<usize>,
    done: bool,
}

impl Iterator for BitMasks {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.done {
            return None;
        }
        let mask = self.idx.iter().fold(0u64, |mask, &bit| mask | (1u64 << bit));
        let k = self.idx.len();
        let mut i = k;
        while i > 0 && self.idx[i - 1] == self.n - k + (i - 1) {
            i -= 1;
        }
        if i == 0 {
            self.done = true;
        } else {
            self.idx[i - 1] += 1;
            for j in i..k {
                self.idx[j] = self.idx[j - 1] + 1;
            }
        }
        Some(mask)
    }
}

fn bit_masks(bits: u8, flips: usize) -> BitMasks {
    let n = bits as usize;
    BitMasks {
        n,
        idx: (0..flips).collect(),
        done: flips > n,
    }
}

/// Non-empty subsets of `ids` up to `max_size` elements, ordered by
/// size then lexicographic position, elements in chain order.
fn disable_subsets(ids: &[MeasurementId], max_size: usize) -> Vec<Vec<MeasurementId>> {
    let mut out = Vec::new();
    for size in 1..=max_size.min(ids.len()) {
        for mask in bit_masks(ids.len() as u8, size) {
            out.push(
                ids.iter()
                    .enumerate()
                    .filter(|(i, _)| mask & (1 << i) != 0)
                    .map(|(_, id)| *id)
                    .collect(),
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_masks_counts() {
        assert_eq!(bit_masks(64, 0).collect::<Vec<_>>(), vec![0]);
        assert_eq!(bit_masks(64, 1).count(), 64);
        assert_eq!(bit_masks(64, 2).count(), 64 * 63 / 2);
        assert_eq!(bit_masks(5, 2).count(), 10);
        assert_eq!(bit_masks(3, 4).next(), None);
    }

    #[test]
    fn test_bit_masks_lexicographic() {
        assert_eq!(
            bit_masks(4, 2).collect::<Vec<_>>(),
            vec![0b0011, 0b0101, 0b1001, 0b0110, 0b1010, 0b1100]
        );
        assert_eq!(bit_masks(3, 3).collect::<Vec<_>>(), vec![0b111]);
        // Distance-1 masks over the full register width.
        let singles: Vec<u64> = bit_masks(64, 1).collect();
        assert_eq!(singles[0], 1);
        assert_eq!(singles[63], 1 << 63);
    }

    #[test]
    fn test_bit_masks_streams_without_materializing() {
        // C(64, 8) is in the billions; drawing the head of the level
        // must cost O(k) state, not the whole combination space.
        let mut masks = bit_masks(64, 8);
        assert_eq!(masks.next(), Some(0xff));
        assert_eq!(masks.next(), Some(0x17f));
        assert_eq!(masks.nth(997), Some(bit_masks(64, 8).nth(999).unwrap()));
    }

    #[test]
    fn test_disable_subsets_size_then_lex() {
        let ids = [
            MeasurementId::PcdFirmwareVendorVersionData,
            MeasurementId::Separator,
        ];
        assert_eq!(
            disable_subsets(&ids, 2),
            vec![
                vec![MeasurementId::PcdFirmwareVendorVersionData],
                vec![MeasurementId::Separator],
                vec![
                    MeasurementId::PcdFirmwareVendorVersionData,
                    MeasurementId::Separator
                ],
            ]
        );
        assert_eq!(disable_subsets(&ids, 0), Vec::<Vec<MeasurementId>>::new());
        assert_eq!(disable_subsets(&[], 2), Vec::<Vec<MeasurementId>>::new());
    }
}

/*++

Licensed under the Apache-2.0 license.

File Name:

    enablement.rs

Abstract:

    Measurement enablement resolver. Per-flow static rule tables map a
    register value to the set of measurements present in the PCR0
    chain, and back from a desired enablement pattern to the register
    field constraints consistent with it.

--*/

use crate::registers::{
    AcmPolicyStatus, RegisterField, MEASURE_BPM_DIGEST, MEASURE_FIT_DIGEST, MEASURE_KM_DIGEST,
    MEASURE_VENDOR_VERSION,
};
use pcr0_types::{BootFlow, Error, MeasurementId, Result};
use std::collections::BTreeMap;

/// Enablement rule for one measurement kind within a flow.
#[derive(Debug, Copy, Clone)]
pub enum Rule {
    /// Unconditionally present
    Always,

    /// Present only when the register field holds `expected`
    Field {
        field: &'static RegisterField,
        expected: u64,
    },
}

impl Rule {
    pub fn enabled(&self, register: AcmPolicyStatus) -> bool {
        match self {
            Rule::Always => true,
            Rule::Field { field, expected } => register.field(field) == *expected,
        }
    }
}

/// One entry of a flow's measurement table, in chain order.
#[derive(Debug, Copy, Clone)]
pub struct FlowEntry {
    pub id: MeasurementId,
    pub rule: Rule,

    /// Whether a BIOS configuration may omit this measurement
    /// independently of the register; these are the candidates of the
    /// combinatorial search phase.
    pub bios_omittable: bool,
}

/// Intel CBnT profile 0T: fixed order and conditional presence of the
/// PCR0 measurements.
const INTEL_CBNT_0T: &[FlowEntry] = &[
    FlowEntry {
        id: MeasurementId::Pcr0Data,
        rule: Rule::Always,
        bios_omittable: false,
    },
    FlowEntry {
        id: MeasurementId::KeyManifestDigest,
        rule: Rule::Field {
            field: &MEASURE_KM_DIGEST,
            expected: 1,
        },
        bios_omittable: false,
    },
    FlowEntry {
        id: MeasurementId::BootPolicyManifestDigest,
        rule: Rule::Field {
            field: &MEASURE_BPM_DIGEST,
            expected: 1,
        },
        bios_omittable: false,
    },
    FlowEntry {
        id: MeasurementId::FitDigest,
        rule: Rule::Field {
            field: &MEASURE_FIT_DIGEST,
            expected: 1,
        },
        bios_omittable: false,
    },
    FlowEntry {
        id: MeasurementId::PcdFirmwareVendorVersionData,
        rule: Rule::Field {
            field: &MEASURE_VENDOR_VERSION,
            expected: 1,
        },
        bios_omittable: true,
    },
    // The separator closes the vendor-version event group; a BIOS
    // setting that omits the group omits the separator with it.
    FlowEntry {
        id: MeasurementId::Separator,
        rule: Rule::Always,
        bios_omittable: true,
    },
    FlowEntry {
        id: MeasurementId::DxeDigest,
        rule: Rule::Always,
        bios_omittable: false,
    },
];

/// The measurement table of `flow`, or an input error for flows the
/// engine does not support.
pub fn flow_rules(flow: BootFlow) -> Result<&'static [FlowEntry]> {
    match flow {
        BootFlow::IntelCbnt0t => Ok(INTEL_CBNT_0T),
        BootFlow::IntelLegacyTxt => Err(Error::UnsupportedFlow(flow)),
    }
}

/// Enablement mapping for `(register, flow)`. Deterministic and total
/// for supported flows.
pub fn enablement_for(
    register: AcmPolicyStatus,
    flow: BootFlow,
) -> Result<BTreeMap<MeasurementId, bool>> {
    let rules = flow_rules(flow)?;
    Ok(rules
        .iter()
        .map(|entry| (entry.id, entry.rule.enabled(register)))
        .collect())
}

/// Measurements of `flow` that a BIOS configuration may omit, in chain
/// order.
pub fn omittable_ids(flow: BootFlow) -> Result<Vec<MeasurementId>> {
    let rules = flow_rules(flow)?;
    Ok(rules
        .iter()
        .filter(|entry| entry.bios_omittable)
        .map(|entry| entry.id)
        .collect())
}

/// Register field constraint implied by a desired enablement pattern.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FieldConstraint {
    pub field: &'static RegisterField,

    /// Field value that enables the measurement
    pub expected: u64,

    /// Whether the pattern wants the measurement enabled; when false
    /// the field must hold anything but `expected`.
    pub enabled: bool,
}

impl FieldConstraint {
    pub fn satisfied_by(&self, register: AcmPolicyStatus) -> bool {
        (register.field(self.field) == self.expected) == self.enabled
    }
}

/// Reverse query: the register field assignments consistent with a
/// desired enablement pattern. Pattern entries for unconditional
/// measurements are rejected when they ask for the impossible
/// (disabling an always-present measurement via the register).
pub fn constraints_for(
    pattern: &BTreeMap<MeasurementId, bool>,
    flow: BootFlow,
) -> Result<Vec<FieldConstraint>> {
    let rules = flow_rules(flow)?;
    let mut constraints = Vec::new();
    for (id, enabled) in pattern {
        let entry = rules
            .iter()
            .find(|entry| entry.id == *id)
            .ok_or(Error::UnknownMeasurement { flow, id: *id })?;
        if let Rule::Field { field, expected } = entry.rule {
            constraints.push(FieldConstraint {
                field,
                expected,
                enabled: *enabled,
            });
        }
    }
    Ok(constraints)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORRECT_RAW: u64 = 0x0000000200108681;

    #[test]
    fn test_enablement_for_correct_register() {
        let register = AcmPolicyStatus::new(CORRECT_RAW);
        let map = enablement_for(register, BootFlow::IntelCbnt0t).unwrap();
        assert_eq!(map[&MeasurementId::Pcr0Data], true);
        assert_eq!(map[&MeasurementId::KeyManifestDigest], false);
        assert_eq!(map[&MeasurementId::BootPolicyManifestDigest], false);
        assert_eq!(map[&MeasurementId::FitDigest], false);
        assert_eq!(map[&MeasurementId::PcdFirmwareVendorVersionData], true);
        assert_eq!(map[&MeasurementId::Separator], true);
        assert_eq!(map[&MeasurementId::DxeDigest], true);
    }

    #[test]
    fn test_register_bits_change_enablement() {
        let register = AcmPolicyStatus::new(CORRECT_RAW).flip_bits(&[2]);
        let map = enablement_for(register, BootFlow::IntelCbnt0t).unwrap();
        assert_eq!(map[&MeasurementId::KeyManifestDigest], true);

        let register = AcmPolicyStatus::new(CORRECT_RAW).flip_bits(&[7]);
        let map = enablement_for(register, BootFlow::IntelCbnt0t).unwrap();
        assert_eq!(map[&MeasurementId::PcdFirmwareVendorVersionData], false);
        // The separator stays: only a BIOS configuration omits it.
        assert_eq!(map[&MeasurementId::Separator], true);
    }

    #[test]
    fn test_unsupported_flow() {
        let register = AcmPolicyStatus::new(CORRECT_RAW);
        assert_eq!(
            enablement_for(register, BootFlow::IntelLegacyTxt).unwrap_err(),
            Error::UnsupportedFlow(BootFlow::IntelLegacyTxt)
        );
    }

    #[test]
    fn test_omittable_ids_in_chain_order() {
        assert_eq!(
            omittable_ids(BootFlow::IntelCbnt0t).unwrap(),
            vec![
                MeasurementId::PcdFirmwareVendorVersionData,
                MeasurementId::Separator,
            ]
        );
    }

    #[test]
    fn test_constraints_round_trip() {
        let register = AcmPolicyStatus::new(CORRECT_RAW);
        let pattern = enablement_for(register, BootFlow::IntelCbnt0t).unwrap();
        let constraints = constraints_for(&pattern, BootFlow::IntelCbnt0t).unwrap();
        // Four gated measurements, four constraints, all satisfied by
        // the register that produced the pattern.
        assert_eq!(constraints.len(), 4);
        assert!(constraints.iter().all(|c| c.satisfied_by(register)));
        assert!(!constraints
            .iter()
            .all(|c| c.satisfied_by(register.flip_bits(&[7]))));
    }
}

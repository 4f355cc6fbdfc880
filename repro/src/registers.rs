/*++

Licensed under the Apache-2.0 license.

File Name:

    registers.rs

Abstract:

    Status register model. Field layouts are static tables; decode,
    encode and bit-flip operations are driven by the table, not by
    per-field code.

--*/

use core::fmt;

/// One named field within a status register.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RegisterField {
    pub name: &'static str,

    /// Bit offset of the least significant bit
    pub offset: u8,

    /// Width in bits
    pub width: u8,
}

impl RegisterField {
    /// Mask covering this field within the raw register value.
    pub const fn mask(&self) -> u64 {
        (((1u128 << self.width) - 1) as u64) << self.offset
    }

    /// Field value held in `raw`.
    pub const fn extract(&self, raw: u64) -> u64 {
        (raw & self.mask()) >> self.offset
    }

    /// `raw` with this field replaced by `value` (masked to the field width).
    pub const fn insert(&self, raw: u64, value: u64) -> u64 {
        (raw & !self.mask()) | ((value << self.offset) & self.mask())
    }
}

/// Static layout of a register type.
#[derive(Debug, Copy, Clone)]
pub struct RegisterLayout {
    pub name: &'static str,

    /// Register width in bits
    pub bits: u8,

    pub fields: &'static [RegisterField],
}

impl RegisterLayout {
    /// Field descriptor by name.
    pub fn field(&self, name: &str) -> Option<&'static RegisterField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Decode `raw` into (field name, value) pairs, in layout order.
    pub fn decode(&self, raw: u64) -> Vec<(&'static str, u64)> {
        self.fields.iter().map(|f| (f.name, f.extract(raw))).collect()
    }

    /// Encode (field name, value) pairs into a raw value. Unnamed bits
    /// stay zero; unknown names are ignored.
    pub fn encode(&self, values: &[(&str, u64)]) -> u64 {
        let mut raw = 0;
        for (name, value) in values {
            if let Some(field) = self.field(name) {
                raw = field.insert(raw, *value);
            }
        }
        raw
    }
}

pub const KEY_MANIFEST_ID: RegisterField = RegisterField {
    name: "key_manifest_id",
    offset: 0,
    width: 2,
};
pub const MEASURE_KM_DIGEST: RegisterField = RegisterField {
    name: "measure_km_digest",
    offset: 2,
    width: 1,
};
pub const MEASURE_BPM_DIGEST: RegisterField = RegisterField {
    name: "measure_bpm_digest",
    offset: 3,
    width: 1,
};
pub const MEASURE_FIT_DIGEST: RegisterField = RegisterField {
    name: "measure_fit_digest",
    offset: 4,
    width: 1,
};
pub const MEASURE_VENDOR_VERSION: RegisterField = RegisterField {
    name: "measure_vendor_version",
    offset: 7,
    width: 1,
};
pub const BACKUP_ACTION: RegisterField = RegisterField {
    name: "backup_action",
    offset: 9,
    width: 2,
};
pub const TPM_TYPE: RegisterField = RegisterField {
    name: "tpm_type",
    offset: 11,
    width: 2,
};
pub const TPM_SUCCESS: RegisterField = RegisterField {
    name: "tpm_success",
    offset: 13,
    width: 1,
};
pub const DMA_PROTECTION: RegisterField = RegisterField {
    name: "dma_protection",
    offset: 15,
    width: 1,
};
pub const SCRTM_STATUS: RegisterField = RegisterField {
    name: "scrtm_status",
    offset: 20,
    width: 1,
};
pub const CPU_COSIGNING: RegisterField = RegisterField {
    name: "cpu_cosigning",
    offset: 33,
    width: 1,
};

/// ACM Policy Status register (Intel CBnT).
///
/// The `measure_*` fields gate which optional measurements the ACM
/// extends into PCR0; the remaining fields are carried for decoding
/// only and have no effect on the chain.
pub const ACM_POLICY_STATUS: RegisterLayout = RegisterLayout {
    name: "ACM_POLICY_STATUS",
    bits: 64,
    fields: &[
        KEY_MANIFEST_ID,
        MEASURE_KM_DIGEST,
        MEASURE_BPM_DIGEST,
        MEASURE_FIT_DIGEST,
        MEASURE_VENDOR_VERSION,
        BACKUP_ACTION,
        TPM_TYPE,
        TPM_SUCCESS,
        DMA_PROTECTION,
        SCRTM_STATUS,
        CPU_COSIGNING,
    ],
};

/// Raw ACM Policy Status value.
///
/// Two registers are equal iff their raw values are equal. Semantic
/// plausibility of a value is the enablement resolver's concern.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct AcmPolicyStatus(u64);

impl AcmPolicyStatus {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u64 {
        self.0
    }

    /// Value of one field of [`ACM_POLICY_STATUS`].
    pub const fn field(&self, field: &RegisterField) -> u64 {
        field.extract(self.0)
    }

    /// XOR the given mask into the raw value.
    pub const fn xor(&self, mask: u64) -> Self {
        Self(self.0 ^ mask)
    }

    /// Flip the given bit positions.
    pub fn flip_bits(&self, bits: &[u8]) -> Self {
        let mask = bits.iter().fold(0u64, |m, b| m | (1u64 << b));
        self.xor(mask)
    }

    /// Hamming distance between the raw values.
    pub const fn distance(&self, other: &Self) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    /// Decoded (field name, value) view.
    pub fn decode(&self) -> Vec<(&'static str, u64)> {
        ACM_POLICY_STATUS.decode(self.0)
    }
}

impl fmt::Debug for AcmPolicyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AcmPolicyStatus({:#018x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: u64 = 0x0000000200108681;

    #[test]
    fn test_field_extract() {
        let reg = AcmPolicyStatus::new(RAW);
        assert_eq!(reg.field(&KEY_MANIFEST_ID), 0b01);
        assert_eq!(reg.field(&MEASURE_KM_DIGEST), 0);
        assert_eq!(reg.field(&MEASURE_BPM_DIGEST), 0);
        assert_eq!(reg.field(&MEASURE_FIT_DIGEST), 0);
        assert_eq!(reg.field(&MEASURE_VENDOR_VERSION), 1);
        assert_eq!(reg.field(&BACKUP_ACTION), 0b11);
        assert_eq!(reg.field(&DMA_PROTECTION), 1);
        assert_eq!(reg.field(&SCRTM_STATUS), 1);
        assert_eq!(reg.field(&CPU_COSIGNING), 1);
    }

    #[test]
    fn test_field_insert_masks_value() {
        let raw = MEASURE_VENDOR_VERSION.insert(0, 0xff);
        assert_eq!(raw, 1 << 7);
        assert_eq!(KEY_MANIFEST_ID.insert(raw, 0b10), (1 << 7) | 0b10);
    }

    #[test]
    fn test_layout_decode_encode() {
        let decoded = ACM_POLICY_STATUS.decode(RAW);
        let reencoded = ACM_POLICY_STATUS.encode(
            &decoded
                .iter()
                .map(|(name, value)| (*name, *value))
                .collect::<Vec<_>>(),
        );
        // Only named bits survive the round trip.
        let named_mask = ACM_POLICY_STATUS
            .fields
            .iter()
            .fold(0u64, |m, f| m | f.mask());
        assert_eq!(reencoded, RAW & named_mask);
    }

    #[test]
    fn test_flip_bits() {
        let reg = AcmPolicyStatus::new(RAW);
        let flipped = reg.flip_bits(&[2, 3, 4]);
        assert_eq!(flipped.raw(), RAW ^ 0x1c);
        assert_eq!(flipped.flip_bits(&[2, 3, 4]), reg);
    }

    #[test]
    fn test_distance() {
        let reg = AcmPolicyStatus::new(RAW);
        assert_eq!(reg.distance(&reg), 0);
        assert_eq!(reg.distance(&reg.xor(0x1c)), 3);
        assert_eq!(reg.distance(&reg.xor(1 << 63)), 1);
    }
}

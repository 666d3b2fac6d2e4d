//! Canonical bytecode forms. Normalization zeroes every malleable
//! region (CBOR auxdata, immutable values, unresolved library slots) so
//! two builds of the same sources compare equal even when their
//! metadata hashes differ.

use super::artifacts::{CborAuxdata, ImmutableReferences, LinkReferences, Offsets};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MalleableRegions {
    pub cbor_auxdata: CborAuxdata,
    pub immutable_references: ImmutableReferences,
    pub link_references: LinkReferences,
}

impl MalleableRegions {
    fn offsets(&self) -> impl Iterator<Item = Offsets> + '_ {
        let auxdata = self.cbor_auxdata.values().map(|value| Offsets {
            start: value.offset,
            length: value.value.len() as u32,
        });
        let immutables = self.immutable_references.values().flatten().copied();
        let links = self
            .link_references
            .values()
            .flat_map(|file| file.values())
            .flatten()
            .copied();
        auxdata.chain(immutables).chain(links)
    }
}

pub fn normalized(code: &[u8], regions: &MalleableRegions) -> Vec<u8> {
    let mut normalized = code.to_vec();
    for offsets in regions.offsets() {
        let start = (offsets.start as usize).min(normalized.len());
        let end = (start + offsets.length as usize).min(normalized.len());
        normalized[start..end].fill(0);
    }
    normalized
}

/// Strips the constructor-argument tail: everything past the length of
/// the recompiled creation code.
pub fn without_constructor_tail(on_chain_code: &[u8], compiled_len: usize) -> &[u8] {
    &on_chain_code[..compiled_len.min(on_chain_code.len())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::artifacts::CborAuxdataValue;
    use pretty_assertions::assert_eq;

    #[test]
    fn zeroes_every_region_kind() {
        let code: Vec<u8> = (1..=16).collect();
        let regions = MalleableRegions {
            cbor_auxdata: CborAuxdata::from([(
                "1".to_string(),
                CborAuxdataValue {
                    value: vec![0xaa, 0xbb],
                    offset: 14,
                },
            )]),
            immutable_references: ImmutableReferences::from([(
                "7".to_string(),
                vec![Offsets { start: 4, length: 2 }],
            )]),
            link_references: LinkReferences::from([(
                "a.sol".to_string(),
                [("Lib".to_string(), vec![Offsets { start: 0, length: 2 }])].into(),
            )]),
        };
        let normalized = normalized(&code, &regions);
        assert_eq!(
            normalized,
            vec![0, 0, 3, 4, 0, 0, 7, 8, 9, 10, 11, 12, 13, 14, 0, 0]
        );
    }

    #[test]
    fn out_of_range_regions_are_clamped() {
        let code = vec![1u8, 2, 3];
        let regions = MalleableRegions {
            immutable_references: ImmutableReferences::from([(
                "1".to_string(),
                vec![Offsets { start: 2, length: 10 }],
            )]),
            ..Default::default()
        };
        assert_eq!(normalized(&code, &regions), vec![1, 2, 0]);
    }

    #[test]
    fn constructor_tail_is_stripped() {
        let code = vec![1u8, 2, 3, 4, 5];
        assert_eq!(without_constructor_tail(&code, 3), &[1, 2, 3]);
        assert_eq!(without_constructor_tail(&code, 9), code.as_slice());
    }
}

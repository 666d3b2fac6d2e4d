use super::{transformations::Transformation, values::Values};
use crate::bytecode::{
    artifacts::{CborAuxdata, CompilationArtifacts, ImmutableReferences, LinkReferences},
    link_references::PLACEHOLDER_BYTES,
};
use alloy_dyn_abi::JsonAbiExt;
use anyhow::{anyhow, Context};
use bytes::Bytes;
use serde::Deserialize;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Match {
    pub metadata_match: bool,
    pub transformations: Vec<Transformation>,
    pub values: Values,
}

/// Applies the transformation passes that turn recompiled code into the
/// code observed on chain, recording each edit and its concrete value.
/// `build` succeeds iff the fully transformed code equals the deployed
/// code byte for byte.
#[derive(Clone, Debug)]
pub struct MatchBuilder<'a> {
    deployed_code: &'a [u8],
    compiled_code: Vec<u8>,
    transformations: Vec<Transformation>,
    values: Values,
    invalid_constructor_arguments: bool,
    has_cbor_auxdata: bool,
    has_cbor_auxdata_transformation: bool,
}

impl<'a> MatchBuilder<'a> {
    pub fn new(deployed_code: &'a [u8], compiled_code: Vec<u8>) -> Option<Self> {
        if deployed_code.len() < compiled_code.len() {
            return None;
        }

        Some(Self {
            deployed_code,
            compiled_code,
            transformations: vec![],
            values: Values::default(),
            invalid_constructor_arguments: false,
            has_cbor_auxdata: false,
            has_cbor_auxdata_transformation: false,
        })
    }

    pub fn apply_runtime_code_transformations(
        self,
        cbor_auxdata: &CborAuxdata,
        link_references: Option<&LinkReferences>,
        immutable_references: Option<&ImmutableReferences>,
    ) -> Result<Self, anyhow::Error> {
        self.apply_call_protection_transformation()
            .apply_library_transformations(link_references)?
            .apply_immutable_transformations(immutable_references)?
            .apply_cbor_auxdata_transformations(cbor_auxdata)
    }

    pub fn apply_creation_code_transformations(
        self,
        cbor_auxdata: &CborAuxdata,
        link_references: Option<&LinkReferences>,
        compilation_artifacts: &CompilationArtifacts,
    ) -> Result<Self, anyhow::Error> {
        self.apply_library_transformations(link_references)?
            .apply_cbor_auxdata_transformations(cbor_auxdata)?
            .apply_constructor_transformation(compilation_artifacts.abi.as_ref())
    }

    pub fn build(mut self) -> Option<Match> {
        if !self.invalid_constructor_arguments
            && self.deployed_code == self.compiled_code.as_slice()
        {
            let metadata_match = self.has_cbor_auxdata && !self.has_cbor_auxdata_transformation;
            self.transformations.sort_by_key(Transformation::sort_key);
            return Some(Match {
                metadata_match,
                transformations: self.transformations,
                values: self.values,
            });
        }

        None
    }

    /// Deployed library runtime code starts with `PUSH20 <own address>`
    /// where the compiler emitted `PUSH20 0x00..00`.
    fn apply_call_protection_transformation(mut self) -> Self {
        let placeholder_end = 1 + PLACEHOLDER_BYTES;
        let is_protected = self.compiled_code.len() >= placeholder_end
            && self.compiled_code[0] == 0x73
            && self.compiled_code[1..placeholder_end] == [0u8; PLACEHOLDER_BYTES]
            && self.deployed_code[0] == 0x73;
        if !is_protected {
            return self;
        }

        let on_chain_address = &self.deployed_code[1..placeholder_end];
        if on_chain_address != [0u8; PLACEHOLDER_BYTES] {
            self.compiled_code[1..placeholder_end].copy_from_slice(on_chain_address);
            self.transformations.push(Transformation::call_protection());
            self.values
                .add_call_protection(Bytes::copy_from_slice(on_chain_address));
        }
        self
    }

    fn apply_cbor_auxdata_transformations(
        mut self,
        cbor_auxdata: &CborAuxdata,
    ) -> Result<Self, anyhow::Error> {
        self.has_cbor_auxdata = !cbor_auxdata.is_empty();
        for (id, cbor_auxdata_value) in cbor_auxdata {
            let offset = cbor_auxdata_value.offset as usize;
            let re_compiled_value = &cbor_auxdata_value.value;
            let range = offset..offset + re_compiled_value.len();

            if self.compiled_code.len() < range.end {
                return Err(anyhow!("(reason=cbor_auxdata; id={id}) out of range"));
            }

            let on_chain_value = &self.deployed_code[range.clone()];
            if on_chain_value != re_compiled_value.as_slice() {
                self.has_cbor_auxdata_transformation = true;
                self.compiled_code[range].copy_from_slice(on_chain_value);

                self.transformations
                    .push(Transformation::cbor_auxdata(offset, id));
                self.values
                    .add_cbor_auxdata(id, Bytes::copy_from_slice(on_chain_value));
            }
        }

        Ok(self)
    }

    fn apply_library_transformations(
        mut self,
        link_references: Option<&LinkReferences>,
    ) -> Result<Self, anyhow::Error> {
        let link_references = match link_references {
            Some(link_references) => link_references,
            None => return Ok(self),
        };

        for (file, file_references) in link_references {
            for (contract, offsets) in file_references {
                let id = if file.is_empty() {
                    contract.clone()
                } else {
                    format!("{file}:{contract}")
                };
                let mut on_chain_value: Option<&[u8]> = None;
                for offset in offsets {
                    let start = offset.start as usize;
                    let end = start + offset.length as usize;
                    if self.compiled_code.len() < end {
                        return Err(anyhow!("(reason=link_reference; id={id}) out of range"));
                    }
                    let range = start..end;

                    let offset_value = &self.deployed_code[range.clone()];
                    match on_chain_value {
                        None => {
                            on_chain_value = Some(offset_value);
                        }
                        Some(on_chain_value) if on_chain_value != offset_value => {
                            return Err(anyhow!(
                                "(reason=link_reference; id={id}) offset values are not consistent"
                            ))
                        }
                        _ => {}
                    }

                    self.compiled_code[range].copy_from_slice(offset_value);
                    self.transformations
                        .push(Transformation::library(start, &id));
                    self.values
                        .add_library(&id, Bytes::copy_from_slice(offset_value));
                }
            }
        }

        Ok(self)
    }

    fn apply_immutable_transformations(
        mut self,
        immutable_references: Option<&ImmutableReferences>,
    ) -> Result<Self, anyhow::Error> {
        let immutable_references = match immutable_references {
            Some(immutable_references) => immutable_references,
            None => return Ok(self),
        };

        for (id, offsets) in immutable_references {
            let mut on_chain_value: Option<&[u8]> = None;
            for offset in offsets {
                let start = offset.start as usize;
                let end = start + offset.length as usize;
                if self.compiled_code.len() < end {
                    return Err(anyhow!("(reason=immutable_reference; id={id}) out of range"));
                }
                let range = start..end;

                let offset_value = &self.deployed_code[range.clone()];
                match on_chain_value {
                    None => {
                        on_chain_value = Some(offset_value);
                    }
                    Some(on_chain_value) if on_chain_value != offset_value => {
                        return Err(anyhow!(
                            "(reason=immutable_reference; id={id}) offset values are not consistent"
                        ))
                    }
                    _ => {}
                }

                self.compiled_code[range].copy_from_slice(offset_value);
                self.transformations
                    .push(Transformation::immutable(start, id));
                self.values
                    .add_immutable(id, Bytes::copy_from_slice(offset_value));
            }
        }

        Ok(self)
    }

    fn apply_constructor_transformation(
        mut self,
        abi: Option<&serde_json::Value>,
    ) -> Result<Self, anyhow::Error> {
        let offset = self.compiled_code.len();
        let (_prefix, constructor_arguments) = self.deployed_code.split_at(offset);

        let constructor = match abi {
            Some(abi) => {
                alloy_json_abi::JsonAbi::deserialize(abi)
                    .context("parsing compiled contract abi")?
                    .constructor
            }
            None => None,
        };

        match constructor {
            None if !constructor_arguments.is_empty() => {
                self.invalid_constructor_arguments = true;
            }
            Some(_constructor) if constructor_arguments.is_empty() => {
                self.invalid_constructor_arguments = true;
            }
            Some(constructor)
                if constructor
                    .abi_decode_input(constructor_arguments, true)
                    .is_err() =>
            {
                self.invalid_constructor_arguments = true;
            }
            None => {}
            Some(_constructor) => {
                self.compiled_code.extend(constructor_arguments);
                self.transformations
                    .push(Transformation::constructor_arguments(offset));
                self.values
                    .add_constructor_arguments(Bytes::copy_from_slice(constructor_arguments));
            }
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::artifacts::{CborAuxdataValue, Offsets};
    use pretty_assertions::assert_eq;

    fn auxdata(offset: u32, value: &[u8]) -> CborAuxdata {
        CborAuxdata::from([(
            "1".to_string(),
            CborAuxdataValue {
                value: value.to_vec(),
                offset,
            },
        )])
    }

    #[test]
    fn identical_codes_match_with_metadata() {
        let code = hex::decode("6080604052aabb0004").unwrap();
        let builder = MatchBuilder::new(&code, code.clone()).unwrap();
        let result = builder
            .apply_runtime_code_transformations(&auxdata(5, &[0xaa, 0xbb, 0x00, 0x04]), None, None)
            .unwrap()
            .build()
            .expect("match");
        assert!(result.metadata_match);
        assert!(result.transformations.is_empty());
        assert_eq!(result.values, Values::default());
    }

    #[test]
    fn differing_auxdata_is_substituted_and_recorded() {
        let deployed = hex::decode("6080604052ccdd0004").unwrap();
        let compiled = hex::decode("6080604052aabb0004").unwrap();
        let result = MatchBuilder::new(&deployed, compiled)
            .unwrap()
            .apply_runtime_code_transformations(&auxdata(5, &[0xaa, 0xbb, 0x00, 0x04]), None, None)
            .unwrap()
            .build()
            .expect("match");
        assert!(!result.metadata_match);
        assert_eq!(
            result.transformations,
            vec![Transformation::cbor_auxdata(5, "1")]
        );
        assert_eq!(
            result.values.cbor_auxdata["1"],
            Bytes::from(hex::decode("ccdd0004").unwrap())
        );
    }

    #[test]
    fn no_auxdata_never_claims_metadata_match() {
        let code = vec![0x60, 0x80];
        let result = MatchBuilder::new(&code, code.clone())
            .unwrap()
            .apply_runtime_code_transformations(&CborAuxdata::new(), None, None)
            .unwrap()
            .build()
            .expect("match");
        assert!(!result.metadata_match);
    }

    #[test]
    fn libraries_are_linked_from_deployed_code() {
        let mut deployed = vec![0x60u8, 0x80];
        deployed.extend([0x11; 20]);
        deployed.push(0x00);
        let mut compiled = vec![0x60u8, 0x80];
        compiled.extend([0x00; 20]);
        compiled.push(0x00);

        let link_references = LinkReferences::from([(
            "contracts/Lib.sol".to_string(),
            [(
                "Math".to_string(),
                vec![Offsets { start: 2, length: 20 }],
            )]
            .into(),
        )]);
        let result = MatchBuilder::new(&deployed, compiled)
            .unwrap()
            .apply_runtime_code_transformations(&CborAuxdata::new(), Some(&link_references), None)
            .unwrap()
            .build()
            .expect("match");
        assert_eq!(
            result.transformations,
            vec![Transformation::library(2, "contracts/Lib.sol:Math")]
        );
        assert_eq!(
            result.values.libraries["contracts/Lib.sol:Math"],
            Bytes::from(vec![0x11; 20])
        );
    }

    #[test]
    fn inconsistent_library_values_fail() {
        let mut deployed = Vec::new();
        deployed.extend([0x11; 20]);
        deployed.extend([0x22; 20]);
        let compiled = vec![0x00u8; 40];
        let link_references = LinkReferences::from([(
            String::new(),
            [(
                "cafecafecafecafecafecafecafecafeca".to_string(),
                vec![
                    Offsets { start: 0, length: 20 },
                    Offsets { start: 20, length: 20 },
                ],
            )]
            .into(),
        )]);
        let err = MatchBuilder::new(&deployed, compiled)
            .unwrap()
            .apply_runtime_code_transformations(&CborAuxdata::new(), Some(&link_references), None)
            .unwrap_err();
        assert!(err.to_string().contains("not consistent"));
    }

    #[test]
    fn immutables_are_substituted() {
        let deployed = hex::decode("60806040ffffffff00").unwrap();
        let compiled = hex::decode("608060400000000000").unwrap();
        let immutables =
            ImmutableReferences::from([("13".to_string(), vec![Offsets { start: 4, length: 4 }])]);
        let result = MatchBuilder::new(&deployed, compiled)
            .unwrap()
            .apply_runtime_code_transformations(&CborAuxdata::new(), None, Some(&immutables))
            .unwrap()
            .build()
            .expect("match");
        assert_eq!(
            result.transformations,
            vec![Transformation::immutable(4, "13")]
        );
        assert_eq!(
            result.values.immutables["13"],
            Bytes::from(vec![0xff, 0xff, 0xff, 0xff])
        );
    }

    #[test]
    fn constructor_arguments_are_appended_when_decodable() {
        let compiled = hex::decode("600a600c").unwrap();
        let mut deployed = compiled.clone();
        let args = hex::decode(
            "000000000000000000000000000000000000000000000000000000000000002a",
        )
        .unwrap();
        deployed.extend(&args);

        let abi = serde_json::json!([
            {"type": "constructor", "inputs": [{"name": "x", "type": "uint256"}]}
        ]);
        let artifacts = CompilationArtifacts {
            abi: Some(abi),
            ..Default::default()
        };
        let result = MatchBuilder::new(&deployed, compiled)
            .unwrap()
            .apply_creation_code_transformations(&CborAuxdata::new(), None, &artifacts)
            .unwrap()
            .build()
            .expect("match");
        assert_eq!(
            result.transformations,
            vec![Transformation::constructor_arguments(4)]
        );
        assert_eq!(result.values.constructor_arguments, Some(Bytes::from(args)));
    }

    #[test]
    fn unexpected_constructor_tail_fails() {
        let compiled = hex::decode("600a600c").unwrap();
        let mut deployed = compiled.clone();
        deployed.extend([0xde, 0xad]);

        let artifacts = CompilationArtifacts {
            abi: Some(serde_json::json!([])),
            ..Default::default()
        };
        let result = MatchBuilder::new(&deployed, compiled)
            .unwrap()
            .apply_creation_code_transformations(&CborAuxdata::new(), None, &artifacts)
            .unwrap()
            .build();
        assert_eq!(result, None);
    }

    #[test]
    fn call_protection_is_recorded_for_libraries() {
        let mut compiled = vec![0x73u8];
        compiled.extend([0x00; 20]);
        compiled.push(0x30);
        let mut deployed = vec![0x73u8];
        deployed.extend([0xab; 20]);
        deployed.push(0x30);

        let result = MatchBuilder::new(&deployed, compiled)
            .unwrap()
            .apply_runtime_code_transformations(&CborAuxdata::new(), None, None)
            .unwrap()
            .build()
            .expect("match");
        assert_eq!(
            result.transformations,
            vec![Transformation::call_protection()]
        );
        assert_eq!(
            result.values.call_protection,
            Some(Bytes::from(vec![0xab; 20]))
        );
    }

    #[test]
    fn shorter_deployed_code_cannot_match() {
        assert!(MatchBuilder::new(&[0x60], vec![0x60, 0x80]).is_none());
    }
}

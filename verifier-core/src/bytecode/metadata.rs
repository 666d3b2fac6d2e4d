//! Decoding of the CBOR-encoded metadata hash the compiler appends to
//! contract bytecode
//! (<https://docs.soliditylang.org/en/latest/metadata.html#encoding-of-the-metadata-hash-in-the-bytecode>).

use minicbor::{data::Type, Decode, Decoder};
use semver::Version;
use std::str::FromStr;
use thiserror::Error;

/// Parsed metadata hash trailer. All keys are optional: old compilers
/// emit only a swarm hash, `appendCBOR: false` builds emit nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct MetadataHash {
    pub solc: Option<Version>,
    pub ipfs: Option<Vec<u8>>,
    pub bzzr: Option<Vec<u8>>,
    pub experimental: bool,
}

impl MetadataHash {
    /// Decodes the map at the start of `encoded` and returns it together
    /// with the number of bytes consumed, so callers can locate the end
    /// of the trailer inside a larger byte string.
    pub fn from_cbor(encoded: &[u8]) -> Result<(Self, usize), minicbor::decode::Error> {
        let mut context = DecodeContext::default();
        let result = minicbor::decode_with(encoded, &mut context)?;
        Ok((result, context.used_size))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
enum ParseMetadataHashError {
    #[error("invalid \"solc\" type. Expected \"string\" or \"bytes\", found \"{0}\"")]
    InvalidSolcType(Type),
    #[error("solc is not a valid version: {0}")]
    InvalidSolcVersion(String),
    #[error("\"{0}\" key met more than once")]
    DuplicateKeys(&'static str),
}

#[derive(Default, Debug, Clone, PartialEq, Eq)]
struct DecodeContext {
    used_size: usize,
}

impl<'b> Decode<'b, DecodeContext> for MetadataHash {
    fn decode(
        d: &mut Decoder<'b>,
        ctx: &mut DecodeContext,
    ) -> Result<Self, minicbor::decode::Error> {
        use minicbor::decode::Error;

        let number_of_elements = d.map()?.unwrap_or(u64::MAX);

        let mut result = MetadataHash::default();
        for _ in 0..number_of_elements {
            match d.str()? {
                "solc" => {
                    if result.solc.is_some() {
                        // duplicate keys are not allowed in CBOR (RFC 8949)
                        return Err(Error::custom(ParseMetadataHashError::DuplicateKeys("solc")));
                    }
                    result.solc = Some(decode_solc_version(d)?);
                }
                "ipfs" => {
                    if result.ipfs.is_some() {
                        return Err(Error::custom(ParseMetadataHashError::DuplicateKeys("ipfs")));
                    }
                    result.ipfs = Some(d.bytes()?.to_vec());
                }
                "bzzr0" | "bzzr1" => {
                    if result.bzzr.is_some() {
                        return Err(Error::custom(ParseMetadataHashError::DuplicateKeys("bzzr")));
                    }
                    result.bzzr = Some(d.bytes()?.to_vec());
                }
                "experimental" => {
                    if d.datatype()? == Type::Bool {
                        result.experimental = d.bool()?;
                    } else {
                        d.skip()?;
                    }
                }
                _ => {
                    // unknown keys are skipped together with their values
                    d.skip()?;
                }
            }
        }

        // The number of bytes consumed so far is exactly the trailer map
        // size; exposing it through the context is the only way to hand
        // it back to the `from_cbor` caller.
        ctx.used_size = d.position();

        Ok(result)
    }

    fn nil() -> Option<Self> {
        Some(Self::default())
    }
}

fn decode_solc_version(d: &mut Decoder<'_>) -> Result<Version, minicbor::decode::Error> {
    use minicbor::decode::Error;
    match d.datatype()? {
        // Release builds encode the version as one byte each for
        // major, minor and patch.
        Type::Bytes => {
            let bytes = d.bytes()?;
            if bytes.len() != 3 {
                return Err(Error::custom(ParseMetadataHashError::InvalidSolcVersion(
                    "release build should be encoded as exactly 3 bytes".into(),
                )));
            }
            Ok(Version::new(
                bytes[0] as u64,
                bytes[1] as u64,
                bytes[2] as u64,
            ))
        }
        // Prerelease builds use a complete version string including
        // commit hash and build date.
        Type::String => {
            let s = d.str()?;
            Version::from_str(s).map_err(|err| {
                Error::custom(ParseMetadataHashError::InvalidSolcVersion(err.to_string()))
            })
        }
        type_ => Err(Error::custom(ParseMetadataHashError::InvalidSolcType(
            type_,
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn decode(hex_str: &str) -> Result<(MetadataHash, usize), minicbor::decode::Error> {
        MetadataHash::from_cbor(&hex::decode(hex_str).unwrap())
    }

    #[test]
    fn decodes_swarm_only_trailer() {
        // { "bzzr0": b"d4fb..b17c" }
        let hex =
            "a165627a7a72305820d4fba422541feba2d648f6657d9354ec14ea9f5919b520abe0feb60981d7b17c";
        let (decoded, used) = decode(hex).expect("valid trailer");
        assert_eq!(decoded.solc, None);
        assert_eq!(decoded.bzzr.map(|b| b.len()), Some(32));
        assert_eq!(used, hex.len() / 2);
    }

    #[test]
    fn decodes_ipfs_and_release_solc() {
        // { "ipfs": b"1220bcc9..3625", "solc": b'00080e' }
        let hex = "a2646970667358221220bcc988b1311237f2c00ccd0bfbd8b01d24dc18f720603b0de93fe6327df5362564736f6c634300080e";
        let (decoded, used) = decode(hex).expect("valid trailer");
        assert_eq!(decoded.solc, Some(Version::new(0, 8, 14)));
        let ipfs = decoded.ipfs.expect("ipfs hash");
        assert_eq!(&ipfs[..2], &[0x12, 0x20], "multihash prefix");
        assert_eq!(used, hex.len() / 2);
    }

    #[test]
    fn decodes_prerelease_solc_as_string() {
        let hex = "a2646970667358221220ba5af27fe13bc83e671bd6981216d35df49ab3ac923741b8948b277f93fbf73264736f6c637823302e382e31352d63692e323032322e352e32332b636f6d6d69742e3231353931353331";
        let (decoded, _) = decode(hex).expect("valid trailer");
        assert_eq!(
            decoded.solc,
            Some(Version::from_str("0.8.15-ci.2022.5.23+commit.21591531").unwrap())
        );
    }

    #[test]
    fn used_size_stops_at_map_end() {
        let first = "a2646970667358221220bcc988b1311237f2c00ccd0bfbd8b01d24dc18f720603b0de93fe6327df5362564736f6c634300080e";
        let second =
            "a165627a7a72305820d4fba422541feba2d648f6657d9354ec14ea9f5919b520abe0feb60981d7b17c";
        let (decoded, used) = decode(&format!("{first}{second}")).expect("valid trailer");
        assert_eq!(decoded.solc, Some(Version::new(0, 8, 14)));
        assert_eq!(used, first.len() / 2);
    }

    #[test]
    fn rejects_non_cbor_input() {
        let result = decode("1234567890");
        assert!(result.is_err());
        assert!(result.unwrap_err().is_type_mismatch());
    }

    #[test]
    fn rejects_non_map_input() {
        // "solc" as a bare string
        let result = decode("64736f6c63");
        assert!(result.is_err());
        assert!(result.unwrap_err().is_type_mismatch());
    }

    #[test]
    fn rejects_duplicated_solc_key() {
        // { "solc": b'000400', "ipfs": ..., "solc": b'00080e' }
        let hex = "a364736f6c6343000400646970667358221220bcc988b1311237f2c00ccd0bfbd8b01d24dc18f720603b0de93fe6327df5362564736f6c634300080e";
        let result = decode(hex);
        assert!(result.is_err());
        assert!(format!("{:?}", result.unwrap_err()).contains("DuplicateKeys"));
    }

    #[test]
    fn rejects_truncated_map() {
        // map declares 3 elements but carries 2
        let hex = "a3646970667358221220bcc988b1311237f2c00ccd0bfbd8b01d24dc18f720603b0de93fe6327df5362564736f6c634300080e";
        let result = decode(hex);
        assert!(result.is_err());
        assert!(result.unwrap_err().is_end_of_input());
    }
}

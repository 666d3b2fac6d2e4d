//! ERC-5202 blueprint containers: initcode stored on-chain behind a
//! `0xFE71` preamble, to be deployed later by a factory.

use thiserror::Error;

const MAGIC: [u8; 2] = [0xfe, 0x71];

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BlueprintError {
    #[error("bytecode does not start with the 0xFE71 blueprint magic")]
    NotABlueprint,
    #[error("reserved length-encoding bits 0b11 are not allowed")]
    ReservedLengthBits,
    #[error("blueprint container is truncated")]
    Truncated,
    #[error("blueprint initcode is empty")]
    EmptyInitcode,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlueprintPreamble {
    pub erc_version: u8,
    pub preamble_data: Option<Vec<u8>>,
    pub initcode: Vec<u8>,
}

pub fn parse_blueprint(code: &[u8]) -> Result<BlueprintPreamble, BlueprintError> {
    if code.len() < 3 || code[..2] != MAGIC {
        return Err(BlueprintError::NotABlueprint);
    }
    let erc_version = code[2] >> 2;
    let length_bytes = (code[2] & 0b11) as usize;
    if length_bytes == 3 {
        return Err(BlueprintError::ReservedLengthBits);
    }

    let mut cursor = 3;
    let preamble_data = if length_bytes == 0 {
        None
    } else {
        let length_end = cursor + length_bytes;
        if code.len() < length_end {
            return Err(BlueprintError::Truncated);
        }
        let data_length = code[cursor..length_end]
            .iter()
            .fold(0usize, |acc, byte| (acc << 8) | *byte as usize);
        cursor = length_end + data_length;
        if code.len() < cursor {
            return Err(BlueprintError::Truncated);
        }
        Some(code[length_end..cursor].to_vec())
    };

    let initcode = code[cursor..].to_vec();
    if initcode.is_empty() {
        return Err(BlueprintError::EmptyInitcode);
    }

    Ok(BlueprintPreamble {
        erc_version,
        preamble_data,
        initcode,
    })
}

/// The minimal (version 0, no data section) container for some initcode.
pub fn blueprint_bytecode(initcode: &[u8]) -> Vec<u8> {
    let mut code = Vec::with_capacity(3 + initcode.len());
    code.extend(MAGIC);
    code.push(0x00);
    code.extend(initcode);
    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn round_trips_minimal_container() {
        let initcode = hex::decode("60806040523480").unwrap();
        let parsed = parse_blueprint(&blueprint_bytecode(&initcode)).unwrap();
        assert_eq!(
            parsed,
            BlueprintPreamble {
                erc_version: 0,
                preamble_data: None,
                initcode,
            }
        );
    }

    #[test]
    fn parses_preamble_data_section() {
        // version 1, one length byte, 2 bytes of data
        let code = [0xfe, 0x71, 0b0000_0101, 0x02, 0xde, 0xad, 0x60, 0x80];
        let parsed = parse_blueprint(&code).unwrap();
        assert_eq!(parsed.erc_version, 1);
        assert_eq!(parsed.preamble_data, Some(vec![0xde, 0xad]));
        assert_eq!(parsed.initcode, vec![0x60, 0x80]);
    }

    #[test]
    fn rejects_malformed_containers() {
        assert_eq!(
            parse_blueprint(&[0x60, 0x80, 0x60]),
            Err(BlueprintError::NotABlueprint)
        );
        assert_eq!(
            parse_blueprint(&[0xfe, 0x71, 0b0000_0011, 0x00]),
            Err(BlueprintError::ReservedLengthBits)
        );
        assert_eq!(
            parse_blueprint(&[0xfe, 0x71, 0x01, 0x05, 0x00]),
            Err(BlueprintError::Truncated)
        );
        assert_eq!(
            parse_blueprint(&[0xfe, 0x71, 0x00]),
            Err(BlueprintError::EmptyInitcode)
        );
    }
}

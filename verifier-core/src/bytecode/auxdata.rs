//! Locating CBOR auxdata regions inside emitted bytecode.
//!
//! The primary source is the compiler's `legacyAssembly`: every
//! (sub)assembly carries an `.auxdata` hex string which also appears
//! verbatim in the final bytecode. Compilers that predate the field
//! (solc < 0.4.12) fall back to scanning the bytecode tail using the
//! two-byte big-endian length suffix convention.

use super::{
    artifacts::{CborAuxdata, CborAuxdataValue},
    metadata::MetadataHash,
};

pub fn from_legacy_assembly(code: &[u8], legacy_assembly: &serde_json::Value) -> CborAuxdata {
    let mut segments = Vec::new();
    collect_auxdata_segments(legacy_assembly, &mut segments);

    let mut located: Vec<(usize, Vec<u8>)> = Vec::new();
    for segment in segments {
        let Ok(needle) = hex::decode(segment.trim_start_matches("0x")) else {
            continue;
        };
        if needle.is_empty() {
            continue;
        }
        for offset in find_occurrences(code, &needle) {
            if !located.iter().any(|(existing, _)| *existing == offset) {
                located.push((offset, needle.clone()));
            }
        }
    }
    located.sort_by_key(|(offset, _)| *offset);

    located
        .into_iter()
        .enumerate()
        .map(|(idx, (offset, value))| {
            (
                (idx + 1).to_string(),
                CborAuxdataValue {
                    value,
                    offset: offset as u32,
                },
            )
        })
        .collect()
}

/// Tail scan: the last two bytes encode the length of the CBOR map that
/// precedes them; the whole trailer (map + length suffix) is the auxdata.
pub fn from_tail_scan(code: &[u8]) -> CborAuxdata {
    let Some(trailer_range) = tail_trailer_range(code) else {
        return CborAuxdata::new();
    };
    CborAuxdata::from([(
        "1".to_string(),
        CborAuxdataValue {
            value: code[trailer_range.clone()].to_vec(),
            offset: trailer_range.start as u32,
        },
    )])
}

fn tail_trailer_range(code: &[u8]) -> Option<std::ops::Range<usize>> {
    if code.len() < 2 {
        return None;
    }
    let cbor_length = u16::from_be_bytes([code[code.len() - 2], code[code.len() - 1]]) as usize;
    let total = cbor_length.checked_add(2)?;
    if cbor_length == 0 || code.len() < total {
        return None;
    }
    let start = code.len() - total;
    let (_, used) = MetadataHash::from_cbor(&code[start..code.len() - 2]).ok()?;
    (used == cbor_length).then_some(start..code.len())
}

fn collect_auxdata_segments(value: &serde_json::Value, segments: &mut Vec<String>) {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(auxdata)) = map.get(".auxdata") {
                if !segments.contains(auxdata) {
                    segments.push(auxdata.clone());
                }
            }
            for (key, nested) in map {
                if key != ".auxdata" {
                    collect_auxdata_segments(nested, segments);
                }
            }
        }
        serde_json::Value::Array(values) => {
            for nested in values {
                collect_auxdata_segments(nested, segments);
            }
        }
        _ => {}
    }
}

fn find_occurrences(haystack: &[u8], needle: &[u8]) -> Vec<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return vec![];
    }
    haystack
        .windows(needle.len())
        .enumerate()
        .filter_map(|(offset, window)| (window == needle).then_some(offset))
        .collect()
}

use crate::Error;
use blockscout_display_bytes::Bytes as DisplayBytes;
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct ParityTrace {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub action: Option<ParityAction>,
    #[serde(default)]
    pub result: Option<ParityResult>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub(crate) struct ParityAction {
    #[serde(default)]
    pub init: Option<DisplayBytes>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub(crate) struct ParityResult {
    #[serde(default)]
    pub address: Option<DisplayBytes>,
}

/// parity-style flat traces: the create entry whose result address is
/// the contract carries the creation bytecode in `action.init`.
pub(crate) fn creation_bytecode_from_parity(
    traces: Vec<ParityTrace>,
    contract_address: &[u8],
) -> Result<Vec<u8>, Error> {
    let create_entry = traces.into_iter().find(|trace| {
        trace.kind == "create"
            && trace
                .result
                .as_ref()
                .and_then(|result| result.address.as_ref())
                .is_some_and(|address| address.as_ref() == contract_address)
    });

    create_entry
        .and_then(|trace| trace.action.and_then(|action| action.init))
        .map(|init| init.to_vec())
        .ok_or(Error::NoCreateTrace)
}

/// A contract created somewhere inside a transaction, as reported by
/// the chain's tracer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedContract {
    pub address: Vec<u8>,
    pub creation_code: Option<Vec<u8>>,
}

/// Every create entry of a parity-style flat trace, in trace order.
pub(crate) fn created_contracts_from_parity(traces: Vec<ParityTrace>) -> Vec<CreatedContract> {
    traces
        .into_iter()
        .filter(|trace| trace.kind == "create")
        .filter_map(|trace| {
            let address = trace.result?.address?.to_vec();
            let creation_code = trace
                .action
                .and_then(|action| action.init)
                .map(|init| init.to_vec());
            Some(CreatedContract {
                address,
                creation_code,
            })
        })
        .collect()
}

/// Every CREATE/CREATE2 frame of a geth call tree, depth-first.
pub(crate) fn created_contracts_from_geth(root: GethCallFrame) -> Vec<CreatedContract> {
    let mut created = Vec::new();
    let mut stack = vec![root];
    while let Some(frame) = stack.pop() {
        if matches!(frame.kind.as_str(), "CREATE" | "CREATE2") {
            if let Some(address) = &frame.to {
                created.push(CreatedContract {
                    address: address.to_vec(),
                    creation_code: frame.input.as_ref().map(|input| input.to_vec()),
                });
            }
        }
        stack.extend(frame.calls.into_iter().rev());
    }
    created
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct GethCallFrame {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub to: Option<DisplayBytes>,
    #[serde(default)]
    pub input: Option<DisplayBytes>,
    #[serde(default)]
    pub calls: Vec<GethCallFrame>,
}

/// geth `callTracer` output: depth-first search of the call tree for a
/// CREATE/CREATE2 frame deploying the contract.
pub(crate) fn creation_bytecode_from_geth(
    root: GethCallFrame,
    contract_address: &[u8],
) -> Result<Vec<u8>, Error> {
    if root.kind.is_empty() {
        return Err(Error::MalformedTraceResponse(
            "root call frame carries no type".to_string(),
        ));
    }

    let mut stack = vec![root];
    while let Some(frame) = stack.pop() {
        let is_create = matches!(frame.kind.as_str(), "CREATE" | "CREATE2");
        if is_create
            && frame
                .to
                .as_ref()
                .is_some_and(|to| to.as_ref() == contract_address)
        {
            return frame.input.map(|input| input.to_vec()).ok_or_else(|| {
                Error::MalformedTraceResponse("create frame carries no input".to_string())
            });
        }
        // depth-first: children are examined before later siblings
        stack.extend(frame.calls.into_iter().rev());
    }

    Err(Error::NoCreateTrace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ADDRESS: [u8; 4] = [0xaa, 0xbb, 0xcc, 0xdd];

    #[test]
    fn parity_create_entry_is_selected_by_address() {
        let traces: Vec<ParityTrace> = serde_json::from_value(serde_json::json!([
            {"type": "call", "action": {}, "result": {}},
            {"type": "create", "action": {"init": "0x6001"}, "result": {"address": "0x11223344"}},
            {"type": "create", "action": {"init": "0x6002"}, "result": {"address": "0xaabbccdd"}},
        ]))
        .unwrap();
        let init = creation_bytecode_from_parity(traces, &ADDRESS).unwrap();
        assert_eq!(init, vec![0x60, 0x02]);
    }

    #[test]
    fn parity_without_matching_create_fails() {
        let traces: Vec<ParityTrace> = serde_json::from_value(serde_json::json!([
            {"type": "call"},
            {"type": "create", "action": {}, "result": {"address": "0xaabbccdd"}},
        ]))
        .unwrap();
        // the matching entry misses action.init
        let err = creation_bytecode_from_parity(traces, &ADDRESS).unwrap_err();
        assert!(matches!(err, Error::NoCreateTrace));
    }

    #[test]
    fn geth_nested_create2_is_found_depth_first() {
        let root: GethCallFrame = serde_json::from_value(serde_json::json!({
            "type": "CALL",
            "to": "0x99999999",
            "calls": [
                {"type": "CALL", "to": "0x11111111", "calls": [
                    {"type": "CREATE2", "to": "0xaabbccdd", "input": "0x600a600c"},
                ]},
                {"type": "CREATE", "to": "0x22222222", "input": "0x6001"},
            ],
        }))
        .unwrap();
        let init = creation_bytecode_from_geth(root, &ADDRESS).unwrap();
        assert_eq!(init, hex::decode("600a600c").unwrap());
    }

    #[test]
    fn geth_without_create_frames_fails() {
        let root: GethCallFrame = serde_json::from_value(serde_json::json!({
            "type": "CALL",
            "to": "0x11111111",
        }))
        .unwrap();
        let err = creation_bytecode_from_geth(root, &ADDRESS).unwrap_err();
        assert!(matches!(err, Error::NoCreateTrace));
    }

    #[test]
    fn geth_empty_tree_is_malformed() {
        let root: GethCallFrame = serde_json::from_value(serde_json::json!({})).unwrap();
        let err = creation_bytecode_from_geth(root, &ADDRESS).unwrap_err();
        assert!(matches!(err, Error::MalformedTraceResponse(_)));
    }
}

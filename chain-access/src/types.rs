use blockscout_display_bytes::Bytes as DisplayBytes;
use serde::Deserialize;

/// JSON-RPC quantities arrive as `0x`-prefixed hex strings.
pub(crate) mod quantity {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let value = String::deserialize(deserializer)?;
        parse(&value).map_err(serde::de::Error::custom)
    }

    pub(crate) fn parse(value: &str) -> Result<u64, String> {
        let digits = value
            .strip_prefix("0x")
            .ok_or_else(|| format!("quantity without 0x prefix: {value}"))?;
        u64::from_str_radix(digits, 16).map_err(|err| format!("invalid quantity {value}: {err}"))
    }

    pub mod option {
        use serde::{Deserialize, Deserializer};

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<u64>, D::Error> {
            let value = Option::<String>::deserialize(deserializer)?;
            value
                .map(|value| super::parse(&value).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub hash: DisplayBytes,
    pub from: Option<DisplayBytes>,
    pub to: Option<DisplayBytes>,
    pub input: DisplayBytes,
    #[serde(default, with = "quantity::option")]
    pub block_number: Option<u64>,
    #[serde(default, with = "quantity::option")]
    pub transaction_index: Option<u64>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: DisplayBytes,
    pub contract_address: Option<DisplayBytes>,
    #[serde(default, with = "quantity::option")]
    pub block_number: Option<u64>,
    #[serde(default, with = "quantity::option")]
    pub transaction_index: Option<u64>,
    #[serde(default, with = "quantity::option")]
    pub status: Option<u64>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    #[serde(with = "quantity")]
    pub number: u64,
    pub hash: Option<DisplayBytes>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    #[test]
    fn deserializes_contract_creation_transaction() {
        let raw = serde_json::json!({
            "hash": "0xcafe",
            "from": "0x00000000000000000000000000000000000000aa",
            "to": null,
            "input": "0x608060",
            "blockNumber": "0x1b4",
            "transactionIndex": "0x0",
        });
        let transaction: Transaction = serde_json::from_value(raw).unwrap();
        assert_eq!(transaction.to, None);
        assert_eq!(transaction.block_number, Some(436));
        assert_eq!(transaction.transaction_index, Some(0));
        assert_eq!(
            transaction.input,
            DisplayBytes::from_str("0x608060").unwrap()
        );
    }

    #[test]
    fn quantity_rejects_missing_prefix() {
        assert!(quantity::parse("1b4").is_err());
        assert_eq!(quantity::parse("0x0").unwrap(), 0);
    }
}

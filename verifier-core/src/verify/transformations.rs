use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum TransformationType {
    Replace,
    Insert,
}

/// Tie-break order for equal offsets follows the declaration order.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum TransformationReason {
    Library,
    Immutable,
    CborAuxdata,
    ConstructorArguments,
    CallProtection,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Transformation {
    pub r#type: TransformationType,
    pub reason: TransformationReason,
    pub offset: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl From<Transformation> for serde_json::Value {
    fn from(value: Transformation) -> Self {
        serde_json::to_value(value).expect("transformations serialization must succeed")
    }
}

impl Transformation {
    pub fn cbor_auxdata(offset: usize, id: impl Into<String>) -> Self {
        Self {
            r#type: TransformationType::Replace,
            reason: TransformationReason::CborAuxdata,
            offset,
            id: Some(id.into()),
        }
    }

    pub fn constructor_arguments(offset: usize) -> Self {
        Self {
            r#type: TransformationType::Insert,
            reason: TransformationReason::ConstructorArguments,
            offset,
            id: None,
        }
    }

    pub fn immutable(offset: usize, id: impl Into<String>) -> Self {
        Self {
            r#type: TransformationType::Replace,
            reason: TransformationReason::Immutable,
            offset,
            id: Some(id.into()),
        }
    }

    pub fn library(offset: usize, id: impl Into<String>) -> Self {
        Self {
            r#type: TransformationType::Replace,
            reason: TransformationReason::Library,
            offset,
            id: Some(id.into()),
        }
    }

    pub fn call_protection() -> Self {
        Self {
            r#type: TransformationType::Replace,
            reason: TransformationReason::CallProtection,
            offset: 1,
            id: None,
        }
    }

    pub fn sort_key(&self) -> (usize, TransformationReason) {
        (self.offset, self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn serializes_with_camel_case_names() {
        let transformation = Transformation::cbor_auxdata(250, "1");
        assert_eq!(
            serde_json::Value::from(transformation),
            serde_json::json!({
                "type": "replace",
                "reason": "cborAuxdata",
                "offset": 250,
                "id": "1",
            })
        );
        assert_eq!(
            serde_json::Value::from(Transformation::constructor_arguments(1234)),
            serde_json::json!({
                "type": "insert",
                "reason": "constructorArguments",
                "offset": 1234,
            })
        );
    }

    #[test]
    fn equal_offsets_order_by_reason() {
        let mut transformations = vec![
            Transformation::cbor_auxdata(10, "1"),
            Transformation::library(10, "lib"),
            Transformation::immutable(10, "7"),
        ];
        transformations.sort_by_key(Transformation::sort_key);
        let reasons: Vec<_> = transformations.iter().map(|t| t.reason).collect();
        assert_eq!(
            reasons,
            vec![
                TransformationReason::Library,
                TransformationReason::Immutable,
                TransformationReason::CborAuxdata,
            ]
        );
    }
}

//! Permissive deserializers for form-submitted meta documents.
//!
//! Rows and scalars that fail to parse degrade to "absent" or zero instead of
//! rejecting the whole document. Live forms submit half-filled rows during
//! incremental edits, so these must stay permissive.

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

/// Parse a JSON number or numeric string into a Decimal.
pub fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            let s = n.to_string();
            Decimal::from_str(&s)
                .or_else(|_| Decimal::from_scientific(&s))
                .ok()
        }
        Value::String(s) => {
            let s = s.trim();
            Decimal::from_str(s)
                .or_else(|_| Decimal::from_scientific(s))
                .ok()
        }
        _ => None,
    }
}

fn bool_from_value(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "on" | "yes" => Some(true),
            "0" | "false" | "off" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn text_from_value(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Amount field: non-numeric or missing values count as zero.
pub fn amount<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(decimal_from_value)
        .unwrap_or(Decimal::ZERO))
}

/// Display toggle: unrecognised values count as unset.
pub fn toggle<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(bool_from_value))
}

/// Optional free text; numbers are stringified, anything else is dropped.
pub fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(text_from_value))
}

/// Required free text, trimmed; missing or malformed becomes empty.
pub fn trimmed<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .and_then(text_from_value)
        .map(|s| s.trim().to_string())
        .unwrap_or_default())
}

/// Tax rule reference; empty or unparseable ids mean "no reference".
pub fn tax_ref<'de, D>(deserializer: D) -> Result<Option<Uuid>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Uuid::parse_str(s.trim()).ok(),
        _ => None,
    })
}

fn rows<T: DeserializeOwned>(value: Value) -> Vec<T> {
    match value {
        Value::Array(rows) => rows
            .into_iter()
            .filter_map(|row| serde_json::from_value(row).ok())
            .collect(),
        _ => Vec::new(),
    }
}

/// Permissive list: non-array values become empty, unparseable rows are skipped.
pub fn list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.map(rows).unwrap_or_default())
}

/// Like [`list`], but distinguishes "not submitted" from "submitted empty".
pub fn optional_list<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.map(rows))
}

/// String-to-string map; entries with non-text values are skipped.
pub fn label_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let entries = match value {
        Some(Value::Object(entries)) => entries,
        _ => Map::new(),
    };
    Ok(entries
        .into_iter()
        .filter_map(|(key, value)| text_from_value(value).map(|label| (key, label)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decimal_from_number_and_string() {
        assert_eq!(decimal_from_value(&json!(12.5)), Some(Decimal::new(125, 1)));
        assert_eq!(decimal_from_value(&json!(" 40 ")), Some(Decimal::from(40)));
        assert_eq!(decimal_from_value(&json!("abc")), None);
        assert_eq!(decimal_from_value(&json!(null)), None);
        assert_eq!(decimal_from_value(&json!([1])), None);
    }

    #[test]
    fn test_bool_from_form_values() {
        assert_eq!(bool_from_value(&json!("on")), Some(true));
        assert_eq!(bool_from_value(&json!("0")), Some(false));
        assert_eq!(bool_from_value(&json!(1)), Some(true));
        assert_eq!(bool_from_value(&json!(false)), Some(false));
        assert_eq!(bool_from_value(&json!("maybe")), None);
        assert_eq!(bool_from_value(&json!(7)), None);
    }

    #[test]
    fn test_rows_skip_malformed_entries() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Row {
            label: String,
        }

        let parsed: Vec<Row> = rows(json!([{ "label": "ok" }, "junk", { "other": 1 }]));
        assert_eq!(parsed, vec![Row { label: "ok".into() }]);

        let parsed: Vec<Row> = rows(json!({ "label": "not a list" }));
        assert!(parsed.is_empty());
    }
}

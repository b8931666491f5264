//! On-disk record layout and sub-field entry variants (C1).
//!
//! Mirrors the wire/record shapes in spec.md §3–§4.1: a `Record` is one
//! persisted JSON document per payload, and each sub-field of that payload
//! becomes a named `Entry` with a closed kind tag.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A sub-field descriptor. The kind tag is closed: `raw`, `array`, `object`,
/// `empty`. Unknown tokens must be tolerated as opaque by readers, but this
/// process never emits anything outside the closed set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "jsontype")]
pub enum Entry {
    #[serde(rename = "raw")]
    Raw {
        #[serde(skip_serializing_if = "String::is_empty", default)]
        raw: String,
    },
    #[serde(rename = "array")]
    Array {
        #[serde(skip_serializing_if = "Vec::is_empty", default)]
        array: Vec<Value>,
    },
    #[serde(rename = "object")]
    Object {
        #[serde(skip_serializing_if = "Map::is_empty", default)]
        object: Map<String, Value>,
    },
    #[serde(rename = "empty")]
    Empty,
}

impl Entry {
    pub fn raw(s: impl Into<String>) -> Self {
        Entry::Raw { raw: s.into() }
    }

    /// True for `Entry::Raw`.
    pub fn is_raw(&self) -> bool {
        matches!(self, Entry::Raw { .. })
    }

    /// True for `Entry::Array` or `Entry::Object`.
    pub fn is_not_raw(&self) -> bool {
        matches!(self, Entry::Array { .. } | Entry::Object { .. })
    }

    /// Raw string length-4 lowercase-ASCII tag check (§4.3.1 is-tag).
    pub fn is_tag(&self) -> bool {
        match self {
            Entry::Raw { raw } => raw.len() == 4 && raw.bytes().all(|b| b.is_ascii_lowercase()),
            _ => false,
        }
    }

    /// Raw with empty string and no structured payload (§4.3 step 4).
    pub fn is_empty_candidate(&self) -> bool {
        match self {
            Entry::Raw { raw } => raw.is_empty(),
            _ => false,
        }
    }

    pub fn raw_str(&self) -> Option<&str> {
        match self {
            Entry::Raw { raw } => Some(raw.as_str()),
            _ => None,
        }
    }
}

/// One persisted record, one per ingested payload (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub ts: i64,
    pub vers: String,
    pub file: String,
    pub dt: String,
    /// `Entry::Raw` preserving the full payload when dump is enabled,
    /// otherwise an empty object.
    pub dump: DumpField,
    pub fields: std::collections::BTreeMap<String, Entry>,
}

/// The `dump` field serializes as `{}` when disabled, or as a raw Entry
/// when enabled. Kept distinct from `Entry` because a disabled dump must
/// marshal to `{}` exactly, not to an `Entry::Empty` (`{"jsontype":"empty"}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DumpField {
    Disabled(EmptyObject),
    Enabled(Entry),
}

/// `deny_unknown_fields` matters here: without it, serde's untagged
/// resolution would accept any object (ignoring its keys) as `EmptyObject`
/// before ever trying `Enabled(Entry)`, so a populated dump would silently
/// deserialize back as empty.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct EmptyObject {}

impl DumpField {
    pub fn disabled() -> Self {
        DumpField::Disabled(EmptyObject::default())
    }

    pub fn enabled(raw_payload: &str) -> Self {
        DumpField::Enabled(Entry::raw(raw_payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_kind_serialization() {
        let raw = Entry::raw("hello");
        let v = serde_json::to_value(&raw).unwrap();
        assert_eq!(v, serde_json::json!({"jsontype": "raw", "raw": "hello"}));

        let empty_raw = Entry::raw("");
        let v = serde_json::to_value(&empty_raw).unwrap();
        assert_eq!(v, serde_json::json!({"jsontype": "raw"}));

        let obj = Entry::Object {
            object: serde_json::from_value(serde_json::json!({"k": 1})).unwrap(),
        };
        let v = serde_json::to_value(&obj).unwrap();
        assert_eq!(v, serde_json::json!({"jsontype": "object", "object": {"k": 1}}));

        let empty = Entry::Empty;
        let v = serde_json::to_value(&empty).unwrap();
        assert_eq!(v, serde_json::json!({"jsontype": "empty"}));
    }

    #[test]
    fn test_is_tag() {
        assert!(Entry::raw("jzml").is_tag());
        assert!(!Entry::raw("jz1m").is_tag());
        assert!(!Entry::raw("jzmlx").is_tag());
        assert!(!Entry::raw("JZML").is_tag());
    }

    #[test]
    fn test_dump_field_disabled_is_empty_object() {
        let d = DumpField::disabled();
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v, serde_json::json!({}));
    }

    #[test]
    fn test_dump_field_round_trips_both_variants() {
        let disabled = DumpField::disabled();
        let bytes = serde_json::to_vec(&disabled).unwrap();
        let back: DumpField = serde_json::from_slice(&bytes).unwrap();
        assert!(matches!(back, DumpField::Disabled(_)));

        let enabled = DumpField::enabled("1000`v1`heartbeat");
        let bytes = serde_json::to_vec(&enabled).unwrap();
        let back: DumpField = serde_json::from_slice(&bytes).unwrap();
        match back {
            DumpField::Enabled(Entry::Raw { raw }) => assert_eq!(raw, "1000`v1`heartbeat"),
            other => panic!("expected Enabled(Raw), got {:?}", other),
        }
    }

    #[test]
    fn test_record_round_trip() {
        let mut fields = std::collections::BTreeMap::new();
        fields.insert("event".to_string(), Entry::raw("event"));
        let record = Record {
            id: "123.456.0.0".to_string(),
            ts: 1538671495199,
            vers: "v1".to_string(),
            file: "abc".to_string(),
            dt: "2018-10-04T17:44:55".to_string(),
            dump: DumpField::disabled(),
            fields,
        };
        let bytes = serde_json::to_vec(&record).unwrap();
        let back: Record = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.ts, record.ts);
        assert_eq!(back.fields.get("event").unwrap().raw_str(), Some("event"));
    }
}

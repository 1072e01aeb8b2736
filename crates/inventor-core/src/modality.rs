//! Rich-content modalities reachable in an input schema.

use std::collections::BTreeSet;
use std::fmt;

use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Modality {
    Image,
    Audio,
    Video,
    File,
}

impl Modality {
    pub fn from_schema_type(ty: &str) -> Option<Self> {
        match ty {
            "image" => Some(Self::Image),
            "audio" => Some(Self::Audio),
            "video" => Some(Self::Video),
            "file" => Some(Self::File),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::File => "file",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Walks `anyOf` options, object properties and array items.
pub fn collect_modalities(schema: &Value) -> BTreeSet<Modality> {
    let mut found = BTreeSet::new();
    collect_into(schema, &mut found);
    found
}

fn collect_into(schema: &Value, found: &mut BTreeSet<Modality>) {
    if let Some(options) = schema.get("anyOf").and_then(|v| v.as_array()) {
        for option in options {
            collect_into(option, found);
        }
        return;
    }
    match schema.get("type").and_then(|v| v.as_str()) {
        Some("object") => {
            if let Some(props) = schema.get("properties").and_then(|v| v.as_object()) {
                for prop in props.values() {
                    collect_into(prop, found);
                }
            }
        }
        Some("array") => {
            if let Some(items) = schema.get("items") {
                collect_into(items, found);
            }
        }
        Some(other) => {
            if let Some(m) = Modality::from_schema_type(other) {
                found.insert(m);
            }
        }
        None => {}
    }
}

/// Modalities present in `old` but missing from `new`.
pub fn removed_modalities(old: &Value, new: &Value) -> Vec<Modality> {
    let after = collect_modalities(new);
    collect_modalities(old)
        .into_iter()
        .filter(|m| !after.contains(m))
        .collect()
}

//! Normalized schema records
//!
//! A `SchemaRecord` is the store-ready projection of one OCA package: the
//! overlays are folded into their attributes and the extension ordering is
//! resolved against the capture base.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::Result;

use super::package::OcaPackage;

/// Package type used when the document does not declare one
pub const DEFAULT_SCHEMA_TYPE: &str = "oca_package/1.0";

/// Language recorded for overlays that do not declare one
pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// One OCA package, ready to be written to a graph store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaRecord {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub capture_base_id: Option<String>,
    pub schema_type: String,
    /// In capture base document order
    pub attributes: Vec<AttributeRecord>,
    pub metas: Vec<MetaRecord>,
    pub ordering: Option<Ordering>,
}

/// A capture base attribute with its overlay data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeRecord {
    pub name: String,
    pub attribute_type: String,
    pub unit: Option<String>,
    /// Language code to description text
    pub descriptions: BTreeMap<String, String>,
    pub format: Option<String>,
    /// Language code to entry map (code to label)
    pub vocabulary: BTreeMap<String, Value>,
    pub entry_codes: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaRecord {
    pub name: String,
    pub description: Option<String>,
    pub language: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ordering {
    pub attribute_ordering: Vec<String>,
    pub entry_code_ordering: Map<String, Value>,
}

impl AttributeRecord {
    /// Stored `description` property
    pub fn description_json(&self) -> Option<String> {
        if self.descriptions.is_empty() {
            None
        } else {
            serde_json::to_string(&self.descriptions).ok()
        }
    }

    /// Stored `vocabulary` property
    pub fn vocabulary_json(&self) -> Option<String> {
        if self.vocabulary.is_empty() {
            None
        } else {
            serde_json::to_string(&self.vocabulary).ok()
        }
    }

    /// Stored `codes` property
    pub fn entry_codes_json(&self) -> Option<String> {
        self.entry_codes
            .as_ref()
            .filter(|v| is_truthy(v))
            .map(Value::to_string)
    }

    /// Lowercased name and description texts, one per line, matched by keyword search
    pub fn search_text(&self) -> String {
        std::iter::once(self.name.as_str())
            .chain(self.descriptions.values().map(String::as_str))
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Ordering {
    /// Stored `entry_code_ordering` property
    pub fn entry_code_ordering_json(&self) -> String {
        Value::Object(self.entry_code_ordering.clone()).to_string()
    }
}

/// JSON values that count as "present"
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Scalar text for a JSON value; non-strings become compact JSON
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn language_or_unknown(language: Option<&String>) -> String {
    language
        .filter(|l| !l.is_empty())
        .cloned()
        .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string())
}

impl SchemaRecord {
    /// Normalize a parsed package
    ///
    /// `fallback_id` is used when the package has no (or an empty) digest.
    pub fn from_package(package: &OcaPackage, name: &str, fallback_id: &str) -> Self {
        let id = package
            .d
            .clone()
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| fallback_id.to_string());

        let capture_base = package.capture_base();
        let capture_base_id = capture_base.and_then(|cb| cb.d.clone());
        let overlays = package.overlays();

        let units = overlays
            .and_then(|o| o.unit.as_ref())
            .and_then(|u| u.attribute_unit.clone())
            .unwrap_or_default();

        let formats = overlays
            .and_then(|o| o.format.as_ref())
            .and_then(|f| f.attribute_formats.clone())
            .unwrap_or_default();

        let entry_codes = overlays
            .and_then(|o| o.entry_code.as_ref())
            .and_then(|e| e.attribute_entry_codes.clone())
            .unwrap_or_default();

        let mut descriptions: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for info in overlays
            .and_then(|o| o.information.as_deref())
            .unwrap_or_default()
        {
            let lang = language_or_unknown(info.language.as_ref());
            for (attr, text) in info.attribute_information.iter().flatten() {
                if let Some(text) = value_text(text) {
                    descriptions
                        .entry(attr.clone())
                        .or_default()
                        .insert(lang.clone(), text);
                }
            }
        }

        let mut vocabularies: BTreeMap<String, BTreeMap<String, Value>> = BTreeMap::new();
        for entry in overlays
            .and_then(|o| o.entry.as_deref())
            .unwrap_or_default()
        {
            let lang = language_or_unknown(entry.language.as_ref());
            for (attr, entries) in entry.attribute_entries.iter().flatten() {
                vocabularies
                    .entry(attr.clone())
                    .or_default()
                    .insert(lang.clone(), entries.clone());
            }
        }

        let attributes = capture_base
            .and_then(|cb| cb.attributes.as_ref())
            .map(|attrs| {
                attrs
                    .iter()
                    .map(|(attr_name, attr_type)| AttributeRecord {
                        name: attr_name.clone(),
                        attribute_type: value_text(attr_type).unwrap_or_default(),
                        unit: units.get(attr_name).and_then(value_text),
                        descriptions: descriptions.remove(attr_name).unwrap_or_default(),
                        format: formats.get(attr_name).and_then(value_text),
                        vocabulary: vocabularies.remove(attr_name).unwrap_or_default(),
                        entry_codes: entry_codes.get(attr_name).cloned(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let metas = overlays
            .and_then(|o| o.meta.as_deref())
            .unwrap_or_default()
            .iter()
            .filter_map(|meta| {
                let meta_name = meta.name.as_ref().filter(|n| !n.is_empty())?;
                Some(MetaRecord {
                    name: meta_name.clone(),
                    description: meta.description.clone(),
                    language: language_or_unknown(meta.language.as_ref()),
                })
            })
            .collect();

        let ordering = package.adc_ordering().map(|o| Ordering {
            attribute_ordering: o.attribute_ordering.unwrap_or_default(),
            entry_code_ordering: o.entry_code_ordering.unwrap_or_default(),
        });

        Self {
            id,
            name: name.to_string(),
            display_name: name.to_string(),
            capture_base_id,
            schema_type: package
                .package_type
                .clone()
                .unwrap_or_else(|| DEFAULT_SCHEMA_TYPE.to_string()),
            attributes,
            metas,
            ordering,
        }
    }

    /// Parse and normalize raw package bytes
    pub fn from_bytes(bytes: &[u8], name: &str, source: &str) -> Result<Self> {
        let package = OcaPackage::from_slice_named(bytes, source)?;
        Ok(Self::from_package(&package, name, &content_digest(bytes)))
    }
}

/// Deterministic id for packages without a digest
pub fn content_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("sha256-{}", hex::encode(digest))
}

/// Schema name for a package file: the file name without its `.json` suffix
pub fn schema_name_from_path(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match file_name.strip_suffix(".json") {
        Some(stem) => stem.to_string(),
        None => file_name,
    }
}

/// Read, parse and normalize one package file
pub fn load_schema_file(path: &Path) -> Result<SchemaRecord> {
    let bytes = std::fs::read(path)?;
    let name = schema_name_from_path(path);
    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let record = SchemaRecord::from_bytes(&bytes, &name, &source)?;
    debug!(
        schema = %record.name,
        id = %record.id,
        attributes = record.attributes.len(),
        metas = record.metas.len(),
        "Parsed OCA package"
    );
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oca::fixtures::SOIL_SAMPLE;
    use serde_json::json;
    use std::path::PathBuf;

    fn soil() -> SchemaRecord {
        SchemaRecord::from_bytes(SOIL_SAMPLE.as_bytes(), "soil_sample", "soil_sample.json").unwrap()
    }

    #[test]
    fn test_identity_fields() {
        let record = soil();
        assert_eq!(record.id, "EJ3rNNjT_soilSchema");
        assert_eq!(record.name, "soil_sample");
        assert_eq!(record.display_name, "soil_sample");
        assert_eq!(record.capture_base_id.as_deref(), Some("EC_soilCaptureBase"));
        assert_eq!(record.schema_type, "oca_package/1.0");
    }

    #[test]
    fn test_attributes_in_document_order() {
        let record = soil();
        let names: Vec<_> = record.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["sample_id", "ph", "depth", "texture"]);
    }

    #[test]
    fn test_overlays_joined_by_attribute() {
        let record = soil();
        let depth = record.attributes.iter().find(|a| a.name == "depth").unwrap();
        assert_eq!(depth.attribute_type, "Numeric");
        assert_eq!(depth.unit.as_deref(), Some("cm"));
        assert_eq!(depth.descriptions.get("eng").unwrap(), "Sampling depth");
        assert_eq!(depth.descriptions.get("fra").unwrap(), "Profondeur d'échantillonnage");

        let texture = record.attributes.iter().find(|a| a.name == "texture").unwrap();
        assert_eq!(texture.vocabulary.len(), 2);
        assert_eq!(texture.entry_codes, Some(json!(["clay", "loam", "sand"])));
        assert!(texture.unit.is_none());

        let sample_id = record.attributes.iter().find(|a| a.name == "sample_id").unwrap();
        assert_eq!(sample_id.format.as_deref(), Some("^[A-Z]{2}-[0-9]{4}$"));
    }

    #[test]
    fn test_search_text_holds_lowercased_texts_only() {
        let record = soil();
        let depth = record.attributes.iter().find(|a| a.name == "depth").unwrap();
        let text = depth.search_text();
        assert_eq!(text, "depth\nsampling depth\nprofondeur d'échantillonnage");
        assert!(!text.contains("eng"));
        assert!(!text.contains('{'));

        let accented = AttributeRecord {
            descriptions: BTreeMap::from([("fra".to_string(), "Échantillon de sol".to_string())]),
            ..depth.clone()
        };
        assert!(accented.search_text().contains("échantillon de sol"));
    }

    #[test]
    fn test_overlay_entries_for_unknown_attributes_ignored() {
        let record = soil();
        assert!(record.attributes.iter().all(|a| a.name != "ghost"));
    }

    #[test]
    fn test_metas_require_name() {
        let record = soil();
        assert_eq!(record.metas.len(), 2);
        assert!(record.metas.iter().any(|m| m.language == "eng" && m.name == "Soil sample"));
        assert!(record.metas.iter().all(|m| !m.name.is_empty()));
    }

    #[test]
    fn test_ordering_resolved() {
        let record = soil();
        let ordering = record.ordering.unwrap();
        assert_eq!(ordering.attribute_ordering, vec!["sample_id", "depth", "ph", "texture"]);
        assert_eq!(
            ordering.entry_code_ordering_json(),
            r#"{"texture":["sand","loam","clay"]}"#
        );
    }

    #[test]
    fn test_json_properties() {
        let record = soil();
        let depth = record.attributes.iter().find(|a| a.name == "depth").unwrap();
        let description: BTreeMap<String, String> =
            serde_json::from_str(&depth.description_json().unwrap()).unwrap();
        assert_eq!(description.len(), 2);
        assert!(depth.vocabulary_json().is_none());
        assert!(depth.entry_codes_json().is_none());

        let texture = record.attributes.iter().find(|a| a.name == "texture").unwrap();
        assert_eq!(texture.entry_codes_json().unwrap(), r#"["clay","loam","sand"]"#);
    }

    #[test]
    fn test_empty_entry_codes_are_absent() {
        let attr = AttributeRecord {
            name: "x".to_string(),
            attribute_type: "Text".to_string(),
            unit: None,
            descriptions: BTreeMap::new(),
            format: None,
            vocabulary: BTreeMap::new(),
            entry_codes: Some(json!([])),
        };
        assert!(attr.entry_codes_json().is_none());
        assert!(attr.description_json().is_none());
    }

    #[test]
    fn test_missing_digest_uses_content_hash() {
        let bytes = br#"{"oca_bundle": {"bundle": {"capture_base": {"attributes": {"a": "Text"}}}}}"#;
        let first = SchemaRecord::from_bytes(bytes, "anon", "anon.json").unwrap();
        let second = SchemaRecord::from_bytes(bytes, "anon", "anon.json").unwrap();
        assert!(first.id.starts_with("sha256-"));
        assert_eq!(first.id, second.id);
        assert_eq!(first.id.len(), "sha256-".len() + 64);
    }

    #[test]
    fn test_empty_digest_uses_content_hash() {
        let record = SchemaRecord::from_bytes(br#"{"d": ""}"#, "e", "e.json").unwrap();
        assert!(record.id.starts_with("sha256-"));
        assert!(record.attributes.is_empty());
        assert!(record.ordering.is_none());
    }

    #[test]
    fn test_missing_language_is_unknown() {
        let bytes = br#"{
            "oca_bundle": {"bundle": {
                "capture_base": {"attributes": {"a": "Text"}},
                "overlays": {
                    "information": [{"attribute_information": {"a": "Plain"}}],
                    "meta": [{"name": "Nameless language"}]
                }
            }}
        }"#;
        let record = SchemaRecord::from_bytes(bytes, "x", "x.json").unwrap();
        assert_eq!(
            record.attributes[0].descriptions.get(UNKNOWN_LANGUAGE).unwrap(),
            "Plain"
        );
        assert_eq!(record.metas[0].language, UNKNOWN_LANGUAGE);
    }

    #[test]
    fn test_later_overlay_same_language_wins() {
        let bytes = br#"{
            "oca_bundle": {"bundle": {
                "capture_base": {"attributes": {"a": "Text"}},
                "overlays": {"information": [
                    {"language": "eng", "attribute_information": {"a": "First"}},
                    {"language": "eng", "attribute_information": {"a": "Second"}}
                ]}
            }}
        }"#;
        let record = SchemaRecord::from_bytes(bytes, "x", "x.json").unwrap();
        assert_eq!(record.attributes[0].descriptions.get("eng").unwrap(), "Second");
    }

    #[test]
    fn test_non_string_type_kept_as_json() {
        let bytes = br#"{"oca_bundle": {"bundle": {"capture_base": {"attributes": {"tags": ["Array[Text]"]}}}}}"#;
        let record = SchemaRecord::from_bytes(bytes, "x", "x.json").unwrap();
        assert_eq!(record.attributes[0].attribute_type, r#"["Array[Text]"]"#);
    }

    #[test]
    fn test_ordering_absent_without_capture_base_id() {
        let bytes = br#"{
            "oca_bundle": {"bundle": {"capture_base": {"attributes": {}}}},
            "extensions": {"adc": {"EC": {"overlays": {"ordering": {"attribute_ordering": ["a"]}}}}}
        }"#;
        let record = SchemaRecord::from_bytes(bytes, "x", "x.json").unwrap();
        assert!(record.ordering.is_none());
    }

    #[test]
    fn test_schema_name_from_path() {
        assert_eq!(schema_name_from_path(&PathBuf::from("/a/b/soil.json")), "soil");
        assert_eq!(schema_name_from_path(&PathBuf::from("x.json.json")), "x.json");
        assert_eq!(schema_name_from_path(&PathBuf::from("README")), "README");
    }

    #[test]
    fn test_load_schema_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("soil_sample.json");
        std::fs::write(&path, SOIL_SAMPLE).unwrap();

        let record = load_schema_file(&path).unwrap();
        assert_eq!(record.name, "soil_sample");
        assert_eq!(record.attributes.len(), 4);
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = load_schema_file(&path).unwrap_err();
        assert_eq!(err.code(), "E002");
        assert!(err.to_string().contains("broken.json"));
    }
}

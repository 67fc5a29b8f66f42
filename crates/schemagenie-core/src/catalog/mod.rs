//! Schema catalog - read model over imported schemas
//!
//! Stores return these types; the CLI prints them and the chat assistant
//! renders them into prompt context.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::oca::{MetaRecord, Ordering, UNKNOWN_LANGUAGE};

/// Fallback language for overlay texts
pub const DEFAULT_LANGUAGE: &str = "eng";

/// One row of `schemas list`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSummary {
    pub id: String,
    pub name: String,
    pub schema_type: String,
    pub attribute_count: u64,
    pub meta_count: u64,
}

/// Full view of a schema node and its neighbours
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDetail {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub capture_base_id: Option<String>,
    pub schema_type: String,
    pub attributes: Vec<AttributeView>,
    pub metas: Vec<MetaRecord>,
    pub ordering: Option<Ordering>,
}

/// An attribute node with its JSON properties decoded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeView {
    pub name: String,
    pub attribute_type: String,
    pub unit: Option<String>,
    pub descriptions: BTreeMap<String, String>,
    pub format: Option<String>,
    pub vocabulary: BTreeMap<String, Value>,
    pub entry_codes: Option<Value>,
}

/// Attribute search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeMatch {
    pub attribute: AttributeView,
    /// Names of schemas that declare the attribute
    pub schemas: Vec<String>,
}

/// Stored property values of an attribute node
#[derive(Debug, Clone, Default)]
pub struct StoredAttribute {
    pub name: String,
    pub attribute_type: Option<String>,
    pub unit: Option<String>,
    pub description: Option<String>,
    pub format: Option<String>,
    pub vocabulary: Option<String>,
    pub codes: Option<String>,
}

fn decode_language_map<T: serde::de::DeserializeOwned>(
    raw: Option<&str>,
    field: &str,
    attribute: &str,
    wrap: impl FnOnce(String) -> T,
) -> BTreeMap<String, T> {
    let Some(raw) = raw else {
        return BTreeMap::new();
    };
    match serde_json::from_str::<BTreeMap<String, T>>(raw) {
        Ok(map) => map,
        Err(e) => {
            debug!(attribute, field, error = %e, "Stored property is not a language map");
            BTreeMap::from([(UNKNOWN_LANGUAGE.to_string(), wrap(raw.to_string()))])
        }
    }
}

impl From<StoredAttribute> for AttributeView {
    fn from(stored: StoredAttribute) -> Self {
        let descriptions = decode_language_map(
            stored.description.as_deref(),
            "description",
            &stored.name,
            |raw| raw,
        );
        let vocabulary = decode_language_map(
            stored.vocabulary.as_deref(),
            "vocabulary",
            &stored.name,
            Value::String,
        );
        let entry_codes = stored.codes.as_deref().map(|raw| {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
        });

        Self {
            name: stored.name,
            attribute_type: stored.attribute_type.unwrap_or_default(),
            unit: stored.unit,
            descriptions,
            format: stored.format,
            vocabulary,
            entry_codes,
        }
    }
}

impl AttributeView {
    /// Description in `language`, else English, else any available language
    pub fn description_for(&self, language: &str) -> Option<&str> {
        self.descriptions
            .get(language)
            .or_else(|| self.descriptions.get(DEFAULT_LANGUAGE))
            .or_else(|| self.descriptions.values().next())
            .map(String::as_str)
    }

    /// Entry labels in `language` (else English, else any), as `code: label` pairs
    pub fn entries_for(&self, language: &str) -> Vec<(String, String)> {
        let entries = self
            .vocabulary
            .get(language)
            .or_else(|| self.vocabulary.get(DEFAULT_LANGUAGE))
            .or_else(|| self.vocabulary.values().next());

        match entries {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(code, label)| {
                    let label = label
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| label.to_string());
                    (code.clone(), label)
                })
                .collect(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    let text = v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string());
                    (text.clone(), text)
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl SchemaDetail {
    /// Order attributes by the schema's attribute ordering, unlisted ones last by name
    pub fn sort_attributes(&mut self) {
        let positions: HashMap<&str, usize> = self
            .ordering
            .as_ref()
            .map(|o| {
                o.attribute_ordering
                    .iter()
                    .enumerate()
                    .map(|(i, name)| (name.as_str(), i))
                    .collect()
            })
            .unwrap_or_default();

        let mut attributes = std::mem::take(&mut self.attributes);
        attributes.sort_by(|a, b| {
            let pa = positions.get(a.name.as_str()).copied().unwrap_or(usize::MAX);
            let pb = positions.get(b.name.as_str()).copied().unwrap_or(usize::MAX);
            pa.cmp(&pb).then_with(|| a.name.cmp(&b.name))
        });
        self.attributes = attributes;
    }

    /// Meta name and description in `language`, else English, else the first
    pub fn meta_for(&self, language: &str) -> Option<&MetaRecord> {
        self.metas
            .iter()
            .find(|m| m.language == language)
            .or_else(|| self.metas.iter().find(|m| m.language == DEFAULT_LANGUAGE))
            .or_else(|| self.metas.first())
    }

    pub fn summary(&self) -> SchemaSummary {
        SchemaSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            schema_type: self.schema_type.clone(),
            attribute_count: self.attributes.len() as u64,
            meta_count: self.metas.len() as u64,
        }
    }
}

/// Compact plain-text description of a schema for LLM prompts
pub fn render_schema_context(detail: &SchemaDetail, language: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Schema: {} (id: {})", detail.name, detail.id);
    if let Some(meta) = detail.meta_for(language) {
        match &meta.description {
            Some(desc) => {
                let _ = writeln!(out, "  Title: {} - {}", meta.name, desc);
            }
            None => {
                let _ = writeln!(out, "  Title: {}", meta.name);
            }
        }
    }
    let _ = writeln!(out, "  Attributes ({}):", detail.attributes.len());
    for attr in &detail.attributes {
        let _ = write!(out, "  - {} [{}]", attr.name, attr.attribute_type);
        if let Some(unit) = &attr.unit {
            let _ = write!(out, " unit={}", unit);
        }
        if let Some(format) = &attr.format {
            let _ = write!(out, " format={}", format);
        }
        if let Some(desc) = attr.description_for(language) {
            let _ = write!(out, ": {}", desc);
        }
        let entries = attr.entries_for(language);
        if !entries.is_empty() {
            let listed: Vec<String> = entries
                .iter()
                .map(|(code, label)| format!("{}={}", code, label))
                .collect();
            let _ = write!(out, " (values: {})", listed.join(", "));
        }
        out.push('\n');
    }
    out
}

/// One line per attribute hit, for prompts and CLI output
pub fn render_attribute_match(hit: &AttributeMatch, language: &str) -> String {
    let attr = &hit.attribute;
    let mut line = format!("{} [{}]", attr.name, attr.attribute_type);
    if let Some(unit) = &attr.unit {
        line.push_str(&format!(" unit={}", unit));
    }
    if let Some(desc) = attr.description_for(language) {
        line.push_str(&format!(": {}", desc));
    }
    if !hit.schemas.is_empty() {
        line.push_str(&format!(" (used by: {})", hit.schemas.join(", ")));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attr(name: &str) -> AttributeView {
        AttributeView::from(StoredAttribute {
            name: name.to_string(),
            attribute_type: Some("Text".to_string()),
            ..Default::default()
        })
    }

    fn detail() -> SchemaDetail {
        let mut texture = attr("texture");
        texture.vocabulary.insert("eng".to_string(), json!({"clay": "Clay", "sand": "Sand"}));
        texture.vocabulary.insert("fra".to_string(), json!({"clay": "Argile", "sand": "Sable"}));

        let mut depth = attr("depth");
        depth.attribute_type = "Numeric".to_string();
        depth.unit = Some("cm".to_string());
        depth.descriptions.insert("eng".to_string(), "Sampling depth".to_string());

        SchemaDetail {
            id: "E1".to_string(),
            name: "soil".to_string(),
            display_name: "soil".to_string(),
            capture_base_id: Some("EC".to_string()),
            schema_type: "oca_package/1.0".to_string(),
            attributes: vec![texture, attr("sample_id"), depth, attr("notes")],
            metas: vec![
                MetaRecord {
                    name: "Soil sample".to_string(),
                    description: Some("Field record".to_string()),
                    language: "eng".to_string(),
                },
                MetaRecord {
                    name: "Échantillon".to_string(),
                    description: None,
                    language: "fra".to_string(),
                },
            ],
            ordering: Some(Ordering {
                attribute_ordering: vec![
                    "sample_id".to_string(),
                    "depth".to_string(),
                    "texture".to_string(),
                ],
                entry_code_ordering: Default::default(),
            }),
        }
    }

    #[test]
    fn test_stored_attribute_decoding() {
        let view = AttributeView::from(StoredAttribute {
            name: "ph".to_string(),
            attribute_type: Some("Numeric".to_string()),
            unit: Some("pH".to_string()),
            description: Some(r#"{"eng":"Acidity","fra":"Acidité"}"#.to_string()),
            format: None,
            vocabulary: None,
            codes: Some(r#"["a","b"]"#.to_string()),
        });
        assert_eq!(view.descriptions.len(), 2);
        assert_eq!(view.entry_codes, Some(json!(["a", "b"])));
        assert!(view.vocabulary.is_empty());
    }

    #[test]
    fn test_undecodable_description_kept_as_unknown() {
        let view = AttributeView::from(StoredAttribute {
            name: "x".to_string(),
            description: Some("plain text".to_string()),
            ..Default::default()
        });
        assert_eq!(view.descriptions.get(UNKNOWN_LANGUAGE).unwrap(), "plain text");
        assert_eq!(view.attribute_type, "");
    }

    #[test]
    fn test_description_language_fallback() {
        let mut view = attr("x");
        view.descriptions.insert("eng".to_string(), "English".to_string());
        view.descriptions.insert("deu".to_string(), "Deutsch".to_string());
        assert_eq!(view.description_for("deu"), Some("Deutsch"));
        assert_eq!(view.description_for("fra"), Some("English"));

        let mut only_fra = attr("y");
        only_fra.descriptions.insert("fra".to_string(), "Français".to_string());
        assert_eq!(only_fra.description_for("eng"), Some("Français"));
        assert_eq!(attr("z").description_for("eng"), None);
    }

    #[test]
    fn test_sort_attributes_by_ordering() {
        let mut d = detail();
        d.sort_attributes();
        let names: Vec<_> = d.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["sample_id", "depth", "texture", "notes"]);
    }

    #[test]
    fn test_sort_attributes_without_ordering() {
        let mut d = detail();
        d.ordering = None;
        d.sort_attributes();
        let names: Vec<_> = d.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["depth", "notes", "sample_id", "texture"]);
    }

    #[test]
    fn test_meta_for_language() {
        let d = detail();
        assert_eq!(d.meta_for("fra").unwrap().name, "Échantillon");
        assert_eq!(d.meta_for("deu").unwrap().name, "Soil sample");
    }

    #[test]
    fn test_render_schema_context() {
        let mut d = detail();
        d.sort_attributes();
        let text = render_schema_context(&d, "fra");
        assert!(text.starts_with("Schema: soil (id: E1)"));
        assert!(text.contains("Title: Échantillon"));
        assert!(text.contains("- depth [Numeric] unit=cm: Sampling depth"));
        assert!(text.contains("clay=Argile"));
        assert!(text.contains("Attributes (4):"));
    }

    #[test]
    fn test_render_attribute_match() {
        let mut view = attr("ph");
        view.unit = Some("pH".to_string());
        view.descriptions.insert("eng".to_string(), "Acidity".to_string());
        let hit = AttributeMatch {
            attribute: view,
            schemas: vec!["soil".to_string(), "water".to_string()],
        };
        assert_eq!(
            render_attribute_match(&hit, "eng"),
            "ph [Text] unit=pH: Acidity (used by: soil, water)"
        );
    }

    #[test]
    fn test_summary_counts() {
        let s = detail().summary();
        assert_eq!(s.attribute_count, 4);
        assert_eq!(s.meta_count, 2);
    }
}

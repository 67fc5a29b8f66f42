//! Serde model of an OCA package document
//!
//! Every key is optional. `null` deserializes the same as an absent key,
//! while a value of the wrong JSON type is a parse error.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Top-level OCA package (`oca_package/1.0`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OcaPackage {
    /// Schema digest (SAID)
    #[serde(default)]
    pub d: Option<String>,
    #[serde(default, rename = "type")]
    pub package_type: Option<String>,
    #[serde(default)]
    pub oca_bundle: Option<OcaBundle>,
    #[serde(default)]
    pub extensions: Option<Extensions>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OcaBundle {
    #[serde(default)]
    pub bundle: Option<Bundle>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Bundle {
    #[serde(default)]
    pub capture_base: Option<CaptureBase>,
    #[serde(default)]
    pub overlays: Option<Overlays>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaptureBase {
    #[serde(default)]
    pub d: Option<String>,
    /// Attribute name to type, in document order
    #[serde(default)]
    pub attributes: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Overlays {
    #[serde(default)]
    pub unit: Option<UnitOverlay>,
    #[serde(default)]
    pub information: Option<Vec<InformationOverlay>>,
    #[serde(default)]
    pub entry: Option<Vec<EntryOverlay>>,
    #[serde(default)]
    pub entry_code: Option<EntryCodeOverlay>,
    #[serde(default)]
    pub format: Option<FormatOverlay>,
    #[serde(default)]
    pub meta: Option<Vec<MetaOverlay>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnitOverlay {
    #[serde(default)]
    pub attribute_unit: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InformationOverlay {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub attribute_information: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryOverlay {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub attribute_entries: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryCodeOverlay {
    #[serde(default)]
    pub attribute_entry_codes: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormatOverlay {
    #[serde(default)]
    pub attribute_formats: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetaOverlay {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Extensions {
    /// Keyed by capture base digest
    #[serde(default)]
    pub adc: Option<BTreeMap<String, AdcExtension>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdcExtension {
    #[serde(default)]
    pub overlays: Option<AdcOverlays>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdcOverlays {
    #[serde(default)]
    pub ordering: Option<OrderingOverlay>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderingOverlay {
    #[serde(default)]
    pub attribute_ordering: Option<Vec<String>>,
    #[serde(default)]
    pub entry_code_ordering: Option<Map<String, Value>>,
}

impl OcaPackage {
    /// Parse a package from raw JSON bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Parse a package, attributing failures to `source`
    pub fn from_slice_named(bytes: &[u8], source: &str) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::InvalidSchema(source.to_string(), e.to_string()))
    }

    pub fn bundle(&self) -> Option<&Bundle> {
        self.oca_bundle.as_ref().and_then(|b| b.bundle.as_ref())
    }

    pub fn capture_base(&self) -> Option<&CaptureBase> {
        self.bundle().and_then(|b| b.capture_base.as_ref())
    }

    pub fn overlays(&self) -> Option<&Overlays> {
        self.bundle().and_then(|b| b.overlays.as_ref())
    }

    /// Ordering overlay from the `adc` extension for this package's capture base
    ///
    /// The outer `Option` is `None` when the extension has no entry for the
    /// capture base; an entry without an ordering overlay yields an empty one.
    pub fn adc_ordering(&self) -> Option<OrderingOverlay> {
        let capture_base_id = self.capture_base()?.d.as_deref()?;
        let adc = self.extensions.as_ref()?.adc.as_ref()?;
        let entry = adc.get(capture_base_id)?;
        Some(
            entry
                .overlays
                .as_ref()
                .and_then(|o| o.ordering.clone())
                .unwrap_or_default(),
        )
    }
}

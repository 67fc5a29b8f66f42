//! OCA (Overlays Capture Architecture) package parsing
//!
//! - `package`: serde model of the package JSON
//! - `record`: normalized `SchemaRecord` with overlays folded into attributes

mod package;
mod record;

pub use package::{
    AdcExtension, AdcOverlays, Bundle, CaptureBase, EntryCodeOverlay, EntryOverlay, Extensions,
    FormatOverlay, InformationOverlay, MetaOverlay, OcaBundle, OcaPackage, OrderingOverlay,
    Overlays, UnitOverlay,
};
pub use record::{
    AttributeRecord, DEFAULT_SCHEMA_TYPE, MetaRecord, Ordering, SchemaRecord, UNKNOWN_LANGUAGE,
    content_digest, load_schema_file, schema_name_from_path,
};

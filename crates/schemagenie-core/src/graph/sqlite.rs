//! SQLite implementation of the GraphStore
//!
//! Nodes and edges are tables; Neo4j's MERGE/SET semantics map onto
//! `INSERT ... ON CONFLICT DO UPDATE` inside one transaction per schema.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};

use crate::catalog::{AttributeMatch, AttributeView, SchemaDetail, SchemaSummary, StoredAttribute};
use crate::error::{Error, Result};
use crate::oca::{MetaRecord, Ordering, SchemaRecord};

use super::model::{BackendKind, GraphStats, ImportOutcome, ImportRunSummary};
use super::store::{GraphStore, normalize_keyword};

/// SQLite implementation of the graph store
#[derive(Clone)]
pub struct SqliteGraphStore {
    pool: SqlitePool,
}

impl SqliteGraphStore {
    /// Create a store over an already migrated pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn schema_names_for_attribute(&self, name: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT s.name FROM schemas s
            JOIN schema_attributes sa ON sa.schema_id = s.id
            WHERE sa.attribute_name = ?
            ORDER BY s.name
            "#,
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(n,)| n).collect())
    }
}

const SCHEMA_COLUMNS: &str = "id, name, display_name, capture_base_id, schema_type, \
    attribute_ordering, entry_code_ordering";

const ATTRIBUTE_COLUMNS: &str = "a.name, a.attribute_type, a.unit, a.description, a.format, \
    a.vocabulary, a.codes";

const SUMMARY_SELECT: &str = r#"
    SELECT s.id, s.name, s.schema_type,
        (SELECT COUNT(*) FROM schema_attributes sa WHERE sa.schema_id = s.id) AS attribute_count,
        (SELECT COUNT(*) FROM metas m WHERE m.schema_id = s.id) AS meta_count
    FROM schemas s
"#;

/// Escape LIKE wildcards in user input
fn like_pattern(keyword: &str) -> String {
    let escaped = keyword
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    async fn import_schema(&self, record: &SchemaRecord) -> Result<ImportOutcome> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM schemas WHERE id = ?")
            .bind(&record.id)
            .fetch_optional(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO schemas (
                id, name, display_name, capture_base_id, schema_type, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                display_name = excluded.display_name,
                capture_base_id = excluded.capture_base_id,
                schema_type = excluded.schema_type,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.display_name)
        .bind(&record.capture_base_id)
        .bind(&record.schema_type)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        for attr in &record.attributes {
            sqlx::query(
                r#"
                INSERT INTO attributes (
                    name, attribute_type, unit, description, format, vocabulary, codes,
                    search_text, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(name) DO UPDATE SET
                    attribute_type = excluded.attribute_type,
                    unit = excluded.unit,
                    description = excluded.description,
                    format = excluded.format,
                    vocabulary = excluded.vocabulary,
                    codes = excluded.codes,
                    search_text = excluded.search_text,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&attr.name)
            .bind(&attr.attribute_type)
            .bind(&attr.unit)
            .bind(attr.description_json())
            .bind(&attr.format)
            .bind(attr.vocabulary_json())
            .bind(attr.entry_codes_json())
            .bind(attr.search_text())
            .bind(&now)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT OR IGNORE INTO schema_attributes (schema_id, attribute_name) VALUES (?, ?)",
            )
            .bind(&record.id)
            .bind(&attr.name)
            .execute(&mut *tx)
            .await?;
        }

        for meta in &record.metas {
            sqlx::query(
                r#"
                INSERT INTO metas (name, schema_id, language, description)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(name, schema_id, language) DO UPDATE SET
                    description = excluded.description
                "#,
            )
            .bind(&meta.name)
            .bind(&record.id)
            .bind(&meta.language)
            .bind(&meta.description)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(ordering) = &record.ordering {
            let attribute_ordering = serde_json::to_string(&ordering.attribute_ordering)?;
            sqlx::query(
                "UPDATE schemas SET attribute_ordering = ?, entry_code_ordering = ? WHERE id = ?",
            )
            .bind(attribute_ordering)
            .bind(ordering.entry_code_ordering_json())
            .bind(&record.id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        let outcome = ImportOutcome {
            schema_id: record.id.clone(),
            schema_name: record.name.clone(),
            created: existing.is_none(),
            attributes_written: record.attributes.len(),
            metas_written: record.metas.len(),
            ordering_written: record.ordering.is_some(),
        };
        debug!(
            schema_id = %outcome.schema_id,
            created = outcome.created,
            attributes = outcome.attributes_written,
            "Schema written to SQLite"
        );
        Ok(outcome)
    }

    async fn list_schemas(&self) -> Result<Vec<SchemaSummary>> {
        let rows: Vec<SummaryRow> =
            sqlx::query_as(&format!("{} ORDER BY s.name, s.id", SUMMARY_SELECT))
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(SummaryRow::into_summary).collect())
    }

    async fn get_schema(&self, key: &str) -> Result<Option<SchemaDetail>> {
        let row: Option<SchemaRow> =
            sqlx::query_as(&format!("SELECT {} FROM schemas WHERE id = ?", SCHEMA_COLUMNS))
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        let row = match row {
            Some(row) => Some(row),
            None => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM schemas WHERE name = ? ORDER BY id LIMIT 1",
                    SCHEMA_COLUMNS
                ))
                .bind(key)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        let Some(row) = row else {
            return Ok(None);
        };

        let attributes: Vec<AttributeRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM attributes a
            JOIN schema_attributes sa ON sa.attribute_name = a.name
            WHERE sa.schema_id = ?
            ORDER BY a.name
            "#,
            ATTRIBUTE_COLUMNS
        ))
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await?;

        let metas: Vec<MetaRow> = sqlx::query_as(
            "SELECT name, language, description FROM metas WHERE schema_id = ? ORDER BY language, name",
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await?;

        let mut detail = row.into_detail(
            attributes.into_iter().map(AttributeRow::into_view).collect(),
            metas.into_iter().map(MetaRow::into_meta).collect(),
        )?;
        detail.sort_attributes();
        Ok(Some(detail))
    }

    async fn search_attributes(&self, keyword: &str, limit: usize) -> Result<Vec<AttributeMatch>> {
        let keyword = normalize_keyword(keyword)?;
        let pattern = like_pattern(&keyword);

        let rows: Vec<AttributeRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM attributes a
            WHERE a.search_text LIKE ? ESCAPE '\'
            ORDER BY a.name
            LIMIT ?
            "#,
            ATTRIBUTE_COLUMNS
        ))
        .bind(&pattern)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut matches = Vec::with_capacity(rows.len());
        for row in rows {
            let schemas = self.schema_names_for_attribute(&row.name).await?;
            matches.push(AttributeMatch {
                attribute: row.into_view(),
                schemas,
            });
        }
        Ok(matches)
    }

    async fn schemas_sharing_attribute(&self, name: &str) -> Result<Vec<SchemaSummary>> {
        let rows: Vec<SummaryRow> = sqlx::query_as(&format!(
            "{} WHERE s.id IN (SELECT schema_id FROM schema_attributes WHERE attribute_name = ?) ORDER BY s.name, s.id",
            SUMMARY_SELECT
        ))
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SummaryRow::into_summary).collect())
    }

    async fn stats(&self) -> Result<GraphStats> {
        let (schemas, attributes, metas, has_attribute, has_meta): (i64, i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM schemas),
                    (SELECT COUNT(*) FROM attributes),
                    (SELECT COUNT(*) FROM metas),
                    (SELECT COUNT(*) FROM schema_attributes),
                    (SELECT COUNT(*) FROM metas)
                "#,
            )
            .fetch_one(&self.pool)
            .await?;

        Ok(GraphStats {
            schemas: schemas as u64,
            attributes: attributes as u64,
            metas: metas as u64,
            relationships: (has_attribute + has_meta) as u64,
        })
    }

    async fn record_import_run(&self, run: &ImportRunSummary) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO import_runs (
                id, folder, files_total, files_imported, files_failed, started_at, finished_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.folder)
        .bind(run.files_total as i64)
        .bind(run.files_imported as i64)
        .bind(run.files_failed as i64)
        .bind(run.started_at.to_rfc3339())
        .bind(run.finished_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        info!(run_id = %run.id, folder = %run.folder, "Import run recorded");
        Ok(())
    }

    async fn last_import_run(&self) -> Result<Option<ImportRunSummary>> {
        let row: Option<ImportRunRow> = sqlx::query_as(
            "SELECT id, folder, files_total, files_imported, files_failed, started_at, finished_at \
             FROM import_runs ORDER BY started_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ImportRunRow::into_summary))
    }
}

// ========== Row Types ==========

#[derive(Debug, FromRow)]
struct SummaryRow {
    id: String,
    name: String,
    schema_type: String,
    attribute_count: i64,
    meta_count: i64,
}

impl SummaryRow {
    fn into_summary(self) -> SchemaSummary {
        SchemaSummary {
            id: self.id,
            name: self.name,
            schema_type: self.schema_type,
            attribute_count: self.attribute_count as u64,
            meta_count: self.meta_count as u64,
        }
    }
}

#[derive(Debug, FromRow)]
struct SchemaRow {
    id: String,
    name: String,
    display_name: String,
    capture_base_id: Option<String>,
    schema_type: String,
    attribute_ordering: Option<String>,
    entry_code_ordering: Option<String>,
}

impl SchemaRow {
    fn into_detail(
        self,
        attributes: Vec<AttributeView>,
        metas: Vec<MetaRecord>,
    ) -> Result<SchemaDetail> {
        let ordering = match self.attribute_ordering {
            Some(raw) => {
                let attribute_ordering: Vec<String> = serde_json::from_str(&raw).map_err(|e| {
                    Error::Other(format!("Invalid attribute ordering for {}: {}", self.id, e))
                })?;
                let entry_code_ordering = self
                    .entry_code_ordering
                    .as_deref()
                    .and_then(|s| serde_json::from_str(s).ok())
                    .unwrap_or_default();
                Some(Ordering {
                    attribute_ordering,
                    entry_code_ordering,
                })
            }
            None => None,
        };

        Ok(SchemaDetail {
            id: self.id,
            name: self.name,
            display_name: self.display_name,
            capture_base_id: self.capture_base_id,
            schema_type: self.schema_type,
            attributes,
            metas,
            ordering,
        })
    }
}

#[derive(Debug, FromRow)]
struct AttributeRow {
    name: String,
    attribute_type: String,
    unit: Option<String>,
    description: Option<String>,
    format: Option<String>,
    vocabulary: Option<String>,
    codes: Option<String>,
}

impl AttributeRow {
    fn into_view(self) -> AttributeView {
        AttributeView::from(StoredAttribute {
            name: self.name,
            attribute_type: Some(self.attribute_type),
            unit: self.unit,
            description: self.description,
            format: self.format,
            vocabulary: self.vocabulary,
            codes: self.codes,
        })
    }
}

#[derive(Debug, FromRow)]
struct MetaRow {
    name: String,
    language: String,
    description: Option<String>,
}

impl MetaRow {
    fn into_meta(self) -> MetaRecord {
        MetaRecord {
            name: self.name,
            description: self.description,
            language: self.language,
        }
    }
}

#[derive(Debug, FromRow)]
struct ImportRunRow {
    id: String,
    folder: String,
    files_total: i64,
    files_imported: i64,
    files_failed: i64,
    started_at: String,
    finished_at: String,
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl ImportRunRow {
    fn into_summary(self) -> ImportRunSummary {
        ImportRunSummary {
            started_at: parse_timestamp(&self.started_at),
            finished_at: parse_timestamp(&self.finished_at),
            id: self.id,
            folder: self.folder,
            files_total: self.files_total as u64,
            files_imported: self.files_imported as u64,
            files_failed: self.files_failed as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oca::fixtures::{SOIL_SAMPLE, WATER_QUALITY};
    use crate::storage::migrations::run_migrations;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_store() -> SqliteGraphStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool");

        run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        SqliteGraphStore::new(pool)
    }

    fn soil() -> SchemaRecord {
        SchemaRecord::from_bytes(SOIL_SAMPLE.as_bytes(), "soil_sample", "soil_sample.json").unwrap()
    }

    fn water() -> SchemaRecord {
        SchemaRecord::from_bytes(WATER_QUALITY.as_bytes(), "water_quality", "water_quality.json")
            .unwrap()
    }

    #[tokio::test]
    async fn test_import_and_get_schema() {
        let store = setup_test_store().await;

        let outcome = store.import_schema(&soil()).await.unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.attributes_written, 4);
        assert_eq!(outcome.metas_written, 2);
        assert!(outcome.ordering_written);

        let detail = store.get_schema("EJ3rNNjT_soilSchema").await.unwrap().unwrap();
        assert_eq!(detail.name, "soil_sample");
        assert_eq!(detail.capture_base_id.as_deref(), Some("EC_soilCaptureBase"));
        let names: Vec<_> = detail.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["sample_id", "depth", "ph", "texture"]);
        assert_eq!(detail.metas.len(), 2);

        let depth = detail.attributes.iter().find(|a| a.name == "depth").unwrap();
        assert_eq!(depth.unit.as_deref(), Some("cm"));
        assert_eq!(depth.description_for("fra"), Some("Profondeur d'échantillonnage"));
    }

    #[tokio::test]
    async fn test_get_schema_by_name() {
        let store = setup_test_store().await;
        store.import_schema(&soil()).await.unwrap();

        let detail = store.get_schema("soil_sample").await.unwrap().unwrap();
        assert_eq!(detail.id, "EJ3rNNjT_soilSchema");
        assert!(store.get_schema("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_schema_by_shared_name_picks_smallest_id() {
        let store = setup_test_store().await;
        let mut copy = soil();
        copy.id = "AAA_copy".to_string();
        store.import_schema(&soil()).await.unwrap();
        store.import_schema(&copy).await.unwrap();

        let detail = store.get_schema("soil_sample").await.unwrap().unwrap();
        assert_eq!(detail.id, "AAA_copy");
        let detail = store.get_schema("EJ3rNNjT_soilSchema").await.unwrap().unwrap();
        assert_eq!(detail.id, "EJ3rNNjT_soilSchema");
    }

    #[tokio::test]
    async fn test_reimport_updates_instead_of_duplicating() {
        let store = setup_test_store().await;
        store.import_schema(&soil()).await.unwrap();
        let second = store.import_schema(&soil()).await.unwrap();
        assert!(!second.created);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.schemas, 1);
        assert_eq!(stats.attributes, 4);
        assert_eq!(stats.metas, 2);
        assert_eq!(stats.relationships, 6);
    }

    #[tokio::test]
    async fn test_shared_attribute_last_import_wins() {
        let store = setup_test_store().await;
        store.import_schema(&soil()).await.unwrap();
        store.import_schema(&water()).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.schemas, 2);
        // ph is shared: 4 + 3 - 1
        assert_eq!(stats.attributes, 6);

        let hits = store.search_attributes("ph", 10).await.unwrap();
        let ph = hits.iter().find(|h| h.attribute.name == "ph").unwrap();
        assert_eq!(ph.schemas, vec!["soil_sample", "water_quality"]);
        // water declares no unit for ph, so the soil unit is cleared
        assert!(ph.attribute.unit.is_none());
        assert_eq!(
            ph.attribute.description_for("eng"),
            Some("Water pH at the sampling station")
        );
    }

    #[tokio::test]
    async fn test_list_schemas_sorted_with_counts() {
        let store = setup_test_store().await;
        store.import_schema(&water()).await.unwrap();
        store.import_schema(&soil()).await.unwrap();

        let schemas = store.list_schemas().await.unwrap();
        assert_eq!(schemas.len(), 2);
        assert_eq!(schemas[0].name, "soil_sample");
        assert_eq!(schemas[0].attribute_count, 4);
        assert_eq!(schemas[0].meta_count, 2);
        assert_eq!(schemas[1].name, "water_quality");
        assert_eq!(schemas[1].attribute_count, 3);
    }

    #[tokio::test]
    async fn test_search_matches_description_case_insensitive() {
        let store = setup_test_store().await;
        store.import_schema(&water()).await.unwrap();

        let hits = store.search_attributes("CLOUDINESS", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].attribute.name, "turbidity");
        assert_eq!(hits[0].attribute.unit.as_deref(), Some("NTU"));
    }

    #[tokio::test]
    async fn test_search_escapes_wildcards() {
        let store = setup_test_store().await;
        store.import_schema(&soil()).await.unwrap();

        // "_" must not act as a single-character wildcard
        let hits = store.search_attributes("p_", 10).await.unwrap();
        assert!(hits.is_empty());

        let hits = store.search_attributes("sample_", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].attribute.name, "sample_id");
    }

    #[tokio::test]
    async fn test_search_folds_non_ascii_case() {
        let store = setup_test_store().await;
        let mut record = soil();
        let sample_id = &mut record.attributes[0];
        sample_id
            .descriptions
            .insert("fra".to_string(), "Échantillon de sol".to_string());
        store.import_schema(&record).await.unwrap();

        for keyword in ["échantillon", "ÉCHANTILLON", "Échantillon De"] {
            let hits = store.search_attributes(keyword, 10).await.unwrap();
            let names: Vec<_> = hits.iter().map(|h| h.attribute.name.as_str()).collect();
            assert!(names.contains(&"sample_id"), "{} should match sample_id", keyword);
        }
    }

    #[tokio::test]
    async fn test_search_ignores_language_codes_and_json() {
        let store = setup_test_store().await;
        store.import_schema(&water()).await.unwrap();

        for keyword in ["eng", "\":\"", "{"] {
            let hits = store.search_attributes(keyword, 10).await.unwrap();
            assert!(hits.is_empty(), "{} should match nothing", keyword);
        }
    }

    #[tokio::test]
    async fn test_search_limit_and_empty_keyword() {
        let store = setup_test_store().await;
        store.import_schema(&soil()).await.unwrap();

        let hits = store.search_attributes("e", 2).await.unwrap();
        assert_eq!(hits.len(), 2);

        let err = store.search_attributes("  ", 5).await.unwrap_err();
        assert_eq!(err.code(), "E800");
    }

    #[tokio::test]
    async fn test_schemas_sharing_attribute() {
        let store = setup_test_store().await;
        store.import_schema(&soil()).await.unwrap();
        store.import_schema(&water()).await.unwrap();

        let sharing = store.schemas_sharing_attribute("ph").await.unwrap();
        let names: Vec<_> = sharing.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["soil_sample", "water_quality"]);

        let only_soil = store.schemas_sharing_attribute("texture").await.unwrap();
        assert_eq!(only_soil.len(), 1);
        assert!(store.schemas_sharing_attribute("nothing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cypher_unsupported() {
        let store = setup_test_store().await;
        assert!(!store.supports_cypher());
        let err = store.run_read_query("MATCH (n) RETURN n").await.unwrap_err();
        assert_eq!(err.code(), "E403");
    }

    #[tokio::test]
    async fn test_import_run_history() {
        let store = setup_test_store().await;
        assert!(store.last_import_run().await.unwrap().is_none());

        let earlier = Utc::now() - chrono::Duration::minutes(5);
        let later = Utc::now();
        for (id, started) in [("run-1", earlier), ("run-2", later)] {
            store
                .record_import_run(&ImportRunSummary {
                    id: id.to_string(),
                    folder: "./schemas".to_string(),
                    files_total: 3,
                    files_imported: 2,
                    files_failed: 1,
                    started_at: started,
                    finished_at: started,
                })
                .await
                .unwrap();
        }

        let last = store.last_import_run().await.unwrap().unwrap();
        assert_eq!(last.id, "run-2");
        assert_eq!(last.files_failed, 1);
    }

    #[test]
    fn test_like_pattern() {
        assert_eq!(like_pattern("ph"), "%ph%");
        assert_eq!(like_pattern("a_b%"), "%a\\_b\\%%");
    }
}

//! Error types for SchemaGenie

use thiserror::Error;

/// Result type alias using SchemaGenie's Error
pub type Result<T> = std::result::Result<T, Error>;

/// SchemaGenie error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Schema and input errors (E001-E099)
    #[error("Schema '{0}' not found. Run `schemagenie schemas list` to see imported schemas.")]
    SchemaNotFound(String),

    #[error("Invalid OCA package '{0}': {1}")]
    InvalidSchema(String, String),

    #[error("Folder '{0}' does not exist.")]
    FolderNotFound(String),

    #[error("'{0}' is not a directory.")]
    NotADirectory(String),

    #[error("No JSON files found in '{0}'.")]
    NoSchemaFiles(String),

    // Network errors (E100-E199)
    #[error("Network error: {0}. Check your connection and the configured endpoint.")]
    NetworkError(#[from] reqwest::Error),

    #[error("LLM API error: {0}. Check your API key with `schemagenie config get llm.api_key`.")]
    LLMError(String),

    #[error("Rate limited. Waiting {0} seconds before retry.")]
    RateLimited(u64),

    #[error("No suitable model found: {0}")]
    NoSuitableModel(String),

    // Graph store errors (E400-E499)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Graph query failed ({0}): {1}")]
    GraphQuery(String, String),

    #[error("Query rejected: {0}. Only read-only Cypher is allowed.")]
    ReadOnlyViolation(String),

    #[error("Operation not supported by the {0} backend: {1}")]
    Unsupported(String, String),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::SchemaNotFound(_) => "E001",
            Self::InvalidSchema(..) => "E002",
            Self::FolderNotFound(_) => "E003",
            Self::NotADirectory(_) => "E004",
            Self::NoSchemaFiles(_) => "E005",
            Self::NetworkError(_) => "E100",
            Self::LLMError(_) => "E101",
            Self::RateLimited(_) => "E102",
            Self::NoSuitableModel(_) => "E103",
            Self::DatabaseError(_) => "E400",
            Self::GraphQuery(..) => "E401",
            Self::ReadOnlyViolation(_) => "E402",
            Self::Unsupported(..) => "E403",
            Self::ConfigError(_) => "E600",
            Self::InvalidInput(_) => "E800",
            Self::Other(_) | Self::Json(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::SchemaNotFound(_) => Some("schemagenie schemas list".to_string()),
            Self::FolderNotFound(_) | Self::NotADirectory(_) => {
                Some("schemagenie import --folder <path-to-schemas>".to_string())
            }
            Self::NetworkError(_) => Some("schemagenie doctor".to_string()),
            Self::LLMError(_) => Some("schemagenie config get llm.api_key".to_string()),
            Self::GraphQuery(..) => Some("schemagenie config list".to_string()),
            Self::Unsupported(..) => Some("schemagenie --backend neo4j <command>".to_string()),
            Self::ConfigError(_) => Some("schemagenie config list".to_string()),
            _ => None,
        }
    }

    /// Whether the error is tied to one schema file rather than the whole run
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            Self::InvalidSchema(..) | Self::Json(_) | Self::GraphQuery(..) | Self::DatabaseError(_)
        )
    }
}

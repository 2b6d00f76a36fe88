//! Error types for the review pipeline.

use uuid::Uuid;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Unknown marketplace kind: {0}")]
    UnknownMarketplace(String),

    #[error("Credential {reference} for account {account_id} could not be resolved")]
    MissingCredential { account_id: Uuid, reference: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Marketplace upstream failures — transport errors, non-2xx responses,
/// payloads the parser cannot make sense of.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("{marketplace} request failed: {reason}")]
    Request { marketplace: String, reason: String },

    #[error("{marketplace} returned HTTP {status}: {body}")]
    Status {
        marketplace: String,
        status: u16,
        body: String,
    },

    #[error("Malformed {marketplace} payload: {reason}")]
    Malformed { marketplace: String, reason: String },
}

/// Domain/provider constraint violations caught before any network call.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Reply text length {length} outside {marketplace} bounds {min}-{max}")]
    ReplyLength {
        marketplace: String,
        length: usize,
        min: usize,
        max: usize,
    },

    #[error("Rule rating range {min_rating}-{max_rating} is invalid")]
    RatingBounds { min_rating: u8, max_rating: u8 },

    #[error("External id {value:?} is not valid for {marketplace}")]
    InvalidExternalId { marketplace: String, value: String },

    #[error("Review {review_id} is not awaiting moderation (status: {status})")]
    ModerationState { review_id: Uuid, status: String },
}

/// Model-provider failures during reply generation.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Provider {provider} returned empty content")]
    EmptyResponse { provider: String },
}

/// Result type alias for the pipeline.
pub type Result<T> = std::result::Result<T, Error>;

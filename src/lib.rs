//! Review Responder — marketplace review ingestion-and-reply pipeline.

pub mod config;
pub mod credentials;
pub mod error;
pub mod generator;
pub mod llm;
pub mod marketplace;
pub mod model;
pub mod pipeline;
pub mod store;

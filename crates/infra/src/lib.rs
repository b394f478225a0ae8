//! Infrastructure layer: primary stores, search index, index sync, config.

pub mod config;
pub mod entity_service;
pub mod indexer;
pub mod repository;
pub mod search;


pub use config::{AppConfig, ConfigError};
pub use entity_service::{EntityService, Reindex, Saved, ServiceError};

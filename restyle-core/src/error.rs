use thiserror::Error;

use crate::config::ConfigError;
use crate::model::ModelError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read recipe store: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid recipe store JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Unknown recipe id: {0}")]
    UnknownRecipe(String),
}

#[derive(Error, Debug)]
pub enum RulesError {
    #[error("Invalid rule table JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Invalid pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Unknown tag in rule table: {0}")]
    UnknownTag(String),

    #[error("Tag {tag} refers to unknown group {group}")]
    UnknownGroup { tag: String, group: String },

    #[error("Failed to read rule table: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

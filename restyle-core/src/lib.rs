pub mod compliance;
pub mod config;
pub mod dictionary;
pub mod engine;
pub mod error;
pub mod markers;
pub mod matcher;
pub mod mode;
pub mod model;
pub mod output;
pub mod prompt;
pub mod scorer;
pub mod store;
pub mod substitution;
pub mod tokenizer;
pub mod training;
pub mod truncate;
pub mod types;

pub use compliance::{ComplianceChecker, RuleTableChecker};
pub use config::{ConfigError, EngineConfig, SamplingParams};
pub use dictionary::{Dictionary, WordList};
pub use engine::{
    BatchContext, GenerationEngine, GenerationTask, IngredientSource, TaskFactory, TaskStatus,
};
pub use error::{EngineError, RulesError, StoreError};
pub use matcher::IngredientMatcher;
pub use mode::{Mode, ModeConfig};
pub use model::{
    create_cached_model_from_env, create_ingredient_model_from_env, create_model_from_env,
    CachingModel, FakeModel, GenerationModel, HttpModel, ModelError,
};
pub use output::{rows_from_task, write_jsonl, write_tsv, OutputRow};
pub use scorer::CandidateScorer;
pub use store::{AlignmentKind, AlignmentMap, JsonRecipeStore, RecipePair, RecipeStore, Seen};
pub use substitution::RuleSubstituter;
pub use tokenizer::{Tokenizer, WordTokenizer};
pub use truncate::{truncate, truncate_prompt, Truncated};
pub use types::{Diet, Polarity, Recipe, StyleTag};

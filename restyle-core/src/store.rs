//! Recipe store and step alignment metadata.
//!
//! A store file looks like:
//!
//! ```json
//! {
//!   "recipes": {"r1": {"title": "...", "ingredients": [...], "steps": [...]}},
//!   "pairs": [{"source_id": "r1", "target_id": "r2",
//!              "source_tag": "non-vegan", "target_tag": "vegan",
//!              "seen": "unseen",
//!              "alignments": [{"source_step": 0, "target_step": 0, "probability": 0.9}]}]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::StoreError;
use crate::types::{Recipe, StyleTag};

/// Alignments below this probability are ignored.
pub const MIN_ALIGNMENT_PROBABILITY: f64 = 0.5;

pub trait RecipeStore {
    fn recipe(&self, id: &str) -> Option<&Recipe>;

    fn pairs(&self) -> &[RecipePair];

    fn get(&self, id: &str) -> Result<&Recipe, StoreError> {
        self.recipe(id)
            .ok_or_else(|| StoreError::UnknownRecipe(id.to_string()))
    }
}

/// Whether the source recipe was part of the model's training data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Seen {
    Seen,
    #[default]
    Unseen,
}

impl Seen {
    pub fn as_str(&self) -> &'static str {
        match self {
            Seen::Seen => "seen",
            Seen::Unseen => "unseen",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepAlignment {
    pub source_step: usize,
    pub target_step: usize,
    pub probability: f64,
}

/// A source recipe and its rewrite under the opposite tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipePair {
    pub source_id: String,
    pub target_id: String,
    pub source_tag: StyleTag,
    pub target_tag: StyleTag,
    #[serde(default)]
    pub seen: Seen,
    #[serde(default)]
    pub alignments: Vec<StepAlignment>,
}

/// How a reference step index was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignmentKind {
    Aligned,
    /// Proportional position, used when no confident alignment exists.
    Uniform,
}

impl AlignmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlignmentKind::Aligned => "aligned",
            AlignmentKind::Uniform => "uniform",
        }
    }
}

/// Reference target step for each source step.
///
/// Indices never decrease from one source step to the next.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignmentMap {
    entries: Vec<Option<(usize, AlignmentKind)>>,
}

impl AlignmentMap {
    pub fn new(alignments: &[StepAlignment], source_len: usize, target_len: usize) -> Self {
        if target_len == 0 {
            return Self {
                entries: vec![None; source_len],
            };
        }

        let mut best: Vec<Option<&StepAlignment>> = vec![None; source_len];
        for a in alignments {
            if a.source_step >= source_len
                || a.target_step >= target_len
                || a.probability < MIN_ALIGNMENT_PROBABILITY
            {
                continue;
            }
            let slot = &mut best[a.source_step];
            if slot.map_or(true, |b| a.probability > b.probability) {
                *slot = Some(a);
            }
        }

        let mut entries = Vec::with_capacity(source_len);
        let mut floor = 0;
        for (i, aligned) in best.into_iter().enumerate() {
            let entry = match aligned {
                Some(a) if a.target_step >= floor => (a.target_step, AlignmentKind::Aligned),
                _ => {
                    let uniform = (i * target_len / source_len).clamp(floor, target_len - 1);
                    (uniform, AlignmentKind::Uniform)
                }
            };
            floor = entry.0;
            entries.push(Some(entry));
        }
        Self { entries }
    }

    pub fn reference_for(&self, source_step: usize) -> Option<(usize, AlignmentKind)> {
        self.entries.get(source_step).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Store backed by a single JSON document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JsonRecipeStore {
    recipes: BTreeMap<String, Recipe>,
    #[serde(default)]
    pairs: Vec<RecipePair>,
}

impl JsonRecipeStore {
    pub fn new(recipes: BTreeMap<String, Recipe>, pairs: Vec<RecipePair>) -> Self {
        Self { recipes, pairs }
    }

    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, StoreError> {
        let store = Self::from_json(&std::fs::read_to_string(path)?)?;
        tracing::info!(
            path = %path.display(),
            recipes = store.recipes.len(),
            pairs = store.pairs.len(),
            "Loaded recipe store"
        );
        Ok(store)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.recipes.keys().map(String::as_str)
    }
}

impl RecipeStore for JsonRecipeStore {
    fn recipe(&self, id: &str) -> Option<&Recipe> {
        self.recipes.get(id)
    }

    fn pairs(&self) -> &[RecipePair] {
        &self.pairs
    }
}

//! Core recipe and dietary-tag types shared across the crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::ConfigError;

/// A recipe as loaded from the store. Read-only once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Recipe {
    pub title: String,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub steps: Vec<String>,
}

impl Recipe {
    pub fn new(
        title: impl Into<String>,
        ingredients: impl IntoIterator<Item = impl Into<String>>,
        steps: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            title: title.into(),
            ingredients: ingredients.into_iter().map(Into::into).collect(),
            steps: steps.into_iter().map(Into::into).collect(),
        }
    }
}

/// Dietary attribute a recipe can be rewritten toward or away from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Diet {
    Vegan,
    Vegetarian,
    DairyFree,
    AlcoholFree,
    EggFree,
    FishFree,
    NutFree,
}

impl Diet {
    pub const ALL: [Diet; 7] = [
        Diet::Vegan,
        Diet::Vegetarian,
        Diet::DairyFree,
        Diet::AlcoholFree,
        Diet::EggFree,
        Diet::FishFree,
        Diet::NutFree,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Diet::Vegan => "vegan",
            Diet::Vegetarian => "vegetarian",
            Diet::DairyFree => "dairy-free",
            Diet::AlcoholFree => "alcohol-free",
            Diet::EggFree => "egg-free",
            Diet::FishFree => "fish-free",
            Diet::NutFree => "nut-free",
        }
    }
}

impl fmt::Display for Diet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Diet {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Diet::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigError::UnknownTag(s.to_string()))
    }
}

/// Whether a tag asserts the diet (`vegan`) or its absence (`non-vegan`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Positive,
    Negative,
}

/// A dietary attribute plus polarity, rendered as `vegan` or `non-vegan`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StyleTag {
    pub diet: Diet,
    pub polarity: Polarity,
}

impl StyleTag {
    pub fn positive(diet: Diet) -> Self {
        Self {
            diet,
            polarity: Polarity::Positive,
        }
    }

    pub fn negative(diet: Diet) -> Self {
        Self {
            diet,
            polarity: Polarity::Negative,
        }
    }

    /// The same diet with the opposite polarity.
    pub fn opposite(&self) -> Self {
        let polarity = match self.polarity {
            Polarity::Positive => Polarity::Negative,
            Polarity::Negative => Polarity::Positive,
        };
        Self {
            diet: self.diet,
            polarity,
        }
    }

    pub fn is_positive(&self) -> bool {
        self.polarity == Polarity::Positive
    }
}

impl fmt::Display for StyleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.polarity {
            Polarity::Positive => write!(f, "{}", self.diet),
            Polarity::Negative => write!(f, "non-{}", self.diet),
        }
    }
}

impl FromStr for StyleTag {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        match lower.strip_prefix("non-") {
            Some(rest) => Ok(StyleTag::negative(rest.parse()?)),
            None => Ok(StyleTag::positive(lower.parse()?)),
        }
    }
}

impl TryFrom<String> for StyleTag {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StyleTag> for String {
    fn from(tag: StyleTag) -> Self {
        tag.to_string()
    }
}

//! Generation modes.
//!
//! Each mode is a fixed assignment of prompt options plus a round structure.
//! The builder and the loop match on [`Mode`] rather than on mode names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::ConfigError;

/// Prompt options a mode fixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeConfig {
    pub include_source_ingredients: bool,
    /// Target title and ingredients.
    pub include_target_context: bool,
    pub include_target_ingredient_mentions: bool,
    pub carry_prior_target_steps: bool,
    /// Show only the current source step instead of the accumulated history.
    pub simple: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Send the prompt as given, one round.
    ManualEcho,
    /// Continue a recipe on its own, without style tags.
    NextStep,
    /// Rewrite each source step toward the target tag.
    StyleTransfer { simple: bool },
    /// Style transfer with a predicted ingredient-mention list per step.
    StyleTransferIngredients { simple: bool },
    /// Style transfer that also carries the target steps written so far.
    NextStepStyleTransfer,
    /// Carried style transfer with predicted ingredient mentions.
    NextStepStyleTransferIngredients { simple: bool },
    /// Rewrite the whole recipe in one sequence.
    FullRecipe,
}

impl Mode {
    pub const ALL_NAMES: [&'static str; 10] = [
        "manual",
        "next_step",
        "style_transfer",
        "style_transfer_simple",
        "style_transfer_ing",
        "style_transfer_ing_simple",
        "next_step_style_transfer",
        "next_step_style_transfer_ing",
        "next_step_style_transfer_ing_simple",
        "full_recipe",
    ];

    pub fn config(&self) -> ModeConfig {
        let off = ModeConfig {
            include_source_ingredients: false,
            include_target_context: false,
            include_target_ingredient_mentions: false,
            carry_prior_target_steps: false,
            simple: false,
        };
        match *self {
            Mode::ManualEcho => off,
            Mode::NextStep => ModeConfig {
                include_source_ingredients: true,
                ..off
            },
            Mode::StyleTransfer { simple } => ModeConfig {
                include_source_ingredients: !simple,
                simple,
                ..off
            },
            Mode::StyleTransferIngredients { simple } => ModeConfig {
                include_source_ingredients: !simple,
                include_target_context: true,
                include_target_ingredient_mentions: true,
                simple,
                ..off
            },
            Mode::NextStepStyleTransfer => ModeConfig {
                include_source_ingredients: true,
                include_target_context: true,
                carry_prior_target_steps: true,
                ..off
            },
            Mode::NextStepStyleTransferIngredients { simple } => ModeConfig {
                include_source_ingredients: !simple,
                include_target_context: true,
                include_target_ingredient_mentions: true,
                carry_prior_target_steps: true,
                simple,
            },
            Mode::FullRecipe => ModeConfig {
                include_source_ingredients: true,
                include_target_context: true,
                ..off
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match *self {
            Mode::ManualEcho => "manual",
            Mode::NextStep => "next_step",
            Mode::StyleTransfer { simple: false } => "style_transfer",
            Mode::StyleTransfer { simple: true } => "style_transfer_simple",
            Mode::StyleTransferIngredients { simple: false } => "style_transfer_ing",
            Mode::StyleTransferIngredients { simple: true } => "style_transfer_ing_simple",
            Mode::NextStepStyleTransfer => "next_step_style_transfer",
            Mode::NextStepStyleTransferIngredients { simple: false } => {
                "next_step_style_transfer_ing"
            }
            Mode::NextStepStyleTransferIngredients { simple: true } => {
                "next_step_style_transfer_ing_simple"
            }
            Mode::FullRecipe => "full_recipe",
        }
    }

    /// Modes that run an ingredient phase before each step phase.
    pub fn has_ingredient_phase(&self) -> bool {
        self.config().include_target_ingredient_mentions
    }

    /// Modes that end once every source step has a target step.
    pub fn is_source_bounded(&self) -> bool {
        matches!(
            self,
            Mode::StyleTransfer { .. }
                | Mode::StyleTransferIngredients { .. }
                | Mode::NextStepStyleTransferIngredients { .. }
        )
    }

    /// Modes whose rounds may return several steps at once.
    pub fn is_multi_segment(&self) -> bool {
        matches!(self, Mode::NextStep | Mode::FullRecipe)
    }

    /// Modes that make a single task per recipe instead of one per start step.
    pub fn is_single_task(&self) -> bool {
        matches!(self, Mode::ManualEcho | Mode::FullRecipe)
    }

    /// Modes that never run more than one round.
    pub fn is_one_shot(&self) -> bool {
        matches!(self, Mode::ManualEcho)
    }

    pub fn uses_style_tags(&self) -> bool {
        !matches!(self, Mode::ManualEcho | Mode::NextStep)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase().replace('-', "_");
        let mode = match name.as_str() {
            "manual" | "manual_echo" => Mode::ManualEcho,
            "next_step" => Mode::NextStep,
            "style_transfer" => Mode::StyleTransfer { simple: false },
            "style_transfer_simple" => Mode::StyleTransfer { simple: true },
            "style_transfer_ing" | "style_transfer_ingredients" => {
                Mode::StyleTransferIngredients { simple: false }
            }
            "style_transfer_ing_simple" | "style_transfer_ingredients_simple" => {
                Mode::StyleTransferIngredients { simple: true }
            }
            "next_step_style_transfer" => Mode::NextStepStyleTransfer,
            "next_step_style_transfer_ing" | "next_step_style_transfer_ingredients" => {
                Mode::NextStepStyleTransferIngredients { simple: false }
            }
            "next_step_style_transfer_ing_simple" => {
                Mode::NextStepStyleTransferIngredients { simple: true }
            }
            "full_recipe" => Mode::FullRecipe,
            _ => return Err(ConfigError::UnknownMode(s.to_string())),
        };
        Ok(mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_name_parses() {
        for name in Mode::ALL_NAMES {
            assert!(name.parse::<Mode>().is_ok(), "{} should parse", name);
        }
    }

    #[test]
    fn test_name_round_trip() {
        for name in Mode::ALL_NAMES {
            let mode: Mode = name.parse().unwrap();
            assert_eq!(mode.name(), name);
        }
    }

    #[test]
    fn test_unknown_mode() {
        let err = "style_transfer_sideways".parse::<Mode>().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownMode(_)));
    }

    #[test]
    fn test_simple_modes_drop_source_ingredients() {
        let config = Mode::StyleTransfer { simple: true }.config();
        assert!(config.simple);
        assert!(!config.include_source_ingredients);
        assert!(Mode::StyleTransfer { simple: false }
            .config()
            .include_source_ingredients);
    }

    #[test]
    fn test_round_structure() {
        assert!(Mode::StyleTransfer { simple: false }.is_source_bounded());
        assert!(!Mode::NextStepStyleTransfer.is_source_bounded());
        assert!(Mode::FullRecipe.is_multi_segment());
        assert!(Mode::NextStepStyleTransferIngredients { simple: false }.has_ingredient_phase());
        assert!(Mode::NextStepStyleTransfer.config().carry_prior_target_steps);
        assert!(!Mode::NextStep.uses_style_tags());
    }
}

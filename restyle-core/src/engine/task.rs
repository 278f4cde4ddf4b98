//! Per-recipe generation state.

use serde::Serialize;

use crate::config::ConfigError;
use crate::markers;
use crate::mode::Mode;
use crate::store::{AlignmentMap, RecipePair, Seen};
use crate::types::{Recipe, StyleTag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Active,
    Done,
}

/// One unit of orchestration work. Mutated only by the engine.
#[derive(Debug, Clone)]
pub struct GenerationTask {
    /// Source id, target tag and start step, e.g. `r12-vegan0`.
    pub id: String,
    pub mode: Mode,
    pub source: Recipe,
    /// Target title and ingredients, plus reference steps.
    pub target: Option<Recipe>,
    pub source_tag: StyleTag,
    pub target_tag: StyleTag,
    /// Source step the first generated step rewrites: 0 or 1.
    pub start_step: usize,
    pub round: usize,
    pub generated_steps: Vec<String>,
    /// Mention list chosen for each generated step; empty for modes without
    /// an ingredient phase.
    pub generated_mentions: Vec<String>,
    /// Every sampled candidate of the round that produced each step.
    pub candidates: Vec<Vec<String>>,
    pub step_prompts: Vec<String>,
    pub ingredient_prompts: Vec<String>,
    pub status: TaskStatus,
    /// Consecutive rounds that produced nothing.
    pub empty_retries: usize,
    pub generated_tokens: usize,
    pub seen: Option<Seen>,
    pub alignment: AlignmentMap,
    /// Prompt text for [`Mode::ManualEcho`].
    pub manual_prompt: Option<String>,
}

impl GenerationTask {
    fn new(
        id: String,
        mode: Mode,
        source: Recipe,
        target: Option<Recipe>,
        source_tag: StyleTag,
        target_tag: StyleTag,
        start_step: usize,
    ) -> Self {
        Self {
            id,
            mode,
            source,
            target,
            source_tag,
            target_tag,
            start_step,
            round: 0,
            generated_steps: Vec::new(),
            generated_mentions: Vec::new(),
            candidates: Vec::new(),
            step_prompts: Vec::new(),
            ingredient_prompts: Vec::new(),
            status: TaskStatus::Active,
            empty_retries: 0,
            generated_tokens: 0,
            seen: None,
            alignment: AlignmentMap::default(),
            manual_prompt: None,
        }
    }

    /// A one-round task that sends `prompt` as given.
    pub fn manual(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        let tag = StyleTag::positive(crate::types::Diet::Vegan);
        let mut task = Self::new(
            id.into(),
            Mode::ManualEcho,
            Recipe::default(),
            None,
            tag.opposite(),
            tag,
            0,
        );
        task.manual_prompt = Some(prompt.into());
        task
    }

    pub fn is_done(&self) -> bool {
        self.status == TaskStatus::Done
    }

    /// Index of the source step the next generated step corresponds to.
    pub fn current_source_index(&self) -> usize {
        self.start_step + self.generated_steps.len()
    }

    pub fn current_source_step(&self) -> &str {
        self.source
            .steps
            .get(self.current_source_index())
            .map_or("", String::as_str)
    }

    /// Tag candidates are checked against. Modes without style tags continue
    /// the source recipe, so they are held to its own tag.
    pub fn scoring_tag(&self) -> &StyleTag {
        if self.mode.uses_style_tags() {
            &self.target_tag
        } else {
            &self.source_tag
        }
    }

    pub fn target_title(&self) -> &str {
        self.target.as_ref().map_or("", |t| t.title.as_str())
    }

    pub fn target_ingredients(&self) -> &[String] {
        self.target
            .as_ref()
            .map(|t| t.ingredients.as_slice())
            .unwrap_or(&[])
    }

    /// Steps given before generation starts: in step-1 tasks the reference
    /// step 0 (of the target, or of the recipe itself for next-step).
    pub fn seed_steps(&self) -> &[String] {
        if self.start_step == 0 {
            return &[];
        }
        let steps = match self.mode {
            Mode::NextStep => &self.source.steps,
            _ => match &self.target {
                Some(target) => &target.steps,
                None => return &[],
            },
        };
        &steps[..self.start_step.min(steps.len())]
    }

    /// Target-side steps so far: the seed followed by everything generated.
    pub fn prior_target_steps(&self) -> Vec<String> {
        self.seed_steps()
            .iter()
            .chain(&self.generated_steps)
            .cloned()
            .collect()
    }

    /// Ingredient lines mentions are matched against: both recipes plus the
    /// substitutes rules for the target tag can introduce.
    pub fn ingredient_vocabulary(&self, replacement_terms: &[String]) -> Vec<String> {
        self.source
            .ingredients
            .iter()
            .chain(self.target_ingredients())
            .chain(replacement_terms)
            .cloned()
            .collect()
    }

    /// Append one step with the records that explain it.
    pub(crate) fn push_step(
        &mut self,
        step: &str,
        mentions: &str,
        candidates: Vec<String>,
        step_prompt: &str,
        ingredient_prompt: &str,
    ) {
        self.generated_steps.push(markers::strip_markers(step));
        self.generated_mentions.push(mentions.to_string());
        self.candidates.push(candidates);
        self.step_prompts.push(step_prompt.to_string());
        self.ingredient_prompts.push(ingredient_prompt.to_string());
    }

    pub(crate) fn finalize(&mut self) {
        for step in &mut self.generated_steps {
            *step = markers::strip_markers(step);
        }
        self.status = TaskStatus::Done;
    }
}

/// Turns recipe pairs into tasks for one mode.
#[derive(Debug, Clone, Copy)]
pub struct TaskFactory {
    mode: Mode,
}

impl TaskFactory {
    pub fn new(mode: Mode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Tasks for one pair: start-at-step-0, and start-at-step-1 where the mode
    /// and the source length allow it.
    ///
    /// Missing fields the mode needs are configuration errors.
    pub fn tasks_for_pair(
        &self,
        pair: &RecipePair,
        source: &Recipe,
        target: Option<&Recipe>,
    ) -> Result<Vec<GenerationTask>, ConfigError> {
        let missing = |recipe: &str, field: &str| ConfigError::MissingField {
            recipe: recipe.to_string(),
            field: field.to_string(),
        };

        if self.mode == Mode::ManualEcho {
            return Err(ConfigError::UnknownMode(format!(
                "{} tasks are built with GenerationTask::manual",
                self.mode
            )));
        }
        if pair.source_tag != pair.target_tag.opposite() {
            return Err(ConfigError::InvalidValue {
                var: "target_tag".to_string(),
                value: format!("{} -> {}", pair.source_tag, pair.target_tag),
            });
        }
        if source.title.trim().is_empty() {
            return Err(missing(&pair.source_id, "title"));
        }
        if source.steps.is_empty() {
            return Err(missing(&pair.source_id, "steps"));
        }

        let config = self.mode.config();
        if config.include_target_context {
            match target {
                None => return Err(missing(&pair.target_id, "recipe")),
                Some(t) if t.title.trim().is_empty() => {
                    return Err(missing(&pair.target_id, "title"))
                }
                Some(_) => {}
            }
        }

        let mut starts = vec![0];
        if !self.mode.is_single_task() && !config.simple && source.steps.len() > 1 {
            let seeds_from_target =
                config.carry_prior_target_steps || self.mode.has_ingredient_phase();
            if seeds_from_target && target.map_or(true, |t| t.steps.is_empty()) {
                return Err(missing(&pair.target_id, "steps"));
            }
            starts.push(1);
        }

        let alignment = AlignmentMap::new(
            &pair.alignments,
            source.steps.len(),
            target.map_or(0, |t| t.steps.len()),
        );

        Ok(starts
            .into_iter()
            .map(|start| {
                let mut task = GenerationTask::new(
                    format!("{}-{}{}", pair.source_id, pair.target_tag, start),
                    self.mode,
                    source.clone(),
                    target.cloned(),
                    pair.source_tag,
                    pair.target_tag,
                    start,
                );
                task.seen = Some(pair.seen);
                task.alignment = alignment.clone();
                task
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> RecipePair {
        RecipePair {
            source_id: "r1".to_string(),
            target_id: "r2".to_string(),
            source_tag: "non-vegan".parse().unwrap(),
            target_tag: "vegan".parse().unwrap(),
            seen: Seen::Unseen,
            alignments: Vec::new(),
        }
    }

    fn source() -> Recipe {
        Recipe::new(
            "Bacon Pasta",
            ["8 oz pasta", "4 slices bacon"],
            ["Boil the pasta.", "Fry the bacon.", "Toss together."],
        )
    }

    fn target() -> Recipe {
        Recipe::new(
            "Tempeh Pasta",
            ["8 oz pasta", "4 oz tempeh"],
            ["Boil the pasta.", "Fry the tempeh.", "Toss together."],
        )
    }

    #[test]
    fn test_two_tasks_per_pair() {
        let factory = TaskFactory::new(Mode::NextStepStyleTransfer);
        let tasks = factory
            .tasks_for_pair(&pair(), &source(), Some(&target()))
            .unwrap();
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["r1-vegan0", "r1-vegan1"]);
        assert_eq!(tasks[1].seed_steps(), &["Boil the pasta.".to_string()]);
        assert!(tasks[0].seed_steps().is_empty());
    }

    #[test]
    fn test_simple_and_single_task_modes() {
        let simple = TaskFactory::new(Mode::StyleTransfer { simple: true });
        assert_eq!(
            simple
                .tasks_for_pair(&pair(), &source(), None)
                .unwrap()
                .len(),
            1
        );
        let full = TaskFactory::new(Mode::FullRecipe);
        assert_eq!(
            full.tasks_for_pair(&pair(), &source(), Some(&target()))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_one_step_source_has_no_step_one_task() {
        let factory = TaskFactory::new(Mode::StyleTransfer { simple: false });
        let short = Recipe::new("Toast", ["bread"], ["Toast the bread."]);
        assert_eq!(
            factory.tasks_for_pair(&pair(), &short, None).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_missing_fields_are_fatal() {
        let factory = TaskFactory::new(Mode::NextStepStyleTransfer);
        let err = factory.tasks_for_pair(&pair(), &source(), None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { ref field, .. } if field == "recipe"));

        let no_steps = Recipe::new("Bacon Pasta", ["pasta"], Vec::<String>::new());
        let err = factory
            .tasks_for_pair(&pair(), &no_steps, Some(&target()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { ref field, .. } if field == "steps"));
    }

    #[test]
    fn test_tags_must_be_opposite() {
        let mut same = pair();
        same.source_tag = same.target_tag;
        let factory = TaskFactory::new(Mode::StyleTransfer { simple: false });
        assert!(factory.tasks_for_pair(&same, &source(), None).is_err());
    }

    #[test]
    fn test_vocabulary_and_seed_for_next_step() {
        let factory = TaskFactory::new(Mode::NextStep);
        let tasks = factory.tasks_for_pair(&pair(), &source(), None).unwrap();
        assert_eq!(tasks[1].seed_steps(), &["Boil the pasta.".to_string()]);
        assert_eq!(tasks[1].current_source_step(), "Fry the bacon.");
        let vocab = tasks[0].ingredient_vocabulary(&["tofu".to_string()]);
        assert_eq!(vocab, vec!["8 oz pasta", "4 slices bacon", "tofu"]);
    }
}

//! The generation loop.
//!
//! Tasks sharing a mode run in lockstep rounds. In each round every active
//! task gets one prompt per phase, the whole batch goes to the model in one
//! call per phase, and each task advances by the best-scoring candidate.
//! Finished tasks leave the batch.

mod parse;
mod task;

pub use parse::{all_segments, continuation, first_segment, parse_mentions, Continuation, Segment, Segments};
pub use task::{GenerationTask, TaskFactory, TaskStatus};

use std::sync::Arc;
use tracing::Instrument;

use crate::config::{ConfigError, EngineConfig};
use crate::error::EngineError;
use crate::markers;
use crate::mode::Mode;
use crate::model::{GenerationModel, Samples};
use crate::prompt;
use crate::scorer::{self, CandidateScorer};
use crate::substitution::RuleSubstituter;
use crate::tokenizer::Tokenizer;
use crate::truncate::truncate_prompt;

/// Where ingredient-aware modes get their per-step mention lists.
#[derive(Debug, Clone)]
pub enum IngredientSource {
    /// Sample mention lists from a model trained to predict them.
    Model(Arc<dyn GenerationModel>),
    /// Rewrite the source step with substitution rules and match mentions in
    /// the result.
    RuleBased,
}

/// Everything a batch of tasks shares.
#[derive(Debug, Clone)]
pub struct BatchContext {
    pub step_model: Arc<dyn GenerationModel>,
    pub ingredient_source: Option<IngredientSource>,
    pub tokenizer: Arc<dyn Tokenizer>,
    pub scorer: CandidateScorer,
    pub substituter: Arc<RuleSubstituter>,
    pub config: EngineConfig,
}

impl BatchContext {
    pub fn new(step_model: Arc<dyn GenerationModel>, tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self {
            step_model,
            ingredient_source: None,
            tokenizer,
            scorer: CandidateScorer::default(),
            substituter: RuleSubstituter::builtin(),
            config: EngineConfig::default(),
        }
    }

    pub fn with_ingredient_source(mut self, source: IngredientSource) -> Self {
        self.ingredient_source = Some(source);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_scorer(mut self, scorer: CandidateScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_substituter(mut self, substituter: Arc<RuleSubstituter>) -> Self {
        self.substituter = substituter;
        self
    }
}

/// Ingredient-phase result for one task.
#[derive(Debug, Clone, Default)]
struct IngredientChoice {
    mentions: String,
    prompt: String,
}

/// One parsed step-phase candidate.
#[derive(Debug, Clone)]
struct Candidate {
    steps: Vec<String>,
    terminal: bool,
    tokens: usize,
}

impl Candidate {
    fn display(&self) -> String {
        self.steps.join(format!(" {} ", markers::INST).as_str())
    }
}

#[derive(Debug)]
pub struct GenerationEngine {
    ctx: BatchContext,
}

impl GenerationEngine {
    pub fn new(ctx: BatchContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &BatchContext {
        &self.ctx
    }

    /// Run every task to completion.
    ///
    /// Tasks are grouped by mode and each group runs its own rounds. Only
    /// configuration and model errors abort the run.
    pub async fn run(&self, tasks: Vec<GenerationTask>) -> Result<Vec<GenerationTask>, EngineError> {
        let mut modes: Vec<Mode> = Vec::new();
        for task in &tasks {
            if !modes.contains(&task.mode) {
                modes.push(task.mode);
            }
        }

        let mut pending = tasks;
        let mut finished = Vec::with_capacity(pending.len());
        for mode in modes {
            let (batch, rest): (Vec<_>, Vec<_>) =
                pending.into_iter().partition(|t| t.mode == mode);
            pending = rest;
            finished.extend(self.run_mode(mode, batch).await?);
        }
        Ok(finished)
    }

    async fn run_mode(
        &self,
        mode: Mode,
        tasks: Vec<GenerationTask>,
    ) -> Result<Vec<GenerationTask>, EngineError> {
        if mode.has_ingredient_phase() && self.ctx.ingredient_source.is_none() {
            return Err(ConfigError::MissingIngredientSource(mode.to_string()).into());
        }

        let (mut done, mut active): (Vec<_>, Vec<_>) =
            tasks.into_iter().partition(GenerationTask::is_done);
        let mut round = 0;
        while !active.is_empty() {
            round += 1;
            let span = tracing::info_span!("generation_round", mode = %mode, round);
            self.run_round(mode, &mut active).instrument(span).await?;

            let (finished, still_active): (Vec<_>, Vec<_>) =
                active.into_iter().partition(GenerationTask::is_done);
            tracing::info!(
                %mode,
                round,
                finished = finished.len(),
                active = still_active.len(),
                "Round complete"
            );
            done.extend(finished);
            active = still_active;
        }
        Ok(done)
    }

    async fn run_round(&self, mode: Mode, tasks: &mut [GenerationTask]) -> Result<(), EngineError> {
        let choices: Vec<Option<IngredientChoice>> = if mode.has_ingredient_phase() {
            self.ingredient_phase(tasks).await?.into_iter().map(Some).collect()
        } else {
            vec![None; tasks.len()]
        };

        let prompts: Vec<String> = tasks
            .iter()
            .zip(&choices)
            .map(|(task, choice)| {
                prompt::step_prompt(task, choice.as_ref().map(|c| c.mentions.as_str()))
            })
            .collect();
        let budget = if mode == Mode::FullRecipe {
            self.ctx.config.full_recipe_budget()
        } else {
            self.ctx.config.step_budget()
        };
        let encoded = self.encode_batch(tasks, &prompts, budget, "step");
        let samples = self.sample(self.ctx.step_model.as_ref(), &encoded).await?;

        for (((task, choice), prompt_tokens), samples) in tasks
            .iter_mut()
            .zip(choices)
            .zip(&encoded)
            .zip(samples)
        {
            let candidates: Vec<Candidate> = samples
                .iter()
                .map(|sequence| self.parse_candidate(mode, prompt_tokens, sequence))
                .collect();
            let scores: Vec<f64> = candidates.iter().map(|c| self.score(task, c)).collect();
            let winner = scorer::select_best(&scores).map(|i| candidates[i].clone());
            tracing::debug!(task = %task.id, ?scores, "Scored step candidates");

            let step_prompt = self.ctx.tokenizer.decode(prompt_tokens);
            let all: Vec<String> = candidates.iter().map(Candidate::display).collect();
            self.advance(task, winner, all, &step_prompt, choice.unwrap_or_default());
        }
        Ok(())
    }

    /// Pick a mention list for each task's next step.
    async fn ingredient_phase(
        &self,
        tasks: &[GenerationTask],
    ) -> Result<Vec<IngredientChoice>, EngineError> {
        let Some(source) = &self.ctx.ingredient_source else {
            return Ok(vec![IngredientChoice::default(); tasks.len()]);
        };

        match source {
            IngredientSource::RuleBased => Ok(tasks
                .iter()
                .map(|task| {
                    let rewritten = self
                        .ctx
                        .substituter
                        .substitute(task.current_source_step(), &task.target_tag);
                    let vocabulary = self.vocabulary(task);
                    let mentions = self.ctx.scorer.matcher().mentions_in(&rewritten, &vocabulary);
                    IngredientChoice {
                        mentions: prompt::format_mentions(&mentions),
                        prompt: rewritten,
                    }
                })
                .collect()),
            IngredientSource::Model(model) => {
                let prompts: Vec<String> = tasks.iter().map(prompt::ingredient_prompt).collect();
                let encoded =
                    self.encode_batch(tasks, &prompts, self.ctx.config.ingredient_budget(), "ingredient");
                let samples = self.sample(model.as_ref(), &encoded).await?;

                Ok(tasks
                    .iter()
                    .zip(&encoded)
                    .zip(samples)
                    .map(|((task, prompt_tokens), samples)| {
                        let vocabulary = self.vocabulary(task);
                        let lists: Vec<Vec<String>> = samples
                            .iter()
                            .map(|sequence| {
                                let text =
                                    continuation(self.ctx.tokenizer.as_ref(), prompt_tokens, sequence).text;
                                parse_mentions(&text)
                            })
                            .collect();
                        let scores: Vec<f64> = lists
                            .iter()
                            .map(|list| {
                                self.ctx.scorer.score_mentions(
                                    list,
                                    task.current_source_step(),
                                    &task.target_tag,
                                    &vocabulary,
                                )
                            })
                            .collect();
                        let mentions = scorer::select_best(&scores)
                            .map(|i| prompt::format_mentions(&lists[i]))
                            .unwrap_or_else(|| markers::NO_INGS.to_string());
                        IngredientChoice {
                            mentions,
                            prompt: self.ctx.tokenizer.decode(prompt_tokens),
                        }
                    })
                    .collect())
            }
        }
    }

    fn vocabulary(&self, task: &GenerationTask) -> Vec<String> {
        task.ingredient_vocabulary(&self.ctx.substituter.replacement_terms(&task.target_tag))
    }

    /// Encode and truncate prompts to `budget`.
    fn encode_batch(
        &self,
        tasks: &[GenerationTask],
        prompts: &[String],
        budget: usize,
        phase: &str,
    ) -> Vec<Vec<u32>> {
        tasks
            .iter()
            .zip(prompts)
            .map(|(task, text)| {
                let truncated = truncate_prompt(self.ctx.tokenizer.as_ref(), text, budget);
                if !truncated.within_budget {
                    tracing::warn!(
                        task = %task.id,
                        phase,
                        budget,
                        tokens = truncated.tokens.len(),
                        "Prompt still over budget after truncation"
                    );
                }
                truncated.tokens
            })
            .collect()
    }

    /// One model call for the whole batch.
    ///
    /// A result count that does not match the batch is recovered by padding
    /// with empty sample lists.
    async fn sample(
        &self,
        model: &dyn GenerationModel,
        prompts: &[Vec<u32>],
    ) -> Result<Vec<Samples>, EngineError> {
        let config = &self.ctx.config;
        let mut samples = model
            .generate(
                prompts,
                config.max_new_tokens,
                &config.sampling,
                config.candidates_per_prompt(),
            )
            .await?;
        if samples.len() != prompts.len() {
            tracing::warn!(
                model = model.model_name(),
                expected = prompts.len(),
                returned = samples.len(),
                "Model returned the wrong number of results"
            );
            samples.resize(prompts.len(), Vec::new());
        }
        Ok(samples)
    }

    fn parse_candidate(&self, mode: Mode, prompt: &[u32], sequence: &[u32]) -> Candidate {
        let cont = continuation(self.ctx.tokenizer.as_ref(), prompt, sequence);
        let text = scorer::repair(&cont.text);

        let (steps, terminal) = if mode.is_one_shot() {
            let whole = markers::strip_markers(&all_segments(&text).steps.join(" "));
            (if whole.is_empty() { vec![] } else { vec![whole] }, true)
        } else if mode.is_multi_segment() {
            let segments = all_segments(&text);
            (segments.steps, segments.terminal)
        } else {
            let segment = first_segment(&text);
            let steps = if segment.text.is_empty() {
                vec![]
            } else {
                vec![segment.text]
            };
            (steps, segment.terminal)
        };

        Candidate {
            steps,
            terminal,
            tokens: cont.tokens,
        }
    }

    /// Sum of step scores, each against the source step at the same position.
    fn score(&self, task: &GenerationTask, candidate: &Candidate) -> f64 {
        if candidate.steps.is_empty() {
            return scorer::EMPTY_SCORE;
        }
        let vocabulary = self.vocabulary(task);
        let first = task.current_source_index();
        candidate
            .steps
            .iter()
            .enumerate()
            .map(|(offset, step)| {
                let source_step = task.source.steps.get(first + offset).map_or("", String::as_str);
                self.ctx
                    .scorer
                    .score_step(step, source_step, task.scoring_tag(), &vocabulary)
            })
            .sum()
    }

    /// Apply one round's winner to a task.
    fn advance(
        &self,
        task: &mut GenerationTask,
        winner: Option<Candidate>,
        candidates: Vec<String>,
        step_prompt: &str,
        choice: IngredientChoice,
    ) {
        let config = &self.ctx.config;
        task.round += 1;

        let (steps, terminal, tokens) = match winner {
            Some(c) => (c.steps, c.terminal, c.tokens),
            None => (Vec::new(), false, 0),
        };
        task.generated_tokens += tokens;

        // Per-step modes end every step with a terminator; they finish when
        // the source runs out instead.
        let ends_task = terminal && !task.mode.is_source_bounded();
        let round_cap = task.round >= config.round_limit();
        let budget_spent = task.generated_tokens >= config.max_generated_tokens;

        if steps.is_empty() && !ends_task {
            let can_retry = !task.mode.is_one_shot()
                && !round_cap
                && !budget_spent
                && task.empty_retries < config.empty_retry_limit;
            if can_retry {
                task.empty_retries += 1;
                tracing::warn!(
                    task = %task.id,
                    round = task.round,
                    retries = task.empty_retries,
                    "Empty continuation, retrying the same prompt"
                );
                return;
            }
            tracing::warn!(task = %task.id, round = task.round, "Empty continuation, advancing");
            task.push_step("", &choice.mentions, candidates, step_prompt, &choice.prompt);
        } else {
            for step in &steps {
                task.push_step(step, &choice.mentions, candidates.clone(), step_prompt, &choice.prompt);
            }
        }
        task.empty_retries = 0;

        let source_exhausted = task.mode.is_source_bounded()
            && task.current_source_index() >= task.source.steps.len();
        if ends_task || round_cap || budget_spent || source_exhausted || task.mode.is_one_shot() {
            tracing::info!(
                task = %task.id,
                rounds = task.round,
                steps = task.generated_steps.len(),
                ends_task,
                round_cap,
                budget_spent,
                source_exhausted,
                "Task finished"
            );
            task.finalize();
        }
    }
}

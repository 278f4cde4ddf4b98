//! Prompt assembly.
//!
//! Every prompt is a run of marker-delimited segments built from the task's
//! recipes and what it has generated so far. Whitespace is collapsed after
//! assembly so the engine can find a prompt again at the start of the
//! model's output.

use crate::engine::GenerationTask;
use crate::markers::{self, normalize_whitespace};
use crate::mode::Mode;
use crate::types::Recipe;

/// `title <endoftitle>`, then `ing <ing> ing <endofings>` when ingredients are shown.
fn recipe_context(title: &str, ingredients: Option<&[String]>) -> String {
    let mut out = format!("{} {}", title, markers::END_TITLE);
    if let Some(ingredients) = ingredients {
        let separator = format!(" {} ", markers::ING);
        out.push(' ');
        out.push_str(&ingredients.join(separator.as_str()));
        out.push(' ');
        out.push_str(markers::END_INGS);
    }
    out
}

fn join_steps(steps: &[String]) -> String {
    steps.join(format!(" {} ", markers::INST).as_str())
}

/// Each step followed by a separator, leaving the prompt open for the next one.
fn open_steps(steps: &[String]) -> String {
    steps
        .iter()
        .map(|s| format!("{} {}", s, markers::INST))
        .collect::<Vec<_>>()
        .join(" ")
}

fn assemble(parts: &[&str]) -> String {
    normalize_whitespace(&parts.join(" "))
}

/// Render a whole recipe: `<|startoftext|> title <endoftitle> ings <endofings> steps <endofinst>`.
pub fn render_recipe(recipe: &Recipe) -> String {
    assemble(&[
        markers::START,
        &recipe_context(&recipe.title, Some(recipe.ingredients.as_slice())),
        &join_steps(&recipe.steps),
        markers::END_INST,
    ])
}

/// Source steps shown for the step being rewritten.
fn shown_source_steps(task: &GenerationTask) -> Vec<String> {
    let steps = &task.source.steps;
    if steps.is_empty() {
        return Vec::new();
    }
    let current = task.current_source_index().min(steps.len() - 1);
    if task.mode.config().simple {
        vec![steps[current].clone()]
    } else {
        steps[..=current].to_vec()
    }
}

fn source_context(task: &GenerationTask) -> String {
    let config = task.mode.config();
    let ingredients = config
        .include_source_ingredients
        .then_some(task.source.ingredients.as_slice());
    recipe_context(&task.source.title, ingredients)
}

fn target_context(task: &GenerationTask) -> String {
    recipe_context(task.target_title(), Some(task.target_ingredients()))
}

/// Prompt for this round's step phase.
///
/// `mentions` is the ingredient-phase output for modes that have one.
pub fn step_prompt(task: &GenerationTask, mentions: Option<&str>) -> String {
    let source_tag = markers::source_tag(&task.source_tag);
    let target_tag = markers::target_tag(&task.target_tag);
    let mentions = mentions.unwrap_or(markers::NO_INGS);

    match task.mode {
        Mode::ManualEcho => match &task.manual_prompt {
            Some(prompt) => normalize_whitespace(prompt),
            None => render_recipe(&task.source),
        },
        Mode::NextStep => assemble(&[
            markers::START,
            &recipe_context(&task.source.title, Some(task.source.ingredients.as_slice())),
            &open_steps(&task.prior_target_steps()),
        ]),
        Mode::StyleTransfer { .. } => assemble(&[
            markers::START,
            &source_tag,
            &source_context(task),
            &join_steps(&shown_source_steps(task)),
            markers::END_INST,
            &target_tag,
        ]),
        Mode::StyleTransferIngredients { .. } => assemble(&[
            markers::START,
            &source_tag,
            &source_context(task),
            &join_steps(&shown_source_steps(task)),
            markers::END_INST,
            &target_tag,
            mentions,
            markers::END_PROMPT,
        ]),
        Mode::NextStepStyleTransfer => {
            // The source instructions close only once the last step is shown.
            let shown = shown_source_steps(task);
            let closed = task.current_source_index() + 1 >= task.source.steps.len();
            assemble(&[
                markers::START,
                &source_tag,
                &source_context(task),
                &join_steps(&shown),
                if closed { markers::END_INST } else { "" },
                &target_tag,
                &target_context(task),
                &open_steps(&task.prior_target_steps()),
            ])
        }
        Mode::NextStepStyleTransferIngredients { .. } => assemble(&[
            markers::START,
            &source_tag,
            &source_context(task),
            &join_steps(&shown_source_steps(task)),
            markers::END_INST,
            &target_tag,
            &target_context(task),
            &join_steps(&task.prior_target_steps()),
            markers::END_INST,
            mentions,
            markers::END_PROMPT,
        ]),
        Mode::FullRecipe => assemble(&[
            markers::START,
            &source_tag,
            &source_context(task),
            &join_steps(&task.source.steps),
            markers::END_INST,
            &target_tag,
            &target_context(task),
            &open_steps(&task.generated_steps),
        ]),
    }
}

/// Prompt for this round's ingredient phase: the target recipe so far,
/// after which the model lists the ingredients the next step uses.
pub fn ingredient_prompt(task: &GenerationTask) -> String {
    assemble(&[
        markers::START,
        &target_context(task),
        &join_steps(&task.prior_target_steps()),
        markers::END_INST,
    ])
}

/// One training prompt for predicting the ingredients of `steps[index]`.
pub fn next_ingredients_prompt(recipe: &Recipe, index: usize) -> String {
    let shown = &recipe.steps[..index.min(recipe.steps.len())];
    assemble(&[
        markers::START,
        &recipe_context(&recipe.title, Some(recipe.ingredients.as_slice())),
        &join_steps(shown),
        markers::END_INST,
    ])
}

/// A mention list as it appears in prompts.
pub fn format_mentions(mentions: &[String]) -> String {
    if mentions.is_empty() {
        markers::NO_INGS.to_string()
    } else {
        mentions.join(format!(" {} ", markers::ING).as_str())
    }
}

//! End-to-end generation runs over the recipe store fixture.
//!
//! Every run uses `FakeModel`, so the rounds and their outcomes are exact.

use restyle_core::{
    rows_from_task, write_tsv, BatchContext, CachingModel, EngineConfig, FakeModel,
    GenerationEngine, GenerationTask, IngredientSource, JsonRecipeStore, Mode, RecipeStore,
    TaskFactory, Tokenizer, WordTokenizer,
};
use std::path::Path;
use std::sync::Arc;

fn store() -> JsonRecipeStore {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/store.json");
    JsonRecipeStore::from_file(&path).expect("fixture store should load")
}

/// Tasks for the first pair whose source is `source_id`.
fn tasks_for(store: &JsonRecipeStore, source_id: &str, mode: Mode) -> Vec<GenerationTask> {
    let pair = store
        .pairs()
        .iter()
        .find(|p| p.source_id == source_id)
        .expect("pair exists");
    let source = store.get(&pair.source_id).unwrap();
    let target = store.recipe(&pair.target_id);
    TaskFactory::new(mode)
        .tasks_for_pair(pair, source, target)
        .unwrap()
}

fn tokenizer() -> Arc<dyn Tokenizer> {
    Arc::new(WordTokenizer::new())
}

#[tokio::test]
async fn test_carried_transfer_stops_at_terminator() {
    let store = store();
    let mut tasks = tasks_for(&store, "r1", Mode::NextStepStyleTransfer);
    tasks.retain(|t| t.start_step == 0);

    let tok = tokenizer();
    let model = FakeModel::scripted(
        Arc::clone(&tok),
        [
            "Heat the oil and brown the tofu. <inst>",
            "Cook the potatoes and onion. <endofinst>",
        ],
    );
    let engine = GenerationEngine::new(BatchContext::new(Arc::new(model), tok));

    let done = engine.run(tasks).await.unwrap();
    assert_eq!(done.len(), 1);
    let task = &done[0];
    assert!(task.is_done());
    assert_eq!(task.round, 2);
    assert_eq!(
        task.generated_steps,
        vec!["Heat the oil and brown the tofu.", "Cook the potatoes and onion."]
    );
    assert!(task.step_prompts[1].ends_with("Heat the oil and brown the tofu. <inst>"));
}

#[tokio::test]
async fn test_never_terminating_model_stops_at_round_cap() {
    let store = store();
    let tasks = tasks_for(&store, "r1", Mode::NextStepStyleTransfer);

    let tok = tokenizer();
    let model = FakeModel::new(Arc::clone(&tok)).with_default_response("Stir. <inst>");
    let config = EngineConfig {
        max_rounds: 50,
        ..EngineConfig::default()
    };
    let engine = GenerationEngine::new(BatchContext::new(Arc::new(model), tok).with_config(config));

    let done = engine.run(tasks).await.unwrap();
    assert_eq!(done.len(), 2);
    for task in &done {
        assert_eq!(task.round, 20, "{} ran past the cap", task.id);
        assert_eq!(task.generated_steps.len(), 20);
    }
}

#[tokio::test]
async fn test_cached_model_retries_empty_steps() {
    let store = store();
    let mut tasks = tasks_for(&store, "r1", Mode::NextStepStyleTransfer);
    tasks.retain(|t| t.start_step == 0);
    let cache_dir = tempfile::TempDir::new().unwrap();

    let tok = tokenizer();
    let fake = FakeModel::scripted(Arc::clone(&tok), ["<inst>", "Boil the pasta. <endofinst>"]);
    let model = CachingModel::new(Box::new(fake), Arc::clone(&tok), cache_dir.path().to_path_buf());
    let config = EngineConfig {
        max_rounds: 5,
        ..EngineConfig::default()
    };
    let engine = GenerationEngine::new(
        BatchContext::new(Arc::new(model), Arc::clone(&tok)).with_config(config.clone()),
    );
    let done = engine.run(tasks.clone()).await.unwrap();
    assert_eq!(done[0].round, 2);
    assert_eq!(done[0].generated_steps, vec!["Boil the pasta."]);

    // A second run over the same cache replays both attempts.
    let empty = FakeModel::new(Arc::clone(&tok));
    let model = CachingModel::new(Box::new(empty), Arc::clone(&tok), cache_dir.path().to_path_buf());
    let engine =
        GenerationEngine::new(BatchContext::new(Arc::new(model), tok).with_config(config));
    let replayed = engine.run(tasks).await.unwrap();
    assert_eq!(replayed[0].generated_steps, vec!["Boil the pasta."]);
}

#[tokio::test]
async fn test_token_budget_ends_task() {
    let store = store();
    let mut tasks = tasks_for(&store, "r1", Mode::NextStepStyleTransfer);
    tasks.truncate(1);

    let tok = tokenizer();
    // " Stir. <inst>" is five tokens
    let model = FakeModel::new(Arc::clone(&tok)).with_default_response("Stir. <inst>");
    let config = EngineConfig {
        max_generated_tokens: 12,
        ..EngineConfig::default()
    };
    let engine = GenerationEngine::new(BatchContext::new(Arc::new(model), tok).with_config(config));

    let done = engine.run(tasks).await.unwrap();
    assert_eq!(done[0].round, 3);
    assert_eq!(done[0].generated_tokens, 15);
}

#[tokio::test]
async fn test_rule_based_ingredients_feed_step_prompt() {
    let store = store();
    let tasks = tasks_for(&store, "r3", Mode::StyleTransferIngredients { simple: false });
    assert_eq!(tasks.len(), 1);

    let tok = tokenizer();
    let model = FakeModel::new(Arc::clone(&tok));
    model.add_response(
        "nondairy butter <endofprompt>",
        "Toast the bread and spread with nondairy butter. <endofinst>",
    );
    let engine = GenerationEngine::new(
        BatchContext::new(Arc::new(model), tok).with_ingredient_source(IngredientSource::RuleBased),
    );

    let done = engine.run(tasks).await.unwrap();
    let task = &done[0];
    assert_eq!(task.round, 1);
    assert_eq!(
        task.ingredient_prompts[0],
        "Toast the bread and spread with nondairy butter."
    );
    assert!(task.generated_mentions[0].contains("nondairy butter"));
    assert_eq!(
        task.generated_steps,
        vec!["Toast the bread and spread with nondairy butter."]
    );
}

#[tokio::test]
async fn test_model_ingredient_phase_prefers_compliant_mentions() {
    let store = store();
    let mut tasks = tasks_for(
        &store,
        "r1",
        Mode::NextStepStyleTransferIngredients { simple: false },
    );
    tasks.retain(|t| t.start_step == 0);

    let tok = tokenizer();
    let ingredients = FakeModel::scripted(
        Arc::clone(&tok),
        ["bacon <ing> potatoes <|endoftext|>", "tofu <ing> potatoes <|endoftext|>"],
    )
    .with_default_response("potatoes <ing> onion <|endoftext|>");
    let steps = FakeModel::new(Arc::clone(&tok)).with_default_response("Brown the tofu. <endofinst>");
    let config = EngineConfig {
        num_return_sequences: 2,
        ..EngineConfig::default()
    };
    let engine = GenerationEngine::new(
        BatchContext::new(Arc::new(steps), Arc::clone(&tok))
            .with_config(config)
            .with_ingredient_source(IngredientSource::Model(Arc::new(ingredients))),
    );

    let done = engine.run(tasks).await.unwrap();
    let task = &done[0];
    assert_eq!(task.generated_steps.len(), 3);
    assert_eq!(task.generated_mentions[0], "tofu <ing> potatoes");
    assert!(task.step_prompts[0].ends_with("tofu <ing> potatoes <endofprompt>"));
    assert!(task.ingredient_prompts[0].starts_with("<|startoftext|> Tofu Breakfast Hash <endoftitle>"));
}

#[tokio::test]
async fn test_rows_for_finished_run() {
    let store = store();
    let tasks = tasks_for(&store, "r1", Mode::StyleTransfer { simple: false });

    let tok = tokenizer();
    let model = FakeModel::new(Arc::clone(&tok)).with_default_response("Brown the tofu. <endofinst>");
    let engine = GenerationEngine::new(BatchContext::new(Arc::new(model), tok));
    let done = engine.run(tasks).await.unwrap();

    let rows: Vec<_> = done.iter().flat_map(rows_from_task).collect();
    // Three steps from step 0, two from step 1.
    assert_eq!(rows.len(), 5);
    let late = rows.iter().find(|r| r.recipe_id == "r1-vegan1" && r.step_index == 2).unwrap();
    assert_eq!(late.original_step, "Crack the eggs over the hash and cover.");
    // The backward alignment for step 2 is replaced by a uniform reference.
    assert_eq!(late.reference_step_index, Some(2));
    assert_eq!(late.reference_step, "Season the hash and serve.");

    let mut buf = Vec::new();
    write_tsv(&mut buf, &rows, false).unwrap();
    assert_eq!(String::from_utf8(buf).unwrap().lines().count(), 6);
}

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use restyle_core::matcher::Lexicon;
use restyle_core::{
    create_cached_model_from_env, create_ingredient_model_from_env, rows_from_task,
    training, write_jsonl, write_tsv, BatchContext, CandidateScorer, EngineConfig,
    GenerationEngine, GenerationModel, GenerationTask, IngredientMatcher, IngredientSource,
    JsonRecipeStore, Mode, RecipeStore, RuleSubstituter, RuleTableChecker, StyleTag, TaskFactory,
    Tokenizer, WordList, WordTokenizer,
};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "restyle")]
#[command(about = "Rewrite recipes toward a dietary style, one step at a time", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum IngredientArg {
    /// Predict mentions with the ingredient model
    Model,
    /// Rewrite the source step with substitution rules
    Rules,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Tsv,
    Jsonl,
}

/// Lookup tables read at runtime in place of the embedded ones.
#[derive(Args)]
struct TableArgs {
    /// Word list for the spelling check, e.g. /usr/share/dict/words
    #[arg(long)]
    dictionary: Option<PathBuf>,
    /// Dietary rule table JSON
    #[arg(long)]
    rules: Option<PathBuf>,
    /// Substitution rule JSON
    #[arg(long)]
    substitutions: Option<PathBuf>,
    /// Ingredient matcher vocabulary JSON
    #[arg(long)]
    vocabulary: Option<PathBuf>,
}

impl TableArgs {
    fn scorer(&self) -> Result<CandidateScorer> {
        let dictionary = match &self.dictionary {
            Some(path) => Arc::new(
                WordList::from_file(path)
                    .with_context(|| format!("Failed to load dictionary: {}", path.display()))?,
            ),
            None => WordList::builtin(),
        };
        Ok(CandidateScorer::new(
            load_matcher(self.vocabulary.as_deref())?,
            dictionary,
            load_checker(self.rules.as_deref())?,
        ))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print ingredient mentions for each instruction of stored recipes
    Match {
        /// Recipe store JSON file
        #[arg(long)]
        store: PathBuf,
        /// Only this recipe (default: every recipe)
        #[arg(long)]
        id: Option<String>,
        /// Ingredient matcher vocabulary JSON
        #[arg(long)]
        vocabulary: Option<PathBuf>,
    },
    /// Run the generation loop over every pair in a store
    Generate {
        /// Recipe store JSON file (not needed for manual mode)
        #[arg(long)]
        store: Option<PathBuf>,
        /// Generation mode, e.g. style_transfer or next_step_style_transfer_ing
        #[arg(long, default_value = "style_transfer")]
        mode: String,
        /// Prompt for manual mode
        #[arg(long)]
        prompt: Option<String>,
        /// Ingredient source for modes with an ingredient phase
        #[arg(long, value_enum, default_value = "rules")]
        ingredients: IngredientArg,
        /// Output file (default: stdout)
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long, value_enum, default_value = "tsv")]
        format: OutputFormat,
        /// One column per sampled candidate instead of the winner only
        #[arg(long)]
        all_candidates: bool,
        /// Stop after this many pairs
        #[arg(long)]
        limit: Option<usize>,
        #[command(flatten)]
        tables: TableArgs,
    },
    /// Rewrite text toward a tag with the substitution rules
    Substitute {
        /// Target tag, e.g. vegan or non-dairy-free
        #[arg(long)]
        tag: String,
        text: String,
        /// Substitution rule JSON
        #[arg(long)]
        substitutions: Option<PathBuf>,
    },
    /// Count dietary violations of a tag in text
    Check {
        #[arg(long)]
        tag: String,
        text: String,
        /// Dietary rule table JSON
        #[arg(long)]
        rules: Option<PathBuf>,
    },
    /// Write next-ingredient training examples for every stored recipe
    TrainingExamples {
        #[arg(long)]
        store: PathBuf,
        /// Output file (default: stdout)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Ingredient matcher vocabulary JSON
        #[arg(long)]
        vocabulary: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Match {
            store,
            id,
            vocabulary,
        } => {
            let matcher = load_matcher(vocabulary.as_deref())?;
            match_mentions(&store, id.as_deref(), &matcher)?;
        }
        Commands::Generate {
            store,
            mode,
            prompt,
            ingredients,
            output,
            format,
            all_candidates,
            limit,
            tables,
        } => {
            generate(GenerateArgs {
                store,
                mode,
                prompt,
                ingredients,
                output,
                format,
                all_candidates,
                limit,
                tables,
            })
            .await?;
        }
        Commands::Substitute {
            tag,
            text,
            substitutions,
        } => {
            let tag: StyleTag = tag.parse()?;
            let substituter = load_substituter(substitutions.as_deref())?;
            println!("{}", substituter.substitute(&text, &tag));
        }
        Commands::Check { tag, text, rules } => {
            let tag: StyleTag = tag.parse()?;
            let violations = load_checker(rules.as_deref())?.violations(&text, &tag);
            println!("{}", violations.len());
            for word in violations {
                println!("  {}", word);
            }
        }
        Commands::TrainingExamples {
            store,
            output,
            vocabulary,
        } => {
            let matcher = load_matcher(vocabulary.as_deref())?;
            training_examples(&store, output.as_deref(), &matcher)?;
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn load_store(path: &Path) -> Result<JsonRecipeStore> {
    JsonRecipeStore::from_file(path)
        .with_context(|| format!("Failed to load recipe store: {}", path.display()))
}

fn load_matcher(path: Option<&Path>) -> Result<IngredientMatcher> {
    match path {
        Some(path) => {
            let lexicon = Lexicon::from_file(path)
                .with_context(|| format!("Failed to load matcher vocabulary: {}", path.display()))?;
            Ok(IngredientMatcher::new(Arc::new(lexicon)))
        }
        None => Ok(IngredientMatcher::default()),
    }
}

fn load_checker(path: Option<&Path>) -> Result<Arc<RuleTableChecker>> {
    match path {
        Some(path) => Ok(Arc::new(RuleTableChecker::from_file(path).with_context(|| {
            format!("Failed to load dietary rules: {}", path.display())
        })?)),
        None => Ok(RuleTableChecker::builtin()),
    }
}

fn load_substituter(path: Option<&Path>) -> Result<Arc<RuleSubstituter>> {
    match path {
        Some(path) => Ok(Arc::new(RuleSubstituter::from_file(path).with_context(|| {
            format!("Failed to load substitution rules: {}", path.display())
        })?)),
        None => Ok(RuleSubstituter::builtin()),
    }
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create file: {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(io::stdout().lock())),
    }
}

fn match_mentions(store_path: &Path, id: Option<&str>, matcher: &IngredientMatcher) -> Result<()> {
    let store = load_store(store_path)?;
    let ids: Vec<String> = match id {
        Some(id) => vec![id.to_string()],
        None => store.ids().map(String::from).collect(),
    };

    for id in ids {
        let mentions = training::mentions_for_record(&store, &id, matcher);
        println!("{}", serde_json::json!({ "id": id, "mentions": mentions }));
    }
    Ok(())
}

struct GenerateArgs {
    store: Option<PathBuf>,
    mode: String,
    prompt: Option<String>,
    ingredients: IngredientArg,
    output: Option<PathBuf>,
    format: OutputFormat,
    all_candidates: bool,
    limit: Option<usize>,
    tables: TableArgs,
}

async fn generate(args: GenerateArgs) -> Result<()> {
    let mode: Mode = args.mode.parse()?;
    let config = EngineConfig::from_env()?;
    let tokenizer: Arc<dyn Tokenizer> = Arc::new(WordTokenizer::new());

    let tasks = if mode == Mode::ManualEcho {
        let Some(prompt) = args.prompt else {
            bail!("--prompt is required for manual mode");
        };
        vec![GenerationTask::manual("manual", prompt)]
    } else {
        let Some(store_path) = args.store.as_deref() else {
            bail!("--store is required for {} mode", mode);
        };
        let store = load_store(store_path)?;
        let factory = TaskFactory::new(mode);
        let mut tasks = Vec::new();
        for pair in store.pairs().iter().take(args.limit.unwrap_or(usize::MAX)) {
            let source = store.get(&pair.source_id)?;
            let target = store.recipe(&pair.target_id);
            tasks.extend(factory.tasks_for_pair(pair, source, target)?);
        }
        tasks
    };

    let step_model: Arc<dyn GenerationModel> =
        Arc::from(create_cached_model_from_env(Arc::clone(&tokenizer))?);
    let mut ctx = BatchContext::new(step_model, Arc::clone(&tokenizer))
        .with_config(config)
        .with_scorer(args.tables.scorer()?)
        .with_substituter(load_substituter(args.tables.substitutions.as_deref())?);
    if mode.has_ingredient_phase() {
        let source = match args.ingredients {
            IngredientArg::Rules => IngredientSource::RuleBased,
            IngredientArg::Model => IngredientSource::Model(Arc::from(
                create_ingredient_model_from_env(Arc::clone(&tokenizer))?,
            )),
        };
        ctx = ctx.with_ingredient_source(source);
    }

    tracing::info!(%mode, tasks = tasks.len(), "Starting generation");
    let done = GenerationEngine::new(ctx).run(tasks).await?;
    let rows: Vec<_> = done.iter().flat_map(rows_from_task).collect();

    let mut out = open_output(args.output.as_deref())?;
    let written = match args.format {
        OutputFormat::Tsv => write_tsv(&mut out, &rows, args.all_candidates),
        OutputFormat::Jsonl => write_jsonl(&mut out, &rows),
    };
    written.context("Failed to write output")?;
    out.flush().context("Failed to flush output")?;

    tracing::info!(tasks = done.len(), rows = rows.len(), "Generation complete");
    Ok(())
}

fn training_examples(
    store_path: &Path,
    output: Option<&Path>,
    matcher: &IngredientMatcher,
) -> Result<()> {
    let store = load_store(store_path)?;
    let mut out = open_output(output)?;

    let mut count = 0;
    for id in store.ids() {
        let Some(recipe) = store.recipe(id) else {
            continue;
        };
        for example in training::next_ingredient_examples(recipe, matcher) {
            writeln!(out, "{}", example)?;
            count += 1;
        }
    }
    out.flush()?;

    tracing::info!(examples = count, "Wrote training examples");
    Ok(())
}

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use voice_flow::catalog::Catalog;
use voice_flow::checkpoint::{CheckpointStore, Stage, CHECKPOINT_FILE};
use voice_flow::config::PipelineConfig;
use voice_flow::content::ContentType;
use voice_flow::error::{PipelineError, Result, ServiceError};
use voice_flow::http_services::{HttpSynthesizer, OllamaClient};
use voice_flow::item_index::ItemIndex;
use voice_flow::pipeline::{Pipeline, RunOptions};
use voice_flow::prompts::TemplatePromptBuilder;
use voice_flow::ranker::{self, Candidate};
use voice_flow::sanitize::BasicSanitizer;
use voice_flow::services::Services;
use voice_flow::store::ContentStore;

#[derive(Parser)]
#[command(name = "voiceflow", about = "Narration pipeline for the Radio Automation Engine")]
struct Cli {
    /// Config file (default: $VOICEFLOW_CONFIG or ./voiceflow.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline, resuming from the checkpoint
    Run {
        /// Stage(s) to run: generate, audit, regenerate, synthesize (default: all)
        #[arg(short, long)]
        stage: Vec<String>,
        /// Write a new script version even if one exists
        #[arg(long)]
        overwrite: bool,
        /// Maximum regeneration rounds (overrides config)
        #[arg(long)]
        max_retries: Option<usize>,
        /// Discard checkpoint progress and start a new run
        #[arg(long)]
        fresh: bool,
    },
    /// Show checkpoint and per-item status
    Status,
    /// Rank all stored versions of one item and print the result as JSON
    Rank {
        /// Voice name
        #[arg(long)]
        voice: String,
        /// Content type: intro, outro, time, weather
        #[arg(long)]
        content_type: String,
        /// Item key, e.g. Ink_Spots-Maybe or 07-30
        #[arg(long)]
        item: String,
        /// Force this candidate (e.g. julie_2) to win
        #[arg(long)]
        pick: Option<String>,
        /// Only rank versions whose audit passed
        #[arg(long)]
        require_pass: bool,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();

    let cli = Cli::parse();
    if let Err(e) = run_cli(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run_cli(cli: Cli) -> Result<()> {
    let config = PipelineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            stage,
            overwrite,
            max_retries,
            fresh,
        } => {
            if config.voices.is_empty() {
                return Err(PipelineError::Config("no voices configured".to_string()));
            }
            let items = Catalog::load(&config.catalog)?.work_items(&config.content_types)?;

            let generator = OllamaClient::new(config.generation.clone()).map_err(config_err)?;
            let auditor = OllamaClient::new(config.audit.clone()).map_err(config_err)?;
            let synthesizer = HttpSynthesizer::new(config.synthesis.clone()).map_err(config_err)?;
            let sanitizer = BasicSanitizer::default();
            let prompts = TemplatePromptBuilder::new(&config.station);
            let services = Services {
                generator: &generator,
                auditor: &auditor,
                synthesizer: &synthesizer,
                sanitizer: &sanitizer,
                prompts: &prompts,
            };

            let mut options = RunOptions::from_config(&config);
            options.overwrite |= overwrite;
            if let Some(n) = max_retries {
                options.max_retries = n;
            }
            if !stage.is_empty() {
                options.stages = stage
                    .iter()
                    .map(|s| Stage::from_str_loose(s))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(PipelineError::Config)?;
            }

            let mut pipeline = Pipeline::open(&config, items, services)?;
            if fresh {
                pipeline.checkpoint_mut().reset()?;
            }
            let summary = pipeline.run(&options)?;

            println!("Run {}", summary.run_id);
            if !summary.resumed_stages.is_empty() {
                let names: Vec<&str> = summary.resumed_stages.iter().map(|s| s.as_str()).collect();
                println!("Resumed (already completed): {}", names.join(", "));
            }
            println!(
                "Generated: {} | Rejected: {} | Passed: {} | Failed: {} | Unaudited: {} | Regenerated: {} ({} rounds) | Synthesized: {} | Synthesis skipped: {}",
                summary.generated,
                summary.rejected,
                summary.passed,
                summary.failed,
                summary.unaudited,
                summary.regenerated,
                summary.regeneration_rounds,
                summary.synthesized,
                summary.synthesis_skipped
            );
            for err in &summary.errors {
                println!("  {}", err);
            }
        }
        Commands::Status => {
            let checkpoint_path = config.run_root.join(CHECKPOINT_FILE);
            let checkpoint = CheckpointStore::load_or_init(&checkpoint_path)?;
            println!("voiceflow v{}", env!("CARGO_PKG_VERSION"));
            println!("Run: {} ({})", checkpoint.state().run_id, checkpoint_path.display());
            for stage in Stage::ALL {
                let counters = checkpoint
                    .stage(stage)
                    .map(|s| {
                        s.counters
                            .iter()
                            .map(|(k, v)| format!("{}={}", k, v))
                            .collect::<Vec<_>>()
                            .join(", ")
                    })
                    .unwrap_or_default();
                println!("  {:<11} {:?} {}", stage.as_str(), checkpoint.status(stage), counters);
            }
            let index = ItemIndex::open(&config.run_root, Vec::new());
            for (status, count) in index.counts() {
                println!("  items {:?}: {}", status, count);
            }
        }
        Commands::Rank {
            voice,
            content_type,
            item,
            pick,
            require_pass,
        } => {
            let content_type = ContentType::from_str_loose(&content_type).map_err(PipelineError::Config)?;
            let items = Catalog::load(&config.catalog)?.work_items(&[content_type])?;
            let work_item = items
                .into_iter()
                .find(|i| i.key() == item)
                .ok_or_else(|| PipelineError::Config(format!("no {} item with key '{}'", content_type, item)))?;

            let store = ContentStore::new(&config.content_root, &config.audit_root);
            let current_audit = store.load_audit(&work_item, &voice);
            let candidates: Vec<Candidate> = store
                .versions(&work_item, &voice)
                .into_iter()
                .map(|v| {
                    let id = format!("{}_{}", voice, v);
                    let mut candidate = match store.read_script(&work_item, &voice, v) {
                        Ok(text) => Candidate::new(&id, &text),
                        Err(_) => Candidate::unreadable(&id),
                    };
                    if let Some(record) = current_audit.as_ref().filter(|r| r.script_version == v) {
                        candidate = candidate.with_audit(record.clone());
                    }
                    candidate
                })
                .collect();

            let mut ranker_config = config.ranker.clone();
            ranker_config.forced_pick = pick;
            ranker_config.require_audit_pass |= require_pass;
            if let Some(profile) = config.voice(&voice) {
                ranker_config.marker_words = profile.marker_words.clone();
            }
            let ranking = ranker::rank(&candidates, &ranker_config)?;
            println!("{}", serde_json::to_string_pretty(&ranking)?);
        }
    }
    Ok(())
}

fn config_err(e: ServiceError) -> PipelineError {
    PipelineError::Config(e.to_string())
}

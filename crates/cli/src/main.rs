//! Regulation navigator command line
//!
//! Settings come from `config/default.yaml`, `config/$REGNAV_ENV.yaml` and
//! `REGNAV__*` environment variables; flags override them.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use regnav_config::{load_settings, Settings};
use regnav_core::{QueryContext, QueryPlan, RetrievedPassage, SourceId};
use regnav_rag::{
    build_system_prompt, build_user_prompt, format_passage_for_prompt, GateDecision, IndexBuilder,
    RegulationSearch,
};

#[derive(Parser, Debug)]
#[command(
    name = "regnav",
    about = "Build and query a structure-aware index of the EU AI Act, GDPR and DORA"
)]
struct Cli {
    /// Environment overlay loaded after config/default.yaml
    #[arg(long, global = true, env = "REGNAV_ENV")]
    env: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract, chunk and embed the regulation sources, then persist the index
    Build {
        /// Directory holding the source documents
        #[arg(long)]
        sources: Option<String>,

        /// Directory the index is written to
        #[arg(long)]
        index: Option<String>,
    },
    /// Plan and run retrieval for a question
    Query {
        /// Question, as one or more words
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,

        /// Restrict retrieval to one regulation (e.g. gdpr, "EU AI Act", dora)
        #[arg(long)]
        regulation: Option<SourceId>,

        /// Role of the asker (provider, deployer, controller, ...)
        #[arg(long)]
        role: Option<String>,

        /// Institution type, used for DORA proportionality
        #[arg(long)]
        institution: Option<String>,

        /// Number of passages to return
        #[arg(long)]
        top_k: Option<usize>,

        /// Directory the index is loaded from
        #[arg(long)]
        index: Option<String>,

        /// Print a JSON report instead of formatted passages
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Print the generation prompts instead of formatted passages
        #[arg(long, default_value_t = false, conflicts_with = "json")]
        prompt: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = match load_settings(cli.env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            // Tracing not yet initialized
            eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
            Settings::default()
        },
    };

    init_tracing(&settings);
    tracing::debug!(
        environment = ?settings.environment,
        config_env = cli.env.as_deref().unwrap_or("default"),
        "Configuration loaded"
    );

    match cli.command {
        Commands::Build { sources, index } => build(settings, sources, index),
        Commands::Query {
            question,
            regulation,
            role,
            institution,
            top_k,
            index,
            json,
            prompt,
        } => {
            let args = QueryArgs {
                question: question.join(" "),
                context: QueryContext {
                    regulation,
                    role,
                    institution_type: institution,
                    ..QueryContext::default()
                },
                top_k,
                index,
                json,
                prompt,
            };
            query(settings, args).await
        },
    }
}

fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!("regnav={}", level).into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };
    subscriber.with(fmt_layer).init();
}

fn build(
    mut settings: Settings,
    sources: Option<String>,
    index: Option<String>,
) -> anyhow::Result<()> {
    if let Some(sources) = sources {
        settings.index.sources_dir = sources;
    }
    if let Some(index) = index {
        settings.index.index_dir = index;
    }

    let report = IndexBuilder::from_settings(&settings)
        .build_and_save(&settings.index.sources_dir, &settings.index.index_dir)
        .context("index build failed")?;

    println!(
        "Indexed {} passages from {} source(s) with {} (dim {}) into {}",
        report.passages,
        report.sources_indexed.len(),
        report.encoder.name,
        report.encoder.dim,
        settings.index.index_dir
    );
    for source in &report.sources_skipped {
        println!("  skipped: {}", source);
    }
    Ok(())
}

struct QueryArgs {
    question: String,
    context: QueryContext,
    top_k: Option<usize>,
    index: Option<String>,
    json: bool,
    prompt: bool,
}

#[derive(Serialize)]
struct QueryReport<'a> {
    plan: &'a QueryPlan,
    unfiltered_retry: bool,
    structural_fallback: bool,
    refused: bool,
    guidance: Option<&'a str>,
    warnings: &'a [String],
    passages: &'a [RetrievedPassage],
}

async fn query(mut settings: Settings, args: QueryArgs) -> anyhow::Result<()> {
    if let Some(index) = args.index {
        settings.index.index_dir = index;
    }

    let service = RegulationSearch::new(&settings)?;
    service
        .load(&settings.index.index_dir)
        .with_context(|| format!("cannot load index from {}", settings.index.index_dir))?;

    let mut plan = service.plan(&args.question, &args.context);
    if let Some(top_k) = args.top_k {
        plan.top_k = top_k;
    }

    let outcome = service.retrieve_with_plan(&plan).await?;
    let decision = service.evaluate(&outcome.passages);
    let (guidance, warnings) = match &decision {
        GateDecision::Refuse { guidance, .. } => (Some(guidance.as_str()), Vec::new()),
        GateDecision::Proceed { warnings, .. } => (None, warnings.clone()),
    };

    if args.json {
        let report = QueryReport {
            plan: &outcome.plan,
            unfiltered_retry: outcome.unfiltered_retry,
            structural_fallback: outcome.structural_fallback,
            refused: decision.is_refusal(),
            guidance,
            warnings: &warnings,
            passages: &outcome.passages,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if args.prompt {
        if let Some(guidance) = guidance {
            anyhow::bail!("generation refused: {}", guidance);
        }
        println!("{}", build_system_prompt(&args.context, &outcome.passages));
        println!("{}", build_user_prompt(&args.question, &args.context));
        return Ok(());
    }

    println!(
        "intent: {}  focus: {:?}  queries: {}",
        outcome.plan.intent,
        outcome.plan.regulation_focus,
        outcome.plan.queries.len()
    );
    match &decision {
        GateDecision::Refuse { guidance, .. } => println!("\n{}\n", guidance),
        GateDecision::Proceed { confidence, .. } => println!("confidence: {}\n", confidence),
    }
    for warning in &warnings {
        println!("warning: {}\n", warning);
    }
    for (i, passage) in outcome.passages.iter().enumerate() {
        println!("{}", format_passage_for_prompt(i + 1, passage));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_query() {
        let cli = Cli::try_parse_from([
            "regnav", "query", "--regulation", "gdpr", "--role", "provider", "--top-k", "3", "Is",
            "profiling", "allowed?",
        ])
        .unwrap();
        match cli.command {
            Commands::Query {
                question,
                regulation,
                role,
                top_k,
                json,
                ..
            } => {
                assert_eq!(question.join(" "), "Is profiling allowed?");
                assert_eq!(regulation, Some(SourceId::Gdpr));
                assert_eq!(role.as_deref(), Some("provider"));
                assert_eq!(top_k, Some(3));
                assert!(!json);
            },
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_build() {
        let cli = Cli::try_parse_from(["regnav", "build", "--index", "out/index"]).unwrap();
        match cli.command {
            Commands::Build { sources, index } => {
                assert!(sources.is_none());
                assert_eq!(index.as_deref(), Some("out/index"));
            },
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(Cli::try_parse_from(["regnav", "query", "--json"]).is_err());
        assert!(Cli::try_parse_from(["regnav", "query", "--top-k", "many", "question"]).is_err());
        assert!(Cli::try_parse_from(["regnav", "query", "--regulation", "MiCA", "question"]).is_err());
        assert!(Cli::try_parse_from(["regnav", "query", "--json", "--prompt", "question"]).is_err());
        assert!(Cli::try_parse_from(["regnav", "index"]).is_err());
    }
}

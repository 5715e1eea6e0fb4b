use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quizloom::QuizloomError;
use quizloom::ai::{BudgetTier, Feature, ProviderKind};
use quizloom::cli::CommandContext;
use quizloom::cli::commands::generate::{self, PromptSource, RunOptions};
use quizloom::cli::commands::{chunks, config, features, models};
use quizloom::config::ConfigFormat;
use quizloom::constants::chunking;

#[derive(Parser)]
#[command(name = "quizloom")]
#[command(
    version,
    about = "Budget-aware LLM generation for quizzes and study material"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, short, global = true, help = "Use this config file only")]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(clap::Args)]
struct GenerationArgs {
    #[arg(long, help = "Model to use (overrides the feature setting)")]
    model: Option<String>,
    #[arg(long, help = "Maximum output tokens")]
    max_tokens: Option<usize>,
    #[arg(long, help = "Output language")]
    language: Option<String>,
    #[arg(long, help = "Print usage metrics after the call")]
    metrics: bool,
}

impl From<GenerationArgs> for RunOptions {
    fn from(args: GenerationArgs) -> Self {
        Self {
            model: args.model,
            max_tokens: args.max_tokens,
            language: args.language,
            show_metrics: args.metrics,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a prompt through a feature's provider and model
    Generate {
        #[arg(long, short, default_value = "default", help = "Feature name")]
        feature: Feature,
        #[arg(long, short, conflicts_with = "prompt_file", help = "Prompt text")]
        prompt: Option<String>,
        #[arg(long, help = "Read the prompt from a file")]
        prompt_file: Option<PathBuf>,
        #[command(flatten)]
        args: GenerationArgs,
    },

    /// Generate quiz questions, sizing the output budget to the item count
    Quiz {
        #[arg(long, help = "Prompt file")]
        prompt_file: PathBuf,
        #[arg(long, short = 'n', default_value = "10", help = "Number of questions")]
        count: usize,
        #[command(flatten)]
        args: GenerationArgs,
    },

    /// Extract subjects from a document, chunking when it is large
    Extract {
        #[arg(long, short, help = "Document to analyze")]
        file: PathBuf,
        #[arg(long, value_delimiter = ',', help = "Subjects already known")]
        known: Vec<String>,
        #[command(flatten)]
        args: GenerationArgs,
    },

    /// Preview how a document would be split into chunks
    Chunks {
        #[arg(long, short, help = "Document to split")]
        file: PathBuf,
        #[arg(long, default_value_t = chunking::standard::CHUNK_CHAR_LIMIT, help = "Characters per chunk")]
        limit: usize,
    },

    /// List catalogued models
    Models {
        #[arg(long, help = "Only this provider (openai, gemini)")]
        provider: Option<ProviderKind>,
    },

    /// Suggest the cheapest model for an output requirement
    Suggest {
        #[arg(long, help = "Required output tokens")]
        output_tokens: usize,
        #[arg(long, help = "Only this provider (openai, gemini)")]
        provider: Option<ProviderKind>,
        #[arg(long, help = "Budget tier: low, medium, high")]
        tier: Option<BudgetTier>,
    },

    /// Show effective per-feature settings
    Features {
        #[arg(long, help = "Print as JSON")]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(
            short = 'f',
            long,
            default_value = "toml",
            help = "Output format: toml, json, yaml"
        )]
        format: ConfigFormat,
    },
    /// Show configuration file paths
    Path,
    /// Write a starter configuration
    Init {
        #[arg(long, short, help = "Initialize global config")]
        global: bool,
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mQuizloom encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        // Backtrace when RUST_BACKTRACE=1
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let message = match e.downcast_ref::<QuizloomError>() {
                Some(err) => err.user_message(),
                None => e.to_string(),
            };
            eprintln!("\x1b[31mError:\x1b[0m {}", message);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Generate {
            feature,
            prompt,
            prompt_file,
            args,
        } => {
            let source = match (prompt, prompt_file) {
                (Some(text), _) => PromptSource::Inline(text),
                (None, Some(path)) => PromptSource::File(path),
                (None, None) => anyhow::bail!("Either --prompt or --prompt-file is required"),
            };
            let ctx = CommandContext::load(config_path)?;
            generate::generate(&ctx, feature, source, &args.into())?;
        }
        Commands::Quiz {
            prompt_file,
            count,
            args,
        } => {
            let ctx = CommandContext::load(config_path)?;
            generate::quiz(&ctx, &prompt_file, count, &args.into())?;
        }
        Commands::Extract { file, known, args } => {
            let ctx = CommandContext::load(config_path)?;
            generate::extract(&ctx, &file, known, &args.into())?;
        }
        Commands::Chunks { file, limit } => {
            chunks::run(&file, limit)?;
        }
        Commands::Models { provider } => {
            models::list(provider)?;
        }
        Commands::Suggest {
            output_tokens,
            provider,
            tier,
        } => {
            models::suggest(output_tokens, provider, tier)?;
        }
        Commands::Features { json } => {
            let config = quizloom::cli::util::load_config(config_path)?;
            features::run(&config, json)?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { format } => {
                config::show(config_path, format)?;
            }
            ConfigAction::Path => {
                config::path()?;
            }
            ConfigAction::Init { global, force } => {
                config::init(global, force)?;
            }
        },
    }

    Ok(())
}

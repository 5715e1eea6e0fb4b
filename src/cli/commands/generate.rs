//! Generation Commands
//!
//! Usage:
//!   quizloom generate --feature quiz_explanation --prompt "..."
//!   quizloom quiz --prompt-file prompt.txt --count 10
//!   quizloom extract --file chapter.txt [--known Algebra,Geometry]

use std::path::{Path, PathBuf};

use console::style;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::ai::features::Feature;
use crate::ai::provider::{GenerationOptions, GenerationResponse};
use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, read_input};
use crate::types::{QuizloomError, Result};

/// Prompt text from `--prompt` or `--prompt-file`
pub enum PromptSource {
    Inline(String),
    File(PathBuf),
}

impl PromptSource {
    fn read(&self) -> Result<String> {
        match self {
            Self::Inline(text) => Ok(text.clone()),
            Self::File(path) => read_input(path),
        }
    }
}

/// Options shared by the generation commands
#[derive(Default)]
pub struct RunOptions {
    pub model: Option<String>,
    pub max_tokens: Option<usize>,
    pub language: Option<String>,
    pub show_metrics: bool,
}

impl RunOptions {
    fn generation_options(&self, cancel: CancellationToken) -> GenerationOptions {
        let mut options = GenerationOptions::default().with_cancel(cancel);
        options.model = self.model.clone();
        options.max_tokens = self.max_tokens;
        options.language = self.language.clone();
        options
    }
}

/// Cancellation token tripped by Ctrl-C
fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            trigger.cancel();
        }
    });
    token
}

pub fn generate(
    ctx: &CommandContext,
    feature: Feature,
    prompt: PromptSource,
    opts: &RunOptions,
) -> Result<()> {
    let prompt = prompt.read()?;
    let response = ctx.block_on(async {
        let options = opts.generation_options(ctrl_c_token());
        ctx.orchestrator
            .generate_for_feature(feature, &prompt, &options)
            .await
    })??;

    print_response(&response);
    print_metrics(ctx, opts);
    Ok(())
}

pub fn quiz(
    ctx: &CommandContext,
    prompt_file: &Path,
    count: usize,
    opts: &RunOptions,
) -> Result<()> {
    if count == 0 {
        return Err(QuizloomError::Config(
            "--count must be at least 1".to_string(),
        ));
    }
    let prompt = read_input(prompt_file)?;
    let response = ctx.block_on(async {
        let options = opts.generation_options(ctrl_c_token());
        ctx.orchestrator.generate_quiz(&prompt, count, &options).await
    })??;

    print_response(&response);
    print_metrics(ctx, opts);
    Ok(())
}

pub fn extract(
    ctx: &CommandContext,
    file: &Path,
    known: Vec<String>,
    opts: &RunOptions,
) -> Result<()> {
    let content = read_input(file)?;
    let outcome = ctx.block_on(async {
        let mut options = opts.generation_options(ctrl_c_token());
        options.existing_items = known;
        ctx.orchestrator.extract_subjects(&content, &options).await
    })??;

    let out = Output::new();
    let report = &outcome.report;
    if !report.single_call {
        out.info(&format!(
            "Batch {}: {}/{} chunks completed",
            report.batch_id,
            report.completed_chunks(),
            report.chunks.len()
        ));
        if report.completed_chunks() < report.chunks.len() {
            out.warning("Some chunks were skipped; results may be incomplete");
        }
    }

    out.header(&format!("Subjects ({})", outcome.items.len()));
    for item in &outcome.items {
        match &item.description {
            Some(description) => out.item(&format!(
                "{} {}",
                style(&item.name).bold(),
                style(description).dim()
            )),
            None => out.item(&item.name),
        }
    }
    print_metrics(ctx, opts);
    Ok(())
}

fn print_response(response: &GenerationResponse) {
    println!("{}", response.content);
    eprintln!(
        "{}",
        style(format!(
            "model: {}  tokens: {}",
            response.model_used,
            response
                .token_count
                .map_or_else(|| "-".to_string(), |t| t.to_string())
        ))
        .dim()
    );
}

fn print_metrics(ctx: &CommandContext, opts: &RunOptions) {
    if opts.show_metrics {
        eprintln!("\n{}", ctx.orchestrator.metrics().display());
    }
}

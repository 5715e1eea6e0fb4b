//! Models Command
//!
//! Usage:
//!   quizloom models [--provider openai]
//!   quizloom suggest --output-tokens 8000 [--provider gemini] [--tier low]

use console::style;

use crate::ai::catalog::{BudgetTier, ModelCatalog};
use crate::ai::provider::ProviderKind;
use crate::cli::ui::Output;
use crate::types::Result;

/// List catalogued models
pub fn list(provider: Option<ProviderKind>) -> Result<()> {
    let catalog = ModelCatalog::shared_builtin();
    let out = Output::new();

    out.header("Models");
    println!(
        "  {:<24} {:<8} {:>10} {:>8} {:>9} {:>9}",
        "ID", "PROVIDER", "CONTEXT", "OUTPUT", "IN $/M", "OUT $/M"
    );
    for model in catalog.all(provider) {
        let id = format!("{:<24}", model.id);
        let id = if model.is_chat() {
            style(id)
        } else {
            style(id).dim()
        };
        println!(
            "  {} {:<8} {:>10} {:>8} {:>9.2} {:>9.2}",
            id,
            model.provider,
            model.context_window_tokens,
            model.max_output_tokens,
            model.cost_per_million_input,
            model.cost_per_million_output,
        );
    }
    Ok(())
}

/// Suggest the cheapest model for an output requirement
pub fn suggest(
    output_tokens: usize,
    provider: Option<ProviderKind>,
    tier: Option<BudgetTier>,
) -> Result<()> {
    let catalog = ModelCatalog::shared_builtin();
    let out = Output::new();

    match catalog.suggest_model(output_tokens, provider, tier) {
        Some(model) => {
            if model.max_output_tokens < output_tokens {
                out.warning(&format!(
                    "No model fits {} output tokens; largest available shown",
                    output_tokens
                ));
            }
            out.success(&format!("Suggested model: {}", style(&model.id).bold()));
            out.field("Provider", model.provider);
            out.field("Max output", model.max_output_tokens);
            out.field("Context", model.context_window_tokens);
            out.field(
                "Cost (in/out $/M)",
                format!(
                    "{:.2} / {:.2}",
                    model.cost_per_million_input, model.cost_per_million_output
                ),
            );
        }
        None => out.warning("No model matches the given provider and tier"),
    }
    Ok(())
}

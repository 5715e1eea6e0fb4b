//! Features Command
//!
//! Shows the effective per-feature settings after config overrides.

use crate::ai::features::FeatureConfigMap;
use crate::cli::ui::Output;
use crate::config::Config;
use crate::types::Result;

pub fn run(config: &Config, as_json: bool) -> Result<()> {
    let map = FeatureConfigMap::new();
    map.initialize(&config.features);
    let features = map.all();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&features)?);
        return Ok(());
    }

    Output::new().header("Features");
    println!(
        "  {:<20} {:<8} {:<18} {:>6} {:>10}",
        "FEATURE", "PROVIDER", "MODEL", "TEMP", "MAX TOKENS"
    );
    for feature in features {
        println!(
            "  {:<20} {:<8} {:<18} {:>6.1} {:>10}",
            feature.feature.as_str(),
            feature.provider,
            feature.model,
            feature.temperature,
            feature
                .max_tokens
                .map_or_else(|| "-".to_string(), |t| t.to_string()),
        );
    }
    Ok(())
}

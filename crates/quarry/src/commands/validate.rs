//! Validate command - check a definition without running it.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use console::Style;
use serde::Serialize;

use super::Context;

/// Arguments for the validate command.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Pipeline definition file (TOML, or YAML with .yaml/.yml)
    pub definition: PathBuf,
}

#[derive(Debug, Serialize)]
struct Summary {
    name: String,
    discipline: String,
    actors: Vec<String>,
    groups: Vec<Vec<String>>,
    capabilities: Vec<String>,
}

/// Run the validate command.
///
/// Builds the pipeline against the default tools and placeholder reasoners,
/// so no credentials or network access are needed.
pub async fn run(args: ValidateArgs, ctx: &Context) -> Result<()> {
    let file = super::load_definition(&args.definition)?;
    let reasoners = super::reasoner_names(&file);
    let actors = file.agents.iter().map(|a| a.id.clone()).collect();
    let capabilities = file.capability_names();

    let registry = super::offline_registry(ctx.config(), &reasoners)?;
    let pipeline = file
        .build(&registry)
        .with_context(|| format!("Invalid pipeline definition {}", args.definition.display()))?;

    let summary = Summary {
        name: pipeline.name().to_string(),
        discipline: serde_json::to_value(pipeline.discipline())?
            .as_str()
            .unwrap_or_default()
            .to_string(),
        actors,
        groups: pipeline
            .groups()
            .iter()
            .map(|group| group.iter().map(|s| s.id().to_string()).collect())
            .collect(),
        capabilities,
    };

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let green = Style::new().green();
    let dim = Style::new().dim();
    println!("{} {} is valid", green.apply_to("✓"), args.definition.display());
    println!("  pipeline:     {} ({})", summary.name, summary.discipline);
    println!("  actors:       {}", summary.actors.join(", "));
    println!("  capabilities: {}", summary.capabilities.join(", "));
    println!("  steps:");
    for (i, group) in summary.groups.iter().enumerate() {
        let label = if group.len() > 1 { " (parallel)" } else { "" };
        println!("    {}. {}{}", i + 1, group.join(", "), dim.apply_to(label));
    }
    Ok(())
}

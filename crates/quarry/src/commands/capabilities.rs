//! Capabilities command - list what pipelines can use.

use std::collections::BTreeSet;

use anyhow::Result;
use clap::Args;
use quarry_pipeline::DEFAULT_REASONER;
use serde::Serialize;

use super::Context;

/// Arguments for the capabilities command.
#[derive(Args, Debug)]
pub struct CapabilitiesArgs {}

#[derive(Debug, Serialize)]
struct Entry {
    name: String,
    description: String,
}

/// Run the capabilities command.
pub async fn run(_args: CapabilitiesArgs, ctx: &Context) -> Result<()> {
    let reasoners = BTreeSet::from([DEFAULT_REASONER.to_string()]);
    let registry = super::offline_registry(ctx.config(), &reasoners)?;

    let llm = ctx.config().llm();
    let reasoner_description = format!(
        "Reasoning engine ({}{})",
        llm.effective_backend(),
        llm.model.as_deref().map(|m| format!(" / {}", m)).unwrap_or_default()
    );

    let entries: Vec<Entry> = registry
        .descriptions()
        .into_iter()
        .map(|(name, description)| {
            let description = if name == DEFAULT_REASONER {
                reasoner_description.clone()
            } else {
                description
            };
            Entry { name, description }
        })
        .collect();

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for entry in &entries {
        println!("{:<16} {}", entry.name, entry.description);
    }
    Ok(())
}

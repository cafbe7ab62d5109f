//! Run command - execute a pipeline definition.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use clap::Args;
use console::Style;
use quarry_pipeline::{PipelineRunner, RunResult};

use super::Context;

/// Arguments for the run command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Pipeline definition file (TOML, or YAML with .yaml/.yml)
    pub definition: PathBuf,

    /// Set a pipeline input, overriding the definition's default (repeatable)
    #[arg(short, long = "input", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub inputs: Vec<(String, String)>,

    /// Write the final output to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Use a canned reasoner instead of calling a model
    #[arg(long)]
    pub dry_run: bool,

    /// Override the per-invocation timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Override the reasoning iteration bound
    #[arg(long)]
    pub max_iterations: Option<u32>,
}

fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

/// Run the run command.
pub async fn run(args: RunArgs, ctx: &Context) -> Result<()> {
    let file = super::load_definition(&args.definition)?;
    let reasoners = super::reasoner_names(&file);

    let mut inputs: HashMap<String, String> = file.pipeline.inputs.clone();
    inputs.extend(args.inputs);

    let registry = if args.dry_run {
        super::offline_registry(ctx.config(), &reasoners)?
    } else {
        super::live_registry(ctx.config(), &reasoners)?
    };
    let pipeline = file
        .build(&registry)
        .with_context(|| format!("Failed to build pipeline from {}", args.definition.display()))?;

    let mut policy = super::invocation_policy(ctx.config());
    if let Some(secs) = args.timeout {
        policy.invocation_timeout = Duration::from_secs(secs);
    }
    if let Some(max) = args.max_iterations {
        policy.max_iterations = max;
    }

    let dim = Style::new().dim();
    if ctx.verbose && !ctx.json_output {
        eprintln!(
            "{}",
            dim.apply_to(format!(
                "Running '{}' ({} steps, {:?}){}",
                pipeline.name(),
                pipeline.len(),
                pipeline.discipline(),
                if args.dry_run { " [dry run]" } else { "" }
            ))
        );
    }

    let report = PipelineRunner::new(policy).run_with_inputs(&pipeline, inputs).await;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    match &report.result {
        RunResult::Completed { output } => {
            if !ctx.json_output {
                println!("{}", output);
            }
            if let Some(path) = &args.output {
                std::fs::write(path, output)
                    .with_context(|| format!("Failed to write output to {}", path.display()))?;
                if !ctx.json_output {
                    eprintln!("{}", dim.apply_to(format!("Output written to {}", path.display())));
                }
            }
            if ctx.verbose && !ctx.json_output {
                eprintln!(
                    "{}",
                    dim.apply_to(format!(
                        "Completed {} steps in {} ms (run {})",
                        report.executed.len(),
                        report.elapsed_ms,
                        report.run_id
                    ))
                );
            }
            Ok(())
        }
        RunResult::Failed { step_id, cause } => {
            if !ctx.json_output {
                let red = Style::new().red();
                eprintln!("{} step '{}' failed: {}", red.apply_to("Error:"), step_id, cause);
            }
            bail!("Pipeline '{}' failed at step '{}'", report.pipeline, step_id)
        }
    }
}

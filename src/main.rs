use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow};

use tennis_prep::config::PipelineConfig;
use tennis_prep::pipeline::PipelineRunner;

fn main() -> ExitCode {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    env_logger::init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let config_path = parse_path_arg("--config").ok_or_else(|| {
        anyhow!("usage: tennis_prep --config <file> [--out <path>] [--seed <n>] [--no-cache]")
    })?;
    let mut config = PipelineConfig::from_file(&config_path)
        .with_context(|| format!("load pipeline config {}", config_path.display()))?;

    if let Some(out) = parse_path_arg("--out") {
        config.path = out;
    }
    if let Some(seed) = parse_u64_arg("--seed") {
        config.seed = Some(seed);
    }
    if has_flag("--no-cache") {
        config.use_cache = false;
    }
    config.validate()?;

    let summary = PipelineRunner::run(&config).context("pipeline run failed")?;

    println!("Pipeline complete");
    println!("Dataset: {}", config.dataset_path.display());
    println!("Rows: {} in / {} out", summary.rows_in, summary.rows_out);
    println!("Columns: {}", summary.columns_out);
    if summary.cache_hit {
        println!("Cache: hit (reprocessing skipped)");
    } else {
        println!("Players seen: {}", summary.players_seen);
        println!("Outcomes swapped: {}", summary.rows_swapped);
    }
    println!("Output: {}", config.path.display());

    Ok(())
}

fn parse_path_arg(name: &str) -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix(&prefix) {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == name {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(PathBuf::from(next));
            }
        }
    }
    None
}

fn parse_u64_arg(name: &str) -> Option<u64> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&prefix) {
            if let Ok(value) = raw.trim().parse::<u64>() {
                return Some(value);
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && let Ok(value) = next.trim().parse::<u64>()
        {
            return Some(value);
        }
    }
    None
}

fn has_flag(name: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg == name)
}

use log::info;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::finalize::finalize_features;
use crate::loader::loader_from_config;
use crate::persist;
use crate::randomize::randomize_outcomes;
use crate::ratings::{RatingStore, add_rating_features, compute_rating_features, match_keys};
use crate::rolling::add_rolling_features;
use crate::score::add_score_features;
use crate::source_parser::parser_from_config;

#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub rows_in: usize,
    pub rows_out: usize,
    pub columns_out: usize,
    pub players_seen: usize,
    pub rows_swapped: usize,
    pub cache_hit: bool,
}

pub struct PipelineRunner;

impl PipelineRunner {
    /// One deterministic batch pass: load, canonicalize, randomize roles,
    /// derive score/rating/rolling features, finalize and save. A cache hit
    /// skips straight to saving the snapshot.
    pub fn run(config: &PipelineConfig) -> Result<RunSummary> {
        let loader = loader_from_config(config)?;

        if config.use_cache {
            if let Some(cached) = persist::load_processed(&config.dataset_path) {
                info!(
                    "cache hit for {}, skipping reprocessing",
                    config.dataset_path.display()
                );
                loader.save(&cached, &config.path)?;
                return Ok(RunSummary {
                    rows_in: cached.len(),
                    rows_out: cached.len(),
                    columns_out: cached.columns().len(),
                    players_seen: 0,
                    rows_swapped: 0,
                    cache_hit: true,
                });
            }
        }

        let data = loader.process()?;
        let rows_in = data.len();
        info!("loaded {rows_in} raw rows");

        let parser = parser_from_config(config)?;
        let mut data = parser.parse(data)?;

        let rows_swapped = randomize_outcomes(&mut data, config.seed)?;
        add_score_features(&mut data)?;

        // The rating loop is order-dependent and must stay sequential; the
        // materialized key sequence fixes its iteration order.
        let matches = match_keys(&data)?;
        let mut store = RatingStore::default();
        let features = compute_rating_features(&matches, &mut store);
        add_rating_features(&mut data, &features)?;

        add_rolling_features(&mut data, &matches)?;

        finalize_features(&mut data)?;

        loader.save(&data, &config.path)?;
        if config.use_cache {
            persist::store_processed(&config.dataset_path, &data);
        }
        info!("saved {} rows to {}", data.len(), config.path.display());

        Ok(RunSummary {
            rows_in,
            rows_out: data.len(),
            columns_out: data.columns().len(),
            players_seen: store.players_seen(),
            rows_swapped,
            cache_hit: false,
        })
    }
}

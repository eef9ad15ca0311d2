use log::info;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::error::Result;
use crate::source_parser::OUTCOME_COLUMN;
use crate::table::{Table, Value};

/// Winner/loser attribute pairs swapped together with the outcome label.
/// Identity and entry data first, then the per-set serve statistics.
pub const SWAP_PAIRS: &[(&str, &str)] = &[
    ("winner_id", "loser_id"),
    ("winner_seed", "loser_seed"),
    ("winner_entry", "loser_entry"),
    ("winner_name", "loser_name"),
    ("winner_hand", "loser_hand"),
    ("winner_ht", "loser_ht"),
    ("winner_ioc", "loser_ioc"),
    ("winner_age", "loser_age"),
    ("winner_rank", "loser_rank"),
    ("winner_rank_points", "loser_rank_points"),
    ("w_ace", "l_ace"),
    ("w_df", "l_df"),
    ("w_svpt", "l_svpt"),
    ("w_1stIn", "l_1stIn"),
    ("w_1stWon", "l_1stWon"),
    ("w_2ndWon", "l_2ndWon"),
    ("w_SvGms", "l_SvGms"),
    ("w_bpSaved", "l_bpSaved"),
    ("w_bpFaced", "l_bpFaced"),
];

/// Pick the rows whose winner/loser roles get swapped: exactly half of the
/// table, drawn without replacement. Seeded runs are reproducible.
pub fn draw_swap_indices(n: usize, seed: Option<u64>) -> Vec<usize> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut rng);
    indices.truncate(n / 2);
    indices
}

/// Swap winner/loser attribute pairs for a random half of the rows, set
/// `outcome = 0` there, and rename all role-prefixed columns to anonymized
/// `player_A_*` / `player_B_*` names.
///
/// After this, `outcome == 1` means player A is the original winner and
/// `outcome == 0` means player A is the original loser with every paired
/// attribute already swapped. The score column is handled by the score stage,
/// over the same `outcome == 0` subset.
pub fn randomize_outcomes(table: &mut Table, seed: Option<u64>) -> Result<usize> {
    let flipped = draw_swap_indices(table.len(), seed);

    for (col_a, col_b) in SWAP_PAIRS {
        let (Some(a), Some(b)) = (table.col(col_a), table.col(col_b)) else {
            continue;
        };
        for &row in &flipped {
            table.swap_values(row, a, b);
        }
    }

    let outcome_col = table.require_col(OUTCOME_COLUMN)?;
    for &row in &flipped {
        table.set(row, outcome_col, Value::Int(0));
    }

    table.rename_columns_with(|name| {
        if let Some(rest) = name.strip_prefix("winner_") {
            Some(format!("player_A_{rest}"))
        } else if let Some(rest) = name.strip_prefix("loser_") {
            Some(format!("player_B_{rest}"))
        } else if let Some(rest) = name.strip_prefix("w_") {
            Some(format!("player_A_{rest}"))
        } else if let Some(rest) = name.strip_prefix("l_") {
            Some(format!("player_B_{rest}"))
        } else {
            None
        }
    });

    info!(
        "randomized outcomes: {} of {} rows swapped",
        flipped.len(),
        table.len()
    );
    Ok(flipped.len())
}

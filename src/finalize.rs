use std::collections::HashMap;

use log::info;

use crate::error::Result;
use crate::table::{Table, Value};

/// Identifier and leakage-prone columns removed from the model table. The
/// per-match score fields encode the row's own outcome and only exist to
/// feed the rolling averages.
const DROP_COLUMNS: &[&str] = &[
    "score",
    "is_walkover",
    "sets_A",
    "sets_B",
    "games_A",
    "games_B",
    "set_diff",
    "game_diff",
    "n_tiebreaks",
    "pct_games_A",
    "match_id",
    "tourney_datetime",
    "tourney_id",
    "tourney_name",
    "match_num",
    "draw_size",
    "minutes",
    "player_A_id",
    "player_B_id",
    "player_A_name",
    "player_B_name",
    "player_A_seed",
    "player_B_seed",
    "player_A_entry",
    "player_B_entry",
    "player_A_ioc",
    "player_B_ioc",
    "player_A_rank",
    "player_B_rank",
    "player_A_rank_points",
    "player_B_rank_points",
    "player_A_ace",
    "player_A_df",
    "player_A_svpt",
    "player_A_1stIn",
    "player_A_1stWon",
    "player_A_2ndWon",
    "player_A_SvGms",
    "player_A_bpSaved",
    "player_A_bpFaced",
    "player_B_ace",
    "player_B_df",
    "player_B_svpt",
    "player_B_1stIn",
    "player_B_1stWon",
    "player_B_2ndWon",
    "player_B_SvGms",
    "player_B_bpSaved",
    "player_B_bpFaced",
];

const DUMMY_COLUMNS: &[&str] = &["best_of", "surface", "round"];

/// High-cardinality categoricals collapsed to their top-N values plus an
/// "Other" bucket before encoding.
const REDUCED_COLUMNS: &[(&str, usize)] = &[
    ("tourney_level", 3),
    ("player_A_hand", 1),
    ("player_B_hand", 1),
];

const SCALE_COLUMNS: &[&str] = &[
    "player_A_ht",
    "player_A_age",
    "player_B_ht",
    "player_B_age",
];

const OTHER_BUCKET: &str = "Other";

/// One-hot encode a column, dropping the first (sorted) category against
/// collinearity. Null cells encode as all zeros. The source column is
/// removed.
pub fn one_hot_encode(table: &mut Table, column: &str) -> Result<()> {
    let Some(col) = table.col(column) else {
        return Ok(());
    };

    let mut categories: Vec<String> = Vec::new();
    for row in table.rows() {
        if let Some(key) = row[col].category_key() {
            if !categories.contains(&key) {
                categories.push(key);
            }
        }
    }
    categories.sort();

    let keys: Vec<Option<String>> = table
        .rows()
        .map(|row| row[col].category_key())
        .collect();
    for category in categories.iter().skip(1) {
        let values = keys
            .iter()
            .map(|key| Value::Int(i64::from(key.as_deref() == Some(category.as_str()))))
            .collect();
        table.add_column(&format!("{column}_{category}"), values)?;
    }
    table.drop_columns(&[column]);
    Ok(())
}

/// Collapse a column to its top-N most frequent values plus `Other`, then
/// one-hot encode the reduced column. Ties in frequency break by name so the
/// encoding is deterministic.
pub fn reduce_and_encode(table: &mut Table, column: &str, top_n: usize) -> Result<()> {
    let Some(col) = table.col(column) else {
        return Ok(());
    };

    let mut counts: HashMap<String, usize> = HashMap::new();
    for row in table.rows() {
        if let Some(key) = row[col].category_key() {
            *counts.entry(key).or_insert(0) += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    let top: Vec<String> = ranked.into_iter().take(top_n).map(|(key, _)| key).collect();

    let reduced_name = format!("{column}_reduced");
    let values = table
        .rows()
        .map(|row| match row[col].category_key() {
            None => Value::Null,
            Some(key) if top.contains(&key) => Value::Text(key),
            Some(_) => Value::Text(OTHER_BUCKET.to_string()),
        })
        .collect();
    table.add_column(&reduced_name, values)?;
    table.drop_columns(&[column]);
    one_hot_encode(table, &reduced_name)
}

/// Min-max scale a column to [0, 1] using the full dataset's min and max.
/// Nulls pass through; a constant column scales to 0.
pub fn min_max_scale(table: &mut Table, column: &str) -> Result<()> {
    let Some(col) = table.col(column) else {
        return Ok(());
    };

    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for row in table.rows() {
        if let Some(value) = row[col].as_f64() {
            min = min.min(value);
            max = max.max(value);
        }
    }
    if min > max {
        return Ok(());
    }
    let range = max - min;

    for row in 0..table.len() {
        if let Some(value) = table.get(row, col).as_f64() {
            let scaled = if range > 0.0 { (value - min) / range } else { 0.0 };
            table.set(row, col, Value::Float(scaled));
        }
    }
    Ok(())
}

/// Final shaping pass: drop identifiers and leakage columns, encode
/// categoricals, scale the fixed numeric list.
pub fn finalize_features(table: &mut Table) -> Result<()> {
    table.drop_columns(DROP_COLUMNS);

    for column in DUMMY_COLUMNS {
        one_hot_encode(table, column)?;
    }
    for (column, top_n) in REDUCED_COLUMNS {
        reduce_and_encode(table, column, *top_n)?;
    }
    for column in SCALE_COLUMNS {
        min_max_scale(table, column)?;
    }

    info!(
        "finalized feature table: {} rows, {} columns",
        table.len(),
        table.columns().len()
    );
    Ok(())
}

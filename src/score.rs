use log::warn;
use rayon::prelude::*;

use crate::error::Result;
use crate::source_parser::OUTCOME_COLUMN;
use crate::table::{Table, Value};

pub const SCORE_COLUMN: &str = "score";

/// Markers for matches decided without full play. A score starting with one
/// of these has no set structure at all.
pub const WALKOVER_TOKENS: &[&str] = &["RET", "W/O", "WO", "RETIRE"];

/// One set: games for each side plus the loser's tiebreak points when the
/// set went to a tiebreak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetScore {
    pub games_a: i64,
    pub games_b: i64,
    pub tiebreak: Option<i64>,
}

/// Score-derived per-match features. All numeric fields are None for
/// walkovers and for strings where no set token parses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreFeatures {
    pub is_walkover: bool,
    pub sets_a: Option<i64>,
    pub sets_b: Option<i64>,
    pub games_a: Option<i64>,
    pub games_b: Option<i64>,
    pub set_diff: Option<i64>,
    pub game_diff: Option<i64>,
    pub n_tiebreaks: Option<i64>,
    pub pct_games_a: Option<f64>,
}

fn is_walkover_marker(score: &str) -> bool {
    let upper = score.trim().to_uppercase();
    WALKOVER_TOKENS.iter().any(|tok| upper.starts_with(tok))
}

/// Parse one set token at `start` (which must point at a digit):
/// `digits '-' digits ['(' digits ')']`. Returns the set and the position
/// just past it.
fn parse_set_at(bytes: &[u8], start: usize) -> Option<(SetScore, usize)> {
    let read_digits = |mut idx: usize| -> Option<(i64, usize)> {
        let begin = idx;
        while idx < bytes.len() && bytes[idx].is_ascii_digit() {
            idx += 1;
        }
        if idx == begin {
            return None;
        }
        std::str::from_utf8(&bytes[begin..idx])
            .ok()?
            .parse::<i64>()
            .ok()
            .map(|v| (v, idx))
    };

    let (games_a, idx) = read_digits(start)?;
    if idx >= bytes.len() || bytes[idx] != b'-' {
        return None;
    }
    let (games_b, idx) = read_digits(idx + 1)?;

    let mut set = SetScore {
        games_a,
        games_b,
        tiebreak: None,
    };
    if idx < bytes.len() && bytes[idx] == b'(' {
        if let Some((points, after)) = read_digits(idx + 1) {
            if after < bytes.len() && bytes[after] == b')' {
                set.tiebreak = Some(points);
                return Some((set, after + 1));
            }
        }
    }
    Some((set, idx))
}

/// Every `a-b(n)` occurrence in the string, in order.
pub fn scan_sets(score: &str) -> Vec<SetScore> {
    let bytes = score.as_bytes();
    let mut out = Vec::new();
    let mut idx = 0;
    while idx < bytes.len() {
        if bytes[idx].is_ascii_digit() {
            if let Some((set, next)) = parse_set_at(bytes, idx) {
                out.push(set);
                idx = next;
                continue;
            }
            while idx < bytes.len() && bytes[idx].is_ascii_digit() {
                idx += 1;
            }
        } else {
            idx += 1;
        }
    }
    out
}

/// Swap each set's orientation (`a-b` -> `b-a`), keeping tiebreak
/// annotations attached. Walkover markers and unparseable tokens pass
/// through verbatim, so inversion is idempotent on well-formed sets and a
/// fixed point on specials.
pub fn invert_score(score: &str) -> String {
    let trimmed = score.trim().to_uppercase();
    if is_walkover_marker(&trimmed) {
        return trimmed;
    }

    let mut inverted = Vec::new();
    for token in trimmed.split_whitespace() {
        let bytes = token.as_bytes();
        match bytes.first().filter(|b| b.is_ascii_digit()).and_then(|_| parse_set_at(bytes, 0)) {
            Some((set, _)) => {
                let mut flipped = format!("{}-{}", set.games_b, set.games_a);
                if let Some(points) = set.tiebreak {
                    flipped.push_str(&format!("({points})"));
                }
                inverted.push(flipped);
            }
            None => inverted.push(token.to_string()),
        }
    }
    inverted.join(" ")
}

/// Score features for a single (already A/B-consistent) score string.
pub fn extract_score_features(score: Option<&str>) -> ScoreFeatures {
    let Some(raw) = score.map(str::trim).filter(|s| !s.is_empty()) else {
        return ScoreFeatures {
            is_walkover: true,
            ..ScoreFeatures::default()
        };
    };
    if is_walkover_marker(raw) {
        return ScoreFeatures {
            is_walkover: true,
            ..ScoreFeatures::default()
        };
    }

    let sets = scan_sets(raw);
    if sets.is_empty() {
        // Lenient path: real-world score strings are inconsistently
        // formatted, so unreadable ones degrade instead of aborting.
        return ScoreFeatures::default();
    }

    let sets_a = sets.iter().filter(|s| s.games_a > s.games_b).count() as i64;
    let sets_b = sets.iter().filter(|s| s.games_b > s.games_a).count() as i64;
    let games_a: i64 = sets.iter().map(|s| s.games_a).sum();
    let games_b: i64 = sets.iter().map(|s| s.games_b).sum();
    let n_tiebreaks = sets.iter().filter(|s| s.tiebreak.is_some()).count() as i64;
    let total_games = games_a + games_b;

    ScoreFeatures {
        is_walkover: false,
        sets_a: Some(sets_a),
        sets_b: Some(sets_b),
        games_a: Some(games_a),
        games_b: Some(games_b),
        set_diff: Some(sets_a - sets_b),
        game_diff: Some(games_a - games_b),
        n_tiebreaks: Some(n_tiebreaks),
        pct_games_a: (total_games > 0).then(|| games_a as f64 / total_games as f64),
    }
}

fn opt_int(v: Option<i64>) -> Value {
    v.map_or(Value::Null, Value::Int)
}

/// Rewrite the score column for `outcome == 0` rows (the same subset the
/// randomizer swapped), then derive score features for every row. The
/// per-row feature pass is order-independent and runs in parallel.
pub fn add_score_features(table: &mut Table) -> Result<()> {
    let score_col = table.require_col(SCORE_COLUMN)?;
    let outcome_col = table.require_col(OUTCOME_COLUMN)?;

    for row in 0..table.len() {
        if table.get(row, outcome_col).as_i64() == Some(0) {
            let raw = table.get(row, score_col).render();
            if !raw.trim().is_empty() {
                table.set(row, score_col, Value::Text(invert_score(&raw)));
            }
        }
    }

    let scores: Vec<Option<String>> = (0..table.len())
        .map(|row| {
            let raw = table.get(row, score_col).render();
            (!raw.trim().is_empty()).then_some(raw)
        })
        .collect();

    let features: Vec<ScoreFeatures> = scores
        .par_iter()
        .map(|score| extract_score_features(score.as_deref()))
        .collect();

    let unreadable = features
        .iter()
        .filter(|f| !f.is_walkover && f.sets_a.is_none())
        .count();
    if unreadable > 0 {
        warn!("{unreadable} score strings did not parse; features set to null");
    }

    table.add_column(
        "is_walkover",
        features
            .iter()
            .map(|f| Value::Int(i64::from(f.is_walkover)))
            .collect(),
    )?;
    table.add_column("sets_A", features.iter().map(|f| opt_int(f.sets_a)).collect())?;
    table.add_column("sets_B", features.iter().map(|f| opt_int(f.sets_b)).collect())?;
    table.add_column("games_A", features.iter().map(|f| opt_int(f.games_a)).collect())?;
    table.add_column("games_B", features.iter().map(|f| opt_int(f.games_b)).collect())?;
    table.add_column("set_diff", features.iter().map(|f| opt_int(f.set_diff)).collect())?;
    table.add_column("game_diff", features.iter().map(|f| opt_int(f.game_diff)).collect())?;
    table.add_column(
        "n_tiebreaks",
        features.iter().map(|f| opt_int(f.n_tiebreaks)).collect(),
    )?;
    table.add_column(
        "pct_games_A",
        features
            .iter()
            .map(|f| f.pct_games_a.map_or(Value::Null, Value::Float))
            .collect(),
    )?;
    Ok(())
}

use std::collections::HashMap;

use log::info;

use crate::error::Result;
use crate::ratings::MatchKey;
use crate::source_parser::MATCH_ID_COLUMN;
use crate::table::{Table, Value};

/// Per-participant statistics tracked as expanding means: sets won, games
/// won, tiebreaks played.
const STAT_COUNT: usize = 3;
const STAT_NAMES: [&str; STAT_COUNT] = ["sets", "games", "tiebreaks"];

struct PlayerEntry<'a> {
    match_id: i64,
    datetime: &'a str,
    player: &'a str,
    stats: [Option<f64>; STAT_COUNT],
}

/// Strictly-causal rolling averages: duplicate each match once per
/// participant carrying that participant's own score stats, sort by
/// (player, time, match id), take the expanding mean shifted by one, and
/// merge back for both perspectives. A player's first match gets nulls;
/// walkovers occupy a position but contribute nothing.
pub fn add_rolling_features(table: &mut Table, matches: &[MatchKey]) -> Result<()> {
    let id_col = table.require_col(MATCH_ID_COLUMN)?;
    let sets_a = table.require_col("sets_A")?;
    let sets_b = table.require_col("sets_B")?;
    let games_a = table.require_col("games_A")?;
    let games_b = table.require_col("games_B")?;
    let tiebreaks = table.require_col("n_tiebreaks")?;

    let mut row_by_id: HashMap<i64, usize> = HashMap::with_capacity(table.len());
    for row in 0..table.len() {
        if let Some(id) = table.get(row, id_col).as_i64() {
            row_by_id.insert(id, row);
        }
    }

    let mut entries: Vec<PlayerEntry> = Vec::with_capacity(matches.len() * 2);
    for m in matches {
        let Some(&row) = row_by_id.get(&m.match_id) else {
            continue;
        };
        entries.push(PlayerEntry {
            match_id: m.match_id,
            datetime: &m.datetime,
            player: &m.player_a,
            stats: [
                table.get(row, sets_a).as_f64(),
                table.get(row, games_a).as_f64(),
                table.get(row, tiebreaks).as_f64(),
            ],
        });
        entries.push(PlayerEntry {
            match_id: m.match_id,
            datetime: &m.datetime,
            player: &m.player_b,
            stats: [
                table.get(row, sets_b).as_f64(),
                table.get(row, games_b).as_f64(),
                table.get(row, tiebreaks).as_f64(),
            ],
        });
    }

    entries.sort_by(|a, b| {
        a.player
            .cmp(b.player)
            .then(a.datetime.cmp(b.datetime))
            .then(a.match_id.cmp(&b.match_id))
    });

    // Expanding mean per player, shifted by one position: the value stored
    // for a match is the mean over that player's strictly earlier matches.
    let mut averages: HashMap<(i64, &str), [Option<f64>; STAT_COUNT]> =
        HashMap::with_capacity(entries.len());
    let mut current_player: Option<&str> = None;
    let mut sums = [0.0; STAT_COUNT];
    let mut counts = [0u64; STAT_COUNT];
    for entry in &entries {
        if current_player != Some(entry.player) {
            current_player = Some(entry.player);
            sums = [0.0; STAT_COUNT];
            counts = [0u64; STAT_COUNT];
        }
        let mut prior = [None; STAT_COUNT];
        for stat in 0..STAT_COUNT {
            if counts[stat] > 0 {
                prior[stat] = Some(sums[stat] / counts[stat] as f64);
            }
            if let Some(value) = entry.stats[stat] {
                sums[stat] += value;
                counts[stat] += 1;
            }
        }
        averages.insert((entry.match_id, entry.player), prior);
    }

    let mut players_by_id: HashMap<i64, (&str, &str)> = HashMap::with_capacity(matches.len());
    for m in matches {
        players_by_id.insert(m.match_id, (m.player_a.as_str(), m.player_b.as_str()));
    }

    for (side, pick) in [("A", 0usize), ("B", 1usize)] {
        for (stat, stat_name) in STAT_NAMES.iter().enumerate() {
            let mut values = Vec::with_capacity(table.len());
            for row in 0..table.len() {
                let id = table.get(row, id_col).as_i64().unwrap_or(-1);
                let value = players_by_id
                    .get(&id)
                    .map(|(a, b)| if pick == 0 { *a } else { *b })
                    .and_then(|player| averages.get(&(id, player)))
                    .and_then(|avgs| avgs[stat]);
                values.push(value.map_or(Value::Null, Value::Float));
            }
            table.add_column(&format!("player_{side}_avg_{stat_name}"), values)?;
        }
    }

    info!("rolling averages merged for {} matches", matches.len());
    Ok(())
}

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const PLAYERS: &[(&str, &str, i64)] = &[
    ("Carlos Moreno", "R", 185),
    ("Jan Kovac", "R", 190),
    ("Luca Bertini", "L", 183),
    ("Tomas Herrera", "R", 188),
    ("Felix Andersen", "R", 193),
    ("Marco Silva", "L", 180),
    ("Pavel Novak", "R", 196),
    ("Diego Ramos", "R", 178),
    ("Andres Gil", "L", 185),
    ("Stefan Weber", "R", 191),
    ("Kenji Sato", "R", 175),
    ("Oliver Brandt", "R", 198),
];

const SURFACES: &[&str] = &["Hard", "Clay", "Grass"];
const LEVELS: &[&str] = &["G", "M", "A", "D", "C"];
const ROUNDS: &[&str] = &["R32", "R16", "QF", "SF", "F"];

fn main() -> Result<()> {
    let out = parse_path_arg("--out").unwrap_or_else(|| PathBuf::from("data/test/matches.csv"));
    let rows = parse_u64_arg("--rows").unwrap_or(500) as usize;
    let seed = parse_u64_arg("--seed").unwrap_or(1);

    let mut rng = StdRng::seed_from_u64(seed);
    if let Some(parent) = out.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }

    let mut csv = String::new();
    csv.push_str(
        "tourney_id,tourney_name,surface,draw_size,tourney_level,tourney_date,match_num,\
         winner_id,winner_seed,winner_entry,winner_name,winner_hand,winner_ht,winner_ioc,winner_age,\
         loser_id,loser_seed,loser_entry,loser_name,loser_hand,loser_ht,loser_ioc,loser_age,\
         score,best_of,round,minutes,\
         w_ace,w_df,w_svpt,w_1stIn,w_1stWon,w_2ndWon,w_SvGms,w_bpSaved,w_bpFaced,\
         l_ace,l_df,l_svpt,l_1stIn,l_1stWon,l_2ndWon,l_SvGms,l_bpSaved,l_bpFaced,\
         winner_rank,winner_rank_points,loser_rank,loser_rank_points\n",
    );

    let start = NaiveDate::from_ymd_opt(2021, 1, 4).expect("valid start date");
    for match_num in 0..rows {
        let w = rng.gen_range(0..PLAYERS.len());
        let mut l = rng.gen_range(0..PLAYERS.len());
        while l == w {
            l = rng.gen_range(0..PLAYERS.len());
        }
        let (w_name, w_hand, w_ht) = PLAYERS[w];
        let (l_name, l_hand, l_ht) = PLAYERS[l];

        let date = start + chrono::Duration::days(rng.gen_range(0..330));
        let best_of = if rng.gen_bool(0.25) { 5 } else { 3 };
        let score = random_score(&mut rng, best_of);
        let surface = SURFACES[rng.gen_range(0..SURFACES.len())];
        let level = LEVELS[rng.gen_range(0..LEVELS.len())];
        let round = ROUNDS[rng.gen_range(0..ROUNDS.len())];

        csv.push_str(&format!(
            "T{t:03},Test Open {t},{surface},32,{level},{date},{match_num},\
             {w_id},,,{w_name},{w_hand},{w_ht},XXX,{w_age:.1},\
             {l_id},,,{l_name},{l_hand},{l_ht},XXX,{l_age:.1},\
             {score},{best_of},{round},{minutes},\
             {w_ace},{w_df},{w_svpt},{w_1st_in},{w_1st_won},{w_2nd_won},{w_sv_gms},{w_bp_saved},{w_bp_faced},\
             {l_ace},{l_df},{l_svpt},{l_1st_in},{l_1st_won},{l_2nd_won},{l_sv_gms},{l_bp_saved},{l_bp_faced},\
             {w_rank},{w_pts},{l_rank},{l_pts}\n",
            t = match_num / 16,
            date = date.format("%Y%m%d"),
            w_id = 100 + w,
            l_id = 100 + l,
            w_age = rng.gen_range(18.0..36.0),
            l_age = rng.gen_range(18.0..36.0),
            minutes = rng.gen_range(55..240),
            w_ace = rng.gen_range(0..20),
            w_df = rng.gen_range(0..8),
            w_svpt = rng.gen_range(50..120),
            w_1st_in = rng.gen_range(30..70),
            w_1st_won = rng.gen_range(20..60),
            w_2nd_won = rng.gen_range(5..30),
            w_sv_gms = rng.gen_range(8..20),
            w_bp_saved = rng.gen_range(0..10),
            w_bp_faced = rng.gen_range(0..12),
            l_ace = rng.gen_range(0..20),
            l_df = rng.gen_range(0..8),
            l_svpt = rng.gen_range(50..120),
            l_1st_in = rng.gen_range(30..70),
            l_1st_won = rng.gen_range(20..60),
            l_2nd_won = rng.gen_range(5..30),
            l_sv_gms = rng.gen_range(8..20),
            l_bp_saved = rng.gen_range(0..10),
            l_bp_faced = rng.gen_range(0..12),
            w_rank = rng.gen_range(1..200),
            w_pts = rng.gen_range(500..9000),
            l_rank = rng.gen_range(1..200),
            l_pts = rng.gen_range(500..9000),
        ));
    }

    fs::write(&out, csv).with_context(|| format!("write {}", out.display()))?;
    println!("Wrote {rows} synthetic matches to {}", out.display());
    Ok(())
}

fn random_score(rng: &mut StdRng, best_of: i64) -> String {
    if rng.gen_bool(0.02) {
        return "W/O".to_string();
    }

    let sets_to_win = if best_of == 5 { 3 } else { 2 };
    let mut winner_sets = 0;
    let mut loser_sets = 0;
    let mut sets = Vec::new();
    while winner_sets < sets_to_win {
        let winner_takes_set = loser_sets + 1 == sets_to_win || rng.gen_bool(0.72);
        if winner_takes_set {
            winner_sets += 1;
            sets.push(random_set(rng, true));
        } else {
            loser_sets += 1;
            sets.push(random_set(rng, false));
        }
    }
    if rng.gen_bool(0.03) {
        sets.pop();
        sets.push("RET".to_string());
    }
    sets.join(" ")
}

fn random_set(rng: &mut StdRng, winner_side: bool) -> String {
    if rng.gen_bool(0.2) {
        let points = rng.gen_range(0..12);
        return if winner_side {
            format!("7-6({points})")
        } else {
            format!("6-7({points})")
        };
    }
    let (hi, lo) = if rng.gen_bool(0.15) {
        (7, 5)
    } else {
        (6, rng.gen_range(0..5))
    };
    if winner_side {
        format!("{hi}-{lo}")
    } else {
        format!("{lo}-{hi}")
    }
}

fn parse_path_arg(name: &str) -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix(&prefix) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path.trim()));
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
        {
            if !next.trim().is_empty() {
                return Some(PathBuf::from(next.trim()));
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

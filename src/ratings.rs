use std::collections::HashMap;
use std::f64::consts::PI;

use log::info;

use crate::error::{PipelineError, Result};
use crate::source_parser::{DATETIME_COLUMN, MATCH_ID_COLUMN, OUTCOME_COLUMN};
use crate::table::{Table, Value};

// ---------------------------------------------------------------------------
// Elo
// ---------------------------------------------------------------------------

pub const ELO_INITIAL: f64 = 1500.0;
pub const ELO_K: f64 = 32.0;

pub fn elo_expected(rating_a: f64, rating_b: f64) -> f64 {
    1.0 / (1.0 + 10.0_f64.powf((rating_b - rating_a) / 400.0))
}

// ---------------------------------------------------------------------------
// Glicko-2 (Glickman's algorithm, one opponent sample per match)
// ---------------------------------------------------------------------------

const GLICKO_SCALE: f64 = 173.7178;
const GLICKO_TAU: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlickoRating {
    pub rating: f64,
    pub rd: f64,
    pub volatility: f64,
}

impl Default for GlickoRating {
    fn default() -> Self {
        Self {
            rating: 1500.0,
            rd: 350.0,
            volatility: 0.06,
        }
    }
}

fn g_scaled(phi: f64) -> f64 {
    1.0 / (1.0 + 3.0 * phi * phi / (PI * PI)).sqrt()
}

impl GlickoRating {
    /// Expected score against `other` on the classical scale, deviation
    /// weighting applied to the opponent RD with q = ln(10)/400.
    pub fn expected(&self, other: &GlickoRating) -> f64 {
        let q = 10.0_f64.ln() / 400.0;
        let g = 1.0 / (1.0 + 3.0 * q * q * other.rd * other.rd / (PI * PI)).sqrt();
        1.0 / (1.0 + 10.0_f64.powf(-g * (self.rating - other.rating) / 400.0))
    }

    /// Full Glicko-2 update against one opponent with realized `score`
    /// (1 win, 0 loss). The opponent value must be the pre-match state.
    pub fn updated(&self, opponent: &GlickoRating, score: f64) -> GlickoRating {
        let mu = (self.rating - 1500.0) / GLICKO_SCALE;
        let phi = self.rd / GLICKO_SCALE;
        let sigma = self.volatility;
        let mu_j = (opponent.rating - 1500.0) / GLICKO_SCALE;
        let phi_j = opponent.rd / GLICKO_SCALE;

        let g = g_scaled(phi_j);
        let e = 1.0 / (1.0 + (-g * (mu - mu_j)).exp());
        let v = 1.0 / (g * g * e * (1.0 - e));
        let delta = v * g * (score - e);

        // Volatility update, bisection on Glickman's f around a = ln(sigma^2).
        let a = (sigma * sigma).ln();
        let f = |x: f64| {
            let ex = x.exp();
            let phi_sq = phi * phi;
            let num = ex * (delta * delta - phi_sq - v - ex);
            let den = 2.0 * (phi_sq + v + ex) * (phi_sq + v + ex);
            num / den - (x - a) / (GLICKO_TAU * GLICKO_TAU)
        };
        let mut lo = a - 10.0;
        let mut hi = a + 10.0;
        for _ in 0..50 {
            let mid = (lo + hi) / 2.0;
            if f(mid) * f(lo) < 0.0 {
                hi = mid;
            } else {
                lo = mid;
            }
            if (hi - lo).abs() < 1e-6 {
                break;
            }
        }
        let sigma_prime = ((lo + hi) / 4.0).exp();

        let phi_star = (phi * phi + sigma_prime * sigma_prime).sqrt();
        let phi_prime = 1.0 / (1.0 / (phi_star * phi_star) + 1.0 / v).sqrt();
        let mu_prime = mu + phi_prime * phi_prime * g * (score - e);

        GlickoRating {
            rating: mu_prime * GLICKO_SCALE + 1500.0,
            rd: phi_prime * GLICKO_SCALE,
            volatility: sigma_prime,
        }
    }
}

// ---------------------------------------------------------------------------
// TrueSkill (1v1, win/loss only; tennis has no draws, so the draw margin
// is zero)
// ---------------------------------------------------------------------------

pub const TS_MU: f64 = 25.0;
pub const TS_SIGMA: f64 = 25.0 / 3.0;
pub const TS_BETA: f64 = 25.0 / 6.0;
pub const TS_DYN_TAU: f64 = 25.0 / 300.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrueSkillRating {
    pub mu: f64,
    pub sigma: f64,
}

impl Default for TrueSkillRating {
    fn default() -> Self {
        Self {
            mu: TS_MU,
            sigma: TS_SIGMA,
        }
    }
}

fn erf(x: f64) -> f64 {
    // Abramowitz & Stegun 7.1.26, |error| < 1.5e-7.
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.3275911 * x);
    let poly = t
        * (0.254829592
            + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    sign * (1.0 - poly * (-x * x).exp())
}

fn normal_pdf(x: f64) -> f64 {
    (-(x * x) / 2.0).exp() / (2.0 * PI).sqrt()
}

fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Mean-truncation terms for a win/loss observation.
fn v_win(t: f64) -> f64 {
    let denom = normal_cdf(t);
    if denom < 1e-12 {
        // Far tail: the ratio approaches -t.
        -t
    } else {
        normal_pdf(t) / denom
    }
}

fn w_win(t: f64) -> f64 {
    let v = v_win(t);
    v * (v + t)
}

/// Standard 1v1 match-quality score: 1.0 means a perfectly balanced pairing.
pub fn quality_1v1(a: &TrueSkillRating, b: &TrueSkillRating) -> f64 {
    let c2 = 2.0 * TS_BETA * TS_BETA + a.sigma * a.sigma + b.sigma * b.sigma;
    let diff = a.mu - b.mu;
    (2.0 * TS_BETA * TS_BETA / c2).sqrt() * (-(diff * diff) / (2.0 * c2)).exp()
}

/// Pairwise update in winner/loser order.
pub fn rate_1v1(
    winner: &TrueSkillRating,
    loser: &TrueSkillRating,
) -> (TrueSkillRating, TrueSkillRating) {
    let sw2 = winner.sigma * winner.sigma + TS_DYN_TAU * TS_DYN_TAU;
    let sl2 = loser.sigma * loser.sigma + TS_DYN_TAU * TS_DYN_TAU;
    let c2 = 2.0 * TS_BETA * TS_BETA + sw2 + sl2;
    let c = c2.sqrt();

    let t = (winner.mu - loser.mu) / c;
    let v = v_win(t);
    let w = w_win(t);

    let new_winner = TrueSkillRating {
        mu: winner.mu + sw2 / c * v,
        sigma: (sw2 * (1.0 - sw2 / c2 * w)).max(0.0).sqrt(),
    };
    let new_loser = TrueSkillRating {
        mu: loser.mu - sl2 / c * v,
        sigma: (sl2 * (1.0 - sl2 / c2 * w)).max(0.0).sqrt(),
    };
    (new_winner, new_loser)
}

// ---------------------------------------------------------------------------
// Rating store and the sequential feature loop
// ---------------------------------------------------------------------------

/// Per-player running state for all three systems. Owned by the pipeline run;
/// a fresh store means a fresh history.
#[derive(Debug, Default)]
pub struct RatingStore {
    elo: HashMap<String, f64>,
    glicko: HashMap<String, GlickoRating>,
    trueskill: HashMap<String, TrueSkillRating>,
}

impl RatingStore {
    pub fn elo(&self, player: &str) -> f64 {
        self.elo.get(player).copied().unwrap_or(ELO_INITIAL)
    }

    pub fn glicko(&self, player: &str) -> GlickoRating {
        self.glicko.get(player).copied().unwrap_or_default()
    }

    pub fn trueskill(&self, player: &str) -> TrueSkillRating {
        self.trueskill.get(player).copied().unwrap_or_default()
    }

    pub fn update_elo(&mut self, player: &str, rating: f64) {
        self.elo.insert(player.to_string(), rating);
    }

    pub fn update_glicko(&mut self, player: &str, rating: GlickoRating) {
        self.glicko.insert(player.to_string(), rating);
    }

    pub fn update_trueskill(&mut self, player: &str, rating: TrueSkillRating) {
        self.trueskill.insert(player.to_string(), rating);
    }

    pub fn players_seen(&self) -> usize {
        self.elo.len()
    }
}

/// Canonical per-match view used by the order-dependent stages.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchKey {
    pub match_id: i64,
    pub datetime: String,
    pub player_a: String,
    pub player_b: String,
    pub outcome: i64,
}

/// Materialize the chronological match sequence from the canonical table.
/// Ties in the timestamp are broken by match id, so iteration order is fixed.
pub fn match_keys(table: &Table) -> Result<Vec<MatchKey>> {
    let id_col = table.require_col(MATCH_ID_COLUMN)?;
    let dt_col = table.require_col(DATETIME_COLUMN)?;
    let a_col = table.require_col("player_A_name")?;
    let b_col = table.require_col("player_B_name")?;
    let outcome_col = table.require_col(OUTCOME_COLUMN)?;

    let mut keys = Vec::with_capacity(table.len());
    for (idx, row) in table.rows().enumerate() {
        let text = |value: &Value, what: &str| -> Result<String> {
            value
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| PipelineError::Validation(format!("row {idx}: missing {what}")))
        };
        keys.push(MatchKey {
            match_id: row[id_col]
                .as_i64()
                .ok_or_else(|| PipelineError::Validation(format!("row {idx}: missing match_id")))?,
            datetime: text(&row[dt_col], "tourney_datetime")?,
            player_a: text(&row[a_col], "player_A_name")?,
            player_b: text(&row[b_col], "player_B_name")?,
            outcome: row[outcome_col]
                .as_i64()
                .ok_or_else(|| PipelineError::Validation(format!("row {idx}: missing outcome")))?,
        });
    }
    keys.sort_by(|a, b| a.datetime.cmp(&b.datetime).then(a.match_id.cmp(&b.match_id)));
    Ok(keys)
}

/// Pre-update feature block for one match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingFeatures {
    pub match_id: i64,
    pub elo_a: f64,
    pub elo_b: f64,
    pub elo_diff: f64,
    pub elo_exp_a: f64,
    pub glicko_a: f64,
    pub glicko_rd_a: f64,
    pub glicko_b: f64,
    pub glicko_rd_b: f64,
    pub glicko_diff: f64,
    pub glicko_exp_a: f64,
    pub ts_mu_a: f64,
    pub ts_sigma_a: f64,
    pub ts_mu_b: f64,
    pub ts_sigma_b: f64,
    pub ts_quality: f64,
}

/// Sequential rating loop. For each match, in chronological order: read both
/// players' pre-match state, emit the feature block, then apply all three
/// post-match updates. Features never see the current match's outcome.
pub fn compute_rating_features(
    matches: &[MatchKey],
    store: &mut RatingStore,
) -> Vec<RatingFeatures> {
    let mut out = Vec::with_capacity(matches.len());

    for m in matches {
        let elo_a = store.elo(&m.player_a);
        let elo_b = store.elo(&m.player_b);
        let glicko_a = store.glicko(&m.player_a);
        let glicko_b = store.glicko(&m.player_b);
        let ts_a = store.trueskill(&m.player_a);
        let ts_b = store.trueskill(&m.player_b);

        let elo_exp_a = elo_expected(elo_a, elo_b);

        out.push(RatingFeatures {
            match_id: m.match_id,
            elo_a,
            elo_b,
            elo_diff: elo_a - elo_b,
            elo_exp_a,
            glicko_a: glicko_a.rating,
            glicko_rd_a: glicko_a.rd,
            glicko_b: glicko_b.rating,
            glicko_rd_b: glicko_b.rd,
            glicko_diff: glicko_a.rating - glicko_b.rating,
            glicko_exp_a: glicko_a.expected(&glicko_b),
            ts_mu_a: ts_a.mu,
            ts_sigma_a: ts_a.sigma,
            ts_mu_b: ts_b.mu,
            ts_sigma_b: ts_b.sigma,
            ts_quality: quality_1v1(&ts_a, &ts_b),
        });

        let result = m.outcome as f64;
        store.update_elo(&m.player_a, elo_a + ELO_K * (result - elo_exp_a));
        store.update_elo(
            &m.player_b,
            elo_b + ELO_K * ((1.0 - result) - (1.0 - elo_exp_a)),
        );

        // Both Glicko updates read the opponent's pre-match copy taken above.
        store.update_glicko(&m.player_a, glicko_a.updated(&glicko_b, result));
        store.update_glicko(&m.player_b, glicko_b.updated(&glicko_a, 1.0 - result));

        let (new_a, new_b) = if m.outcome == 1 {
            rate_1v1(&ts_a, &ts_b)
        } else {
            let (new_b, new_a) = rate_1v1(&ts_b, &ts_a);
            (new_a, new_b)
        };
        store.update_trueskill(&m.player_a, new_a);
        store.update_trueskill(&m.player_b, new_b);
    }

    info!(
        "rating features computed for {} matches, {} players",
        matches.len(),
        store.players_seen()
    );
    out
}

/// Merge the feature block back onto the table, one column per feature,
/// joined on match id.
pub fn add_rating_features(table: &mut Table, features: &[RatingFeatures]) -> Result<()> {
    let by_id: HashMap<i64, &RatingFeatures> =
        features.iter().map(|f| (f.match_id, f)).collect();
    let id_col = table.require_col(MATCH_ID_COLUMN)?;

    let columns: &[(&str, fn(&RatingFeatures) -> f64)] = &[
        ("player_A_elo", |f| f.elo_a),
        ("player_B_elo", |f| f.elo_b),
        ("elo_diff", |f| f.elo_diff),
        ("elo_exp_A", |f| f.elo_exp_a),
        ("player_A_glicko", |f| f.glicko_a),
        ("player_A_glicko_rd", |f| f.glicko_rd_a),
        ("player_B_glicko", |f| f.glicko_b),
        ("player_B_glicko_rd", |f| f.glicko_rd_b),
        ("glicko_diff", |f| f.glicko_diff),
        ("glicko_exp_A", |f| f.glicko_exp_a),
        ("player_A_ts_mu", |f| f.ts_mu_a),
        ("player_A_ts_sigma", |f| f.ts_sigma_a),
        ("player_B_ts_mu", |f| f.ts_mu_b),
        ("player_B_ts_sigma", |f| f.ts_sigma_b),
        ("ts_quality", |f| f.ts_quality),
    ];

    for (name, get) in columns {
        let mut values = Vec::with_capacity(table.len());
        for row in 0..table.len() {
            let id = table.get(row, id_col).as_i64().unwrap_or(-1);
            let row_features = by_id.get(&id).copied().ok_or_else(|| {
                PipelineError::Validation(format!("no rating features for match_id {id}"))
            })?;
            values.push(Value::Float(get(row_features)));
        }
        table.add_column(name, values)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: i64, day: u32, a: &str, b: &str, outcome: i64) -> MatchKey {
        MatchKey {
            match_id: id,
            datetime: format!("2019-01-{day:02}T00:00:00"),
            player_a: a.to_string(),
            player_b: b.to_string(),
            outcome,
        }
    }

    #[test]
    fn equal_elo_means_even_expectation() {
        assert_eq!(elo_expected(1500.0, 1500.0), 0.5);
    }

    #[test]
    fn elo_update_moves_winner_up_and_loser_down() {
        let mut store = RatingStore::default();
        compute_rating_features(&[key(0, 1, "Alice", "Bob", 1)], &mut store);
        assert!(store.elo("Alice") > ELO_INITIAL);
        assert!(store.elo("Bob") < ELO_INITIAL);
        // K=32 symmetric update from an even expectation.
        assert!((store.elo("Alice") - 1516.0).abs() < 1e-9);
        assert!((store.elo("Bob") - 1484.0).abs() < 1e-9);
    }

    #[test]
    fn features_are_pre_update() {
        let mut store = RatingStore::default();
        let features = compute_rating_features(
            &[key(0, 1, "Alice", "Bob", 1), key(1, 2, "Alice", "Bob", 1)],
            &mut store,
        );
        // First match sees defaults for everything.
        assert_eq!(features[0].elo_a, ELO_INITIAL);
        assert_eq!(features[0].glicko_a, 1500.0);
        assert_eq!(features[0].glicko_rd_a, 350.0);
        assert_eq!(features[0].ts_mu_a, TS_MU);
        // Second match sees the post-first-match state, not its own update.
        assert!(features[1].elo_a > ELO_INITIAL);
        assert!(features[1].elo_b < ELO_INITIAL);
    }

    #[test]
    fn trajectories_are_deterministic() {
        let matches = vec![
            key(0, 1, "Alice", "Bob", 1),
            key(1, 2, "Carol", "Bob", 0),
            key(2, 3, "Alice", "Carol", 1),
        ];
        let mut store_a = RatingStore::default();
        let mut store_b = RatingStore::default();
        let run_a = compute_rating_features(&matches, &mut store_a);
        let run_b = compute_rating_features(&matches, &mut store_b);
        assert_eq!(run_a, run_b);
        assert_eq!(store_a.elo("Carol"), store_b.elo("Carol"));
        assert_eq!(store_a.glicko("Bob"), store_b.glicko("Bob"));
    }

    #[test]
    fn glicko_winner_rises_loser_falls_and_both_rds_shrink() {
        let a = GlickoRating::default();
        let b = GlickoRating::default();
        let new_a = a.updated(&b, 1.0);
        let new_b = b.updated(&a, 0.0);
        assert!(new_a.rating > a.rating);
        assert!(new_b.rating < b.rating);
        assert!(new_a.rd < a.rd);
        assert!(new_b.rd < b.rd);
    }

    #[test]
    fn glicko_expectation_is_even_for_identical_players() {
        let a = GlickoRating::default();
        let b = GlickoRating::default();
        assert!((a.expected(&b) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn trueskill_update_and_quality_behave() {
        let a = TrueSkillRating::default();
        let b = TrueSkillRating::default();
        let fresh_quality = quality_1v1(&a, &b);

        let (winner, loser) = rate_1v1(&a, &b);
        assert!(winner.mu > a.mu);
        assert!(loser.mu < b.mu);
        assert!(winner.sigma < a.sigma);
        assert!(loser.sigma < b.sigma);

        // A lopsided pairing is a worse match than two fresh players.
        let strong = TrueSkillRating { mu: 40.0, sigma: 2.0 };
        let weak = TrueSkillRating { mu: 10.0, sigma: 2.0 };
        assert!(quality_1v1(&strong, &weak) < fresh_quality);
    }

    #[test]
    fn match_key_order_breaks_ties_by_match_id() {
        let mut table = Table::new(vec![
            MATCH_ID_COLUMN.to_string(),
            DATETIME_COLUMN.to_string(),
            "player_A_name".to_string(),
            "player_B_name".to_string(),
            OUTCOME_COLUMN.to_string(),
        ]);
        for (id, dt) in [(1, "2019-01-01T00:00:00"), (0, "2019-01-01T00:00:00")] {
            table
                .push_row(vec![
                    Value::Int(id),
                    Value::Text(dt.to_string()),
                    Value::Text("A".to_string()),
                    Value::Text("B".to_string()),
                    Value::Int(1),
                ])
                .unwrap();
        }
        let keys = match_keys(&table).unwrap();
        assert_eq!(keys[0].match_id, 0);
        assert_eq!(keys[1].match_id, 1);
    }
}

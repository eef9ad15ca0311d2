//! Feature-derivation pipeline for historical tennis matches.
//!
//! Raw match tables are canonicalized, winner/loser roles are anonymized
//! into player A / player B, and per-match features are derived from score
//! strings, running skill ratings (Elo, Glicko-2, TrueSkill) and
//! strictly-causal rolling statistics. The output is a model-ready table
//! with no information from a match's own outcome leaking into its
//! features.

pub mod config;
pub mod error;
pub mod finalize;
pub mod loader;
pub mod persist;
pub mod pipeline;
pub mod randomize;
pub mod ratings;
pub mod rolling;
pub mod score;
pub mod source_parser;
pub mod table;

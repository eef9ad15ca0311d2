use std::collections::HashMap;
use std::path::PathBuf;

use tennis_prep::config::{DatasetType, FileConfig, LoaderType, PipelineConfig};
use tennis_prep::loader::{CsvLoader, DataLoader};
use tennis_prep::randomize::randomize_outcomes;
use tennis_prep::score::add_score_features;
use tennis_prep::source_parser::{SourceParser, TennisMatchParser};
use tennis_prep::table::Table;

fn fixture_path() -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push("matches.csv");
    path
}

fn fixture_config() -> PipelineConfig {
    PipelineConfig {
        loader_type: LoaderType::Csv,
        dataset_type: DatasetType::TennisMatch,
        dataset_path: fixture_path(),
        path: PathBuf::from("unused.csv"),
        required_columns: ["tourney_date", "winner_name", "loser_name", "score"]
            .iter()
            .map(|c| c.to_string())
            .collect(),
        file_config: FileConfig::default(),
        column_mapping: HashMap::new(),
        seed: Some(13),
        use_cache: false,
    }
}

fn canonical_fixture() -> Table {
    let config = fixture_config();
    let raw = CsvLoader::new(&config)
        .process()
        .expect("fixture should load");
    TennisMatchParser::new(&config)
        .parse(raw)
        .expect("fixture should canonicalize")
}

fn text(table: &Table, row: usize, column: &str) -> String {
    table
        .value(row, column)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

#[test]
fn canonicalizes_into_a_total_chronological_order() {
    let table = canonical_fixture();
    assert_eq!(table.len(), 8);

    let datetimes: Vec<String> = (0..table.len())
        .map(|row| text(&table, row, "tourney_datetime"))
        .collect();
    let mut sorted = datetimes.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(datetimes, sorted, "timestamps must be unique and ascending");

    let ids: Vec<i64> = (0..table.len())
        .map(|row| table.value(row, "match_id").unwrap().as_i64().unwrap())
        .collect();
    assert_eq!(ids, (0..8).collect::<Vec<_>>());
}

#[test]
fn same_day_matches_keep_source_order_with_second_offsets() {
    let table = canonical_fixture();
    // Three matches share 20190106; the file lists Carol, Dan and Dan as
    // losers in that order.
    assert_eq!(text(&table, 0, "tourney_datetime"), "2019-01-06T00:00:00");
    assert_eq!(text(&table, 1, "tourney_datetime"), "2019-01-06T00:00:01");
    assert_eq!(text(&table, 2, "tourney_datetime"), "2019-01-06T00:00:02");
    assert_eq!(text(&table, 0, "loser_name"), "Carol White");
    assert_eq!(text(&table, 1, "loser_name"), "Dan Brown");
    assert_eq!(text(&table, 2, "loser_name"), "Dan Brown");
    assert_eq!(text(&table, 3, "tourney_datetime"), "2019-01-07T00:00:00");
}

#[test]
fn randomizer_swaps_attributes_consistently_with_outcome() {
    let mut table = canonical_fixture();
    let originals: Vec<(String, String, i64, i64)> = (0..table.len())
        .map(|row| {
            (
                text(&table, row, "winner_name"),
                text(&table, row, "loser_name"),
                table.value(row, "winner_ht").unwrap().as_i64().unwrap(),
                table.value(row, "loser_ht").unwrap().as_i64().unwrap(),
            )
        })
        .collect();

    let swapped = randomize_outcomes(&mut table, Some(13)).unwrap();
    assert_eq!(swapped, 4);

    for (row, (winner, loser, winner_ht, loser_ht)) in originals.iter().enumerate() {
        let outcome = table.value(row, "outcome").unwrap().as_i64().unwrap();
        let a_name = text(&table, row, "player_A_name");
        let b_name = text(&table, row, "player_B_name");
        let a_ht = table.value(row, "player_A_ht").unwrap().as_i64().unwrap();
        match outcome {
            1 => {
                assert_eq!(&a_name, winner);
                assert_eq!(&b_name, loser);
                assert_eq!(a_ht, *winner_ht);
            }
            0 => {
                assert_eq!(&a_name, loser);
                assert_eq!(&b_name, winner);
                assert_eq!(a_ht, *loser_ht);
            }
            other => panic!("outcome must be 0 or 1, got {other}"),
        }
    }
}

#[test]
fn score_features_follow_the_anonymized_orientation() {
    let mut table = canonical_fixture();
    randomize_outcomes(&mut table, Some(13)).unwrap();
    add_score_features(&mut table).unwrap();

    for row in 0..table.len() {
        if table.value(row, "is_walkover").unwrap().as_i64() == Some(1) {
            continue;
        }
        let outcome = table.value(row, "outcome").unwrap().as_i64().unwrap();
        let sets_a = table.value(row, "sets_A").unwrap().as_i64().unwrap();
        let sets_b = table.value(row, "sets_B").unwrap().as_i64().unwrap();
        if outcome == 1 {
            assert!(sets_a > sets_b, "row {row}: winner-as-A must lead sets");
        } else {
            assert!(sets_b > sets_a, "row {row}: winner-as-B must lead sets");
        }
    }
}

#[test]
fn walkover_rows_carry_null_score_features() {
    let mut table = canonical_fixture();
    randomize_outcomes(&mut table, Some(13)).unwrap();
    add_score_features(&mut table).unwrap();

    let walkover_row = (0..table.len())
        .find(|&row| text(&table, row, "score") == "W/O")
        .expect("fixture has a walkover");
    assert_eq!(
        table.value(walkover_row, "is_walkover").unwrap().as_i64(),
        Some(1)
    );
    for column in ["sets_A", "sets_B", "games_A", "games_B", "pct_games_A"] {
        assert!(
            table.value(walkover_row, column).unwrap().is_null(),
            "{column} must be null on a walkover"
        );
    }
}

#[test]
fn tiebreak_counts_survive_inversion() {
    let mut table = canonical_fixture();
    randomize_outcomes(&mut table, Some(13)).unwrap();
    add_score_features(&mut table).unwrap();

    // match_id 0 is Alice d. Carol 6-3 6-7(5) 7-5: one tiebreak either way.
    let row = (0..table.len())
        .find(|&row| table.value(row, "match_id").unwrap().as_i64() == Some(0))
        .unwrap();
    assert_eq!(table.value(row, "n_tiebreaks").unwrap().as_i64(), Some(1));

    // match_id 7 is Dan d. Carol 6-4 3-6 7-6(10): 32 games total either way.
    let row = (0..table.len())
        .find(|&row| table.value(row, "match_id").unwrap().as_i64() == Some(7))
        .unwrap();
    assert_eq!(table.value(row, "n_tiebreaks").unwrap().as_i64(), Some(1));
    let games_a = table.value(row, "games_A").unwrap().as_i64().unwrap();
    let games_b = table.value(row, "games_B").unwrap().as_i64().unwrap();
    assert_eq!(games_a + games_b, 32);
}

use std::collections::HashMap;

use chrono::{Duration, NaiveDate, NaiveTime};
use log::info;
use once_cell::sync::Lazy;

use crate::config::{DatasetType, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::table::{Table, Value};

const DATE_COLUMN: &str = "tourney_date";
pub const DATETIME_COLUMN: &str = "tourney_datetime";
pub const MATCH_ID_COLUMN: &str = "match_id";
pub const OUTCOME_COLUMN: &str = "outcome";

pub trait SourceParser {
    fn parse(&self, table: Table) -> Result<Table>;
}

type ParserFactory = fn(&PipelineConfig) -> Box<dyn SourceParser>;

static PARSERS: Lazy<HashMap<DatasetType, ParserFactory>> = Lazy::new(|| {
    let mut registry: HashMap<DatasetType, ParserFactory> = HashMap::new();
    registry.insert(DatasetType::TennisMatch, |config| {
        Box::new(TennisMatchParser::new(config))
    });
    registry
});

pub fn parser_from_config(config: &PipelineConfig) -> Result<Box<dyn SourceParser>> {
    let factory = PARSERS.get(&config.dataset_type).ok_or_else(|| {
        PipelineError::Config(format!(
            "no parser registered for dataset type: {}",
            config.dataset_type.as_str()
        ))
    })?;
    Ok(factory(config))
}

/// Canonicalizer for raw tennis match tables: renames source columns, turns
/// the 8-digit tourney date into a strictly unique timestamp, sorts
/// chronologically and assigns dense match ids.
pub struct TennisMatchParser {
    column_mapping: HashMap<String, String>,
    required_columns: Vec<String>,
}

impl TennisMatchParser {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            column_mapping: config.column_mapping.clone(),
            required_columns: config.required_columns.clone(),
        }
    }

    fn validate(&self, table: &Table) -> Result<()> {
        if table.is_empty() {
            return Err(PipelineError::Validation(
                "no rows to canonicalize".to_string(),
            ));
        }
        for column in &self.required_columns {
            if table.col(column).is_none() {
                return Err(PipelineError::Validation(format!(
                    "missing required column: {column}"
                )));
            }
        }
        Ok(())
    }

    /// Replace `tourney_date` with a strictly unique `tourney_datetime`:
    /// matches sharing a date get incrementing second offsets in original row
    /// order, so same-day matches stay totally ordered and order-preserving.
    fn process_date_column(&self, table: &mut Table) -> Result<()> {
        let date_col = table.col(DATE_COLUMN).ok_or_else(|| {
            PipelineError::DataFormat(format!("missing date column: {DATE_COLUMN}"))
        })?;

        let mut per_date: HashMap<NaiveDate, i64> = HashMap::new();
        let mut datetimes = Vec::with_capacity(table.len());
        for row in table.rows() {
            let date = parse_yyyymmdd(&row[date_col])?;
            let offset = per_date.entry(date).or_insert(0);
            let datetime = date
                .and_time(NaiveTime::default())
                .checked_add_signed(Duration::seconds(*offset))
                .ok_or_else(|| {
                    PipelineError::DataFormat(format!("date out of range: {date}"))
                })?;
            *offset += 1;
            datetimes.push(Value::Text(
                datetime.format("%Y-%m-%dT%H:%M:%S").to_string(),
            ));
        }

        table.add_column(DATETIME_COLUMN, datetimes)?;
        table.drop_columns(&[DATE_COLUMN]);
        Ok(())
    }
}

/// 8-digit YYYYMMDD, stored as integer or text depending on the source file.
fn parse_yyyymmdd(value: &Value) -> Result<NaiveDate> {
    let raw = match value {
        Value::Int(v) => v.to_string(),
        Value::Text(v) => v.trim().to_string(),
        other => {
            return Err(PipelineError::DataFormat(format!(
                "unparseable date value: {other:?}"
            )));
        }
    };
    NaiveDate::parse_from_str(&raw, "%Y%m%d")
        .map_err(|_| PipelineError::DataFormat(format!("unparseable date: {raw}")))
}

impl SourceParser for TennisMatchParser {
    fn parse(&self, mut table: Table) -> Result<Table> {
        self.validate(&table)?;

        if !self.column_mapping.is_empty() {
            table.rename_columns(&self.column_mapping);
        }

        // Every row starts as winner-first; the randomizer flips half later.
        table.add_column(OUTCOME_COLUMN, vec![Value::Int(1); table.len()])?;

        self.process_date_column(&mut table)?;

        let datetime_col = table.require_col(DATETIME_COLUMN)?;
        table.sort_rows_by(|a, b| {
            // ISO text orders chronologically; offsets already make it unique.
            a[datetime_col]
                .as_str()
                .cmp(&b[datetime_col].as_str())
        });

        let ids = (0..table.len() as i64).map(Value::Int).collect();
        table.add_column(MATCH_ID_COLUMN, ids)?;

        info!("canonicalized {} matches", table.len());
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FileConfig, LoaderType};

    fn parser(mapping: &[(&str, &str)]) -> TennisMatchParser {
        let config = PipelineConfig {
            loader_type: LoaderType::Csv,
            dataset_type: DatasetType::TennisMatch,
            dataset_path: "data".into(),
            path: "out.csv".into(),
            required_columns: Vec::new(),
            file_config: FileConfig::default(),
            column_mapping: mapping
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
            seed: None,
            use_cache: false,
        };
        TennisMatchParser::new(&config)
    }

    fn raw_table(dates: &[i64]) -> Table {
        let mut table = Table::new(vec!["tourney_date".to_string(), "winner_name".to_string()]);
        for (idx, date) in dates.iter().enumerate() {
            table
                .push_row(vec![Value::Int(*date), Value::Text(format!("p{idx}"))])
                .unwrap();
        }
        table
    }

    #[test]
    fn same_day_matches_get_distinct_order_preserving_timestamps() {
        let parsed = parser(&[]).parse(raw_table(&[20190106, 20190106, 20190105])).unwrap();
        let times: Vec<&str> = (0..parsed.len())
            .map(|i| parsed.value(i, DATETIME_COLUMN).unwrap().as_str().unwrap())
            .collect();
        assert_eq!(times[0], "2019-01-05T00:00:00");
        assert_eq!(times[1], "2019-01-06T00:00:00");
        assert_eq!(times[2], "2019-01-06T00:00:01");
        // Original row order within the duplicated day is preserved.
        assert_eq!(
            parsed.value(1, "winner_name").unwrap().as_str(),
            Some("p0")
        );
        assert_eq!(
            parsed.value(2, "winner_name").unwrap().as_str(),
            Some("p1")
        );
    }

    #[test]
    fn match_ids_are_dense_after_sorting() {
        let parsed = parser(&[]).parse(raw_table(&[20200101, 20190101, 20190601])).unwrap();
        let ids: Vec<i64> = (0..parsed.len())
            .map(|i| parsed.value(i, MATCH_ID_COLUMN).unwrap().as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(
            parsed.value(0, DATETIME_COLUMN).unwrap().as_str(),
            Some("2019-01-01T00:00:00")
        );
    }

    #[test]
    fn column_mapping_applies_before_date_processing() {
        let mut table = Table::new(vec!["date_legacy".to_string()]);
        table.push_row(vec![Value::Int(20180315)]).unwrap();
        let parsed = parser(&[("date_legacy", "tourney_date")]).parse(table).unwrap();
        assert!(parsed.col(DATETIME_COLUMN).is_some());
        assert!(parsed.col("date_legacy").is_none());
    }

    #[test]
    fn missing_date_column_is_data_format_error() {
        let mut table = Table::new(vec!["winner_name".to_string()]);
        table.push_row(vec![Value::Text("a".into())]).unwrap();
        assert!(matches!(
            parser(&[]).parse(table),
            Err(PipelineError::DataFormat(_))
        ));
    }

    #[test]
    fn bad_date_aborts_canonicalization() {
        let mut table = Table::new(vec!["tourney_date".to_string()]);
        table.push_row(vec![Value::Text("2019-01-06".into())]).unwrap();
        assert!(matches!(
            parser(&[]).parse(table),
            Err(PipelineError::DataFormat(_))
        ));
    }

    #[test]
    fn outcome_starts_at_one() {
        let parsed = parser(&[]).parse(raw_table(&[20190106])).unwrap();
        assert_eq!(
            parsed.value(0, OUTCOME_COLUMN).unwrap().as_i64(),
            Some(1)
        );
    }
}

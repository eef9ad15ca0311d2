use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use once_cell::sync::Lazy;
use parquet::basic::Compression;
use parquet::data_type::{ByteArray, ByteArrayType, DoubleType, Int64Type};
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::file::writer::SerializedFileWriter;
use parquet::record::Field;
use parquet::schema::parser::parse_message_type;
use rusqlite::Connection;
use rusqlite::types::ValueRef;

use crate::config::{FileConfig, LoaderType, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::table::{Table, Value};

/// Table read from in sqlite datasets, and written to on sqlite save.
const SQLITE_SOURCE_TABLE: &str = "matches";
const SQLITE_OUTPUT_TABLE: &str = "features";

pub trait DataLoader {
    fn load(&self) -> Result<Table>;
    fn save(&self, table: &Table, path: &Path) -> Result<()>;
    fn required_columns(&self) -> &[String];

    fn validate(&self, table: &Table) -> Result<()> {
        if table.is_empty() {
            return Err(PipelineError::Validation("dataset is empty".to_string()));
        }
        for column in self.required_columns() {
            if table.col(column).is_none() {
                return Err(PipelineError::Validation(format!(
                    "missing required column: {column}"
                )));
            }
        }
        Ok(())
    }

    fn process(&self) -> Result<Table> {
        let table = self.load()?;
        self.validate(&table)?;
        Ok(table)
    }
}

type LoaderFactory = fn(&PipelineConfig) -> Box<dyn DataLoader>;

static LOADERS: Lazy<HashMap<LoaderType, LoaderFactory>> = Lazy::new(|| {
    let mut registry: HashMap<LoaderType, LoaderFactory> = HashMap::new();
    registry.insert(LoaderType::Csv, |config| Box::new(CsvLoader::new(config)));
    registry.insert(LoaderType::Parquet, |config| {
        Box::new(ParquetLoader::new(config))
    });
    registry.insert(LoaderType::Sqlite, |config| {
        Box::new(SqliteLoader::new(config))
    });
    registry
});

pub fn loader_from_config(config: &PipelineConfig) -> Result<Box<dyn DataLoader>> {
    let factory = LOADERS.get(&config.loader_type).ok_or_else(|| {
        PipelineError::Config(format!(
            "no loader registered for type: {}",
            config.loader_type.as_str()
        ))
    })?;
    Ok(factory(config))
}

/// Collect data files under `path`: the file itself, or every file with the
/// given extension below a directory, sorted for a stable concatenation order.
fn collect_files(path: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        return Err(PipelineError::Config(format!(
            "dataset path not found: {}",
            path.display()
        )));
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files = Vec::new();
    let mut pending = vec![path.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry_path = entry?.path();
            if entry_path.is_dir() {
                pending.push(entry_path);
            } else if entry_path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
            {
                files.push(entry_path);
            }
        }
    }
    files.sort();
    if files.is_empty() {
        return Err(PipelineError::Validation(format!(
            "no .{extension} files under {}",
            path.display()
        )));
    }
    Ok(files)
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

pub struct CsvLoader {
    dataset_path: PathBuf,
    file_config: FileConfig,
    required_columns: Vec<String>,
}

impl CsvLoader {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            dataset_path: config.dataset_path.clone(),
            file_config: config.file_config.clone(),
            required_columns: config.required_columns.clone(),
        }
    }

    fn delimiter(&self) -> Result<u8> {
        if !self.file_config.delimiter.is_ascii() {
            return Err(PipelineError::Config(format!(
                "non-ascii csv delimiter: {:?}",
                self.file_config.delimiter
            )));
        }
        Ok(self.file_config.delimiter as u8)
    }

    fn read_file(&self, path: &Path) -> Result<Table> {
        let has_header = self.file_config.header.is_none();
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter()?)
            .has_headers(has_header)
            .flexible(false)
            .from_path(path)?;

        let columns: Vec<String> = match &self.file_config.header {
            Some(names) => names.clone(),
            None => reader.headers()?.iter().map(|h| h.to_string()).collect(),
        };

        let mut table = Table::new(columns);
        for record in reader.records() {
            let record = record?;
            let row = record.iter().map(Value::from_raw).collect();
            table.push_row(row)?;
        }
        debug!("csv {}: {} rows", path.display(), table.len());
        Ok(table)
    }
}

impl DataLoader for CsvLoader {
    fn load(&self) -> Result<Table> {
        let mut table = Table::default();
        for file in collect_files(&self.dataset_path, "csv")? {
            table.append(self.read_file(&file)?)?;
        }
        Ok(table)
    }

    fn save(&self, table: &Table, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).ok();
        }
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter()?)
            .from_path(path)?;
        writer.write_record(table.columns())?;
        for row in table.rows() {
            writer.write_record(row.iter().map(|v| v.render()))?;
        }
        writer.flush()?;
        Ok(())
    }

    fn required_columns(&self) -> &[String] {
        &self.required_columns
    }
}

// ---------------------------------------------------------------------------
// Parquet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Int,
    Float,
    Text,
}

/// Pick the physical type for a column from its values. Mixed int/float
/// widens to float; anything textual forces UTF8.
fn infer_column_kind(table: &Table, col: usize) -> ColumnKind {
    let mut kind = None;
    for row in table.rows() {
        let observed = match &row[col] {
            Value::Null => continue,
            Value::Int(_) => ColumnKind::Int,
            Value::Float(_) => ColumnKind::Float,
            Value::Text(_) => ColumnKind::Text,
        };
        kind = Some(match (kind, observed) {
            (None, obs) => obs,
            (Some(ColumnKind::Text), _) | (_, ColumnKind::Text) => ColumnKind::Text,
            (Some(ColumnKind::Float), _) | (_, ColumnKind::Float) => ColumnKind::Float,
            (Some(ColumnKind::Int), ColumnKind::Int) => ColumnKind::Int,
        });
        if kind == Some(ColumnKind::Text) {
            break;
        }
    }
    kind.unwrap_or(ColumnKind::Float)
}

pub struct ParquetLoader {
    dataset_path: PathBuf,
    required_columns: Vec<String>,
}

impl ParquetLoader {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            dataset_path: config.dataset_path.clone(),
            required_columns: config.required_columns.clone(),
        }
    }

    fn read_file(&self, path: &Path) -> Result<Table> {
        let file = fs::File::open(path)?;
        let reader = SerializedFileReader::new(file)?;
        let columns: Vec<String> = reader
            .metadata()
            .file_metadata()
            .schema_descr()
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let mut table = Table::new(columns);
        for row in reader.get_row_iter(None)? {
            let row = row?;
            let values: Vec<Value> = row
                .get_column_iter()
                .map(|(_, field)| field_to_value(field))
                .collect();
            table.push_row(values)?;
        }
        debug!("parquet {}: {} rows", path.display(), table.len());
        Ok(table)
    }
}

fn field_to_value(field: &Field) -> Value {
    match field {
        Field::Null => Value::Null,
        Field::Bool(v) => Value::Int(i64::from(*v)),
        Field::Byte(v) => Value::Int(i64::from(*v)),
        Field::Short(v) => Value::Int(i64::from(*v)),
        Field::Int(v) => Value::Int(i64::from(*v)),
        Field::Long(v) => Value::Int(*v),
        Field::UByte(v) => Value::Int(i64::from(*v)),
        Field::UShort(v) => Value::Int(i64::from(*v)),
        Field::UInt(v) => Value::Int(i64::from(*v)),
        Field::ULong(v) => Value::Int(*v as i64),
        Field::Float(v) => Value::Float(f64::from(*v)),
        Field::Double(v) => Value::Float(*v),
        Field::Str(v) => Value::Text(v.clone()),
        other => Value::Text(other.to_string()),
    }
}

impl DataLoader for ParquetLoader {
    fn load(&self) -> Result<Table> {
        let mut table = Table::default();
        for file in collect_files(&self.dataset_path, "parquet")? {
            table.append(self.read_file(&file)?)?;
        }
        Ok(table)
    }

    fn save(&self, table: &Table, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).ok();
        }

        let kinds: Vec<ColumnKind> = (0..table.columns().len())
            .map(|col| infer_column_kind(table, col))
            .collect();

        let mut message = String::from("message features {\n");
        for (name, kind) in table.columns().iter().zip(&kinds) {
            let field = match kind {
                ColumnKind::Int => format!("  optional int64 {name};\n"),
                ColumnKind::Float => format!("  optional double {name};\n"),
                ColumnKind::Text => format!("  optional binary {name} (UTF8);\n"),
            };
            message.push_str(&field);
        }
        message.push('}');
        let schema = Arc::new(parse_message_type(&message)?);

        let props = Arc::new(
            WriterProperties::builder()
                .set_compression(Compression::UNCOMPRESSED)
                .build(),
        );
        let file = fs::File::create(path)?;
        let mut writer = SerializedFileWriter::new(file, schema, props)?;
        let mut row_group = writer.next_row_group()?;

        let mut col = 0;
        while let Some(mut col_writer) = row_group.next_column()? {
            let def_levels: Vec<i16> = table
                .rows()
                .map(|row| i16::from(!row[col].is_null()))
                .collect();
            match kinds[col] {
                ColumnKind::Int => {
                    let values: Vec<i64> = table
                        .rows()
                        .filter_map(|row| row[col].as_i64())
                        .collect();
                    col_writer
                        .typed::<Int64Type>()
                        .write_batch(&values, Some(&def_levels), None)?;
                }
                ColumnKind::Float => {
                    let values: Vec<f64> = table
                        .rows()
                        .filter_map(|row| row[col].as_f64())
                        .collect();
                    col_writer
                        .typed::<DoubleType>()
                        .write_batch(&values, Some(&def_levels), None)?;
                }
                ColumnKind::Text => {
                    let values: Vec<ByteArray> = table
                        .rows()
                        .filter(|row| !row[col].is_null())
                        .map(|row| ByteArray::from(row[col].render().into_bytes()))
                        .collect();
                    col_writer
                        .typed::<ByteArrayType>()
                        .write_batch(&values, Some(&def_levels), None)?;
                }
            }
            col_writer.close()?;
            col += 1;
        }
        row_group.close()?;
        writer.close()?;
        Ok(())
    }

    fn required_columns(&self) -> &[String] {
        &self.required_columns
    }
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

pub struct SqliteLoader {
    dataset_path: PathBuf,
    required_columns: Vec<String>,
}

impl SqliteLoader {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            dataset_path: config.dataset_path.clone(),
            required_columns: config.required_columns.clone(),
        }
    }
}

impl DataLoader for SqliteLoader {
    fn load(&self) -> Result<Table> {
        if !self.dataset_path.exists() {
            return Err(PipelineError::Config(format!(
                "dataset path not found: {}",
                self.dataset_path.display()
            )));
        }
        let conn = Connection::open(&self.dataset_path)?;
        let mut stmt = conn.prepare(&format!("SELECT * FROM {SQLITE_SOURCE_TABLE}"))?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();

        let mut table = Table::new(columns);
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                values.push(match row.get_ref(idx)? {
                    ValueRef::Null => Value::Null,
                    ValueRef::Integer(v) => Value::Int(v),
                    ValueRef::Real(v) => Value::Float(v),
                    ValueRef::Text(v) => Value::Text(String::from_utf8_lossy(v).into_owned()),
                    ValueRef::Blob(_) => Value::Null,
                });
            }
            table.push_row(values)?;
        }
        debug!(
            "sqlite {}: {} rows",
            self.dataset_path.display(),
            table.len()
        );
        Ok(table)
    }

    fn save(&self, table: &Table, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).ok();
        }
        let mut conn = Connection::open(path)?;

        let kinds: Vec<ColumnKind> = (0..table.columns().len())
            .map(|col| infer_column_kind(table, col))
            .collect();
        let column_defs = table
            .columns()
            .iter()
            .zip(&kinds)
            .map(|(name, kind)| {
                let sql_type = match kind {
                    ColumnKind::Int => "INTEGER",
                    ColumnKind::Float => "REAL",
                    ColumnKind::Text => "TEXT",
                };
                format!("\"{name}\" {sql_type}")
            })
            .collect::<Vec<_>>()
            .join(", ");

        conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {SQLITE_OUTPUT_TABLE};\n\
             CREATE TABLE {SQLITE_OUTPUT_TABLE} ({column_defs});"
        ))?;

        let placeholders = (1..=table.columns().len())
            .map(|idx| format!("?{idx}"))
            .collect::<Vec<_>>()
            .join(", ");
        let insert = format!("INSERT INTO {SQLITE_OUTPUT_TABLE} VALUES ({placeholders})");

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&insert)?;
            for row in table.rows() {
                let params = row.iter().map(|value| match value {
                    Value::Null => rusqlite::types::Value::Null,
                    Value::Int(v) => rusqlite::types::Value::Integer(*v),
                    Value::Float(v) => rusqlite::types::Value::Real(*v),
                    Value::Text(v) => rusqlite::types::Value::Text(v.clone()),
                });
                stmt.execute(rusqlite::params_from_iter(params))?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn required_columns(&self) -> &[String] {
        &self.required_columns
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::DatasetType;

    fn config(loader_type: LoaderType, dataset: &Path, required: &[&str]) -> PipelineConfig {
        PipelineConfig {
            loader_type,
            dataset_type: DatasetType::TennisMatch,
            dataset_path: dataset.to_path_buf(),
            path: dataset.join("out.csv"),
            required_columns: required.iter().map(|c| c.to_string()).collect(),
            file_config: FileConfig::default(),
            column_mapping: HashMap::new(),
            seed: Some(7),
            use_cache: false,
        }
    }

    #[test]
    fn csv_round_trip_concatenates_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.csv"), "x,y\n1,Hard\n2,Clay\n").unwrap();
        std::fs::write(dir.path().join("b.csv"), "x,y\n3,\n").unwrap();

        let loader = CsvLoader::new(&config(LoaderType::Csv, dir.path(), &["x", "y"]));
        let table = loader.process().unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.value(0, "x"), Some(&Value::Int(1)));
        assert_eq!(table.value(2, "y"), Some(&Value::Null));

        let out = dir.path().join("round.csv");
        loader.save(&table, &out).unwrap();
        let single = CsvLoader::new(&config(LoaderType::Csv, &out, &[]));
        let reloaded = single.load().unwrap();
        assert_eq!(reloaded.len(), 3);
        assert_eq!(reloaded.value(1, "y"), Some(&Value::Text("Clay".into())));
    }

    #[test]
    fn validation_rejects_missing_required_column() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.csv"), "x\n1\n").unwrap();
        let loader = CsvLoader::new(&config(LoaderType::Csv, dir.path(), &["x", "score"]));
        assert!(matches!(
            loader.process(),
            Err(PipelineError::Validation(_))
        ));
    }

    #[test]
    fn validation_rejects_empty_dataset() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.csv"), "x,y\n").unwrap();
        let loader = CsvLoader::new(&config(LoaderType::Csv, dir.path(), &[]));
        assert!(matches!(
            loader.process(),
            Err(PipelineError::Validation(_))
        ));
    }

    #[test]
    fn sqlite_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("data.sqlite");
        let conn = Connection::open(&db).unwrap();
        conn.execute_batch(
            "CREATE TABLE matches (name TEXT, rank INTEGER, age REAL);\n\
             INSERT INTO matches VALUES ('Alice', 3, 24.5);\n\
             INSERT INTO matches VALUES ('Bob', NULL, 31.0);",
        )
        .unwrap();
        drop(conn);

        let loader = SqliteLoader::new(&config(LoaderType::Sqlite, &db, &["name"]));
        let table = loader.process().unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.value(1, "rank"), Some(&Value::Null));

        let out = dir.path().join("out.sqlite");
        loader.save(&table, &out).unwrap();
        let conn = Connection::open(&out).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM features", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn parquet_round_trip_preserves_types_and_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = Table::new(vec![
            "rank".to_string(),
            "age".to_string(),
            "name".to_string(),
        ]);
        table
            .push_row(vec![
                Value::Int(3),
                Value::Float(24.5),
                Value::Text("Alice".to_string()),
            ])
            .unwrap();
        table
            .push_row(vec![Value::Null, Value::Float(31.0), Value::Null])
            .unwrap();

        let out = dir.path().join("out.parquet");
        let loader = ParquetLoader::new(&config(LoaderType::Parquet, dir.path(), &[]));
        loader.save(&table, &out).unwrap();

        let reloaded = ParquetLoader::new(&config(LoaderType::Parquet, &out, &[]))
            .load()
            .unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.value(0, "rank"), Some(&Value::Int(3)));
        assert_eq!(reloaded.value(0, "name"), Some(&Value::Text("Alice".into())));
        assert_eq!(reloaded.value(1, "rank"), Some(&Value::Null));
        assert_eq!(reloaded.value(1, "age"), Some(&Value::Float(31.0)));
    }

    #[test]
    fn unknown_path_is_config_error() {
        let loader = CsvLoader::new(&config(
            LoaderType::Csv,
            Path::new("/nonexistent/tennis"),
            &[],
        ));
        assert!(matches!(loader.load(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn registry_resolves_all_known_tags() {
        let dir = tempfile::tempdir().unwrap();
        for loader_type in [LoaderType::Csv, LoaderType::Parquet, LoaderType::Sqlite] {
            assert!(loader_from_config(&config(loader_type, dir.path(), &[])).is_ok());
        }
    }
}

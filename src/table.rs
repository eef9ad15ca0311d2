use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// A single cell. Numeric columns may still carry `Null` holes (missing serve
/// stats, unparseable scores), so nullability lives in the value itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Infer the narrowest type for a raw text field. Empty fields are Null.
    pub fn from_raw(raw: &str) -> Value {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        if let Ok(v) = trimmed.parse::<i64>() {
            return Value::Int(v);
        }
        if let Ok(v) = trimmed.parse::<f64>() {
            return Value::Float(v);
        }
        Value::Text(trimmed.to_string())
    }

    /// Text form for file output. Null renders as an empty field.
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Int(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Text(v) => v.clone(),
        }
    }

    /// Grouping key for categorical columns: ints and text both occur in raw
    /// data (`best_of` is 3/5, `surface` is "Hard"/"Clay").
    pub fn category_key(&self) -> Option<String> {
        match self {
            Value::Null => None,
            other => Some(other.render()),
        }
    }
}

/// Column-named row store shared by every pipeline stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn col(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn require_col(&self, name: &str) -> Result<usize> {
        self.col(name)
            .ok_or_else(|| PipelineError::Validation(format!("missing column: {name}")))
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(PipelineError::DataFormat(format!(
                "row width {} does not match {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn row(&self, idx: usize) -> &[Value] {
        &self.rows[idx]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Value]> {
        self.rows.iter().map(|r| r.as_slice())
    }

    pub fn get(&self, row: usize, col: usize) -> &Value {
        &self.rows[row][col]
    }

    pub fn value(&self, row: usize, name: &str) -> Option<&Value> {
        self.col(name).map(|idx| &self.rows[row][idx])
    }

    pub fn set(&mut self, row: usize, col: usize, value: Value) {
        self.rows[row][col] = value;
    }

    pub fn swap_values(&mut self, row: usize, col_a: usize, col_b: usize) {
        self.rows[row].swap(col_a, col_b);
    }

    pub fn add_column(&mut self, name: &str, values: Vec<Value>) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(PipelineError::DataFormat(format!(
                "column {name} has {} values for {} rows",
                values.len(),
                self.rows.len()
            )));
        }
        if self.col(name).is_some() {
            return Err(PipelineError::DataFormat(format!(
                "column already exists: {name}"
            )));
        }
        self.columns.push(name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }

    /// Drop the named columns. Names not present are ignored.
    pub fn drop_columns(&mut self, names: &[&str]) {
        let keep: Vec<usize> = (0..self.columns.len())
            .filter(|idx| !names.contains(&self.columns[*idx].as_str()))
            .collect();
        if keep.len() == self.columns.len() {
            return;
        }
        self.columns = keep.iter().map(|&i| self.columns[i].clone()).collect();
        for row in &mut self.rows {
            *row = keep.iter().map(|&i| row[i].clone()).collect();
        }
    }

    pub fn rename_columns(&mut self, mapping: &HashMap<String, String>) {
        for column in &mut self.columns {
            if let Some(new_name) = mapping.get(column) {
                *column = new_name.clone();
            }
        }
    }

    /// Rename every column through `f`; `None` keeps the current name.
    pub fn rename_columns_with(&mut self, f: impl Fn(&str) -> Option<String>) {
        for column in &mut self.columns {
            if let Some(new_name) = f(column) {
                *column = new_name;
            }
        }
    }

    pub fn sort_rows_by(&mut self, cmp: impl Fn(&[Value], &[Value]) -> Ordering) {
        self.rows.sort_by(|a, b| cmp(a.as_slice(), b.as_slice()));
    }

    /// Append another table's rows. Columns must match exactly; raw source
    /// files of one dataset share a header.
    pub fn append(&mut self, other: Table) -> Result<()> {
        if self.columns.is_empty() && self.rows.is_empty() {
            *self = other;
            return Ok(());
        }
        if self.columns != other.columns {
            return Err(PipelineError::DataFormat(
                "cannot concatenate tables with different columns".to_string(),
            ));
        }
        self.rows.extend(other.rows);
        Ok(())
    }
}

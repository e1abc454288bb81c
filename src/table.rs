use crate::error::ParseError;
use serde::Serialize;
use std::collections::HashSet;

/// Semantic type inferred for a column of an uploaded file
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Every non-empty value parses as a finite number (an all-blank column counts)
    Numeric,

    /// Anything else
    Text,
}

/// Typed in-memory table built from an uploaded CSV file
///
/// Column names are unique and their order is the rendering order used by
/// previews, the PDF table and the CSV export. Every row has exactly one
/// value per column. The model is immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TabularModel {
    columns: Vec<String>,
    types: Vec<ColumnType>,
    rows: Vec<Vec<String>>,
}

/// First rows of a model, shaped for the dashboard preview
#[derive(Debug, Serialize)]
pub struct Preview {
    pub columns: Vec<String>,
    pub types: Vec<ColumnType>,
    pub rows: Vec<Vec<String>>,
    pub total_rows: usize,
}

impl TabularModel {
    /// Build a model from a header and rows, inferring column types
    ///
    /// # Arguments
    /// * `columns` - Column names, in display order
    /// * `rows` - Data rows, each aligned to `columns`
    ///
    /// # Returns
    /// * `Result<TabularModel, ParseError>` - The model, or the first violated constraint
    ///
    /// # Errors
    /// * `ParseError::BlankColumn` / `ParseError::DuplicateColumn` for bad headers
    /// * `ParseError::RowWidth` when a row does not match the header width
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, ParseError> {
        let mut seen = HashSet::new();
        for (index, name) in columns.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(ParseError::BlankColumn { index });
            }
            if !seen.insert(name.as_str()) {
                return Err(ParseError::DuplicateColumn(name.clone()));
            }
        }

        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(ParseError::RowWidth {
                    // 1-based, counting the header as line 1
                    row: i + 2,
                    expected: columns.len(),
                    found: row.len(),
                });
            }
        }

        let types = (0..columns.len())
            .map(|c| infer_type(rows.iter().map(|row| row[c].as_str())))
            .collect();

        Ok(Self {
            columns,
            types,
            rows,
        })
    }

    /// Parse uploaded CSV bytes
    ///
    /// The first record is the header. Rows whose width differs from the
    /// header are rejected rather than padded or truncated.
    ///
    /// # Examples
    /// ```
    /// use report_dashboard::table::{ColumnType, TabularModel};
    ///
    /// let model = TabularModel::ingest(b"name,score\nA,10\nB,20\n").unwrap();
    /// assert_eq!(model.columns(), &["name".to_string(), "score".to_string()]);
    /// assert_eq!(model.column_type(1), Some(ColumnType::Numeric));
    /// ```
    pub fn ingest(raw: &[u8]) -> Result<Self, ParseError> {
        // The csv reader would fold an open quote into one long last field
        check_quotes(raw)?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(raw);

        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| ParseError::Malformed(e.to_string()))?
            .iter()
            .map(str::to_string)
            .collect();

        if columns.is_empty() {
            return Err(ParseError::Empty);
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| ParseError::Malformed(e.to_string()))?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Self::new(columns, rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_types(&self) -> &[ColumnType] {
        &self.types
    }

    pub fn column_type(&self, col: usize) -> Option<ColumnType> {
        self.types.get(col).copied()
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Indices of numeric columns, in column order
    pub fn numeric_columns(&self) -> Vec<usize> {
        self.indices_of(ColumnType::Numeric)
    }

    /// Indices of text columns, in column order
    pub fn text_columns(&self) -> Vec<usize> {
        self.indices_of(ColumnType::Text)
    }

    fn indices_of(&self, wanted: ColumnType) -> Vec<usize> {
        self.types
            .iter()
            .enumerate()
            .filter(|(_, t)| **t == wanted)
            .map(|(i, _)| i)
            .collect()
    }

    /// Numeric value of a cell, `None` for blank or non-numeric cells
    pub fn numeric_value(&self, row: usize, col: usize) -> Option<f64> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .and_then(|v| parse_number(v))
    }

    /// First `limit` rows for display
    pub fn preview(&self, limit: usize) -> Preview {
        Preview {
            columns: self.columns.clone(),
            types: self.types.clone(),
            rows: self.rows.iter().take(limit).cloned().collect(),
            total_rows: self.rows.len(),
        }
    }

    /// Export the data back to CSV
    ///
    /// This is a straight passthrough: header row followed by every data row,
    /// with quoting applied only where a value needs it.
    ///
    /// # Returns
    /// * `std::io::Result<String>` - CSV content as a string or an error
    pub fn to_csv(&self) -> std::io::Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }

        let bytes = writer.into_inner().map_err(|e| e.into_error())?;
        String::from_utf8(bytes)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum QuoteState {
    FieldStart,
    Unquoted,
    Quoted,
    // Just saw a quote inside a quoted field: either an escape or the close
    QuoteInQuoted,
}

/// Reject input that ends inside a quoted field
///
/// A quote only opens a field when it is the field's first byte; anywhere
/// else it is literal (`55" screen`). Inside a quoted field `""` is an
/// escaped quote.
fn check_quotes(raw: &[u8]) -> Result<(), ParseError> {
    let mut state = QuoteState::FieldStart;
    let mut line = 1;
    let mut opened_on = 1;

    for &byte in raw {
        state = match (state, byte) {
            (QuoteState::Quoted, b'"') => QuoteState::QuoteInQuoted,
            (QuoteState::Quoted, _) => QuoteState::Quoted,
            (QuoteState::QuoteInQuoted, b'"') => QuoteState::Quoted,
            (QuoteState::FieldStart, b'"') => {
                opened_on = line;
                QuoteState::Quoted
            }
            (_, b',' | b'\n' | b'\r') => QuoteState::FieldStart,
            _ => QuoteState::Unquoted,
        };
        if byte == b'\n' {
            line += 1;
        }
    }

    if state == QuoteState::Quoted {
        return Err(ParseError::UnterminatedQuote { line: opened_on });
    }
    Ok(())
}

fn parse_number(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}

// A column with no values at all is numeric: it plots as zeros.
fn infer_type<'a>(mut values: impl Iterator<Item = &'a str>) -> ColumnType {
    let all_numeric = values.all(|value| value.trim().is_empty() || parse_number(value).is_some());
    if all_numeric {
        ColumnType::Numeric
    } else {
        ColumnType::Text
    }
}

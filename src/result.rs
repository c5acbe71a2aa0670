//! Result sets.
//!
//! Every successful `execute`/`query` yields a [`ResultSet`], whether the
//! statement produced rows or not. Statements without a result set (DML, DDL)
//! come back with an empty row list and `rows_affected` filled in, result
//! sets are fully materialized before the call returns (buffered-query
//! behavior, nothing is streamed to the caller).

use serde::Serialize;
use serde_json::Value as JsonValue;

/// How `query` shapes the rows it returns.
///
/// The recognized modes are enumerated here; there is no open-ended
/// fetch-style argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// One map per row, keyed by column name.
    #[default]
    Rows,
    /// Each row reduced to the single column at this index.
    Column(usize),
}

/// A fully materialized statement result.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultSet {
    /// Column names in select order; empty when no rows came back.
    pub columns: Vec<String>,
    /// Decoded rows, one JSON map per row.
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    /// Rows changed by DML; 0 for plain selects.
    pub rows_affected: u64,
    /// Auto-generated key of the last insert, when the driver reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_insert_id: Option<u64>,
}

impl ResultSet {
    /// Get the number of rows in the result.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check whether the result carries neither rows nor affected rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.rows_affected == 0
    }

    /// Values of one column across all rows; empty when the index is out of
    /// range.
    pub fn column(&self, idx: usize) -> Vec<JsonValue> {
        let Some(name) = self.columns.get(idx) else {
            return Vec::new();
        };
        self.rows
            .iter()
            .map(|row| row.get(name).cloned().unwrap_or(JsonValue::Null))
            .collect()
    }

    /// Values of the first column across all rows.
    pub fn first_column(&self) -> Vec<JsonValue> {
        self.column(0)
    }

    /// Reduce every row to the single column at `idx`. Used by
    /// [`FetchMode::Column`].
    pub(crate) fn keep_column(mut self, idx: usize) -> Option<Self> {
        let name = self.columns.get(idx)?.clone();
        for row in &mut self.rows {
            row.retain(|key, _| *key == name);
        }
        self.columns = vec![name];
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> ResultSet {
        let mut r1 = serde_json::Map::new();
        r1.insert("id".to_string(), json!(1));
        r1.insert("name".to_string(), json!("alpha"));
        let mut r2 = serde_json::Map::new();
        r2.insert("id".to_string(), json!(2));
        r2.insert("name".to_string(), json!("beta"));
        ResultSet {
            columns: vec!["id".to_string(), "name".to_string()],
            rows: vec![r1, r2],
            rows_affected: 0,
            last_insert_id: None,
        }
    }

    #[test]
    fn test_empty_result() {
        let result = ResultSet::default();
        assert!(result.is_empty());
        assert_eq!(result.row_count(), 0);
        assert!(result.first_column().is_empty());
    }

    #[test]
    fn test_column_extraction() {
        let result = sample();
        assert_eq!(result.column(1), vec![json!("alpha"), json!("beta")]);
        assert_eq!(result.first_column(), vec![json!(1), json!(2)]);
        assert!(result.column(5).is_empty());
    }

    #[test]
    fn test_keep_column() {
        let reduced = sample().keep_column(1).unwrap();
        assert_eq!(reduced.columns, vec!["name".to_string()]);
        assert_eq!(reduced.rows[0].len(), 1);
        assert_eq!(reduced.rows[0]["name"], json!("alpha"));
    }

    #[test]
    fn test_keep_column_out_of_range() {
        assert!(sample().keep_column(7).is_none());
    }
}

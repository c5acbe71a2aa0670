//! Statement parameters.
//!
//! The drivers only speak positional `?` markers, so `prepare` rewrites named
//! `:name` markers to positional ones up front, recording the marker order.
//! At execute time [`Params`] values are laid out in that order and bound one
//! by one. Positional and named markers must not be mixed in one statement;
//! mixing is caller error and surfaces as a bind failure.

use crate::error::StatementError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::mysql::MySqlArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::{MySql, Sqlite};

/// A single value bound to a statement marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    Text(String),
    /// Binary data (base64 encoded in JSON)
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
    /// JSON value (stored as text on SQLite)
    Json(JsonValue),
}

impl SqlValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this value for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
        }
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<JsonValue> for SqlValue {
    fn from(v: JsonValue) -> Self {
        Self::Json(v)
    }
}

/// Parameters for one statement execution.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Params {
    /// Execute with nothing bound.
    #[default]
    None,
    /// Values for `?` markers, in marker order.
    Positional(Vec<SqlValue>),
    /// Values for `:name` markers, matched by name.
    Named(Vec<(String, SqlValue)>),
}

impl Params {
    /// Number of carried values.
    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Positional(values) => values.len(),
            Self::Named(pairs) => pairs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build named parameters from `(name, value)` pairs; names may carry the
    /// leading `:` or not.
    pub fn named<N, V>(pairs: impl IntoIterator<Item = (N, V)>) -> Self
    where
        N: Into<String>,
        V: Into<SqlValue>,
    {
        Self::Named(
            pairs
                .into_iter()
                .map(|(n, v)| (n.into(), v.into()))
                .collect(),
        )
    }
}

impl From<Vec<SqlValue>> for Params {
    fn from(values: Vec<SqlValue>) -> Self {
        Self::Positional(values)
    }
}

/// A lone value binds to a single positional marker.
impl From<SqlValue> for Params {
    fn from(value: SqlValue) -> Self {
        Self::Positional(vec![value])
    }
}

macro_rules! impl_scalar_params {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Params {
            fn from(value: $ty) -> Self {
                Self::Positional(vec![value.into()])
            }
        })*
    };
}

impl_scalar_params!(bool, i32, i64, f64, &str, String);

impl<T: Into<SqlValue>, const N: usize> From<[T; N]> for Params {
    fn from(values: [T; N]) -> Self {
        Self::Positional(values.into_iter().map(Into::into).collect())
    }
}

// =============================================================================
// Named-Marker Rewriting
// =============================================================================

/// A statement with named markers rewritten to positional ones.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RewrittenSql {
    /// Statement text containing only `?` markers.
    pub sql: String,
    /// One entry per marker, in order; `Some(name)` for a rewritten `:name`
    /// marker (without the colon), `None` for a bare `?`.
    pub markers: Vec<Option<String>>,
}

/// Rewrite `:name` markers to `?`, skipping string literals, quoted
/// identifiers and comments.
pub(crate) fn rewrite_named_markers(sql: &str) -> RewrittenSql {
    let mut out = String::with_capacity(sql.len());
    let mut markers = Vec::new();
    let mut chars = sql.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        match ch {
            // String literals and quoted identifiers pass through verbatim.
            '\'' | '"' | '`' => {
                out.push(ch);
                copy_until_closing(ch, &mut chars, &mut out);
            }
            '-' if matches!(chars.peek(), Some((_, '-'))) => {
                out.push(ch);
                copy_line_comment(&mut chars, &mut out);
            }
            '/' if matches!(chars.peek(), Some((_, '*'))) => {
                out.push(ch);
                copy_block_comment(&mut chars, &mut out);
            }
            '?' => {
                out.push(ch);
                markers.push(None);
            }
            ':' => {
                // `::` is a cast, not a marker; a marker name starts with a
                // letter or underscore.
                let starts_name = chars
                    .peek()
                    .is_some_and(|&(_, c)| c.is_ascii_alphabetic() || c == '_');
                let after_colon = idx > 0 && sql[..idx].ends_with(':');
                if starts_name && !after_colon {
                    let mut name = String::new();
                    while let Some(&(_, c)) = chars.peek() {
                        if c.is_ascii_alphanumeric() || c == '_' {
                            name.push(c);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    out.push('?');
                    markers.push(Some(name));
                } else {
                    out.push(ch);
                }
            }
            _ => out.push(ch),
        }
    }

    RewrittenSql { sql: out, markers }
}

fn copy_until_closing(
    quote: char,
    chars: &mut std::iter::Peekable<std::str::CharIndices>,
    out: &mut String,
) {
    while let Some((_, c)) = chars.next() {
        out.push(c);
        if c == '\\' && quote != '`' {
            if let Some((_, escaped)) = chars.next() {
                out.push(escaped);
            }
        } else if c == quote {
            // Doubled quote is an escaped quote inside the literal.
            if matches!(chars.peek(), Some(&(_, next)) if next == quote) {
                let (_, next) = chars.next().unwrap_or((0, quote));
                out.push(next);
            } else {
                break;
            }
        }
    }
}

fn copy_line_comment(chars: &mut std::iter::Peekable<std::str::CharIndices>, out: &mut String) {
    for (_, c) in chars.by_ref() {
        out.push(c);
        if c == '\n' {
            break;
        }
    }
}

fn copy_block_comment(chars: &mut std::iter::Peekable<std::str::CharIndices>, out: &mut String) {
    let mut prev = '\0';
    for (_, c) in chars.by_ref() {
        out.push(c);
        if prev == '*' && c == '/' {
            break;
        }
        prev = c;
    }
}

/// Lay out the carried values in marker order.
///
/// Positional values are taken as-is; named values are matched against the
/// recorded marker names. A named marker without a matching value, or a bare
/// `?` fed from named values, is a bind error.
pub(crate) fn order_values<'a>(
    markers: &[Option<String>],
    params: &'a Params,
) -> Result<Vec<&'a SqlValue>, StatementError> {
    match params {
        Params::None => Ok(Vec::new()),
        Params::Positional(values) => Ok(values.iter().collect()),
        Params::Named(pairs) => {
            let mut ordered = Vec::with_capacity(markers.len());
            for marker in markers {
                let Some(name) = marker else {
                    return Err(StatementError::bind(
                        "positional marker bound with named parameters",
                    ));
                };
                let value = pairs
                    .iter()
                    .find(|(n, _)| n.trim_start_matches(':') == name)
                    .map(|(_, v)| v)
                    .ok_or_else(|| {
                        StatementError::bind(format!("no parameter named :{}", name))
                    })?;
                ordered.push(value);
            }
            Ok(ordered)
        }
    }
}

// =============================================================================
// Driver Bind Helpers
// =============================================================================

/// Bind a value to a MySQL query.
pub(crate) fn bind_mysql<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    value: &'q SqlValue,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.as_str()),
        SqlValue::Bytes(v) => query.bind(v.as_slice()),
        SqlValue::Json(v) => query.bind(sqlx::types::Json(v)),
    }
}

/// Bind a value to a SQLite query.
pub(crate) fn bind_sqlite<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q SqlValue,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.as_str()),
        SqlValue::Bytes(v) => query.bind(v.as_slice()),
        // SQLite doesn't have native JSON type, store as string
        SqlValue::Json(v) => query.bind(v.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_types() {
        assert!(SqlValue::Null.is_null());
        assert!(!SqlValue::Bool(true).is_null());
        assert_eq!(SqlValue::Int(42).type_name(), "int");
        assert_eq!(SqlValue::from("hello").type_name(), "text");
    }

    #[test]
    fn test_scalar_coerces_to_single_positional() {
        let params: Params = 7i64.into();
        assert_eq!(params, Params::Positional(vec![SqlValue::Int(7)]));
        let params: Params = "admin".into();
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_array_coerces_to_positional() {
        let params: Params = ["a", "b"].into();
        assert_eq!(
            params,
            Params::Positional(vec![SqlValue::from("a"), SqlValue::from("b")])
        );
    }

    #[test]
    fn test_rewrite_named_markers() {
        let rewritten = rewrite_named_markers(
            "SELECT * FROM `config` WHERE `name` = :name AND `value` = :value",
        );
        assert_eq!(
            rewritten.sql,
            "SELECT * FROM `config` WHERE `name` = ? AND `value` = ?"
        );
        assert_eq!(
            rewritten.markers,
            vec![Some("name".to_string()), Some("value".to_string())]
        );
    }

    #[test]
    fn test_rewrite_keeps_positional_markers() {
        let rewritten = rewrite_named_markers("SELECT * FROM t WHERE a = ? AND b = ?");
        assert_eq!(rewritten.sql, "SELECT * FROM t WHERE a = ? AND b = ?");
        assert_eq!(rewritten.markers, vec![None, None]);
    }

    #[test]
    fn test_rewrite_skips_literals_and_comments() {
        let rewritten = rewrite_named_markers(
            "SELECT ':not_a_marker' AS v, -- :nope\n `:col` FROM t WHERE k = :key /* :also_not */",
        );
        assert!(rewritten.sql.contains("':not_a_marker'"));
        assert!(rewritten.sql.contains("-- :nope"));
        assert!(rewritten.sql.contains("`:col`"));
        assert!(rewritten.sql.contains("/* :also_not */"));
        assert_eq!(rewritten.markers, vec![Some("key".to_string())]);
    }

    #[test]
    fn test_rewrite_skips_doubled_quote_in_literal() {
        let rewritten = rewrite_named_markers("SELECT 'it''s :fine' WHERE a = :a");
        assert!(rewritten.sql.contains("'it''s :fine'"));
        assert_eq!(rewritten.markers, vec![Some("a".to_string())]);
    }

    #[test]
    fn test_rewrite_ignores_cast_syntax() {
        let rewritten = rewrite_named_markers("SELECT a::text FROM t WHERE b = :b");
        assert!(rewritten.sql.contains("a::text"));
        assert_eq!(rewritten.markers, vec![Some("b".to_string())]);
    }

    #[test]
    fn test_order_values_positional() {
        let markers = vec![None, None];
        let params = Params::Positional(vec![SqlValue::Int(1), SqlValue::Int(2)]);
        let ordered = order_values(&markers, &params).unwrap();
        assert_eq!(ordered, vec![&SqlValue::Int(1), &SqlValue::Int(2)]);
    }

    #[test]
    fn test_order_values_named_matches_marker_order() {
        let markers = vec![Some("b".to_string()), Some("a".to_string())];
        let params = Params::named([("a", 1i64), ("b", 2i64)]);
        let ordered = order_values(&markers, &params).unwrap();
        assert_eq!(ordered, vec![&SqlValue::Int(2), &SqlValue::Int(1)]);
    }

    #[test]
    fn test_order_values_accepts_leading_colon_in_names() {
        let markers = vec![Some("name".to_string())];
        let params = Params::named([(":name", "NAME")]);
        let ordered = order_values(&markers, &params).unwrap();
        assert_eq!(ordered, vec![&SqlValue::from("NAME")]);
    }

    #[test]
    fn test_order_values_missing_name_is_bind_error() {
        let markers = vec![Some("missing".to_string())];
        let params = Params::named([("present", 1i64)]);
        let err = order_values(&markers, &params).unwrap_err();
        assert_eq!(err.sqlstate.as_deref(), Some("HY093"));
    }

    #[test]
    fn test_order_values_named_against_positional_marker_fails() {
        let markers = vec![None];
        let params = Params::named([("a", 1i64)]);
        assert!(order_values(&markers, &params).is_err());
    }
}

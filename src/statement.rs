//! Prepared statements.
//!
//! A [`PreparedStatement`] is owned by the caller and reusable across
//! executions with different bound values. `Handle::prepare` rewrites named
//! markers to positional ones, round-trips the driver prepare to validate the
//! statement, and records the metadata the driver reported. The driver keeps
//! the compiled statement in its per-connection cache keyed by the rewritten
//! text, so re-executing does not re-prepare.

use crate::params::RewrittenSql;

/// Typed per-statement options.
#[derive(Debug, Clone, Copy)]
pub struct StatementOptions {
    /// Keep the compiled statement in the driver's statement cache between
    /// executions.
    pub persistent: bool,
}

impl Default for StatementOptions {
    fn default() -> Self {
        Self { persistent: true }
    }
}

/// A validated SQL statement with its markers normalized to positional form.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    /// Statement text as given to `prepare`.
    source: String,
    /// Rewritten text (positional markers only) plus marker order.
    rewritten: RewrittenSql,
    /// Marker count the driver reported at prepare time.
    param_count: usize,
    /// Columns the statement will produce; empty for statements without a
    /// result set.
    columns: Vec<String>,
    persistent: bool,
}

impl PreparedStatement {
    pub(crate) fn new(
        source: String,
        rewritten: RewrittenSql,
        param_count: usize,
        columns: Vec<String>,
        options: StatementOptions,
    ) -> Self {
        Self {
            source,
            rewritten,
            param_count,
            columns,
            persistent: options.persistent,
        }
    }

    /// The statement text as originally given.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The text actually sent to the driver (named markers rewritten to `?`).
    pub fn sql(&self) -> &str {
        &self.rewritten.sql
    }

    /// Number of parameter markers.
    pub fn param_count(&self) -> usize {
        self.param_count
    }

    /// Column names this statement produces, as reported at prepare time.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub(crate) fn markers(&self) -> &[Option<String>] {
        &self.rewritten.markers
    }

    pub(crate) fn persistent(&self) -> bool {
        self.persistent
    }
}

//! Connection handles.
//!
//! A [`Handle`] wraps exactly one live native connection plus its cached
//! last-error state. Handles are cheap to clone; every clone shares the same
//! underlying connection, and operations serialize on it. There is no pool
//! behind a handle - pooling is out of scope for this layer, a control panel
//! request works against one connection per registry name.

use crate::error::{DbError, DbResult, ErrorInfo, StatementError};
use crate::params::{Params, SqlValue, bind_mysql, bind_sqlite, order_values, rewrite_named_markers};
use crate::result::{FetchMode, ResultSet};
use crate::row::RowValues;
use crate::settings::{ConnectSettings, DriverType};
use crate::statement::{PreparedStatement, StatementOptions};
use serde::{Deserialize, Serialize};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::timeout;
use tracing::debug;

/// The underlying driver connection a handle delegates to.
#[derive(Debug)]
pub enum NativeConnection {
    MySql(MySqlConnection),
    Sqlite(SqliteConnection),
}

impl NativeConnection {
    /// Get the driver type for this connection.
    pub fn driver(&self) -> DriverType {
        match self {
            Self::MySql(_) => DriverType::MySql,
            Self::Sqlite(_) => DriverType::Sqlite,
        }
    }

    /// Open a native connection for the given settings.
    pub(crate) async fn open(settings: &ConnectSettings) -> DbResult<Self> {
        let opts = &settings.options;
        match settings.driver {
            DriverType::MySql => {
                let (host, port) = settings.host_and_port();
                let mut connect = MySqlConnectOptions::new()
                    .host(host)
                    .username(&settings.user)
                    .password(&settings.password)
                    .database(&settings.database);
                if let Some(port) = port {
                    connect = connect.port(port);
                }
                if let Some(charset) = &opts.charset {
                    connect = connect.charset(charset);
                }
                if let Some(capacity) = opts.statement_cache_capacity {
                    connect = connect.statement_cache_capacity(capacity);
                }
                let conn = open_with_timeout(
                    connect.connect(),
                    opts.connect_timeout_secs,
                    DriverType::MySql,
                )
                .await?;
                Ok(Self::MySql(conn))
            }
            DriverType::Sqlite => {
                let mut connect = SqliteConnectOptions::new()
                    .filename(&settings.database)
                    .create_if_missing(opts.create_if_missing);
                if let Some(capacity) = opts.statement_cache_capacity {
                    connect = connect.statement_cache_capacity(capacity);
                }
                let conn = open_with_timeout(
                    connect.connect(),
                    opts.connect_timeout_secs,
                    DriverType::Sqlite,
                )
                .await?;
                Ok(Self::Sqlite(conn))
            }
        }
    }

    pub(crate) async fn close(self) -> Result<(), sqlx::Error> {
        match self {
            Self::MySql(conn) => conn.close().await,
            Self::Sqlite(conn) => conn.close().await,
        }
    }
}

async fn open_with_timeout<C>(
    fut: impl Future<Output = Result<C, sqlx::Error>>,
    timeout_secs: Option<u64>,
    driver: DriverType,
) -> DbResult<C> {
    let result = match timeout_secs {
        Some(secs) => match timeout(Duration::from_secs(secs), fut).await {
            Ok(result) => result,
            Err(_) => {
                return Err(DbError::connect(
                    format!("Connect timed out after {}s", secs),
                    format!("Check that the {} server is reachable", driver),
                ));
            }
        },
        None => fut.await,
    };
    result.map_err(|e| {
        DbError::connect(
            format!("Failed to connect: {}", e),
            connect_suggestion(driver, &e),
        )
    })
}

/// Generate a helpful suggestion for connect errors.
fn connect_suggestion(driver: DriverType, error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") {
        return format!("Check that the {} server is running and accessible", driver);
    }
    if error_str.contains("authentication") || error_str.contains("access denied") {
        return "Verify the username and password".to_string();
    }
    if error_str.contains("does not exist") || error_str.contains("unknown database") {
        return "Check that the database name exists".to_string();
    }
    match driver {
        DriverType::MySql => "Verify the host, port and credentials".to_string(),
        DriverType::Sqlite => "Verify the database file path is accessible".to_string(),
    }
}

/// Recognized connection attribute keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrKey {
    /// Result sets are fully materialized client-side. Forced on at connect;
    /// this layer never streams, so turning it off is not honored.
    BufferedQueries,
    /// Per-statement timeout in seconds for execute/query. Unset by default.
    QueryTimeout,
    /// Identifier quote character, backtick by default.
    NameQuote,
}

/// Attribute values, typed per key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(u64),
    Char(char),
}

fn attr_types_match(key: AttrKey, value: &AttrValue) -> bool {
    matches!(
        (key, value),
        (AttrKey::BufferedQueries, AttrValue::Bool(_))
            | (AttrKey::QueryTimeout, AttrValue::Int(_))
            | (AttrKey::NameQuote, AttrValue::Char(_))
    )
}

/// Default identifier quote character.
pub const DEFAULT_NAME_QUOTE: char = '`';

struct HandleInner {
    name: String,
    driver: DriverType,
    dsn: String,
    conn: Arc<AsyncMutex<Option<NativeConnection>>>,
    /// SQLSTATE of the most recent failed prepare/execute, empty by default.
    last_error_code: StdMutex<String>,
    /// Message of the most recent failed prepare/execute, empty by default.
    last_error_message: StdMutex<String>,
    /// Live error state of the most recent driver round trip.
    error_info: StdMutex<ErrorInfo>,
    attrs: StdMutex<HashMap<AttrKey, AttrValue>>,
}

/// An open logical database connection plus its cached last-error state.
#[derive(Clone)]
pub struct Handle {
    inner: Arc<HandleInner>,
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("name", &self.inner.name)
            .field("driver", &self.inner.driver)
            .field("dsn", &self.inner.dsn)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Handle {
    pub(crate) fn new(settings: &ConnectSettings, conn: NativeConnection) -> Self {
        let mut attrs = HashMap::new();
        attrs.insert(AttrKey::BufferedQueries, AttrValue::Bool(true));
        attrs.insert(AttrKey::NameQuote, AttrValue::Char(DEFAULT_NAME_QUOTE));
        Self {
            inner: Arc::new(HandleInner {
                name: settings.connection.clone(),
                driver: settings.driver,
                dsn: settings.dsn(),
                conn: Arc::new(AsyncMutex::new(Some(conn))),
                last_error_code: StdMutex::new(String::new()),
                last_error_message: StdMutex::new(String::new()),
                error_info: StdMutex::new(ErrorInfo::default()),
                attrs: StdMutex::new(attrs),
            }),
        }
    }

    /// The registry name this handle is filed under.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The driver behind this handle.
    pub fn driver(&self) -> DriverType {
        self.inner.driver
    }

    /// The credential-free DSN this handle was opened from.
    pub fn dsn(&self) -> &str {
        &self.inner.dsn
    }

    /// True when both handles share the same underlying connection.
    pub fn ptr_eq(&self, other: &Handle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether the native connection is still attached.
    pub async fn is_open(&self) -> bool {
        self.inner.conn.lock().await.is_some()
    }

    /// Detach and close the native connection. Idempotent; later statements
    /// on this handle fail soft, metadata operations fail hard.
    pub async fn close(&self) -> DbResult<()> {
        let conn = self.inner.conn.lock().await.take();
        if let Some(conn) = conn {
            debug!(connection = %self.name(), "Closing connection");
            conn.close().await?;
        }
        Ok(())
    }

    /// Exclusive access to the native connection, for driver-specific calls
    /// this wrapper does not cover.
    pub async fn raw(&self) -> RawConnection {
        RawConnection {
            guard: Arc::clone(&self.inner.conn).lock_owned().await,
        }
    }

    // -------------------------------------------------------------------------
    // Statements
    // -------------------------------------------------------------------------

    /// Prepare a SQL statement.
    ///
    /// Named `:name` markers are rewritten to positional ones; the driver
    /// round trip validates the statement and reports its metadata. Failure
    /// is soft: the error is returned and cached on the handle, nothing is
    /// raised.
    pub async fn prepare(
        &self,
        sql: &str,
        options: Option<StatementOptions>,
    ) -> Result<PreparedStatement, StatementError> {
        let options = options.unwrap_or_default();
        let rewritten = rewrite_named_markers(sql);
        debug!(connection = %self.name(), sql = %rewritten.sql, "Preparing statement");

        let mut guard = self.inner.conn.lock().await;
        let Some(conn) = guard.as_mut() else {
            drop(guard);
            return Err(self.statement_failure(StatementError::closed(self.name())));
        };
        let meta = match conn {
            NativeConnection::MySql(conn) => mysql::prepare_meta(conn, &rewritten.sql).await,
            NativeConnection::Sqlite(conn) => sqlite::prepare_meta(conn, &rewritten.sql).await,
        };
        drop(guard);

        match meta {
            Ok((param_count, columns)) => {
                self.record_success();
                let param_count = param_count.unwrap_or(rewritten.markers.len());
                Ok(PreparedStatement::new(
                    sql.to_string(),
                    rewritten,
                    param_count,
                    columns,
                    options,
                ))
            }
            Err(err) => Err(self.statement_failure_from_sqlx(&err)),
        }
    }

    /// Execute a prepared statement.
    ///
    /// `params` coerces from a lone scalar (one positional marker), a vec or
    /// array (positional markers in order), or [`Params::named`] pairs. Soft
    /// failure, same contract as [`Handle::prepare`].
    pub async fn execute(
        &self,
        stmt: &PreparedStatement,
        params: impl Into<Params>,
    ) -> Result<ResultSet, StatementError> {
        let params = params.into();
        let ordered = match order_values(stmt.markers(), &params) {
            Ok(ordered) => ordered,
            Err(err) => return Err(self.statement_failure(err)),
        };
        self.run(stmt.sql(), &ordered, stmt.persistent()).await
    }

    /// Run raw SQL as a one-shot statement, unprepared.
    ///
    /// `fetch` selects the result shape; see [`FetchMode`]. Soft failure,
    /// same contract as [`Handle::prepare`].
    pub async fn query(&self, sql: &str, fetch: FetchMode) -> Result<ResultSet, StatementError> {
        let result = self.run(sql, &[], true).await?;
        match fetch {
            FetchMode::Rows => Ok(result),
            FetchMode::Column(idx) => {
                if result.columns.is_empty() {
                    return Ok(result);
                }
                let total = result.columns.len();
                result.keep_column(idx).ok_or_else(|| {
                    self.statement_failure(StatementError {
                        sqlstate: None,
                        code: None,
                        message: format!("column index {} out of range ({} columns)", idx, total),
                    })
                })
            }
        }
    }

    async fn run(
        &self,
        sql: &str,
        values: &[&SqlValue],
        persistent: bool,
    ) -> Result<ResultSet, StatementError> {
        let timeout_secs = self.query_timeout_secs();
        debug!(
            connection = %self.name(),
            sql = %sql,
            params = values.len(),
            "Executing statement"
        );

        let mut guard = self.inner.conn.lock().await;
        let Some(conn) = guard.as_mut() else {
            drop(guard);
            return Err(self.statement_failure(StatementError::closed(self.name())));
        };

        let fut = run_statement(conn, sql, values, persistent);
        let result = match timeout_secs {
            Some(secs) => match timeout(Duration::from_secs(secs), fut).await {
                Ok(result) => result,
                Err(_) => {
                    drop(guard);
                    return Err(self.statement_failure(StatementError::timeout(secs)));
                }
            },
            None => fut.await,
        };
        drop(guard);

        match result {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(err) => Err(self.statement_failure_from_sqlx(&err)),
        }
    }

    // -------------------------------------------------------------------------
    // Metadata
    // -------------------------------------------------------------------------

    /// List the permanent tables of the connected database.
    pub async fn list_tables(&self) -> DbResult<Vec<String>> {
        let sql = match self.driver() {
            DriverType::MySql => "SHOW TABLES",
            DriverType::Sqlite => {
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'"
            }
        };
        let result = self.query(sql, FetchMode::Column(0)).await?;
        Ok(result
            .first_column()
            .into_iter()
            .filter_map(|value| value.as_str().map(str::to_string))
            .collect())
    }

    /// The id of the last inserted row, as the driver reports it.
    pub async fn last_insert_id(&self) -> DbResult<u64> {
        let mut guard = self.inner.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| DbError::closed(self.name()))?;
        let result = match conn {
            NativeConnection::MySql(conn) => {
                sqlx::query_scalar::<_, u64>("SELECT LAST_INSERT_ID()")
                    .fetch_one(&mut *conn)
                    .await
            }
            NativeConnection::Sqlite(conn) => {
                sqlx::query_scalar::<_, i64>("SELECT last_insert_rowid()")
                    .fetch_one(&mut *conn)
                    .await
                    .map(|id| id.max(0) as u64)
            }
        };
        drop(guard);
        self.finish_metadata_op(result)
    }

    // -------------------------------------------------------------------------
    // Attributes
    // -------------------------------------------------------------------------

    /// Set a connection attribute. Returns false when the value type does not
    /// fit the key.
    pub fn set_attribute(&self, key: AttrKey, value: AttrValue) -> bool {
        if !attr_types_match(key, &value) {
            return false;
        }
        lock(&self.inner.attrs).insert(key, value);
        true
    }

    /// Read a connection attribute. None for a key that was never set.
    pub fn get_attribute(&self, key: AttrKey) -> Option<AttrValue> {
        lock(&self.inner.attrs).get(&key).cloned()
    }

    /// The identifier quote character (backtick unless reconfigured).
    pub fn name_quote(&self) -> char {
        match self.get_attribute(AttrKey::NameQuote) {
            Some(AttrValue::Char(c)) => c,
            _ => DEFAULT_NAME_QUOTE,
        }
    }

    /// Quote an identifier with the handle's quote character, doubling any
    /// embedded quote characters.
    pub fn quote_identifier(&self, ident: &str) -> String {
        quote_with(self.name_quote(), ident)
    }

    fn query_timeout_secs(&self) -> Option<u64> {
        match self.get_attribute(AttrKey::QueryTimeout) {
            Some(AttrValue::Int(secs)) if secs > 0 => Some(secs),
            _ => None,
        }
    }

    // -------------------------------------------------------------------------
    // Transactions
    // -------------------------------------------------------------------------

    /// Initiate a transaction on the native connection.
    ///
    /// Plain pass-through; no nesting or savepoint logic. A second begin
    /// before commit/rollback has whatever semantics the server gives it.
    pub async fn begin_transaction(&self) -> DbResult<()> {
        let sql = match self.driver() {
            DriverType::MySql => "START TRANSACTION",
            DriverType::Sqlite => "BEGIN",
        };
        self.simple_exec(sql).await
    }

    /// Commit the current transaction.
    pub async fn commit(&self) -> DbResult<()> {
        self.simple_exec("COMMIT").await
    }

    /// Roll back the current transaction.
    pub async fn rollback(&self) -> DbResult<()> {
        self.simple_exec("ROLLBACK").await
    }

    async fn simple_exec(&self, sql: &str) -> DbResult<()> {
        use sqlx::Executor;

        debug!(connection = %self.name(), sql = %sql, "Transaction control");
        let mut guard = self.inner.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| DbError::closed(self.name()))?;
        let result = match conn {
            NativeConnection::MySql(conn) => conn.execute(sql).await.map(|_| ()),
            NativeConnection::Sqlite(conn) => conn.execute(sql).await.map(|_| ()),
        };
        drop(guard);
        self.finish_metadata_op(result)
    }

    // -------------------------------------------------------------------------
    // Error introspection
    // -------------------------------------------------------------------------

    /// SQLSTATE cached from the most recent failed prepare/execute; empty
    /// when none failed yet.
    pub fn last_error_code(&self) -> String {
        lock(&self.inner.last_error_code).clone()
    }

    /// Message cached from the most recent failed prepare/execute; empty
    /// when none failed yet.
    pub fn last_error_message(&self) -> String {
        lock(&self.inner.last_error_message).clone()
    }

    /// Error state of the most recent driver round trip, success state
    /// included. Not the cached fields: this resets on every operation.
    pub fn error_info(&self) -> ErrorInfo {
        lock(&self.inner.error_info).clone()
    }

    /// [`Handle::error_info`] fields joined with `" - "`.
    pub fn error_summary(&self) -> String {
        self.error_info().summary()
    }

    fn record_success(&self) {
        *lock(&self.inner.error_info) = ErrorInfo::default();
    }

    fn statement_failure(&self, err: StatementError) -> StatementError {
        *lock(&self.inner.error_info) = ErrorInfo {
            sqlstate: err
                .sqlstate
                .clone()
                .unwrap_or_else(|| "HY000".to_string()),
            code: err.code,
            message: Some(err.message.clone()),
        };
        self.cache_statement_error(&err);
        err
    }

    fn statement_failure_from_sqlx(&self, err: &sqlx::Error) -> StatementError {
        let info = ErrorInfo::from_sqlx(err);
        let statement_err = StatementError::from_info(&info);
        *lock(&self.inner.error_info) = info;
        self.cache_statement_error(&statement_err);
        statement_err
    }

    fn cache_statement_error(&self, err: &StatementError) {
        *lock(&self.inner.last_error_code) = err.sqlstate.clone().unwrap_or_default();
        *lock(&self.inner.last_error_message) = err.message.clone();
    }

    /// Settle error state for operations with hard failure semantics.
    fn finish_metadata_op<T>(&self, result: Result<T, sqlx::Error>) -> DbResult<T> {
        match result {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                *lock(&self.inner.error_info) = ErrorInfo::from_sqlx(&err);
                Err(err.into())
            }
        }
    }
}

pub(crate) fn quote_with(quote: char, ident: &str) -> String {
    let mut out = String::with_capacity(ident.len() + 2);
    out.push(quote);
    for c in ident.chars() {
        out.push(c);
        if c == quote {
            out.push(c);
        }
    }
    out.push(quote);
    out
}

/// Exclusive guard over a handle's native connection.
///
/// Escape hatch for callers needing driver-specific features; the handle's
/// own operations block until the guard is dropped.
#[derive(Debug)]
pub struct RawConnection {
    guard: OwnedMutexGuard<Option<NativeConnection>>,
}

impl RawConnection {
    /// The native connection, unless the handle was closed.
    pub fn get(&mut self) -> Option<&mut NativeConnection> {
        self.guard.as_mut()
    }

    /// The MySQL connection, when this handle drives MySQL.
    pub fn as_mysql(&mut self) -> Option<&mut MySqlConnection> {
        match self.guard.as_mut() {
            Some(NativeConnection::MySql(conn)) => Some(conn),
            _ => None,
        }
    }

    /// The SQLite connection, when this handle drives SQLite.
    pub fn as_sqlite(&mut self) -> Option<&mut SqliteConnection> {
        match self.guard.as_mut() {
            Some(NativeConnection::Sqlite(conn)) => Some(conn),
            _ => None,
        }
    }

    /// Whether a native connection is attached.
    pub fn is_open(&self) -> bool {
        self.guard.is_some()
    }
}

// =============================================================================
// Driver-Specific Execution
// =============================================================================
//
// Each module below provides the same interface adapted to its driver. The
// code structure is intentionally parallel to make differences obvious.

async fn run_statement(
    conn: &mut NativeConnection,
    sql: &str,
    values: &[&SqlValue],
    persistent: bool,
) -> Result<ResultSet, sqlx::Error> {
    match conn {
        NativeConnection::MySql(conn) => mysql::run(conn, sql, values, persistent).await,
        NativeConnection::Sqlite(conn) => sqlite::run(conn, sql, values, persistent).await,
    }
}

mod mysql {
    use super::*;
    use sqlx::{Column, Either, Executor, Statement};

    pub(super) async fn run(
        conn: &mut MySqlConnection,
        sql: &str,
        values: &[&SqlValue],
        persistent: bool,
    ) -> Result<ResultSet, sqlx::Error> {
        // The prepare is served from the connection's statement cache on
        // re-execution; its metadata decides whether rows come back.
        let stmt = conn.prepare(sql).await?;
        let produces_rows = !stmt.columns().is_empty();
        let columns: Vec<String> = stmt
            .columns()
            .iter()
            .map(|col| col.name().to_string())
            .collect();

        let mut query = sqlx::query(sql);
        for value in values.iter().copied() {
            query = bind_mysql(query, value);
        }
        let query = query.persistent(persistent);

        let mut result = ResultSet::default();
        if produces_rows {
            result.columns = columns;
            for row in query.fetch_all(&mut *conn).await? {
                result.rows.push(row.to_json_map());
            }
        } else {
            let done = query.execute(&mut *conn).await?;
            result.rows_affected = done.rows_affected();
            result.last_insert_id = Some(done.last_insert_id());
        }
        Ok(result)
    }

    pub(super) async fn prepare_meta(
        conn: &mut MySqlConnection,
        sql: &str,
    ) -> Result<(Option<usize>, Vec<String>), sqlx::Error> {
        let stmt = conn.prepare(sql).await?;
        let param_count = stmt.parameters().map(|params| match params {
            Either::Left(types) => types.len(),
            Either::Right(count) => count,
        });
        let columns = stmt
            .columns()
            .iter()
            .map(|col| col.name().to_string())
            .collect();
        Ok((param_count, columns))
    }
}

mod sqlite {
    use super::*;
    use sqlx::{Column, Either, Executor, Statement};

    pub(super) async fn run(
        conn: &mut SqliteConnection,
        sql: &str,
        values: &[&SqlValue],
        persistent: bool,
    ) -> Result<ResultSet, sqlx::Error> {
        let stmt = conn.prepare(sql).await?;
        let produces_rows = !stmt.columns().is_empty();
        let columns: Vec<String> = stmt
            .columns()
            .iter()
            .map(|col| col.name().to_string())
            .collect();

        let mut query = sqlx::query(sql);
        for value in values.iter().copied() {
            query = bind_sqlite(query, value);
        }
        let query = query.persistent(persistent);

        let mut result = ResultSet::default();
        if produces_rows {
            result.columns = columns;
            for row in query.fetch_all(&mut *conn).await? {
                result.rows.push(row.to_json_map());
            }
        } else {
            let done = query.execute(&mut *conn).await?;
            result.rows_affected = done.rows_affected();
            result.last_insert_id = Some(done.last_insert_rowid().max(0) as u64);
        }
        Ok(result)
    }

    pub(super) async fn prepare_meta(
        conn: &mut SqliteConnection,
        sql: &str,
    ) -> Result<(Option<usize>, Vec<String>), sqlx::Error> {
        let stmt = conn.prepare(sql).await?;
        let param_count = stmt.parameters().map(|params| match params {
            Either::Left(types) => types.len(),
            Either::Right(count) => count,
        });
        let columns = stmt
            .columns()
            .iter()
            .map(|col| col.name().to_string())
            .collect();
        Ok((param_count, columns))
    }
}

//! Thin database-access layer for web control panel components.
//!
//! A [`ConnectionRegistry`] maps names to [`Handle`]s, each wrapping exactly
//! one live native connection (MySQL or SQLite via sqlx). Handles prepare and
//! execute statements with soft failure semantics: a failed statement comes
//! back as an ordinary `Err` the caller checks, and the handle caches the
//! error state for later inspection. Registry and metadata operations fail
//! hard with [`DbError`].
//!
//! ```no_run
//! use paneldb::{ConnectSettings, ConnectionRegistry, DriverType, Params};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ConnectionRegistry::new();
//! let db = registry
//!     .connect(ConnectSettings::new(
//!         "panel",
//!         "secret",
//!         DriverType::MySql,
//!         "localhost",
//!         "panel",
//!     ))
//!     .await?;
//!
//! let stmt = db
//!     .prepare("SELECT * FROM admin WHERE admin_name = :name", None)
//!     .await?;
//! let result = db.execute(&stmt, Params::named([("name", "admin")])).await;
//! match result {
//!     Ok(rows) => println!("{} rows", rows.row_count()),
//!     Err(_) => eprintln!("{}", db.error_summary()),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! This layer does not pool, retry, build queries, migrate schemas or map
//! rows to structs.

mod error;
mod handle;
mod params;
mod registry;
mod result;
mod row;
mod settings;
mod statement;

pub use error::{DbError, DbResult, ErrorInfo, SQLSTATE_SUCCESS, StatementError};
pub use handle::{
    AttrKey, AttrValue, DEFAULT_NAME_QUOTE, Handle, NativeConnection, RawConnection,
};
pub use params::{Params, SqlValue};
pub use registry::ConnectionRegistry;
pub use result::{FetchMode, ResultSet};
pub use settings::{ConnectSettings, DEFAULT_CONNECTION, DriverOptions, DriverType};
pub use statement::{PreparedStatement, StatementOptions};

//! Database access for data-integrity checks

mod backend;
mod dialect;
mod manager;
pub mod mock;
mod sqlx_backend;

pub use backend::{Connector, Row, SqlConnection, SqlValue};
pub use dialect::{redact_url, DbSettings, Dialect};
pub use manager::{ConnectionManager, DbLease};
pub use sqlx_backend::SqlxConnector;

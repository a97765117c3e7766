//! Database Backend Abstractions
//!
//! Values, rows and the executor trait the relationship engine runs queries
//! through, plus the PostgreSQL implementation on top of sqlx.

pub mod core;
pub mod postgres;

pub use self::core::*;
pub use self::postgres::PostgresExecutor;

//! Store abstraction the connector talks to.
//!
//! A [`StoreConnector`] opens a [`StoreClient`] from a connection
//! configuration path. The client hands out [`CacheHandle`]s for named
//! collections, and a cache handle executes [`Query`]s. Reads return a
//! forward-only [`RowCursor`]. All calls are blocking.

pub mod sqlite;

pub use sqlite::{SqliteConnector, StoreSettings};

use std::sync::Arc;

use crate::Result;
use crate::query::Query;
use crate::types::Row;

/// Opens live clients to the store
pub trait StoreConnector: Send + Sync {
    /// Open a client using the connection configuration found at `config_path`
    fn connect(&self, config_path: &str) -> Result<Arc<dyn StoreClient>>;
}

/// A live client connection to the store
pub trait StoreClient: Send + Sync {
    /// Get a handle to the named collection, or `None` if the store has no such collection
    fn cache(&self, name: &str) -> Result<Option<Box<dyn CacheHandle>>>;

    /// Tear down the client. Handles obtained from it stop working afterwards.
    fn close(&self) -> Result<()>;
}

/// Accessor-exclusive handle to one named collection
pub trait CacheHandle: Send {
    fn name(&self) -> &str;

    /// Execute a row-returning query
    fn query(&mut self, query: &Query) -> Result<Box<dyn RowCursor>>;

    /// Execute a statement, returning the number of affected rows
    fn execute(&mut self, query: &Query) -> Result<usize>;

    /// Release the handle. The collection itself is left untouched.
    fn close(&mut self) -> Result<()>;
}

/// Forward-only, non-restartable sequence of rows bound to one executed query
pub trait RowCursor: Send {
    /// Next row, or `None` once the cursor is exhausted
    fn next_row(&mut self) -> Result<Option<Row>>;

    fn close(&mut self) -> Result<()>;
}

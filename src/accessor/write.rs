use tracing::{debug, warn};

use crate::accessor::InputData;
use crate::config::AccessorOptions;
use crate::error::ReleaseErrors;
use crate::query::{Query, build_insert, normalize_write_target, qualify_table};
use crate::session::ConnectionManager;
use crate::store::CacheHandle;
use crate::types::Row;
use crate::{Result, StoreBridgeError};

struct OpenWrite {
    cache: Box<dyn CacheHandle>,
    query: Query,
    placeholders: usize,
}

enum WriteState {
    Unopened,
    Open(OpenWrite),
    Closed,
}

/// Feeds rows into the store, one INSERT round trip per row: Unopened → Open → Closed
pub struct WritePipeline {
    state: WriteState,
    rows_written: u64,
}

impl Default for WritePipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl WritePipeline {
    pub fn new() -> Self {
        Self {
            state: WriteState::Unopened,
            rows_written: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, WriteState::Open(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, WriteState::Closed)
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn open(&mut self, manager: &ConnectionManager, options: &AccessorOptions, input: &InputData) -> Result<()> {
        if self.is_open() {
            return Err(StoreBridgeError::InvalidState("Write pipeline is already open".to_string()));
        }

        let mut cache = manager.acquire_cache(&options.cache_name)?;

        let (query, placeholders) = match build_insert_query(options, input) {
            Ok(built) => built,
            Err(e) => {
                if let Err(release_err) = cache.close() {
                    warn!("Failed to release cache '{}' after a failed open: {}", options.cache_name, release_err);
                }
                return Err(e);
            }
        };
        debug!("openForWrite(): prepared query '{}'", query.sql());

        self.state = WriteState::Open(OpenWrite {
            cache,
            query,
            placeholders,
        });
        Ok(())
    }

    /// Bind the row's fields in order and run the INSERT once
    pub fn write(&mut self, row: Row) -> Result<bool> {
        let WriteState::Open(open) = &mut self.state else {
            return Err(StoreBridgeError::InvalidState("Write pipeline is not open".to_string()));
        };

        if row.len() != open.placeholders {
            return Err(StoreBridgeError::Configuration(format!(
                "Row has {} fields but the target expects {}",
                row.len(),
                open.placeholders
            )));
        }

        open.query.set_args(row.into_values());
        open.cache.execute(&open.query)?;
        self.rows_written += 1;
        Ok(true)
    }

    /// Release the cache handle. A no-op unless open.
    pub fn close(&mut self) -> Result<()> {
        let mut open = match std::mem::replace(&mut self.state, WriteState::Closed) {
            WriteState::Open(open) => open,
            other => {
                self.state = other;
                return Ok(());
            }
        };
        debug!("closeForWrite(): {} rows written", self.rows_written);

        let mut errors = ReleaseErrors::new();
        errors.record("cache", open.cache.close());
        errors.finish()
    }
}

/// INSERT for the request's tuple columns into the normalised write target
pub fn build_insert_query(options: &AccessorOptions, input: &InputData) -> Result<(Query, usize)> {
    let target = qualify_table(normalize_write_target(&input.data_source), options.schema.as_deref());
    let (sql, placeholders) = build_insert(&input.column_names(), &target)?;
    Ok((Query::new(sql).with_schema(options.schema.clone()), placeholders))
}

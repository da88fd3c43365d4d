use tracing::{debug, warn};

use crate::accessor::InputData;
use crate::accessor::pushdown::Pushdown;
use crate::config::AccessorOptions;
use crate::error::ReleaseErrors;
use crate::query::{Query, SelectBuilder, qualify_table};
use crate::session::ConnectionManager;
use crate::store::{CacheHandle, RowCursor};
use crate::types::Row;
use crate::{Result, StoreBridgeError};

/// Result of asking a read pipeline for its next row
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Row(Row),
    /// The cursor is exhausted; returned on every call from then on
    StreamEnd,
}

impl ReadOutcome {
    pub fn into_row(self) -> Option<Row> {
        match self {
            ReadOutcome::Row(row) => Some(row),
            ReadOutcome::StreamEnd => None,
        }
    }

    pub fn is_stream_end(&self) -> bool {
        matches!(self, ReadOutcome::StreamEnd)
    }
}

struct OpenRead {
    cache: Box<dyn CacheHandle>,
    cursor: Box<dyn RowCursor>,
    exhausted: bool,
}

enum ReadState {
    Unopened,
    Open(OpenRead),
    Closed,
}

/// Streams rows of one SELECT out of the store: Unopened → Open → Closed
pub struct ReadPipeline {
    state: ReadState,
}

impl Default for ReadPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadPipeline {
    pub fn new() -> Self {
        Self { state: ReadState::Unopened }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, ReadState::Open(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, ReadState::Closed)
    }

    /// Acquire the cache, build and run the SELECT. On any failure the
    /// pipeline is left as it was and the cache handle is released again.
    pub fn open(
        &mut self,
        manager: &ConnectionManager,
        options: &AccessorOptions,
        input: &InputData,
        pushdown: &Pushdown,
    ) -> Result<()> {
        if self.is_open() {
            return Err(StoreBridgeError::InvalidState("Read pipeline is already open".to_string()));
        }

        let mut cache = manager.acquire_cache(&options.cache_name)?;

        let cursor = build_select_query(options, input, pushdown).and_then(|query| {
            debug!("openForRead(): making a request to the store. Query: '{}'", query.sql());
            cache.query(&query)
        });
        let cursor = match cursor {
            Ok(cursor) => cursor,
            Err(e) => {
                if let Err(release_err) = cache.close() {
                    warn!("Failed to release cache '{}' after a failed open: {}", options.cache_name, release_err);
                }
                return Err(e);
            }
        };

        self.state = ReadState::Open(OpenRead {
            cache,
            cursor,
            exhausted: false,
        });
        debug!("openForRead() finished successfully");
        Ok(())
    }

    /// Next row, or `StreamEnd` once the cursor has nothing left
    pub fn next(&mut self) -> Result<ReadOutcome> {
        let open = match &mut self.state {
            ReadState::Open(open) => open,
            ReadState::Unopened => {
                return Err(StoreBridgeError::InvalidState("Read pipeline has not been opened".to_string()));
            }
            ReadState::Closed => {
                return Err(StoreBridgeError::InvalidState("Read pipeline has been closed".to_string()));
            }
        };

        if open.exhausted {
            return Ok(ReadOutcome::StreamEnd);
        }
        match open.cursor.next_row()? {
            Some(row) => Ok(ReadOutcome::Row(row)),
            None => {
                open.exhausted = true;
                Ok(ReadOutcome::StreamEnd)
            }
        }
    }

    /// Release the cursor, then the cache handle. Both are attempted; if both
    /// fail, the cache failure is the one returned. A no-op unless open.
    pub fn close(&mut self) -> Result<()> {
        let mut open = match std::mem::replace(&mut self.state, ReadState::Closed) {
            ReadState::Open(open) => open,
            other => {
                self.state = other;
                return Ok(());
            }
        };

        let mut errors = ReleaseErrors::new();
        errors.record("cursor", open.cursor.close());
        errors.record("cache", open.cache.close());
        errors.finish()
    }
}

/// SELECT for the request: tuple columns from the data source, narrowed by the
/// pushed-down filter and this worker's partition. An unqualified data source
/// is resolved in the configured schema.
pub fn build_select_query(options: &AccessorOptions, input: &InputData, pushdown: &Pushdown) -> Result<Query> {
    let columns = input.column_names();
    let table = qualify_table(&input.data_source, options.schema.as_deref());
    let mut builder = SelectBuilder::new(&columns, &table);

    if input.has_filter() {
        if let Some(where_sql) = pushdown.filter.build_where_sql(input)? {
            builder.filter(where_sql);
        }
    }
    pushdown.fragmenter.append_fragmenter_sql(input, &mut builder)?;

    Ok(Query::new(builder.build()?)
        .with_schema(options.schema.clone())
        .with_lazy(options.lazy)
        .with_replicated_only(options.replicated_only))
}

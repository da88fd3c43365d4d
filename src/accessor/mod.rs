//! Accessors driven by the host through open → iterate/feed → close.

pub mod pushdown;
pub mod read;
pub mod write;

pub use pushdown::{Fragmenter, NoPartition, PartitionFragment, PartitionFragmenter, Pushdown, RawFilter, WhereSqlBuilder};
pub use read::{ReadOutcome, ReadPipeline};
pub use write::WritePipeline;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, debug_span};
use uuid::Uuid;

use crate::Result;
use crate::config::AccessorOptions;
use crate::session::ConnectionManager;
use crate::types::{ColumnDescriptor, Row};

/// What the host hands over with each request
#[derive(Debug, Clone, Default)]
pub struct InputData {
    /// Target table; writes may carry the host's split suffix
    pub data_source: String,
    /// Columns of the row shape, in tuple order
    pub tuple_description: Vec<ColumnDescriptor>,
    pub user_properties: HashMap<String, String>,
    /// Serialised filter, present only when the query has one
    pub filter_string: Option<String>,
    /// Partition this worker is responsible for
    pub fragment: Option<PartitionFragment>,
}

impl InputData {
    pub fn new(data_source: impl Into<String>, tuple_description: Vec<ColumnDescriptor>) -> Self {
        Self {
            data_source: data_source.into(),
            tuple_description,
            ..Default::default()
        }
    }

    /// Describe the tuple by column names alone
    pub fn with_columns<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.tuple_description = names
            .iter()
            .enumerate()
            .map(|(index, name)| ColumnDescriptor::new(name.as_ref(), "", index))
            .collect();
        self
    }

    pub fn with_user_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_properties.insert(key.into(), value.into());
        self
    }

    pub fn with_user_properties(mut self, properties: HashMap<String, String>) -> Self {
        self.user_properties.extend(properties);
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter_string = Some(filter.into());
        self
    }

    pub fn with_fragment(mut self, fragment: PartitionFragment) -> Self {
        self.fragment = Some(fragment);
        self
    }

    pub fn has_filter(&self) -> bool {
        self.filter_string.is_some()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.tuple_description.iter().map(ColumnDescriptor::column_name).collect()
    }

    pub fn user_property(&self, key: &str) -> Option<&str> {
        self.user_properties.get(key).map(String::as_str)
    }
}

/// Read side of the host contract
pub trait ReadAccessor {
    fn open_for_read(&mut self) -> Result<bool>;
    fn read_next_object(&mut self) -> Result<ReadOutcome>;
    fn close_for_read(&mut self) -> Result<()>;
}

/// Write side of the host contract
pub trait WriteAccessor {
    fn open_for_write(&mut self) -> Result<bool>;
    fn write_next_object(&mut self, row: Row) -> Result<bool>;
    fn close_for_write(&mut self) -> Result<()>;
}

/// Accessor for one host request.
///
/// Constructing it makes sure the shared connection matches the request's
/// `CONFIG`. Closing it releases only its own cache and cursor handles; the
/// shared connection stays up for the next accessor.
pub struct StoreAccessor {
    id: Uuid,
    input: InputData,
    options: AccessorOptions,
    manager: Arc<ConnectionManager>,
    pushdown: Pushdown,
    read: ReadPipeline,
    write: WritePipeline,
}

impl StoreAccessor {
    pub fn new(input: InputData, manager: Arc<ConnectionManager>) -> Result<Self> {
        Self::with_pushdown(input, manager, Pushdown::default())
    }

    pub fn with_pushdown(input: InputData, manager: Arc<ConnectionManager>, pushdown: Pushdown) -> Result<Self> {
        let id = Uuid::new_v4();
        let _span = debug_span!("accessor", id = %id).entered();

        let options = AccessorOptions::from_user_properties(&input.user_properties);
        manager.ensure_connection(options.config_path.as_deref())?;
        debug!("Constructed StoreAccessor for '{}'", input.data_source);

        Ok(Self {
            id,
            input,
            options,
            manager,
            pushdown,
            read: ReadPipeline::new(),
            write: WritePipeline::new(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn options(&self) -> &AccessorOptions {
        &self.options
    }

    pub fn input(&self) -> &InputData {
        &self.input
    }

    pub fn rows_written(&self) -> u64 {
        self.write.rows_written()
    }
}

impl ReadAccessor for StoreAccessor {
    fn open_for_read(&mut self) -> Result<bool> {
        let _span = debug_span!("accessor", id = %self.id).entered();
        self.read.open(&self.manager, &self.options, &self.input, &self.pushdown)?;
        Ok(true)
    }

    fn read_next_object(&mut self) -> Result<ReadOutcome> {
        self.read.next()
    }

    fn close_for_read(&mut self) -> Result<()> {
        let _span = debug_span!("accessor", id = %self.id).entered();
        self.read.close()
    }
}

impl WriteAccessor for StoreAccessor {
    fn open_for_write(&mut self) -> Result<bool> {
        let _span = debug_span!("accessor", id = %self.id).entered();
        self.write.open(&self.manager, &self.options, &self.input)?;
        Ok(true)
    }

    fn write_next_object(&mut self, row: Row) -> Result<bool> {
        self.write.write(row)
    }

    fn close_for_write(&mut self) -> Result<()> {
        let _span = debug_span!("accessor", id = %self.id).entered();
        self.write.close()
    }
}

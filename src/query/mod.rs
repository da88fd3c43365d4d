// Module for SQL text assembly
pub mod builder;
pub mod write_target;

pub use builder::{SelectBuilder, build_insert, build_select, qualify_table};
pub use write_target::normalize_write_target;

use crate::types::Value;

/// SQL text plus positional arguments and the execution flags the store honours
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    sql: String,
    args: Vec<Value>,
    schema: Option<String>,
    lazy: bool,
    replicated_only: bool,
}

impl Query {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            args: Vec::new(),
            schema: None,
            lazy: false,
            replicated_only: false,
        }
    }

    pub fn with_schema(mut self, schema: Option<String>) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    pub fn with_replicated_only(mut self, replicated_only: bool) -> Self {
        self.replicated_only = replicated_only;
        self
    }

    /// Replace the positional arguments bound on the next execution
    pub fn set_args(&mut self, args: Vec<Value>) {
        self.args = args;
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    pub fn is_replicated_only(&self) -> bool {
        self.replicated_only
    }
}

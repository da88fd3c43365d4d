// Field values, rows and column metadata
pub mod row;
pub mod value;

pub use row::{ColumnDescriptor, Row};
pub use value::Value;

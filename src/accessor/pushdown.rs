//! Filter and partition pushdown collaborators.
//!
//! Turning the host's filter tree into SQL and working out which partition a
//! worker should scan are separate subsystems. The accessor only talks to them
//! through [`WhereSqlBuilder`] and [`Fragmenter`].

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

use crate::accessor::InputData;
use crate::query::SelectBuilder;
use crate::{Result, StoreBridgeError};

static ISO_DATE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap()
});

/// Translates the request's filter into a SQL boolean expression
pub trait WhereSqlBuilder: Send + Sync {
    /// SQL for the WHERE clause, or `None` if nothing can be pushed down
    fn build_where_sql(&self, input: &InputData) -> Result<Option<String>>;
}

/// Adds the current worker's partition constraint to a SELECT
pub trait Fragmenter: Send + Sync {
    /// Append partition constraints to `builder`; appends nothing if no pruning applies
    fn append_fragmenter_sql(&self, input: &InputData, builder: &mut SelectBuilder) -> Result<()>;
}

/// Uses the host's filter string verbatim, for hosts that already render SQL
#[derive(Debug, Default, Clone, Copy)]
pub struct RawFilter;

impl WhereSqlBuilder for RawFilter {
    fn build_where_sql(&self, input: &InputData) -> Result<Option<String>> {
        Ok(input
            .filter_string
            .as_ref()
            .filter(|f| !f.trim().is_empty())
            .cloned())
    }
}

/// Never restricts the scan
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPartition;

impl Fragmenter for NoPartition {
    fn append_fragmenter_sql(&self, _input: &InputData, _builder: &mut SelectBuilder) -> Result<()> {
        Ok(())
    }
}

/// Partition a worker is responsible for, as attached to its request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionFragment {
    /// `column >= start AND column < end`
    Int { column: String, start: i64, end: i64 },
    /// Same bounds over ISO `YYYY-MM-DD` dates
    Date { column: String, start: String, end: String },
    /// One value of an enumerated column
    Enum { column: String, value: String },
    /// Rows whose partition column is NULL
    Null { column: String },
}

impl PartitionFragment {
    pub fn column(&self) -> &str {
        match self {
            PartitionFragment::Int { column, .. }
            | PartitionFragment::Date { column, .. }
            | PartitionFragment::Enum { column, .. }
            | PartitionFragment::Null { column } => column,
        }
    }

    /// Render the fragment as a SQL constraint
    pub fn to_sql(&self) -> Result<String> {
        let column = self.column();
        if column.trim().is_empty() {
            return Err(StoreBridgeError::Configuration("Partition column must be named".to_string()));
        }

        match self {
            PartitionFragment::Int { start, end, .. } => {
                if start > end {
                    return Err(StoreBridgeError::Configuration(format!(
                        "Partition range of '{column}' is inverted: {start} > {end}"
                    )));
                }
                Ok(format!("{column} >= {start} AND {column} < {end}"))
            }
            PartitionFragment::Date { start, end, .. } => {
                for date in [start, end] {
                    if !ISO_DATE_REGEX.is_match(date) {
                        return Err(StoreBridgeError::Configuration(format!(
                            "Partition bound '{date}' of '{column}' is not a YYYY-MM-DD date"
                        )));
                    }
                }
                Ok(format!("{column} >= '{start}' AND {column} < '{end}'"))
            }
            PartitionFragment::Enum { value, .. } => {
                Ok(format!("{column} = '{}'", value.replace('\'', "''")))
            }
            PartitionFragment::Null { .. } => Ok(format!("{column} IS NULL")),
        }
    }
}

/// Restricts the scan to the fragment attached to the request, if any
#[derive(Debug, Default, Clone, Copy)]
pub struct PartitionFragmenter;

impl Fragmenter for PartitionFragmenter {
    fn append_fragmenter_sql(&self, input: &InputData, builder: &mut SelectBuilder) -> Result<()> {
        if let Some(fragment) = &input.fragment {
            builder.partition(fragment.to_sql()?);
        }
        Ok(())
    }
}

/// The pair of collaborators a read accessor consults
#[derive(Clone)]
pub struct Pushdown {
    pub filter: Arc<dyn WhereSqlBuilder>,
    pub fragmenter: Arc<dyn Fragmenter>,
}

impl Pushdown {
    pub fn new(filter: Arc<dyn WhereSqlBuilder>, fragmenter: Arc<dyn Fragmenter>) -> Self {
        Self { filter, fragmenter }
    }
}

impl Default for Pushdown {
    fn default() -> Self {
        Self {
            filter: Arc::new(RawFilter),
            fragmenter: Arc::new(PartitionFragmenter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_fragment() {
        let fragment = PartitionFragment::Int { column: "id".to_string(), start: 0, end: 100 };
        assert_eq!(fragment.to_sql().unwrap(), "id >= 0 AND id < 100");
    }

    #[test]
    fn test_inverted_int_fragment() {
        let fragment = PartitionFragment::Int { column: "id".to_string(), start: 10, end: 1 };
        assert!(fragment.to_sql().unwrap_err().is_configuration());
    }

    #[test]
    fn test_date_fragment() {
        let fragment = PartitionFragment::Date {
            column: "day".to_string(),
            start: "2024-01-01".to_string(),
            end: "2024-02-01".to_string(),
        };
        assert_eq!(fragment.to_sql().unwrap(), "day >= '2024-01-01' AND day < '2024-02-01'");

        let fragment = PartitionFragment::Date {
            column: "day".to_string(),
            start: "yesterday".to_string(),
            end: "2024-02-01".to_string(),
        };
        assert!(fragment.to_sql().is_err());
    }

    #[test]
    fn test_enum_fragment_quotes_value() {
        let fragment = PartitionFragment::Enum { column: "region".to_string(), value: "o'hare".to_string() };
        assert_eq!(fragment.to_sql().unwrap(), "region = 'o''hare'");
    }

    #[test]
    fn test_null_fragment() {
        let fragment = PartitionFragment::Null { column: "region".to_string() };
        assert_eq!(fragment.to_sql().unwrap(), "region IS NULL");
    }

    #[test]
    fn test_fragmenter_appends_after_filter() {
        let input = InputData::new("t", vec![])
            .with_fragment(PartitionFragment::Int { column: "p".to_string(), start: 1, end: 2 });
        let mut builder = SelectBuilder::new(&["a"], "t");
        builder.filter("x>1");
        PartitionFragmenter.append_fragmenter_sql(&input, &mut builder).unwrap();
        assert_eq!(builder.build().unwrap(), "SELECT a FROM t WHERE (x>1) AND (p >= 1 AND p < 2)");
    }

    #[test]
    fn test_no_fragment_appends_nothing() {
        let input = InputData::new("t", vec![]);
        let mut builder = SelectBuilder::new(&["a"], "t");
        PartitionFragmenter.append_fragmenter_sql(&input, &mut builder).unwrap();
        NoPartition.append_fragmenter_sql(&input, &mut builder).unwrap();
        assert!(!builder.has_constraints());
    }

    #[test]
    fn test_raw_filter() {
        let input = InputData::new("t", vec![]).with_filter("a = 1");
        assert_eq!(RawFilter.build_where_sql(&input).unwrap().as_deref(), Some("a = 1"));

        let input = InputData::new("t", vec![]).with_filter("   ");
        assert_eq!(RawFilter.build_where_sql(&input).unwrap(), None);
    }
}

use crate::{Result, StoreBridgeError};

/// Assembles a SELECT statement piece by piece.
///
/// The filter and every partition constraint end up AND-joined behind a
/// single `WHERE`, each parenthesized once there is more than one. This is the builder handed to fragmenters so they can add
/// their constraints without knowing whether a filter was already pushed down.
#[derive(Debug, Clone, Default)]
pub struct SelectBuilder {
    columns: Vec<String>,
    table: String,
    filter: Option<String>,
    partitions: Vec<String>,
}

impl SelectBuilder {
    pub fn new<S: AsRef<str>>(columns: &[S], table: &str) -> Self {
        Self {
            columns: columns.iter().map(|c| c.as_ref().to_string()).collect(),
            table: table.to_string(),
            filter: None,
            partitions: Vec::new(),
        }
    }

    /// Set the pushed-down filter; blank filters are ignored
    pub fn filter(&mut self, sql: impl Into<String>) -> &mut Self {
        let sql = sql.into();
        if !sql.trim().is_empty() {
            self.filter = Some(sql);
        }
        self
    }

    /// Add a partition constraint; blank constraints are ignored
    pub fn partition(&mut self, sql: impl Into<String>) -> &mut Self {
        let sql = sql.into();
        if !sql.trim().is_empty() {
            self.partitions.push(sql);
        }
        self
    }

    pub fn has_constraints(&self) -> bool {
        self.filter.is_some() || !self.partitions.is_empty()
    }

    pub fn build(&self) -> Result<String> {
        validate_columns(&self.columns)?;
        validate_table(&self.table)?;

        let mut sql = String::with_capacity(64);
        sql.push_str("SELECT ");
        sql.push_str(&self.columns.join(", "));
        sql.push_str(" FROM ");
        sql.push_str(&self.table);

        let constraints: Vec<&str> = self
            .filter
            .iter()
            .chain(self.partitions.iter())
            .map(String::as_str)
            .collect();
        match constraints.as_slice() {
            [] => {}
            [only] => {
                sql.push_str(" WHERE ");
                sql.push_str(only);
            }
            many => {
                let grouped: Vec<String> = many.iter().map(|c| format!("({c})")).collect();
                sql.push_str(" WHERE ");
                sql.push_str(&grouped.join(" AND "));
            }
        }

        Ok(sql)
    }
}

/// Build `SELECT c1, c2 FROM table [WHERE (filter) [AND (partition)]]`
pub fn build_select<S: AsRef<str>>(
    columns: &[S],
    table: &str,
    filter: Option<&str>,
    partition: Option<&str>,
) -> Result<String> {
    let mut builder = SelectBuilder::new(columns, table);
    if let Some(filter) = filter {
        builder.filter(filter);
    }
    if let Some(partition) = partition {
        builder.partition(partition);
    }
    builder.build()
}

/// Build `INSERT INTO table(c1, c2) VALUES (?, ?)`, returning the SQL and the placeholder count
pub fn build_insert<S: AsRef<str>>(columns: &[S], table: &str) -> Result<(String, usize)> {
    validate_columns(columns)?;
    validate_table(table)?;

    let names: Vec<&str> = columns.iter().map(AsRef::as_ref).collect();
    let placeholders = vec!["?"; names.len()];

    let sql = format!(
        "INSERT INTO {}({}) VALUES ({})",
        table,
        names.join(", "),
        placeholders.join(", ")
    );
    Ok((sql, names.len()))
}

/// Qualify an unqualified table with the default schema, quoting the schema.
/// Blank names and names that already carry a schema are left alone.
pub fn qualify_table(table: &str, schema: Option<&str>) -> String {
    match schema {
        Some(schema) if !schema.trim().is_empty() && !table.trim().is_empty() && !table.contains('.') => {
            format!("\"{}\".{}", schema.replace('"', "\"\""), table)
        }
        _ => table.to_string(),
    }
}

fn validate_columns<S: AsRef<str>>(columns: &[S]) -> Result<()> {
    if columns.is_empty() {
        return Err(StoreBridgeError::Configuration(
            "Tuple description must be present.".to_string(),
        ));
    }
    if let Some(position) = columns.iter().position(|c| c.as_ref().trim().is_empty()) {
        return Err(StoreBridgeError::Configuration(format!(
            "Column {position} of the tuple description has no name."
        )));
    }
    Ok(())
}

fn validate_table(table: &str) -> Result<()> {
    if table.trim().is_empty() {
        return Err(StoreBridgeError::Configuration(
            "Table name must be set as DataSource.".to_string(),
        ));
    }
    Ok(())
}

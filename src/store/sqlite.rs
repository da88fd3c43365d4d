use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, params_from_iter};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::fatal;
use crate::query::Query;
use crate::store::{CacheHandle, RowCursor, StoreClient, StoreConnector};
use crate::types::{Row, Value};
use crate::{Result, StoreBridgeError};

/// Connection settings read from the file named by the `CONFIG` option
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    /// SQLite database path or URI
    pub database: String,

    #[serde(default = "default_journal_mode")]
    pub journal_mode: String,

    #[serde(default = "default_synchronous")]
    pub synchronous: String,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Collections served by this store; other names yield no cache handle
    #[serde(default = "default_caches")]
    pub caches: Vec<String>,

    /// Extra schemas attached on connect, name -> database file
    #[serde(default)]
    pub schemas: BTreeMap<String, String>,

    /// Rows fetched per round trip by lazy queries
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_journal_mode() -> String {
    "WAL".to_string()
}

fn default_synchronous() -> String {
    "NORMAL".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_caches() -> Vec<String> {
    vec!["DEFAULT".to_string()]
}

fn default_page_size() -> usize {
    1024
}

impl StoreSettings {
    /// Load settings from a TOML, JSON or YAML file; the format follows the extension
    pub fn load(path: &str) -> Result<Self> {
        let settings: StoreSettings = ::config::Config::builder()
            .add_source(::config::File::from(Path::new(path)))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| fatal(&format!("Failed to read store configuration at '{path}'"), e))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.trim().is_empty() {
            return Err(StoreBridgeError::Fatal("Store configuration has an empty 'database'".to_string()));
        }
        if self.page_size == 0 {
            return Err(StoreBridgeError::Fatal("Store configuration 'page_size' must be positive".to_string()));
        }
        check_identifier("journal_mode", &self.journal_mode)?;
        check_identifier("synchronous", &self.synchronous)?;
        for name in self.schemas.keys() {
            check_identifier("schema", name)?;
        }
        Ok(())
    }

    fn knows_schema(&self, schema: &str) -> bool {
        schema.eq_ignore_ascii_case("main")
            || schema.eq_ignore_ascii_case("temp")
            || self.schemas.keys().any(|s| s.eq_ignore_ascii_case(schema))
    }
}

fn check_identifier(what: &str, value: &str) -> Result<()> {
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(StoreBridgeError::Fatal(format!("Invalid {what} '{value}' in store configuration")));
    }
    Ok(())
}

/// Opens [`SqliteClient`]s from settings files
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteConnector;

impl SqliteConnector {
    pub fn new() -> Self {
        SqliteConnector
    }

    /// Open a client from already-loaded settings
    pub fn connect_with_settings(&self, settings: StoreSettings) -> Result<SqliteClient> {
        settings.validate()?;
        let conn = open_connection(&settings)
            .map_err(|e| fatal(&format!("Failed to open store database '{}'", settings.database), e))?;
        Ok(SqliteClient {
            shared: Arc::new(SqliteShared {
                conn: Mutex::new(Some(conn)),
                settings,
            }),
        })
    }
}

impl StoreConnector for SqliteConnector {
    fn connect(&self, config_path: &str) -> Result<Arc<dyn StoreClient>> {
        let settings = StoreSettings::load(config_path)?;
        let client = self.connect_with_settings(settings)?;
        Ok(Arc::new(client))
    }
}

fn open_connection(settings: &StoreSettings) -> rusqlite::Result<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX
        | OpenFlags::SQLITE_OPEN_URI;

    debug!("Opening store database at {}", settings.database);
    let conn = Connection::open_with_flags(&settings.database, flags)?;
    conn.busy_timeout(Duration::from_millis(settings.busy_timeout_ms))?;

    let pragma_sql = format!(
        "PRAGMA journal_mode = {};
         PRAGMA synchronous = {};",
        settings.journal_mode, settings.synchronous
    );
    conn.execute_batch(&pragma_sql)?;

    for (name, file) in &settings.schemas {
        conn.execute(&format!("ATTACH DATABASE ?1 AS \"{name}\""), [file])?;
        debug!("Attached schema {} from {}", name, file);
    }

    Ok(conn)
}

struct SqliteShared {
    conn: Mutex<Option<Connection>>,
    settings: StoreSettings,
}

impl SqliteShared {
    fn with_connection<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<R>,
    {
        let guard = self.conn.lock();
        let conn = guard
            .as_ref()
            .ok_or_else(|| StoreBridgeError::Fatal("Store connection is closed".to_string()))?;
        f(conn).map_err(StoreBridgeError::Sqlite)
    }

    fn is_open(&self) -> bool {
        self.conn.lock().is_some()
    }
}

/// A live SQLite-backed store client. Cache handles share its one connection.
pub struct SqliteClient {
    shared: Arc<SqliteShared>,
}

impl SqliteClient {
    pub fn settings(&self) -> &StoreSettings {
        &self.shared.settings
    }

    /// Run a closure against the underlying connection, e.g. to prepare tables
    pub fn with_connection<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<R>,
    {
        self.shared.with_connection(f)
    }
}

impl StoreClient for SqliteClient {
    fn cache(&self, name: &str) -> Result<Option<Box<dyn CacheHandle>>> {
        if !self.shared.is_open() {
            return Err(StoreBridgeError::Fatal("Store connection is closed".to_string()));
        }
        if !self.shared.settings.caches.iter().any(|c| c == name) {
            return Ok(None);
        }
        Ok(Some(Box::new(SqliteCache {
            name: name.to_string(),
            shared: self.shared.clone(),
            released: false,
        })))
    }

    fn close(&self) -> Result<()> {
        let Some(conn) = self.shared.conn.lock().take() else {
            return Ok(());
        };
        conn.close().map_err(|(_, e)| StoreBridgeError::Sqlite(e))?;
        info!("Closed store database {}", self.shared.settings.database);
        Ok(())
    }
}

struct SqliteCache {
    name: String,
    shared: Arc<SqliteShared>,
    released: bool,
}

impl SqliteCache {
    fn check_usable(&self, query: &Query) -> Result<()> {
        if self.released {
            return Err(StoreBridgeError::Fatal(format!("Cache '{}' has already been released", self.name)));
        }
        if let Some(schema) = query.schema() {
            if !self.shared.settings.knows_schema(schema) {
                return Err(StoreBridgeError::Fatal(format!("Schema '{schema}' is not known to the store")));
            }
        }
        Ok(())
    }
}

impl CacheHandle for SqliteCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn query(&mut self, query: &Query) -> Result<Box<dyn RowCursor>> {
        self.check_usable(query)?;
        if query.is_replicated_only() {
            debug!("Replicated-only flag has no effect on a single-node store");
        }

        if query.is_lazy() {
            // Surface syntax errors now rather than on the first fetch
            self.shared.with_connection(|conn| conn.prepare_cached(query.sql()).map(|_| ()))?;
            return Ok(Box::new(SqliteCursor {
                buffer: VecDeque::new(),
                pager: Some(Pager {
                    shared: self.shared.clone(),
                    sql: format!("SELECT * FROM ({}) LIMIT ? OFFSET ?", query.sql()),
                    args: query.args().to_vec(),
                    page_size: self.shared.settings.page_size,
                    offset: 0,
                }),
                closed: false,
            }));
        }

        let rows = self
            .shared
            .with_connection(|conn| fetch_rows(conn, query.sql(), query.args().iter()))?;
        debug!("Fetched {} rows from cache {}", rows.len(), self.name);
        Ok(Box::new(SqliteCursor {
            buffer: rows,
            pager: None,
            closed: false,
        }))
    }

    fn execute(&mut self, query: &Query) -> Result<usize> {
        self.check_usable(query)?;
        self.shared.with_connection(|conn| {
            let mut stmt = conn.prepare_cached(query.sql())?;
            stmt.execute(params_from_iter(query.args().iter()))
        })
    }

    fn close(&mut self) -> Result<()> {
        self.released = true;
        Ok(())
    }
}

fn fetch_rows<'a, I>(conn: &Connection, sql: &str, args: I) -> rusqlite::Result<VecDeque<Row>>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut stmt = conn.prepare_cached(sql)?;
    let column_count = stmt.column_count();
    let rows = stmt
        .query_map(params_from_iter(args), |row| {
            (0..column_count).map(|i| row.get::<_, Value>(i)).collect::<rusqlite::Result<Row>>()
        })?
        .collect::<rusqlite::Result<VecDeque<Row>>>()?;
    Ok(rows)
}

/// Fetches a lazy query one page at a time, holding the connection only per page.
///
/// Pages are `LIMIT/OFFSET` windows over the query, so each page rescans the
/// rows before it and the cursor sees no snapshot: rows written through the
/// same client between pages can show up. Eager queries read a snapshot.
struct Pager {
    shared: Arc<SqliteShared>,
    sql: String,
    args: Vec<Value>,
    page_size: usize,
    offset: usize,
}

impl Pager {
    fn fetch(&mut self) -> Result<VecDeque<Row>> {
        let limit = Value::Integer(self.page_size as i64);
        let offset = Value::Integer(self.offset as i64);
        let args = self.args.iter().chain([&limit, &offset]);
        let rows = self.shared.with_connection(|conn| fetch_rows(conn, &self.sql, args))?;
        self.offset += rows.len();
        debug!("Fetched page of {} rows (offset now {})", rows.len(), self.offset);
        Ok(rows)
    }
}

struct SqliteCursor {
    buffer: VecDeque<Row>,
    pager: Option<Pager>,
    closed: bool,
}

impl RowCursor for SqliteCursor {
    fn next_row(&mut self) -> Result<Option<Row>> {
        if self.closed {
            return Err(StoreBridgeError::InvalidState("Cursor has been closed".to_string()));
        }
        if self.buffer.is_empty() {
            if let Some(pager) = self.pager.as_mut() {
                let page = pager.fetch()?;
                if page.len() < pager.page_size {
                    self.pager = None;
                }
                self.buffer = page;
            }
        }
        Ok(self.buffer.pop_front())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.buffer.clear();
        self.pager = None;
        Ok(())
    }
}

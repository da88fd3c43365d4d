#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use storebridge::query::Query;
use storebridge::store::{CacheHandle, RowCursor, StoreClient, StoreConnector};
use storebridge::{ColumnDescriptor, ConnectionManager, InputData, Result, Row, StoreBridgeError, Value};

/// In-process stand-in for a remote store that records everything done to it
#[derive(Default)]
pub struct FakeStore {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub cache_releases: AtomicUsize,
    pub cursor_releases: AtomicUsize,
    pub fail_connect: AtomicBool,
    pub fail_client_close: AtomicBool,
    pub fail_cursor_close: AtomicBool,
    pub fail_cache_close: AtomicBool,
    pub fail_query: AtomicBool,
    pub connect_delay: Mutex<Duration>,
    pub missing_caches: Mutex<Vec<String>>,
    pub events: Mutex<Vec<String>>,
    pub queries: Mutex<Vec<Query>>,
    pub tables: Mutex<HashMap<String, Vec<Row>>>,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_rows(table: &str, rows: Vec<Row>) -> Arc<Self> {
        let store = Self::new();
        store.tables.lock().insert(table.to_string(), rows);
        store
    }

    pub fn manager(self: &Arc<Self>) -> Arc<ConnectionManager> {
        Arc::new(ConnectionManager::new(Arc::new(FakeConnector(self.clone()))))
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn last_query(&self) -> Option<Query> {
        self.queries.lock().last().cloned()
    }

    pub fn rows_of(&self, table: &str) -> Vec<Row> {
        self.tables.lock().get(table).cloned().unwrap_or_default()
    }
}

pub struct FakeConnector(pub Arc<FakeStore>);

impl StoreConnector for FakeConnector {
    fn connect(&self, config_path: &str) -> Result<Arc<dyn StoreClient>> {
        let delay = *self.0.connect_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if self.0.fail_connect.load(Ordering::SeqCst) {
            return Err(StoreBridgeError::Fatal(format!("connection refused for {config_path}")));
        }
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        self.0.events.lock().push(format!("connect:{config_path}"));
        Ok(Arc::new(FakeClient {
            store: self.0.clone(),
            config_path: config_path.to_string(),
        }))
    }
}

struct FakeClient {
    store: Arc<FakeStore>,
    config_path: String,
}

impl StoreClient for FakeClient {
    fn cache(&self, name: &str) -> Result<Option<Box<dyn CacheHandle>>> {
        if self.store.missing_caches.lock().iter().any(|c| c == name) {
            return Ok(None);
        }
        Ok(Some(Box::new(FakeCache {
            name: name.to_string(),
            store: self.store.clone(),
        })))
    }

    fn close(&self) -> Result<()> {
        self.store.events.lock().push(format!("close:{}", self.config_path));
        if self.store.fail_client_close.load(Ordering::SeqCst) {
            return Err(StoreBridgeError::Fatal("client close failed".to_string()));
        }
        self.store.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeCache {
    name: String,
    store: Arc<FakeStore>,
}

/// Table named right after FROM or INTO in the recorded SQL
fn target_table(sql: &str) -> String {
    let upper = sql.to_uppercase();
    let start = upper
        .find(" FROM ")
        .map(|i| i + 6)
        .or_else(|| upper.find("INSERT INTO ").map(|i| i + 12))
        .unwrap_or(0);
    sql[start..]
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default()
        .to_string()
}

impl CacheHandle for FakeCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn query(&mut self, query: &Query) -> Result<Box<dyn RowCursor>> {
        self.store.queries.lock().push(query.clone());
        if self.store.fail_query.load(Ordering::SeqCst) {
            return Err(StoreBridgeError::Fatal("query failed".to_string()));
        }
        let rows = self.store.rows_of(&target_table(query.sql()));
        Ok(Box::new(FakeCursor {
            rows: rows.into(),
            store: self.store.clone(),
            ended: false,
        }))
    }

    fn execute(&mut self, query: &Query) -> Result<usize> {
        self.store.queries.lock().push(query.clone());
        if self.store.fail_query.load(Ordering::SeqCst) {
            return Err(StoreBridgeError::Fatal("insert failed".to_string()));
        }
        let row: Row = query.args().iter().cloned().collect();
        self.store
            .tables
            .lock()
            .entry(target_table(query.sql()))
            .or_default()
            .push(row);
        Ok(1)
    }

    fn close(&mut self) -> Result<()> {
        self.store.cache_releases.fetch_add(1, Ordering::SeqCst);
        if self.store.fail_cache_close.load(Ordering::SeqCst) {
            return Err(StoreBridgeError::Fatal("cache release failed".to_string()));
        }
        Ok(())
    }
}

/// Strict cursor: polling it again after it reported the end is an error
struct FakeCursor {
    rows: VecDeque<Row>,
    store: Arc<FakeStore>,
    ended: bool,
}

impl RowCursor for FakeCursor {
    fn next_row(&mut self) -> Result<Option<Row>> {
        if self.ended {
            return Err(StoreBridgeError::Fatal("cursor polled after the end".to_string()));
        }
        let row = self.rows.pop_front();
        self.ended = row.is_none();
        Ok(row)
    }

    fn close(&mut self) -> Result<()> {
        self.store.cursor_releases.fetch_add(1, Ordering::SeqCst);
        if self.store.fail_cursor_close.load(Ordering::SeqCst) {
            return Err(StoreBridgeError::Fatal("cursor release failed".to_string()));
        }
        Ok(())
    }
}

pub fn columns(names: &[&str]) -> Vec<ColumnDescriptor> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| ColumnDescriptor::new(*name, "text", i))
        .collect()
}

pub fn request(table: &str, names: &[&str], config: &str) -> InputData {
    InputData::new(table, columns(names)).with_user_property("CONFIG", config)
}

pub fn row(values: &[i64]) -> Row {
    values.iter().map(|v| Value::Integer(*v)).collect()
}

//! Built-in SQLite backend
//!
//! URLs: `sqlite::memory:`, `sqlite:/path/to/file.db`, optionally prefixed with
//! `jdbc:`. Properties: `readonly`, `busy_timeout` (ms), `max_rows`.
//!
//! Statements keep their SQL and bound values and are re-prepared on every
//! execute. Query rows are stepped on a worker thread that owns the prepared
//! statement and hands them over in batches of the fetch size. The worker
//! holds the session while it streams; any other call on the connection asks
//! it to spill its remaining rows into the cursor and let go.

use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{Connection, OpenFlags};
use sqlbridge_client::protocol::{
    sql_types, BigDecimal, ColumnDescriptor, TransactionIsolation, COLUMN_NULLABLE_UNKNOWN,
};

use super::{
    Backend, BackendConnection, BackendCursor, BackendError, BackendResult, BackendStatement,
    BoundValue, CancellationToken, DatabaseInfo, ExecuteOutcome, MaterializedCursor,
    MetadataFilter, NativeRow, NativeValue,
};

/// VM instructions between two cancellation checks
const PROGRESS_OPS: i32 = 1_000;

/// Rows per batch when the statement has no fetch size
const DEFAULT_BATCH_ROWS: usize = 256;

/// How long a caller waits for the session before signalling the streams again
const LOCK_POLL: Duration = Duration::from_millis(50);

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Core SQLite functions, reported when the library was built without
/// `PRAGMA function_list`
const CORE_FUNCTIONS: &[&str] = &[
    "abs", "avg", "changes", "char", "coalesce", "count", "date", "datetime", "glob",
    "group_concat", "hex", "ifnull", "iif", "instr", "julianday", "last_insert_rowid", "length",
    "like", "likelihood", "lower", "ltrim", "max", "min", "nullif", "printf", "quote", "random",
    "randomblob", "replace", "round", "rtrim", "sign", "strftime", "substr", "substring", "sum",
    "time", "total", "total_changes", "trim", "typeof", "unicode", "unlikely", "upper",
    "zeroblob",
];

#[derive(Debug, Default)]
pub struct SqliteBackend;

impl SqliteBackend {
    pub fn new() -> Self {
        Self
    }
}

fn database_path(url: &str) -> Option<&str> {
    let rest = url.strip_prefix("jdbc:").unwrap_or(url);
    rest.strip_prefix("sqlite:")
}

fn property_flag(properties: &HashMap<String, String>, key: &str) -> bool {
    properties
        .get(key)
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false)
}

impl Backend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn accepts_url(&self, url: &str) -> bool {
        database_path(url).is_some()
    }

    fn connect(
        &self,
        url: &str,
        properties: &HashMap<String, String>,
    ) -> BackendResult<Box<dyn BackendConnection>> {
        let path = database_path(url)
            .ok_or_else(|| BackendError::Unsupported(format!("not a SQLite URL: '{}'", url)))?;
        let read_only = property_flag(properties, "readonly");

        let conn = if path.is_empty() || path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            let path = path.strip_prefix("//").unwrap_or(path);
            let flags = if read_only {
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX
            } else {
                OpenFlags::default()
            };
            Connection::open_with_flags(path, flags)?
        };

        if let Some(ms) = properties.get("busy_timeout") {
            let ms: u64 = ms.parse().map_err(|_| {
                BackendError::Unsupported(format!("invalid busy_timeout '{}'", ms))
            })?;
            conn.busy_timeout(Duration::from_millis(ms))?;
        }
        if read_only {
            conn.execute_batch("PRAGMA query_only = 1")?;
        }
        let max_rows = match properties.get("max_rows") {
            Some(v) => v
                .parse()
                .map_err(|_| BackendError::Unsupported(format!("invalid max_rows '{}'", v)))?,
            None => 0,
        };

        tracing::debug!("Opened SQLite database '{}'", path);

        Ok(Box::new(SqliteConnection {
            shared: Arc::new(SharedSession {
                session: Mutex::new(SqliteSession {
                    conn: Some(conn),
                    auto_commit: true,
                    catalog: "main".to_string(),
                    read_only,
                    max_rows,
                }),
                streams: Mutex::new(Vec::new()),
            }),
        }))
    }
}

struct SqliteSession {
    conn: Option<Connection>,
    auto_commit: bool,
    catalog: String,
    read_only: bool,
    max_rows: usize,
}

impl SqliteSession {
    fn conn(&self) -> BackendResult<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| BackendError::InvalidState("connection is closed".to_string()))
    }
}

/// Requests a caller can send to a streaming cursor worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    /// Produce the next batch
    Next,
    /// Hand over every remaining row and release the session
    Spill,
    /// Drop the remaining rows and release the session
    Stop,
}

/// Caller side of a cursor worker
struct StreamControl {
    requests: Sender<Control>,
    abort: CancellationToken,
}

impl StreamControl {
    /// False once the worker is gone
    fn signal(&self, control: Control) -> bool {
        if control == Control::Stop {
            self.abort.cancel();
        }
        self.requests.send(control).is_ok()
    }
}

/// Session state plus the cursor workers currently streaming from it
struct SharedSession {
    session: Mutex<SqliteSession>,
    streams: Mutex<Vec<Weak<StreamControl>>>,
}

impl SharedSession {
    fn lock(&self) -> MutexGuard<'_, SqliteSession> {
        self.lock_with(Control::Spill)
    }

    /// Take the session, asking any streaming worker to give it up
    fn lock_with(&self, control: Control) -> MutexGuard<'_, SqliteSession> {
        loop {
            self.streams
                .lock()
                .retain(|stream| stream.upgrade().is_some_and(|s| s.signal(control)));
            if let Some(session) = self.session.try_lock_for(LOCK_POLL) {
                return session;
            }
        }
    }

    fn register(&self, stream: Weak<StreamControl>) {
        self.streams.lock().push(stream);
    }
}

pub struct SqliteConnection {
    shared: Arc<SharedSession>,
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn database_names(conn: &Connection) -> BackendResult<Vec<String>> {
    let mut stmt = conn.prepare("PRAGMA database_list")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

fn function_names(conn: &Connection, sql: &str, pattern: &str) -> BackendResult<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let names = stmt
        .query_map([pattern], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

fn metadata_columns(layout: &[(&str, i32)]) -> Vec<ColumnDescriptor> {
    layout
        .iter()
        .enumerate()
        .map(|(i, (name, code))| {
            let type_name = if *code == sql_types::SMALLINT {
                "SMALLINT"
            } else {
                "TEXT"
            };
            ColumnDescriptor::new(i as i32, name, *code, type_name)
        })
        .collect()
}

impl BackendConnection for SqliteConnection {
    fn database_info(&self) -> BackendResult<DatabaseInfo> {
        let number = rusqlite::version_number();
        Ok(DatabaseInfo {
            product_name: Some("SQLite".to_string()),
            product_version: Some(rusqlite::version().to_string()),
            major_version: number / 1_000_000,
            minor_version: (number / 1_000) % 1_000,
        })
    }

    fn catalog(&self) -> BackendResult<Option<String>> {
        let session = self.shared.lock();
        session.conn()?;
        Ok(Some(session.catalog.clone()))
    }

    fn set_catalog(&self, catalog: &str) -> BackendResult<()> {
        let mut session = self.shared.lock();
        if !database_names(session.conn()?)?.iter().any(|n| n == catalog) {
            return Err(BackendError::Unsupported(format!(
                "unknown catalog '{}'",
                catalog
            )));
        }
        session.catalog = catalog.to_string();
        Ok(())
    }

    fn set_auto_commit(&self, auto_commit: bool) -> BackendResult<()> {
        let mut session = self.shared.lock();
        if session.auto_commit == auto_commit {
            return Ok(());
        }
        let conn = session.conn()?;
        if auto_commit {
            // leaving manual mode commits the open transaction
            if !conn.is_autocommit() {
                conn.execute_batch("COMMIT")?;
            }
        } else {
            conn.execute_batch("BEGIN")?;
        }
        session.auto_commit = auto_commit;
        Ok(())
    }

    fn transaction_isolation(&self) -> BackendResult<TransactionIsolation> {
        let session = self.shared.lock();
        let uncommitted: i64 =
            session
                .conn()?
                .query_row("PRAGMA read_uncommitted", [], |row| row.get(0))?;
        Ok(if uncommitted != 0 {
            TransactionIsolation::ReadUncommitted
        } else {
            TransactionIsolation::Serializable
        })
    }

    fn set_transaction_isolation(&self, level: TransactionIsolation) -> BackendResult<()> {
        let session = self.shared.lock();
        let conn = session.conn()?;
        match level {
            TransactionIsolation::Serializable => {
                conn.execute_batch("PRAGMA read_uncommitted = 0")?
            }
            TransactionIsolation::ReadUncommitted => {
                conn.execute_batch("PRAGMA read_uncommitted = 1")?
            }
            other => {
                return Err(BackendError::Unsupported(format!(
                    "SQLite does not support isolation level {:?}",
                    other
                )))
            }
        }
        Ok(())
    }

    fn commit(&self) -> BackendResult<()> {
        let session = self.shared.lock();
        let conn = session.conn()?;
        if session.auto_commit {
            return Err(BackendError::InvalidState(
                "commit is not allowed in auto-commit mode".to_string(),
            ));
        }
        if !conn.is_autocommit() {
            conn.execute_batch("COMMIT")?;
        }
        conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn rollback(&self) -> BackendResult<()> {
        let session = self.shared.lock();
        let conn = session.conn()?;
        if session.auto_commit {
            return Err(BackendError::InvalidState(
                "rollback is not allowed in auto-commit mode".to_string(),
            ));
        }
        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK")?;
        }
        conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn prepare(&self, sql: &str) -> BackendResult<Box<dyn BackendStatement>> {
        let session = self.shared.lock();
        let parameter_count = session.conn()?.prepare(sql)?.parameter_count();
        Ok(Box::new(SqliteStatement {
            shared: self.shared.clone(),
            sql: sql.to_string(),
            params: vec![Value::Null; parameter_count],
            fetch_size: 0,
            max_rows: session.max_rows,
            closed: false,
        }))
    }

    fn tables(&self, filter: &MetadataFilter) -> BackendResult<Box<dyn BackendCursor>> {
        let columns = metadata_columns(&[
            ("TABLE_CAT", sql_types::VARCHAR),
            ("TABLE_SCHEM", sql_types::VARCHAR),
            ("TABLE_NAME", sql_types::VARCHAR),
            ("TABLE_TYPE", sql_types::VARCHAR),
            ("REMARKS", sql_types::VARCHAR),
            ("TYPE_CAT", sql_types::VARCHAR),
            ("TYPE_SCHEM", sql_types::VARCHAR),
            ("TYPE_NAME", sql_types::VARCHAR),
            ("SELF_REFERENCING_COL_NAME", sql_types::VARCHAR),
            ("REF_GENERATION", sql_types::VARCHAR),
        ]);

        let session = self.shared.lock();
        let conn = session.conn()?;
        let catalog = filter
            .catalog
            .clone()
            .unwrap_or_else(|| session.catalog.clone());
        if !database_names(conn)?.contains(&catalog) {
            return Ok(Box::new(MaterializedCursor::new(columns, Vec::new())));
        }

        let sql = format!(
            "SELECT name, type FROM {}.sqlite_master \
             WHERE type IN ('table', 'view') AND name LIKE ?1",
            quote_ident(&catalog)
        );
        let pattern = filter.name_pattern.as_deref().unwrap_or("%");
        let mut stmt = conn.prepare(&sql)?;
        let found = stmt
            .query_map([pattern], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut entries: Vec<(String, String)> = found
            .into_iter()
            .map(|(name, kind)| {
                let table_type = if name.starts_with("sqlite_") {
                    "SYSTEM TABLE"
                } else if kind == "view" {
                    "VIEW"
                } else {
                    "TABLE"
                };
                (table_type.to_string(), name)
            })
            .filter(|(table_type, _)| match &filter.types {
                Some(types) => types.iter().any(|t| t.eq_ignore_ascii_case(table_type)),
                None => true,
            })
            .collect();
        entries.sort();

        let rows = entries
            .into_iter()
            .map(|(table_type, name)| {
                let mut row = vec![
                    NativeValue::Text(catalog.clone()),
                    NativeValue::Null,
                    NativeValue::Text(name),
                    NativeValue::Text(table_type),
                ];
                row.extend((0..6).map(|_| NativeValue::Null));
                row
            })
            .collect();
        Ok(Box::new(MaterializedCursor::new(columns, rows)))
    }

    fn catalogs(&self) -> BackendResult<Box<dyn BackendCursor>> {
        let columns = metadata_columns(&[("TABLE_CAT", sql_types::VARCHAR)]);
        let session = self.shared.lock();
        let rows = database_names(session.conn()?)?
            .into_iter()
            .map(|name| vec![NativeValue::Text(name)])
            .collect();
        Ok(Box::new(MaterializedCursor::new(columns, rows)))
    }

    fn procedures(&self, _filter: &MetadataFilter) -> BackendResult<Box<dyn BackendCursor>> {
        let columns = metadata_columns(&[
            ("PROCEDURE_CAT", sql_types::VARCHAR),
            ("PROCEDURE_SCHEM", sql_types::VARCHAR),
            ("PROCEDURE_NAME", sql_types::VARCHAR),
            ("RESERVED1", sql_types::VARCHAR),
            ("RESERVED2", sql_types::VARCHAR),
            ("RESERVED3", sql_types::VARCHAR),
            ("REMARKS", sql_types::VARCHAR),
            ("PROCEDURE_TYPE", sql_types::SMALLINT),
            ("SPECIFIC_NAME", sql_types::VARCHAR),
        ]);
        self.shared.lock().conn()?;
        // SQLite has no stored procedures
        Ok(Box::new(MaterializedCursor::new(columns, Vec::new())))
    }

    fn functions(&self, filter: &MetadataFilter) -> BackendResult<Box<dyn BackendCursor>> {
        let columns = metadata_columns(&[
            ("FUNCTION_CAT", sql_types::VARCHAR),
            ("FUNCTION_SCHEM", sql_types::VARCHAR),
            ("FUNCTION_NAME", sql_types::VARCHAR),
            ("REMARKS", sql_types::VARCHAR),
            ("FUNCTION_TYPE", sql_types::SMALLINT),
            ("SPECIFIC_NAME", sql_types::VARCHAR),
        ]);

        let session = self.shared.lock();
        let conn = session.conn()?;
        let pattern = filter.name_pattern.as_deref().unwrap_or("%");
        let names = match function_names(
            conn,
            "SELECT DISTINCT name FROM pragma_function_list WHERE name LIKE ?1 ORDER BY name",
            pattern,
        ) {
            Ok(names) => names,
            // library built without the introspection pragmas
            Err(_) => {
                let core = CORE_FUNCTIONS
                    .iter()
                    .map(|name| format!("('{}')", name))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!(
                    "WITH core(name) AS (VALUES {}) \
                     SELECT name FROM core WHERE name LIKE ?1 ORDER BY name",
                    core
                );
                function_names(conn, &sql, pattern)?
            }
        };

        let catalog = session.catalog.clone();
        let rows = names
            .into_iter()
            .map(|name| {
                vec![
                    NativeValue::Text(catalog.clone()),
                    NativeValue::Null,
                    NativeValue::Text(name.clone()),
                    NativeValue::Null,
                    // functionNoTable
                    NativeValue::I16(1),
                    NativeValue::Text(name),
                ]
            })
            .collect();
        Ok(Box::new(MaterializedCursor::new(columns, rows)))
    }

    fn is_read_only(&self) -> BackendResult<bool> {
        let session = self.shared.lock();
        let query_only: i64 = session
            .conn()?
            .query_row("PRAGMA query_only", [], |row| row.get(0))?;
        Ok(session.read_only || query_only != 0)
    }

    fn supports_group_by(&self) -> BackendResult<bool> {
        self.shared.lock().conn()?;
        Ok(true)
    }

    fn close(&self) -> BackendResult<()> {
        let conn = self.shared.lock_with(Control::Stop).conn.take();
        if let Some(conn) = conn {
            conn.close().map_err(|(_, e)| BackendError::Sqlite(e))?;
        }
        Ok(())
    }
}

pub struct SqliteStatement {
    shared: Arc<SharedSession>,
    sql: String,
    params: Vec<Value>,
    fetch_size: usize,
    max_rows: usize,
    closed: bool,
}

fn to_sqlite_value(value: BoundValue) -> Value {
    match value {
        BoundValue::Null => Value::Null,
        BoundValue::Bool(v) => Value::Integer(v as i64),
        BoundValue::I16(v) => Value::Integer(v as i64),
        BoundValue::I32(v) => Value::Integer(v as i64),
        BoundValue::I64(v) => Value::Integer(v),
        BoundValue::F32(v) => Value::Real(v as f64),
        BoundValue::F64(v) => Value::Real(v),
        BoundValue::Text(v) => Value::Text(v),
        BoundValue::Date(v) => Value::Text(v.format("%Y-%m-%d").to_string()),
        BoundValue::Time(v) => Value::Text(v.format("%H:%M:%S%.3f").to_string()),
        BoundValue::Timestamp(v) => Value::Text(v.format("%Y-%m-%d %H:%M:%S%.3f").to_string()),
        BoundValue::Decimal(v) => Value::Text(v.to_string()),
    }
}

impl BackendStatement for SqliteStatement {
    fn parameter_count(&self) -> usize {
        self.params.len()
    }

    fn bind(&mut self, index: usize, value: BoundValue) -> BackendResult<()> {
        if index == 0 || index > self.params.len() {
            return Err(BackendError::InvalidState(format!(
                "parameter index {} out of range 1..={}",
                index,
                self.params.len()
            )));
        }
        self.params[index - 1] = to_sqlite_value(value);
        Ok(())
    }

    fn set_fetch_size(&mut self, rows: usize) {
        self.fetch_size = rows;
    }

    fn fetch_size(&self) -> usize {
        self.fetch_size
    }

    fn max_rows(&self) -> usize {
        self.max_rows
    }

    fn execute(&mut self, token: &CancellationToken) -> BackendResult<ExecuteOutcome> {
        if self.closed {
            return Err(BackendError::InvalidState("statement is closed".to_string()));
        }
        let session = self.shared.lock();
        let conn = session.conn()?;
        let mut stmt = conn.prepare(&self.sql)?;

        if stmt.column_count() == 0 {
            let watcher = token.clone();
            conn.progress_handler(PROGRESS_OPS, Some(move || watcher.is_cancelled()));
            let outcome = run_update(conn, &mut stmt, &self.params);
            conn.progress_handler(0, None::<fn() -> bool>);
            return match outcome {
                Err(_) if token.is_cancelled() => Err(BackendError::Cancelled),
                other => other.map(ExecuteOutcome::UpdateCount),
            };
        }

        let shapes: Vec<(String, Option<String>)> = stmt
            .columns()
            .iter()
            .map(|c| (c.name().to_string(), c.decl_type().map(str::to_string)))
            .collect();
        drop(stmt);
        drop(session);

        let job = CursorJob {
            sql: self.sql.clone(),
            params: self.params.clone(),
            kinds: shapes
                .iter()
                .map(|(_, decl)| decl.as_deref().map_or(Affinity::Dynamic, Affinity::classify))
                .collect(),
            batch_rows: if self.fetch_size > 0 {
                self.fetch_size
            } else {
                DEFAULT_BATCH_ROWS
            },
            max_rows: self.max_rows,
            token: token.clone(),
            abort: CancellationToken::new(),
        };
        let cursor = SqliteCursor::start(&self.shared, job, &shapes)?;
        Ok(ExecuteOutcome::Rows(Box::new(cursor)))
    }

    fn close(&mut self) -> BackendResult<()> {
        self.closed = true;
        self.params.clear();
        Ok(())
    }
}

fn total_changes(conn: &Connection) -> BackendResult<i64> {
    Ok(conn.query_row("SELECT total_changes()", [], |row| row.get(0))?)
}

fn bind_all(stmt: &mut rusqlite::Statement<'_>, params: &[Value]) -> BackendResult<()> {
    for (i, value) in params.iter().enumerate() {
        stmt.raw_bind_parameter(i + 1, value)?;
    }
    Ok(())
}

fn run_update(
    conn: &Connection,
    stmt: &mut rusqlite::Statement<'_>,
    params: &[Value],
) -> BackendResult<i64> {
    bind_all(stmt, params)?;
    let before = total_changes(conn)?;
    let changes = stmt.raw_execute()?;
    // DDL leaves sqlite3_changes() at its previous value
    Ok(if total_changes(conn)? == before {
        0
    } else {
        changes as i64
    })
}

/// How a batch of rows ends
enum BatchEnd {
    More,
    Done,
    Failed(BackendError),
}

struct Batch {
    rows: Vec<NativeRow>,
    end: BatchEnd,
}

/// Everything a cursor worker needs to run a query on its own thread
struct CursorJob {
    sql: String,
    params: Vec<Value>,
    kinds: Vec<Affinity>,
    batch_rows: usize,
    max_rows: usize,
    token: CancellationToken,
    /// Set when the cursor goes away or the connection closes
    abort: CancellationToken,
}

impl CursorJob {
    fn interrupted(&self, err: BackendError) -> BackendError {
        if self.token.is_cancelled() {
            BackendError::Cancelled
        } else {
            err
        }
    }

    fn run(
        self,
        shared: &SharedSession,
        stream: Weak<StreamControl>,
        feed: &Sender<Batch>,
        requests: &Receiver<Control>,
    ) {
        let session = shared.lock();
        shared.register(stream);
        let conn = match session.conn() {
            Ok(conn) => conn,
            Err(e) => {
                let _ = feed.send(Batch {
                    rows: Vec::new(),
                    end: BatchEnd::Failed(e),
                });
                return;
            }
        };

        let token = self.token.clone();
        let abort = self.abort.clone();
        conn.progress_handler(
            PROGRESS_OPS,
            Some(move || token.is_cancelled() || abort.is_cancelled()),
        );
        if let Err(e) = self.pump(conn, feed, requests) {
            let _ = feed.send(Batch {
                rows: Vec::new(),
                end: BatchEnd::Failed(self.interrupted(e)),
            });
        }
        conn.progress_handler(0, None::<fn() -> bool>);
    }

    /// Step the query, one batch per request. Errors returned here happened
    /// before any row was produced.
    fn pump(
        &self,
        conn: &Connection,
        feed: &Sender<Batch>,
        requests: &Receiver<Control>,
    ) -> BackendResult<()> {
        let mut stmt = conn.prepare(&self.sql)?;
        bind_all(&mut stmt, &self.params)?;
        let mut rows = stmt.raw_query();
        let mut produced = 0;
        let mut wanted = self.batch_rows;

        loop {
            let mut batch = Vec::new();
            let end = loop {
                if self.max_rows > 0 && produced >= self.max_rows {
                    break BatchEnd::Done;
                }
                if batch.len() >= wanted {
                    break BatchEnd::More;
                }
                let row = match rows.next() {
                    Ok(Some(row)) => row,
                    Ok(None) => break BatchEnd::Done,
                    Err(e) => break BatchEnd::Failed(self.interrupted(e.into())),
                };
                match self.read_row(row) {
                    Ok(values) => {
                        batch.push(values);
                        produced += 1;
                    }
                    Err(e) => break BatchEnd::Failed(e),
                }
            };

            let more = matches!(end, BatchEnd::More);
            if feed.send(Batch { rows: batch, end }).is_err() || !more {
                return Ok(());
            }
            match requests.recv() {
                Ok(Control::Next) => wanted = self.batch_rows,
                Ok(Control::Spill) => wanted = usize::MAX,
                Ok(Control::Stop) | Err(_) => return Ok(()),
            }
        }
    }

    fn read_row(&self, row: &rusqlite::Row<'_>) -> BackendResult<NativeRow> {
        let mut values = Vec::with_capacity(self.kinds.len());
        for (i, kind) in self.kinds.iter().enumerate() {
            values.push(kind.read(row.get_ref(i)?));
        }
        Ok(values)
    }
}

/// Cursor fed by a worker thread, one batch at a time
pub struct SqliteCursor {
    columns: Vec<ColumnDescriptor>,
    feed: Receiver<Batch>,
    control: Option<Arc<StreamControl>>,
    pending: VecDeque<NativeRow>,
    failure: Option<BackendError>,
    in_flight: bool,
    done: bool,
}

impl SqliteCursor {
    /// Spawn the worker and wait for its first batch, so statement errors
    /// surface from execute
    fn start(
        shared: &Arc<SharedSession>,
        job: CursorJob,
        shapes: &[(String, Option<String>)],
    ) -> BackendResult<Self> {
        let (feed_tx, feed) = mpsc::channel();
        let (requests_tx, requests) = mpsc::channel();
        let kinds = job.kinds.clone();
        let control = Arc::new(StreamControl {
            requests: requests_tx,
            abort: job.abort.clone(),
        });

        let stream = Arc::downgrade(&control);
        let worker_shared = shared.clone();
        thread::Builder::new()
            .name("sqlite-cursor".to_string())
            .spawn(move || job.run(&worker_shared, stream, &feed_tx, &requests))?;

        let first = feed.recv().map_err(|_| {
            BackendError::InvalidState("cursor worker exited before the first batch".to_string())
        })?;
        let first = match first {
            Batch {
                rows,
                end: BatchEnd::Failed(e),
            } if rows.is_empty() => return Err(e),
            batch => batch,
        };

        let columns = shapes
            .iter()
            .zip(&kinds)
            .enumerate()
            .map(|(i, ((name, decl), kind))| {
                let sample = first
                    .rows
                    .iter()
                    .map(|r| &r[i])
                    .find(|v| !matches!(v, NativeValue::Null));
                describe_column(i, name, decl.as_deref(), *kind, sample)
            })
            .collect();

        let mut cursor = Self {
            columns,
            feed,
            control: Some(control),
            pending: VecDeque::new(),
            failure: None,
            in_flight: true,
            done: false,
        };
        cursor.accept(first);
        Ok(cursor)
    }

    fn accept(&mut self, batch: Batch) {
        self.in_flight = false;
        self.pending.extend(batch.rows);
        match batch.end {
            BatchEnd::More => {}
            BatchEnd::Done => self.done = true,
            BatchEnd::Failed(e) => {
                self.failure = Some(e);
                self.done = true;
            }
        }
    }

    fn stop(&mut self) {
        if let Some(control) = self.control.take() {
            control.abort.cancel();
        }
    }
}

impl BackendCursor for SqliteCursor {
    fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    fn next_row(&mut self) -> BackendResult<Option<NativeRow>> {
        loop {
            if let Some(row) = self.pending.pop_front() {
                return Ok(Some(row));
            }
            if let Some(e) = self.failure.take() {
                return Err(e);
            }
            if self.done {
                return Ok(None);
            }

            if !self.in_flight {
                // a worker that already spilled has hung up; its rows are queued
                if let Some(control) = &self.control {
                    let _ = control.requests.send(Control::Next);
                }
                self.in_flight = true;
            }
            let batch = self.feed.recv().map_err(|_| {
                self.done = true;
                BackendError::InvalidState("connection closed while rows were pending".to_string())
            })?;
            self.accept(batch);
        }
    }

    fn close(&mut self) -> BackendResult<()> {
        self.stop();
        self.pending.clear();
        self.failure = None;
        self.done = true;
        Ok(())
    }
}

impl Drop for SqliteCursor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// How a column's declared type shapes the values read from it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Affinity {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Double,
    Decimal,
    Date,
    Time,
    Timestamp,
    Text,
    Clob,
    Blob,
    Dynamic,
}

impl Affinity {
    fn classify(decl: &str) -> Self {
        let upper = decl.to_ascii_uppercase();
        let has = |needle: &str| upper.contains(needle);
        if upper.starts_with("BOOL") {
            Affinity::Boolean
        } else if has("TINYINT") {
            Affinity::TinyInt
        } else if has("SMALLINT") {
            Affinity::SmallInt
        } else if has("BIGINT") {
            Affinity::BigInt
        } else if has("INT") {
            Affinity::Integer
        } else if upper.starts_with("DATETIME") || upper.starts_with("TIMESTAMP") {
            Affinity::Timestamp
        } else if upper == "DATE" {
            Affinity::Date
        } else if upper == "TIME" {
            Affinity::Time
        } else if has("CLOB") {
            Affinity::Clob
        } else if has("CHAR") || has("TEXT") {
            Affinity::Text
        } else if has("BLOB") || has("BINARY") {
            Affinity::Blob
        } else if has("REAL") || has("FLOA") || has("DOUB") {
            Affinity::Double
        } else if has("DEC") || has("NUMERIC") {
            Affinity::Decimal
        } else {
            Affinity::Dynamic
        }
    }

    fn read(self, value: ValueRef<'_>) -> NativeValue {
        match (self, value) {
            (_, ValueRef::Null) => NativeValue::Null,
            (Affinity::Boolean, ValueRef::Integer(i)) => NativeValue::Bool(i != 0),
            (Affinity::TinyInt, ValueRef::Integer(i)) => {
                i8::try_from(i).map_or(NativeValue::I64(i), NativeValue::I8)
            }
            (Affinity::SmallInt, ValueRef::Integer(i)) => {
                i16::try_from(i).map_or(NativeValue::I64(i), NativeValue::I16)
            }
            (Affinity::Integer, ValueRef::Integer(i)) => {
                i32::try_from(i).map_or(NativeValue::I64(i), NativeValue::I32)
            }
            (Affinity::Double, ValueRef::Integer(i)) => NativeValue::F64(i as f64),
            (Affinity::Decimal, ValueRef::Integer(i)) => {
                NativeValue::Decimal(BigDecimal::new(i.into(), 0))
            }
            (Affinity::Decimal, ValueRef::Real(f)) => f
                .to_string()
                .parse()
                .map_or(NativeValue::F64(f), NativeValue::Decimal),
            (Affinity::Decimal, ValueRef::Text(t)) => match std::str::from_utf8(t)
                .ok()
                .and_then(|s| s.trim().parse().ok())
            {
                Some(d) => NativeValue::Decimal(d),
                None => text_value(t),
            },
            (Affinity::Date, ValueRef::Text(t)) => std::str::from_utf8(t)
                .ok()
                .and_then(|s| NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok())
                .map_or_else(|| text_value(t), NativeValue::Date),
            (Affinity::Date, ValueRef::Integer(ms)) => DateTime::from_timestamp_millis(ms)
                .map_or(NativeValue::I64(ms), |dt| NativeValue::Date(dt.date_naive())),
            (Affinity::Timestamp, ValueRef::Text(t)) => std::str::from_utf8(t)
                .ok()
                .and_then(parse_timestamp)
                .map_or_else(|| text_value(t), NativeValue::Timestamp),
            (Affinity::Timestamp, ValueRef::Integer(ms)) => DateTime::from_timestamp_millis(ms)
                .map_or(NativeValue::I64(ms), |dt| NativeValue::Timestamp(dt.naive_utc())),
            (Affinity::Time, ValueRef::Text(t)) => std::str::from_utf8(t)
                .ok()
                .and_then(|s| NaiveTime::parse_from_str(s, "%H:%M:%S%.f").ok())
                .map_or_else(|| text_value(t), NativeValue::Time),
            (Affinity::Clob, ValueRef::Text(t)) => {
                NativeValue::Clob(Box::new(Cursor::new(t.to_vec())))
            }
            (Affinity::Blob, ValueRef::Blob(b)) => {
                NativeValue::Blob(Box::new(Cursor::new(b.to_vec())))
            }
            (_, ValueRef::Integer(i)) => NativeValue::I64(i),
            (_, ValueRef::Real(f)) => NativeValue::F64(f),
            (_, ValueRef::Text(t)) => text_value(t),
            (_, ValueRef::Blob(b)) => NativeValue::Bytes(b.to_vec()),
        }
    }
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// Text that is not valid UTF-8 travels as a character stream so the encoder
/// can reject it
fn text_value(bytes: &[u8]) -> NativeValue {
    match std::str::from_utf8(bytes) {
        Ok(s) => NativeValue::Text(s.to_string()),
        Err(_) => NativeValue::Clob(Box::new(Cursor::new(bytes.to_vec()))),
    }
}

fn describe_column(
    ordinal: usize,
    name: &str,
    decl: Option<&str>,
    kind: Affinity,
    sample: Option<&NativeValue>,
) -> ColumnDescriptor {
    let (code, class_name, display_size, precision) = match kind {
        Affinity::Boolean => (sql_types::BOOLEAN, "bool", 1, 1),
        Affinity::TinyInt => (sql_types::TINYINT, "i8", 4, 3),
        Affinity::SmallInt => (sql_types::SMALLINT, "i16", 6, 5),
        Affinity::Integer => (sql_types::INTEGER, "i32", 11, 10),
        Affinity::BigInt => (sql_types::BIGINT, "i64", 20, 19),
        Affinity::Double => {
            let upper = decl.unwrap_or_default().to_ascii_uppercase();
            let code = if upper.contains("FLOA") {
                sql_types::FLOAT
            } else if upper.contains("REAL") {
                sql_types::REAL
            } else {
                sql_types::DOUBLE
            };
            (code, "f64", 25, 15)
        }
        Affinity::Decimal => (sql_types::DECIMAL, "BigDecimal", 0, 0),
        Affinity::Date => (sql_types::DATE, "NaiveDate", 10, 10),
        Affinity::Time => (sql_types::TIME, "NaiveTime", 12, 12),
        Affinity::Timestamp => (sql_types::TIMESTAMP, "NaiveDateTime", 23, 23),
        Affinity::Text => (sql_types::VARCHAR, "String", 0, 0),
        Affinity::Clob => (sql_types::CLOB, "String", 0, 0),
        Affinity::Blob => (sql_types::BLOB, "Vec<u8>", 0, 0),
        Affinity::Dynamic => match sample {
            Some(NativeValue::I64(_)) => (sql_types::BIGINT, "i64", 20, 19),
            Some(NativeValue::F64(_)) => (sql_types::DOUBLE, "f64", 25, 15),
            Some(NativeValue::Text(_)) | Some(NativeValue::Clob(_)) => {
                (sql_types::VARCHAR, "String", 0, 0)
            }
            Some(_) => (sql_types::BLOB, "Vec<u8>", 0, 0),
            None => (sql_types::NULL, "", 0, 0),
        },
    };

    let type_name = match decl {
        Some(d) => d.to_ascii_uppercase(),
        None => match code {
            sql_types::BIGINT => "INTEGER".to_string(),
            sql_types::DOUBLE => "REAL".to_string(),
            sql_types::VARCHAR => "TEXT".to_string(),
            sql_types::BLOB => "BLOB".to_string(),
            _ => "NULL".to_string(),
        },
    };

    let numeric = matches!(
        kind,
        Affinity::TinyInt
            | Affinity::SmallInt
            | Affinity::Integer
            | Affinity::BigInt
            | Affinity::Double
            | Affinity::Decimal
    ) || matches!(code, sql_types::BIGINT | sql_types::DOUBLE);

    ColumnDescriptor {
        ordinal: ordinal as i32,
        column_name: name.to_string(),
        column_label: name.to_string(),
        display_size,
        precision,
        data_type_name: type_name,
        data_type_class_name: class_name.to_string(),
        data_type_code: code,
        is_case_sensitive: matches!(code, sql_types::VARCHAR | sql_types::CLOB),
        is_searchable: true,
        is_nullable: COLUMN_NULLABLE_UNKNOWN,
        is_signed: numeric,
        ..Default::default()
    }
}

// crates/exam-catalog-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Catalog Store
// Description: Pooled, transactional CatalogStore backed by SQLite WAL.
// Purpose: Persist the University aggregate with cascading foreign keys.
// Dependencies: exam-catalog-core, r2d2, rusqlite, serde, thiserror, tracing
// ============================================================================

//! ## Overview
//! This module implements a durable [`CatalogStore`] using `SQLite`.
//! Connections come from an r2d2 pool; every connection enables foreign keys
//! and caches prepared statements. Each write command runs in one
//! transaction that observes the caller's [`OpContext`] at statement
//! boundaries and immediately before commit.
//!
//! `SQLite` is always serializable; read-committed maps to a deferred
//! transaction and serializable to an immediate one, which takes the write
//! lock up front. Callers that need several commands in one transaction use
//! [`SqliteCatalogStore::transaction`] and nest rollback points with
//! [`SqliteTx::savepoint`].
//! Security posture: database contents are untrusted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use exam_catalog_core::AdmissionInfo;
use exam_catalog_core::AdmissionInfoId;
use exam_catalog_core::AdmissionSchedule;
use exam_catalog_core::AdmissionScheduleId;
use exam_catalog_core::CatalogStore;
use exam_catalog_core::Department;
use exam_catalog_core::DepartmentId;
use exam_catalog_core::EntityRef;
use exam_catalog_core::FilterCategory;
use exam_catalog_core::FilterOption;
use exam_catalog_core::FilterOptionId;
use exam_catalog_core::IsolationLevel;
use exam_catalog_core::Major;
use exam_catalog_core::MajorId;
use exam_catalog_core::OpContext;
use exam_catalog_core::Page;
use exam_catalog_core::StoreError;
use exam_catalog_core::Subject;
use exam_catalog_core::SubjectId;
use exam_catalog_core::TestType;
use exam_catalog_core::TestTypeId;
use exam_catalog_core::TxOptions;
use exam_catalog_core::University;
use exam_catalog_core::UniversityId;
use exam_catalog_core::WriteCommand;
use exam_catalog_core::WriteOutcome;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::TransactionBehavior;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::loader;
use crate::schema::Level;
use crate::schema::initialize_schema;
use crate::writer;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default `SQLite` busy timeout.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default pool size.
const DEFAULT_MAX_CONNECTIONS: u32 = 25;
/// Default pool checkout timeout.
const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 5_000;
/// Default pooled connection lifetime.
const DEFAULT_MAX_LIFETIME_MS: u64 = 5 * 60 * 1_000;
/// Default prepared statement cache capacity per connection.
const DEFAULT_STATEMENT_CACHE_CAPACITY: usize = 64;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` catalog store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `max_connections` must be greater than zero.
/// - `min_idle`, when set, must not exceed `max_connections`.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Maximum pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Idle connections kept open (zero when unset).
    #[serde(default)]
    pub min_idle: Option<u32>,
    /// Maximum connection lifetime in milliseconds.
    #[serde(default = "default_max_lifetime_ms")]
    pub max_lifetime_ms: Option<u64>,
    /// Idle connection timeout in milliseconds.
    #[serde(default)]
    pub idle_timeout_ms: Option<u64>,
    /// Pool checkout timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    /// Prepared statement cache capacity per connection.
    #[serde(default = "default_statement_cache_capacity")]
    pub statement_cache_capacity: usize,
}

impl SqliteStoreConfig {
    /// Returns a configuration with defaults for the given database path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_idle: None,
            max_lifetime_ms: default_max_lifetime_ms(),
            idle_timeout_ms: None,
            connection_timeout_ms: DEFAULT_CONNECTION_TIMEOUT_MS,
            statement_cache_capacity: DEFAULT_STATEMENT_CACHE_CAPACITY,
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default pool size.
const fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

/// Returns the default pooled connection lifetime.
const fn default_max_lifetime_ms() -> Option<u64> {
    Some(DEFAULT_MAX_LIFETIME_MS)
}

/// Returns the default pool checkout timeout.
const fn default_connection_timeout_ms() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT_MS
}

/// Returns the default prepared statement cache capacity.
const fn default_statement_cache_capacity() -> usize {
    DEFAULT_STATEMENT_CACHE_CAPACITY
}

/// Validates pool limits in the store configuration.
fn validate_pool_limits(config: &SqliteStoreConfig) -> Result<(), SqliteStoreError> {
    if config.max_connections == 0 {
        return Err(SqliteStoreError::Invalid(
            "max_connections must be greater than zero".to_string(),
        ));
    }
    if let Some(min_idle) = config.min_idle
        && min_idle > config.max_connections
    {
        return Err(SqliteStoreError::Invalid(format!(
            "min_idle {min_idle} exceeds max_connections {}",
            config.max_connections
        )));
    }
    if config.connection_timeout_ms == 0 {
        return Err(SqliteStoreError::Invalid(
            "connection_timeout_ms must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding raw row payloads.
#[derive(Debug, Error, Clone)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Connection pool error.
    #[error("sqlite store connection pool error: {0}")]
    Pool(String),
    /// Stored rows failed to decode.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store configuration or argument.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Catalog-level failure (not found, conflict, cancellation, ...).
    #[error(transparent)]
    Catalog(StoreError),
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(error: rusqlite::Error) -> Self {
        match error {
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::IntegralValueOutOfRange(..)
            | rusqlite::Error::InvalidColumnType(..) => Self::Corrupt(error.to_string()),
            other => Self::Db(other.to_string()),
        }
    }
}

impl From<r2d2::Error> for SqliteStoreError {
    fn from(error: r2d2::Error) -> Self {
        Self::Pool(error.to_string())
    }
}

impl From<StoreError> for SqliteStoreError {
    fn from(error: StoreError) -> Self {
        Self::Catalog(error)
    }
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) | SqliteStoreError::Db(message) => Self::Db(message),
            SqliteStoreError::Pool(message) => Self::Db(format!("connection pool: {message}")),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::Catalog(error) => error,
        }
    }
}

// ============================================================================
// SECTION: Connection Pool
// ============================================================================

/// r2d2 connection manager opening configured `SQLite` connections.
#[derive(Debug, Clone)]
struct SqliteConnectionManager {
    /// Store configuration applied to every connection.
    config: SqliteStoreConfig,
}

impl r2d2::ManageConnection for SqliteConnectionManager {
    type Connection = Connection;
    type Error = rusqlite::Error;

    fn connect(&self) -> Result<Connection, rusqlite::Error> {
        open_connection(&self.config)
    }

    fn is_valid(&self, connection: &mut Connection) -> Result<(), rusqlite::Error> {
        connection.execute_batch("SELECT 1;")
    }

    fn has_broken(&self, _connection: &mut Connection) -> bool {
        false
    }
}

/// Pooled connection handle.
type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed catalog store.
///
/// # Invariants
/// - Every pooled connection has `foreign_keys` enabled.
/// - Each write command commits atomically or not at all.
#[derive(Clone)]
pub struct SqliteCatalogStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Connection pool.
    pool: r2d2::Pool<SqliteConnectionManager>,
}

impl std::fmt::Debug for SqliteCatalogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCatalogStore")
            .field("path", &self.config.path)
            .field("max_connections", &self.config.max_connections)
            .finish_non_exhaustive()
    }
}

impl SqliteCatalogStore {
    /// Opens an `SQLite`-backed catalog store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        validate_pool_limits(&config)?;
        let mut bootstrap = open_connection(&config)?;
        initialize_schema(&mut bootstrap)?;
        drop(bootstrap);
        let manager = SqliteConnectionManager {
            config: config.clone(),
        };
        let pool = r2d2::Pool::builder()
            .max_size(config.max_connections)
            .min_idle(config.min_idle.or(Some(0)))
            .max_lifetime(config.max_lifetime_ms.map(Duration::from_millis))
            .idle_timeout(config.idle_timeout_ms.map(Duration::from_millis))
            .connection_timeout(Duration::from_millis(config.connection_timeout_ms))
            .build(manager)?;
        debug!(
            path = %config.path.display(),
            max_connections = config.max_connections,
            "sqlite catalog store opened"
        );
        Ok(Self {
            config,
            pool,
        })
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Runs `f` inside one transaction and commits when it succeeds.
    ///
    /// The context is checked before the transaction starts and again
    /// immediately before commit; a cancelled or expired context rolls the
    /// transaction back.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when `f` fails, the context is cancelled,
    /// or the engine rejects the transaction.
    pub fn transaction<T, F>(
        &self,
        options: &TxOptions,
        ctx: &OpContext,
        f: F,
    ) -> Result<T, SqliteStoreError>
    where
        F: FnOnce(&mut SqliteTx<'_>) -> Result<T, SqliteStoreError>,
    {
        ctx.checkpoint()?;
        let mut connection = self.connection(ctx)?;
        let behavior = match options.isolation {
            IsolationLevel::ReadCommitted => TransactionBehavior::Deferred,
            IsolationLevel::Serializable => TransactionBehavior::Immediate,
        };
        let tx = connection.transaction_with_behavior(behavior)?;
        let value = {
            let mut handle = SqliteTx::new(&tx, ctx, options.read_only);
            f(&mut handle)?
        };
        ctx.checkpoint()?;
        tx.commit()?;
        Ok(value)
    }

    /// Runs a read inside a deferred transaction for a consistent snapshot.
    fn read<T, F>(&self, ctx: &OpContext, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, SqliteStoreError>,
    {
        self.read_inner(ctx, f).map_err(StoreError::from)
    }

    /// Implements [`Self::read`] with backend errors.
    fn read_inner<T, F>(&self, ctx: &OpContext, f: F) -> Result<T, SqliteStoreError>
    where
        F: FnOnce(&Connection) -> Result<T, SqliteStoreError>,
    {
        ctx.checkpoint()?;
        let mut connection = self.connection(ctx)?;
        let tx = connection.transaction()?;
        let value = f(&tx)?;
        ctx.checkpoint()?;
        Ok(value)
    }

    /// Checks out a pooled connection within the context deadline.
    fn connection(&self, ctx: &OpContext) -> Result<PooledConnection, SqliteStoreError> {
        let limit = Duration::from_millis(self.config.connection_timeout_ms);
        let timeout = ctx.remaining().map_or(limit, |remaining| remaining.min(limit));
        if timeout.is_zero() {
            return Err(StoreError::Timeout.into());
        }
        Ok(self.pool.get_timeout(timeout)?)
    }
}

// ============================================================================
// SECTION: Transaction Handle
// ============================================================================

/// Open write transaction on a pooled connection.
///
/// Commands applied through one handle commit together when the enclosing
/// [`SqliteCatalogStore::transaction`] closure returns `Ok`.
pub struct SqliteTx<'conn> {
    /// Connection running the transaction.
    conn: &'conn Connection,
    /// Caller context observed at statement boundaries.
    ctx: &'conn OpContext,
    /// Reject writes when set.
    read_only: bool,
    /// Current savepoint nesting depth.
    depth: u32,
    /// Transaction timestamp (UTC epoch milliseconds).
    now_ms: i64,
}

impl<'conn> SqliteTx<'conn> {
    /// Wraps an open transaction.
    fn new(conn: &'conn Connection, ctx: &'conn OpContext, read_only: bool) -> Self {
        Self {
            conn,
            ctx,
            read_only,
            depth: 0,
            now_ms: loader::now_millis(),
        }
    }

    /// Returns the underlying connection.
    pub(crate) const fn connection(&self) -> &'conn Connection {
        self.conn
    }

    /// Returns the caller context.
    pub(crate) const fn context(&self) -> &'conn OpContext {
        self.ctx
    }

    /// Returns the transaction timestamp.
    pub(crate) const fn now_ms(&self) -> i64 {
        self.now_ms
    }

    /// Applies one write command inside this transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the command is rejected; the caller
    /// decides whether to roll back the whole transaction or a savepoint.
    pub fn apply(&mut self, command: &WriteCommand) -> Result<WriteOutcome, SqliteStoreError> {
        if self.read_only {
            return Err(SqliteStoreError::Db(
                "attempt to write a readonly transaction".to_string(),
            ));
        }
        writer::apply(self, command)
    }

    /// Runs `f` under a savepoint.
    ///
    /// When `f` fails the savepoint is rolled back and released; the outer
    /// transaction stays usable and the error is returned.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or [`SqliteStoreError`] when the
    /// savepoint statements fail.
    pub fn savepoint<T, F>(&mut self, f: F) -> Result<T, SqliteStoreError>
    where
        F: FnOnce(&mut Self) -> Result<T, SqliteStoreError>,
    {
        self.ctx.checkpoint()?;
        let name = format!("catalog_sp_{}", self.depth);
        self.conn.execute_batch(&format!("SAVEPOINT {name};"))?;
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        match result {
            Ok(value) => {
                self.conn.execute_batch(&format!("RELEASE {name};"))?;
                Ok(value)
            }
            Err(err) => {
                self.conn.execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name};"))?;
                Err(err)
            }
        }
    }
}

// ============================================================================
// SECTION: CatalogStore
// ============================================================================

impl CatalogStore for SqliteCatalogStore {
    fn list_universities(
        &self,
        page: Page,
        ctx: &OpContext,
    ) -> Result<Vec<University>, StoreError> {
        self.read(ctx, |conn| {
            let ids = loader::university_ids(conn, page)?;
            loader::universities_by_ids(conn, ctx, &ids)
        })
    }

    fn load_university(
        &self,
        id: UniversityId,
        ctx: &OpContext,
    ) -> Result<Option<University>, StoreError> {
        self.read(ctx, |conn| loader::university(conn, ctx, id.get()))
    }

    fn search_universities(
        &self,
        query: &str,
        ctx: &OpContext,
    ) -> Result<Vec<University>, StoreError> {
        self.read(ctx, |conn| {
            let ids = loader::search_university_ids(conn, query)?;
            loader::universities_by_ids(conn, ctx, &ids)
        })
    }

    fn load_department(
        &self,
        university_id: UniversityId,
        department_id: DepartmentId,
        ctx: &OpContext,
    ) -> Result<Option<Department>, StoreError> {
        self.read(ctx, |conn| {
            loader::department(conn, ctx, university_id.get(), department_id.get())
        })
    }

    fn load_major(
        &self,
        department_id: DepartmentId,
        major_id: MajorId,
        ctx: &OpContext,
    ) -> Result<Option<Major>, StoreError> {
        self.read(ctx, |conn| loader::major(conn, ctx, department_id.get(), major_id.get()))
    }

    fn load_admission_schedule(
        &self,
        major_id: MajorId,
        schedule_id: AdmissionScheduleId,
        ctx: &OpContext,
    ) -> Result<Option<AdmissionSchedule>, StoreError> {
        self.read(ctx, |conn| {
            loader::admission_schedule(conn, ctx, major_id.get(), schedule_id.get())
        })
    }

    fn load_admission_info(
        &self,
        schedule_id: AdmissionScheduleId,
        info_id: AdmissionInfoId,
        ctx: &OpContext,
    ) -> Result<Option<AdmissionInfo>, StoreError> {
        self.read(ctx, |conn| loader::admission_info(conn, ctx, schedule_id.get(), info_id.get()))
    }

    fn load_test_type(
        &self,
        schedule_id: AdmissionScheduleId,
        test_type_id: TestTypeId,
        ctx: &OpContext,
    ) -> Result<Option<TestType>, StoreError> {
        self.read(ctx, |conn| loader::test_type(conn, ctx, schedule_id.get(), test_type_id.get()))
    }

    fn load_subject(
        &self,
        test_type_id: TestTypeId,
        subject_id: SubjectId,
        ctx: &OpContext,
    ) -> Result<Option<Subject>, StoreError> {
        self.read(ctx, |conn| loader::subject(conn, ctx, test_type_id.get(), subject_id.get()))
    }

    fn owning_university(
        &self,
        entity: EntityRef,
        ctx: &OpContext,
    ) -> Result<Option<UniversityId>, StoreError> {
        self.read(ctx, |conn| {
            Ok(loader::owning_university(conn, Level::of(entity), entity.raw_id())?
                .map(UniversityId::new))
        })
    }

    fn list_filter_options(
        &self,
        category: Option<FilterCategory>,
        ctx: &OpContext,
    ) -> Result<Vec<FilterOption>, StoreError> {
        self.read(ctx, |conn| loader::filter_options(conn, category))
    }

    fn load_filter_option(
        &self,
        id: FilterOptionId,
        ctx: &OpContext,
    ) -> Result<Option<FilterOption>, StoreError> {
        self.read(ctx, |conn| loader::filter_option(conn, id.get()))
    }

    fn write(
        &self,
        command: &WriteCommand,
        options: &TxOptions,
        ctx: &OpContext,
    ) -> Result<WriteOutcome, StoreError> {
        self.transaction(options, ctx, |tx| tx.apply(command)).map_err(StoreError::from)
    }

    fn readiness(&self) -> Result<(), StoreError> {
        let check = || -> Result<(), SqliteStoreError> {
            let connection = self.pool.get()?;
            connection.execute_batch("SELECT 1;")?;
            Ok(())
        };
        check().map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with the configured pragmas.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, rusqlite::Error> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)?;
    apply_pragmas(&connection, config)?;
    connection.set_prepared_statement_cache_capacity(config.statement_cache_capacity);
    Ok(connection)
}

/// Applies `SQLite` pragmas required for integrity and durability.
fn apply_pragmas(connection: &Connection, config: &SqliteStoreConfig) -> Result<(), rusqlite::Error> {
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    Ok(())
}

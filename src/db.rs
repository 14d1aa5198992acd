//! SQLite database with Diesel ORM
//!
//! Stores user accounts, sessions, flashcards, and generation audit records.
//! Schema is created on open with idempotent raw SQL.

use crate::schema::*;
use chrono::{DateTime, Local};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use std::path::Path;
use uuid::Uuid;

/// Walk up directory tree to find .cardbox folder (like git finds .git)
/// Can be overridden with CARDBOX_DB_PATH env var
fn get_db_path() -> std::path::PathBuf {
    // Check env var first - always takes priority
    if let Ok(path) = std::env::var("CARDBOX_DB_PATH") {
        return std::path::PathBuf::from(path);
    }

    // Walk up directory tree to find .cardbox folder
    if let Ok(current_dir) = std::env::current_dir() {
        let mut dir = current_dir.as_path();
        loop {
            let cardbox_dir = dir.join(".cardbox");
            if cardbox_dir.exists() && cardbox_dir.is_dir() {
                return cardbox_dir.join("cardbox.db");
            }
            match dir.parent() {
                Some(parent) => dir = parent,
                None => break, // Reached filesystem root
            }
        }
    }

    // No .cardbox found - default to current directory
    // (cardbox init will create it here)
    std::path::PathBuf::from(".cardbox/cardbox.db")
}

fn now_rfc3339() -> String {
    Local::now().to_rfc3339()
}

// ============================================================================
// Diesel Models
// ============================================================================

/// Insertable user account
#[derive(Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub id: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub active: bool,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

/// Queryable user account
#[derive(Queryable, Selectable, Debug, Clone, serde::Serialize)]
#[diesel(table_name = users)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Insertable session
#[derive(Insertable)]
#[diesel(table_name = sessions)]
pub struct NewSession<'a> {
    pub token: &'a str,
    pub user_id: &'a str,
    pub created_at: &'a str,
    pub expires_at: &'a str,
}

/// Queryable session
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = sessions)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub created_at: String,
    pub expires_at: String,
}

impl Session {
    /// A session with an expiry in the past (or one that fails to parse)
    /// is treated as absent everywhere.
    pub fn is_expired(&self) -> bool {
        match DateTime::parse_from_rfc3339(&self.expires_at) {
            Ok(expires) => expires < Local::now(),
            Err(_) => true,
        }
    }
}

/// Insertable flashcard
#[derive(Insertable)]
#[diesel(table_name = flashcards)]
pub struct NewFlashcard<'a> {
    pub user_id: &'a str,
    pub front: &'a str,
    pub back: &'a str,
    pub source: &'a str,
    pub generation_id: Option<i32>,
    pub status: bool,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

/// Queryable flashcard
#[derive(Queryable, Selectable, Debug, Clone, serde::Serialize)]
#[diesel(table_name = flashcards)]
pub struct Flashcard {
    pub id: i32,
    pub user_id: String,
    pub front: String,
    pub back: String,
    pub source: String,
    pub generation_id: Option<i32>,
    pub status: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Flashcard fields supplied by the caller on create (ids and timestamps are
/// server-assigned)
#[derive(Debug, Clone)]
pub struct FlashcardDraft {
    pub front: String,
    pub back: String,
    pub source: String,
    pub generation_id: Option<i32>,
}

/// Partial update for a flashcard; `None` fields are left untouched
#[derive(AsChangeset, Debug, Clone, Default)]
#[diesel(table_name = flashcards)]
pub struct FlashcardChanges {
    pub front: Option<String>,
    pub back: Option<String>,
    pub source: Option<String>,
}

impl FlashcardChanges {
    pub fn is_empty(&self) -> bool {
        self.front.is_none() && self.back.is_none() && self.source.is_none()
    }
}

/// Insertable generation record
#[derive(Insertable)]
#[diesel(table_name = generations)]
pub struct NewGeneration<'a> {
    pub user_id: &'a str,
    pub source_text_hash: &'a str,
    pub source_text_length: i32,
    pub ai_model: &'a str,
    pub generated_count: i32,
    pub accepted_edited_count: i32,
    pub accepted_unedited_count: i32,
    pub generation_duration_ms: i32,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

/// Queryable generation record
#[derive(Queryable, Selectable, Debug, Clone, serde::Serialize)]
#[diesel(table_name = generations)]
pub struct Generation {
    pub id: i32,
    pub user_id: String,
    pub source_text_hash: String,
    pub source_text_length: i32,
    pub ai_model: String,
    pub generated_count: i32,
    pub accepted_edited_count: i32,
    pub accepted_unedited_count: i32,
    pub generation_duration_ms: i32,
    pub created_at: String,
    pub updated_at: String,
}

/// Generation fields captured by the workflow service
#[derive(Debug, Clone)]
pub struct GenerationDraft {
    pub source_text_hash: String,
    pub source_text_length: i32,
    pub ai_model: String,
    pub generated_count: i32,
    pub generation_duration_ms: i32,
}

/// Insertable generation error log
#[derive(Insertable)]
#[diesel(table_name = generation_error_logs)]
pub struct NewGenerationErrorLog<'a> {
    pub user_id: &'a str,
    pub source_text_hash: &'a str,
    pub source_text_length: i32,
    pub ai_model: &'a str,
    pub error_code: &'a str,
    pub error_message: &'a str,
    pub created_at: &'a str,
}

/// Queryable generation error log
#[derive(Queryable, Selectable, Debug, Clone, serde::Serialize)]
#[diesel(table_name = generation_error_logs)]
pub struct GenerationErrorLog {
    pub id: i32,
    pub user_id: String,
    pub source_text_hash: String,
    pub source_text_length: i32,
    pub ai_model: String,
    pub error_code: String,
    pub error_message: String,
    pub created_at: String,
}

/// Error fields captured when a generation attempt fails
#[derive(Debug, Clone)]
pub struct ErrorLogDraft {
    pub source_text_hash: String,
    pub source_text_length: i32,
    pub ai_model: String,
    pub error_code: String,
    pub error_message: String,
}

// ============================================================================
// List Parameters
// ============================================================================

/// Columns the flashcard list may be sorted by. Anything outside this
/// allow-list is rejected at the validation boundary.
pub const SORTABLE_COLUMNS: &[&str] = &["created_at", "updated_at", "front", "back"];

/// Pagination, search, and sort parameters for the flashcard list
#[derive(Debug, Clone)]
pub struct ListParams {
    pub page: i64,
    pub limit: i64,
    pub search: Option<String>,
    pub sort_by: String,
    pub descending: bool,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 20,
            search: None,
            sort_by: "created_at".to_string(),
            descending: true,
        }
    }
}

impl ListParams {
    /// Saturating so an absurd page number can never overflow into a
    /// negative offset
    pub fn offset(&self) -> i64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

// ============================================================================
// Database Connection
// ============================================================================

type DbPool = Pool<ConnectionManager<SqliteConnection>>;
type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Database connection wrapper with connection pool
pub struct Database {
    pool: DbPool,
}

/// Error type for database operations
#[derive(Debug)]
pub enum DbError {
    Connection(String),
    Query(diesel::result::Error),
    Pool(diesel::r2d2::Error),
    Validation(String),
    /// Row absent or not owned by the caller
    NotFound,
}

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbError::Connection(msg) => write!(f, "Connection error: {}", msg),
            DbError::Query(e) => write!(f, "Query error: {}", e),
            DbError::Pool(e) => write!(f, "Pool error: {}", e),
            DbError::Validation(msg) => write!(f, "{}", msg),
            DbError::NotFound => write!(f, "Not found"),
        }
    }
}

impl std::error::Error for DbError {}

impl From<diesel::result::Error> for DbError {
    fn from(e: diesel::result::Error) -> Self {
        match e {
            diesel::result::Error::NotFound => DbError::NotFound,
            other => DbError::Query(other),
        }
    }
}

impl From<diesel::r2d2::Error> for DbError {
    fn from(e: diesel::r2d2::Error) -> Self {
        DbError::Pool(e)
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

impl Database {
    /// Get the database path that will be used
    pub fn db_path() -> std::path::PathBuf {
        get_db_path()
    }

    /// Create a new database at a custom path
    pub fn new(path: &str) -> Result<Self> {
        Self::open_at(path)
    }

    /// Open database at default path (respects CARDBOX_DB_PATH env var)
    pub fn open() -> Result<Self> {
        let path = get_db_path();
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).ok();
            }
        }
        Self::open_at(&path)
    }

    /// Open database at specified path
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(&path_str);
        let pool = Pool::builder()
            .max_size(5)
            .build(manager)
            .map_err(|e| DbError::Connection(e.to_string()))?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    fn get_conn(&self) -> Result<DbConn> {
        self.pool.get().map_err(|e| DbError::Connection(e.to_string()))
    }

    fn init_schema(&self) -> Result<()> {
        let mut conn = self.get_conn()?;

        // Run raw SQL to create tables if they don't exist
        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY NOT NULL,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                active BOOLEAN NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY NOT NULL,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS generations (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                user_id TEXT NOT NULL,
                source_text_hash TEXT NOT NULL,
                source_text_length INTEGER NOT NULL,
                ai_model TEXT NOT NULL,
                generated_count INTEGER NOT NULL,
                accepted_edited_count INTEGER NOT NULL DEFAULT 0,
                accepted_unedited_count INTEGER NOT NULL DEFAULT 0,
                generation_duration_ms INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS flashcards (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                user_id TEXT NOT NULL,
                front TEXT NOT NULL,
                back TEXT NOT NULL,
                source TEXT NOT NULL,
                generation_id INTEGER,
                status BOOLEAN NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id),
                FOREIGN KEY (generation_id) REFERENCES generations(id)
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS generation_error_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                user_id TEXT NOT NULL,
                source_text_hash TEXT NOT NULL,
                source_text_length INTEGER NOT NULL,
                ai_model TEXT NOT NULL,
                error_code TEXT NOT NULL,
                error_message TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            )
        "#).execute(&mut conn)?;

        // Create indexes
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_flashcards_user ON flashcards(user_id, status)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_flashcards_generation ON flashcards(generation_id)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_generations_user ON generations(user_id)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_error_logs_user ON generation_error_logs(user_id)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id)").execute(&mut conn)?;

        Ok(())
    }

    // ========================================================================
    // User Operations
    // ========================================================================

    /// Create a user account. The caller supplies an already-hashed password.
    pub fn create_user(&self, email: &str, password_hash: &str) -> Result<User> {
        let mut conn = self.get_conn()?;
        let now = now_rfc3339();
        let id = Uuid::new_v4().to_string();

        let new_user = NewUser {
            id: &id,
            email,
            password_hash,
            active: true,
            created_at: &now,
            updated_at: &now,
        };

        match diesel::insert_into(users::table).values(&new_user).execute(&mut conn) {
            Ok(_) => {}
            Err(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            )) => {
                return Err(DbError::Validation("This email is already registered".to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        let user = users::table.filter(users::id.eq(&id)).first::<User>(&mut conn)?;
        Ok(user)
    }

    /// Look up a user by email (active or not)
    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let mut conn = self.get_conn()?;
        let user = users::table
            .filter(users::email.eq(email))
            .first::<User>(&mut conn)
            .optional()?;
        Ok(user)
    }

    /// Look up a user by id
    pub fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let mut conn = self.get_conn()?;
        let user = users::table
            .filter(users::id.eq(user_id))
            .first::<User>(&mut conn)
            .optional()?;
        Ok(user)
    }

    /// Replace a user's password hash
    pub fn update_password_hash(&self, user_id: &str, password_hash: &str) -> Result<()> {
        let mut conn = self.get_conn()?;
        let now = now_rfc3339();
        diesel::update(users::table.filter(users::id.eq(user_id)))
            .set((
                users::password_hash.eq(password_hash),
                users::updated_at.eq(&now),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    /// Mark an account inactive and drop all of its sessions
    pub fn deactivate_user(&self, user_id: &str) -> Result<()> {
        let mut conn = self.get_conn()?;
        let now = now_rfc3339();
        diesel::update(users::table.filter(users::id.eq(user_id)))
            .set((users::active.eq(false), users::updated_at.eq(&now)))
            .execute(&mut conn)?;
        diesel::delete(sessions::table.filter(sessions::user_id.eq(user_id)))
            .execute(&mut conn)?;
        Ok(())
    }

    // ========================================================================
    // Session Operations
    // ========================================================================

    /// Create a session for a user, valid for `ttl_days`
    pub fn create_session(&self, user_id: &str, ttl_days: i64) -> Result<Session> {
        let mut conn = self.get_conn()?;
        let token = Uuid::new_v4().to_string();
        let now = Local::now();
        let created = now.to_rfc3339();
        let expires = (now + chrono::Duration::days(ttl_days)).to_rfc3339();

        let new_session = NewSession {
            token: &token,
            user_id,
            created_at: &created,
            expires_at: &expires,
        };

        diesel::insert_into(sessions::table)
            .values(&new_session)
            .execute(&mut conn)?;

        let session = sessions::table
            .filter(sessions::token.eq(&token))
            .first::<Session>(&mut conn)?;
        Ok(session)
    }

    /// Look up a live session. Expired sessions are deleted and reported absent.
    pub fn find_session(&self, token: &str) -> Result<Option<Session>> {
        let mut conn = self.get_conn()?;
        let session = sessions::table
            .filter(sessions::token.eq(token))
            .first::<Session>(&mut conn)
            .optional()?;

        match session {
            Some(s) if s.is_expired() => {
                diesel::delete(sessions::table.filter(sessions::token.eq(token)))
                    .execute(&mut conn)?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Delete a session (logout). Missing tokens are a no-op.
    pub fn delete_session(&self, token: &str) -> Result<()> {
        let mut conn = self.get_conn()?;
        diesel::delete(sessions::table.filter(sessions::token.eq(token)))
            .execute(&mut conn)?;
        Ok(())
    }

    // ========================================================================
    // Flashcard Operations
    // ========================================================================

    /// Insert a batch of flashcards for a user, returning the created rows
    /// with server-assigned ids and timestamps. The whole batch is one
    /// transaction: if any insert fails, none of the rows are kept.
    pub fn create_flashcards(&self, user_id: &str, drafts: &[FlashcardDraft]) -> Result<Vec<Flashcard>> {
        let mut conn = self.get_conn()?;
        let now = now_rfc3339();

        let created = conn.transaction::<Vec<Flashcard>, diesel::result::Error, _>(|conn| {
            let mut rows = Vec::with_capacity(drafts.len());
            for draft in drafts {
                let new_card = NewFlashcard {
                    user_id,
                    front: &draft.front,
                    back: &draft.back,
                    source: &draft.source,
                    generation_id: draft.generation_id,
                    status: true,
                    created_at: &now,
                    updated_at: &now,
                };

                diesel::insert_into(flashcards::table)
                    .values(&new_card)
                    .execute(conn)?;

                let id: i32 = diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>(
                    "last_insert_rowid()",
                ))
                .first(conn)?;

                let row = flashcards::table
                    .filter(flashcards::id.eq(id))
                    .first::<Flashcard>(conn)?;
                rows.push(row);
            }
            Ok(rows)
        })?;

        Ok(created)
    }

    /// List a user's live flashcards with optional case-insensitive substring
    /// search over front OR back, sorting, and pagination. Returns the page
    /// plus the total count matching the filter.
    pub fn list_flashcards(&self, user_id: &str, params: &ListParams) -> Result<(Vec<Flashcard>, i64)> {
        let mut conn = self.get_conn()?;

        let pattern = params.search.as_ref().map(|s| format!("%{}%", s));

        let mut query = flashcards::table
            .filter(flashcards::user_id.eq(user_id))
            .filter(flashcards::status.eq(true))
            .into_boxed();
        let mut count_query = flashcards::table
            .filter(flashcards::user_id.eq(user_id))
            .filter(flashcards::status.eq(true))
            .into_boxed();

        // SQLite LIKE is case-insensitive for ASCII, matching the original
        // ilike semantics
        if let Some(ref pattern) = pattern {
            query = query.filter(
                flashcards::front
                    .like(pattern.clone())
                    .or(flashcards::back.like(pattern.clone())),
            );
            count_query = count_query.filter(
                flashcards::front
                    .like(pattern.clone())
                    .or(flashcards::back.like(pattern.clone())),
            );
        }

        query = match (params.sort_by.as_str(), params.descending) {
            ("front", false) => query.order(flashcards::front.asc()),
            ("front", true) => query.order(flashcards::front.desc()),
            ("back", false) => query.order(flashcards::back.asc()),
            ("back", true) => query.order(flashcards::back.desc()),
            ("updated_at", false) => query.order(flashcards::updated_at.asc()),
            ("updated_at", true) => query.order(flashcards::updated_at.desc()),
            (_, false) => query.order(flashcards::created_at.asc()),
            (_, true) => query.order(flashcards::created_at.desc()),
        };

        let total: i64 = count_query.count().get_result(&mut conn)?;
        let rows = query
            .limit(params.limit)
            .offset(params.offset())
            .load::<Flashcard>(&mut conn)?;

        Ok((rows, total))
    }

    /// Apply a partial update to a flashcard after verifying it exists, is
    /// live, and belongs to the caller. Returns the updated row.
    pub fn update_flashcard(&self, card_id: i32, user_id: &str, changes: &FlashcardChanges) -> Result<Flashcard> {
        let mut conn = self.get_conn()?;

        // Ownership check first so a foreign row reads as missing, not forbidden
        let existing = flashcards::table
            .filter(flashcards::id.eq(card_id))
            .filter(flashcards::user_id.eq(user_id))
            .filter(flashcards::status.eq(true))
            .first::<Flashcard>(&mut conn)
            .optional()?;

        if existing.is_none() {
            return Err(DbError::NotFound);
        }

        let now = now_rfc3339();
        diesel::update(
            flashcards::table
                .filter(flashcards::id.eq(card_id))
                .filter(flashcards::user_id.eq(user_id)),
        )
        .set((changes.clone(), flashcards::updated_at.eq(&now)))
        .execute(&mut conn)?;

        let updated = flashcards::table
            .filter(flashcards::id.eq(card_id))
            .first::<Flashcard>(&mut conn)?;
        Ok(updated)
    }

    /// Soft-delete: flip status to false, scoped to id + user + live status.
    /// Deleting a missing or already-deleted row is a silent no-op; the
    /// return value reports how many rows actually matched.
    pub fn delete_flashcard(&self, card_id: i32, user_id: &str) -> Result<usize> {
        let mut conn = self.get_conn()?;
        let now = now_rfc3339();
        let affected = diesel::update(
            flashcards::table
                .filter(flashcards::id.eq(card_id))
                .filter(flashcards::user_id.eq(user_id))
                .filter(flashcards::status.eq(true)),
        )
        .set((flashcards::status.eq(false), flashcards::updated_at.eq(&now)))
        .execute(&mut conn)?;
        Ok(affected)
    }

    /// Fetch a single live flashcard, verifying ownership
    pub fn get_flashcard(&self, card_id: i32, user_id: &str) -> Result<Flashcard> {
        let mut conn = self.get_conn()?;
        let card = flashcards::table
            .filter(flashcards::id.eq(card_id))
            .filter(flashcards::user_id.eq(user_id))
            .filter(flashcards::status.eq(true))
            .first::<Flashcard>(&mut conn)
            .optional()?;
        card.ok_or(DbError::NotFound)
    }

    // ========================================================================
    // Generation Audit Operations
    // ========================================================================

    /// Record a successful generation. Acceptance counters start at zero and
    /// are never touched afterwards.
    pub fn insert_generation(&self, user_id: &str, draft: &GenerationDraft) -> Result<Generation> {
        let mut conn = self.get_conn()?;
        let now = now_rfc3339();

        let new_generation = NewGeneration {
            user_id,
            source_text_hash: &draft.source_text_hash,
            source_text_length: draft.source_text_length,
            ai_model: &draft.ai_model,
            generated_count: draft.generated_count,
            accepted_edited_count: 0,
            accepted_unedited_count: 0,
            generation_duration_ms: draft.generation_duration_ms,
            created_at: &now,
            updated_at: &now,
        };

        diesel::insert_into(generations::table)
            .values(&new_generation)
            .execute(&mut conn)?;

        let id: i32 = diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>(
            "last_insert_rowid()",
        ))
        .first(&mut conn)?;

        let row = generations::table
            .filter(generations::id.eq(id))
            .first::<Generation>(&mut conn)?;
        Ok(row)
    }

    /// Record a failed generation attempt
    pub fn insert_generation_error(&self, user_id: &str, draft: &ErrorLogDraft) -> Result<i32> {
        let mut conn = self.get_conn()?;
        let now = now_rfc3339();

        let new_log = NewGenerationErrorLog {
            user_id,
            source_text_hash: &draft.source_text_hash,
            source_text_length: draft.source_text_length,
            ai_model: &draft.ai_model,
            error_code: &draft.error_code,
            error_message: &draft.error_message,
            created_at: &now,
        };

        diesel::insert_into(generation_error_logs::table)
            .values(&new_log)
            .execute(&mut conn)?;

        let id: i32 = diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>(
            "last_insert_rowid()",
        ))
        .first(&mut conn)?;
        Ok(id)
    }

    /// Paginated generation history for a user, newest first
    pub fn list_generations(&self, user_id: &str, page: i64, limit: i64) -> Result<(Vec<Generation>, i64)> {
        let mut conn = self.get_conn()?;
        let total: i64 = generations::table
            .filter(generations::user_id.eq(user_id))
            .count()
            .get_result(&mut conn)?;
        let rows = generations::table
            .filter(generations::user_id.eq(user_id))
            .order(generations::created_at.desc())
            .limit(limit)
            .offset(page.saturating_sub(1).saturating_mul(limit))
            .load::<Generation>(&mut conn)?;
        Ok((rows, total))
    }

    /// Paginated generation error logs for a user, newest first
    pub fn list_generation_errors(&self, user_id: &str, page: i64, limit: i64) -> Result<(Vec<GenerationErrorLog>, i64)> {
        let mut conn = self.get_conn()?;
        let total: i64 = generation_error_logs::table
            .filter(generation_error_logs::user_id.eq(user_id))
            .count()
            .get_result(&mut conn)?;
        let rows = generation_error_logs::table
            .filter(generation_error_logs::user_id.eq(user_id))
            .order(generation_error_logs::created_at.desc())
            .limit(limit)
            .offset(page.saturating_sub(1).saturating_mul(limit))
            .load::<GenerationErrorLog>(&mut conn)?;
        Ok((rows, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_db() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::open_at(dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    fn test_user(db: &Database) -> User {
        db.create_user("alice@example.com", "$argon2id$fake").unwrap()
    }

    fn draft(front: &str, back: &str) -> FlashcardDraft {
        FlashcardDraft {
            front: front.to_string(),
            back: back.to_string(),
            source: "manual".to_string(),
            generation_id: None,
        }
    }

    #[test]
    fn test_create_user_and_find_by_email() {
        let (_dir, db) = test_db();
        let user = test_user(&db);
        assert!(user.active);
        assert_eq!(user.email, "alice@example.com");

        let found = db.find_user_by_email("alice@example.com").unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert!(db.find_user_by_email("nobody@example.com").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let (_dir, db) = test_db();
        test_user(&db);
        let err = db.create_user("alice@example.com", "$argon2id$other").unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
    }

    #[test]
    fn test_deactivate_user_drops_sessions() {
        let (_dir, db) = test_db();
        let user = test_user(&db);
        let session = db.create_session(&user.id, 7).unwrap();
        assert!(db.find_session(&session.token).unwrap().is_some());

        db.deactivate_user(&user.id).unwrap();
        assert!(!db.get_user(&user.id).unwrap().unwrap().active);
        assert!(db.find_session(&session.token).unwrap().is_none());
    }

    #[test]
    fn test_expired_session_reads_as_absent() {
        let (_dir, db) = test_db();
        let user = test_user(&db);
        let session = db.create_session(&user.id, -1).unwrap();
        assert!(session.is_expired());
        assert!(db.find_session(&session.token).unwrap().is_none());
    }

    #[test]
    fn test_batch_create_returns_all_rows() {
        let (_dir, db) = test_db();
        let user = test_user(&db);
        let drafts = vec![draft("q1", "a1"), draft("q2", "a2"), draft("q3", "a3")];

        let created = db.create_flashcards(&user.id, &drafts).unwrap();
        assert_eq!(created.len(), 3);
        for (row, d) in created.iter().zip(&drafts) {
            assert!(row.id > 0);
            assert_eq!(row.front, d.front);
            assert_eq!(row.back, d.back);
            assert!(!row.created_at.is_empty());
            assert!(row.status);
        }
    }

    #[test]
    fn test_roundtrip_fetch_by_id() {
        let (_dir, db) = test_db();
        let user = test_user(&db);
        let created = db.create_flashcards(&user.id, &[draft("front text", "back text")]).unwrap();
        let fetched = db.get_flashcard(created[0].id, &user.id).unwrap();
        assert_eq!(fetched.front, "front text");
        assert_eq!(fetched.back, "back text");
        assert_eq!(fetched.source, "manual");
    }

    #[test]
    fn test_fetch_foreign_row_is_not_found() {
        let (_dir, db) = test_db();
        let alice = test_user(&db);
        let bob = db.create_user("bob@example.com", "$argon2id$fake").unwrap();
        let created = db.create_flashcards(&alice.id, &[draft("q", "a")]).unwrap();

        let err = db.get_flashcard(created[0].id, &bob.id).unwrap_err();
        assert!(matches!(err, DbError::NotFound));
    }

    #[test]
    fn test_search_is_case_insensitive_over_front_and_back() {
        let (_dir, db) = test_db();
        let user = test_user(&db);
        db.create_flashcards(
            &user.id,
            &[
                draft("What is Photosynthesis?", "plants making sugar"),
                draft("Capital of France", "PARIS"),
                draft("unrelated", "nothing here"),
            ],
        )
        .unwrap();

        let params = ListParams { search: Some("photo".to_string()), ..Default::default() };
        let (rows, total) = db.list_flashcards(&user.id, &params).unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].front, "What is Photosynthesis?");

        // Match against back as well
        let params = ListParams { search: Some("paris".to_string()), ..Default::default() };
        let (rows, total) = db.list_flashcards(&user.id, &params).unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].back, "PARIS");

        // No match
        let params = ListParams { search: Some("zebra".to_string()), ..Default::default() };
        let (rows, total) = db.list_flashcards(&user.id, &params).unwrap();
        assert!(rows.is_empty());
        assert_eq!(total, 0);
    }

    #[test]
    fn test_list_pagination_and_total() {
        let (_dir, db) = test_db();
        let user = test_user(&db);
        let drafts: Vec<FlashcardDraft> =
            (0..25).map(|i| draft(&format!("q{:02}", i), "a")).collect();
        db.create_flashcards(&user.id, &drafts).unwrap();

        let params = ListParams {
            page: 2,
            limit: 10,
            sort_by: "front".to_string(),
            descending: false,
            ..Default::default()
        };
        let (rows, total) = db.list_flashcards(&user.id, &params).unwrap();
        assert_eq!(total, 25);
        assert_eq!(rows.len(), 10);
        assert_eq!(rows[0].front, "q10");

        let params = ListParams { page: 3, ..params };
        let (rows, _) = db.list_flashcards(&user.id, &params).unwrap();
        assert_eq!(rows.len(), 5);
    }

    #[test]
    fn test_offset_saturates_on_huge_page() {
        let params = ListParams { page: i64::MAX, limit: 100, ..Default::default() };
        assert_eq!(params.offset(), i64::MAX);

        let params = ListParams { page: 1, limit: 100, ..Default::default() };
        assert_eq!(params.offset(), 0);

        // A huge page is an empty result, not a panic or a negative offset
        let (_dir, db) = test_db();
        let user = test_user(&db);
        db.create_flashcards(&user.id, &[draft("q", "a")]).unwrap();
        let params = ListParams { page: i64::MAX, limit: 100, ..Default::default() };
        let (rows, total) = db.list_flashcards(&user.id, &params).unwrap();
        assert!(rows.is_empty());
        assert_eq!(total, 1);
        let (gens, _) = db.list_generations(&user.id, i64::MAX, 100).unwrap();
        assert!(gens.is_empty());
    }

    #[test]
    fn test_list_is_user_scoped() {
        let (_dir, db) = test_db();
        let alice = test_user(&db);
        let bob = db.create_user("bob@example.com", "$argon2id$fake").unwrap();
        db.create_flashcards(&alice.id, &[draft("alice card", "a")]).unwrap();
        db.create_flashcards(&bob.id, &[draft("bob card", "b")]).unwrap();

        let (rows, total) = db.list_flashcards(&alice.id, &ListParams::default()).unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].front, "alice card");
    }

    #[test]
    fn test_update_partial_and_not_found() {
        let (_dir, db) = test_db();
        let user = test_user(&db);
        let created = db.create_flashcards(&user.id, &[draft("old front", "old back")]).unwrap();

        let changes = FlashcardChanges {
            front: Some("new front".to_string()),
            ..Default::default()
        };
        let updated = db.update_flashcard(created[0].id, &user.id, &changes).unwrap();
        assert_eq!(updated.front, "new front");
        assert_eq!(updated.back, "old back");

        let err = db.update_flashcard(9999, &user.id, &changes).unwrap_err();
        assert!(matches!(err, DbError::NotFound));
    }

    #[test]
    fn test_soft_delete_is_idempotent_and_excludes_row() {
        let (_dir, db) = test_db();
        let user = test_user(&db);
        let created = db.create_flashcards(&user.id, &[draft("q", "a")]).unwrap();
        let id = created[0].id;

        assert_eq!(db.delete_flashcard(id, &user.id).unwrap(), 1);
        // Second delete matches nothing but is not an error
        assert_eq!(db.delete_flashcard(id, &user.id).unwrap(), 0);
        // Deleting a row that never existed is also a no-op
        assert_eq!(db.delete_flashcard(424242, &user.id).unwrap(), 0);

        let (rows, total) = db.list_flashcards(&user.id, &ListParams::default()).unwrap();
        assert!(rows.is_empty());
        assert_eq!(total, 0);
        assert!(matches!(db.get_flashcard(id, &user.id), Err(DbError::NotFound)));
    }

    #[test]
    fn test_generation_insert_and_counters_start_at_zero() {
        let (_dir, db) = test_db();
        let user = test_user(&db);
        let gen = db
            .insert_generation(
                &user.id,
                &GenerationDraft {
                    source_text_hash: "abc123".to_string(),
                    source_text_length: 1500,
                    ai_model: "gpt-4o-mini".to_string(),
                    generated_count: 5,
                    generation_duration_ms: 820,
                },
            )
            .unwrap();

        assert!(gen.id > 0);
        assert_eq!(gen.generated_count, 5);
        assert_eq!(gen.accepted_edited_count, 0);
        assert_eq!(gen.accepted_unedited_count, 0);

        let (rows, total) = db.list_generations(&user.id, 1, 20).unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].id, gen.id);
    }

    #[test]
    fn test_generation_error_log_insert_and_list() {
        let (_dir, db) = test_db();
        let user = test_user(&db);
        let id = db
            .insert_generation_error(
                &user.id,
                &ErrorLogDraft {
                    source_text_hash: "abc123".to_string(),
                    source_text_length: 1500,
                    ai_model: "gpt-4o-mini".to_string(),
                    error_code: "format".to_string(),
                    error_message: "invalid response format".to_string(),
                },
            )
            .unwrap();
        assert!(id > 0);

        let (rows, total) = db.list_generation_errors(&user.id, 1, 20).unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].error_code, "format");
        assert_eq!(rows[0].source_text_hash, "abc123");
    }
}

//! Repository Pattern for account persistence
//!
//! The coordinator and binary depend on the [`AccountRepository`] trait only,
//! so the SQLite store can be swapped for the in-memory one in tests.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 UpdateCoordinator / CLI                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    AccountRepository                        │
//! └─────────────────────────────────────────────────────────────┘
//!                   │                         │
//!                   ▼                         ▼
//!         ┌─────────────────┐       ┌─────────────────┐
//!         │     SQLite      │       │    In-memory    │
//!         └─────────────────┘       └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use citifit::storage::{AccountRepository, SqliteAccountRepository};
//!
//! let repo = SqliteAccountRepository::new("data/citifit.db")?;
//! if repo.try_lock(account_id)? {
//!     // ... synchronize ...
//!     repo.release_lock(account_id)?;
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::models::{Account, AccountId, FitnessCredentials, SourceCredentials, TripId};

/// How long a lock may be held before another caller may take it over
///
/// A process that dies mid-sync never releases its locks; once the lease
/// runs out the account becomes lockable again.
pub const DEFAULT_LOCK_LEASE: Duration = Duration::from_secs(6 * 3600);

// ============================================================================
// Repository Trait
// ============================================================================

/// Account records and their update locks
pub trait AccountRepository: Send + Sync {
    /// Ids of every stored account, ascending
    fn list_account_ids(&self) -> Result<Vec<AccountId>>;

    /// Load one account
    ///
    /// # Errors
    /// `AccountNotFound` if no such account exists
    fn load_account(&self, id: AccountId) -> Result<Account>;

    /// Persist a new watermark; a stored watermark is never lowered
    fn save_watermark(&self, id: AccountId, watermark: TripId) -> Result<()>;

    /// Atomically move the account's lock from idle to locked
    ///
    /// A lock held for longer than the repository's lease counts as idle.
    /// Returns `false` if the lock is held (or the account does not exist);
    /// two concurrent callers can never both get `true`.
    fn try_lock(&self, id: AccountId) -> Result<bool>;

    /// Move the account's lock back to idle
    fn release_lock(&self, id: AccountId) -> Result<()>;

    /// Insert or replace credentials; watermark and lock of an existing
    /// account are kept
    fn upsert_account(&self, account: &Account) -> Result<()>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of AccountRepository
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection.
pub struct SqliteAccountRepository {
    conn: Mutex<Connection>,
    lock_lease: Duration,
}

impl SqliteAccountRepository {
    /// Open (or create) a repository at `path`
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let repo = Self {
            conn: Mutex::new(conn),
            lock_lease: DEFAULT_LOCK_LEASE,
        };
        repo.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite account repository initialized");
        Ok(repo)
    }

    /// Create in-memory repository (for testing)
    pub fn in_memory() -> Result<Self> {
        let repo = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            lock_lease: DEFAULT_LOCK_LEASE,
        };
        repo.create_schema()?;
        Ok(repo)
    }

    /// Replace the default lock lease
    #[must_use]
    pub fn with_lock_lease(mut self, lease: Duration) -> Self {
        self.lock_lease = lease;
        self
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::other("account repository connection poisoned"))
    }

    fn create_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS accounts (
                    id INTEGER PRIMARY KEY,
                    source_username TEXT,
                    source_password TEXT,
                    fitness TEXT NOT NULL DEFAULT '[]',
                    watermark INTEGER NOT NULL DEFAULT 0,
                    locked INTEGER NOT NULL DEFAULT 0,
                    locked_at INTEGER,
                    updated_at TEXT NOT NULL
                );
                "#,
        )?;

        // Databases created before lock leases lack the column
        let has_locked_at = conn
            .prepare("SELECT 1 FROM pragma_table_info('accounts') WHERE name = 'locked_at'")?
            .exists([])?;
        if !has_locked_at {
            conn.execute_batch("ALTER TABLE accounts ADD COLUMN locked_at INTEGER;")?;
        }
        Ok(())
    }
}

impl AccountRepository for SqliteAccountRepository {
    fn list_account_ids(&self) -> Result<Vec<AccountId>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id FROM accounts ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<AccountId>, _>>()?;
        Ok(ids)
    }

    fn load_account(&self, id: AccountId) -> Result<Account> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT source_username, source_password, fitness, watermark, locked
                 FROM accounts WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, TripId>(3)?,
                        row.get::<_, bool>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((username, password, fitness, watermark, locked)) = row else {
            return Err(Error::AccountNotFound(id));
        };

        let source = match (username, password) {
            (Some(username), Some(password)) => Some(SourceCredentials { username, password }),
            _ => None,
        };
        let fitness: Vec<FitnessCredentials> = serde_json::from_str(&fitness)?;

        Ok(Account {
            id,
            source,
            fitness,
            watermark,
            locked,
        })
    }

    fn save_watermark(&self, id: AccountId, watermark: TripId) -> Result<()> {
        let changed = self.conn()?.execute(
            "UPDATE accounts SET watermark = MAX(watermark, ?2), updated_at = ?3 WHERE id = ?1",
            params![id, watermark, chrono::Utc::now().to_rfc3339()],
        )?;
        if changed == 0 {
            return Err(Error::AccountNotFound(id));
        }
        Ok(())
    }

    fn try_lock(&self, id: AccountId) -> Result<bool> {
        let now = chrono::Utc::now();
        let lease = i64::try_from(self.lock_lease.as_secs()).unwrap_or(i64::MAX);
        let expired_before = now.timestamp().saturating_sub(lease);
        let conn = self.conn()?;

        let changed = conn.execute(
            "UPDATE accounts SET locked = 1, locked_at = ?2, updated_at = ?3
             WHERE id = ?1 AND locked = 0",
            params![id, now.timestamp(), now.to_rfc3339()],
        )?;
        if changed == 1 {
            return Ok(true);
        }

        let reclaimed = conn.execute(
            "UPDATE accounts SET locked = 1, locked_at = ?2, updated_at = ?3
             WHERE id = ?1 AND locked = 1 AND (locked_at IS NULL OR locked_at <= ?4)",
            params![id, now.timestamp(), now.to_rfc3339(), expired_before],
        )?;
        if reclaimed == 1 {
            tracing::warn!(account_id = id, "Reclaimed lock whose lease expired");
        }
        Ok(reclaimed == 1)
    }

    fn release_lock(&self, id: AccountId) -> Result<()> {
        self.conn()?.execute(
            "UPDATE accounts SET locked = 0, locked_at = NULL, updated_at = ?2 WHERE id = ?1",
            params![id, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn upsert_account(&self, account: &Account) -> Result<()> {
        let fitness = serde_json::to_string(&account.fitness)?;
        let (username, password) = match &account.source {
            Some(creds) => (Some(creds.username.as_str()), Some(creds.password.as_str())),
            None => (None, None),
        };

        self.conn()?.execute(
            r#"
                INSERT INTO accounts (id, source_username, source_password, fitness, watermark, locked, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
                ON CONFLICT(id) DO UPDATE SET
                    source_username = excluded.source_username,
                    source_password = excluded.source_password,
                    fitness = excluded.fitness,
                    updated_at = excluded.updated_at
                "#,
            params![
                account.id,
                username,
                password,
                fitness,
                account.watermark,
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }
}

// ============================================================================
// In-memory Implementation (for testing)
// ============================================================================

/// Mutex-guarded in-memory implementation of AccountRepository
pub struct InMemoryAccountRepository {
    state: Mutex<MemoryState>,
    lock_lease: Duration,
}

#[derive(Default)]
struct MemoryState {
    accounts: BTreeMap<AccountId, Account>,
    locked_at: HashMap<AccountId, Instant>,
}

impl Default for InMemoryAccountRepository {
    fn default() -> Self {
        Self {
            state: Mutex::default(),
            lock_lease: DEFAULT_LOCK_LEASE,
        }
    }
}

impl InMemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the default lock lease
    #[must_use]
    pub fn with_lock_lease(mut self, lease: Duration) -> Self {
        self.lock_lease = lease;
        self
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| Error::other("account map poisoned"))
    }
}

impl AccountRepository for InMemoryAccountRepository {
    fn list_account_ids(&self) -> Result<Vec<AccountId>> {
        Ok(self.state()?.accounts.keys().copied().collect())
    }

    fn load_account(&self, id: AccountId) -> Result<Account> {
        self.state()?
            .accounts
            .get(&id)
            .cloned()
            .ok_or(Error::AccountNotFound(id))
    }

    fn save_watermark(&self, id: AccountId, watermark: TripId) -> Result<()> {
        let mut state = self.state()?;
        let account = state.accounts.get_mut(&id).ok_or(Error::AccountNotFound(id))?;
        account.watermark = account.watermark.max(watermark);
        Ok(())
    }

    fn try_lock(&self, id: AccountId) -> Result<bool> {
        let mut state = self.state()?;
        let expired = state
            .locked_at
            .get(&id)
            .map_or(true, |at| at.elapsed() >= self.lock_lease);

        let MemoryState { accounts, locked_at } = &mut *state;
        match accounts.get_mut(&id) {
            Some(account) if !account.locked || expired => {
                if account.locked {
                    tracing::warn!(account_id = id, "Reclaimed lock whose lease expired");
                }
                account.locked = true;
                locked_at.insert(id, Instant::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn release_lock(&self, id: AccountId) -> Result<()> {
        let mut state = self.state()?;
        if let Some(account) = state.accounts.get_mut(&id) {
            account.locked = false;
        }
        state.locked_at.remove(&id);
        Ok(())
    }

    fn upsert_account(&self, account: &Account) -> Result<()> {
        let mut state = self.state()?;
        match state.accounts.get_mut(&account.id) {
            Some(existing) => {
                existing.source = account.source.clone();
                existing.fitness = account.fitness.clone();
            }
            None => {
                let mut fresh = account.clone();
                fresh.locked = false;
                state.accounts.insert(account.id, fresh);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_account(id: AccountId) -> Account {
        Account {
            id,
            source: Some(SourceCredentials {
                username: "rider@example.com".to_string(),
                password: "hunter2".to_string(),
            }),
            fitness: vec![FitnessCredentials::Fitbit {
                access_token: "fb-token".to_string(),
            }],
            watermark: 0,
            locked: false,
        }
    }

    fn exercise(repo: &dyn AccountRepository) {
        repo.upsert_account(&sample_account(2)).unwrap();
        repo.upsert_account(&sample_account(1)).unwrap();
        assert_eq!(repo.list_account_ids().unwrap(), vec![1, 2]);

        let loaded = repo.load_account(1).unwrap();
        assert_eq!(loaded, sample_account(1));

        // Lock is a compare-and-swap
        assert!(repo.try_lock(1).unwrap());
        assert!(!repo.try_lock(1).unwrap());
        assert!(repo.try_lock(2).unwrap());
        repo.release_lock(1).unwrap();
        assert!(repo.try_lock(1).unwrap());
        assert!(!repo.try_lock(99).unwrap());

        // Watermark never goes backwards
        repo.save_watermark(1, 150).unwrap();
        repo.save_watermark(1, 120).unwrap();
        assert_eq!(repo.load_account(1).unwrap().watermark, 150);

        // Upsert keeps progress and lock state
        let mut updated = sample_account(1);
        updated.fitness.clear();
        repo.upsert_account(&updated).unwrap();
        let loaded = repo.load_account(1).unwrap();
        assert!(loaded.fitness.is_empty());
        assert_eq!(loaded.watermark, 150);
        assert!(loaded.locked);

        assert!(matches!(repo.load_account(42), Err(Error::AccountNotFound(42))));
        assert!(matches!(repo.save_watermark(42, 1), Err(Error::AccountNotFound(42))));
    }

    #[test]
    fn test_sqlite_repository() {
        let repo = SqliteAccountRepository::in_memory().unwrap();
        exercise(&repo);
    }

    #[test]
    fn test_in_memory_repository() {
        let repo = InMemoryAccountRepository::new();
        exercise(&repo);
    }

    fn exercise_lease(fresh: &dyn AccountRepository, expired: &dyn AccountRepository) {
        for repo in [fresh, expired] {
            repo.upsert_account(&sample_account(1)).unwrap();
            assert!(repo.try_lock(1).unwrap());
        }

        // A lock inside its lease is respected
        assert!(!fresh.try_lock(1).unwrap());
        // An expired one is taken over
        assert!(expired.try_lock(1).unwrap());
        assert!(expired.load_account(1).unwrap().locked);

        expired.release_lock(1).unwrap();
        assert!(!expired.load_account(1).unwrap().locked);
    }

    #[test]
    fn test_sqlite_lock_lease() {
        let fresh = SqliteAccountRepository::in_memory().unwrap();
        let expired = SqliteAccountRepository::in_memory()
            .unwrap()
            .with_lock_lease(Duration::ZERO);
        exercise_lease(&fresh, &expired);
    }

    #[test]
    fn test_in_memory_lock_lease() {
        let fresh = InMemoryAccountRepository::new();
        let expired = InMemoryAccountRepository::new().with_lock_lease(Duration::ZERO);
        exercise_lease(&fresh, &expired);
    }

    #[test]
    fn test_lock_survives_reopen_until_lease_expires() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.db");

        {
            let repo = SqliteAccountRepository::new(&path).unwrap();
            repo.upsert_account(&sample_account(3)).unwrap();
            assert!(repo.try_lock(3).unwrap());
        }

        let repo = SqliteAccountRepository::new(&path).unwrap();
        assert!(repo.load_account(3).unwrap().locked);
        assert!(!repo.try_lock(3).unwrap());

        let repo = repo.with_lock_lease(Duration::ZERO);
        assert!(repo.try_lock(3).unwrap());
    }

    #[test]
    fn test_schema_upgrade_adds_lock_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");

        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                r#"
                CREATE TABLE accounts (
                    id INTEGER PRIMARY KEY,
                    source_username TEXT,
                    source_password TEXT,
                    fitness TEXT NOT NULL DEFAULT '[]',
                    watermark INTEGER NOT NULL DEFAULT 0,
                    locked INTEGER NOT NULL DEFAULT 0,
                    updated_at TEXT NOT NULL
                );
                INSERT INTO accounts (id, locked, updated_at) VALUES (9, 1, '2015-06-01T12:00:00+00:00');
                "#,
            )
            .unwrap();
        }

        // A lock with no recorded time has no live lease
        let repo = SqliteAccountRepository::new(&path).unwrap();
        assert!(repo.try_lock(9).unwrap());
        assert!(!repo.try_lock(9).unwrap());
    }

    #[test]
    fn test_sqlite_file_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("accounts.db");

        {
            let repo = SqliteAccountRepository::new(&path).unwrap();
            repo.upsert_account(&sample_account(7)).unwrap();
            repo.save_watermark(7, 1_433_160_000).unwrap();
        }

        let repo = SqliteAccountRepository::new(&path).unwrap();
        let account = repo.load_account(7).unwrap();
        assert_eq!(account.watermark, 1_433_160_000);
        assert_eq!(account.source.unwrap().username, "rider@example.com");
    }
}

//! Account persistence: credentials, watermark and update lock

pub mod repository;

pub use repository::{
    AccountRepository, InMemoryAccountRepository, SqliteAccountRepository, DEFAULT_LOCK_LEASE,
};

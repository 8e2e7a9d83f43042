//! pgmux Storage Layer
//!
//! SQLite platform database with field-level encryption for per-project
//! database passwords.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │            ProjectRepository (pgmux-core)            │
//! ├──────────────────────────────────────────────────────┤
//! │               SqliteProjectRepository                │
//! ├──────────────────────────────────────────────────────┤
//! │         FieldEncryptor (AES-256-GCM)                 │
//! ├──────────────────────────────────────────────────────┤
//! │     MasterKeyProvider (env key or key file)          │
//! ├──────────────────────────────────────────────────────┤
//! │                   Database                           │
//! │                   (SQLite)                           │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use pgmux_storage::{Database, FieldEncryptor, FileKeyProvider, MasterKeyProvider, SqliteProjectRepository};
//! use std::sync::Arc;
//! use tokio::sync::Mutex;
//!
//! let key = FileKeyProvider::new(dir.join("master.key")).get_or_create_key()?;
//! let db = Arc::new(Mutex::new(Database::open(&path)?));
//! let encryptor = Arc::new(FieldEncryptor::new(&key)?);
//! let projects = SqliteProjectRepository::new(db, encryptor);
//! ```

pub mod crypto;
mod database;
pub mod key_provider;
mod repositories;

pub use crypto::{generate_master_key, FieldEncryptor, KEY_SIZE};
pub use database::Database;
pub use key_provider::{FileKeyProvider, MasterKeyProvider, StaticKeyProvider, MASTER_KEY_FILE};
pub use repositories::*;


//! Repository implementations using SQLite.

mod project_repository;

pub use project_repository::SqliteProjectRepository;

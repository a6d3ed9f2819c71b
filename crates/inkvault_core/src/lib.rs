//! Offline-first storage core for Inkvault.
//!
//! Owns the library store (configurations, book catalog, notes) and the
//! per-book stores (schema copy, instances, manuscript). All business
//! invariants are enforced here.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use db::{
    open_book_db, open_book_db_in_memory, open_library_db, open_library_db_in_memory, DbError,
    DbResult, StoreKind,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig};
pub use model::ModelValidationError;
pub use repo::{MoveDirection, RepoError, RepoResult};
pub use service::book_service::{init_book_store, BookService, BookServiceError, BookStoreService};
pub use service::instance_service::{InstanceService, InstanceServiceError};
pub use service::manuscript_service::{ManuscriptService, ManuscriptServiceError};
pub use service::note_service::{NoteService, NoteServiceError};
pub use service::schema_service::{SchemaService, SchemaServiceError};
pub use service::user_doc_service::{UserDocService, UserDocServiceError};

/// Minimal health-check API for embedding shells.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}

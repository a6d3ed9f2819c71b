//! Book catalog and book-store bootstrap use-cases.
//!
//! # Responsibility
//! - Manage the library book catalog.
//! - Seed a book store from the book's configuration.
//! - Expose the book store's sync row.
//!
//! # Invariants
//! - A catalog entry always references an existing configuration.
//! - A seeded book store carries the configuration UUIDs unchanged.

use crate::model::configuration::ConfigurationId;
use crate::model::manuscript::{Book, BookId, BookInfo, SyncState};
use crate::repo::book_repo::{
    BookCatalogRepository, BookStoreRepository, SqliteBookCatalogRepository,
    SqliteBookStoreRepository,
};
use crate::repo::schema_repo::{SchemaRepository, SqliteSchemaRepository};
use crate::repo::RepoError;
use log::{error, info};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum BookServiceError {
    BookNotFound(BookId),
    ConfigurationNotFound(ConfigurationId),
    /// Book store has no `book_info` row yet.
    StoreNotInitialized,
    Repo(RepoError),
}

impl Display for BookServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BookNotFound(id) => write!(f, "book not found: {id}"),
            Self::ConfigurationNotFound(id) => write!(f, "configuration not found: {id}"),
            Self::StoreNotInitialized => write!(f, "book store is not initialized"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for BookServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for BookServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound {
                entity: "book",
                uuid,
            } => Self::BookNotFound(uuid),
            RepoError::NotFound {
                entity: "configuration",
                uuid,
            } => Self::ConfigurationNotFound(uuid),
            other => Self::Repo(other),
        }
    }
}

pub type BookServiceResult<T> = Result<T, BookServiceError>;

/// Library catalog service facade.
pub struct BookService<C: BookCatalogRepository, S: SchemaRepository> {
    catalog: C,
    schema: S,
}

impl<C: BookCatalogRepository, S: SchemaRepository> BookService<C, S> {
    pub fn new(catalog: C, schema: S) -> Self {
        Self { catalog, schema }
    }

    /// Adds a book to the catalog; `configuration_title` is taken from the
    /// referenced configuration.
    pub fn create_book(&self, book: &Book) -> BookServiceResult<Book> {
        let configuration = self
            .schema
            .get_configuration(book.configuration_uuid)?
            .ok_or(BookServiceError::ConfigurationNotFound(book.configuration_uuid))?;
        let mut stored = book.clone();
        stored.configuration_title = configuration.title;
        self.catalog.create_book(&stored)?;
        self.require_book(stored.uuid)
    }

    pub fn get_book(&self, uuid: BookId) -> BookServiceResult<Option<Book>> {
        Ok(self.catalog.get_book(uuid)?)
    }

    pub fn list_books(&self) -> BookServiceResult<Vec<Book>> {
        Ok(self.catalog.list_books()?)
    }

    /// Updates catalog metadata and marks the entry as locally changed.
    pub fn update_book(&self, book: &Book) -> BookServiceResult<()> {
        Ok(self.catalog.update_book(book)?)
    }

    pub fn delete_book(&self, uuid: BookId) -> BookServiceResult<()> {
        Ok(self.catalog.delete_book(uuid)?)
    }

    pub fn mark_sync_state(&self, uuid: BookId, state: SyncState) -> BookServiceResult<()> {
        Ok(self.catalog.mark_sync_state(uuid, state)?)
    }

    fn require_book(&self, uuid: BookId) -> BookServiceResult<Book> {
        self.catalog
            .get_book(uuid)?
            .ok_or(BookServiceError::BookNotFound(uuid))
    }
}

/// Book-store sync row service facade.
pub struct BookStoreService<B: BookStoreRepository> {
    store: B,
}

impl<B: BookStoreRepository> BookStoreService<B> {
    pub fn new(store: B) -> Self {
        Self { store }
    }

    pub fn book_info(&self) -> BookServiceResult<BookInfo> {
        self.store
            .get_book_info()?
            .ok_or(BookServiceError::StoreNotInitialized)
    }

    pub fn set_sync_state(&self, state: SyncState) -> BookServiceResult<()> {
        Ok(self.store.set_sync_state(state)?)
    }

    /// Records a successful upload at `server_updated_at`.
    pub fn mark_synced(&self, server_updated_at: i64) -> BookServiceResult<()> {
        Ok(self.store.mark_synced(server_updated_at)?)
    }
}

/// Copies the configuration of catalog book `book_uuid` from `library` into
/// the empty `book_store` and writes its `book_info` row.
///
/// `single` blocks receive their lone instance in the same transaction.
pub fn init_book_store(
    library: &Connection,
    book_store: &Connection,
    book_uuid: BookId,
) -> BookServiceResult<BookInfo> {
    let result = seed_book_store(library, book_store, book_uuid);
    if let Err(err) = &result {
        error!(
            "event=book_store_init module=service status=error book_uuid={book_uuid} error={err}"
        );
    }
    result
}

fn seed_book_store(
    library: &Connection,
    book_store: &Connection,
    book_uuid: BookId,
) -> BookServiceResult<BookInfo> {
    let catalog = SqliteBookCatalogRepository::try_new(library)?;
    let schema = SqliteSchemaRepository::try_new(library)?;
    let book = catalog
        .get_book(book_uuid)?
        .ok_or(BookServiceError::BookNotFound(book_uuid))?;
    let snapshot = schema
        .export_configuration(book.configuration_uuid)?
        .ok_or(BookServiceError::ConfigurationNotFound(book.configuration_uuid))?;

    let store = SqliteBookStoreRepository::try_new(book_store)?;
    let info = BookInfo {
        book_uuid: book.uuid,
        title: book.title,
        configuration_uuid: book.configuration_uuid,
        local_updated_at: None,
        server_updated_at: None,
        sync_state: SyncState::LocalChanges,
    };
    let lone_instances = store.import_configuration(&snapshot, &info)?;
    info!(
        "event=book_store_init module=service status=ok book_uuid={} blocks={} parameters={} lone_instances={}",
        book_uuid,
        snapshot.blocks.len(),
        snapshot.parameters.len(),
        lone_instances
    );

    store
        .get_book_info()?
        .ok_or(BookServiceError::StoreNotInitialized)
}

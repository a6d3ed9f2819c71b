use inkvault_core::model::block::{Block, StructureKind};
use inkvault_core::model::manuscript::{Book, SyncState};
use inkvault_core::model::parameter::{BlockParameter, ParameterDataType};
use inkvault_core::repo::book_repo::{SqliteBookCatalogRepository, SqliteBookStoreRepository};
use inkvault_core::repo::instance_repo::SqliteInstanceRepository;
use inkvault_core::repo::parameter_repo::SqliteParameterRepository;
use inkvault_core::repo::schema_repo::SqliteSchemaRepository;
use inkvault_core::service::instance_service::InstanceService;
use inkvault_core::service::schema_service::SchemaService;
use inkvault_core::{
    init_book_store, open_book_db_in_memory, open_library_db_in_memory, BookService,
    BookServiceError, BookStoreService,
};
use rusqlite::Connection;

type Schema<'conn> = SchemaService<SqliteSchemaRepository<'conn>, SqliteParameterRepository<'conn>>;
type Catalog<'conn> = BookService<SqliteBookCatalogRepository<'conn>, SqliteSchemaRepository<'conn>>;

fn schema(conn: &Connection) -> Schema<'_> {
    SchemaService::new(
        SqliteSchemaRepository::try_new(conn).unwrap(),
        SqliteParameterRepository::try_new(conn).unwrap(),
    )
}

fn catalog(conn: &Connection) -> Catalog<'_> {
    BookService::new(
        SqliteBookCatalogRepository::try_new(conn).unwrap(),
        SqliteSchemaRepository::try_new(conn).unwrap(),
    )
}

#[test]
fn created_book_carries_configuration_title() {
    let library = open_library_db_in_memory().unwrap();
    let configuration = schema(&library)
        .create_configuration("Epic Fantasy", "")
        .unwrap();
    let books = catalog(&library);

    let book = books
        .create_book(&Book::new("The Long Road", configuration.uuid))
        .unwrap();
    assert_eq!(book.configuration_title, "Epic Fantasy");
    assert_eq!(books.list_books().unwrap().len(), 1);

    let ghost = uuid::Uuid::new_v4();
    let err = books.create_book(&Book::new("Lost", ghost)).unwrap_err();
    assert!(matches!(err, BookServiceError::ConfigurationNotFound(id) if id == ghost));
}

#[test]
fn updating_catalog_entry_marks_local_changes() {
    let library = open_library_db_in_memory().unwrap();
    let configuration = schema(&library).create_configuration("Noir", "").unwrap();
    let books = catalog(&library);
    let mut book = books
        .create_book(&Book::new("Rain City", configuration.uuid))
        .unwrap();
    assert_eq!(book.sync_state, SyncState::Synced);

    book.author = "M. Vale".to_string();
    books.update_book(&book).unwrap();

    let stored = books.get_book(book.uuid).unwrap().unwrap();
    assert_eq!(stored.author, "M. Vale");
    assert_eq!(stored.sync_state, SyncState::LocalChanges);
    assert!(stored.local_updated_at.is_some());

    books.mark_sync_state(book.uuid, SyncState::Synced).unwrap();
    assert_eq!(
        books.get_book(book.uuid).unwrap().unwrap().sync_state,
        SyncState::Synced
    );
}

#[test]
fn book_store_is_seeded_from_library_configuration() {
    let library = open_library_db_in_memory().unwrap();
    let library_schema = schema(&library);
    let configuration = library_schema.create_configuration("Saga", "").unwrap();
    let world = library_schema
        .create_block(&Block::new(configuration.uuid, "World", StructureKind::Single))
        .unwrap();
    let heroes = library_schema
        .create_block(&Block::new(configuration.uuid, "Heroes", StructureKind::Multiple))
        .unwrap();
    let group = library_schema
        .list_parameter_groups(heroes.uuid)
        .unwrap()
        .remove(0);
    let age = library_schema
        .create_parameter(&BlockParameter::new(
            heroes.uuid,
            group.uuid,
            "Age",
            ParameterDataType::String,
        ))
        .unwrap();
    let book = catalog(&library)
        .create_book(&Book::new("Ashes", configuration.uuid))
        .unwrap();

    let store = open_book_db_in_memory().unwrap();
    let info = init_book_store(&library, &store, book.uuid).unwrap();
    assert_eq!(info.book_uuid, book.uuid);
    assert_eq!(info.title, "Ashes");
    assert_eq!(info.sync_state, SyncState::LocalChanges);

    let store_schema = schema(&store);
    let blocks = store_schema.list_blocks(configuration.uuid).unwrap();
    let mut block_ids: Vec<_> = blocks.iter().map(|block| block.uuid).collect();
    block_ids.sort();
    let mut expected = vec![world.uuid, heroes.uuid];
    expected.sort();
    assert_eq!(block_ids, expected);
    let copied = store_schema.get_parameter(age.uuid).unwrap().unwrap();
    assert_eq!(copied.title, "Age");

    let instances = InstanceService::new(
        SqliteInstanceRepository::try_new(&store).unwrap(),
        SqliteSchemaRepository::try_new(&store).unwrap(),
        SqliteParameterRepository::try_new(&store).unwrap(),
    );
    assert_eq!(instances.list_instances(world.uuid, None).unwrap().len(), 1);
    assert!(instances.list_instances(heroes.uuid, None).unwrap().is_empty());

    let err = init_book_store(&library, &store, book.uuid).unwrap_err();
    assert!(matches!(err, BookServiceError::Repo(_)));
}

#[test]
fn seeding_unknown_book_fails() {
    let library = open_library_db_in_memory().unwrap();
    let store = open_book_db_in_memory().unwrap();
    let ghost = uuid::Uuid::new_v4();

    let err = init_book_store(&library, &store, ghost).unwrap_err();
    assert!(matches!(err, BookServiceError::BookNotFound(id) if id == ghost));
}

#[test]
fn book_store_sync_row_tracks_uploads() {
    let library = open_library_db_in_memory().unwrap();
    let configuration = schema(&library).create_configuration("Saga", "").unwrap();
    let book = catalog(&library)
        .create_book(&Book::new("Ashes", configuration.uuid))
        .unwrap();
    let store = open_book_db_in_memory().unwrap();
    let service = BookStoreService::new(SqliteBookStoreRepository::try_new(&store).unwrap());

    let err = service.book_info().unwrap_err();
    assert!(matches!(err, BookServiceError::StoreNotInitialized));

    init_book_store(&library, &store, book.uuid).unwrap();
    service.mark_synced(1_700_000_000_000).unwrap();
    let info = service.book_info().unwrap();
    assert_eq!(info.sync_state, SyncState::Synced);
    assert_eq!(info.server_updated_at, Some(1_700_000_000_000));

    service.set_sync_state(SyncState::ServerChanges).unwrap();
    assert_eq!(service.book_info().unwrap().sync_state, SyncState::ServerChanges);
}

use inkvault_core::model::block::{Block, StructureKind};
use inkvault_core::model::manuscript::Book;
use inkvault_core::model::user_doc::UserDocPage;
use inkvault_core::repo::book_repo::SqliteBookCatalogRepository;
use inkvault_core::repo::parameter_repo::SqliteParameterRepository;
use inkvault_core::repo::schema_repo::SqliteSchemaRepository;
use inkvault_core::repo::user_doc_repo::SqliteUserDocRepository;
use inkvault_core::service::schema_service::SchemaService;
use inkvault_core::{
    init_book_store, open_book_db_in_memory, open_library_db_in_memory, BookService,
    RepoError, SchemaServiceError, UserDocService, UserDocServiceError,
};
use rusqlite::Connection;

type Schema<'conn> = SchemaService<SqliteSchemaRepository<'conn>, SqliteParameterRepository<'conn>>;
type Docs<'conn> = UserDocService<SqliteUserDocRepository<'conn>>;

fn schema(conn: &Connection) -> Schema<'_> {
    SchemaService::new(
        SqliteSchemaRepository::try_new(conn).unwrap(),
        SqliteParameterRepository::try_new(conn).unwrap(),
    )
}

fn docs(conn: &Connection) -> Docs<'_> {
    UserDocService::new(SqliteUserDocRepository::try_new(conn).unwrap())
}

#[test]
fn page_save_get_list_delete() {
    let library = open_library_db_in_memory().unwrap();
    let configuration = schema(&library).create_configuration("Saga", "").unwrap();
    let service = docs(&library);

    let mut page = service
        .create_page("Magic system", Some(configuration.uuid))
        .unwrap();
    assert_eq!(page.markdown, "");
    let loose = service.save_page(&UserDocPage::new("Scratch", "# draft")).unwrap();

    page.markdown = "# Mana\nDrawn from ley lines.".to_string();
    let stored = service.save_page(&page).unwrap();
    assert_eq!(stored.uuid, page.uuid);
    assert_eq!(stored.markdown, "# Mana\nDrawn from ley lines.");
    assert_eq!(service.get_page(page.uuid).unwrap(), Some(stored));

    assert_eq!(service.list_pages().unwrap().len(), 2);
    let by_configuration = service
        .list_pages_by_configuration(configuration.uuid)
        .unwrap();
    assert_eq!(by_configuration.len(), 1);
    assert_eq!(by_configuration[0].uuid, page.uuid);

    service.delete_page(loose.uuid).unwrap();
    assert!(service.get_page(loose.uuid).unwrap().is_none());
    let err = service.delete_page(loose.uuid).unwrap_err();
    assert!(matches!(err, UserDocServiceError::PageNotFound(id) if id == loose.uuid));
}

#[test]
fn blank_page_title_is_rejected() {
    let library = open_library_db_in_memory().unwrap();
    let err = docs(&library)
        .save_page(&UserDocPage::new("   ", ""))
        .unwrap_err();
    assert!(matches!(err, UserDocServiceError::Repo(RepoError::Validation(_))));
}

#[test]
fn block_must_reference_existing_page() {
    let library = open_library_db_in_memory().unwrap();
    let library_schema = schema(&library);
    let configuration = library_schema.create_configuration("Saga", "").unwrap();

    let ghost = uuid::Uuid::new_v4();
    let mut block = Block::new(configuration.uuid, "Heroes", StructureKind::Multiple);
    block.user_doc_page_uuid = Some(ghost);
    let err = library_schema.create_block(&block).unwrap_err();
    assert!(matches!(err, SchemaServiceError::UserDocPageNotFound(id) if id == ghost));

    let page = docs(&library)
        .create_page("Heroes", Some(configuration.uuid))
        .unwrap();
    block.user_doc_page_uuid = Some(page.uuid);
    let created = library_schema.create_block(&block).unwrap();
    assert_eq!(created.user_doc_page_uuid, Some(page.uuid));
}

#[test]
fn deleting_page_detaches_blocks() {
    let library = open_library_db_in_memory().unwrap();
    let library_schema = schema(&library);
    let configuration = library_schema.create_configuration("Saga", "").unwrap();
    let service = docs(&library);
    let page = service
        .create_page("Factions", Some(configuration.uuid))
        .unwrap();
    let mut block = Block::new(configuration.uuid, "Factions", StructureKind::Multiple);
    block.user_doc_page_uuid = Some(page.uuid);
    let block = library_schema.create_block(&block).unwrap();

    service.delete_page(page.uuid).unwrap();

    let stored = library_schema.get_block(block.uuid).unwrap().unwrap();
    assert_eq!(stored.user_doc_page_uuid, None);
}

#[test]
fn deleting_configuration_removes_its_pages() {
    let library = open_library_db_in_memory().unwrap();
    let library_schema = schema(&library);
    let doomed = library_schema.create_configuration("Doomed", "").unwrap();
    let kept = library_schema.create_configuration("Kept", "").unwrap();
    let service = docs(&library);
    service.create_page("Gone", Some(doomed.uuid)).unwrap();
    let survivor = service.create_page("Stays", Some(kept.uuid)).unwrap();

    library_schema.delete_configuration(doomed.uuid).unwrap();

    let remaining = service.list_pages().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].uuid, survivor.uuid);
}

#[test]
fn seeded_book_store_receives_configuration_pages() {
    let library = open_library_db_in_memory().unwrap();
    let library_schema = schema(&library);
    let configuration = library_schema.create_configuration("Saga", "").unwrap();
    let library_docs = docs(&library);
    let page = library_docs
        .create_page("Bestiary", Some(configuration.uuid))
        .unwrap();
    library_docs.create_page("Unrelated", None).unwrap();
    let mut block = Block::new(configuration.uuid, "Beasts", StructureKind::Multiple);
    block.user_doc_page_uuid = Some(page.uuid);
    library_schema.create_block(&block).unwrap();
    let book = BookService::new(
        SqliteBookCatalogRepository::try_new(&library).unwrap(),
        SqliteSchemaRepository::try_new(&library).unwrap(),
    )
    .create_book(&Book::new("Wild Lands", configuration.uuid))
    .unwrap();

    let store = open_book_db_in_memory().unwrap();
    init_book_store(&library, &store, book.uuid).unwrap();

    let copied = docs(&store).list_pages().unwrap();
    assert_eq!(copied.len(), 1);
    assert_eq!(copied[0].uuid, page.uuid);
    assert_eq!(copied[0].title, "Bestiary");
    assert_eq!(copied[0].book_uuid, Some(book.uuid));
    let copied_block = schema(&store).get_block(block.uuid).unwrap().unwrap();
    assert_eq!(copied_block.user_doc_page_uuid, Some(page.uuid));
}

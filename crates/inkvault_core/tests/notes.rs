use inkvault_core::model::manuscript::SyncState;
use inkvault_core::model::note::USER_GROUP_KIND;
use inkvault_core::open_library_db_in_memory;
use inkvault_core::repo::note_repo::SqliteNoteRepository;
use inkvault_core::service::note_service::{NoteService, NoteServiceError};
use rusqlite::Connection;

fn service(conn: &Connection) -> NoteService<SqliteNoteRepository<'_>> {
    NoteService::new(SqliteNoteRepository::try_new(conn).unwrap())
}

#[test]
fn notes_are_appended_within_their_group() {
    let conn = open_library_db_in_memory().unwrap();
    let service = service(&conn);
    let lore = service.create_group("Lore", None).unwrap();

    let first = service.create_note("Gods", Some(lore.uuid), None).unwrap();
    let second = service.create_note("Rivers", Some(lore.uuid), None).unwrap();
    let loose = service.create_note("Todo", None, None).unwrap();

    assert_eq!((first.order_number, second.order_number), (0, 1));
    assert_eq!(loose.order_number, 0);
    assert_eq!(service.list_notes_by_group(Some(lore.uuid)).unwrap().len(), 2);
    let ungrouped = service.list_notes_by_group(None).unwrap();
    assert_eq!(ungrouped.len(), 1);
    assert_eq!(ungrouped[0].uuid, loose.uuid);
    assert_eq!(service.count_notes().unwrap(), 3);
}

#[test]
fn saving_note_normalizes_tags() {
    let conn = open_library_db_in_memory().unwrap();
    let service = service(&conn);
    let mut note = service.create_note("Dragons", None, None).unwrap();

    note.tags = "#Fire; fire, Ancient  Wings".to_string();
    note.body = "Scales.".to_string();
    service.save_note(&note).unwrap();

    let stored = service.get_note(note.uuid).unwrap().unwrap();
    assert_eq!(stored.tags, "fire, ancient wings");
    assert_eq!(stored.body, "Scales.");
}

#[test]
fn note_requires_existing_group() {
    let conn = open_library_db_in_memory().unwrap();
    let service = service(&conn);
    let ghost = uuid::Uuid::new_v4();

    let err = service.create_note("Orphan", Some(ghost), None).unwrap_err();
    assert!(matches!(err, NoteServiceError::GroupNotFound(id) if id == ghost));
}

#[test]
fn notes_can_be_listed_by_book() {
    let conn = open_library_db_in_memory().unwrap();
    let service = service(&conn);
    let book = uuid::Uuid::new_v4();
    service.create_note("Plot", None, Some(book)).unwrap();
    service.create_note("Other", None, None).unwrap();

    let notes = service.list_notes_by_book(book).unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, "Plot");
}

#[test]
fn group_moves_reject_cycles() {
    let conn = open_library_db_in_memory().unwrap();
    let service = service(&conn);
    let world = service.create_group("World", None).unwrap();
    let places = service.create_group("Places", Some(world.uuid)).unwrap();
    let cities = service.create_group("Cities", Some(places.uuid)).unwrap();
    assert_eq!(
        (world.order_number, places.order_number, cities.order_number),
        (0, 1, 2)
    );
    assert_eq!(world.kind_code, USER_GROUP_KIND);

    let err = service.move_group(world.uuid, Some(cities.uuid)).unwrap_err();
    assert!(matches!(err, NoteServiceError::CycleDetected { .. }));
    let err = service.move_group(world.uuid, Some(world.uuid)).unwrap_err();
    assert!(matches!(err, NoteServiceError::CycleDetected { .. }));

    service.move_group(cities.uuid, None).unwrap();
    assert_eq!(service.list_top_level_groups().unwrap().len(), 2);
}

#[test]
fn deleting_group_lifts_children_and_ungroups_notes() {
    let conn = open_library_db_in_memory().unwrap();
    let service = service(&conn);
    let world = service.create_group("World", None).unwrap();
    let places = service.create_group("Places", Some(world.uuid)).unwrap();
    let cities = service.create_group("Cities", Some(places.uuid)).unwrap();
    let note = service.create_note("Capital", Some(places.uuid), None).unwrap();

    service.delete_group(places.uuid).unwrap();

    let children = service.list_child_groups(world.uuid).unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].uuid, cities.uuid);
    let stored = service.get_note(note.uuid).unwrap().unwrap();
    assert_eq!(stored.note_group_uuid, None);
    assert_eq!(service.count_groups().unwrap(), 2);
}

#[test]
fn groups_are_searchable_by_title_and_kind() {
    let conn = open_library_db_in_memory().unwrap();
    let service = service(&conn);
    service.create_group("Northern Realms", None).unwrap();
    service.create_group("Southern Realms", None).unwrap();
    service.create_group("Bestiary", None).unwrap();

    assert_eq!(service.find_groups_by_title("realms").unwrap().len(), 2);
    assert_eq!(service.find_groups_by_kind(USER_GROUP_KIND).unwrap().len(), 3);
    assert!(service.find_groups_by_kind("system").unwrap().is_empty());
}

#[test]
fn mutations_mark_notes_meta_as_changed() {
    let conn = open_library_db_in_memory().unwrap();
    let service = service(&conn);
    assert_eq!(service.meta().unwrap().sync_state, SyncState::Synced);

    service.create_note("Draft", None, None).unwrap();
    let meta = service.meta().unwrap();
    assert_eq!(meta.sync_state, SyncState::LocalChanges);
    assert!(meta.local_updated_at.is_some());

    service.mark_synced(1_700_000_000_000).unwrap();
    let meta = service.meta().unwrap();
    assert_eq!(meta.sync_state, SyncState::Synced);
    assert_eq!(meta.server_updated_at, Some(1_700_000_000_000));
}

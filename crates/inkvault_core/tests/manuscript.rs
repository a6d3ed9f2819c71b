use inkvault_core::model::manuscript::{Scene, SymbolCounts};
use inkvault_core::model::ModelValidationError;
use inkvault_core::repo::scene_repo::SqliteManuscriptRepository;
use inkvault_core::service::manuscript_service::{ManuscriptService, ManuscriptServiceError};
use inkvault_core::{open_book_db_in_memory, MoveDirection, RepoError};
use rusqlite::Connection;

fn service(conn: &Connection) -> ManuscriptService<SqliteManuscriptRepository<'_>> {
    ManuscriptService::new(SqliteManuscriptRepository::try_new(conn).unwrap())
}

fn titles(scenes: Vec<Scene>) -> Vec<(String, i64)> {
    scenes
        .into_iter()
        .map(|scene| (scene.title, scene.order_number))
        .collect()
}

fn pairs(values: &[(&str, i64)]) -> Vec<(String, i64)> {
    values
        .iter()
        .map(|(title, order)| (title.to_string(), *order))
        .collect()
}

#[test]
fn scenes_are_numbered_by_chapter_then_chapterless() {
    let conn = open_book_db_in_memory().unwrap();
    let service = service(&conn);
    let first = service.create_chapter("Arrival").unwrap();
    let second = service.create_chapter("Siege").unwrap();
    assert_eq!((first.order_number, second.order_number), (0, 1));

    service.create_scene("Loose", None, "").unwrap();
    service.create_scene("Walls", Some(second.uuid), "").unwrap();
    service.create_scene("Harbor", Some(first.uuid), "").unwrap();
    service.create_scene("Gate", Some(first.uuid), "").unwrap();

    assert_eq!(
        titles(service.list_scenes().unwrap()),
        pairs(&[("Harbor", 1), ("Gate", 2), ("Walls", 3), ("Loose", 4)])
    );

    assert!(service.move_chapter(second.uuid, MoveDirection::Up).unwrap());
    assert!(!service.move_chapter(second.uuid, MoveDirection::Up).unwrap());
    assert_eq!(
        titles(service.list_scenes().unwrap()),
        pairs(&[("Walls", 1), ("Harbor", 2), ("Gate", 3), ("Loose", 4)])
    );
}

#[test]
fn deleting_chapter_releases_its_scenes() {
    let conn = open_book_db_in_memory().unwrap();
    let service = service(&conn);
    let first = service.create_chapter("Arrival").unwrap();
    let second = service.create_chapter("Siege").unwrap();
    let harbor = service.create_scene("Harbor", Some(first.uuid), "").unwrap();
    service.create_scene("Walls", Some(second.uuid), "").unwrap();

    service.delete_chapter(first.uuid).unwrap();

    let chapters = service.list_chapters().unwrap();
    assert_eq!(chapters.len(), 1);
    assert_eq!(chapters[0].uuid, second.uuid);
    assert_eq!(chapters[0].order_number, 0);
    let released = service.get_scene(harbor.uuid).unwrap().unwrap();
    assert_eq!(released.chapter_uuid, None);
    assert_eq!(
        titles(service.list_scenes().unwrap()),
        pairs(&[("Walls", 1), ("Harbor", 2)])
    );
}

#[test]
fn moving_scene_appends_it_to_target_chapter() {
    let conn = open_book_db_in_memory().unwrap();
    let service = service(&conn);
    let first = service.create_chapter("Arrival").unwrap();
    let second = service.create_chapter("Siege").unwrap();
    let harbor = service.create_scene("Harbor", Some(first.uuid), "").unwrap();
    service.create_scene("Walls", Some(second.uuid), "").unwrap();
    service.create_scene("Breach", Some(second.uuid), "").unwrap();

    service.move_scene_to_chapter(harbor.uuid, second.uuid).unwrap();
    assert!(service.list_scenes_by_chapter(first.uuid).unwrap().is_empty());
    assert_eq!(
        titles(service.list_scenes_by_chapter(second.uuid).unwrap()),
        pairs(&[("Walls", 1), ("Breach", 2), ("Harbor", 3)])
    );

    service.remove_scene_from_chapter(harbor.uuid).unwrap();
    assert_eq!(service.get_scene(harbor.uuid).unwrap().unwrap().chapter_uuid, None);

    let missing = uuid::Uuid::new_v4();
    let err = service.move_scene_to_chapter(harbor.uuid, missing).unwrap_err();
    assert!(matches!(err, ManuscriptServiceError::ChapterNotFound(id) if id == missing));
}

#[test]
fn scene_body_updates_symbol_counts() {
    let conn = open_book_db_in_memory().unwrap();
    let service = service(&conn);
    let scene = service.create_scene("Rain", None, "Он шёл.").unwrap();
    assert_eq!(scene.symbol_count_with_spaces, 7);

    let counts = service
        .update_scene_body(scene.uuid, "Он шёл.\nДождь шёл тоже.")
        .unwrap();
    assert_eq!(
        counts,
        SymbolCounts {
            with_spaces: 22,
            without_spaces: 19
        }
    );

    let (stored, body) = service.get_scene_with_body(scene.uuid).unwrap().unwrap();
    assert_eq!(stored.symbol_count_without_spaces, 19);
    assert_eq!(body.body, "Он шёл.\nДождь шёл тоже.");
}

#[test]
fn swapping_scenes_exchanges_order_numbers() {
    let conn = open_book_db_in_memory().unwrap();
    let service = service(&conn);
    let dawn = service.create_scene("Dawn", None, "").unwrap();
    let dusk = service.create_scene("Dusk", None, "").unwrap();

    service.swap_scenes(dawn.uuid, dusk.uuid).unwrap();

    assert_eq!(
        titles(service.list_scenes().unwrap()),
        pairs(&[("Dusk", 1), ("Dawn", 2)])
    );
}

#[test]
fn content_scene_is_cleared_when_scene_is_deleted() {
    let conn = open_book_db_in_memory().unwrap();
    let service = service(&conn);
    let chapter = service.create_chapter("Prologue").unwrap();
    let scene = service
        .create_scene("Prologue text", Some(chapter.uuid), "Once.")
        .unwrap();

    let ghost = uuid::Uuid::new_v4();
    let err = service.set_content_scene(chapter.uuid, Some(ghost)).unwrap_err();
    assert!(matches!(err, ManuscriptServiceError::SceneNotFound(id) if id == ghost));

    service.set_content_scene(chapter.uuid, Some(scene.uuid)).unwrap();
    service.delete_scene(scene.uuid).unwrap();

    let chapter = &service.list_chapters().unwrap()[0];
    assert_eq!(chapter.content_scene_uuid, None);
    assert!(service.get_scene_with_body(scene.uuid).unwrap().is_none());
    assert_eq!(service.count_scenes().unwrap(), 0);
}

#[test]
fn scene_titles_are_required_and_searchable() {
    let conn = open_book_db_in_memory().unwrap();
    let service = service(&conn);
    let scene = service.create_scene("Night Market", None, "").unwrap();
    service.create_scene("Morning", None, "").unwrap();

    let err = service.rename_scene(scene.uuid, "   ").unwrap_err();
    assert!(matches!(
        err,
        ManuscriptServiceError::Repo(RepoError::Validation(ModelValidationError::BlankField(_)))
    ));

    let found = service.find_scenes_by_title("MARKET").unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].uuid, scene.uuid);
}

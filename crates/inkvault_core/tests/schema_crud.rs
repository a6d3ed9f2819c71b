use inkvault_core::model::block::{
    Block, BlockRelation, BlockTab, DisplayKind, RelationType, StructureKind, TabKind, TitleForms,
};
use inkvault_core::model::configuration::BookConfiguration;
use inkvault_core::model::parameter::{BlockParameter, ParameterDataType};
use inkvault_core::repo::parameter_repo::SqliteParameterRepository;
use inkvault_core::repo::schema_repo::SqliteSchemaRepository;
use inkvault_core::service::schema_service::{SchemaService, SchemaServiceError};
use inkvault_core::{open_library_db_in_memory, MoveDirection};
use rusqlite::Connection;

type Service<'conn> = SchemaService<SqliteSchemaRepository<'conn>, SqliteParameterRepository<'conn>>;

fn service(conn: &Connection) -> Service<'_> {
    SchemaService::new(
        SqliteSchemaRepository::try_new(conn).unwrap(),
        SqliteParameterRepository::try_new(conn).unwrap(),
    )
}

fn block(service: &Service<'_>, configuration: &BookConfiguration, title: &str) -> Block {
    service
        .create_block(&Block::new(configuration.uuid, title, StructureKind::Multiple))
        .unwrap()
}

fn link_parameter(
    service: &Service<'_>,
    owner: &Block,
    target: &Block,
    title: &str,
) -> BlockParameter {
    let group = &service.list_parameter_groups(owner.uuid).unwrap()[0];
    let mut parameter =
        BlockParameter::new(owner.uuid, group.uuid, title, ParameterDataType::BlockLink);
    parameter.linked_block_uuid = Some(target.uuid);
    service.create_parameter(&parameter).unwrap()
}

#[test]
fn create_block_seeds_group_tab_and_title_forms() {
    let conn = open_library_db_in_memory().unwrap();
    let service = service(&conn);
    let configuration = service.create_configuration("Fantasy", "").unwrap();

    let created = block(&service, &configuration, " Character ");

    assert_eq!(created.title_forms, Some(TitleForms::uniform("Character")));
    let groups = service.list_parameter_groups(created.uuid).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].title, "Main");
    let tabs = service.list_tabs(created.uuid).unwrap();
    assert_eq!(tabs.len(), 1);
    assert_eq!(tabs[0].tab_kind, TabKind::Parameters);
    assert!(tabs[0].is_default);
    assert_eq!(
        service.list_blocks(configuration.uuid).unwrap(),
        vec![created]
    );
}

#[test]
fn create_block_requires_existing_configuration() {
    let conn = open_library_db_in_memory().unwrap();
    let service = service(&conn);
    let orphan = Block::new(uuid::Uuid::new_v4(), "Place", StructureKind::Multiple);

    let err = service.create_block(&orphan).unwrap_err();
    assert!(matches!(err, SchemaServiceError::ConfigurationNotFound(id) if id == orphan.configuration_uuid));
}

#[test]
fn nesting_rejects_cycles_and_foreign_hosts() {
    let conn = open_library_db_in_memory().unwrap();
    let service = service(&conn);
    let fantasy = service.create_configuration("Fantasy", "").unwrap();
    let noir = service.create_configuration("Noir", "").unwrap();
    let city = block(&service, &fantasy, "City");
    let district = block(&service, &fantasy, "District");
    let street = block(&service, &fantasy, "Street");
    let suspect = block(&service, &noir, "Suspect");

    service.link_nested_to_host(district.uuid, city.uuid).unwrap();
    service.link_nested_to_host(street.uuid, district.uuid).unwrap();

    let err = service.link_nested_to_host(city.uuid, street.uuid).unwrap_err();
    assert!(matches!(err, SchemaServiceError::HostCycle { .. }));
    let err = service.link_nested_to_host(city.uuid, city.uuid).unwrap_err();
    assert!(matches!(err, SchemaServiceError::HostCycle { .. }));
    let err = service.link_nested_to_host(suspect.uuid, city.uuid).unwrap_err();
    assert!(matches!(err, SchemaServiceError::ConfigurationMismatch { .. }));

    let nested = service.list_nested(city.uuid).unwrap();
    assert_eq!(nested.len(), 1);
    assert_eq!(nested[0].uuid, district.uuid);
}

#[test]
fn unlinking_nested_block_resets_display_kind() {
    let conn = open_library_db_in_memory().unwrap();
    let service = service(&conn);
    let configuration = service.create_configuration("Saga", "").unwrap();
    let kingdom = block(&service, &configuration, "Kingdom");
    let mut era = block(&service, &configuration, "Era");
    era.host_block_uuid = Some(kingdom.uuid);
    era.display_kind = DisplayKind::TimeLine;
    service.update_block(&era).unwrap();

    service.unlink_nested_from_host(era.uuid).unwrap();

    let stored = service.get_block(era.uuid).unwrap().unwrap();
    assert_eq!(stored.host_block_uuid, None);
    assert_eq!(stored.display_kind, DisplayKind::List);
}

#[test]
fn relation_tabs_follow_their_relation() {
    let conn = open_library_db_in_memory().unwrap();
    let service = service(&conn);
    let configuration = service.create_configuration("Saga", "").unwrap();
    let hero = block(&service, &configuration, "Hero");
    let guild = block(&service, &configuration, "Guild");
    let artifact = block(&service, &configuration, "Artifact");

    let relation = BlockRelation::new(
        configuration.uuid,
        hero.uuid,
        guild.uuid,
        RelationType::ManyToOne,
    );
    service.save_relation(&relation).unwrap();

    let mut foreign_tab = BlockTab::new(artifact.uuid, "Members", TabKind::Relation);
    foreign_tab.relation_uuid = Some(relation.uuid);
    let err = service.save_tab(&foreign_tab).unwrap_err();
    assert!(matches!(err, SchemaServiceError::TabTargetMismatch(_)));

    let mut tab = BlockTab::new(guild.uuid, "Members", TabKind::Relation);
    tab.relation_uuid = Some(relation.uuid);
    let saved = service.save_tab(&tab).unwrap();
    assert_eq!(saved.order_number, 1);

    let related = service.related_blocks(guild.uuid).unwrap();
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].uuid, hero.uuid);

    service.delete_relation(relation.uuid).unwrap();
    let tabs = service.list_tabs(guild.uuid).unwrap();
    assert_eq!(tabs.len(), 1);
    assert_eq!(tabs[0].tab_kind, TabKind::Parameters);
    assert!(service.list_relations(configuration.uuid).unwrap().is_empty());
}

#[test]
fn deleting_block_cleans_up_references() {
    let conn = open_library_db_in_memory().unwrap();
    let service = service(&conn);
    let configuration = service.create_configuration("Saga", "").unwrap();
    let hero = block(&service, &configuration, "Hero");
    let city = block(&service, &configuration, "City");
    let district = block(&service, &configuration, "District");
    service.link_nested_to_host(district.uuid, city.uuid).unwrap();

    let home = link_parameter(&service, &hero, &city, "Home");
    let rival = link_parameter(&service, &hero, &hero, "Rival");
    service
        .save_relation(&BlockRelation::new(
            configuration.uuid,
            hero.uuid,
            city.uuid,
            RelationType::ManyToMany,
        ))
        .unwrap();

    service.delete_block(city.uuid).unwrap();

    assert!(service.get_block(city.uuid).unwrap().is_none());
    assert!(service.get_parameter(home.uuid).unwrap().is_none());
    let remaining = service.list_parameters_by_block(hero.uuid).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].uuid, rival.uuid);
    assert_eq!(remaining[0].order_number, 0);
    assert!(service.list_relations_for_block(hero.uuid).unwrap().is_empty());
    let unhosted = service.get_block(district.uuid).unwrap().unwrap();
    assert_eq!(unhosted.host_block_uuid, None);
}

#[test]
fn parameters_keep_group_order() {
    let conn = open_library_db_in_memory().unwrap();
    let service = service(&conn);
    let configuration = service.create_configuration("Saga", "").unwrap();
    let hero = block(&service, &configuration, "Hero");
    let group = service.list_parameter_groups(hero.uuid).unwrap().remove(0);

    let age = service
        .create_parameter(&BlockParameter::new(
            hero.uuid,
            group.uuid,
            "Age",
            ParameterDataType::String,
        ))
        .unwrap();
    let born = service
        .create_parameter(&BlockParameter::new(
            hero.uuid,
            group.uuid,
            "Born",
            ParameterDataType::DatePicker,
        ))
        .unwrap();
    assert_eq!((age.order_number, born.order_number), (0, 1));

    assert!(service.move_parameter(born.uuid, MoveDirection::Up).unwrap());
    assert!(!service.move_parameter(born.uuid, MoveDirection::Up).unwrap());
    let titles: Vec<String> = service
        .list_parameters_by_group(group.uuid)
        .unwrap()
        .into_iter()
        .map(|parameter| parameter.title)
        .collect();
    assert_eq!(titles, vec!["Born", "Age"]);
}

#[test]
fn parameter_group_must_belong_to_block() {
    let conn = open_library_db_in_memory().unwrap();
    let service = service(&conn);
    let configuration = service.create_configuration("Saga", "").unwrap();
    let hero = block(&service, &configuration, "Hero");
    let city = block(&service, &configuration, "City");
    let city_group = service.list_parameter_groups(city.uuid).unwrap().remove(0);

    let err = service
        .create_parameter(&BlockParameter::new(
            hero.uuid,
            city_group.uuid,
            "Age",
            ParameterDataType::String,
        ))
        .unwrap_err();
    assert!(matches!(err, SchemaServiceError::GroupBlockMismatch { .. }));
}

#[test]
fn possible_values_are_limited_to_dropdowns() {
    let conn = open_library_db_in_memory().unwrap();
    let service = service(&conn);
    let configuration = service.create_configuration("Saga", "").unwrap();
    let hero = block(&service, &configuration, "Hero");
    let group = service.list_parameter_groups(hero.uuid).unwrap().remove(0);
    let race = service
        .create_parameter(&BlockParameter::new(
            hero.uuid,
            group.uuid,
            "Race",
            ParameterDataType::Dropdown,
        ))
        .unwrap();
    let nick = service
        .create_parameter(&BlockParameter::new(
            hero.uuid,
            group.uuid,
            "Nick",
            ParameterDataType::String,
        ))
        .unwrap();

    service
        .replace_possible_values(race.uuid, &["Elf".to_string(), "Dwarf".to_string()])
        .unwrap();
    let values = service
        .replace_possible_values(race.uuid, &["Orc".to_string(), "Human".to_string()])
        .unwrap();
    assert_eq!(values.len(), 2);

    let stored: Vec<(String, i64)> = service
        .list_possible_values(race.uuid)
        .unwrap()
        .into_iter()
        .map(|value| (value.value, value.order_number))
        .collect();
    assert_eq!(stored, vec![("Orc".to_string(), 0), ("Human".to_string(), 1)]);

    let err = service
        .replace_possible_values(nick.uuid, &["x".to_string()])
        .unwrap_err();
    assert!(matches!(err, SchemaServiceError::PossibleValuesNotAllowed(id) if id == nick.uuid));
}

#[test]
fn export_and_delete_configuration() {
    let conn = open_library_db_in_memory().unwrap();
    let service = service(&conn);
    let configuration = service.create_configuration("Saga", "Epic").unwrap();
    let hero = block(&service, &configuration, "Hero");
    let city = block(&service, &configuration, "City");
    link_parameter(&service, &hero, &city, "Home");
    service
        .save_relation(&BlockRelation::new(
            configuration.uuid,
            hero.uuid,
            city.uuid,
            RelationType::OneToMany,
        ))
        .unwrap();

    let snapshot = service.export_configuration(configuration.uuid).unwrap();
    assert_eq!(snapshot.configuration.title, "Saga");
    assert_eq!(snapshot.blocks.len(), 2);
    assert_eq!(snapshot.parameter_groups.len(), 2);
    assert_eq!(snapshot.parameters.len(), 1);
    assert_eq!(snapshot.relations.len(), 1);
    assert_eq!(snapshot.tabs.len(), 2);

    service.delete_configuration(configuration.uuid).unwrap();
    assert!(service.list_configurations().unwrap().is_empty());
    assert!(service.get_block(hero.uuid).unwrap().is_none());
    let err = service.export_configuration(configuration.uuid).unwrap_err();
    assert!(matches!(err, SchemaServiceError::ConfigurationNotFound(_)));
}

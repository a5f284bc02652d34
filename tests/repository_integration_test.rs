// ==========================================
// Repository 层集成测试
// ==========================================
// 测试目标: 文件数据库上的目录存储 / 课程存储 / 配置读取
// ==========================================


use ent_feeder::config::{config_keys, ConfigManager, FeederSettings};
use ent_feeder::domain::{
    Course, CourseContent, FunctionalGroup, GroupMembership, Profile, TimetableCommit,
};
use ent_feeder::importer::{
    BatchSequencer, ConflictHandlerImpl, DelimitedFileParser, ImportValidator, SchemaRegistry,
};
use ent_feeder::logging;
use ent_feeder::repository::{
    round_trip, CourseRepository, DirectoryRepository, RoundTripPolicy, SqliteCourseRepository,
    SqliteDirectoryRepository,
};
use test_helpers::{
    create_batch, create_test_db, directory_user, seed_structure, STRUCTURE_EXTERNAL_ID,
    STRUCTURE_ID, STRUCTURE_UAI,
};
use tokio_util::sync::CancellationToken;

fn course(id: &str, modified: i64) -> Course {
    Course {
        id: id.to_string(),
        content: CourseContent {
            structure_id: STRUCTURE_ID.to_string(),
            subject_id: Some("S1$MATHS".to_string()),
            start_date: "2024-09-03T08:00:00".to_string(),
            end_date: "2024-09-03T09:00:00".to_string(),
            day_of_week: 2,
            teacher_ids: vec![],
            classes: vec!["6A".to_string()],
            groups: vec![],
            equipment_labels: vec![],
            room_labels: vec![],
            personnel_ids: vec![],
        },
        modified,
    }
}

fn membership(attachment_id: &str, group: &str, out_date: i64) -> GroupMembership {
    GroupMembership {
        attachment_id: attachment_id.to_string(),
        group_external_id: group.to_string(),
        source: "EDT".to_string(),
        in_date: 0,
        out_date,
    }
}

#[tokio::test]
async fn test_settings_loaded_from_config_table() {
    logging::init_test();

    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let config = ConfigManager::new(&db_path).expect("Failed to create config");
    config
        .set_global_config_value(config_keys::STUDENT_SEED, "42")
        .unwrap();
    config
        .set_global_config_value(config_keys::ROUND_TRIP_ATTEMPTS, "5")
        .unwrap();
    config
        .set_global_config_value(config_keys::COLUMN_ALIASES, r#"{"Matricule": "externalId"}"#)
        .unwrap();
    config
        .set_global_config_value(config_keys::CLASSES_MAPPING, "not json")
        .unwrap();

    assert_eq!(
        config
            .get_global_config_value(config_keys::STUDENT_SEED)
            .unwrap()
            .as_deref(),
        Some("42")
    );
    assert!(config
        .get_global_config_value(config_keys::ACCEPT_LANGUAGE)
        .unwrap()
        .is_none());

    let settings = FeederSettings::load(&config).await.unwrap();
    assert_eq!(settings.student_seed, 42);
    assert_eq!(settings.round_trip.attempts, 5);
    assert_eq!(
        settings.column_aliases.get("matricule").map(String::as_str),
        Some("externalId")
    );
    // 格式错误的映射回退为空
    assert!(settings.classes_mapping.is_empty());
    assert_eq!(settings.accept_language, "fr");

    let snapshot: serde_json::Value =
        serde_json::from_str(&config.get_config_snapshot().unwrap()).unwrap();
    assert_eq!(snapshot[config_keys::STUDENT_SEED], "42");
}

#[tokio::test]
async fn test_configured_alias_resolves_header() {
    logging::init_test();

    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let config = ConfigManager::new(&db_path).unwrap();
    config
        .set_global_config_value(config_keys::COLUMN_ALIASES, r#"{"Matricule": "externalId"}"#)
        .unwrap();
    let settings = FeederSettings::load(&config).await.unwrap();

    let repo = SqliteDirectoryRepository::new(&db_path).unwrap();
    seed_structure(&repo).unwrap();

    let sequencer = BatchSequencer::new(
        repo,
        settings,
        SchemaRegistry::builtin().unwrap(),
        Box::new(DelimitedFileParser::default()),
        Box::new(ConflictHandlerImpl),
    );
    let (root, _) = create_batch(
        "college@S1_2024",
        &[("Teacher.csv", "MATRICULE;Nom;Prénom\nT7;Lambert;Nina\n")],
    )
    .unwrap();

    let report = sequencer
        .validate(root.path(), None, &CancellationToken::new())
        .await
        .unwrap();
    assert!(report.errors.is_empty(), "errors: {:?}", report.errors);
    assert_eq!(
        report.records(Profile::Teacher)[0].external_id(),
        Some("T7")
    );
}

#[tokio::test]
async fn test_repositories_share_database_file() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let directory = SqliteDirectoryRepository::new(&db_path).unwrap();
    let courses = SqliteCourseRepository::new(&db_path).unwrap();
    seed_structure(&directory).unwrap();

    let policy = RoundTripPolicy::default();
    let cancel = CancellationToken::new();
    let directory_ref = &directory;

    let structure = round_trip(&policy, &cancel, "find_structure_by_uai", move || {
        directory_ref.find_structure_by_uai(STRUCTURE_UAI)
    })
    .await
    .unwrap()
    .expect("structure should exist");
    assert_eq!(structure.external_id, STRUCTURE_EXTERNAL_ID);
    assert_eq!(structure.id.as_deref(), Some(STRUCTURE_ID));

    courses
        .save_courses(&[course("c-old", 1), course("c-new", 100)])
        .await
        .unwrap();

    // 另一连接可见
    let reader = SqliteCourseRepository::new(&db_path).unwrap();
    assert_eq!(reader.count_by_structure(STRUCTURE_ID).await.unwrap(), 2);
    assert_eq!(reader.delete_stale(STRUCTURE_ID, 100).await.unwrap(), 1);
    assert!(reader.find_course("c-old").await.unwrap().is_none());
    assert_eq!(
        reader.find_course("c-new").await.unwrap(),
        Some(course("c-new", 100))
    );
}

#[tokio::test]
async fn test_commit_timetable_membership_rules() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let directory = SqliteDirectoryRepository::new(&db_path).unwrap();
    seed_structure(&directory).unwrap();

    let mut student = directory_user("E1", Profile::Student, "Martin", "Léa");
    student.attachment_id = Some("SC1".to_string());
    directory.insert_user(&student).unwrap();

    let group = FunctionalGroup {
        id: "g-1".to_string(),
        external_id: "S1$Latin".to_string(),
        name: "Latin".to_string(),
    };

    let first = directory
        .commit_timetable(&TimetableCommit {
            structure_external_id: STRUCTURE_EXTERNAL_ID.to_string(),
            source: "EDT".to_string(),
            groups: vec![group.clone()],
            unknown_classes: vec!["6A".to_string(), "6A".to_string()],
            memberships: vec![
                membership("SC1", "S1$Latin", 50),
                // 目录中不存在的学生 / 功能组
                membership("SC404", "S1$Latin", 500),
                membership("SC1", "S1$Grec", 500),
            ],
            stale_before: 10,
        })
        .await
        .unwrap();
    assert_eq!(first.groups_created, 1);
    assert_eq!(first.memberships_written, 1);
    assert_eq!(first.memberships_deleted, 0);

    // 再次提交: 功能组不重复创建，out_date 早于 stale_before 的关系被清理
    let second = directory
        .commit_timetable(&TimetableCommit {
            structure_external_id: STRUCTURE_EXTERNAL_ID.to_string(),
            source: "EDT".to_string(),
            groups: vec![FunctionalGroup {
                id: "g-2".to_string(),
                ..group
            }],
            unknown_classes: vec![],
            memberships: vec![],
            stale_before: 100,
        })
        .await
        .unwrap();
    assert_eq!(second.groups_created, 0);
    assert_eq!(second.memberships_written, 0);
    assert_eq!(second.memberships_deleted, 1);
}

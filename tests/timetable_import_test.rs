// ==========================================
// EDT 课表导入集成测试
// ==========================================
// 测试目标: 完整课表文档 → EdtImporter → 目录 / 课程存储（SQLite）
// ==========================================


use ent_feeder::config::FeederSettings;
use ent_feeder::domain::{Profile, StaffCandidate};
use ent_feeder::logging;
use ent_feeder::repository::{
    CourseRepository, RoundTripPolicy, SqliteCourseRepository, SqliteDirectoryRepository,
};
use ent_feeder::timetable::{decode_document, EdtImporter, StaffMatcher, TimetableError};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use test_helpers::{
    create_test_db, directory_user, open_shared, seed_structure, MockDirectory,
    STRUCTURE_EXTERNAL_ID, STRUCTURE_ID, STRUCTURE_UAI,
};
use tokio_util::sync::CancellationToken;

type TestImporter = EdtImporter<SqliteDirectoryRepository, SqliteCourseRepository>;

fn create_test_importer(conn: &Arc<Mutex<Connection>>) -> TestImporter {
    EdtImporter::new(
        SqliteDirectoryRepository::from_connection(conn.clone()),
        SqliteCourseRepository::from_connection(conn.clone()),
        FeederSettings::default(),
    )
}

/// 课表文档（K1 第 1、2 周；K2 引用未定义课时）
fn document(k1_weeks: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<TableEdt>
  <SchoolYear DatePremierJourSemaine1="2016-08-29"/>
  <Emploi DureePlace="60">
    <Place Numero="1" LibelleHeureDebut="08h00" LibelleHeureFin="09h00"/>
    <Place Numero="2" LibelleHeureDebut="09h00" LibelleHeureFin="10h00"/>
  </Emploi>
  <Salles>
    <Salle Ident="R1" Nom="Salle 101"/>
  </Salles>
  <Matieres>
    <Matiere Ident="M1" Code="MATHS" Libelle="Mathématiques"/>
  </Matieres>
  <Classes>
    <Classe Ident="C1" Nom="6A">
      <PartieDeClasse Ident="PC1"/>
    </Classe>
  </Classes>
  <Groupes>
    <Groupe Ident="G1" Nom="Latin">
      <Classe Ident="C1"/>
    </Groupe>
  </Groupes>
  <Professeurs>
    <Professeur Ident="P1" IDPN="1001" Nom="Durand" Prenom="Paul"/>
    <Professeur Ident="P2" IDPN="1002" Nom="Bernard" Prenom="Anne"/>
  </Professeurs>
  <Personnels>
    <Personnel Ident="X1" Nom="Petit" Prenom="Marc"/>
  </Personnels>
  <Eleves>
    <Eleve Ident="E1" IDSconet="SC1">
      <Classe Ident="C1" DateEntree="2016-09-01" DateSortie="2099-07-01"/>
    </Eleve>
  </Eleves>
  <Cours>
    <Cours Ident="K1" Jour="2" NumeroPlaceDebut="1" NombrePlaces="2">
      <Matiere Ident="M1"/>
      <Professeur Ident="P1" Semaines="{weeks}"/>
      <Classe Ident="C1" Semaines="{weeks}"/>
      <Salle Ident="R1" Semaines="{weeks}"/>
    </Cours>
    <Cours Ident="K2" Jour="3" NumeroPlaceDebut="9" NombrePlaces="1">
      <Professeur Ident="P2" Semaines="2"/>
    </Cours>
  </Cours>
</TableEdt>"#,
        weeks = k1_weeks
    )
}

fn count(conn: &Arc<Mutex<Connection>>, sql: &str) -> i64 {
    conn.lock()
        .unwrap()
        .query_row(sql, [], |row| row.get(0))
        .unwrap()
}

/// 机构 + 一名既有教师 + 一名带 IDSconet 的学生
fn seed_directory(conn: &Arc<Mutex<Connection>>) -> String {
    let repo = SqliteDirectoryRepository::from_connection(conn.clone());
    seed_structure(&repo).unwrap();

    let mut student = directory_user("E1", Profile::Student, "Martin", "Léa");
    student.attachment_id = Some("SC1".to_string());
    repo.insert_user(&student).unwrap();

    repo.insert_user(&directory_user("T1", Profile::Teacher, "Durand", "Paul"))
        .unwrap()
}

#[tokio::test]
async fn test_full_document_import() {
    logging::init_test();

    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let conn = open_shared(&db_path).unwrap();
    let teacher_id = seed_directory(&conn);
    let importer = create_test_importer(&conn);

    let report = importer
        .import(STRUCTURE_UAI, &document("6"), &CancellationToken::new())
        .await
        .expect("import should succeed");

    // 教职工: P1 按姓名匹配，P2 与职员 X1 新建
    assert_eq!(report.matched_staff, 1);
    assert_eq!(report.created_staff, 2);
    assert_eq!(
        count(&conn, "SELECT COUNT(*) FROM directory_user WHERE idpn = 'S1$1001'"),
        1
    );
    assert_eq!(
        count(&conn, "SELECT COUNT(*) FROM directory_user WHERE source = 'EDT'"),
        2
    );

    // 功能组 / 未知班级 / 成员关系
    assert_eq!(report.groups_created, 1);
    assert_eq!(report.memberships, 1);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM unknown_class"), 1);
    assert_eq!(
        count(
            &conn,
            "SELECT COUNT(*) FROM group_membership WHERE attachment_id = 'SC1' AND group_external_id = 'S1$Latin'"
        ),
        1
    );

    // 课程: K1 一个区间；K2 课时未定义
    assert_eq!(report.courses, 1);
    assert_eq!(report.deleted_courses, 0);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].key, "unknown.slot");
    assert_eq!(report.errors[0].params, vec!["9".to_string()]);

    let courses = SqliteCourseRepository::from_connection(conn.clone());
    let stored = courses.find_by_structure(STRUCTURE_ID).await.unwrap();
    assert_eq!(stored.len(), 1);
    let course = &stored[0].content;
    assert_eq!(course.start_date, "2016-08-30T08:00:00");
    assert_eq!(course.end_date, "2016-09-06T10:00:00");
    assert_eq!(course.day_of_week, 2);
    assert_eq!(course.subject_id.as_deref(), Some("S1$MATHS"));
    assert_eq!(course.teacher_ids, vec![teacher_id]);
    assert_eq!(course.classes, vec!["6A".to_string()]);
    assert_eq!(course.room_labels, vec!["Salle 101".to_string()]);
}

#[tokio::test]
async fn test_oversized_course_is_reported_and_skipped() {
    logging::init_test();

    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let conn = open_shared(&db_path).unwrap();
    seed_directory(&conn);
    let importer = create_test_importer(&conn);

    let content = document("6").replace(
        r#"<Cours Ident="K2" Jour="3" NumeroPlaceDebut="9" NombrePlaces="1">"#,
        r#"<Cours Ident="K2" Jour="3" NumeroPlaceDebut="2" NombrePlaces="4294967295">"#,
    );
    let report = importer
        .import(STRUCTURE_UAI, &content, &CancellationToken::new())
        .await
        .expect("import should succeed");

    assert_eq!(report.courses, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].key, "invalid.course");
    assert_eq!(report.errors[0].params, vec!["K2".to_string()]);
}

#[tokio::test]
async fn test_reimport_is_idempotent() {
    logging::init_test();

    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let conn = open_shared(&db_path).unwrap();
    seed_directory(&conn);
    let importer = create_test_importer(&conn);
    let cancel = CancellationToken::new();

    let first = importer
        .import(STRUCTURE_UAI, &document("6"), &cancel)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = importer
        .import(STRUCTURE_UAI, &document("6"), &cancel)
        .await
        .unwrap();

    // 第二次导入: IDPN 映射已建立，无需匹配；课程 id 不变
    assert_eq!(second.matched_staff, 0);
    assert_eq!(second.created_staff, 0);
    assert_eq!(second.groups_created, 0);
    assert_eq!(second.deleted_courses, 0);
    assert_eq!(first.courses, second.courses);
    assert_eq!(
        count(&conn, "SELECT COUNT(*) FROM directory_user WHERE source = 'EDT'"),
        2
    );

    let courses = SqliteCourseRepository::from_connection(conn.clone());
    assert_eq!(courses.count_by_structure(STRUCTURE_ID).await.unwrap(), 1);
}

#[tokio::test]
async fn test_changed_course_replaces_stale_one() {
    logging::init_test();

    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let conn = open_shared(&db_path).unwrap();
    seed_directory(&conn);
    let importer = create_test_importer(&conn);
    let cancel = CancellationToken::new();

    importer
        .import(STRUCTURE_UAI, &document("6"), &cancel)
        .await
        .unwrap();
    let courses = SqliteCourseRepository::from_connection(conn.clone());
    let before = courses.find_by_structure(STRUCTURE_ID).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    // 第 1-3 周
    let report = importer
        .import(STRUCTURE_UAI, &document("14"), &cancel)
        .await
        .unwrap();
    assert_eq!(report.courses, 1);
    assert_eq!(report.deleted_courses, 1);

    let after = courses.find_by_structure(STRUCTURE_ID).await.unwrap();
    assert_eq!(after.len(), 1);
    assert_ne!(after[0].id, before[0].id);
    assert_eq!(after[0].content.end_date, "2016-09-13T10:00:00");
}

#[tokio::test]
async fn test_latin1_document_is_decoded() {
    logging::init_test();

    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let conn = open_shared(&db_path).unwrap();
    seed_directory(&conn);
    let importer = create_test_importer(&conn);

    let text = document("6").replace("Salle 101", "Salle é");
    let (bytes, _, _) = encoding_rs::WINDOWS_1252.encode(&text);
    let content = decode_document(&bytes);

    importer
        .import(STRUCTURE_UAI, &content, &CancellationToken::new())
        .await
        .unwrap();

    let courses = SqliteCourseRepository::from_connection(conn.clone());
    let stored = courses.find_by_structure(STRUCTURE_ID).await.unwrap();
    assert_eq!(stored[0].content.room_labels, vec!["Salle é".to_string()]);
}

#[tokio::test]
async fn test_unknown_uai_is_invalid_structure() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let conn = open_shared(&db_path).unwrap();
    let importer = create_test_importer(&conn);

    let result = importer
        .import("9999999Z", &document("6"), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(TimetableError::InvalidStructure(_))));
}

#[tokio::test]
async fn test_cancelled_import() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let conn = open_shared(&db_path).unwrap();
    seed_directory(&conn);
    let importer = create_test_importer(&conn);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = importer.import(STRUCTURE_UAI, &document("6"), &cancel).await;
    assert!(matches!(result, Err(TimetableError::Cancelled)));

    let courses = SqliteCourseRepository::from_connection(conn.clone());
    assert_eq!(courses.count_by_structure(STRUCTURE_ID).await.unwrap(), 0);
}

fn staff_candidate(idpn: &str, last_name: &str, first_name: &str, profile: Profile) -> StaffCandidate {
    StaffCandidate {
        idpn: idpn.to_string(),
        source_ident: idpn.trim_start_matches("S1$").to_string(),
        last_name: last_name.to_string(),
        first_name: first_name.to_string(),
        profile,
    }
}

#[tokio::test]
async fn test_staff_not_found_after_creation() {
    logging::init_test();

    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let conn = open_shared(&db_path).unwrap();
    seed_directory(&conn);
    let directory =
        MockDirectory::new(SqliteDirectoryRepository::from_connection(conn)).dropping_created_staff();

    let policy = RoundTripPolicy::default();
    let cancel = CancellationToken::new();
    let matcher = StaffMatcher::new(&directory, &policy, &cancel);

    // Durand Paul 按姓名匹配；其余两人创建后回查不到
    let result = matcher
        .resolve(
            STRUCTURE_UAI,
            STRUCTURE_EXTERNAL_ID,
            vec![
                staff_candidate("S1$1001", "Durand", "Paul", Profile::Teacher),
                staff_candidate("S1$1002", "Bernard", "Anne", Profile::Teacher),
                staff_candidate("S1$X1", "Petit", "Marc", Profile::Personnel),
            ],
        )
        .await;
    assert!(matches!(
        result,
        Err(TimetableError::MatchingExhausted { remaining: 2 })
    ));
}

#[tokio::test]
async fn test_import_fails_when_staff_unresolved() {
    logging::init_test();

    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let conn = open_shared(&db_path).unwrap();
    seed_directory(&conn);
    let importer = EdtImporter::new(
        MockDirectory::new(SqliteDirectoryRepository::from_connection(conn.clone()))
            .dropping_created_staff(),
        SqliteCourseRepository::from_connection(conn.clone()),
        FeederSettings::default(),
    );

    let result = importer
        .import(STRUCTURE_UAI, &document("6"), &CancellationToken::new())
        .await;
    assert!(matches!(
        result,
        Err(TimetableError::MatchingExhausted { remaining: 2 })
    ));

    // 未提交任何课程 / 功能组 / 成员关系
    let courses = SqliteCourseRepository::from_connection(conn.clone());
    assert_eq!(courses.count_by_structure(STRUCTURE_ID).await.unwrap(), 0);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM functional_group"), 0);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM group_membership"), 0);
}

// ==========================================
// 目录导入引擎 - 课程文档 Repository 实现
// ==========================================
// 存储: course 表，document 列保存序列化后的课程 JSON
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::timetable::Course;
use crate::repository::course_repo::CourseRepository;
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};

pub struct SqliteCourseRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCourseRepository {
    /// 创建新的 Repository 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }
}

#[async_trait]
impl CourseRepository for SqliteCourseRepository {
    async fn save_courses(&self, courses: &[Course]) -> RepositoryResult<usize> {
        let conn = self.lock()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        let mut count = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO course (id, structure_id, modified, document) VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    structure_id = excluded.structure_id,
                    modified = excluded.modified,
                    document = excluded.document
                "#,
            )?;
            for course in courses {
                let document = serde_json::to_string(course)?;
                count += stmt.execute(params![
                    course.id,
                    course.content.structure_id,
                    course.modified,
                    document,
                ])?;
            }
        }

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(count)
    }

    async fn find_course(&self, id: &str) -> RepositoryResult<Option<Course>> {
        let conn = self.lock()?;
        let document: Option<String> = conn
            .query_row(
                "SELECT document FROM course WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        match document {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn find_by_structure(&self, structure_id: &str) -> RepositoryResult<Vec<Course>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT document FROM course WHERE structure_id = ?1")?;
        let rows = stmt.query_map(params![structure_id], |row| row.get::<_, String>(0))?;

        let mut courses = Vec::new();
        for row in rows {
            let course: Course = serde_json::from_str(&row?)?;
            courses.push(course);
        }
        courses.sort_by(|a, b| {
            a.content
                .start_date
                .cmp(&b.content.start_date)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(courses)
    }

    async fn delete_course(&self, id: &str) -> RepositoryResult<bool> {
        let conn = self.lock()?;
        let affected = conn.execute("DELETE FROM course WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    async fn count_by_structure(&self, structure_id: &str) -> RepositoryResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM course WHERE structure_id = ?1",
            params![structure_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    async fn delete_stale(&self, structure_id: &str, before: i64) -> RepositoryResult<usize> {
        let conn = self.lock()?;
        let affected = conn.execute(
            "DELETE FROM course WHERE structure_id = ?1 AND modified < ?2",
            params![structure_id, before],
        )?;
        Ok(affected)
    }
}

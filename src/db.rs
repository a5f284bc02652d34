// ==========================================
// 目录导入引擎 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 提供目录库 / 课程库 / 配置表的建表入口
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要"每个连接"单独开启
/// - busy_timeout 需要"每个连接"单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 初始化数据库 schema（幂等）
///
/// # 表
/// - config_scope / config_kv: 配置
/// - structure / directory_user: 目录（机构与用户）
/// - functional_group / group_membership / unknown_class: 课表导入写入的目录关系
/// - course: 课程文档（JSON）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_scope (
            scope_id TEXT PRIMARY KEY,
            scope_type TEXT NOT NULL,
            scope_key TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(scope_type, scope_key)
        );

        INSERT OR IGNORE INTO config_scope (scope_id, scope_type, scope_key)
        VALUES ('global', 'GLOBAL', 'global');

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL REFERENCES config_scope(scope_id) ON DELETE CASCADE,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS structure (
            id TEXT PRIMARY KEY,
            external_id TEXT NOT NULL UNIQUE,
            uai TEXT,
            name TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_structure_uai ON structure(uai);

        CREATE TABLE IF NOT EXISTS directory_user (
            id TEXT PRIMARY KEY,
            external_id TEXT NOT NULL UNIQUE,
            structure_external_id TEXT NOT NULL,
            profile TEXT NOT NULL,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            birth_date TEXT,
            idpn TEXT,
            attachment_id TEXT,
            source TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_user_structure_profile
            ON directory_user(structure_external_id, profile);
        CREATE INDEX IF NOT EXISTS idx_user_idpn ON directory_user(idpn);
        CREATE INDEX IF NOT EXISTS idx_user_attachment ON directory_user(attachment_id);

        CREATE TABLE IF NOT EXISTS functional_group (
            id TEXT PRIMARY KEY,
            external_id TEXT NOT NULL UNIQUE,
            structure_external_id TEXT NOT NULL,
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS group_membership (
            attachment_id TEXT NOT NULL,
            group_external_id TEXT NOT NULL
                REFERENCES functional_group(external_id) ON DELETE CASCADE,
            source TEXT NOT NULL,
            in_date INTEGER NOT NULL,
            out_date INTEGER NOT NULL,
            PRIMARY KEY (attachment_id, group_external_id)
        );

        CREATE TABLE IF NOT EXISTS unknown_class (
            structure_external_id TEXT NOT NULL,
            name TEXT NOT NULL,
            PRIMARY KEY (structure_external_id, name)
        );

        CREATE TABLE IF NOT EXISTS course (
            id TEXT PRIMARY KEY,
            structure_id TEXT NOT NULL,
            modified INTEGER NOT NULL,
            document TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_course_structure ON course(structure_id);
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

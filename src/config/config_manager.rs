// ==========================================
// 目录导入引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::import_config_trait::ImportConfigReader;
use crate::db::open_sqlite_connection;
use crate::importer::student_link::DEFAULT_STUDENT_SEED;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 参数
    /// - key: 配置键
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 从 config_kv 表读取配置值，带默认值
    ///
    /// # 参数
    /// - key: 配置键
    /// - default: 默认值
    fn get_config_or_default(&self, key: &str, default: &str) -> Result<String, Box<dyn Error>> {
        Ok(self.get_config_value(key)?.unwrap_or_else(|| default.to_string()))
    }

    /// 获取所有配置的快照（JSON格式）
    ///
    /// # 用途
    /// - 在导入报告中记录本次运行使用的配置
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        let json_value = json!(config_map);
        Ok(serde_json::to_string(&json_value)?)
    }

    /// 读取 JSON 对象形式的字符串映射（格式错误时返回空映射）
    fn get_string_map(&self, key: &str) -> Result<HashMap<String, String>, Box<dyn Error>> {
        let value = self.get_config_or_default(key, "{}")?;
        let mapping: HashMap<String, String> = serde_json::from_str(&value).unwrap_or_else(|_| {
            tracing::warn!(
                config_key = key,
                raw_value = %value,
                "映射配置格式错误，使用空配置"
            );
            HashMap::new()
        });
        Ok(mapping)
    }
}

// ==========================================
// ImportConfigReader Trait 实现
// ==========================================
#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn get_student_seed(&self) -> Result<i64, Box<dyn Error>> {
        let default = DEFAULT_STUDENT_SEED.to_string();
        let value = self.get_config_or_default(config_keys::STUDENT_SEED, &default)?;
        Ok(value.trim().parse::<i64>().unwrap_or(DEFAULT_STUDENT_SEED))
    }

    async fn get_round_trip_attempts(&self) -> Result<u32, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::ROUND_TRIP_ATTEMPTS, "3")?;
        Ok(value
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|&n| n >= 1)
            .unwrap_or(3))
    }

    async fn get_round_trip_backoff_ms(&self) -> Result<u64, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::ROUND_TRIP_BACKOFF_MS, "200")?;
        Ok(value.trim().parse::<u64>().unwrap_or(200))
    }

    async fn get_round_trip_timeout_ms(&self) -> Result<u64, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::ROUND_TRIP_TIMEOUT_MS, "30000")?;
        Ok(value.trim().parse::<u64>().unwrap_or(30_000))
    }

    async fn get_column_aliases(&self) -> Result<HashMap<String, String>, Box<dyn Error>> {
        let aliases = self.get_string_map(config_keys::COLUMN_ALIASES)?;
        Ok(aliases
            .into_iter()
            .map(|(alias, field)| (alias.trim().to_lowercase(), field))
            .collect())
    }

    async fn get_classes_mapping(&self) -> Result<HashMap<String, String>, Box<dyn Error>> {
        self.get_string_map(config_keys::CLASSES_MAPPING)
    }

    async fn get_accept_language(&self) -> Result<String, Box<dyn Error>> {
        self.get_config_or_default(config_keys::ACCEPT_LANGUAGE, "fr")
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 标识生成
    pub const STUDENT_SEED: &str = "feeder.student_seed";

    // 存储往返
    pub const ROUND_TRIP_ATTEMPTS: &str = "feeder.round_trip_attempts";
    pub const ROUND_TRIP_BACKOFF_MS: &str = "feeder.round_trip_backoff_ms";
    pub const ROUND_TRIP_TIMEOUT_MS: &str = "feeder.round_trip_timeout_ms";

    // 映射
    pub const COLUMN_ALIASES: &str = "feeder.column_aliases"; // JSON 对象
    pub const CLASSES_MAPPING: &str = "timetable.classes_mapping"; // JSON 对象

    // 本地化
    pub const ACCEPT_LANGUAGE: &str = "feeder.accept_language";
}

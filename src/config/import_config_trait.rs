// ==========================================
// 目录导入引擎 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入管道所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use async_trait::async_trait;
use std::collections::HashMap;
use std::error::Error;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: CSV 校验管道与课表导入的配置读取
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    // ===== 标识生成 =====

    /// 获取学生关联键种子
    ///
    /// # 默认值
    /// - DEFAULT_STUDENT_SEED
    async fn get_student_seed(&self) -> Result<i64, Box<dyn Error>>;

    // ===== 存储往返 =====

    /// 获取最大尝试次数（含首次）
    ///
    /// # 默认值
    /// - 3
    async fn get_round_trip_attempts(&self) -> Result<u32, Box<dyn Error>>;

    /// 获取首次退避时间（毫秒）
    ///
    /// # 默认值
    /// - 200
    async fn get_round_trip_backoff_ms(&self) -> Result<u64, Box<dyn Error>>;

    /// 获取单次往返超时（毫秒）
    ///
    /// # 默认值
    /// - 30000
    async fn get_round_trip_timeout_ms(&self) -> Result<u64, Box<dyn Error>>;

    // ===== 映射 =====

    /// 获取附加列别名
    ///
    /// # 返回
    /// - HashMap<表头(小写), 标准字段名>
    ///
    /// # 默认值
    /// - 空
    async fn get_column_aliases(&self) -> Result<HashMap<String, String>, Box<dyn Error>>;

    /// 获取课表班级名映射
    ///
    /// # 返回
    /// - HashMap<课表中的班级名, 目录中的班级名>
    async fn get_classes_mapping(&self) -> Result<HashMap<String, String>, Box<dyn Error>>;

    // ===== 本地化 =====

    /// 获取报告语言
    ///
    /// # 默认值
    /// - "fr"
    async fn get_accept_language(&self) -> Result<String, Box<dyn Error>>;
}

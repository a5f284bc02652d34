// ==========================================
// 目录导入引擎 - 运行配置快照
// ==========================================
// 职责: 每次运行开始时一次性读取配置，之后只读
// ==========================================

use crate::config::import_config_trait::ImportConfigReader;
use crate::importer::student_link::DEFAULT_STUDENT_SEED;
use crate::repository::retry::RoundTripPolicy;
use std::collections::HashMap;
use std::error::Error;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct FeederSettings {
    pub student_seed: i64,
    pub round_trip: RoundTripPolicy,
    /// 键为小写表头
    pub column_aliases: HashMap<String, String>,
    pub classes_mapping: HashMap<String, String>,
    pub accept_language: String,
}

impl Default for FeederSettings {
    fn default() -> Self {
        Self {
            student_seed: DEFAULT_STUDENT_SEED,
            round_trip: RoundTripPolicy::default(),
            column_aliases: HashMap::new(),
            classes_mapping: HashMap::new(),
            accept_language: "fr".to_string(),
        }
    }
}

impl FeederSettings {
    /// 从配置读取器加载
    pub async fn load(reader: &dyn ImportConfigReader) -> Result<Self, Box<dyn Error>> {
        let round_trip = RoundTripPolicy {
            attempts: reader.get_round_trip_attempts().await?,
            initial_backoff: Duration::from_millis(reader.get_round_trip_backoff_ms().await?),
            timeout: Duration::from_millis(reader.get_round_trip_timeout_ms().await?),
            ..RoundTripPolicy::default()
        };

        let settings = Self {
            student_seed: reader.get_student_seed().await?,
            round_trip,
            column_aliases: reader.get_column_aliases().await?,
            classes_mapping: reader.get_classes_mapping().await?,
            accept_language: reader.get_accept_language().await?,
        };

        debug!(
            attempts = settings.round_trip.attempts,
            aliases = settings.column_aliases.len(),
            classes_mapping = settings.classes_mapping.len(),
            language = %settings.accept_language,
            "运行配置已加载"
        );
        Ok(settings)
    }
}

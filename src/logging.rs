// ==========================================
// 目录导入引擎 - 日志系统初始化
// ==========================================
// 使用 tracing 和 tracing-subscriber
// 日志写入 stderr，stdout 保留给 JSON 报告
// ==========================================

use tracing_subscriber::{fmt, EnvFilter};

/// 日志格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    /// 每行一个 JSON 事件（便于采集）
    Json,
}

impl LogFormat {
    /// 从 FEEDER_LOG_FORMAT 读取（"json" 以外均为文本）
    pub fn from_env() -> Self {
        match std::env::var("FEEDER_LOG_FORMAT") {
            Ok(value) if value.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// 初始化日志系统
///
/// # 环境变量
/// - RUST_LOG: 日志级别过滤器（默认: info）
///   例如: RUST_LOG=debug 或 RUST_LOG=ent_feeder=trace
/// - FEEDER_LOG_FORMAT: text / json
///
/// # 示例
/// ```no_run
/// use ent_feeder::logging;
/// logging::init();
/// ```
pub fn init() {
    init_with(LogFormat::from_env());
}

pub fn init_with(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true);

    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if let Err(e) = result {
        eprintln!("日志系统已初始化: {}", e);
    }
}

/// 初始化测试环境的日志系统
///
/// 使用更详细的日志级别，便于调试
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_test_is_idempotent() {
        init_test();
        init_test();
        tracing::debug!(module = "logging", "测试日志");
    }
}

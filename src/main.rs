// ==========================================
// 目录导入引擎 - 命令行入口
// ==========================================
// 用法:
//   ent-feeder validate  <db> <batch_dir> [association.json]
//   ent-feeder timetable <db> <uai> <document.xml>
//   ent-feeder config    <db> <key> <value>
// 报告以 JSON 输出到 stdout，日志输出到 stderr
// ==========================================

use ent_feeder::config::{ConfigManager, FeederSettings};
use ent_feeder::db::{init_schema, open_sqlite_connection};
use ent_feeder::domain::ColumnAssociation;
use ent_feeder::i18n::{negotiate_locale, set_locale};
use ent_feeder::importer::{
    BatchSequencer, ConflictHandlerImpl, DelimitedFileParser, ImportError, ImportValidator,
    SchemaRegistry,
};
use ent_feeder::logging;
use ent_feeder::repository::{SqliteCourseRepository, SqliteDirectoryRepository};
use ent_feeder::timetable::{decode_document, EdtImporter};
use rusqlite::Connection;
use std::error::Error;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

fn print_usage() {
    eprintln!("{} {}", ent_feeder::APP_NAME, ent_feeder::VERSION);
    eprintln!();
    eprintln!("用法:");
    eprintln!("  ent-feeder validate  <db> <batch_dir> [association.json]");
    eprintln!("  ent-feeder timetable <db> <uai> <document.xml>");
    eprintln!("  ent-feeder config    <db> <key> <value>");
}

/// 打开数据库并确保表结构存在
fn open_database(db_path: &str) -> Result<Arc<Mutex<Connection>>, Box<dyn Error>> {
    let conn = open_sqlite_connection(db_path)?;
    init_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// 读取运行配置并设置报告语言
async fn load_settings(conn: Arc<Mutex<Connection>>) -> Result<FeederSettings, Box<dyn Error>> {
    let config = ConfigManager::from_connection(conn)?;
    let settings = FeederSettings::load(&config).await?;
    set_locale(negotiate_locale(&settings.accept_language));
    Ok(settings)
}

/// Ctrl-C 触发取消
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("收到中断信号，正在取消");
            token.cancel();
        }
    });
    cancel
}

async fn validate(
    db_path: &str,
    batch_dir: &str,
    association_path: Option<&String>,
) -> Result<(), Box<dyn Error>> {
    let conn = open_database(db_path)?;
    let settings = load_settings(conn.clone()).await?;

    let association = match association_path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            let value: serde_json::Value = serde_json::from_str(&raw)?;
            Some(ColumnAssociation::from_json(&value).map_err(ImportError::AssociationError)?)
        }
        None => None,
    };

    let sequencer = BatchSequencer::new(
        SqliteDirectoryRepository::from_connection(conn),
        settings,
        SchemaRegistry::builtin()?,
        Box::new(DelimitedFileParser::default()),
        Box::new(ConflictHandlerImpl),
    );

    let cancel = cancel_on_ctrl_c();
    let report = sequencer
        .validate(Path::new(batch_dir), association.as_ref(), &cancel)
        .await?;

    println!("{}", serde_json::to_string_pretty(&report.render())?);
    Ok(())
}

async fn timetable(db_path: &str, uai: &str, document_path: &str) -> Result<(), Box<dyn Error>> {
    let conn = open_database(db_path)?;
    let settings = load_settings(conn.clone()).await?;
    let content = decode_document(&std::fs::read(document_path)?);

    let importer = EdtImporter::new(
        SqliteDirectoryRepository::from_connection(conn.clone()),
        SqliteCourseRepository::from_connection(conn),
        settings,
    );

    let cancel = cancel_on_ctrl_c();
    let report = importer.import(uai, &content, &cancel).await?;

    println!("{}", serde_json::to_string_pretty(&report.render())?);
    Ok(())
}

fn set_config(db_path: &str, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
    let conn = open_database(db_path)?;
    let config = ConfigManager::from_connection(conn)?;
    config.set_global_config_value(key, value)?;
    println!("{}", config.get_config_snapshot()?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    logging::init();
    tracing::info!(version = ent_feeder::VERSION, "目录导入引擎启动");

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("validate") if args.len() == 3 || args.len() == 4 => {
            validate(&args[1], &args[2], args.get(3)).await
        }
        Some("timetable") if args.len() == 4 => timetable(&args[1], &args[2], &args[3]).await,
        Some("config") if args.len() == 4 => set_config(&args[1], &args[2], &args[3]),
        _ => {
            print_usage();
            std::process::exit(2);
        }
    }
}

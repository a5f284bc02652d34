// ==========================================
// 目录导入引擎 - 批次调度器
// ==========================================
// 职责: 校验一个批次目录，逐文件串行执行 CSV 校验管道
// 流程: 列出文件 → 解析机构 → (逐文件) 解析 → 列解析 → 标识解析
//       → 行转换 → 重复检测 → 累积报告
// 红线: 文件严格串行处理（家长依赖先前文件中的学生）
// ==========================================

use crate::config::feeder_settings::FeederSettings;
use crate::domain::types::Profile;
use crate::domain::user::{ColumnAssociation, ImportBatch, ProfileRecord, Structure};
use crate::importer::column_resolver::{ColumnResolver, ResolvedColumns};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::external_id_resolver::{cell, collect_external_ids, ExternalIdResolver};
use crate::importer::file_parser::CsvTable;
use crate::importer::importer_trait::{ConflictHandler, FileParser, ImportValidator};
use crate::importer::record_transformer::{RecordTransformer, RowOutcome};
use crate::importer::report::ImportReport;
use crate::importer::schema::SchemaRegistry;
use crate::repository::directory_repo::DirectoryRepository;
use crate::repository::retry::round_trip;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

// ==========================================
// 批次目录解析
// ==========================================

/// 从导入目录名解析机构外部标识
///
/// 目录名形如 `<任意>@<机构外部标识>_<任意>`
pub fn parse_structure_id(dir_name: &str) -> Option<String> {
    let head = dir_name.split('_').next().unwrap_or("");
    let parts: Vec<&str> = head.split('@').collect();
    match parts.as_slice() {
        [_, id] if !id.is_empty() => Some(id.to_string()),
        _ => None,
    }
}

/// 由目录名推导机构（存储中不存在时使用）
pub fn derive_structure(dir_name: &str, structure_external_id: Option<&str>) -> Structure {
    let name = dir_name
        .split('@')
        .next()
        .and_then(|n| n.split('_').next())
        .unwrap_or(dir_name)
        .to_string();
    let external_id = match structure_external_id {
        Some(id) => id.to_string(),
        None => hex::encode(Sha256::digest(dir_name.as_bytes())),
    };

    Structure {
        id: None,
        external_id,
        uai: None,
        name,
    }
}

/// 列出批次
///
/// # 返回
/// - Some(ImportBatch): 根目录恰好含一个导入目录，且目录内至少一个文件
/// - None: 不满足上述条件（error.list.files）
fn list_batch(batch_root: &Path) -> std::io::Result<Option<ImportBatch>> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    for entry in std::fs::read_dir(batch_root)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    if dirs.len() != 1 {
        return Ok(None);
    }
    let import_dir = dirs.remove(0);

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in std::fs::read_dir(&import_dir)? {
        let path = entry?.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(true);
        if path.is_file() && !hidden {
            files.push(path);
        }
    }
    if files.is_empty() {
        return Ok(None);
    }
    // 逆字典序: Student 先于 Relative
    files.sort_by(|a, b| b.file_name().cmp(&a.file_name()));

    let structure_external_id = import_dir
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(parse_structure_id);

    Ok(Some(ImportBatch {
        import_dir,
        structure_external_id,
        files,
    }))
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn file_stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

// ==========================================
// BatchContext - 批次内共享状态
// ==========================================
struct BatchContext {
    structure: Structure,
    /// 机构来自存储（可进行姓名发现）
    structure_known: bool,
    report: ImportReport,
    /// 已接受记录: externalId → 班级名串
    classes_names: HashMap<String, String>,
}

/// 单文件处理结果
enum FileOutcome {
    Done,
    Skipped,
    Abort,
}

// ==========================================
// BatchSequencer
// ==========================================
pub struct BatchSequencer<R>
where
    R: DirectoryRepository,
{
    // 数据访问层
    repo: R,

    // 运行配置
    settings: FeederSettings,
    schemas: SchemaRegistry,

    // 导入组件
    file_parser: Box<dyn FileParser>,
    conflict_handler: Box<dyn ConflictHandler>,
}

impl<R> BatchSequencer<R>
where
    R: DirectoryRepository,
{
    /// 创建新的 BatchSequencer 实例
    ///
    /// # 参数
    /// - repo: 目录存储
    /// - settings: 运行配置（种子 / 往返策略 / 别名）
    /// - schemas: 档案 schema
    /// - file_parser: 文件解析器
    /// - conflict_handler: 冲突处理器
    pub fn new(
        repo: R,
        settings: FeederSettings,
        schemas: SchemaRegistry,
        file_parser: Box<dyn FileParser>,
        conflict_handler: Box<dyn ConflictHandler>,
    ) -> Self {
        Self {
            repo,
            settings,
            schemas,
            file_parser,
            conflict_handler,
        }
    }

    /// 解析机构（每批次一次）
    async fn resolve_structure(
        &self,
        batch: &ImportBatch,
        cancel: &CancellationToken,
    ) -> ImportResult<(Structure, bool)> {
        let dir_name = file_name_of(&batch.import_dir);

        if let Some(external_id) = batch.structure_external_id.as_deref() {
            let repo = &self.repo;
            let found = round_trip(
                &self.settings.round_trip,
                cancel,
                "find_structure_by_external_id",
                move || repo.find_structure_by_external_id(external_id),
            )
            .await?;

            if let Some(structure) = found {
                return Ok((structure, true));
            }
            warn!(structure_external_id = %external_id, "机构不在目录中，按目录名推导");
        }

        Ok((
            derive_structure(&dir_name, batch.structure_external_id.as_deref()),
            false,
        ))
    }

    /// 标识解析: 存在性查询（必要时先做一次姓名发现）
    ///
    /// # 返回
    /// - Ok(Some): 已存在的 externalId
    /// - Ok(None): 姓名存在歧义，文件跳过
    async fn resolve_identities(
        &self,
        ctx: &mut BatchContext,
        file: &str,
        profile: Profile,
        table: &mut CsvTable,
        columns: &mut ResolvedColumns,
        cancel: &CancellationToken,
    ) -> ImportResult<Option<HashSet<String>>> {
        let resolver = ExternalIdResolver::new(&self.repo, &self.settings.round_trip, cancel);

        let needs_discovery = match columns.index_of("externalId") {
            Some(index) => table.rows.iter().any(|row| cell(row, index).is_empty()),
            None => true,
        };

        if needs_discovery && ctx.structure_known {
            let outcome = resolver
                .discover(table, columns, &ctx.structure.external_id, profile)
                .await?;
            if !outcome.ambiguous.is_empty() {
                for key in outcome.ambiguous {
                    ctx.report.add_error(
                        Some(file),
                        Some(profile),
                        "mapping.ambiguous",
                        vec![key.last_name, key.first_name],
                    );
                }
                return Ok(None);
            }
            debug!(filled = outcome.filled, "姓名发现补全");
        }

        let external_ids = match columns.index_of("externalId") {
            Some(index) => collect_external_ids(table, index),
            None => Vec::new(),
        };
        resolver.existing_ids(&external_ids).await.map(Some)
    }

    /// 处理单个文件
    #[instrument(skip(self, ctx, path, association, cancel), fields(file = %file_name_of(path)))]
    async fn process_file(
        &self,
        ctx: &mut BatchContext,
        path: &Path,
        association: Option<&ColumnAssociation>,
        cancel: &CancellationToken,
    ) -> ImportResult<FileOutcome> {
        let file = file_name_of(path);
        let stem = file_stem_of(path);

        // === 步骤 1: 档案类型 ===
        let profile = match association.and_then(|a| a.profile) {
            Some(profile) => profile,
            None => match stem.parse::<Profile>() {
                Ok(profile) => profile,
                Err(_) => {
                    warn!(stem = %stem, "未知档案类型，批次中止");
                    ctx.report.add_global_error("unknown.profile", vec![stem]);
                    return Ok(FileOutcome::Abort);
                }
            },
        };

        // === 步骤 2: 解析文件 ===
        let mut table = match self.file_parser.parse_table(path) {
            Ok(table) => table,
            Err(e) => {
                warn!(error = %e, "文件读取失败");
                ctx.report
                    .add_error(Some(&file), Some(profile), "error.read.file", vec![file.clone()]);
                return Ok(FileOutcome::Skipped);
            }
        };
        info!(
            profile = %profile,
            rows = table.rows.len(),
            charset = table.charset,
            "文件解析完成"
        );

        // === 步骤 3: 列解析 ===
        let schema = self.schemas.schema_for(profile);
        let resolver = ColumnResolver::new(schema, &self.settings.column_aliases);
        let resolved = match association {
            Some(association) => resolver.resolve_association(association),
            None => resolver.resolve_header(&table.header),
        };
        let mut columns = match resolved {
            Ok(columns) => columns,
            Err(errors) => {
                for error in errors {
                    ctx.report
                        .add_error(Some(&file), Some(profile), error.key, vec![error.param]);
                }
                return Ok(FileOutcome::Skipped);
            }
        };

        // === 步骤 4: 标识解析 ===
        let existing = match self
            .resolve_identities(ctx, &file, profile, &mut table, &mut columns, cancel)
            .await?
        {
            Some(existing) => existing,
            None => return Ok(FileOutcome::Skipped),
        };

        // === 步骤 5: 行转换 ===
        let transformer = RecordTransformer::new(
            &ctx.structure,
            profile,
            schema,
            &columns,
            self.settings.student_seed,
        );
        let mut accepted: Vec<ProfileRecord> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        let mut invalid = 0usize;

        for row in &table.rows {
            match transformer.transform_row(row, &existing, &ctx.classes_names) {
                RowOutcome::Valid {
                    record,
                    unresolved_links,
                } => {
                    warnings.extend(unresolved_links);
                    accepted.push(record);
                }
                RowOutcome::Invalid(violation) => {
                    invalid += 1;
                    ctx.report
                        .add_error(Some(&file), Some(profile), violation.key, violation.params);
                }
                RowOutcome::InvalidChildMapping => {
                    warn!("子女字段映射不一致，批次中止");
                    ctx.report
                        .add_error(Some(&file), Some(profile), "invalid.child.mapping", vec![]);
                    return Ok(FileOutcome::Abort);
                }
            }
        }

        for link in warnings {
            ctx.report
                .add_warning(Some(&file), Some(profile), "child.link.unresolved", vec![link]);
        }

        // === 步骤 6: 重复检测 ===
        let duplicates = self.conflict_handler.detect_duplicates(&accepted);
        let duplicate_indexes: HashSet<usize> = duplicates.iter().map(|(i, _)| *i).collect();
        for (_, external_id) in duplicates {
            ctx.report.add_error(
                Some(&file),
                Some(profile),
                "duplicate.external.id",
                vec![external_id],
            );
        }

        // === 步骤 7: 累积记录 ===
        let mut kept = 0usize;
        for (index, record) in accepted.into_iter().enumerate() {
            if duplicate_indexes.contains(&index) {
                continue;
            }
            if let Some(external_id) = record.external_id() {
                ctx.classes_names
                    .insert(external_id.to_string(), record.classes_str.clone());
            }
            ctx.report.add_record(record);
            kept += 1;
        }

        info!(
            profile = %profile,
            schema = %schema.family(),
            accepted = kept,
            invalid = invalid,
            duplicates = duplicate_indexes.len(),
            "文件校验完成"
        );
        Ok(FileOutcome::Done)
    }
}

#[async_trait]
impl<R> ImportValidator for BatchSequencer<R>
where
    R: DirectoryRepository,
{
    /// 校验批次
    ///
    /// # 返回
    /// - Ok(ImportReport): 累积报告（包括结构性错误）
    /// - Err: 存储往返失败或被取消
    #[instrument(skip(self, association, cancel), fields(batch_root = %batch_root.display()))]
    async fn validate(
        &self,
        batch_root: &Path,
        association: Option<&ColumnAssociation>,
        cancel: &CancellationToken,
    ) -> ImportResult<ImportReport> {
        info!("开始校验批次");

        let batch = match list_batch(batch_root) {
            Ok(Some(batch)) => batch,
            Ok(None) => {
                let mut report = ImportReport::new();
                report.add_global_error("error.list.files", vec![]);
                return Ok(report);
            }
            Err(e) => {
                warn!(error = %e, "批次目录读取失败");
                let mut report = ImportReport::new();
                report.add_global_error("error.list.files", vec![]);
                return Ok(report);
            }
        };
        info!(
            import_dir = %batch.import_dir.display(),
            files = batch.files.len(),
            structure_external_id = ?batch.structure_external_id,
            "批次文件列出完成"
        );

        let (structure, structure_known) = self.resolve_structure(&batch, cancel).await?;
        let mut ctx = BatchContext {
            structure,
            structure_known,
            report: ImportReport::new(),
            classes_names: HashMap::new(),
        };

        for path in &batch.files {
            if cancel.is_cancelled() {
                return Err(ImportError::Cancelled);
            }
            match self.process_file(&mut ctx, path, association, cancel).await? {
                FileOutcome::Done | FileOutcome::Skipped => {}
                FileOutcome::Abort => {
                    ctx.report.aborted = true;
                    break;
                }
            }
        }

        info!(
            errors = ctx.report.errors.len(),
            warnings = ctx.report.warnings.len(),
            aborted = ctx.report.aborted,
            "批次校验完成"
        );
        Ok(ctx.report)
    }
}

// ==========================================
// 目录导入引擎 - 分隔符文件解析器
// ==========================================
// 支持: ';' 分隔的 CSV，字符集自动识别（BOM → UTF-8 → Windows-1252）
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use crate::importer::importer_trait::FileParser;
use csv::ReaderBuilder;
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use std::path::Path;
use tracing::debug;

/// 默认分隔符
pub const DEFAULT_DELIMITER: u8 = b';';

// ==========================================
// CsvTable - 解析结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub charset: &'static str,
}

impl CsvTable {
    pub fn is_empty(&self) -> bool {
        self.header.is_empty()
    }
}

/// 识别字符集
///
/// # 规则
/// 1. 有 BOM 时按 BOM
/// 2. 合法 UTF-8 时为 UTF-8
/// 3. 否则回退 Windows-1252
pub fn detect_charset(bytes: &[u8]) -> &'static Encoding {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return encoding;
    }
    if std::str::from_utf8(bytes).is_ok() {
        UTF_8
    } else {
        WINDOWS_1252
    }
}

// ==========================================
// DelimitedFileParser 实现
// ==========================================
pub struct DelimitedFileParser {
    delimiter: u8,
}

impl DelimitedFileParser {
    pub fn new(delimiter: u8) -> Self {
        Self { delimiter }
    }
}

impl Default for DelimitedFileParser {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER)
    }
}

impl FileParser for DelimitedFileParser {
    fn parse_table(&self, file_path: &Path) -> ImportResult<CsvTable> {
        // 检查文件存在
        if !file_path.exists() {
            return Err(ImportError::FileNotFound(file_path.display().to_string()));
        }

        let bytes = std::fs::read(file_path)?;
        let encoding = detect_charset(&bytes);
        // decode 会去除 BOM
        let (text, _, had_errors) = encoding.decode(&bytes);
        if had_errors {
            debug!(file = %file_path.display(), charset = encoding.name(), "解码存在替换字符");
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true) // 允许行长度不一致
            .delimiter(self.delimiter)
            .from_reader(text.as_bytes());

        let mut header: Option<Vec<String>> = None;
        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            let cells: Vec<String> = record.iter().map(str::to_string).collect();

            // 跳过完全空白的行
            if cells.iter().all(|c| c.trim().is_empty()) {
                continue;
            }

            match header {
                None => header = Some(cells),
                Some(_) => rows.push(cells),
            }
        }

        debug!(
            file = %file_path.display(),
            charset = encoding.name(),
            rows = rows.len(),
            "文件解析完成"
        );

        Ok(CsvTable {
            header: header.unwrap_or_default(),
            rows,
            charset: encoding.name(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_bytes(bytes: &[u8]) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(bytes).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    #[test]
    fn test_parse_utf8_with_bom() {
        let file = write_bytes("\u{feff}Nom;Prénom\nMartin;Léa\n".as_bytes());
        let table = DelimitedFileParser::default()
            .parse_table(file.path())
            .unwrap();

        assert_eq!(table.charset, "UTF-8");
        assert_eq!(table.header, vec!["Nom", "Prénom"]);
        assert_eq!(table.rows, vec![vec!["Martin", "Léa"]]);
    }

    #[test]
    fn test_parse_windows_1252() {
        // "Prénom" en Windows-1252
        let file = write_bytes(b"Nom;Pr\xe9nom\nMartin;L\xe9a\n");
        let table = DelimitedFileParser::default()
            .parse_table(file.path())
            .unwrap();

        assert_eq!(table.charset, "windows-1252");
        assert_eq!(table.header[1], "Prénom");
        assert_eq!(table.rows[0][1], "Léa");
    }

    #[test]
    fn test_skip_blank_rows() {
        let file = write_bytes(b"Nom;Classe\n;\nMartin;6A\n\nDurand;5B\n");
        let table = DelimitedFileParser::default()
            .parse_table(file.path())
            .unwrap();

        assert_eq!(table.rows.len(), 2);
    }

    #[test]
    fn test_file_not_found() {
        let result = DelimitedFileParser::default().parse_table(Path::new("/nonexistent/x.csv"));
        assert!(matches!(result, Err(ImportError::FileNotFound(_))));
    }

    #[test]
    fn test_empty_file() {
        let file = write_bytes(b"");
        let table = DelimitedFileParser::default()
            .parse_table(file.path())
            .unwrap();
        assert!(table.is_empty());
    }
}

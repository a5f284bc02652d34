// ==========================================
// 目录导入引擎 - 国际化 (i18n) 模块
// ==========================================
// 使用 rust-i18n 库
// 支持法语（默认）和英语
// ==========================================
// 注意: rust_i18n::i18n! 宏已在 lib.rs 中初始化
// ==========================================

/// 支持的语言
pub const SUPPORTED_LOCALES: [&str; 2] = ["fr", "en"];

/// 获取当前语言
pub fn current_locale() -> String {
    rust_i18n::locale().to_string()
}

/// 设置语言
///
/// # 参数
/// - locale: 语言代码（"fr" 或 "en"）
pub fn set_locale(locale: &str) {
    rust_i18n::set_locale(locale);
}

/// 从 Accept-Language 形式的值中选出第一个支持的语言
///
/// # 示例
/// - "en-US,en;q=0.9" → "en"
/// - "de" → "fr"（回退）
pub fn negotiate_locale(accept_language: &str) -> &'static str {
    accept_language
        .split(',')
        .filter_map(|part| part.split(';').next())
        .map(|tag| tag.trim().to_lowercase())
        .find_map(|tag| {
            let primary = tag.split('-').next().unwrap_or("").to_string();
            SUPPORTED_LOCALES.iter().copied().find(|l| *l == primary)
        })
        .unwrap_or(SUPPORTED_LOCALES[0])
}

/// 翻译消息（无参数）
///
/// # 示例
/// ```no_run
/// use ent_feeder::i18n::t;
/// let msg = t("state.NEW");
/// ```
pub fn t(key: &str) -> String {
    rust_i18n::t!(key).to_string()
}

/// 翻译消息（带参数）
///
/// # 示例
/// ```no_run
/// use ent_feeder::i18n::t_with_args;
/// let msg = t_with_args("invalid.column", &[("0", "Nom")]);
/// ```
pub fn t_with_args(key: &str, args: &[(&str, &str)]) -> String {
    let mut result = rust_i18n::t!(key).to_string();
    for (k, v) in args {
        let placeholder = format!("%{{{}}}", k);
        result = result.replace(&placeholder, v);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // rust-i18n 的 locale 为全局状态，且 Rust 测试默认并行执行；
    // 为避免测试互相干扰，这里对 i18n 相关测试串行化。
    static LOCALE_TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_set_locale() {
        let _guard = LOCALE_TEST_LOCK.lock().unwrap();
        set_locale("en");
        assert_eq!(current_locale(), "en");

        // 恢复默认语言
        set_locale("fr");
        assert_eq!(current_locale(), "fr");
    }

    #[test]
    fn test_negotiate_locale() {
        assert_eq!(negotiate_locale("en-US,en;q=0.9"), "en");
        assert_eq!(negotiate_locale("fr-FR"), "fr");
        assert_eq!(negotiate_locale("de, en;q=0.5"), "en");
        assert_eq!(negotiate_locale("de"), "fr");
        assert_eq!(negotiate_locale(""), "fr");
    }

    #[test]
    fn test_translate_simple() {
        let _guard = LOCALE_TEST_LOCK.lock().unwrap();
        set_locale("fr");
        assert_eq!(t("state.NEW"), "Nouveau");

        set_locale("en");
        assert_eq!(t("state.NEW"), "New");

        set_locale("fr");
    }

    #[test]
    fn test_translate_with_args() {
        let _guard = LOCALE_TEST_LOCK.lock().unwrap();
        set_locale("fr");
        let msg = t_with_args("invalid.column", &[("0", "Discipline")]);
        assert!(msg.contains("Discipline"));
        assert!(msg.contains("Colonne"));

        set_locale("en");
        let msg = t_with_args("invalid.column", &[("0", "Discipline")]);
        assert!(msg.contains("Discipline"));
        assert!(msg.contains("column"));

        set_locale("fr");
    }
}

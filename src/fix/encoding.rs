//! XML编码声明修复
//!
//! 必须在所有修改内容文档的步骤之后执行，否则声明可能被挤到文档中间。

use crate::epub::EpubArchive;
use crate::fix::FixLog;
use once_cell::sync::Lazy;
use regex::Regex;

/// 规范的UTF-8声明
pub const UTF8_DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;

/// 带有可识别编码的XML声明
static VALID_DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)^<\?xml\s+version=["'][\d.]+["']\s+encoding=["'][a-zA-Z\d\-.]+["'].*?\?>"#)
        .expect("XML声明正则应当有效")
});

/// 任意XML声明（可能缺少编码）
static ANY_DECLARATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^<\?xml\b.*?\?>\s*").expect("XML声明正则应当有效"));

/// 文档开头的空白和BOM
fn trim_leading(content: &str) -> &str {
    content.trim_start_matches(|c: char| c.is_whitespace() || c == '\u{FEFF}')
}

/// 文档是否以带编码的XML声明开头
pub fn has_valid_declaration(content: &str) -> bool {
    VALID_DECLARATION.is_match(trim_leading(content))
}

/// 为缺少编码声明的内容文档补充UTF-8声明
pub fn fix_encoding(archive: &mut EpubArchive, log: &mut FixLog) {
    for path in archive.content_paths() {
        let Some(content) = archive.get(&path) else {
            continue;
        };
        if has_valid_declaration(content) {
            continue;
        }

        let body = trim_leading(content);
        let body = match ANY_DECLARATION.find(body) {
            Some(declaration) => &body[declaration.end()..],
            None => body,
        };
        let updated = format!("{}\n{}", UTF8_DECLARATION, body);
        archive.set(&path, updated);
        log.push(format!("修复了文件 {} 的编码声明", path));
    }
}

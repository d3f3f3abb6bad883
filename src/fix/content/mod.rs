//! 内容文档重新序列化
//!
//! 每个HTML/XHTML成员先做严格的XML解析：
//! - 格式良好时走 [`rewrite`]，用正则做最小改动，原文其余部分逐字节保留；
//! - 格式错误时走 [`dom`]，宽松解析后按XHTML重新输出，原有排版会丢失。
//!
//! 两条路径应用同一组修复，但不保证对同一输入产生相同的字节。

pub mod dom;
pub mod rewrite;

use crate::epub::EpubArchive;
use crate::epub::xml;
use crate::fix::FixLog;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// 自动生成的body id，如 `id-3f9a2c1e-77b0-4c1d`；较短的人工id不匹配
static GENERATED_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9]+-[A-Za-z0-9-]{15,}$").expect("生成id的正则应当有效")
});

/// id是否像是工具自动生成的哈希
pub fn is_generated_id(id: &str) -> bool {
    GENERATED_ID.is_match(id)
}

/// 单个成员的改写结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewritten {
    pub content: String,
    /// 本成员产生的修复说明
    pub fixes: Vec<String>,
}

/// 重写一个内容文档，没有任何变化时返回None
pub fn rewrite_member(path: &str, content: &str) -> Option<Rewritten> {
    if xml::is_well_formed(content) {
        rewrite::rewrite(path, content)
    } else {
        debug!("{} 不是格式良好的XML，改用宽松解析", path);
        Some(dom::reserialize(path, content))
    }
}

/// 重新序列化所有内容文档
pub fn reserialize_content(archive: &mut EpubArchive, log: &mut FixLog) {
    for path in archive.content_paths() {
        let Some(content) = archive.get(&path) else {
            continue;
        };
        if let Some(rewritten) = rewrite_member(&path, content) {
            archive.set(&path, rewritten.content);
            for fix in rewritten.fixes {
                log.push(fix);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_id_predicate() {
        assert!(is_generated_id("id-3f9a2c1e-77b0-4c1d"));
        assert!(is_generated_id("x-0123456789abcdef"));
        assert!(!is_generated_id("chapter-1"));
        assert!(!is_generated_id("intro"));
        assert!(!is_generated_id("-0123456789abcdefgh"));
    }

    #[test]
    fn test_branch_selection() {
        let well_formed = r#"<html xmlns="http://www.w3.org/1999/xhtml"><body><b>x</b></body></html>"#;
        let rewritten = rewrite_member("a.xhtml", well_formed).unwrap();
        assert!(!rewritten.fixes.iter().any(|f| f.contains("格式错误")));

        let malformed = "<html><body><p>x<br></body></html>";
        let rewritten = rewrite_member("b.xhtml", malformed).unwrap();
        assert_eq!(rewritten.fixes, vec!["修复了 b.xhtml 中的格式错误标记".to_string()]);
        assert!(xml::is_well_formed(&rewritten.content));
    }

    #[test]
    fn test_xhtml_doctype_entities_take_rewrite_branch() {
        let content = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.1//EN\" \"http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd\">\n\
<html xmlns=\"http://www.w3.org/1999/xhtml\">\n<body>\n  <p>a&nbsp;b</p>\n</body>\n</html>";
        assert_eq!(rewrite_member("a.xhtml", content), None);

        let with_bold = content.replace("a&nbsp;b", "<b>a</b>&nbsp;b");
        let rewritten = rewrite_member("a.xhtml", &with_bold).unwrap();
        assert_eq!(rewritten.fixes, vec!["将 a.xhtml 中的 <b>/<i> 标签转换为 <span>".to_string()]);
        assert!(rewritten.content.contains("<!DOCTYPE html PUBLIC"));
        assert!(rewritten.content.contains("<span class=\"bold\">a</span>&nbsp;b"));
    }

    #[test]
    fn test_malformed_edge_cases_settle_after_one_run() {
        let mut archive = EpubArchive::new();
        archive.set(
            "a.xhtml",
            "<html><body><p>x<br><map name=m><area alt=\"\" href=\"a.xhtml\"></map></body></html>",
        );
        archive.set(
            "b.xhtml",
            "<html><body><!-- <b>old</b> <img alt=\"\"> --><p>y<br><noscript><p>n</p></noscript></body></html>",
        );

        let mut log = FixLog::new();
        reserialize_content(&mut archive, &mut log);
        assert!(!archive.get("a.xhtml").unwrap().contains("alt="));
        assert!(archive.get("b.xhtml").unwrap().contains("<!-- <b>old</b>"));

        let first_a = archive.get("a.xhtml").unwrap().to_string();
        let first_b = archive.get("b.xhtml").unwrap().to_string();
        let mut second = FixLog::new();
        reserialize_content(&mut archive, &mut second);
        assert!(second.is_empty(), "{:?}", second);
        assert_eq!(archive.get("a.xhtml"), Some(first_a.as_str()));
        assert_eq!(archive.get("b.xhtml"), Some(first_b.as_str()));
    }

    #[test]
    fn test_reserialize_content_is_idempotent() {
        let mut archive = EpubArchive::new();
        archive.set("a.xhtml", "<html><body><p>A &nbsp; <b>B</b><img alt=\"\"></p></body></html>");
        archive.set("b.html", r#"<html xmlns="http://www.w3.org/1999/xhtml"><body><i>B</i></body></html>"#);

        let mut log = FixLog::new();
        reserialize_content(&mut archive, &mut log);
        assert!(!log.is_empty());

        let first_a = archive.get("a.xhtml").unwrap().to_string();
        let first_b = archive.get("b.html").unwrap().to_string();
        let mut second = FixLog::new();
        reserialize_content(&mut archive, &mut second);
        assert!(second.is_empty(), "{:?}", second);
        assert_eq!(archive.get("a.xhtml"), Some(first_a.as_str()));
        assert_eq!(archive.get("b.html"), Some(first_b.as_str()));
    }
}

//! 指向body id的链接修复
//!
//! 目标阅读器不把body元素的id当作有效的链接锚点，`chapter.xhtml#body-id`
//! 会显示为无法解析的超链接，因此改为直接指向文件。

use crate::epub::archive::{MIMETYPE_PATH, basename};
use crate::epub::EpubArchive;
use crate::fix::FixLog;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::debug;

static BODY_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("body").expect("body选择器应当有效"));

/// 宽松解析HTML并返回body元素的非空id
pub fn body_id(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let body = document.select(&BODY_SELECTOR).next()?;
    body.value()
        .id()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// 将 `文件名#body-id` 形式的链接替换为文件名
pub fn fix_body_id_links(archive: &mut EpubArchive, log: &mut FixLog) {
    let mut links = Vec::new();
    for path in archive.content_paths() {
        let Some(content) = archive.get(&path) else {
            continue;
        };
        if let Some(id) = body_id(content) {
            let target = basename(&path).to_string();
            links.push((format!("{}#{}", target, id), target));
        }
    }
    if links.is_empty() {
        return;
    }
    debug!("找到 {} 个带id的body元素", links.len());

    for path in archive.text_paths() {
        if path == MIMETYPE_PATH {
            continue;
        }
        for (src, target) in &links {
            let Some(content) = archive.get(&path) else {
                continue;
            };
            if let Some(updated) = replace_link(content, src, target) {
                archive.set(&path, updated);
                log.push(format!("在文件 {} 中将链接目标 {} 替换为 {}", path, src, target));
            }
        }
    }
}

/// 替换所有独立出现的 `src`，返回None表示没有替换
///
/// 前面紧跟文件名字符或后面紧跟id字符的出现属于更长的文件名或锚点，保持不变。
fn replace_link(text: &str, src: &str, target: &str) -> Option<String> {
    let mut result = String::with_capacity(text.len());
    let mut last = 0;
    let mut replaced = false;

    for (start, _) in text.match_indices(src) {
        let end = start + src.len();
        let before = text[..start].chars().next_back();
        let after = text[end..].chars().next();
        if before.is_some_and(is_file_name_char) || after.is_some_and(is_fragment_char) {
            continue;
        }
        result.push_str(&text[last..start]);
        result.push_str(target);
        last = end;
        replaced = true;
    }

    if !replaced {
        return None;
    }
    result.push_str(&text[last..]);
    Some(result)
}

fn is_file_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '~')
}

fn is_fragment_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_id() {
        assert_eq!(body_id(r#"<html><body id="intro"><p/></body></html>"#), Some("intro".to_string()));
        assert_eq!(body_id(r#"<html><body id=""></body></html>"#), None);
        assert_eq!(body_id("<p>no body"), None);
    }

    #[test]
    fn test_replace_link_respects_boundaries() {
        let text = r#"<a href="a.xhtml#intro">1</a><a href="../text/a.xhtml#intro">2</a><a href="a.xhtml#intro2">3</a><a href="xa.xhtml#intro">4</a>"#;
        let replaced = replace_link(text, "a.xhtml#intro", "a.xhtml").unwrap();
        assert_eq!(
            replaced,
            r#"<a href="a.xhtml">1</a><a href="../text/a.xhtml">2</a><a href="a.xhtml#intro2">3</a><a href="xa.xhtml#intro">4</a>"#
        );
        assert_eq!(replace_link("nothing here", "a.xhtml#intro", "a.xhtml"), None);
    }

    #[test]
    fn test_rewrites_links_across_members() {
        let mut archive = EpubArchive::new();
        archive.set("mimetype", "application/epub+zip");
        archive.set("OEBPS/text/a.xhtml", r#"<html><body id="intro"><p>A</p></body></html>"#);
        archive.set("OEBPS/text/b.xhtml", r#"<html><body><a href="a.xhtml#intro">A</a></body></html>"#);
        archive.set("OEBPS/toc.ncx", r#"<ncx><content src="text/a.xhtml#intro"/></ncx>"#);

        let mut log = FixLog::new();
        fix_body_id_links(&mut archive, &mut log);

        assert_eq!(
            archive.get("OEBPS/text/b.xhtml"),
            Some(r#"<html><body><a href="a.xhtml">A</a></body></html>"#)
        );
        assert_eq!(archive.get("OEBPS/toc.ncx"), Some(r#"<ncx><content src="text/a.xhtml"/></ncx>"#));
        // body自身的id不是链接，保持不变
        assert!(archive.get("OEBPS/text/a.xhtml").unwrap().contains(r#"id="intro""#));
        assert_eq!(
            log.entries()[0],
            "在文件 OEBPS/text/b.xhtml 中将链接目标 a.xhtml#intro 替换为 a.xhtml"
        );
        assert_eq!(log.len(), 2);
    }
}

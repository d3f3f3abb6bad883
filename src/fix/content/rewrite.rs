//! 格式良好文档的正则改写
//!
//! 每条规则只匹配需要修改的片段，文档其余部分保持原样。

use super::{Rewritten, is_generated_id};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;

/// 带引号的属性值
const QUOTED: &str = r#"(?:"[^"]*"|'[^']*')"#;

/// 编译固定的正则表达式
fn pattern(source: &str) -> Regex {
    Regex::new(source).expect("内置正则表达式应当有效")
}

static EPUB_ATTRIBUTE: Lazy<Regex> = Lazy::new(|| pattern(&format!(r"\s+epub:[\w.-]+\s*=\s*{}", QUOTED)));
static EPUB_NAMESPACE: Lazy<Regex> = Lazy::new(|| pattern(&format!(r"\s+xmlns:epub\s*=\s*{}", QUOTED)));
static EPUB_ELEMENT: Lazy<Regex> = Lazy::new(|| pattern(r"</?epub:"));
static HTML_XML_LANG: Lazy<Regex> =
    Lazy::new(|| pattern(&format!(r"(?i)(<html\b[^>]*?)\s+xml:lang\s*=\s*{}", QUOTED)));
static HTML_LANG: Lazy<Regex> = Lazy::new(|| pattern(&format!(r"(?i)(<html\b[^>]*?)\s+lang\s*=\s*{}", QUOTED)));
static ROLE: Lazy<Regex> = Lazy::new(|| pattern(&format!(r"\s+role\s*=\s*{}", QUOTED)));
static BODY_TAG: Lazy<Regex> = Lazy::new(|| pattern(r"(?i)<body\b[^>]*>"));
static ID_ATTRIBUTE: Lazy<Regex> = Lazy::new(|| pattern(r#"\s+id\s*=\s*(?:"([^"]*)"|'([^']*)')"#));
static CLASS_ATTRIBUTE: Lazy<Regex> = Lazy::new(|| pattern(r#"(\s)class\s*=\s*(?:"([^"]*)"|'([^']*)')"#));
static SCRIPT: Lazy<Regex> = Lazy::new(|| pattern(r"(?is)<script\b[^>]*/>|<script\b[^>]*>.*?</script\s*>"));
static IMG: Lazy<Regex> = Lazy::new(|| pattern(r"(?is)<img\b(?:[^>]*/>|[^>]*>\s*</img\s*>)"));
static SRC_ATTRIBUTE: Lazy<Regex> = Lazy::new(|| pattern(r#"(?i)\ssrc\s*=\s*(?:"([^"]*)"|'([^']*)')"#));
static EMPTY_ALT: Lazy<Regex> = Lazy::new(|| pattern(r#"\s+alt\s*=\s*(?:""|'')"#));
static AMZN_REMOVED: Lazy<Regex> =
    Lazy::new(|| pattern(&format!(r"(?i)\s+data-AmznRemoved[^=\s>]*\s*=\s*{}", QUOTED)));
static COMMENT: Lazy<Regex> = Lazy::new(|| pattern(r"(?s)<!--.*?-->"));
static COMMENT_MARKER: Lazy<Regex> =
    Lazy::new(|| pattern(&format!("{}([0-9]+){}", MARKER_OPEN, MARKER_CLOSE)));

/// 注释占位符的起止字符（Unicode私用区）
const MARKER_OPEN: char = '\u{E000}';
const MARKER_CLOSE: char = '\u{E001}';

/// 要转换为span的标签及其对应的类名
static STYLE_TAGS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [("b", "bold"), ("strong", "bold"), ("i", "italic"), ("em", "italic")]
        .into_iter()
        .map(|(tag, class)| {
            // 不匹配自闭合标签；\b 排除 <body>、<br>、<img>、<embed> 等同前缀标签
            let source = format!(r"(?is)<{tag}\b((?:[^>]*[^/>])?)>(.*?)</{tag}\s*>");
            (pattern(&source), class)
        })
        .collect()
});

/// 嵌套标签的最大展开轮数
const MAX_CONVERSION_ROUNDS: usize = 64;

/// 对格式良好的文档应用全部改写规则，没有变化时返回None
///
/// 注释在改写期间被替换为占位符，其中的标记不受任何规则影响。
pub fn rewrite(path: &str, original: &str) -> Option<Rewritten> {
    let (mut content, comments) = hide_comments(original);
    let mut fixes = Vec::new();

    let mut step = |content: &mut String, updated: String, message: String| {
        if updated != *content {
            *content = updated;
            fixes.push(message);
        }
    };

    let updated = remove_epub_attributes(&content);
    step(&mut content, updated, format!("从 {} 中移除了 epub: 属性", path));

    let updated = remove_root_lang(&content);
    step(&mut content, updated, format!("从 {} 中移除了 lang 属性", path));

    let updated = ROLE.replace_all(&content, "").into_owned();
    step(&mut content, updated, format!("从 {} 中移除了 role 属性", path));

    let updated = remove_generated_body_id(&content);
    step(&mut content, updated, format!("从 {} 中移除了自动生成的 body id", path));

    let updated = convert_style_tags(&content);
    step(&mut content, updated, format!("将 {} 中的 <b>/<i> 标签转换为 <span>", path));

    let scripts = SCRIPT.find_iter(&content).count();
    let updated = SCRIPT.replace_all(&content, "").into_owned();
    step(&mut content, updated, format!("从 {} 中移除了 {} 个 <script> 标签", path, scripts));

    let updated = remove_stray_images(&content);
    step(&mut content, updated, format!("移除了 {} 中没有 src 的图片标签", path));

    let updated = EMPTY_ALT.replace_all(&content, "").into_owned();
    step(&mut content, updated, format!("从 {} 中移除了空的 alt 属性", path));

    let updated = AMZN_REMOVED.replace_all(&content, "").into_owned();
    step(&mut content, updated, format!("从 {} 中移除了 data-AmznRemoved 属性", path));

    let content = restore_comments(&content, &comments);
    if content == original {
        None
    } else {
        Some(Rewritten { content, fixes })
    }
}

/// 把注释替换为占位符，返回替换后的文本和按序号排列的注释原文
///
/// 文本中已经出现私用区占位字符时不做替换。
fn hide_comments(content: &str) -> (String, Vec<String>) {
    let mut comments = Vec::new();
    if content.contains(MARKER_OPEN) {
        return (content.to_string(), comments);
    }
    let hidden = COMMENT
        .replace_all(content, |caps: &Captures| {
            comments.push(caps[0].to_string());
            format!("{}{}{}", MARKER_OPEN, comments.len() - 1, MARKER_CLOSE)
        })
        .into_owned();
    (hidden, comments)
}

fn restore_comments(content: &str, comments: &[String]) -> String {
    if comments.is_empty() {
        return content.to_string();
    }
    COMMENT_MARKER
        .replace_all(content, |caps: &Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|index| comments.get(index))
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// 移除所有 `epub:` 属性；不再有 `epub:` 元素时一并移除命名空间声明
fn remove_epub_attributes(content: &str) -> String {
    let without_attributes = EPUB_ATTRIBUTE.replace_all(content, "");
    if EPUB_ELEMENT.is_match(&without_attributes) {
        without_attributes.into_owned()
    } else {
        EPUB_NAMESPACE.replace_all(&without_attributes, "").into_owned()
    }
}

/// 移除根元素上的 `xml:lang` 和 `lang`
fn remove_root_lang(content: &str) -> String {
    let without_xml_lang = HTML_XML_LANG.replace(content, "${1}");
    HTML_LANG.replace(&without_xml_lang, "${1}").into_owned()
}

fn remove_generated_body_id(content: &str) -> String {
    BODY_TAG
        .replace_all(content, |caps: &Captures| {
            let tag = &caps[0];
            ID_ATTRIBUTE
                .replace(tag, |id_caps: &Captures| {
                    let id = id_caps.get(1).or_else(|| id_caps.get(2)).map_or("", |m| m.as_str());
                    if is_generated_id(id) {
                        String::new()
                    } else {
                        id_caps[0].to_string()
                    }
                })
                .into_owned()
        })
        .into_owned()
}

/// 反复转换直到没有可转换的标签，以处理嵌套的同名标签
fn convert_style_tags(content: &str) -> String {
    let mut current = content.to_string();
    for _ in 0..MAX_CONVERSION_ROUNDS {
        let mut changed = false;
        for (regex, class) in STYLE_TAGS.iter() {
            let updated = regex.replace_all(&current, |caps: &Captures| {
                format!("<span{}>{}</span>", with_class(&caps[1], class), &caps[2])
            });
            if let Cow::Owned(updated) = updated {
                current = updated;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    current
}

/// 在属性串中追加类名，没有class属性时新增
fn with_class(attributes: &str, class: &str) -> String {
    if let Some(caps) = CLASS_ATTRIBUTE.captures(attributes) {
        let existing = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str()).trim();
        let merged = if existing.is_empty() {
            class.to_string()
        } else {
            format!("{} {}", existing, class)
        };
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        format!(
            "{}{}class=\"{}\"{}",
            &attributes[..whole.start],
            &caps[1],
            merged,
            &attributes[whole.end..]
        )
    } else {
        format!("{} class=\"{}\"", attributes, class)
    }
}

/// 移除没有src或src为空的img
fn remove_stray_images(content: &str) -> String {
    IMG.replace_all(content, |caps: &Captures| {
        let tag = &caps[0];
        let has_src = SRC_ATTRIBUTE
            .captures(tag)
            .and_then(|src| src.get(1).or_else(|| src.get(2)))
            .is_some_and(|src| !src.as_str().trim().is_empty());
        if has_src { tag.to_string() } else { String::new() }
    })
    .into_owned()
}

//! 格式错误文档的宽松解析与重新序列化
//!
//! 用HTML5解析器容错解析，在遍历DOM树输出XHTML的同时应用修复，
//! 输出总能通过严格的XML解析，下次运行会走正则改写路径。

use super::{Rewritten, is_generated_id};
use crate::epub::xml::XHTML_NAMESPACE;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::node::{Element, Node};
use scraper::{ElementRef, Html};

const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";
const MATHML_NAMESPACE: &str = "http://www.w3.org/1998/Math/MathML";
const XLINK_NAMESPACE: &str = "http://www.w3.org/1999/xlink";

/// 不能有内容、必须自闭合的HTML元素
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

static XML_DECLARATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(<\?xml[^?]*\?>)\s*").expect("XML声明正则应当有效"));
static DOCTYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*<!DOCTYPE[^>]*>\s*").expect("DOCTYPE正则应当有效"));

/// 宽松解析并重新输出文档
///
/// 原有的XML声明会保留在输出开头，DOCTYPE被丢弃。
pub fn reserialize(path: &str, content: &str) -> Rewritten {
    let (declaration, rest) = match XML_DECLARATION.captures(content) {
        Some(caps) => {
            let end = caps.get(0).map_or(0, |m| m.end());
            (format!("{}\n", &caps[1]), &content[end..])
        }
        None => (String::new(), content),
    };
    let markup = DOCTYPE.replace(rest, "");

    let document = Html::parse_document(&markup);
    let mut serializer = Serializer::default();
    serializer.element(document.root_element(), Space::Html);

    let mut fixes = vec![format!("修复了 {} 中的格式错误标记", path)];
    if serializer.scripts > 0 {
        fixes.push(format!("从 {} 中移除了 {} 个 <script> 标签", path, serializer.scripts));
    }

    Rewritten {
        content: declaration + &serializer.out,
        fixes,
    }
}

/// 当前所在的命名空间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Space {
    Html,
    Svg,
    MathMl,
}

#[derive(Default)]
struct Serializer {
    out: String,
    /// 移除的script数量
    scripts: usize,
}

impl Serializer {
    fn children(&mut self, element: ElementRef<'_>, space: Space) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => escape_into(&mut self.out, text, false),
                Node::Comment(comment) => self.comment(comment),
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        self.element(child, space);
                    }
                }
                _ => {}
            }
        }
    }

    fn element(&mut self, element: ElementRef<'_>, parent: Space) {
        let value = element.value();
        let source_name = value.name();

        if source_name == "script" {
            self.scripts += 1;
            return;
        }
        if source_name == "img" && value.attr("src").is_none_or(|src| src.trim().is_empty()) {
            return;
        }
        // 解析器启用了脚本，noscript的内容只是原始文本；重新解析后展开其内容
        if source_name == "noscript" {
            let markup: String = element.text().collect();
            let fragment = Html::parse_fragment(&markup);
            self.children(fragment.root_element(), parent);
            return;
        }
        // 带前缀或不合法的元素名无法输出为XML，只保留其内容
        if source_name.contains(':') || !is_xml_name(source_name) {
            self.children(element, parent);
            return;
        }

        let space = match source_name {
            "svg" => Space::Svg,
            "math" => Space::MathMl,
            _ => parent,
        };
        let (name, added_class) = match source_name {
            "b" | "strong" => ("span", Some("bold")),
            "i" | "em" => ("span", Some("italic")),
            other => (other, None),
        };

        self.out.push('<');
        self.out.push_str(name);
        for (key, val) in attributes(value, space, parent, added_class) {
            self.out.push(' ');
            self.out.push_str(&key);
            self.out.push_str("=\"");
            escape_into(&mut self.out, &val, true);
            self.out.push('"');
        }

        let empty = element.children().next().is_none();
        if (space == Space::Html && VOID_ELEMENTS.contains(&name)) || (space != Space::Html && empty) {
            self.out.push_str("/>");
            return;
        }

        self.out.push('>');
        self.children(element, space);
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push('>');
    }

    fn comment(&mut self, comment: &str) {
        let mut text = comment.to_string();
        while text.contains("--") {
            text = text.replace("--", "- -");
        }
        if text.ends_with('-') {
            text.push(' ');
        }
        self.out.push_str("<!--");
        self.out.push_str(&text);
        self.out.push_str("-->");
    }
}

/// 计算要输出的属性，同时应用属性级的修复
fn attributes(value: &Element, space: Space, parent: Space, added_class: Option<&str>) -> Vec<(String, String)> {
    let element = value.name();
    let mut out: Vec<(String, String)> = Vec::new();

    match element {
        "html" => out.push(("xmlns".into(), XHTML_NAMESPACE.into())),
        "svg" if parent != Space::Svg => {
            out.push(("xmlns".into(), SVG_NAMESPACE.into()));
            out.push(("xmlns:xlink".into(), XLINK_NAMESPACE.into()));
        }
        "math" if parent != Space::MathMl => out.push(("xmlns".into(), MATHML_NAMESPACE.into())),
        _ => {}
    }

    for (name, val) in value.attrs() {
        let lower = name.to_ascii_lowercase();
        let dropped = lower == "xmlns"
            || lower.starts_with("xmlns:")
            || lower.starts_with("epub:")
            || lower.starts_with("data-amznremoved")
            || lower == "role"
            || (element == "html" && (lower == "lang" || lower == "xml:lang"))
            || (lower == "alt" && val.is_empty())
            || (element == "body" && lower == "id" && is_generated_id(val));
        if dropped {
            continue;
        }

        // 外来内容中的 xlink:href 被解析器改成了无前缀的 href
        let name = if space == Space::Svg && name == "href" { "xlink:href" } else { name };
        if !is_xml_name(name) {
            continue;
        }
        if let Some((prefix, _)) = name.split_once(':') {
            let bound = prefix == "xml" || (prefix == "xlink" && space == Space::Svg);
            if !bound {
                continue;
            }
        }
        if out.iter().any(|(existing, _)| existing == name) {
            continue;
        }

        let val = match (name, added_class) {
            ("class", Some(class)) if !val.trim().is_empty() => format!("{} {}", val.trim(), class),
            ("class", Some(class)) => class.to_string(),
            _ => val.to_string(),
        };
        out.push((name.to_string(), val));
    }

    if let Some(class) = added_class {
        if !out.iter().any(|(name, _)| name == "class") {
            out.push(("class".into(), class.into()));
        }
    }
    out
}

/// 是否为合法的XML名称
fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

/// 转义文本或属性值，并去掉XML中不允许出现的控制字符
fn escape_into(out: &mut String, text: &str, attribute: bool) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\t' | '\n' | '\r' => out.push(c),
            c if (c as u32) < 0x20 => {}
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::xml::is_well_formed;

    #[test]
    fn test_reserializes_malformed_markup() {
        let content = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<!DOCTYPE html>\n\
<html xmlns:epub=\"http://www.idpf.org/2007/ops\" lang=\"en\"><body id=\"id-3f9a2c1e-77b0-4c1d\" epub:type=\"x\">\
<p role=\"note\">a<br>b<script>x()</script><img src=\"a.png\" alt=\"\"><img><b class=\"c\">t</b></p></body></html>";
        let result = reserialize("a.xhtml", content);
        assert_eq!(
            result.content,
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
<html xmlns=\"http://www.w3.org/1999/xhtml\"><head></head><body><p>a<br/>b<img src=\"a.png\"/><span class=\"c bold\">t</span></p></body></html>"
        );
        assert_eq!(
            result.fixes,
            vec![
                "修复了 a.xhtml 中的格式错误标记".to_string(),
                "从 a.xhtml 中移除了 1 个 <script> 标签".to_string(),
            ]
        );
        assert!(is_well_formed(&result.content));
    }

    #[test]
    fn test_output_is_well_formed_xhtml() {
        let content = "<html><body><p>x &nbsp; 1 < 2 && \"q\"<!-- a -- b --><epub:switch><em>e</em></epub:switch>\
<svg viewBox=\"0 0 10 10\"><image xlink:href=\"a.png\"/></svg><p data-AmznRemoved=\"1\" class=\"\">y</body></html>";
        let result = reserialize("b.html", content);
        assert!(is_well_formed(&result.content), "{}", result.content);
        assert!(result.content.starts_with("<html xmlns=\"http://www.w3.org/1999/xhtml\">"));
        assert!(result.content.contains("1 &lt; 2 &amp;&amp;"));
        assert!(result.content.contains("<span class=\"italic\">e</span>"));
        assert!(result.content.contains("xlink:href=\"a.png\""));
        assert!(!result.content.contains("epub:"));
        assert!(!result.content.contains("AmznRemoved"));
        assert!(result.content.contains("<p class=\"\">y</p>"));
    }

    #[test]
    fn test_noscript_content_is_unwrapped() {
        let content = "<html><body><noscript><p class=\"n\">n &amp; <b>m</b></p></noscript><p>x<br></p></body></html>";
        let result = reserialize("d.xhtml", content);
        assert!(!result.content.contains("noscript"));
        assert!(!result.content.contains("&lt;p"));
        assert!(result.content.contains("<p class=\"n\">n &amp; <span class=\"bold\">m</span></p>"));
        assert!(is_well_formed(&result.content));
    }

    #[test]
    fn test_empty_alt_dropped_on_any_element() {
        let content = "<html><body><map name=\"m\"><area alt=\"\" href=\"a.xhtml\"></map><img src=\"a.png\" alt=\"\"><p alt=\"x\">y</body></html>";
        let result = reserialize("e.xhtml", content);
        assert!(result.content.contains("<area href=\"a.xhtml\"/>"));
        assert!(result.content.contains("<img src=\"a.png\"/>"));
        assert!(result.content.contains("<p alt=\"x\">y</p>"));
    }

    #[test]
    fn test_keeps_human_body_id() {
        let result = reserialize("c.xhtml", "<html><body id=\"chapter-1\"><p>x</body></html>");
        assert!(result.content.contains("<body id=\"chapter-1\">"));
    }

    #[test]
    fn test_xml_name() {
        assert!(is_xml_name("xml:lang"));
        assert!(is_xml_name("data-x"));
        assert!(!is_xml_name("1abc"));
        assert!(!is_xml_name("a\"b"));
        assert!(!is_xml_name(""));
    }
}

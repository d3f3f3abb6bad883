//! XML辅助模块
//!
//! 提供严格的格式良好性检查，以及基于quick-xml事件流的改写工具。
//! 改写时未被修改的事件会原样写回，从而保留原文件的格式。

use crate::epub::error::Result;
use quick_xml::escape::{resolve_html5_entity, resolve_xml_entity};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::{NsReader, Reader};
use quick_xml::writer::Writer;

/// Dublin Core元素的命名空间
pub const DC_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";

/// XHTML命名空间
pub const XHTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// 浏览器会为其解析HTML命名实体的DTD公共标识符前缀
const XHTML_PUBLIC_IDS: &[&str] = &[
    "-//W3C//DTD XHTML",
    "-//W3C//DTD MathML",
    "-//WAPFORUM//DTD XHTML Mobile",
];

/// 检查文本是否为格式良好的XML文档
///
/// 与浏览器的严格XML解析器一致：标签必须正确嵌套、只能有一个根元素、
/// 实体必须已定义、命名空间前缀必须已声明。
/// DOCTYPE带有XHTML公共标识符时，`&nbsp;` 等HTML命名实体视为已定义。
pub fn is_well_formed(content: &str) -> bool {
    check_well_formed(content).unwrap_or(false)
}

fn check_well_formed(content: &str) -> Result<bool> {
    let mut reader = NsReader::from_str(content);
    reader.config_mut().check_end_names = true;

    let mut depth = 0usize;
    let mut roots = 0usize;
    let mut html_entities = false;

    loop {
        let (ns, event) = reader.read_resolved_event()?;
        let unbound = matches!(ns, ResolveResult::Unknown(_));

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                if unbound {
                    return Ok(false);
                }
                if depth == 0 {
                    roots += 1;
                    if roots > 1 {
                        return Ok(false);
                    }
                }
                for attr in e.attributes() {
                    let attr = attr?;
                    attr.unescape_value_with(move |entity| resolve_entity(html_entities, entity))?;
                    let needs_binding = match attr.key.prefix() {
                        Some(prefix) => !matches!(prefix.as_ref(), b"xml" | b"xmlns"),
                        None => false,
                    };
                    if needs_binding {
                        let (resolved, _) = reader.resolve_attribute(attr.key);
                        if matches!(resolved, ResolveResult::Unknown(_)) {
                            return Ok(false);
                        }
                    }
                }
                if matches!(event, Event::Start(_)) {
                    depth += 1;
                }
            }
            Event::End(_) => {
                if depth == 0 {
                    return Ok(false);
                }
                depth -= 1;
            }
            Event::DocType(ref e) => {
                html_entities = declares_xhtml_dtd(&String::from_utf8_lossy(e));
            }
            Event::Text(ref e) => {
                let text = e.unescape_with(move |entity| resolve_entity(html_entities, entity))?;
                if depth == 0 && !text.trim().is_empty() {
                    return Ok(false);
                }
            }
            Event::CData(_) if depth == 0 => return Ok(false),
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(depth == 0 && roots == 1)
}

fn declares_xhtml_dtd(doctype: &str) -> bool {
    XHTML_PUBLIC_IDS.iter().any(|id| doctype.contains(id))
}

fn resolve_entity(html_entities: bool, entity: &str) -> Option<&'static str> {
    if html_entities {
        resolve_html5_entity(entity)
    } else {
        resolve_xml_entity(entity)
    }
}

/// 基于事件流的XML改写器
///
/// 读取原文档的事件，由调用者决定原样写回、替换或丢弃。
pub struct XmlRewriter<'a> {
    reader: Reader<&'a [u8]>,
    writer: Writer<Vec<u8>>,
}

impl<'a> XmlRewriter<'a> {
    /// 创建新的改写器
    pub fn new(content: &'a str) -> Self {
        let mut reader = Reader::from_str(content);
        reader.config_mut().check_end_names = true;
        Self {
            reader,
            writer: Writer::new(Vec::with_capacity(content.len())),
        }
    }

    /// 读取下一个事件
    pub fn next(&mut self) -> Result<Event<'a>> {
        Ok(self.reader.read_event()?)
    }

    /// 写入一个事件
    pub fn write(&mut self, event: Event<'_>) -> Result<()> {
        self.writer.write_event(event)?;
        Ok(())
    }

    /// 跳过当前开始标签对应的整个元素（包括其内容和结束标签）
    pub fn skip_element(&mut self, start: &BytesStart<'_>) -> Result<()> {
        self.reader.read_to_end(start.name())?;
        Ok(())
    }

    /// 结束改写并返回新的文档内容
    pub fn finish(self) -> Result<String> {
        Ok(String::from_utf8(self.writer.into_inner())?)
    }
}

/// 读取元素的属性值（按完整的限定名匹配）
pub fn attribute(e: &BytesStart<'_>, name: &str) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == name.as_bytes() {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// 读取元素的属性值（按本地名匹配，忽略命名空间前缀）
pub fn local_attribute(e: &BytesStart<'_>, local: &str) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == local.as_bytes() {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// 复制元素并设置属性：已存在则替换其值，否则追加到末尾
pub fn with_attribute(e: &BytesStart<'_>, name: &str, value: &str) -> Result<BytesStart<'static>> {
    let mut out = BytesStart::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    let mut replaced = false;
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == name.as_bytes() {
            out.push_attribute((name, value));
            replaced = true;
        } else {
            out.push_attribute(attr);
        }
    }
    if !replaced {
        out.push_attribute((name, value));
    }
    Ok(out)
}

/// 在文档中查找Dublin Core命名空间绑定的前缀
///
/// 返回 `Some(prefix)` 表示命名空间已通过 `xmlns:prefix` 声明；
/// 返回 `Some("")` 表示它是默认命名空间；未声明时返回 `None`。
pub fn dublin_core_prefix(content: &str) -> Option<String> {
    let mut reader = Reader::from_str(content);
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                for attr in e.attributes().flatten() {
                    if attr.value.as_ref() != DC_NAMESPACE.as_bytes() {
                        continue;
                    }
                    let key = attr.key.as_ref();
                    if key == b"xmlns" {
                        return Some(String::new());
                    }
                    if let Some(prefix) = key.strip_prefix(b"xmlns:") {
                        return Some(String::from_utf8_lossy(prefix).into_owned());
                    }
                }
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

/// 创建Dublin Core元素的开始标签
///
/// `prefix` 为 [`dublin_core_prefix`] 的结果；命名空间未声明时使用 `dc` 前缀并在元素上声明。
pub fn dublin_core_start(prefix: Option<&str>, local: &str) -> BytesStart<'static> {
    match prefix {
        Some(prefix) => BytesStart::new(qualified(prefix, local)),
        None => {
            let mut start = BytesStart::new(qualified("dc", local));
            start.push_attribute(("xmlns:dc", DC_NAMESPACE));
            start
        }
    }
}

/// 根据前缀生成限定名
pub fn qualified(prefix: &str, local: &str) -> String {
    if prefix.is_empty() {
        local.to_string()
    } else {
        format!("{}:{}", prefix, local)
    }
}

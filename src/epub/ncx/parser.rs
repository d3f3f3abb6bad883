//! NCX解析器模块
//!
//! 提供NCX（Navigation Control file for XML）文件的XML解析功能。

use crate::epub::error::{EpubError, Result};
use crate::epub::ncx::{DocTitle, NavContent, NavLabel, NavMap, NavPoint};
use crate::epub::xml;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

/// NCX文件解析结果
#[derive(Debug, Clone)]
pub struct Ncx {
    /// NCX版本
    pub version: String,
    /// 唯一标识符（dtb:uid）
    pub uid: Option<String>,
    /// 文档标题
    pub doc_title: Option<DocTitle>,
    /// 导航地图，保持文档顺序
    pub nav_map: NavMap,
}

impl Ncx {
    /// 解析NCX文件内容
    ///
    /// # 参数
    /// * `xml_content` - NCX文件的XML内容
    ///
    /// # 返回值
    /// * `Result<Ncx, EpubError>` - 解析后的NCX信息
    pub fn parse_xml(xml_content: &str) -> Result<Ncx> {
        if !xml::is_well_formed(xml_content) {
            return Err(EpubError::NcxParseError("NCX文件不是格式良好的XML".to_string()));
        }

        let mut reader = Reader::from_str(xml_content);
        reader.config_mut().expand_empty_elements = true;

        let mut version = String::new();
        let mut uid = None;
        let mut doc_title = None;
        let mut nav_map = NavMap::new();

        let mut buf = Vec::new();
        let mut text_content = String::new();
        let mut in_doc_title = false;
        let mut in_nav_label = false;

        // 尚未闭合的导航点，栈顶为当前导航点
        let mut nav_point_stack: Vec<NavPoint> = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(ref e) => {
                    match e.local_name().as_ref() {
                        b"ncx" => {
                            version = xml::local_attribute(e, "version")?.unwrap_or_default();
                        }
                        b"meta" => {
                            Self::parse_meta_element(e, &mut uid)?;
                        }
                        b"docTitle" => {
                            in_doc_title = true;
                        }
                        b"navPoint" => {
                            let id = xml::local_attribute(e, "id")?.unwrap_or_default();
                            let play_order = xml::local_attribute(e, "playOrder")?;
                            nav_point_stack.push(NavPoint::new(id, play_order));
                        }
                        b"navLabel" => {
                            in_nav_label = true;
                        }
                        b"content" => {
                            if let Some(nav_point) = nav_point_stack.last_mut() {
                                let src = xml::local_attribute(e, "src")?.unwrap_or_default();
                                nav_point.content = NavContent::new(src);
                            }
                        }
                        _ => {}
                    }
                    text_content.clear();
                }
                Event::End(ref e) => match e.local_name().as_ref() {
                    b"text" if in_doc_title => {
                        doc_title = Some(DocTitle::new(text_content.trim().to_string()));
                    }
                    b"text" if in_nav_label => {
                        if let Some(nav_point) = nav_point_stack.last_mut() {
                            nav_point.nav_label = NavLabel::new(text_content.trim().to_string());
                        }
                    }
                    b"docTitle" => in_doc_title = false,
                    b"navLabel" => in_nav_label = false,
                    b"navPoint" => {
                        if let Some(nav_point) = nav_point_stack.pop() {
                            match nav_point_stack.last_mut() {
                                Some(parent) => parent.add_child(nav_point),
                                None => nav_map.add_nav_point(nav_point),
                            }
                        }
                    }
                    _ => {}
                },
                Event::Text(e) => {
                    text_content.push_str(&e.unescape()?);
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(Ncx {
            version,
            uid,
            doc_title,
            nav_map,
        })
    }

    /// 解析meta元素，只关心dtb:uid
    fn parse_meta_element(e: &BytesStart<'_>, uid: &mut Option<String>) -> Result<()> {
        if xml::local_attribute(e, "name")?.as_deref() == Some("dtb:uid") {
            *uid = xml::local_attribute(e, "content")?;
        }
        Ok(())
    }

    /// 获取文档标题文本
    pub fn get_title(&self) -> Option<&str> {
        self.doc_title.as_ref().map(|title| title.text.as_str())
    }

    /// 获取所有导航点的平铺列表（文档顺序）
    pub fn get_all_nav_points(&self) -> Vec<&NavPoint> {
        self.nav_map.get_all_nav_points()
    }

    /// 所有导航点的playOrder是否已经是1..N的顺序
    pub fn has_sequential_play_order(&self) -> bool {
        self.nav_map.is_sequential()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_NCX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content="urn:uuid:1234"/>
    <meta name="dtb:depth" content="2"/>
  </head>
  <docTitle><text>Sample Book</text></docTitle>
  <navMap>
    <navPoint id="p1" playOrder="3">
      <navLabel><text>Chapter 1</text></navLabel>
      <content src="text/ch1.xhtml"/>
      <navPoint id="p1a" playOrder="1">
        <navLabel><text>Section 1.1</text></navLabel>
        <content src="text/ch1.xhtml#s1"/>
      </navPoint>
    </navPoint>
    <navPoint id="p2">
      <navLabel><text>Chapter 2</text></navLabel>
      <content src="text/ch2.xhtml"/>
    </navPoint>
  </navMap>
</ncx>"#;

    #[test]
    fn test_parse_ncx_keeps_document_order() {
        let ncx = Ncx::parse_xml(SAMPLE_NCX).unwrap();
        assert_eq!(ncx.version, "2005-1");
        assert_eq!(ncx.uid.as_deref(), Some("urn:uuid:1234"));
        assert_eq!(ncx.get_title(), Some("Sample Book"));

        let points = ncx.get_all_nav_points();
        let ids: Vec<&str> = points.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p1a", "p2"]);
        assert_eq!(points[0].nav_label.text, "Chapter 1");
        assert_eq!(points[1].content.src, "text/ch1.xhtml#s1");
        assert_eq!(points[2].play_order, None);
        assert!(!ncx.has_sequential_play_order());
    }

    #[test]
    fn test_sequential_ncx() {
        let ncx_xml = r#"<ncx><navMap>
<navPoint id="a" playOrder="1"><navLabel><text>A</text></navLabel><content src="a.xhtml"/></navPoint>
<navPoint id="b" playOrder="2"><navLabel><text>B</text></navLabel><content src="b.xhtml"/></navPoint>
</navMap></ncx>"#;
        let ncx = Ncx::parse_xml(ncx_xml).unwrap();
        assert!(ncx.has_sequential_play_order());
    }

    #[test]
    fn test_malformed_ncx() {
        let result = Ncx::parse_xml("<ncx><navMap></ncx>");
        assert!(matches!(result, Err(EpubError::NcxParseError(_))));
    }
}

//! OPF解析器模块
//!
//! 提供OPF（Open Packaging Format）文件的XML解析功能。

use crate::epub::error::{EpubError, Result};
use crate::epub::opf::{
    manifest::ManifestItem,
    metadata::{Identifier, Meta, Metadata},
};
use crate::epub::xml;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

/// OPF文件解析结果
#[derive(Debug, Clone)]
pub struct Package {
    /// EPUB版本
    pub version: String,
    /// package元素的unique-identifier属性，空值视为不存在
    pub unique_identifier: Option<String>,
    /// 元数据
    pub metadata: Metadata,
    /// 是否存在metadata元素
    pub has_metadata_element: bool,
    /// 清单项，按文档顺序
    pub manifest: Vec<ManifestItem>,
}

impl Package {
    /// 解析OPF文件内容
    ///
    /// 文档必须是格式良好的XML，且根元素为 `package`。
    ///
    /// # 参数
    /// * `xml_content` - OPF文件的XML内容
    ///
    /// # 返回值
    /// * `Result<Package, EpubError>` - 解析后的包信息
    pub fn parse_xml(xml_content: &str) -> Result<Package> {
        if !xml::is_well_formed(xml_content) {
            return Err(EpubError::OpfParseError("OPF文件不是格式良好的XML".to_string()));
        }

        let mut reader = Reader::from_str(xml_content);
        reader.config_mut().expand_empty_elements = true;

        let mut package = Package {
            version: String::new(),
            unique_identifier: None,
            metadata: Metadata::new(),
            has_metadata_element: false,
            manifest: Vec::new(),
        };

        let mut buf = Vec::new();
        let mut seen_root = false;
        let mut in_metadata = false;
        let mut in_manifest = false;
        let mut text_content = String::new();
        let mut pending_identifier_id: Option<Option<String>> = None;
        let mut in_language = false;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(ref e) => {
                    let local_name_bytes = e.local_name();
                    let local_name = String::from_utf8_lossy(local_name_bytes.as_ref());

                    if !seen_root {
                        seen_root = true;
                        if local_name != "package" {
                            return Err(EpubError::OpfParseError(format!(
                                "根元素应为package，实际为{}",
                                local_name
                            )));
                        }
                        Self::parse_package_attributes(e, &mut package)?;
                    }

                    match local_name.as_ref() {
                        "metadata" => {
                            in_metadata = true;
                            package.has_metadata_element = true;
                        }
                        "manifest" => {
                            in_manifest = true;
                        }
                        "identifier" if in_metadata => {
                            let id = xml::attribute(e, "id")?.filter(|id| !id.is_empty());
                            pending_identifier_id = Some(id);
                        }
                        "language" if in_metadata => {
                            in_language = true;
                        }
                        "meta" => {
                            package.metadata.metas.push(Self::parse_meta(e)?);
                        }
                        "item" if in_manifest => {
                            Self::parse_manifest_item(e, &mut package.manifest)?;
                        }
                        _ => {}
                    }
                    text_content.clear();
                }
                Event::End(ref e) => {
                    let local_name_bytes = e.local_name();
                    match local_name_bytes.as_ref() {
                        b"metadata" => in_metadata = false,
                        b"manifest" => in_manifest = false,
                        b"identifier" => {
                            if let Some(id) = pending_identifier_id.take() {
                                package.metadata.identifiers.push(Identifier {
                                    id,
                                    value: text_content.trim().to_string(),
                                });
                            }
                        }
                        b"language" if in_language => {
                            package.metadata.languages.push(text_content.trim().to_string());
                            in_language = false;
                        }
                        _ => {}
                    }
                }
                Event::Text(e) => {
                    text_content.push_str(&e.unescape()?);
                }
                Event::CData(e) => {
                    text_content.push_str(&String::from_utf8_lossy(&e));
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(package)
    }

    /// 解析package元素的version和unique-identifier属性
    fn parse_package_attributes(e: &BytesStart<'_>, package: &mut Package) -> Result<()> {
        for attr_result in e.attributes() {
            let attr = attr_result?;
            match attr.key.local_name().as_ref() {
                b"version" => {
                    package.version = attr.unescape_value()?.into_owned();
                }
                b"unique-identifier" => {
                    let value = attr.unescape_value()?.into_owned();
                    package.unique_identifier = Some(value).filter(|v| !v.is_empty());
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// 解析meta标签的属性
    fn parse_meta(e: &BytesStart<'_>) -> Result<Meta> {
        let mut meta = Meta {
            name: None,
            content: None,
        };
        for attr_result in e.attributes() {
            let attr = attr_result?;
            let value = Some(attr.unescape_value()?.into_owned());
            match attr.key.local_name().as_ref() {
                b"name" => meta.name = value,
                b"content" => meta.content = value,
                _ => {}
            }
        }
        Ok(meta)
    }

    /// 解析清单项
    fn parse_manifest_item(e: &BytesStart<'_>, manifest: &mut Vec<ManifestItem>) -> Result<()> {
        let mut item = ManifestItem::new(String::new(), String::new(), String::new());

        for attr_result in e.attributes() {
            let attr = attr_result?;
            match attr.key.local_name().as_ref() {
                b"id" => {
                    item.id = attr.unescape_value()?.into_owned();
                }
                b"href" => {
                    item.href = attr.unescape_value()?.into_owned();
                }
                b"media-type" => {
                    item.media_type = attr.unescape_value()?.into_owned();
                }
                _ => {}
            }
        }

        manifest.push(item);
        Ok(())
    }

    /// 获取清单中第一个NCX文件的href
    pub fn ncx_href(&self) -> Option<&str> {
        self.manifest
            .iter()
            .find(|item| item.is_ncx())
            .map(|item| item.href.as_str())
    }

    /// unique-identifier属性是否指向一个存在的标识符
    pub fn unique_identifier_resolves(&self) -> bool {
        self.unique_identifier
            .as_deref()
            .is_some_and(|id| self.metadata.identifier_by_id(id).is_some())
    }
}

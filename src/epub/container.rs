use crate::epub::error::{EpubError, Result};
use quick_xml::events::Event;
use quick_xml::reader::Reader;

/// container.xml在压缩包中的固定路径
pub const CONTAINER_PATH: &str = "META-INF/container.xml";

/// OPF包文件的媒体类型
pub const PACKAGE_MEDIA_TYPE: &str = "application/oebps-package+xml";

/// Container.xml中的rootfile信息
#[derive(Debug, Clone)]
pub struct RootFile {
    pub full_path: String,
    pub media_type: String,
}

/// Container.xml的解析结果
#[derive(Debug, Clone)]
pub struct Container {
    pub rootfiles: Vec<RootFile>,
}

impl Container {
    /// 解析container.xml内容
    ///
    /// # 参数
    /// * `xml_content` - container.xml的文件内容
    ///
    /// # 返回值
    /// * `Result<Container, EpubError>` - 解析后的Container信息
    pub fn parse_xml(xml_content: &str) -> Result<Container> {
        let mut reader = Reader::from_str(xml_content);
        reader.config_mut().trim_text(true);
        reader.config_mut().expand_empty_elements = true;

        let mut rootfiles = Vec::new();
        let mut buf = Vec::new();
        let mut in_rootfiles = false;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(ref e) | Event::Empty(ref e) => match e.local_name().as_ref() {
                    b"rootfiles" => {
                        in_rootfiles = true;
                    }
                    b"rootfile" if in_rootfiles => {
                        let mut full_path = String::new();
                        let mut media_type = String::new();

                        for attr_result in e.attributes() {
                            let attr = attr_result?;
                            match attr.key.local_name().as_ref() {
                                b"full-path" => {
                                    full_path = attr.unescape_value()?.into_owned();
                                }
                                b"media-type" => {
                                    media_type = attr.unescape_value()?.into_owned();
                                }
                                _ => {}
                            }
                        }

                        if !full_path.is_empty() {
                            rootfiles.push(RootFile { full_path, media_type });
                        }
                    }
                    _ => {}
                },
                Event::End(ref e) => {
                    if e.local_name().as_ref() == b"rootfiles" {
                        in_rootfiles = false;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if rootfiles.is_empty() {
            return Err(EpubError::ContainerParseError("没有找到任何rootfile条目".to_string()));
        }

        Ok(Container { rootfiles })
    }

    /// 获取OPF包文件路径
    ///
    /// 只接受媒体类型为 `application/oebps-package+xml` 的第一个rootfile，
    /// 其他类型的rootfile不会被当作包文件。
    pub fn get_opf_path(&self) -> Option<String> {
        self.rootfiles
            .iter()
            .find(|rootfile| rootfile.media_type == PACKAGE_MEDIA_TYPE)
            .map(|rootfile| rootfile.full_path.clone())
    }
}

use std::io::{Cursor, Read, Write};

use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::epub::container::{CONTAINER_PATH, Container};
use crate::epub::error::{EpubError, Result};
use crate::epub::ncx::Ncx;
use crate::epub::opf::Package;

/// mimetype成员的固定路径
pub const MIMETYPE_PATH: &str = "mimetype";

/// 以文本形式保存的文件扩展名
const TEXT_EXTENSIONS: &[&str] = &["html", "xhtml", "htm", "xml", "svg", "css", "opf", "ncx"];

/// 内容文档的文件扩展名
const CONTENT_EXTENSIONS: &[&str] = &["html", "xhtml", "htm"];

/// 内存中的EPUB压缩包
///
/// 成员分为文本成员（XML/HTML/CSS，已解码为字符串）和二进制成员（图片、字体等）。
/// 同一路径只会出现在其中一类，两类都保持原压缩包中的顺序。
#[derive(Debug, Clone, Default)]
pub struct EpubArchive {
    text_members: Vec<(String, String)>,
    binary_members: Vec<(String, Vec<u8>)>,
}

impl EpubArchive {
    /// 创建空的压缩包模型
    pub fn new() -> Self {
        Self::default()
    }

    /// 从压缩包字节加载
    ///
    /// # 参数
    /// * `bytes` - EPUB文件的完整内容
    ///
    /// # 返回值
    /// * `Result<EpubArchive, EpubError>` - 无法作为zip打开时返回 `ArchiveRead`
    pub fn load(bytes: &[u8]) -> Result<EpubArchive> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut model = EpubArchive::new();

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let mut buffer = Vec::new();
            file.read_to_end(&mut buffer)?;

            if is_text_path(&name) {
                match String::from_utf8(buffer) {
                    Ok(text) => model.set(&name, text),
                    Err(err) => {
                        warn!("{} 不是有效的UTF-8文本，按二进制保留", name);
                        model.set_binary(&name, err.into_bytes());
                    }
                }
            } else {
                model.set_binary(&name, buffer);
            }
        }

        debug!(
            "加载EPUB完成: {} 个文本成员, {} 个二进制成员",
            model.text_members.len(),
            model.binary_members.len()
        );
        Ok(model)
    }

    /// 序列化为压缩包字节
    ///
    /// mimetype总是第一个写入且不压缩，随后依次写入文本成员和二进制成员。
    pub fn save(&self) -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let stored = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .last_modified_time(DateTime::default());
        let deflated = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default());

        if let Some(mimetype) = self.get(MIMETYPE_PATH) {
            writer
                .start_file(MIMETYPE_PATH, stored)
                .map_err(EpubError::ArchiveWrite)?;
            writer.write_all(mimetype.as_bytes())?;
        }

        for (path, text) in &self.text_members {
            if path == MIMETYPE_PATH {
                continue;
            }
            writer
                .start_file(path.as_str(), deflated)
                .map_err(EpubError::ArchiveWrite)?;
            writer.write_all(text.as_bytes())?;
        }

        for (path, bytes) in &self.binary_members {
            writer
                .start_file(path.as_str(), deflated)
                .map_err(EpubError::ArchiveWrite)?;
            writer.write_all(bytes)?;
        }

        let cursor = writer.finish().map_err(EpubError::ArchiveWrite)?;
        Ok(cursor.into_inner())
    }

    /// 获取文本成员的内容
    pub fn get(&self, path: &str) -> Option<&str> {
        self.text_members
            .iter()
            .find(|(name, _)| name == path)
            .map(|(_, text)| text.as_str())
    }

    /// 获取二进制成员的内容
    pub fn get_binary(&self, path: &str) -> Option<&[u8]> {
        self.binary_members
            .iter()
            .find(|(name, _)| name == path)
            .map(|(_, bytes)| bytes.as_slice())
    }

    /// 设置文本成员，路径不存在时追加到末尾
    pub fn set(&mut self, path: &str, content: impl Into<String>) {
        let content = content.into();
        self.binary_members.retain(|(name, _)| name != path);
        match self.text_members.iter_mut().find(|(name, _)| name == path) {
            Some((_, text)) => *text = content,
            None => self.text_members.push((path.to_string(), content)),
        }
    }

    /// 设置二进制成员，路径不存在时追加到末尾
    pub fn set_binary(&mut self, path: &str, content: Vec<u8>) {
        self.text_members.retain(|(name, _)| name != path);
        match self.binary_members.iter_mut().find(|(name, _)| name == path) {
            Some((_, bytes)) => *bytes = content,
            None => self.binary_members.push((path.to_string(), content)),
        }
    }

    /// 是否包含指定路径的成员
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some() || self.get_binary(path).is_some()
    }

    /// 所有成员路径：先文本成员，后二进制成员
    pub fn paths(&self) -> Vec<String> {
        self.text_paths()
            .into_iter()
            .chain(self.binary_members.iter().map(|(name, _)| name.clone()))
            .collect()
    }

    /// 所有文本成员路径
    pub fn text_paths(&self) -> Vec<String> {
        self.text_members.iter().map(|(name, _)| name.clone()).collect()
    }

    /// 所有内容文档（HTML/XHTML）的路径
    pub fn content_paths(&self) -> Vec<String> {
        self.text_members
            .iter()
            .map(|(name, _)| name)
            .filter(|name| is_content_path(name))
            .cloned()
            .collect()
    }

    /// 所有样式表的路径
    pub fn stylesheet_paths(&self) -> Vec<String> {
        self.text_members
            .iter()
            .map(|(name, _)| name)
            .filter(|name| extension(name).as_deref() == Some("css"))
            .cloned()
            .collect()
    }

    /// 解析container.xml
    pub fn container(&self) -> Result<Container> {
        let content = self.get(CONTAINER_PATH).ok_or_else(|| {
            EpubError::ContainerParseError(format!("缺少{}", CONTAINER_PATH))
        })?;
        Container::parse_xml(content)
    }

    /// 获取OPF包文件路径
    ///
    /// 找不到或无法解析container.xml时返回None，不会报错。
    pub fn package_path(&self) -> Option<String> {
        match self.container() {
            Ok(container) => container.get_opf_path(),
            Err(e) => {
                debug!("无法定位OPF文件: {}", e);
                None
            }
        }
    }

    /// 获取OPF包文件的路径和内容
    pub fn package_source(&self) -> Result<(String, &str)> {
        let path = self.package_path().ok_or_else(|| {
            EpubError::DescriptorNotFound("container.xml中没有包文件条目".to_string())
        })?;
        let content = self
            .get(&path)
            .ok_or_else(|| EpubError::DescriptorNotFound(path.clone()))?;
        Ok((path, content))
    }

    /// 解析OPF包文件
    pub fn package(&self) -> Result<Package> {
        let (_, content) = self.package_source()?;
        Package::parse_xml(content)
    }

    /// 获取NCX导航文件路径
    ///
    /// 优先使用OPF清单中的NCX条目（相对于OPF所在目录解析），
    /// 其次使用任意以 `.ncx` 结尾的成员。没有可用的OPF时返回None。
    pub fn ncx_path(&self) -> Option<String> {
        let opf_path = self.package_path()?;
        let content = self.get(&opf_path)?;
        let package = match Package::parse_xml(content) {
            Ok(package) => package,
            Err(e) => {
                debug!("无法解析OPF文件 {}: {}", opf_path, e);
                return None;
            }
        };

        if let Some(href) = package.ncx_href() {
            return Some(resolve_href(directory_of(&opf_path), href));
        }

        self.paths().into_iter().find(|path| path.ends_with(".ncx"))
    }

    /// 解析NCX导航文件
    pub fn ncx(&self) -> Result<(String, Ncx)> {
        let path = self
            .ncx_path()
            .ok_or_else(|| EpubError::NcxParseError("没有找到NCX文件".to_string()))?;
        let content = self
            .get(&path)
            .ok_or_else(|| EpubError::NcxParseError(format!("缺少{}", path)))?;
        let ncx = Ncx::parse_xml(content)?;
        Ok((path, ncx))
    }
}

/// 小写的文件扩展名
fn extension(path: &str) -> Option<String> {
    let file_name = basename(path);
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

/// 成员是否以文本形式保存
pub fn is_text_path(path: &str) -> bool {
    path == MIMETYPE_PATH
        || extension(path).is_some_and(|ext| TEXT_EXTENSIONS.contains(&ext.as_str()))
}

/// 成员是否为内容文档（HTML/XHTML）
pub fn is_content_path(path: &str) -> bool {
    extension(path).is_some_and(|ext| CONTENT_EXTENSIONS.contains(&ext.as_str()))
}

/// 路径中的文件名部分
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// 路径所在目录，根目录下的文件返回空字符串
pub fn directory_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// 将相对路径按基准目录解析为压缩包内的完整路径
///
/// 会去掉片段标识符，并处理 `.` 和 `..` 路径段。
pub fn resolve_href(base_dir: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or(href);
    let mut segments: Vec<&str> = if href.starts_with('/') {
        Vec::new()
    } else {
        base_dir.split('/').filter(|s| !s.is_empty()).collect()
    };

    for segment in href.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    segments.join("/")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub const CONTAINER_XML: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
    <rootfiles>
        <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
    </rootfiles>
</container>"#;

    pub const OPF_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package version="2.0" xmlns="http://www.idpf.org/2007/opf" unique-identifier="BookId">
    <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
        <dc:title>测试书籍</dc:title>
        <dc:language>zh-CN</dc:language>
        <dc:identifier id="BookId">urn:uuid:7d3b6a1c</dc:identifier>
    </metadata>
    <manifest>
        <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
        <item id="chapter1" href="text/chapter1.xhtml" media-type="application/xhtml+xml"/>
    </manifest>
    <spine toc="ncx">
        <itemref idref="chapter1"/>
    </spine>
</package>"#;

    /// 创建测试用的EPUB字节
    pub fn build_epub(members: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in members {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    fn sample_archive() -> EpubArchive {
        let bytes = build_epub(&[
            ("OEBPS/images/cover.jpg", &[0xFF, 0xD8, 0xFF, 0xE0][..]),
            ("mimetype", "application/epub+zip".as_bytes()),
            ("META-INF/container.xml", CONTAINER_XML.as_bytes()),
            ("OEBPS/content.opf", OPF_XML.as_bytes()),
            ("OEBPS/toc.ncx", "<ncx><navMap/></ncx>".as_bytes()),
            ("OEBPS/text/chapter1.xhtml", "<html><body/></html>".as_bytes()),
            ("OEBPS/style/main.CSS", "p { margin: 0; }".as_bytes()),
        ]);
        EpubArchive::load(&bytes).unwrap()
    }

    #[test]
    fn test_load_classifies_members() {
        let archive = sample_archive();
        assert_eq!(archive.get("mimetype"), Some("application/epub+zip"));
        assert!(archive.get("OEBPS/images/cover.jpg").is_none());
        assert_eq!(archive.get_binary("OEBPS/images/cover.jpg"), Some(&[0xFF, 0xD8, 0xFF, 0xE0][..]));
        assert_eq!(archive.content_paths(), vec!["OEBPS/text/chapter1.xhtml".to_string()]);
        assert_eq!(archive.stylesheet_paths(), vec!["OEBPS/style/main.CSS".to_string()]);
    }

    #[test]
    fn test_load_rejects_non_zip() {
        let result = EpubArchive::load(b"definitely not a zip file");
        assert!(matches!(result, Err(EpubError::ArchiveRead(_))));
    }

    #[test]
    fn test_invalid_utf8_text_member_is_kept_as_binary() {
        let bytes = build_epub(&[
            ("mimetype", "application/epub+zip".as_bytes()),
            ("bad.xhtml", &[0xFF, 0xFE, 0x00][..]),
        ]);
        let archive = EpubArchive::load(&bytes).unwrap();
        assert!(archive.get("bad.xhtml").is_none());
        assert_eq!(archive.get_binary("bad.xhtml"), Some(&[0xFF, 0xFE, 0x00][..]));
    }

    #[test]
    fn test_save_writes_mimetype_first_and_stored() {
        let archive = sample_archive();
        let saved = archive.save().unwrap();

        let mut zip = ZipArchive::new(Cursor::new(saved)).unwrap();
        let first = zip.by_index(0).unwrap();
        assert_eq!(first.name(), "mimetype");
        assert_eq!(first.compression(), CompressionMethod::Stored);
        drop(first);

        let names: Vec<String> = (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names.last().map(String::as_str), Some("OEBPS/images/cover.jpg"));
        assert_eq!(names.len(), 7);
    }

    #[test]
    fn test_save_is_deterministic() {
        let archive = sample_archive();
        assert_eq!(archive.save().unwrap(), archive.save().unwrap());
    }

    #[test]
    fn test_set_moves_member_between_kinds() {
        let mut archive = EpubArchive::new();
        archive.set_binary("a.css", vec![1, 2, 3]);
        archive.set("a.css", "body {}");
        assert_eq!(archive.get("a.css"), Some("body {}"));
        assert!(archive.get_binary("a.css").is_none());
        assert_eq!(archive.paths(), vec!["a.css".to_string()]);
    }

    #[test]
    fn test_document_accessors() {
        let archive = sample_archive();
        assert_eq!(archive.package_path(), Some("OEBPS/content.opf".to_string()));
        assert_eq!(archive.ncx_path(), Some("OEBPS/toc.ncx".to_string()));
        assert_eq!(archive.package().unwrap().version, "2.0");
    }

    #[test]
    fn test_accessors_tolerate_missing_files() {
        let archive = EpubArchive::new();
        assert_eq!(archive.package_path(), None);
        assert_eq!(archive.ncx_path(), None);
        assert!(matches!(archive.package(), Err(EpubError::DescriptorNotFound(_))));
    }

    #[test]
    fn test_ncx_fallback_scan() {
        let mut archive = EpubArchive::new();
        archive.set("META-INF/container.xml", CONTAINER_XML);
        archive.set(
            "OEBPS/content.opf",
            r#"<package version="2.0" unique-identifier="id"><metadata/><manifest/></package>"#,
        );
        archive.set("OEBPS/nav/book.ncx", "<ncx/>");
        assert_eq!(archive.ncx_path(), Some("OEBPS/nav/book.ncx".to_string()));
    }

    #[test]
    fn test_resolve_href() {
        assert_eq!(resolve_href("OEBPS", "toc.ncx"), "OEBPS/toc.ncx");
        assert_eq!(resolve_href("", "toc.ncx"), "toc.ncx");
        assert_eq!(resolve_href("OEBPS/text", "../toc.ncx#x"), "OEBPS/toc.ncx");
        assert_eq!(resolve_href("OEBPS", "./nav/./toc.ncx"), "OEBPS/nav/toc.ncx");
        assert_eq!(basename("OEBPS/text/a.xhtml"), "a.xhtml");
        assert_eq!(directory_of("content.opf"), "");
    }
}

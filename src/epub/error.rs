use std::io;
use std::string::FromUtf8Error;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EpubError>;

/// Epub相关的错误类型
#[derive(Error, Debug)]
pub enum EpubError {
    #[error("IO错误: {0}")]
    Io(#[from] io::Error),

    #[error("无法读取EPUB压缩包: {0}")]
    ArchiveRead(#[from] zip::result::ZipError),

    #[error("无法写入EPUB压缩包: {0}")]
    ArchiveWrite(#[source] zip::result::ZipError),

    #[error("XML解析错误: {0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("UTF-8编码错误: {0}")]
    Utf8(#[from] FromUtf8Error),

    #[error("container.xml解析错误: {0}")]
    ContainerParseError(String),

    #[error("找不到包描述文件: {0}")]
    DescriptorNotFound(String),

    #[error("OPF文件解析错误: {0}")]
    OpfParseError(String),

    #[error("NCX文件解析错误: {0}")]
    NcxParseError(String),

    #[error("配置文件错误: {0}")]
    ConfigError(String),
}

impl From<quick_xml::events::attributes::AttrError> for EpubError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        EpubError::XmlError(quick_xml::Error::InvalidAttr(err))
    }
}

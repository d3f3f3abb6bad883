//! 清单模块
//!
//! 提供EPUB包中文件清单的结构定义。

/// NCX导航文件的媒体类型
pub const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";

/// 清单项信息
#[derive(Debug, Clone)]
pub struct ManifestItem {
    /// 项目ID
    pub id: String,
    /// 文件路径(相对于OPF文件)
    pub href: String,
    /// 媒体类型
    pub media_type: String,
}

impl ManifestItem {
    /// 创建新的清单项
    pub fn new(id: String, href: String, media_type: String) -> Self {
        Self {
            id,
            href,
            media_type,
        }
    }

    /// 检查是否为NCX导航文件
    pub fn is_ncx(&self) -> bool {
        self.media_type == NCX_MEDIA_TYPE && !self.href.is_empty()
    }
}

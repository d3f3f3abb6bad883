pub mod archive;
pub mod container;
pub mod error;
pub mod ncx;
pub mod opf;
pub mod xml;

// 重新导出错误处理
pub use error::{EpubError, Result};

// 重新导出压缩包模型
pub use archive::{EpubArchive, MIMETYPE_PATH};

// 重新导出容器相关
pub use container::{CONTAINER_PATH, Container, RootFile};

// 重新导出OPF相关
pub use opf::{Identifier, ManifestItem, Meta, Metadata, Package};

// 重新导出NCX相关
pub use ncx::{DocTitle, NavMap, NavPoint, Ncx};

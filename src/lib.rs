pub mod batch;
pub mod config;
pub mod epub;
pub mod fix;
pub mod pipeline;
pub mod prompt;

// === 核心API重新导出 ===

/// EPUB修复器（主要接口）
pub use pipeline::{Outcome, RepairedBook, Repairer};

/// 批量修复
pub use batch::{BatchInput, BatchResult, BatchStatus, bundle, repair_batch, repair_batch_until};

/// 错误处理
pub use epub::{EpubError, Result};

/// 内存中的EPUB压缩包
pub use epub::EpubArchive;

/// 配置
pub use config::RepairConfig;

// === 修复步骤 ===

pub use fix::{FixLog, Pass};

/// 语言询问端口
pub use fix::language::{AcceptDefault, FixedLanguage, LanguageIssue, LanguageQuery, LanguageResolver};

/// 通过通道询问操作者
pub use prompt::{ChannelResolver, LanguageRequest};

// === 库信息 ===

/// epubfix库的版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// epubfix库的描述
pub const DESCRIPTION: &str = "修复不合规EPUB文件，使其能被电子书商店接受";

/// 以默认配置修复EPUB文件，需要询问语言时一律采用默认值
///
/// # 参数
/// * `path` - EPUB文件路径
///
/// # 返回值
/// * `Result<RepairedBook>` - 修复后的压缩包和修复记录
///
/// # 示例
///
/// ```no_run
/// let repaired = epubfix::repair("book.epub")?;
/// for fix in repaired.log.entries() {
///     println!("{}", fix);
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn repair<P: AsRef<std::path::Path>>(path: P) -> Result<RepairedBook> {
    let config = RepairConfig::default();
    Repairer::new(&config, &AcceptDefault).repair_file(path)
}

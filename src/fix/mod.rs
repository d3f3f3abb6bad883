//! 修复步骤模块
//!
//! 每个子模块实现一个独立、幂等的修复步骤。步骤按 [`Pass::ALL`] 的固定顺序执行，
//! 读写同一个 [`EpubArchive`]，并把面向用户的修复说明写入 [`FixLog`]。
//! 描述文件缺失或无法解析只会产生诊断日志，不会中断后续步骤。

pub mod body_link;
pub mod content;
pub mod css;
pub mod encoding;
pub mod identifier;
pub mod language;
pub mod opf_meta;
pub mod play_order;
pub mod unicode;

use crate::config::RepairConfig;
use crate::epub::EpubArchive;
use language::LanguageResolver;
use tracing::debug;

/// 修复日志
///
/// 按追加顺序保存修复说明，完全相同的条目只保留第一条。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixLog {
    entries: Vec<String>,
}

impl FixLog {
    /// 创建空日志
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条修复说明，已存在相同条目时忽略
    pub fn push(&mut self, entry: impl Into<String>) {
        let entry = entry.into();
        if !self.entries.contains(&entry) {
            self.entries.push(entry);
        }
    }

    /// 所有修复说明
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 单本书修复时的上下文
pub struct FixContext<'a> {
    /// 书名（通常为输入文件名），用于询问语言时提示
    pub book: &'a str,
    pub config: &'a RepairConfig,
    pub resolver: &'a dyn LanguageResolver,
}

/// 修复步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// 修复package的unique-identifier引用
    UniqueIdentifier,
    /// 补充或更正文档语言
    Language,
    /// 移除书写模式meta
    WritingMode,
    /// 重排NCX的playOrder
    PlayOrder,
    /// NCX文本的Unicode规范化
    NcxUnicode,
    /// 指向body id的链接改为指向文件
    BodyIdLink,
    /// 内容文档重新序列化
    Content,
    /// 为bold/italic类补充CSS规则
    BoldItalicCss,
    /// 补充XML编码声明
    Encoding,
}

impl Pass {
    /// 全部步骤，按执行顺序排列
    ///
    /// 编码声明修复必须最后执行，CSS注入依赖内容序列化引入的span类。
    pub const ALL: [Pass; 9] = [
        Pass::UniqueIdentifier,
        Pass::Language,
        Pass::WritingMode,
        Pass::PlayOrder,
        Pass::NcxUnicode,
        Pass::BodyIdLink,
        Pass::Content,
        Pass::BoldItalicCss,
        Pass::Encoding,
    ];

    /// 步骤名称，用于诊断日志
    pub fn name(&self) -> &'static str {
        match self {
            Pass::UniqueIdentifier => "unique-identifier",
            Pass::Language => "language",
            Pass::WritingMode => "writing-mode",
            Pass::PlayOrder => "play-order",
            Pass::NcxUnicode => "ncx-unicode",
            Pass::BodyIdLink => "body-id-link",
            Pass::Content => "content",
            Pass::BoldItalicCss => "bold-italic-css",
            Pass::Encoding => "encoding",
        }
    }

    /// 对压缩包执行该步骤
    pub fn run(self, archive: &mut EpubArchive, ctx: &FixContext<'_>, log: &mut FixLog) {
        let before = log.len();
        match self {
            Pass::UniqueIdentifier => identifier::fix_unique_identifier(archive, log),
            Pass::Language => language::fix_language(archive, ctx, log),
            Pass::WritingMode => opf_meta::remove_writing_mode(archive, log),
            Pass::PlayOrder => play_order::fix_play_order(archive, log),
            Pass::NcxUnicode => unicode::normalize_ncx_unicode(archive, log),
            Pass::BodyIdLink => body_link::fix_body_id_links(archive, log),
            Pass::Content => content::reserialize_content(archive, log),
            Pass::BoldItalicCss => css::add_bold_italic_css(archive, log),
            Pass::Encoding => encoding::fix_encoding(archive, log),
        }
        debug!(
            "[{}] 步骤 {} 完成，新增 {} 条修复记录",
            ctx.book,
            self.name(),
            log.len() - before
        );
    }
}

/// 按固定顺序执行全部修复步骤
pub fn run_all(archive: &mut EpubArchive, ctx: &FixContext<'_>) -> FixLog {
    let mut log = FixLog::new();
    for pass in Pass::ALL {
        pass.run(archive, ctx, &mut log);
    }
    log
}

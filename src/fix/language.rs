//! 文档语言修复
//!
//! 缺少语言声明或语言不受目标平台支持时询问操作者，并把结果写回OPF。
//! 询问通过 [`LanguageResolver`] 注入，核心流程本身不做任何交互。

use crate::epub::error::Result;
use crate::epub::xml::{self, XmlRewriter};
use crate::epub::{EpubArchive, Package};
use crate::fix::{FixContext, FixLog};
use quick_xml::events::{BytesEnd, BytesText, Event};
use tracing::{debug, warn};

/// 需要操作者决定语言的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageIssue {
    /// OPF中没有语言声明
    Missing,
    /// 声明的语言不在支持列表中
    Unsupported,
}

/// 一次语言询问
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageQuery {
    /// 书名
    pub book: String,
    pub issue: LanguageIssue,
    /// 当前的语言值，缺失时为None
    pub current: Option<String>,
    /// 操作者不作答时采用的默认值
    pub default: String,
}

impl LanguageQuery {
    /// 面向操作者的提示文本
    pub fn prompt(&self) -> String {
        match self.issue {
            LanguageIssue::Missing => format!(
                "《{}》没有语言标签。请以RFC 5646格式输入书籍语言，例如 en、fr、ja（默认 {}）",
                self.book, self.default
            ),
            LanguageIssue::Unsupported => format!(
                "《{}》的语言 {} 不受支持，转换可能失败。直接回车保留，或以RFC 5646格式输入新的语言",
                self.book,
                self.current.as_deref().unwrap_or(&self.default)
            ),
        }
    }
}

/// 语言询问端口
pub trait LanguageResolver: Send + Sync {
    /// 返回操作者给出的语言，None或空字符串表示采用默认值
    fn resolve(&self, query: &LanguageQuery) -> Option<String>;
}

/// 总是采用默认值
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptDefault;

impl LanguageResolver for AcceptDefault {
    fn resolve(&self, _query: &LanguageQuery) -> Option<String> {
        None
    }
}

/// 总是回答同一个语言
#[derive(Debug, Clone)]
pub struct FixedLanguage(pub String);

impl LanguageResolver for FixedLanguage {
    fn resolve(&self, _query: &LanguageQuery) -> Option<String> {
        Some(self.0.clone())
    }
}

/// 补充或更正OPF中的语言声明
pub fn fix_language(archive: &mut EpubArchive, ctx: &FixContext<'_>, log: &mut FixLog) {
    if let Err(e) = repair(archive, ctx, log) {
        warn!("跳过语言修复: {}", e);
    }
}

fn repair(archive: &mut EpubArchive, ctx: &FixContext<'_>, log: &mut FixLog) -> Result<()> {
    let (opf_path, content) = match archive.package_source() {
        Ok(source) => source,
        Err(e) => {
            debug!("找不到OPF文件，跳过语言修复: {}", e);
            return Ok(());
        }
    };
    let package = Package::parse_xml(content)?;
    if !package.has_metadata_element {
        warn!("OPF没有metadata元素，无法写入语言");
        return Ok(());
    }

    let original = package.metadata.language().map(str::to_string);
    let language = resolve_language(original.as_deref(), ctx);
    if original.as_deref() == Some(language.as_str()) {
        return Ok(());
    }

    let updated = write_language(content, original.is_some(), &language)?;
    archive.set(&opf_path, updated);
    log.push(format!(
        "将文档语言从 {} 修改为 {}",
        original.as_deref().unwrap_or("未定义"),
        language
    ));
    Ok(())
}

/// 根据当前语言和操作者的回答决定最终语言
pub fn resolve_language(current: Option<&str>, ctx: &FixContext<'_>) -> String {
    let mut language = match current {
        Some(current) => current.to_string(),
        None => ask(ctx, LanguageIssue::Missing, None, &ctx.config.default_language),
    };

    if !ctx.config.is_language_allowed(&language) {
        language = ask(ctx, LanguageIssue::Unsupported, Some(&language), &language);
    }
    language
}

fn ask(ctx: &FixContext<'_>, issue: LanguageIssue, current: Option<&str>, default: &str) -> String {
    let query = LanguageQuery {
        book: ctx.book.to_string(),
        issue,
        current: current.map(str::to_string),
        default: default.to_string(),
    };
    ctx.resolver
        .resolve(&query)
        .map(|answer| answer.trim().to_string())
        .filter(|answer| !answer.is_empty())
        .unwrap_or(query.default)
}

/// 替换第一个语言元素的文本，或在metadata末尾插入新的语言元素
fn write_language(content: &str, exists: bool, language: &str) -> Result<String> {
    let dc_prefix = xml::dublin_core_prefix(content);
    let mut rewriter = XmlRewriter::new(content);
    let mut in_metadata = false;
    let mut done = false;

    loop {
        match rewriter.next()? {
            Event::Eof => break,
            Event::Start(e) if e.local_name().as_ref() == b"metadata" => {
                in_metadata = true;
                rewriter.write(Event::Start(e))?;
            }
            Event::Empty(e) if !done && !exists && e.local_name().as_ref() == b"metadata" => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                rewriter.write(Event::Start(e))?;
                write_new_language(&mut rewriter, dc_prefix.as_deref(), language)?;
                rewriter.write(Event::End(BytesEnd::new(name)))?;
                done = true;
            }
            Event::End(e) if in_metadata && e.local_name().as_ref() == b"metadata" => {
                in_metadata = false;
                if !done && !exists {
                    write_new_language(&mut rewriter, dc_prefix.as_deref(), language)?;
                    done = true;
                }
                rewriter.write(Event::End(e))?;
            }
            Event::Start(e) if in_metadata && !done && exists && e.local_name().as_ref() == b"language" => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                rewriter.skip_element(&e)?;
                rewriter.write(Event::Start(e))?;
                rewriter.write(Event::Text(BytesText::new(language)))?;
                rewriter.write(Event::End(BytesEnd::new(name)))?;
                done = true;
            }
            Event::Empty(e) if in_metadata && !done && exists && e.local_name().as_ref() == b"language" => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                rewriter.write(Event::Start(e))?;
                rewriter.write(Event::Text(BytesText::new(language)))?;
                rewriter.write(Event::End(BytesEnd::new(name)))?;
                done = true;
            }
            event => rewriter.write(event)?,
        }
    }

    rewriter.finish()
}

fn write_new_language(rewriter: &mut XmlRewriter<'_>, prefix: Option<&str>, language: &str) -> Result<()> {
    let start = xml::dublin_core_start(prefix, "language");
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    rewriter.write(Event::Start(start))?;
    rewriter.write(Event::Text(BytesText::new(language)))?;
    rewriter.write(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

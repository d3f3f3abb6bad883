//! 修复流程驱动
//!
//! 加载压缩包 → 按固定顺序执行全部修复步骤 → 保存，中间没有任何保存点。

use crate::config::RepairConfig;
use crate::epub::EpubArchive;
use crate::epub::error::Result;
use crate::fix::language::LanguageResolver;
use crate::fix::{self, FixContext, FixLog};
use std::fs;
use std::path::Path;
use tracing::info;

/// 单本书的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// 应用了修复，附带修复说明
    Fixed(Vec<String>),
    /// 没有发现需要修复的问题，仍然输出重新打包的文件
    NoFixesNeeded,
    /// 处理失败，附带错误信息
    Failed(String),
}

impl Outcome {
    pub fn from_log(log: &FixLog) -> Self {
        if log.is_empty() {
            Outcome::NoFixesNeeded
        } else {
            Outcome::Fixed(log.entries().to_vec())
        }
    }

    /// 是否产生了输出文件
    pub fn is_success(&self) -> bool {
        !matches!(self, Outcome::Failed(_))
    }
}

/// 修复后的EPUB
#[derive(Debug, Clone)]
pub struct RepairedBook {
    /// 重新打包后的压缩包字节
    pub bytes: Vec<u8>,
    pub log: FixLog,
}

impl RepairedBook {
    pub fn outcome(&self) -> Outcome {
        Outcome::from_log(&self.log)
    }

    /// 是否应用了修复
    pub fn is_fixed(&self) -> bool {
        !self.log.is_empty()
    }
}

/// EPUB修复器
///
/// 不持有可变状态，可以在多个线程间共享，同时修复多本书。
#[derive(Clone, Copy)]
pub struct Repairer<'a> {
    config: &'a RepairConfig,
    resolver: &'a dyn LanguageResolver,
}

impl<'a> Repairer<'a> {
    /// 创建修复器
    ///
    /// # 参数
    /// * `config` - 修复配置
    /// * `resolver` - 需要操作者决定语言时的询问端口
    pub fn new(config: &'a RepairConfig, resolver: &'a dyn LanguageResolver) -> Self {
        Self { config, resolver }
    }

    /// 对内存中的压缩包执行全部修复步骤
    pub fn repair_archive(&self, name: &str, archive: &mut EpubArchive) -> FixLog {
        let ctx = FixContext {
            book: name,
            config: self.config,
            resolver: self.resolver,
        };
        fix::run_all(archive, &ctx)
    }

    /// 修复EPUB字节
    ///
    /// # 参数
    /// * `name` - 书名，通常为输入文件名
    /// * `bytes` - 输入EPUB的完整内容
    ///
    /// # 返回值
    /// * `Result<RepairedBook>` - 输入不是有效压缩包或无法写出时返回错误
    pub fn repair_bytes(&self, name: &str, bytes: &[u8]) -> Result<RepairedBook> {
        let mut archive = EpubArchive::load(bytes)?;
        let log = self.repair_archive(name, &mut archive);
        let bytes = archive.save()?;
        info!("《{}》处理完成，共 {} 条修复", name, log.len());
        Ok(RepairedBook { bytes, log })
    }

    /// 读取并修复EPUB文件
    pub fn repair_file<P: AsRef<Path>>(&self, path: P) -> Result<RepairedBook> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.repair_bytes(&name, &bytes)
    }
}

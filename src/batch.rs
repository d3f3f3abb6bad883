//! 批量修复
//!
//! 每本书由一个任务独占处理，单本书的失败（包括panic）只影响它自己的结果。

use crate::config::RepairConfig;
use crate::epub::error::{EpubError, Result};
use crate::pipeline::{Outcome, RepairedBook, Repairer};
use rayon::prelude::*;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// 处理被取消时的失败信息
const CANCELLED: &str = "处理已取消";

/// 待修复的一本书
#[derive(Debug, Clone)]
pub struct BatchInput {
    /// 原始文件名
    pub name: String,
    pub bytes: Vec<u8>,
}

impl BatchInput {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// 单本书在批处理中的状态
#[derive(Debug, Clone)]
pub enum BatchStatus {
    Repaired(RepairedBook),
    Failed(String),
    /// 批处理取消前没有轮到它
    Skipped,
}

/// 单本书的批处理结果
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub name: String,
    pub status: BatchStatus,
}

impl BatchResult {
    pub fn outcome(&self) -> Outcome {
        match &self.status {
            BatchStatus::Repaired(book) => book.outcome(),
            BatchStatus::Failed(message) => Outcome::Failed(message.clone()),
            BatchStatus::Skipped => Outcome::Failed(CANCELLED.to_string()),
        }
    }

    /// 修复后的书，失败或跳过时为None
    pub fn repaired(&self) -> Option<&RepairedBook> {
        match &self.status {
            BatchStatus::Repaired(book) => Some(book),
            _ => None,
        }
    }

    /// 输出文件名，失败或跳过时为None
    pub fn download_name(&self, config: &RepairConfig) -> Option<String> {
        self.repaired()
            .map(|book| config.download_name(&self.name, book.is_fixed()))
    }
}

/// 并发修复多本书，结果与输入顺序一致
pub fn repair_batch(repairer: &Repairer<'_>, inputs: &[BatchInput]) -> Vec<BatchResult> {
    repair_batch_until(repairer, inputs, &AtomicBool::new(false))
}

/// 并发修复多本书，`cancel` 置位后不再开始新的书
///
/// 已经开始的书会完整处理完，其余的标记为 [`BatchStatus::Skipped`]。
pub fn repair_batch_until(
    repairer: &Repairer<'_>,
    inputs: &[BatchInput],
    cancel: &AtomicBool,
) -> Vec<BatchResult> {
    info!("开始批量修复 {} 本书", inputs.len());
    inputs
        .par_iter()
        .map(|input| {
            let status = if cancel.load(Ordering::SeqCst) {
                BatchStatus::Skipped
            } else {
                repair_one(repairer, input)
            };
            BatchResult {
                name: input.name.clone(),
                status,
            }
        })
        .collect()
}

fn repair_one(repairer: &Repairer<'_>, input: &BatchInput) -> BatchStatus {
    let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
        repairer.repair_bytes(&input.name, &input.bytes)
    }));
    match attempt {
        Ok(Ok(book)) => BatchStatus::Repaired(book),
        Ok(Err(e)) => {
            warn!("《{}》处理失败: {}", input.name, e);
            BatchStatus::Failed(e.to_string())
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("《{}》处理时发生panic: {}", input.name, message);
            BatchStatus::Failed(format!("处理时发生内部错误: {}", message))
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "未知错误".to_string()
    }
}

/// 把所有成功的输出打包成一个压缩包
///
/// 每本书以输出文件名存放，重名时在扩展名前加序号。
pub fn bundle(results: &[BatchResult], config: &RepairConfig) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .last_modified_time(DateTime::default());

    let mut used = HashSet::new();
    for result in results {
        let (Some(book), Some(name)) = (result.repaired(), result.download_name(config)) else {
            continue;
        };
        let name = unique_name(&name, &mut used);
        writer
            .start_file(name.as_str(), options)
            .map_err(EpubError::ArchiveWrite)?;
        writer.write_all(&book.bytes)?;
    }

    let cursor = writer.finish().map_err(EpubError::ArchiveWrite)?;
    Ok(cursor.into_inner())
}

fn unique_name(name: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }
    let (stem, extension) = match name.rfind('.') {
        Some(dot) if dot > 0 => name.split_at(dot),
        _ => (name, ""),
    };
    let mut counter = 2;
    loop {
        let candidate = format!("{} ({}){}", stem, counter, extension);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::archive::tests::{CONTAINER_XML, OPF_XML, build_epub};
    use crate::fix::language::{AcceptDefault, LanguageQuery, LanguageResolver};
    use std::io::Read;
    use zip::ZipArchive;

    fn book(chapter: &str) -> Vec<u8> {
        build_epub(&[
            ("mimetype", "application/epub+zip".as_bytes()),
            ("META-INF/container.xml", CONTAINER_XML.as_bytes()),
            ("OEBPS/content.opf", OPF_XML.as_bytes()),
            ("OEBPS/text/chapter1.xhtml", chapter.as_bytes()),
        ])
    }

    struct Panicking;

    impl LanguageResolver for Panicking {
        fn resolve(&self, _query: &LanguageQuery) -> Option<String> {
            panic!("resolver exploded")
        }
    }

    #[test]
    fn test_failure_is_isolated() {
        let config = RepairConfig::default();
        let repairer = Repairer::new(&config, &AcceptDefault);
        let inputs = vec![
            BatchInput::new("a.epub", book("<html><body><b>x</b></body></html>")),
            BatchInput::new("broken.epub", b"garbage".to_vec()),
            BatchInput::new("c.epub", book("<html><body/></html>")),
        ];

        let results = repair_batch(&repairer, &inputs);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].name, "a.epub");
        assert!(results[0].outcome().is_success());
        assert!(matches!(results[1].status, BatchStatus::Failed(_)));
        assert!(results[2].outcome().is_success());
    }

    #[test]
    fn test_panic_becomes_failure() {
        let config = RepairConfig::default();
        let repairer = Repairer::new(&config, &Panicking);
        // 语言缺失时才会询问解析器
        let opf = OPF_XML.replace("<dc:language>zh-CN</dc:language>", "");
        let bytes = build_epub(&[
            ("mimetype", "application/epub+zip".as_bytes()),
            ("META-INF/container.xml", CONTAINER_XML.as_bytes()),
            ("OEBPS/content.opf", opf.as_bytes()),
        ]);
        let inputs = vec![BatchInput::new("a.epub", bytes), BatchInput::new("b.epub", book("<html/>"))];

        let results = repair_batch(&repairer, &inputs);
        match &results[0].status {
            BatchStatus::Failed(message) => assert!(message.contains("resolver exploded")),
            other => panic!("unexpected status: {:?}", other),
        }
        assert!(results[1].outcome().is_success());
    }

    #[test]
    fn test_cancelled_batch_skips_everything() {
        let config = RepairConfig::default();
        let repairer = Repairer::new(&config, &AcceptDefault);
        let inputs = vec![BatchInput::new("a.epub", book("<html/>"))];

        let results = repair_batch_until(&repairer, &inputs, &AtomicBool::new(true));
        assert!(matches!(results[0].status, BatchStatus::Skipped));
        assert_eq!(results[0].outcome(), Outcome::Failed(CANCELLED.to_string()));
        assert_eq!(results[0].download_name(&config), None);
    }

    #[test]
    fn test_bundle_contains_successful_outputs() {
        let config = RepairConfig::default();
        let repairer = Repairer::new(&config, &AcceptDefault);
        let inputs = vec![
            BatchInput::new("a.epub", book("<html><body><b>x</b></body></html>")),
            BatchInput::new("a.epub", book("<html><body><i>y</i></body></html>")),
            BatchInput::new("broken.epub", b"garbage".to_vec()),
        ];
        let results = repair_batch(&repairer, &inputs);

        let bytes = bundle(&results, &config).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        assert_eq!(archive.len(), 2);
        assert!(names.contains(&"(fixed) a.epub".to_string()));
        assert!(names.contains(&"(fixed) a (2).epub".to_string()));

        let mut inner = Vec::new();
        archive
            .by_name("(fixed) a.epub")
            .unwrap()
            .read_to_end(&mut inner)
            .unwrap();
        assert_eq!(inner, results[0].repaired().unwrap().bytes);
    }

    #[test]
    fn test_unique_name() {
        let mut used = HashSet::new();
        assert_eq!(unique_name("a.epub", &mut used), "a.epub");
        assert_eq!(unique_name("a.epub", &mut used), "a (2).epub");
        assert_eq!(unique_name("a.epub", &mut used), "a (3).epub");
        assert_eq!(unique_name("noext", &mut used), "noext");
        assert_eq!(unique_name("noext", &mut used), "noext (2)");
    }
}

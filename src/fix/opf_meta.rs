//! OPF元数据清理
//!
//! 移除书写模式相关的meta标签，目标阅读器会忽略它们，有时还会处理出错。

use crate::epub::error::Result;
use crate::epub::xml::{self, XmlRewriter};
use crate::epub::{EpubArchive, Meta, Package};
use crate::fix::FixLog;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, warn};

/// 移除OPF中的书写模式meta
pub fn remove_writing_mode(archive: &mut EpubArchive, log: &mut FixLog) {
    if let Err(e) = repair(archive, log) {
        warn!("跳过OPF元数据清理: {}", e);
    }
}

fn repair(archive: &mut EpubArchive, log: &mut FixLog) -> Result<()> {
    let (opf_path, content) = archive.package_source()?;
    let package = Package::parse_xml(content)?;
    if !package.metadata.metas.iter().any(Meta::is_writing_mode) {
        debug!("OPF中没有书写模式meta");
        return Ok(());
    }

    let mut rewriter = XmlRewriter::new(content);
    loop {
        match rewriter.next()? {
            Event::Eof => break,
            Event::Start(e) => {
                if is_writing_mode_meta(&e)? {
                    rewriter.skip_element(&e)?;
                } else {
                    rewriter.write(Event::Start(e))?;
                }
            }
            Event::Empty(e) => {
                if !is_writing_mode_meta(&e)? {
                    rewriter.write(Event::Empty(e))?;
                }
            }
            event => rewriter.write(event)?,
        }
    }

    let updated = rewriter.finish()?;
    archive.set(&opf_path, updated);
    log.push("从OPF中移除了 primary-writing-mode");
    Ok(())
}

fn is_writing_mode_meta(e: &BytesStart<'_>) -> Result<bool> {
    if e.local_name().as_ref() != b"meta" {
        return Ok(false);
    }
    let meta = Meta {
        name: xml::local_attribute(e, "name")?,
        content: xml::local_attribute(e, "content")?,
    };
    Ok(meta.is_writing_mode())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fix::testing::{archive_with_opf, opf_of};

    #[test]
    fn test_removes_writing_mode_meta() {
        let opf = r#"<package version="2.0"><metadata>
    <meta name="cover" content="cover-image"/>
    <meta name="primary-writing-mode" content="horizontal-rl"/>
    <meta name="x" content="vertical-rl"></meta>
  </metadata></package>"#;
        let mut archive = archive_with_opf(opf);
        let mut log = FixLog::new();
        remove_writing_mode(&mut archive, &mut log);

        let content = opf_of(&archive);
        assert_eq!(log.entries(), &["从OPF中移除了 primary-writing-mode".to_string()]);
        assert!(content.contains(r#"<meta name="cover" content="cover-image"/>"#));
        assert!(!content.contains("primary-writing-mode"));
        assert!(!content.contains("vertical-rl"));
        assert_eq!(Package::parse_xml(&content).unwrap().metadata.metas.len(), 1);
    }

    #[test]
    fn test_without_writing_mode_is_noop() {
        let opf = r#"<package version="2.0"><metadata><meta name="cover" content="c"/></metadata></package>"#;
        let mut archive = archive_with_opf(opf);
        let mut log = FixLog::new();
        remove_writing_mode(&mut archive, &mut log);
        assert!(log.is_empty());
        assert_eq!(opf_of(&archive), opf);
    }
}

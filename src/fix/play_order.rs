//! NCX播放顺序修复

use crate::epub::EpubArchive;
use crate::epub::error::Result;
use crate::epub::xml::{self, XmlRewriter};
use crate::fix::FixLog;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, warn};

/// 导航点的playOrder不是按文档顺序的1..N时重新编号
pub fn fix_play_order(archive: &mut EpubArchive, log: &mut FixLog) {
    if let Err(e) = repair(archive, log) {
        warn!("跳过NCX playOrder修复: {}", e);
    }
}

fn repair(archive: &mut EpubArchive, log: &mut FixLog) -> Result<()> {
    let Some(ncx_path) = archive.ncx_path() else {
        debug!("没有NCX文件，跳过playOrder修复");
        return Ok(());
    };
    let (_, ncx) = archive.ncx()?;
    if ncx.has_sequential_play_order() {
        return Ok(());
    }

    let Some(content) = archive.get(&ncx_path) else {
        return Ok(());
    };
    let mut rewriter = XmlRewriter::new(content);
    let mut order = 0u32;
    loop {
        match rewriter.next()? {
            Event::Eof => break,
            Event::Start(e) if is_nav_point(&e) => {
                order += 1;
                rewriter.write(Event::Start(renumber(&e, order)?))?;
            }
            Event::Empty(e) if is_nav_point(&e) => {
                order += 1;
                rewriter.write(Event::Empty(renumber(&e, order)?))?;
            }
            event => rewriter.write(event)?,
        }
    }

    let updated = rewriter.finish()?;
    archive.set(&ncx_path, updated);
    log.push("修正了NCX的playOrder顺序");
    Ok(())
}

fn is_nav_point(e: &BytesStart<'_>) -> bool {
    e.local_name().as_ref() == b"navPoint"
}

fn renumber(e: &BytesStart<'_>, order: u32) -> Result<BytesStart<'static>> {
    xml::with_attribute(e, "playOrder", &order.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::archive::tests::{CONTAINER_XML, OPF_XML};

    fn archive_with_ncx(ncx: &str) -> EpubArchive {
        let mut archive = EpubArchive::new();
        archive.set("META-INF/container.xml", CONTAINER_XML);
        archive.set("OEBPS/content.opf", OPF_XML);
        archive.set("OEBPS/toc.ncx", ncx);
        archive
    }

    fn play_orders(archive: &EpubArchive) -> Vec<Option<String>> {
        let (_, ncx) = archive.ncx().unwrap();
        ncx.get_all_nav_points()
            .iter()
            .map(|point| point.play_order.clone())
            .collect()
    }

    #[test]
    fn test_renumbers_in_document_order() {
        let ncx = r#"<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1"><navMap>
<navPoint id="a" playOrder="5"><navLabel><text>A</text></navLabel><content src="a.xhtml"/>
  <navPoint id="a1" playOrder="x"><navLabel><text>A1</text></navLabel><content src="a.xhtml#1"/></navPoint>
</navPoint>
<navPoint id="b"><navLabel><text>B</text></navLabel><content src="b.xhtml"/></navPoint>
</navMap></ncx>"#;
        let mut archive = archive_with_ncx(ncx);
        let mut log = FixLog::new();
        fix_play_order(&mut archive, &mut log);

        assert_eq!(log.entries(), &["修正了NCX的playOrder顺序".to_string()]);
        assert_eq!(
            play_orders(&archive),
            vec![Some("1".to_string()), Some("2".to_string()), Some("3".to_string())]
        );
        assert!(archive.ncx().unwrap().1.has_sequential_play_order());
    }

    #[test]
    fn test_sequential_ncx_is_untouched() {
        let ncx = r#"<ncx><navMap><navPoint id="a" playOrder=" 1 "/><navPoint id="b" playOrder="2"/></navMap></ncx>"#;
        let mut archive = archive_with_ncx(ncx);
        let mut log = FixLog::new();
        fix_play_order(&mut archive, &mut log);
        assert!(log.is_empty());
        assert_eq!(archive.get("OEBPS/toc.ncx"), Some(ncx));
    }

    #[test]
    fn test_missing_ncx_is_noop() {
        let mut archive = EpubArchive::new();
        let mut log = FixLog::new();
        fix_play_order(&mut archive, &mut log);
        assert!(log.is_empty());
    }
}

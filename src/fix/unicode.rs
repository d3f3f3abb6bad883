//! NCX文本的Unicode规范化
//!
//! 目标阅读器的目录无法正确显示部分排版字符，将其转写为ASCII。

use crate::epub::EpubArchive;
use crate::epub::error::Result;
use crate::epub::xml::XmlRewriter;
use crate::fix::FixLog;
use quick_xml::events::{BytesText, Event};
use tracing::{debug, warn};

/// 排版字符到ASCII的转写表
const TRANSLITERATIONS: &[(char, &str)] = &[
    ('\u{201C}', "\""),  // 左双引号
    ('\u{201D}', "\""),  // 右双引号
    ('\u{2018}', "'"),   // 左单引号
    ('\u{2019}', "'"),   // 右单引号
    ('\u{201A}', "'"),   // 单下引号
    ('\u{201B}', "'"),   // 单高反转引号
    ('\u{201E}', "\""),  // 双下引号
    ('\u{201F}', "\""),  // 双高反转引号
    ('\u{2013}', "-"),   // en dash
    ('\u{2014}', "--"),  // em dash
    ('\u{2015}', "--"),  // 水平线
    ('\u{2026}', "..."), // 省略号
    ('\u{00A0}', " "),   // 不换行空格
    ('\u{2002}', " "),   // en空格
    ('\u{2003}', " "),   // em空格
    ('\u{2009}', " "),   // 窄空格
    ('\u{00AB}', "\""),  // 左书名号
    ('\u{00BB}', "\""),  // 右书名号
    ('\u{2039}', "'"),   // 单左角引号
    ('\u{203A}', "'"),   // 单右角引号
];

/// 将排版字符转写为ASCII
pub fn transliterate(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for c in text.chars() {
        match TRANSLITERATIONS.iter().find(|(from, _)| *from == c) {
            Some((_, to)) => result.push_str(to),
            None => result.push(c),
        }
    }
    result
}

/// 规范化NCX中所有text元素（导航标签和文档标题）的文本
pub fn normalize_ncx_unicode(archive: &mut EpubArchive, log: &mut FixLog) {
    if let Err(e) = repair(archive, log) {
        warn!("跳过NCX Unicode规范化: {}", e);
    }
}

fn repair(archive: &mut EpubArchive, log: &mut FixLog) -> Result<()> {
    let Some(ncx_path) = archive.ncx_path() else {
        debug!("没有NCX文件，跳过Unicode规范化");
        return Ok(());
    };
    // 只处理格式良好的NCX
    archive.ncx()?;
    let Some(content) = archive.get(&ncx_path) else {
        return Ok(());
    };

    let mut rewriter = XmlRewriter::new(content);
    let mut text_depth = 0usize;
    let mut modified = false;
    loop {
        match rewriter.next()? {
            Event::Eof => break,
            Event::Start(e) => {
                if e.local_name().as_ref() == b"text" {
                    text_depth += 1;
                }
                rewriter.write(Event::Start(e))?;
            }
            Event::End(e) => {
                if e.local_name().as_ref() == b"text" {
                    text_depth = text_depth.saturating_sub(1);
                }
                rewriter.write(Event::End(e))?;
            }
            Event::Text(e) if text_depth > 0 => {
                let original = e.unescape()?.into_owned();
                let normalized = transliterate(&original);
                if normalized == original {
                    rewriter.write(Event::Text(e))?;
                } else {
                    modified = true;
                    rewriter.write(Event::Text(BytesText::new(&normalized)))?;
                }
            }
            event => rewriter.write(event)?,
        }
    }

    if modified {
        let updated = rewriter.finish()?;
        archive.set(&ncx_path, updated);
        log.push("规范化了NCX中的Unicode字符");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::archive::tests::{CONTAINER_XML, OPF_XML};

    #[test]
    fn test_transliterate() {
        assert_eq!(transliterate("\u{201C}Hi\u{201D} \u{2014} it\u{2019}s\u{2026}"), "\"Hi\" -- it's...");
        assert_eq!(transliterate("a\u{00A0}b\u{2009}c \u{00AB}d\u{00BB}"), "a b c \"d\"");
        assert_eq!(transliterate("第一章　开始"), "第一章　开始");
    }

    #[test]
    fn test_normalizes_nav_labels_and_title() {
        let ncx = "<ncx><docTitle><text>Tom\u{2019}s Book</text></docTitle><navMap>\
<navPoint id=\"a\" playOrder=\"1\"><navLabel><text>One \u{2013} Two &amp; \u{2026}</text></navLabel><content src=\"a.xhtml\"/></navPoint>\
</navMap></ncx>";
        let mut archive = EpubArchive::new();
        archive.set("META-INF/container.xml", CONTAINER_XML);
        archive.set("OEBPS/content.opf", OPF_XML);
        archive.set("OEBPS/toc.ncx", ncx);

        let mut log = FixLog::new();
        normalize_ncx_unicode(&mut archive, &mut log);
        assert_eq!(log.entries(), &["规范化了NCX中的Unicode字符".to_string()]);

        let (_, parsed) = archive.ncx().unwrap();
        assert_eq!(parsed.get_title(), Some("Tom's Book"));
        assert_eq!(parsed.get_all_nav_points()[0].nav_label.text, "One - Two & ...");

        // 第二次运行没有变化
        let mut second = FixLog::new();
        normalize_ncx_unicode(&mut archive, &mut second);
        assert!(second.is_empty());
    }
}

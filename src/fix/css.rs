//! 为内容重写引入的 `bold`/`italic` 类补充样式规则

use crate::epub::EpubArchive;
use crate::fix::FixLog;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

const HEADER: &str = "/* epubfix: bold/italic span support */";
const BOLD_RULE: &str = ".bold { font-weight: bold; }";
const ITALIC_RULE: &str = ".italic { font-style: italic; }";

static BOLD_SELECTOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.bold(?:[^\w-]|$)").expect("bold选择器正则应当有效"));
static ITALIC_SELECTOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.italic(?:[^\w-]|$)").expect("italic选择器正则应当有效"));

/// 缺少 `.bold`/`.italic` 规则时追加到第一个样式表
pub fn add_bold_italic_css(archive: &mut EpubArchive, log: &mut FixLog) {
    let stylesheets = archive.stylesheet_paths();
    let Some(first) = stylesheets.first() else {
        debug!("没有样式表，跳过bold/italic规则");
        return;
    };

    let defines = |selector: &Regex| {
        stylesheets
            .iter()
            .filter_map(|path| archive.get(path))
            .any(|css| selector.is_match(css))
    };
    let has_bold = defines(&BOLD_SELECTOR);
    let has_italic = defines(&ITALIC_SELECTOR);
    if has_bold && has_italic {
        return;
    }

    let mut block = format!("\n{}\n", HEADER);
    if !has_bold {
        block.push_str(BOLD_RULE);
        block.push('\n');
    }
    if !has_italic {
        block.push_str(ITALIC_RULE);
        block.push('\n');
    }

    let css = archive.get(first).unwrap_or_default();
    let updated = format!("{}{}", css, block);
    archive.set(first, updated);
    log.push(format!("为 {} 添加了 .bold/.italic 样式规则", first));
}

//! NCX（Navigation Control file for XML）文件解析模块
//!
//! 此模块提供EPUB文件中NCX导航控制文件的只读视图。
//! 导航点保持文档顺序，不按playOrder重新排序，修复播放顺序时依赖这一点。

pub mod navigation;
pub mod parser;

pub use navigation::{DocTitle, NavContent, NavLabel, NavMap, NavPoint};
pub use parser::Ncx;

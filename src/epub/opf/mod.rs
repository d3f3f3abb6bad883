//! OPF（Open Packaging Format）文件解析模块
//!
//! 此模块提供EPUB文件中OPF包文件的只读视图，包括唯一标识符、语言、meta标签和清单信息。

mod manifest;
mod metadata;
mod parser;

pub use manifest::{ManifestItem, NCX_MEDIA_TYPE};
pub use metadata::{Identifier, Meta, Metadata};
pub use parser::Package;

//! 修复配置模块
//!
//! 提供修复流程的配置管理功能，支持从YAML文件加载配置。

use crate::epub::error::{EpubError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "epubfix.yaml";

/// 目标阅读平台支持的语言（主子标签）
///
/// 来源: https://kdp.amazon.com/en_US/help/topic/G200673300
const ALLOWED_LANGUAGES: &[&str] = &[
    // ISO 639-1
    "af", "gsw", "ar", "eu", "nb", "br", "ca", "zh", "kw", "co", "da", "nl", "stq", "en", "fi", "fr",
    "fy", "gl", "de", "gu", "hi", "is", "ga", "it", "ja", "lb", "mr", "ml", "gv", "frr", "nn", "pl",
    "pt", "oc", "rm", "sco", "gd", "es", "sv", "ta", "cy",
    // ISO 639-2
    "afr", "ara", "eus", "baq", "nob", "bre", "cat", "zho", "chi", "cor", "cos", "dan", "nld", "dut",
    "eng", "fin", "fra", "fre", "fry", "glg", "deu", "ger", "guj", "hin", "isl", "ice", "gle", "ita",
    "jpn", "ltz", "mar", "mal", "glv", "nor", "nno", "por", "oci", "roh", "gla", "spa", "swe", "tam",
    "cym", "wel",
];

/// 修复流程配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// 缺少语言声明时询问的默认语言
    pub default_language: String,
    /// 支持的语言列表（只比较主子标签，不区分大小写）
    pub allowed_languages: Vec<String>,
    /// 输出文件是否保留原文件名
    pub keep_original_filename: bool,
    /// 有修复时输出文件名的前缀
    pub fixed_prefix: String,
    /// 无需修复时输出文件名的前缀
    pub repacked_prefix: String,
    /// 批量输出的合并压缩包文件名
    pub bundle_name: String,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            default_language: "en".to_string(),
            allowed_languages: ALLOWED_LANGUAGES.iter().map(|s| s.to_string()).collect(),
            keep_original_filename: false,
            fixed_prefix: "(fixed) ".to_string(),
            repacked_prefix: "(repacked) ".to_string(),
            bundle_name: "fixed-epubs.zip".to_string(),
        }
    }
}

impl RepairConfig {
    /// 从YAML文件加载配置
    ///
    /// # 参数
    /// * `path` - 配置文件路径
    ///
    /// # 返回值
    /// * `Result<Self>` - 加载成功返回配置实例，失败返回 `ConfigError`
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| EpubError::ConfigError(format!("无法读取配置文件 {}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    /// 从YAML字符串解析配置
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yml::from_str(content)
            .map_err(|e| EpubError::ConfigError(format!("配置文件格式错误: {}", e)))
    }

    /// 将配置保存为YAML文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yml::to_string(self)
            .map_err(|e| EpubError::ConfigError(format!("无法序列化配置: {}", e)))?;
        fs::write(path, yaml)
            .map_err(|e| EpubError::ConfigError(format!("无法写入配置文件 {}: {}", path.display(), e)))
    }

    /// 加载配置文件，文件不存在时写入并返回默认配置
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load_from_file(path)
        } else {
            let config = Self::default();
            config.save_to_file(path)?;
            Ok(config)
        }
    }

    /// 语言是否受支持
    ///
    /// 只比较第一个连字符之前的主子标签，不区分大小写。
    pub fn is_language_allowed(&self, language: &str) -> bool {
        let primary = primary_subtag(language);
        self.allowed_languages
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&primary))
    }

    /// 根据是否有修复生成输出文件名
    pub fn download_name(&self, name: &str, fixed: bool) -> String {
        if self.keep_original_filename {
            name.to_string()
        } else if fixed {
            format!("{}{}", self.fixed_prefix, name)
        } else {
            format!("{}{}", self.repacked_prefix, name)
        }
    }
}

/// 语言标签的主子标签（小写）
pub fn primary_subtag(language: &str) -> String {
    language
        .trim()
        .split('-')
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

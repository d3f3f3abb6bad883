//! 元数据模块
//!
//! 只保留修复流程关心的元数据：标识符、语言和meta标签。

/// 标识符信息（`dc:identifier`）
#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    /// 元素的id属性，空字符串视为不存在
    pub id: Option<String>,
    /// 标识符值
    pub value: String,
}

/// meta标签，如 `<meta name="primary-writing-mode" content="horizontal-lr"/>`
#[derive(Debug, Clone, PartialEq)]
pub struct Meta {
    pub name: Option<String>,
    pub content: Option<String>,
}

impl Meta {
    /// 是否为目标阅读器会忽略甚至误处理的书写模式声明
    pub fn is_writing_mode(&self) -> bool {
        self.name.as_deref() == Some("primary-writing-mode")
            || matches!(self.content.as_deref(), Some("horizontal-lr") | Some("vertical-rl"))
    }
}

/// OPF文件中的元数据信息
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    /// 所有dc:identifier元素，按文档顺序
    pub identifiers: Vec<Identifier>,
    /// 所有dc:language元素的文本，按文档顺序
    pub languages: Vec<String>,
    /// 所有meta标签，按文档顺序
    pub metas: Vec<Meta>,
}

impl Metadata {
    /// 创建空的元数据
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取第一个语言声明
    pub fn language(&self) -> Option<&str> {
        self.languages.first().map(String::as_str)
    }

    /// 查找id与给定值相同的标识符
    pub fn identifier_by_id(&self, id: &str) -> Option<&Identifier> {
        self.identifiers
            .iter()
            .find(|identifier| identifier.id.as_deref() == Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writing_mode_detection() {
        let by_name = Meta {
            name: Some("primary-writing-mode".to_string()),
            content: Some("anything".to_string()),
        };
        let by_content = Meta {
            name: Some("other".to_string()),
            content: Some("vertical-rl".to_string()),
        };
        let cover = Meta {
            name: Some("cover".to_string()),
            content: Some("cover-image".to_string()),
        };
        assert!(by_name.is_writing_mode());
        assert!(by_content.is_writing_mode());
        assert!(!cover.is_writing_mode());
    }

    #[test]
    fn test_identifier_lookup() {
        let mut metadata = Metadata::new();
        metadata.identifiers.push(Identifier {
            id: None,
            value: "isbn".to_string(),
        });
        metadata.identifiers.push(Identifier {
            id: Some("uuid_id".to_string()),
            value: "urn:uuid:1".to_string(),
        });
        assert_eq!(metadata.identifier_by_id("uuid_id").map(|i| i.value.as_str()), Some("urn:uuid:1"));
        assert!(metadata.identifier_by_id("BookId").is_none());
    }
}

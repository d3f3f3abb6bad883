//! 唯一标识符修复
//!
//! 保证package元素的 `unique-identifier` 属性指向一个真实存在的 `dc:identifier` 的id。

use crate::epub::error::Result;
use crate::epub::xml::{self, XmlRewriter};
use crate::epub::{EpubArchive, Package};
use crate::fix::FixLog;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use tracing::{debug, warn};
use uuid::Uuid;

/// 未声明unique-identifier时使用的默认id
const DEFAULT_IDENTIFIER_ID: &str = "BookId";

/// 需要对OPF做的修改
#[derive(Debug, Clone, PartialEq, Eq)]
enum Repair {
    /// 创建新的标识符元素
    Create { id: String, set_attribute: bool },
    /// 将unique-identifier指向第一个标识符已有的id
    Repoint { id: String },
    /// 为第一个标识符分配id
    AssignFirst { id: String, set_attribute: bool },
}

impl Repair {
    /// 需要写到package元素上的unique-identifier值
    fn package_attribute(&self) -> Option<&str> {
        match self {
            Repair::Create { id, set_attribute: true }
            | Repair::AssignFirst { id, set_attribute: true }
            | Repair::Repoint { id } => Some(id),
            _ => None,
        }
    }

    fn message(&self) -> String {
        match self {
            Repair::Create { .. } => "创建了缺失的 dc:identifier".to_string(),
            Repair::Repoint { id } => format!("修正了 unique-identifier，使其指向 \"{}\"", id),
            Repair::AssignFirst { .. } => "为 dc:identifier 添加了 id 属性".to_string(),
        }
    }
}

/// 修复unique-identifier与dc:identifier的对应关系
pub fn fix_unique_identifier(archive: &mut EpubArchive, log: &mut FixLog) {
    if let Err(e) = repair(archive, log) {
        warn!("跳过唯一标识符修复: {}", e);
    }
}

fn repair(archive: &mut EpubArchive, log: &mut FixLog) -> Result<()> {
    let (opf_path, content) = archive.package_source()?;
    let package = Package::parse_xml(content)?;

    let Some(plan) = plan_repair(&package) else {
        debug!("unique-identifier 无需修复");
        return Ok(());
    };

    let updated = apply(content, &plan)?;
    archive.set(&opf_path, updated);
    log.push(plan.message());
    Ok(())
}

fn plan_repair(package: &Package) -> Option<Repair> {
    let unique = package.unique_identifier.clone();
    let identifiers = &package.metadata.identifiers;

    let Some(first) = identifiers.first() else {
        if !package.has_metadata_element {
            debug!("OPF没有metadata元素，无法创建标识符");
            return None;
        }
        return Some(Repair::Create {
            set_attribute: unique.is_none(),
            id: unique.unwrap_or_else(|| DEFAULT_IDENTIFIER_ID.to_string()),
        });
    };

    if package.unique_identifier_resolves() {
        return None;
    }

    Some(match &first.id {
        Some(id) => Repair::Repoint { id: id.clone() },
        None => Repair::AssignFirst {
            set_attribute: unique.is_none(),
            id: unique.unwrap_or_else(|| DEFAULT_IDENTIFIER_ID.to_string()),
        },
    })
}

/// 按修改计划改写OPF，未涉及的部分保持原样
fn apply(content: &str, plan: &Repair) -> Result<String> {
    let dc_prefix = xml::dublin_core_prefix(content);
    let mut rewriter = XmlRewriter::new(content);
    let mut seen_root = false;
    let mut in_metadata = false;
    let mut done = false;

    loop {
        match rewriter.next()? {
            Event::Eof => break,
            Event::Start(e) if !seen_root => {
                seen_root = true;
                rewriter.write(Event::Start(update_root(e, plan)?))?;
            }
            Event::Start(e) if e.local_name().as_ref() == b"metadata" => {
                in_metadata = true;
                rewriter.write(Event::Start(e))?;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"metadata" && !done => {
                if let Repair::Create { id, .. } = plan {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    rewriter.write(Event::Start(e))?;
                    write_identifier(&mut rewriter, dc_prefix.as_deref(), id)?;
                    rewriter.write(Event::End(BytesEnd::new(name)))?;
                    done = true;
                } else {
                    rewriter.write(Event::Empty(e))?;
                }
            }
            Event::End(e) if in_metadata && e.local_name().as_ref() == b"metadata" => {
                in_metadata = false;
                if let (Repair::Create { id, .. }, false) = (plan, done) {
                    write_identifier(&mut rewriter, dc_prefix.as_deref(), id)?;
                    done = true;
                }
                rewriter.write(Event::End(e))?;
            }
            Event::Start(e) if in_metadata && !done && e.local_name().as_ref() == b"identifier" => {
                rewriter.write(Event::Start(assign_first(e, plan, &mut done)?))?;
            }
            Event::Empty(e) if in_metadata && !done && e.local_name().as_ref() == b"identifier" => {
                rewriter.write(Event::Empty(assign_first(e, plan, &mut done)?))?;
            }
            event => rewriter.write(event)?,
        }
    }

    rewriter.finish()
}

fn update_root<'a>(e: BytesStart<'a>, plan: &Repair) -> Result<BytesStart<'a>> {
    match plan.package_attribute() {
        Some(id) => xml::with_attribute(&e, "unique-identifier", id),
        None => Ok(e),
    }
}

fn assign_first<'a>(e: BytesStart<'a>, plan: &Repair, done: &mut bool) -> Result<BytesStart<'a>> {
    match plan {
        Repair::AssignFirst { id, .. } => {
            *done = true;
            xml::with_attribute(&e, "id", id)
        }
        _ => Ok(e),
    }
}

/// 写入新的标识符元素，值为随机的 `urn:uuid:`
fn write_identifier(rewriter: &mut XmlRewriter<'_>, prefix: Option<&str>, id: &str) -> Result<()> {
    let mut start = xml::dublin_core_start(prefix, "identifier");
    start.push_attribute(("id", id));
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();

    let value = format!("urn:uuid:{}", Uuid::new_v4());
    rewriter.write(Event::Start(start))?;
    rewriter.write(Event::Text(BytesText::new(&value)))?;
    rewriter.write(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

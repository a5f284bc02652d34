// ==========================================
// 目录导入引擎 - 课表文档解析
// ==========================================
// 职责: quick-xml 事件流 → 顶层实体（属性为字段，嵌套元素为子数组）
// 说明: 无属性的顶层元素视为容器（如 <Salles>、<Cours>），直接穿透
// ==========================================

use crate::importer::file_parser::detect_charset;
use crate::timetable::error::{TimetableError, TimetableResult};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;

/// 课表文档中的实体元素名
pub const ENTITY_NAMES: [&str; 11] = [
    "SchoolYear",
    "Emploi",
    "Salle",
    "Materiel",
    "Matiere",
    "Groupe",
    "Classe",
    "Professeur",
    "Personnel",
    "Eleve",
    "Cours",
];

// ==========================================
// XmlEntity
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlEntity {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    pub children: BTreeMap<String, Vec<XmlEntity>>,
}

impl XmlEntity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// 非空属性值（去除首尾空白）
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn children(&self, name: &str) -> &[XmlEntity] {
        self.children.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn with_child(mut self, child: XmlEntity) -> Self {
        self.push_child(child);
        self
    }

    fn push_child(&mut self, child: XmlEntity) {
        self.children
            .entry(child.name.clone())
            .or_default()
            .push(child);
    }

    fn is_entity(&self) -> bool {
        !self.attributes.is_empty() && ENTITY_NAMES.contains(&self.name.as_str())
    }
}

// ==========================================
// EntityHandler Trait
// ==========================================
// 实现者: StaffCollector（第一遍）、ReferenceCollector（第二遍）
pub trait EntityHandler {
    /// 处理一个完整的顶层实体
    fn on_entity(&mut self, entity: XmlEntity) -> TimetableResult<()>;
}

/// 按探测到的字符集解码文档
pub fn decode_document(bytes: &[u8]) -> String {
    let encoding = detect_charset(bytes);
    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

fn read_element(start: &BytesStart<'_>) -> TimetableResult<XmlEntity> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut entity = XmlEntity::new(name);

    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| TimetableError::Xml(e.to_string()))?;
        let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
        let value = attribute.unescape_value()?.into_owned();
        entity.attributes.insert(key, value);
    }

    Ok(entity)
}

/// 事件驱动解析课表文档
///
/// # 参数
/// - content: 已解码的文档
/// - handler: 每个顶层实体闭合时回调
pub fn parse_document<H: EntityHandler>(content: &str, handler: &mut H) -> TimetableResult<()> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlEntity> = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                let element = read_element(&start)?;
                if stack.is_empty() && !element.is_entity() {
                    continue;
                }
                stack.push(element);
            }
            Event::Empty(start) => {
                let element = read_element(&start)?;
                match stack.last_mut() {
                    Some(parent) => parent.push_child(element),
                    None if element.is_entity() => handler.on_entity(element)?,
                    None => {}
                }
            }
            Event::End(_) => {
                if let Some(done) = stack.pop() {
                    match stack.last_mut() {
                        Some(parent) => parent.push_child(done),
                        None => handler.on_entity(done)?,
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(TimetableError::Xml("文档意外结束".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collect(Vec<XmlEntity>);

    impl EntityHandler for Collect {
        fn on_entity(&mut self, entity: XmlEntity) -> TimetableResult<()> {
            self.0.push(entity);
            Ok(())
        }
    }

    const DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Export>
  <Salles>
    <Salle Ident="R1" Nom="Salle 101"/>
  </Salles>
  <Groupes>
    <Groupe Ident="G1" Nom="Latin">
      <Classe Ident="C1"/>
      <PartieDeClasse Ident="P1"/>
    </Groupe>
  </Groupes>
  <Cours>
    <Cours Ident="K1" Jour="2" NumeroPlaceDebut="1" NombrePlaces="2">
      <Matiere Ident="M1"/>
      <Salle Ident="R1" Semaines="6"/>
    </Cours>
  </Cours>
</Export>"#;

    #[test]
    fn test_parse_top_level_entities() {
        let mut collect = Collect::default();
        parse_document(DOC, &mut collect).unwrap();

        let names: Vec<&str> = collect.0.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Salle", "Groupe", "Cours"]);

        let group = &collect.0[1];
        assert_eq!(group.attr("Nom"), Some("Latin"));
        assert_eq!(group.children("Classe")[0].attr("Ident"), Some("C1"));
        assert_eq!(group.children("PartieDeClasse").len(), 1);

        let course = &collect.0[2];
        assert_eq!(course.children("Salle")[0].attr("Semaines"), Some("6"));
        assert!(course.children("Professeur").is_empty());
    }

    #[test]
    fn test_unbalanced_document_fails() {
        let mut collect = Collect::default();
        let result = parse_document("<Export><Salle Ident=\"R1\"></Export>", &mut collect);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_latin1() {
        let bytes = b"<Salle Nom=\"Biblioth\xe8que\"/>";
        assert!(decode_document(bytes).contains("Bibliothèque"));
    }
}

//! 结构要素识别：条款编号与章节标题
//!
//! 模式匹配被隔离在 [`StructureExtractor`] 之后，累积逻辑只依赖类型化的
//! [`StructuralElement`]，因此可以脱离正则单独测试。

use std::sync::OnceLock;

use regex::Regex;

/// 行首条款编号：`1.`、`1.1`、`1.1.`、`2.3.4.` 后跟正文
const CLAUSE_PATTERN: &str = r"(?m)^[ \t]*(\d+\.(?:\d+\.?)*)[ \t]*(\S[^\n]*)$";

/// 行首章节标题：`ARTICLE|SECTION|Part <数字或罗马数字>[:.]? <标题>`
///
/// 关键字不区分大小写，罗马数字必须大写。
const SECTION_PATTERN: &str =
    r"(?mi)^[ \t]*(?:ARTICLE|SECTION|PART)[ \t]+(\d+|(?-i:[IVXLC]+))\b[:.]?[ \t]*([^\n]*)$";

/// 结构要素类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElementKind {
    /// 章节（ARTICLE / SECTION / Part）
    Section,
    /// 条款（点分数字编号）
    Clause,
}

/// 一个结构要素
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralElement {
    /// 在原文中的起始字节偏移（行首）
    pub offset: usize,
    pub kind: ElementKind,
    /// 条款编号（已去掉末尾的点）或章节编号
    pub identifier: String,
    /// 标题 / 首行正文
    pub title: String,
}

/// 结构要素提取接口
pub trait StructureExtractor: Send + Sync {
    /// 按偏移升序返回所有结构要素
    fn extract(&self, text: &str) -> Vec<StructuralElement>;
}

fn clause_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(CLAUSE_PATTERN).expect("clause pattern is valid"))
}

fn section_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(SECTION_PATTERN).expect("section pattern is valid"))
}

/// 基于正则的默认实现
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexStructureExtractor;

impl RegexStructureExtractor {
    pub fn new() -> Self {
        Self
    }
}

fn clauses(text: &str) -> impl Iterator<Item = StructuralElement> + '_ {
    clause_regex().captures_iter(text).filter_map(|caps| {
        let whole = caps.get(0)?;
        let number = caps.get(1)?.as_str().trim_end_matches('.');
        Some(StructuralElement {
            offset: whole.start(),
            kind: ElementKind::Clause,
            identifier: number.to_string(),
            title: caps.get(2)?.as_str().trim().to_string(),
        })
    })
}

fn sections(text: &str) -> impl Iterator<Item = StructuralElement> + '_ {
    section_regex().captures_iter(text).filter_map(|caps| {
        let whole = caps.get(0)?;
        Some(StructuralElement {
            offset: whole.start(),
            kind: ElementKind::Section,
            identifier: caps.get(1)?.as_str().to_string(),
            title: caps.get(2).map(|m| m.as_str().trim().to_string()).unwrap_or_default(),
        })
    })
}

impl StructureExtractor for RegexStructureExtractor {
    fn extract(&self, text: &str) -> Vec<StructuralElement> {
        let mut elements: Vec<StructuralElement> = sections(text).chain(clauses(text)).collect();
        elements.sort_by(|a, b| a.offset.cmp(&b.offset).then(a.kind.cmp(&b.kind)));
        elements
    }
}

/// 条款层级：点分数字组数（忽略末尾的点），空编号为 0
pub fn hierarchy_level(clause_number: &str) -> usize {
    let trimmed = clause_number.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return 0;
    }
    trimmed.split('.').count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_clauses() {
        let text = "1. Definitions\nSome text.\n1.1 Agreement means this contract.\n2.3.4. Deep clause";
        let elements = RegexStructureExtractor::new().extract(text);
        let ids: Vec<&str> = elements.iter().map(|e| e.identifier.as_str()).collect();

        assert_eq!(ids, vec!["1", "1.1", "2.3.4"]);
        assert!(elements.iter().all(|e| e.kind == ElementKind::Clause));
        assert_eq!(elements[0].title, "Definitions");
        assert_eq!(elements[1].title, "Agreement means this contract.");
    }

    #[test]
    fn test_extract_indented_clauses() {
        let text = "\n        5.1 The Receiving Party shall maintain confidentiality.\n        5.2 The Receiving Party shall not disclose information.\n";
        let elements = RegexStructureExtractor::new().extract(text);
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].identifier, "5.1");
        assert_eq!(elements[1].identifier, "5.2");
    }

    #[test]
    fn test_extract_sections() {
        let text = "ARTICLE I: DEFINITIONS\n1.1 Terms.\nsection 2. Payment\nPart IV Miscellaneous";
        let elements = RegexStructureExtractor::new().extract(text);

        let sections: Vec<_> = elements.iter().filter(|e| e.kind == ElementKind::Section).collect();
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].identifier, "I");
        assert_eq!(sections[0].title, "DEFINITIONS");
        assert_eq!(sections[1].identifier, "2");
        assert_eq!(sections[1].title, "Payment");
        assert_eq!(sections[2].identifier, "IV");
        assert_eq!(sections[2].title, "Miscellaneous");
    }

    #[test]
    fn test_section_requires_numeral_word() {
        let text = "Section in which the parties agree\nPart of the deal";
        assert!(RegexStructureExtractor::new().extract(text).is_empty());
    }

    #[test]
    fn test_lowercase_words_are_not_roman_numerals() {
        let text = "Part civil remedies are available\nSection ill-defined terms\nARTICLE mix of words";
        assert!(RegexStructureExtractor::new().extract(text).is_empty());

        let elements = RegexStructureExtractor::new().extract("section IV Remedies");
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].identifier, "IV");
    }

    #[test]
    fn test_prose_numbers_are_not_clauses() {
        let text = "The fee is 1000 dollars.\nIn 2024 the term ends.";
        assert!(RegexStructureExtractor::new().extract(text).is_empty());
    }

    #[test]
    fn test_elements_sorted_by_offset() {
        let text = "1. Intro\nARTICLE 2 Terms\n2.1 Body";
        let elements = RegexStructureExtractor::new().extract(text);
        let offsets: Vec<usize> = elements.iter().map(|e| e.offset).collect();
        let mut sorted = offsets.clone();
        sorted.sort();
        assert_eq!(offsets, sorted);
        assert_eq!(elements[1].kind, ElementKind::Section);
    }

    #[test]
    fn test_hierarchy_level() {
        assert_eq!(hierarchy_level(""), 0);
        assert_eq!(hierarchy_level("1"), 1);
        assert_eq!(hierarchy_level("1."), 1);
        assert_eq!(hierarchy_level("5.3"), 2);
        assert_eq!(hierarchy_level("1.1."), 2);
        assert_eq!(hierarchy_level("1.1.1"), 3);
    }
}

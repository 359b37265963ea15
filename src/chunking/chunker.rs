//! 条款感知分块器
//!
//! 优先按条款 / 章节结构累积分块，保留层级元数据；文本中没有任何条款编号时，
//! 回退到按空行分段的简单分块。整个过程是纯函数：同样的输入总是得到同样的输出。

use serde::{Deserialize, Serialize};

use super::extractor::{hierarchy_level, ElementKind, RegexStructureExtractor, StructuralElement, StructureExtractor};
use super::splitter::{split_oversized, tail_chars};

/// 累积器中段落之间的分隔
const PARAGRAPH_SEP: &str = "\n\n";

/// 分块类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Text,
    Clause,
    SectionHeader,
}

impl Default for ChunkType {
    fn default() -> Self {
        Self::Text
    }
}

/// 文档块
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 块文本（已去除首尾空白，非空）
    pub text: String,
    /// 来源文档 ID
    pub document_id: String,
    /// 文档内序号，从 0 开始连续递增
    pub chunk_index: usize,
    /// 文档显示名称
    #[serde(default)]
    pub document_name: String,
    /// 条款编号，如 "1.1.1"；无条款时为空
    #[serde(default)]
    pub clause_number: String,
    /// 所在章节标题
    #[serde(default)]
    pub section_title: String,
    /// 所在章节编号
    #[serde(default)]
    pub parent_section: String,
    /// 层级深度（条款编号的点分组数），无条款时为 0
    #[serde(default)]
    pub hierarchy_level: usize,
    /// 页码；未知时为 0
    #[serde(default)]
    pub page_number: u32,
    #[serde(default)]
    pub chunk_type: ChunkType,
}

/// 分块参数（字符数）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// 目标块大小；单个超长条款不会被截断
    pub chunk_size: usize,
    /// 相邻块之间的重叠
    pub chunk_overlap: usize,
    /// 最小块大小，低于该值的块被丢弃；0 表示不限制
    pub min_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            min_chunk_size: 100,
        }
    }
}

/// 一页已抽取的文本
#[derive(Debug, Clone, Copy)]
pub struct PageText<'a> {
    pub page_number: u32,
    pub text: &'a str,
}

/// 块的结构上下文
struct ChunkMeta<'a> {
    clause_number: &'a str,
    section_title: &'a str,
    parent_section: &'a str,
    chunk_type: ChunkType,
}

impl ChunkMeta<'static> {
    fn plain() -> Self {
        Self {
            clause_number: "",
            section_title: "",
            parent_section: "",
            chunk_type: ChunkType::Text,
        }
    }
}

/// 按发射顺序分配序号，并统一执行最小块过滤
struct ChunkSink<'a> {
    document_id: &'a str,
    document_name: &'a str,
    min_chars: usize,
    chunks: Vec<Chunk>,
}

impl<'a> ChunkSink<'a> {
    fn new(document_id: &'a str, document_name: &'a str, min_chars: usize) -> Self {
        Self {
            document_id,
            document_name,
            min_chars,
            chunks: Vec::new(),
        }
    }

    fn emit(&mut self, text: &str, meta: ChunkMeta<'_>) {
        let text = text.trim();
        if text.is_empty() || text.chars().count() < self.min_chars {
            return;
        }
        self.chunks.push(Chunk {
            text: text.to_string(),
            document_id: self.document_id.to_string(),
            chunk_index: self.chunks.len(),
            document_name: self.document_name.to_string(),
            clause_number: meta.clause_number.to_string(),
            section_title: meta.section_title.to_string(),
            parent_section: meta.parent_section.to_string(),
            hierarchy_level: hierarchy_level(meta.clause_number),
            page_number: 0,
            chunk_type: meta.chunk_type,
        });
    }
}

/// 条款感知分块器
pub struct ClauseChunker {
    config: ChunkingConfig,
    extractor: Box<dyn StructureExtractor>,
}

impl ClauseChunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self::with_extractor(config, Box::new(RegexStructureExtractor::new()))
    }

    /// 使用自定义结构提取器
    pub fn with_extractor(config: ChunkingConfig, extractor: Box<dyn StructureExtractor>) -> Self {
        let mut config = config;
        // 重叠不小于目标大小时累积器永远无法收缩
        let max_overlap = config.chunk_size / 2;
        if config.chunk_overlap > max_overlap {
            tracing::warn!(
                overlap = config.chunk_overlap,
                clamped = max_overlap,
                "chunk_overlap too large for chunk_size, clamping"
            );
            config.chunk_overlap = max_overlap;
        }
        tracing::debug!(
            chunk_size = config.chunk_size,
            overlap = config.chunk_overlap,
            min_chunk_size = config.min_chunk_size,
            "ClauseChunker initialized"
        );
        Self { config, extractor }
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// 将整篇文档切分为块
    pub fn chunk(&self, text: &str, document_id: &str, document_name: &str) -> Vec<Chunk> {
        let mut sink = ChunkSink::new(document_id, document_name, self.config.min_chunk_size);
        if text.trim().is_empty() {
            return sink.chunks;
        }

        let elements = self.extractor.extract(text);
        if elements.iter().any(|e| e.kind == ElementKind::Clause) {
            self.chunk_structured(text, &elements, &mut sink);
        } else {
            tracing::debug!(document_id, "no clause markers found, using paragraph chunking");
            self.chunk_paragraphs(text, &mut sink);
        }

        tracing::debug!(document_id, chunks = sink.chunks.len(), "chunking complete");
        sink.chunks
    }

    /// 逐页分块：写入页码，序号在整篇文档内保持连续
    pub fn chunk_pages(&self, pages: &[PageText<'_>], document_id: &str, document_name: &str) -> Vec<Chunk> {
        let mut all: Vec<Chunk> = Vec::new();
        for page in pages {
            for mut chunk in self.chunk(page.text, document_id, document_name) {
                chunk.page_number = page.page_number;
                chunk.chunk_index = all.len();
                all.push(chunk);
            }
        }
        all
    }

    fn exceeds_target(&self, acc: &str, next: &str) -> bool {
        !acc.is_empty() && acc.chars().count() + PARAGRAPH_SEP.len() + next.chars().count() > self.config.chunk_size
    }

    fn chunk_structured(&self, text: &str, elements: &[StructuralElement], sink: &mut ChunkSink<'_>) {
        let mut acc = String::new();
        // 累积器中只有当前章节自身的标题段
        let mut header_only = false;
        let mut section_id = String::new();
        let mut section_title = String::new();
        let mut clause = String::new();

        if let Some(first) = elements.first() {
            push_paragraph(&mut acc, text[..first.offset].trim());
        }

        for (i, element) in elements.iter().enumerate() {
            let end = elements.get(i + 1).map(|next| next.offset).unwrap_or(text.len());
            let span = text[element.offset..end].trim();

            match element.kind {
                ElementKind::Section => {
                    let chunk_type = flush_type(&clause, header_only);
                    sink.emit(
                        &acc,
                        ChunkMeta {
                            clause_number: &clause,
                            section_title: &section_title,
                            parent_section: &section_id,
                            chunk_type,
                        },
                    );
                    acc.clear();
                    clause.clear();
                    section_id = element.identifier.clone();
                    section_title = element.title.clone();

                    push_paragraph(&mut acc, span);
                    header_only = !acc.is_empty();
                }
                ElementKind::Clause => {
                    if self.exceeds_target(&acc, span) {
                        let flushed = acc.trim().to_string();
                        sink.emit(
                            &flushed,
                            ChunkMeta {
                                clause_number: &clause,
                                section_title: &section_title,
                                parent_section: &section_id,
                                chunk_type: flush_type(&clause, header_only),
                            },
                        );
                        acc = tail_chars(&flushed, self.config.chunk_overlap).to_string();
                    }
                    push_paragraph(&mut acc, span);
                    header_only = false;
                    clause = element.identifier.clone();
                }
            }
        }

        sink.emit(
            &acc,
            ChunkMeta {
                clause_number: &clause,
                section_title: &section_title,
                parent_section: &section_id,
                chunk_type: flush_type(&clause, header_only),
            },
        );
    }

    fn chunk_paragraphs(&self, text: &str, sink: &mut ChunkSink<'_>) {
        let window = self
            .config
            .chunk_size
            .saturating_sub(self.config.chunk_overlap + PARAGRAPH_SEP.len())
            .max(1);
        let mut acc = String::new();

        for paragraph in paragraphs(text) {
            let pieces = if paragraph.chars().count() > self.config.chunk_size {
                split_oversized(&paragraph, window)
            } else {
                vec![paragraph]
            };

            for piece in pieces {
                if self.exceeds_target(&acc, &piece) {
                    let flushed = acc.trim().to_string();
                    sink.emit(&flushed, ChunkMeta::plain());
                    acc = tail_chars(&flushed, self.config.chunk_overlap).to_string();
                }
                push_paragraph(&mut acc, &piece);
            }
        }

        sink.emit(&acc, ChunkMeta::plain());
    }
}

impl Default for ClauseChunker {
    fn default() -> Self {
        Self::new(ChunkingConfig::default())
    }
}

fn flush_type(clause: &str, header_only: bool) -> ChunkType {
    if !clause.is_empty() {
        ChunkType::Clause
    } else if header_only {
        ChunkType::SectionHeader
    } else {
        ChunkType::Text
    }
}

fn push_paragraph(acc: &mut String, paragraph: &str) {
    if paragraph.is_empty() {
        return;
    }
    if !acc.trim().is_empty() {
        acc.push_str(PARAGRAPH_SEP);
    } else {
        acc.clear();
    }
    acc.push_str(paragraph);
}

/// 按空行（可含空白字符）切分段落
fn paragraphs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                out.push(current.join("\n").trim().to_string());
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        out.push(current.join("\n").trim().to_string());
    }
    out
}

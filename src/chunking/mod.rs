//! 条款感知分块
//!
//! - **extractor**：识别条款编号与章节标题
//! - **splitter**：超长段落按分隔符切分
//! - **chunker**：按结构累积成块，无结构时回退到段落分块

pub mod chunker;
pub mod extractor;
pub mod splitter;

pub use chunker::{Chunk, ChunkType, ChunkingConfig, ClauseChunker, PageText};
pub use extractor::{hierarchy_level, ElementKind, RegexStructureExtractor, StructuralElement, StructureExtractor};

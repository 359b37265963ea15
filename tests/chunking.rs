//! 条款感知分块集成测试

use contractguard::chunking::{hierarchy_level, ChunkType, ChunkingConfig, ClauseChunker, PageText};

fn chunker(chunk_size: usize, chunk_overlap: usize) -> ClauseChunker {
    ClauseChunker::new(ChunkingConfig {
        chunk_size,
        chunk_overlap,
        min_chunk_size: 0,
    })
}

const SERVICES_AGREEMENT: &str = "\
MASTER SERVICES AGREEMENT

ARTICLE 1 DEFINITIONS

1.1 \"Confidential Information\" means any non-public information disclosed by either party.

1.1.1 Confidential Information excludes information that is already public.

1.2 \"Deliverables\" means all work product created under a statement of work.

ARTICLE 2 PAYMENT

2.1 Client shall pay all undisputed invoices within thirty days of receipt.

2.2 Late payments accrue interest at one percent per month.
";

#[test]
fn test_nested_clauses_keep_their_numbers() {
    let chunks = chunker(20, 0).chunk("1. Intro text.\n\n1.1 Sub clause text.", "doc-1", "Intro");
    assert!(chunks.len() >= 2);
    assert_eq!(chunks[1].clause_number, "1.1");
    assert_eq!(chunks[1].hierarchy_level, 2);
    assert_eq!(chunks[1].chunk_type, ChunkType::Clause);
}

#[test]
fn test_structure_metadata_is_consistent() {
    let chunks = chunker(120, 0).chunk(SERVICES_AGREEMENT, "msa", "MSA");
    assert!(!chunks.is_empty());

    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_index, i);
        assert_eq!(chunk.document_id, "msa");
        assert!(!chunk.text.trim().is_empty());
        assert_eq!(chunk.hierarchy_level, hierarchy_level(&chunk.clause_number));
    }

    let payment: Vec<_> = chunks.iter().filter(|c| c.clause_number.starts_with("2.")).collect();
    assert!(!payment.is_empty());
    assert!(payment.iter().all(|c| c.parent_section == "2" && c.section_title == "PAYMENT"));

    let nested = chunks.iter().find(|c| c.clause_number == "1.1.1").expect("1.1.1 chunk");
    assert_eq!(nested.hierarchy_level, 3);
    assert_eq!(nested.parent_section, "1");
}

#[test]
fn test_plain_prose_uses_text_chunks() {
    let sentence = "The parties agree to cooperate in good faith. ";
    let text: String = sentence.repeat(7);
    assert!(text.len() > 300);

    let chunks = chunker(50, 10).chunk(&text, "prose", "Prose");
    assert!(chunks.len() >= 300 / 50);
    for chunk in &chunks {
        assert_eq!(chunk.chunk_type, ChunkType::Text);
        assert_eq!(chunk.clause_number, "");
        assert_eq!(chunk.hierarchy_level, 0);
    }
}

#[test]
fn test_min_chunk_size_drops_fragments() {
    let config = ChunkingConfig {
        chunk_size: 1000,
        chunk_overlap: 0,
        min_chunk_size: 100,
    };
    let chunks = ClauseChunker::new(config).chunk("Short note.", "d", "D");
    assert!(chunks.is_empty());
}

#[test]
fn test_empty_and_whitespace_input() {
    let chunker = ClauseChunker::default();
    assert!(chunker.chunk("", "d", "D").is_empty());
    assert!(chunker.chunk("  \n\n\t ", "d", "D").is_empty());
}

#[test]
fn test_chunking_is_deterministic() {
    let chunker = chunker(80, 20);
    let first = chunker.chunk(SERVICES_AGREEMENT, "msa", "MSA");
    let second = chunker.chunk(SERVICES_AGREEMENT, "msa", "MSA");
    assert_eq!(first, second);
}

#[test]
fn test_pages_keep_indices_contiguous() {
    let pages = [
        PageText {
            page_number: 1,
            text: "1.1 The Supplier shall deliver the goods.\n\n1.2 Risk passes on delivery.",
        },
        PageText {
            page_number: 2,
            text: "2.1 Payment is due within thirty days.",
        },
    ];
    let chunks = chunker(45, 0).chunk_pages(&pages, "supply", "Supply");
    let indices: Vec<usize> = chunks.iter().map(|c| c.chunk_index).collect();
    assert_eq!(indices, (0..chunks.len()).collect::<Vec<_>>());
    assert_eq!(chunks.last().map(|c| c.page_number), Some(2));
    assert!(chunks.iter().any(|c| c.page_number == 1));
}

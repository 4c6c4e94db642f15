//! Header-boundary markdown chunker.
//!
//! Splits a note into [`Chunk`]s at H1/H2 headings, cleans each section for
//! embedding, and then applies two size policies:
//!
//! - **Oversize**: a section longer than `max_chars` is split on blank lines
//!   and its paragraphs are packed greedily into chunks of at most
//!   `max_chars`. A single paragraph longer than the limit stays whole.
//! - **Undersize**: a section shorter than `min_chars` is appended to the
//!   previous chunk (keeping that chunk's heading). The first chunk of a
//!   file is never merged away.
//!
//! Indices are assigned only after all splitting and merging, so they are
//! always `0..n`. Lengths are measured in characters, not bytes.
//!
//! # Example
//!
//! ```rust
//! use vault_rag_core::chunk::{chunk_markdown, ChunkingParams};
//!
//! let note = "---\ntitle: T\ntags: [a, b]\n---\n\n# H1\n\nbody text #c\n";
//! let chunks = chunk_markdown("notes/t.md", note, ChunkingParams::default());
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].heading, "H1");
//! assert_eq!(chunks[0].metadata.title, "T");
//! ```

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::clean::clean_content_for_embedding;
use crate::models::{Chunk, ChunkMetadata};
use crate::parser::{
    extract_tags, extract_tags_from_frontmatter, extract_wikilinks, get_title_from_content,
    parse_frontmatter,
};

pub const DEFAULT_MIN_CHARS: usize = 100;
pub const DEFAULT_MAX_CHARS: usize = 2000;

const PARAGRAPH_SEPARATOR: &str = "\n\n";

static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,2})\s+(.+)$").expect("valid header regex"));

/// Size thresholds for [`chunk_markdown`], in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingParams {
    pub min_chars: usize,
    pub max_chars: usize,
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            min_chars: DEFAULT_MIN_CHARS,
            max_chars: DEFAULT_MAX_CHARS,
        }
    }
}

struct Section<'a> {
    heading: String,
    level: u8,
    lines: Vec<&'a str>,
}

/// A chunk before tags, hash, and index are fixed.
struct Draft {
    content: String,
    heading: String,
    level: u8,
}

/// Chunk one note's raw content.
///
/// `file_path` is the repo-relative path recorded on every chunk. A note
/// that is only frontmatter (or only whitespace) yields no chunks.
pub fn chunk_markdown(file_path: &str, raw: &str, params: ChunkingParams) -> Vec<Chunk> {
    let (frontmatter, body) = parse_frontmatter(raw);

    let title = get_title_from_content(&body, &frontmatter);
    let frontmatter_tags: BTreeSet<String> =
        extract_tags_from_frontmatter(&frontmatter).into_iter().collect();
    let links = extract_wikilinks(&body);

    let mut drafts: Vec<Draft> = Vec::new();

    for section in split_sections(&body) {
        let section_text = section.lines.join("\n");
        let section_text = section_text.trim();
        if section_text.is_empty() && section.heading.is_empty() {
            continue;
        }

        let cleaned = clean_content_for_embedding(section_text);
        let full = match (section.heading.is_empty(), cleaned.is_empty()) {
            (true, _) => cleaned,
            (false, true) => section.heading.clone(),
            (false, false) => format!("{}{}{}", section.heading, PARAGRAPH_SEPARATOR, cleaned),
        };
        if full.is_empty() {
            continue;
        }

        let len = char_len(&full);
        if len > params.max_chars {
            for piece in pack_paragraphs(&full, params.max_chars) {
                drafts.push(Draft {
                    content: piece,
                    heading: section.heading.clone(),
                    level: section.level,
                });
            }
        } else if let Some(prev) = drafts
            .last_mut()
            .filter(|prev| len < params.min_chars && fits_after(prev, len, params.max_chars))
        {
            prev.content.push_str(PARAGRAPH_SEPARATOR);
            prev.content.push_str(&full);
        } else {
            drafts.push(Draft {
                content: full,
                heading: section.heading,
                level: section.level,
            });
        }
    }

    drafts
        .into_iter()
        .enumerate()
        .map(|(index, draft)| {
            let mut tags = frontmatter_tags.clone();
            tags.extend(extract_tags(&draft.content));

            Chunk {
                file_path: file_path.to_string(),
                chunk_index: index,
                hash: content_hash(&draft.content),
                content: draft.content,
                heading: draft.heading,
                heading_level: draft.level,
                metadata: ChunkMetadata {
                    title: title.clone(),
                    tags,
                    links: links.clone(),
                    frontmatter: frontmatter.extra.clone(),
                },
            }
        })
        .collect()
}

/// Whether appending `len` chars to `prev` keeps it within `max_chars`.
fn fits_after(prev: &Draft, len: usize, max_chars: usize) -> bool {
    char_len(&prev.content) + PARAGRAPH_SEPARATOR.len() + len <= max_chars
}

/// Walk the body line by line, opening a new section at every H1/H2.
fn split_sections(body: &str) -> Vec<Section<'_>> {
    let mut sections = Vec::new();
    let mut current = Section {
        heading: String::new(),
        level: 0,
        lines: Vec::new(),
    };

    for line in body.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        match HEADER_RE.captures(line) {
            Some(caps) => {
                let next = Section {
                    heading: caps[2].trim_end().to_string(),
                    level: caps[1].len() as u8,
                    lines: Vec::new(),
                };
                let prev = std::mem::replace(&mut current, next);
                if !prev.lines.is_empty() || !prev.heading.is_empty() {
                    sections.push(prev);
                }
            }
            None => current.lines.push(line),
        }
    }

    if !current.lines.is_empty() || !current.heading.is_empty() {
        sections.push(current);
    }
    sections
}

/// Greedily pack blank-line-separated paragraphs into pieces of at most
/// `max_chars` (separator included). Oversized paragraphs stand alone.
fn pack_paragraphs(text: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut buf = String::new();

    for para in text.split(PARAGRAPH_SEPARATOR) {
        if char_len(&buf) + char_len(para) + PARAGRAPH_SEPARATOR.len() > max_chars {
            if !buf.is_empty() {
                pieces.push(std::mem::take(&mut buf));
            }
            buf.push_str(para);
        } else {
            if !buf.is_empty() {
                buf.push_str(PARAGRAPH_SEPARATOR);
            }
            buf.push_str(para);
        }
    }

    if !buf.is_empty() {
        pieces.push(buf);
    }
    pieces
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(raw: &str) -> Vec<Chunk> {
        chunk_markdown("notes/test.md", raw, ChunkingParams::default())
    }

    fn long_text(sentence: &str, times: usize) -> String {
        sentence.repeat(times).trim().to_string()
    }

    #[test]
    fn test_frontmatter_scenario() {
        let chunks = chunk("---\ntitle: T\ntags: [a,b]\n---\n\n# H1\n\nbody text #c\n");
        assert_eq!(chunks.len(), 1);
        let c = &chunks[0];
        assert_eq!(c.heading, "H1");
        assert_eq!(c.heading_level, 1);
        assert_eq!(c.metadata.title, "T");
        let tags: Vec<&str> = c.metadata.tags.iter().map(String::as_str).collect();
        assert_eq!(tags, vec!["a", "b", "c"]);
        assert_eq!(c.content, "H1\n\nbody text #c");
        assert_eq!(c.file_path, "notes/test.md");
    }

    #[test]
    fn test_multiple_sections() {
        let body = long_text("This is long enough content for a section. ", 5);
        let raw = format!("# Main\n\n{body}\n\n## First\n\n{body}\n\n## Second\n\n{body}\n");
        let chunks = chunk(&raw);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].heading, "Main");
        assert_eq!(chunks[0].heading_level, 1);
        assert_eq!(chunks[1].heading, "First");
        assert_eq!(chunks[1].heading_level, 2);
        assert_eq!(chunks[2].heading, "Second");
    }

    #[test]
    fn test_h3_does_not_split() {
        let body = long_text("Enough words to stay above the minimum size here. ", 3);
        let raw = format!("# Top\n\n{body}\n\n### Deep\n\n{body}\n");
        let chunks = chunk(&raw);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.contains("### Deep"));
    }

    #[test]
    fn test_oversize_section_split_by_paragraphs() {
        let para = "x".repeat(99);
        let paras: Vec<String> = (0..50).map(|_| para.clone()).collect();
        let raw = format!("# Big\n\n{}", paras.join("\n\n"));
        let chunks = chunk(&raw);

        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.content.chars().count() <= 2000, "chunk too large");
            assert_eq!(c.heading, "Big");
            assert_eq!(c.heading_level, 1);
        }
    }

    #[test]
    fn test_single_huge_paragraph_kept_whole() {
        let para = "y".repeat(600);
        let raw = format!("# H\n\nshort intro\n\n{para}");
        let chunks = chunk_markdown(
            "a.md",
            &raw,
            ChunkingParams {
                min_chars: 10,
                max_chars: 500,
            },
        );
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "H\n\nshort intro");
        assert_eq!(chunks[1].content, para);
    }

    #[test]
    fn test_small_sections_merge_into_previous() {
        let raw = "# Title\n\nshort\n\n## Section 1\n\nshort\n\n## Section 2\n\nalso short";
        let chunks = chunk(raw);
        assert_eq!(chunks.len(), 1);
        let c = &chunks[0];
        assert_eq!(c.heading, "Title");
        assert_eq!(c.heading_level, 1);
        assert_eq!(
            c.content,
            "Title\n\nshort\n\nSection 1\n\nshort\n\nSection 2\n\nalso short"
        );
    }

    #[test]
    fn test_small_section_not_merged_past_max() {
        let first = "a".repeat(900);
        let second = "b".repeat(1083);
        let raw = format!("# A\n\n{first}\n\n{second}\n\n## B\n\ntiny tail");
        let chunks = chunk(&raw);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content.chars().count(), 1988);
        assert_eq!(chunks[1].content, "B\n\ntiny tail");
        assert_eq!(chunks[1].heading, "B");
        assert_eq!(chunks[1].heading_level, 2);
        for c in &chunks {
            assert!(c.content.chars().count() <= 2000);
        }
    }

    #[test]
    fn test_first_small_chunk_is_kept() {
        let chunks = chunk("tiny");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "tiny");
        assert_eq!(chunks[0].heading, "");
        assert_eq!(chunks[0].heading_level, 0);
    }

    #[test]
    fn test_merged_chunk_picks_up_inline_tags() {
        let body = long_text("A paragraph that is definitely over the minimum size. ", 3);
        let raw = format!("# A\n\n{body}\n\n## B\n\nsmall #late");
        let chunks = chunk(&raw);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].metadata.tags.contains("late"));
    }

    #[test]
    fn test_indices_contiguous_after_merges() {
        let long = long_text("Long enough to be its own chunk for sure, yes. ", 4);
        let raw = format!(
            "# A\n\n{long}\n\n## B\n\nx\n\n## C\n\n{long}\n\n## D\n\ny\n\n## E\n\n{long}"
        );
        let chunks = chunk(&raw);
        assert_eq!(chunks.len(), 3);
        let indices: Vec<usize> = chunks.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_frontmatter_only_yields_nothing() {
        assert!(chunk("---\ntitle: Empty\n---\n").is_empty());
        assert!(chunk("").is_empty());
        assert!(chunk("   \n\n  ").is_empty());
    }

    #[test]
    fn test_heading_without_body() {
        let chunks = chunk("# Lonely");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Lonely");
    }

    #[test]
    fn test_leading_headerless_section() {
        let long = long_text("Preamble text that comes before any heading at all. ", 3);
        let raw = format!("{long}\n\n# Later\n\n{long}");
        let chunks = chunk(&raw);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].heading_level, 0);
        assert_eq!(chunks[1].heading, "Later");
    }

    #[test]
    fn test_wikilinks_cleaned_in_content() {
        let chunks = chunk("# Title\n\n[[NoteLink]] and [[Other|Alias]] included");
        assert!(!chunks[0].content.contains("[["));
        assert!(chunks[0].content.contains("NoteLink"));
        assert!(chunks[0].content.contains("Alias"));
        assert!(chunks[0].metadata.links.contains("NoteLink"));
        assert!(chunks[0].metadata.links.contains("Other"));
    }

    #[test]
    fn test_frontmatter_extra_carried() {
        let chunks = chunk("---\ntitle: T\nauthor: someone\n---\nbody");
        let fm = &chunks[0].metadata.frontmatter;
        assert_eq!(fm.get("author"), Some(&serde_json::json!("someone")));
        assert!(!fm.contains_key("title"));
        assert!(!fm.contains_key("tags"));
    }

    #[test]
    fn test_hash_and_id() {
        let a = chunk("# Same\n\ncontent");
        let b = chunk_markdown("other/path.md", "# Same\n\ncontent", ChunkingParams::default());
        assert_eq!(a[0].hash, b[0].hash);
        assert_eq!(a[0].id(), "notes/test.md::0");
        assert_eq!(b[0].id(), "other/path.md::0");
    }

    #[test]
    fn test_multibyte_lengths_are_characters() {
        let para = "가".repeat(40);
        let raw = format!("# 제목\n\n{para}\n\n{para}");
        let chunks = chunk_markdown(
            "k.md",
            &raw,
            ChunkingParams {
                min_chars: 1,
                max_chars: 90,
            },
        );
        // "제목" (2) + sep (2) + 40 + sep (2) + 40 = 86 chars, fits in one.
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_deterministic() {
        let raw = "# A\n\nAlpha #x\n\n## B\n\nBeta [[Link]]";
        assert_eq!(chunk(raw), chunk(raw));
    }
}

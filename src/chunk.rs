//! Two-stage document chunker.
//!
//! Stage 1 splits on a priority-ordered list of structural separators
//! (markdown headers, list markers, paragraph breaks, lines, spaces) with a
//! character budget, preserving semantic boundaries where possible. Stage 2
//! re-splits the results on a token budget so no chunk exceeds what should
//! be sent to the language model per passage, regardless of how stage 1 cut.
//!
//! Splitting is lossless: separators stay attached to the following piece,
//! so the concatenation of a document's chunks (minus overlaps) reconstructs
//! the normalized source. Each chunk is stamped with its position, the batch
//! total, a SHA-256 content hash, and the stable id derived from
//! `(file, content_hash, position)`.

use crate::config::ChunkingConfig;
use crate::identity;
use crate::models::{Chunk, Document};

/// Structural separators in priority order, most semantic first.
const STRUCTURAL_SEPARATORS: &[&str] = &[
    "\n## ", "\n# ", "\n### ", "\n- ", "\n• ", "\n1. ", "\nStep ", "\n\n", "\n", " ",
];

/// Approximate chars-per-token ratio used by the stage-2 budget.
const CHARS_PER_TOKEN: usize = 4;

/// Chunk a batch of documents.
///
/// Output order matches input document order, sub-ordered by position;
/// `chunk_position` is the index in the final output order of the batch
/// (per-document ingestion processes one document per trigger, which keeps
/// positions dense per `doc_id`).
pub fn chunk_documents(docs: &[Document], cfg: &ChunkingConfig) -> Vec<Chunk> {
    let mut texts: Vec<(usize, String)> = Vec::new();

    for (doc_idx, doc) in docs.iter().enumerate() {
        for piece in split_structural(&doc.text, cfg.target_chars, cfg.overlap_chars) {
            for sub in resplit_tokens(&piece, cfg.target_tokens, cfg.overlap_tokens) {
                if sub.trim().is_empty() {
                    continue;
                }
                texts.push((doc_idx, sub));
            }
        }
    }

    let total = texts.len();
    texts
        .into_iter()
        .enumerate()
        .map(|(position, (doc_idx, text))| {
            let doc = &docs[doc_idx];
            let content_hash = identity::content_hash(&text);
            let chunk_id = identity::chunk_id(&doc.file, &content_hash, position);
            Chunk {
                chunk_id,
                doc_id: doc.doc_id.clone(),
                text,
                chunk_position: position,
                total_chunks: total,
                content_hash,
                file: doc.file.clone(),
                source: doc.source.clone(),
            }
        })
        .collect()
}

/// Stage 1: structural split with a character budget.
fn split_structural(text: &str, target_chars: usize, overlap_chars: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let pieces = atomize(text, STRUCTURAL_SEPARATORS, target_chars);
    merge(pieces, target_chars, overlap_chars)
}

/// Stage 2: token-budget resplit of one stage-1 chunk.
fn resplit_tokens(text: &str, target_tokens: usize, overlap_tokens: usize) -> Vec<String> {
    let max_chars = target_tokens * CHARS_PER_TOKEN;
    if char_len(text) <= max_chars {
        return vec![text.to_string()];
    }
    let pieces = split_words_keep_space(text);
    merge(pieces, max_chars, overlap_tokens * CHARS_PER_TOKEN)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Recursively break `text` into pieces no larger than `target`, trying each
/// separator in priority order and falling back to a hard character split
/// when none divides the text.
fn atomize(text: &str, separators: &[&str], target: usize) -> Vec<String> {
    if char_len(text) <= target {
        return vec![text.to_string()];
    }
    for (i, sep) in separators.iter().enumerate() {
        if !text.contains(sep) {
            continue;
        }
        let parts = split_keep_separator(text, sep);
        if parts.len() <= 1 {
            continue;
        }
        return parts
            .iter()
            .flat_map(|p| atomize(p, &separators[i + 1..], target))
            .collect();
    }
    hard_split(text, target)
}

/// Split on `sep`, keeping the separator glued to the start of the
/// following part so concatenating the parts reproduces the input.
fn split_keep_separator(text: &str, sep: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(sep) {
        if idx > start {
            parts.push(text[start..idx].to_string());
        }
        start = idx;
    }
    parts.push(text[start..].to_string());
    parts
}

/// Whitespace-boundary pieces; whitespace stays attached to the preceding
/// word so concatenating the pieces reproduces the input.
fn split_words_keep_space(text: &str) -> Vec<String> {
    let mut parts: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut prev_ws = true;
    for c in text.chars() {
        if !c.is_whitespace() && prev_ws && !buf.is_empty() {
            parts.push(std::mem::take(&mut buf));
        }
        buf.push(c);
        prev_ws = c.is_whitespace();
    }
    if !buf.is_empty() {
        parts.push(buf);
    }
    parts
}

fn hard_split(text: &str, target: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut n = 0;
    for c in text.chars() {
        buf.push(c);
        n += 1;
        if n == target {
            out.push(std::mem::take(&mut buf));
            n = 0;
        }
    }
    if !buf.is_empty() {
        out.push(buf);
    }
    out
}

/// Greedily merge pieces into chunks of at most `target` chars, carrying at
/// most `overlap` chars of trailing pieces into the next chunk.
fn merge(pieces: Vec<String>, target: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = 0;

    for piece in pieces {
        let piece_len = char_len(&piece);
        if current_len + piece_len > target && !current.is_empty() {
            chunks.push(current.concat());

            let mut kept: Vec<String> = Vec::new();
            let mut kept_len = 0;
            for p in current.iter().rev() {
                let l = char_len(p);
                if kept_len + l > overlap {
                    break;
                }
                kept_len += l;
                kept.push(p.clone());
            }
            kept.reverse();
            current = kept;
            current_len = kept_len;
        }
        current_len += piece_len;
        current.push(piece);
    }

    if !current.is_empty() {
        chunks.push(current.concat());
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(doc_id: &str, text: &str) -> Document {
        Document {
            doc_id: doc_id.to_string(),
            source: "filesystem".to_string(),
            file: doc_id.to_string(),
            etag: "etag".to_string(),
            text: text.to_string(),
        }
    }

    fn cfg(target_chars: usize, overlap_chars: usize) -> ChunkingConfig {
        ChunkingConfig {
            target_chars,
            overlap_chars,
            target_tokens: 700,
            overlap_tokens: 0,
        }
    }

    #[test]
    fn small_document_is_a_single_chunk() {
        let chunks = chunk_documents(&[doc("a.txt", "Krótki dokument testowy.")], &cfg(2000, 200));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_position, 0);
        assert_eq!(chunks[0].total_chunks, 1);
        assert_eq!(chunks[0].text, "Krótki dokument testowy.");
        assert_eq!(chunks[0].content_hash, identity::content_hash(&chunks[0].text));
    }

    #[test]
    fn empty_document_yields_no_chunks() {
        assert!(chunk_documents(&[doc("a.txt", "")], &cfg(2000, 200)).is_empty());
    }

    #[test]
    fn splits_on_paragraph_boundaries() {
        let text = "Pierwszy akapit.\n\nDrugi akapit.\n\nTrzeci akapit.";
        let chunks = chunk_documents(&[doc("a.txt", text)], &cfg(30, 0));
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(!c.text.contains("akapit.\n\nDrugi"), "split should land on \\n\\n");
        }
    }

    #[test]
    fn positions_are_contiguous_and_batch_global() {
        let a = doc("a.txt", "Pierwszy akapit.\n\nDrugi akapit.\n\nTrzeci akapit.");
        let b = doc("b.txt", "Czwarty akapit.\n\nPiąty akapit.");
        let chunks = chunk_documents(&[a, b], &cfg(20, 0));
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_position, i);
            assert_eq!(c.total_chunks, chunks.len());
        }
        // Document order is preserved: all of a.txt before any of b.txt.
        let first_b = chunks.iter().position(|c| c.doc_id == "b.txt").unwrap();
        assert!(chunks[..first_b].iter().all(|c| c.doc_id == "a.txt"));
        assert!(chunks[first_b..].iter().all(|c| c.doc_id == "b.txt"));
    }

    #[test]
    fn zero_overlap_chunks_reconstruct_the_source() {
        let text = "Zasady pracy zdalnej.\n\nPracownik zgłasza wniosek w systemie.\n\n- wniosek urlopowy\n- zgoda przełożonego\n\nDecyzja zapada w ciągu dwóch dni.";
        let chunks = chunk_documents(&[doc("a.txt", text)], &cfg(40, 0));
        let rebuilt: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn overlapping_chunks_reconstruct_the_source() {
        let text = "Jeden dwa trzy cztery pięć sześć siedem osiem dziewięć dziesięć jedenaście dwanaście trzynaście czternaście piętnaście.";
        let chunks = chunk_documents(&[doc("a.txt", text)], &cfg(30, 12));
        assert!(chunks.len() > 1);

        // Strip each chunk's overlap prefix (the longest prefix that is a
        // suffix of what is already rebuilt) and expect the full source back.
        let mut rebuilt = chunks[0].text.clone();
        for c in &chunks[1..] {
            let mut skip = 0;
            for (idx, _) in c.text.char_indices().chain([(c.text.len(), ' ')]) {
                if idx > 0 && rebuilt.ends_with(&c.text[..idx]) {
                    skip = idx;
                }
            }
            rebuilt.push_str(&c.text[skip..]);
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn token_budget_bounds_oversized_pieces() {
        let word = "słowo ";
        let text = word.repeat(60); // one long line, no structural separators
        let chunks_cfg = ChunkingConfig {
            target_chars: 10_000,
            overlap_chars: 0,
            target_tokens: 10,
            overlap_tokens: 2,
        };
        let chunks = chunk_documents(&[doc("a.txt", text.trim_end())], &chunks_cfg);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.chars().count() <= 10 * 4 + 8 + 6, "chunk too large: {}", c.text.len());
        }
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "Pierwszy akapit.\n\nDrugi akapit.\n\nTrzeci akapit.";
        let a = chunk_documents(&[doc("a.txt", text)], &cfg(30, 10));
        let b = chunk_documents(&[doc("a.txt", text)], &cfg(30, 10));
        assert_eq!(a, b);
    }
}

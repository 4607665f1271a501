//! Extraction-artifact repair and paragraph reconstruction.
//!
//! PDF extractors routinely inject newlines inside words (`Podró\nż\ne`),
//! hyphen-break words across lines, and drop short suffixes onto their own
//! line. Retrieval and judging quality depend on coherent paragraph
//! boundaries, so [`normalize`] repairs the line stream before chunking:
//!
//! 1. Canonicalize line endings; non-breaking spaces become plain spaces.
//! 2. De-hyphenate words broken across a line break.
//! 3. Collapse runs of 3+ newlines to a paragraph separator.
//! 4. Reassemble runs of single-letter lines into one token, splicing short
//!    lowercase tokens back onto the previous line.
//! 5. Reattach short lowercase suffix lines to the previous line.
//! 6. Rebuild paragraphs: join wrapped prose lines, keep structural lines
//!    (bullets, numbered items, headings) on their own line, and drop blank
//!    lines that are soft wraps rather than real paragraph breaks.
//! 7. Final whitespace collapse and trim.
//!
//! The function is pure and total: it never fails, and empty input yields
//! empty output. Running it twice yields the same result as running it once.

use regex::Regex;
use std::sync::LazyLock;

static DEHYPHENATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?P<a>\w)-\n(?P<b>\w)").expect("static pattern"));
static TRIM_AROUND_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]*\n[ \t]*").expect("static pattern"));
static MANY_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("static pattern"));
static NUMBERED_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+[.)]\s").expect("static pattern"));

/// Normalize text extracted from a source document.
pub fn normalize(text: &str) -> String {
    if text.trim().is_empty() {
        return String::new();
    }

    let mut t = text
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\u{a0}', " ");

    // De-hyphenation can expose a new hyphen break at a match boundary, so
    // run to a fixed point (two passes in practice).
    loop {
        let joined = DEHYPHENATE.replace_all(&t, "${a}${b}").into_owned();
        if joined == t {
            break;
        }
        t = joined;
    }

    let t = TRIM_AROUND_NEWLINES.replace_all(&t, "\n");
    let t = MANY_NEWLINES.replace_all(&t, "\n\n");

    let lines: Vec<String> = t.split('\n').map(str::to_string).collect();
    let lines = reassemble_letter_runs(lines);
    let lines = reattach_short_suffixes(lines);
    let rebuilt = rebuild_paragraphs(&lines);

    MANY_NEWLINES.replace_all(&rebuilt, "\n\n").trim().to_string()
}

fn is_single_letter_line(line: &str) -> bool {
    let mut chars = line.trim().chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_alphabetic())
}

/// True when a reassembled token or suffix may be spliced onto `prev`:
/// the line ends in a letter (no sentence-final punctuation) and is not a
/// list item.
fn mergeable(prev: &str) -> bool {
    let t = prev.trim_end();
    match t.chars().last() {
        Some(c) => c.is_alphabetic() && !is_bullet_line(t) && !is_numbered_line(t),
        None => false,
    }
}

fn is_bullet_line(line: &str) -> bool {
    ["- ", "* ", "• ", "– "]
        .iter()
        .any(|marker| line.starts_with(marker))
}

fn is_numbered_line(line: &str) -> bool {
    NUMBERED_ITEM.is_match(line)
}

/// Splice `token` onto the most recent non-blank line, if any and mergeable.
fn splice_onto_previous(out: &mut [String], token: &str) -> bool {
    for line in out.iter_mut().rev() {
        if line.trim().is_empty() {
            continue;
        }
        if mergeable(line) {
            line.push_str(token);
            return true;
        }
        return false;
    }
    false
}

/// Step 4: concatenate maximal runs of single-letter lines into one token.
///
/// A short (≤2 chars) lowercase token is a word fragment the extractor tore
/// off the previous line; anything longer, or capitalized, stands on its own
/// (vertically-typeset headings come out this way).
fn reassemble_letter_runs(lines: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        if !is_single_letter_line(&lines[i]) {
            out.push(lines[i].clone());
            i += 1;
            continue;
        }

        let mut token = String::new();
        while i < lines.len() && is_single_letter_line(&lines[i]) {
            token.extend(lines[i].trim().chars());
            i += 1;
        }

        let short_lowercase =
            token.chars().count() <= 2 && token.chars().all(char::is_lowercase);
        if !(short_lowercase && splice_onto_previous(&mut out, &token)) {
            out.push(token);
        }
    }
    out
}

/// Step 5: merge short (2–4 char) lowercase alphabetic lines onto the
/// previous line under the same mergeable predicate as letter runs.
fn reattach_short_suffixes(lines: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for line in lines {
        let t = line.trim();
        let count = t.chars().count();
        let is_suffix = (2..=4).contains(&count)
            && t.chars().all(|c| c.is_alphabetic() && c.is_lowercase());
        if is_suffix && splice_onto_previous(&mut out, t) {
            continue;
        }
        out.push(line);
    }
    out
}

fn ends_in_terminal_punct(line: &str) -> bool {
    matches!(line.trim_end().chars().last(), Some('.' | '!' | '?' | '…'))
}

/// Structural lines are emitted verbatim on their own line: list items,
/// markdown headings, and heading-like lines (short, starts uppercase, no
/// terminal sentence punctuation, at most one comma, or ending in a colon).
fn is_structural(line: &str) -> bool {
    let t = line.trim();
    if t.is_empty() {
        return false;
    }
    if t.starts_with('#') || is_bullet_line(t) || is_numbered_line(t) {
        return true;
    }
    if t.ends_with(':') {
        return true;
    }
    let first_upper = t.chars().next().is_some_and(char::is_uppercase);
    first_upper
        && !ends_in_terminal_punct(t)
        && t.chars().count() <= 100
        && t.split_whitespace().count() <= 8
        && t.matches(',').count() <= 1
}

#[derive(Clone, Copy, PartialEq)]
enum BlockKind {
    Paragraph,
    Structural,
}

/// Step 6: paragraph reconstruction.
///
/// Consecutive prose lines join into one paragraph. A blank line is a hard
/// paragraph break only when the preceding line ends in terminal
/// punctuation, either neighbor is structural, or the preceding line is
/// long (≥80 chars); otherwise it is a soft wrap and the paragraph
/// continues across it.
fn rebuild_paragraphs(lines: &[String]) -> String {
    let mut out = String::new();
    let mut prev_kind: Option<BlockKind> = None;
    let mut hard_gap = false;
    let mut para: Vec<&str> = Vec::new();

    fn emit(
        out: &mut String,
        prev_kind: &mut Option<BlockKind>,
        hard_gap: &mut bool,
        kind: BlockKind,
        text: &str,
    ) {
        if !out.is_empty() {
            // Adjacent structural lines (list items) stay on consecutive
            // lines unless the source had a real break between them.
            let tight = kind == BlockKind::Structural
                && *prev_kind == Some(BlockKind::Structural)
                && !*hard_gap;
            out.push_str(if tight { "\n" } else { "\n\n" });
        }
        out.push_str(text);
        *prev_kind = Some(kind);
        *hard_gap = false;
    }

    for (i, line) in lines.iter().enumerate() {
        let t = line.trim();
        if t.is_empty() {
            let prev = lines[..i].iter().rev().find(|l| !l.trim().is_empty());
            let next = lines[i + 1..].iter().find(|l| !l.trim().is_empty());
            let Some(prev) = prev else { continue };
            let hard = ends_in_terminal_punct(prev)
                || is_structural(prev)
                || next.is_some_and(|n| is_structural(n))
                || prev.trim().chars().count() >= 80;
            if hard {
                if !para.is_empty() {
                    emit(
                        &mut out,
                        &mut prev_kind,
                        &mut hard_gap,
                        BlockKind::Paragraph,
                        &para.join(" "),
                    );
                    para.clear();
                }
                hard_gap = true;
            }
            continue;
        }

        if is_structural(t) {
            if !para.is_empty() {
                emit(
                    &mut out,
                    &mut prev_kind,
                    &mut hard_gap,
                    BlockKind::Paragraph,
                    &para.join(" "),
                );
                para.clear();
            }
            emit(&mut out, &mut prev_kind, &mut hard_gap, BlockKind::Structural, t);
        } else {
            para.push(t);
        }
    }

    if !para.is_empty() {
        emit(
            &mut out,
            &mut prev_kind,
            &mut hard_gap,
            BlockKind::Paragraph,
            &para.join(" "),
        );
    }

    out
}

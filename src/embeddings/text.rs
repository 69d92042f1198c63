//! Text cleanup and chunking before embedding

use crate::errors::GrantScoutError;
use crate::errors::Result;

/// Collapse all whitespace runs, newlines included, to single spaces
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Replace control characters with spaces
fn sanitize_text(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

/// Clean a text for embedding; empty results are an error
pub fn prepare_text(text: &str) -> Result<String> {
    let cleaned = normalize_whitespace(&sanitize_text(text));
    if cleaned.is_empty() {
        return Err(GrantScoutError::Embedding(
            "Text contains only whitespace after preprocessing".to_string(),
        ));
    }
    Ok(cleaned)
}

/// Largest char boundary not after `max` bytes
fn floor_boundary(text: &str, max: usize) -> usize {
    if max >= text.len() {
        return text.len();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    end
}

/// Split at the last sentence end within `max` bytes, else the last space,
/// else hard at the boundary
fn split_point(text: &str, max: usize) -> usize {
    let end = floor_boundary(text, max);
    let window = &text[..end];
    if let Some(pos) = window.rfind(". ").filter(|&pos| pos > max / 4) {
        return pos + 1;
    }
    if let Some(pos) = window.rfind(' ').filter(|&pos| pos > 0) {
        return pos;
    }
    end.max(text.chars().next().map_or(1, char::len_utf8))
}

/// Paragraph-aware chunks of at most `max_chunk_size` bytes
pub fn chunk_text(text: &str, max_chunk_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    for paragraph in text.split("\n\n") {
        let Ok(cleaned) = prepare_text(paragraph) else {
            continue;
        };
        let mut remaining = cleaned.as_str();
        while !remaining.is_empty() {
            if remaining.len() <= max_chunk_size {
                chunks.push(remaining.to_string());
                break;
            }
            let at = split_point(remaining, max_chunk_size);
            chunks.push(remaining[..at].trim_end().to_string());
            remaining = remaining[at..].trim_start();
        }
    }
    chunks
}

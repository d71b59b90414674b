//! Sentence-aware chunking.
//!
//! Text is split on sentence terminators (`.`, `!`, `?` followed by
//! whitespace) and sentences are packed greedily until the soft token cap
//! would be exceeded. A chunk never ends mid-sentence; a single sentence
//! longer than the cap becomes a chunk of its own. Chunks do not overlap.

/// Whitespace token count; cheap and stable across providers.
pub fn token_count(s: &str) -> usize {
    s.split_whitespace().count()
}

/// Split normalized text into trimmed sentences.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            // swallow runs like "?!" or "..."
            let mut end = i + c.len_utf8();
            while let Some(&(j, n)) = chars.peek() {
                if matches!(n, '.' | '!' | '?' | '"' | '\'' | ')') {
                    end = j + n.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            let at_boundary = chars.peek().map_or(true, |&(_, n)| n.is_whitespace());
            if at_boundary {
                let s = text[start..end].trim();
                if !s.is_empty() {
                    out.push(s);
                }
                start = end;
            }
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

/// Pack sentences into chunks of at most `max_tokens` (soft cap).
pub fn chunk_text(text: &str, max_tokens: usize) -> Vec<String> {
    let max_tokens = max_tokens.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_tokens = 0usize;

    for sentence in split_sentences(text) {
        let n = token_count(sentence);
        if current_tokens > 0 && current_tokens + n > max_tokens {
            chunks.push(std::mem::take(&mut current));
            current_tokens = 0;
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(sentence);
        current_tokens += n;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_terminators_followed_by_space() {
        let s = split_sentences("Shares fell 3.5% today. Why?! Analysts \"disagree.\" End");
        assert_eq!(
            s,
            vec![
                "Shares fell 3.5% today.",
                "Why?!",
                "Analysts \"disagree.\"",
                "End"
            ]
        );
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = chunk_text("Apple Faces Lawsuit. Major legal trouble for Apple.", 400);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains("Lawsuit"));
    }

    #[test]
    fn chunks_respect_cap_and_never_split_sentences() {
        let sentence = "one two three four five.";
        let text = std::iter::repeat(sentence).take(10).collect::<Vec<_>>().join(" ");
        let chunks = chunk_text(&text, 12);
        assert_eq!(chunks.len(), 5);
        for c in &chunks {
            assert!(token_count(c) <= 12);
            assert!(c.ends_with('.'));
        }
        // no overlap: re-joining gives back the original
        assert_eq!(chunks.join(" "), text);
    }

    #[test]
    fn oversized_sentence_stands_alone() {
        let long = (0..30).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ") + ".";
        let text = format!("Short one. {long} Tail.");
        let chunks = chunk_text(&text, 10);
        assert_eq!(chunks, vec!["Short one.".to_string(), long, "Tail.".to_string()]);
    }
}

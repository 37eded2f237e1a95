//! Word-level sub-diff for a deleted/inserted line pair.

use super::lcs::lcs_pairs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Word,
    Space,
    Punct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    pub kind: TokenKind,
}

impl Token<'_> {
    pub fn is_space(&self) -> bool {
        self.kind == TokenKind::Space
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordSpan {
    pub text: String,
    pub changed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordDiff {
    pub old: Vec<WordSpan>,
    pub new: Vec<WordSpan>,
}

/// Runs of word characters, runs of whitespace, and single punctuation
/// characters.
pub fn tokenize(line: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut start = 0usize;
    let mut current: Option<TokenKind> = None;

    for (index, ch) in line.char_indices() {
        let kind = classify(ch);
        match current {
            Some(open) if open == kind && kind != TokenKind::Punct => continue,
            Some(open) => tokens.push(Token {
                text: &line[start..index],
                kind: open,
            }),
            None => {}
        }
        start = index;
        current = Some(kind);
    }
    if let Some(kind) = current {
        tokens.push(Token {
            text: &line[start..],
            kind,
        });
    }
    tokens
}

fn classify(ch: char) -> TokenKind {
    if ch.is_whitespace() {
        TokenKind::Space
    } else if ch.is_alphanumeric() || ch == '_' {
        TokenKind::Word
    } else {
        TokenKind::Punct
    }
}

/// Word diff of two lines, or `None` when they share too little to make
/// per-token highlighting meaningful. The pair qualifies only when common
/// non-whitespace tokens exceed `threshold` of the shorter line's
/// non-whitespace token count.
pub fn word_diff(old: &str, new: &str, threshold: f64) -> Option<WordDiff> {
    let old_tokens = tokenize(old);
    let new_tokens = tokenize(new);

    let old_words = old_tokens.iter().filter(|token| !token.is_space()).count();
    let new_words = new_tokens.iter().filter(|token| !token.is_space()).count();
    let shorter = old_words.min(new_words);
    if shorter == 0 {
        return None;
    }

    let old_texts: Vec<&str> = old_tokens.iter().map(|token| token.text).collect();
    let new_texts: Vec<&str> = new_tokens.iter().map(|token| token.text).collect();
    let pairs = lcs_pairs(&old_texts, &new_texts);

    let common = pairs
        .iter()
        .filter(|(old_index, _)| !old_tokens[*old_index].is_space())
        .count();
    if (common as f64) <= threshold * shorter as f64 {
        return None;
    }

    let mut old_common = vec![false; old_tokens.len()];
    let mut new_common = vec![false; new_tokens.len()];
    for (old_index, new_index) in pairs {
        old_common[old_index] = true;
        new_common[new_index] = true;
    }

    Some(WordDiff {
        old: merge_spans(&old_tokens, &old_common),
        new: merge_spans(&new_tokens, &new_common),
    })
}

fn merge_spans(tokens: &[Token<'_>], common: &[bool]) -> Vec<WordSpan> {
    let mut spans: Vec<WordSpan> = Vec::new();
    for (token, in_common) in tokens.iter().zip(common) {
        let changed = !in_common;
        match spans.last_mut() {
            Some(last) if last.changed == changed => last.text.push_str(token.text),
            _ => spans.push(WordSpan {
                text: token.text.to_string(),
                changed,
            }),
        }
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts<'a>(tokens: &[Token<'a>]) -> Vec<&'a str> {
        tokens.iter().map(|token| token.text).collect()
    }

    #[test]
    fn test_tokenize_keeps_whitespace_and_splits_punctuation() {
        let tokens = tokenize("let x  = foo(1);");
        assert_eq!(
            texts(&tokens),
            vec!["let", " ", "x", "  ", "=", " ", "foo", "(", "1", ")", ";"]
        );
        assert_eq!(tokens[1].kind, TokenKind::Space);
        assert_eq!(tokens[7].kind, TokenKind::Punct);
        assert_eq!(tokens.iter().map(|t| t.text).collect::<String>(), "let x  = foo(1);");
    }

    #[test]
    fn test_similar_lines_flag_only_changed_tokens() {
        let diff = word_diff("let total = a + b;", "let total = a + c;", 0.5).expect("similar");
        let changed_old: Vec<&str> = diff
            .old
            .iter()
            .filter(|span| span.changed)
            .map(|span| span.text.as_str())
            .collect();
        let changed_new: Vec<&str> = diff
            .new
            .iter()
            .filter(|span| span.changed)
            .map(|span| span.text.as_str())
            .collect();
        assert_eq!(changed_old, vec!["b"]);
        assert_eq!(changed_new, vec!["c"]);
        let rebuilt: String = diff.new.iter().map(|span| span.text.as_str()).collect();
        assert_eq!(rebuilt, "let total = a + c;");
    }

    #[test]
    fn test_unrelated_lines_fail_the_gate() {
        assert!(word_diff("alpha beta gamma", "one two three", 0.5).is_none());
        assert!(word_diff("", "anything", 0.5).is_none());
    }

    #[test]
    fn test_gate_is_strictly_greater_than_threshold() {
        // two of four words shared: exactly half
        assert!(word_diff("a b c d", "a b x y", 0.5).is_none());
        assert!(word_diff("a b c d", "a b c y", 0.5).is_some());
    }
}

//! Finds the latest paragraph break in a growing markdown buffer after which
//! fence and inline-marker state is balanced.
//!
//! The scan is conservative: stray markers it cannot classify hold the
//! boundary back until more text (or the end of the stream) arrives.

pub const SAFE_BOUNDARY_MIN_BYTES: usize = 20;

pub fn find_safe_boundary(text: &str) -> Option<usize> {
    find_safe_boundary_with(text, SAFE_BOUNDARY_MIN_BYTES)
}

pub fn find_safe_boundary_with(text: &str, min_bytes: usize) -> Option<usize> {
    if text.len() < min_bytes {
        return None;
    }

    let mut scanner = MarkerScanner::default();
    let mut best = None;
    let mut offset = 0usize;
    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();

        if line == "\n" && line_start > 0 && text.as_bytes()[line_start - 1] == b'\n' {
            if scanner.is_balanced() {
                best = Some(offset);
            }
            continue;
        }
        scanner.scan_line(line);
    }
    best
}

#[derive(Debug, Default)]
struct MarkerScanner {
    fence: Option<(u8, usize)>,
    code_span: Option<usize>,
    bold: bool,
    bold_underscore: bool,
    italic: bool,
    italic_underscore: bool,
    strike: bool,
}

impl MarkerScanner {
    fn is_balanced(&self) -> bool {
        self.fence.is_none()
            && self.code_span.is_none()
            && !self.bold
            && !self.bold_underscore
            && !self.italic
            && !self.italic_underscore
            && !self.strike
    }

    fn scan_line(&mut self, line: &str) {
        let trimmed = line.trim_start();
        if let Some((marker, len)) = fence_marker(trimmed) {
            match self.fence {
                None => self.fence = Some((marker, len)),
                Some((open, open_len))
                    if open == marker
                        && len >= open_len
                        && trimmed.trim_end().bytes().all(|b| b == marker) =>
                {
                    self.fence = None;
                }
                Some(_) => {}
            }
            return;
        }
        if self.fence.is_some() {
            return;
        }
        self.scan_inline(line);
    }

    fn scan_inline(&mut self, line: &str) {
        let bytes = line.as_bytes();
        let indent = bytes.iter().take_while(|b| **b == b' ').count();
        let mut index = 0usize;
        while index < bytes.len() {
            let byte = bytes[index];
            if byte == b'\\' && self.code_span.is_none() {
                index += 2;
                continue;
            }
            if !matches!(byte, b'`' | b'*' | b'_' | b'~') {
                index += 1;
                continue;
            }

            let run = bytes[index..].iter().take_while(|b| **b == byte).count();
            let prev = index.checked_sub(1).map(|i| bytes[i]);
            let next = bytes.get(index + run).copied();
            let run_start = index;
            index += run;

            if byte == b'`' {
                match self.code_span {
                    Some(open) if open == run => self.code_span = None,
                    Some(_) => {}
                    None => self.code_span = Some(run),
                }
                continue;
            }
            if self.code_span.is_some() {
                continue;
            }

            let spaced_both_sides = prev.map_or(true, is_space) && next.map_or(true, is_space);
            match byte {
                b'~' => {
                    if run == 2 {
                        self.strike = !self.strike;
                    }
                }
                b'*' => {
                    let list_bullet = run == 1 && run_start == indent && next.map_or(true, is_space);
                    if list_bullet || spaced_both_sides {
                        continue;
                    }
                    match run {
                        1 => self.italic = !self.italic,
                        2 => self.bold = !self.bold,
                        3 => {
                            self.italic = !self.italic;
                            self.bold = !self.bold;
                        }
                        _ => {}
                    }
                }
                b'_' => {
                    let intraword = prev.is_some_and(is_word) && next.is_some_and(is_word);
                    if intraword || spaced_both_sides {
                        continue;
                    }
                    match run {
                        1 => self.italic_underscore = !self.italic_underscore,
                        2 => self.bold_underscore = !self.bold_underscore,
                        _ => {}
                    }
                }
                _ => {}
            }
        }
    }
}

fn fence_marker(trimmed: &str) -> Option<(u8, usize)> {
    let first = *trimmed.as_bytes().first()?;
    if first != b'`' && first != b'~' {
        return None;
    }
    let len = trimmed.bytes().take_while(|b| *b == first).count();
    (len >= 3).then_some((first, len))
}

fn is_space(byte: u8) -> bool {
    byte.is_ascii_whitespace()
}

fn is_word(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte >= 0x80
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_reports_none() {
        assert_eq!(find_safe_boundary("a\n\nb"), None);
        assert_eq!(find_safe_boundary_with("a\n\nb", 0), Some(3));
    }

    #[test]
    fn test_boundary_skips_blank_line_inside_fence() {
        let text = "Before code.\n\n```\ncode\n\nmore\n```\n\nAfter";
        let expected = text.find("```\n\nAfter").map(|i| i + 5);
        assert_eq!(find_safe_boundary(text), expected);
    }

    #[test]
    fn test_open_fence_backs_off_to_previous_break() {
        let text = "Intro paragraph here.\n\n```rust\nfn main() {}\n\nlet x = 1;\n\n";
        assert_eq!(find_safe_boundary(text), Some("Intro paragraph here.\n\n".len()));
    }

    #[test]
    fn test_unbalanced_bold_reports_none() {
        let text = "This has **bold that never\n\ncloses across the break";
        assert_eq!(find_safe_boundary(text), None);
    }

    #[test]
    fn test_code_span_hides_markers() {
        let text = "Use `a * b` and `__init__` freely.\n\nNext paragraph";
        assert_eq!(
            find_safe_boundary(text),
            Some("Use `a * b` and `__init__` freely.\n\n".len())
        );
    }

    #[test]
    fn test_unclosed_code_span_and_strike() {
        assert_eq!(find_safe_boundary("Open ``span here\n\nand more text"), None);
        assert_eq!(find_safe_boundary("Some ~~struck text\n\nand more text"), None);
    }

    #[test]
    fn test_list_bullets_and_snake_case_are_not_emphasis() {
        let text = "* first item\n* second_item_name\n\n2 * 3 = 6\n\nTail";
        assert_eq!(find_safe_boundary(text), Some(text.len() - "Tail".len()));
    }

    #[test]
    fn test_returns_latest_balanced_break() {
        let text = "One *italic* here.\n\nTwo **bold** here.\n\nThree *open";
        assert_eq!(
            find_safe_boundary(text),
            Some("One *italic* here.\n\nTwo **bold** here.\n\n".len())
        );
    }
}

//! Width measurement and slicing for text that already carries ANSI styling.
//!
//! Only CSI sequences (`ESC [ params terminator`) are parsed when deciding
//! where a slice may start. Other escape introducers are skipped as opaque
//! pieces by the width and strip helpers but never treated as cut guards.

use unicode_width::UnicodeWidthChar;

pub const TAB_WIDTH: usize = 8;
pub const RESET: &str = "\x1b[0m";

const ESC: u8 = 0x1b;

/// Return `s[pos..]`, moving the cut forward past any CSI sequence that `pos`
/// lands strictly inside of.
pub fn safe_slice(s: &str, pos: usize) -> &str {
    if pos >= s.len() {
        return "";
    }
    let cut = safe_cut_point(s, pos);
    &s[cut..]
}

/// The byte offset `safe_slice` would cut at.
pub fn safe_cut_point(s: &str, pos: usize) -> usize {
    if pos >= s.len() {
        return s.len();
    }
    let bytes = s.as_bytes();
    let mut index = 0usize;
    while index < pos {
        if bytes[index] == ESC && bytes.get(index + 1) == Some(&b'[') {
            let end = csi_end(bytes, index);
            if pos < end {
                return end;
            }
            index = end;
            continue;
        }
        index += 1;
    }
    ceil_char_boundary(s, pos)
}

/// Exclusive end of the CSI sequence starting at `start`. An unterminated
/// sequence runs to the end of the input.
fn csi_end(bytes: &[u8], start: usize) -> usize {
    let mut index = start + 2;
    while index < bytes.len() {
        if (0x40..=0x7e).contains(&bytes[index]) {
            return index + 1;
        }
        index += 1;
    }
    bytes.len()
}

fn ceil_char_boundary(s: &str, pos: usize) -> usize {
    let mut pos = pos.min(s.len());
    while pos < s.len() && !s.is_char_boundary(pos) {
        pos += 1;
    }
    pos
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnsiPiece<'a> {
    Escape(&'a str),
    Char(char),
}

/// Split styled text into escape sequences and visible characters.
pub fn pieces(s: &str) -> AnsiPieces<'_> {
    AnsiPieces { text: s, index: 0 }
}

pub struct AnsiPieces<'a> {
    text: &'a str,
    index: usize,
}

impl<'a> Iterator for AnsiPieces<'a> {
    type Item = AnsiPiece<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.text[self.index..];
        let first = rest.chars().next()?;
        if first != '\x1b' {
            self.index += first.len_utf8();
            return Some(AnsiPiece::Char(first));
        }

        let bytes = rest.as_bytes();
        let len = match bytes.get(1) {
            Some(b'[') => csi_end(bytes, 0),
            Some(b']') => osc_end(bytes),
            Some(next) if next.is_ascii() => 2,
            Some(_) | None => 1,
        };
        let len = ceil_char_boundary(rest, len);
        self.index += len;
        Some(AnsiPiece::Escape(&rest[..len]))
    }
}

fn osc_end(bytes: &[u8]) -> usize {
    let mut index = 2;
    while index < bytes.len() {
        match bytes[index] {
            0x07 => return index + 1,
            ESC if bytes.get(index + 1) == Some(&b'\\') => return index + 2,
            _ => index += 1,
        }
    }
    bytes.len()
}

pub fn char_display_width(ch: char) -> usize {
    UnicodeWidthChar::width(ch).unwrap_or(0)
}

/// Columns `s` occupies when printed starting at column `start_col`.
/// Tabs advance to the next multiple of [`TAB_WIDTH`].
pub fn display_width(s: &str, start_col: usize) -> usize {
    let mut col = start_col;
    for piece in pieces(s) {
        match piece {
            AnsiPiece::Escape(_) => {}
            AnsiPiece::Char('\t') => col = next_tab_stop(col),
            AnsiPiece::Char(ch) => col += char_display_width(ch),
        }
    }
    col - start_col
}

pub fn next_tab_stop(col: usize) -> usize {
    (col / TAB_WIDTH + 1) * TAB_WIDTH
}

pub fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for piece in pieces(s) {
        if let AnsiPiece::Char(ch) = piece {
            out.push(ch);
        }
    }
    out
}

/// Truncate unstyled text to `width` columns, marking the cut with "...".
pub fn truncate_plain(input: &str, width: usize) -> String {
    let width = width.max(1);
    let mut out = String::new();
    let mut used = 0usize;
    let mut truncated = false;

    for ch in input.chars() {
        let ch_width = char_display_width(ch);
        if used + ch_width > width {
            truncated = true;
            break;
        }
        out.push(ch);
        used += ch_width;
    }

    if truncated && width >= 4 {
        let mut shortened = String::new();
        let mut used = 0usize;
        for ch in out.chars() {
            let ch_width = char_display_width(ch);
            if used + ch_width > width - 3 {
                break;
            }
            shortened.push(ch);
            used += ch_width;
        }
        shortened.push_str("...");
        return shortened;
    }
    out
}

/// Foreground and background SGR state carried across wrapped lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnsiState {
    fg: Option<String>,
    bg: Option<String>,
}

impl AnsiState {
    pub fn is_active(&self) -> bool {
        self.fg.is_some() || self.bg.is_some()
    }

    pub fn fg(&self) -> Option<&str> {
        self.fg.as_deref()
    }

    pub fn bg(&self) -> Option<&str> {
        self.bg.as_deref()
    }

    /// Escape codes that re-establish this state at the start of a line.
    pub fn prefix(&self) -> String {
        let mut out = String::new();
        if let Some(fg) = &self.fg {
            out.push_str(fg);
        }
        if let Some(bg) = &self.bg {
            out.push_str(bg);
        }
        out
    }

    /// Track a single escape sequence. Non-SGR sequences are ignored.
    pub fn apply(&mut self, seq: &str) {
        let Some(params) = seq
            .strip_prefix("\x1b[")
            .and_then(|rest| rest.strip_suffix('m'))
        else {
            return;
        };
        if params.is_empty() {
            self.fg = None;
            self.bg = None;
            return;
        }

        let codes: Vec<&str> = params.split(';').collect();
        let mut index = 0usize;
        while index < codes.len() {
            let code = codes[index].parse::<u16>().unwrap_or(0);
            match code {
                0 => {
                    self.fg = None;
                    self.bg = None;
                }
                30..=37 | 90..=97 => self.fg = Some(format!("\x1b[{code}m")),
                39 => self.fg = None,
                40..=47 | 100..=107 => self.bg = Some(format!("\x1b[{code}m")),
                49 => self.bg = None,
                38 | 48 => {
                    let take = match codes.get(index + 1).copied() {
                        Some("5") => 3,
                        Some("2") => 5,
                        _ => 1,
                    };
                    let end = (index + take).min(codes.len());
                    let rendered = format!("\x1b[{}m", codes[index..end].join(";"));
                    if code == 38 {
                        self.fg = Some(rendered);
                    } else {
                        self.bg = Some(rendered);
                    }
                    index = end;
                    continue;
                }
                _ => {}
            }
            index += 1;
        }
    }
}

//! Fixed styling used by the renderers. Theme selection lives outside this
//! crate; these are the defaults the core falls back to.

use anstyle::{AnsiColor, Color, RgbColor, Style};

const fn ansi(color: AnsiColor) -> Option<Color> {
    Some(Color::Ansi(color))
}

const fn rgb(r: u8, g: u8, b: u8) -> Option<Color> {
    Some(Color::Rgb(RgbColor(r, g, b)))
}

pub const HEADING_1: Style = Style::new().bold().underline().fg_color(ansi(AnsiColor::Cyan));
pub const HEADING: Style = Style::new().bold().fg_color(ansi(AnsiColor::Cyan));
pub const EMPHASIS: Style = Style::new().italic();
pub const STRONG: Style = Style::new().bold();
pub const STRIKETHROUGH: Style = Style::new().strikethrough();
pub const INLINE_CODE: Style = Style::new().fg_color(ansi(AnsiColor::Yellow));
pub const CODE_BLOCK: Style = Style::new().fg_color(ansi(AnsiColor::BrightBlack));
pub const QUOTE_BAR: Style = Style::new().fg_color(ansi(AnsiColor::BrightBlack));
pub const QUOTE_TEXT: Style = Style::new().italic();
pub const LINK: Style = Style::new().underline().fg_color(ansi(AnsiColor::Blue));
pub const LINK_URL: Style = Style::new().dimmed();
pub const RULE: Style = Style::new().fg_color(ansi(AnsiColor::BrightBlack));
pub const LIST_MARKER: Style = Style::new().fg_color(ansi(AnsiColor::Cyan));
pub const TABLE_BORDER: Style = Style::new().fg_color(ansi(AnsiColor::BrightBlack));
pub const TABLE_HEADER: Style = Style::new().bold();

pub const TOOL_PENDING: Style = Style::new().dimmed();
pub const TOOL_WAVE: Style = Style::new().bold().fg_color(ansi(AnsiColor::BrightWhite));
pub const TOOL_SUCCESS: Style = Style::new().fg_color(ansi(AnsiColor::Green));
pub const TOOL_ERROR: Style = Style::new().fg_color(ansi(AnsiColor::Red));
pub const TOOL_NAME: Style = Style::new().bold();
pub const TOOL_INFO: Style = Style::new().dimmed();

pub const PLAIN_RESULT: Style = Style::new().dimmed();
pub const ERROR_TEXT: Style = Style::new().fg_color(ansi(AnsiColor::Red));
pub const STATUS_LINE: Style = Style::new().dimmed().italic();

pub const DIFF_HEADER: Style = Style::new().bold();
pub const DIFF_GUTTER: Style = Style::new().fg_color(ansi(AnsiColor::BrightBlack));
pub const DIFF_ADD_LINE: Style = Style::new().bg_color(rgb(33, 58, 43));
pub const DIFF_DEL_LINE: Style = Style::new().bg_color(rgb(74, 34, 29));
pub const DIFF_ADD_WORD: Style = Style::new().bg_color(rgb(46, 110, 64));
pub const DIFF_DEL_WORD: Style = Style::new().bg_color(rgb(140, 48, 38));
pub const DIFF_ADD_SIGN: Style = Style::new()
    .fg_color(ansi(AnsiColor::Green))
    .bg_color(rgb(33, 58, 43));
pub const DIFF_DEL_SIGN: Style = Style::new()
    .fg_color(ansi(AnsiColor::Red))
    .bg_color(rgb(74, 34, 29));
pub const DIFF_CONTEXT: Style = Style::new();
pub const DIFF_ELISION: Style = Style::new().dimmed().italic();

/// Wrap `text` in the style's escape codes. Empty text and plain styles
/// produce no escapes at all.
pub fn paint(style: Style, text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    if style == Style::new() {
        return text.to_string();
    }
    format!("{}{}{}", style.render(), text, style.render_reset())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paint_wraps_and_resets() {
        let painted = paint(STRONG, "hi");
        assert!(painted.starts_with("\x1b["));
        assert!(painted.contains("hi"));
        assert!(painted.ends_with("\x1b[0m"));
        assert_eq!(crate::ui::ansi::strip_ansi(&painted), "hi");
    }

    #[test]
    fn test_paint_skips_plain_and_empty() {
        assert_eq!(paint(DIFF_CONTEXT, "x"), "x");
        assert_eq!(paint(STRONG, ""), "");
    }
}

use crate::ui::ansi::{char_display_width, next_tab_stop, pieces, AnsiPiece, AnsiState, RESET};

#[derive(Debug, Clone)]
struct BreakPoint {
    /// Byte range of the space inside the current line buffer.
    start: usize,
    end: usize,
    /// Column just past the space.
    col: usize,
    state: AnsiState,
}

/// Wrap one styled line to `width` columns.
///
/// A line breaks at its last space when that space sits past the middle of
/// the width budget, otherwise it is cut hard at the limit. Continuation lines
/// re-open the foreground/background active at the break, and every line that
/// ends with styling still active is closed with a reset.
pub fn wrap_styled_line(line: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![line.to_string()];
    }

    let mut out = Vec::new();
    let mut current = String::new();
    let mut col = 0usize;
    let mut state = AnsiState::default();
    let mut last_space: Option<BreakPoint> = None;

    for piece in pieces(line) {
        let ch = match piece {
            AnsiPiece::Escape(seq) => {
                current.push_str(seq);
                state.apply(seq);
                continue;
            }
            AnsiPiece::Char(ch) => ch,
        };

        let advance = if ch == '\t' {
            next_tab_stop(col) - col
        } else {
            char_display_width(ch)
        };

        if col + advance > width && col > 0 {
            match last_space.take() {
                Some(space) if space.col > width / 2 => {
                    let tail = current[space.end..].to_string();
                    current.truncate(space.start);
                    if space.state.is_active() {
                        current.push_str(RESET);
                    }
                    out.push(std::mem::take(&mut current));
                    current = space.state.prefix();
                    current.push_str(&tail);
                    col -= space.col;
                }
                _ => {
                    if state.is_active() {
                        current.push_str(RESET);
                    }
                    out.push(std::mem::take(&mut current));
                    current = state.prefix();
                    col = 0;
                }
            }
        }

        let start = current.len();
        current.push(ch);
        col += if ch == '\t' {
            next_tab_stop(col) - col
        } else {
            advance
        };
        if ch == ' ' {
            last_space = Some(BreakPoint {
                start,
                end: current.len(),
                col,
                state: state.clone(),
            });
        }
    }

    out.push(current);
    out
}

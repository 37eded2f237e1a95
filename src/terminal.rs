use anyhow::Result;
use crossterm::{
    cursor::{MoveToColumn, MoveUp},
    queue,
    terminal::{Clear, ClearType},
};
use std::io::{self, IsTerminal, Write};

use crate::ui::ansi::display_width;

/// Columns of the attached terminal, or 0 when stdout is not a terminal.
pub fn terminal_width() -> usize {
    if !stdout_is_terminal() {
        return 0;
    }
    crossterm::terminal::size()
        .map(|(cols, _)| cols as usize)
        .unwrap_or(0)
}

pub fn stdout_is_terminal() -> bool {
    io::stdout().is_terminal()
}

/// Rows `text` occupies once the terminal soft-wraps it at `width`.
pub fn visual_rows(text: &str, width: usize) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.split('\n')
        .map(|line| {
            let cols = display_width(line, 0);
            if width == 0 || cols == 0 {
                1
            } else {
                cols.div_ceil(width)
            }
        })
        .sum()
}

/// Inline output area: permanent scrollback above, a redrawable live view
/// at the bottom.
pub struct LiveRegion<W: Write> {
    out: W,
    drawn_rows: usize,
    interactive: bool,
}

impl LiveRegion<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout(), stdout_is_terminal())
    }
}

impl<W: Write> LiveRegion<W> {
    /// A non-interactive region never draws the live view; only scrollback
    /// reaches the writer.
    pub fn new(out: W, interactive: bool) -> Self {
        Self {
            out,
            drawn_rows: 0,
            interactive,
        }
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Erase the live view, leaving the cursor where it started.
    pub fn clear(&mut self) -> Result<()> {
        if self.drawn_rows == 0 {
            return Ok(());
        }
        queue!(self.out, MoveToColumn(0))?;
        if self.drawn_rows > 1 {
            let up = u16::try_from(self.drawn_rows - 1).unwrap_or(u16::MAX);
            queue!(self.out, MoveUp(up))?;
        }
        queue!(self.out, Clear(ClearType::FromCursorDown))?;
        self.drawn_rows = 0;
        Ok(())
    }

    /// Print a flushed chunk into scrollback. The trailing newline is
    /// always added, matching what the tracker accounts for.
    pub fn print_scrollback(&mut self, chunk: &str) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.clear()?;
        writeln!(self.out, "{chunk}")?;
        self.out.flush()?;
        Ok(())
    }

    pub fn draw(&mut self, live: &str, width: usize) -> Result<()> {
        if !self.interactive {
            return Ok(());
        }
        self.clear()?;
        let live = live.trim_end_matches('\n');
        if !live.is_empty() {
            write!(self.out, "{live}")?;
            self.drawn_rows = visual_rows(live, width);
        }
        self.out.flush()?;
        Ok(())
    }
}

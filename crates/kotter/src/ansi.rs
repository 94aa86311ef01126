//! ANSI escape codes used by the renderer and the input parser.
//!
//! Everything goes through CSI (`ESC [`). The output side is limited to
//! SGR, cursor-prev-line, and erase-to-line-end; the input side parses
//! the small set of key escapes terminals send for navigation keys.

use crate::style::Color;
use crate::text_ptr::TextPtr;

/// The escape char that introduces every sequence.
pub const ESC: char = '\u{1b}';

/// The Control Sequence Introducer prefix.
pub const CSI: &str = "\x1b[";

/// SGR and cursor codes emitted by the renderer.
pub mod codes {
    /// Reset all SGR attributes.
    pub const RESET: &str = "\x1b[0m";
    /// Bold on.
    pub const BOLD: &str = "\x1b[1m";
    /// Bold off.
    pub const CLEAR_BOLD: &str = "\x1b[22m";
    /// Underline on.
    pub const UNDERLINE: &str = "\x1b[4m";
    /// Underline off.
    pub const CLEAR_UNDERLINE: &str = "\x1b[24m";
    /// Strikethrough on.
    pub const STRIKETHROUGH: &str = "\x1b[9m";
    /// Strikethrough off.
    pub const CLEAR_STRIKETHROUGH: &str = "\x1b[29m";
    /// Invert (reverse video) on.
    pub const INVERT: &str = "\x1b[7m";
    /// Invert off.
    pub const CLEAR_INVERT: &str = "\x1b[27m";
    /// Default foreground color.
    pub const FG_DEFAULT: &str = "\x1b[39m";
    /// Default background color.
    pub const BG_DEFAULT: &str = "\x1b[49m";
    /// Move the cursor to the start of the previous line.
    pub const CURSOR_PREV_LINE: &str = "\x1b[1F";
    /// Erase from the cursor to the end of the line.
    pub const ERASE_LINE_END: &str = "\x1b[0K";
}

/// SGR parameter for a foreground color.
fn fg_param(color: &Color) -> String {
    match color {
        Color::Rgb { r, g, b } => format!("38;2;{r};{g};{b}"),
        named => format!("{}", 30 + named_offset(named)),
    }
}

/// SGR parameter for a background color.
fn bg_param(color: &Color) -> String {
    match color {
        Color::Rgb { r, g, b } => format!("48;2;{r};{g};{b}"),
        named => format!("{}", 40 + named_offset(named)),
    }
}

/// Offset of a named color within its SGR decade; bright colors are
/// shifted into the 90+/100+ range.
fn named_offset(color: &Color) -> u8 {
    match color {
        Color::Black => 0,
        Color::Red => 1,
        Color::Green => 2,
        Color::Yellow => 3,
        Color::Blue => 4,
        Color::Magenta => 5,
        Color::Cyan => 6,
        Color::White => 7,
        Color::BrightBlack => 60,
        Color::BrightRed => 61,
        Color::BrightGreen => 62,
        Color::BrightYellow => 63,
        Color::BrightBlue => 64,
        Color::BrightMagenta => 65,
        Color::BrightCyan => 66,
        Color::BrightWhite => 67,
        Color::Rgb { .. } => 0,
    }
}

/// Full SGR sequence selecting `color` as the foreground.
pub fn fg_code(color: &Color) -> String {
    format!("{CSI}{}m", fg_param(color))
}

/// Full SGR sequence selecting `color` as the background.
pub fn bg_code(color: &Color) -> String {
    format!("{CSI}{}m", bg_param(color))
}

/// A navigation key decoded from a CSI escape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CsiKey {
    /// Arrow up (`A`).
    Up,
    /// Arrow down (`B`).
    Down,
    /// Arrow right (`C`).
    Right,
    /// Arrow left (`D`).
    Left,
    /// Home (`1~`).
    Home,
    /// End (`4~`).
    End,
    /// Delete (`3~`).
    Delete,
    /// Page up (`5~`).
    PageUp,
    /// Page down (`6~`).
    PageDown,
}

/// True if `c` terminates a CSI sequence.
pub fn is_csi_terminator(c: char) -> bool {
    ('\u{40}'..='\u{7e}').contains(&c)
}

/// Decode the body of a CSI sequence (the bytes after `ESC [`, final byte
/// included) into a navigation key. Unknown sequences decode to `None`.
pub fn parse_csi(body: &str) -> Option<CsiKey> {
    let mut ptr = TextPtr::new(body);
    match ptr.read_int() {
        None => match ptr.curr_char() {
            'A' => Some(CsiKey::Up),
            'B' => Some(CsiKey::Down),
            'C' => Some(CsiKey::Right),
            'D' => Some(CsiKey::Left),
            _ => None,
        },
        Some(code) if ptr.curr_char() == '~' => match code {
            1 => Some(CsiKey::Home),
            3 => Some(CsiKey::Delete),
            4 => Some(CsiKey::End),
            5 => Some(CsiKey::PageUp),
            6 => Some(CsiKey::PageDown),
            _ => None,
        },
        Some(_) => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn arrow_keys_decode() {
        assert_eq!(parse_csi("A"), Some(CsiKey::Up));
        assert_eq!(parse_csi("B"), Some(CsiKey::Down));
        assert_eq!(parse_csi("C"), Some(CsiKey::Right));
        assert_eq!(parse_csi("D"), Some(CsiKey::Left));
    }

    #[test]
    fn tilde_keys_decode() {
        assert_eq!(parse_csi("1~"), Some(CsiKey::Home));
        assert_eq!(parse_csi("3~"), Some(CsiKey::Delete));
        assert_eq!(parse_csi("4~"), Some(CsiKey::End));
        assert_eq!(parse_csi("5~"), Some(CsiKey::PageUp));
        assert_eq!(parse_csi("6~"), Some(CsiKey::PageDown));
    }

    #[test]
    fn unknown_sequences_drop() {
        assert_eq!(parse_csi("Z"), None);
        assert_eq!(parse_csi("99~"), None);
        assert_eq!(parse_csi("2J"), None);
        assert_eq!(parse_csi(""), None);
    }

    #[test]
    fn terminator_range() {
        assert!(is_csi_terminator('A'));
        assert!(is_csi_terminator('~'));
        assert!(!is_csi_terminator('1'));
        assert!(!is_csi_terminator(';'));
    }

    #[test]
    fn standard_color_codes() {
        assert_eq!(fg_code(&Color::Red), "\x1b[31m");
        assert_eq!(bg_code(&Color::Blue), "\x1b[44m");
    }

    #[test]
    fn bright_color_codes() {
        assert_eq!(fg_code(&Color::BrightCyan), "\x1b[96m");
        assert_eq!(bg_code(&Color::BrightBlack), "\x1b[100m");
    }

    #[test]
    fn truecolor_codes() {
        let c = Color::Rgb { r: 1, g: 2, b: 3 };
        assert_eq!(fg_code(&c), "\x1b[38;2;1;2;3m");
        assert_eq!(bg_code(&c), "\x1b[48;2;1;2;3m");
    }
}

//! Colors and the per-cell style state.

use crate::ansi;

/// A terminal color: the 16 ANSI colors or a 24-bit truecolor value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Color {
    /// Black (SGR 30/40).
    Black,
    /// Red (SGR 31/41).
    Red,
    /// Green (SGR 32/42).
    Green,
    /// Yellow (SGR 33/43).
    Yellow,
    /// Blue (SGR 34/44).
    Blue,
    /// Magenta (SGR 35/45).
    Magenta,
    /// Cyan (SGR 36/46).
    Cyan,
    /// White (SGR 37/47).
    White,
    /// Bright black / gray (SGR 90/100).
    BrightBlack,
    /// Bright red (SGR 91/101).
    BrightRed,
    /// Bright green (SGR 92/102).
    BrightGreen,
    /// Bright yellow (SGR 93/103).
    BrightYellow,
    /// Bright blue (SGR 94/104).
    BrightBlue,
    /// Bright magenta (SGR 95/105).
    BrightMagenta,
    /// Bright cyan (SGR 96/106).
    BrightCyan,
    /// Bright white (SGR 97/107).
    BrightWhite,
    /// 24-bit truecolor.
    Rgb {
        /// Red component.
        r: u8,
        /// Green component.
        g: u8,
        /// Blue component.
        b: u8,
    },
}

impl Color {
    /// Build a truecolor value from a packed `0xRRGGBB` integer.
    #[must_use]
    pub fn from_hex(rgb: u32) -> Self {
        Self::Rgb {
            r: ((rgb >> 16) & 0xff) as u8,
            g: ((rgb >> 8) & 0xff) as u8,
            b: (rgb & 0xff) as u8,
        }
    }

    /// Build a truecolor value from HSV components.
    ///
    /// `h` is in degrees (wrapped into `[0, 360)`), `s` and `v` in `[0, 1]`
    /// (clamped).
    #[must_use]
    pub fn from_hsv(h: f32, s: f32, v: f32) -> Self {
        let h = h.rem_euclid(360.0);
        let s = s.clamp(0.0, 1.0);
        let v = v.clamp(0.0, 1.0);

        let c = v * s;
        let x = c * (1.0 - ((h / 60.0).rem_euclid(2.0) - 1.0).abs());
        let m = v - c;

        let (r, g, b) = match h {
            h if h < 60.0 => (c, x, 0.0),
            h if h < 120.0 => (x, c, 0.0),
            h if h < 180.0 => (0.0, c, x),
            h if h < 240.0 => (0.0, x, c),
            h if h < 300.0 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };

        Self::Rgb {
            r: ((r + m) * 255.0).round() as u8,
            g: ((g + m) * 255.0).round() as u8,
            b: ((b + m) * 255.0).round() as u8,
        }
    }
}

/// Which side of a cell a color applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColorLayer {
    /// The text color.
    Foreground,
    /// The fill color behind the text.
    Background,
}

/// A toggleable text decoration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Decoration {
    /// Bold weight.
    Bold,
    /// Underline.
    Underline,
    /// Strikethrough.
    Strikethrough,
    /// Reverse video.
    Invert,
}

/// The effective style of a rendered cell.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CellStyle {
    /// Foreground color, or the terminal default.
    pub fg: Option<Color>,
    /// Background color, or the terminal default.
    pub bg: Option<Color>,
    /// Bold weight.
    pub bold: bool,
    /// Underline.
    pub underline: bool,
    /// Strikethrough.
    pub strikethrough: bool,
    /// Reverse video.
    pub invert: bool,
}

impl CellStyle {
    /// True if no attribute is set.
    pub fn is_plain(&self) -> bool {
        *self == Self::default()
    }

    /// Read a decoration flag.
    pub fn decoration(&self, decoration: Decoration) -> bool {
        match decoration {
            Decoration::Bold => self.bold,
            Decoration::Underline => self.underline,
            Decoration::Strikethrough => self.strikethrough,
            Decoration::Invert => self.invert,
        }
    }

    /// Write a decoration flag.
    pub fn set_decoration(&mut self, decoration: Decoration, on: bool) {
        match decoration {
            Decoration::Bold => self.bold = on,
            Decoration::Underline => self.underline = on,
            Decoration::Strikethrough => self.strikethrough = on,
            Decoration::Invert => self.invert = on,
        }
    }
}

/// Append the minimal SGR byte sequence transitioning `prev` to `next`.
///
/// Attribute order is fixed (fg, bg, bold, underline, strikethrough,
/// invert) so a given pair of styles always serializes identically.
pub fn write_sgr_transition(out: &mut String, prev: &CellStyle, next: &CellStyle) {
    if prev.fg != next.fg {
        match &next.fg {
            Some(color) => out.push_str(&ansi::fg_code(color)),
            None => out.push_str(ansi::codes::FG_DEFAULT),
        }
    }
    if prev.bg != next.bg {
        match &next.bg {
            Some(color) => out.push_str(&ansi::bg_code(color)),
            None => out.push_str(ansi::codes::BG_DEFAULT),
        }
    }
    if prev.bold != next.bold {
        out.push_str(if next.bold {
            ansi::codes::BOLD
        } else {
            ansi::codes::CLEAR_BOLD
        });
    }
    if prev.underline != next.underline {
        out.push_str(if next.underline {
            ansi::codes::UNDERLINE
        } else {
            ansi::codes::CLEAR_UNDERLINE
        });
    }
    if prev.strikethrough != next.strikethrough {
        out.push_str(if next.strikethrough {
            ansi::codes::STRIKETHROUGH
        } else {
            ansi::codes::CLEAR_STRIKETHROUGH
        });
    }
    if prev.invert != next.invert {
        out.push_str(if next.invert {
            ansi::codes::INVERT
        } else {
            ansi::codes::CLEAR_INVERT
        });
    }
}

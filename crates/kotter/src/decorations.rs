//! Decorations built on the offscreen buffer: borders and indentation.

use crate::render_scope::RenderScope;

/// The glyphs used to draw a border frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BorderCharacters {
    /// Top-left corner.
    pub top_left: char,
    /// Top edge.
    pub top: char,
    /// Top-right corner.
    pub top_right: char,
    /// Left edge.
    pub left: char,
    /// Right edge.
    pub right: char,
    /// Bottom-left corner.
    pub bottom_left: char,
    /// Bottom edge.
    pub bottom: char,
    /// Bottom-right corner.
    pub bottom_right: char,
}

impl BorderCharacters {
    /// Plain ASCII frame: `+-+` corners with `|` sides.
    pub const ASCII: Self = Self {
        top_left: '+',
        top: '-',
        top_right: '+',
        left: '|',
        right: '|',
        bottom_left: '+',
        bottom: '-',
        bottom_right: '+',
    };

    /// Thin box-drawing frame.
    pub const BOX_THIN: Self = Self {
        top_left: '\u{250c}',
        top: '\u{2500}',
        top_right: '\u{2510}',
        left: '\u{2502}',
        right: '\u{2502}',
        bottom_left: '\u{2514}',
        bottom: '\u{2500}',
        bottom_right: '\u{2518}',
    };

    /// Double-line box-drawing frame.
    pub const BOX_DOUBLE: Self = Self {
        top_left: '\u{2554}',
        top: '\u{2550}',
        top_right: '\u{2557}',
        left: '\u{2551}',
        right: '\u{2551}',
        bottom_left: '\u{255a}',
        bottom: '\u{2550}',
        bottom_right: '\u{255d}',
    };

    /// Thin frame with rounded corners.
    pub const CURVED: Self = Self {
        top_left: '\u{256d}',
        top: '\u{2500}',
        top_right: '\u{256e}',
        left: '\u{2502}',
        right: '\u{2502}',
        bottom_left: '\u{2570}',
        bottom: '\u{2500}',
        bottom_right: '\u{256f}',
    };
}

impl RenderScope<'_> {
    /// Draw `block` inside a border. The interior width is the widest
    /// line of the block plus `padding` spaces on each side.
    pub fn bordered(
        &mut self,
        chars: BorderCharacters,
        padding: usize,
        block: impl FnOnce(&mut RenderScope<'_>),
    ) {
        let buffer = self.offscreen(block);
        let inner = buffer.max_width();
        let total = inner + padding * 2;

        self.char(chars.top_left);
        for _ in 0..total {
            self.char(chars.top);
        }
        self.char(chars.top_right);
        self.newline();

        let mut renderer = buffer.renderer();
        let mut row = 0;
        while renderer.has_next_row() {
            self.char(chars.left);
            self.spaces(padding);
            renderer.render_next_row(self);
            self.spaces(inner - buffer.width(row) + padding);
            self.char(chars.right);
            self.newline();
            row += 1;
        }

        self.char(chars.bottom_left);
        for _ in 0..total {
            self.char(chars.bottom);
        }
        self.char(chars.bottom_right);
        self.newline();
    }

    /// Indent every line of `block` by `indent` spaces.
    pub fn shift_right(&mut self, indent: usize, block: impl FnOnce(&mut RenderScope<'_>)) {
        let buffer = self.offscreen(block);
        let mut renderer = buffer.renderer();
        while renderer.has_next_row() {
            self.spaces(indent);
            renderer.render_next_row(self);
            self.newline();
        }
    }

    fn spaces(&mut self, count: usize) {
        for _ in 0..count {
            self.char(' ');
        }
    }
}

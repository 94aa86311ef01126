//! The logical key type produced by the input pipeline.

use crate::ansi::CsiKey;

/// A logical keypress: a printable char or a named key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    /// A printable character.
    Char(char),
    /// Arrow up.
    Up,
    /// Arrow down.
    Down,
    /// Arrow left.
    Left,
    /// Arrow right.
    Right,
    /// Home.
    Home,
    /// End.
    End,
    /// Page up.
    PageUp,
    /// Page down.
    PageDown,
    /// Delete (forward).
    Delete,
    /// Enter / Return.
    Enter,
    /// Backspace.
    Backspace,
    /// Escape.
    Esc,
    /// Tab.
    Tab,
}

/// Letter and space aliases, so match arms and `run_until_key_pressed`
/// calls read naturally.
impl Key {
    /// The space bar.
    pub const SPACE: Key = Key::Char(' ');
    /// Letter a.
    pub const A: Key = Key::Char('a');
    /// Letter b.
    pub const B: Key = Key::Char('b');
    /// Letter c.
    pub const C: Key = Key::Char('c');
    /// Letter d.
    pub const D: Key = Key::Char('d');
    /// Letter e.
    pub const E: Key = Key::Char('e');
    /// Letter f.
    pub const F: Key = Key::Char('f');
    /// Letter g.
    pub const G: Key = Key::Char('g');
    /// Letter h.
    pub const H: Key = Key::Char('h');
    /// Letter i.
    pub const I: Key = Key::Char('i');
    /// Letter j.
    pub const J: Key = Key::Char('j');
    /// Letter k.
    pub const K: Key = Key::Char('k');
    /// Letter l.
    pub const L: Key = Key::Char('l');
    /// Letter m.
    pub const M: Key = Key::Char('m');
    /// Letter n.
    pub const N: Key = Key::Char('n');
    /// Letter o.
    pub const O: Key = Key::Char('o');
    /// Letter p.
    pub const P: Key = Key::Char('p');
    /// Letter q.
    pub const Q: Key = Key::Char('q');
    /// Letter r.
    pub const R: Key = Key::Char('r');
    /// Letter s.
    pub const S: Key = Key::Char('s');
    /// Letter t.
    pub const T: Key = Key::Char('t');
    /// Letter u.
    pub const U: Key = Key::Char('u');
    /// Letter v.
    pub const V: Key = Key::Char('v');
    /// Letter w.
    pub const W: Key = Key::Char('w');
    /// Letter x.
    pub const X: Key = Key::Char('x');
    /// Letter y.
    pub const Y: Key = Key::Char('y');
    /// Letter z.
    pub const Z: Key = Key::Char('z');
}

impl From<CsiKey> for Key {
    fn from(key: CsiKey) -> Self {
        match key {
            CsiKey::Up => Key::Up,
            CsiKey::Down => Key::Down,
            CsiKey::Left => Key::Left,
            CsiKey::Right => Key::Right,
            CsiKey::Home => Key::Home,
            CsiKey::End => Key::End,
            CsiKey::Delete => Key::Delete,
            CsiKey::PageUp => Key::PageUp,
            CsiKey::PageDown => Key::PageDown,
        }
    }
}

//! Terminal commands — the intermediate representation of a render pass.
//!
//! A render block never writes bytes directly; it appends commands, which
//! are later applied to a [`TextArea`](crate::text_area::TextArea) and
//! serialized in one shot. Commands are pure values, so an offscreen
//! buffer can capture and replay them.

use crate::style::{CellStyle, Color, ColorLayer, Decoration};

/// One step of a render pass.
#[derive(Clone, Debug, PartialEq)]
pub enum TerminalCommand {
    /// Append a single char.
    Char(char),
    /// Append a run of text; embedded `\n` chars break lines.
    Text(String),
    /// Set a foreground or background color.
    SetColor(ColorLayer, Color),
    /// Restore a layer to the terminal default color.
    ClearColor(ColorLayer),
    /// Turn a text decoration on.
    SetDecoration(Decoration),
    /// Turn a text decoration off.
    ClearDecoration(Decoration),
    /// Break the current line.
    Newline,
}

/// Fold a command's style effect (if any) into `style`.
pub(crate) fn apply_style_command(style: &mut CellStyle, command: &TerminalCommand) {
    match command {
        TerminalCommand::SetColor(ColorLayer::Foreground, color) => style.fg = Some(*color),
        TerminalCommand::SetColor(ColorLayer::Background, color) => style.bg = Some(*color),
        TerminalCommand::ClearColor(ColorLayer::Foreground) => style.fg = None,
        TerminalCommand::ClearColor(ColorLayer::Background) => style.bg = None,
        TerminalCommand::SetDecoration(d) => style.set_decoration(*d, true),
        TerminalCommand::ClearDecoration(d) => style.set_decoration(*d, false),
        TerminalCommand::Char(_) | TerminalCommand::Text(_) | TerminalCommand::Newline => {}
    }
}

/// The commands that transition style state `from` into `to`.
///
/// Used when leaving a scoped style block: the parent's state is restored
/// attribute by attribute, so the replayed command stream stays minimal.
pub fn style_transition(from: &CellStyle, to: &CellStyle) -> Vec<TerminalCommand> {
    let mut commands = Vec::new();
    if from.fg != to.fg {
        commands.push(match to.fg {
            Some(color) => TerminalCommand::SetColor(ColorLayer::Foreground, color),
            None => TerminalCommand::ClearColor(ColorLayer::Foreground),
        });
    }
    if from.bg != to.bg {
        commands.push(match to.bg {
            Some(color) => TerminalCommand::SetColor(ColorLayer::Background, color),
            None => TerminalCommand::ClearColor(ColorLayer::Background),
        });
    }
    for decoration in [
        Decoration::Bold,
        Decoration::Underline,
        Decoration::Strikethrough,
        Decoration::Invert,
    ] {
        let (was, now) = (from.decoration(decoration), to.decoration(decoration));
        if was != now {
            commands.push(if now {
                TerminalCommand::SetDecoration(decoration)
            } else {
                TerminalCommand::ClearDecoration(decoration)
            });
        }
    }
    commands
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn transition_between_equal_styles_is_empty() {
        let style = CellStyle {
            bold: true,
            fg: Some(Color::Green),
            ..CellStyle::default()
        };
        assert!(style_transition(&style, &style).is_empty());
    }

    #[test]
    fn transition_restores_cleared_color() {
        let from = CellStyle {
            fg: Some(Color::Red),
            ..CellStyle::default()
        };
        let to = CellStyle::default();
        assert_eq!(
            style_transition(&from, &to),
            vec![TerminalCommand::ClearColor(ColorLayer::Foreground)]
        );
    }

    #[test]
    fn transition_covers_decorations() {
        let from = CellStyle {
            underline: true,
            ..CellStyle::default()
        };
        let to = CellStyle {
            bold: true,
            ..CellStyle::default()
        };
        assert_eq!(
            style_transition(&from, &to),
            vec![
                TerminalCommand::SetDecoration(Decoration::Bold),
                TerminalCommand::ClearDecoration(Decoration::Underline),
            ]
        );
    }
}

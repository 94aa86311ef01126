//! kotter: declarative, reactive terminal block rendering.
//!
//! A session owns the terminal and runs one *section* at a time: a
//! render block that is re-evaluated and redrawn in place whenever the
//! live state it reads changes. Completed output scrolls up into stable
//! history — either as finished sections or as one-shot *aside* lines —
//! while keyboard input, timers, and animations feed the same visual
//! stream without tearing.
//!
//! ```ignore
//! use std::time::Duration;
//!
//! kotter::session(|s| async move {
//!     let seconds = s.live_var(0u64);
//!     let section = s.section({
//!         let seconds = seconds.clone();
//!         move |scope| {
//!             scope.bold();
//!             scope.text_line(format!("elapsed: {}s (press q to quit)", seconds.get()));
//!         }
//!     });
//!     section
//!         .run_until_key_pressed([kotter::Key::Q])
//!         .await
//! })
//! .await?;
//! # Ok::<(), kotter::KotterError>(())
//! ```

pub mod ansi;
pub mod anim;
pub mod command;
pub mod decorations;
pub mod error;
pub mod input;
pub mod key;
pub mod offscreen;
pub mod reactive;
pub mod render_scope;
pub mod run;
pub mod scoped_data;
pub mod section;
pub mod session;
pub mod style;
mod sync;
pub mod terminal;
pub mod text_area;
pub mod text_ptr;
pub mod timer;

pub use anim::{RenderAnim, TextAnim};
pub use command::TerminalCommand;
pub use decorations::BorderCharacters;
pub use error::{KotterError, Result};
pub use input::{
    Completions, InputCompleter, OnInputChangedScope, OnInputEnteredScope, OnKeyPressedScope,
};
pub use key::Key;
pub use offscreen::{OffscreenBuffer, OffscreenRenderer};
pub use reactive::{LiveList, LiveMap, LiveVar};
pub use render_scope::{InputOptions, RenderScope};
pub use run::{RunScope, Section};
pub use scoped_data::{ConcurrentScopedData, Lifecycle};
pub use session::{Session, SessionBuilder, session};
pub use style::{CellStyle, Color, ColorLayer, Decoration};
pub use terminal::{
    SystemTerminal, Terminal, TerminalFactory, TestTerminal, TestTerminalHandle, first_available,
    resolve_lines,
};
pub use text_area::{Cell, TextArea};
pub use text_ptr::TextPtr;
pub use timer::{TimerKey, TimerManager, TimerScope};

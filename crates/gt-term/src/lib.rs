// SPDX-License-Identifier: MIT
//
// gt-term: bitmap graphics and raw input over the Kitty terminal protocols.
//
// The driver puts the terminal into raw, non-blocking mode, turns on the
// Kitty keyboard protocol and SGR-pixel mouse reporting, and hands the
// caller a shared-memory framebuffer each frame that the terminal
// displays with a Kitty graphics command. Publication is paced by the
// terminal's acknowledgements, so a slow terminal never builds a backlog.
//
// Layering, leaves first:
//
//   error, options, logging   ambient plumbing
//   ansi                      escape sequences we write
//   terminal                  raw mode, restore on exit/panic/signal
//   keys, reader, input       key codes and state, stdin bytes, parser
//   framebuffer               shm generations and the ack handshake
//   session, frame_loop       one frame at a time, then a loop of them
//
// Direct libc, no TUI framework: the protocol surface is small and the
// restore path has to be async-signal-safe.

#[cfg(not(unix))]
compile_error!("gt-term needs a Unix terminal (termios, POSIX shared memory)");

pub mod ansi;
pub mod error;
pub mod frame_loop;
pub mod framebuffer;
pub mod input;
pub mod keys;
pub mod logging;
pub mod options;
pub mod reader;
pub mod session;
pub mod terminal;

pub use error::{Error, Result};
pub use frame_loop::{Action, App, Frame};
pub use input::{Event, KeyEvent, KeyEventKind, Modifiers, MouseReport};
pub use keys::{Key, KeyCode, KeyState};
pub use options::Options;
pub use session::{MouseState, Session};

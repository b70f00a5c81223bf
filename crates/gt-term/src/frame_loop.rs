// SPDX-License-Identifier: MIT
//
// Frame loop: drive a `Session` at a fixed cadence.
//
// The session already knows how to run one frame; this module adds the
// heartbeat around it. Every iteration:
//
//   1. `begin_frame` drains input and maybe allocates a framebuffer.
//   2. The app gets a `Frame` (input state, this frame's events, and the
//      pixels if a buffer was allocated) and says whether to go on.
//   3. `end_frame` publishes.
//   4. Sleep out the rest of the frame interval.
//
// There is no blocking on input: stdin is non-blocking and drained every
// iteration, so the interval alone sets both the frame rate and the input
// latency. Graphics acknowledgements gate how often a new buffer is
// offered; a terminal slower than the interval simply gets fewer frames.

use std::io::Write;
use std::thread;
use std::time::Instant;

use tracing::info;

use crate::error::Result;
use crate::input::Event;
use crate::keys::KeyState;
use crate::reader::ByteSource;
use crate::session::{MouseState, Session};
use crate::terminal::{PixelSize, Size};

// ─── App Trait ───────────────────────────────────────────────────────────────

/// What the application tells the loop to do after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Keep running.
    Continue,
    /// Publish this frame and stop.
    Quit,
}

/// Application interface for [`run`].
pub trait App {
    /// Handle one frame: read input from `frame`, paint
    /// [`frame.pixels()`](Frame::pixels) if it is `Some`.
    fn frame(&mut self, frame: &mut Frame<'_>) -> Action;
}

// ─── Frame ───────────────────────────────────────────────────────────────────

/// Everything an app sees during one frame.
pub struct Frame<'a> {
    number: u64,
    events: &'a [Event],
    keys: &'a KeyState,
    mouse: &'a MouseState,
    cells: Size,
    size: PixelSize,
    pixels: Option<&'a mut [u32]>,
}

impl<'a> Frame<'a> {
    pub(crate) const fn new(
        number: u64,
        events: &'a [Event],
        keys: &'a KeyState,
        mouse: &'a MouseState,
        cells: Size,
        size: PixelSize,
        pixels: Option<&'a mut [u32]>,
    ) -> Self {
        Self {
            number,
            events,
            keys,
            mouse,
            cells,
            size,
            pixels,
        }
    }

    /// Frames since the loop started, from 0.
    #[inline]
    #[must_use]
    pub const fn number(&self) -> u64 {
        self.number
    }

    /// Events drained this frame, already applied to `keys` and `mouse`.
    #[inline]
    #[must_use]
    pub const fn events(&self) -> &[Event] {
        self.events
    }

    #[inline]
    #[must_use]
    pub const fn keys(&self) -> &KeyState {
        self.keys
    }

    #[inline]
    #[must_use]
    pub const fn mouse(&self) -> &MouseState {
        self.mouse
    }

    #[inline]
    #[must_use]
    pub const fn cell_size(&self) -> Size {
        self.cells
    }

    /// Terminal size in pixels; also the framebuffer's dimensions when
    /// [`pixels`](Self::pixels) is `Some`.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> PixelSize {
        self.size
    }

    /// Row-major pixels to paint, `size().width` per row. `None` while the
    /// terminal hasn't acknowledged the last frame.
    #[must_use]
    pub fn pixels(&mut self) -> Option<&mut [u32]> {
        self.pixels.as_deref_mut()
    }
}

// ─── Loop ────────────────────────────────────────────────────────────────────

/// Run frames until `app` returns [`Action::Quit`].
///
/// Paced by `session.options().frame_interval`.
///
/// # Errors
///
/// Returns the first output error. The session is left intact; dropping
/// it restores the terminal.
pub fn run<S: ByteSource, W: Write>(session: &mut Session<S, W>, app: &mut impl App) -> Result<()> {
    let interval = session.options().frame_interval;
    let mut number = 0u64;

    loop {
        let started = Instant::now();

        let events = session.begin_frame();
        let action = {
            let mut frame = session.frame(number, &events);
            app.frame(&mut frame)
        };
        session.end_frame()?;

        if action == Action::Quit {
            info!(frames = number + 1, "frame loop finished");
            return Ok(());
        }
        number += 1;

        if let Some(rest) = interval.checked_sub(started.elapsed()) {
            thread::sleep(rest);
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

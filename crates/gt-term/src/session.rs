// SPDX-License-Identifier: MIT
//
// Session: the per-process aggregate and the per-frame protocol.
//
// A session owns everything that changes frame to frame (key state,
// mouse state, the parser, the framebuffer) plus the terminal handle
// whose drop restores the terminal. Each frame runs:
//
//   begin_frame   refresh sizes, snapshot input state, drain stdin,
//                 apply events, maybe allocate a framebuffer
//   (caller)      read input, paint pixels_mut() if Some
//   end_frame     publish the framebuffer if one was allocated
//
// The byte source and the output are type parameters so tests can drive
// a session from a byte slice into a `Vec<u8>` without a terminal.

use std::io::{self, Stdout, Write};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::frame_loop::Frame;
use crate::framebuffer::Framebuffer;
use crate::input::{Event, MouseReport, Parser};
use crate::keys::KeyState;
use crate::options::Options;
use crate::reader::{ByteSource, StdinSource};
use crate::terminal::{self, PixelSize, Size, Terminal};

// ─── MouseState ─────────────────────────────────────────────────────────────

/// Pointer position (pixels) and held buttons.
///
/// Bit `n` of `buttons` is set while button `n` is held: 0 left,
/// 1 middle, 2 right, 3 and up for the extra buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MouseState {
    pub x: u32,
    pub y: u32,
    pub buttons: u32,
    /// `buttons` as of the start of this frame.
    pub prev_buttons: u32,
}

impl MouseState {
    /// Whether button `n` is held.
    #[must_use]
    pub const fn is_down(&self, button: u32) -> bool {
        button < 32 && self.buttons & (1 << button) != 0
    }

    /// Held now, not at the start of the frame.
    #[must_use]
    pub const fn just_pressed(&self, button: u32) -> bool {
        button < 32 && (self.buttons & !self.prev_buttons) & (1 << button) != 0
    }

    #[must_use]
    pub const fn just_released(&self, button: u32) -> bool {
        button < 32 && (self.prev_buttons & !self.buttons) & (1 << button) != 0
    }

    /// Fold one report in: the position always moves; a button report
    /// sets (`M`) or clears (`m`) its bit.
    pub fn apply(&mut self, report: &MouseReport) {
        self.x = report.x;
        self.y = report.y;
        match report.button_index() {
            Some(b) if b < 32 && report.pressed => self.buttons |= 1 << b,
            Some(b) if b < 32 => self.buttons &= !(1 << b),
            _ => {}
        }
    }

    const fn begin_frame(&mut self) {
        self.prev_buttons = self.buttons;
    }
}

// ─── Session ────────────────────────────────────────────────────────────────

/// One interactive graphics session.
#[derive(Debug)]
pub struct Session<S: ByteSource = StdinSource, W: Write = Stdout> {
    terminal: Terminal,
    input: S,
    output: W,
    options: Options,
    cell_size: Size,
    pixel_size: PixelSize,
    parser: Parser,
    keys: KeyState,
    mouse: MouseState,
    framebuffer: Framebuffer,
}

impl Session {
    /// Take over the controlling terminal: raw mode, mouse and keyboard
    /// protocols on. Dropping the session restores everything.
    ///
    /// # Errors
    ///
    /// [`Error::NotATerminal`](crate::error::Error::NotATerminal) when stdin
    /// isn't a TTY, or [`Error::Io`](crate::error::Error::Io) if the
    /// terminal can't be configured.
    pub fn start(options: Options) -> Result<Self> {
        let mut session = Self::with_io(StdinSource, io::stdout(), options);
        session.terminal.enter(&session.options)?;
        session.refresh_sizes();
        info!(
            cols = session.cell_size.cols,
            rows = session.cell_size.rows,
            width = session.pixel_size.width,
            height = session.pixel_size.height,
            "session started"
        );
        Ok(session)
    }
}

impl<S: ByteSource, W: Write> Session<S, W> {
    /// A session over arbitrary input and output. Does not touch the
    /// terminal; sizes stay zero until [`set_sizes`](Self::set_sizes).
    #[must_use]
    pub fn with_io(input: S, output: W, options: Options) -> Self {
        let framebuffer = Framebuffer::new(options.shm_prefix.clone());
        Self {
            terminal: Terminal::new(),
            input,
            output,
            options,
            cell_size: Size::default(),
            pixel_size: PixelSize::default(),
            parser: Parser::new(),
            keys: KeyState::new(),
            mouse: MouseState::default(),
            framebuffer,
        }
    }

    /// Override the terminal geometry. Sizes are re-queried every frame
    /// while the session owns a real terminal.
    pub const fn set_sizes(&mut self, cells: Size, pixels: PixelSize) {
        self.cell_size = cells;
        self.pixel_size = pixels;
    }

    fn refresh_sizes(&mut self) {
        if !self.terminal.is_active() {
            return;
        }
        if let Some(cells) = terminal::cell_size() {
            self.cell_size = cells;
        }
        self.pixel_size = terminal::pixel_size().unwrap_or_default();
    }

    /// Start a frame: refresh sizes, snapshot key and button state, drain
    /// and apply all pending input, then allocate a framebuffer unless the
    /// previous one is still unacknowledged.
    ///
    /// Returns the events drained this frame, in arrival order. Framebuffer
    /// failures are logged, not returned; the next frame retries.
    pub fn begin_frame(&mut self) -> Vec<Event> {
        self.refresh_sizes();
        self.framebuffer.clear_pending();
        self.keys.begin_frame();
        self.mouse.begin_frame();

        let events = self.parser.drain(&mut self.input);
        for event in &events {
            self.apply(event);
        }

        match self.framebuffer.request(self.pixel_size) {
            Ok(true) => debug!(id = self.framebuffer.last_sent(), "frame buffer ready"),
            Ok(false) => {}
            Err(Error::NoPixelSize) => debug!("no pixel size, skipping framebuffer"),
            Err(err) => warn!(%err, "no framebuffer this frame"),
        }
        events
    }

    fn apply(&mut self, event: &Event) {
        match event {
            Event::Key(key) => self.keys.apply(key),
            Event::Mouse(report) => self.mouse.apply(report),
            Event::GraphicsAck { id, .. } => self.framebuffer.acknowledge(*id),
            // Releases that happen while unfocused never reach us.
            Event::Focus(false) => {
                debug!("focus lost, releasing keys and buttons");
                self.keys.clear();
                self.mouse.buttons = 0;
            }
            Event::Focus(true) => {}
        }
    }

    /// Finish a frame: publish the framebuffer if one was allocated.
    /// Returns whether anything was sent.
    ///
    /// # Errors
    ///
    /// [`Error::Io`](crate::error::Error::Io) if the terminal write fails.
    pub fn end_frame(&mut self) -> Result<bool> {
        Ok(self.framebuffer.publish(&mut self.output)?)
    }

    /// Borrow this frame's state for an app, alongside the events
    /// [`begin_frame`](Self::begin_frame) returned.
    pub(crate) fn frame<'a>(&'a mut self, number: u64, events: &'a [Event]) -> Frame<'a> {
        Frame::new(
            number,
            events,
            &self.keys,
            &self.mouse,
            self.cell_size,
            self.pixel_size,
            self.framebuffer.pixels_mut(),
        )
    }

    /// Pixels to paint this frame, or `None` when no buffer was allocated
    /// (waiting for the terminal, or no pixel size).
    #[must_use]
    pub fn pixels_mut(&mut self) -> Option<&mut [u32]> {
        self.framebuffer.pixels_mut()
    }

    #[inline]
    #[must_use]
    pub const fn keys(&self) -> &KeyState {
        &self.keys
    }

    #[inline]
    #[must_use]
    pub const fn mouse(&self) -> &MouseState {
        &self.mouse
    }

    #[inline]
    #[must_use]
    pub const fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    #[inline]
    #[must_use]
    pub const fn cell_size(&self) -> Size {
        self.cell_size
    }

    #[inline]
    #[must_use]
    pub const fn pixel_size(&self) -> PixelSize {
        self.pixel_size
    }

    #[inline]
    #[must_use]
    pub const fn options(&self) -> &Options {
        &self.options
    }

    /// The output the session writes protocol commands to.
    #[inline]
    #[must_use]
    pub const fn output(&self) -> &W {
        &self.output
    }

    /// Hide the text cursor. Restored on teardown.
    ///
    /// # Errors
    ///
    /// [`Error::Io`](crate::error::Error::Io) if the write fails.
    pub fn hide_cursor(&mut self) -> Result<()> {
        Ok(terminal::hide_cursor(&mut self.output)?)
    }

    /// Show the text cursor if it was hidden.
    ///
    /// # Errors
    ///
    /// [`Error::Io`](crate::error::Error::Io) if the write fails.
    pub fn show_cursor(&mut self) -> Result<()> {
        terminal::show_cursor(&mut self.output)?;
        Ok(())
    }

    /// Restore the terminal now rather than at drop.
    pub fn close(&mut self) {
        self.terminal.leave();
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{Key, KeyCode};
    use std::collections::VecDeque;

    type TestSession = Session<VecDeque<u8>, Vec<u8>>;

    fn session(tag: &str) -> TestSession {
        let options = Options::default()
            .with_shm_prefix(format!("/gt-session-{}-{tag}-", std::process::id()))
            .with_signal_handlers(false);
        Session::with_io(VecDeque::new(), Vec::new(), options)
    }

    fn feed(s: &mut TestSession, bytes: &[u8]) {
        s.input.extend(bytes);
    }

    const SMALL: PixelSize = PixelSize {
        width: 8,
        height: 4,
    };

    // ── Keys ────────────────────────────────────────────────────────────

    #[test]
    fn press_then_release_across_frames() {
        let mut s = session("keys");
        let a = Key::from_char('a').unwrap();

        feed(&mut s, b"\x1b[97u");
        s.begin_frame();
        assert!(s.keys().is_down(a));
        assert!(s.keys().just_pressed(a));

        s.begin_frame();
        assert!(s.keys().is_down(a));
        assert!(s.keys().was_down(a));
        assert!(!s.keys().just_pressed(a));

        feed(&mut s, b"\x1b[97;1:3u");
        s.begin_frame();
        assert!(!s.keys().is_down(a));
        assert!(s.keys().just_released(a));
    }

    #[test]
    fn press_and_release_in_one_frame_nets_up() {
        let mut s = session("tap");
        feed(&mut s, b"\x1b[1;1A\x1b[1;1:3A");
        let events = s.begin_frame();
        assert_eq!(events.len(), 2);
        assert!(!s.keys().is_down(KeyCode::Up));
    }

    #[test]
    fn repeat_keeps_key_down() {
        let mut s = session("repeat");
        feed(&mut s, b"\x1b[119u");
        s.begin_frame();
        feed(&mut s, b"\x1b[119;1:2u\x1b[119;1:2u");
        s.begin_frame();
        assert!(s.keys().is_down(Key::from_char('w').unwrap()));
    }

    // ── Mouse ───────────────────────────────────────────────────────────

    #[test]
    fn mouse_press_motion_release() {
        let mut s = session("mouse");
        feed(&mut s, b"\x1b[<0;10;20M");
        s.begin_frame();
        assert_eq!((s.mouse().x, s.mouse().y), (10, 20));
        assert!(s.mouse().is_down(0));
        assert!(s.mouse().just_pressed(0));

        feed(&mut s, b"\x1b[<32;15;22M");
        s.begin_frame();
        assert_eq!((s.mouse().x, s.mouse().y), (15, 22));
        assert!(s.mouse().is_down(0));
        assert!(!s.mouse().just_pressed(0));

        feed(&mut s, b"\x1b[<0;16;23m");
        s.begin_frame();
        assert!(!s.mouse().is_down(0));
        assert!(s.mouse().just_released(0));
        assert_eq!(s.mouse().buttons, 0);
    }

    #[test]
    fn motion_only_moves() {
        let mut s = session("motion");
        feed(&mut s, b"\x1b[<35;300;200M");
        s.begin_frame();
        assert_eq!(
            *s.mouse(),
            MouseState {
                x: 300,
                y: 200,
                buttons: 0,
                prev_buttons: 0
            }
        );
    }

    #[test]
    fn right_button_uses_bit_two() {
        let mut s = session("right");
        feed(&mut s, b"\x1b[<2;1;1M");
        s.begin_frame();
        assert_eq!(s.mouse().buttons, 0b100);
    }

    #[test]
    fn focus_loss_releases_everything() {
        let mut s = session("focus");
        let d = Key::from_char('d').unwrap();
        feed(&mut s, b"\x1b[100u\x1b[<0;5;5M");
        s.begin_frame();
        assert!(s.keys().is_down(d));
        assert!(s.mouse().is_down(0));

        feed(&mut s, b"\x1b[O");
        s.begin_frame();
        assert!(!s.keys().is_down(d));
        assert!(s.keys().just_released(d));
        assert!(s.mouse().just_released(0));

        feed(&mut s, b"\x1b[I");
        let events = s.begin_frame();
        assert_eq!(events, vec![Event::Focus(true)]);
        assert_eq!(s.mouse().buttons, 0);
    }

    // ── Framebuffer ─────────────────────────────────────────────────────

    #[test]
    fn no_pixel_size_means_no_pixels() {
        let mut s = session("nosize");
        s.begin_frame();
        assert!(s.pixels_mut().is_none());
        assert!(!s.end_frame().unwrap());
        assert!(s.output().is_empty());
    }

    #[test]
    fn frame_publishes_then_waits_for_ack() {
        let mut s = session("flow");
        s.set_sizes(Size { cols: 2, rows: 1 }, SMALL);

        s.begin_frame();
        s.pixels_mut().unwrap().fill(0xFFFF_FFFF);
        assert!(s.end_frame().unwrap());
        let sent = s.output().len();
        assert!(sent > 0);

        // No ack yet: nothing to paint, nothing sent.
        s.begin_frame();
        assert!(s.pixels_mut().is_none());
        assert!(!s.end_frame().unwrap());
        assert_eq!(s.output().len(), sent);

        feed(&mut s, b"\x1b_Gi=1;OK\x1b\\");
        s.begin_frame();
        assert_eq!(s.framebuffer().last_sent(), 2);
        assert_eq!(s.pixels_mut().map(|p| p.len()), Some(32));
        assert!(s.end_frame().unwrap());
    }

    #[test]
    fn unpublished_frame_is_replaced() {
        let mut s = session("skip");
        s.set_sizes(Size::default(), SMALL);
        s.begin_frame();
        assert!(s.framebuffer().is_pending());
        s.begin_frame();
        assert_eq!(s.framebuffer().last_sent(), 2);
        assert!(s.end_frame().unwrap());
        let out = String::from_utf8_lossy(s.output());
        assert!(out.contains(",i=2,"), "{out}");
        assert!(!out.contains(",i=1,"), "{out}");
    }

    #[test]
    fn garbage_then_valid_input() {
        let mut s = session("garbage");
        feed(&mut s, b"xyz\x1b[~\x1b]\x1b[1;1A");
        let events = s.begin_frame();
        assert_eq!(events.len(), 1);
        assert!(s.keys().is_down(KeyCode::Up));
    }
}

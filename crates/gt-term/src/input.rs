// SPDX-License-Identifier: MIT
//
// Terminal input parser.
//
// Turns raw stdin bytes into structured events. Handles every protocol we
// enable in `terminal.rs`:
//
// - Kitty keyboard protocol (`CSI number ; modifiers : type ; text u`)
// - Legacy CSI key forms the Kitty protocol keeps (`CSI 1 ; 5 A`, `CSI 3 ~`)
// - SGR-pixel mouse reports (`CSI < button ; x ; y M` / `m`)
// - Kitty graphics responses (`ESC _ G i=id ; message ESC \`)
//
// # Design
//
// A byte-at-a-time state machine. Most bytes only move the machine
// between states, accumulating digits in `pending`; a few fields (mouse
// coordinates, graphics ids) are read greedily straight from the
// `ByteSource` once their introducer is seen.
//
// ESC always restarts the machine, whatever state it was in, so garbage
// never poisons the next sequence. A drain cycle ends when the source
// runs dry, and the machine is reset then too: a sequence split across
// two drains is dropped. Terminals write each report in one burst, and
// we drain every frame, so this costs nothing in practice.

use bitflags::bitflags;
use tracing::{debug, trace, warn};

use crate::keys::{self, Key};
use crate::reader::ByteSource;

// ─── Event Types ────────────────────────────────────────────────────────────

/// A parsed terminal input event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A keyboard event (press, repeat, or release).
    Key(KeyEvent),
    /// A mouse report (button change or motion, pixel position).
    Mouse(MouseReport),
    /// The terminal answered a graphics command for image `id`.
    GraphicsAck {
        /// Image id the response refers to.
        id: u32,
        /// Whether the terminal reported `OK`.
        ok: bool,
    },
    /// The window gained (`true`) or lost (`false`) focus (DEC 1004).
    Focus(bool),
}

/// A keyboard event with key identity, modifiers, and press state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// Which key.
    pub key: Key,
    /// Active modifier keys.
    pub modifiers: Modifiers,
    /// Press, repeat, or release.
    pub kind: KeyEventKind,
}

/// Key press / repeat / release distinction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyEventKind {
    /// Initial press (also any event with no explicit type).
    #[default]
    Press,
    /// Auto-repeat while held.
    Repeat,
    /// Key released.
    Release,
}

bitflags! {
    /// Keyboard modifier flags.
    ///
    /// Matches the Kitty keyboard protocol bitmask; the wire value is
    /// `1 + bitmask`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Modifiers: u8 {
        const SHIFT     = 0b0000_0001;
        const ALT       = 0b0000_0010;
        const CTRL      = 0b0000_0100;
        const SUPER     = 0b0000_1000;
        const HYPER     = 0b0001_0000;
        const META      = 0b0010_0000;
        const CAPS_LOCK = 0b0100_0000;
        const NUM_LOCK  = 0b1000_0000;
    }
}

impl Modifiers {
    /// Decode the 1-indexed protocol value. 0 and 1 both mean "none".
    #[allow(clippy::cast_possible_truncation)] // Only the low 8 bits are defined.
    #[must_use]
    pub const fn from_param(param: u32) -> Self {
        Self::from_bits_truncate(param.saturating_sub(1) as u8)
    }
}

/// One SGR mouse report, as sent.
///
/// `x` and `y` are in pixels (SGR-pixel mode, DEC 1016).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseReport {
    /// Raw button code, including modifier and motion bits.
    pub button: u32,
    pub x: u32,
    pub y: u32,
    /// `M` (press or motion) rather than `m` (release).
    pub pressed: bool,
}

impl MouseReport {
    /// Button code for motion with no button held.
    pub const MOTION: u32 = 35;

    /// Bit position of the button this report changes, if any.
    ///
    /// Codes 128 and above are the extra buttons, numbered from 3.
    /// Pure motion and wheel reports change no button. Otherwise the
    /// low two bits name the button; the shift/alt/ctrl bits (4, 8, 16)
    /// and the drag bit (32) are ignored.
    #[must_use]
    pub const fn button_index(&self) -> Option<u32> {
        if self.button == Self::MOTION {
            return None;
        }
        if self.button >= 128 {
            return Some(3 + (self.button & 7));
        }
        if self.is_wheel() {
            return None;
        }
        match self.button & 3 {
            3 => None,
            b => Some(b),
        }
    }

    /// Whether this is a wheel report (bit 6).
    #[must_use]
    pub const fn is_wheel(&self) -> bool {
        self.button < 128 && self.button & 64 != 0
    }
}

// ─── Parser ─────────────────────────────────────────────────────────────────

const ESC: u8 = 0x1B;

/// Longest numeric token we accept before calling it garbage.
const PENDING_CAP: usize = 32;

/// Raw bytes kept per sequence for the debug log.
const READ_CAP: usize = 1024;

/// Graphics response message bytes kept (`OK`, `ENOENT:...`).
const MESSAGE_CAP: usize = 128;

/// Parser state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// Between sequences; stray bytes are ignored.
    #[default]
    Idle,
    /// Saw `ESC`.
    EscapeSeen,
    /// Saw `ESC [`.
    CsiSeen,
    /// Reading the key number.
    KeyNumber,
    /// Reading the modifier field.
    KeyModifier,
    /// Reading the event type (or skipping associated text).
    KeyType,
    /// Saw `ESC _`; waiting for `G`.
    GraphicsResponse,
}

/// Streaming escape-sequence parser.
///
/// Pull bytes with [`drain`](Parser::drain); it returns every event the
/// bytes formed and leaves the parser reset.
#[derive(Debug)]
pub struct Parser {
    state: State,
    /// Token currently being read (digits, mostly).
    pending: Vec<u8>,
    /// Everything since the last ESC, for diagnostics.
    read: Vec<u8>,
    keycode: u32,
    modifier: u32,
    /// In `KeyType`: inside the associated-text field rather than the
    /// event type.
    in_text: bool,
}

impl Parser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            pending: Vec::with_capacity(PENDING_CAP),
            read: Vec::with_capacity(64),
            keycode: 0,
            modifier: 1,
            in_text: false,
        }
    }

    /// Current state. Always [`State::Idle`] between drains.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    /// Read from `src` until it has nothing more, returning every event
    /// the bytes formed. Any half-read sequence is discarded.
    pub fn drain(&mut self, src: &mut impl ByteSource) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(byte) = src.read_byte() {
            self.advance(byte, src, &mut events);
        }
        if !self.read.is_empty() {
            trace!(raw = %escape(&self.read), "read");
        }
        self.reset();
        events
    }

    /// Back to `Idle` with empty buffers.
    pub fn reset(&mut self) {
        self.state = State::Idle;
        self.pending.clear();
        self.read.clear();
        self.keycode = 0;
        self.modifier = 1;
        self.in_text = false;
    }

    fn advance(&mut self, byte: u8, src: &mut impl ByteSource, events: &mut Vec<Event>) {
        if byte == ESC {
            self.begin_escape();
            return;
        }
        self.record(byte);

        match self.state {
            State::Idle => {}

            State::EscapeSeen => {
                self.pending.clear();
                self.state = match byte {
                    b'[' => State::CsiSeen,
                    b'_' => State::GraphicsResponse,
                    _ => State::Idle,
                };
            }

            State::CsiSeen => match byte {
                b'<' => self.read_mouse(src, events),
                b'0'..=b'9' => {
                    self.pending.push(byte);
                    self.state = State::KeyNumber;
                }
                // Legacy form with the key number omitted: `CSI A`.
                b'A' | b'B' | b'C' | b'D' | b'E' | b'F' | b'H' | b'P' | b'Q' | b'S' => {
                    self.keycode = 1;
                    self.modifier = 1;
                    self.dispatch(byte, events);
                    self.state = State::Idle;
                }
                // Focus reports: `CSI I` in, `CSI O` out.
                b'I' | b'O' => {
                    events.push(Event::Focus(byte == b'I'));
                    self.state = State::Idle;
                }
                _ => self.state = State::Idle,
            },

            State::KeyNumber => match byte {
                b';' => {
                    self.keycode = take_number(&mut self.pending).unwrap_or(0);
                    self.modifier = 1;
                    debug!(number = self.keycode, "key number");
                    self.state = State::KeyModifier;
                }
                _ if is_final(byte) => {
                    self.keycode = take_number(&mut self.pending).unwrap_or(0);
                    self.modifier = 1;
                    debug!(number = self.keycode, "key number");
                    self.dispatch(byte, events);
                    self.state = State::Idle;
                }
                // Digits, and `:` alternate-key sub-fields we don't use.
                _ => self.push_pending(byte),
            },

            State::KeyModifier => match byte {
                b'0'..=b'9' => self.push_pending(byte),
                b':' | b';' => {
                    self.modifier = take_number(&mut self.pending).unwrap_or(1);
                    if self.modifier > 1 {
                        debug!(modifier = self.modifier, "key modifier");
                    }
                    self.in_text = byte == b';';
                    self.state = State::KeyType;
                }
                _ if is_final(byte) => {
                    self.modifier = take_number(&mut self.pending).unwrap_or(1);
                    self.dispatch(byte, events);
                    self.state = State::Idle;
                }
                _ => self.state = State::Idle,
            },

            State::KeyType => match byte {
                b'0'..=b'9' if self.in_text => {}
                b'0'..=b'9' => self.push_pending(byte),
                b';' => self.in_text = true,
                b':' if self.in_text => {}
                _ if is_final(byte) => {
                    self.dispatch(byte, events);
                    self.state = State::Idle;
                }
                _ => self.state = State::Idle,
            },

            State::GraphicsResponse => {
                if byte == b'G' {
                    self.read_graphics_response(src, events);
                    self.state = State::Idle;
                }
            }
        }
    }

    fn begin_escape(&mut self) {
        if !self.read.is_empty() {
            trace!(raw = %escape(&self.read), "reset");
        }
        self.pending.clear();
        self.read.clear();
        self.in_text = false;
        self.state = State::EscapeSeen;
    }

    fn record(&mut self, byte: u8) {
        if self.read.len() < READ_CAP {
            self.read.push(byte);
        }
    }

    /// Next byte from the source, noted in the diagnostics buffer.
    fn next_byte(&mut self, src: &mut impl ByteSource) -> Option<u8> {
        let byte = src.read_byte()?;
        self.record(byte);
        Some(byte)
    }

    fn push_pending(&mut self, byte: u8) {
        if self.pending.len() >= PENDING_CAP {
            debug!("token overflow, dropping sequence");
            self.pending.clear();
            self.state = State::Idle;
            return;
        }
        self.pending.push(byte);
    }

    /// Read a decimal integer straight from the source.
    ///
    /// Returns the value (`None` if there were no digits) and the byte
    /// that ended it (`None` if the source ran dry).
    fn read_u32(&mut self, src: &mut impl ByteSource) -> (Option<u32>, Option<u8>) {
        let mut value: Option<u32> = None;
        loop {
            match self.next_byte(src) {
                Some(b @ b'0'..=b'9') => {
                    let digit = u32::from(b - b'0');
                    value = Some(value.unwrap_or(0).saturating_mul(10).saturating_add(digit));
                }
                other => return (value, other),
            }
        }
    }

    /// `CSI <` has been seen: read `button ; x ; y` and the `M`/`m` final.
    fn read_mouse(&mut self, src: &mut impl ByteSource, events: &mut Vec<Event>) {
        let mut fields = [0u32; 3];
        let mut pressed = false;
        for (i, field) in fields.iter_mut().enumerate() {
            let (value, end) = self.read_u32(src);
            if end == Some(ESC) {
                self.begin_escape();
                return;
            }
            let expected_end = match (i, end) {
                (0 | 1, Some(b';')) | (2, Some(b'M' | b'm')) => true,
                _ => false,
            };
            let Some(value) = value.filter(|_| expected_end) else {
                debug!("malformed mouse report");
                self.state = State::Idle;
                return;
            };
            *field = value;
            pressed = end == Some(b'M');
        }
        events.push(Event::Mouse(MouseReport {
            button: fields[0],
            x: fields[1],
            y: fields[2],
            pressed,
        }));
        self.state = State::Idle;
    }

    /// `ESC _ G` has been seen: pick out `i=<id>` and the message, and
    /// consume through the terminating `\`.
    fn read_graphics_response(&mut self, src: &mut impl ByteSource, events: &mut Vec<Event>) {
        let key = self.next_byte(src);
        let eq = self.next_byte(src);
        if (key, eq) != (Some(b'i'), Some(b'=')) {
            self.skip_to_terminator(src, eq);
            return;
        }

        let (id, mut end) = self.read_u32(src);

        // Remaining `key=value` pairs, up to the message.
        while let Some(b) = end {
            if b == b';' || b == b'\\' {
                break;
            }
            end = self.next_byte(src);
        }

        let mut message = Vec::new();
        let mut terminated = end == Some(b'\\');
        if end == Some(b';') {
            loop {
                match self.next_byte(src) {
                    None => break,
                    Some(b'\\') => {
                        terminated = true;
                        break;
                    }
                    Some(ESC) => {}
                    Some(b) if message.len() < MESSAGE_CAP => message.push(b),
                    Some(_) => {}
                }
            }
        }

        // A response cut off before its terminator may have lost the
        // rest of its message; don't guess at the verdict.
        if !terminated {
            debug!(?id, "truncated graphics response");
            return;
        }
        let Some(id) = id else {
            debug!("graphics response without an id");
            return;
        };
        let ok = message == b"OK";
        if !ok {
            warn!(id, message = %escape(&message), "terminal rejected image");
        }
        events.push(Event::GraphicsAck { id, ok });
    }

    fn skip_to_terminator(&mut self, src: &mut impl ByteSource, last: Option<u8>) {
        let mut byte = last;
        while let Some(b) = byte {
            if b == b'\\' {
                return;
            }
            byte = self.next_byte(src);
        }
    }

    /// Emit the key event for `keycode` terminated by `terminator`, with
    /// the event type in `pending`.
    fn dispatch(&mut self, terminator: u8, events: &mut Vec<Event>) {
        let number = self.keycode;
        let kind = match self.pending.first() {
            None | Some(b'1') => Some(KeyEventKind::Press),
            Some(b'2') => Some(KeyEventKind::Repeat),
            Some(b'3') => Some(KeyEventKind::Release),
            Some(_) => None,
        };
        let event_type = std::mem::take(&mut self.pending);
        self.keycode = 0;

        let Some(kind) = kind else {
            debug!(number, event_type = %escape(&event_type), "unknown key event type");
            return;
        };
        let Some(key) = keys::lookup(number, terminator) else {
            debug!(number, terminator = %char::from(terminator), "unmapped key");
            return;
        };

        let modifiers = Modifiers::from_param(self.modifier);
        debug!(%key, ?kind, modifier = self.modifier, "key");
        events.push(Event::Key(KeyEvent {
            key,
            modifiers,
            kind,
        }));
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

/// CSI final byte range.
const fn is_final(byte: u8) -> bool {
    matches!(byte, 0x40..=0x7E)
}

/// Parse the leading digits of `token` and clear it.
///
/// `None` when there are no leading digits. Saturates rather than wraps.
fn take_number(token: &mut Vec<u8>) -> Option<u32> {
    let digits = token.iter().take_while(|b| b.is_ascii_digit());
    let mut value = None;
    for &b in digits {
        let digit = u32::from(b - b'0');
        value = Some(value.unwrap_or(0u32).saturating_mul(10).saturating_add(digit));
    }
    token.clear();
    value
}

/// Printable rendering of raw protocol bytes for the log.
fn escape(bytes: &[u8]) -> String {
    bytes.escape_ascii().to_string()
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyCode;
    use std::collections::VecDeque;

    /// Helper: drain a fresh parser over `data`.
    fn parse(data: &[u8]) -> Vec<Event> {
        let mut src = data;
        Parser::new().drain(&mut src)
    }

    /// Helper: parse, expecting exactly one event.
    fn parse_one(data: &[u8]) -> Event {
        let events = parse(data);
        assert_eq!(events.len(), 1, "expected 1 event, got {events:?}");
        events.into_iter().next().unwrap()
    }

    fn key(key: impl Into<Key>, modifiers: Modifiers, kind: KeyEventKind) -> Event {
        Event::Key(KeyEvent {
            key: key.into(),
            modifiers,
            kind,
        })
    }

    fn press(k: impl Into<Key>) -> Event {
        key(k, Modifiers::empty(), KeyEventKind::Press)
    }

    fn char_key(c: char) -> Key {
        Key::from_char(c).unwrap()
    }

    // ── Legacy CSI forms ────────────────────────────────────────────────

    #[test]
    fn up_with_explicit_no_modifier() {
        assert_eq!(parse_one(b"\x1b[1;1A"), press(KeyCode::Up));
    }

    #[test]
    fn arrows_with_number_omitted() {
        let events = parse(b"\x1b[A\x1b[B\x1b[C\x1b[D");
        assert_eq!(
            events,
            vec![
                press(KeyCode::Up),
                press(KeyCode::Down),
                press(KeyCode::Right),
                press(KeyCode::Left),
            ]
        );
    }

    #[test]
    fn arrow_release() {
        assert_eq!(
            parse_one(b"\x1b[1;1:3D"),
            key(KeyCode::Left, Modifiers::empty(), KeyEventKind::Release)
        );
    }

    #[test]
    fn arrow_with_ctrl() {
        assert_eq!(
            parse_one(b"\x1b[1;5C"),
            key(KeyCode::Right, Modifiers::CTRL, KeyEventKind::Press)
        );
    }

    #[test]
    fn tilde_keys() {
        assert_eq!(parse_one(b"\x1b[3~"), press(KeyCode::Delete));
        assert_eq!(parse_one(b"\x1b[2~"), press(KeyCode::Insert));
        assert_eq!(parse_one(b"\x1b[13~"), press(KeyCode::F3));
        assert_eq!(parse_one(b"\x1b[24~"), press(KeyCode::F12));
    }

    #[test]
    fn tilde_key_release_with_modifier() {
        assert_eq!(
            parse_one(b"\x1b[6;2:3~"),
            key(KeyCode::PageDown, Modifiers::SHIFT, KeyEventKind::Release)
        );
    }

    // ── Kitty CSI u ─────────────────────────────────────────────────────

    #[test]
    fn bare_u_form() {
        assert_eq!(parse_one(b"\x1b[27u"), press(KeyCode::Escape));
        assert_eq!(parse_one(b"\x1b[13u"), press(KeyCode::Enter));
        assert_eq!(parse_one(b"\x1b[97u"), press(char_key('a')));
    }

    #[test]
    fn modifier_then_u() {
        assert_eq!(
            parse_one(b"\x1b[97;5u"),
            key(char_key('a'), Modifiers::CTRL, KeyEventKind::Press)
        );
    }

    #[test]
    fn event_types() {
        assert_eq!(
            parse_one(b"\x1b[97;1:1u"),
            key(char_key('a'), Modifiers::empty(), KeyEventKind::Press)
        );
        assert_eq!(
            parse_one(b"\x1b[97;1:2u"),
            key(char_key('a'), Modifiers::empty(), KeyEventKind::Repeat)
        );
        assert_eq!(
            parse_one(b"\x1b[97;1:3u"),
            key(char_key('a'), Modifiers::empty(), KeyEventKind::Release)
        );
    }

    #[test]
    fn unknown_event_type_is_ignored() {
        assert!(parse(b"\x1b[97;1:9u").is_empty());
    }

    #[test]
    fn associated_text_is_skipped() {
        assert_eq!(parse_one(b"\x1b[97;;97u"), press(char_key('a')));
        assert_eq!(
            parse_one(b"\x1b[97;1:2;97u"),
            key(char_key('a'), Modifiers::empty(), KeyEventKind::Repeat)
        );
        assert_eq!(
            parse_one(b"\x1b[97;2;65u"),
            key(char_key('a'), Modifiers::SHIFT, KeyEventKind::Press)
        );
    }

    #[test]
    fn alternate_keys_are_ignored() {
        assert_eq!(
            parse_one(b"\x1b[97:65;2u"),
            key(char_key('a'), Modifiers::SHIFT, KeyEventKind::Press)
        );
    }

    #[test]
    fn functional_private_use_codes() {
        assert_eq!(parse_one(b"\x1b[57399u"), press(KeyCode::Kp0));
        assert_eq!(
            parse_one(b"\x1b[57441;2:3u"),
            key(KeyCode::LeftShift, Modifiers::SHIFT, KeyEventKind::Release)
        );
    }

    #[test]
    fn unmapped_pairs_emit_nothing() {
        assert!(parse(b"\x1b[200~").is_empty());
        assert!(parse(b"\x1b[57500u").is_empty());
    }

    #[test]
    fn several_sequences_in_one_drain() {
        let events = parse(b"\x1b[119u\x1b[119;1:2u\x1b[119;1:3u");
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[2],
            key(char_key('w'), Modifiers::empty(), KeyEventKind::Release)
        );
    }

    #[test]
    fn stray_bytes_outside_sequences_are_ignored() {
        assert_eq!(parse_one(b"abc\x1b[97u xyz"), press(char_key('a')));
    }

    // ── Resynchronisation ───────────────────────────────────────────────

    #[test]
    fn malformed_csi_then_valid() {
        assert_eq!(parse_one(b"\x1b[~\x1b[1;1A"), press(KeyCode::Up));
    }

    #[test]
    fn unknown_escape_then_valid() {
        assert_eq!(parse_one(b"\x1bO\x1b[13u"), press(KeyCode::Enter));
    }

    #[test]
    fn esc_interrupts_key_sequence() {
        assert_eq!(parse_one(b"\x1b[97;5\x1b[98u"), press(char_key('b')));
    }

    #[test]
    fn overlong_token_is_dropped() {
        let mut data = b"\x1b[".to_vec();
        data.extend(std::iter::repeat_n(b'9', 40));
        data.extend(b"u\x1b[27u");
        assert_eq!(parse_one(&data), press(KeyCode::Escape));
    }

    #[test]
    fn split_sequence_is_dropped() {
        let mut parser = Parser::new();
        let mut src = VecDeque::from(b"\x1b[1;1".to_vec());
        assert!(parser.drain(&mut src).is_empty());
        assert_eq!(parser.state(), State::Idle);
        src.extend(b"A");
        assert!(parser.drain(&mut src).is_empty());
    }

    #[test]
    fn drain_always_ends_idle() {
        let mut parser = Parser::new();
        let mut src: &[u8] = b"\x1b_G";
        parser.drain(&mut src);
        assert_eq!(parser.state(), State::Idle);
    }

    // ── Mouse ───────────────────────────────────────────────────────────

    #[test]
    fn mouse_press_and_release() {
        let events = parse(b"\x1b[<0;10;20M\x1b[<0;10;25m");
        assert_eq!(
            events,
            vec![
                Event::Mouse(MouseReport {
                    button: 0,
                    x: 10,
                    y: 20,
                    pressed: true
                }),
                Event::Mouse(MouseReport {
                    button: 0,
                    x: 10,
                    y: 25,
                    pressed: false
                }),
            ]
        );
    }

    #[test]
    fn mouse_motion() {
        let Event::Mouse(report) = parse_one(b"\x1b[<35;640;480M") else {
            panic!("expected a mouse report");
        };
        assert_eq!((report.x, report.y), (640, 480));
        assert_eq!(report.button_index(), None);
        assert!(!report.is_wheel());
    }

    #[test]
    fn mouse_reports_back_to_back() {
        assert_eq!(
            parse(b"\x1b[<0;1;2M\x1b[<0;3;4m"),
            vec![
                Event::Mouse(MouseReport {
                    button: 0,
                    x: 1,
                    y: 2,
                    pressed: true,
                }),
                Event::Mouse(MouseReport {
                    button: 0,
                    x: 3,
                    y: 4,
                    pressed: false,
                }),
            ]
        );
    }

    #[test]
    fn malformed_mouse_is_dropped() {
        assert!(parse(b"\x1b[<0;10M").is_empty());
        assert!(parse(b"\x1b[<0;10;20X").is_empty());
        assert!(parse(b"\x1b[<;1;2M").is_empty());
    }

    #[test]
    fn esc_inside_mouse_report_resyncs() {
        assert_eq!(parse_one(b"\x1b[<0;1\x1b[13u"), press(KeyCode::Enter));
    }

    #[test]
    fn button_index_mapping() {
        let report = |button| MouseReport {
            button,
            x: 0,
            y: 0,
            pressed: true,
        };
        assert_eq!(report(0).button_index(), Some(0));
        assert_eq!(report(2).button_index(), Some(2));
        assert_eq!(report(32).button_index(), Some(0)); // drag, left held
        assert_eq!(report(16).button_index(), Some(0)); // ctrl + left
        assert_eq!(report(64).button_index(), None); // wheel up
        assert!(report(64).is_wheel());
        assert_eq!(report(128).button_index(), Some(3));
        assert_eq!(report(129).button_index(), Some(4));
        assert_eq!(report(35).button_index(), None);
    }

    // ── Focus ───────────────────────────────────────────────────────────

    #[test]
    fn focus_in_and_out() {
        assert_eq!(
            parse(b"\x1b[O\x1b[I"),
            vec![Event::Focus(false), Event::Focus(true)]
        );
    }

    #[test]
    fn focus_between_keys() {
        assert_eq!(
            parse(b"\x1b[97u\x1b[O\x1b[98u"),
            vec![press(char_key('a')), Event::Focus(false), press(char_key('b'))]
        );
    }

    // ── Graphics responses ──────────────────────────────────────────────

    #[test]
    fn graphics_ok() {
        assert_eq!(
            parse_one(b"\x1b_Gi=7;OK\x1b\\"),
            Event::GraphicsAck { id: 7, ok: true }
        );
    }

    #[test]
    fn graphics_error_still_acknowledges() {
        assert_eq!(
            parse_one(b"\x1b_Gi=12;ENOENT:no such shm\x1b\\"),
            Event::GraphicsAck { id: 12, ok: false }
        );
    }

    #[test]
    fn truncated_graphics_response_is_not_acknowledged() {
        assert!(parse(b"\x1b_Gi=1").is_empty());
        assert!(parse(b"\x1b_Gi=1;").is_empty());
        assert!(parse(b"\x1b_Gi=1;O").is_empty());
        assert!(parse(b"\x1b_Gi=1;OK\x1b").is_empty());
    }

    #[test]
    fn graphics_response_without_message() {
        assert_eq!(
            parse_one(b"\x1b_Gi=4\x1b\\"),
            Event::GraphicsAck { id: 4, ok: false }
        );
    }

    #[test]
    fn graphics_extra_keys_before_message() {
        assert_eq!(
            parse_one(b"\x1b_Gi=3,p=1;OK\x1b\\"),
            Event::GraphicsAck { id: 3, ok: true }
        );
    }

    #[test]
    fn other_graphics_responses_are_discarded() {
        assert_eq!(parse_one(b"\x1b_Ga=q;OK\x1b\\\x1b[27u"), press(KeyCode::Escape));
    }

    #[test]
    fn graphics_then_keys_in_one_burst() {
        let events = parse(b"\x1b_Gi=2;OK\x1b\\\x1b[97u");
        assert_eq!(
            events,
            vec![Event::GraphicsAck { id: 2, ok: true }, press(char_key('a'))]
        );
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    #[test]
    fn take_number_reads_leading_digits() {
        let mut token = b"97:65".to_vec();
        assert_eq!(take_number(&mut token), Some(97));
        assert!(token.is_empty());
        assert_eq!(take_number(&mut Vec::new()), None);
        assert_eq!(take_number(&mut b"99999999999".to_vec()), Some(u32::MAX));
    }

    #[test]
    fn modifier_param_decoding() {
        assert_eq!(Modifiers::from_param(0), Modifiers::empty());
        assert_eq!(Modifiers::from_param(1), Modifiers::empty());
        assert_eq!(Modifiers::from_param(2), Modifiers::SHIFT);
        assert_eq!(Modifiers::from_param(8), Modifiers::SHIFT | Modifiers::ALT | Modifiers::CTRL);
    }
}

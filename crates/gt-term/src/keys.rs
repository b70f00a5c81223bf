// SPDX-License-Identifier: MIT
//
// Key identities and double-buffered key-down state.
//
// Every key maps to a 16-bit index into a 65 536-bit array. Printable keys
// use their Unicode code point directly (anything below `1 << 14`);
// functional keys (arrows, F-keys, keypad, media, modifiers) get dense
// indices starting at `FUNCTIONAL_KEYS_START`, assigned by declaration
// order of `KeyCode`. Word and bit are always `index >> 5` and
// `index & 31`.
//
// The terminal reports keys as `(number, final byte)` pairs: `27u` is
// Escape, `1A` is Up, `3~` is Delete, `57399u` is keypad 0. `KEY_TABLE`
// enumerates every functional pair the Kitty keyboard protocol (and the
// legacy CSI forms it keeps for compatibility) can produce, sorted so
// `lookup` is a binary search.

use std::fmt;

use crate::input::{KeyEvent, KeyEventKind};

/// First index used by functional keys. Printable code points live below.
pub const FUNCTIONAL_KEYS_START: u16 = 1 << 14;

/// Number of `u32` words needed to hold one bit per 16-bit key index.
const WORDS: usize = (1 << 16) >> 5;

// ─── KeyCode ────────────────────────────────────────────────────────────────

macro_rules! key_codes {
    ($first:ident => $first_name:literal, $($variant:ident => $name:literal),+ $(,)?) => {
        /// A functional (non-printable) key.
        ///
        /// Discriminants are dense, starting at [`FUNCTIONAL_KEYS_START`],
        /// so `code as u16` is directly a bit index.
        #[repr(u16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum KeyCode {
            $first = FUNCTIONAL_KEYS_START,
            $($variant),+
        }

        impl KeyCode {
            /// Every functional key, in index order.
            pub const ALL: &'static [Self] = &[Self::$first, $(Self::$variant),+];

            /// Human-readable name, used in logs.
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    Self::$first => $first_name,
                    $(Self::$variant => $name),+
                }
            }
        }
    };
}

key_codes! {
    Escape => "Escape", Enter => "Enter", Tab => "Tab", Backspace => "Backspace",
    Insert => "Insert", Delete => "Delete",
    Left => "Left", Right => "Right", Up => "Up", Down => "Down",
    PageUp => "PageUp", PageDown => "PageDown", Home => "Home", End => "End",
    CapsLock => "CapsLock", ScrollLock => "ScrollLock", NumLock => "NumLock",
    PrintScreen => "PrintScreen", Pause => "Pause", Menu => "Menu",
    F1 => "F1", F2 => "F2", F3 => "F3", F4 => "F4", F5 => "F5", F6 => "F6", F7 => "F7",
    F8 => "F8", F9 => "F9", F10 => "F10", F11 => "F11", F12 => "F12", F13 => "F13",
    F14 => "F14", F15 => "F15", F16 => "F16", F17 => "F17", F18 => "F18", F19 => "F19",
    F20 => "F20", F21 => "F21", F22 => "F22", F23 => "F23", F24 => "F24", F25 => "F25",
    F26 => "F26", F27 => "F27", F28 => "F28", F29 => "F29", F30 => "F30", F31 => "F31",
    F32 => "F32", F33 => "F33", F34 => "F34", F35 => "F35",
    Kp0 => "Kp0", Kp1 => "Kp1", Kp2 => "Kp2", Kp3 => "Kp3", Kp4 => "Kp4",
    Kp5 => "Kp5", Kp6 => "Kp6", Kp7 => "Kp7", Kp8 => "Kp8", Kp9 => "Kp9",
    KpDecimal => "KpDecimal", KpDivide => "KpDivide", KpMultiply => "KpMultiply",
    KpSubtract => "KpSubtract", KpAdd => "KpAdd", KpEnter => "KpEnter",
    KpEqual => "KpEqual", KpSeparator => "KpSeparator",
    KpLeft => "KpLeft", KpRight => "KpRight", KpUp => "KpUp", KpDown => "KpDown",
    KpPageUp => "KpPageUp", KpPageDown => "KpPageDown", KpHome => "KpHome",
    KpEnd => "KpEnd", KpInsert => "KpInsert", KpDelete => "KpDelete",
    KpBegin => "KpBegin",
    MediaPlay => "MediaPlay", MediaPause => "MediaPause",
    MediaPlayPause => "MediaPlayPause", MediaReverse => "MediaReverse",
    MediaStop => "MediaStop", MediaFastForward => "MediaFastForward",
    MediaRewind => "MediaRewind", MediaTrackNext => "MediaTrackNext",
    MediaTrackPrevious => "MediaTrackPrevious", MediaRecord => "MediaRecord",
    LowerVolume => "LowerVolume", RaiseVolume => "RaiseVolume", MuteVolume => "MuteVolume",
    LeftShift => "LeftShift", LeftControl => "LeftControl", LeftAlt => "LeftAlt",
    LeftSuper => "LeftSuper", LeftHyper => "LeftHyper", LeftMeta => "LeftMeta",
    RightShift => "RightShift", RightControl => "RightControl", RightAlt => "RightAlt",
    RightSuper => "RightSuper", RightHyper => "RightHyper", RightMeta => "RightMeta",
    IsoLevel3Shift => "IsoLevel3Shift", IsoLevel5Shift => "IsoLevel5Shift",
}

impl KeyCode {
    /// The functional key at bit index `index`, if any.
    #[must_use]
    pub fn from_index(index: u16) -> Option<Self> {
        let offset = index.checked_sub(FUNCTIONAL_KEYS_START)?;
        Self::ALL.get(usize::from(offset)).copied()
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Key ────────────────────────────────────────────────────────────────────

/// Bit index of a key: a printable code point or a [`KeyCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(u16);

impl Key {
    /// A printable key, by the code point the terminal reports for it
    /// (the unshifted, lower-case form for letters).
    ///
    /// Returns `None` for code points that collide with the functional range.
    #[must_use]
    pub fn from_char(c: char) -> Option<Self> {
        Self::from_code_point(u32::from(c))
    }

    /// A printable key from a raw protocol number.
    #[must_use]
    pub fn from_code_point(cp: u32) -> Option<Self> {
        u16::try_from(cp)
            .ok()
            .filter(|&i| i < FUNCTIONAL_KEYS_START)
            .map(Self)
    }

    /// The raw bit index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u16 {
        self.0
    }

    /// The functional key this index names, if it is one.
    #[must_use]
    pub fn code(self) -> Option<KeyCode> {
        KeyCode::from_index(self.0)
    }

    #[inline]
    const fn word(self) -> usize {
        (self.0 >> 5) as usize
    }

    #[inline]
    const fn mask(self) -> u32 {
        1 << (self.0 & 31)
    }
}

impl From<KeyCode> for Key {
    fn from(code: KeyCode) -> Self {
        Self(code as u16)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.code() {
            return f.write_str(code.name());
        }
        match char::from_u32(u32::from(self.0)) {
            Some(c) if !c.is_control() => write!(f, "'{c}'"),
            _ => write!(f, "U+{:04X}", self.0),
        }
    }
}

// ─── Protocol Table ─────────────────────────────────────────────────────────

/// `(number, final byte) → KeyCode`, sorted by `(number, final byte)`.
#[rustfmt::skip]
const KEY_TABLE: &[(u32, u8, KeyCode)] = &[
    (1, b'A', KeyCode::Up),
    (1, b'B', KeyCode::Down),
    (1, b'C', KeyCode::Right),
    (1, b'D', KeyCode::Left),
    (1, b'E', KeyCode::KpBegin),
    (1, b'F', KeyCode::End),
    (1, b'H', KeyCode::Home),
    (1, b'P', KeyCode::F1),
    (1, b'Q', KeyCode::F2),
    (1, b'S', KeyCode::F4),
    (2, b'~', KeyCode::Insert),
    (3, b'~', KeyCode::Delete),
    (5, b'~', KeyCode::PageUp),
    (6, b'~', KeyCode::PageDown),
    (7, b'~', KeyCode::Home),
    (8, b'~', KeyCode::End),
    (9, b'u', KeyCode::Tab),
    (11, b'~', KeyCode::F1),
    (12, b'~', KeyCode::F2),
    (13, b'u', KeyCode::Enter),
    (13, b'~', KeyCode::F3),
    (14, b'~', KeyCode::F4),
    (15, b'~', KeyCode::F5),
    (17, b'~', KeyCode::F6),
    (18, b'~', KeyCode::F7),
    (19, b'~', KeyCode::F8),
    (20, b'~', KeyCode::F9),
    (21, b'~', KeyCode::F10),
    (23, b'~', KeyCode::F11),
    (24, b'~', KeyCode::F12),
    (27, b'u', KeyCode::Escape),
    (127, b'u', KeyCode::Backspace),
    (57358, b'u', KeyCode::CapsLock),
    (57359, b'u', KeyCode::ScrollLock),
    (57360, b'u', KeyCode::NumLock),
    (57361, b'u', KeyCode::PrintScreen),
    (57362, b'u', KeyCode::Pause),
    (57363, b'u', KeyCode::Menu),
    (57376, b'u', KeyCode::F13),
    (57377, b'u', KeyCode::F14),
    (57378, b'u', KeyCode::F15),
    (57379, b'u', KeyCode::F16),
    (57380, b'u', KeyCode::F17),
    (57381, b'u', KeyCode::F18),
    (57382, b'u', KeyCode::F19),
    (57383, b'u', KeyCode::F20),
    (57384, b'u', KeyCode::F21),
    (57385, b'u', KeyCode::F22),
    (57386, b'u', KeyCode::F23),
    (57387, b'u', KeyCode::F24),
    (57388, b'u', KeyCode::F25),
    (57389, b'u', KeyCode::F26),
    (57390, b'u', KeyCode::F27),
    (57391, b'u', KeyCode::F28),
    (57392, b'u', KeyCode::F29),
    (57393, b'u', KeyCode::F30),
    (57394, b'u', KeyCode::F31),
    (57395, b'u', KeyCode::F32),
    (57396, b'u', KeyCode::F33),
    (57397, b'u', KeyCode::F34),
    (57398, b'u', KeyCode::F35),
    (57399, b'u', KeyCode::Kp0),
    (57400, b'u', KeyCode::Kp1),
    (57401, b'u', KeyCode::Kp2),
    (57402, b'u', KeyCode::Kp3),
    (57403, b'u', KeyCode::Kp4),
    (57404, b'u', KeyCode::Kp5),
    (57405, b'u', KeyCode::Kp6),
    (57406, b'u', KeyCode::Kp7),
    (57407, b'u', KeyCode::Kp8),
    (57408, b'u', KeyCode::Kp9),
    (57409, b'u', KeyCode::KpDecimal),
    (57410, b'u', KeyCode::KpDivide),
    (57411, b'u', KeyCode::KpMultiply),
    (57412, b'u', KeyCode::KpSubtract),
    (57413, b'u', KeyCode::KpAdd),
    (57414, b'u', KeyCode::KpEnter),
    (57415, b'u', KeyCode::KpEqual),
    (57416, b'u', KeyCode::KpSeparator),
    (57417, b'u', KeyCode::KpLeft),
    (57418, b'u', KeyCode::KpRight),
    (57419, b'u', KeyCode::KpUp),
    (57420, b'u', KeyCode::KpDown),
    (57421, b'u', KeyCode::KpPageUp),
    (57422, b'u', KeyCode::KpPageDown),
    (57423, b'u', KeyCode::KpHome),
    (57424, b'u', KeyCode::KpEnd),
    (57425, b'u', KeyCode::KpInsert),
    (57426, b'u', KeyCode::KpDelete),
    (57427, b'~', KeyCode::KpBegin),
    (57428, b'u', KeyCode::MediaPlay),
    (57429, b'u', KeyCode::MediaPause),
    (57430, b'u', KeyCode::MediaPlayPause),
    (57431, b'u', KeyCode::MediaReverse),
    (57432, b'u', KeyCode::MediaStop),
    (57433, b'u', KeyCode::MediaFastForward),
    (57434, b'u', KeyCode::MediaRewind),
    (57435, b'u', KeyCode::MediaTrackNext),
    (57436, b'u', KeyCode::MediaTrackPrevious),
    (57437, b'u', KeyCode::MediaRecord),
    (57438, b'u', KeyCode::LowerVolume),
    (57439, b'u', KeyCode::RaiseVolume),
    (57440, b'u', KeyCode::MuteVolume),
    (57441, b'u', KeyCode::LeftShift),
    (57442, b'u', KeyCode::LeftControl),
    (57443, b'u', KeyCode::LeftAlt),
    (57444, b'u', KeyCode::LeftSuper),
    (57445, b'u', KeyCode::LeftHyper),
    (57446, b'u', KeyCode::LeftMeta),
    (57447, b'u', KeyCode::RightShift),
    (57448, b'u', KeyCode::RightControl),
    (57449, b'u', KeyCode::RightAlt),
    (57450, b'u', KeyCode::RightSuper),
    (57451, b'u', KeyCode::RightHyper),
    (57452, b'u', KeyCode::RightMeta),
    (57453, b'u', KeyCode::IsoLevel3Shift),
    (57454, b'u', KeyCode::IsoLevel5Shift),
];

/// Resolve a protocol `(number, final byte)` pair to a key.
///
/// Functional pairs come from the table. Anything else terminated by `u`
/// is a printable code point; remaining pairs are unknown.
#[must_use]
pub fn lookup(number: u32, terminator: u8) -> Option<Key> {
    if let Ok(i) = KEY_TABLE.binary_search_by(|&(n, t, _)| (n, t).cmp(&(number, terminator))) {
        return Some(KEY_TABLE[i].2.into());
    }
    if terminator == b'u' {
        return Key::from_code_point(number);
    }
    None
}

// ─── KeyState ───────────────────────────────────────────────────────────────

/// Which keys are down now, and which were down at the previous frame.
///
/// `previous` is only ever replaced wholesale by [`begin_frame`](Self::begin_frame),
/// so edge queries (`just_pressed`, `just_released`) need no bookkeeping.
#[derive(Clone)]
pub struct KeyState {
    current: [u32; WORDS],
    previous: [u32; WORDS],
}

impl KeyState {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            current: [0; WORDS],
            previous: [0; WORDS],
        }
    }

    /// Snapshot current into previous. Call before parsing a frame's input.
    pub const fn begin_frame(&mut self) {
        self.previous = self.current;
    }

    #[must_use]
    pub fn is_down(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        self.current[key.word()] & key.mask() != 0
    }

    #[must_use]
    pub fn was_down(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        self.previous[key.word()] & key.mask() != 0
    }

    /// Down now, up at the start of the previous frame.
    #[must_use]
    pub fn just_pressed(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        self.is_down(key) && !self.was_down(key)
    }

    #[must_use]
    pub fn just_released(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        !self.is_down(key) && self.was_down(key)
    }

    pub fn press(&mut self, key: impl Into<Key>) {
        let key = key.into();
        self.current[key.word()] |= key.mask();
    }

    pub fn release(&mut self, key: impl Into<Key>) {
        let key = key.into();
        self.current[key.word()] &= !key.mask();
    }

    /// Press sets, release clears, repeat leaves the bit alone.
    pub fn apply(&mut self, event: &KeyEvent) {
        match event.kind {
            KeyEventKind::Press => self.press(event.key),
            KeyEventKind::Release => self.release(event.key),
            KeyEventKind::Repeat => {}
        }
    }

    /// Every key currently down, in index order.
    #[allow(clippy::cast_possible_truncation)] // w < WORDS = 2048
    pub fn iter_down(&self) -> impl Iterator<Item = Key> + '_ {
        self.current
            .iter()
            .enumerate()
            .filter(|&(_, &word)| word != 0)
            .flat_map(|(w, &word)| {
                (0..32u16)
                    .filter(move |bit| word & (1 << bit) != 0)
                    .map(move |bit| Key(((w as u16) << 5) | bit))
            })
    }

    /// Release everything (e.g. after focus loss, when releases go missing).
    pub fn clear(&mut self) {
        self.current = [0; WORDS];
    }
}

impl Default for KeyState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter_down().map(|k| k.to_string())).finish()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

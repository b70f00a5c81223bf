// SPDX-License-Identifier: MIT
//
// ANSI escape sequence generation.
//
// Pure functions that write escape sequences to any `impl Write`. No state,
// no decisions about when to emit. This module just knows the byte-level
// encoding of every terminal command the driver needs: cursor and screen
// control, DEC private mode toggles for mouse reporting, the Kitty keyboard
// protocol stack, and the Kitty graphics protocol commands used to show a
// shared-memory framebuffer.
//
// Teardown runs inside a signal handler, where formatting (and therefore
// allocation) is off the table. The sequences it needs are also provided
// as pre-built byte constants; tests check the constants agree with the
// formatting functions.

use std::io::{self, Write};

// ─── Cursor ──────────────────────────────────────────────────────────────────

/// Move the cursor to the top-left cell (CUP with no parameters).
#[inline]
pub fn cursor_home(w: &mut impl Write) -> io::Result<()> {
    w.write_all(CURSOR_HOME)
}

/// Hide the cursor (DECTCEM reset).
#[inline]
pub fn cursor_hide(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?25l")
}

/// Show the cursor (DECTCEM set).
#[inline]
pub fn cursor_show(w: &mut impl Write) -> io::Result<()> {
    w.write_all(CURSOR_SHOW)
}

// ─── Screen ──────────────────────────────────────────────────────────────────

/// Clear the entire screen (ED 2).
#[inline]
pub fn clear_screen(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[2J")
}

// ─── DEC Private Modes ──────────────────────────────────────────────────────

/// Set or reset a DEC private mode: `CSI ? mode h` / `CSI ? mode l`.
#[inline]
pub fn set_mode(w: &mut impl Write, mode: u16, enabled: bool) -> io::Result<()> {
    write!(w, "\x1b[?{mode}{}", if enabled { 'h' } else { 'l' })
}

/// Mouse reporting modes enabled for the session, in enable order:
///
/// - `1000` button press / release
/// - `1002` drag motion
/// - `1003` all motion
/// - `1004` focus in / out
/// - `1006` SGR extended coordinates
/// - `1016` SGR-pixel coordinates
pub const MOUSE_MODES: [u16; 6] = [1000, 1002, 1003, 1004, 1006, 1016];

/// Enable every mode in [`MOUSE_MODES`].
pub fn enable_mouse(w: &mut impl Write) -> io::Result<()> {
    for mode in MOUSE_MODES {
        set_mode(w, mode, true)?;
    }
    Ok(())
}

// ─── Kitty Keyboard Protocol ────────────────────────────────────────────────

/// Push Kitty keyboard progressive-enhancement flags.
///
/// Flags (bitfield, combine with `|`):
/// - `1`: disambiguate escape codes.
/// - `2`: report event types (press / repeat / release).
/// - `4`: report alternate keys.
/// - `8`: report all keys as escape codes.
/// - `16`: report associated text.
///
/// Key-state tracking needs at least `2 | 8`; the default is all five.
#[inline]
pub fn enable_kitty_keyboard(w: &mut impl Write, flags: u8) -> io::Result<()> {
    write!(w, "\x1b[>{flags}u")
}

// ─── Kitty Graphics Protocol ────────────────────────────────────────────────

/// Delete every image placed by this client (`a=d,d=A`).
#[inline]
pub fn graphics_delete_all(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b_Ga=d,d=A;\x1b\\")
}

/// Transmit-and-display an image held in a POSIX shared-memory object.
///
/// Keys, in order: 32-bit RGBA (`f=32`), no pixel offset (`X=0,Y=0`),
/// don't move the cursor (`C=1`), shared-memory transmission (`t=s`),
/// transmit + display (`a=T`), image id `i`, drawn below text (`z=-1`),
/// pixel width `s` and height `v`. The payload is the base64-encoded
/// object name.
pub fn graphics_show_shm(
    w: &mut impl Write,
    id: u32,
    width: u32,
    height: u32,
    encoded_name: &str,
) -> io::Result<()> {
    write!(
        w,
        "\x1b_Gf=32,X=0,Y=0,C=1,t=s,a=T,i={id},z=-1,s={width},v={height};{encoded_name}\x1b\\"
    )
}

// ─── Pre-built Sequences ────────────────────────────────────────────────────

/// `CSI H`
pub const CURSOR_HOME: &[u8] = b"\x1b[H";

/// `CSI ? 25 h`
pub const CURSOR_SHOW: &[u8] = b"\x1b[?25h";

/// Home, clear, home: leaves an empty screen with the cursor top-left.
pub const HOME_AND_CLEAR: &[u8] = b"\x1b[H\x1b[2J\x1b[H";

/// Reset of every mode in [`MOUSE_MODES`], same order.
#[rustfmt::skip]
pub const DISABLE_MOUSE: &[u8] = b"\
    \x1b[?1000l\
    \x1b[?1002l\
    \x1b[?1003l\
    \x1b[?1004l\
    \x1b[?1006l\
    \x1b[?1016l";

/// `CSI < u`
pub const DISABLE_KITTY_KEYBOARD: &[u8] = b"\x1b[<u";

// ─── Tests ───────────────────────────────────────────────────────────────────

// SPDX-License-Identifier: MIT
#![allow(unsafe_code)]
//
// Byte sources for the input parser.
//
// The frame loop never blocks on input. Once raw mode is entered, fd 0 is
// `O_NONBLOCK`, so a single-byte `read()` either returns a byte or fails
// with `EAGAIN`, and "no byte right now" is exactly the signal that ends
// a drain cycle. Parsing pulls one byte at a time because a few protocol
// fields (mouse coordinates, graphics ids) are read greedily from inside
// a state.
//
// Tests feed the parser from a byte slice instead.

use std::collections::VecDeque;
use std::io;

/// Somewhere the parser can pull bytes from without blocking.
pub trait ByteSource {
    /// The next byte, or `None` if nothing is available right now
    /// (would block, EOF, or a read error).
    fn read_byte(&mut self) -> Option<u8>;
}

/// Standard input, read one byte per call.
///
/// Only non-blocking after [`enter_raw_mode`](crate::terminal::enter_raw_mode)
/// has set `O_NONBLOCK`; before that a read waits for the user.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinSource;

impl ByteSource for StdinSource {
    fn read_byte(&mut self) -> Option<u8> {
        let mut byte = 0u8;
        loop {
            let n = unsafe { libc::read(libc::STDIN_FILENO, (&raw mut byte).cast(), 1) };
            if n == 1 {
                return Some(byte);
            }
            // A signal landing mid-read isn't the end of the input.
            if n < 0 && io::Error::last_os_error().kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return None;
        }
    }
}

impl ByteSource for &[u8] {
    fn read_byte(&mut self) -> Option<u8> {
        let (&first, rest) = self.split_first()?;
        *self = rest;
        Some(first)
    }
}

impl ByteSource for VecDeque<u8> {
    fn read_byte(&mut self) -> Option<u8> {
        self.pop_front()
    }
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn read_byte(&mut self) -> Option<u8> {
        (**self).read_byte()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_yields_bytes_then_none() {
        let mut src: &[u8] = b"ab";
        assert_eq!(src.read_byte(), Some(b'a'));
        assert_eq!(src.read_byte(), Some(b'b'));
        assert_eq!(src.read_byte(), None);
        assert_eq!(src.read_byte(), None);
    }

    #[test]
    fn deque_can_be_refilled_between_drains() {
        let mut src = VecDeque::from(b"x".to_vec());
        assert_eq!(src.read_byte(), Some(b'x'));
        assert_eq!(src.read_byte(), None);
        src.extend(b"yz");
        assert_eq!(src.read_byte(), Some(b'y'));
    }

    #[test]
    fn mutable_reference_forwards() {
        let mut inner: &[u8] = b"q";
        let outer = &mut inner;
        assert_eq!(outer.read_byte(), Some(b'q'));
        assert!(inner.is_empty());
    }
}

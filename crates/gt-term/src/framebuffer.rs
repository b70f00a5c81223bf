// SPDX-License-Identifier: MIT
#![allow(unsafe_code)]
//
// Shared-memory framebuffer with acknowledgement-based flow control.
//
// Each generation is a fresh POSIX shared-memory object, mapped into our
// address space for the caller to paint, then handed to the terminal with
// a Kitty graphics `t=s` command that names it. The terminal maps the
// object, uploads the pixels, and answers `ESC _ G i=<id> ; OK ESC \`.
//
// Flow control is a two-counter handshake:
//
//   last_sent   id of the newest generation we allocated
//   last_valid  id the terminal has acknowledged (0 = nothing yet)
//
// While they differ a frame is in flight, and `request` declines to
// allocate another. Both start at 1 so the first request goes through.
// A terminal that never answers stalls the pipeline; there is no timeout.
//
// `ShmImage` owns the three OS resources (fd, mapping, name) and releases
// all of them on drop, including when creation fails halfway.

use std::ffi::CString;
use std::io::{self, Write};
use std::ptr::NonNull;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, trace};

use crate::ansi;
use crate::error::{Error, Result, ShmOp};
use crate::options::DEFAULT_SHM_PREFIX;
use crate::terminal::PixelSize;

/// Bytes per pixel (`f=32`: RGBA, 8 bits each).
pub const BYTES_PER_PIXEL: usize = 4;

// ─── ShmImage ───────────────────────────────────────────────────────────────

/// One mapped shared-memory object of `len` pixels.
#[derive(Debug)]
pub struct ShmImage {
    name: String,
    cname: CString,
    fd: libc::c_int,
    map: Option<NonNull<u32>>,
    len: usize,
}

impl ShmImage {
    /// Create, size and map `/name` with room for `len` 32-bit pixels.
    ///
    /// # Errors
    ///
    /// [`Error::Shm`] naming the step that failed. Anything created before
    /// the failure is released.
    pub fn create(name: String, len: usize) -> Result<Self> {
        let Ok(cname) = CString::new(name.as_bytes()) else {
            return Err(Error::Shm {
                op: ShmOp::Open,
                name,
                source: io::ErrorKind::InvalidInput.into(),
            });
        };

        let fd = unsafe {
            libc::shm_open(
                cname.as_ptr(),
                libc::O_CREAT | libc::O_RDWR,
                0o600 as libc::mode_t,
            )
        };
        if fd < 0 {
            return Err(Error::shm(ShmOp::Open, &name));
        }

        let mut image = Self {
            name,
            cname,
            fd,
            map: None,
            len,
        };

        let bytes = len.saturating_mul(BYTES_PER_PIXEL);
        let Ok(size) = libc::off_t::try_from(bytes) else {
            return Err(Error::Shm {
                op: ShmOp::Resize,
                name: image.name.clone(),
                source: io::ErrorKind::InvalidInput.into(),
            });
        };
        if unsafe { libc::ftruncate(fd, size) } != 0 {
            return Err(Error::shm(ShmOp::Resize, &image.name));
        }

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                bytes,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(Error::shm(ShmOp::Map, &image.name));
        }
        image.map = NonNull::new(ptr.cast());

        Ok(image)
    }

    /// Object name, including the leading `/`.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of pixels.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The mapped pixels.
    #[must_use]
    pub fn pixels_mut(&mut self) -> &mut [u32] {
        match self.map {
            // The mapping is `len * 4` bytes, page-aligned, and exclusively
            // ours until drop.
            Some(ptr) => unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), self.len) },
            None => &mut [],
        }
    }
}

impl Drop for ShmImage {
    fn drop(&mut self) {
        unsafe {
            if let Some(ptr) = self.map.take() {
                libc::munmap(ptr.as_ptr().cast(), self.len * BYTES_PER_PIXEL);
            }
            libc::close(self.fd);
            // The terminal usually unlinks the object itself after reading
            // it, so ENOENT here is normal.
            libc::shm_unlink(self.cname.as_ptr());
        }
        trace!(name = %self.name, "released shm");
    }
}

// ─── Framebuffer ────────────────────────────────────────────────────────────

/// Rotating shared-memory framebuffer.
#[derive(Debug)]
pub struct Framebuffer {
    image: Option<ShmImage>,
    counter: u32,
    last_sent: u32,
    last_valid: u32,
    pending: bool,
    size: PixelSize,
    prefix: String,
}

impl Framebuffer {
    /// Objects will be named `{prefix}{id}`. The prefix should start with
    /// `/` and contain no other slash.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            image: None,
            counter: 1,
            last_sent: 1,
            last_valid: 1,
            pending: false,
            size: PixelSize::default(),
            prefix: prefix.into(),
        }
    }

    /// Allocate the next generation at `size`, unless one is still
    /// awaiting acknowledgement.
    ///
    /// Returns `Ok(true)` when a new buffer is ready for painting and
    /// `Ok(false)` under backpressure (nothing changes).
    ///
    /// # Errors
    ///
    /// [`Error::NoPixelSize`] for an empty `size` (nothing is allocated and
    /// no id is consumed). [`Error::Shm`] if the OS refuses; the id is
    /// consumed but the window re-opens so the next call retries.
    pub fn request(&mut self, size: PixelSize) -> Result<bool> {
        if self.is_outstanding() {
            return Ok(false);
        }
        if size.is_empty() {
            return Err(Error::NoPixelSize);
        }

        self.image = None;

        let id = self.counter;
        self.counter = self.counter.wrapping_add(1).max(1);
        self.last_sent = id;
        self.last_valid = 0;

        let name = format!("{}{id}", self.prefix);
        match ShmImage::create(name, size.area()) {
            Ok(image) => {
                debug!(
                    id,
                    name = image.name(),
                    width = size.width,
                    height = size.height,
                    "allocated framebuffer"
                );
                self.image = Some(image);
                self.size = size;
                self.pending = true;
                Ok(true)
            }
            Err(err) => {
                self.last_valid = self.last_sent;
                self.size = PixelSize::default();
                Err(err)
            }
        }
    }

    /// Tell the terminal to display the pending buffer. Does nothing (and
    /// returns `Ok(false)`) when nothing is pending.
    ///
    /// # Errors
    ///
    /// Propagates write/flush failures. The buffer stays pending.
    pub fn publish(&mut self, w: &mut impl Write) -> io::Result<bool> {
        if !self.pending {
            return Ok(false);
        }
        let Some(image) = self.image.as_ref() else {
            self.pending = false;
            return Ok(false);
        };

        let encoded = STANDARD.encode(image.name());
        ansi::cursor_home(w)?;
        ansi::graphics_delete_all(w)?;
        ansi::graphics_show_shm(w, self.last_sent, self.size.width, self.size.height, &encoded)?;
        w.flush()?;

        trace!(id = self.last_sent, "published framebuffer");
        self.pending = false;
        Ok(true)
    }

    /// Record the terminal's answer for generation `id`.
    pub fn acknowledge(&mut self, id: u32) {
        if id != self.last_sent {
            debug!(id, last_sent = self.last_sent, "stale acknowledgement");
        }
        self.last_valid = id;
    }

    /// Abandon a generation that was allocated but never published. The
    /// terminal will never acknowledge it, so the window re-opens.
    pub fn clear_pending(&mut self) {
        if self.pending {
            debug!(id = self.last_sent, "abandoned unpublished framebuffer");
            self.pending = false;
            self.last_valid = self.last_sent;
        }
    }

    /// The buffer allocated this frame, if any. `width * height` pixels,
    /// row-major, each `u32` holding RGBA bytes in memory order.
    #[must_use]
    pub fn pixels_mut(&mut self) -> Option<&mut [u32]> {
        if !self.pending {
            return None;
        }
        self.image.as_mut().map(ShmImage::pixels_mut)
    }

    #[inline]
    #[must_use]
    pub const fn last_sent(&self) -> u32 {
        self.last_sent
    }

    #[inline]
    #[must_use]
    pub const fn last_valid(&self) -> u32 {
        self.last_valid
    }

    /// A generation was allocated this frame and not yet published.
    #[inline]
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending
    }

    /// A generation is waiting for the terminal's acknowledgement.
    #[inline]
    #[must_use]
    pub const fn is_outstanding(&self) -> bool {
        self.last_sent != self.last_valid
    }

    #[inline]
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.size.width
    }

    #[inline]
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.size.height
    }

    /// Name of the live shared-memory object, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.image.as_ref().map(ShmImage::name)
    }
}

impl Default for Framebuffer {
    fn default() -> Self {
        Self::new(DEFAULT_SHM_PREFIX)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// A prefix no other test (or concurrent test run) will use.
    fn prefix(tag: &str) -> String {
        format!("/gt-test-{}-{tag}-", std::process::id())
    }

    const SMALL: PixelSize = PixelSize {
        width: 4,
        height: 2,
    };

    fn shm_exists(name: &str) -> bool {
        let cname = CString::new(name).unwrap();
        let fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_RDONLY, 0) };
        if fd >= 0 {
            unsafe { libc::close(fd) };
        }
        fd >= 0
    }

    #[test]
    fn first_request_allocates() {
        let mut fb = Framebuffer::new(prefix("first"));
        assert!(!fb.is_outstanding());
        assert!(fb.request(SMALL).unwrap());
        assert!(fb.is_pending());
        assert!(fb.is_outstanding());
        assert_eq!(fb.last_sent(), 1);
        assert_eq!(fb.last_valid(), 0);
        assert_eq!((fb.width(), fb.height()), (4, 2));
        assert_eq!(fb.pixels_mut().map(|p| p.len()), Some(8));
    }

    #[test]
    fn second_request_without_ack_is_a_no_op() {
        let mut fb = Framebuffer::new(prefix("backpressure"));
        assert!(fb.request(SMALL).unwrap());
        let name = fb.name().map(str::to_owned);
        assert!(!fb.request(PixelSize::new(8, 8)).unwrap());
        assert_eq!(fb.last_sent(), 1);
        assert_eq!(fb.name().map(str::to_owned), name);
        assert_eq!(fb.width(), 4);
    }

    #[test]
    fn acknowledgement_unblocks_next_generation() {
        let mut fb = Framebuffer::new(prefix("ack"));
        assert!(fb.request(SMALL).unwrap());
        fb.acknowledge(1);
        assert!(!fb.is_outstanding());
        assert!(fb.request(SMALL).unwrap());
        assert_eq!(fb.last_sent(), 2);
        assert_eq!(fb.name(), Some(format!("{}2", prefix("ack")).as_str()));
    }

    #[test]
    fn stale_acknowledgement_keeps_waiting() {
        let mut fb = Framebuffer::new(prefix("stale"));
        assert!(fb.request(SMALL).unwrap());
        fb.acknowledge(1);
        assert!(fb.request(SMALL).unwrap());
        fb.acknowledge(1);
        assert!(fb.is_outstanding());
        assert!(!fb.request(SMALL).unwrap());
    }

    #[test]
    fn publish_writes_exact_commands() {
        let mut fb = Framebuffer::new(prefix("publish"));
        assert!(fb.request(SMALL).unwrap());
        let encoded = STANDARD.encode(format!("{}1", prefix("publish")));

        let mut out = Vec::new();
        assert!(fb.publish(&mut out).unwrap());
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!(
                "\x1b[H\x1b_Ga=d,d=A;\x1b\\\x1b_Gf=32,X=0,Y=0,C=1,t=s,a=T,i=1,z=-1,s=4,v=2;{encoded}\x1b\\"
            )
        );
        assert!(!fb.is_pending());
    }

    #[test]
    fn publish_without_pending_writes_nothing() {
        let mut fb = Framebuffer::new(prefix("idle"));
        let mut out = Vec::new();
        assert!(!fb.publish(&mut out).unwrap());
        assert!(out.is_empty());

        assert!(fb.request(SMALL).unwrap());
        fb.clear_pending();
        assert!(!fb.publish(&mut out).unwrap());
        assert!(out.is_empty());
        assert!(fb.pixels_mut().is_none());
        assert!(!fb.is_outstanding());
    }

    #[test]
    fn zero_size_is_an_error_and_consumes_nothing() {
        let mut fb = Framebuffer::new(prefix("zero"));
        assert!(matches!(fb.request(PixelSize::new(0, 480)), Err(Error::NoPixelSize)));
        assert!(!fb.is_outstanding());
        assert!(fb.request(SMALL).unwrap());
        assert_eq!(fb.last_sent(), 1);
    }

    #[test]
    fn shm_failure_reopens_the_window() {
        let mut fb = Framebuffer::new("/gt-test/nested/");
        let err = fb.request(SMALL).unwrap_err();
        assert!(matches!(err, Error::Shm { op: ShmOp::Open, .. }), "{err}");
        assert!(!fb.is_outstanding());
        assert!(!fb.is_pending());
        assert_eq!(fb.last_sent(), 1);
    }

    #[test]
    fn pixels_are_shared_with_the_object() {
        let mut fb = Framebuffer::new(prefix("pixels"));
        assert!(fb.request(SMALL).unwrap());
        let pixels = fb.pixels_mut().unwrap();
        pixels.fill(0xFF00_00FF);
        pixels[7] = 0x1234_5678;
        assert_eq!(fb.pixels_mut().unwrap()[7], 0x1234_5678);
        assert_eq!(fb.pixels_mut().unwrap()[0], 0xFF00_00FF);
    }

    #[test]
    fn old_generation_is_unlinked() {
        let mut fb = Framebuffer::new(prefix("unlink"));
        assert!(fb.request(SMALL).unwrap());
        let first = fb.name().unwrap().to_owned();
        assert!(shm_exists(&first));

        fb.acknowledge(1);
        assert!(fb.request(SMALL).unwrap());
        assert!(!shm_exists(&first));

        let second = fb.name().unwrap().to_owned();
        drop(fb);
        assert!(!shm_exists(&second));
    }
}

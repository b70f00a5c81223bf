// SPDX-License-Identifier: MIT
//
// Terminal mode control: raw mode, protocol enables, and restore.
//
// Safety: This module necessarily uses `unsafe` for termios (tcgetattr,
// tcsetattr), fcntl, ioctl (TIOCGWINSZ), isatty, sigaction and raw fd
// reads/writes. These are the POSIX interfaces for terminal control and
// there is no safe alternative. Each unsafe block is minimal.
#![allow(unsafe_code)]
//
// Entering puts fd 0 into raw, non-canonical, *non-blocking* mode (VMIN=0,
// VTIME=0, O_NONBLOCK), then turns on SGR-pixel mouse reporting and pushes
// Kitty keyboard enhancement flags. Leaving undoes all of it.
//
// Leaving has to work from three places: normal drop, the panic hook, and
// a signal handler. The signal handler is the strict one, so the whole
// restore path sticks to async-signal-safe operations: atomics, a
// `OnceLock` read, `read`/`write`/`tcsetattr`/`fcntl` on raw fds, and the
// pre-built byte constants from `ansi`. No allocation, no locks, no
// `io::stdout()`. An atomic swap on the "raw active" flag makes it
// idempotent, so whichever path gets there first does the work.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Once, OnceLock};

use tracing::{debug, info};

use crate::ansi;
use crate::error::{Error, Result};
use crate::options::Options;

// ─── Size ───────────────────────────────────────────────────────────────────

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    /// Number of columns (width in character cells).
    pub cols: u16,
    /// Number of rows (height in character cells).
    pub rows: u16,
}

/// Terminal dimensions in pixels, as reported by the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl PixelSize {
    #[inline]
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels. Saturates rather than overflowing on absurd sizes.
    #[inline]
    #[must_use]
    pub const fn area(self) -> usize {
        (self.width as usize).saturating_mul(self.height as usize)
    }

    /// No pixels at all (the terminal doesn't report pixel geometry).
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

// ─── Terminal Queries ───────────────────────────────────────────────────────

fn window_size() -> Option<libc::winsize> {
    let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
    let result = unsafe { libc::ioctl(libc::STDIN_FILENO, libc::TIOCGWINSZ, &raw mut ws) };
    (result == 0).then_some(ws)
}

/// Current size in cells, via `ioctl(TIOCGWINSZ)` on stdin.
///
/// Returns `None` if stdin is not a terminal or the size is unknown.
#[must_use]
pub fn cell_size() -> Option<Size> {
    window_size()
        .filter(|ws| ws.ws_col > 0 && ws.ws_row > 0)
        .map(|ws| Size {
            cols: ws.ws_col,
            rows: ws.ws_row,
        })
}

/// Current size in pixels, via `ioctl(TIOCGWINSZ)` on stdin.
///
/// Many terminals leave the pixel fields at zero; that is reported as
/// `None`, not as an empty size.
#[must_use]
pub fn pixel_size() -> Option<PixelSize> {
    window_size()
        .map(|ws| PixelSize::new(u32::from(ws.ws_xpixel), u32::from(ws.ws_ypixel)))
        .filter(|px| !px.is_empty())
}

/// Check whether stdin is connected to a terminal (TTY).
#[must_use]
pub fn is_tty() -> bool {
    unsafe { libc::isatty(libc::STDIN_FILENO) != 0 }
}

// ─── Process-Wide State ─────────────────────────────────────────────────────

/// Termios as it was before the first [`enter_raw_mode`]. Set once.
static ORIGINAL_TERMIOS: OnceLock<libc::termios> = OnceLock::new();

/// `fcntl(F_GETFL)` of stdin before `O_NONBLOCK` was added.
static ORIGINAL_FLAGS: AtomicI32 = AtomicI32::new(0);

/// Raw mode is on and teardown hasn't run yet.
static RAW_ACTIVE: AtomicBool = AtomicBool::new(false);

/// We hid the cursor and haven't shown it again.
static CURSOR_HIDDEN: AtomicBool = AtomicBool::new(false);

static PANIC_HOOK_INSTALLED: Once = Once::new();
static SIGNAL_HANDLERS_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Whether raw mode is currently active.
#[must_use]
pub fn is_raw() -> bool {
    RAW_ACTIVE.load(Ordering::SeqCst)
}

// ─── Raw Mode ───────────────────────────────────────────────────────────────

/// Put the terminal into raw, non-blocking mode and enable the input
/// protocols: mouse modes 1000/1002/1003/1004/1006/1016, then the Kitty
/// keyboard flags from `options`, then clear and home.
///
/// Installs the panic hook, and the signal handlers if
/// `options.install_signal_handlers` is set. Calling again while raw is a
/// no-op.
///
/// # Errors
///
/// [`Error::NotATerminal`] if stdin is not a TTY; [`Error::Io`] if a
/// termios/fcntl call or the initial output fails. On failure the
/// terminal is left as it was.
pub fn enter_raw_mode(options: &Options) -> Result<()> {
    if !is_tty() {
        return Err(Error::NotATerminal);
    }
    if is_raw() {
        return Ok(());
    }

    install_panic_hook();
    if options.install_signal_handlers {
        install_signal_handlers()?;
    }

    let fd = libc::STDIN_FILENO;

    let mut current: libc::termios = unsafe { std::mem::zeroed() };
    if unsafe { libc::tcgetattr(fd, &raw mut current) } != 0 {
        return Err(io::Error::last_os_error().into());
    }
    let original = *ORIGINAL_TERMIOS.get_or_init(|| current);

    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error().into());
    }
    ORIGINAL_FLAGS.store(flags, Ordering::SeqCst);

    let raw = make_raw(original);
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &raw const raw) } != 0 {
        return Err(io::Error::last_os_error().into());
    }
    RAW_ACTIVE.store(true, Ordering::SeqCst);

    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } != 0 {
        let err = io::Error::last_os_error();
        exit_raw_mode();
        return Err(err.into());
    }

    if let Err(err) = write_enables(&mut io::stdout().lock(), options.keyboard_flags) {
        exit_raw_mode();
        return Err(err.into());
    }

    info!(keyboard_flags = options.keyboard_flags, "entered raw mode");
    Ok(())
}

/// cfmakeraw equivalent, plus zero-wait reads.
fn make_raw(mut termios: libc::termios) -> libc::termios {
    termios.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::PARMRK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL
        | libc::IXON);
    termios.c_oflag &= !libc::OPOST;
    termios.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);
    termios.c_cflag &= !(libc::CSIZE | libc::PARENB);
    termios.c_cflag |= libc::CS8;

    // VMIN=0, VTIME=0: read() returns immediately, with or without data.
    termios.c_cc[libc::VMIN] = 0;
    termios.c_cc[libc::VTIME] = 0;
    termios
}

fn write_enables(w: &mut impl Write, keyboard_flags: u8) -> io::Result<()> {
    ansi::enable_mouse(w)?;
    ansi::enable_kitty_keyboard(w, keyboard_flags)?;
    ansi::clear_screen(w)?;
    ansi::cursor_home(w)?;
    w.flush()
}

/// Restore the terminal to how [`enter_raw_mode`] found it.
///
/// Drains unread input, clears the screen, restores termios and fd
/// flags, disables the mouse modes, shows the cursor if we hid it, and
/// pops the keyboard enhancement. Does nothing unless raw mode is active,
/// and runs at most once per entry.
///
/// Async-signal-safe.
pub fn exit_raw_mode() {
    if !RAW_ACTIVE.swap(false, Ordering::SeqCst) {
        return;
    }

    drain_stdin();
    teardown(CURSOR_HIDDEN.swap(false, Ordering::SeqCst), |step| match step {
        Teardown::Write(bytes) => write_raw(bytes),
        Teardown::RestoreModes => restore_modes(),
    });
}

/// One step of leaving raw mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Teardown {
    Write(&'static [u8]),
    /// Put back the saved termios and fd flags.
    RestoreModes,
}

/// The teardown sequence, in order. Only static bytes, no allocation.
fn teardown(cursor_hidden: bool, mut step: impl FnMut(Teardown)) {
    step(Teardown::Write(ansi::HOME_AND_CLEAR));
    step(Teardown::RestoreModes);
    step(Teardown::Write(ansi::DISABLE_MOUSE));
    if cursor_hidden {
        step(Teardown::Write(ansi::CURSOR_SHOW));
    }
    step(Teardown::Write(ansi::DISABLE_KITTY_KEYBOARD));
}

fn restore_modes() {
    if let Some(original) = ORIGINAL_TERMIOS.get() {
        unsafe {
            libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, original);
        }
    }
    unsafe {
        libc::fcntl(
            libc::STDIN_FILENO,
            libc::F_SETFL,
            ORIGINAL_FLAGS.load(Ordering::SeqCst),
        );
    }
}

/// Discard whatever the terminal already sent. Relies on `O_NONBLOCK`
/// still being set.
fn drain_stdin() {
    let mut buf = [0u8; 256];
    loop {
        let n = unsafe { libc::read(libc::STDIN_FILENO, buf.as_mut_ptr().cast(), buf.len()) };
        if n <= 0 {
            break;
        }
    }
}

/// Write all of `bytes` to fd 1, bypassing Rust's stdout lock.
/// Best-effort: gives up on the first hard error.
fn write_raw(mut bytes: &[u8]) {
    while !bytes.is_empty() {
        let n = unsafe { libc::write(libc::STDOUT_FILENO, bytes.as_ptr().cast(), bytes.len()) };
        match usize::try_from(n) {
            Ok(0) => return,
            Ok(written) => bytes = &bytes[written.min(bytes.len())..],
            Err(_) if io::Error::last_os_error().kind() == io::ErrorKind::Interrupted => {}
            Err(_) => return,
        }
    }
}

// ─── Cursor ─────────────────────────────────────────────────────────────────

/// Hide the cursor. Teardown shows it again.
///
/// # Errors
///
/// Propagates write/flush failures.
pub fn hide_cursor(w: &mut impl Write) -> io::Result<()> {
    ansi::cursor_hide(w)?;
    w.flush()?;
    CURSOR_HIDDEN.store(true, Ordering::SeqCst);
    Ok(())
}

/// Show the cursor if it was hidden. Returns whether anything was written.
///
/// # Errors
///
/// Propagates write/flush failures.
pub fn show_cursor(w: &mut impl Write) -> io::Result<bool> {
    if !CURSOR_HIDDEN.swap(false, Ordering::SeqCst) {
        return Ok(false);
    }
    ansi::cursor_show(w)?;
    w.flush()?;
    Ok(true)
}

// ─── Signals & Panics ───────────────────────────────────────────────────────

/// Restore the terminal and exit with the conventional `128 + signo` status
/// on SIGINT, SIGTERM, SIGHUP and SIGQUIT.
///
/// Installed at most once per process.
///
/// # Errors
///
/// Fails if `sigaction` rejects a handler.
pub fn install_signal_handlers() -> io::Result<()> {
    if SIGNAL_HANDLERS_INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }
    for signal in [libc::SIGINT, libc::SIGTERM, libc::SIGHUP, libc::SIGQUIT] {
        unsafe {
            let mut sa: libc::sigaction = std::mem::zeroed();
            sa.sa_sigaction = on_signal as *const () as usize;
            libc::sigemptyset(&raw mut sa.sa_mask);
            if libc::sigaction(signal, &raw const sa, std::ptr::null_mut()) != 0 {
                return Err(io::Error::last_os_error());
            }
        }
    }
    debug!("signal handlers installed");
    Ok(())
}

extern "C" fn on_signal(signal: libc::c_int) {
    exit_raw_mode();
    unsafe { libc::_exit(128 + signal) }
}

/// Restore the terminal before the previous hook prints the panic, so
/// the message lands on a working terminal.
fn install_panic_hook() {
    PANIC_HOOK_INSTALLED.call_once(|| {
        let original = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            exit_raw_mode();
            original(info);
        }));
    });
}

// ─── Terminal ───────────────────────────────────────────────────────────────

/// Terminal handle with RAII cleanup.
///
/// [`enter`](Self::enter) switches to raw mode; the terminal is restored
/// when the handle is dropped, on panic, or on a fatal signal.
///
/// # Example
///
/// ```no_run
/// use gt_term::options::Options;
/// use gt_term::terminal::Terminal;
///
/// let mut term = Terminal::new();
/// term.enter(&Options::default())?;
/// // ... frames ...
/// // Terminal is restored automatically on drop.
/// # Ok::<(), gt_term::error::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct Terminal {
    active: bool,
}

impl Terminal {
    /// A handle that hasn't touched the terminal yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { active: false }
    }

    /// Whether this handle entered raw mode and hasn't left.
    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Enter raw mode. Idempotent.
    ///
    /// # Errors
    ///
    /// See [`enter_raw_mode`].
    pub fn enter(&mut self, options: &Options) -> Result<()> {
        if self.active {
            return Ok(());
        }
        enter_raw_mode(options)?;
        self.active = true;
        Ok(())
    }

    /// Restore the terminal. Idempotent.
    pub fn leave(&mut self) {
        if !self.active {
            return;
        }
        exit_raw_mode();
        self.active = false;
        info!("left raw mode");
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        self.leave();
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

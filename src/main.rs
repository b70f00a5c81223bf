// SPDX-License-Identifier: MIT
//
// gterm: an interactive bitmap demo for terminals that speak the Kitty
// graphics and keyboard protocols.
//
// Everything you see is pixels in a shared-memory framebuffer; there is
// no text rendering at all.
//
//   arrows / WASD   move the square (hold to keep moving)
//   left mouse      paint
//   right mouse     erase
//   c               clear the canvas
//   Escape / q      quit
//
// Diagnostics go to graphical-term.log (see gt_term::options for the
// GTERM_* variables).

use anyhow::Context;
use tracing::info;

use gt_term::frame_loop::{self, Action, App, Frame};
use gt_term::keys::{Key, KeyCode, KeyState};
use gt_term::logging;
use gt_term::options::Options;
use gt_term::session::{MouseState, Session};
use gt_term::terminal::PixelSize;

/// Side of the movable square, in pixels.
const SPRITE: u32 = 48;

/// Pixels per frame the square moves while a direction is held.
const SPEED: i64 = 6;

/// Radius of the paint brush, in pixels.
const BRUSH: i64 = 6;

const PAINT: u32 = rgba(0xF5, 0xC2, 0x42, 0xFF);
const SPRITE_COLOR: u32 = rgba(0xE8, 0x4A, 0x5F, 0xFF);

/// A pixel in the byte order `f=32` expects (R, G, B, A in memory).
const fn rgba(r: u8, g: u8, b: u8, a: u8) -> u32 {
    u32::from_le_bytes([r, g, b, a])
}

// ─── Demo ───────────────────────────────────────────────────────────────────

/// Sprite position and the painted layer, independent of any one
/// framebuffer generation.
struct Demo {
    size: PixelSize,
    x: i64,
    y: i64,
    /// Paint layer, `size.width * size.height`; 0 means unpainted.
    canvas: Vec<u32>,
    /// Last brush position while a button is held, for stroke joining.
    last_brush: Option<(i64, i64)>,
}

impl Demo {
    const fn new() -> Self {
        Self {
            size: PixelSize {
                width: 0,
                height: 0,
            },
            x: 0,
            y: 0,
            canvas: Vec::new(),
            last_brush: None,
        }
    }

    fn resize(&mut self, size: PixelSize) {
        if size == self.size {
            return;
        }
        info!(width = size.width, height = size.height, "canvas resized");
        self.size = size;
        self.canvas = vec![0; size.area()];
        self.x = self.x.clamp(0, self.max_x());
        self.y = self.y.clamp(0, self.max_y());
    }

    fn max_x(&self) -> i64 {
        i64::from(self.size.width.saturating_sub(SPRITE))
    }

    fn max_y(&self) -> i64 {
        i64::from(self.size.height.saturating_sub(SPRITE))
    }

    /// Advance one frame of input. Returns whether to keep going.
    fn step(&mut self, keys: &KeyState, mouse: &MouseState) -> Action {
        if keys.is_down(KeyCode::Escape) || held(keys, 'q') {
            return Action::Quit;
        }

        let dx = i64::from(keys.is_down(KeyCode::Right) || held(keys, 'd'))
            - i64::from(keys.is_down(KeyCode::Left) || held(keys, 'a'));
        let dy = i64::from(keys.is_down(KeyCode::Down) || held(keys, 's'))
            - i64::from(keys.is_down(KeyCode::Up) || held(keys, 'w'));
        self.x = (self.x + dx * SPEED).clamp(0, self.max_x());
        self.y = (self.y + dy * SPEED).clamp(0, self.max_y());

        if Key::from_char('c').is_some_and(|c| keys.just_pressed(c)) {
            self.canvas.fill(0);
        }

        let here = (i64::from(mouse.x), i64::from(mouse.y));
        let ink = if mouse.is_down(0) {
            Some(PAINT)
        } else if mouse.is_down(2) {
            Some(0)
        } else {
            None
        };
        match ink {
            Some(color) => {
                let from = self.last_brush.unwrap_or(here);
                self.stroke(from, here, color);
                self.last_brush = Some(here);
            }
            None => self.last_brush = None,
        }

        Action::Continue
    }

    /// Stamp the brush along the segment `from`..`to`.
    fn stroke(&mut self, from: (i64, i64), to: (i64, i64), color: u32) {
        let steps = (to.0 - from.0).abs().max((to.1 - from.1).abs()).max(1);
        for i in 0..=steps {
            let cx = from.0 + (to.0 - from.0) * i / steps;
            let cy = from.1 + (to.1 - from.1) * i / steps;
            self.stamp(cx, cy, color);
        }
    }

    fn stamp(&mut self, cx: i64, cy: i64, color: u32) {
        let (w, h) = (i64::from(self.size.width), i64::from(self.size.height));
        for y in (cy - BRUSH).max(0)..(cy + BRUSH + 1).min(h) {
            for x in (cx - BRUSH).max(0)..(cx + BRUSH + 1).min(w) {
                if (x - cx).pow(2) + (y - cy).pow(2) <= BRUSH * BRUSH {
                    if let Ok(i) = usize::try_from(y * w + x) {
                        self.canvas[i] = color;
                    }
                }
            }
        }
    }

    /// Draw background, paint layer and sprite into `pixels`.
    #[allow(clippy::cast_possible_truncation)] // x * 255 / width < 256
    fn render(&self, pixels: &mut [u32]) {
        let width = self.size.width.max(1);
        let height = self.size.height.max(1);
        let sprite_x = self.x..self.x + i64::from(SPRITE);
        let sprite_y = self.y..self.y + i64::from(SPRITE);

        for (row, (out, paint)) in pixels
            .chunks_exact_mut(width as usize)
            .zip(self.canvas.chunks_exact(width as usize))
            .enumerate()
        {
            let y = row as u32;
            let g = (y * 255 / height) as u8;
            let in_sprite_row = sprite_y.contains(&i64::from(y));
            for (col, (px, &ink)) in out.iter_mut().zip(paint).enumerate() {
                let x = col as u32;
                *px = if in_sprite_row && sprite_x.contains(&i64::from(x)) {
                    SPRITE_COLOR
                } else if ink != 0 {
                    ink
                } else {
                    rgba((x * 255 / width) as u8 / 3, g / 3, 0x40, 0xFF)
                };
            }
        }
    }
}

fn held(keys: &KeyState, c: char) -> bool {
    Key::from_char(c).is_some_and(|key| keys.is_down(key))
}

impl App for Demo {
    fn frame(&mut self, frame: &mut Frame<'_>) -> Action {
        self.resize(frame.size());
        let action = self.step(frame.keys(), frame.mouse());
        if let Some(pixels) = frame.pixels() {
            self.render(pixels);
        }
        action
    }
}

// ─── Main ───────────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let options = Options::from_env();
    logging::init(&options).context("failed to start logging")?;

    let mut session = Session::start(options).context("failed to take over the terminal")?;
    session.hide_cursor()?;

    let mut demo = Demo::new();
    let result = frame_loop::run(&mut session, &mut demo);

    // Restore the terminal before anyhow prints anything.
    session.close();
    result.context("frame loop failed")?;

    info!("bye");
    Ok(())
}

// ─── Tests ──────────────────────────────────────────────────────────────────

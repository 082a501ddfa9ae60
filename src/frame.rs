//! Shared frame and geometry types
//!
//! A `Frame` is an owned RGB24 buffer as read from a frame source. The
//! detector works on `GrayBuffer` planes derived from it; sinks consume the
//! RGB data directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Smallest rectangle covering both `self` and `other`
    pub fn union(&self, other: &Rect) -> Rect {
        let x1 = self.x.min(other.x);
        let y1 = self.y.min(other.y);
        let x2 = (self.x + self.width).max(other.x + other.width);
        let y2 = (self.y + self.height).max(other.y + other.height);
        Rect::new(x1, y1, x2 - x1, y2 - y1)
    }
}

/// One captured video frame, RGB24 interleaved
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Interleaved RGB, `width * height * 3` bytes
    pub data: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), (width * height * 3) as usize);
        Self {
            width,
            height,
            data,
            captured_at: Utc::now(),
        }
    }

    /// Solid-color frame, mainly useful for tests and warm-up
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for _ in 0..width * height {
            data.extend_from_slice(&rgb);
        }
        Self::new(width, height, data)
    }

    /// Single-channel intensity plane (ITU-R BT.601 luma weights)
    pub fn to_gray(&self) -> GrayBuffer {
        let mut pixels = Vec::with_capacity((self.width * self.height) as usize);
        for px in self.data.chunks_exact(3) {
            let luma =
                0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
            pixels.push(luma as u8);
        }
        GrayBuffer {
            width: self.width,
            height: self.height,
            pixels,
        }
    }

    /// Overwrite a rectangular region with a solid color (test scenes,
    /// display annotation)
    pub fn fill_rect(&mut self, rect: Rect, rgb: [u8; 3]) {
        let x2 = (rect.x + rect.width).min(self.width);
        let y2 = (rect.y + rect.height).min(self.height);
        for y in rect.y..y2 {
            for x in rect.x..x2 {
                let i = ((y * self.width + x) * 3) as usize;
                self.data[i..i + 3].copy_from_slice(&rgb);
            }
        }
    }
}

/// Single-channel 8-bit image plane
#[derive(Debug, Clone)]
pub struct GrayBuffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl GrayBuffer {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), (width * height) as usize);
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn at(&self, x: u32, y: u32) -> u8 {
        self.pixels[(y * self.width + x) as usize]
    }
}

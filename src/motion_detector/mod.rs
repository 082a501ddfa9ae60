//! MotionDetector - Background-Model Motion Detection
//!
//! ## Responsibilities
//!
//! - Maintain one running-average background image per camera
//! - Turn a raw frame into a motion flag plus a region of interest
//! - Keep adapting the model on quiet frames
//!
//! The background model has deliberately short memory (accumulation weight
//! 0.5), favoring responsiveness over stability. The first frame seen only
//! seeds the model and never reports motion.

use crate::frame::{Frame, GrayBuffer, Rect};

/// Detector configuration
#[derive(Debug, Clone)]
pub struct MotionConfig {
    /// Minimum connected-region area (pixels) to register motion
    pub min_area: u64,
    /// Weight of the current frame when updating the background model
    pub accum_weight: f32,
    /// Binary threshold applied to the frame delta (0-255)
    pub delta_threshold: u8,
    /// Box-blur radius applied before differencing (21x21 kernel at 10)
    pub blur_radius: u32,
    /// Dilation passes applied to the thresholded mask
    pub dilate_iterations: u32,
    /// How a region of interest is chosen among qualifying regions
    pub region_policy: RegionPolicy,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            min_area: 500,
            accum_weight: 0.5,
            delta_threshold: 25,
            blur_radius: 10,
            dilate_iterations: 2,
            region_policy: RegionPolicy::First,
        }
    }
}

/// Region-of-interest selection policy
///
/// `First` returns the first qualifying region in traversal order. It is a
/// latency trade-off, not an accuracy-maximizing choice; `Largest` and
/// `Union` are available behind the same interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegionPolicy {
    #[default]
    First,
    Largest,
    Union,
}

/// Result of one detection pass. Produced per frame, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionResult {
    pub motion_detected: bool,
    pub region_of_interest: Option<Rect>,
}

impl MotionResult {
    pub fn quiet() -> Self {
        Self {
            motion_detected: false,
            region_of_interest: None,
        }
    }
}

/// Floating-point accumulator image, same dimensions as incoming frames.
/// Owned exclusively by one camera's detector; seeded by the first frame.
#[derive(Debug, Clone)]
pub struct BackgroundModel {
    width: u32,
    height: u32,
    accum: Vec<f32>,
}

impl BackgroundModel {
    fn seed(gray: &GrayBuffer) -> Self {
        Self {
            width: gray.width,
            height: gray.height,
            accum: gray.pixels.iter().map(|&p| p as f32).collect(),
        }
    }

    /// Blend the current frame in: `accum = w*current + (1-w)*accum`
    fn accumulate(&mut self, gray: &GrayBuffer, weight: f32) {
        for (acc, &px) in self.accum.iter_mut().zip(gray.pixels.iter()) {
            *acc = weight * px as f32 + (1.0 - weight) * *acc;
        }
    }

    /// Rounded 8-bit view of the accumulator
    fn rounded(&self) -> Vec<u8> {
        self.accum
            .iter()
            .map(|&v| v.round().clamp(0.0, 255.0) as u8)
            .collect()
    }
}

/// Per-camera motion detector
pub struct MotionDetector {
    config: MotionConfig,
    background: Option<BackgroundModel>,
}

impl MotionDetector {
    pub fn new(config: MotionConfig) -> Self {
        Self {
            config,
            background: None,
        }
    }

    /// Whether the background model has been seeded yet
    pub fn is_seeded(&self) -> bool {
        self.background.is_some()
    }

    /// Process one frame. Always succeeds given a valid frame: the model
    /// keeps adapting even when no region qualifies.
    pub fn detect(&mut self, frame: &Frame) -> MotionResult {
        let gray = blur(&frame.to_gray(), self.config.blur_radius);

        let background = match self.background.as_mut() {
            None => {
                // First frame only seeds; motion can never be reported here
                self.background = Some(BackgroundModel::seed(&gray));
                return MotionResult::quiet();
            }
            Some(bg) => bg,
        };

        background.accumulate(&gray, self.config.accum_weight);

        let reference = background.rounded();
        let mut mask: Vec<u8> = gray
            .pixels
            .iter()
            .zip(reference.iter())
            .map(|(&cur, &bg)| {
                let delta = cur.abs_diff(bg);
                if delta > self.config.delta_threshold {
                    255
                } else {
                    0
                }
            })
            .collect();

        for _ in 0..self.config.dilate_iterations {
            mask = dilate(&mask, gray.width, gray.height);
        }

        let regions = connected_regions(&mask, gray.width, gray.height);
        let roi = select_region(&regions, self.config.min_area, self.config.region_policy);

        match roi {
            Some(rect) => {
                tracing::debug!(
                    x = rect.x,
                    y = rect.y,
                    width = rect.width,
                    height = rect.height,
                    "Motion region detected"
                );
                MotionResult {
                    motion_detected: true,
                    region_of_interest: Some(rect),
                }
            }
            None => MotionResult::quiet(),
        }
    }
}

/// Normalized box blur. A wide kernel suppresses sensor noise and fine
/// texture that would otherwise register as motion.
fn blur(gray: &GrayBuffer, radius: u32) -> GrayBuffer {
    if radius == 0 {
        return gray.clone();
    }
    let (w, h) = (gray.width as i64, gray.height as i64);
    let r = radius as i64;

    // Horizontal pass
    let mut horizontal = vec![0u16; (w * h) as usize];
    for y in 0..h {
        for x in 0..w {
            let mut sum = 0u32;
            let mut count = 0u32;
            for dx in -r..=r {
                let xx = x + dx;
                if xx >= 0 && xx < w {
                    sum += gray.pixels[(y * w + xx) as usize] as u32;
                    count += 1;
                }
            }
            horizontal[(y * w + x) as usize] = (sum / count) as u16;
        }
    }

    // Vertical pass
    let mut pixels = vec![0u8; (w * h) as usize];
    for y in 0..h {
        for x in 0..w {
            let mut sum = 0u32;
            let mut count = 0u32;
            for dy in -r..=r {
                let yy = y + dy;
                if yy >= 0 && yy < h {
                    sum += horizontal[(yy * w + x) as usize] as u32;
                    count += 1;
                }
            }
            pixels[(y * w + x) as usize] = (sum / count) as u8;
        }
    }

    GrayBuffer::new(gray.width, gray.height, pixels)
}

/// One 3x3 dilation pass over a binary mask, merging nearby fragments
fn dilate(mask: &[u8], width: u32, height: u32) -> Vec<u8> {
    let (w, h) = (width as i64, height as i64);
    let mut out = vec![0u8; mask.len()];
    for y in 0..h {
        for x in 0..w {
            let mut hit = false;
            'probe: for dy in -1..=1i64 {
                for dx in -1..=1i64 {
                    let (xx, yy) = (x + dx, y + dy);
                    if xx >= 0 && xx < w && yy >= 0 && yy < h && mask[(yy * w + xx) as usize] != 0 {
                        hit = true;
                        break 'probe;
                    }
                }
            }
            if hit {
                out[(y * w + x) as usize] = 255;
            }
        }
    }
    out
}

/// A connected foreground region of the mask
#[derive(Debug, Clone, Copy)]
struct Region {
    bounds: Rect,
    area: u64,
}

/// Extract 4-connected regions in row-major traversal order via flood fill
fn connected_regions(mask: &[u8], width: u32, height: u32) -> Vec<Region> {
    let (w, h) = (width as usize, height as usize);
    let mut visited = vec![false; mask.len()];
    let mut regions = Vec::new();
    let mut stack = Vec::new();

    for start in 0..mask.len() {
        if mask[start] == 0 || visited[start] {
            continue;
        }

        let (mut min_x, mut min_y) = (w, h);
        let (mut max_x, mut max_y) = (0usize, 0usize);
        let mut area = 0u64;

        stack.push(start);
        visited[start] = true;
        while let Some(idx) = stack.pop() {
            let (x, y) = (idx % w, idx / w);
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
            area += 1;

            let neighbors = [
                (x > 0).then(|| idx - 1),
                (x + 1 < w).then(|| idx + 1),
                (y > 0).then(|| idx - w),
                (y + 1 < h).then(|| idx + w),
            ];
            for n in neighbors.into_iter().flatten() {
                if mask[n] != 0 && !visited[n] {
                    visited[n] = true;
                    stack.push(n);
                }
            }
        }

        regions.push(Region {
            bounds: Rect::new(
                min_x as u32,
                min_y as u32,
                (max_x - min_x + 1) as u32,
                (max_y - min_y + 1) as u32,
            ),
            area,
        });
    }

    regions
}

fn select_region(regions: &[Region], min_area: u64, policy: RegionPolicy) -> Option<Rect> {
    let mut qualifying = regions.iter().filter(|r| r.area > min_area);
    match policy {
        RegionPolicy::First => qualifying.next().map(|r| r.bounds),
        RegionPolicy::Largest => qualifying.max_by_key(|r| r.area).map(|r| r.bounds),
        RegionPolicy::Union => qualifying
            .map(|r| r.bounds)
            .reduce(|acc, r| acc.union(&r)),
    }
}

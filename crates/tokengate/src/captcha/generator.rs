//! CAPTCHA image generation.
//!
//! Digits are stroked as slanted seven-segment glyphs with per-glyph jitter
//! and crossed by random noise lines, then encoded as PNG. No font file is
//! needed at runtime.

use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;
use rand::Rng;
use std::io::Cursor;

use tokengate_common::GateError;
use tokengate_common::constants::CAPTCHA_DIGITS;

use crate::config::CaptchaConfig;

const BACKGROUND: Rgb<u8> = Rgb([35, 39, 42]);
const NOISE: Rgb<u8> = Rgb([114, 137, 218]);
const INK: Rgb<u8> = Rgb([255, 255, 255]);

/// Segments lit per digit, in `a b c d e f g` order
const SEGMENTS: [[bool; 7]; 10] = [
    [true, true, true, true, true, true, false],     // 0
    [false, true, true, false, false, false, false], // 1
    [true, true, false, true, true, false, true],    // 2
    [true, true, true, true, false, false, true],    // 3
    [false, true, true, false, false, true, true],   // 4
    [true, false, true, true, false, true, true],    // 5
    [true, false, true, true, true, true, true],     // 6
    [true, true, true, false, false, false, false],  // 7
    [true, true, true, true, true, true, true],      // 8
    [true, true, true, true, false, true, true],     // 9
];

/// Renders numeric codes into PNG images
#[derive(Debug, Clone)]
pub struct CaptchaRenderer {
    width: u32,
    height: u32,
    noise_lines: u32,
}

impl CaptchaRenderer {
    pub fn new(config: &CaptchaConfig) -> Self {
        Self {
            width: config.width.max(60),
            height: config.height.max(30),
            noise_lines: config.noise_lines,
        }
    }

    /// Random `CAPTCHA_DIGITS`-digit code without a leading zero
    pub fn random_code(rng: &mut impl Rng) -> String {
        let low = 10u32.pow(CAPTCHA_DIGITS as u32 - 1);
        rng.random_range(low..low * 10).to_string()
    }

    /// Render `code` (ASCII digits only) to PNG bytes
    pub fn render(&self, code: &str, rng: &mut impl Rng) -> Result<Vec<u8>, GateError> {
        let digits: Vec<usize> = code
            .chars()
            .map(|c| c.to_digit(10).map(|d| d as usize))
            .collect::<Option<_>>()
            .ok_or_else(|| GateError::Captcha(format!("not a numeric code: {code:?}")))?;

        let mut img = RgbImage::from_pixel(self.width, self.height, BACKGROUND);

        let (w, h) = (self.width as f32, self.height as f32);
        let glyph_h = h * 0.5;
        let glyph_w = glyph_h * 0.6;
        let gap = glyph_w * 0.6;
        let total = digits.len() as f32 * glyph_w + (digits.len().saturating_sub(1)) as f32 * gap;
        let start_x = ((w - total) / 2.0).max(2.0);
        let base_y = (h - glyph_h) / 2.0;

        let behind = self.noise_lines / 2;
        self.draw_noise(&mut img, behind, rng);

        for (i, &digit) in digits.iter().enumerate() {
            let x = start_x + i as f32 * (glyph_w + gap) + rng.random_range(-2.0..2.0);
            let y = base_y + rng.random_range(-glyph_h * 0.15..glyph_h * 0.15);
            let slant: f32 = rng.random_range(-0.2..0.25);
            draw_glyph(&mut img, digit, (x, y), (glyph_w, glyph_h), slant, rng);
        }

        self.draw_noise(&mut img, self.noise_lines - behind, rng);

        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| GateError::Captcha(e.to_string()))?;
        Ok(bytes)
    }

    fn draw_noise(&self, img: &mut RgbImage, count: u32, rng: &mut impl Rng) {
        let (w, h) = (self.width as f32, self.height as f32);
        for _ in 0..count {
            let start = (rng.random_range(0.0..w), rng.random_range(0.0..h));
            let end = (rng.random_range(0.0..w), rng.random_range(0.0..h));
            draw_line_segment_mut(img, start, end, NOISE);
        }
    }
}

/// Stroke one seven-segment digit with its top-left corner at `origin`
fn draw_glyph(
    img: &mut RgbImage,
    digit: usize,
    origin: (f32, f32),
    size: (f32, f32),
    slant: f32,
    rng: &mut impl Rng,
) {
    let (x, y) = origin;
    let (w, h) = size;
    let mid = h / 2.0;

    // Slanted point: the top leans by `slant * h` relative to the baseline
    let pt = |px: f32, py: f32| (x + px + (h - py) * slant, y + py);

    let strokes = [
        (pt(0.0, 0.0), pt(w, 0.0)), // a
        (pt(w, 0.0), pt(w, mid)),   // b
        (pt(w, mid), pt(w, h)),     // c
        (pt(0.0, h), pt(w, h)),     // d
        (pt(0.0, mid), pt(0.0, h)), // e
        (pt(0.0, 0.0), pt(0.0, mid)), // f
        (pt(0.0, mid), pt(w, mid)), // g
    ];

    for (lit, (start, end)) in SEGMENTS[digit].iter().zip(strokes) {
        if !lit {
            continue;
        }
        let jitter: (f32, f32) = (rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0));
        for dx in -1..=1 {
            for dy in -1..=1 {
                let (ox, oy) = (dx as f32 + jitter.0, dy as f32 + jitter.1);
                draw_line_segment_mut(
                    img,
                    (start.0 + ox, start.1 + oy),
                    (end.0 + ox, end.1 + oy),
                    INK,
                );
            }
        }
    }
}

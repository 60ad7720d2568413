//! RGBA colors and the HLS/HSV conversions the color methods need.

use std::fmt;

/// An 8-bit-per-channel RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

fn clip(v: f64) -> u8 {
    // Truncate like an integer conversion, then clamp into range.
    let v = v.trunc();
    if v.is_nan() || v <= 0.0 {
        0
    } else if v >= 255.0 {
        255
    } else {
        v as u8
    }
}

fn unit(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

impl Color {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Build a color from channel values in `0..=255`, clipping out of
    /// range values.
    pub fn from_channels(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self::new(clip(r), clip(g), clip(b), clip(a))
    }

    /// Build a color from `0.0..=1.0` components.
    pub fn from_rgb(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self::from_channels(255.0 * r, 255.0 * g, 255.0 * b, 255.0 * a)
    }

    pub fn from_hls(h: f64, l: f64, s: f64, a: f64) -> Self {
        let (r, g, b) = hls_to_rgb(h.rem_euclid(1.0), unit(l), unit(s));
        Self::from_rgb(r, g, b, a)
    }

    pub fn from_hsv(h: f64, s: f64, v: f64, a: f64) -> Self {
        let (r, g, b) = hsv_to_rgb(h.rem_euclid(1.0), unit(s), unit(v));
        Self::from_rgb(r, g, b, a)
    }

    fn unit_rgb(&self) -> (f64, f64, f64) {
        (
            f64::from(self.r) / 255.0,
            f64::from(self.g) / 255.0,
            f64::from(self.b) / 255.0,
        )
    }

    pub fn hls(&self) -> (f64, f64, f64) {
        let (r, g, b) = self.unit_rgb();
        rgb_to_hls(r, g, b)
    }

    pub fn hsv(&self) -> (f64, f64, f64) {
        let (r, g, b) = self.unit_rgb();
        rgb_to_hsv(r, g, b)
    }

    pub fn alpha(&self) -> f64 {
        f64::from(self.a) / 255.0
    }

    /// Luminance: the `l` component of [`hls`](Self::hls).
    pub fn lum(&self) -> f64 {
        self.hls().1
    }

    pub fn with_lum(&self, lum: f64) -> Self {
        let (h, _, s) = self.hls();
        Self::from_hls(h, lum, s, self.alpha())
    }

    pub fn with_a(&self, a: u8) -> Self {
        Self { a, ..*self }
    }

    /// The shortest `#` notation: `#rgb`/`#rgba` when every channel has
    /// repeated hex digits, otherwise `#rrggbb`/`#rrggbbaa`. Alpha is only
    /// written when the color isn't opaque.
    pub fn hex_repr(&self) -> String {
        let short = [self.r, self.g, self.b, self.a]
            .iter()
            .all(|c| c >> 4 == c & 0xf);
        match (short, self.a == 0xff) {
            (true, true) => format!("#{:x}{:x}{:x}", self.r >> 4, self.g >> 4, self.b >> 4),
            (true, false) => format!(
                "#{:x}{:x}{:x}{:x}",
                self.r >> 4,
                self.g >> 4,
                self.b >> 4,
                self.a >> 4
            ),
            (false, true) => format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b),
            (false, false) => format!(
                "#{:02x}{:02x}{:02x}{:02x}",
                self.r, self.g, self.b, self.a
            ),
        }
    }

    /// Parse `#rgb`, `#rgba`, `#rrggbb` or `#rrggbbaa`.
    pub fn parse(text: &str) -> Option<Self> {
        let digits = text.strip_prefix('#')?;
        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let nibble = |i: usize| u8::from_str_radix(&digits[i..=i], 16).ok().map(|n| n * 17);
        let byte = |i: usize| u8::from_str_radix(&digits[2 * i..2 * i + 2], 16).ok();
        match digits.len() {
            3 => Some(Self::new(nibble(0)?, nibble(1)?, nibble(2)?, 0xff)),
            4 => Some(Self::new(nibble(0)?, nibble(1)?, nibble(2)?, nibble(3)?)),
            6 => Some(Self::new(byte(0)?, byte(1)?, byte(2)?, 0xff)),
            8 => Some(Self::new(byte(0)?, byte(1)?, byte(2)?, byte(3)?)),
            _ => None,
        }
    }
}

/// CSS notation: `#rgb`/`#rrggbb` for opaque colors, `rgba(…)` otherwise.
impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 0xff {
            let short = [self.r, self.g, self.b].iter().all(|c| c >> 4 == c & 0xf);
            if short {
                write!(f, "#{:x}{:x}{:x}", self.r >> 4, self.g >> 4, self.b >> 4)
            } else {
                write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
            }
        } else {
            write!(
                f,
                "rgba({},{},{},{:.3})",
                self.r,
                self.g,
                self.b,
                self.alpha()
            )
        }
    }
}

// ── Colorspace conversions ──────────────────────────────────────────────

const ONE_THIRD: f64 = 1.0 / 3.0;
const ONE_SIXTH: f64 = 1.0 / 6.0;
const TWO_THIRD: f64 = 2.0 / 3.0;

fn hue(r: f64, g: f64, b: f64, maxc: f64, minc: f64) -> f64 {
    let span = maxc - minc;
    let rc = (maxc - r) / span;
    let gc = (maxc - g) / span;
    let bc = (maxc - b) / span;
    let h = if r == maxc {
        bc - gc
    } else if g == maxc {
        2.0 + rc - bc
    } else {
        4.0 + gc - rc
    };
    (h / 6.0).rem_euclid(1.0)
}

pub fn rgb_to_hls(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
    let maxc = r.max(g).max(b);
    let minc = r.min(g).min(b);
    let l = (minc + maxc) / 2.0;
    if minc == maxc {
        return (0.0, l, 0.0);
    }
    let s = if l <= 0.5 {
        (maxc - minc) / (maxc + minc)
    } else {
        (maxc - minc) / (2.0 - maxc - minc)
    };
    (hue(r, g, b, maxc, minc), l, s)
}

pub fn hls_to_rgb(h: f64, l: f64, s: f64) -> (f64, f64, f64) {
    if s == 0.0 {
        return (l, l, l);
    }
    let m2 = if l <= 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let m1 = 2.0 * l - m2;
    (
        hls_value(m1, m2, h + ONE_THIRD),
        hls_value(m1, m2, h),
        hls_value(m1, m2, h - ONE_THIRD),
    )
}

fn hls_value(m1: f64, m2: f64, hue: f64) -> f64 {
    let hue = hue.rem_euclid(1.0);
    if hue < ONE_SIXTH {
        m1 + (m2 - m1) * hue * 6.0
    } else if hue < 0.5 {
        m2
    } else if hue < TWO_THIRD {
        m1 + (m2 - m1) * (TWO_THIRD - hue) * 6.0
    } else {
        m1
    }
}

pub fn rgb_to_hsv(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
    let maxc = r.max(g).max(b);
    let minc = r.min(g).min(b);
    if minc == maxc {
        return (0.0, 0.0, maxc);
    }
    let s = (maxc - minc) / maxc;
    (hue(r, g, b, maxc, minc), s, maxc)
}

pub fn hsv_to_rgb(h: f64, s: f64, v: f64) -> (f64, f64, f64) {
    if s == 0.0 {
        return (v, v, v);
    }
    let i = (h * 6.0).trunc();
    let f = h * 6.0 - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match (i as i64).rem_euclid(6) {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_and_long_forms() {
        assert_eq!(Color::parse("#fff"), Some(Color::new(255, 255, 255, 255)));
        assert_eq!(Color::parse("#0f08"), Some(Color::new(0, 255, 0, 0x88)));
        assert_eq!(Color::parse("#123456"), Some(Color::new(0x12, 0x34, 0x56, 255)));
        assert_eq!(Color::parse("#12345678"), Some(Color::new(0x12, 0x34, 0x56, 0x78)));
        assert_eq!(Color::parse("#12345"), None);
        assert_eq!(Color::parse("#ggg"), None);
    }

    #[test]
    fn test_css_display() {
        assert_eq!(Color::new(255, 0, 0, 255).to_string(), "#f00");
        assert_eq!(Color::new(0x12, 0x34, 0x56, 255).to_string(), "#123456");
        assert_eq!(Color::new(255, 0, 0, 0).to_string(), "rgba(255,0,0,0.000)");
    }

    #[test]
    fn test_hex_repr_keeps_alpha() {
        assert_eq!(Color::new(0x11, 0x22, 0x33, 0x44).hex_repr(), "#1234");
        assert_eq!(Color::new(0x12, 0x34, 0x56, 0x78).hex_repr(), "#12345678");
    }

    #[test]
    fn test_from_rgb_clips() {
        assert_eq!(Color::from_rgb(2.0, -1.0, 0.5, 1.0), Color::new(255, 0, 127, 255));
    }

    #[test]
    fn test_hls_roundtrip_for_pure_red() {
        let red = Color::new(255, 0, 0, 255);
        let (h, l, s) = red.hls();
        assert_eq!(h, 0.0);
        assert_eq!(l, 0.5);
        assert_eq!(s, 1.0);
        assert_eq!(Color::from_hls(h, l, s, 1.0), red);
    }

    #[test]
    fn test_hsv_for_grey_has_no_saturation() {
        let (_, s, v) = Color::new(128, 128, 128, 255).hsv();
        assert_eq!(s, 0.0);
        assert!((v - 128.0 / 255.0).abs() < 1e-12);
    }

    #[test]
    fn test_with_lum_white() {
        assert_eq!(Color::new(255, 0, 0, 255).with_lum(1.0), Color::new(255, 255, 255, 255));
    }
}

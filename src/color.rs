use std::collections::BTreeMap;
use std::fmt::Display;

use anyhow::{bail, Result};
use image::Rgba;
use palette::{Hsl, IntoColor, LinSrgb, Mix, Oklab, Srgb};

pub type Color = Rgba<u8>;

pub const LAND_GREY: Color = Rgba([214, 214, 214, 255]);
pub const OCEAN_WHITE: Color = Rgba([250, 250, 252, 255]);
pub const OUTLINE_DARK: Color = Rgba([60, 60, 60, 255]);
pub const HIGHLIGHT_RED: Color = Rgba([200, 30, 45, 255]);

fn to_color(rgb: Srgb) -> Color {
    let ch = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
    Rgba([ch(rgb.red), ch(rgb.green), ch(rgb.blue), 255])
}

/// `#rrggbb` form of a colour, for legend tables.
pub fn hex(c: Color) -> String {
    format!("#{:02x}{:02x}{:02x}", c.0[0], c.0[1], c.0[2])
}

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<Color> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.55);
            to_color(hsl.into_color())
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Continuous ramps: value → colour
// ---------------------------------------------------------------------------

/// A continuous colour ramp over `[min, max]`, interpolated in Oklab.
#[derive(Debug, Clone)]
pub struct ColorRamp {
    pub name: String,
    stops: Vec<Oklab>,
    pub min: f64,
    pub max: f64,
}

impl ColorRamp {
    /// Named ramp stretched over `[min, max]`.
    pub fn named(name: &str, min: f64, max: f64) -> Result<Self> {
        let stops: &[[u8; 3]] = match name {
            "viridis" => &[[68, 1, 84], [59, 82, 139], [33, 145, 140], [94, 201, 98], [253, 231, 37]],
            "magma" => &[[0, 0, 4], [81, 18, 124], [183, 55, 121], [252, 137, 97], [252, 253, 191]],
            "blues" => &[[222, 235, 247], [158, 202, 225], [66, 146, 198], [8, 69, 148]],
            "ylorrd" => &[[255, 255, 178], [254, 204, 92], [253, 141, 60], [227, 26, 28]],
            "greens" => &[[229, 245, 224], [161, 217, 155], [65, 171, 93], [0, 109, 44]],
            other => bail!("unknown colour ramp '{other}'"),
        };
        let stops = stops
            .iter()
            .map(|&[r, g, b]| {
                let lin: LinSrgb = Srgb::new(r, g, b).into_format::<f32>().into_linear();
                lin.into_color()
            })
            .collect();
        Ok(Self {
            name: name.to_string(),
            stops,
            min,
            max,
        })
    }

    /// Ramp stretched over the populated range of a raster.
    pub fn for_range(name: &str, range: Option<(f64, f64)>) -> Result<Self> {
        let (min, max) = range.unwrap_or((0.0, 1.0));
        Self::named(name, min, max)
    }

    /// Colour at a value; values outside the range clamp to the end stops.
    pub fn color_at(&self, value: f64) -> Color {
        let span = self.max - self.min;
        let t = if span.abs() < f64::EPSILON {
            0.5
        } else {
            ((value - self.min) / span).clamp(0.0, 1.0)
        };
        let scaled = t as f32 * (self.stops.len() - 1) as f32;
        let i = (scaled.floor() as usize).min(self.stops.len() - 2);
        let lab = self.stops[i].mix(self.stops[i + 1], scaled - i as f32);
        let lin: LinSrgb = lab.into_color();
        to_color(Srgb::from_linear(lin))
    }

    /// `steps` evenly spaced legend entries (value label → colour).
    pub fn legend_entries(&self, steps: usize) -> Vec<(String, Color)> {
        let steps = steps.max(2);
        (0..steps)
            .map(|i| {
                let v = self.min + (self.max - self.min) * i as f64 / (steps - 1) as f64;
                (format!("{v:.2}"), self.color_at(v))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Categorical mapping: key → colour
// ---------------------------------------------------------------------------

/// Maps unique category keys to distinct colours.
#[derive(Debug, Clone)]
pub struct ColorMap<K: Ord> {
    mapping: BTreeMap<K, Color>,
    default_color: Color,
}

impl<K: Ord + Clone + Display> ColorMap<K> {
    /// Build a colour map from the unique keys.
    pub fn new<'a, I>(keys: I) -> Self
    where
        I: IntoIterator<Item = &'a K>,
        K: 'a,
    {
        let unique: std::collections::BTreeSet<K> = keys.into_iter().cloned().collect();
        let palette = generate_palette(unique.len());
        let mapping = unique.into_iter().zip(palette).collect();
        ColorMap {
            mapping,
            default_color: OUTLINE_DARK,
        }
    }

    /// Force a colour for one key.
    pub fn with_color(mut self, key: K, color: Color) -> Self {
        self.mapping.insert(key, color);
        self
    }

    /// Look up the colour for a key.
    pub fn color_for(&self, key: &K) -> Color {
        self.mapping.get(key).copied().unwrap_or(self.default_color)
    }

    /// Return the legend entries (key label → colour).
    pub fn legend_entries(&self) -> Vec<(String, Color)> {
        self.mapping
            .iter()
            .map(|(k, c)| (k.to_string(), *c))
            .collect()
    }
}

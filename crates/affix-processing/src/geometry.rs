//! Geometry strings describing a resize target.
//!
//! | Form    | Meaning                                                         |
//! |---------|-----------------------------------------------------------------|
//! | `WxH`   | fit inside a `W` by `H` box, keeping the aspect ratio           |
//! | `W`     | width `W`, height follows the aspect ratio                      |
//! | `xH`    | height `H`, width follows the aspect ratio                      |
//! | `...%`  | values are percentages of the source (`50%` scales both sides)  |
//! | `...!`  | exact dimensions, the aspect ratio is ignored                   |
//! | `...<`  | only enlarge: sources already as large are returned unchanged   |
//! | `...>`  | only shrink: sources already as small are returned unchanged    |

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

static GEOMETRY: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^(\d+)?(?:x(\d+)?)?([%!<>])?$"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    #[error("geometry `{0}` does not match WxH[%!<>]")]
    Invalid(String),

    #[error("geometry `{0}` names neither a width nor a height")]
    Empty(String),
}

impl From<GeometryError> for affix_core::AttachmentError {
    fn from(error: GeometryError) -> Self {
        affix_core::AttachmentError::Geometry(error.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Percent,
    Exact,
    GrowOnly,
    ShrinkOnly,
}

/// A parsed geometry string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub modifier: Option<Modifier>,
}

impl Geometry {
    /// Fit inside a `width` by `height` box.
    pub fn fit(width: u32, height: u32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            modifier: None,
        }
    }

    pub fn parse(spec: &str) -> Result<Self, GeometryError> {
        let spec = spec.trim();
        let pattern = GEOMETRY
            .as_ref()
            .map_err(|_| GeometryError::Invalid(spec.to_string()))?;
        let captures = pattern
            .captures(spec)
            .ok_or_else(|| GeometryError::Invalid(spec.to_string()))?;

        let number = |index: usize| -> Result<Option<u32>, GeometryError> {
            captures
                .get(index)
                .map(|m| {
                    m.as_str()
                        .parse::<u32>()
                        .map_err(|_| GeometryError::Invalid(spec.to_string()))
                })
                .transpose()
        };

        let width = number(1)?;
        let height = number(2)?;
        if width.is_none() && height.is_none() {
            return Err(GeometryError::Empty(spec.to_string()));
        }

        let modifier = captures.get(3).map(|m| match m.as_str() {
            "%" => Modifier::Percent,
            "!" => Modifier::Exact,
            "<" => Modifier::GrowOnly,
            _ => Modifier::ShrinkOnly,
        });

        Ok(Self {
            width,
            height,
            modifier,
        })
    }

    /// Target dimensions for a `width` by `height` source. Every side is at least one pixel.
    pub fn resolve(&self, width: u32, height: u32) -> (u32, u32) {
        if width == 0 || height == 0 {
            return (width, height);
        }
        let (w, h) = (width as f64, height as f64);

        match self.modifier {
            Some(Modifier::Percent) => {
                let scale_x = self.width.unwrap_or(100) as f64 / 100.0;
                let scale_y = self.height.or(self.width).unwrap_or(100) as f64 / 100.0;
                (scaled(w, scale_x), scaled(h, scale_y))
            }
            Some(Modifier::Exact) => (
                self.width.unwrap_or(width).max(1),
                self.height.unwrap_or(height).max(1),
            ),
            modifier => {
                let scale = match (self.width, self.height) {
                    (Some(tw), Some(th)) => (tw as f64 / w).min(th as f64 / h),
                    (Some(tw), None) => tw as f64 / w,
                    (None, Some(th)) => th as f64 / h,
                    (None, None) => 1.0,
                };
                match modifier {
                    Some(Modifier::GrowOnly) if scale <= 1.0 => (width, height),
                    Some(Modifier::ShrinkOnly) if scale >= 1.0 => (width, height),
                    _ => (scaled(w, scale), scaled(h, scale)),
                }
            }
        }
    }
}

fn scaled(value: f64, scale: f64) -> u32 {
    ((value * scale).round() as u32).max(1)
}

impl std::str::FromStr for Geometry {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(w) = self.width {
            write!(f, "{}", w)?;
        }
        if let Some(h) = self.height {
            write!(f, "x{}", h)?;
        }
        match self.modifier {
            Some(Modifier::Percent) => f.write_str("%"),
            Some(Modifier::Exact) => f.write_str("!"),
            Some(Modifier::GrowOnly) => f.write_str("<"),
            Some(Modifier::ShrinkOnly) => f.write_str(">"),
            None => Ok(()),
        }
    }
}

/// Resolve a geometry string against a source size.
pub fn resolve(width: u32, height: u32, spec: &str) -> Result<(u32, u32), GeometryError> {
    Ok(Geometry::parse(spec)?.resolve(width, height))
}

/// A geometry as it appears in configuration: a string, a square box, or a `[w, h]` box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeometrySpec {
    Square(u32),
    Box([u32; 2]),
    Text(String),
}

impl GeometrySpec {
    pub fn geometry(&self) -> Result<Geometry, GeometryError> {
        match self {
            GeometrySpec::Square(size) => Ok(Geometry::fit(*size, *size)),
            GeometrySpec::Box([w, h]) => Ok(Geometry::fit(*w, *h)),
            GeometrySpec::Text(spec) => ResizeTarget::parse(spec).map(|t| t.geometry),
        }
    }

    pub fn target(&self) -> Result<ResizeTarget, GeometryError> {
        match self {
            GeometrySpec::Text(spec) => ResizeTarget::parse(spec),
            other => Ok(ResizeTarget {
                geometry: other.geometry()?,
                mode: ResizeMode::Fit,
            }),
        }
    }
}

impl fmt::Display for GeometrySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeometrySpec::Square(size) => write!(f, "{}x{}", size, size),
            GeometrySpec::Box([w, h]) => write!(f, "{}x{}", w, h),
            GeometrySpec::Text(spec) => f.write_str(spec),
        }
    }
}

impl From<&str> for GeometrySpec {
    fn from(spec: &str) -> Self {
        GeometrySpec::Text(spec.to_string())
    }
}

/// How an adapter fills the resolved box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeMode {
    /// Scale to the resolved dimensions.
    #[default]
    Fit,
    /// Scale to cover the box and crop the overflow, centered.
    Crop,
    /// Scale to fit inside the box and pad the rest with white.
    Extend,
}

/// Adapter-level resize request: a geometry plus the crop (`c`) and extend (`e`) extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeTarget {
    pub geometry: Geometry,
    pub mode: ResizeMode,
}

impl ResizeTarget {
    pub fn parse(spec: &str) -> Result<Self, GeometryError> {
        let spec = spec.trim();
        let (core, mode) = if let Some(rest) = spec.strip_prefix('c') {
            (rest, ResizeMode::Crop)
        } else if let Some(rest) = spec.strip_suffix('c') {
            (rest, ResizeMode::Crop)
        } else if let Some(rest) = spec.strip_suffix('e') {
            (rest, ResizeMode::Extend)
        } else {
            (spec, ResizeMode::Fit)
        };
        let geometry = Geometry::parse(core)?;

        // boxes filled by crop or extend need both sides
        if mode != ResizeMode::Fit && (geometry.width.is_none() || geometry.height.is_none()) {
            return Err(GeometryError::Invalid(spec.to_string()));
        }

        Ok(Self { geometry, mode })
    }

    /// Dimensions of the produced image for a `width` by `height` source.
    pub fn resolve(&self, width: u32, height: u32) -> (u32, u32) {
        match (self.mode, self.geometry.width, self.geometry.height) {
            (ResizeMode::Crop | ResizeMode::Extend, Some(w), Some(h)) => (w.max(1), h.max(1)),
            _ => self.geometry.resolve(width, height),
        }
    }
}

//! Result types produced by layout analysis and recognition

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

/// Axis-aligned rectangle in pixel space, origin top-left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct IntRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl IntRect {
    /// Create a rect, swapping edges given in the wrong order
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left: left.min(right),
            top: top.min(bottom),
            right: left.max(right),
            bottom: top.max(bottom),
        }
    }

    /// Horizontal extent; exact even for rects spanning most of the `i32` range
    pub fn width(&self) -> u32 {
        self.right.abs_diff(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.abs_diff(self.top)
    }

    /// Whether `left <= right` and `top <= bottom`
    pub fn is_normalized(&self) -> bool {
        self.left <= self.right && self.top <= self.bottom
    }

    /// Smallest rect covering both rects
    pub fn union(&self, other: &IntRect) -> IntRect {
        IntRect {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }

    /// Whether `other` lies entirely inside this rect
    pub fn contains(&self, other: &IntRect) -> bool {
        other.left >= self.left
            && other.top >= self.top
            && other.right <= self.right
            && other.bottom <= self.bottom
    }

    /// Whether every edge is within `tolerance` pixels of the matching edge of `other`
    pub fn is_within(&self, other: &IntRect, tolerance: u32) -> bool {
        self.left.abs_diff(other.left) <= tolerance
            && self.top.abs_diff(other.top) <= tolerance
            && self.right.abs_diff(other.right) <= tolerance
            && self.bottom.abs_diff(other.bottom) <= tolerance
    }
}

/// Positional flags attached to layout boxes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoxFlags(u32);

impl BoxFlags {
    pub const NONE: BoxFlags = BoxFlags(0);
    /// First item of a text line
    pub const START_OF_LINE: BoxFlags = BoxFlags(1);
    /// Last item of a text line
    pub const END_OF_LINE: BoxFlags = BoxFlags(2);

    pub fn from_bits(bits: u32) -> Self {
        BoxFlags(bits)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: BoxFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: BoxFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: BoxFlags) {
        self.0 &= !other.0;
    }
}

impl BitOr for BoxFlags {
    type Output = BoxFlags;

    fn bitor(self, rhs: BoxFlags) -> BoxFlags {
        BoxFlags(self.0 | rhs.0)
    }
}

/// Box produced by layout analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxItem {
    pub rect: IntRect,
    pub flags: BoxFlags,
}

/// Box with recognized text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextItem {
    pub rect: IntRect,
    pub flags: BoxFlags,
    /// Recognition confidence (0.0 - 1.0)
    pub confidence: f32,
    pub text: String,
}

impl TextItem {
    /// Layout-only view of this item
    pub fn to_box(&self) -> BoxItem {
        BoxItem {
            rect: self.rect,
            flags: self.flags,
        }
    }
}

/// Estimated page rotation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    /// Rotation in degrees
    pub rotation: i32,
    /// Estimate confidence (0.0 - 1.0)
    pub confidence: f32,
}

/// Granularity that layout boxes are grouped into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextUnit {
    Line,
    #[default]
    Word,
}

impl TextUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextUnit::Line => "line",
            TextUnit::Word => "word",
        }
    }
}

impl fmt::Display for TextUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TextUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "line" => Ok(TextUnit::Line),
            "word" => Ok(TextUnit::Word),
            other => Err(format!("unknown text unit: {other}")),
        }
    }
}

/// Clamp a confidence into `[0, 1]`, mapping NaN to zero
pub(crate) fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

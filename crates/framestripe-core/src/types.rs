use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::errors::GeometryError;

// MARK: - StripeSeqNumber

/// Global stripe sequence number.
///
/// Strictly increasing across every stripe a producer ever emits. A consumer
/// that sees a gap or a value going backwards has observed an eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StripeSeqNumber(pub u64);

impl StripeSeqNumber {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// Number of sequence numbers skipped between `self` and a later `next`.
    /// Zero when `next` directly follows `self`.
    pub fn gap_to(self, next: StripeSeqNumber) -> u64 {
        next.0.saturating_sub(self.0).saturating_sub(1)
    }
}

impl std::fmt::Display for StripeSeqNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// MARK: - ScreenOrientation

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenOrientation {
    #[default]
    Portrait,
    Landscape,
}

impl std::fmt::Display for ScreenOrientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Portrait => write!(f, "portrait"),
            Self::Landscape => write!(f, "landscape"),
        }
    }
}

// MARK: - DisplayGeometry

/// Geometry of one virtual display as reported by its frame source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisplayGeometry {
    pub width: u32,
    pub height: u32,
    /// Bytes per row, including any row padding.
    #[serde(alias = "strideBytes")]
    pub stride_bytes: u32,
    #[serde(alias = "bytesPerPixel")]
    pub bytes_per_pixel: u32,
    /// Total bytes of one frame buffer.
    #[serde(alias = "sizeBytes")]
    pub size_bytes: usize,
}

impl DisplayGeometry {
    /// Tightly packed geometry: `stride = width * bytes_per_pixel`.
    pub fn packed(width: u32, height: u32, bytes_per_pixel: u32) -> Result<Self, GeometryError> {
        Self::padded(width, height, bytes_per_pixel, 0)
    }

    /// Geometry whose rows carry `row_padding` extra bytes after the pixels.
    pub fn padded(
        width: u32,
        height: u32,
        bytes_per_pixel: u32,
        row_padding: u32,
    ) -> Result<Self, GeometryError> {
        let too_large = || GeometryError::TooLarge { width, height, bytes_per_pixel };
        let stride_bytes = width
            .checked_mul(bytes_per_pixel)
            .and_then(|row| row.checked_add(row_padding))
            .ok_or_else(too_large)?;
        let size_bytes = (stride_bytes as usize)
            .checked_mul(height as usize)
            .ok_or_else(too_large)?;
        Ok(Self { width, height, stride_bytes, bytes_per_pixel, size_bytes })
    }

    /// Bytes of visible pixels in one row.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.bytes_per_pixel as usize
    }

    fn too_large(&self) -> GeometryError {
        GeometryError::TooLarge {
            width: self.width,
            height: self.height,
            bytes_per_pixel: self.bytes_per_pixel,
        }
    }

    pub fn validate(&self) -> Result<(), GeometryError> {
        if self.width == 0 || self.height == 0 || self.bytes_per_pixel == 0 {
            return Err(GeometryError::ZeroDimension {
                width: self.width,
                height: self.height,
                bytes_per_pixel: self.bytes_per_pixel,
            });
        }
        let row_bytes = (self.width as usize)
            .checked_mul(self.bytes_per_pixel as usize)
            .ok_or_else(|| self.too_large())?;
        if (self.stride_bytes as usize) < row_bytes {
            return Err(GeometryError::StrideTooSmall {
                stride: self.stride_bytes,
                row_bytes,
            });
        }
        let required = (self.stride_bytes as usize)
            .checked_mul(self.height as usize)
            .ok_or_else(|| self.too_large())?;
        if self.size_bytes < required {
            return Err(GeometryError::BufferTooSmall {
                size: self.size_bytes,
                required,
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for DisplayGeometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}×{} stride={} bpp={}",
            self.width, self.height, self.stride_bytes, self.bytes_per_pixel
        )
    }
}

// MARK: - Stripe

/// One full-width horizontal band of a captured frame.
///
/// `raw_data` is an independent copy of the band's rows, so a consumer may
/// keep a stripe for as long as it likes without pinning the frame it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stripe {
    /// Position of the stripe within its frame, `0..num_stripes`.
    pub index: u32,
    /// Shared by every stripe cut from the same frame.
    pub frame_id: u64,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Byte stride of the source frame.
    pub stride: u32,
    /// Exactly `height * stride` bytes.
    pub raw_data: Bytes,
    pub seq_number: StripeSeqNumber,
    pub orientation: ScreenOrientation,
}

impl Stripe {
    /// Row range covered by this stripe, `[y, y + height)`.
    pub fn rows(&self) -> std::ops::Range<u32> {
        self.y..self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.height == 0
    }
}

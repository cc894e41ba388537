//! Stripe production: frame → `num_stripes` tagged [`Stripe`]s.
//!
//! # Partitioning
//!
//! ```text
//!  y = 0 ┌──────────────────────┐
//!        │ stripe 0   h = H / N │
//!        ├──────────────────────┤
//!        │ stripe 1   h = H / N │
//!        ├──────────────────────┤
//!        │          ...         │
//!        ├──────────────────────┤
//!        │ stripe N-1           │  h = H / N + H % N
//!  y = H └──────────────────────┘
//! ```
//!
//! Every frame yields exactly `N` stripes, even when some are zero rows tall.

use bytes::Bytes;
use framestripe_core::{
    ComposerConfig, DisplayGeometry, ScreenOrientation, Stripe, StripeSeqNumber,
};
use tracing::{debug, warn};

/// `(y, height)` of each stripe when `display_height` rows are cut into
/// `num_stripes` bands. The last band absorbs the remainder.
pub fn stripe_bands(display_height: u32, num_stripes: u32) -> impl Iterator<Item = (u32, u32)> {
    let base = display_height.checked_div(num_stripes).unwrap_or(0);
    let remainder = display_height.checked_rem(num_stripes).unwrap_or(0);
    (0..num_stripes).map(move |i| {
        let extra = if i + 1 == num_stripes { remainder } else { 0 };
        (base * i, base + extra)
    })
}

/// What happened to one delivered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// `stripes` stripes were emitted for `frame_id`.
    Produced { frame_id: u64, stripes: u32 },
    /// Frame belonged to a display this maker does not serve.
    OtherDisplay { display_index: u32 },
    /// Buffer shorter than the display's frame size; dropped.
    ShortFrame { len: usize, expected: usize },
}

// ── StripeMaker ───────────────────────────────────────────────────────────────

/// Per-producer stripe state: frame counter, global sequence counter and the
/// working copy of the last frame.
pub struct StripeMaker {
    display_index: u32,
    num_stripes:   u32,
    orientation:   ScreenOrientation,
    geometry:      DisplayGeometry,
    frame_id:      u64,
    last_seq:      u64,
    raw_screen:    Vec<u8>,
}

impl StripeMaker {
    pub fn new(config: &ComposerConfig, geometry: DisplayGeometry) -> Self {
        Self {
            display_index: config.display_index,
            num_stripes:   config.num_stripes,
            orientation:   config.orientation,
            geometry,
            frame_id:      0,
            // Pre-incremented, so the first stripe carries #2.
            last_seq:      1,
            raw_screen:    Vec::with_capacity(geometry.size_bytes),
        }
    }

    /// Id the next produced frame will carry.
    pub fn next_frame_id(&self) -> u64 {
        self.frame_id
    }

    pub fn geometry(&self) -> &DisplayGeometry {
        &self.geometry
    }

    /// Cut `pixels` into stripes and hand each to `sink` in index order.
    pub fn make_stripes(
        &mut self,
        display_index: u32,
        pixels: &[u8],
        mut sink: impl FnMut(Stripe),
    ) -> FrameOutcome {
        if display_index != self.display_index {
            debug!(
                "Display[{}] frame ignored (serving display {})",
                display_index, self.display_index
            );
            return FrameOutcome::OtherDisplay { display_index };
        }

        let expected = self.geometry.size_bytes;
        if pixels.len() < expected {
            warn!(
                "Display[{}] short frame: {} bytes, expected {}",
                display_index,
                pixels.len(),
                expected
            );
            return FrameOutcome::ShortFrame { len: pixels.len(), expected };
        }

        // The source's buffer is only valid for the duration of its callback.
        self.raw_screen.clear();
        self.raw_screen.extend_from_slice(&pixels[..expected]);

        let stride = self.geometry.stride_bytes as usize;
        let bands = stripe_bands(self.geometry.height, self.num_stripes);
        for (index, (y, height)) in (0u32..).zip(bands) {
            self.last_seq += 1;
            let start = y as usize * stride;
            let end = start + height as usize * stride;
            sink(Stripe {
                index,
                frame_id: self.frame_id,
                x: 0,
                y,
                width: self.geometry.width,
                height,
                stride: self.geometry.stride_bytes,
                raw_data: Bytes::copy_from_slice(&self.raw_screen[start..end]),
                seq_number: StripeSeqNumber::new(self.last_seq),
                orientation: self.orientation,
            });
        }

        let frame_id = self.frame_id;
        self.frame_id += 1;
        FrameOutcome::Produced { frame_id, stripes: self.num_stripes }
    }
}

//! framestripe-capture — where raw display frames come from.
//!
//! # Frame delivery
//!
//! A [`FrameSource`] hands frames out through a callback rather than a return
//! value. The pixel slice only lives for the duration of the callback, so the
//! receiver must copy what it wants to keep:
//!
//! ```text
//! FrameSource::on_next_frame(cb)
//!        │  (blocks until a frame is ready)
//!        ▼
//!   cb(display_index, &pixels)  ──► caller copies into its own buffer
//! ```
//!
//! # Backends
//!
//! | Backend | Status |
//! |---------|--------|
//! | [`SyntheticFrameSource`] (moving gradient test pattern) | ✓ |
//! | Virtual-display frame server (fd handed in by the host) | external |
//!
//! # Usage
//!
//! ```rust,no_run
//! use framestripe_capture::{FrameSource, SyntheticFrameSource, SyntheticSourceConfig};
//! let source = SyntheticFrameSource::new(SyntheticSourceConfig::default()).unwrap();
//! let geometry = source.geometry(0);
//! source.on_next_frame(&mut |display, pixels| {
//!     assert_eq!(display, 0);
//!     assert!(pixels.len() >= geometry.size_bytes);
//! });
//! ```

mod synthetic;

pub use synthetic::{SyntheticFrameSource, SyntheticSourceConfig};

use framestripe_core::DisplayGeometry;

/// Callback invoked once per delivered frame with `(display_index, pixels)`.
pub type FrameCallback<'a> = dyn FnMut(u32, &[u8]) + 'a;

/// Supplier of raw frames for one or more virtual displays.
///
/// Geometry is stable for the lifetime of the source.
pub trait FrameSource: Send + Sync {
    /// Geometry of `display_index`.
    fn geometry(&self, display_index: u32) -> DisplayGeometry;

    /// Block until the next frame is ready, then invoke `callback` for it.
    ///
    /// A source driving several displays may invoke the callback once per
    /// display. The slice must not be retained past the callback.
    fn on_next_frame(&self, callback: &mut FrameCallback<'_>);

    /// Viewer connectivity changed; the source may throttle or resume
    /// production at its own level.
    fn report_clients_connected(&self, connected: bool);

    fn width(&self, display_index: u32) -> u32 {
        self.geometry(display_index).width
    }

    fn height(&self, display_index: u32) -> u32 {
        self.geometry(display_index).height
    }

    fn stride_bytes(&self, display_index: u32) -> u32 {
        self.geometry(display_index).stride_bytes
    }

    fn bytes_per_pixel(&self, display_index: u32) -> u32 {
        self.geometry(display_index).bytes_per_pixel
    }

    fn size_in_bytes(&self, display_index: u32) -> usize {
        self.geometry(display_index).size_bytes
    }
}

//! Synthetic display: renders a moving gradient at a fixed rate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use framestripe_core::{DisplayGeometry, FrameStripeError, GeometryError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{FrameCallback, FrameSource};

// ── Configuration ─────────────────────────────────────────────────────────────

/// Configuration for the synthetic test-pattern display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticSourceConfig {
    pub width:  u32,
    pub height: u32,
    #[serde(alias = "bytesPerPixel")]
    pub bytes_per_pixel: u32,
    /// Extra bytes appended to every row (stride = width × bpp + padding).
    #[serde(alias = "rowPaddingBytes")]
    pub row_padding_bytes: u32,
    /// Number of displays rendered per frame tick. Only one is ever consumed.
    pub displays: u32,
    /// Frame rate cap; `0` delivers frames as fast as they are requested.
    pub fps: u32,
}

impl Default for SyntheticSourceConfig {
    fn default() -> Self {
        Self {
            width:             720,
            height:            1280,
            bytes_per_pixel:   4,
            row_padding_bytes: 0,
            displays:          1,
            fps:               30,
        }
    }
}

impl SyntheticSourceConfig {
    /// Geometry every rendered display shares.
    pub fn geometry(&self) -> Result<DisplayGeometry, GeometryError> {
        DisplayGeometry::padded(
            self.width,
            self.height,
            self.bytes_per_pixel,
            self.row_padding_bytes,
        )
    }

    fn frame_interval(&self) -> Option<Duration> {
        (self.fps > 0).then(|| Duration::from_micros(1_000_000 / self.fps as u64))
    }
}

// ── SyntheticFrameSource ──────────────────────────────────────────────────────

struct RenderState {
    buffer:       Vec<u8>,
    frame_number: u64,
    next_due:     Option<Instant>,
}

/// Test-pattern [`FrameSource`]. Frame `n` fills pixel `(x, y)` with
/// `(x + y + n) as u8` in every channel; row padding stays zero.
pub struct SyntheticFrameSource {
    config:            SyntheticSourceConfig,
    geometry:          DisplayGeometry,
    state:             Mutex<RenderState>,
    clients_connected: AtomicBool,
}

impl SyntheticFrameSource {
    pub fn new(config: SyntheticSourceConfig) -> Result<Self, FrameStripeError> {
        let geometry = config.geometry()?;
        geometry.validate()?;
        if config.displays == 0 {
            return Err(FrameStripeError::ConfigurationInvalid {
                reason: "synthetic source needs at least one display".into(),
            });
        }
        info!(
            "SyntheticFrameSource {} ({} display(s), {} fps)",
            geometry, config.displays, config.fps
        );
        Ok(Self {
            state: Mutex::new(RenderState {
                buffer:       vec![0; geometry.size_bytes],
                frame_number: 0,
                next_due:     None,
            }),
            config,
            geometry,
            clients_connected: AtomicBool::new(false),
        })
    }

    /// Last connectivity state reported through
    /// [`FrameSource::report_clients_connected`].
    pub fn clients_connected(&self) -> bool {
        self.clients_connected.load(Ordering::Acquire)
    }

    /// Frames rendered so far.
    pub fn frames_rendered(&self) -> u64 {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).frame_number
    }

    pub fn config(&self) -> &SyntheticSourceConfig {
        &self.config
    }
}

impl FrameSource for SyntheticFrameSource {
    fn geometry(&self, _display_index: u32) -> DisplayGeometry {
        self.geometry
    }

    fn on_next_frame(&self, callback: &mut FrameCallback<'_>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(interval) = self.config.frame_interval() {
            let now = Instant::now();
            let due = state.next_due.unwrap_or(now);
            if due > now {
                std::thread::sleep(due - now);
            }
            // Don't try to catch up after a long pause (e.g. no viewers).
            state.next_due = Some(due.max(now) + interval);
        }

        let frame_number = state.frame_number;
        render_gradient(&mut state.buffer, &self.geometry, frame_number);
        state.frame_number += 1;

        for display in 0..self.config.displays {
            callback(display, &state.buffer);
        }
    }

    fn report_clients_connected(&self, connected: bool) {
        let previous = self.clients_connected.swap(connected, Ordering::AcqRel);
        if previous != connected {
            debug!("SyntheticFrameSource clients_connected={}", connected);
        }
    }
}

fn render_gradient(buffer: &mut [u8], geometry: &DisplayGeometry, frame_number: u64) {
    let bpp = geometry.bytes_per_pixel as usize;
    let row_bytes = geometry.row_bytes();
    let shift = frame_number as usize;
    for (y, row) in buffer
        .chunks_exact_mut(geometry.stride_bytes as usize)
        .take(geometry.height as usize)
        .enumerate()
    {
        for (x, pixel) in row[..row_bytes].chunks_exact_mut(bpp).enumerate() {
            pixel.fill((x + y + shift) as u8);
        }
    }
}

//! `Composer`: owns the stripe queue and the background stripe maker.
//!
//! # Lifecycle
//!
//! ```text
//! Composer::new ──► Running ──signal_close()──► Closing ──join──► Stopped
//! ```
//!
//! Dropping a `Composer` signals close, wakes the presence gate and joins the
//! producer thread before the queue and collaborators are released.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use framestripe_capture::FrameSource;
use framestripe_core::{ComposerConfig, FrameStripeError, Stripe};
use tracing::{debug, error, info};

use crate::presence::PresenceGate;
use crate::producer::{FrameOutcome, StripeMaker};
use crate::queue::BoundedQueue;

// ── State / stats ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposerState {
    Running,
    /// Close signalled, producer thread not joined yet.
    Closing,
    /// Producer thread joined. Terminal.
    Stopped,
}

/// Snapshot of the composer's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComposerStats {
    pub frames_produced:  u64,
    pub stripes_produced: u64,
    pub stripes_evicted:  u64,
    /// Stripes currently waiting in the queue.
    pub queued:           usize,
}

/// State shared with the producer thread.
struct Shared {
    closed:           Mutex<bool>,
    stripes:          BoundedQueue<Stripe>,
    frames_produced:  AtomicU64,
    stripes_produced: AtomicU64,
}

impl Shared {
    fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Composer ──────────────────────────────────────────────────────────────────

pub struct Composer {
    shared:       Arc<Shared>,
    gate:         Arc<dyn PresenceGate>,
    source:       Arc<dyn FrameSource>,
    num_stripes:  u32,
    stripe_maker: Option<JoinHandle<()>>,
}

impl Composer {
    /// Validate `config` against the source's geometry and start the stripe
    /// maker thread. Does not wait for a client.
    pub fn new(
        config: &ComposerConfig,
        gate: Arc<dyn PresenceGate>,
        source: Arc<dyn FrameSource>,
    ) -> Result<Self, FrameStripeError> {
        config.validate()?;
        let geometry = source.geometry(config.display_index);
        geometry.validate()?;

        let shared = Arc::new(Shared {
            closed:           Mutex::new(false),
            stripes:          BoundedQueue::with_eviction_of_oldest_half(config.queue_capacity),
            frames_produced:  AtomicU64::new(0),
            stripes_produced: AtomicU64::new(0),
        });

        info!(
            "Display[{}] composer {} → {} stripes/frame, queue capacity {}{}",
            config.display_index,
            geometry,
            config.num_stripes,
            config.queue_capacity,
            config
                .frame_source_fd
                .map(|fd| format!(", frame source fd {fd}"))
                .unwrap_or_default()
        );

        let maker = StripeMaker::new(config, geometry);
        let handle = {
            let shared = Arc::clone(&shared);
            let gate = Arc::clone(&gate);
            let source = Arc::clone(&source);
            std::thread::Builder::new()
                .name(format!("stripe-maker-{}", config.display_index))
                .spawn(move || make_stripes(shared, gate, source, maker))?
        };

        Ok(Self {
            shared,
            gate,
            source,
            num_stripes: config.num_stripes,
            stripe_maker: Some(handle),
        })
    }

    /// Next stripe, blocking while the queue is empty.
    ///
    /// Not released by [`signal_close`](Self::signal_close): once production
    /// has stopped this never returns on an empty queue. Check
    /// [`is_closed`](Self::is_closed) or use
    /// [`get_new_stripe_timeout`](Self::get_new_stripe_timeout).
    pub fn get_new_stripe(&self) -> Stripe {
        self.shared.stripes.pop()
    }

    /// Next stripe, or `None` if none arrived within `timeout`.
    pub fn get_new_stripe_timeout(&self, timeout: Duration) -> Option<Stripe> {
        self.shared.stripes.pop_timeout(timeout)
    }

    pub fn try_get_new_stripe(&self) -> Option<Stripe> {
        self.shared.stripes.try_pop()
    }

    pub fn number_of_stripes(&self) -> u32 {
        self.num_stripes
    }

    /// Forward viewer connectivity to the frame source. Does not touch the
    /// presence gate.
    pub fn report_clients_connected(&self, connected: bool) {
        self.source.report_clients_connected(connected);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Stop producing after the current frame. Idempotent.
    pub fn signal_close(&self) {
        {
            let mut closed = self.shared.closed.lock().unwrap_or_else(PoisonError::into_inner);
            if *closed {
                return;
            }
            *closed = true;
        }
        debug!("Composer close signalled");
        // A producer parked on the gate with no clients must see the flag.
        self.gate.wake_waiters();
    }

    /// Signal close and wait for the producer thread to exit.
    pub fn shutdown(&mut self) {
        self.signal_close();
        if let Some(handle) = self.stripe_maker.take() {
            if handle.join().is_err() {
                error!("Stripe maker thread panicked");
            }
            info!("Composer stopped");
        }
    }

    pub fn state(&self) -> ComposerState {
        match (self.is_closed(), &self.stripe_maker) {
            (_, None) => ComposerState::Stopped,
            (false, Some(_)) => ComposerState::Running,
            (true, Some(_)) => ComposerState::Closing,
        }
    }

    pub fn stats(&self) -> ComposerStats {
        ComposerStats {
            frames_produced:  self.shared.frames_produced.load(Ordering::Relaxed),
            stripes_produced: self.shared.stripes_produced.load(Ordering::Relaxed),
            stripes_evicted:  self.shared.stripes.evicted(),
            queued:           self.shared.stripes.len(),
        }
    }
}

impl Drop for Composer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ── Producer thread ───────────────────────────────────────────────────────────

fn make_stripes(
    shared: Arc<Shared>,
    gate: Arc<dyn PresenceGate>,
    source: Arc<dyn FrameSource>,
    mut maker: StripeMaker,
) {
    info!("Stripe maker started ({})", maker.geometry());

    while !shared.is_closed() {
        if !gate.wait_for_client(&|| shared.is_closed()) {
            break;
        }

        source.on_next_frame(&mut |display_index, pixels| {
            let outcome = maker.make_stripes(display_index, pixels, |stripe| {
                shared.stripes.push(stripe);
            });
            if let FrameOutcome::Produced { stripes, .. } = outcome {
                shared.frames_produced.fetch_add(1, Ordering::Relaxed);
                shared.stripes_produced.fetch_add(stripes as u64, Ordering::Relaxed);
            }
        });
    }

    info!(
        "Stripe maker exiting after {} frame(s)",
        shared.frames_produced.load(Ordering::Relaxed)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::ClientTracker;
    use framestripe_core::{DisplayGeometry, ScreenOrientation};
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    /// Packed 1-byte-per-pixel source that counts capture requests.
    struct CountingSource {
        geometry:  DisplayGeometry,
        captures:  AtomicUsize,
        connected: Mutex<Vec<bool>>,
        delay:     Duration,
    }

    impl CountingSource {
        fn new(width: u32, height: u32, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                geometry: DisplayGeometry::packed(width, height, 1).unwrap(),
                captures: AtomicUsize::new(0),
                connected: Mutex::new(Vec::new()),
                delay,
            })
        }

        fn captures(&self) -> usize {
            self.captures.load(Ordering::SeqCst)
        }
    }

    impl FrameSource for CountingSource {
        fn geometry(&self, _display_index: u32) -> DisplayGeometry {
            self.geometry
        }

        fn on_next_frame(&self, callback: &mut framestripe_capture::FrameCallback<'_>) {
            std::thread::sleep(self.delay);
            let n = self.captures.fetch_add(1, Ordering::SeqCst);
            let frame = vec![n as u8; self.geometry.size_bytes];
            callback(0, &frame);
        }

        fn report_clients_connected(&self, connected: bool) {
            self.connected.lock().unwrap().push(connected);
        }
    }

    /// Gate that counts how often the producer checks for presence.
    struct CountingGate {
        inner:  ClientTracker,
        checks: AtomicUsize,
    }

    impl PresenceGate for CountingGate {
        fn wait_for_client(&self, cancelled: &dyn Fn() -> bool) -> bool {
            self.checks.fetch_add(1, Ordering::SeqCst);
            self.inner.wait_for_client(cancelled)
        }

        fn set_clients_connected(&self, connected: bool) {
            self.inner.set_clients_connected(connected);
        }

        fn wake_waiters(&self) {
            self.inner.wake_waiters();
        }
    }

    fn config(num_stripes: u32, queue_capacity: usize) -> ComposerConfig {
        ComposerConfig { num_stripes, queue_capacity, ..Default::default() }
    }

    fn connected_tracker() -> Arc<ClientTracker> {
        let tracker = Arc::new(ClientTracker::new());
        tracker.register_client();
        tracker
    }

    #[test]
    fn rejects_invalid_configuration_before_starting() {
        let source = CountingSource::new(4, 4, Duration::ZERO);
        let tracker = connected_tracker();

        let err = Composer::new(&config(0, 16), tracker.clone(), source.clone()).err();
        assert!(matches!(err, Some(FrameStripeError::ConfigurationInvalid { .. })));

        let err = Composer::new(&config(4, 0), tracker, source.clone()).err();
        assert!(matches!(err, Some(FrameStripeError::ConfigurationInvalid { .. })));
        assert_eq!(source.captures(), 0);
    }

    #[test]
    fn rejects_invalid_source_geometry() {
        let source = CountingSource::new(0, 4, Duration::ZERO);
        let err = Composer::new(&config(2, 16), connected_tracker(), source).err();
        assert!(matches!(err, Some(FrameStripeError::InvalidGeometry(_))));
    }

    #[test]
    fn frame_source_fd_is_passed_through_uninterpreted() {
        let source = CountingSource::new(2, 4, Duration::ZERO);
        let with_fd = ComposerConfig { frame_source_fd: Some(-1), ..config(2, 16) };
        let composer = Composer::new(&with_fd, connected_tracker(), source.clone()).unwrap();

        let stripe = composer
            .get_new_stripe_timeout(Duration::from_secs(5))
            .expect("descriptor does not affect production");
        assert_eq!(stripe.index, 0);
        assert!(source.captures() >= 1);
    }

    #[test]
    fn produces_full_frames_in_order() {
        let source = CountingSource::new(2, 10, Duration::from_millis(5));
        let composer = Composer::new(&config(4, 64), connected_tracker(), source).unwrap();
        assert_eq!(composer.number_of_stripes(), 4);

        let stripes: Vec<Stripe> = (0..8).map(|_| composer.get_new_stripe()).collect();

        for (i, stripe) in stripes.iter().enumerate() {
            assert_eq!(stripe.frame_id, (i / 4) as u64);
            assert_eq!(stripe.index, (i % 4) as u32);
            assert_eq!(stripe.orientation, ScreenOrientation::Portrait);
        }
        let heights: Vec<u32> = stripes[..4].iter().map(|s| s.height).collect();
        assert_eq!(heights, vec![2, 2, 2, 4]);
        for pair in stripes.windows(2) {
            assert_eq!(pair[1].seq_number.get(), pair[0].seq_number.get() + 1);
        }
    }

    #[test]
    fn idle_without_clients_then_resumes() {
        let source = CountingSource::new(2, 4, Duration::ZERO);
        let tracker = Arc::new(ClientTracker::new());
        let composer = Composer::new(&config(2, 16), tracker.clone(), source.clone()).unwrap();

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(source.captures(), 0);
        assert!(composer.try_get_new_stripe().is_none());

        tracker.register_client();
        let stripe = composer
            .get_new_stripe_timeout(Duration::from_secs(5))
            .expect("stripe after a client connects");
        assert_eq!(stripe.frame_id, 0);
        assert!(source.captures() >= 1);
    }

    #[test]
    fn one_capture_per_presence_check() {
        let source = CountingSource::new(2, 4, Duration::from_millis(2));
        let gate = Arc::new(CountingGate {
            inner:  ClientTracker::new(),
            checks: AtomicUsize::new(0),
        });
        gate.set_clients_connected(true);
        let mut composer = Composer::new(&config(2, 64), gate.clone(), source.clone()).unwrap();

        std::thread::sleep(Duration::from_millis(50));
        composer.shutdown();

        let checks = gate.checks.load(Ordering::SeqCst);
        let captures = source.captures();
        assert!(captures > 0);
        assert!(
            captures == checks || captures + 1 == checks,
            "checks={checks} captures={captures}"
        );
    }

    #[test]
    fn drop_does_not_hang_while_waiting_for_clients() {
        let source = CountingSource::new(2, 4, Duration::ZERO);
        let tracker = Arc::new(ClientTracker::new());
        let composer = Composer::new(&config(2, 16), tracker, source).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let start = Instant::now();
        drop(composer);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn shutdown_stops_production_and_close_is_idempotent() {
        let source = CountingSource::new(2, 4, Duration::from_millis(1));
        let mut composer =
            Composer::new(&config(2, 1024), connected_tracker(), source.clone()).unwrap();
        assert_eq!(composer.state(), ComposerState::Running);
        assert!(!composer.is_closed());

        composer.get_new_stripe();
        composer.signal_close();
        assert!(composer.is_closed());
        assert_eq!(composer.state(), ComposerState::Closing);

        composer.shutdown();
        assert_eq!(composer.state(), ComposerState::Stopped);

        let stats = composer.stats();
        let captures = source.captures();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(composer.stats(), stats);
        assert_eq!(source.captures(), captures);

        composer.signal_close();
        composer.shutdown();
        assert!(composer.is_closed());
        assert_eq!(composer.state(), ComposerState::Stopped);
    }

    #[test]
    fn overflow_evicts_old_stripes_but_keeps_newest_frame() {
        let source = CountingSource::new(2, 8, Duration::ZERO);
        let mut composer = Composer::new(&config(4, 16), connected_tracker(), source).unwrap();

        while composer.stats().stripes_evicted == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
        composer.shutdown();

        let stats = composer.stats();
        assert!(stats.queued <= 16);
        assert_eq!(stats.stripes_produced, stats.frames_produced * 4);
        assert_eq!(
            stats.stripes_produced - stats.stripes_evicted,
            stats.queued as u64
        );

        let left: Vec<Stripe> = std::iter::from_fn(|| composer.try_get_new_stripe()).collect();
        let last = left.last().expect("queue not empty");
        assert_eq!(last.index, 3);
        let newest: Vec<u32> = left
            .iter()
            .filter(|s| s.frame_id == last.frame_id)
            .map(|s| s.index)
            .collect();
        assert_eq!(newest, vec![0, 1, 2, 3]);
        for pair in left.windows(2) {
            assert!(pair[1].seq_number > pair[0].seq_number);
        }
    }

    #[test]
    fn reports_connectivity_to_the_source_only() {
        let source = CountingSource::new(2, 4, Duration::ZERO);
        let tracker = Arc::new(ClientTracker::new());
        let composer = Composer::new(&config(2, 16), tracker.clone(), source.clone()).unwrap();

        composer.report_clients_connected(true);
        composer.report_clients_connected(false);

        assert_eq!(*source.connected.lock().unwrap(), vec![true, false]);
        assert_eq!(tracker.client_count(), 0);
    }

    #[test]
    fn concurrent_consumers_share_the_stream() {
        let source = CountingSource::new(2, 8, Duration::from_millis(1));
        let composer =
            Arc::new(Composer::new(&config(4, 1024), connected_tracker(), source).unwrap());

        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let composer = Arc::clone(&composer);
                std::thread::spawn(move || {
                    (0..20).map(|_| composer.get_new_stripe().seq_number).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seqs: Vec<_> = consumers.into_iter().flat_map(|c| c.join().unwrap()).collect();
        let total = seqs.len();
        seqs.sort();
        seqs.dedup();
        assert_eq!(seqs.len(), total);
    }
}

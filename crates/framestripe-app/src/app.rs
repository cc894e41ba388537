use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use framestripe_capture::SyntheticFrameSource;
use framestripe_composer::{ClientTracker, Composer, ComposerStats};
use framestripe_core::StripeSeqNumber;
use tracing::{debug, info, warn};

use crate::config::AppConfig;

/// How long a consumer waits for a stripe before re-checking for close.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Demo host.
///
/// # Flow
/// 1. Build the synthetic display and the client tracker
/// 2. Start the composer (stripe maker parks until a viewer shows up)
/// 3. Spawn one blocking consumer per configured viewer
/// 4. Log throughput once per second until Ctrl-C or `run_seconds`
/// 5. Signal close, drain consumers, join the stripe maker
pub async fn run() -> Result<()> {
    let config = AppConfig::from_env()?;

    let source = Arc::new(
        SyntheticFrameSource::new(config.source.clone()).context("Synthetic frame source")?,
    );
    let tracker = Arc::new(ClientTracker::new());
    let composer = Arc::new(
        Composer::new(&config.composer, tracker.clone(), source.clone()).context("Composer")?,
    );

    info!(
        "Starting {} consumer(s), {} stripes/frame",
        config.consumers,
        composer.number_of_stripes()
    );

    let viewers = Arc::new(AtomicUsize::new(0));
    let consumed = Arc::new(AtomicU64::new(0));
    let mut handles = Vec::with_capacity(config.consumers);
    for id in 0..config.consumers {
        let composer = Arc::clone(&composer);
        let tracker = Arc::clone(&tracker);
        let viewers = Arc::clone(&viewers);
        let consumed = Arc::clone(&consumed);
        handles.push(tokio::task::spawn_blocking(move || {
            run_consumer(id, &composer, &tracker, &viewers, &consumed)
        }));
    }

    // ── Stats ticker until stop ────────────────────────────────────────────
    let deadline = async {
        match config.run_seconds {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut last = ComposerStats::default();
    let mut last_consumed = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, stopping");
                break;
            }
            _ = &mut deadline => {
                info!("Run time elapsed, stopping");
                break;
            }
            _ = ticker.tick() => {
                let stats = composer.stats();
                let total = consumed.load(Ordering::Relaxed);
                info!(
                    "fps={} stripes/s={} consumed/s={} evicted={} queued={}",
                    stats.frames_produced - last.frames_produced,
                    stats.stripes_produced - last.stripes_produced,
                    total - last_consumed,
                    stats.stripes_evicted,
                    stats.queued
                );
                last = stats;
                last_consumed = total;
            }
        }
    }

    // ── Shutdown ───────────────────────────────────────────────────────────
    composer.signal_close();
    for handle in handles {
        handle.await.context("Consumer task")?;
    }

    let stats = composer.stats();
    match Arc::try_unwrap(composer) {
        Ok(mut composer) => {
            tokio::task::spawn_blocking(move || composer.shutdown())
                .await
                .context("Composer shutdown")?;
        }
        Err(_) => warn!("Composer still shared at shutdown"),
    }

    info!(
        "Produced {} frame(s) / {} stripe(s); consumed {}, evicted {}",
        stats.frames_produced,
        stats.stripes_produced,
        consumed.load(Ordering::Relaxed),
        stats.stripes_evicted
    );
    Ok(())
}

// ── Consumer ───────────────────────────────────────────────────────────────────

/// One simulated viewer: registers with the tracker, pulls stripes until the
/// composer closes, then unregisters.
fn run_consumer(
    id: usize,
    composer: &Composer,
    tracker: &ClientTracker,
    viewers: &AtomicUsize,
    consumed: &AtomicU64,
) {
    tracker.register_client();
    if viewers.fetch_add(1, Ordering::AcqRel) == 0 {
        composer.report_clients_connected(true);
    }
    info!("Consumer[{}] attached", id);

    let mut last_seq: Option<StripeSeqNumber> = None;
    let mut skipped = 0u64;
    let mut bytes = 0u64;
    while !composer.is_closed() {
        let Some(stripe) = composer.get_new_stripe_timeout(POLL_INTERVAL) else {
            continue;
        };
        if let Some(prev) = last_seq {
            if stripe.seq_number <= prev {
                warn!("Consumer[{}] out-of-order stripe {} after {}", id, stripe.seq_number, prev);
            }
            skipped += prev.gap_to(stripe.seq_number);
        }
        last_seq = Some(stripe.seq_number);
        bytes += stripe.raw_data.len() as u64;
        consumed.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Consumer[{}] frame={} stripe={} rows={:?} seq={}",
            id,
            stripe.frame_id,
            stripe.index,
            stripe.rows(),
            stripe.seq_number
        );
    }

    tracker.unregister_client();
    if viewers.fetch_sub(1, Ordering::AcqRel) == 1 {
        composer.report_clients_connected(false);
    }
    // With several consumers, `skipped` also counts stripes taken by peers.
    info!(
        "Consumer[{}] detached ({} bytes, {} sequence numbers not seen)",
        id, bytes, skipped
    );
}

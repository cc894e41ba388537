//! Client-presence gate: parks the stripe producer while nobody is watching.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

/// Signal telling the producer whether any viewer is attached.
pub trait PresenceGate: Send + Sync {
    /// Block until at least one client is connected.
    ///
    /// `cancelled` is re-checked every time the gate is woken; once it returns
    /// `true` the wait is abandoned and `false` is returned.
    fn wait_for_client(&self, cancelled: &dyn Fn() -> bool) -> bool;

    /// Mark viewers as attached (`true`) or all gone (`false`).
    fn set_clients_connected(&self, connected: bool);

    /// Wake every waiter so it re-evaluates its cancellation predicate.
    fn wake_waiters(&self);
}

// ── ClientTracker ─────────────────────────────────────────────────────────────

/// Counts attached viewers and implements [`PresenceGate`] on top of the count.
#[derive(Default)]
pub struct ClientTracker {
    clients: Mutex<usize>,
    changed: Condvar,
}

impl ClientTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A viewer attached. Returns the new client count.
    pub fn register_client(&self) -> usize {
        let mut clients = self.lock();
        *clients += 1;
        if *clients == 1 {
            info!("First client connected — resuming frame production");
        }
        self.changed.notify_all();
        *clients
    }

    /// A viewer detached. Returns the new client count.
    pub fn unregister_client(&self) -> usize {
        let mut clients = self.lock();
        *clients = clients.saturating_sub(1);
        if *clients == 0 {
            info!("Last client disconnected — pausing frame production");
        }
        *clients
    }

    pub fn client_count(&self) -> usize {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PresenceGate for ClientTracker {
    fn wait_for_client(&self, cancelled: &dyn Fn() -> bool) -> bool {
        let mut clients = self.lock();
        loop {
            if *clients > 0 {
                return true;
            }
            if cancelled() {
                debug!("wait_for_client cancelled");
                return false;
            }
            clients = self.changed.wait(clients).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn set_clients_connected(&self, connected: bool) {
        let mut clients = self.lock();
        *clients = match (connected, *clients) {
            (true, 0) => 1,
            (true, n) => n,
            (false, _) => 0,
        };
        debug!("set_clients_connected({}) → {} client(s)", connected, *clients);
        self.changed.notify_all();
    }

    fn wake_waiters(&self) {
        // Taking the lock orders this wake-up after any waiter's predicate check.
        let _clients = self.lock();
        self.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[test]
    fn counts_clients() {
        let tracker = ClientTracker::new();
        assert_eq!(tracker.register_client(), 1);
        assert_eq!(tracker.register_client(), 2);
        assert_eq!(tracker.unregister_client(), 1);
        assert_eq!(tracker.unregister_client(), 0);
        assert_eq!(tracker.unregister_client(), 0);
    }

    #[test]
    fn boolean_setter_overrides_count() {
        let tracker = ClientTracker::new();
        tracker.set_clients_connected(true);
        assert_eq!(tracker.client_count(), 1);
        tracker.register_client();
        tracker.set_clients_connected(true);
        assert_eq!(tracker.client_count(), 2);
        tracker.set_clients_connected(false);
        assert_eq!(tracker.client_count(), 0);
    }

    #[test]
    fn returns_immediately_with_a_client() {
        let tracker = ClientTracker::new();
        tracker.register_client();
        assert!(tracker.wait_for_client(&|| false));
    }

    #[test]
    fn waiter_wakes_when_client_registers() {
        let tracker = Arc::new(ClientTracker::new());
        let waiter = {
            let tracker = Arc::clone(&tracker);
            std::thread::spawn(move || {
                let start = Instant::now();
                let connected = tracker.wait_for_client(&|| false);
                (connected, start.elapsed())
            })
        };

        std::thread::sleep(Duration::from_millis(50));
        tracker.register_client();

        let (connected, waited) = waiter.join().unwrap();
        assert!(connected);
        assert!(waited >= Duration::from_millis(40));
    }

    #[test]
    fn cancellation_releases_waiter_without_clients() {
        let tracker = Arc::new(ClientTracker::new());
        let stop = Arc::new(AtomicBool::new(false));
        let waiter = {
            let tracker = Arc::clone(&tracker);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || tracker.wait_for_client(&|| stop.load(Ordering::SeqCst)))
        };

        std::thread::sleep(Duration::from_millis(20));
        stop.store(true, Ordering::SeqCst);
        tracker.wake_waiters();

        assert!(!waiter.join().unwrap());
        assert_eq!(tracker.client_count(), 0);
    }
}

//! Cooperative shutdown for the polling loops.
//!
//! Dropping the only sender disconnects every listener at once, so loops
//! blocked in [`ShutdownListener::wait`] wake immediately instead of sleeping
//! out their interval.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

#[derive(Debug)]
pub struct Shutdown {
    tx: Mutex<Option<Sender<()>>>,
    rx: Receiver<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }

    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.rx.clone(),
        }
    }

    /// Signal every listener. Idempotent.
    pub fn trigger(&self) {
        self.tx.lock().take();
    }

    pub fn is_triggered(&self) -> bool {
        self.tx.lock().is_none()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: Receiver<()>,
}

impl ShutdownListener {
    /// Sleep up to `timeout`. Returns true once shutdown has been signalled.
    pub fn wait(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => false,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.wait(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn wait_times_out_while_running() {
        let shutdown = Shutdown::new();
        let l = shutdown.listener();
        assert!(!l.wait(Duration::from_millis(10)));
        assert!(!shutdown.is_triggered());
    }

    #[test]
    fn trigger_wakes_blocked_listener() {
        let shutdown = Shutdown::new();
        let l = shutdown.listener();
        let started = Instant::now();
        let h = thread::spawn(move || l.wait(Duration::from_secs(30)));
        thread::sleep(Duration::from_millis(20));
        shutdown.trigger();
        assert!(h.join().unwrap());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn trigger_is_idempotent() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        shutdown.trigger();
        assert!(shutdown.listener().is_triggered());
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Background pump polling a network monitor and feeding an event sink.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::event::NetworkEventSink;
use super::monitor::NetworkMonitor;

/// Background thread that polls a [`NetworkMonitor`] on a fixed interval
/// and delivers every event to a [`NetworkEventSink`].
///
/// Call `shutdown()` or let it drop to stop the pump gracefully.
pub struct MonitorPump {
    /// Background thread handle.
    handle: Option<JoinHandle<()>>,

    /// Shutdown signal (set to true to stop the pump).
    shutdown: Arc<AtomicBool>,
}

impl MonitorPump {
    /// Spawn the pump thread.
    ///
    /// Events are delivered on the pump thread; the sink must be safe to
    /// call from there (the auto-binding engine is).
    #[must_use]
    pub fn spawn<M, S>(mut monitor: M, interval: Duration, sink: Arc<S>) -> Self
    where
        M: NetworkMonitor + 'static,
        S: NetworkEventSink + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = Arc::clone(&shutdown);

        let handle = thread::spawn(move || {
            log::debug!("[MonitorPump] started ({})", monitor.name());

            while !shutdown_clone.load(Ordering::Relaxed) {
                match monitor.poll_events() {
                    Ok(events) => {
                        for event in events {
                            sink.handle_event(event);
                        }
                    }
                    Err(e) => {
                        log::warn!("[MonitorPump] poll failed: {}", e);
                    }
                }

                // Sleep in small steps so shutdown stays responsive
                let step = Duration::from_millis(50).min(interval);
                let mut slept = Duration::ZERO;
                while slept < interval && !shutdown_clone.load(Ordering::Relaxed) {
                    thread::sleep(step);
                    slept += step;
                }
            }

            log::debug!("[MonitorPump] stopped");
        });

        Self {
            handle: Some(handle),
            shutdown,
        }
    }

    /// Signal the pump to stop and join the thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MonitorPump {
    fn drop(&mut self) {
        self.stop();
    }
}

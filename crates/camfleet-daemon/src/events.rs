//! Device event routing
//!
//! Drivers report every asynchronous outcome on one tagged event stream. A
//! dedicated pump thread drains it and hands each event to the
//! [`DeviceLink`] registered under the event's token, where it resolves the
//! matching completion signal.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use dashmap::DashMap;
use tracing::{debug, trace};

use camfleet_core::{event_channel, DeviceToken, EventReceiver, EventSender, TaggedEvent};

use crate::device::DeviceLink;

type RouteTable = Arc<DashMap<DeviceToken, Arc<DeviceLink>>>;

/// Allocates tokens and maps them to live device links
#[derive(Clone)]
pub struct EventRouter {
    tx: EventSender,
    routes: RouteTable,
    next_token: Arc<AtomicU64>,
}

impl EventRouter {
    /// Create the router and start its pump thread
    pub fn start() -> std::io::Result<(Self, EventPump)> {
        let (tx, rx) = event_channel();
        let routes: RouteTable = Arc::new(DashMap::new());
        let stop = Arc::new(AtomicBool::new(false));

        let pump_routes = Arc::clone(&routes);
        let pump_stop = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name("camfleet-events".into())
            .spawn(move || pump(rx, pump_routes, pump_stop))?;

        let router = Self {
            tx,
            routes,
            next_token: Arc::new(AtomicU64::new(1)),
        };
        let pump = EventPump {
            stop,
            thread: Some(thread),
        };
        Ok((router, pump))
    }

    /// Sender handed to the driver on open
    pub fn sender(&self) -> &EventSender {
        &self.tx
    }

    /// Register a new link for `identity` under a fresh token
    pub fn register(&self, identity: &str) -> Arc<DeviceLink> {
        let token = DeviceToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        let link = Arc::new(DeviceLink::new(token, identity));
        self.routes.insert(token, Arc::clone(&link));
        trace!(%token, identity, "registered event route");
        link
    }

    pub fn unregister(&self, token: DeviceToken) {
        if self.routes.remove(&token).is_some() {
            trace!(%token, "removed event route");
        }
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }
}

/// Owns the pump thread. Dropping it stops the pump.
pub struct EventPump {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl EventPump {
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for EventPump {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn pump(rx: EventReceiver, routes: RouteTable, stop: Arc<AtomicBool>) {
    loop {
        if stop.load(Ordering::SeqCst) {
            debug!("event pump stopping");
            break;
        }
        // Use recv_timeout to periodically check for shutdown
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(tagged) => dispatch(&routes, tagged),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("event pump: all senders gone");
                break;
            }
        }
    }
}

fn dispatch(routes: &RouteTable, tagged: TaggedEvent) {
    // Clone out of the map so no shard lock is held while handling
    let link = routes.get(&tagged.token).map(|entry| Arc::clone(entry.value()));
    match link {
        Some(link) => link.handle_event(tagged.event),
        None => debug!(token = %tagged.token, event = ?tagged.event, "event for unknown device dropped"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camfleet_core::{ConnectionState, DeviceEvent, DeviceWarning};

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        for _ in 0..100 {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_event_reaches_registered_link() {
        let (router, _pump) = EventRouter::start().unwrap();
        let link = router.register("FX30 (A)");

        router
            .sender()
            .send(TaggedEvent::new(link.token(), DeviceEvent::Connected))
            .unwrap();

        assert!(wait_for(|| link.state() == ConnectionState::Connected));
    }

    #[test]
    fn test_events_are_routed_by_token() {
        let (router, _pump) = EventRouter::start().unwrap();
        let a = router.register("FX30 (A)");
        let b = router.register("FX30 (B)");
        assert_ne!(a.token(), b.token());

        router
            .sender()
            .send(TaggedEvent::new(
                b.token(),
                DeviceEvent::Warning(DeviceWarning::Reconnecting),
            ))
            .unwrap();

        assert!(wait_for(|| b.is_reconnecting()));
        assert!(!a.is_reconnecting());
    }

    #[test]
    fn test_unknown_token_is_dropped() {
        let (router, mut pump) = EventRouter::start().unwrap();
        let link = router.register("FX30 (A)");
        router.unregister(link.token());
        assert_eq!(router.route_count(), 0);

        router
            .sender()
            .send(TaggedEvent::new(link.token(), DeviceEvent::Connected))
            .unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(link.state(), ConnectionState::Disconnected);

        pump.shutdown();
    }
}

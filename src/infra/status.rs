//! In-process server-status collaborator.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::core::capability::{ServerStatus, StatusSnapshot};

/// Status flags set by whoever knows them; refresh requests are only counted.
#[derive(Debug, Default)]
pub struct StaticServerStatus {
    online: AtomicBool,
    server_reachable: AtomicBool,
    refreshes: AtomicUsize,
}

impl StaticServerStatus {
    /// Status with the given initial flags.
    pub const fn new(online: bool, server_reachable: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
            server_reachable: AtomicBool::new(server_reachable),
            refreshes: AtomicUsize::new(0),
        }
    }

    /// Update internet reachability.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
    }

    /// Update server reachability.
    pub fn set_server_reachable(&self, reachable: bool) {
        self.server_reachable.store(reachable, Ordering::Release);
    }

    /// How many refreshes were requested.
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::Acquire)
    }
}

impl ServerStatus for StaticServerStatus {
    fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            online: self.online.load(Ordering::Acquire),
            server_reachable: self.server_reachable.load(Ordering::Acquire),
        }
    }

    fn request_refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::AcqRel);
    }
}

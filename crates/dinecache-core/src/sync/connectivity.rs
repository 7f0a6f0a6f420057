use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

/// Last known reachability of the review server, shared between the router
/// and the replayer. Starts out online.
#[derive(Debug, Clone)]
pub struct Connectivity {
    online: Arc<AtomicBool>,
}

impl Default for Connectivity {
    fn default() -> Self {
        Self {
            online: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl Connectivity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    pub fn mark_online(&self) {
        if !self.online.swap(true, Ordering::Relaxed) {
            info!("Review server reachable again");
        }
    }

    pub fn mark_offline(&self) {
        if self.online.swap(false, Ordering::Relaxed) {
            info!("Review server unreachable, working offline");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let connectivity = Connectivity::new();
        let other = connectivity.clone();
        assert!(other.is_online());
        connectivity.mark_offline();
        assert!(!other.is_online());
        other.mark_online();
        assert!(connectivity.is_online());
    }
}

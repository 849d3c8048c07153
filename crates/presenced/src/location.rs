//! Session-wide cached geolocation.

use presence_hw::{Coordinates, GeolocationSource};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Position fetched once, lazily, and reused by every cycle.
///
/// Acquisition is fire-and-forget: it never gates a capture, and a cycle
/// that starts before a fix arrives uses [`Coordinates::UNKNOWN`].
#[derive(Clone)]
pub struct LocationCache {
    source: Arc<dyn GeolocationSource>,
    slot: Arc<OnceLock<Coordinates>>,
    requested: Arc<AtomicBool>,
}

impl LocationCache {
    pub fn new(source: Arc<dyn GeolocationSource>) -> Self {
        Self {
            source,
            slot: Arc::new(OnceLock::new()),
            requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the one-shot lookup on a blocking worker. Later calls are no-ops.
    pub fn acquire(&self) {
        if self.requested.swap(true, Ordering::SeqCst) {
            return;
        }
        let source = self.source.clone();
        let slot = self.slot.clone();
        tokio::task::spawn_blocking(move || match source.get_position() {
            Ok(coords) => {
                tracing::info!(%coords, "location acquired");
                let _ = slot.set(coords);
            }
            Err(err) => tracing::warn!(error = %err, "location unavailable; using 0,0"),
        });
    }

    /// The cached position, or the sentinel if none was acquired.
    pub fn snapshot(&self) -> Coordinates {
        self.known().unwrap_or(Coordinates::UNKNOWN)
    }

    pub fn known(&self) -> Option<Coordinates> {
        self.slot.get().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CountingLocation;
    use presence_hw::NoLocation;
    use std::time::Duration;

    #[tokio::test]
    async fn test_acquires_once() {
        let source = Arc::new(CountingLocation::at(-6.2, 106.8));
        let cache = LocationCache::new(source.clone());
        assert_eq!(cache.snapshot(), Coordinates::UNKNOWN);

        cache.acquire();
        cache.acquire();
        for _ in 0..50 {
            if cache.known().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(cache.snapshot(), Coordinates::new(-6.2, 106.8).unwrap());
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_falls_back_to_sentinel() {
        let cache = LocationCache::new(Arc::new(NoLocation));
        cache.acquire();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.known().is_none());
        assert_eq!(cache.snapshot(), Coordinates::UNKNOWN);
    }
}

//! Map handle capability and viewport reads.
//!
//! The map widget is an external collaborator. The core only needs two things
//! from it: the current bounds, read synchronously, and a "camera settled"
//! notification. Viewport unavailability is an expected state, never an error
//! that escapes this module.

use foundation::bounds::GeoBounds;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    #[error("map is not ready")]
    NotReady,
    #[error("map bounds read failed: {0}")]
    Read(String),
}

/// Camera movement settled.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MoveEnd;

pub trait MapHandle: Send + Sync {
    fn bounds(&self) -> Result<GeoBounds, MapError>;

    /// Subscribe to move-end notifications. Dropping the receiver unsubscribes.
    fn subscribe_move_end(&self) -> broadcast::Receiver<MoveEnd>;
}

/// Current viewport, or `None` when no query may be issued yet.
pub fn read_viewport(map: Option<&dyn MapHandle>) -> Option<GeoBounds> {
    let Some(map) = map else {
        debug!("viewport unavailable: no map attached");
        return None;
    };
    match map.bounds() {
        Ok(bounds) if bounds.is_valid() => Some(bounds),
        Ok(bounds) => {
            debug!("viewport unavailable: invalid bounds {bounds:?}");
            None
        }
        Err(e) => {
            debug!("viewport unavailable: {e}");
            None
        }
    }
}

/// In-process map handle with settable bounds.
///
/// Stands in for a real map widget in headless runs and tests.
pub struct StaticMap {
    bounds: RwLock<Option<GeoBounds>>,
    move_end: broadcast::Sender<MoveEnd>,
}

impl StaticMap {
    pub fn new() -> Self {
        let (move_end, _) = broadcast::channel(16);
        Self {
            bounds: RwLock::new(None),
            move_end,
        }
    }

    pub fn with_bounds(bounds: GeoBounds) -> Self {
        let map = Self::new();
        *map.bounds.write() = Some(bounds);
        map
    }

    /// Pan/zoom to `bounds` and fire move-end.
    pub fn move_to(&self, bounds: GeoBounds) {
        *self.bounds.write() = Some(bounds);
        let _ = self.move_end.send(MoveEnd);
    }

    /// Fire move-end without changing the bounds.
    pub fn settle(&self) {
        let _ = self.move_end.send(MoveEnd);
    }

    /// Simulate a map that has not finished loading.
    pub fn unload(&self) {
        *self.bounds.write() = None;
    }

    pub fn subscriber_count(&self) -> usize {
        self.move_end.receiver_count()
    }
}

impl Default for StaticMap {
    fn default() -> Self {
        Self::new()
    }
}

impl MapHandle for StaticMap {
    fn bounds(&self) -> Result<GeoBounds, MapError> {
        (*self.bounds.read()).ok_or(MapError::NotReady)
    }

    fn subscribe_move_end(&self) -> broadcast::Receiver<MoveEnd> {
        self.move_end.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenMap;

    impl MapHandle for BrokenMap {
        fn bounds(&self) -> Result<GeoBounds, MapError> {
            Err(MapError::Read("projection not initialised".to_string()))
        }

        fn subscribe_move_end(&self) -> broadcast::Receiver<MoveEnd> {
            broadcast::channel(1).1
        }
    }

    #[test]
    fn unattached_map_is_unavailable() {
        assert_eq!(read_viewport(None), None);
    }

    #[test]
    fn failing_read_is_unavailable_not_an_error() {
        assert_eq!(read_viewport(Some(&BrokenMap)), None);
    }

    #[test]
    fn loaded_map_yields_bounds() {
        let map = StaticMap::new();
        assert_eq!(read_viewport(Some(&map)), None);

        let b = GeoBounds::new(-97.8, 30.2, -97.7, 30.3);
        map.move_to(b);
        assert_eq!(read_viewport(Some(&map)), Some(b));

        map.move_to(GeoBounds::new(f64::NAN, 0.0, 1.0, 1.0));
        assert_eq!(read_viewport(Some(&map)), None);
    }

    #[test]
    fn dropping_receiver_unsubscribes() {
        let map = StaticMap::with_bounds(GeoBounds::new(0.0, 0.0, 1.0, 1.0));
        let rx = map.subscribe_move_end();
        assert_eq!(map.subscriber_count(), 1);
        drop(rx);
        assert_eq!(map.subscriber_count(), 0);
    }
}

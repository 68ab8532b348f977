//! Display directory.
//!
//! Displays are owned by an external catalogue; the engine only reads them.

use crate::error::{BookingError, Result};
use crate::types::{Display, DisplayId};
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

/// Read-only lookup of displays by id.
pub trait DisplayDirectory: Send + Sync {
    /// The display, or `None` if unknown.
    fn get(&self, id: DisplayId) -> Pin<Box<dyn Future<Output = Result<Option<Display>>> + Send + '_>>;
}

/// In-memory directory, populated at startup.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDisplayDirectory {
    displays: Arc<RwLock<HashMap<DisplayId, Display>>>,
}

impl InMemoryDisplayDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a directory holding `displays`.
    #[must_use]
    pub fn with_displays(displays: impl IntoIterator<Item = Display>) -> Self {
        let directory = Self::new();
        for display in displays {
            directory.insert(display);
        }
        directory
    }

    /// Load a JSON array of displays.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Storage`] if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| BookingError::Storage(format!("Failed to read {}: {e}", path.display())))?;
        let displays: Vec<Display> = serde_json::from_str(&contents)
            .map_err(|e| BookingError::Storage(format!("Failed to parse {}: {e}", path.display())))?;
        Ok(Self::with_displays(displays))
    }

    /// Add or replace a display.
    pub fn insert(&self, display: Display) {
        self.displays
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(display.id, display);
    }

    /// Number of known displays
    #[must_use]
    pub fn len(&self) -> usize {
        self.displays
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether the directory is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DisplayDirectory for InMemoryDisplayDirectory {
    fn get(&self, id: DisplayId) -> Pin<Box<dyn Future<Output = Result<Option<Display>>> + Send + '_>> {
        let display = self
            .displays
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&id)
            .cloned();
        Box::pin(async move { Ok(display) })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{AdDuration, Money};

    #[tokio::test]
    async fn test_lookup() {
        let display = Display::new(DisplayId::new(), AdDuration::from_secs(30), Money::from_cents(10_000));
        let directory = InMemoryDisplayDirectory::with_displays([display.clone()]);

        assert_eq!(directory.get(display.id).await.unwrap(), Some(display));
        assert_eq!(directory.get(DisplayId::new()).await.unwrap(), None);
    }

    #[test]
    fn test_displays_parse_from_json() {
        let json = r#"[{
            "id": "6f1c2f4e-8d5a-4c1e-9f0b-2a3d4e5f6a7b",
            "loop_capacity": 30,
            "weekly_rate": 10000,
            "availability": {"active_months": [1, 2, 3]}
        }]"#;
        let displays: Vec<Display> = serde_json::from_str(json).unwrap();
        assert_eq!(displays[0].loop_capacity, AdDuration::from_secs(30));
        assert_eq!(displays[0].availability.as_ref().unwrap().active_months(), &[1, 2, 3]);
    }
}

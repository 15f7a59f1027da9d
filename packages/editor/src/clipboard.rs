//! Process-wide copy/paste slots keyed by definition kind and name.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

#[derive(Debug, Clone, Default)]
pub struct Clipboard {
    slots: Arc<Mutex<HashMap<String, String>>>,
}

impl Clipboard {
    /// A private clipboard, not shared with other documents.
    pub fn new() -> Self {
        Self::default()
    }

    /// The clipboard shared by every document in the process.
    pub fn global() -> Clipboard {
        static GLOBAL: OnceLock<Clipboard> = OnceLock::new();
        GLOBAL.get_or_init(Clipboard::new).clone()
    }

    pub fn set(&self, key: impl Into<String>, payload: impl Into<String>) {
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slots.insert(key.into(), payload.into());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slots.get(key).cloned()
    }

    pub fn clear(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_are_keyed() {
        let clipboard = Clipboard::new();
        clipboard.set("structdoc.Struct.A", "<A />");
        assert_eq!(clipboard.get("structdoc.Struct.A").as_deref(), Some("<A />"));
        assert_eq!(clipboard.get("structdoc.Struct.B"), None);
    }

    #[test]
    fn test_clones_share_slots() {
        let clipboard = Clipboard::new();
        let other = clipboard.clone();
        other.set("k", "v");
        assert_eq!(clipboard.get("k").as_deref(), Some("v"));
        assert!(Clipboard::global().get("structdoc.test.unused").is_none());
    }
}

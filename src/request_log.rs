use std::sync::{Arc, Mutex};

/// Side effects recorded instead of performed in dry-run mode.
///
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RequestLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl RequestLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        let entry = entry.into();
        log::debug!("dry-run: {entry}");
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }

    #[cfg(test)]
    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Return the recorded entries and clear the log.
    pub fn drain(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|mut entries| std::mem::take(&mut *entries))
            .unwrap_or_default()
    }
}

// memory.rs — Per-connection bounded history of prior critique
// instructions, used to keep the model from repeating itself.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Opaque identifier for one active client connection.
pub type ConnectionId = u64;

/// How many prior instructions are kept per connection.
pub const MAX_INSTRUCTIONS: usize = 3;

/// Bounded per-connection instruction history.
///
/// ## Ownership & thread-safety
/// One instance lives in the server and is shared across connection tasks.
/// A plain `Mutex` is enough: every operation copies in or out and the
/// critical sections are tiny. Entries exist only for the lifetime of the
/// process and are removed on disconnect.
pub struct InstructionMemory {
    entries: Mutex<HashMap<ConnectionId, VecDeque<String>>>,
}

impl Default for InstructionMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl InstructionMemory {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Prior instructions for `connection`, oldest first. Empty if none
    /// have been recorded.
    pub fn get(&self, connection: ConnectionId) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .get(&connection)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Record `text` as the newest instruction for `connection`, evicting
    /// the oldest entry once the bound is exceeded.
    pub fn append(&self, connection: ConnectionId, text: String) {
        let mut entries = self.entries.lock().unwrap();
        let history = entries.entry(connection).or_default();
        history.push_back(text);
        while history.len() > MAX_INSTRUCTIONS {
            history.pop_front();
        }
    }

    /// Drop all history for `connection`. Idempotent.
    pub fn clear(&self, connection: ConnectionId) {
        self.entries.lock().unwrap().remove(&connection);
    }
}

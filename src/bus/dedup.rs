//! Consecutive-duplicate filter for incoming payloads.

/// Remembers the last admitted payload and rejects an exact repeat of it.
///
/// Only adjacent repeats are suppressed: `[A, A, B, A]` admits `[A, B, A]`.
/// Comparison is on the raw bytes, so a malformed payload occupies the slot
/// like any other.
#[derive(Debug, Default)]
pub struct Deduplicator {
    last: Option<Vec<u8>>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `payload` differs from the previous one and records it.
    pub fn admit(&mut self, payload: &[u8]) -> bool {
        if self.last.as_deref() == Some(payload) {
            return false;
        }
        self.last = Some(payload.to_vec());
        true
    }
}

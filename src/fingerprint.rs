use std::sync::Arc;

use crate::models::Task;

/// Serialized form of a task list. Two lists are the same snapshot iff their
/// serialized bytes match, so ordering matters.
#[derive(Debug, Clone)]
pub enum Fingerprint {
    Bytes(Vec<u8>),
    /// Serialization failed; compares unequal to everything.
    Unavailable,
}

impl Fingerprint {
    pub fn of(tasks: &[Task]) -> Self {
        match serde_json::to_vec(tasks) {
            Ok(bytes) => Fingerprint::Bytes(bytes),
            Err(error) => {
                log::warn!("could not fingerprint task snapshot: {error}");
                Fingerprint::Unavailable
            }
        }
    }

    pub fn matches(&self, other: &Fingerprint) -> bool {
        match (self, other) {
            (Fingerprint::Bytes(left), Fingerprint::Bytes(right)) => left == right,
            _ => false,
        }
    }
}

/// Last known server state. Cheap to clone; replaced wholesale, never edited.
#[derive(Debug, Clone)]
pub struct Snapshot {
    tasks: Arc<Vec<Task>>,
    fingerprint: Fingerprint,
}

impl Snapshot {
    pub fn new(tasks: Vec<Task>) -> Self {
        let fingerprint = Fingerprint::of(&tasks);
        Self {
            tasks: Arc::new(tasks),
            fingerprint,
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn same_as(&self, other: &Snapshot) -> bool {
        self.fingerprint.matches(&other.fingerprint)
    }
}

//! Container label allocation

use rand::Rng;
use std::collections::HashSet;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const GROUP_LEN: usize = 4;

/// Set of labels currently issued to live containers
///
/// A label is unique among live containers and becomes available again
/// only after [`LabelPool::free`].
#[derive(Debug, Default)]
pub struct LabelPool {
    active: HashSet<String>,
}

impl LabelPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draws a fresh `xxxx-xxxx` label that no live container holds
    pub fn allocate(&mut self) -> String {
        let mut rng = rand::rng();
        loop {
            let label = random_label(&mut rng);
            if self.active.insert(label.clone()) {
                return label;
            }
        }
    }

    /// Releases a label, returning false if it was not issued
    pub fn free(&mut self, label: &str) -> bool {
        self.active.remove(label)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.active.contains(label)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

fn random_label(rng: &mut impl Rng) -> String {
    let mut group = || -> String {
        (0..GROUP_LEN)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect()
    };
    let first = group();
    let second = group();
    format!("{}-{}", first, second)
}

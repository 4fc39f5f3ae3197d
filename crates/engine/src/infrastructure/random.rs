//! Random implementations.

use crate::infrastructure::ports::RandomPort;
use uuid::Uuid;

/// System random - uses real randomness.
pub struct SystemRandom;

impl SystemRandom {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomPort for SystemRandom {
    fn gen_range(&self, min: i32, max: i32) -> i32 {
        use rand::Rng;
        rand::thread_rng().gen_range(min..=max)
    }

    fn gen_uuid(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Replays a fixed sequence of draws, cycling when exhausted.
#[cfg(test)]
pub struct SequenceRandom {
    values: Vec<i32>,
    next: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl SequenceRandom {
    pub fn new(values: Vec<i32>) -> Self {
        Self {
            values,
            next: std::sync::atomic::AtomicUsize::new(0),
        }
    }
}

#[cfg(test)]
impl RandomPort for SequenceRandom {
    fn gen_range(&self, min: i32, max: i32) -> i32 {
        let index = self
            .next
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let value = self.values[index % self.values.len()];
        value.clamp(min, max)
    }

    fn gen_uuid(&self) -> Uuid {
        Uuid::nil()
    }
}

//! Randomised fixture data for request bodies

use rand::Rng;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

const WORDS: &[&str] = &[
    "amber", "brisk", "cedar", "delta", "ember", "fable", "grove", "harbor", "ivory", "jolly",
    "kettle", "lumen", "maple", "nectar", "orbit", "pebble", "quill", "river", "sable", "timber",
    "umber", "velvet", "willow", "yonder", "zephyr", "atlas", "bloom", "canyon", "drift", "echo",
];

/// Source of generated test data
///
/// Implementations only need to honour the requested sizes; content is
/// arbitrary.
pub trait Fixtures: Send + Sync {
    /// Exactly `len` ASCII letters
    fn alpha(&self, len: usize) -> String;
    /// `count` space-separated words
    fn words(&self, count: usize) -> String;
    /// A short phrase that fits comfortably in a 50 character title
    fn sentence(&self) -> String;
    /// Integer in `0..=max`
    fn int(&self, max: u64) -> u64;
}

/// Fixtures backed by the thread-local RNG
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomFixtures;

impl Fixtures for RandomFixtures {
    fn alpha(&self, len: usize) -> String {
        let mut rng = rand::rng();
        (0..len)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect()
    }

    fn words(&self, count: usize) -> String {
        let mut rng = rand::rng();
        (0..count)
            .map(|_| WORDS[rng.random_range(0..WORDS.len())])
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn sentence(&self) -> String {
        let count = rand::rng().random_range(2..=4);
        self.words(count)
    }

    fn int(&self, max: u64) -> u64 {
        rand::rng().random_range(0..=max)
    }
}

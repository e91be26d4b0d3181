//! Seeded generator for pronounceable names and filler content.
//!
//! Builds words from consonant/vowel syllables so generated paths stay
//! readable in logs. Everything is driven by the caller's RNG, which keeps
//! a stress run reproducible from its seed.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

const CONSONANTS: &[char] = &[
    'b', 'd', 'f', 'g', 'k', 'l', 'm', 'n', 'p', 'r', 't', 'v', 'y', 'z',
];
const VOWELS: &[char] = &['a', 'e', 'i', 'o', 'u'];
const CODAS: &[char] = &['k', 'l', 'r', 'x'];

// Process-wide suffix so two agents can never generate the same fresh path.
static UNIQUE: AtomicU64 = AtomicU64::new(0);

/// Syllable-based word generator with path shape limits.
#[derive(Debug, Clone)]
pub struct Syllabary {
    max_depth: usize,
    max_name_syllables: usize,
}

impl Syllabary {
    /// `max_depth` bounds the number of path segments, `max_name_syllables`
    /// the length of each segment. Both are clamped to at least one.
    pub fn new(max_depth: usize, max_name_syllables: usize) -> Self {
        Self {
            max_depth: max_depth.max(1),
            max_name_syllables: max_name_syllables.max(1),
        }
    }

    fn syllable(&self, rng: &mut StdRng) -> String {
        let mut s = String::new();
        s.push(*CONSONANTS.choose(rng).unwrap_or(&'b'));
        s.push(*VOWELS.choose(rng).unwrap_or(&'a'));
        s
    }

    /// A word of up to `max_syllables` syllables, occasionally closed with
    /// a coda consonant.
    pub fn word(&self, rng: &mut StdRng, max_syllables: usize) -> String {
        let count = rng.gen_range(1..=max_syllables.max(1));
        let mut word = String::new();
        for _ in 0..count {
            word.push_str(&self.syllable(rng));
        }
        if rng.gen_ratio(1, 4) {
            word.push(*CODAS.choose(rng).unwrap_or(&'x'));
        }
        word
    }

    /// A random relative file path within the configured depth.
    pub fn file_path(&self, rng: &mut StdRng) -> String {
        let segments = rng.gen_range(1..=self.max_depth);
        let parts: Vec<String> = (0..segments)
            .map(|_| self.word(rng, self.max_name_syllables))
            .collect();
        parts.join("/")
    }

    /// A random file path that no other caller will produce again.
    pub fn unique_file_path(&self, rng: &mut StdRng) -> String {
        let n = UNIQUE.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", self.file_path(rng))
    }

    fn sentence(&self, rng: &mut StdRng, max_words: usize) -> String {
        let count = rng.gen_range(1..=max_words.max(1));
        let mut words: Vec<String> = (0..count).map(|_| self.word(rng, 4)).collect();
        if let Some(first) = words.first_mut() {
            let mut chars = first.chars();
            if let Some(head) = chars.next() {
                *first = head.to_uppercase().collect::<String>() + chars.as_str();
            }
        }
        words.join(" ") + "."
    }

    fn paragraph(&self, rng: &mut StdRng, max_sentences: usize) -> String {
        let count = rng.gen_range(1..=max_sentences.max(1));
        (0..count)
            .map(|_| self.sentence(rng, 8))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Multi-paragraph filler content.
    pub fn content(&self, rng: &mut StdRng) -> String {
        let paragraphs = rng.gen_range(1..=4);
        (0..paragraphs)
            .map(|_| self.paragraph(rng, 5))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn same_seed_same_words() {
        let words = Syllabary::new(3, 2);
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            assert_eq!(words.file_path(&mut a), words.file_path(&mut b));
        }
    }

    #[test]
    fn paths_respect_depth_limit() {
        let words = Syllabary::new(3, 2);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let path = words.file_path(&mut rng);
            assert!(path.split('/').count() <= 3);
            assert!(!path.contains("//"));
            assert!(!path.is_empty());
        }
    }

    #[test]
    fn unique_paths_do_not_collide() {
        let words = Syllabary::new(2, 1);
        let mut rng = StdRng::seed_from_u64(2);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            assert!(seen.insert(words.unique_file_path(&mut rng)));
        }
    }

    #[test]
    fn content_is_non_empty_text() {
        let words = Syllabary::new(2, 2);
        let mut rng = StdRng::seed_from_u64(3);
        let content = words.content(&mut rng);
        assert!(!content.is_empty());
        assert!(content.ends_with('.'));
    }
}

//! Deterministic value generation shared by the server (populating replicas)
//! and the client (verifying replies).

/// Bytes per value word.
pub const WORD_SIZE: usize = 8;

/// Returns the expected content of word `word_idx` in the value of `key`.
#[inline]
pub fn value_at(key: u64, word_idx: u64) -> u64 {
    key.wrapping_mul(100).wrapping_add(word_idx.wrapping_mul(8))
}

/// Number of whole words that fit in a value of `value_size` bytes. A
/// trailing partial word is never generated, sent, or verified.
#[inline]
pub fn words_per_value(value_size: usize) -> usize {
    value_size / WORD_SIZE
}

/// Checks a received value against the codec. Returns the index of the first
/// mismatching word, or `None` if every word matches.
pub fn first_mismatch(key: u64, words: &[u64]) -> Option<usize> {
    words
        .iter()
        .enumerate()
        .position(|(w, &word)| word != value_at(key, w as u64))
}

//! Seeded profile mutation
//!
//! [`Mutator`] damages serialized profiles in the ways hostile files do:
//! flipped bits, extreme directory words, truncation and duplicated
//! entries. [`exercise`] then runs the damaged bytes through everything a
//! consumer would call.

use std::sync::Arc;

use iccmm_core::icc::{HEADER_SIZE, TAG_ENTRY_SIZE};
use iccmm_core::{Cmm, CmmConfig, IccProfile, XformOptions};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::patterns::hostile_values;

/// Words that tend to break size and offset arithmetic
const EXTREME_WORDS: [u32; 6] = [0, 1, 0x7FFF_FFFF, 0x8000_0000, 0xFFFF_FFF0, 0xFFFF_FFFF];

/// Ways a profile gets damaged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    FlipBit,
    RandomByte,
    /// Overwrite an aligned word with an extreme value
    ExtremeWord,
    /// Overwrite a tag directory offset or size
    DirectoryWord,
    /// Copy one directory entry over another
    DuplicateEntry,
    Truncate,
}

impl Mutation {
    pub const ALL: [Mutation; 6] = [
        Mutation::FlipBit,
        Mutation::RandomByte,
        Mutation::ExtremeWord,
        Mutation::DirectoryWord,
        Mutation::DuplicateEntry,
        Mutation::Truncate,
    ];
}

/// Deterministic byte mutator
#[derive(Debug)]
pub struct Mutator {
    rng: ChaCha8Rng,
}

impl Mutator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Apply one to three random mutations to a copy of `bytes`
    pub fn mutate(&mut self, bytes: &[u8]) -> Vec<u8> {
        let mut out = bytes.to_vec();
        let rounds = self.rng.gen_range(1..=3);
        for _ in 0..rounds {
            let mutation = Mutation::ALL[self.rng.gen_range(0..Mutation::ALL.len())];
            self.apply(mutation, &mut out);
        }
        out
    }

    /// Apply `mutation` in place
    pub fn apply(&mut self, mutation: Mutation, bytes: &mut Vec<u8>) {
        if bytes.is_empty() {
            return;
        }
        match mutation {
            Mutation::FlipBit => {
                let at = self.rng.gen_range(0..bytes.len());
                bytes[at] ^= 1u8 << self.rng.gen_range(0..8u32);
            }
            Mutation::RandomByte => {
                let at = self.rng.gen_range(0..bytes.len());
                bytes[at] = self.rng.r#gen();
            }
            Mutation::ExtremeWord => {
                if bytes.len() >= 4 {
                    let at = self.rng.gen_range(0..bytes.len() / 4) * 4;
                    let word = EXTREME_WORDS[self.rng.gen_range(0..EXTREME_WORDS.len())];
                    bytes[at..at + 4].copy_from_slice(&word.to_be_bytes());
                }
            }
            Mutation::DirectoryWord => {
                let count = directory_len(bytes);
                if count > 0 {
                    let entry = self.rng.gen_range(0..count);
                    // offset or size, never the signature
                    let field = self.rng.gen_range(1..3);
                    let at = HEADER_SIZE + 4 + entry * TAG_ENTRY_SIZE + field * 4;
                    let word = if self.rng.gen_bool(0.5) {
                        EXTREME_WORDS[self.rng.gen_range(0..EXTREME_WORDS.len())]
                    } else {
                        self.rng.gen_range(0..bytes.len() as u32 + 64)
                    };
                    bytes[at..at + 4].copy_from_slice(&word.to_be_bytes());
                }
            }
            Mutation::DuplicateEntry => {
                let count = directory_len(bytes);
                if count > 1 {
                    let from = self.rng.gen_range(0..count);
                    let to = self.rng.gen_range(0..count);
                    let base = HEADER_SIZE + 4;
                    let src = base + from * TAG_ENTRY_SIZE;
                    bytes.copy_within(src..src + TAG_ENTRY_SIZE, base + to * TAG_ENTRY_SIZE);
                }
            }
            Mutation::Truncate => {
                let keep = self.rng.gen_range(0..bytes.len());
                bytes.truncate(keep);
            }
        }
    }
}

/// Directory entries that lie wholly inside `bytes`
fn directory_len(bytes: &[u8]) -> usize {
    let Some(raw) = bytes.get(HEADER_SIZE..HEADER_SIZE + 4) else {
        return 0;
    };
    let declared = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
    let room = (bytes.len() - HEADER_SIZE - 4) / TAG_ENTRY_SIZE;
    declared.min(room)
}

/// What a damaged profile let a consumer do
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exercise {
    pub attached: bool,
    pub valid: bool,
    pub tags_read: usize,
    pub tags_failed: usize,
    pub chain_built: bool,
    pub samples_applied: usize,
}

/// Attach, validate, read every tag, then build a one-profile chain and
/// push ordinary and hostile samples through it
///
/// Every failure is an expected outcome here; only a panic is a bug.
pub fn exercise(bytes: &[u8]) -> Exercise {
    let mut result = Exercise::default();
    let profile = match IccProfile::from_bytes(bytes) {
        Ok(profile) => Arc::new(profile),
        Err(err) => {
            debug!("attach rejected mutated profile: {}", err);
            return result;
        }
    };
    result.attached = true;
    result.valid = profile.validate().is_valid();
    let _ = profile.describe(100);

    for entry in profile.entries() {
        match profile.find_tag(entry.signature) {
            Ok(tag) => {
                result.tags_read += 1;
                let _ = tag.describe(100);
            }
            Err(_) => result.tags_failed += 1,
        }
    }

    let mut cmm = Cmm::new(CmmConfig::default());
    let built = cmm
        .add_transform(Arc::clone(&profile), &XformOptions::default())
        .and_then(|_| cmm.begin());
    if let Err(err) = built {
        debug!("no chain from mutated profile: {}", err);
        return result;
    }
    result.chain_built = true;

    let (n_in, n_out) = (cmm.src_channels(), cmm.dst_channels());
    let mut dst = vec![0.0f32; n_out];
    let mut samples: Vec<Vec<f32>> = [0.0, 0.5, 1.0].iter().map(|&v| vec![v; n_in]).collect();
    samples.extend(hostile_values().iter().map(|&v| vec![v; n_in]));
    for src in &samples {
        if cmm.apply(&mut dst, src).is_ok() {
            result.samples_applied += 1;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ProfileBuilder;

    #[test]
    fn test_mutator_is_seeded() {
        let bytes = ProfileBuilder::display_rgb().bytes().unwrap();
        let a = Mutator::new(9).mutate(&bytes);
        let b = Mutator::new(9).mutate(&bytes);
        assert_eq!(a, b);
    }

    #[test]
    fn test_directory_word_stays_in_directory() {
        let bytes = ProfileBuilder::gray().bytes().unwrap();
        let mut mutator = Mutator::new(3);
        for _ in 0..50 {
            let mut copy = bytes.clone();
            mutator.apply(Mutation::DirectoryWord, &mut copy);
            assert_eq!(copy.len(), bytes.len());
            assert_eq!(&copy[..HEADER_SIZE + 4], &bytes[..HEADER_SIZE + 4]);
        }
    }

    #[test]
    fn test_exercise_clean_profile() {
        let bytes = ProfileBuilder::display_rgb().bytes().unwrap();
        let outcome = exercise(&bytes);
        assert!(outcome.attached);
        assert!(outcome.valid);
        assert_eq!(outcome.tags_failed, 0);
        assert!(outcome.chain_built);
        assert_eq!(outcome.samples_applied, 3 + hostile_values().len());
    }

    #[test]
    fn test_exercise_garbage() {
        assert_eq!(exercise(&[0u8; 64]), Exercise::default());
    }
}

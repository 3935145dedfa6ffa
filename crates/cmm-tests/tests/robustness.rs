//! Mutated Profile Fuzzing
//!
//! Seeded damage to every synthetic profile. Attach may refuse, tags may
//! fail to read and chains may not build, but nothing may panic and a
//! chain that builds must keep applying.

use cmm_tests::{Mutator, ProfileBuilder, exercise, init_tracing};
use iccmm_core::mpe::calculator::{Op, ops};
use iccmm_core::{ColorSpace, IccProfile, textual};
use rayon::prelude::*;

const ROUNDS: usize = 300;

fn seeds() -> Vec<Vec<u8>> {
    [
        ProfileBuilder::display_rgb(),
        ProfileBuilder::gray(),
        ProfileBuilder::cmyk_printer(),
        ProfileBuilder::device_link(ColorSpace::Rgb, ColorSpace::Cmyk),
        ProfileBuilder::identity_abstract(ColorSpace::Lab),
        ProfileBuilder::calculator(
            ColorSpace::Rgb,
            ColorSpace::Xyz,
            vec![Op::with_st(ops::IN, 0, 2), Op::with_st(ops::OUT, 0, 2)],
        ),
    ]
    .into_iter()
    .map(|b| b.bytes().unwrap())
    .collect()
}

#[test]
fn mutated_profiles_never_panic() {
    init_tracing();
    let seeds = seeds();
    let totals = seeds
        .par_iter()
        .enumerate()
        .map(|(i, bytes)| {
            let mut mutator = Mutator::new(0x1CC0 + i as u64);
            let mut attached = 0;
            let mut built = 0;
            for _ in 0..ROUNDS {
                let damaged = mutator.mutate(bytes);
                let outcome = exercise(&damaged);
                attached += usize::from(outcome.attached);
                if outcome.chain_built {
                    built += 1;
                    assert!(outcome.samples_applied > 0);
                }
            }
            (attached, built)
        })
        .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1 + b.1));

    eprintln!("mutated profiles: {} attached, {} built chains", totals.0, totals.1);
    // damage past the header leaves it attachable
    assert!(totals.0 > 0);
}

#[test]
fn mutated_profiles_rewrite_or_refuse() {
    for (i, bytes) in seeds().iter().enumerate() {
        let mut mutator = Mutator::new(0xBEEF + i as u64);
        for _ in 0..ROUNDS / 3 {
            let damaged = mutator.mutate(bytes);
            let Ok(profile) = IccProfile::from_bytes(&damaged) else {
                continue;
            };
            // writing fails when a payload lies outside the source
            if let Ok(rewritten) = profile.to_bytes() {
                let again = IccProfile::from_bytes(&rewritten).unwrap();
                assert_eq!(again.entries().len(), profile.entries().len());
                assert_eq!(rewritten.len() % 4, 0);
            }
            let _ = textual::save(&profile);
        }
    }
}

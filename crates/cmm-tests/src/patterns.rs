//! Sample pattern generation
//!
//! Interleaved `f32` buffers for driving a chain with any channel count.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Sample pattern types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplePattern {
    /// Every channel ramps from 0 to 1 together
    Ramp,
    /// Corners of the unit cube, cycled
    Corners,
    /// Uniform values in `[0, 1]` from a seed
    Random(u64),
    /// Uniform values in `[-1, 2]` from a seed
    OutOfRange(u64),
    /// All zeros
    Black,
    /// All ones
    White,
}

/// Generate `count` samples of `channels` values each
pub fn generate_samples(pattern: SamplePattern, count: usize, channels: usize) -> Vec<f32> {
    let mut data = vec![0.0f32; count * channels];
    if channels == 0 {
        return data;
    }

    match pattern {
        SamplePattern::Ramp => {
            let step = (count.max(2) - 1) as f32;
            for (i, sample) in data.chunks_exact_mut(channels).enumerate() {
                sample.fill(i as f32 / step);
            }
        }
        SamplePattern::Corners => {
            let corners = 1usize << channels.min(16);
            for (i, sample) in data.chunks_exact_mut(channels).enumerate() {
                let corner = i % corners;
                for (c, v) in sample.iter_mut().enumerate() {
                    *v = if (corner >> c) & 1 == 1 { 1.0 } else { 0.0 };
                }
            }
        }
        SamplePattern::Random(seed) => {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            data.iter_mut().for_each(|v| *v = rng.r#gen::<f32>());
        }
        SamplePattern::OutOfRange(seed) => {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            data.iter_mut().for_each(|v| *v = rng.gen_range(-1.0..=2.0));
        }
        SamplePattern::Black => {}
        SamplePattern::White => data.fill(1.0),
    }

    data
}

/// Values a transform must survive without panicking
pub fn hostile_values() -> [f32; 9] {
    [
        f32::NAN,
        f32::INFINITY,
        f32::NEG_INFINITY,
        f32::MAX,
        f32::MIN,
        f32::MIN_POSITIVE,
        -0.0,
        1.0e-40,
        -1.0e30,
    ]
}

/// Every `channels`-wide sample built from hostile values, plus a
/// shuffled set mixing them with ordinary ones
pub fn hostile_samples(channels: usize, seed: u64) -> Vec<f32> {
    let values = hostile_values();
    let mut data: Vec<f32> = values
        .iter()
        .flat_map(|&v| std::iter::repeat(v).take(channels))
        .collect();

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    for _ in 0..32 * channels {
        let v = if rng.gen_bool(0.5) {
            values[rng.gen_range(0..values.len())]
        } else {
            rng.r#gen::<f32>()
        };
        data.push(v);
    }
    data
}

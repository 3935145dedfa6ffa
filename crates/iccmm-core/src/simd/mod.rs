//! SIMD-dispatched kernels for the apply path
//!
//! Functions are compiled for several instruction sets with the
//! `multiversion` crate and dispatched at runtime. The scalar fallback is
//! always available.
//!
//! Supported instruction sets:
//! - x86-64: SSE4.1, AVX2
//! - ARM64: NEON

use multiversion::multiversion;

/// M × v + offset, with M row-major
#[multiversion(targets("x86_64+avx2", "x86_64+sse4.1", "aarch64+neon",))]
pub fn mat3_mul_add(matrix: &[[f32; 3]; 3], offset: [f32; 3], v: [f32; 3]) -> [f32; 3] {
    [
        matrix[0][0] * v[0] + matrix[0][1] * v[1] + matrix[0][2] * v[2] + offset[0],
        matrix[1][0] * v[0] + matrix[1][1] * v[1] + matrix[1][2] * v[2] + offset[1],
        matrix[2][0] * v[0] + matrix[2][1] * v[1] + matrix[2][2] * v[2] + offset[2],
    ]
}

/// Per-channel scale of interleaved triples, in place
#[multiversion(targets("x86_64+avx2", "x86_64+sse4.1", "aarch64+neon",))]
pub fn scale3_in_place(values: &mut [f32], scale: [f32; 3]) {
    for px in values.chunks_exact_mut(3) {
        px[0] *= scale[0];
        px[1] *= scale[1];
        px[2] *= scale[2];
    }
}

/// Name of the instruction set the kernels dispatch to
pub fn active_features() -> &'static str {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            "AVX2"
        } else if is_x86_feature_detected!("sse4.1") {
            "SSE4.1"
        } else {
            "scalar"
        }
    }
    #[cfg(target_arch = "aarch64")]
    {
        "NEON"
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        "scalar"
    }
}

//! Transform Benchmarks
//!
//! Apply throughput for the three node kinds: matrix/TRC, legacy LUT and
//! multi-process chains with a calculator.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use iccmm_core::icc::tags::{ClutTable, CurveTag, LutCurve, LutPrecision, LutTag, MultiProcessElementTag, XyzTag};
use iccmm_core::mpe::calculator::{Op, ops};
use iccmm_core::mpe::{CalculatorElement, CurveSetElement, Element, ElementRegistry, SegmentedCurve};
use iccmm_core::{Cmm, CmmConfig, ColorSpace, IccHeader, IccProfile, Interpolation, ProfileClass, TagSignature, XformOptions};

const PIXEL_COUNTS: &[usize] = &[1, 256, 4096, 65536];

fn srgb_like() -> IccProfile {
    let header = IccHeader::new(ProfileClass::Display, ColorSpace::Rgb, ColorSpace::Xyz);
    let mut profile = IccProfile::new(header);
    profile.attach_tag(TagSignature::RED_COLORANT, Box::new(XyzTag::new([0.4361, 0.2225, 0.0139])));
    profile.attach_tag(TagSignature::GREEN_COLORANT, Box::new(XyzTag::new([0.3851, 0.7169, 0.0971])));
    profile.attach_tag(TagSignature::BLUE_COLORANT, Box::new(XyzTag::new([0.1431, 0.0606, 0.7141])));
    for sig in [TagSignature::RED_TRC, TagSignature::GREEN_TRC, TagSignature::BLUE_TRC] {
        profile.attach_tag(sig, Box::new(CurveTag::Gamma(2.2)));
    }
    profile
}

/// Lab -> CMYK printer table on a 17-point grid
fn printer_like() -> IccProfile {
    let header = IccHeader::new(ProfileClass::Output, ColorSpace::Cmyk, ColorSpace::Lab);
    let mut profile = IccProfile::new(header);
    let grid = 17usize;
    let data = (0..grid * grid * grid * 4)
        .map(|i| ((i * 37) % 1000) as f32 / 1000.0)
        .collect();
    let mut lut = LutTag::new(LutPrecision::Sixteen);
    lut.input_tables = (0..3).map(|_| LutCurve::identity(256)).collect();
    lut.clut = ClutTable::new(vec![grid as u8; 3], 4, data, 2);
    lut.output_tables = (0..4).map(|_| LutCurve::identity(256)).collect();
    profile.attach_tag(TagSignature::b2a(0), Box::new(lut));
    profile
}

/// RGB -> XYZ through curves and a small calculator program
fn calculator_like() -> IccProfile {
    let registry = Arc::new(ElementRegistry::new());
    let program = vec![
        Op::with_st(ops::IN, 0, 2),
        Op::constant(0.5),
        Op::new(ops::MUL, 0),
        Op::with_st(ops::OUT, 0, 0),
        Op::with_st(ops::IN, 1, 1),
        Op::with_st(ops::OUT, 1, 1),
    ];
    let elements: Vec<Box<dyn Element>> = vec![
        Box::new(CurveSetElement::new(vec![SegmentedCurve::identity(); 3])),
        Box::new(CalculatorElement::with_program(Arc::clone(&registry), 3, 3, program, Vec::new())),
    ];
    let header = IccHeader::new(ProfileClass::ColorSpace, ColorSpace::Rgb, ColorSpace::Xyz);
    let mut profile = IccProfile::new(header);
    profile.attach_tag(
        TagSignature::d2b(0),
        Box::new(MultiProcessElementTag::from_elements(registry, elements)),
    );
    profile
}

fn input(count: usize, channels: usize) -> Vec<f32> {
    (0..count * channels).map(|i| ((i * 37) % 256) as f32 / 255.0).collect()
}

fn bench_chain(c: &mut Criterion, name: &str, cmm: &Cmm) {
    let mut group = c.benchmark_group(name);
    for &count in PIXEL_COUNTS {
        let src = input(count, cmm.src_channels());
        let mut dst = vec![0.0f32; count * cmm.dst_channels()];
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("apply_many", count), &count, |b, _| {
            b.iter(|| cmm.apply_many(black_box(&mut dst), black_box(&src)))
        });
    }
    group.finish();
}

fn bench_matrix_shaper(c: &mut Criterion) {
    let cmm = Cmm::from_profiles(CmmConfig::default(), [srgb_like(), srgb_like()], &XformOptions::default())
        .expect("matrix/TRC chain");
    bench_chain(c, "matrix_shaper_rgb_to_rgb", &cmm);
}

fn bench_lut(c: &mut Criterion) {
    for interpolation in [Interpolation::Tetrahedral, Interpolation::Linear] {
        let options = XformOptions::default().with_interpolation(interpolation);
        let cmm = Cmm::from_profiles(CmmConfig::default(), [srgb_like(), printer_like()], &options)
            .expect("rgb to cmyk chain");
        bench_chain(c, &format!("lut16_rgb_to_cmyk_{:?}", interpolation).to_lowercase(), &cmm);
    }
}

fn bench_calculator(c: &mut Criterion) {
    let options = XformOptions::default().with_use_d2bx(true);
    let cmm = Cmm::from_profiles(CmmConfig::default(), [calculator_like()], &options)
        .expect("calculator chain");
    bench_chain(c, "mpe_calculator", &cmm);
}

fn bench_single_pixel(c: &mut Criterion) {
    let cmm = Cmm::from_profiles(CmmConfig::default(), [srgb_like(), printer_like()], &XformOptions::default())
        .expect("rgb to cmyk chain");
    let mut out = [0.0f32; 4];
    c.bench_function("apply_single_pixel", |b| {
        b.iter(|| cmm.apply(black_box(&mut out), black_box(&[0.2, 0.4, 0.6])))
    });
}

criterion_group!(
    benches,
    bench_matrix_shaper,
    bench_lut,
    bench_calculator,
    bench_single_pixel,
);

criterion_main!(benches);

//! Transform chain
//!
//! A [`Cmm`] collects per-profile transforms, then `begin` locks it and
//! plans the PCS conversions between them. After that it can be applied
//! from any number of threads.
//!
//! ```text
//! Created --add_transform*--> Created --begin--> Ready --apply*-->
//! ```
//!
//! Where the chain itself starts or ends in a PCS, the caller's values
//! use the normalized encodings: Lab as L/100, (a+128)/255, (b+128)/255
//! and XYZ with 1.0 at 1 + 32767/32768.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::TransformError;
use crate::icc::{ColorSpace, IccProfile};
use crate::math::Interpolation;
use crate::mpe::ApplyContext;
use crate::simd;

use super::context::{CmmConfig, Direction, XformOptions};
use super::pcs::{PcsEncoding, PcsLink};
use super::xform::Xform;

/// Most channels a chain carries between stages
pub const MAX_CHANNELS: usize = 16;

/// Where `add_transform` gets its profile from
#[derive(Debug, Clone)]
pub enum ProfileSource {
    /// Already attached, possibly shared with other chains
    Attached(Arc<IccProfile>),
    /// Profile bytes to attach
    Bytes(Vec<u8>),
    /// File to open and attach
    Path(PathBuf),
}

impl From<Arc<IccProfile>> for ProfileSource {
    fn from(profile: Arc<IccProfile>) -> Self {
        Self::Attached(profile)
    }
}

impl From<IccProfile> for ProfileSource {
    fn from(profile: IccProfile) -> Self {
        Self::Attached(Arc::new(profile))
    }
}

impl From<Vec<u8>> for ProfileSource {
    fn from(data: Vec<u8>) -> Self {
        Self::Bytes(data)
    }
}

impl From<PathBuf> for ProfileSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl ProfileSource {
    fn resolve(self) -> Result<Arc<IccProfile>, TransformError> {
        Ok(match self {
            Self::Attached(profile) => profile,
            Self::Bytes(data) => Arc::new(IccProfile::from_bytes(&data)?),
            Self::Path(path) => Arc::new(IccProfile::open(path)?),
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Node(usize),
    Link(PcsLink),
}

/// An ordered chain of profile transforms
#[derive(Debug)]
pub struct Cmm {
    config: CmmConfig,
    profiles: Vec<Arc<IccProfile>>,
    xforms: Vec<Xform>,
    stages: Vec<Stage>,
    next_input: bool,
    begun: bool,
}

impl Default for Cmm {
    fn default() -> Self {
        Self::new(CmmConfig::default())
    }
}

impl Cmm {
    pub fn new(config: CmmConfig) -> Self {
        Self {
            next_input: config.first_input,
            config,
            profiles: Vec::new(),
            xforms: Vec::new(),
            stages: Vec::new(),
            begun: false,
        }
    }

    /// Add every profile with the same options and begin
    pub fn from_profiles<I, S>(config: CmmConfig, profiles: I, options: &XformOptions) -> Result<Self, TransformError>
    where
        I: IntoIterator<Item = S>,
        S: Into<ProfileSource>,
    {
        let mut cmm = Self::new(config);
        for profile in profiles {
            cmm.add_transform(profile, options)?;
        }
        cmm.begin()?;
        Ok(cmm)
    }

    pub fn config(&self) -> &CmmConfig {
        &self.config
    }

    /// Append a transform built from `source`
    ///
    /// On error the chain is left as it was.
    pub fn add_transform(
        &mut self,
        source: impl Into<ProfileSource>,
        options: &XformOptions,
    ) -> Result<(), TransformError> {
        if self.begun {
            return Err(TransformError::AlreadyBegun);
        }
        let profile = source.into().resolve()?;
        let direction = if self.next_input { Direction::Input } else { Direction::Output };
        let index = self.xforms.len();

        let xform = Xform::from_profile(&profile, direction, *options)?;
        xform.check_channels(index)?;

        let prev_space = self.xforms.last().map(Xform::dst_space).or(self.config.src_space);
        if let Some(prev) = prev_space {
            if !prev.is_compatible(&xform.src_space()) {
                return Err(TransformError::BadSpaceLink {
                    from: prev,
                    to: xform.src_space(),
                });
            }
        }
        if let Some(prev) = self.xforms.last() {
            let pcs_link = prev.dst_space().is_pcs() && xform.src_space().is_pcs();
            if !pcs_link && prev.output_channels() != xform.input_channels() {
                return Err(TransformError::ChannelMismatch {
                    index,
                    expected: prev.output_channels(),
                    actual: xform.input_channels(),
                });
            }
        }

        debug!(
            "added transform {}: {:?} {:?} -> {:?}",
            index,
            xform.direction(),
            xform.src_space(),
            xform.dst_space()
        );
        self.next_input = !xform.dst_space().is_pcs();
        self.xforms.push(xform);
        self.profiles.push(profile);
        Ok(())
    }

    /// Finalize the chain. No transforms can be added afterwards.
    pub fn begin(&mut self) -> Result<(), TransformError> {
        if self.begun {
            return Err(TransformError::AlreadyBegun);
        }
        let (Some(first), Some(last)) = (self.xforms.first(), self.xforms.last()) else {
            return Err(TransformError::EmptyChain);
        };

        if let Some(dst) = self.config.dst_space {
            if !last.dst_space().is_compatible(&dst) {
                return Err(TransformError::BadSpaceLink {
                    from: last.dst_space(),
                    to: dst,
                });
            }
        }
        for n in [first.input_channels(), last.output_channels()] {
            if !(1..=MAX_CHANNELS).contains(&n) {
                return Err(TransformError::UnsupportedChannels(n));
            }
        }

        let mut stages = Vec::with_capacity(self.xforms.len() * 2 + 1);
        if let Some(enc) = first.input_encoding() {
            push_link(&mut stages, external(enc), enc, first.input_scale());
        }
        for (i, xform) in self.xforms.iter().enumerate() {
            if let Some(prev) = i.checked_sub(1).map(|p| &self.xforms[p]) {
                if let (Some(from), Some(to)) = (prev.output_encoding(), xform.input_encoding()) {
                    let scale = combine_scales(prev.output_scale(), xform.input_scale());
                    push_link(&mut stages, from, to, scale);
                }
            }
            stages.push(Stage::Node(i));
        }
        if let Some(enc) = last.output_encoding() {
            push_link(&mut stages, enc, external(enc), last.output_scale());
        }

        debug!(
            "chain ready: {} transforms in {} stages, {:?} -> {:?}, kernels {}",
            self.xforms.len(),
            stages.len(),
            first.src_space(),
            last.dst_space(),
            simd::active_features()
        );
        self.stages = stages;
        self.begun = true;
        Ok(())
    }

    /// Run one color through the chain
    ///
    /// `src` holds at least `src_channels()` values and `dst` room for
    /// `dst_channels()`. A calculator fault yields NaN in every output
    /// channel rather than an error.
    pub fn apply(&self, dst: &mut [f32], src: &[f32]) -> Result<(), TransformError> {
        if !self.begun {
            return Err(TransformError::NotBegun);
        }
        let (n_in, n_out) = (self.src_channels(), self.dst_channels());
        if src.len() < n_in {
            return Err(TransformError::BufferSize { expected: n_in, actual: src.len() });
        }
        if dst.len() < n_out {
            return Err(TransformError::BufferSize { expected: n_out, actual: dst.len() });
        }

        let mut ctx = ApplyContext::new(Interpolation::default())
            .with_limits(self.config.budget, self.config.max_depth);
        let mut cur = [0.0f32; MAX_CHANNELS];
        let mut next = [0.0f32; MAX_CHANNELS];
        cur[..n_in].copy_from_slice(&src[..n_in]);
        let mut width = n_in;

        for stage in &self.stages {
            match stage {
                Stage::Node(i) => {
                    let xform = &self.xforms[*i];
                    if let Err(fault) = xform.apply(&mut ctx, &mut next, &cur[..width]) {
                        trace!("transform {} faulted: {}", i, fault);
                        dst[..n_out].fill(f32::NAN);
                        return Ok(());
                    }
                    width = xform.output_channels();
                    std::mem::swap(&mut cur, &mut next);
                }
                Stage::Link(link) => {
                    let v = link.apply([cur[0], cur[1], cur[2]]);
                    cur[..3].copy_from_slice(&v);
                }
            }
        }

        dst[..n_out].copy_from_slice(&cur[..n_out]);
        Ok(())
    }

    /// Run interleaved pixels through the chain, returning the pixel count
    pub fn apply_many(&self, dst: &mut [f32], src: &[f32]) -> Result<usize, TransformError> {
        if !self.begun {
            return Err(TransformError::NotBegun);
        }
        let (n_in, n_out) = (self.src_channels(), self.dst_channels());
        if src.len() % n_in != 0 {
            return Err(TransformError::BufferSize {
                expected: src.len().next_multiple_of(n_in),
                actual: src.len(),
            });
        }
        let pixels = src.len() / n_in;
        if dst.len() < pixels * n_out {
            return Err(TransformError::BufferSize {
                expected: pixels * n_out,
                actual: dst.len(),
            });
        }
        for (d, s) in dst.chunks_exact_mut(n_out).zip(src.chunks_exact(n_in)) {
            self.apply(d, s)?;
        }
        Ok(pixels)
    }

    /// Like [`apply_many`](Self::apply_many), over native-endian `f32`
    /// bytes with any alignment
    pub fn apply_bytes(&self, dst: &mut [u8], src: &[u8]) -> Result<usize, TransformError> {
        const F32: usize = std::mem::size_of::<f32>();
        if !self.begun {
            return Err(TransformError::NotBegun);
        }
        let (n_in, n_out) = (self.src_channels(), self.dst_channels());
        let (in_px, out_px) = (n_in * F32, n_out * F32);
        if src.len() % in_px != 0 {
            return Err(TransformError::BufferSize {
                expected: src.len().next_multiple_of(in_px),
                actual: src.len(),
            });
        }
        let pixels = src.len() / in_px;
        if dst.len() < pixels * out_px {
            return Err(TransformError::BufferSize {
                expected: pixels * out_px,
                actual: dst.len(),
            });
        }

        let mut input = [0.0f32; MAX_CHANNELS];
        let mut output = [0.0f32; MAX_CHANNELS];
        for (d, s) in dst.chunks_exact_mut(out_px).zip(src.chunks_exact(in_px)) {
            for (v, bytes) in input.iter_mut().zip(s.chunks_exact(F32)) {
                *v = bytemuck::pod_read_unaligned(bytes);
            }
            self.apply(&mut output[..n_out], &input[..n_in])?;
            for (bytes, v) in d.chunks_exact_mut(F32).zip(&output[..n_out]) {
                bytes.copy_from_slice(bytemuck::bytes_of(v));
            }
        }
        Ok(pixels)
    }

    /// Number of chained transforms
    pub fn len(&self) -> usize {
        self.xforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xforms.is_empty()
    }

    /// Begun with at least one transform
    pub fn is_valid(&self) -> bool {
        self.begun && !self.xforms.is_empty()
    }

    pub fn is_begun(&self) -> bool {
        self.begun
    }

    pub fn transforms(&self) -> &[Xform] {
        &self.xforms
    }

    pub fn profile(&self, index: usize) -> Option<&Arc<IccProfile>> {
        self.profiles.get(index)
    }

    /// Input space of the chain
    pub fn src_space(&self) -> Option<ColorSpace> {
        self.xforms.first().map(Xform::src_space).or(self.config.src_space)
    }

    /// Output space of the chain
    pub fn dst_space(&self) -> Option<ColorSpace> {
        self.xforms.last().map(Xform::dst_space).or(self.config.dst_space)
    }

    /// Output space of the most recently added transform
    pub fn last_space(&self) -> Option<ColorSpace> {
        self.xforms.last().map(Xform::dst_space)
    }

    /// Input space of the most recently added transform
    pub fn last_parent_space(&self) -> Option<ColorSpace> {
        self.xforms.last().map(Xform::src_space)
    }

    pub fn src_channels(&self) -> usize {
        self.xforms.first().map_or(0, Xform::input_channels)
    }

    pub fn dst_channels(&self) -> usize {
        self.xforms.last().map_or(0, Xform::output_channels)
    }
}

/// Encoding callers use for a PCS at either end of the chain
fn external(enc: PcsEncoding) -> PcsEncoding {
    if enc.is_lab() {
        PcsEncoding::LabNormalized
    } else {
        PcsEncoding::XyzNormalized
    }
}

fn combine_scales(a: Option<[f32; 3]>, b: Option<[f32; 3]>) -> Option<[f32; 3]> {
    match (a, b) {
        (Some(a), Some(b)) => Some([a[0] * b[0], a[1] * b[1], a[2] * b[2]]),
        (a, b) => a.or(b),
    }
}

fn push_link(stages: &mut Vec<Stage>, from: PcsEncoding, to: PcsEncoding, scale: Option<[f32; 3]>) {
    let link = PcsLink::new(from, to, scale);
    if !link.is_identity() {
        stages.push(Stage::Link(link));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icc::tags::{ClutTable, CurveTag, LutCurve, LutPrecision, LutTag, XyzTag};
    use crate::icc::{IccHeader, ProfileClass, RenderingIntent, TagSignature};

    fn rgb_profile() -> IccProfile {
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

    fn identity_lut(channels: usize) -> LutTag {
        let mut lut = LutTag::new(LutPrecision::Sixteen);
        lut.input_tables = (0..channels).map(|_| LutCurve::identity(2)).collect();
        lut.clut = ClutTable::identity(channels, 2, 2);
        lut.output_tables = (0..channels).map(|_| LutCurve::identity(2)).collect();
        lut
    }

    fn cmyk_profile() -> IccProfile {
        let header = IccHeader::new(ProfileClass::Output, ColorSpace::Cmyk, ColorSpace::Lab);
        let mut profile = IccProfile::new(header);
        let mut b2a = LutTag::new(LutPrecision::Sixteen);
        b2a.input_tables = (0..3).map(|_| LutCurve::identity(2)).collect();
        b2a.clut = ClutTable::new(vec![2, 2, 2], 4, vec![0.5; 8 * 4], 2);
        b2a.output_tables = (0..4).map(|_| LutCurve::identity(2)).collect();
        profile.attach_tag(TagSignature::b2a(0), Box::new(b2a));
        profile
    }

    #[test]
    fn test_state_machine() {
        let shared = Arc::new(rgb_profile());
        let mut cmm = Cmm::default();
        assert_eq!(cmm.begin(), Err(TransformError::EmptyChain));
        assert_eq!(cmm.apply(&mut [0.0; 3], &[0.0; 3]), Err(TransformError::NotBegun));

        cmm.add_transform(Arc::clone(&shared), &XformOptions::new()).unwrap();
        cmm.add_transform(Arc::clone(&shared), &XformOptions::new()).unwrap();
        cmm.begin().unwrap();
        assert!(Arc::ptr_eq(cmm.profile(1).unwrap(), &shared));
        assert!(cmm.is_valid());
        assert_eq!(cmm.len(), 2);
        assert_eq!(
            cmm.add_transform(rgb_profile(), &XformOptions::new()),
            Err(TransformError::AlreadyBegun)
        );
        assert_eq!(cmm.begin(), Err(TransformError::AlreadyBegun));
    }

    #[test]
    fn test_rgb_roundtrip() {
        let cmm = Cmm::from_profiles(CmmConfig::default(), [rgb_profile(), rgb_profile()], &XformOptions::new())
            .unwrap();
        assert_eq!(cmm.transforms()[1].direction(), Direction::Output);
        assert_eq!(cmm.src_space(), Some(ColorSpace::Rgb));
        assert_eq!(cmm.dst_space(), Some(ColorSpace::Rgb));
        assert_eq!(cmm.last_parent_space(), Some(ColorSpace::Xyz));

        let src = [0.25, 0.5, 0.75];
        let mut dst = [0.0; 3];
        cmm.apply(&mut dst, &src).unwrap();
        for (a, b) in dst.iter().zip(src) {
            assert!((a - b).abs() < 1e-3, "{:?}", dst);
        }
    }

    #[test]
    fn test_rgb_to_cmyk_through_lab() {
        let cmm = Cmm::from_profiles(CmmConfig::default(), [rgb_profile(), cmyk_profile()], &XformOptions::new())
            .unwrap();
        assert_eq!(cmm.dst_channels(), 4);
        // XYZ from the shaper is converted to legacy Lab for the mft2 B2A0
        assert_eq!(cmm.stages.len(), 3);
        let mut dst = [0.0; 4];
        cmm.apply(&mut dst, &[0.2, 0.4, 0.6]).unwrap();
        for v in dst {
            assert!((v - 0.5).abs() < 1e-3);
        }
    }

    #[test]
    fn test_incompatible_spaces() {
        let mut cmm = Cmm::default();
        cmm.add_transform(rgb_profile(), &XformOptions::new()).unwrap();
        let mut link = IccProfile::new(IccHeader::new(ProfileClass::DeviceLink, ColorSpace::Cmyk, ColorSpace::Rgb));
        let mut lut = LutTag::new(LutPrecision::Sixteen);
        lut.input_tables = (0..4).map(|_| LutCurve::identity(2)).collect();
        lut.clut = ClutTable::new(vec![2; 4], 3, vec![0.0; 16 * 3], 2);
        lut.output_tables = (0..3).map(|_| LutCurve::identity(2)).collect();
        link.attach_tag(TagSignature::a2b(0), Box::new(lut));
        let err = cmm.add_transform(link, &XformOptions::new()).unwrap_err();
        assert_eq!(
            err,
            TransformError::BadSpaceLink {
                from: ColorSpace::Xyz,
                to: ColorSpace::Cmyk
            }
        );
        // the failed add left the chain alone
        assert_eq!(cmm.len(), 1);
        assert_eq!(cmm.last_space(), Some(ColorSpace::Xyz));
    }

    #[test]
    fn test_destination_hint() {
        let config = CmmConfig::new().with_spaces(ColorSpace::Rgb, ColorSpace::Cmyk);
        let mut cmm = Cmm::new(config);
        cmm.add_transform(rgb_profile(), &XformOptions::new()).unwrap();
        assert!(matches!(cmm.begin(), Err(TransformError::BadSpaceLink { .. })));
    }

    #[test]
    fn test_pcs_output_is_normalized() {
        let cmm = Cmm::from_profiles(CmmConfig::default(), [rgb_profile()], &XformOptions::new()).unwrap();
        let mut xyz = [0.0; 3];
        cmm.apply(&mut xyz, &[1.0, 1.0, 1.0]).unwrap();
        assert!((xyz[1] - 32768.0 / 65535.0).abs() < 1e-3);
    }

    #[test]
    fn test_absolute_intent_scales_media_white() {
        let mut profile = rgb_profile();
        profile.attach_tag(TagSignature::MEDIA_WHITE, Box::new(XyzTag::new([0.9, 0.9, 0.7])));
        let options = XformOptions::new().with_intent(RenderingIntent::AbsoluteColorimetric);
        let cmm = Cmm::from_profiles(CmmConfig::default(), [profile], &options).unwrap();
        let mut xyz = [0.0; 3];
        cmm.apply(&mut xyz, &[1.0, 1.0, 1.0]).unwrap();
        assert!((xyz[1] - 0.9 * 32768.0 / 65535.0).abs() < 1e-3);
    }

    #[test]
    fn test_buffer_checks() {
        let cmm = Cmm::from_profiles(CmmConfig::default(), [rgb_profile(), cmyk_profile()], &XformOptions::new())
            .unwrap();
        assert_eq!(
            cmm.apply(&mut [0.0; 4], &[0.0; 2]),
            Err(TransformError::BufferSize { expected: 3, actual: 2 })
        );
        assert!(matches!(cmm.apply_many(&mut [0.0; 8], &[0.0; 7]), Err(TransformError::BufferSize { .. })));
        assert_eq!(cmm.apply_many(&mut [0.0; 8], &[0.1; 6]), Ok(2));
    }

    #[test]
    fn test_apply_bytes() {
        let cmm = Cmm::from_profiles(CmmConfig::default(), [rgb_profile(), rgb_profile()], &XformOptions::new())
            .unwrap();
        let src: Vec<u8> = [0.5f32, 0.5, 0.5].iter().flat_map(|v| v.to_ne_bytes()).collect();
        // unaligned destination
        let mut dst = vec![0u8; 13];
        assert_eq!(cmm.apply_bytes(&mut dst[1..], &src), Ok(1));
        let g = f32::from_ne_bytes([dst[5], dst[6], dst[7], dst[8]]);
        assert!((g - 0.5).abs() < 1e-3);
        assert!(cmm.apply_bytes(&mut dst, &src[..5]).is_err());
    }

    #[test]
    fn test_non_finite_inputs_return() {
        let cmm = Cmm::from_profiles(CmmConfig::default(), [rgb_profile(), cmyk_profile()], &XformOptions::new())
            .unwrap();
        let mut dst = [0.0; 4];
        for v in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY, -0.1, 1.1] {
            cmm.apply(&mut dst, &[v; 3]).unwrap();
        }
    }

    #[test]
    fn test_abstract_identity_lut() {
        let header = IccHeader::new(ProfileClass::Abstract, ColorSpace::Lab, ColorSpace::Lab);
        let mut profile = IccProfile::new(header);
        profile.attach_tag(TagSignature::a2b(0), Box::new(identity_lut(3)));
        let cmm = Cmm::from_profiles(CmmConfig::default(), [profile], &XformOptions::new()).unwrap();
        let mut dst = [0.0; 3];
        cmm.apply(&mut dst, &[0.5, 0.5, 0.5]).unwrap();
        for v in dst {
            assert!((v - 0.5).abs() < 1e-3);
        }
    }
}

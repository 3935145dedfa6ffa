//! Synthetic profile construction
//!
//! Every preset carries the tags the validator requires for its class, so
//! a freshly built profile validates clean unless a test breaks it on
//! purpose.

use std::sync::Arc;

use anyhow::Context;
use iccmm_core::icc::tags::{
    ClutTable, CurveTag, LutCurve, LutPrecision, LutTag, MultiLocalizedUnicodeTag,
    MultiProcessElementTag, Tag, TextTag, XyzTag,
};
use iccmm_core::icc::{ProfileVersion, XyzNumber};
use iccmm_core::mpe::calculator::Op;
use iccmm_core::mpe::{CalculatorElement, Element, ElementRegistry};
use iccmm_core::{ColorSpace, IccHeader, IccProfile, ProfileClass, RenderingIntent, TagSignature};

/// D50 media white
pub const D50: [f32; 3] = [0.9642, 1.0, 0.8249];

/// sRGB primaries adapted to D50
const SRGB_COLORANTS: [[f32; 3]; 3] = [
    [0.4361, 0.2225, 0.0139],
    [0.3851, 0.7169, 0.0971],
    [0.1431, 0.0606, 0.7141],
];

/// Fluent builder for in-memory profiles
#[derive(Debug, Clone)]
pub struct ProfileBuilder {
    header: IccHeader,
    tags: Vec<(TagSignature, Box<dyn Tag>)>,
}

impl ProfileBuilder {
    /// Header only, no tags
    pub fn new(class: ProfileClass, space: ColorSpace, pcs: ColorSpace) -> Self {
        Self {
            header: IccHeader::new(class, space, pcs),
            tags: Vec::new(),
        }
    }

    /// RGB display with sRGB-like colorants and gamma 2.2 curves
    pub fn display_rgb() -> Self {
        let mut builder = Self::new(ProfileClass::Display, ColorSpace::Rgb, ColorSpace::Xyz)
            .described("synthetic RGB display");
        let colorants = [
            TagSignature::RED_COLORANT,
            TagSignature::GREEN_COLORANT,
            TagSignature::BLUE_COLORANT,
        ];
        for (sig, xyz) in colorants.into_iter().zip(SRGB_COLORANTS) {
            builder = builder.tag(sig, XyzTag::new(xyz));
        }
        for sig in [TagSignature::RED_TRC, TagSignature::GREEN_TRC, TagSignature::BLUE_TRC] {
            builder = builder.tag(sig, CurveTag::Gamma(2.2));
        }
        builder
    }

    /// Gray display with a gamma 2.2 curve
    pub fn gray() -> Self {
        Self::new(ProfileClass::Display, ColorSpace::Gray, ColorSpace::Xyz)
            .described("synthetic gray display")
            .tag(TagSignature::GRAY_TRC, CurveTag::Gamma(2.2))
    }

    /// CMYK printer with a Lab PCS: A2B0 and B2A0 16-bit tables
    pub fn cmyk_printer() -> Self {
        let a2b = sampled_lut(4, 3, 3, |cmyk, lab| {
            let [c, m, y, k] = [cmyk[0], cmyk[1], cmyk[2], cmyk[3]];
            lab[0] = (1.0 - 0.3 * c - 0.5 * m - 0.1 * y) * (1.0 - 0.85 * k);
            lab[1] = 0.5 + 0.25 * (m - c);
            lab[2] = 0.5 + 0.25 * (y - 0.5 * m);
        });
        let b2a = sampled_lut(3, 4, 9, |lab, cmyk| {
            let ink = (1.0 - lab[0]).clamp(0.0, 1.0);
            cmyk[0] = (ink + (0.5 - lab[1])).clamp(0.0, 1.0);
            cmyk[1] = (ink + (lab[1] - 0.5)).clamp(0.0, 1.0);
            cmyk[2] = (ink + (lab[2] - 0.5)).clamp(0.0, 1.0);
            cmyk[3] = (ink - 0.5).max(0.0);
        });
        Self::new(ProfileClass::Output, ColorSpace::Cmyk, ColorSpace::Lab)
            .described("synthetic CMYK printer")
            .tag(TagSignature::A2B0, a2b)
            .tag(TagSignature::B2A0, b2a)
    }

    /// Device link from `from` to `to` through a table that copies the
    /// shared channels and inverts them when the channel counts differ
    pub fn device_link(from: ColorSpace, to: ColorSpace) -> Self {
        let (inputs, outputs) = (from.channels(), to.channels());
        let lut = if inputs == outputs {
            identity_lut(inputs)
        } else {
            sampled_lut(inputs, outputs, 2, |src, dst| {
                for (i, v) in dst.iter_mut().enumerate() {
                    *v = src.get(i).map_or(0.0, |s| 1.0 - s);
                }
            })
        };
        let mut builder = Self::new(ProfileClass::DeviceLink, from, to)
            .described("synthetic device link")
            .tag(TagSignature::A2B0, lut);
        // links carry no media white
        builder.tags.retain(|(sig, _)| *sig != TagSignature::MEDIA_WHITE);
        builder
    }

    /// Abstract profile whose A2B0 maps every value to itself
    pub fn identity_abstract(space: ColorSpace) -> Self {
        Self::new(ProfileClass::Abstract, space, space)
            .described("synthetic identity")
            .tag(TagSignature::A2B0, identity_lut(space.channels()))
    }

    /// v5 color space profile whose D2B0 is a single calculator element
    pub fn calculator(space: ColorSpace, pcs: ColorSpace, program: Vec<Op>) -> Self {
        let registry = Arc::new(ElementRegistry::new());
        let calc: Box<dyn Element> = Box::new(CalculatorElement::with_program(
            Arc::clone(&registry),
            space.channels(),
            pcs.channels(),
            program,
            Vec::new(),
        ));
        Self::new(ProfileClass::ColorSpace, space, pcs)
            .version(5, 0)
            .described("synthetic calculator")
            .tag(
                TagSignature::D2B0,
                MultiProcessElementTag::from_elements(registry, vec![calc]),
            )
    }

    /// Add `tag` under `sig`, replacing an earlier tag with that signature
    pub fn tag(mut self, sig: TagSignature, tag: impl Tag + 'static) -> Self {
        self.tags.retain(|(s, _)| *s != sig);
        self.tags.push((sig, Box::new(tag)));
        self
    }

    /// Drop the tag under `sig`
    pub fn without(mut self, sig: TagSignature) -> Self {
        self.tags.retain(|(s, _)| *s != sig);
        self
    }

    pub fn version(mut self, major: u8, minor: u8) -> Self {
        self.header.version = ProfileVersion::new(major, minor, 0);
        self
    }

    pub fn intent(mut self, intent: RenderingIntent) -> Self {
        self.header.rendering_intent = intent.to_u32();
        self
    }

    pub fn media_white(self, xyz: [f32; 3]) -> Self {
        self.tag(TagSignature::MEDIA_WHITE, XyzTag::new(xyz))
    }

    pub fn illuminant(mut self, xyz: [f32; 3]) -> Self {
        self.header.illuminant = XyzNumber::from_f32(xyz);
        self
    }

    pub fn header(&self) -> &IccHeader {
        &self.header
    }

    /// Description, copyright and a D50 media white, in the text type
    /// that fits the header version
    fn described(self, text: &str) -> Self {
        let builder = if self.header.version.major >= 4 {
            self.tag(TagSignature::DESC, MultiLocalizedUnicodeTag::new(text))
                .tag(TagSignature::COPYRIGHT, MultiLocalizedUnicodeTag::new("no copyright"))
        } else {
            self.tag(TagSignature::DESC, TextTag::new(text))
                .tag(TagSignature::COPYRIGHT, TextTag::new("no copyright"))
        };
        builder.media_white(D50)
    }

    /// In-memory profile holding the tags in insertion order
    pub fn build(self) -> IccProfile {
        let mut profile = IccProfile::new(self.header);
        for (sig, tag) in self.tags {
            profile.attach_tag(sig, tag);
        }
        profile
    }

    /// Serialized bytes
    pub fn bytes(self) -> anyhow::Result<Vec<u8>> {
        self.build().to_bytes().context("serializing synthetic profile")
    }

    /// Serialize and attach, so tags are read back from bytes
    pub fn attached(self) -> anyhow::Result<IccProfile> {
        let bytes = self.bytes()?;
        IccProfile::from_bytes(&bytes).context("attaching synthetic profile")
    }
}

/// 16-bit table that passes `channels` values straight through
pub fn identity_lut(channels: usize) -> LutTag {
    let mut lut = LutTag::new(LutPrecision::Sixteen);
    lut.input_tables = (0..channels).map(|_| LutCurve::identity(256)).collect();
    lut.clut = ClutTable::identity(channels, 2, 2);
    lut.output_tables = (0..channels).map(|_| LutCurve::identity(256)).collect();
    lut
}

/// 16-bit table whose grid samples `f` on `points` nodes per input
///
/// Grid nodes are ordered with the first input varying slowest.
pub fn sampled_lut(
    inputs: usize,
    outputs: usize,
    points: u8,
    f: impl Fn(&[f32], &mut [f32]),
) -> LutTag {
    let n = points as usize;
    let step = (n.max(2) - 1) as f32;
    let total = n.pow(inputs as u32);
    let mut data = vec![0.0f32; total * outputs];
    let mut node = vec![0.0f32; inputs];
    for (i, out) in data.chunks_exact_mut(outputs).enumerate() {
        let mut rem = i;
        for d in (0..inputs).rev() {
            node[d] = (rem % n) as f32 / step;
            rem /= n;
        }
        f(&node, out);
    }

    let mut lut = LutTag::new(LutPrecision::Sixteen);
    lut.input_tables = (0..inputs).map(|_| LutCurve::identity(256)).collect();
    lut.clut = ClutTable::new(vec![points; inputs], outputs, data, 2);
    lut.output_tables = (0..outputs).map(|_| LutCurve::identity(256)).collect();
    lut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        for builder in [
            ProfileBuilder::display_rgb(),
            ProfileBuilder::gray(),
            ProfileBuilder::cmyk_printer(),
            ProfileBuilder::device_link(ColorSpace::Rgb, ColorSpace::Cmyk),
            ProfileBuilder::identity_abstract(ColorSpace::Lab),
        ] {
            let profile = builder.attached().unwrap();
            let report = profile.validate();
            assert!(report.is_valid(), "{}", report);
        }
    }

    #[test]
    fn test_tag_replaces_signature() {
        let profile = ProfileBuilder::gray()
            .tag(TagSignature::GRAY_TRC, CurveTag::Gamma(1.0))
            .build();
        assert!(profile.are_tags_unique());
        let trc: CurveTag = profile.find_typed(TagSignature::GRAY_TRC).unwrap();
        assert_eq!(trc, CurveTag::Gamma(1.0));
    }

    #[test]
    fn test_sampled_lut_ordering() {
        let lut = sampled_lut(2, 2, 3, |src, dst| dst.copy_from_slice(src));
        // node 1 is (0, 0.5): the last input varies fastest
        assert_eq!(&lut.clut.data[2..4], &[0.0, 0.5]);
        assert_eq!(lut.input_channels(), 2);
        assert_eq!(lut.output_channels(), 2);
    }
}

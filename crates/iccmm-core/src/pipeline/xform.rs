//! Per-profile transform nodes
//!
//! A node is one profile used in one direction. Building it picks the tag
//! that implements the requested intent, falling back through the
//! candidate list until one is readable:
//!
//! | direction | candidates                                          |
//! |-----------|-----------------------------------------------------|
//! | input     | D2Bx (opt-in), A2Bx, A2B0, matrix/TRC               |
//! | output    | B2Dx (opt-in), B2Ax, B2A0, inverse matrix/TRC       |
//!
//! Device links and abstract profiles only carry A2B0.

use tracing::{debug, trace, warn};

use crate::error::{EvaluationFault, TransformError};
use crate::icc::header::D50_XYZ;
use crate::icc::tags::{LutAbTag, LutPrecision, LutTag, MultiProcessElementTag, XyzTag};
use crate::icc::{ColorSpace, IccProfile, ProfileClass, RenderingIntent, TagSignature};
use crate::math::Interpolation;
use crate::mpe::ApplyContext;

use super::context::{Direction, XformOptions};
use super::matrix_shaper::MatrixShaper;
use super::pcs::{absolute_scale, PcsEncoding};

/// The evaluator behind a node
#[derive(Debug, Clone)]
enum Node {
    Lut(LutTag),
    LutAb(LutAbTag),
    Mpe(MultiProcessElementTag),
    MatrixShaper(MatrixShaper),
}

impl Node {
    fn channels(&self) -> (usize, usize) {
        match self {
            Self::Lut(t) => (t.input_channels(), t.output_channels()),
            Self::LutAb(t) => (t.input_channels as usize, t.output_channels as usize),
            Self::Mpe(t) => (t.input_channels, t.output_channels),
            Self::MatrixShaper(m) => (m.input_channels(), m.output_channels()),
        }
    }

    /// How PCS values look on a side of this node whose space is `space`
    fn pcs_encoding(&self, space: ColorSpace) -> Option<PcsEncoding> {
        let lab = match space {
            ColorSpace::Lab => true,
            ColorSpace::Xyz => false,
            _ => return None,
        };
        Some(match (self, lab) {
            (Self::MatrixShaper(_), _) => PcsEncoding::XyzActual,
            (Self::Mpe(_), true) => PcsEncoding::LabActual,
            (Self::Mpe(_), false) => PcsEncoding::XyzActual,
            (Self::Lut(t), true) if t.precision == LutPrecision::Sixteen => PcsEncoding::LabLegacy,
            (_, true) => PcsEncoding::LabNormalized,
            (_, false) => PcsEncoding::XyzNormalized,
        })
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Lut(t) if t.precision == LutPrecision::Eight => "lut8",
            Self::Lut(_) => "lut16",
            Self::LutAb(_) => "lutAB",
            Self::Mpe(_) => "multiProcessElement",
            Self::MatrixShaper(_) => "matrix/TRC",
        }
    }
}

/// One profile placed in a chain
#[derive(Debug, Clone)]
pub struct Xform {
    node: Node,
    direction: Direction,
    options: XformOptions,
    src_space: ColorSpace,
    dst_space: ColorSpace,
    /// Tag the node was built from, `None` for matrix/TRC
    source_tag: Option<TagSignature>,
    media_white: [f32; 3],
    apply_absolute: bool,
}

impl Xform {
    /// Pick and load the tag for `direction` and `options.intent`
    pub fn from_profile(
        profile: &IccProfile,
        direction: Direction,
        options: XformOptions,
    ) -> Result<Self, TransformError> {
        let header = profile.header();
        let is_link = matches!(header.device_class, ProfileClass::DeviceLink | ProfileClass::Abstract);
        let direction = if is_link { Direction::Input } else { direction };

        let (src_space, dst_space) = match direction {
            Direction::Input => (header.color_space, header.pcs),
            Direction::Output => (header.pcs, header.color_space),
        };

        let candidates = if is_link {
            vec![TagSignature::a2b(0)]
        } else {
            candidates(direction, options)
        };

        let mut found = None;
        for sig in candidates {
            if !profile.has_tag(sig) {
                continue;
            }
            match load_node(profile, sig) {
                Ok(node) => {
                    found = Some((node, Some(sig)));
                    break;
                }
                Err(reason) => warn!("skipping {}: {}", sig, reason),
            }
        }

        let (node, source_tag) = match found {
            Some(found) => found,
            None if is_link => {
                return Err(TransformError::MissingTag(TagSignature::a2b(0)));
            }
            None => (Node::MatrixShaper(MatrixShaper::from_profile(profile, direction)?), None),
        };

        let media_white = profile
            .find_typed::<XyzTag>(TagSignature::MEDIA_WHITE)
            .and_then(|t| t.xyz())
            .unwrap_or(D50_XYZ);

        let mut apply_absolute = !is_link
            && options.intent == RenderingIntent::AbsoluteColorimetric
            && options.absolute_adjust;
        if apply_absolute && !media_white.iter().all(|v| v.is_finite() && *v > 0.0) {
            warn!("media white {:?} unusable, skipping absolute scaling", media_white);
            apply_absolute = false;
        }

        debug!(
            "{:?} node from {} ({}): {:?} -> {:?}",
            direction,
            source_tag.map_or_else(|| "colorants".to_string(), |s| s.to_string()),
            node.label(),
            src_space,
            dst_space
        );

        Ok(Self {
            node,
            direction,
            options,
            src_space,
            dst_space,
            source_tag,
            media_white,
            apply_absolute,
        })
    }

    /// Make sure the loaded tag agrees with the profile's spaces. `index`
    /// is this node's position in the chain.
    pub fn check_channels(&self, index: usize) -> Result<(), TransformError> {
        let (inputs, outputs) = self.node.channels();
        for n in [inputs, outputs] {
            if !(1..=16).contains(&n) {
                return Err(TransformError::UnsupportedChannels(n));
            }
        }
        for (space, actual) in [(self.src_space, inputs), (self.dst_space, outputs)] {
            let expected = space.channels();
            if expected > 0 && expected != actual {
                return Err(TransformError::ChannelMismatch { index, expected, actual });
            }
        }
        if let Node::Mpe(tag) = &self.node {
            if let Some((_, expected, actual)) = tag.chain_mismatch() {
                return Err(TransformError::ChannelMismatch { index, expected, actual });
            }
        }
        Ok(())
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn options(&self) -> &XformOptions {
        &self.options
    }

    pub fn src_space(&self) -> ColorSpace {
        self.src_space
    }

    pub fn dst_space(&self) -> ColorSpace {
        self.dst_space
    }

    pub fn input_channels(&self) -> usize {
        self.node.channels().0
    }

    pub fn output_channels(&self) -> usize {
        self.node.channels().1
    }

    pub fn source_tag(&self) -> Option<TagSignature> {
        self.source_tag
    }

    pub fn media_white(&self) -> [f32; 3] {
        self.media_white
    }

    /// Encoding of the values this node reads, when its input is a PCS
    pub fn input_encoding(&self) -> Option<PcsEncoding> {
        self.node.pcs_encoding(self.src_space)
    }

    /// Encoding of the values this node writes, when its output is a PCS
    pub fn output_encoding(&self) -> Option<PcsEncoding> {
        self.node.pcs_encoding(self.dst_space)
    }

    /// XYZ scaling to apply after this node's PCS output
    pub fn output_scale(&self) -> Option<[f32; 3]> {
        (self.apply_absolute && self.direction == Direction::Input)
            .then(|| absolute_scale(self.media_white))
    }

    /// XYZ scaling to apply before this node's PCS input
    pub fn input_scale(&self) -> Option<[f32; 3]> {
        (self.apply_absolute && self.direction == Direction::Output)
            .then(|| absolute_scale(self.media_white).map(|s| 1.0 / s))
    }

    /// Evaluate one color. `ctx` counters are the caller's to reset.
    pub fn apply(
        &self,
        ctx: &mut ApplyContext,
        dst: &mut [f32],
        src: &[f32],
    ) -> Result<(), EvaluationFault> {
        let method = self.options.interpolation;
        match &self.node {
            Node::Lut(t) => t.eval(self.src_space, src, dst, method),
            Node::LutAb(t) => t.eval(src, dst, method),
            Node::Mpe(t) => {
                ctx.interpolation = method;
                t.apply(ctx, dst, src)?;
            }
            Node::MatrixShaper(m) => m.apply(dst, src),
        }
        trace!(
            "{} node: {:?} -> {:?}",
            self.node.label(),
            &src[..self.input_channels().min(src.len())],
            &dst[..self.output_channels().min(dst.len())]
        );
        Ok(())
    }

    pub fn interpolation(&self) -> Interpolation {
        self.options.interpolation
    }
}

fn candidates(direction: Direction, options: XformOptions) -> Vec<TagSignature> {
    let index = options.intent.table_index();
    let mut list = Vec::with_capacity(5);
    match direction {
        Direction::Input => {
            if options.use_d2bx {
                list.push(TagSignature::d2b(index));
            }
            list.push(TagSignature::a2b(index));
            list.push(TagSignature::a2b(0));
        }
        Direction::Output => {
            if options.use_d2bx {
                list.push(TagSignature::b2d(index));
            }
            list.push(TagSignature::b2a(index));
            list.push(TagSignature::b2a(0));
        }
    }
    list.dedup();
    list
}

fn load_node(profile: &IccProfile, sig: TagSignature) -> Result<Node, String> {
    let tag = profile.find_tag(sig).map_err(|e| e.to_string())?;
    if let Some(t) = tag.downcast_ref::<LutTag>() {
        return Ok(Node::Lut(t.clone()));
    }
    if let Some(t) = tag.downcast_ref::<LutAbTag>() {
        return Ok(Node::LutAb(t.clone()));
    }
    if let Some(t) = tag.downcast_ref::<MultiProcessElementTag>() {
        return Ok(Node::Mpe(t.clone()));
    }
    Err(format!("type '{}' cannot drive a transform", tag.type_sig()))
}

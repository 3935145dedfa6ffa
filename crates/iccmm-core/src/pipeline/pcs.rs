//! Profile connection space encodings
//!
//! Each transform node produces or consumes PCS values in the encoding of
//! the tag it was built from:
//! - LUT tags carry normalized values in [0, 1]. XYZ spans 0..1+32767/32768.
//!   Lab spans L 0..100 and a/b -128..127.
//! - mft2 Lab uses the legacy 16-bit encoding where 100 maps to 0xFF00.
//! - Multi-process chains and matrix/TRC work on actual XYZ or Lab values.
//!
//! A [`PcsLink`] sits between nodes whose encodings differ, and carries
//! the media white scaling for the absolute colorimetric intent.

use crate::icc::header::D50_XYZ;
use crate::simd::scale3_in_place;

/// Actual XYZ per unit of normalized XYZ
const XYZ_SCALE: f32 = 65535.0 / 32768.0;

/// v4 Lab per unit of legacy 16-bit Lab
const LAB_V2_TO_V4: f32 = 65535.0 / 65280.0;

const EPSILON: f32 = 216.0 / 24389.0;
const KAPPA: f32 = 24389.0 / 27.0;

/// How PCS values are represented on one side of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcsEncoding {
    /// XYZ scaled so 1.0 is 1 + 32767/32768
    XyzNormalized,
    /// Plain XYZ
    XyzActual,
    /// L/100, (a+128)/255, (b+128)/255
    LabNormalized,
    /// Legacy mft2 Lab, 65280/65535 of the normalized value
    LabLegacy,
    /// Plain L*, a*, b*
    LabActual,
}

impl PcsEncoding {
    pub fn is_lab(self) -> bool {
        matches!(self, Self::LabNormalized | Self::LabLegacy | Self::LabActual)
    }

    /// Convert `v` from this encoding to plain XYZ or Lab
    pub fn to_actual(self, v: [f32; 3]) -> [f32; 3] {
        match self {
            Self::XyzActual | Self::LabActual => v,
            Self::XyzNormalized => v.map(|x| x * XYZ_SCALE),
            Self::LabNormalized => lab_from_unit(v),
            Self::LabLegacy => lab_from_unit(v.map(|x| x * LAB_V2_TO_V4)),
        }
    }

    /// Convert plain XYZ or Lab into this encoding
    pub fn from_actual(self, v: [f32; 3]) -> [f32; 3] {
        match self {
            Self::XyzActual | Self::LabActual => v,
            Self::XyzNormalized => v.map(|x| x / XYZ_SCALE),
            Self::LabNormalized => lab_to_unit(v),
            Self::LabLegacy => lab_to_unit(v).map(|x| x / LAB_V2_TO_V4),
        }
    }
}

fn lab_from_unit(v: [f32; 3]) -> [f32; 3] {
    [v[0] * 100.0, v[1] * 255.0 - 128.0, v[2] * 255.0 - 128.0]
}

fn lab_to_unit(lab: [f32; 3]) -> [f32; 3] {
    [lab[0] / 100.0, (lab[1] + 128.0) / 255.0, (lab[2] + 128.0) / 255.0]
}

/// CIE Lab to XYZ, relative to D50
pub fn lab_to_xyz(lab: [f32; 3]) -> [f32; 3] {
    let fy = (lab[0] + 16.0) / 116.0;
    let fx = fy + lab[1] / 500.0;
    let fz = fy - lab[2] / 200.0;

    let inv = |f: f32| {
        let f3 = f * f * f;
        if f3 > EPSILON { f3 } else { (116.0 * f - 16.0) / KAPPA }
    };
    let y = if lab[0] > KAPPA * EPSILON { fy * fy * fy } else { lab[0] / KAPPA };
    [inv(fx) * D50_XYZ[0], y * D50_XYZ[1], inv(fz) * D50_XYZ[2]]
}

/// XYZ relative to D50 to CIE Lab
pub fn xyz_to_lab(xyz: [f32; 3]) -> [f32; 3] {
    let f = |t: f32| {
        if t > EPSILON { t.cbrt() } else { (KAPPA * t + 16.0) / 116.0 }
    };
    let fx = f(xyz[0] / D50_XYZ[0]);
    let fy = f(xyz[1] / D50_XYZ[1]);
    let fz = f(xyz[2] / D50_XYZ[2]);
    [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}

/// Per-channel factors taking relative XYZ to absolute for `media_white`
pub fn absolute_scale(media_white: [f32; 3]) -> [f32; 3] {
    [
        media_white[0] / D50_XYZ[0],
        media_white[1] / D50_XYZ[1],
        media_white[2] / D50_XYZ[2],
    ]
}

/// Conversion between two adjacent nodes' PCS sides
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PcsLink {
    pub from: PcsEncoding,
    pub to: PcsEncoding,
    /// XYZ scaling applied between decode and encode
    pub scale: Option<[f32; 3]>,
}

impl PcsLink {
    pub fn new(from: PcsEncoding, to: PcsEncoding, scale: Option<[f32; 3]>) -> Self {
        Self { from, to, scale }
    }

    /// Nothing to do
    pub fn is_identity(&self) -> bool {
        self.from == self.to && self.scale.is_none()
    }

    pub fn apply(&self, v: [f32; 3]) -> [f32; 3] {
        let mut actual = self.from.to_actual(v);
        let needs_xyz = self.scale.is_some() || self.from.is_lab() != self.to.is_lab();
        if needs_xyz {
            if self.from.is_lab() {
                actual = lab_to_xyz(actual);
            }
            if let Some(scale) = self.scale {
                scale3_in_place(&mut actual, scale);
            }
            if self.to.is_lab() {
                actual = xyz_to_lab(actual);
            }
        }
        self.to.from_actual(actual)
    }
}

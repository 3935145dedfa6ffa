//! Matrix/TRC transforms
//!
//! RGB profiles without LUT tags describe their device through three
//! colorants (rXYZ, gXYZ, bXYZ) and three tone curves:
//!
//! Device RGB → TRC decode → colorant matrix → XYZ
//!
//! The output direction runs the inverse matrix and the inverse curves.
//! Gray profiles have a single kTRC, and their XYZ is the D50 white
//! scaled by the decoded gray value.

use crate::error::TransformError;
use crate::icc::header::D50_XYZ;
use crate::icc::tags::{Curve, XyzTag};
use crate::icc::{ColorSpace, IccProfile, TagSignature};
use crate::math::Matrix3x3;
use crate::simd::mat3_mul_add;

use super::context::Direction;

#[derive(Debug, Clone)]
enum Shape {
    Rgb {
        curves: [Curve; 3],
        /// Device to XYZ for input, XYZ to device for output
        matrix: [[f32; 3]; 3],
    },
    Gray {
        curve: Curve,
    },
}

/// A matrix/TRC profile used in one direction
#[derive(Debug, Clone)]
pub struct MatrixShaper {
    direction: Direction,
    shape: Shape,
}

impl MatrixShaper {
    /// Build from a profile's colorant and TRC tags
    pub fn from_profile(profile: &IccProfile, direction: Direction) -> Result<Self, TransformError> {
        let shape = match profile.header().color_space {
            ColorSpace::Rgb => {
                let matrix = colorant_matrix(profile)?;
                let matrix = match direction {
                    Direction::Input => matrix,
                    Direction::Output => matrix.inverse().ok_or_else(|| {
                        TransformError::NoTransform("singular colorant matrix".to_string())
                    })?,
                };
                Shape::Rgb {
                    curves: [
                        trc(profile, TagSignature::RED_TRC)?,
                        trc(profile, TagSignature::GREEN_TRC)?,
                        trc(profile, TagSignature::BLUE_TRC)?,
                    ],
                    matrix: matrix.to_f32(),
                }
            }
            ColorSpace::Gray => Shape::Gray {
                curve: trc(profile, TagSignature::GRAY_TRC)?,
            },
            other => {
                return Err(TransformError::NoTransform(format!(
                    "matrix/TRC needs RGB or gray, profile is {:?}",
                    other
                )));
            }
        };
        Ok(Self { direction, shape })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Channels on the device side
    pub fn device_channels(&self) -> usize {
        match self.shape {
            Shape::Rgb { .. } => 3,
            Shape::Gray { .. } => 1,
        }
    }

    pub fn input_channels(&self) -> usize {
        match self.direction {
            Direction::Input => self.device_channels(),
            Direction::Output => 3,
        }
    }

    pub fn output_channels(&self) -> usize {
        match self.direction {
            Direction::Input => 3,
            Direction::Output => self.device_channels(),
        }
    }

    /// Evaluate one color. PCS values are plain XYZ.
    pub fn apply(&self, dst: &mut [f32], src: &[f32]) {
        match (&self.shape, self.direction) {
            (Shape::Rgb { curves, matrix }, Direction::Input) => {
                let linear = [curves[0].eval(src[0]), curves[1].eval(src[1]), curves[2].eval(src[2])];
                dst[..3].copy_from_slice(&mat3_mul_add(matrix, [0.0; 3], linear));
            }
            (Shape::Rgb { curves, matrix }, Direction::Output) => {
                let linear = mat3_mul_add(matrix, [0.0; 3], [src[0], src[1], src[2]]);
                for (i, v) in linear.into_iter().enumerate() {
                    dst[i] = curves[i].eval_inverse(v);
                }
            }
            (Shape::Gray { curve }, Direction::Input) => {
                let y = curve.eval(src[0]);
                for (d, w) in dst[..3].iter_mut().zip(D50_XYZ) {
                    *d = w * y;
                }
            }
            (Shape::Gray { curve }, Direction::Output) => {
                dst[0] = curve.eval_inverse(src[1] / D50_XYZ[1]);
            }
        }
    }
}

fn colorant(profile: &IccProfile, sig: TagSignature) -> Result<[f32; 3], TransformError> {
    profile
        .find_tag(sig)
        .ok()
        .and_then(|tag| tag.downcast_ref::<XyzTag>().and_then(XyzTag::xyz))
        .ok_or(TransformError::MissingTag(sig))
}

/// Colorants as matrix columns
fn colorant_matrix(profile: &IccProfile) -> Result<Matrix3x3, TransformError> {
    Ok(Matrix3x3::from_columns(
        colorant(profile, TagSignature::RED_COLORANT)?,
        colorant(profile, TagSignature::GREEN_COLORANT)?,
        colorant(profile, TagSignature::BLUE_COLORANT)?,
    ))
}

fn trc(profile: &IccProfile, sig: TagSignature) -> Result<Curve, TransformError> {
    let tag = profile.find_tag(sig).map_err(|_| TransformError::MissingTag(sig))?;
    Curve::from_tag(tag.as_ref()).ok_or(TransformError::MissingTag(sig))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icc::tags::CurveTag;
    use crate::icc::{IccHeader, ProfileClass};

    fn rgb_profile(gamma: f32) -> IccProfile {
        let header = IccHeader::new(ProfileClass::Display, ColorSpace::Rgb, ColorSpace::Xyz);
        let mut profile = IccProfile::new(header);
        profile.attach_tag(TagSignature::RED_COLORANT, Box::new(XyzTag::new([0.4361, 0.2225, 0.0139])));
        profile.attach_tag(TagSignature::GREEN_COLORANT, Box::new(XyzTag::new([0.3851, 0.7169, 0.0971])));
        profile.attach_tag(TagSignature::BLUE_COLORANT, Box::new(XyzTag::new([0.1431, 0.0606, 0.7141])));
        for sig in [TagSignature::RED_TRC, TagSignature::GREEN_TRC, TagSignature::BLUE_TRC] {
            profile.attach_tag(sig, Box::new(CurveTag::Gamma(gamma)));
        }
        profile
    }

    #[test]
    fn test_rgb_white_maps_to_d50() {
        let shaper = MatrixShaper::from_profile(&rgb_profile(2.2), Direction::Input).unwrap();
        let mut xyz = [0.0; 3];
        shaper.apply(&mut xyz, &[1.0, 1.0, 1.0]);
        assert!((xyz[0] - 0.9643).abs() < 1e-3);
        assert!((xyz[1] - 1.0).abs() < 1e-3);
        assert!((xyz[2] - 0.8251).abs() < 1e-3);
    }

    #[test]
    fn test_rgb_roundtrip() {
        let profile = rgb_profile(2.2);
        let fwd = MatrixShaper::from_profile(&profile, Direction::Input).unwrap();
        let inv = MatrixShaper::from_profile(&profile, Direction::Output).unwrap();
        let src = [0.2, 0.5, 0.8];
        let mut xyz = [0.0; 3];
        let mut back = [0.0; 3];
        fwd.apply(&mut xyz, &src);
        inv.apply(&mut back, &xyz);
        for (a, b) in back.iter().zip(src) {
            assert!((a - b).abs() < 1e-3, "{:?}", back);
        }
    }

    #[test]
    fn test_missing_colorant() {
        let mut profile = rgb_profile(1.0);
        profile.delete_tag(TagSignature::GREEN_COLORANT);
        let err = MatrixShaper::from_profile(&profile, Direction::Input).unwrap_err();
        assert_eq!(err, TransformError::MissingTag(TagSignature::GREEN_COLORANT));
    }

    #[test]
    fn test_singular_matrix_has_no_output() {
        let header = IccHeader::new(ProfileClass::Display, ColorSpace::Rgb, ColorSpace::Xyz);
        let mut profile = IccProfile::new(header);
        for sig in [TagSignature::RED_COLORANT, TagSignature::GREEN_COLORANT, TagSignature::BLUE_COLORANT] {
            profile.attach_tag(sig, Box::new(XyzTag::new([0.3, 0.3, 0.3])));
        }
        for sig in [TagSignature::RED_TRC, TagSignature::GREEN_TRC, TagSignature::BLUE_TRC] {
            profile.attach_tag(sig, Box::new(CurveTag::Identity));
        }
        assert!(MatrixShaper::from_profile(&profile, Direction::Input).is_ok());
        assert!(matches!(
            MatrixShaper::from_profile(&profile, Direction::Output),
            Err(TransformError::NoTransform(_))
        ));
    }

    #[test]
    fn test_gray() {
        let header = IccHeader::new(ProfileClass::Display, ColorSpace::Gray, ColorSpace::Xyz);
        let mut profile = IccProfile::new(header);
        profile.attach_tag(TagSignature::GRAY_TRC, Box::new(CurveTag::Identity));
        let fwd = MatrixShaper::from_profile(&profile, Direction::Input).unwrap();
        assert_eq!(fwd.input_channels(), 1);
        let mut xyz = [0.0; 3];
        fwd.apply(&mut xyz, &[0.5]);
        assert!((xyz[1] - 0.5).abs() < 1e-6);

        let inv = MatrixShaper::from_profile(&profile, Direction::Output).unwrap();
        let mut gray = [0.0];
        inv.apply(&mut gray, &xyz);
        assert!((gray[0] - 0.5).abs() < 1e-5);
    }
}

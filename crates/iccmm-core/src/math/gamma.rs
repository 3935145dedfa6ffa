//! Parametric tone curves
//!
//! The five `para` function types (ICC.1:2022 Section 10.18). Every type is
//! held in the general two-segment form of type 4:
//!
//! ```text
//! Y = (aX + b)^g + e   for X >= d
//! Y = cX + f           for X <  d
//! ```
//!
//! so a single evaluator and a single inverse serve all of them. The
//! function type is kept so the tag writes back the parameters it read.
//! Evaluation clamps the input to [0, 1]; NaN passes through as NaN.

/// `para` function type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParametricCurveType {
    /// Type 0: Y = X^g
    Gamma,
    /// Type 1: Y = (aX + b)^g  if X >= -b/a, else 0
    CIE122,
    /// Type 2: Y = (aX + b)^g + c  if X >= -b/a, else c
    IEC61966_3,
    /// Type 3: Y = (aX + b)^g  if X >= d, else cX
    IEC61966_2_1,
    /// Type 4: Y = (aX + b)^g + e  if X >= d, else cX + f
    Full,
}

impl ParametricCurveType {
    const TABLE: [(u16, ParametricCurveType, usize); 5] = [
        (0, Self::Gamma, 1),
        (1, Self::CIE122, 3),
        (2, Self::IEC61966_3, 4),
        (3, Self::IEC61966_2_1, 5),
        (4, Self::Full, 7),
    ];

    pub fn from_icc(function_type: u16) -> Option<Self> {
        Self::TABLE
            .iter()
            .find(|(code, _, _)| *code == function_type)
            .map(|&(_, kind, _)| kind)
    }

    pub fn to_icc(&self) -> u16 {
        self.entry().0
    }

    /// Parameters stored in the tag for this type
    pub fn param_count(&self) -> usize {
        self.entry().2
    }

    fn entry(&self) -> (u16, ParametricCurveType, usize) {
        Self::TABLE
            .iter()
            .copied()
            .find(|(_, kind, _)| kind == self)
            .unwrap_or((0, Self::Gamma, 1))
    }
}

/// A parametric curve in general form
///
/// Fields are the type 4 coefficients whatever `curve_type` is; use
/// [`ParametricCurve::params`] for the values as stored in the tag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParametricCurve {
    pub curve_type: ParametricCurveType,
    pub g: f64,
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl ParametricCurve {
    /// Pure power curve (type 0)
    pub fn gamma(g: f64) -> Self {
        Self {
            curve_type: ParametricCurveType::Gamma,
            g,
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 0.0,
            e: 0.0,
            f: 0.0,
        }
    }

    /// The IEC 61966-2-1 transfer function as a type 3 curve
    pub fn srgb() -> Self {
        let params = [2.4, 1.0 / 1.055, 0.055 / 1.055, 1.0 / 12.92, 0.04045];
        Self::from_params(ParametricCurveType::IEC61966_2_1, &params).unwrap_or(Self::gamma(2.4))
    }

    /// Build from parameters in tag order. Extra parameters are ignored.
    pub fn from_params(curve_type: ParametricCurveType, params: &[f64]) -> Option<Self> {
        let p = params.get(..curve_type.param_count())?;
        let mut curve = Self::gamma(p[0]);
        curve.curve_type = curve_type;
        match curve_type {
            ParametricCurveType::Gamma => {}
            ParametricCurveType::CIE122 | ParametricCurveType::IEC61966_3 => {
                curve.a = p[1];
                curve.b = p[2];
                curve.d = if p[1].abs() > 1e-10 { -p[2] / p[1] } else { 0.0 };
                if let Some(&offset) = p.get(3) {
                    curve.e = offset;
                    curve.f = offset;
                }
            }
            ParametricCurveType::IEC61966_2_1 | ParametricCurveType::Full => {
                curve.a = p[1];
                curve.b = p[2];
                curve.c = p[3];
                curve.d = p[4];
                if p.len() == 7 {
                    curve.e = p[5];
                    curve.f = p[6];
                }
            }
        }
        Some(curve)
    }

    /// Parameters in tag order, as many as the type stores
    pub fn params(&self) -> Vec<f64> {
        match self.curve_type {
            ParametricCurveType::Gamma => vec![self.g],
            ParametricCurveType::CIE122 => vec![self.g, self.a, self.b],
            ParametricCurveType::IEC61966_3 => vec![self.g, self.a, self.b, self.e],
            ParametricCurveType::IEC61966_2_1 => vec![self.g, self.a, self.b, self.c, self.d],
            ParametricCurveType::Full => {
                vec![self.g, self.a, self.b, self.c, self.d, self.e, self.f]
            }
        }
    }

    #[inline]
    fn upper(&self, x: f64) -> f64 {
        (self.a * x + self.b).max(0.0).powf(self.g) + self.e
    }
}

/// Evaluate a curve, device to linear
#[inline]
pub fn parametric_curve_eval(curve: &ParametricCurve, x: f64) -> f64 {
    let x = x.clamp(0.0, 1.0);
    if x >= curve.d {
        curve.upper(x)
    } else {
        curve.c * x + curve.f
    }
}

/// Evaluate a curve in reverse, linear to device
///
/// Solves whichever segment holds `y` in closed form. Degenerate
/// coefficients fall back to bisection, which assumes the curve rises.
#[inline]
pub fn parametric_curve_eval_inverse(curve: &ParametricCurve, y: f64) -> f64 {
    let y = y.clamp(0.0, 1.0);
    if y.is_nan() {
        return y;
    }

    let x = if y >= curve.upper(curve.d) {
        if curve.a.abs() > 1e-10 && curve.g.abs() > 1e-10 {
            ((y - curve.e).max(0.0).powf(1.0 / curve.g) - curve.b) / curve.a
        } else {
            f64::NAN
        }
    } else if curve.c.abs() > 1e-10 {
        (y - curve.f) / curve.c
    } else {
        // flat toe: every input below d gives the same output
        curve.d
    };

    if x.is_finite() {
        x.clamp(0.0, 1.0)
    } else {
        bisect(curve, y)
    }
}

fn bisect(curve: &ParametricCurve, y: f64) -> f64 {
    let (mut lo, mut hi) = (0.0f64, 1.0f64);
    for _ in 0..48 {
        let mid = 0.5 * (lo + hi);
        if parametric_curve_eval(curve, mid) < y {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-10;

    #[test]
    fn test_parametric_type0() {
        let curve = ParametricCurve::gamma(2.2);
        let y = parametric_curve_eval(&curve, 0.5);
        assert!((y - 0.5_f64.powf(2.2)).abs() < EPSILON);
        assert!((parametric_curve_eval_inverse(&curve, y) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_parametric_srgb_known_values() {
        let curve = ParametricCurve::srgb();
        assert_eq!(curve.curve_type, ParametricCurveType::IEC61966_2_1);
        assert!(parametric_curve_eval(&curve, 0.0).abs() < EPSILON);
        assert!((parametric_curve_eval(&curve, 1.0) - 1.0).abs() < 1e-9);
        let mid = parametric_curve_eval(&curve, 0.5);
        assert!(mid > 0.21 && mid < 0.22, "Mid-gray decode: {}", mid);
    }

    #[test]
    fn test_parametric_srgb_inverse() {
        let curve = ParametricCurve::srgb();
        for i in 0..=255 {
            let x = i as f64 / 255.0;
            let y = parametric_curve_eval(&curve, x);
            let back = parametric_curve_eval_inverse(&curve, y);
            assert!((back - x).abs() < 1e-8, "{}: {} -> {} -> {}", i, x, y, back);
        }
    }

    #[test]
    fn test_offset_types_share_general_form() {
        // type 2 with offset 0.1 is type 4 with e = f = 0.1
        let t2 = ParametricCurve::from_params(ParametricCurveType::IEC61966_3, &[2.0, 1.0, -0.2, 0.1])
            .unwrap();
        assert!((t2.d - 0.2).abs() < EPSILON);
        assert!((parametric_curve_eval(&t2, 0.1) - 0.1).abs() < EPSILON);
        assert!((parametric_curve_eval(&t2, 0.7) - (0.25 + 0.1)).abs() < EPSILON);
        assert_eq!(t2.params(), vec![2.0, 1.0, -0.2, 0.1]);

        let y = parametric_curve_eval(&t2, 0.6);
        assert!((parametric_curve_eval_inverse(&t2, y) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_cie122_inverse() {
        let curve =
            ParametricCurve::from_params(ParametricCurveType::CIE122, &[2.0, 1.0, 0.0]).unwrap();
        let y = parametric_curve_eval(&curve, 0.7);
        assert!((parametric_curve_eval_inverse(&curve, y) - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_slope_bisects() {
        let curve = ParametricCurve::from_params(ParametricCurveType::Full, &[1.0, 0.0, 0.5, 1.0, 0.5, 0.0, 0.0])
            .unwrap();
        // upper segment is the constant 0.5, lower is the identity
        assert!((parametric_curve_eval(&curve, 0.25) - 0.25).abs() < EPSILON);
        let x = parametric_curve_eval_inverse(&curve, 0.5);
        assert!(x.is_finite() && (0.0..=1.0).contains(&x));
    }

    #[test]
    fn test_non_finite_input() {
        let curve = ParametricCurve::srgb();
        assert!(parametric_curve_eval(&curve, f64::NAN).is_nan());
        assert!((parametric_curve_eval(&curve, f64::INFINITY) - 1.0).abs() < 1e-9);
        assert_eq!(parametric_curve_eval(&curve, -0.1), 0.0);
        assert!(parametric_curve_eval_inverse(&curve, f64::NAN).is_nan());
    }

    #[test]
    fn test_param_count() {
        let counts: Vec<usize> = (0..5)
            .map(|t| ParametricCurveType::from_icc(t).unwrap().param_count())
            .collect();
        assert_eq!(counts, vec![1, 3, 4, 5, 7]);
        assert!(ParametricCurveType::from_icc(5).is_none());
        assert_eq!(ParametricCurve::srgb().params().len(), 5);
    }
}

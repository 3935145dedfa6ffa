//! Transform options and chain configuration

use crate::icc::{ColorSpace, RenderingIntent};
use crate::math::Interpolation;
use crate::mpe::{DEFAULT_INSTRUCTION_BUDGET, MAX_NESTING_DEPTH};

/// Which way a profile is used in a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Device to PCS (A2B, D2B, forward matrix/TRC)
    Input,
    /// PCS to device (B2A, B2D, inverse matrix/TRC)
    Output,
}

/// Per-profile transform options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XformOptions {
    pub intent: RenderingIntent,
    pub interpolation: Interpolation,
    /// Prefer D2Bx / B2Dx multi-process chains over A2Bx / B2Ax
    pub use_d2bx: bool,
    /// Apply media white scaling for the absolute colorimetric intent
    pub absolute_adjust: bool,
}

impl Default for XformOptions {
    fn default() -> Self {
        Self {
            intent: RenderingIntent::Perceptual,
            interpolation: Interpolation::Tetrahedral,
            use_d2bx: false,
            absolute_adjust: true,
        }
    }
}

impl XformOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_intent(mut self, intent: RenderingIntent) -> Self {
        self.intent = intent;
        self
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn with_use_d2bx(mut self, use_d2bx: bool) -> Self {
        self.use_d2bx = use_d2bx;
        self
    }

    pub fn with_absolute_adjust(mut self, absolute_adjust: bool) -> Self {
        self.absolute_adjust = absolute_adjust;
        self
    }
}

/// Settings for a whole chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CmmConfig {
    /// Space the chain's input must be compatible with, if known
    pub src_space: Option<ColorSpace>,
    /// Space the chain's output must be compatible with, if known
    pub dst_space: Option<ColorSpace>,
    /// Use the first profile in the input direction
    pub first_input: bool,
    /// Calculator operations allowed per applied color
    pub budget: usize,
    /// Deepest calculator nesting
    pub max_depth: usize,
}

impl Default for CmmConfig {
    fn default() -> Self {
        Self {
            src_space: None,
            dst_space: None,
            first_input: true,
            budget: DEFAULT_INSTRUCTION_BUDGET,
            max_depth: MAX_NESTING_DEPTH,
        }
    }
}

impl CmmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_spaces(mut self, src: ColorSpace, dst: ColorSpace) -> Self {
        self.src_space = Some(src);
        self.dst_space = Some(dst);
        self
    }

    pub fn first_input(mut self, first_input: bool) -> Self {
        self.first_input = first_input;
        self
    }

    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_builder() {
        let options = XformOptions::new()
            .with_intent(RenderingIntent::AbsoluteColorimetric)
            .with_interpolation(Interpolation::Linear)
            .with_use_d2bx(true)
            .with_absolute_adjust(false);

        assert_eq!(options.intent, RenderingIntent::AbsoluteColorimetric);
        assert_eq!(options.interpolation, Interpolation::Linear);
        assert!(options.use_d2bx);
        assert!(!options.absolute_adjust);
    }

    #[test]
    fn test_config_defaults() {
        let config = CmmConfig::default();
        assert!(config.first_input);
        assert_eq!(config.budget, DEFAULT_INSTRUCTION_BUDGET);
        assert_eq!(config.max_depth, MAX_NESTING_DEPTH);

        let config = config.first_input(false).with_spaces(ColorSpace::Lab, ColorSpace::Cmyk);
        assert!(!config.first_input);
        assert_eq!(config.dst_space, Some(ColorSpace::Cmyk));
    }
}

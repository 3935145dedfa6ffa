//! Tag type registry
//!
//! Maps a payload's type signature to an empty tag object that knows how
//! to parse it. Factories are searched newest first, so a pushed factory
//! can replace the handling of a standard type. Anything no factory
//! claims becomes an [`UnknownTag`] holding the raw bytes.

use std::fmt;
use std::sync::Arc;

use super::tags::{
    ColorantTableTag, CurveTag, Float32ArrayTag, LutAbTag, LutDirection, LutPrecision, LutTag,
    MultiLocalizedUnicodeTag, MultiProcessElementTag, ParametricCurveTag, S15Fixed16ArrayTag,
    SignatureTag, SpectralDataInfoTag, SpectralViewingConditionsTag, Tag, TextDescriptionTag,
    TextTag, UnknownTag, XyzTag,
};
use super::types::TypeSignature;
use crate::mpe::ElementRegistry;

/// Creates tag objects for the type signatures it knows
pub trait TagFactory: Send + Sync {
    fn create(&self, sig: TypeSignature) -> Option<Box<dyn Tag>>;

    fn type_name(&self, sig: TypeSignature) -> Option<&'static str>;
}

/// The tag types this engine understands
#[derive(Debug, Clone)]
pub struct StandardTagFactory {
    elements: Arc<ElementRegistry>,
}

impl StandardTagFactory {
    /// Multi-process element tags read their elements through `elements`
    pub fn new(elements: Arc<ElementRegistry>) -> Self {
        Self { elements }
    }
}

impl Default for StandardTagFactory {
    fn default() -> Self {
        Self::new(Arc::new(ElementRegistry::new()))
    }
}

impl TagFactory for StandardTagFactory {
    fn create(&self, sig: TypeSignature) -> Option<Box<dyn Tag>> {
        let tag: Box<dyn Tag> = match sig {
            TypeSignature::XYZ => Box::new(XyzTag::default()),
            TypeSignature::CURVE => Box::new(CurveTag::default()),
            TypeSignature::PARA => Box::new(ParametricCurveTag::default()),
            TypeSignature::TEXT => Box::new(TextTag::default()),
            TypeSignature::DESC => Box::new(TextDescriptionTag::default()),
            TypeSignature::MLUC => Box::new(MultiLocalizedUnicodeTag::default()),
            TypeSignature::LUT8 => Box::new(LutTag::new(LutPrecision::Eight)),
            TypeSignature::LUT16 => Box::new(LutTag::new(LutPrecision::Sixteen)),
            TypeSignature::LUTA2B => Box::new(LutAbTag::new(LutDirection::AToB, 0, 0)),
            TypeSignature::LUTB2A => Box::new(LutAbTag::new(LutDirection::BToA, 0, 0)),
            TypeSignature::SF32 => Box::new(S15Fixed16ArrayTag::default()),
            TypeSignature::FL32 => Box::new(Float32ArrayTag::default()),
            TypeSignature::SIG => Box::new(SignatureTag::default()),
            TypeSignature::CLRT => Box::new(ColorantTableTag::default()),
            TypeSignature::MPET => Box::new(MultiProcessElementTag::new(Arc::clone(&self.elements))),
            TypeSignature::SVCN => Box::new(SpectralViewingConditionsTag::default()),
            TypeSignature::SDIN => Box::new(SpectralDataInfoTag::default()),
            _ => return None,
        };
        Some(tag)
    }

    fn type_name(&self, sig: TypeSignature) -> Option<&'static str> {
        Some(match sig {
            TypeSignature::XYZ => "XYZ",
            TypeSignature::CURVE => "Curve",
            TypeSignature::PARA => "Parametric Curve",
            TypeSignature::TEXT => "Text",
            TypeSignature::DESC => "Text Description",
            TypeSignature::MLUC => "Multi-Localized Unicode",
            TypeSignature::LUT8 => "Lut8",
            TypeSignature::LUT16 => "Lut16",
            TypeSignature::LUTA2B => "LutAtoB",
            TypeSignature::LUTB2A => "LutBtoA",
            TypeSignature::SF32 => "S15Fixed16 Array",
            TypeSignature::FL32 => "Float32 Array",
            TypeSignature::SIG => "Signature",
            TypeSignature::CLRT => "Colorant Table",
            TypeSignature::MPET => "Multi-Process Elements",
            TypeSignature::SVCN => "Spectral Viewing Conditions",
            TypeSignature::SDIN => "Spectral Data Info",
            _ => return None,
        })
    }
}

/// Ordered list of tag factories
pub struct TagRegistry {
    factories: Vec<Box<dyn TagFactory>>,
    elements: Arc<ElementRegistry>,
}

impl fmt::Debug for TagRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagRegistry")
            .field("factories", &self.factories.len())
            .field("elements", &self.elements)
            .finish()
    }
}

impl Default for TagRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TagRegistry {
    /// Registry with the standard tag and element types
    pub fn new() -> Self {
        Self::with_elements(Arc::new(ElementRegistry::new()))
    }

    /// Standard tag types, with multi-process elements read through
    /// `elements`
    pub fn with_elements(elements: Arc<ElementRegistry>) -> Self {
        Self {
            factories: vec![Box::new(StandardTagFactory::new(Arc::clone(&elements)))],
            elements,
        }
    }

    /// Registry that knows no types; every tag reads as unknown
    pub fn empty() -> Self {
        Self {
            factories: Vec::new(),
            elements: Arc::new(ElementRegistry::empty()),
        }
    }

    /// Add a factory that takes precedence over those already present
    pub fn push(&mut self, factory: Box<dyn TagFactory>) {
        self.factories.push(factory);
    }

    pub fn elements(&self) -> &Arc<ElementRegistry> {
        &self.elements
    }

    /// Empty tag object for `sig`
    pub fn create(&self, sig: TypeSignature) -> Box<dyn Tag> {
        self.factories
            .iter()
            .rev()
            .find_map(|f| f.create(sig))
            .unwrap_or_else(|| Box::new(UnknownTag::new(sig)))
    }

    pub fn type_name(&self, sig: TypeSignature) -> &'static str {
        self.factories
            .iter()
            .rev()
            .find_map(|f| f.type_name(sig))
            .unwrap_or("Unknown")
    }

    /// True if some factory claims `sig`
    pub fn knows(&self, sig: TypeSignature) -> bool {
        self.factories.iter().any(|f| f.type_name(sig).is_some())
    }
}

//! JSON Round Trips
//!
//! Every synthetic profile saved as JSON must load back to the same bytes.

use cmm_tests::{ProfileBuilder, init_tracing};
use iccmm_core::icc::tags::{Tag, TextTag};
use iccmm_core::textual::{self, ProfileDocument};
use iccmm_core::{ColorSpace, IccProfile, RenderingIntent, TagSignature};

fn presets() -> Vec<(&'static str, ProfileBuilder)> {
    vec![
        ("display_rgb", ProfileBuilder::display_rgb()),
        ("gray_v2", ProfileBuilder::gray().version(2, 1)),
        ("cmyk_printer", ProfileBuilder::cmyk_printer().intent(RenderingIntent::RelativeColorimetric)),
        ("rgb_to_cmyk_link", ProfileBuilder::device_link(ColorSpace::Rgb, ColorSpace::Cmyk)),
        ("lab_identity", ProfileBuilder::identity_abstract(ColorSpace::Lab)),
        ("calculator", ProfileBuilder::calculator(ColorSpace::Rgb, ColorSpace::Xyz, Vec::new())),
    ]
}

#[test]
fn attached_profiles_survive_json() {
    init_tracing();
    for (name, builder) in presets() {
        let bytes = builder.bytes().unwrap();
        let attached = IccProfile::from_bytes(&bytes).unwrap();
        let text = textual::save(&attached).unwrap();
        let back = textual::load(&text).unwrap();
        assert_eq!(back.to_bytes().unwrap(), bytes, "{}", name);
        assert_eq!(back.header().rendering_intent, attached.header().rendering_intent, "{}", name);
    }
}

#[test]
fn in_memory_profiles_survive_json() {
    for (name, builder) in presets() {
        let profile = builder.build();
        let back = textual::load(&textual::save(&profile).unwrap()).unwrap();
        assert_eq!(back.to_bytes().unwrap(), profile.to_bytes().unwrap(), "{}", name);
    }
}

#[test]
fn document_is_readable() {
    let profile = ProfileBuilder::cmyk_printer().build();
    let doc = ProfileDocument::from_profile(&profile).unwrap();
    assert_eq!(doc.tags.len(), profile.entries().len());
    assert_eq!(doc.header.version, "4.3.0");

    let text = textual::save(&profile).unwrap();
    for needle in ["\"prtr\"", "\"CMYK\"", "\"Lab \"", "\"A2B0\"", "\"mft2\""] {
        assert!(text.contains(needle), "{} missing from\n{}", needle, text);
    }
}

#[test]
fn edited_text_tag_loads() {
    let profile = ProfileBuilder::gray().version(2, 1).build();
    let mut doc = ProfileDocument::from_profile(&profile).unwrap();
    let replacement = TextTag::new("edited copyright");
    let record = doc
        .tags
        .iter_mut()
        .find(|t| t.signature == TagSignature::COPYRIGHT)
        .unwrap();
    let mut payload = Vec::new();
    replacement.write(&mut payload).unwrap();
    record.type_sig = replacement.type_sig();
    record.data = payload.iter().map(|b| format!("{:02x}", b)).collect();

    let back = doc.to_profile().unwrap();
    let text: TextTag = back.find_typed(TagSignature::COPYRIGHT).unwrap();
    assert_eq!(text.text, "edited copyright");
}

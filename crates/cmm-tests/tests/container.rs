//! Profile Container Round Trips
//!
//! Write, attach and rewrite synthetic profiles and check nothing drifts.

use std::sync::Arc;

use cmm_tests::{ProfileBuilder, init_tracing};
use iccmm_core::icc::tags::{
    CurveTag, SpectralDataInfoTag, SpectralViewingConditionsTag, Tag, TextTag, XyzTag,
};
use iccmm_core::icc::{HEADER_SIZE, SpectralRange};
use iccmm_core::{
    Check, ColorSpace, IccHeader, IccProfile, MemIo, ProfileClass, ProfileIdPolicy, TagSignature,
};

fn presets() -> Vec<(&'static str, ProfileBuilder)> {
    vec![
        ("display_rgb", ProfileBuilder::display_rgb()),
        ("gray", ProfileBuilder::gray()),
        ("cmyk_printer", ProfileBuilder::cmyk_printer()),
        ("rgb_to_cmyk_link", ProfileBuilder::device_link(ColorSpace::Rgb, ColorSpace::Cmyk)),
        ("lab_identity", ProfileBuilder::identity_abstract(ColorSpace::Lab)),
        ("calculator", ProfileBuilder::calculator(ColorSpace::Rgb, ColorSpace::Xyz, Vec::new())),
    ]
}

#[test]
fn write_attach_write_is_stable() {
    init_tracing();
    for (name, builder) in presets() {
        let first = builder.bytes().unwrap();
        let attached = IccProfile::from_bytes(&first).unwrap();
        let second = attached.to_bytes().unwrap();
        assert_eq!(first, second, "{} changed after a round trip", name);

        let again = IccProfile::from_bytes(&second).unwrap();
        assert_eq!(again.header(), attached.header(), "{}", name);
        assert_eq!(again.entries(), attached.entries(), "{}", name);
    }
}

#[test]
fn attached_tags_match_written_tags() {
    for (name, builder) in presets() {
        let original = builder.build();
        let attached = IccProfile::from_bytes(&original.to_bytes().unwrap()).unwrap();
        assert_eq!(original.entries().len(), attached.entries().len(), "{}", name);

        for entry in original.entries() {
            let a = original.find_tag(entry.signature).unwrap();
            let b = attached.find_tag(entry.signature).unwrap();
            assert_eq!(a.type_sig(), b.type_sig(), "{} '{}'", name, entry.signature);
            assert_eq!(
                a.to_bytes().unwrap(),
                b.to_bytes().unwrap(),
                "{} '{}' payload differs",
                name,
                entry.signature
            );
        }
    }
}

#[test]
fn written_profiles_are_aligned() {
    for (name, builder) in presets() {
        let bytes = builder.bytes().unwrap();
        assert_eq!(bytes.len() % 4, 0, "{}", name);

        let profile = IccProfile::from_bytes(&bytes).unwrap();
        assert_eq!(profile.header().size as usize, bytes.len());
        for entry in profile.entries() {
            assert_eq!(entry.offset % 4, 0, "{} '{}'", name, entry.signature);
        }
        let report = profile.validate();
        assert!(!report.has_finding(Check::TagOverlap, None), "{}\n{}", name, report);
        assert!(!report.has_finding(Check::ProfileId, None), "{}\n{}", name, report);
    }
}

#[test]
fn profile_id_follows_version() {
    let v4 = ProfileBuilder::display_rgb().bytes().unwrap();
    assert_ne!(&v4[84..100], &[0u8; 16]);

    let v2 = ProfileBuilder::display_rgb().version(2, 1).bytes().unwrap();
    assert_eq!(&v2[84..100], &[0u8; 16]);

    let profile = ProfileBuilder::display_rgb().build();
    let bytes = profile.to_bytes_with(ProfileIdPolicy::Never).unwrap();
    assert_eq!(&bytes[84..100], &[0u8; 16]);
    assert_eq!(profile.calc_profile_id().unwrap(), IccProfile::compute_profile_id(&bytes));
}

#[test]
fn write_through_io() {
    let profile = ProfileBuilder::gray().build();
    let mut io = MemIo::growable();
    let written = profile.write(&mut io).unwrap();
    let bytes = profile.to_bytes().unwrap();
    assert_eq!(written, bytes.len());
    assert_eq!(io.as_slice(), bytes.as_slice());

    let mut small = MemIo::with_capacity(64);
    assert!(profile.write(&mut small).is_err());
}

#[test]
fn minimal_header_only_profile() {
    let header = IccHeader::new(ProfileClass::Display, ColorSpace::Rgb, ColorSpace::Xyz);
    assert!(header.version.at_least(4, 2));
    let bytes = header.to_bytes();
    assert_eq!(bytes.len(), HEADER_SIZE);

    let profile = IccProfile::from_bytes(&bytes).unwrap();
    assert!(profile.entries().is_empty());
    assert!(profile.are_tags_unique());

    let report = profile.validate();
    let text = report.to_string();
    assert!(text.contains("file size multiple of 4: pass"), "{}", text);
    assert!(!report.has_finding(Check::TagsUnique, None));
    assert!(!report.has_finding(Check::TagOverlap, None));
    assert!(!report.has_finding(Check::TagBounds, None));
}

#[test]
fn short_input_is_rejected() {
    let header = IccHeader::new(ProfileClass::Display, ColorSpace::Rgb, ColorSpace::Xyz).to_bytes();
    assert!(IccProfile::from_bytes(&header[..HEADER_SIZE - 1]).is_err());
    assert!(IccProfile::from_bytes(&[]).is_err());

    let mut bad_magic = header;
    bad_magic[36..40].copy_from_slice(b"nope");
    assert!(IccProfile::from_bytes(&bad_magic).is_err());
}

#[test]
fn shared_payload_written_once() {
    let curve: Arc<dyn Tag> = Arc::new(CurveTag::Gamma(1.8));
    let mut profile = ProfileBuilder::display_rgb().build();
    for sig in [TagSignature::RED_TRC, TagSignature::GREEN_TRC, TagSignature::BLUE_TRC] {
        profile.attach_shared(sig, Arc::clone(&curve));
    }
    let bytes = profile.to_bytes().unwrap();
    let attached = IccProfile::from_bytes(&bytes).unwrap();

    let index = |sig| attached.find_tag_index(sig).unwrap();
    let (r, g, b) = (
        index(TagSignature::RED_TRC),
        index(TagSignature::GREEN_TRC),
        index(TagSignature::BLUE_TRC),
    );
    assert!(attached.shares_payload(r, g));
    assert!(attached.shares_payload(g, b));
    assert_eq!(attached.entries()[r].offset, attached.entries()[b].offset);

    let red = attached.find_tag(TagSignature::RED_TRC).unwrap();
    let blue = attached.find_tag(TagSignature::BLUE_TRC).unwrap();
    assert!(Arc::ptr_eq(&red, &blue));

    let report = attached.validate();
    assert!(!report.has_finding(Check::TagOverlap, None), "{}", report);
    assert!(report.is_valid(), "{}", report);
}

#[test]
fn delete_and_replace_tags() {
    let mut profile = ProfileBuilder::display_rgb().build();
    assert!(profile.delete_tag(TagSignature::COPYRIGHT));
    assert!(!profile.delete_tag(TagSignature::COPYRIGHT));
    assert!(!profile.has_tag(TagSignature::COPYRIGHT));

    profile.attach_tag(TagSignature::MEDIA_WHITE, Box::new(XyzTag::new([0.75, 1.0, 1.25])));
    assert!(profile.are_tags_unique());
    let white: XyzTag = profile.find_typed(TagSignature::MEDIA_WHITE).unwrap();
    assert_eq!(white.xyz(), Some([0.75, 1.0, 1.25]));

    let attached = IccProfile::from_bytes(&profile.to_bytes().unwrap()).unwrap();
    let report = attached.validate();
    assert!(report.has_finding(Check::RequiredTags, Some(TagSignature::COPYRIGHT)));
}

#[test]
fn missing_tag_lookup() {
    let profile = ProfileBuilder::gray().attached().unwrap();
    assert!(profile.find_tag(TagSignature::A2B0).is_err());
    assert!(profile.find_typed::<TextTag>(TagSignature::GRAY_TRC).is_none());
}

#[test]
fn spectral_tags_round_trip() {
    let range = SpectralRange {
        start: 400.0,
        end: 700.0,
        steps: 4,
    };
    let sdin = SpectralDataInfoTag {
        spectral_color: u32::from_be_bytes(*b"rs\0\0"),
        spectral_range: range,
        bispectral_range: None,
    };
    let svcn = SpectralViewingConditionsTag {
        observer: 1,
        observer_range: range,
        observer_functions: (0..12).map(|i| i as f32 / 12.0).collect(),
        illuminant: 1,
        color_temperature: 5000.0,
        illuminant_range: range,
        illuminant_values: vec![0.8, 0.9, 1.0, 1.1],
        illuminant_xyz: [0.9642, 1.0, 0.8249],
        surround_xyz: [0.2, 0.2, 0.2],
    };

    let profile = ProfileBuilder::display_rgb()
        .version(5, 0)
        .tag(TagSignature::SPECTRAL_DATA_INFO, sdin.clone())
        .tag(TagSignature::SPECTRAL_VIEWING_CONDITIONS, svcn.clone())
        .attached()
        .unwrap();

    assert_eq!(profile.header().version.major, 5);
    let read_sdin: SpectralDataInfoTag = profile.find_typed(TagSignature::SPECTRAL_DATA_INFO).unwrap();
    assert_eq!(read_sdin, sdin);
    let read_svcn: SpectralViewingConditionsTag =
        profile.find_typed(TagSignature::SPECTRAL_VIEWING_CONDITIONS).unwrap();
    assert_eq!(read_svcn, svcn);

    let report = profile.validate();
    assert!(
        !report.has_finding(Check::TagContents, Some(TagSignature::SPECTRAL_VIEWING_CONDITIONS)),
        "{}",
        report
    );
}

#[test]
fn describe_lists_every_tag() {
    let profile = ProfileBuilder::cmyk_printer().attached().unwrap();
    let text = profile.describe(0);
    for entry in profile.entries() {
        assert!(text.contains(&entry.signature.to_string()), "{}", text);
    }
}

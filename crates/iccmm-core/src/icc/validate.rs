//! Profile validation
//!
//! Validation never fails and never modifies the profile. It walks the
//! header, the tag directory and every tag, collecting findings into a
//! [`ValidationReport`]. The overall verdict is the worst severity seen.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::header::{ColorSpace, ProfileClass, ProfileVersion, D50_XYZ, HEADER_SIZE};
use super::profile::{IccProfile, ProfileIdPolicy, TagEntry, TAG_ENTRY_SIZE};
use super::tags::TagContext;
use super::types::TagSignature;

/// How serious a finding is, in increasing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Severity {
    #[default]
    Ok,
    /// Legal but wasteful or unusual
    Warning,
    /// Violates the format, but the data is still usable
    NonCompliant,
    /// The data cannot be interpreted
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "ok",
            Self::Warning => "warning",
            Self::NonCompliant => "non-compliant",
            Self::Critical => "critical",
        })
    }
}

/// The individual checks a validation run performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Check {
    Header,
    TagsUnique,
    TagBounds,
    TagOverlap,
    TagPadding,
    FirstTagOffset,
    FileSizeAlignment,
    RequiredTags,
    TagContents,
    ProfileId,
}

impl Check {
    pub const ALL: [Check; 10] = [
        Check::Header,
        Check::TagsUnique,
        Check::TagBounds,
        Check::TagOverlap,
        Check::TagPadding,
        Check::FirstTagOffset,
        Check::FileSizeAlignment,
        Check::RequiredTags,
        Check::TagContents,
        Check::ProfileId,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::TagsUnique => "unique tag signatures",
            Self::TagBounds => "tag bounds",
            Self::TagOverlap => "tag overlap",
            Self::TagPadding => "tag padding",
            Self::FirstTagOffset => "first tag offset",
            Self::FileSizeAlignment => "file size multiple of 4",
            Self::RequiredTags => "required tags",
            Self::TagContents => "tag contents",
            Self::ProfileId => "profile ID",
        }
    }
}

/// One non-fatal problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFinding {
    pub check: Check,
    pub severity: Severity,
    pub tag: Option<TagSignature>,
    pub message: String,
}

impl fmt::Display for ValidationFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag {
            Some(tag) => write!(f, "[{}] {} '{}': {}", self.severity, self.check.label(), tag, self.message),
            None => write!(f, "[{}] {}: {}", self.severity, self.check.label(), self.message),
        }
    }
}

/// Outcome of one check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    NotRun,
    Passed,
    Failed(Severity),
}

/// Findings from a validation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    findings: Vec<ValidationFinding>,
    run: Vec<Check>,
}

impl ValidationReport {
    pub fn push(&mut self, finding: ValidationFinding) {
        self.mark_run(finding.check);
        self.findings.push(finding);
    }

    /// Record a profile-level finding
    pub fn finding(&mut self, check: Check, severity: Severity, message: impl Into<String>) {
        self.push(ValidationFinding {
            check,
            severity,
            tag: None,
            message: message.into(),
        });
    }

    /// Record a finding about one tag
    pub fn tag_content(
        &mut self,
        check: Check,
        tag: TagSignature,
        severity: Severity,
        message: impl Into<String>,
    ) {
        self.push(ValidationFinding {
            check,
            severity,
            tag: Some(tag),
            message: message.into(),
        });
    }

    /// Note that `check` ran, whether or not it found anything
    pub fn mark_run(&mut self, check: Check) {
        if !self.run.contains(&check) {
            self.run.push(check);
        }
    }

    pub fn status(&self, check: Check) -> CheckStatus {
        if !self.run.contains(&check) {
            return CheckStatus::NotRun;
        }
        match self
            .findings
            .iter()
            .filter(|f| f.check == check)
            .map(|f| f.severity)
            .max()
        {
            Some(severity) if severity > Severity::Ok => CheckStatus::Failed(severity),
            _ => CheckStatus::Passed,
        }
    }

    /// Worst severity across all findings
    pub fn severity(&self) -> Severity {
        self.findings.iter().map(|f| f.severity).max().unwrap_or_default()
    }

    /// No finding worse than a warning
    pub fn is_valid(&self) -> bool {
        self.severity() <= Severity::Warning
    }

    pub fn findings(&self) -> &[ValidationFinding] {
        &self.findings
    }

    pub fn findings_for(&self, check: Check) -> impl Iterator<Item = &ValidationFinding> {
        self.findings.iter().filter(move |f| f.check == check)
    }

    pub fn has_finding(&self, check: Check, tag: Option<TagSignature>) -> bool {
        self.findings_for(check)
            .any(|f| f.severity > Severity::Ok && (tag.is_none() || f.tag == tag))
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for check in Check::ALL {
            match self.status(check) {
                CheckStatus::NotRun => {}
                CheckStatus::Passed => writeln!(f, "{}: pass", check.label())?,
                CheckStatus::Failed(severity) => writeln!(f, "{}: {}", check.label(), severity)?,
            }
        }
        for finding in &self.findings {
            writeln!(f, "{}", finding)?;
        }
        write!(f, "Result: {}", self.severity())
    }
}

/// Bounds, overlap, padding, directory gap and size alignment of a
/// directory against a profile of `declared` bytes
fn check_regions(entries: &[TagEntry], declared: u64, version: ProfileVersion, report: &mut ValidationReport) {
    let mut min_offset: Option<u64> = None;
    for entry in entries {
        let offset = u64::from(entry.offset);
        min_offset = Some(min_offset.map_or(offset, |m| m.min(offset)));

        let Some(end) = entry.end() else {
            report.tag_content(
                Check::TagBounds,
                entry.signature,
                Severity::Critical,
                format!("offset {} + size {} overflows", entry.offset, entry.size),
            );
            continue;
        };
        if u64::from(end) > declared {
            report.tag_content(
                Check::TagBounds,
                entry.signature,
                Severity::NonCompliant,
                format!("ends at {}, past the declared size {}", end, declared),
            );
        }

        // closest region starting after this one
        let closest = entries
            .iter()
            .map(|e| u64::from(e.offset))
            .filter(|&o| o > offset)
            .min();
        if let Some(closest) = closest {
            if closest < u64::from(end) {
                report.tag_content(
                    Check::TagOverlap,
                    entry.signature,
                    Severity::NonCompliant,
                    format!("ends at {} but the next tag starts at {}", end, closest),
                );
            }
            let padded = offset + round_up_4(u64::from(entry.size));
            if closest > padded {
                report.tag_content(
                    Check::TagPadding,
                    entry.signature,
                    Severity::Warning,
                    format!("{} unused bytes before the next tag", closest - padded),
                );
            }
        }
    }

    let table_end = (HEADER_SIZE + 4 + TAG_ENTRY_SIZE * entries.len()) as u64;
    if let Some(first) = min_offset {
        if first > table_end {
            report.finding(
                Check::FirstTagOffset,
                Severity::Warning,
                format!("first tag at {}, directory ends at {}", first, table_end),
            );
        } else if first < table_end {
            report.finding(
                Check::FirstTagOffset,
                Severity::NonCompliant,
                format!("tag data at {} inside the directory ending at {}", first, table_end),
            );
        }
    }

    if version.at_least(4, 2) && declared % 4 != 0 {
        report.finding(
            Check::FileSizeAlignment,
            Severity::NonCompliant,
            format!("size {} is not a multiple of 4", declared),
        );
    }
}

/// Directory entries of freshly serialized bytes
fn directory_of(bytes: &[u8]) -> Vec<TagEntry> {
    let word = |at: usize| {
        bytes
            .get(at..at + 4)
            .map_or(0, |w| u32::from_be_bytes([w[0], w[1], w[2], w[3]]))
    };
    let count = word(HEADER_SIZE) as usize;
    (0..count)
        .map(|i| {
            let at = HEADER_SIZE + 4 + i * TAG_ENTRY_SIZE;
            TagEntry {
                signature: TagSignature(word(at)),
                offset: word(at + 4),
                size: word(at + 8),
            }
        })
        .collect()
}

fn round_up_4(n: u64) -> u64 {
    (n + 3) & !3
}

impl IccProfile {
    /// Run every structural and content check
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();
        for check in Check::ALL {
            report.mark_run(check);
        }
        self.check_header(&mut report);
        self.check_unique(&mut report);
        self.check_layout(&mut report);
        self.check_required(&mut report);
        self.check_contents(&mut report);
        self.check_profile_id(&mut report);
        debug!(
            "validated profile: {} findings, result {}",
            report.findings().len(),
            report.severity()
        );
        report
    }

    fn check_header(&self, report: &mut ValidationReport) {
        let header = self.header();
        let declared = u64::from(header.size);
        if self.source_len() > 0 && declared != self.source_len() {
            let severity = if declared > self.source_len() {
                Severity::Critical
            } else {
                Severity::Warning
            };
            report.finding(
                Check::Header,
                severity,
                format!("declared size {} but {} bytes present", declared, self.source_len()),
            );
        }
        if matches!(header.device_class, ProfileClass::Unknown(_)) {
            report.finding(Check::Header, Severity::NonCompliant, "unknown profile class");
        }
        if matches!(header.color_space, ColorSpace::Unknown(_)) && header.color_space.channels() == 0 {
            report.finding(Check::Header, Severity::NonCompliant, "unknown data color space");
        }
        if matches!(header.pcs, ColorSpace::Unknown(_)) {
            report.finding(Check::Header, Severity::NonCompliant, "unknown PCS");
        }
        if header.intent().is_none() {
            report.finding(
                Check::Header,
                Severity::NonCompliant,
                format!("rendering intent {} out of range", header.rendering_intent),
            );
        }
        let illuminant = header.illuminant.to_f32();
        if illuminant.iter().zip(D50_XYZ).any(|(a, b)| (a - b).abs() > 0.0005) {
            report.finding(
                Check::Header,
                Severity::NonCompliant,
                format!("illuminant {:?} is not D50", illuminant),
            );
        }
    }

    fn check_unique(&self, report: &mut ValidationReport) {
        let mut counts: HashMap<TagSignature, usize> = HashMap::new();
        for entry in self.entries() {
            *counts.entry(entry.signature).or_default() += 1;
        }
        // directory order keeps the report stable
        for entry in self.entries() {
            let n = counts.remove(&entry.signature).unwrap_or(0);
            if n > 1 && !entry.signature.is_multi_instance() {
                report.tag_content(
                    Check::TagsUnique,
                    entry.signature,
                    Severity::NonCompliant,
                    format!("appears {} times", n),
                );
            }
        }
    }

    fn check_layout(&self, report: &mut ValidationReport) {
        if self.is_laid_out() {
            let declared = u64::from(self.header().size);
            check_regions(self.entries(), declared, self.header().version, report);
            return;
        }
        // edited in memory: check the layout writing would produce
        match self.to_bytes_with(ProfileIdPolicy::Never) {
            Ok(bytes) => {
                let entries = directory_of(&bytes);
                check_regions(&entries, bytes.len() as u64, self.header().version, report);
            }
            Err(err) => report.finding(
                Check::TagBounds,
                Severity::NonCompliant,
                format!("cannot lay out tags: {}", err),
            ),
        }
    }

    fn check_required(&self, report: &mut ValidationReport) {
        let header = self.header();
        let version = header.version;
        let class = header.device_class;
        if version.is_v5() && self.has_tag(TagSignature::D2B0) {
            return;
        }

        let mut required = vec![TagSignature::DESC, TagSignature::COPYRIGHT];
        if version.major >= 4 && class != ProfileClass::DeviceLink {
            required.push(TagSignature::MEDIA_WHITE);
        }
        let has_a2b0 = self.has_tag(TagSignature::A2B0);
        match class {
            ProfileClass::Input | ProfileClass::Display if !has_a2b0 => {
                if header.color_space == ColorSpace::Gray {
                    required.push(TagSignature::GRAY_TRC);
                } else {
                    required.extend([
                        TagSignature::RED_COLORANT,
                        TagSignature::GREEN_COLORANT,
                        TagSignature::BLUE_COLORANT,
                        TagSignature::RED_TRC,
                        TagSignature::GREEN_TRC,
                        TagSignature::BLUE_TRC,
                    ]);
                }
            }
            ProfileClass::Output => {
                required.extend([TagSignature::A2B0, TagSignature::B2A0]);
                if !self.has_tag(TagSignature::GAMUT) {
                    report.tag_content(
                        Check::RequiredTags,
                        TagSignature::GAMUT,
                        Severity::Warning,
                        "output profile has no gamut tag",
                    );
                }
            }
            ProfileClass::DeviceLink | ProfileClass::Abstract => required.push(TagSignature::A2B0),
            ProfileClass::NamedColor => {
                let has_named = self.has_tag(TagSignature::NAMED_COLOR2)
                    || (version.is_v5() && self.has_tag(TagSignature::COLORANT_TABLE));
                if !has_named {
                    report.tag_content(
                        Check::RequiredTags,
                        TagSignature::NAMED_COLOR2,
                        Severity::NonCompliant,
                        "named color profile has no named color tag",
                    );
                }
            }
            _ => {}
        }

        for sig in required {
            if !self.has_tag(sig) {
                report.tag_content(Check::RequiredTags, sig, Severity::NonCompliant, "required tag missing");
            }
        }
    }

    fn check_contents(&self, report: &mut ValidationReport) {
        for (i, entry) in self.entries().iter().enumerate() {
            // shared payloads are parsed and checked once
            if (0..i).any(|j| self.shares_payload(i, j)) {
                continue;
            }
            match self.tag_at(i) {
                Ok(tag) => tag.validate(&TagContext::new(self, entry.signature), report),
                Err(err) => report.tag_content(
                    Check::TagContents,
                    entry.signature,
                    Severity::NonCompliant,
                    format!("cannot parse: {}", err),
                ),
            }
        }
    }

    fn check_profile_id(&self, report: &mut ValidationReport) {
        let stored = self.header().profile_id;
        if stored == [0; 16] {
            return;
        }
        match self.calc_profile_id() {
            Ok(computed) if computed != stored => report.finding(
                Check::ProfileId,
                Severity::NonCompliant,
                format!(
                    "stored ID {} differs from computed {}",
                    hex::encode(stored),
                    hex::encode(computed)
                ),
            ),
            Ok(_) => {}
            Err(err) => report.finding(
                Check::ProfileId,
                Severity::Warning,
                format!("cannot compute ID: {}", err),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icc::header::IccHeader;
    use crate::icc::tags::{CurveTag, TextTag, XyzTag};

    fn display() -> IccProfile {
        let mut profile = IccProfile::new(IccHeader::new(
            ProfileClass::Display,
            ColorSpace::Rgb,
            ColorSpace::Xyz,
        ));
        profile.attach_tag(TagSignature::DESC, Box::new(TextTag::new("test")));
        profile.attach_tag(TagSignature::COPYRIGHT, Box::new(TextTag::new("none")));
        profile.attach_tag(TagSignature::MEDIA_WHITE, Box::new(XyzTag::new(D50_XYZ)));
        for (sig, xyz) in [
            (TagSignature::RED_COLORANT, [0.4361, 0.2225, 0.0139]),
            (TagSignature::GREEN_COLORANT, [0.3851, 0.7169, 0.0971]),
            (TagSignature::BLUE_COLORANT, [0.1431, 0.0606, 0.7141]),
        ] {
            profile.attach_tag(sig, Box::new(XyzTag::new(xyz)));
        }
        for sig in [TagSignature::RED_TRC, TagSignature::GREEN_TRC, TagSignature::BLUE_TRC] {
            profile.attach_tag(sig, Box::new(CurveTag::Gamma(2.2)));
        }
        profile
    }

    fn attached(profile: &IccProfile) -> IccProfile {
        IccProfile::from_bytes(&profile.to_bytes().unwrap()).unwrap()
    }

    #[test]
    fn test_valid_display_profile() {
        let report = attached(&display()).validate();
        assert!(report.is_valid(), "{}", report);
        assert_eq!(report.severity(), Severity::Ok);
        assert_eq!(report.status(Check::TagOverlap), CheckStatus::Passed);
    }

    #[test]
    fn test_header_only_profile() {
        let mut header = IccHeader::new(ProfileClass::Display, ColorSpace::Rgb, ColorSpace::Xyz);
        header.size = 128;
        let profile = IccProfile::from_bytes(&header.to_bytes()).unwrap();
        let report = profile.validate();
        assert_eq!(report.status(Check::FileSizeAlignment), CheckStatus::Passed);
        assert_eq!(report.status(Check::TagsUnique), CheckStatus::Passed);
        assert_eq!(report.status(Check::TagOverlap), CheckStatus::Passed);
        assert!(report.to_string().contains("file size multiple of 4: pass"));
        assert!(profile.are_tags_unique());
        // no tags at all, so the required ones are reported
        assert!(report.has_finding(Check::RequiredTags, Some(TagSignature::DESC)));
    }

    #[test]
    fn test_missing_required_tag() {
        let mut profile = display();
        profile.delete_tag(TagSignature::GREEN_TRC);
        let report = attached(&profile).validate();
        assert_eq!(report.severity(), Severity::NonCompliant);
        assert!(report.has_finding(Check::RequiredTags, Some(TagSignature::GREEN_TRC)));
    }

    #[test]
    fn test_overlap_and_duplicate() {
        let mut bytes = display().to_bytes().unwrap();
        // point entry 1 at entry 0's payload start plus 4
        let e0 = 132;
        let e1 = 132 + 12;
        let offset0 = u32::from_be_bytes(bytes[e0 + 4..e0 + 8].try_into().unwrap());
        bytes[e1 + 4..e1 + 8].copy_from_slice(&(offset0 + 4).to_be_bytes());
        // and make entry 2 another 'desc'
        let e2 = 132 + 24;
        bytes[e2..e2 + 4].copy_from_slice(b"desc");

        let report = IccProfile::from_bytes(&bytes).unwrap().validate();
        assert!(report.has_finding(Check::TagOverlap, Some(TagSignature::DESC)));
        assert!(report.has_finding(Check::TagsUnique, Some(TagSignature::DESC)));
        assert!(!report.is_valid());
    }

    #[test]
    fn test_offset_overflow_is_critical() {
        let mut bytes = display().to_bytes().unwrap();
        let e0 = 132;
        bytes[e0 + 8..e0 + 12].copy_from_slice(&u32::MAX.to_be_bytes());
        let report = IccProfile::from_bytes(&bytes).unwrap().validate();
        assert_eq!(report.severity(), Severity::Critical);
        assert!(report.has_finding(Check::TagBounds, Some(TagSignature::DESC)));
    }

    #[test]
    fn test_profile_id_mismatch() {
        let mut bytes = display().to_bytes().unwrap();
        bytes[84] ^= 0xFF;
        let report = IccProfile::from_bytes(&bytes).unwrap().validate();
        assert!(report.has_finding(Check::ProfileId, None));

        // flags are excluded from the ID
        let mut bytes = display().to_bytes().unwrap();
        bytes[47] = 1;
        let report = IccProfile::from_bytes(&bytes).unwrap().validate();
        assert_eq!(report.status(Check::ProfileId), CheckStatus::Passed);
    }

    #[test]
    fn test_unaligned_size() {
        let mut bytes = display().to_bytes_with(crate::icc::ProfileIdPolicy::Never).unwrap();
        bytes.push(0);
        let size = bytes.len() as u32;
        bytes[0..4].copy_from_slice(&size.to_be_bytes());
        let report = IccProfile::from_bytes(&bytes).unwrap().validate();
        assert_eq!(
            report.status(Check::FileSizeAlignment),
            CheckStatus::Failed(Severity::NonCompliant)
        );
    }

    #[test]
    fn test_report_serializes() {
        let report = attached(&display()).validate();
        let json = serde_json::to_string(&report).unwrap();
        let back: ValidationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}

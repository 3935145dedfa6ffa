//! JSON form of a profile
//!
//! [`save`] writes the header fields and, per tag, its signature, type, a
//! human-readable description and the payload as hex. [`load`] rebuilds
//! an in-memory profile from that document. Descriptions are for readers
//! only and are ignored on load; the payload hex is authoritative.
//!
//! ```json
//! {
//!   "header": { "version": "4.3.0", "device_class": "mntr", ... },
//!   "tags": [
//!     { "signature": "rXYZ", "type": "XYZ ", "description": "...", "data": "58595a20..." }
//!   ]
//! }
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::icc::tags::{Tag, UnknownTag};
use crate::icc::{ColorSpace, IccHeader, IccProfile, ProfileClass, TagSignature, TypeSignature};
use crate::icc::types::XyzNumber;

/// Header fields in readable form
///
/// `raw` carries the complete 128-byte header so fields without a named
/// entry survive. Named entries override it on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderFields {
    pub version: String,
    pub device_class: TypeSignature,
    pub color_space: TypeSignature,
    pub pcs: TypeSignature,
    pub rendering_intent: u32,
    pub flags: u32,
    pub attributes: u64,
    pub cmm_type: TypeSignature,
    pub platform: TypeSignature,
    pub manufacturer: TypeSignature,
    pub model: TypeSignature,
    pub creator: TypeSignature,
    pub illuminant: [f32; 3],
    pub profile_id: String,
    pub raw: String,
}

/// One directory entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRecord {
    pub signature: TagSignature,
    #[serde(rename = "type")]
    pub type_sig: TypeSignature,
    #[serde(default)]
    pub description: String,
    /// Entry shares its payload with an earlier signature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_as: Option<TagSignature>,
    /// Payload bytes as hex, empty when `same_as` is set
    #[serde(default)]
    pub data: String,
}

/// The whole document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileDocument {
    pub header: HeaderFields,
    pub tags: Vec<TagRecord>,
}

impl ProfileDocument {
    pub fn from_profile(profile: &IccProfile) -> Result<Self> {
        let header = profile.header();
        let fields = HeaderFields {
            version: format!(
                "{}.{}.{}",
                header.version.major, header.version.minor, header.version.patch
            ),
            device_class: TypeSignature(header.device_class.to_u32()),
            color_space: TypeSignature(header.color_space.to_u32()),
            pcs: TypeSignature(header.pcs.to_u32()),
            rendering_intent: header.rendering_intent,
            flags: header.flags,
            attributes: header.attributes,
            cmm_type: TypeSignature(header.cmm_type),
            platform: TypeSignature(header.platform),
            manufacturer: TypeSignature(header.manufacturer),
            model: TypeSignature(header.model),
            creator: TypeSignature(header.creator),
            illuminant: header.illuminant.to_f32(),
            profile_id: hex::encode(header.profile_id),
            raw: hex::encode(header.to_bytes()),
        };

        let mut tags: Vec<TagRecord> = Vec::with_capacity(profile.entries().len());
        let mut loaded: Vec<Option<Arc<dyn Tag>>> = Vec::with_capacity(profile.entries().len());
        for (i, entry) in profile.entries().iter().enumerate() {
            let parsed = profile.tag_at(i);
            let shared_with = (0..i).find(|&j| match (&parsed, &loaded[j]) {
                (Ok(a), Some(b)) => Arc::ptr_eq(a, b),
                _ => profile.shares_payload(i, j),
            });

            let record = match (&parsed, shared_with) {
                (_, Some(j)) => TagRecord {
                    signature: entry.signature,
                    type_sig: tags[j].type_sig,
                    description: String::new(),
                    same_as: Some(profile.entries()[j].signature),
                    data: String::new(),
                },
                (Ok(tag), None) => {
                    // Attached payloads go out verbatim, in-memory ones are serialized
                    let bytes = match profile.read_raw(*entry) {
                        Ok(bytes) if profile.is_placed(i) => bytes,
                        _ => tag.to_bytes()?,
                    };
                    TagRecord {
                        signature: entry.signature,
                        type_sig: tag.type_sig(),
                        description: tag.describe(1),
                        same_as: None,
                        data: hex::encode(bytes),
                    }
                }
                (Err(err), None) => {
                    let bytes = profile.read_raw(*entry)?;
                    let opaque = UnknownTag::from_payload(&bytes);
                    TagRecord {
                        signature: entry.signature,
                        type_sig: opaque.type_sig(),
                        description: format!("unparsable: {}", err),
                        same_as: None,
                        data: hex::encode(bytes),
                    }
                }
            };
            tags.push(record);
            loaded.push(parsed.ok());
        }

        Ok(Self { header: fields, tags })
    }

    /// Build an in-memory profile
    pub fn to_profile(&self) -> Result<IccProfile> {
        let raw = decode_hex("header", &self.header.raw)?;
        let mut header = IccHeader::parse(&raw)?;
        self.header.apply_to(&mut header)?;

        let mut profile = IccProfile::new(header);
        let mut instances: Vec<(TagSignature, Arc<dyn Tag>)> = Vec::with_capacity(self.tags.len());
        for record in &self.tags {
            let tag = match record.same_as {
                Some(first) => instances
                    .iter()
                    .find(|(sig, _)| *sig == first)
                    .map(|(_, tag)| Arc::clone(tag))
                    .ok_or_else(|| {
                        Error::Textual(format!(
                            "tag '{}' refers to '{}', which does not precede it",
                            record.signature, first
                        ))
                    })?,
                None => Arc::from(read_tag(&profile, record)?),
            };
            profile.attach_shared(record.signature, Arc::clone(&tag));
            instances.push((record.signature, tag));
        }
        debug!("loaded {} tags from textual form", self.tags.len());
        Ok(profile)
    }
}

impl HeaderFields {
    fn apply_to(&self, header: &mut IccHeader) -> Result<()> {
        let (major, minor, patch) = parse_version(&self.version)?;
        header.version.major = major;
        header.version.minor = minor;
        header.version.patch = patch;
        header.device_class = ProfileClass::from_u32(self.device_class.0);
        header.color_space = ColorSpace::from_u32(self.color_space.0);
        header.pcs = ColorSpace::from_u32(self.pcs.0);
        header.rendering_intent = self.rendering_intent;
        header.flags = self.flags;
        header.attributes = self.attributes;
        header.cmm_type = self.cmm_type.0;
        header.platform = self.platform.0;
        header.manufacturer = self.manufacturer.0;
        header.model = self.model.0;
        header.creator = self.creator.0;
        header.illuminant = XyzNumber::from_f32(self.illuminant);

        let id = decode_hex("profile ID", &self.profile_id)?;
        header.profile_id = id
            .try_into()
            .map_err(|_| Error::Textual("profile ID must be 16 bytes".to_string()))?;
        Ok(())
    }
}

fn read_tag(profile: &IccProfile, record: &TagRecord) -> Result<Box<dyn Tag>> {
    let bytes = decode_hex(&record.signature.to_string(), &record.data)?;
    if bytes.len() < 8 {
        return Err(Error::Textual(format!("tag '{}' payload is too short", record.signature)));
    }
    let stored = TypeSignature(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]));
    if stored != record.type_sig {
        return Err(Error::Textual(format!(
            "tag '{}' says type '{}' but its payload is '{}'",
            record.signature, record.type_sig, stored
        )));
    }

    let mut tag = profile.registry().create(stored);
    if let Err(err) = tag.read(&bytes) {
        warn!("tag '{}' kept opaque: {}", record.signature, err);
        return Ok(Box::new(UnknownTag::from_payload(&bytes)));
    }
    Ok(tag)
}

fn decode_hex(what: &str, text: &str) -> Result<Vec<u8>> {
    hex::decode(text.trim()).map_err(|e| Error::Textual(format!("{}: {}", what, e)))
}

/// "major.minor.patch", missing parts read as zero
fn parse_version(text: &str) -> Result<(u8, u8, u8)> {
    let mut parts = text.split('.').map(str::parse::<u8>);
    let mut next = || {
        parts
            .next()
            .unwrap_or(Ok(0))
            .map_err(|_| Error::Textual(format!("bad version '{}'", text)))
    };
    Ok((next()?, next()?, next()?))
}

/// Profile as a pretty-printed JSON document
pub fn save(profile: &IccProfile) -> Result<String> {
    let doc = ProfileDocument::from_profile(profile)?;
    Ok(serde_json::to_string_pretty(&doc)?)
}

/// Rebuild a profile from [`save`] output
pub fn load(text: &str) -> Result<IccProfile> {
    let doc: ProfileDocument = serde_json::from_str(text)?;
    doc.to_profile()
}

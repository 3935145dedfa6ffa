//! ICC profile container
//!
//! An [`IccProfile`] owns its byte source. Attaching reads the header and
//! the tag directory; tag payloads are only parsed when first asked for,
//! and the parsed object is cached. Directory entries that point at the
//! same (offset, size) region share one cached object.
//!
//! # Example
//!
//! ```ignore
//! use iccmm_core::icc::IccProfile;
//!
//! let profile = IccProfile::from_bytes(&bytes)?;
//! let desc = profile.find_tag(TagSignature::DESC)?;
//! println!("{}", desc.describe(1));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::io::SeekFrom;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::error::{ParseError, WriteError};
use super::header::{
    IccHeader, FLAGS_RANGE, HEADER_SIZE, INTENT_RANGE, PROFILE_ID_RANGE,
};
use super::registry::TagRegistry;
use super::tags::Tag;
use super::types::{TagSignature, TypeSignature};
use crate::io::{BeWrite, FileIo, IccIo, MemIo};

/// Bytes per tag directory entry
pub const TAG_ENTRY_SIZE: usize = 12;

/// One tag directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagEntry {
    pub signature: TagSignature,
    pub offset: u32,
    pub size: u32,
}

impl TagEntry {
    /// offset + size, or `None` if it overflows 32 bits
    pub fn end(&self) -> Option<u32> {
        self.offset.checked_add(self.size)
    }
}

/// How [`IccProfile::attach_with`] treats the directory
#[derive(Debug, Clone)]
pub struct AttachOptions {
    pub registry: Arc<TagRegistry>,
    /// Reject entries whose region overflows or runs past the declared size
    pub strict: bool,
}

impl Default for AttachOptions {
    fn default() -> Self {
        Self {
            registry: Arc::new(TagRegistry::new()),
            strict: false,
        }
    }
}

impl AttachOptions {
    pub fn with_registry(mut self, registry: Arc<TagRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// When [`IccProfile::to_bytes_with`] fills in the profile ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProfileIdPolicy {
    /// Compute it for v4 and later, zero it for v2
    #[default]
    VersionBased,
    Always,
    Never,
}

type TagSlot = OnceLock<Result<Arc<dyn Tag>, ParseError>>;

/// An ICC profile: header, tag directory, and lazily parsed tags
pub struct IccProfile {
    header: IccHeader,
    entries: Vec<TagEntry>,
    /// Index into `slots` for each entry
    slot_of: Vec<usize>,
    /// Whether each entry's offset and size describe bytes in the source.
    /// Tags attached in memory have no placement until written.
    placed: Vec<bool>,
    slots: Vec<TagSlot>,
    source: Mutex<Option<Box<dyn IccIo>>>,
    source_len: u64,
    registry: Arc<TagRegistry>,
}

impl fmt::Debug for IccProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IccProfile")
            .field("header", &self.header)
            .field("entries", &self.entries)
            .field("source_len", &self.source_len)
            .finish()
    }
}

impl IccProfile {
    /// Empty in-memory profile
    pub fn new(header: IccHeader) -> Self {
        Self::with_registry(header, Arc::new(TagRegistry::new()))
    }

    pub fn with_registry(header: IccHeader, registry: Arc<TagRegistry>) -> Self {
        Self {
            header,
            entries: Vec::new(),
            slot_of: Vec::new(),
            placed: Vec::new(),
            slots: Vec::new(),
            source: Mutex::new(None),
            source_len: 0,
            registry,
        }
    }

    /// Attach a byte source with the default, lenient options
    pub fn attach(io: Box<dyn IccIo>) -> Result<Self, ParseError> {
        Self::attach_with(io, &AttachOptions::default())
    }

    /// Attach a copy of `data`
    pub fn from_bytes(data: &[u8]) -> Result<Self, ParseError> {
        Self::attach(Box::new(MemIo::from_slice(data)))
    }

    /// Attach a profile file, which stays open for lazy tag reads
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ParseError> {
        Self::attach(Box::new(FileIo::open(path)?))
    }

    /// Read the header and tag directory from `io` and take ownership of it.
    /// On failure nothing is kept.
    pub fn attach_with(mut io: Box<dyn IccIo>, options: &AttachOptions) -> Result<Self, ParseError> {
        let len = io.len();
        if len < HEADER_SIZE as u64 {
            return Err(ParseError::TooSmall {
                expected: HEADER_SIZE,
                actual: len as usize,
            });
        }
        if !io.seek(SeekFrom::Start(0)) {
            return Err(ParseError::Io("cannot seek to start of profile".into()));
        }
        let mut raw = [0u8; HEADER_SIZE];
        io.read_exact(&mut raw)?;
        let header = IccHeader::parse(&raw)?;

        // A bare header is a valid profile with no tags
        let count = if len >= HEADER_SIZE as u64 + 4 {
            io.read_u32()?
        } else {
            trace!("profile ends after header, no tag table");
            0
        };
        let available = len - (HEADER_SIZE as u64 + 4).min(len);
        if u64::from(count) * TAG_ENTRY_SIZE as u64 > len {
            return Err(ParseError::AbsurdTagCount { count, available });
        }
        if u64::from(count) * TAG_ENTRY_SIZE as u64 > available {
            return Err(ParseError::TagTableTruncated { count, available });
        }

        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let entry = TagEntry {
                signature: TagSignature(io.read_u32()?),
                offset: io.read_u32()?,
                size: io.read_u32()?,
            };
            match entry.end() {
                None => {
                    if options.strict {
                        return Err(ParseError::OffsetOverflow {
                            tag: entry.signature.0,
                            offset: entry.offset,
                            size: entry.size,
                        });
                    }
                    warn!("tag '{}' offset {} + size {} overflows", entry.signature, entry.offset, entry.size);
                }
                Some(end) if end > header.size => {
                    if options.strict {
                        return Err(ParseError::TagOutOfBounds {
                            tag: entry.signature.0,
                            offset: entry.offset,
                            size: entry.size,
                            limit: u64::from(header.size),
                        });
                    }
                    warn!("tag '{}' ends at {} past declared size {}", entry.signature, end, header.size);
                }
                Some(_) => {}
            }
            entries.push(entry);
        }

        let mut shared: HashMap<(u32, u32), usize> = HashMap::new();
        let slot_of: Vec<usize> = entries
            .iter()
            .map(|e| {
                let next = shared.len();
                *shared.entry((e.offset, e.size)).or_insert(next)
            })
            .collect();
        let slots = (0..shared.len()).map(|_| OnceLock::new()).collect();

        debug!(
            "attached {} profile: {} tags, {} distinct payloads, {} bytes",
            header.version,
            entries.len(),
            shared.len(),
            len
        );

        let placed = vec![true; entries.len()];
        Ok(Self {
            header,
            entries,
            slot_of,
            placed,
            slots,
            source: Mutex::new(Some(io)),
            source_len: len,
            registry: Arc::clone(&options.registry),
        })
    }

    pub fn header(&self) -> &IccHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut IccHeader {
        &mut self.header
    }

    pub fn entries(&self) -> &[TagEntry] {
        &self.entries
    }

    pub fn registry(&self) -> &Arc<TagRegistry> {
        &self.registry
    }

    /// Length of the attached byte source, zero for in-memory profiles
    pub fn source_len(&self) -> u64 {
        self.source_len
    }

    /// Index of the first directory entry for `sig`
    pub fn find_tag_index(&self, sig: TagSignature) -> Option<usize> {
        self.entries.iter().position(|e| e.signature == sig)
    }

    pub fn has_tag(&self, sig: TagSignature) -> bool {
        self.find_tag_index(sig).is_some()
    }

    /// Parsed tag for the first entry matching `sig`
    pub fn find_tag(&self, sig: TagSignature) -> Result<Arc<dyn Tag>, ParseError> {
        let index = self.find_tag_index(sig).ok_or(ParseError::TagNotFound(sig.0))?;
        self.tag_at(index)
    }

    /// Parsed tag of a concrete type, `None` if absent, unparsable or of
    /// another type
    pub fn find_typed<T: Tag + Clone + 'static>(&self, sig: TagSignature) -> Option<T> {
        let tag = self.find_tag(sig).ok()?;
        tag.downcast_ref::<T>().cloned()
    }

    /// Parsed tag for directory entry `index`
    pub fn tag_at(&self, index: usize) -> Result<Arc<dyn Tag>, ParseError> {
        let entry = *self
            .entries
            .get(index)
            .ok_or_else(|| ParseError::CorruptedData(format!("no directory entry {}", index)))?;
        self.slots[self.slot_of[index]]
            .get_or_init(|| self.load(entry))
            .clone()
    }

    /// True if entry `index` was read from the byte source and has not been
    /// replaced since
    pub fn is_placed(&self, index: usize) -> bool {
        self.placed.get(index).copied().unwrap_or(false)
    }

    /// True if every entry's offset and size point into the byte source
    pub fn is_laid_out(&self) -> bool {
        self.placed.iter().all(|&p| p)
    }

    /// True if two entries resolve to the same cached tag
    pub fn shares_payload(&self, a: usize, b: usize) -> bool {
        matches!((self.slot_of.get(a), self.slot_of.get(b)), (Some(x), Some(y)) if x == y)
    }

    fn load(&self, entry: TagEntry) -> Result<Arc<dyn Tag>, ParseError> {
        let bytes = self.read_raw(entry)?;
        if bytes.len() < 8 {
            return Err(ParseError::Truncated {
                wanted: 8,
                available: bytes.len(),
            });
        }
        let type_sig = TypeSignature(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]));
        let mut tag = self.registry.create(type_sig);
        if let Err(err) = tag.read(&bytes) {
            debug!("tag '{}' of type '{}' failed to parse: {}", entry.signature, type_sig, err);
            return Err(err);
        }
        trace!("parsed tag '{}' as {}", entry.signature, self.registry.type_name(type_sig));
        Ok(Arc::from(tag))
    }

    /// The payload bytes of `entry`, straight from the byte source
    pub fn read_raw(&self, entry: TagEntry) -> Result<Vec<u8>, ParseError> {
        let end = entry.end().ok_or(ParseError::OffsetOverflow {
            tag: entry.signature.0,
            offset: entry.offset,
            size: entry.size,
        })?;
        if u64::from(end) > self.source_len {
            return Err(ParseError::TagOutOfBounds {
                tag: entry.signature.0,
                offset: entry.offset,
                size: entry.size,
                limit: self.source_len,
            });
        }
        let mut guard = self
            .source
            .lock()
            .map_err(|_| ParseError::Io("byte source lock poisoned".into()))?;
        let io = guard
            .as_mut()
            .ok_or_else(|| ParseError::Io("no byte source attached".into()))?;
        if !io.seek(SeekFrom::Start(u64::from(entry.offset))) {
            return Err(ParseError::Io(format!("cannot seek to {}", entry.offset)));
        }
        let mut bytes = vec![0u8; entry.size as usize];
        io.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    /// Every byte of the attached source
    pub fn source_bytes(&self) -> Result<Vec<u8>, ParseError> {
        let len = u32::try_from(self.source_len)
            .map_err(|_| ParseError::CorruptedData("byte source exceeds 4 GiB".into()))?;
        self.read_raw(TagEntry {
            signature: TagSignature(0),
            offset: 0,
            size: len,
        })
    }

    /// Add or replace the tag for `sig`
    pub fn attach_tag(&mut self, sig: TagSignature, tag: Box<dyn Tag>) {
        self.attach_shared(sig, Arc::from(tag));
    }

    /// Add or replace the tag for `sig` with an instance that other
    /// signatures may also use. Shared instances are written once.
    pub fn attach_shared(&mut self, sig: TagSignature, tag: Arc<dyn Tag>) {
        let filled = OnceLock::from(Ok(tag));
        match self.find_tag_index(sig) {
            Some(index) => {
                let slot = self.slot_of[index];
                let exclusive = self
                    .slot_of
                    .iter()
                    .enumerate()
                    .all(|(i, &s)| i == index || s != slot);
                if exclusive {
                    self.slots[slot] = filled;
                } else {
                    self.slot_of[index] = self.slots.len();
                    self.slots.push(filled);
                }
                self.entries[index].offset = 0;
                self.entries[index].size = 0;
                self.placed[index] = false;
            }
            None => {
                self.entries.push(TagEntry {
                    signature: sig,
                    offset: 0,
                    size: 0,
                });
                self.slot_of.push(self.slots.len());
                self.slots.push(filled);
                self.placed.push(false);
            }
        }
    }

    /// Number of cached tag slots, one per distinct payload
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Remove every entry for `sig`. Returns whether any existed.
    pub fn delete_tag(&mut self, sig: TagSignature) -> bool {
        let before = self.entries.len();
        let mut i = 0;
        while i < self.entries.len() {
            if self.entries[i].signature == sig {
                self.entries.remove(i);
                self.slot_of.remove(i);
                self.placed.remove(i);
            } else {
                i += 1;
            }
        }
        before != self.entries.len()
    }

    /// No signature appears twice, except those allowed to repeat
    pub fn are_tags_unique(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        self.entries
            .iter()
            .all(|e| e.signature.is_multi_instance() || seen.insert(e.signature))
    }

    /// MD5 over `data` with the flags, rendering intent and ID zeroed
    pub fn compute_profile_id(data: &[u8]) -> [u8; 16] {
        let mut copy = data.to_vec();
        for range in [FLAGS_RANGE, INTENT_RANGE, PROFILE_ID_RANGE] {
            if let Some(bytes) = copy.get_mut(range) {
                bytes.fill(0);
            }
        }
        Md5::digest(&copy).into()
    }

    /// Profile ID of the attached bytes, or of the serialized profile when
    /// nothing is attached
    pub fn calc_profile_id(&self) -> Result<[u8; 16], WriteError> {
        match self.source_bytes() {
            Ok(bytes) => Ok(Self::compute_profile_id(&bytes)),
            Err(_) => Ok(Self::compute_profile_id(&self.to_bytes_with(ProfileIdPolicy::Never)?)),
        }
    }

    /// Serialize with the version-based profile ID policy
    pub fn to_bytes(&self) -> Result<Vec<u8>, WriteError> {
        self.to_bytes_with(ProfileIdPolicy::default())
    }

    /// Lay out the header, directory and tags. Tags go in directory order,
    /// each 4-byte aligned, and shared payloads are written once.
    pub fn to_bytes_with(&self, policy: ProfileIdPolicy) -> Result<Vec<u8>, WriteError> {
        let count = self.entries.len();
        let mut out = vec![0u8; HEADER_SIZE];
        out.put_u32(u32::try_from(count).map_err(|_| WriteError::TooLarge(count))?);
        out.put_zeros(count * TAG_ENTRY_SIZE);

        // (slot, tag instance, offset, size) of payloads already written
        let mut written: Vec<(usize, Option<Arc<dyn Tag>>, u32, u32)> = Vec::new();
        for (i, entry) in self.entries.iter().enumerate() {
            let slot = self.slot_of[i];
            let parsed = self.tag_at(i).ok();
            let previous = written.iter().find(|(s, tag, _, _)| {
                *s == slot
                    || matches!((tag, &parsed), (Some(a), Some(b)) if Arc::ptr_eq(a, b))
            });

            let (offset, size) = match previous {
                Some(&(_, _, offset, size)) => (offset, size),
                None => {
                    out.pad4();
                    let start = out.len();
                    match &parsed {
                        Some(tag) => tag.write(&mut out)?,
                        None => {
                            let raw = self
                                .read_raw(*entry)
                                .map_err(|e| WriteError::tag(entry.signature.0, e.to_string()))?;
                            out.extend_from_slice(&raw);
                        }
                    }
                    let offset = u32::try_from(start).map_err(|_| WriteError::TooLarge(start))?;
                    let size = u32::try_from(out.len() - start)
                        .map_err(|_| WriteError::TooLarge(out.len()))?;
                    written.push((slot, parsed.clone(), offset, size));
                    (offset, size)
                }
            };

            let at = HEADER_SIZE + 4 + i * TAG_ENTRY_SIZE;
            out[at..at + 4].copy_from_slice(&entry.signature.0.to_be_bytes());
            out[at + 4..at + 8].copy_from_slice(&offset.to_be_bytes());
            out[at + 8..at + 12].copy_from_slice(&size.to_be_bytes());
        }
        out.pad4();

        let mut header = self.header.clone();
        header.size = u32::try_from(out.len()).map_err(|_| WriteError::TooLarge(out.len()))?;
        header.profile_id = [0; 16];
        out[..HEADER_SIZE].copy_from_slice(&header.to_bytes());

        let with_id = match policy {
            ProfileIdPolicy::Always => true,
            ProfileIdPolicy::Never => false,
            ProfileIdPolicy::VersionBased => header.version.major >= 4,
        };
        if with_id {
            let id = Self::compute_profile_id(&out);
            out[PROFILE_ID_RANGE].copy_from_slice(&id);
        }
        debug!("serialized profile: {} tags, {} bytes", count, out.len());
        Ok(out)
    }

    /// Serialize into `io`, returning the number of bytes written
    pub fn write(&self, io: &mut dyn IccIo) -> Result<usize, WriteError> {
        self.write_with(io, ProfileIdPolicy::default())
    }

    pub fn write_with(&self, io: &mut dyn IccIo, policy: ProfileIdPolicy) -> Result<usize, WriteError> {
        let bytes = self.to_bytes_with(policy)?;
        Ok(io.write(&bytes)?)
    }

    /// Multi-line summary of the header and directory
    pub fn describe(&self, verbosity: u32) -> String {
        let mut s = self.header.describe();
        s.push_str(&format!("\nTags: {}\n", self.entries.len()));
        for (i, entry) in self.entries.iter().enumerate() {
            let kind = match self.tag_at(i) {
                Ok(tag) => self.registry.type_name(tag.type_sig()).to_string(),
                Err(e) => format!("unparsable ({})", e),
            };
            s.push_str(&format!(
                "  {:>4}  {:>8}  {:>8}  {}\n",
                entry.signature, entry.offset, entry.size, kind
            ));
        }
        if verbosity > 0 {
            for (i, entry) in self.entries.iter().enumerate() {
                if let Ok(tag) = self.tag_at(i) {
                    s.push_str(&format!("\n'{}':\n{}", entry.signature, tag.describe(verbosity)));
                }
            }
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icc::header::{ColorSpace, ProfileClass};
    use crate::icc::tags::{TextTag, XyzTag};

    fn header() -> IccHeader {
        IccHeader::new(ProfileClass::Display, ColorSpace::Rgb, ColorSpace::Xyz)
    }

    fn sample() -> IccProfile {
        let mut profile = IccProfile::new(header());
        profile.attach_tag(TagSignature::COPYRIGHT, Box::new(TextTag::new("none")));
        profile.attach_tag(TagSignature::MEDIA_WHITE, Box::new(XyzTag::new([0.9642, 1.0, 0.8249])));
        profile
    }

    #[test]
    fn test_header_only_profile() {
        let mut bytes = header().to_bytes().to_vec();
        bytes[0..4].copy_from_slice(&128u32.to_be_bytes());
        let profile = IccProfile::from_bytes(&bytes).unwrap();
        assert!(profile.entries().is_empty());
        assert!(profile.are_tags_unique());
    }

    #[test]
    fn test_too_small() {
        assert!(matches!(
            IccProfile::from_bytes(&[0u8; 100]),
            Err(ParseError::TooSmall { actual: 100, .. })
        ));
    }

    #[test]
    fn test_absurd_tag_count() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[128..132].copy_from_slice(&u32::MAX.to_be_bytes());
        assert!(matches!(
            IccProfile::from_bytes(&bytes),
            Err(ParseError::AbsurdTagCount { .. })
        ));

        // 24 entries fit in 300 bytes, but not after the header
        bytes.resize(300, 0);
        bytes[128..132].copy_from_slice(&24u32.to_be_bytes());
        assert!(matches!(
            IccProfile::from_bytes(&bytes),
            Err(ParseError::TagTableTruncated { count: 24, available: 168 })
        ));

        bytes[128..132].copy_from_slice(&26u32.to_be_bytes());
        assert!(matches!(
            IccProfile::from_bytes(&bytes),
            Err(ParseError::AbsurdTagCount { count: 26, .. })
        ));
    }

    #[test]
    fn test_replacing_a_tag_reuses_its_slot() {
        let mut profile = sample();
        let slots = profile.slot_count();
        for i in 0..10 {
            profile.attach_tag(TagSignature::COPYRIGHT, Box::new(TextTag::new(format!("v{}", i))));
        }
        assert_eq!(profile.slot_count(), slots);
        let text: TextTag = profile.find_typed(TagSignature::COPYRIGHT).unwrap();
        assert_eq!(text, TextTag::new("v9"));
    }

    #[test]
    fn test_replacing_a_shared_tag_keeps_the_other() {
        let white: Arc<dyn Tag> = Arc::new(XyzTag::new([0.5, 1.0, 0.75]));
        let mut profile = IccProfile::new(header());
        profile.attach_shared(TagSignature::MEDIA_WHITE, Arc::clone(&white));
        profile.attach_shared(TagSignature::MEDIA_BLACK, white);
        let mut attached = IccProfile::from_bytes(&profile.to_bytes().unwrap()).unwrap();
        assert!(attached.shares_payload(0, 1));
        assert!(attached.is_laid_out());

        attached.attach_tag(TagSignature::MEDIA_BLACK, Box::new(XyzTag::new([0.0, 0.0, 0.0])));
        assert!(!attached.shares_payload(0, 1));
        assert!(attached.is_placed(0));
        assert!(!attached.is_placed(1));
        let kept: XyzTag = attached.find_typed(TagSignature::MEDIA_WHITE).unwrap();
        assert_eq!(kept.xyz(), Some([0.5, 1.0, 0.75]));
        let replaced: XyzTag = attached.find_typed(TagSignature::MEDIA_BLACK).unwrap();
        assert_eq!(replaced.xyz(), Some([0.0, 0.0, 0.0]));
    }

    #[test]
    fn test_write_then_attach() {
        let bytes = sample().to_bytes().unwrap();
        assert_eq!(bytes.len() % 4, 0);
        assert_eq!(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize, bytes.len());

        let profile = IccProfile::from_bytes(&bytes).unwrap();
        assert_eq!(profile.entries().len(), 2);
        // first tag directly after the directory
        assert_eq!(profile.entries()[0].offset, 128 + 4 + 24);
        let text = profile.find_typed::<TextTag>(TagSignature::COPYRIGHT).unwrap();
        assert_eq!(text.text, "none");
        assert!(matches!(
            profile.find_tag(TagSignature::DESC),
            Err(ParseError::TagNotFound(_))
        ));

        // v4 writes carry an ID that matches a recomputation
        assert_eq!(&bytes[84..100], &IccProfile::compute_profile_id(&bytes));
        assert_eq!(profile.calc_profile_id().unwrap(), profile.header().profile_id);
    }

    #[test]
    fn test_profile_id_ignores_flags_intent_and_id() {
        let mut data = vec![0u8; 128];
        assert_eq!(
            hex::encode(IccProfile::compute_profile_id(&data)),
            "f09f35a5637839458e462e6350ecbce4"
        );
        data[44..48].fill(0xff);
        data[64..68].copy_from_slice(&3u32.to_be_bytes());
        data[84..100].fill(0x5a);
        assert_eq!(
            hex::encode(IccProfile::compute_profile_id(&data)),
            "f09f35a5637839458e462e6350ecbce4"
        );
        data[40] = 1;
        assert_ne!(
            hex::encode(IccProfile::compute_profile_id(&data)),
            "f09f35a5637839458e462e6350ecbce4"
        );
    }

    #[test]
    fn test_shared_payload_written_once() {
        let mut profile = IccProfile::new(header());
        let tag: Arc<dyn Tag> = Arc::new(TextTag::new("shared"));
        profile.attach_shared(TagSignature::COPYRIGHT, Arc::clone(&tag));
        profile.attach_shared(TagSignature::DESC, tag);
        let bytes = profile.to_bytes().unwrap();

        let attached = IccProfile::from_bytes(&bytes).unwrap();
        let [a, b] = [attached.entries()[0], attached.entries()[1]];
        assert_eq!((a.offset, a.size), (b.offset, b.size));
        assert!(attached.shares_payload(0, 1));
        assert!(Arc::ptr_eq(
            &attached.tag_at(0).unwrap(),
            &attached.tag_at(1).unwrap()
        ));
    }

    #[test]
    fn test_unparsable_tag_round_trips_raw() {
        let mut bytes = sample().to_bytes_with(ProfileIdPolicy::Never).unwrap();
        // relabel the XYZ payload as a lut16, which it is far too short for
        let entry_at = 128 + 4 + 12;
        let offset = u32::from_be_bytes(bytes[entry_at + 4..entry_at + 8].try_into().unwrap()) as usize;
        bytes[offset..offset + 4].copy_from_slice(b"mft2");

        let profile = IccProfile::from_bytes(&bytes).unwrap();
        assert!(profile.find_tag(TagSignature::MEDIA_WHITE).is_err());
        let again = profile.to_bytes_with(ProfileIdPolicy::Never).unwrap();
        assert_eq!(again, bytes);
    }

    #[test]
    fn test_strict_rejects_out_of_bounds() {
        let mut bytes = sample().to_bytes().unwrap();
        let size_at = 128 + 4 + 8;
        bytes[size_at..size_at + 4].copy_from_slice(&0xFFFF_FFF0u32.to_be_bytes());

        let lenient = IccProfile::from_bytes(&bytes).unwrap();
        assert!(matches!(
            lenient.find_tag(TagSignature::COPYRIGHT),
            Err(ParseError::OffsetOverflow { .. })
        ));

        let strict = AttachOptions::default().with_strict(true);
        assert!(IccProfile::attach_with(Box::new(MemIo::from_slice(&bytes)), &strict).is_err());
    }

    #[test]
    fn test_delete_and_replace() {
        let mut profile = sample();
        profile.attach_tag(TagSignature::COPYRIGHT, Box::new(TextTag::new("other")));
        assert_eq!(profile.entries().len(), 2);
        let text = profile.find_typed::<TextTag>(TagSignature::COPYRIGHT).unwrap();
        assert_eq!(text.text, "other");

        assert!(profile.delete_tag(TagSignature::COPYRIGHT));
        assert!(!profile.delete_tag(TagSignature::COPYRIGHT));
        assert_eq!(profile.entries().len(), 1);
        assert!(profile.find_tag(TagSignature::MEDIA_WHITE).is_ok());
    }

    #[test]
    fn test_write_to_io() {
        let mut io = MemIo::growable();
        let n = sample().write(&mut io).unwrap();
        assert_eq!(n, io.as_slice().len());

        let mut small = MemIo::with_capacity(64);
        assert!(sample().write(&mut small).is_err());
    }
}

//! ICC Profile Header
//!
//! The ICC profile header is exactly 128 bytes and contains basic profile
//! information. See ICC.1:2022 Section 7.2 and ICC.2:2019 Section 7.2 for
//! the v5 fields at bytes 100..128.
//!
//! Unknown class and color space signatures are kept as raw values so that
//! a damaged header can still be attached, described and validated.

use super::error::{ParseError, sig_str};
use super::types::{DateTimeNumber, SpectralRange, XyzNumber};

/// Profile file signature - must be 'acsp' (0x61637370)
pub const PROFILE_SIGNATURE: u32 = 0x61637370;

/// Header size, and the minimum valid profile size
pub const HEADER_SIZE: usize = 128;

/// Byte ranges zeroed when computing the profile ID
pub const FLAGS_RANGE: std::ops::Range<usize> = 44..48;
pub const INTENT_RANGE: std::ops::Range<usize> = 64..68;
pub const PROFILE_ID_RANGE: std::ops::Range<usize> = 84..100;

/// PCS illuminant D50 as stored in s15Fixed16
pub const D50_XYZ: [f32; 3] = [0.9642, 1.0, 0.8249];

/// ICC Profile Header (128 bytes)
#[derive(Debug, Clone, PartialEq)]
pub struct IccHeader {
    /// Profile size in bytes
    pub size: u32,
    /// Preferred CMM type signature
    pub cmm_type: u32,
    /// Profile version, including the v5 sub-class version
    pub version: ProfileVersion,
    /// Device class (display, input, output, etc.)
    pub device_class: ProfileClass,
    /// Color space of data (RGB, CMYK, etc.)
    pub color_space: ColorSpace,
    /// Profile connection space (XYZ or Lab)
    pub pcs: ColorSpace,
    /// Date and time profile was created
    pub creation_date: DateTimeNumber,
    /// Profile file signature (must be 'acsp')
    pub signature: u32,
    /// Primary platform signature
    pub platform: u32,
    /// Profile flags
    pub flags: u32,
    /// Device manufacturer signature
    pub manufacturer: u32,
    /// Device model signature
    pub model: u32,
    /// Device attributes
    pub attributes: u64,
    /// Rendering intent, kept raw since out-of-range values occur in the wild
    pub rendering_intent: u32,
    /// PCS illuminant (should be D50)
    pub illuminant: XyzNumber,
    /// Profile creator signature
    pub creator: u32,
    /// Profile ID (MD5 hash, or zero)
    pub profile_id: [u8; 16],
    /// v5: spectral PCS signature
    pub spectral_pcs: ColorSpace,
    /// v5: spectral PCS wavelength range
    pub spectral_range: SpectralRange,
    /// v5: bi-spectral PCS wavelength range
    pub bispectral_range: SpectralRange,
    /// v5: MCS (material connection space) signature
    pub mcs: u32,
    /// v5: device sub-class signature
    pub device_subclass: u32,
}

impl IccHeader {
    /// Empty v4.3 header with a D50 illuminant
    pub fn new(device_class: ProfileClass, color_space: ColorSpace, pcs: ColorSpace) -> Self {
        Self {
            size: HEADER_SIZE as u32,
            cmm_type: 0,
            version: ProfileVersion::new(4, 3, 0),
            device_class,
            color_space,
            pcs,
            creation_date: DateTimeNumber::default(),
            signature: PROFILE_SIGNATURE,
            platform: 0,
            flags: 0,
            manufacturer: 0,
            model: 0,
            attributes: 0,
            rendering_intent: 0,
            illuminant: XyzNumber::from_f32(D50_XYZ),
            creator: 0,
            profile_id: [0; 16],
            spectral_pcs: ColorSpace::None,
            spectral_range: SpectralRange::default(),
            bispectral_range: SpectralRange::default(),
            mcs: 0,
            device_subclass: 0,
        }
    }

    /// Parse header from bytes
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < HEADER_SIZE {
            return Err(ParseError::TooSmall {
                expected: HEADER_SIZE,
                actual: data.len(),
            });
        }

        let be32 = |at: usize| u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);

        let signature = be32(36);
        if signature != PROFILE_SIGNATURE {
            return Err(ParseError::InvalidMagic(signature));
        }

        let mut profile_id = [0u8; 16];
        profile_id.copy_from_slice(&data[PROFILE_ID_RANGE]);

        Ok(Self {
            size: be32(0),
            cmm_type: be32(4),
            version: ProfileVersion::from_u32(be32(8)),
            device_class: ProfileClass::from_u32(be32(12)),
            color_space: ColorSpace::from_u32(be32(16)),
            pcs: ColorSpace::from_u32(be32(20)),
            creation_date: DateTimeNumber::from_bytes(&data[24..36]).unwrap_or_default(),
            signature,
            platform: be32(40),
            flags: be32(44),
            manufacturer: be32(48),
            model: be32(52),
            attributes: u64::from_be_bytes([
                data[56], data[57], data[58], data[59], data[60], data[61], data[62], data[63],
            ]),
            rendering_intent: be32(64),
            illuminant: XyzNumber::from_bytes(&data[68..80]).unwrap_or_default(),
            creator: be32(80),
            profile_id,
            spectral_pcs: ColorSpace::from_u32(be32(100)),
            spectral_range: SpectralRange::from_bytes(&data[104..110]).unwrap_or_default(),
            bispectral_range: SpectralRange::from_bytes(&data[110..116]).unwrap_or_default(),
            mcs: be32(116),
            device_subclass: be32(120),
        })
    }

    /// Encode the header as its 128-byte wire form
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        let mut put = |at: usize, v: u32| out[at..at + 4].copy_from_slice(&v.to_be_bytes());
        put(0, self.size);
        put(4, self.cmm_type);
        put(8, self.version.to_u32());
        put(12, self.device_class.to_u32());
        put(16, self.color_space.to_u32());
        put(20, self.pcs.to_u32());
        put(36, self.signature);
        put(40, self.platform);
        put(44, self.flags);
        put(48, self.manufacturer);
        put(52, self.model);
        put(64, self.rendering_intent);
        put(80, self.creator);
        put(100, self.spectral_pcs.to_u32());
        put(116, self.mcs);
        put(120, self.device_subclass);

        out[24..36].copy_from_slice(&self.creation_date.to_bytes());
        out[56..64].copy_from_slice(&self.attributes.to_be_bytes());
        let mut illum = Vec::with_capacity(12);
        self.illuminant.write(&mut illum);
        out[68..80].copy_from_slice(&illum);
        out[PROFILE_ID_RANGE].copy_from_slice(&self.profile_id);
        out[104..110].copy_from_slice(&self.spectral_range.to_bytes());
        out[110..116].copy_from_slice(&self.bispectral_range.to_bytes());
        out
    }

    /// Rendering intent, if the stored value is one of the four defined
    pub fn intent(&self) -> Option<RenderingIntent> {
        RenderingIntent::from_u32(self.rendering_intent)
    }

    /// Check if this is a matrix/TRC capable header
    pub fn is_matrix_shaper(&self) -> bool {
        matches!(
            self.device_class,
            ProfileClass::Display | ProfileClass::Input | ProfileClass::ColorSpace
        ) && matches!(self.color_space, ColorSpace::Rgb | ColorSpace::Gray)
            && self.pcs.is_pcs()
    }

    /// Multi-line human-readable summary
    pub fn describe(&self) -> String {
        let mut s = String::new();
        s.push_str(&format!("Profile size:    {} (0x{:X}) bytes\n", self.size, self.size));
        s.push_str(&format!("Version:         {}\n", self.version));
        s.push_str(&format!("Device class:    {}\n", sig_str(self.device_class.to_u32())));
        s.push_str(&format!("Color space:     {}\n", sig_str(self.color_space.to_u32())));
        s.push_str(&format!("PCS:             {}\n", sig_str(self.pcs.to_u32())));
        s.push_str(&format!("Rendering intent: {}\n", self.rendering_intent));
        s.push_str(&format!("Flags:           0x{:08X}\n", self.flags));
        s.push_str(&format!("Profile ID:      {}\n", hex::encode(self.profile_id)));
        if self.version.major >= 5 {
            s.push_str(&format!(
                "Spectral PCS:    {}\n",
                sig_str(self.spectral_pcs.to_u32())
            ));
            s.push_str(&format!(
                "Spectral range:  {}-{} nm, {} steps\n",
                self.spectral_range.start, self.spectral_range.end, self.spectral_range.steps
            ));
            s.push_str(&format!("Device subclass: {}\n", sig_str(self.device_subclass)));
        }
        s
    }
}

/// ICC Profile Version
///
/// Byte 8 holds the major version, byte 9 the minor and bug-fix nibbles.
/// Bytes 10-11 hold the v5 profile sub-class version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProfileVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
    pub subclass_major: u8,
    pub subclass_minor: u8,
}

impl ProfileVersion {
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
            subclass_major: 0,
            subclass_minor: 0,
        }
    }

    pub fn from_u32(raw: u32) -> Self {
        let b = raw.to_be_bytes();
        Self {
            major: b[0],
            minor: b[1] >> 4,
            patch: b[1] & 0x0F,
            subclass_major: b[2],
            subclass_minor: b[3],
        }
    }

    pub fn to_u32(&self) -> u32 {
        u32::from_be_bytes([
            self.major,
            (self.minor << 4) | (self.patch & 0x0F),
            self.subclass_major,
            self.subclass_minor,
        ])
    }

    /// Check if version is at least the specified version
    pub fn at_least(&self, major: u8, minor: u8) -> bool {
        self.major > major || (self.major == major && self.minor >= minor)
    }

    pub fn is_v2(&self) -> bool {
        self.major == 2
    }

    pub fn is_v4(&self) -> bool {
        self.major == 4
    }

    pub fn is_v5(&self) -> bool {
        self.major >= 5
    }
}

impl std::fmt::Display for ProfileVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.subclass_major != 0 || self.subclass_minor != 0 {
            write!(f, " (sub-class {}.{})", self.subclass_major, self.subclass_minor)?;
        }
        Ok(())
    }
}

/// ICC Profile Class (Device Class)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileClass {
    /// Input device (scanner, camera)
    Input,
    /// Display device (monitor)
    Display,
    /// Output device (printer)
    Output,
    /// Device link
    DeviceLink,
    /// Color space conversion
    ColorSpace,
    /// Abstract profile
    Abstract,
    /// Named color profile
    NamedColor,
    /// v5 color encoding space
    ColorEncoding,
    /// v5 material identification
    MaterialIdentification,
    /// v5 material link
    MaterialLink,
    /// v5 material visualization
    MaterialVisualization,
    /// Anything else, kept verbatim
    Unknown(u32),
}

impl ProfileClass {
    pub fn from_u32(val: u32) -> Self {
        match &val.to_be_bytes() {
            b"scnr" => Self::Input,
            b"mntr" => Self::Display,
            b"prtr" => Self::Output,
            b"link" => Self::DeviceLink,
            b"spac" => Self::ColorSpace,
            b"abst" => Self::Abstract,
            b"nmcl" => Self::NamedColor,
            b"cenc" => Self::ColorEncoding,
            b"mid " => Self::MaterialIdentification,
            b"mlnk" => Self::MaterialLink,
            b"mvis" => Self::MaterialVisualization,
            _ => Self::Unknown(val),
        }
    }

    pub fn to_u32(&self) -> u32 {
        match self {
            Self::Input => u32::from_be_bytes(*b"scnr"),
            Self::Display => u32::from_be_bytes(*b"mntr"),
            Self::Output => u32::from_be_bytes(*b"prtr"),
            Self::DeviceLink => u32::from_be_bytes(*b"link"),
            Self::ColorSpace => u32::from_be_bytes(*b"spac"),
            Self::Abstract => u32::from_be_bytes(*b"abst"),
            Self::NamedColor => u32::from_be_bytes(*b"nmcl"),
            Self::ColorEncoding => u32::from_be_bytes(*b"cenc"),
            Self::MaterialIdentification => u32::from_be_bytes(*b"mid "),
            Self::MaterialLink => u32::from_be_bytes(*b"mlnk"),
            Self::MaterialVisualization => u32::from_be_bytes(*b"mvis"),
            Self::Unknown(val) => *val,
        }
    }
}

/// ICC Color Space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    /// No color space (v5 links and absent spectral PCS)
    None,
    Xyz,
    Lab,
    Luv,
    YCbCr,
    Yxy,
    Rgb,
    Gray,
    Hsv,
    Hls,
    Cmyk,
    Cmy,
    /// 2CLR..FCLR
    Color(u8),
    /// v5 'nc' + 16-bit channel count
    NChannel(u16),
    /// v5 spectral data: two-letter kind plus 16-bit sample count
    Spectral { kind: [u8; 2], steps: u16 },
    /// Anything else, kept verbatim
    Unknown(u32),
}

impl ColorSpace {
    pub fn from_u32(val: u32) -> Self {
        let b = val.to_be_bytes();
        match &b {
            [0, 0, 0, 0] => Self::None,
            b"XYZ " => Self::Xyz,
            b"Lab " => Self::Lab,
            b"Luv " => Self::Luv,
            b"YCbr" => Self::YCbCr,
            b"Yxy " => Self::Yxy,
            b"RGB " => Self::Rgb,
            b"GRAY" => Self::Gray,
            b"HSV " => Self::Hsv,
            b"HLS " => Self::Hls,
            b"CMYK" => Self::Cmyk,
            b"CMY " => Self::Cmy,
            [d, b'C', b'L', b'R'] => match hex_digit(*d) {
                Some(n) if n >= 2 => Self::Color(n),
                _ => Self::Unknown(val),
            },
            [b'n', b'c', ..] => Self::NChannel(u16::from_be_bytes([b[2], b[3]])),
            [k0 @ (b'r' | b't' | b'e' | b'b'), b's', ..] => Self::Spectral {
                kind: [*k0, b's'],
                steps: u16::from_be_bytes([b[2], b[3]]),
            },
            _ => Self::Unknown(val),
        }
    }

    pub fn to_u32(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Xyz => u32::from_be_bytes(*b"XYZ "),
            Self::Lab => u32::from_be_bytes(*b"Lab "),
            Self::Luv => u32::from_be_bytes(*b"Luv "),
            Self::YCbCr => u32::from_be_bytes(*b"YCbr"),
            Self::Yxy => u32::from_be_bytes(*b"Yxy "),
            Self::Rgb => u32::from_be_bytes(*b"RGB "),
            Self::Gray => u32::from_be_bytes(*b"GRAY"),
            Self::Hsv => u32::from_be_bytes(*b"HSV "),
            Self::Hls => u32::from_be_bytes(*b"HLS "),
            Self::Cmyk => u32::from_be_bytes(*b"CMYK"),
            Self::Cmy => u32::from_be_bytes(*b"CMY "),
            Self::Color(n) => {
                let d = b"0123456789ABCDEF"[usize::from(*n & 0x0F)];
                u32::from_be_bytes([d, b'C', b'L', b'R'])
            }
            Self::NChannel(n) => {
                let c = n.to_be_bytes();
                u32::from_be_bytes([b'n', b'c', c[0], c[1]])
            }
            Self::Spectral { kind, steps } => {
                let c = steps.to_be_bytes();
                u32::from_be_bytes([kind[0], kind[1], c[0], c[1]])
            }
            Self::Unknown(val) => *val,
        }
    }

    /// Number of samples per pixel, zero when unknown
    pub fn channels(&self) -> usize {
        match self {
            Self::None => 0,
            // v5 multiplex spaces 'mc1 '..'mcf '
            Self::Unknown(val) => match val.to_be_bytes() {
                [b'm', b'c', d, _] => hex_digit(d.to_ascii_uppercase()).map_or(0, usize::from),
                _ => 0,
            },
            Self::Gray => 1,
            Self::Xyz
            | Self::Lab
            | Self::Luv
            | Self::YCbCr
            | Self::Yxy
            | Self::Rgb
            | Self::Hsv
            | Self::Hls
            | Self::Cmy => 3,
            Self::Cmyk => 4,
            Self::Color(n) => usize::from(*n),
            Self::NChannel(n) => usize::from(*n),
            Self::Spectral { steps, .. } => usize::from(*steps),
        }
    }

    /// XYZ or Lab, the two colorimetric connection spaces
    pub fn is_pcs(&self) -> bool {
        matches!(self, Self::Xyz | Self::Lab)
    }

    /// Whether two spaces can be chained back to back
    pub fn is_compatible(&self, other: &Self) -> bool {
        if self == other || (self.is_pcs() && other.is_pcs()) {
            return true;
        }
        let generic = |cs: &Self| matches!(cs, Self::Color(_) | Self::NChannel(_));
        (generic(self) || generic(other)) && self.channels() == other.channels() && self.channels() > 0
    }
}

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// ICC Rendering Intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, PartialOrd, Ord, Hash)]
pub enum RenderingIntent {
    /// Perceptual - best for photographs
    #[default]
    Perceptual,
    /// Relative colorimetric - preserves in-gamut colors
    RelativeColorimetric,
    /// Saturation - maintains saturation
    Saturation,
    /// Absolute colorimetric - preserves white point
    AbsoluteColorimetric,
}

impl RenderingIntent {
    pub fn from_u32(val: u32) -> Option<Self> {
        match val {
            0 => Some(Self::Perceptual),
            1 => Some(Self::RelativeColorimetric),
            2 => Some(Self::Saturation),
            3 => Some(Self::AbsoluteColorimetric),
            _ => None,
        }
    }

    pub fn to_u32(&self) -> u32 {
        match self {
            Self::Perceptual => 0,
            Self::RelativeColorimetric => 1,
            Self::Saturation => 2,
            Self::AbsoluteColorimetric => 3,
        }
    }

    /// Index used to pick A2Bx / B2Ax tags. Absolute shares the
    /// relative colorimetric table.
    pub fn table_index(&self) -> u8 {
        match self {
            Self::AbsoluteColorimetric => 1,
            other => other.to_u32() as u8,
        }
    }
}

//! ICC Profile Basic Types
//!
//! Signatures and fixed-point numbers as they appear on the wire.

use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::icc::error::sig_str;
use crate::io::{BeWrite, ByteReader, IoError};

/// ICC Tag Signature (4-byte ASCII code)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagSignature(pub u32);

impl TagSignature {
    /// Create from 4 ASCII characters
    pub const fn from_bytes(b: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(b))
    }

    /// Parse from up to four characters, space padded
    pub fn parse(s: &str) -> Option<Self> {
        let bytes = s.as_bytes();
        if bytes.is_empty() || bytes.len() > 4 {
            return None;
        }
        let mut b = [b' '; 4];
        b[..bytes.len()].copy_from_slice(bytes);
        Some(Self::from_bytes(b))
    }

    // Common tag signatures
    pub const A2B0: Self = Self::from_bytes(*b"A2B0");
    pub const A2B1: Self = Self::from_bytes(*b"A2B1");
    pub const A2B2: Self = Self::from_bytes(*b"A2B2");
    pub const A2B3: Self = Self::from_bytes(*b"A2B3");
    pub const B2A0: Self = Self::from_bytes(*b"B2A0");
    pub const B2A1: Self = Self::from_bytes(*b"B2A1");
    pub const B2A2: Self = Self::from_bytes(*b"B2A2");
    pub const B2A3: Self = Self::from_bytes(*b"B2A3");
    pub const D2B0: Self = Self::from_bytes(*b"D2B0");
    pub const D2B1: Self = Self::from_bytes(*b"D2B1");
    pub const D2B2: Self = Self::from_bytes(*b"D2B2");
    pub const D2B3: Self = Self::from_bytes(*b"D2B3");
    pub const B2D0: Self = Self::from_bytes(*b"B2D0");
    pub const B2D1: Self = Self::from_bytes(*b"B2D1");
    pub const B2D2: Self = Self::from_bytes(*b"B2D2");
    pub const B2D3: Self = Self::from_bytes(*b"B2D3");
    pub const BLUE_COLORANT: Self = Self::from_bytes(*b"bXYZ");
    pub const BLUE_TRC: Self = Self::from_bytes(*b"bTRC");
    pub const CHAD: Self = Self::from_bytes(*b"chad");
    pub const COLORANT_TABLE: Self = Self::from_bytes(*b"clrt");
    pub const COLORANT_TABLE_OUT: Self = Self::from_bytes(*b"clot");
    pub const COPYRIGHT: Self = Self::from_bytes(*b"cprt");
    pub const DESC: Self = Self::from_bytes(*b"desc");
    pub const GAMUT: Self = Self::from_bytes(*b"gamt");
    pub const GRAY_TRC: Self = Self::from_bytes(*b"kTRC");
    pub const GREEN_COLORANT: Self = Self::from_bytes(*b"gXYZ");
    pub const GREEN_TRC: Self = Self::from_bytes(*b"gTRC");
    pub const LUMINANCE: Self = Self::from_bytes(*b"lumi");
    pub const MEDIA_WHITE: Self = Self::from_bytes(*b"wtpt");
    pub const MEDIA_BLACK: Self = Self::from_bytes(*b"bkpt");
    pub const NAMED_COLOR2: Self = Self::from_bytes(*b"ncl2");
    pub const PREVIEW0: Self = Self::from_bytes(*b"pre0");
    pub const PREVIEW1: Self = Self::from_bytes(*b"pre1");
    pub const PREVIEW2: Self = Self::from_bytes(*b"pre2");
    pub const RED_COLORANT: Self = Self::from_bytes(*b"rXYZ");
    pub const RED_TRC: Self = Self::from_bytes(*b"rTRC");
    pub const SPECTRAL_DATA_INFO: Self = Self::from_bytes(*b"sdin");
    pub const SPECTRAL_VIEWING_CONDITIONS: Self = Self::from_bytes(*b"svcn");
    pub const SPECTRAL_WHITE_POINT: Self = Self::from_bytes(*b"swpt");
    pub const TECH: Self = Self::from_bytes(*b"tech");

    /// Tags that may legitimately appear more than once in a directory
    pub fn is_multi_instance(self) -> bool {
        false
    }

    /// A2Bx / B2Ax / D2Bx / B2Dx for rendering intent 0..=3
    pub fn a2b(intent: u8) -> Self {
        Self::indexed(*b"A2B0", intent)
    }

    pub fn b2a(intent: u8) -> Self {
        Self::indexed(*b"B2A0", intent)
    }

    pub fn d2b(intent: u8) -> Self {
        Self::indexed(*b"D2B0", intent)
    }

    pub fn b2d(intent: u8) -> Self {
        Self::indexed(*b"B2D0", intent)
    }

    fn indexed(mut base: [u8; 4], intent: u8) -> Self {
        base[3] = b'0' + intent.min(3);
        Self::from_bytes(base)
    }
}

impl fmt::Display for TagSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&sig_str(self.0))
    }
}

/// Type signatures for ICC tag data and processing elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeSignature(pub u32);

impl TypeSignature {
    pub const fn from_bytes(b: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(b))
    }

    // Tag types
    pub const XYZ: Self = Self::from_bytes(*b"XYZ ");
    pub const CURVE: Self = Self::from_bytes(*b"curv");
    pub const PARA: Self = Self::from_bytes(*b"para");
    pub const TEXT: Self = Self::from_bytes(*b"text");
    pub const DESC: Self = Self::from_bytes(*b"desc");
    pub const MLUC: Self = Self::from_bytes(*b"mluc");
    pub const LUT8: Self = Self::from_bytes(*b"mft1");
    pub const LUT16: Self = Self::from_bytes(*b"mft2");
    pub const LUTA2B: Self = Self::from_bytes(*b"mAB ");
    pub const LUTB2A: Self = Self::from_bytes(*b"mBA ");
    pub const SF32: Self = Self::from_bytes(*b"sf32");
    pub const FL32: Self = Self::from_bytes(*b"fl32");
    pub const SIG: Self = Self::from_bytes(*b"sig ");
    pub const CLRT: Self = Self::from_bytes(*b"clrt");
    pub const MPET: Self = Self::from_bytes(*b"mpet");
    pub const SVCN: Self = Self::from_bytes(*b"svcn");
    pub const SDIN: Self = Self::from_bytes(*b"sdin");

    // Multi-process element types
    pub const CURVE_SET: Self = Self::from_bytes(*b"cvst");
    pub const MATRIX: Self = Self::from_bytes(*b"matf");
    pub const CLUT: Self = Self::from_bytes(*b"clut");
    pub const CALCULATOR: Self = Self::from_bytes(*b"calc");
    pub const SEGMENTED_CURVE: Self = Self::from_bytes(*b"curf");
    pub const FORMULA_SEGMENT: Self = Self::from_bytes(*b"parf");
    pub const SAMPLED_SEGMENT: Self = Self::from_bytes(*b"samf");
    pub const FUNCTION: Self = Self::from_bytes(*b"func");
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&sig_str(self.0))
    }
}

/// s15Fixed16Number - 16.16 fixed point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct S15Fixed16(pub i32);

impl S15Fixed16 {
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub fn from_f64(val: f64) -> Self {
        Self((val * 65536.0).round() as i32)
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / 65536.0
    }

    pub fn to_f32(self) -> f32 {
        self.0 as f32 / 65536.0
    }

    pub fn from_be_bytes(bytes: [u8; 4]) -> Self {
        Self(i32::from_be_bytes(bytes))
    }
}

/// XYZNumber - ICC XYZ value (3 x s15Fixed16)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct XyzNumber {
    pub x: S15Fixed16,
    pub y: S15Fixed16,
    pub z: S15Fixed16,
}

impl XyzNumber {
    pub const SIZE: usize = 12;

    /// Parse from 12 bytes (big-endian)
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            x: S15Fixed16::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            y: S15Fixed16::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            z: S15Fixed16::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        })
    }

    pub fn read(r: &mut ByteReader<'_>) -> Result<Self, IoError> {
        Ok(Self {
            x: S15Fixed16(r.i32()?),
            y: S15Fixed16(r.i32()?),
            z: S15Fixed16(r.i32()?),
        })
    }

    pub fn from_f32(xyz: [f32; 3]) -> Self {
        Self {
            x: S15Fixed16::from_f64(f64::from(xyz[0])),
            y: S15Fixed16::from_f64(f64::from(xyz[1])),
            z: S15Fixed16::from_f64(f64::from(xyz[2])),
        }
    }

    pub fn to_f32(&self) -> [f32; 3] {
        [self.x.to_f32(), self.y.to_f32(), self.z.to_f32()]
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.put_u32(self.x.0 as u32);
        out.put_u32(self.y.0 as u32);
        out.put_u32(self.z.0 as u32);
    }
}

/// dateTimeNumber - ICC date/time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateTimeNumber {
    pub year: u16,
    pub month: u16,
    pub day: u16,
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
}

impl DateTimeNumber {
    /// Parse from 12 bytes (big-endian)
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 12 {
            return None;
        }
        Some(Self {
            year: u16::from_be_bytes([bytes[0], bytes[1]]),
            month: u16::from_be_bytes([bytes[2], bytes[3]]),
            day: u16::from_be_bytes([bytes[4], bytes[5]]),
            hour: u16::from_be_bytes([bytes[6], bytes[7]]),
            minute: u16::from_be_bytes([bytes[8], bytes[9]]),
            second: u16::from_be_bytes([bytes[10], bytes[11]]),
        })
    }

    pub fn to_bytes(&self) -> [u8; 12] {
        let mut out = [0u8; 12];
        for (i, v) in [
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
        ]
        .into_iter()
        .enumerate()
        {
            out[i * 2..i * 2 + 2].copy_from_slice(&v.to_be_bytes());
        }
        out
    }
}

/// Wavelength range of spectral data: start and end in nm, and sample count
///
/// Start and end are IEEE half floats on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpectralRange {
    pub start: f32,
    pub end: f32,
    pub steps: u16,
}

impl SpectralRange {
    pub const SIZE: usize = 6;

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            start: f16_to_f32(u16::from_be_bytes([bytes[0], bytes[1]])),
            end: f16_to_f32(u16::from_be_bytes([bytes[2], bytes[3]])),
            steps: u16::from_be_bytes([bytes[4], bytes[5]]),
        })
    }

    pub fn read(r: &mut ByteReader<'_>) -> Result<Self, IoError> {
        let start = f16_to_f32(r.u16()?);
        let end = f16_to_f32(r.u16()?);
        let steps = r.u16()?;
        Ok(Self { start, end, steps })
    }

    pub fn to_bytes(&self) -> [u8; 6] {
        let mut out = [0u8; 6];
        out[0..2].copy_from_slice(&f32_to_f16(self.start).to_be_bytes());
        out[2..4].copy_from_slice(&f32_to_f16(self.end).to_be_bytes());
        out[4..6].copy_from_slice(&self.steps.to_be_bytes());
        out
    }

    pub fn is_empty(&self) -> bool {
        self.steps == 0
    }
}

/// Decode an IEEE 754 binary16 value
pub fn f16_to_f32(h: u16) -> f32 {
    let sign = u32::from(h >> 15) << 31;
    let exp = u32::from((h >> 10) & 0x1F);
    let mant = u32::from(h & 0x3FF);

    let bits = match (exp, mant) {
        (0, 0) => sign,
        (0, m) => {
            // subnormal: renormalise
            let mut e = 127 - 15 + 1;
            let mut m = m;
            while m & 0x400 == 0 {
                m <<= 1;
                e -= 1;
            }
            sign | (e << 23) | ((m & 0x3FF) << 13)
        }
        (0x1F, 0) => sign | 0x7F80_0000,
        (0x1F, m) => sign | 0x7FC0_0000 | (m << 13),
        (e, m) => sign | ((e + 127 - 15) << 23) | (m << 13),
    };
    f32::from_bits(bits)
}

/// Encode an f32 as IEEE 754 binary16, rounding to nearest
pub fn f32_to_f16(v: f32) -> u16 {
    let bits = v.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp = ((bits >> 23) & 0xFF) as i32;
    let mant = bits & 0x7F_FFFF;

    if exp == 0xFF {
        return sign | 0x7C00 | if mant != 0 { 0x200 } else { 0 };
    }
    let e = exp - 127 + 15;
    if e >= 0x1F {
        return sign | 0x7C00;
    }
    if e <= 0 {
        if e < -10 {
            return sign;
        }
        let m = mant | 0x80_0000;
        let shift = (14 - e) as u32;
        let half = 1 << (shift - 1);
        let rounded = (m + half) >> shift;
        return sign | rounded as u16;
    }
    let rounded = (mant + 0x1000) >> 13;
    if rounded & 0x400 != 0 {
        // mantissa overflowed into the exponent
        let e = e + 1;
        if e >= 0x1F {
            return sign | 0x7C00;
        }
        return sign | ((e as u16) << 10);
    }
    sign | ((e as u16) << 10) | rounded as u16
}

/// Text form used by the textual bridge: the four characters when all are
/// printable, otherwise `0x` and eight hex digits
fn sig_to_text(sig: u32) -> String {
    let bytes = sig.to_be_bytes();
    if bytes.iter().all(|b| (0x20..0x7F).contains(b)) {
        bytes.iter().map(|&b| b as char).collect()
    } else {
        format!("0x{:08X}", sig)
    }
}

fn sig_from_text(s: &str) -> Option<u32> {
    if let Some(digits) = s.strip_prefix("0x").filter(|d| d.len() == 8) {
        return u32::from_str_radix(digits, 16).ok();
    }
    TagSignature::parse(s).map(|t| t.0)
}

macro_rules! signature_serde {
    ($ty:ident) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&sig_to_text(self.0))
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let text = String::deserialize(deserializer)?;
                sig_from_text(&text)
                    .map($ty)
                    .ok_or_else(|| de::Error::custom(format!("invalid signature '{}'", text)))
            }
        }
    };
}

signature_serde!(TagSignature);
signature_serde!(TypeSignature);

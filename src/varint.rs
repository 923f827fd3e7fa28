use std::fmt;
use std::io::Read;

use byteorder::{BigEndian, ByteOrder};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

// RFC 9000 section 16: the two high bits of the first byte select a
// 1/2/4/8 byte width, the rest is the value big-endian
pub const MAX: u64 = (1 << 62) - 1;

pub fn width_of(n: u64) -> usize {
    if n < 1 << 6 {
        1
    } else if n < 1 << 14 {
        2
    } else if n < 1 << 30 {
        4
    } else {
        8
    }
}

pub fn encode(n: u64) -> Result<Vec<u8>> {
    if n > MAX {
        return Err(Error::ValueOutOfRange);
    }

    let mut out = vec![0u8; width_of(n)];
    match out.len() {
        1 => out[0] = n as u8,
        2 => {
            out[0] = 0b0100_0000 | (n >> 8) as u8;
            out[1] = n as u8;
        }
        4 => BigEndian::write_u32(&mut out, n as u32 | 0b10 << 30),
        8 => BigEndian::write_u64(&mut out, n | 0b11 << 62),
        _ => unreachable!(),
    }
    Ok(out)
}

pub fn decode(buf: &[u8], offset: usize) -> Result<(u64, usize)> {
    let first = *buf.get(offset).ok_or(Error::Truncated)?;
    let width = 1usize << (first >> 6);

    if buf.len() - offset < width {
        return Err(Error::Truncated);
    }

    let mut value = (first & 0b0011_1111) as u64;
    for byte in &buf[offset + 1..offset + width] {
        value = value << 8 | *byte as u64;
    }
    Ok((value, width))
}

// Finish a varint whose first byte was already pulled off the reader.
// EOF inside the tail is Truncated.
pub fn read_remainder<R: Read>(first: u8, reader: &mut R) -> Result<(u64, usize)> {
    let width = 1usize << (first >> 6);
    let mut value = (first & 0b0011_1111) as u64;

    let mut tail = [0u8; 7];
    if width > 1 {
        reader
            .read_exact(&mut tail[..width - 1])
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => Error::Truncated,
                _ => Error::Io(e),
            })?;
        for byte in &tail[..width - 1] {
            value = value << 8 | *byte as u64;
        }
    }
    Ok((value, width))
}

// Object form used inside manifest JSON: { "f": width tag, "v": hex },
// self-describing and never routed through a lossy float
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Varint(pub u64);

impl Varint {
    pub fn value(self) -> u64 {
        self.0
    }

    pub fn width_tag(self) -> &'static str {
        match width_of(self.0) {
            1 => "1B",
            2 => "2B",
            4 => "4B",
            _ => "8B",
        }
    }
}

impl From<u64> for Varint {
    fn from(n: u64) -> Varint {
        Varint(n)
    }
}

impl fmt::Debug for Varint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Varint({})", self.0)
    }
}

#[derive(Serialize, Deserialize)]
struct VarintForm {
    f: String,
    v: String,
}

impl Serialize for Varint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        VarintForm {
            f: self.width_tag().to_string(),
            v: format!("{:#x}", self.0),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Varint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let form = VarintForm::deserialize(deserializer)?;

        let cap: u64 = match form.f.as_str() {
            "1B" => (1 << 6) - 1,
            "2B" => (1 << 14) - 1,
            "4B" => (1 << 30) - 1,
            "8B" => MAX,
            other => return Err(D::Error::custom(format!("bad width tag {:?}", other))),
        };

        let hex = form
            .v
            .strip_prefix("0x")
            .ok_or_else(|| D::Error::custom("varint value missing 0x prefix"))?;
        let value = u64::from_str_radix(hex, 16)
            .map_err(|e| D::Error::custom(format!("bad varint hex: {}", e)))?;

        if value > cap {
            return Err(D::Error::custom(format!(
                "value {:#x} does not fit width {}",
                value, form.f
            )));
        }
        Ok(Varint(value))
    }
}

#[cfg(test)]
mod test_codec {
    use super::*;

    #[test]
    fn width_thresholds() {
        assert_eq!(width_of(0), 1);
        assert_eq!(width_of(63), 1);
        assert_eq!(width_of(64), 2);
        assert_eq!(width_of(16383), 2);
        assert_eq!(width_of(16384), 4);
        assert_eq!(width_of((1 << 30) - 1), 4);
        assert_eq!(width_of(1 << 30), 8);
        assert_eq!(width_of(MAX), 8);
    }

    #[test]
    fn round_trip_all_widths() {
        for n in [0, 1, 63, 64, 300, 16383, 16384, 1 << 29, (1 << 30) - 1, 1 << 30, 1 << 40, MAX] {
            let buf = encode(n).unwrap();
            assert_eq!(buf.len(), width_of(n));
            assert_eq!(decode(&buf, 0).unwrap(), (n, buf.len()));
        }
    }

    #[test]
    fn rfc_examples() {
        // Worked examples from RFC 9000 A.1
        assert_eq!(decode(&[0x25], 0).unwrap(), (37, 1));
        assert_eq!(decode(&[0x7b, 0xbd], 0).unwrap(), (15293, 2));
        assert_eq!(decode(&[0x9d, 0x7f, 0x3e, 0x7d], 0).unwrap(), (494878333, 4));
        assert_eq!(
            decode(&[0xc2, 0x19, 0x7c, 0x5e, 0xff, 0x14, 0xe8, 0x8c], 0).unwrap(),
            (151288809941952652, 8)
        );
    }

    #[test]
    fn decode_honors_offset() {
        let mut buf = vec![0xff, 0xff];
        buf.extend(encode(300).unwrap());
        assert_eq!(decode(&buf, 2).unwrap(), (300, 2));
    }

    #[test]
    fn out_of_range_rejected() {
        assert!(matches!(encode(MAX + 1), Err(Error::ValueOutOfRange)));
        assert!(matches!(encode(u64::MAX), Err(Error::ValueOutOfRange)));
    }

    #[test]
    fn truncated_tail_rejected() {
        let buf = encode(16384).unwrap();
        assert!(matches!(decode(&buf[..2], 0), Err(Error::Truncated)));
        assert!(matches!(decode(&[], 0), Err(Error::Truncated)));
    }

    #[test]
    fn read_remainder_matches_decode() {
        for n in [0, 63, 64, 16384, MAX] {
            let buf = encode(n).unwrap();
            let mut rest = &buf[1..];
            assert_eq!(read_remainder(buf[0], &mut rest).unwrap(), (n, buf.len()));
        }
    }

    #[test]
    fn read_remainder_truncated() {
        let buf = encode(1 << 30).unwrap();
        let mut rest = &buf[1..4];
        assert!(matches!(read_remainder(buf[0], &mut rest), Err(Error::Truncated)));
    }
}

#[cfg(test)]
mod test_object_form {
    use super::*;

    #[test]
    fn serialize_shape() {
        assert_eq!(
            serde_json::to_string(&Varint(0)).unwrap(),
            r#"{"f":"1B","v":"0x0"}"#
        );
        assert_eq!(
            serde_json::to_string(&Varint(16383)).unwrap(),
            r#"{"f":"2B","v":"0x3fff"}"#
        );
        assert_eq!(
            serde_json::to_string(&Varint(MAX)).unwrap(),
            r#"{"f":"8B","v":"0x3fffffffffffffff"}"#
        );
    }

    #[test]
    fn json_round_trip() {
        for n in [0, 63, 64, 16384, (1 << 53) + 1, MAX] {
            let json = serde_json::to_string(&Varint(n)).unwrap();
            let back: Varint = serde_json::from_str(&json).unwrap();
            assert_eq!(back.value(), n);
        }
    }

    #[test]
    fn reject_malformed() {
        assert!(serde_json::from_str::<Varint>(r#"{"f":"3B","v":"0x1"}"#).is_err());
        assert!(serde_json::from_str::<Varint>(r#"{"f":"1B","v":"17"}"#).is_err());
        assert!(serde_json::from_str::<Varint>(r#"{"f":"1B","v":"0x40"}"#).is_err());
        assert!(serde_json::from_str::<Varint>(r#"{"f":"1B","v":"0xzz"}"#).is_err());
    }
}

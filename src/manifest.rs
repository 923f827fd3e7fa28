use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::varint::Varint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Codec {
    #[serde(rename = "deflate")]
    Deflate,
    #[serde(rename = "deflate-raw")]
    DeflateRaw,
    #[serde(rename = "gzip")]
    Gzip,
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Codec::Deflate => "deflate",
            Codec::DeflateRaw => "deflate-raw",
            Codec::Gzip => "gzip",
        })
    }
}

impl std::str::FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Codec, String> {
        match s {
            "deflate" => Ok(Codec::Deflate),
            "deflate-raw" => Ok(Codec::DeflateRaw),
            "gzip" => Ok(Codec::Gzip),
            other => Err(format!("unknown codec {:?}", other)),
        }
    }
}

// Open-world tagging: any object with a string "type" is a valid filter
// config/result, unknown tags round-trip opaquely through Other
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FilterConfig {
    #[serde(rename = "CID.config")]
    Cid {
        #[serde(rename = "combineId", default, skip_serializing_if = "Option::is_none")]
        combine_id: Option<String>,
    },

    #[serde(rename = "ZStr.config")]
    ZStr { codec: Codec },

    #[serde(rename = "AES-GCM.config")]
    Aead {
        #[serde(rename = "keyId")]
        key_id: String,
    },

    #[serde(untagged)]
    Other(serde_json::Value),
}

impl FilterConfig {
    // The "type" discriminant is the sole dispatch key for factories
    pub fn type_name(&self) -> &str {
        match self {
            FilterConfig::Cid { .. } => "CID.config",
            FilterConfig::ZStr { .. } => "ZStr.config",
            FilterConfig::Aead { .. } => "AES-GCM.config",
            FilterConfig::Other(value) => {
                value.get("type").and_then(|t| t.as_str()).unwrap_or("unknown")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FilterResult {
    #[serde(rename = "CID.result")]
    Cid { cid: String },

    #[serde(rename = "ZStr.result")]
    ZStr { codec: Codec },

    #[serde(rename = "AES-GCM.result")]
    Aead {
        #[serde(rename = "keyId")]
        key_id: String,
    },

    #[serde(untagged)]
    Other(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfigRecord {
    #[serde(rename = "streamId")]
    pub stream_id: Varint,

    #[serde(rename = "combineId", default, skip_serializing_if = "Option::is_none")]
    pub combine_id: Option<String>,

    pub filters: Vec<FilterConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamResultRecord {
    #[serde(rename = "streamId")]
    pub stream_id: Varint,

    // Offset of the stream's first STREAM_DATA frame header within the
    // container, not of the payload itself
    pub offset: u64,

    // Sum of STREAM_DATA payload lengths
    pub length: u64,

    #[serde(rename = "filterResult")]
    pub filter_result: Vec<FilterResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ManifestRecord {
    #[serde(rename = "stream.config")]
    Config(StreamConfigRecord),

    #[serde(rename = "stream.result")]
    Result(StreamResultRecord),
}

// Byte serializer for manifest records; must be lossless for the record
// schemas above
pub trait Serializer {
    fn encode(&self, record: &ManifestRecord) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<ManifestRecord>;

    // Body of a STREAM_TRAILER frame, an empty record in this encoding
    fn encode_trailer(&self) -> Result<Vec<u8>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn encode(&self, record: &ManifestRecord) -> Result<Vec<u8>> {
        serde_json::to_vec(record)
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))
    }

    fn decode(&self, bytes: &[u8]) -> Result<ManifestRecord> {
        // Malformed input and well-formed-but-unknown shapes are distinct
        // failures; the reader forwards the frame either way but callers
        // inspecting manifests directly want to tell them apart
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|_| Error::ManifestDecode)?;
        serde_json::from_value(value).map_err(|_| Error::UnknownManifestShape)
    }

    fn encode_trailer(&self) -> Result<Vec<u8>> {
        Ok(b"{}".to_vec())
    }
}

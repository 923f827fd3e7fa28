use std::io::Write;
use std::mem;
use std::rc::Rc;

use flate2::write::{DeflateDecoder, DeflateEncoder, GzDecoder, GzEncoder, ZlibDecoder, ZlibEncoder};
use flate2::Compression;

use crate::error::Result;
use crate::filter::{ChunkTransform, DecoderFactory, DecoderFilter, EncoderFilter};
use crate::manifest::{Codec, FilterConfig, FilterResult, StreamConfigRecord};
use crate::resolve::ResolvedEntry;

fn finished() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, "compression stream already flushed")
}

// deflate = RFC 1950 zlib wrapper, deflate-raw = RFC 1951, gzip = RFC
// 1952. Output chunk boundaries do not line up with input boundaries;
// the compressor hands out whatever its window has produced so far and
// the remainder on flush.
enum Deflater {
    Zlib(ZlibEncoder<Vec<u8>>),
    Raw(DeflateEncoder<Vec<u8>>),
    Gz(GzEncoder<Vec<u8>>),
}

impl Deflater {
    fn new(codec: Codec) -> Deflater {
        let level = Compression::default();
        match codec {
            Codec::Deflate => Deflater::Zlib(ZlibEncoder::new(Vec::new(), level)),
            Codec::DeflateRaw => Deflater::Raw(DeflateEncoder::new(Vec::new(), level)),
            Codec::Gzip => Deflater::Gz(GzEncoder::new(Vec::new(), level)),
        }
    }

    fn write(&mut self, chunk: &[u8]) -> std::io::Result<Vec<u8>> {
        match self {
            Deflater::Zlib(enc) => {
                enc.write_all(chunk)?;
                Ok(mem::take(enc.get_mut()))
            }
            Deflater::Raw(enc) => {
                enc.write_all(chunk)?;
                Ok(mem::take(enc.get_mut()))
            }
            Deflater::Gz(enc) => {
                enc.write_all(chunk)?;
                Ok(mem::take(enc.get_mut()))
            }
        }
    }

    fn finish(self) -> std::io::Result<Vec<u8>> {
        match self {
            Deflater::Zlib(enc) => enc.finish(),
            Deflater::Raw(enc) => enc.finish(),
            Deflater::Gz(enc) => enc.finish(),
        }
    }
}

pub struct ZstrEncoder {
    codec: Codec,
    inner: Option<Deflater>,
}

impl ZstrEncoder {
    pub fn new(codec: Codec) -> Self {
        ZstrEncoder {
            codec,
            inner: Some(Deflater::new(codec)),
        }
    }
}

impl ChunkTransform for ZstrEncoder {
    fn update(&mut self, chunk: &[u8]) -> Result<Vec<u8>> {
        let inner = self.inner.as_mut().ok_or_else(finished)?;
        Ok(inner.write(chunk)?)
    }

    fn flush(&mut self) -> Result<Vec<u8>> {
        match self.inner.take() {
            Some(inner) => Ok(inner.finish()?),
            None => Ok(Vec::new()),
        }
    }
}

impl EncoderFilter for ZstrEncoder {
    fn config(&self) -> FilterConfig {
        FilterConfig::ZStr { codec: self.codec }
    }

    fn result(&self) -> Option<FilterResult> {
        Some(FilterResult::ZStr { codec: self.codec })
    }
}

enum Inflater {
    Zlib(ZlibDecoder<Vec<u8>>),
    Raw(DeflateDecoder<Vec<u8>>),
    Gz(GzDecoder<Vec<u8>>),
}

impl Inflater {
    fn new(codec: Codec) -> Inflater {
        match codec {
            Codec::Deflate => Inflater::Zlib(ZlibDecoder::new(Vec::new())),
            Codec::DeflateRaw => Inflater::Raw(DeflateDecoder::new(Vec::new())),
            Codec::Gzip => Inflater::Gz(GzDecoder::new(Vec::new())),
        }
    }

    fn write(&mut self, chunk: &[u8]) -> std::io::Result<Vec<u8>> {
        match self {
            Inflater::Zlib(dec) => {
                dec.write_all(chunk)?;
                Ok(mem::take(dec.get_mut()))
            }
            Inflater::Raw(dec) => {
                dec.write_all(chunk)?;
                Ok(mem::take(dec.get_mut()))
            }
            Inflater::Gz(dec) => {
                dec.write_all(chunk)?;
                Ok(mem::take(dec.get_mut()))
            }
        }
    }

    // Errors when the compressed stream is cut short
    fn finish(self) -> std::io::Result<Vec<u8>> {
        match self {
            Inflater::Zlib(dec) => dec.finish(),
            Inflater::Raw(dec) => dec.finish(),
            Inflater::Gz(dec) => dec.finish(),
        }
    }
}

pub struct ZstrDecoder {
    inner: Option<Inflater>,
}

impl ZstrDecoder {
    pub fn new(codec: Codec) -> Self {
        ZstrDecoder {
            inner: Some(Inflater::new(codec)),
        }
    }
}

impl ChunkTransform for ZstrDecoder {
    fn update(&mut self, chunk: &[u8]) -> Result<Vec<u8>> {
        let inner = self.inner.as_mut().ok_or_else(finished)?;
        Ok(inner.write(chunk)?)
    }

    fn flush(&mut self) -> Result<Vec<u8>> {
        match self.inner.take() {
            Some(inner) => Ok(inner.finish()?),
            None => Ok(Vec::new()),
        }
    }
}

struct ZstrDecoderFilter {
    codec: Codec,
}

impl DecoderFilter for ZstrDecoderFilter {
    fn decoder(&self) -> Result<Box<dyn ChunkTransform>> {
        Ok(Box::new(ZstrDecoder::new(self.codec)))
    }
}

pub struct ZstrFactory;

impl DecoderFactory for ZstrFactory {
    fn detect(
        &self,
        _record: &StreamConfigRecord,
        mut entries: Vec<ResolvedEntry>,
    ) -> Result<Vec<ResolvedEntry>> {
        for entry in entries.iter_mut() {
            if entry.instance.is_none() {
                if let FilterConfig::ZStr { codec } = entry.input {
                    entry.instance = Some(Rc::new(ZstrDecoderFilter { codec }));
                }
            }
        }
        Ok(entries)
    }
}

pub mod aead;
pub mod cid;
pub mod collector;
pub mod zstr;

use std::io::Read;

use crate::buf::flush_buf;
use crate::error::Result;
use crate::manifest::{FilterConfig, FilterResult, StreamConfigRecord};
use crate::resolve::ResolvedEntry;

// Chunk boundaries are load-bearing: every encoder output chunk becomes
// exactly one STREAM_DATA frame, and the decode side feeds every frame
// payload to the transforms as one chunk. AES-GCM depends on this to
// decrypt without buffering.

pub trait ChunkTransform {
    // update may return empty (data withheld until later chunks or
    // flush); flush drains whatever the transform still holds
    fn update(&mut self, chunk: &[u8]) -> Result<Vec<u8>>;
    fn flush(&mut self) -> Result<Vec<u8>>;
}

// One encoder instance serves exactly one stream; the accumulated state
// (hash, compressor window, cipher) is never shared across entries
pub trait EncoderFilter: ChunkTransform {
    fn config(&self) -> FilterConfig;

    // None entries are dropped from the stream's result record
    fn result(&self) -> Option<FilterResult>;
}

pub trait DecoderFilter {
    fn decoder(&self) -> Result<Box<dyn ChunkTransform>>;
}

// Convention, not enforced: a factory claims only entries whose input
// carries its "type" discriminant and whose instance is still unset;
// first claim wins
pub trait DecoderFactory {
    fn detect(
        &self,
        record: &StreamConfigRecord,
        entries: Vec<ResolvedEntry>,
    ) -> Result<Vec<ResolvedEntry>>;
}

pub trait ChunkSource {
    fn next_chunk(&mut self) -> Result<Option<Vec<u8>>>;
}

pub struct TransformStage {
    source: Box<dyn ChunkSource>,
    transform: Box<dyn ChunkTransform>,
    flushed: bool,
}

impl TransformStage {
    pub fn new(source: Box<dyn ChunkSource>, transform: Box<dyn ChunkTransform>) -> Self {
        TransformStage {
            source,
            transform,
            flushed: false,
        }
    }
}

impl ChunkSource for TransformStage {
    fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if self.flushed {
                return Ok(None);
            }
            match self.source.next_chunk()? {
                Some(chunk) => {
                    let out = self.transform.update(&chunk)?;
                    if !out.is_empty() {
                        return Ok(Some(out));
                    }
                }
                None => {
                    self.flushed = true;
                    let out = self.transform.flush()?;
                    if !out.is_empty() {
                        return Ok(Some(out));
                    }
                    return Ok(None);
                }
            }
        }
    }
}

pub struct ChunkReader {
    source: Box<dyn ChunkSource>,
    out_buf: Vec<u8>,
    done: bool,
}

impl ChunkReader {
    pub fn new(source: Box<dyn ChunkSource>) -> Self {
        ChunkReader {
            source,
            out_buf: Vec::new(),
            done: false,
        }
    }
}

impl Read for ChunkReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut wrote = 0;

        while wrote < buf.len() {
            if !self.out_buf.is_empty() {
                wrote += flush_buf(&mut self.out_buf, &mut buf[wrote..]);
                continue;
            }
            if self.done {
                break;
            }
            match self.source.next_chunk().map_err(std::io::Error::from)? {
                Some(chunk) => self.out_buf = chunk,
                None => self.done = true,
            }
        }
        Ok(wrote)
    }
}


#[cfg(test)]
mod test_stage {
    use super::test_support::*;
    use super::*;

    struct Doubler;
    impl ChunkTransform for Doubler {
        fn update(&mut self, chunk: &[u8]) -> Result<Vec<u8>> {
            let mut out = chunk.to_vec();
            out.extend_from_slice(chunk);
            Ok(out)
        }
        fn flush(&mut self) -> Result<Vec<u8>> {
            Ok(b"!".to_vec())
        }
    }

    #[test]
    fn stage_transforms_and_flushes() {
        let source = VecSource::new(vec![b"ab".to_vec(), b"c".to_vec()]);
        let mut stage = TransformStage::new(Box::new(source), Box::new(Doubler));

        assert_eq!(stage.next_chunk().unwrap(), Some(b"abab".to_vec()));
        assert_eq!(stage.next_chunk().unwrap(), Some(b"cc".to_vec()));
        assert_eq!(stage.next_chunk().unwrap(), Some(b"!".to_vec()));
        assert_eq!(stage.next_chunk().unwrap(), None);
        assert_eq!(stage.next_chunk().unwrap(), None);
    }

    #[test]
    fn chunk_reader_concatenates() {
        let source = VecSource::new(vec![b"hello ".to_vec(), b"world".to_vec()]);
        let mut reader = ChunkReader::new(Box::new(source));

        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello world");
    }
}

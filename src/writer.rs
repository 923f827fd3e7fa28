use std::io::{Read, Write};

use log::debug;

use crate::buf::fill_buf;
use crate::error::Result;
use crate::filter::EncoderFilter;
use crate::frame::{Frame, FrameType};
use crate::manifest::{
    JsonSerializer, ManifestRecord, Serializer, StreamConfigRecord, StreamResultRecord,
};
use crate::varint::Varint;

// Source read granularity; one source chunk feeds the encoder pipeline
// at a time
pub const DATA_CHUNK_SIZE: usize = 8 * 1024;

// Entries are strictly sequential, ids assigned in call order. Per
// entry the emission order is: config manifest, STREAM_HEADER,
// STREAM_DATA per non-empty encoder output chunk, STREAM_TRAILER,
// result manifest.
pub struct Writer<W: Write> {
    inner: W,
    serializer: Box<dyn Serializer>,
    next_id: u64,
    written: u64,
}

impl<W: Write> Writer<W> {
    pub fn new(sink: W) -> Self {
        Writer::with_serializer(sink, Box::new(JsonSerializer))
    }

    pub fn with_serializer(sink: W, serializer: Box<dyn Serializer>) -> Self {
        Writer {
            inner: sink,
            serializer,
            next_id: 0,
            written: 0,
        }
    }

    pub fn position(&self) -> u64 {
        self.written
    }

    // Returns the container offset the frame started at
    fn write_frame(&mut self, typ: FrameType, stream_id: u64, payload: Vec<u8>) -> Result<u64> {
        let at = self.written;
        let bytes = Frame::new(typ, stream_id, payload).encode()?;
        self.inner.write_all(&bytes)?;
        self.written += bytes.len() as u64;
        Ok(at)
    }

    // Encoders are borrowed so the caller can inspect published state
    // (CIDs) afterwards
    pub fn write_entry<R: Read>(
        &mut self,
        source: &mut R,
        encoders: &mut [Box<dyn EncoderFilter>],
        combine_id: Option<String>,
    ) -> Result<StreamResultRecord> {
        let stream_id = self.next_id;
        self.next_id += 1;

        let config = StreamConfigRecord {
            stream_id: Varint(stream_id),
            combine_id,
            filters: encoders.iter().map(|e| e.config()).collect(),
        };
        debug!("stream {}: config ({} filters)", stream_id, config.filters.len());
        let body = self.serializer.encode(&ManifestRecord::Config(config))?;
        self.write_frame(FrameType::ManifestEntry, stream_id, body)?;

        self.write_frame(FrameType::StreamHeader, stream_id, Vec::new())?;

        // offset names the first data frame's own header position, not
        // the payload start; downstream tooling depends on exactly this.
        // Streams with no data keep the would-be position.
        let mut offset = self.written;
        let mut first_data = true;
        let mut length: u64 = 0;

        let mut in_buf = [0u8; DATA_CHUNK_SIZE];
        loop {
            let (eof, len) = fill_buf(source, &mut in_buf)?;
            if len > 0 {
                let mut chunk = in_buf[..len].to_vec();
                for encoder in encoders.iter_mut() {
                    chunk = encoder.update(&chunk)?;
                }
                if !chunk.is_empty() {
                    length += chunk.len() as u64;
                    let at = self.write_frame(FrameType::StreamData, stream_id, chunk)?;
                    if first_data {
                        offset = at;
                        first_data = false;
                    }
                }
            }
            if eof {
                break;
            }
        }

        // Flush each encoder in pipeline order, pushing its tail through
        // the remaining stages
        for i in 0..encoders.len() {
            let mut carry = encoders[i].flush()?;
            for encoder in encoders[i + 1..].iter_mut() {
                carry = encoder.update(&carry)?;
            }
            if !carry.is_empty() {
                length += carry.len() as u64;
                let at = self.write_frame(FrameType::StreamData, stream_id, carry)?;
                if first_data {
                    offset = at;
                    first_data = false;
                }
            }
        }

        let trailer = self.serializer.encode_trailer()?;
        self.write_frame(FrameType::StreamTrailer, stream_id, trailer)?;

        let result = StreamResultRecord {
            stream_id: Varint(stream_id),
            offset,
            length,
            filter_result: encoders.iter().filter_map(|e| e.result()).collect(),
        };
        debug!(
            "stream {}: result offset={} length={}",
            stream_id, result.offset, result.length
        );
        let body = self.serializer.encode(&ManifestRecord::Result(result.clone()))?;
        self.write_frame(FrameType::ManifestEntry, stream_id, body)?;

        Ok(result)
    }

    pub fn close(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod test_writer {
    use super::*;
    use crate::filter::cid::CidEncoder;
    use crate::frame::iter_frames;
    use std::io::Cursor;

    fn frames_of(buf: &[u8]) -> Vec<(Frame, usize)> {
        iter_frames(buf).map(|r| r.unwrap()).collect()
    }

    #[test]
    fn plain_entry_frame_sequence() {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        let result = writer
            .write_entry(&mut Cursor::new(b"hello raw world".to_vec()), &mut [], None)
            .unwrap();
        let buf = writer.close().unwrap().into_inner();

        let frames = frames_of(&buf);
        assert_eq!(frames.len(), 5);

        let types: Vec<FrameType> = frames.iter().map(|(f, _)| f.typ).collect();
        assert_eq!(
            types,
            vec![
                FrameType::ManifestEntry,
                FrameType::StreamHeader,
                FrameType::StreamData,
                FrameType::StreamTrailer,
                FrameType::ManifestEntry,
            ]
        );
        assert!(frames.iter().all(|(f, _)| f.stream_id == 0));

        // Offset names the data frame's own header position
        assert_eq!(result.offset, frames[2].1 as u64);
        assert_eq!(result.length, 15);
        assert_eq!(frames[2].0.payload, b"hello raw world");
        assert_eq!(frames[1].0.payload, b"");
        assert_eq!(frames[3].0.payload, b"{}");
    }

    #[test]
    fn ids_assigned_in_order() {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        for expect in 0..3u64 {
            let result = writer
                .write_entry(&mut Cursor::new(b"x".to_vec()), &mut [], None)
                .unwrap();
            assert_eq!(result.stream_id.value(), expect);
        }
    }

    #[test]
    fn large_source_splits_into_chunks() {
        let data = vec![7u8; DATA_CHUNK_SIZE * 2 + 100];
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        let result = writer
            .write_entry(&mut Cursor::new(data.clone()), &mut [], None)
            .unwrap();
        let buf = writer.close().unwrap().into_inner();

        let data_frames: Vec<_> = frames_of(&buf)
            .into_iter()
            .filter(|(f, _)| f.typ == FrameType::StreamData)
            .collect();
        assert_eq!(data_frames.len(), 3);
        assert_eq!(result.length, data.len() as u64);

        let rejoined: Vec<u8> = data_frames.into_iter().flat_map(|(f, _)| f.payload).collect();
        assert_eq!(rejoined, data);
    }

    #[test]
    fn empty_source_has_no_data_frames() {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        let result = writer
            .write_entry(&mut Cursor::new(Vec::new()), &mut [], None)
            .unwrap();
        let buf = writer.close().unwrap().into_inner();

        assert_eq!(result.length, 0);
        let types: Vec<FrameType> = frames_of(&buf).iter().map(|(f, _)| f.typ).collect();
        assert!(!types.contains(&FrameType::StreamData));
    }

    #[test]
    fn filter_results_reach_the_manifest() {
        let mut encoders: Vec<Box<dyn EncoderFilter>> = vec![Box::new(CidEncoder::new())];
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        let result = writer
            .write_entry(&mut Cursor::new(b"content with cid".to_vec()), &mut encoders, None)
            .unwrap();

        assert_eq!(result.filter_result.len(), 1);
        match &result.filter_result[0] {
            crate::manifest::FilterResult::Cid { cid } => assert!(cid.starts_with("bafkrei")),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn combine_id_lands_in_config() {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        writer
            .write_entry(&mut Cursor::new(b"doc".to_vec()), &mut [], Some("rec-1".into()))
            .unwrap();
        let buf = writer.close().unwrap().into_inner();

        let (config_frame, _) = frames_of(&buf).into_iter().next().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&config_frame.payload).unwrap();
        assert_eq!(json["combineId"], "rec-1");
        assert_eq!(json["type"], "stream.config");
    }
}

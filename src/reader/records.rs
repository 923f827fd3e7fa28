use std::io::Read;

use log::debug;

use crate::error::{Error, Result};
use crate::frame::{Frame, FrameType};
use crate::manifest::{ManifestRecord, Serializer};
use crate::reader::frames::FrameReader;

#[derive(Debug)]
pub enum RecordItem {
    Record(ManifestRecord),
    Frame(Frame),
}

// Second reader stage: MANIFEST_ENTRY bodies that decode into a known
// record come out typed; everything else, including bodies the
// serializer rejects, passes through as the raw frame
pub struct RecordReader<R: Read> {
    frames: FrameReader<R>,
    serializer: Box<dyn Serializer>,
}

impl<R: Read> RecordReader<R> {
    pub fn new(frames: FrameReader<R>, serializer: Box<dyn Serializer>) -> Self {
        RecordReader { frames, serializer }
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<RecordItem>;

    fn next(&mut self) -> Option<Self::Item> {
        let frame = match self.frames.next()? {
            Ok(frame) => frame,
            Err(e) => return Some(Err(e)),
        };

        if frame.typ != FrameType::ManifestEntry {
            return Some(Ok(RecordItem::Frame(frame)));
        }

        match self.serializer.decode(&frame.payload) {
            Ok(record) => Some(Ok(RecordItem::Record(record))),
            Err(Error::ManifestDecode) | Err(Error::UnknownManifestShape) => {
                debug!(
                    "stream {}: unreadable manifest body, forwarding raw frame",
                    frame.stream_id
                );
                Some(Ok(RecordItem::Frame(frame)))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

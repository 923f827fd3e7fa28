use std::io::Read;

use crate::error::{Error, Result};
use crate::frame::{Frame, FrameType};
use crate::varint;

// The writer never exceeds its chunk size, so a declared length near
// this is a corrupt or hostile frame
pub const MAX_PAYLOAD: usize = 16 * 1024 * 1024;

// First reader stage: stitches an arbitrarily chunked byte source back
// into whole frames, one per pull. Clean EOF on a frame boundary ends
// the sequence; EOF anywhere inside a frame is Truncated.
pub struct FrameReader<R: Read> {
    inner: R,
    max_payload: usize,
}

impl<R: Read> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        FrameReader {
            inner: reader,
            max_payload: MAX_PAYLOAD,
        }
    }

    pub fn with_max_payload(reader: R, max_payload: usize) -> Self {
        FrameReader {
            inner: reader,
            max_payload,
        }
    }

    // Varint where EOF on any byte is mid-frame truncation
    fn read_varint(&mut self) -> Result<u64> {
        let mut first = [0u8; 1];
        self.inner.read_exact(&mut first).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::Truncated,
            _ => Error::Io(e),
        })?;
        Ok(varint::read_remainder(first[0], &mut self.inner)?.0)
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        // Clean EOF before the first byte of a frame is end-of-stream
        let mut first = [0u8; 1];
        loop {
            match self.inner.read(&mut first) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }

        let (code, _) = varint::read_remainder(first[0], &mut self.inner)?;
        let stream_id = self.read_varint()?;
        let length = self.read_varint()?;

        if length > self.max_payload as u64 {
            return Err(Error::ValueOutOfRange);
        }

        let mut payload = vec![0u8; length as usize];
        self.inner.read_exact(&mut payload).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::Truncated,
            _ => Error::Io(e),
        })?;

        Ok(Some(Frame {
            typ: FrameType::from_code(code),
            stream_id,
            payload,
        }))
    }
}

impl<R: Read> Iterator for FrameReader<R> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_frame().transpose()
    }
}

#[cfg(test)]
mod test_frame_reader {
    use super::*;
    use crate::reader::test_support::OneByte;
    use std::io::Cursor;

    fn sample_frames() -> Vec<Frame> {
        vec![
            Frame::new(FrameType::StreamHeader, 0, vec![]),
            Frame::new(FrameType::StreamData, 0, b"some payload bytes".to_vec()),
            Frame::new(FrameType::StreamTrailer, 300, b"{}".to_vec()),
        ]
    }

    fn encode_all(frames: &[Frame]) -> Vec<u8> {
        frames.iter().flat_map(|f| f.encode().unwrap()).collect()
    }

    #[test]
    fn whole_buffer() {
        let frames = sample_frames();
        let buf = encode_all(&frames);

        let got: Vec<Frame> = FrameReader::new(Cursor::new(buf)).map(|r| r.unwrap()).collect();
        assert_eq!(got, frames);
    }

    #[test]
    fn one_byte_at_a_time() {
        let frames = sample_frames();
        let buf = encode_all(&frames);

        let got: Vec<Frame> = FrameReader::new(OneByte::new(Cursor::new(buf)))
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(got, frames);
    }

    #[test]
    fn empty_source_is_empty_sequence() {
        assert!(FrameReader::new(Cursor::new(Vec::new())).next().is_none());
    }

    #[test]
    fn eof_inside_header_is_truncated() {
        let buf = encode_all(&sample_frames());
        let mut reader = FrameReader::new(Cursor::new(buf[..4].to_vec()));

        assert!(reader.next().unwrap().is_ok());
        assert!(matches!(reader.next().unwrap(), Err(Error::Truncated)));
    }

    #[test]
    fn eof_inside_payload_is_truncated() {
        let buf = Frame::new(FrameType::StreamData, 0, vec![1, 2, 3, 4]).encode().unwrap();
        let mut reader = FrameReader::new(Cursor::new(buf[..buf.len() - 2].to_vec()));

        assert!(matches!(reader.next().unwrap(), Err(Error::Truncated)));
    }

    #[test]
    fn oversized_length_rejected_up_front() {
        let mut reader = FrameReader::with_max_payload(
            Cursor::new(Frame::new(FrameType::StreamData, 0, vec![0u8; 64]).encode().unwrap()),
            32,
        );
        assert!(matches!(reader.next().unwrap(), Err(Error::ValueOutOfRange)));
    }
}

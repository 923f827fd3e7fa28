use std::collections::{HashMap, VecDeque};
use std::io::Read;
use std::rc::{Rc, Weak};

use std::cell::RefCell;

use log::debug;

use crate::buf::flush_buf;
use crate::error::{Error, Result};
use crate::filter::{ChunkReader, ChunkSource, DecoderFactory};
use crate::frame::{Frame, FrameType};
use crate::manifest::{FilterConfig, ManifestRecord, StreamConfigRecord, StreamResultRecord};
use crate::reader::records::{RecordItem, RecordReader};
use crate::resolve::{compose_decoders, resolve, ResolvedEntry};
use crate::varint::Varint;

#[derive(Default)]
struct Pipe {
    chunks: VecDeque<Vec<u8>>,
    closed: bool,
    cancelled: bool,
}

pub(crate) enum BinderItem<R: Read> {
    Begin(StreamFileBegin<R>),
    End(StreamResultRecord),
    Frame(Frame),
}

// One pump step either made progress or refused to spool into a pipe
// already at the high-water mark.
pub(crate) enum Pump {
    Progress,
    Full(u64),
}

// Shared between the event iterator and every live StreamReader;
// whichever side needs more input pumps one upstream item at a time.
pub(crate) struct BinderCore<R: Read> {
    upstream: RecordReader<R>,
    factories: Vec<Box<dyn DecoderFactory>>,
    pending_configs: HashMap<u64, (StreamConfigRecord, Vec<ResolvedEntry>)>,
    pipes: HashMap<u64, Rc<RefCell<Pipe>>>,
    // Data frame pushed back by a full pipe, retried before upstream
    parked_data: Option<Frame>,
    pub(crate) queued: VecDeque<Result<BinderItem<R>>>,
    high_water: usize,
    pub(crate) done: bool,
    weak_self: Weak<RefCell<BinderCore<R>>>,
}

impl<R: Read> BinderCore<R> {
    pub(crate) fn new_shared(
        upstream: RecordReader<R>,
        factories: Vec<Box<dyn DecoderFactory>>,
        high_water: usize,
    ) -> Rc<RefCell<BinderCore<R>>> {
        let core = Rc::new(RefCell::new(BinderCore {
            upstream,
            factories,
            pending_configs: HashMap::new(),
            pipes: HashMap::new(),
            parked_data: None,
            queued: VecDeque::new(),
            high_water,
            done: false,
            weak_self: Weak::new(),
        }));
        core.borrow_mut().weak_self = Rc::downgrade(&core);
        core
    }

    pub(crate) fn pump(&mut self) -> Pump {
        // A parked data frame must land before anything newer is read,
        // or per-stream frame order breaks
        if let Some(frame) = self.parked_data.take() {
            let id = frame.stream_id;
            match self.offer_data(frame) {
                Some(frame) => {
                    self.parked_data = Some(frame);
                    return Pump::Full(id);
                }
                None => return Pump::Progress,
            }
        }

        let item = match self.upstream.next() {
            None => {
                self.done = true;
                return Pump::Progress;
            }
            Some(Err(e)) => {
                // Fatal framing error; the container cannot be trusted
                // past this point
                self.done = true;
                self.queued.push_back(Err(e));
                return Pump::Progress;
            }
            Some(Ok(item)) => item,
        };

        match item {
            RecordItem::Record(ManifestRecord::Config(config)) => {
                let id = config.stream_id.value();
                debug!("stream {}: config parked", id);
                match resolve(&config, &self.factories) {
                    Ok(entries) => {
                        self.pending_configs.insert(id, (config, entries));
                    }
                    Err(e) => self.queued.push_back(Err(e)),
                }
            }

            RecordItem::Record(ManifestRecord::Result(result)) => {
                debug!("stream {}: result", result.stream_id.value());
                self.queued.push_back(Ok(BinderItem::End(result)));
            }

            RecordItem::Frame(frame) => return self.on_frame(frame),
        }
        Pump::Progress
    }

    fn on_frame(&mut self, frame: Frame) -> Pump {
        let id = frame.stream_id;
        match frame.typ {
            FrameType::StreamHeader => match self.pending_configs.remove(&id) {
                Some((config, entries)) => {
                    debug!("stream {}: open", id);
                    let pipe = Rc::new(RefCell::new(Pipe::default()));
                    self.pipes.insert(id, pipe.clone());
                    self.queued.push_back(Ok(BinderItem::Begin(StreamFileBegin {
                        config,
                        entries,
                        stream: StreamReader {
                            id,
                            pipe,
                            core: self.weak_self.clone(),
                            out_buf: Vec::new(),
                        },
                    })));
                }
                // Header with no parked config is tolerated
                None => self.queued.push_back(Ok(BinderItem::Frame(frame))),
            },

            FrameType::StreamData => {
                if let Some(frame) = self.offer_data(frame) {
                    self.parked_data = Some(frame);
                    return Pump::Full(id);
                }
            }

            FrameType::StreamTrailer => match self.pipes.remove(&id) {
                Some(pipe) => {
                    debug!("stream {}: closed", id);
                    // Trailer body is reserved, ignore it
                    pipe.borrow_mut().closed = true;
                }
                None => self.queued.push_back(Ok(BinderItem::Frame(frame))),
            },

            // INDEX, FOOTER, unknown codes: tolerated, forwarded untyped
            _ => self.queued.push_back(Ok(BinderItem::Frame(frame))),
        }
        Pump::Progress
    }

    // Copy a data frame into its pipe, or hand it back when the pipe is
    // live but already at the high-water mark
    fn offer_data(&mut self, frame: Frame) -> Option<Frame> {
        let id = frame.stream_id;
        match self.pipes.get(&id) {
            Some(pipe) => {
                let mut pipe = pipe.borrow_mut();
                if pipe.cancelled {
                    debug!("stream {}: {} bytes drained to discard", id, frame.payload.len());
                    None
                } else if pipe.chunks.len() >= self.high_water {
                    Some(frame)
                } else {
                    pipe.chunks.push_back(frame.payload);
                    None
                }
            }
            None => {
                debug!("stream {}: data with no open pipe, discarded", id);
                None
            }
        }
    }
}

pub struct StreamFileBegin<R: Read> {
    config: StreamConfigRecord,
    entries: Vec<ResolvedEntry>,
    pub stream: StreamReader<R>,
}

impl<R: Read> StreamFileBegin<R> {
    pub fn stream_id(&self) -> u64 {
        self.config.stream_id.value()
    }

    pub fn stream_id_varint(&self) -> Varint {
        self.config.stream_id
    }

    pub fn combine_id(&self) -> Option<&str> {
        self.config.combine_id.as_deref()
    }

    pub fn filters(&self) -> &[FilterConfig] {
        &self.config.filters
    }

    pub fn config(&self) -> &StreamConfigRecord {
        &self.config
    }
}

impl<R: Read + 'static> StreamFileBegin<R> {
    // Composes the resolved decoders in reverse declaration order.
    // An unclaimed filter slot fails here, not earlier.
    pub fn decode(self) -> Result<ChunkReader> {
        let StreamFileBegin {
            entries, stream, ..
        } = self;
        compose_decoders(&entries, Box::new(stream))
    }
}

pub struct StreamReader<R: Read> {
    id: u64,
    pipe: Rc<RefCell<Pipe>>,
    core: Weak<RefCell<BinderCore<R>>>,
    out_buf: Vec<u8>,
}

impl<R: Read> StreamReader<R> {
    pub fn stream_id(&self) -> u64 {
        self.id
    }

    pub fn cancel(&mut self) {
        debug!("stream {}: cancelled", self.id);
        let mut pipe = self.pipe.borrow_mut();
        pipe.cancelled = true;
        pipe.chunks.clear();
    }
}

impl<R: Read> ChunkSource for StreamReader<R> {
    fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            {
                let mut pipe = self.pipe.borrow_mut();
                if let Some(chunk) = pipe.chunks.pop_front() {
                    return Ok(Some(chunk));
                }
                if pipe.closed || pipe.cancelled {
                    return Ok(None);
                }
            }

            let core = match self.core.upgrade() {
                Some(core) => core,
                None => return Ok(None),
            };
            let mut core = core.borrow_mut();
            if core.done {
                // Frames ran out before this stream's trailer
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("container ended before trailer of stream {}", self.id),
                )));
            }
            match core.pump() {
                Pump::Progress => (),
                // Our own pipe is empty, so only another stream's full
                // pipe can block the pump
                Pump::Full(other) => {
                    return Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::WouldBlock,
                        format!("stream {} pipe is at capacity", other),
                    )));
                }
            }
        }
    }
}

impl<R: Read> Read for StreamReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut wrote = 0;

        while wrote < buf.len() {
            if !self.out_buf.is_empty() {
                wrote += flush_buf(&mut self.out_buf, &mut buf[wrote..]);
                continue;
            }
            match self.next_chunk().map_err(std::io::Error::from)? {
                Some(chunk) => self.out_buf = chunk,
                None => break,
            }
        }
        Ok(wrote)
    }
}

impl<R: Read> Drop for StreamReader<R> {
    fn drop(&mut self) {
        let mut pipe = self.pipe.borrow_mut();
        if !pipe.closed {
            pipe.cancelled = true;
            pipe.chunks.clear();
        }
    }
}

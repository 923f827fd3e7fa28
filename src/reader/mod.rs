pub mod binder;
pub mod frames;
pub mod records;

use std::cell::RefCell;
use std::io::Read;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::filter::DecoderFactory;
use crate::manifest::{JsonSerializer, Serializer, StreamResultRecord};
use crate::reader::binder::{BinderCore, BinderItem, Pump};
use crate::reader::frames::FrameReader;
use crate::reader::records::RecordReader;
use crate::resolve::builtin_factories;

pub use crate::reader::binder::{StreamFileBegin, StreamReader};

pub const DEFAULT_HIGH_WATER: usize = 16;

pub struct ReaderOpts {
    // Applied after the built-in CID and ZStr factories
    pub decoders: Vec<Box<dyn DecoderFactory>>,

    // Per-stream pipe bound, in chunks
    pub high_water: usize,

    // UTF-8 JSON when unset
    pub serializer: Option<Box<dyn Serializer>>,
}

impl Default for ReaderOpts {
    fn default() -> Self {
        ReaderOpts {
            decoders: Vec::new(),
            high_water: DEFAULT_HIGH_WATER,
            serializer: None,
        }
    }
}

pub enum Event<R: Read> {
    Begin(StreamFileBegin<R>),
    End(StreamResultRecord),
}

impl<R: Read> Event<R> {
    pub fn stream_id(&self) -> u64 {
        match self {
            Event::Begin(begin) => begin.stream_id(),
            Event::End(end) => end.stream_id.value(),
        }
    }
}

pub fn stream_id_of<R: Read>(event: &Event<R>) -> u64 {
    event.stream_id()
}

pub struct Reader<R: Read> {
    core: Rc<RefCell<BinderCore<R>>>,
}

impl<R: Read> Reader<R> {
    pub fn new(input: R) -> Self {
        Reader::with_opts(input, ReaderOpts::default())
    }

    pub fn with_opts(input: R, opts: ReaderOpts) -> Self {
        let serializer = opts.serializer.unwrap_or_else(|| Box::new(JsonSerializer));

        let mut factories = builtin_factories();
        factories.extend(opts.decoders);

        let records = RecordReader::new(FrameReader::new(input), serializer);
        Reader {
            core: BinderCore::new_shared(records, factories, opts.high_water),
        }
    }
}

impl<R: Read> Iterator for Reader<R> {
    type Item = Result<Event<R>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let mut core = self.core.borrow_mut();
            if let Some(item) = core.queued.pop_front() {
                match item {
                    Ok(BinderItem::Begin(begin)) => return Some(Ok(Event::Begin(begin))),
                    Ok(BinderItem::End(end)) => return Some(Ok(Event::End(end))),
                    // Raw leftovers never reach the consumer
                    Ok(BinderItem::Frame(_)) => continue,
                    Err(e) => return Some(Err(e)),
                }
            }
            if core.done {
                return None;
            }
            match core.pump() {
                Pump::Progress => (),
                // A pipe at capacity pauses the event pump; the consumer
                // must drain or cancel that stream, then events resume
                Pump::Full(id) => {
                    return Some(Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::WouldBlock,
                        format!("stream {} pipe is at capacity, drain or cancel it", id),
                    ))));
                }
            }
        }
    }
}

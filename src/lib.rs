//! QSF - QUIC Stream File
//!
//! A container format multiplexing independent logical byte streams into
//! one file or byte sequence, each stream passing through a composable
//! filter pipeline (content addressing, compression, encryption).
//! Readers start consuming a stream as soon as its framing arrives; no
//! stage buffers the whole container.
//!
//! # Wire layout
//!
//! A container is a plain concatenation of frames (see [`frame`]). For
//! every logical stream `i` the writer emits, in order:
//!
//! | Frame | Payload |
//! | ----- | ------- |
//! | MANIFEST_ENTRY | `stream.config` record for `i` |
//! | STREAM_HEADER  | empty |
//! | STREAM_DATA ×K | encoded chunks of `i` |
//! | STREAM_TRAILER | empty record |
//! | MANIFEST_ENTRY | `stream.result` record for `i` |
//!
//! Frame types 0x05 (INDEX) and 0x06 (FOOTER) are reserved: never
//! emitted here, tolerated and skipped on read.
//!
//! # Writing
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::Cursor;
//! use qsf::filter::cid::CidEncoder;
//! use qsf::filter::EncoderFilter;
//! use qsf::writer::Writer;
//!
//! # fn main() -> qsf::Result<()> {
//! let mut writer = Writer::new(File::create("out.qsf")?);
//! let mut encoders: Vec<Box<dyn EncoderFilter>> = vec![Box::new(CidEncoder::new())];
//! writer.write_entry(&mut Cursor::new(b"hello".to_vec()), &mut encoders, None)?;
//! writer.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Reading
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::Read;
//! use qsf::reader::{Event, Reader};
//!
//! # fn main() -> qsf::Result<()> {
//! for event in Reader::new(File::open("out.qsf")?) {
//!     match event? {
//!         Event::Begin(begin) => {
//!             let mut bytes = Vec::new();
//!             begin.decode()?.read_to_end(&mut bytes)?;
//!         }
//!         Event::End(end) => println!("stream {} done", end.stream_id.value()),
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! File extension convention is `.qsf`, MIME `application/x.qsf`.

pub mod buf;
pub mod cli;
pub mod error;
pub mod filter;
pub mod frame;
pub mod keystore;
pub mod manifest;
pub mod reader;
pub mod resolve;
pub mod varint;
pub mod writer;

pub use error::{Error, Result};
pub use reader::{stream_id_of, Event, Reader, ReaderOpts, StreamFileBegin, StreamReader};
pub use writer::Writer;

use std::rc::Rc;

use crate::error::{Error, Result};
use crate::filter::cid::CidFactory;
use crate::filter::zstr::ZstrFactory;
use crate::filter::{ChunkReader, ChunkSource, DecoderFactory, DecoderFilter, TransformStage};
use crate::manifest::{FilterConfig, StreamConfigRecord};

// One filter slot of a stream config: the manifest-declared input and
// the decoder instance a factory assigned, if any
pub struct ResolvedEntry {
    pub input: FilterConfig,
    pub instance: Option<Rc<dyn DecoderFilter>>,
}

impl ResolvedEntry {
    pub fn unclaimed(input: FilterConfig) -> Self {
        ResolvedEntry {
            input,
            instance: None,
        }
    }
}

// Left-to-right fold: each factory inspects the slots and claims the
// ones it recognizes. A slot nobody claimed only matters once the
// consumer asks for the decoded stream.
pub fn resolve(
    record: &StreamConfigRecord,
    factories: &[Box<dyn DecoderFactory>],
) -> Result<Vec<ResolvedEntry>> {
    let mut entries: Vec<ResolvedEntry> = record
        .filters
        .iter()
        .cloned()
        .map(ResolvedEntry::unclaimed)
        .collect();

    for factory in factories {
        entries = factory.detect(record, entries)?;
    }
    Ok(entries)
}

// CID and ZStr resolve with no configuration
pub fn builtin_factories() -> Vec<Box<dyn DecoderFactory>> {
    vec![Box::new(CidFactory), Box::new(ZstrFactory)]
}

// Compose the resolved decode transforms over source in reverse
// declaration order (the last encoder applied is undone first)
pub fn compose_decoders(
    entries: &[ResolvedEntry],
    source: Box<dyn ChunkSource>,
) -> Result<ChunkReader> {
    let mut chain = source;

    for entry in entries.iter().rev() {
        let instance = entry
            .instance
            .as_ref()
            .ok_or_else(|| Error::UnresolvedFilter(entry.input.type_name().to_string()))?;
        chain = Box::new(TransformStage::new(chain, instance.decoder()?));
    }
    Ok(ChunkReader::new(chain))
}

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::filter::cid::{cid_of, CidEncoder};

// Combines the content ids of related streams into one group id:
// CIDv1(raw, sha2-256) over the canonical JSON array of member CID
// strings in registration order.
pub struct CidCollector {
    slots: Vec<Rc<RefCell<Option<String>>>>,
}

impl CidCollector {
    pub fn new() -> Self {
        CidCollector { slots: Vec::new() }
    }

    // Register the next member slot and return the encoder bound to it
    pub fn slot(&mut self) -> CidEncoder {
        let cell = Rc::new(RefCell::new(None));
        self.slots.push(cell.clone());
        CidEncoder::bound(cell)
    }

    // Errors while any member stream has not flushed yet
    pub fn member_cids(&self) -> Result<Vec<String>> {
        self.slots
            .iter()
            .map(|slot| {
                slot.borrow().clone().ok_or_else(|| {
                    Error::Io(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "collector slot not yet resolved",
                    ))
                })
            })
            .collect()
    }

    pub fn result(&self) -> Result<String> {
        if self.slots.is_empty() {
            return Err(Error::EmptyCollector);
        }

        let members = self.member_cids()?;
        let canonical = serde_json::to_vec(&members)
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        Ok(cid_of(&canonical))
    }
}

impl Default for CidCollector {
    fn default() -> Self {
        CidCollector::new()
    }
}

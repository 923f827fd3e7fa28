use std::fs;
use std::io;
use std::path::Path;

use log::debug;

use crate::filter::aead::{Key, KEY_LEN};

// A key file is the raw 32 key bytes, nothing else. The read side
// loads a directory of them and indexes by fingerprint, which is what
// manifests reference via keyId.

pub fn load(path: &Path) -> io::Result<Key> {
    let bytes = fs::read(path)?;
    let raw: [u8; KEY_LEN] = bytes.as_slice().try_into().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "key file {} must be exactly {} bytes, found {}",
                path.display(),
                KEY_LEN,
                bytes.len()
            ),
        )
    })?;
    Ok(Key::from_bytes(raw))
}

pub fn save(path: &Path, key: &Key) -> io::Result<()> {
    fs::write(path, key.as_bytes())
}

// The flag reports whether a fresh key was generated and saved
pub fn load_or_generate(path: &Path) -> io::Result<(Key, bool)> {
    match load(path) {
        Ok(key) => Ok((key, false)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let key = Key::generate();
            save(path, &key)?;
            debug!("generated key {} ({})", path.display(), key.fingerprint());
            Ok((key, true))
        }
        Err(e) => Err(e),
    }
}

// Files of the wrong size are skipped, not fatal; a key directory may
// hold other material
pub fn load_dir(dir: &Path) -> io::Result<Vec<Key>> {
    let mut keys = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        match load(&entry.path()) {
            Ok(key) => keys.push(key),
            Err(e) => debug!("skipping {}: {}", entry.path().display(), e),
        }
    }
    Ok(keys)
}

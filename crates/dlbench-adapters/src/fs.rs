use crate::AdapterError;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> AdapterError + '_ {
    move |source| AdapterError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Destroy `dir` if present, then create it empty.
///
/// Two runs targeting the same directory at once would race here.
pub fn recreate_dir(dir: &Path) -> Result<(), AdapterError> {
    match fs::symlink_metadata(dir) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(dir).map_err(io_err(dir))?,
        Ok(_) => fs::remove_file(dir).map_err(io_err(dir))?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(io_err(dir)(e)),
    }
    fs::create_dir_all(dir).map_err(io_err(dir))
}

pub fn read_text(path: &Path) -> Result<String, AdapterError> {
    fs::read_to_string(path).map_err(io_err(path))
}

/// Read a file a child process wrote to. Missing reads as empty; invalid
/// UTF-8 is replaced rather than rejected.
pub fn read_report(path: &Path) -> Result<String, AdapterError> {
    match fs::read(path) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(io_err(path)(e)),
    }
}

/// Remove `path` if it exists.
pub fn discard_file(path: &Path) -> Result<(), AdapterError> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(io_err(path)(e)),
        _ => Ok(()),
    }
}

/// Create or truncate `path` and write `bytes` to it.
pub fn write_report(path: &Path, bytes: &[u8]) -> Result<(), AdapterError> {
    fs::write(path, bytes).map_err(io_err(path))
}

/// Append `bytes` to `path`, creating it if needed.
pub fn append_report(path: &Path, bytes: &[u8]) -> Result<(), AdapterError> {
    let mut f = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err(path))?;
    f.write_all(bytes).map_err(io_err(path))
}

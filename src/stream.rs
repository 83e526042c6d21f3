//! Byte streams used as request bodies and response sinks.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AccessMode {
    #[default]
    Read,
    /// Opening truncates existing content.
    Write,
    /// Opening keeps existing content and appends after it.
    Append,
}

/// A byte stream the session reads request bodies from and writes responses to.
///
/// The session opens and closes streams itself. Callers hand them over
/// closed and get them back closed.
pub trait ContentStream: Send {
    fn set_access_mode(&mut self, mode: AccessMode);

    fn access_mode(&self) -> AccessMode;

    fn open(&mut self) -> io::Result<()>;

    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Exposes the whole content as one slice. Only valid while open for reading.
    fn map(&mut self) -> Option<&[u8]>;

    fn unmap(&mut self);

    /// Truncates or zero-extends the content. Works whether or not the stream is open.
    fn set_size(&mut self, size: u64) -> io::Result<()>;

    fn write(&mut self, chunk: &[u8]) -> io::Result<()>;

    fn size(&self) -> u64;

    fn media_type(&self) -> Option<&str>;
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStream {
    data: Vec<u8>,
    mode: AccessMode,
    open: bool,
    mapped: bool,
    media_type: Option<String>,
}

impl MemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }
}

impl ContentStream for MemoryStream {
    fn set_access_mode(&mut self, mode: AccessMode) {
        self.mode = mode;
    }

    fn access_mode(&self) -> AccessMode {
        self.mode
    }

    fn open(&mut self) -> io::Result<()> {
        if self.open {
            return Err(io::Error::other("memory stream is already open"));
        }
        if self.mode == AccessMode::Write {
            self.data.clear();
        }
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.mapped = false;
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn map(&mut self) -> Option<&[u8]> {
        if !self.open || self.mode != AccessMode::Read {
            return None;
        }
        self.mapped = true;
        Some(self.data.as_slice())
    }

    fn unmap(&mut self) {
        self.mapped = false;
    }

    fn set_size(&mut self, size: u64) -> io::Result<()> {
        let size = usize::try_from(size)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "size exceeds address space"))?;
        self.data.resize(size, 0);
        Ok(())
    }

    fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        if !self.open || self.mode == AccessMode::Read {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "memory stream is not open for writing",
            ));
        }
        self.data.extend_from_slice(chunk);
        Ok(())
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }
}

/// File-backed stream. Mapping reads the file into memory.
#[derive(Debug)]
pub struct FileStream {
    path: PathBuf,
    mode: AccessMode,
    file: Option<File>,
    mapped: Option<Vec<u8>>,
    media_type: Option<String>,
}

impl FileStream {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mode: AccessMode::Read,
            file: None,
            mapped: None,
            media_type: None,
        }
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ContentStream for FileStream {
    fn set_access_mode(&mut self, mode: AccessMode) {
        self.mode = mode;
    }

    fn access_mode(&self) -> AccessMode {
        self.mode
    }

    fn open(&mut self) -> io::Result<()> {
        if self.file.is_some() {
            return Err(io::Error::other("file stream is already open"));
        }
        let file = match self.mode {
            AccessMode::Read => File::open(&self.path)?,
            AccessMode::Write => File::create(&self.path)?,
            AccessMode::Append => OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?,
        };
        self.file = Some(file);
        Ok(())
    }

    fn close(&mut self) {
        self.mapped = None;
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn map(&mut self) -> Option<&[u8]> {
        if self.mode != AccessMode::Read {
            return None;
        }
        if self.mapped.is_none() {
            let file = self.file.as_mut()?;
            let mut content = Vec::new();
            file.read_to_end(&mut content).ok()?;
            self.mapped = Some(content);
        }
        self.mapped.as_deref()
    }

    fn unmap(&mut self) {
        self.mapped = None;
    }

    fn set_size(&mut self, size: u64) -> io::Result<()> {
        match &self.file {
            Some(file) if self.mode != AccessMode::Read => file.set_len(size),
            _ => OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(false)
                .open(&self.path)?
                .set_len(size),
        }
    }

    fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        match &mut self.file {
            Some(file) if self.mode != AccessMode::Read => file.write_all(chunk),
            _ => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "file stream is not open for writing",
            )),
        }
    }

    fn size(&self) -> u64 {
        std::fs::metadata(&self.path)
            .map(|metadata| metadata.len())
            .unwrap_or(0)
    }

    fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }
}

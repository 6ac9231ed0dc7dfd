//! Standard `Read + Seek + Write` adapter over a [`FileHandle`].
//!
//! The stream owns its handle until [`VfsStream::close`] is called. Closing
//! twice is a no-op; any other use after close reports an I/O error.

use crate::file::FileHandle;
use log::{debug, warn};
use std::io::{self, Read, Seek, SeekFrom, Write};

#[derive(Debug)]
pub struct VfsStream {
    name: String,
    handle: Option<FileHandle>,
}

impl VfsStream {
    pub fn new(handle: FileHandle) -> Self {
        Self {
            name: handle.name().to_string(),
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_none()
    }

    /// Length of the underlying file.
    pub fn size(&self) -> io::Result<u64> {
        Ok(self.handle_ref()?.len()?)
    }

    /// Release the handle. A second call does nothing.
    pub fn close(&mut self) -> io::Result<()> {
        match self.handle.take() {
            Some(handle) => {
                debug!("closing stream {}", self.name);
                handle.close().map_err(io::Error::from)
            }
            None => Ok(()),
        }
    }

    fn handle_ref(&self) -> io::Result<&FileHandle> {
        self.handle.as_ref().ok_or_else(|| closed(&self.name))
    }

    fn handle_mut(&mut self) -> io::Result<&mut FileHandle> {
        match self.handle.as_mut() {
            Some(handle) => Ok(handle),
            None => Err(closed(&self.name)),
        }
    }
}

fn closed(name: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("stream {} is closed", name))
}

impl Read for VfsStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let handle = self.handle_mut()?;
        let read = handle.read_bytes(buf)?;
        if read < buf.len() && !handle.eof()? {
            warn!("short read on {}: {} of {} bytes", self.name, read, buf.len());
        }
        Ok(read)
    }
}

impl Seek for VfsStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let handle = self.handle_mut()?;
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => handle.tell()?.checked_add_signed(delta),
            SeekFrom::End(delta) => handle.len()?.checked_add_signed(delta),
        };
        let Some(target) = target else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative position",
            ));
        };
        handle.seek(target)?;
        Ok(target)
    }
}

impl Write for VfsStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.handle_mut()?.write(buf, 1, buf.len())?)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.handle_mut().map(|_| ())
    }
}

impl Drop for VfsStream {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("error closing stream {}: {}", self.name, e);
        }
    }
}

impl From<FileHandle> for VfsStream {
    fn from(handle: FileHandle) -> Self {
        Self::new(handle)
    }
}

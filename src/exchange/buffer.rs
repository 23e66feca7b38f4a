//! Response buffer shared by the requests of one session

use super::{ExchangeError, ExchangeResult};
use std::io;
use std::ops::{Deref, DerefMut};

/// Growable buffer receiving HTTP response bodies
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    data: Vec<u8>,
    attached: bool,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve at least `min_capacity` bytes and start capturing responses
    pub fn attach(&mut self, min_capacity: usize) -> ExchangeResult<()> {
        self.data.clear();
        self.data.try_reserve(min_capacity).map_err(|e| {
            ExchangeError::Internal(format!("cannot allocate response buffer: {}", e))
        })?;
        self.attached = true;
        Ok(())
    }

    /// Attach for the lifetime of the returned lease
    pub fn lease(&mut self, min_capacity: usize) -> ExchangeResult<BufferLease<'_>> {
        self.attach(min_capacity)?;
        Ok(BufferLease { buffer: self })
    }

    /// Drop the contents and give the memory back
    pub fn release(&mut self) {
        self.data = Vec::new();
        self.attached = false;
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }
}

impl io::Write for ResponseBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Releases the buffer when dropped, whichever way the holder exits
#[derive(Debug)]
pub struct BufferLease<'a> {
    buffer: &'a mut ResponseBuffer,
}

impl Deref for BufferLease<'_> {
    type Target = ResponseBuffer;

    fn deref(&self) -> &ResponseBuffer {
        &*self.buffer
    }
}

impl DerefMut for BufferLease<'_> {
    fn deref_mut(&mut self) -> &mut ResponseBuffer {
        &mut *self.buffer
    }
}

impl Drop for BufferLease<'_> {
    fn drop(&mut self) {
        self.buffer.release();
    }
}

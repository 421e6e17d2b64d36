//! Transport abstraction: any byte-oriented channel.
//!
//! Concrete implementations live outside this crate (serial lines, sockets,
//! pipes). [`FramedPort`](super::framed::FramedPort) is generic over
//! `Transport`, so adding a new transport requires zero changes to the RPC
//! logic. [`LoopbackTransport`] connects two framed ports in memory.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Byte-oriented transport channel.
pub trait Transport {
    /// Error type for this transport.
    type Error: core::fmt::Debug;

    /// Read up to `buf.len()` bytes into `buf`.
    /// Returns the number of bytes actually read.
    /// Returns 0 if no data is available (non-blocking).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write `data` to the transport.
    /// Returns the number of bytes actually written.
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    /// Flush any buffered output.
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Check if data is available for reading.
    fn available(&self) -> bool;
}

/// A null transport that discards all writes and never reads.
pub struct NullTransport;

impl Transport for NullTransport {
    type Error = ();

    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, ()> {
        Ok(0)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ()> {
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn available(&self) -> bool {
        false
    }
}

type Pipe = Rc<RefCell<VecDeque<u8>>>;

/// One end of an in-memory byte pipe pair.
pub struct LoopbackTransport {
    rx: Pipe,
    tx: Pipe,
}

impl LoopbackTransport {
    /// Two transports wired back to back.
    pub fn pair() -> (Self, Self) {
        let a: Pipe = Rc::default();
        let b: Pipe = Rc::default();
        (
            Self {
                rx: a.clone(),
                tx: b.clone(),
            },
            Self { rx: b, tx: a },
        )
    }

    /// Inject raw bytes as if the peer had written them.
    pub fn inject(&self, bytes: &[u8]) {
        self.rx.borrow_mut().extend(bytes);
    }
}

impl Transport for LoopbackTransport {
    type Error = core::convert::Infallible;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut rx = self.rx.borrow_mut();
        let n = buf.len().min(rx.len());
        for (slot, byte) in buf.iter_mut().zip(rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
        self.tx.borrow_mut().extend(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn available(&self) -> bool {
        !self.rx.borrow().is_empty()
    }
}

//! Port over any byte [`Transport`].
//!
//! Outbound values are converted to [`WireValue`](super::codec::WireValue),
//! encoded with postcard and written as one length-prefixed frame. Inbound
//! bytes are pulled by [`FramedPort::pump`], which the owner calls whenever
//! the transport may have data (a poll loop, a readiness callback, a test).
//!
//! Bytes cannot carry identity, so transfer lists degrade to copies and
//! port values are rejected with [`CloneError::Unrepresentable`].

use core::cell::Cell;
use std::cell::RefCell;
use std::collections::VecDeque;

use log::{debug, warn};

use super::codec::{FrameDecoder, decode_value, encode_value};
use super::transport::Transport;
use super::{Listener, ListenerId, Listeners, MessageEvent, Port};
use crate::config::ChannelConfig;
use crate::error::CloneError;
use crate::value::{Transferable, Value};

const READ_BUF_SIZE: usize = 1024;

pub struct FramedPort<T: Transport> {
    transport: RefCell<T>,
    decoder: RefCell<FrameDecoder>,
    max_frame_size: usize,
    max_value_depth: usize,
    listeners: Listeners,
    /// Values decoded before `start()`.
    backlog: RefCell<VecDeque<Value>>,
    started: Cell<bool>,
    closed: Cell<bool>,
}

impl<T: Transport> FramedPort<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, &ChannelConfig::default())
    }

    pub fn with_max_frame_size(transport: T, max_frame_size: usize) -> Self {
        Self::with_config(
            transport,
            &ChannelConfig {
                max_frame_size,
                ..ChannelConfig::default()
            },
        )
    }

    /// Frame size and value nesting limits taken from `config`.
    pub fn with_config(transport: T, config: &ChannelConfig) -> Self {
        let max_frame_size = config.max_frame_size;
        Self {
            transport: RefCell::new(transport),
            decoder: RefCell::new(FrameDecoder::new(max_frame_size)),
            max_frame_size,
            max_value_depth: config.max_value_depth,
            listeners: Listeners::default(),
            backlog: RefCell::new(VecDeque::new()),
            started: Cell::new(false),
            closed: Cell::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    /// Read whatever the transport has, decode complete frames and deliver
    /// them. Returns the number of messages handed to listeners.
    ///
    /// Before `start()` decoded values are held back and delivered by the
    /// first pump after it.
    pub fn pump(&self) -> usize {
        if self.closed.get() {
            return 0;
        }

        let mut read_buf = [0u8; READ_BUF_SIZE];
        loop {
            let n = {
                let mut transport = self.transport.borrow_mut();
                if !transport.available() {
                    break;
                }
                match transport.read(&mut read_buf) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) => {
                        warn!("PORT[framed]: read failed: {e:?}");
                        break;
                    }
                }
            };
            let frames = self.decoder.borrow_mut().feed(&read_buf[..n]);
            for frame in frames {
                match decode_value(&frame, self.max_value_depth) {
                    Ok(value) => self.backlog.borrow_mut().push_back(value),
                    Err(e) => warn!("PORT[framed]: dropping frame: {e}"),
                }
            }
        }

        if !self.started.get() {
            return 0;
        }

        let mut delivered = 0;
        // A listener may close the port mid-batch.
        while !self.closed.get() {
            let Some(data) = self.backlog.borrow_mut().pop_front() else {
                break;
            };
            self.listeners.dispatch(&MessageEvent {
                data,
                ports: Vec::new(),
            });
            delivered += 1;
        }
        delivered
    }

    fn write_all(&self, frame: &[u8]) {
        let mut transport = self.transport.borrow_mut();
        let mut written = 0;
        while written < frame.len() {
            match transport.write(&frame[written..]) {
                Ok(0) => {
                    warn!("PORT[framed]: transport accepted no bytes, frame lost");
                    return;
                }
                Ok(n) => written += n,
                Err(e) => {
                    warn!("PORT[framed]: write failed: {e:?}");
                    return;
                }
            }
        }
        if let Err(e) = transport.flush() {
            warn!("PORT[framed]: flush failed: {e:?}");
        }
    }
}

impl<T: Transport> Port for FramedPort<T> {
    fn post_message(&self, data: Value, transfer: Vec<Transferable>) -> Result<(), CloneError> {
        if self.closed.get() {
            return Ok(());
        }
        if transfer.iter().any(|t| matches!(t, Transferable::Port(_))) {
            return Err(CloneError::Unrepresentable("port"));
        }
        let frame = encode_value(&data, self.max_frame_size)?;
        self.write_all(&frame);
        Ok(())
    }

    fn subscribe(&self, listener: Listener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.listeners.remove(id);
    }

    fn start(&self) {
        self.started.set(true);
    }

    fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        self.listeners.clear();
        self.backlog.borrow_mut().clear();
        self.decoder.borrow_mut().reset();
        debug!("PORT[framed]: closed");
    }
}

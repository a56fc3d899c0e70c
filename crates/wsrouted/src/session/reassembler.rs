//! Accumulates transport fragments into complete, size-bounded messages.

use crate::transport::{CloseStatus, MessageKind, Received, Transport, TransportError};

/// Result of reading one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reassembled {
    /// A complete message is available from [`MessageReassembler::payload`].
    Message {
        kind: MessageKind,
        end_of_message: bool,
    },
    /// The message exceeded the limit and was read to its end and discarded.
    Oversized { size: usize },
    /// The transport stopped delivering messages.
    Closed {
        status: Option<CloseStatus>,
        description: Option<String>,
    },
}

/// Reassembly buffer owned by a single session.
///
/// The buffer is cleared before every message, so bytes from one message can
/// never surface in the next.
#[derive(Debug)]
pub struct MessageReassembler {
    buffer: Vec<u8>,
    chunk: Vec<u8>,
    max_bytes: usize,
    retained_bytes: usize,
}

impl MessageReassembler {
    /// Reads in `receive_bytes` sized chunks and caps messages at `max_bytes`.
    #[must_use]
    pub fn new(receive_bytes: usize, max_bytes: usize) -> Self {
        let receive_bytes = receive_bytes.max(1);
        Self {
            buffer: Vec::with_capacity(receive_bytes),
            chunk: vec![0; receive_bytes],
            max_bytes,
            retained_bytes: receive_bytes.saturating_mul(4),
        }
    }

    /// Bytes of the most recent complete message.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.buffer
    }

    /// Reads fragments until a message completes or the transport stops.
    ///
    /// # Errors
    ///
    /// Propagates [`TransportError`] from the underlying reads.
    pub fn next_message(
        &mut self,
        transport: &mut dyn Transport,
    ) -> Result<Reassembled, TransportError> {
        self.reset();
        let mut discarded: Option<usize> = None;
        loop {
            if !transport.state().is_receivable() {
                self.reset();
                return Ok(Reassembled::Closed {
                    status: transport.close_status(),
                    description: transport.close_description().map(str::to_owned),
                });
            }
            match transport.receive(&mut self.chunk)? {
                Received::Close {
                    status,
                    description,
                } => {
                    self.reset();
                    return Ok(Reassembled::Closed {
                        status,
                        description: Some(description),
                    });
                }
                Received::Oversized { size } => {
                    self.reset();
                    return Ok(Reassembled::Oversized { size });
                }
                Received::Data {
                    kind,
                    count,
                    end_of_message,
                } => {
                    let fragment = self.chunk.get(..count).unwrap_or(&self.chunk);
                    match discarded.as_mut() {
                        Some(total) => *total = total.saturating_add(fragment.len()),
                        None => {
                            self.buffer.extend_from_slice(fragment);
                            if self.buffer.len() > self.max_bytes {
                                discarded = Some(self.buffer.len());
                                self.reset();
                            }
                        }
                    }
                    if end_of_message {
                        return Ok(match discarded {
                            Some(size) => Reassembled::Oversized { size },
                            None => Reassembled::Message {
                                kind,
                                end_of_message,
                            },
                        });
                    }
                }
            }
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        if self.buffer.capacity() > self.retained_bytes {
            self.buffer.shrink_to(self.retained_bytes);
        }
    }
}

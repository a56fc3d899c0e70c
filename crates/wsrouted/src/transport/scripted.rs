//! In-memory transport that replays a prepared script.
//!
//! Used to drive sessions deterministically: inbound fragments, close frames
//! and failures are queued up front, and everything the session writes is
//! captured in a shared [`TransportLog`].

use std::cell::Cell;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::session::ConnectionContext;

use super::{
    Acceptor, CloseStatus, MessageKind, Received, Transport, TransportError, TransportState,
};

#[derive(Debug)]
enum Step {
    Fragment {
        kind: MessageKind,
        bytes: Vec<u8>,
        end_of_message: bool,
    },
    Close {
        status: Option<CloseStatus>,
        description: String,
    },
    Oversized(usize),
    Fail(io::ErrorKind),
}

/// A message written by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub kind: MessageKind,
    pub payload: Vec<u8>,
    pub end_of_message: bool,
}

#[derive(Debug, Default)]
struct LogInner {
    sent: Vec<SentMessage>,
    closed_with: Option<(CloseStatus, String)>,
}

/// Shared record of what a [`ScriptedTransport`] was asked to send.
#[derive(Debug, Clone, Default)]
pub struct TransportLog {
    inner: Arc<Mutex<LogInner>>,
}

impl TransportLog {
    fn lock(&self) -> MutexGuard<'_, LogInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every message sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<SentMessage> {
        self.lock().sent.clone()
    }

    /// Sent payloads parsed as JSON; unparsable payloads become `null`.
    #[must_use]
    pub fn sent_json(&self) -> Vec<Value> {
        self.lock()
            .sent
            .iter()
            .map(|message| serde_json::from_slice(&message.payload).unwrap_or(Value::Null))
            .collect()
    }

    /// Status and description of the close the session issued, if any.
    #[must_use]
    pub fn closed_with(&self) -> Option<(CloseStatus, String)> {
        self.lock().closed_with.clone()
    }
}

/// Transport whose inbound traffic is fixed in advance.
///
/// Once the script runs out the transport reports [`TransportState::Closed`].
#[derive(Debug)]
pub struct ScriptedTransport {
    steps: VecDeque<Step>,
    state: TransportState,
    connecting_polls: Cell<usize>,
    close_status: Option<CloseStatus>,
    close_description: Option<String>,
    log: TransportLog,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            steps: VecDeque::new(),
            state: TransportState::Open,
            connecting_polls: Cell::new(0),
            close_status: None,
            close_description: None,
            log: TransportLog::default(),
        }
    }

    /// Queues a complete text message.
    #[must_use]
    pub fn text(self, payload: impl Into<String>) -> Self {
        self.fragment(MessageKind::Text, payload.into().into_bytes(), true)
    }

    /// Queues a complete binary message.
    #[must_use]
    pub fn binary(self, payload: impl Into<Vec<u8>>) -> Self {
        self.fragment(MessageKind::Binary, payload.into(), true)
    }

    /// Queues a single fragment.
    #[must_use]
    pub fn fragment(mut self, kind: MessageKind, bytes: Vec<u8>, end_of_message: bool) -> Self {
        self.steps.push_back(Step::Fragment {
            kind,
            bytes,
            end_of_message,
        });
        self
    }

    /// Queues a message of `size` bytes that the transport itself rejected.
    #[must_use]
    pub fn oversized(mut self, size: usize) -> Self {
        self.steps.push_back(Step::Oversized(size));
        self
    }

    /// Queues a close frame from the peer.
    #[must_use]
    pub fn peer_close(mut self, status: CloseStatus, description: impl Into<String>) -> Self {
        self.steps.push_back(Step::Close {
            status: Some(status),
            description: description.into(),
        });
        self
    }

    /// Queues an I/O failure; the transport aborts when it is reached.
    #[must_use]
    pub fn failure(mut self, kind: io::ErrorKind) -> Self {
        self.steps.push_back(Step::Fail(kind));
        self
    }

    /// Reports [`TransportState::Connecting`] for the first `polls` state queries.
    #[must_use]
    pub fn connecting_for(self, polls: usize) -> Self {
        self.connecting_polls.set(polls);
        self
    }

    /// Handle on the record of sent messages.
    #[must_use]
    pub fn log(&self) -> TransportLog {
        self.log.clone()
    }
}

impl Transport for ScriptedTransport {
    fn state(&self) -> TransportState {
        let polls = self.connecting_polls.get();
        if polls > 0 {
            self.connecting_polls.set(polls - 1);
            return TransportState::Connecting;
        }
        self.state
    }

    fn receive(&mut self, buffer: &mut [u8]) -> Result<Received, TransportError> {
        if self.state.is_terminal() {
            return Err(TransportError::Closed);
        }
        match self.steps.pop_front() {
            Some(Step::Fragment {
                kind,
                mut bytes,
                end_of_message,
            }) => {
                let count = bytes.len().min(buffer.len());
                let remainder = bytes.split_off(count);
                if let Some(target) = buffer.get_mut(..count) {
                    target.copy_from_slice(&bytes);
                }
                let drained = remainder.is_empty();
                if !drained {
                    self.steps.push_front(Step::Fragment {
                        kind,
                        bytes: remainder,
                        end_of_message,
                    });
                }
                Ok(Received::Data {
                    kind,
                    count,
                    end_of_message: end_of_message && drained,
                })
            }
            Some(Step::Close {
                status,
                description,
            }) => {
                self.state = TransportState::CloseReceived;
                self.close_status = status;
                self.close_description = Some(description.clone());
                Ok(Received::Close {
                    status,
                    description,
                })
            }
            Some(Step::Oversized(size)) => Ok(Received::Oversized { size }),
            Some(Step::Fail(kind)) => {
                self.state = TransportState::Aborted;
                Err(TransportError::Io(io::Error::new(kind, "scripted failure")))
            }
            None => {
                self.state = TransportState::Closed;
                Err(TransportError::Closed)
            }
        }
    }

    fn send(
        &mut self,
        kind: MessageKind,
        payload: &[u8],
        end_of_message: bool,
    ) -> Result<(), TransportError> {
        if self.state.is_terminal() {
            return Err(TransportError::Closed);
        }
        self.log.lock().sent.push(SentMessage {
            kind,
            payload: payload.to_vec(),
            end_of_message,
        });
        Ok(())
    }

    fn close(&mut self, status: CloseStatus, description: &str) -> Result<(), TransportError> {
        self.log.lock().closed_with = Some((status, description.to_owned()));
        self.state = TransportState::Closed;
        Ok(())
    }

    fn close_status(&self) -> Option<CloseStatus> {
        self.close_status
    }

    fn close_description(&self) -> Option<&str> {
        self.close_description.as_deref()
    }
}

/// Acceptor that hands out a prepared [`ScriptedTransport`].
#[derive(Debug)]
pub struct ScriptedAcceptor {
    transport: ScriptedTransport,
    path: String,
    fail_handshake: bool,
}

impl ScriptedAcceptor {
    /// Accepts at `path` and yields `transport` once admitted.
    #[must_use]
    pub fn new(transport: ScriptedTransport, path: impl Into<String>) -> Self {
        Self {
            transport,
            path: path.into(),
            fail_handshake: false,
        }
    }

    /// Makes the handshake fail before the gate runs.
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail_handshake = true;
        self
    }
}

impl Acceptor for ScriptedAcceptor {
    type Transport = ScriptedTransport;

    fn accept(
        self,
        context: &mut ConnectionContext,
        admit: &mut dyn FnMut(&ConnectionContext) -> bool,
    ) -> Result<Option<Self::Transport>, TransportError> {
        if self.fail_handshake {
            return Err(TransportError::handshake("scripted handshake failure"));
        }
        context.set_path(&self.path);
        Ok(admit(context).then_some(self.transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_fragments_larger_than_the_buffer() {
        let mut transport = ScriptedTransport::new().text("hello");
        let mut buffer = [0_u8; 3];
        let first = transport.receive(&mut buffer).expect("first read");
        assert_eq!(
            first,
            Received::Data {
                kind: MessageKind::Text,
                count: 3,
                end_of_message: false,
            }
        );
        assert_eq!(&buffer, b"hel");
        let second = transport.receive(&mut buffer).expect("second read");
        assert_eq!(
            second,
            Received::Data {
                kind: MessageKind::Text,
                count: 2,
                end_of_message: true,
            }
        );
    }

    #[test]
    fn exhausted_script_closes_the_transport() {
        let mut transport = ScriptedTransport::new();
        let mut buffer = [0_u8; 8];
        assert!(matches!(
            transport.receive(&mut buffer),
            Err(TransportError::Closed)
        ));
        assert_eq!(transport.state(), TransportState::Closed);
    }
}

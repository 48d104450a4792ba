//! Request body assembly from inbound body events.
//!
//! # Responsibilities
//! - Read `content-length` and `transfer-encoding` once, up front
//! - Yield body chunks lazily, exactly once
//! - Enforce the declared length (unless chunked) and the size cap
//! - Cache the complete body so it can be read again
//!
//! # Design Decisions
//! - The chunk sequence is one-shot: a second pass after partial
//!   consumption fails with [`BodyError::AlreadyConsumed`]
//! - Non-body events are skipped without being counted
//! - A disconnect before the final chunk is [`BodyError::Truncated`]

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use thiserror::Error;

use crate::net::{ConnectionScope, Inbound, InboundStream};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BodyError {
    #[error("request body has already been consumed")]
    AlreadyConsumed,

    #[error("request body exceeds its declared content-length of {declared} bytes")]
    LengthExceeded { declared: u64 },

    #[error("request body exceeds the limit of {limit} bytes")]
    TooLarge { limit: usize },

    #[error("request body ended after {received} bytes, before it was complete")]
    Truncated { received: u64 },
}

impl BodyError {
    /// Whether the body was refused for its size rather than its shape.
    pub fn is_oversized(&self) -> bool {
        matches!(self, BodyError::LengthExceeded { .. } | BodyError::TooLarge { .. })
    }
}

#[derive(Debug)]
enum BodyState {
    Fresh,
    Streaming,
    Complete(Bytes),
    Failed,
}

/// Assembles the request body of one HTTP exchange.
#[derive(Debug)]
pub struct BodyAssembler {
    declared_length: Option<u64>,
    chunked: bool,
    max_bytes: usize,
    received: u64,
    buffer: BytesMut,
    state: BodyState,
}

impl BodyAssembler {
    pub fn new(declared_length: Option<u64>, chunked: bool, max_bytes: usize) -> Self {
        Self {
            declared_length,
            chunked,
            max_bytes,
            received: 0,
            buffer: BytesMut::new(),
            state: BodyState::Fresh,
        }
    }

    /// Read the framing headers of `scope`.
    pub fn from_scope(scope: &ConnectionScope, max_bytes: usize) -> Self {
        let declared_length = scope
            .header("content-length")
            .and_then(|v| v.trim().parse::<u64>().ok());
        let chunked = scope
            .header("transfer-encoding")
            .map(|v| v.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false);
        Self::new(declared_length, chunked, max_bytes)
    }

    pub fn declared_length(&self) -> Option<u64> {
        self.declared_length
    }

    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    /// The whole body, once it has been read to the end.
    pub fn body(&self) -> Option<&Bytes> {
        match &self.state {
            BodyState::Complete(body) => Some(body),
            _ => None,
        }
    }

    /// Start iterating over the body chunks.
    ///
    /// The first call reads live from `inbound`. Once the body is complete
    /// further calls replay the cached body as a single chunk; any call in
    /// between fails.
    pub fn chunks<'a>(
        &'a mut self,
        inbound: &'a mut InboundStream,
    ) -> Result<BodyChunks<'a>, BodyError> {
        let replay = match &self.state {
            BodyState::Fresh => {
                self.state = BodyState::Streaming;
                None
            }
            BodyState::Complete(body) => Some(body.clone()),
            BodyState::Streaming | BodyState::Failed => return Err(BodyError::AlreadyConsumed),
        };
        Ok(BodyChunks {
            assembler: self,
            inbound,
            replay,
        })
    }

    /// Read every remaining chunk and return the whole body.
    pub async fn read_to_end(&mut self, inbound: &mut InboundStream) -> Result<Bytes, BodyError> {
        if let Some(body) = self.body() {
            return Ok(body.clone());
        }
        let mut chunks = self.chunks(inbound)?;
        while let Some(chunk) = chunks.next().await {
            chunk?;
        }
        self.body().cloned().ok_or(BodyError::AlreadyConsumed)
    }

    async fn pull(&mut self, inbound: &mut InboundStream) -> Option<Result<Bytes, BodyError>> {
        if !matches!(self.state, BodyState::Streaming) {
            return None;
        }

        loop {
            let (chunk, more_body) = match inbound.next().await {
                Some(Inbound::HttpRequest { body, more_body }) => (body, more_body),
                Some(event) if event.is_disconnect() => return Some(Err(self.fail_truncated())),
                None => return Some(Err(self.fail_truncated())),
                Some(event) => {
                    tracing::trace!(?event, "Skipping non-body event");
                    continue;
                }
            };

            if let Err(err) = self.accept(&chunk) {
                self.state = BodyState::Failed;
                return Some(Err(err));
            }

            if !more_body {
                if let Some(declared) = self.declared_length.filter(|_| !self.chunked) {
                    if self.received < declared {
                        return Some(Err(self.fail_truncated()));
                    }
                }
                let body = std::mem::take(&mut self.buffer).freeze();
                self.state = BodyState::Complete(body);
                return Some(Ok(chunk));
            }

            if !chunk.is_empty() {
                return Some(Ok(chunk));
            }
        }
    }

    fn accept(&mut self, chunk: &[u8]) -> Result<(), BodyError> {
        let received = self.received + chunk.len() as u64;

        if !self.chunked {
            if let Some(declared) = self.declared_length {
                if received > declared {
                    return Err(BodyError::LengthExceeded { declared });
                }
            }
        }
        if received > self.max_bytes as u64 {
            return Err(BodyError::TooLarge {
                limit: self.max_bytes,
            });
        }

        self.received = received;
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    fn fail_truncated(&mut self) -> BodyError {
        self.state = BodyState::Failed;
        BodyError::Truncated {
            received: self.received,
        }
    }
}

/// One pass over the body chunks. See [`BodyAssembler::chunks`].
pub struct BodyChunks<'a> {
    assembler: &'a mut BodyAssembler,
    inbound: &'a mut InboundStream,
    replay: Option<Bytes>,
}

impl BodyChunks<'_> {
    /// Next chunk, `None` after the last one or after an error.
    pub async fn next(&mut self) -> Option<Result<Bytes, BodyError>> {
        if let BodyState::Complete(_) = self.assembler.state {
            return self.replay.take().map(Ok);
        }
        self.assembler.pull(self.inbound).await
    }
}

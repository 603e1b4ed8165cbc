//! Turns a byte stream into SIP messages.
//!
//! [`SipStreamCodec`] is a [`Decoder`]: it collects a header block up to the
//! first blank line, parses it with the [`MessageAssembler`], then waits for
//! exactly Content-Length body bytes. One [`StreamFramer`] drives the codec
//! over one connection's read half with a [`FramedRead`].
//!
//! * Blank lines between messages (CRLF keep-alives) are discarded.
//! * A header block that does not parse is dropped along with its body
//!   and framing resumes with the next message.
//! * Exceeding the size limit, starving a read, EOF inside a message or a
//!   failing [`MessageSink`] end the connection.

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, FramedRead};
use tracing::{debug, trace, warn};

use sipwire_sip_core::parser::{find_header_end, scan_content_length};
use sipwire_sip_core::{HeaderAccess, Message, MessageAssembler};

use crate::config::StreamConfig;
use crate::error::{Error, Result};

/// Receiver of framed messages. An error from [`MessageSink::deliver`]
/// aborts the connection.
#[async_trait]
pub trait MessageSink: Send {
    async fn deliver(&mut self, message: Message) -> Result<()>;
}

#[async_trait]
impl MessageSink for mpsc::Sender<Message> {
    async fn deliver(&mut self, message: Message) -> Result<()> {
        self.send(message).await.map_err(|_| Error::ListenerClosed)
    }
}

/// A parsed header block still waiting for its body.
struct PendingBody {
    parsed: std::result::Result<Message, String>,
    len: usize,
}

pub struct SipStreamCodec {
    assembler: MessageAssembler,
    max_message_size: Option<usize>,
    pending: Option<PendingBody>,
    /// Bytes taken out of the read buffer so far
    consumed: u64,
}

impl SipStreamCodec {
    pub fn new(max_message_size: Option<usize>) -> Self {
        Self::with_assembler(max_message_size, MessageAssembler::new())
    }

    pub fn with_assembler(max_message_size: Option<usize>, assembler: MessageAssembler) -> Self {
        Self {
            assembler,
            max_message_size,
            pending: None,
            consumed: 0,
        }
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    fn check_size(&self, size: usize) -> Result<()> {
        match self.max_message_size {
            Some(limit) if size > limit => Err(Error::MessageTooLarge { size, limit }),
            _ => Ok(()),
        }
    }

    fn discard_blank_lines(&mut self, src: &mut BytesMut) {
        loop {
            let skip = if src.starts_with(b"\r\n") {
                2
            } else if src.starts_with(b"\n") {
                1
            } else {
                return;
            };
            trace!("discarding keep-alive line");
            src.advance(skip);
            self.consumed += skip as u64;
        }
    }

    /// Split off and parse the next header block, if it is complete.
    fn take_header_block(&mut self, src: &mut BytesMut) -> Result<Option<PendingBody>> {
        self.discard_blank_lines(src);
        let Some((head_len, body_start)) = find_header_end(src) else {
            self.check_size(src.len())?;
            return Ok(None);
        };
        let mut head = src.split_to(body_start);
        self.consumed += body_start as u64;
        head.truncate(head_len);

        let parsed = std::str::from_utf8(&head)
            .map_err(|e| e.to_string())
            .and_then(|text| {
                self.assembler
                    .assemble(text, bytes::Bytes::new())
                    .map_err(|e| e.to_string())
            });
        let len = match &parsed {
            Ok(message) => message.content_length().unwrap_or(0) as usize,
            Err(_) => scan_content_length(&head).unwrap_or(0),
        };
        self.check_size(head.len() + len)?;
        Ok(Some(PendingBody { parsed, len }))
    }
}

impl Decoder for SipStreamCodec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        loop {
            let pending = match self.pending.take() {
                Some(pending) => pending,
                None => match self.take_header_block(src)? {
                    Some(pending) => pending,
                    None => return Ok(None),
                },
            };
            if src.len() < pending.len {
                src.reserve(pending.len - src.len());
                self.pending = Some(pending);
                return Ok(None);
            }

            let body = src.split_to(pending.len).freeze();
            self.consumed += pending.len as u64;
            match pending.parsed {
                Ok(mut message) => {
                    trace!(len = body.len(), "framed message body");
                    match &mut message {
                        Message::Request(req) => req.body = body,
                        Message::Response(resp) => resp.body = body,
                    }
                    debug!(summary = %message.summary(), "framed message");
                    return Ok(Some(message));
                }
                Err(error) => {
                    warn!(%error, skipped = pending.len, "dropping unparsable message");
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }
        if let Some(pending) = &self.pending {
            return Err(Error::Framing(format!(
                "stream closed after {} of {} body bytes",
                src.len(),
                pending.len
            )));
        }
        if src.iter().all(|b| b.is_ascii_whitespace()) {
            src.clear();
            Ok(None)
        } else {
            Err(Error::Framing("stream closed inside a header block".into()))
        }
    }
}

pub struct StreamFramer<R> {
    frames: FramedRead<R, SipStreamCodec>,
    config: StreamConfig,
}

impl<R: AsyncRead + Unpin + Send> StreamFramer<R> {
    pub fn new(reader: R, config: StreamConfig) -> Self {
        Self::with_assembler(reader, config, MessageAssembler::new())
    }

    pub fn with_assembler(reader: R, config: StreamConfig, assembler: MessageAssembler) -> Self {
        let codec = SipStreamCodec::with_assembler(config.max_message_size, assembler);
        Self {
            frames: FramedRead::with_capacity(reader, codec, config.read_chunk),
            config,
        }
    }

    /// Frame messages until the peer closes the stream, handing each one to
    /// `sink`. `Ok(())` means a clean close between messages.
    pub async fn run<S: MessageSink + ?Sized>(mut self, sink: &mut S) -> Result<()> {
        while let Some(message) = self.next_message().await? {
            sink.deliver(message).await?;
        }
        Ok(())
    }

    /// Next complete message, or `None` on a clean end of stream.
    ///
    /// The starvation timer covers one window at a time: a window in which
    /// bytes arrived re-arms it, an empty one ends the connection.
    pub async fn next_message(&mut self) -> Result<Option<Message>> {
        let Some(limit) = self.config.starvation_timeout else {
            return self.frames.next().await.transpose();
        };
        loop {
            let seen = self.received();
            match tokio::time::timeout(limit, self.frames.next()).await {
                Ok(frame) => return frame.transpose(),
                Err(_) if self.received() > seen => trace!("peer still sending, starvation timer re-armed"),
                Err(_) => return Err(Error::Starvation(limit)),
            }
        }
    }

    /// Bytes read from the stream so far.
    fn received(&self) -> u64 {
        self.frames.decoder().consumed() + self.frames.read_buffer().len() as u64
    }
}

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use platchan_frame::{FrameConfig, FrameError, FrameKind, FrameReader, FrameWriter, NO_REPLY};
use platchan_transport::{InboundMessage, InboundSink, ReplyToken, Runtime, TransportError};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::handshake::{handshake_client, handshake_server, HandshakeConfig, HandshakeResult};
use crate::stream::{IpcStream, UnixDomainSocket};

/// Default time an outbound message waits for its reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(30);

type ReplySlot = SyncSender<platchan_transport::Result<Option<Bytes>>>;

#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub reply_timeout: Duration,
    pub handshake: HandshakeConfig,
    /// Frame limits after the handshake. Timeouts here apply to writes only;
    /// the reader thread always blocks.
    pub frame: FrameConfig,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            handshake: HandshakeConfig::default(),
            frame: FrameConfig::default(),
        }
    }
}

impl LinkConfig {
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn with_handshake(mut self, handshake: HandshakeConfig) -> Self {
        self.handshake = handshake;
        self
    }
}

/// A [`Runtime`] on the far side of a framed socket.
///
/// Outbound messages get a fresh nonzero token and block until the reply frame
/// carrying that token arrives. Inbound messages are handed to the
/// [`InboundSink`] given to [`PendingLink::start`].
pub struct RuntimeLink {
    handshake: HandshakeResult,
    writer: Mutex<FrameWriter<IpcStream>>,
    closer: IpcStream,
    pending: Mutex<HashMap<u64, ReplySlot>>,
    next_token: AtomicU64,
    reply_timeout: Duration,
    closed: AtomicBool,
}

impl RuntimeLink {
    pub fn link_id(&self) -> &str {
        &self.handshake.link_id
    }

    pub fn handshake(&self) -> &HandshakeResult {
        &self.handshake
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of outbound messages still waiting for a reply.
    pub fn pending_replies(&self) -> usize {
        self.pending().len()
    }

    /// Close the socket. The reader thread exits and every waiter gets
    /// [`TransportError::Disconnected`]. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(link_id = %self.link_id(), "closing runtime link");
        if let Err(err) = self.closer.shutdown() {
            debug!(link_id = %self.link_id(), error = %err, "socket shutdown failed");
        }
        self.fail_pending("link closed");
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<u64, ReplySlot>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(
        &self,
        channel: &str,
        op: impl FnOnce(&mut FrameWriter<IpcStream>) -> platchan_frame::Result<()>,
    ) -> platchan_transport::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        op(&mut writer).map_err(|err| match err {
            FrameError::Io(err) => TransportError::Io(err),
            FrameError::ConnectionClosed => TransportError::Disconnected(err.to_string()),
            other => TransportError::Rejected {
                channel: channel.to_string(),
                reason: other.to_string(),
            },
        })
    }

    fn next_token(&self) -> u64 {
        loop {
            let token = self.next_token.fetch_add(1, Ordering::Relaxed);
            if token != NO_REPLY {
                return token;
            }
        }
    }

    fn complete(&self, token: u64, payload: Bytes) {
        let Some(slot) = self.pending().remove(&token) else {
            debug!(link_id = %self.link_id(), token, "dropping reply with no waiter");
            return;
        };
        let reply = if payload.is_empty() { None } else { Some(payload) };
        // The waiter may have timed out in between.
        let _ = slot.send(Ok(reply));
    }

    fn fail_pending(&self, reason: &str) {
        let drained: Vec<ReplySlot> = self.pending().drain().map(|(_, slot)| slot).collect();
        if !drained.is_empty() {
            warn!(link_id = %self.link_id(), waiters = drained.len(), reason, "failing pending replies");
        }
        for slot in drained {
            let _ = slot.send(Err(TransportError::Disconnected(reason.to_string())));
        }
    }
}

impl Runtime for RuntimeLink {
    fn send_platform_message(
        &self,
        channel: &str,
        payload: &[u8],
    ) -> platchan_transport::Result<Option<Bytes>> {
        if self.is_closed() {
            return Err(TransportError::Disconnected("link closed".to_string()));
        }

        let token = self.next_token();
        let (tx, rx) = mpsc::sync_channel(1);
        self.pending().insert(token, tx);
        // The reader may have drained the table between the check and the insert.
        if self.is_closed() {
            self.pending().remove(&token);
            return Err(TransportError::Disconnected("link closed".to_string()));
        }

        if let Err(err) = self.write(channel, |writer| writer.write_message(channel, token, payload)) {
            self.pending().remove(&token);
            return Err(err);
        }
        debug!(link_id = %self.link_id(), channel, token, "message sent; awaiting reply");

        match rx.recv_timeout(self.reply_timeout) {
            Ok(reply) => reply,
            Err(RecvTimeoutError::Timeout) => {
                self.pending().remove(&token);
                Err(TransportError::ReplyTimeout {
                    channel: channel.to_string(),
                    timeout: self.reply_timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(TransportError::Disconnected("reply slot dropped".to_string()))
            }
        }
    }

    fn send_platform_message_response(
        &self,
        token: ReplyToken,
        payload: &[u8],
    ) -> platchan_transport::Result<()> {
        if self.is_closed() {
            return Err(TransportError::Disconnected("link closed".to_string()));
        }
        self.write("", |writer| writer.write_reply(token.raw(), payload))
    }
}

impl std::fmt::Debug for RuntimeLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeLink")
            .field("link_id", &self.handshake.link_id)
            .field("codec", &self.handshake.codec)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A handshaken link whose reader thread has not started yet.
///
/// Split in two so the messenger that consumes inbound traffic can be built
/// on top of [`PendingLink::runtime`] before it is handed to
/// [`PendingLink::start`].
pub struct PendingLink {
    link: Arc<RuntimeLink>,
    reader: FrameReader<IpcStream>,
}

impl PendingLink {
    /// Run the server half of the handshake on an accepted stream.
    pub fn server(stream: IpcStream, link_id: &str, config: &LinkConfig) -> Result<Self> {
        Self::establish(stream, config, |reader, writer| {
            handshake_server(reader, writer, link_id, &config.handshake)
        })
    }

    /// Run the client half of the handshake, announcing `codec`.
    pub fn client(stream: IpcStream, codec: &str, config: &LinkConfig) -> Result<Self> {
        Self::establish(stream, config, |reader, writer| {
            handshake_client(reader, writer, codec, &config.handshake)
        })
    }

    fn establish(
        stream: IpcStream,
        config: &LinkConfig,
        handshake: impl FnOnce(
            &mut FrameReader<IpcStream>,
            &mut FrameWriter<IpcStream>,
        ) -> Result<HandshakeResult>,
    ) -> Result<Self> {
        let closer = stream.try_clone()?;
        let reader_stream = stream.try_clone()?;
        stream.set_read_timeout(Some(config.handshake.timeout))?;
        stream.set_write_timeout(Some(config.handshake.timeout))?;

        let handshake_frames = FrameConfig {
            max_payload_size: config.handshake.max_handshake_payload,
            read_timeout: Some(config.handshake.timeout),
            write_timeout: Some(config.handshake.timeout),
        };
        let mut reader = FrameReader::with_config(reader_stream, handshake_frames.clone());
        let mut writer = FrameWriter::with_config(stream, handshake_frames);

        let result = handshake(&mut reader, &mut writer)?;

        // The handshake runs under a tighter payload budget; restore link limits.
        reader.set_max_payload_size(config.frame.max_payload_size);
        writer.set_max_payload_size(config.frame.max_payload_size);
        reader.get_ref().set_read_timeout(None)?;
        writer.get_ref().set_write_timeout(config.frame.write_timeout)?;

        info!(link_id = %result.link_id, codec = %result.codec, "runtime link established");
        let link = RuntimeLink {
            handshake: result,
            writer: Mutex::new(writer),
            closer,
            pending: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
            reply_timeout: config.reply_timeout,
            closed: AtomicBool::new(false),
        };
        Ok(Self {
            link: Arc::new(link),
            reader,
        })
    }

    /// The link as a [`Runtime`]. Usable for sends once started.
    pub fn runtime(&self) -> Arc<RuntimeLink> {
        Arc::clone(&self.link)
    }

    pub fn handshake(&self) -> &HandshakeResult {
        self.link.handshake()
    }

    /// Spawn the reader thread, delivering inbound messages to `sink`.
    pub fn start(self, sink: Arc<dyn InboundSink>) -> Result<LinkHandle> {
        let link = Arc::clone(&self.link);
        let reader = self.reader;
        let thread = std::thread::Builder::new()
            .name(format!("platchan-link-{}", link.link_id()))
            .spawn(move || read_loop(link, reader, sink))?;
        Ok(LinkHandle {
            link: self.link,
            thread: Some(thread),
        })
    }
}

/// Owns a running link's reader thread.
pub struct LinkHandle {
    link: Arc<RuntimeLink>,
    thread: Option<JoinHandle<()>>,
}

impl LinkHandle {
    pub fn runtime(&self) -> Arc<RuntimeLink> {
        Arc::clone(&self.link)
    }

    /// True once the reader thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the remote side to hang up.
    pub fn join(mut self) {
        self.join_reader();
    }

    /// Close the link and wait for the reader thread.
    pub fn shutdown(mut self) {
        self.link.close();
        self.join_reader();
    }

    fn join_reader(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(link_id = %self.link.link_id(), "link reader thread panicked");
            }
        }
    }
}

impl Drop for LinkHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.link.close();
            self.join_reader();
        }
    }
}

fn read_loop(link: Arc<RuntimeLink>, mut reader: FrameReader<IpcStream>, sink: Arc<dyn InboundSink>) {
    debug!(link_id = %link.link_id(), "link reader started");
    let reason = loop {
        let frame = match reader.read_frame() {
            Ok(frame) => frame,
            Err(FrameError::ConnectionClosed) => break "remote closed the link".to_string(),
            Err(err) if link.is_closed() => break format!("link closed ({err})"),
            Err(err) => {
                warn!(link_id = %link.link_id(), error = %err, "link read failed");
                break err.to_string();
            }
        };

        match frame.kind {
            FrameKind::Message => {
                let message = if frame.token == NO_REPLY {
                    InboundMessage::one_way(frame.channel, frame.payload)
                } else {
                    InboundMessage::new(frame.channel, frame.payload, ReplyToken::from_raw(frame.token))
                };
                sink.deliver_inbound(message);
            }
            FrameKind::Reply => link.complete(frame.token, frame.payload),
            FrameKind::Control => {
                debug!(link_id = %link.link_id(), "ignoring control frame after handshake");
            }
        }
    };

    info!(link_id = %link.link_id(), reason = %reason, "link reader stopped");
    link.closed.store(true, Ordering::Release);
    link.fail_pending(&reason);
}

/// Accepts runtime links on a Unix domain socket.
pub struct LinkListener {
    socket: UnixDomainSocket,
    config: LinkConfig,
    next_link_id: AtomicU64,
    /// Handshakes started by [`try_accept`](Self::try_accept) report here.
    handshakes: (Sender<Result<PendingLink>>, Receiver<Result<PendingLink>>),
}

impl LinkListener {
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            socket: UnixDomainSocket::bind(path)?,
            config: LinkConfig::default(),
            next_link_id: AtomicU64::new(1),
            handshakes: crossbeam_channel::unbounded(),
        })
    }

    pub fn with_config(mut self, config: LinkConfig) -> Self {
        self.config = config;
        self
    }

    /// Accept the next connection and assign an auto-generated link id.
    pub fn accept(&self) -> Result<PendingLink> {
        let id = self.next_link_id.fetch_add(1, Ordering::Relaxed);
        self.accept_with_id(&format!("link-{id}"))
    }

    pub fn accept_with_id(&self, link_id: &str) -> Result<PendingLink> {
        let stream = self.socket.accept()?;
        PendingLink::server(stream, link_id, &self.config)
    }

    /// Poll for a link without blocking.
    ///
    /// Every waiting connection is accepted and handshaken on its own
    /// thread, so a client that connects and then stays silent only holds up
    /// itself. Returns the next finished handshake (a failed one as `Err`),
    /// or `Ok(None)` when none has finished yet.
    pub fn try_accept(&self) -> Result<Option<PendingLink>> {
        self.socket.set_nonblocking(true)?;
        let accepted = self.start_waiting_handshakes();
        self.socket.set_nonblocking(false)?;
        accepted?;

        match self.handshakes.1.try_recv() {
            Ok(finished) => finished.map(Some),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => Ok(None),
        }
    }

    fn start_waiting_handshakes(&self) -> Result<()> {
        loop {
            let stream = match self.socket.accept() {
                Ok(stream) => stream,
                Err(crate::LinkError::Accept(err)) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    return Ok(());
                }
                Err(err) => return Err(err),
            };
            stream.set_nonblocking(false)?;
            let link_id = format!("link-{}", self.next_link_id.fetch_add(1, Ordering::Relaxed));
            let config = self.config.clone();
            let done = self.handshakes.0.clone();
            debug!(link_id = %link_id, "starting handshake");
            thread::Builder::new()
                .name(format!("platchan-handshake-{link_id}"))
                .spawn(move || {
                    let _ = done.send(PendingLink::server(stream, &link_id, &config));
                })?;
        }
    }

    pub fn path(&self) -> &Path {
        self.socket.path()
    }
}

/// Connect to a listening link as a client with default configuration.
pub fn connect(path: impl AsRef<Path>, codec: &str) -> Result<PendingLink> {
    connect_with_config(path, codec, &LinkConfig::default())
}

pub fn connect_with_config(
    path: impl AsRef<Path>,
    codec: &str,
    config: &LinkConfig,
) -> Result<PendingLink> {
    let stream = UnixDomainSocket::connect(path)?;
    PendingLink::client(stream, codec, config)
}

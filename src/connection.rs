use crate::classifier;
use crate::config::EngineConfig;
use crate::error::{LwcpError, Result};
use crate::framer::Framer;
use crate::message::{MessageType, ParsedMessage};
use crate::protocol::login_line;
use crate::subscription::{Limit, MessageReceiver, SubscriptionId, SubscriptionRegistry};
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// How long `stop` waits for the I/O task to finish closing the socket
const STOP_GRACE: Duration = Duration::from_millis(500);

/// Lifecycle of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Low-level LWCP connection handler
///
/// One background task owns the socket: it reads and frames inbound data,
/// dispatches parsed batches through the subscription registry, and drains the
/// outbound queue. Callers only touch the queue, the registry and the state.
pub struct Connection {
    host: String,
    port: u16,
    /// Outbound queue; each entry is one newline-terminated command
    outbound_tx: mpsc::UnboundedSender<String>,
    registry: Arc<SubscriptionRegistry>,
    state_rx: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    span: tracing::Span,
}

impl Connection {
    /// Connect to a device at `host:port`
    ///
    /// Failure is final: there is no retry.
    pub async fn connect(host: impl Into<String>, port: u16, config: &EngineConfig) -> Result<Self> {
        let host = host.into();
        let span = tracing::info_span!("lwcp", host = %host, port);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        let stream = open_socket(&host, port, config.connect_timeout())
            .instrument(span.clone())
            .await?;

        Ok(Self::start(stream, host, port, config, span, state_tx, state_rx))
    }

    /// Run the engine over an already established stream
    pub(crate) fn start<S>(
        stream: S,
        host: String,
        port: u16,
        config: &EngineConfig,
        span: tracing::Span,
        state_tx: watch::Sender<ConnectionState>,
        state_rx: watch::Receiver<ConnectionState>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        let registry = Arc::new(SubscriptionRegistry::new());
        let cancel = CancellationToken::new();

        if let Some(password) = &config.password {
            // Receiver is alive, the task has not been spawned yet
            let _ = outbound_tx.send(format!("{}\n", login_line(password)));
        }

        state_tx.send_replace(ConnectionState::Open);
        span.in_scope(|| tracing::debug!("Connection open"));

        let task = tokio::spawn(
            io_loop(
                stream,
                IoContext {
                    outbound_rx,
                    registry: registry.clone(),
                    cancel: cancel.clone(),
                    state_tx,
                    read_chunk_size: config.read_chunk_size.max(1),
                    max_frame_len: config.max_frame_len,
                },
            )
            .instrument(span.clone()),
        );

        Self {
            host,
            port,
            outbound_tx,
            registry,
            state_rx,
            cancel,
            task: Mutex::new(Some(task)),
            span,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Resolves once the connection has reached `Closed`
    pub async fn closed(&self) {
        let mut state_rx = self.state_rx.clone();
        let _ = state_rx.wait_for(|s| *s == ConnectionState::Closed).await;
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Queue a command for sending (fire and forget)
    pub fn send_command(&self, command: impl Into<String>) -> Result<()> {
        let mut line = command.into();
        self.span
            .in_scope(|| tracing::debug!(command = %line, "Queueing command"));
        line.push('\n');

        self.outbound_tx
            .send(line)
            .map_err(|_| LwcpError::ConnectionClosed)
    }

    /// Register a callback for batches of `match_type`
    pub fn add_subscription<F>(&self, match_type: MessageType, callback: F, limit: Limit) -> SubscriptionId
    where
        F: Fn(&[ParsedMessage]) + Send + Sync + 'static,
    {
        self.registry.add(match_type, callback, limit)
    }

    /// Remove a subscription before it expires
    pub fn remove_subscription(&self, id: SubscriptionId) -> bool {
        self.registry.remove(id)
    }

    /// Receive batches of `match_type` through a channel
    pub fn subscribe(&self, match_type: MessageType) -> MessageReceiver {
        MessageReceiver::new(&self.registry, match_type)
    }

    /// Send a command and wait for the next batch of `response_type`
    ///
    /// Any message of that type answers the call. Use [`Connection::call_matching`]
    /// when several calls for the same type may be in flight.
    pub async fn call(
        &self,
        command: impl Into<String>,
        response_type: MessageType,
        wait: Duration,
    ) -> Result<Option<Vec<ParsedMessage>>> {
        self.call_matching(command, response_type, wait, |_| true)
            .await
    }

    /// Send a command and wait for messages of `response_type` that `accept` admits
    ///
    /// A batch with no admitted message leaves the call waiting; the reply holds only
    /// the admitted messages. The subscription is installed before the command is
    /// queued and removed when the call returns, so a late reply cannot be mistaken
    /// for a later call's answer. Returns `Ok(None)` if nothing admitted arrives
    /// within `wait`.
    pub async fn call_matching<F>(
        &self,
        command: impl Into<String>,
        response_type: MessageType,
        wait: Duration,
        accept: F,
    ) -> Result<Option<Vec<ParsedMessage>>>
    where
        F: Fn(&ParsedMessage) -> bool + Send + Sync + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        let id = self.registry.add(
            response_type,
            move |messages| {
                let accepted: Vec<ParsedMessage> =
                    messages.iter().filter(|m| accept(*m)).cloned().collect();
                if accepted.is_empty() {
                    return;
                }
                if let Some(tx) = slot.lock().unwrap_or_else(PoisonError::into_inner).take() {
                    let _ = tx.send(accepted);
                }
            },
            Limit::Unlimited,
        );

        if let Err(e) = self.send_command(command) {
            self.registry.remove(id);
            return Err(e);
        }

        let outcome = timeout(wait, rx).await;
        self.registry.remove(id);

        match outcome {
            Ok(Ok(messages)) => Ok(Some(messages)),
            Ok(Err(_)) => Err(LwcpError::ConnectionClosed),
            Err(_) => {
                self.span.in_scope(|| {
                    tracing::debug!(%response_type, "No reply within {:?}", wait)
                });
                Ok(None)
            }
        }
    }

    /// Ask the I/O task to close the socket and wait for it to finish
    ///
    /// Stopping is cooperative: the task notices at its next loop iteration, then
    /// sends every command queued before the request and closes the socket.
    pub async fn stop(&self) {
        self.cancel.cancel();

        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if timeout(STOP_GRACE, handle).await.is_err() {
                self.span
                    .in_scope(|| tracing::warn!("I/O task still flushing after {:?}", STOP_GRACE));
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn open_socket(host: &str, port: u16, connect_timeout: Duration) -> Result<TcpStream> {
    tracing::info!("Connecting to {}:{}", host, port);

    let connected = match timeout(connect_timeout, TcpStream::connect((host, port))).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")),
    };

    let stream = connected.map_err(|source| {
        tracing::error!("Unable to connect: {}", source);
        LwcpError::Connect {
            host: host.to_string(),
            port,
            source,
        }
    })?;
    stream.set_nodelay(true)?;

    tracing::info!("Connected");
    Ok(stream)
}

/// Everything the I/O task owns besides the stream
struct IoContext {
    outbound_rx: mpsc::UnboundedReceiver<String>,
    registry: Arc<SubscriptionRegistry>,
    cancel: CancellationToken,
    state_tx: watch::Sender<ConnectionState>,
    read_chunk_size: usize,
    max_frame_len: usize,
}

/// The I/O loop. Runs as a spawned task until stopped or the socket fails.
///
/// Each iteration waits for whichever comes first: a stop request, inbound bytes
/// or a queued command. A command is written out completely before the next
/// iteration starts. On a stop request the queue is flushed before the socket is
/// shut down.
async fn io_loop<S>(stream: S, mut ctx: IoContext)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut framer = Framer::new(ctx.max_frame_len);
    let mut buf = vec![0u8; ctx.read_chunk_size];

    let stopped = loop {
        if ctx.cancel.is_cancelled() {
            break true;
        }

        tokio::select! {
            _ = ctx.cancel.cancelled() => break true,

            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    tracing::error!("Connection closed by device");
                    break false;
                }
                Ok(n) => {
                    framer.push(&buf[..n]);
                    let frames = framer.drain_frames();
                    if !frames.is_empty() {
                        dispatch_frames(&ctx.registry, &frames);
                    }
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {}
                Err(e) => {
                    tracing::error!("Socket read failed: {}", e);
                    break false;
                }
            },

            Some(command) = ctx.outbound_rx.recv() => {
                tracing::trace!(command = command.trim_end(), "Sending");
                if let Err(e) = write_command(&mut writer, command.as_bytes()).await {
                    tracing::error!("Failed to send command: {}", e);
                    break false;
                }
            }
        }
    };

    ctx.state_tx.send_replace(ConnectionState::Closing);
    if stopped {
        tracing::debug!("Stop requested");
        flush_queue(&mut writer, &mut ctx.outbound_rx).await;
    }
    if let Err(e) = writer.shutdown().await {
        tracing::debug!("Socket shutdown failed: {}", e);
    }
    drop(reader);

    // Fails any in-flight call and closes every receiver
    ctx.registry.clear();
    ctx.state_tx.send_replace(ConnectionState::Closed);
    tracing::info!("Connection closed");
}

/// Close the queue to new commands and send the ones already in it
async fn flush_queue<W>(
    writer: &mut W,
    outbound_rx: &mut mpsc::UnboundedReceiver<String>,
)
where
    W: AsyncWrite + Unpin,
{
    outbound_rx.close();
    while let Ok(command) = outbound_rx.try_recv() {
        tracing::trace!(command = command.trim_end(), "Sending queued command");
        if let Err(e) = write_command(writer, command.as_bytes()).await {
            tracing::warn!("Dropping queued commands, send failed: {}", e);
            break;
        }
    }
}

fn dispatch_frames(registry: &SubscriptionRegistry, frames: &[String]) {
    let batch = classifier::parse_batch(frames);
    for message_type in batch.types() {
        if let Some(messages) = batch.get(message_type) {
            for message in messages {
                tracing::debug!(%message_type, raw = %message.raw, "Received");
            }
        }
    }

    let fired = registry.dispatch(&batch);
    tracing::trace!(messages = batch.len(), fired, "Batch dispatched");
}

/// Write one command, re-sending the unsent remainder after partial writes
pub(crate) async fn write_command<W>(writer: &mut W, mut bytes: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while !bytes.is_empty() {
        let sent = writer.write(bytes).await?;
        if sent == 0 {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "device stopped accepting data",
            ));
        }
        bytes = &bytes[sent..];
    }
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream};

    /// Writer that accepts at most `limit` bytes per write call
    struct ThrottledWriter {
        limit: usize,
        writes: Vec<Vec<u8>>,
    }

    impl AsyncWrite for ThrottledWriter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let n = buf.len().min(self.limit);
            self.writes.push(buf[..n].to_vec());
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn engine(config: &EngineConfig) -> (Connection, DuplexStream) {
        let (client, device) = tokio::io::duplex(64);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let conn = Connection::start(
            client,
            "test".to_string(),
            0,
            config,
            tracing::Span::none(),
            state_tx,
            state_rx,
        );
        (conn, device)
    }

    #[tokio::test]
    async fn partial_writes_are_completed() {
        let mut writer = ThrottledWriter {
            limit: 7,
            writes: Vec::new(),
        };
        let command = b"SET FaCH#1 Asg_PGM1=ON, Asg_PGM2=OFF\n";
        write_command(&mut writer, command).await.unwrap();

        assert!(writer.writes.len() > 1);
        assert!(writer.writes.iter().all(|w| w.len() <= 7));
        assert_eq!(writer.writes.concat(), command.to_vec());
    }

    #[tokio::test]
    async fn zero_length_write_is_an_error() {
        let mut writer = ThrottledWriter {
            limit: 0,
            writes: Vec::new(),
        };
        let err = write_command(&mut writer, b"GET x\n").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
    }

    #[tokio::test]
    async fn commands_leave_in_queue_order_and_whole() {
        let (conn, device) = engine(&EngineConfig::default());
        let long = format!("SET AppControl ShowProfName={}", "x".repeat(500));
        conn.send_command(long.clone()).unwrap();
        conn.send_command("GET FaCH#1 Fader_Gain").unwrap();

        let mut lines = BufReader::new(device).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), long);
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "GET FaCH#1 Fader_Gain"
        );
        assert_eq!(conn.state(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn login_is_sent_first() {
        let config = EngineConfig::default().with_password("hunter2");
        let (conn, device) = engine(&config);
        conn.send_command("GET AppControl ShowProfID").unwrap();

        let mut lines = BufReader::new(device).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "LOGIN hunter2");
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "GET AppControl ShowProfID"
        );
    }

    #[tokio::test]
    async fn inbound_lines_reach_subscribers() {
        let (conn, mut device) = engine(&EngineConfig::default());
        let mut rx = conn.subscribe(MessageType::FaderState);

        device
            .write_all(b"EVENT FaCH#3 ON_State=ON\r\nEVENT FaCH#4 ON_State=OFF\r\n")
            .await
            .unwrap();

        let mut seen = Vec::new();
        while seen.len() < 2 {
            seen.extend(rx.recv().await.unwrap());
        }
        assert_eq!(seen[0].fader_state().unwrap().channel.fader_number, Some(3));
        assert!(!seen[1].fader_state().unwrap().on);
    }

    #[tokio::test]
    async fn call_returns_matching_reply() {
        let (conn, device) = engine(&EngineConfig::default());
        let (read_half, mut write_half) = tokio::io::split(device);

        let device_task = tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            let request = lines.next_line().await.unwrap().unwrap();
            assert_eq!(request, "GET FaCH#1 Fader_Gain");
            write_half
                .write_all(b"EVENT FaCH#2 ON_State=ON\nINDI FaCH#1 Fader_Gain=-12.5\n")
                .await
                .unwrap();
            lines
        });

        let reply = conn
            .call(
                "GET FaCH#1 Fader_Gain",
                MessageType::FaderGain,
                Duration::from_secs(5),
            )
            .await
            .unwrap()
            .expect("reply");
        assert_eq!(reply.len(), 1);
        assert_eq!(reply[0].fader_gain().unwrap().gain, -12.5);
        assert!(conn.registry().is_empty());
        let _ = device_task.await;
    }

    #[tokio::test]
    async fn call_timeout_returns_none_and_unsubscribes() {
        let (conn, _device) = engine(&EngineConfig::default());
        let reply = conn
            .call("GET FaCH#1 ON_State", MessageType::FaderState, Duration::from_millis(50))
            .await
            .unwrap();
        assert!(reply.is_none());
        assert!(conn.registry().is_empty());
    }

    #[tokio::test]
    async fn stop_closes_and_rejects_further_commands() {
        let (conn, _device) = engine(&EngineConfig::default());
        conn.stop().await;
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(matches!(
            conn.send_command("GET x"),
            Err(LwcpError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn stop_sends_commands_queued_before_it() {
        let (conn, device) = engine(&EngineConfig::default());
        conn.send_command("SET FaCH#1 ON_State=ON").unwrap();
        conn.send_command("SET FaCH#2 ON_State=OFF").unwrap();

        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(device).lines();
            let mut seen = Vec::new();
            while let Some(line) = lines.next_line().await.unwrap() {
                seen.push(line);
            }
            seen
        });

        conn.stop().await;
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(
            reader.await.unwrap(),
            vec!["SET FaCH#1 ON_State=ON", "SET FaCH#2 ON_State=OFF"]
        );
    }

    #[tokio::test]
    async fn overlapping_calls_get_their_own_replies() {
        let (conn, device) = engine(&EngineConfig::default());
        let (read_half, mut write_half) = tokio::io::split(device);

        let device_task = tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            lines.next_line().await.unwrap().unwrap();
            lines.next_line().await.unwrap().unwrap();
            write_half
                .write_all(b"INDI FaCH#1 Fader_Gain=-1\n")
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            write_half
                .write_all(b"INDI FaCH#2 Fader_Gain=-2\n")
                .await
                .unwrap();
            (lines, write_half)
        });

        let fader = |n: u32| {
            move |m: &ParsedMessage| {
                m.fader_gain()
                    .map_or(false, |g| g.channel.fader_number == Some(n))
            }
        };
        let (first, second) = tokio::join!(
            conn.call_matching(
                "GET FaCH#1 Fader_Gain",
                MessageType::FaderGain,
                Duration::from_secs(5),
                fader(1),
            ),
            conn.call_matching(
                "GET FaCH#2 Fader_Gain",
                MessageType::FaderGain,
                Duration::from_secs(5),
                fader(2),
            ),
        );

        let first = first.unwrap().unwrap();
        let second = second.unwrap().unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].fader_gain().unwrap().gain, -1.0);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].fader_gain().unwrap().channel.fader_number, Some(2));
        assert_eq!(second[0].fader_gain().unwrap().gain, -2.0);
        assert!(conn.registry().is_empty());
        let _ = device_task.await;
    }

    #[tokio::test]
    async fn panicking_callback_does_not_kill_the_connection() {
        let (conn, mut device) = engine(&EngineConfig::default());
        conn.add_subscription(MessageType::FaderState, |_| panic!("bad callback"), Limit::ONCE);
        let mut rx = conn.subscribe(MessageType::FaderState);

        device.write_all(b"EVENT FaCH#1 ON_State=ON\n").await.unwrap();
        assert_eq!(rx.recv().await.unwrap().len(), 1);
        device.write_all(b"EVENT FaCH#1 ON_State=OFF\n").await.unwrap();
        assert_eq!(rx.recv().await.unwrap().len(), 1);

        assert_eq!(conn.state(), ConnectionState::Open);
        assert_eq!(conn.registry().len(), 1);
    }

    #[tokio::test]
    async fn device_hangup_fails_pending_call() {
        let (conn, device) = engine(&EngineConfig::default());
        let hangup = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(device);
        });

        let result = conn
            .call("GET FaCH#1 ON_State", MessageType::FaderState, Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(LwcpError::ConnectionClosed)));
        conn.closed().await;
        assert_eq!(conn.state(), ConnectionState::Closed);
        hangup.await.unwrap();
    }
}

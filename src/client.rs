use crate::config::{EngineConfig, DEFAULT_PORT};
use crate::connection::{Connection, ConnectionState};
use crate::console::Console;
use crate::error::Result;
use crate::message::{MessageType, ParsedMessage};
use crate::subscription::{Limit, MessageReceiver, SubscriptionId};
use std::sync::Arc;
use std::time::Duration;

/// Client for an LWCP mixing console
///
/// The `LwcpClient` owns the connection's background I/O task and exposes the
/// protocol engine: fire-and-forget commands, typed subscriptions, and
/// request/reply calls matched by message type.
pub struct LwcpClient {
    connection: Arc<Connection>,
    config: EngineConfig,
}

impl LwcpClient {
    /// Connect to a console at the given host and port with default settings
    ///
    /// # Example
    ///
    /// ```no_run
    /// use lwcp_client::{LwcpClient, MessageType};
    /// use std::time::Duration;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let client = LwcpClient::connect("192.168.2.20", 4010).await?;
    ///     let reply = client
    ///         .call("GET FaCH#1 Fader_Gain", MessageType::FaderGain, Duration::from_secs(1))
    ///         .await?;
    ///     if let Some(messages) = reply {
    ///         println!("{:?}", messages[0].fader_gain());
    ///     }
    ///     client.stop().await;
    ///     Ok(())
    /// }
    /// ```
    pub async fn connect(host: impl Into<String>, port: u16) -> Result<Self> {
        Self::connect_with_config(host, port, EngineConfig::default()).await
    }

    /// Connect to a console on the default LWCP port
    pub async fn connect_default_port(host: impl Into<String>) -> Result<Self> {
        Self::connect(host, DEFAULT_PORT).await
    }

    /// Connect with explicit engine settings
    pub async fn connect_with_config(
        host: impl Into<String>,
        port: u16,
        config: EngineConfig,
    ) -> Result<Self> {
        let connection = Connection::connect(host, port, &config).await?;

        Ok(Self {
            connection: Arc::new(connection),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn host(&self) -> &str {
        self.connection.host()
    }

    pub fn port(&self) -> u16 {
        self.connection.port()
    }

    /// Current lifecycle state of the connection
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Resolves once the connection is closed, by `stop` or by the device
    pub async fn closed(&self) {
        self.connection.closed().await
    }

    /// Queue a raw command such as `SET FaCH#1 ON_State=ON`
    ///
    /// Accepts anything convertible to a string, including [`crate::Command`].
    pub fn send_command(&self, command: impl Into<String>) -> Result<()> {
        self.connection.send_command(command)
    }

    /// Invoke `callback` with each batch of `match_type` messages until `limit`
    /// firings have happened
    pub fn add_subscription<F>(&self, match_type: MessageType, callback: F, limit: Limit) -> SubscriptionId
    where
        F: Fn(&[ParsedMessage]) + Send + Sync + 'static,
    {
        self.connection.add_subscription(match_type, callback, limit)
    }

    /// Remove a subscription before it expires
    pub fn remove_subscription(&self, id: SubscriptionId) -> bool {
        self.connection.remove_subscription(id)
    }

    /// Receive batches of `match_type` through a channel
    ///
    /// Multiple receivers can be active simultaneously; each gets every batch.
    pub fn subscribe(&self, match_type: MessageType) -> MessageReceiver {
        self.connection.subscribe(match_type)
    }

    /// Send `command` and wait up to `wait` for the next batch of `response_type`
    ///
    /// Returns `Ok(None)` on timeout. Any message of that type answers the call, so
    /// overlapping calls that wait for the same type should use
    /// [`LwcpClient::call_matching`] instead.
    pub async fn call(
        &self,
        command: impl Into<String>,
        response_type: MessageType,
        wait: Duration,
    ) -> Result<Option<Vec<ParsedMessage>>> {
        self.connection.call(command, response_type, wait).await
    }

    /// Send `command` and wait up to `wait` for messages of `response_type` that
    /// `accept` admits
    ///
    /// Batches with nothing admitted leave the call waiting.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use lwcp_client::{Channel, LwcpClient, MessageType};
    /// # use std::time::Duration;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// # let client = LwcpClient::connect("192.168.2.20", 4010).await?;
    /// let reply = client
    ///     .call_matching(
    ///         "GET FaCH#2 ON_State",
    ///         MessageType::FaderState,
    ///         Duration::from_secs(1),
    ///         |m| m.fader_state().is_some_and(|s| s.channel.matches(Channel::fader(2))),
    ///     )
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
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
        self.connection
            .call_matching(command, response_type, wait, accept)
            .await
    }

    /// High-level console controls
    pub fn console(&self) -> Console {
        Console::new(self.connection.clone(), self.config.call_timeout())
    }

    /// Close the connection
    pub async fn stop(&self) {
        self.connection.stop().await
    }
}

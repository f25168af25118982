use crate::connection::Connection;
use crate::error::{LwcpError, Result};
use crate::message::{MessageType, ParsedMessage};
use crate::protocol::{on_off, Command, APP_CONTROL};
use crate::subscription::{Limit, SubscriptionId};
use crate::types::{
    BusAssignment, Channel, ChannelBus, FaderGain, FaderState, GainValue, ShowProfile,
    ShowProfileList, SourceProfile, SourceProfiles, VMixAddress, VMixState,
};
use std::sync::Arc;
use std::time::Duration;

/// Interface for controlling a console
///
/// A `Console` provides the everyday show-profile, source-profile, fader, bus and
/// virtual-mixer controls. Each method only formats a command; queries wait for
/// a reply of the matching type about the queried channel or mixer input, for at
/// most the configured call timeout, and return `Ok(None)` if none arrives.
/// Clones share the connection and may query concurrently.
#[derive(Clone)]
pub struct Console {
    connection: Arc<Connection>,
    call_timeout: Duration,
}

impl Console {
    pub(crate) fn new(connection: Arc<Connection>, call_timeout: Duration) -> Self {
        Self {
            connection,
            call_timeout,
        }
    }

    /// Use a different timeout for this handle's queries
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Call and pick the first record `pick` accepts
    ///
    /// Only messages `pick` accepts answer the call, so a reply for another channel
    /// does not complete it.
    async fn query_first<T, F>(
        &self,
        command: Command,
        response_type: MessageType,
        pick: F,
    ) -> Result<Option<T>>
    where
        F: Fn(&ParsedMessage) -> Option<T> + Clone + Send + Sync + 'static,
    {
        let accept = pick.clone();
        let reply = self
            .connection
            .call_matching(command, response_type, self.call_timeout, move |m| {
                accept(m).is_some()
            })
            .await?;
        Ok(reply.and_then(|messages| messages.iter().find_map(&pick)))
    }

    // ========== Errors ==========

    /// Call `callback` with every error line the console reports
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use lwcp_client::LwcpClient;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// # let client = LwcpClient::connect("192.168.2.20", 4010).await?;
    /// client.console().on_error(|messages| {
    ///     for m in messages {
    ///         eprintln!("console error: {}", m.error_message().unwrap_or_default());
    ///     }
    /// });
    /// # Ok(())
    /// # }
    /// ```
    pub fn on_error<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&[ParsedMessage]) + Send + Sync + 'static,
    {
        self.connection
            .add_subscription(MessageType::Error, callback, Limit::Unlimited)
    }

    // ========== Show Profiles ==========

    /// Get the list of show profiles stored on the console
    pub async fn show_profiles(&self) -> Result<Option<ShowProfileList>> {
        let command = Command::get(APP_CONTROL).with_key("ShowProfList");
        self.query_first(command, MessageType::ShowProfileList, |m| {
            m.show_profile_list().cloned()
        })
        .await
    }

    /// Get the active show profile
    pub async fn show_profile(&self) -> Result<Option<ShowProfile>> {
        let command = Command::get(APP_CONTROL)
            .with_key("ShowProfID")
            .with_key("ShowProfName")
            .with_key("ShowProfStat");
        self.query_first(command, MessageType::ShowProfile, |m| m.show_profile().cloned())
            .await
    }

    /// Activate a show profile
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use lwcp_client::LwcpClient;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// # let client = LwcpClient::connect("192.168.2.20", 4010).await?;
    /// client.console().set_show_profile(3)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn set_show_profile(&self, profile_id: u32) -> Result<()> {
        self.connection
            .send_command(Command::set(APP_CONTROL).with_value("ShowProfID", profile_id))
    }

    // ========== Source Profiles ==========

    /// Get the source profiles available on a channel
    pub async fn source_profiles(&self, channel: Channel) -> Result<Option<SourceProfiles>> {
        let command = Command::get(channel.to_string()).with_key("src_list");
        self.query_first(command, MessageType::SourceProfiles, move |m| {
            m.source_profiles()
                .filter(|p| p.channel.matches(channel))
                .cloned()
        })
        .await
    }

    /// Get the source profile loaded on a channel
    pub async fn source_profile(&self, channel: Channel) -> Result<Option<SourceProfile>> {
        let command = Command::get(channel.to_string())
            .with_key("src_id")
            .with_key("src_name")
            .with_key("src_lwch")
            .with_key("src_stat");
        self.query_first(command, MessageType::SourceProfile, move |m| {
            m.source_profile()
                .filter(|p| p.channel.matches(channel))
                .cloned()
        })
        .await
    }

    /// Load a different source profile on a channel
    pub fn set_source_profile(&self, channel: Channel, source_id: u32) -> Result<()> {
        self.connection
            .send_command(Command::set(channel.to_string()).with_value("src_id", source_id))
    }

    // ========== Channel On/Off ==========

    /// Get the on/off state of a channel
    pub async fn channel_state(&self, channel: Channel) -> Result<Option<FaderState>> {
        let command = Command::get(channel.to_string()).with_key("ON_State");
        self.query_first(command, MessageType::FaderState, move |m| {
            m.fader_state()
                .filter(|s| s.channel.matches(channel))
                .copied()
        })
        .await
    }

    /// Switch a channel on or off
    pub fn set_channel_state(&self, channel: Channel, on: bool) -> Result<()> {
        self.connection
            .send_command(Command::set(channel.to_string()).with_value("ON_State", on_off(on)))
    }

    // ========== Fader Level ==========

    /// Get the fader level of a channel
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use lwcp_client::{Channel, LwcpClient};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// # let client = LwcpClient::connect("192.168.2.20", 4010).await?;
    /// if let Some(level) = client.console().channel_gain(Channel::fader(1)).await? {
    ///     println!("fader 1 at {} dB", level.gain);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn channel_gain(&self, channel: Channel) -> Result<Option<FaderGain>> {
        let command = Command::get(channel.to_string()).with_key("Fader_Gain");
        self.query_first(command, MessageType::FaderGain, move |m| {
            m.fader_gain()
                .filter(|g| g.channel.matches(channel))
                .copied()
        })
        .await
    }

    /// Set the fader level of a channel in dB
    pub fn set_channel_gain(&self, channel: Channel, gain: GainValue) -> Result<()> {
        self.connection
            .send_command(Command::set(channel.to_string()).with_value("Fader_Gain", gain))
    }

    // ========== Bus Assignment ==========

    /// Get the program/preview bus assignment of a channel
    pub async fn channel_bus(&self, channel: Channel) -> Result<Option<ChannelBus>> {
        let command = BusAssignment::default()
            .entries()
            .iter()
            .fold(Command::get(channel.to_string()), |cmd, (key, _)| {
                cmd.with_key(*key)
            });
        self.query_first(command, MessageType::ChannelBus, move |m| {
            m.channel_bus()
                .filter(|b| b.channel.matches(channel))
                .copied()
        })
        .await
    }

    /// Assign a channel to, or remove it from, buses
    ///
    /// Buses left as `None` are not touched. An assignment that names no bus at all
    /// is rejected without sending anything.
    pub fn set_channel_bus(&self, channel: Channel, buses: BusAssignment) -> Result<()> {
        if !buses.any() {
            return Err(LwcpError::InvalidArgument(
                "bus assignment names no bus".to_string(),
            ));
        }

        let command = buses
            .entries()
            .iter()
            .filter_map(|(key, value)| value.map(|on| (*key, on)))
            .fold(Command::set(channel.to_string()), |cmd, (key, on)| {
                cmd.with_value(key, on_off(on))
            });
        self.connection.send_command(command)
    }

    // ========== Virtual Mixer ==========

    /// Get state, gain and fade times of a virtual mixer input
    pub async fn vmix_channel_state(&self, address: VMixAddress) -> Result<Option<VMixState>> {
        let command = Command::get(address.to_string())
            .with_key("State")
            .with_key("Gain")
            .with_key("TimeUp")
            .with_key("TimeDown");
        self.query_first(command, MessageType::VMix, move |m| {
            m.vmix().filter(|v| v.address == Some(address)).copied()
        })
        .await
    }

    /// Switch a virtual mixer input on or off
    pub fn set_vmix_channel_state(&self, address: VMixAddress, on: bool) -> Result<()> {
        self.connection
            .send_command(Command::set(address.to_string()).with_value("State", on_off(on)))
    }

    /// Set the gain of a virtual mixer input in dB
    pub fn set_vmix_channel_gain(&self, address: VMixAddress, gain: GainValue) -> Result<()> {
        self.connection
            .send_command(Command::set(address.to_string()).with_value("Gain", gain))
    }
}

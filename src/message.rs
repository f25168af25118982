use crate::types::{
    BusAssignment, ChannelBus, ChannelRef, FaderGain, FaderState, GainValue, ShowProfile,
    ShowProfileList, SourceProfile, SourceProfiles, VMixAddress, VMixState,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Logical message type, inferred from the attributes present on a line.
///
/// This is the only key subscriptions are matched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "DATA")]
    Data,
    ShowProfileList,
    ShowProfile,
    SourceProfiles,
    SourceProfile,
    FaderGain,
    FaderState,
    ChannelBus,
    VMix,
    #[serde(rename = "SET")]
    Set,
    #[serde(rename = "ERROR")]
    Error,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Data => "DATA",
            MessageType::ShowProfileList => "ShowProfileList",
            MessageType::ShowProfile => "ShowProfile",
            MessageType::SourceProfiles => "SourceProfiles",
            MessageType::SourceProfile => "SourceProfile",
            MessageType::FaderGain => "FaderGain",
            MessageType::FaderState => "FaderState",
            MessageType::ChannelBus => "ChannelBus",
            MessageType::VMix => "VMix",
            MessageType::Set => "SET",
            MessageType::Error => "ERROR",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every attribute the classifier recognizes on a line.
///
/// Unknown fields never make it here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attributes {
    pub channel: ChannelRef,
    pub channel_on: Option<bool>,
    pub profile_list: Option<String>,
    pub profile_id: Option<u32>,
    pub profile_name: Option<String>,
    pub profile_status: Option<String>,
    pub source_list: Option<String>,
    pub source_id: Option<u32>,
    pub source_name: Option<String>,
    pub source_livewire: Option<String>,
    pub source_status: Option<String>,
    pub fader_gain: Option<GainValue>,
    pub buses: BusAssignment,
    pub vmix_address: Option<VMixAddress>,
    pub vmix_on: Option<bool>,
    pub vmix_gain: Option<GainValue>,
    pub vmix_time_up: Option<f64>,
    pub vmix_time_down: Option<f64>,
}

impl Attributes {
    pub fn has_show_profile(&self) -> bool {
        self.profile_id.is_some() || self.profile_name.is_some() || self.profile_status.is_some()
    }

    pub fn has_source_profile(&self) -> bool {
        self.source_id.is_some()
            || self.source_name.is_some()
            || self.source_livewire.is_some()
            || self.source_status.is_some()
    }

    pub fn has_vmix(&self) -> bool {
        self.vmix_on.is_some()
            || self.vmix_gain.is_some()
            || self.vmix_time_up.is_some()
            || self.vmix_time_down.is_some()
    }
}

/// Typed payload of a message; the variant determines its [`MessageType`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum MessageBody {
    /// `EVENT`/`INDI` line with no recognized type-specific attribute
    #[serde(rename = "DATA")]
    Data(ChannelRef),
    ShowProfileList(ShowProfileList),
    ShowProfile(ShowProfile),
    SourceProfiles(SourceProfiles),
    SourceProfile(SourceProfile),
    FaderGain(FaderGain),
    FaderState(FaderState),
    ChannelBus(ChannelBus),
    VMix(VMixState),
    /// Acknowledgement echo of a `SET` command
    #[serde(rename = "SET")]
    Set(Attributes),
    /// Error text reported by the device
    #[serde(rename = "ERROR")]
    Error(String),
}

impl MessageBody {
    pub fn message_type(&self) -> MessageType {
        match self {
            MessageBody::Data(_) => MessageType::Data,
            MessageBody::ShowProfileList(_) => MessageType::ShowProfileList,
            MessageBody::ShowProfile(_) => MessageType::ShowProfile,
            MessageBody::SourceProfiles(_) => MessageType::SourceProfiles,
            MessageBody::SourceProfile(_) => MessageType::SourceProfile,
            MessageBody::FaderGain(_) => MessageType::FaderGain,
            MessageBody::FaderState(_) => MessageType::FaderState,
            MessageBody::ChannelBus(_) => MessageType::ChannelBus,
            MessageBody::VMix(_) => MessageType::VMix,
            MessageBody::Set(_) => MessageType::Set,
            MessageBody::Error(_) => MessageType::Error,
        }
    }
}

/// One logical inbound message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedMessage {
    pub body: MessageBody,
    /// Line text the message was parsed from (several lines joined by `\n` when merged)
    pub raw: String,
}

impl ParsedMessage {
    pub fn new(body: MessageBody, raw: impl Into<String>) -> Self {
        Self {
            body,
            raw: raw.into(),
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.body.message_type()
    }

    pub fn show_profile_list(&self) -> Option<&ShowProfileList> {
        match &self.body {
            MessageBody::ShowProfileList(v) => Some(v),
            _ => None,
        }
    }

    pub fn show_profile(&self) -> Option<&ShowProfile> {
        match &self.body {
            MessageBody::ShowProfile(v) => Some(v),
            _ => None,
        }
    }

    pub fn source_profiles(&self) -> Option<&SourceProfiles> {
        match &self.body {
            MessageBody::SourceProfiles(v) => Some(v),
            _ => None,
        }
    }

    pub fn source_profile(&self) -> Option<&SourceProfile> {
        match &self.body {
            MessageBody::SourceProfile(v) => Some(v),
            _ => None,
        }
    }

    pub fn fader_gain(&self) -> Option<&FaderGain> {
        match &self.body {
            MessageBody::FaderGain(v) => Some(v),
            _ => None,
        }
    }

    pub fn fader_state(&self) -> Option<&FaderState> {
        match &self.body {
            MessageBody::FaderState(v) => Some(v),
            _ => None,
        }
    }

    pub fn channel_bus(&self) -> Option<&ChannelBus> {
        match &self.body {
            MessageBody::ChannelBus(v) => Some(v),
            _ => None,
        }
    }

    pub fn vmix(&self) -> Option<&VMixState> {
        match &self.body {
            MessageBody::VMix(v) => Some(v),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Error(v) => Some(v),
            _ => None,
        }
    }
}

/// Messages from one read cycle grouped by type, each group in arrival order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageBatch {
    by_type: BTreeMap<MessageType, Vec<ParsedMessage>>,
}

impl MessageBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ParsedMessage) {
        self.by_type
            .entry(message.message_type())
            .or_default()
            .push(message);
    }

    /// All messages of one type, if any arrived
    pub fn get(&self, message_type: MessageType) -> Option<&[ParsedMessage]> {
        self.by_type.get(&message_type).map(Vec::as_slice)
    }

    pub fn contains(&self, message_type: MessageType) -> bool {
        self.by_type.contains_key(&message_type)
    }

    pub fn types(&self) -> impl Iterator<Item = MessageType> + '_ {
        self.by_type.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }

    /// Total number of messages across all types
    pub fn len(&self) -> usize {
        self.by_type.values().map(Vec::len).sum()
    }
}

impl FromIterator<ParsedMessage> for MessageBatch {
    fn from_iter<I: IntoIterator<Item = ParsedMessage>>(iter: I) -> Self {
        let mut batch = MessageBatch::new();
        for message in iter {
            batch.push(message);
        }
        batch
    }
}

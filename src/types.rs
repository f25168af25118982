use crate::error::LwcpError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fader number on the console surface
pub type FaderNumber = u32;

/// Livewire stream number
pub type LivewireNumber = u32;

/// Gain value in decibels
pub type GainValue = f64;

/// Addressing scheme used to select a console channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    /// Console-local fader index (`FaCH#<n>`)
    Fader,
    /// Network stream number (`LwCH#<n>`)
    Livewire,
}

impl ChannelType {
    /// Wire prefix for this addressing scheme
    pub fn prefix(&self) -> &'static str {
        match self {
            ChannelType::Fader => "FaCH#",
            ChannelType::Livewire => "LwCH#",
        }
    }
}

impl FromStr for ChannelType {
    type Err = LwcpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fader" => Ok(ChannelType::Fader),
            "livewire" => Ok(ChannelType::Livewire),
            other => Err(LwcpError::InvalidChannelType(other.to_string())),
        }
    }
}

/// A console channel selected by fader or Livewire number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Channel {
    pub kind: ChannelType,
    pub number: u32,
}

impl Channel {
    pub fn fader(number: FaderNumber) -> Self {
        Self {
            kind: ChannelType::Fader,
            number,
        }
    }

    pub fn livewire(number: LivewireNumber) -> Self {
        Self {
            kind: ChannelType::Livewire,
            number,
        }
    }

    /// Build a channel from a user-supplied type selector such as `"fader"`
    pub fn parse(kind: &str, number: u32) -> crate::error::Result<Self> {
        Ok(Self {
            kind: kind.parse()?,
            number,
        })
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.number)
    }
}

/// Channel numbers found on an inbound line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fader_number: Option<FaderNumber>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub livewire_number: Option<LivewireNumber>,
}

impl ChannelRef {
    /// True when the line named `channel`
    pub fn matches(&self, channel: Channel) -> bool {
        match channel.kind {
            ChannelType::Fader => self.fader_number == Some(channel.number),
            ChannelType::Livewire => self.livewire_number == Some(channel.number),
        }
    }

    fn merge(&mut self, later: ChannelRef) {
        self.fader_number = later.fader_number.or(self.fader_number);
        self.livewire_number = later.livewire_number.or(self.livewire_number);
    }
}

/// Assignment of a channel to the program and preview buses.
///
/// `None` means "not reported" on inbound lines and "leave unchanged" on outbound ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusAssignment {
    pub pgm1: Option<bool>,
    pub pgm2: Option<bool>,
    pub pgm3: Option<bool>,
    pub pgm4: Option<bool>,
    pub prev: Option<bool>,
}

impl BusAssignment {
    /// Wire keys paired with their values, in console order
    pub fn entries(&self) -> [(&'static str, Option<bool>); 5] {
        [
            ("Asg_PGM1", self.pgm1),
            ("Asg_PGM2", self.pgm2),
            ("Asg_PGM3", self.pgm3),
            ("Asg_PGM4", self.pgm4),
            ("Asg_PREV", self.prev),
        ]
    }

    /// True when at least one bus is reported or requested
    pub fn any(&self) -> bool {
        self.entries().iter().any(|(_, v)| v.is_some())
    }
}

/// Virtual mixer input, `VMIX.SUB#<sub>.IN#<input>` on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VMixAddress {
    pub sub: u32,
    pub input: u32,
}

impl VMixAddress {
    pub fn new(sub: u32, input: u32) -> Self {
        Self { sub, input }
    }

    /// Parse a target field such as `VMIX.SUB#1.IN#4`
    pub fn parse(field: &str) -> Option<Self> {
        let rest = field.strip_prefix("VMIX.SUB#")?;
        let (sub, input) = rest.split_once(".IN#")?;
        Some(Self {
            sub: sub.parse().ok()?,
            input: input.parse().ok()?,
        })
    }
}

impl fmt::Display for VMixAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VMIX.SUB#{}.IN#{}", self.sub, self.input)
    }
}

/// Raw show-profile list (XML inside an encapsulation block)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowProfileList {
    pub list: String,
}

/// Active show profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShowProfile {
    pub id: Option<u32>,
    pub name: Option<String>,
    pub status: Option<String>,
}

impl ShowProfile {
    pub(crate) fn merge(&mut self, later: ShowProfile) {
        self.id = later.id.or(self.id);
        self.name = later.name.or(self.name.take());
        self.status = later.status.or(self.status.take());
    }
}

/// Raw source-profile list for a channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceProfiles {
    pub channel: ChannelRef,
    pub list: String,
}

/// Source profile loaded on a channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceProfile {
    pub channel: ChannelRef,
    pub id: Option<u32>,
    pub name: Option<String>,
    pub livewire: Option<String>,
    pub status: Option<String>,
}

impl SourceProfile {
    pub(crate) fn merge(&mut self, later: SourceProfile) {
        self.channel.merge(later.channel);
        self.id = later.id.or(self.id);
        self.name = later.name.or(self.name.take());
        self.livewire = later.livewire.or(self.livewire.take());
        self.status = later.status.or(self.status.take());
    }
}

/// Fader level of a channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaderGain {
    pub channel: ChannelRef,
    pub gain: GainValue,
}

/// On/off state of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaderState {
    pub channel: ChannelRef,
    pub on: bool,
}

/// Bus assignment of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelBus {
    pub channel: ChannelRef,
    pub buses: BusAssignment,
}

/// State of a virtual mixer input
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VMixState {
    pub address: Option<VMixAddress>,
    pub on: Option<bool>,
    pub gain: Option<GainValue>,
    pub time_up: Option<f64>,
    pub time_down: Option<f64>,
}

//! Turns framed lines into typed messages.
//!
//! A line is first sorted by its prefix (`EVENT`/`INDI`, `SET`, `ERROR`), then its
//! fields are matched against the known key table to build an [`Attributes`] set,
//! and finally the message type is inferred from which key families are present.

use crate::message::{Attributes, MessageBatch, MessageBody, ParsedMessage};
use crate::protocol::{ERROR_PREFIX, EVENT_PREFIX, INDI_PREFIX, SET_PREFIX};
use crate::tokenizer::split_fields;
use crate::types::{
    ChannelBus, FaderGain, FaderState, ShowProfile, ShowProfileList, SourceProfile,
    SourceProfiles, VMixAddress, VMixState,
};
use std::str::FromStr;

/// Parse one protocol line.
///
/// Returns `None` for lines that carry none of the known prefixes; those are
/// absorbed without reaching any subscriber.
pub fn parse_line(line: &str) -> Option<ParsedMessage> {
    let line = line.trim_end_matches(&['\r', '\n'][..]);

    let body = if let Some(rest) = line
        .strip_prefix(EVENT_PREFIX)
        .or_else(|| line.strip_prefix(INDI_PREFIX))
    {
        classify(parse_attributes(&split_fields(rest)))
    } else if let Some(rest) = line.strip_prefix(SET_PREFIX) {
        MessageBody::Set(parse_attributes(&split_fields(rest)))
    } else if let Some(rest) = line.strip_prefix(ERROR_PREFIX) {
        MessageBody::Error(rest.strip_prefix(' ').unwrap_or(rest).to_string())
    } else {
        if !line.trim().is_empty() {
            tracing::debug!(line, "ignoring unrecognized line");
        }
        return None;
    };

    Some(ParsedMessage::new(body, line))
}

/// Parse a sequence of lines, merging consecutive show-profile and
/// source-profile replies into a single message.
pub fn parse_messages<'a, I>(lines: I) -> Vec<ParsedMessage>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut messages: Vec<ParsedMessage> = Vec::new();

    for line in lines {
        let Some(message) = parse_line(line) else {
            continue;
        };

        let unmerged = match messages.last_mut() {
            Some(last) => merge_into(last, message),
            None => Some(message),
        };

        if let Some(message) = unmerged {
            messages.push(message);
        }
    }

    messages
}

/// Parse the frames produced by one read cycle and group them by type
pub fn parse_batch<S: AsRef<str>>(frames: &[S]) -> MessageBatch {
    parse_messages(frames.iter().map(AsRef::as_ref))
        .into_iter()
        .collect()
}

/// Merge `next` into `last` when both are record-oriented replies of the same
/// type. Hands `next` back when no merge applies.
fn merge_into(last: &mut ParsedMessage, next: ParsedMessage) -> Option<ParsedMessage> {
    let ParsedMessage { body, raw } = next;

    match (&mut last.body, body) {
        (MessageBody::ShowProfile(current), MessageBody::ShowProfile(later)) => {
            current.merge(later);
        }
        (MessageBody::SourceProfile(current), MessageBody::SourceProfile(later)) => {
            current.merge(later);
        }
        (_, body) => return Some(ParsedMessage { body, raw }),
    }

    last.raw.push('\n');
    last.raw.push_str(&raw);
    None
}

/// Build the attribute set for a line's fields. Unknown fields are dropped, as
/// are known fields whose value does not parse.
pub fn parse_attributes<S: AsRef<str>>(fields: &[S]) -> Attributes {
    let mut attrs = Attributes::default();

    for field in fields {
        let field = field.as_ref();
        let (key, value) = match field.split_once('=') {
            Some((key, value)) => (key, value.trim()),
            None => (field, ""),
        };
        let lower = key.to_ascii_lowercase();

        if let Some(n) = key.strip_prefix("FaCH#") {
            attrs.channel.fader_number = number(field, n);
        } else if let Some(n) = key.strip_prefix("LwCH#") {
            attrs.channel.livewire_number = number(field, n);
        } else if let Some(address) = VMixAddress::parse(key) {
            attrs.vmix_address = Some(address);
        } else if key.starts_with("ON_State") {
            attrs.channel_on = Some(is_on(value));
        } else if key.starts_with("ShowProfList") {
            attrs.profile_list = Some(value.to_string());
        } else if key.starts_with("ShowProfID") {
            attrs.profile_id = number(field, value);
        } else if key.starts_with("ShowProfName") {
            attrs.profile_name = Some(value.to_string());
        } else if key.starts_with("ShowProfStat") {
            attrs.profile_status = Some(value.to_string());
        } else if key.starts_with("src_list") {
            attrs.source_list = Some(value.to_string());
        } else if key.starts_with("src_id") {
            attrs.source_id = number(field, value);
        } else if key.starts_with("src_name") {
            attrs.source_name = Some(value.to_string());
        } else if key.starts_with("src_lwch") {
            attrs.source_livewire = Some(value.to_string());
        } else if key.starts_with("src_stat") {
            attrs.source_status = Some(value.to_string());
        } else if key.starts_with("Fader_Gain") {
            attrs.fader_gain = number(field, value);
        } else if key.starts_with("Asg_PGM1") {
            attrs.buses.pgm1 = Some(is_on(value));
        } else if key.starts_with("Asg_PGM2") {
            attrs.buses.pgm2 = Some(is_on(value));
        } else if key.starts_with("Asg_PGM3") {
            attrs.buses.pgm3 = Some(is_on(value));
        } else if key.starts_with("Asg_PGM4") {
            attrs.buses.pgm4 = Some(is_on(value));
        } else if key.starts_with("Asg_PREV") {
            attrs.buses.prev = Some(is_on(value));
        } else if lower.starts_with("state") {
            attrs.vmix_on = Some(is_on(value));
        } else if lower.starts_with("gain") {
            attrs.vmix_gain = number(field, value);
        } else if lower.starts_with("timeup") {
            attrs.vmix_time_up = number(field, value);
        } else if lower.starts_with("timedown") {
            attrs.vmix_time_down = number(field, value);
        } else {
            tracing::trace!(field, "ignoring unknown field");
        }
    }

    attrs
}

/// Project an attribute set onto its message type.
///
/// Key families are checked from highest precedence down, which is the same as
/// letting later families override earlier ones: VMix, bus assignment, on/off
/// state, fader gain, source profile, source list, show profile, show-profile
/// list, and finally plain data.
pub fn classify(attrs: Attributes) -> MessageBody {
    let channel = attrs.channel;

    if attrs.has_vmix() {
        return MessageBody::VMix(VMixState {
            address: attrs.vmix_address,
            on: attrs.vmix_on,
            gain: attrs.vmix_gain,
            time_up: attrs.vmix_time_up,
            time_down: attrs.vmix_time_down,
        });
    }
    if attrs.buses.any() {
        return MessageBody::ChannelBus(ChannelBus {
            channel,
            buses: attrs.buses,
        });
    }
    if let Some(on) = attrs.channel_on {
        return MessageBody::FaderState(FaderState { channel, on });
    }
    if let Some(gain) = attrs.fader_gain {
        return MessageBody::FaderGain(FaderGain { channel, gain });
    }
    if attrs.has_source_profile() {
        return MessageBody::SourceProfile(SourceProfile {
            channel,
            id: attrs.source_id,
            name: attrs.source_name,
            livewire: attrs.source_livewire,
            status: attrs.source_status,
        });
    }
    if let Some(list) = attrs.source_list {
        return MessageBody::SourceProfiles(SourceProfiles { channel, list });
    }
    if attrs.has_show_profile() {
        return MessageBody::ShowProfile(ShowProfile {
            id: attrs.profile_id,
            name: attrs.profile_name,
            status: attrs.profile_status,
        });
    }
    if let Some(list) = attrs.profile_list {
        return MessageBody::ShowProfileList(ShowProfileList { list });
    }

    MessageBody::Data(channel)
}

fn is_on(value: &str) -> bool {
    value == "ON"
}

fn number<T: FromStr>(field: &str, value: &str) -> Option<T> {
    match value.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::debug!(field, "ignoring field with unparsable number");
            None
        }
    }
}

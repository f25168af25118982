//! Rust library for talking LWCP to Axia/Livewire mixing consoles
//!
//! This library provides an async engine for the line-oriented LWCP control
//! protocol. It supports:
//!
//! - One TCP connection per console with a single background I/O task
//! - Framing of inbound bytes into messages, including `%BeginEncap%` blocks
//! - Tokenizing and classifying messages into typed records
//! - Typed subscriptions with expiry after a number of firings
//! - Request/reply calls matched by message type, with a timeout
//! - Show profile, source profile, fader, bus and virtual mixer controls
//!
//! # Quick Start
//!
//! ```no_run
//! use lwcp_client::{Channel, LwcpClient, MessageType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = LwcpClient::connect_default_port("192.168.2.20").await?;
//!     let console = client.console();
//!
//!     // Query and control a channel
//!     if let Some(level) = console.channel_gain(Channel::fader(1)).await? {
//!         println!("fader 1 at {} dB", level.gain);
//!     }
//!     console.set_channel_state(Channel::fader(1), true)?;
//!
//!     // Watch unsolicited state changes
//!     let mut updates = client.subscribe(MessageType::FaderState);
//!     if let Ok(batch) = updates.recv().await {
//!         println!("state update: {:?}", batch);
//!     }
//!
//!     client.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The library is organized into several layers:
//!
//! - **Client**: Connection ownership and the engine surface
//! - **Console**: High-level control API built on calls and commands
//! - **Connection**: Background I/O task, outbound queue and lifecycle state
//! - **Framer / Tokenizer / Classifier**: Bytes to lines, lines to fields, fields to typed messages
//! - **Subscription**: Registry of typed callbacks and channel receivers
//! - **Protocol / Types**: Wire constants, command builder and domain records

mod classifier;
mod client;
mod config;
mod connection;
mod console;
mod error;
mod framer;
mod message;
mod protocol;
mod subscription;
mod tokenizer;
mod types;

// Public exports
pub use classifier::{classify, parse_attributes, parse_batch, parse_line, parse_messages};
pub use client::LwcpClient;
pub use config::{EngineConfig, DEFAULT_PORT};
pub use connection::{Connection, ConnectionState};
pub use console::Console;
pub use error::{LwcpError, Result};
pub use framer::{Framer, DEFAULT_MAX_FRAME_LEN};
pub use message::{Attributes, MessageBatch, MessageBody, MessageType, ParsedMessage};
pub use protocol::{Command, Verb};
pub use subscription::{Callback, Limit, MessageReceiver, SubscriptionId, SubscriptionRegistry};
pub use tokenizer::split_fields;
pub use types::{
    BusAssignment, Channel, ChannelBus, ChannelRef, ChannelType, FaderGain, FaderNumber,
    FaderState, GainValue, LivewireNumber, ShowProfile, ShowProfileList, SourceProfile,
    SourceProfiles, VMixAddress, VMixState,
};

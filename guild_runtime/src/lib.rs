//! Shared command contracts for the guild territory server.
//!
//! This crate holds the command payloads, the line-oriented text parser, and
//! the reply type exchanged between clients and the authority in `guild_core`.
//! It deliberately has no dependency on the ECS runtime so thin clients and
//! tools can link it on its own.

pub mod command_text;
pub mod commands;

pub use command_text::{parse_command_line, CommandParseError};
pub use commands::{
    CommandEnvelope, CommandPayload, CommandReply, FactionVerb, ProbeAction, RaidVerb,
};

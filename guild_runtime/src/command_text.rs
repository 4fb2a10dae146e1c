use std::num::ParseIntError;

use thiserror::Error;

use crate::{CommandEnvelope, CommandPayload, FactionVerb, ProbeAction, RaidVerb};

#[derive(Debug, Error)]
pub enum CommandParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("invalid integer '{value}' for {context}: {source}")]
    InvalidInteger {
        value: String,
        context: &'static str,
        source: ParseIntError,
    },
    #[error("invalid raid verb '{0}'")]
    InvalidRaidVerb(String),
    #[error("invalid faction verb '{0}'")]
    InvalidFactionVerb(String),
    #[error("invalid probe action '{0}'")]
    InvalidAction(String),
    #[error("command '{0}' must be prefixed with the issuing participant id")]
    MissingIssuer(&'static str),
}

/// Parse a single text command line.
///
/// Lines have the shape `[issuer] <verb> [arguments...]`, where `issuer` is
/// the numeric participant id. Administrative verbs may omit it.
pub fn parse_command_line(input: &str) -> Result<CommandEnvelope, CommandParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CommandParseError::Empty);
    }

    let mut parts = trimmed.split_whitespace().peekable();
    let issuer = match parts.peek().map(|token| token.parse::<u64>()) {
        Some(Ok(id)) => {
            parts.next();
            Some(id)
        }
        _ => None,
    };

    let verb = parts
        .next()
        .map(|v| v.to_ascii_lowercase())
        .ok_or(CommandParseError::Empty)?;

    let payload = match verb.as_str() {
        "raid" => {
            let action = parts
                .next()
                .map(|v| v.to_ascii_lowercase())
                .unwrap_or_else(|| "help".to_string());
            let verb = match action.as_str() {
                "join" => {
                    let target = parts
                        .next()
                        .ok_or(CommandParseError::MissingArgument("raid target"))?;
                    RaidVerb::Join {
                        target: target.to_string(),
                    }
                }
                "leave" => RaidVerb::Leave,
                "start" => RaidVerb::Start,
                "help" => RaidVerb::Help,
                other => return Err(CommandParseError::InvalidRaidVerb(other.to_string())),
            };
            CommandPayload::Raid(verb)
        }
        "faction" => {
            let action = parts
                .next()
                .map(|v| v.to_ascii_lowercase())
                .ok_or(CommandParseError::MissingArgument("faction verb"))?;
            let verb = match action.as_str() {
                "found" | "create" => {
                    let name = parts
                        .next()
                        .ok_or(CommandParseError::MissingArgument("faction name"))?;
                    FactionVerb::Found {
                        name: name.to_string(),
                    }
                }
                "join" => {
                    let name = parts
                        .next()
                        .ok_or(CommandParseError::MissingArgument("faction name"))?;
                    FactionVerb::Join {
                        name: name.to_string(),
                    }
                }
                "leave" => FactionVerb::Leave,
                "pact" => {
                    let pact = parts
                        .next()
                        .ok_or(CommandParseError::MissingArgument("pact name"))?;
                    let pact = if pact.eq_ignore_ascii_case("none") {
                        None
                    } else {
                        Some(pact.to_string())
                    };
                    FactionVerb::Pact { pact }
                }
                "disband" => FactionVerb::Disband,
                other => return Err(CommandParseError::InvalidFactionVerb(other.to_string())),
            };
            CommandPayload::Faction(verb)
        }
        "claim" => {
            let (x, z) = parse_cell(&mut parts, "claim")?;
            CommandPayload::Claim { x, z }
        }
        "abandon" | "unclaim" => {
            let (x, z) = parse_cell(&mut parts, "abandon")?;
            CommandPayload::Abandon { x, z }
        }
        "probe" => {
            let (x, z) = parse_cell(&mut parts, "probe")?;
            let action_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("probe action"))?;
            let action = parse_probe_action(action_str)?;
            CommandPayload::Probe { x, z, action }
        }
        "resolve" => {
            let defender = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("defending faction"))?;
            CommandPayload::ResolveRaid {
                defender: defender.to_string(),
            }
        }
        "save" => CommandPayload::Save,
        "shutdown" | "stop" => CommandPayload::Shutdown,
        other => return Err(CommandParseError::UnknownCommand(other.to_string())),
    };

    if issuer.is_none() && payload.requires_issuer() {
        return Err(CommandParseError::MissingIssuer(payload.label()));
    }

    Ok(CommandEnvelope::new(issuer, payload))
}

fn parse_cell<'a, I>(parts: &mut I, context: &'static str) -> Result<(i32, i32), CommandParseError>
where
    I: Iterator<Item = &'a str>,
{
    let x_str = parts
        .next()
        .ok_or(CommandParseError::MissingArgument("cell x"))?;
    let z_str = parts
        .next()
        .ok_or(CommandParseError::MissingArgument("cell z"))?;
    let x = parse_i32(x_str, context)?;
    let z = parse_i32(z_str, context)?;
    Ok((x, z))
}

fn parse_i32(value: &str, context: &'static str) -> Result<i32, CommandParseError> {
    value
        .parse::<i32>()
        .map_err(|source| CommandParseError::InvalidInteger {
            value: value.to_string(),
            context,
            source,
        })
}

fn parse_probe_action(token: &str) -> Result<ProbeAction, CommandParseError> {
    match token.to_ascii_lowercase().as_str() {
        "break" => Ok(ProbeAction::Break { stateful: false }),
        "break_fixture" => Ok(ProbeAction::Break { stateful: true }),
        "place" => Ok(ProbeAction::Place { stateful: false }),
        "place_fixture" => Ok(ProbeAction::Place { stateful: true }),
        "use" | "interact" => Ok(ProbeAction::Use { stateful: false }),
        "use_fixture" => Ok(ProbeAction::Use { stateful: true }),
        "fluid" | "bucket" => Ok(ProbeAction::PlaceFluid),
        "trample" => Ok(ProbeAction::Trample),
        other => Err(CommandParseError::InvalidAction(other.to_string())),
    }
}

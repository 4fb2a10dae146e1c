use serde::{Deserialize, Serialize};

/// High-level representation of a command envelope.
///
/// `issuer` is the participant the command acts on behalf of. Administrative
/// commands (`save`, `resolve`, `shutdown`) are accepted without one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub issuer: Option<u64>,
    pub payload: CommandPayload,
    pub correlation_id: Option<u64>,
}

impl CommandEnvelope {
    pub fn new(issuer: Option<u64>, payload: CommandPayload) -> Self {
        Self {
            issuer,
            payload,
            correlation_id: None,
        }
    }

    pub fn from_participant(issuer: u64, payload: CommandPayload) -> Self {
        Self::new(Some(issuer), payload)
    }

    pub fn admin(payload: CommandPayload) -> Self {
        Self::new(None, payload)
    }

    pub fn with_correlation(mut self, correlation_id: u64) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

/// Supported command payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandPayload {
    Raid(RaidVerb),
    Faction(FactionVerb),
    Claim { x: i32, z: i32 },
    Abandon { x: i32, z: i32 },
    Probe { x: i32, z: i32, action: ProbeAction },
    ResolveRaid { defender: String },
    Save,
    Shutdown,
}

impl CommandPayload {
    /// Whether the payload needs an issuing participant to be meaningful.
    pub fn requires_issuer(&self) -> bool {
        !matches!(
            self,
            CommandPayload::ResolveRaid { .. } | CommandPayload::Save | CommandPayload::Shutdown
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            CommandPayload::Raid(verb) => verb.label(),
            CommandPayload::Faction(_) => "faction",
            CommandPayload::Claim { .. } => "claim",
            CommandPayload::Abandon { .. } => "abandon",
            CommandPayload::Probe { .. } => "probe",
            CommandPayload::ResolveRaid { .. } => "resolve",
            CommandPayload::Save => "save",
            CommandPayload::Shutdown => "shutdown",
        }
    }
}

/// The four participant-facing raid verbs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaidVerb {
    Join { target: String },
    Leave,
    Start,
    Help,
}

impl RaidVerb {
    pub fn label(&self) -> &'static str {
        match self {
            RaidVerb::Join { .. } => "raid.join",
            RaidVerb::Leave => "raid.leave",
            RaidVerb::Start => "raid.start",
            RaidVerb::Help => "raid.help",
        }
    }
}

/// Membership bookkeeping verbs for the in-memory faction directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FactionVerb {
    Found { name: String },
    Join { name: String },
    Leave,
    Pact { pact: Option<String> },
    Disband,
}

/// Action kinds that can be checked against territory protection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeAction {
    Break { stateful: bool },
    Place { stateful: bool },
    Use { stateful: bool },
    PlaceFluid,
    Trample,
}

/// Outcome of a command, returned to the issuing client.
///
/// `messages` are addressed to the issuer; `broadcast` lines are meant for
/// every connected participant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandReply {
    pub correlation_id: Option<u64>,
    pub accepted: bool,
    pub messages: Vec<String>,
    pub broadcast: Vec<String>,
}

impl CommandReply {
    pub fn accepted(message: impl Into<String>) -> Self {
        Self {
            accepted: true,
            messages: vec![message.into()],
            ..Self::default()
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            messages: vec![message.into()],
            ..Self::default()
        }
    }

    pub fn with_broadcast(mut self, line: impl Into<String>) -> Self {
        self.broadcast.push(line.into());
        self
    }

    pub fn with_correlation(mut self, correlation_id: Option<u64>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Render the reply as protocol lines: `ok`/`err`, then the messages,
    /// then broadcast lines prefixed with `*`.
    pub fn to_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(1 + self.messages.len() + self.broadcast.len());
        lines.push(if self.accepted { "ok" } else { "err" }.to_string());
        lines.extend(self.messages.iter().cloned());
        lines.extend(self.broadcast.iter().map(|line| format!("* {line}")));
        lines
    }
}

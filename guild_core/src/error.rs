use std::fmt;

/// Coarse classification shared by every fallible core operation.
///
/// Callers use it to pick a response (message wording, log level) without
/// matching on each concrete error enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Adjacency, connectivity, uniqueness or capacity rule would be broken.
    InvariantViolation,
    /// Unknown cell, raid, faction or participant.
    NotFound,
    /// Operation is not valid in the raid's current phase.
    PhaseViolation,
    /// Snapshot load/save problem.
    PersistenceFailure,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvariantViolation => "invariant_violation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::PhaseViolation => "phase_violation",
            ErrorKind::PersistenceFailure => "persistence_failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Classification of media process exits
//!
//! Used for operator-facing messages only. Every outcome is retried the same way.

use serde::Serialize;
use std::fmt;

use crate::constants::DIAGNOSTIC_TAIL_CHARS;

/// Likely cause of an unclean exit, read from the process diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// Peer is not listening yet
    ConnectionRefused,
    /// Peer went away mid-stream
    ConnectionLost,
    /// Stream port is taken by another process
    AddressInUse,
    /// Killed by a signal, no exit code
    Signalled,
    Unknown,
}

impl FailureCause {
    fn from_diagnostics(code: Option<i32>, diagnostic: &str) -> Self {
        const SIGNATURES: &[(&str, FailureCause)] = &[
            ("Connection refused", FailureCause::ConnectionRefused),
            ("Connection reset", FailureCause::ConnectionLost),
            ("Broken pipe", FailureCause::ConnectionLost),
            ("Connection timed out", FailureCause::ConnectionLost),
            ("Address already in use", FailureCause::AddressInUse),
        ];

        SIGNATURES
            .iter()
            .find(|(needle, _)| diagnostic.contains(needle))
            .map(|(_, cause)| *cause)
            .unwrap_or(if code.is_none() {
                FailureCause::Signalled
            } else {
                FailureCause::Unknown
            })
    }

    /// Hint shown to the operator
    pub fn hint(&self) -> &'static str {
        match self {
            FailureCause::ConnectionRefused => "Could not connect to receiver. Is it running?",
            FailureCause::ConnectionLost => "Connection to the peer was lost.",
            FailureCause::AddressInUse => "The stream port is already in use on this host.",
            FailureCause::Signalled => "The media process was terminated by a signal.",
            FailureCause::Unknown => "The media process exited with an error.",
        }
    }
}

/// How a media process ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExitOutcome {
    /// Exit code 0, the stream ended normally
    Clean,
    Failed {
        code: Option<i32>,
        cause: FailureCause,
        /// Last characters of the process diagnostics
        diagnostic: String,
    },
}

impl ExitOutcome {
    pub fn classify(code: Option<i32>, diagnostic: &str) -> Self {
        if code == Some(0) {
            return ExitOutcome::Clean;
        }

        ExitOutcome::Failed {
            code,
            cause: FailureCause::from_diagnostics(code, diagnostic),
            diagnostic: tail_chars(diagnostic.trim_end(), DIAGNOSTIC_TAIL_CHARS).to_string(),
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, ExitOutcome::Clean)
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Clean => write!(f, "stream ended normally"),
            ExitOutcome::Failed {
                code: Some(code),
                cause,
                ..
            } => write!(f, "exited with code {code}: {}", cause.hint()),
            ExitOutcome::Failed { cause, .. } => write!(f, "{}", cause.hint()),
        }
    }
}

/// Last `n` characters of `text`, respecting char boundaries
pub fn tail_chars(text: &str, n: usize) -> &str {
    match text.char_indices().rev().nth(n.saturating_sub(1)) {
        Some((idx, _)) if n > 0 => &text[idx..],
        _ if n == 0 => "",
        _ => text,
    }
}

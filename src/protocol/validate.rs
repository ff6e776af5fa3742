//! Request validation for the task protocol.
//!
//! Two checks run before any work is accepted: the task-id format check and
//! a blacklist scan of submitted text. Both reject with a validation error
//! before the worker adapter is ever invoked.

use crate::error::ProtocolError;
use crate::protocol::types::Message;

/// Maximum accepted task-id length.
const MAX_TASK_ID_LEN: usize = 64;

/// Validate a caller-supplied task id.
///
/// Ids must match `^[A-Za-z0-9_-]{1,64}$`. The check is an allowlist: only
/// alphanumeric characters, `-` and `_` are permitted, so ids are safe to
/// embed in paths and log lines.
pub fn validate_task_id(id: &str) -> Result<(), ProtocolError> {
    if id.is_empty() || id.len() > MAX_TASK_ID_LEN {
        return Err(ProtocolError::InvalidTaskId(id.to_string()));
    }
    for ch in id.chars() {
        if !ch.is_ascii_alphanumeric() && ch != '-' && ch != '_' {
            return Err(ProtocolError::InvalidTaskId(id.to_string()));
        }
    }
    Ok(())
}

/// Phrases that must never reach the worker process.
///
/// The worker runs with file and shell access, so submitted text is scanned
/// for prompt-injection phrases and destructive shell idioms. Matching is
/// case-insensitive on a lowercased copy of the input.
const DANGEROUS_PATTERNS: &[&str] = &[
    // prompt-injection phrases
    "ignore previous instructions",
    "ignore all previous instructions",
    "disregard your instructions",
    "system prompt",
    "you are now",
    // destructive shell idioms
    "rm -rf /",
    "rm -rf ~",
    "rm -rf *",
    "mkfs",
    "dd if=",
    ":(){ :|:& };:",
    "> /dev/sda",
    "chmod -r 777 /",
    // credential exfiltration
    "cat /etc/passwd",
    "cat /etc/shadow",
    "~/.ssh/id_rsa",
    "~/.aws/credentials",
];

/// Scan submitted text against the blacklist.
///
/// Returns the matched pattern as the error payload so the caller can log
/// what tripped the filter without echoing the full input.
pub fn check_dangerous_text(text: &str) -> Result<(), ProtocolError> {
    let lowered = text.to_lowercase();
    for pattern in DANGEROUS_PATTERNS {
        if lowered.contains(pattern) {
            return Err(ProtocolError::DangerousInput(format!(
                "matched blocked pattern '{}'",
                pattern
            )));
        }
    }
    Ok(())
}

/// Validate every text part of an inbound message.
pub fn check_message(message: &Message) -> Result<(), ProtocolError> {
    for part in &message.parts {
        if let Some(text) = part.as_text() {
            check_dangerous_text(text)?;
        }
    }
    Ok(())
}

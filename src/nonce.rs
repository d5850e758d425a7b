//! Correlation tokens for outbound commands
use uuid::Uuid;

use crate::ipc::Command;

/// Generate a unique nonce for an IPC request
///
/// Returns a string in the format `{prefix}-{uuid}` with a v4 UUID.
///
/// # Examples
///
/// ```
/// # use presence_link::nonce::generate_nonce;
/// let nonce = generate_nonce("set-activity");
/// assert!(nonce.starts_with("set-activity-"));
/// ```
pub fn generate_nonce(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

/// Nonce for `command`, prefixed with its short name
pub fn nonce_for(command: Command) -> String {
    generate_nonce(command.nonce_prefix())
}

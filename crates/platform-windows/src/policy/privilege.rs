//! Elevation detection.

use std::time::Duration;

use crate::runner::CommandRunner;
use crate::windows_cmd::WHOAMI_EXE;

/// Mandatory label carried by elevated (administrator) tokens.
const HIGH_INTEGRITY_SID: &str = "S-1-16-12288";
const SYSTEM_INTEGRITY_SID: &str = "S-1-16-16384";

/// Whether the current token is elevated. Any probe failure is treated as
/// not elevated.
pub fn is_elevated(runner: &dyn CommandRunner, timeout: Duration) -> bool {
    let args = vec!["/groups".to_string()];
    match runner.run(WHOAMI_EXE, &args, timeout) {
        Ok(output) if output.success() => token_is_elevated(&output.stdout),
        Ok(output) => {
            tracing::debug!(detail = %output.failure_detail(), "whoami /groups failed");
            false
        }
        Err(err) => {
            tracing::debug!(error = %err, "whoami /groups could not be spawned");
            false
        }
    }
}

fn token_is_elevated(groups_output: &str) -> bool {
    groups_output.contains(HIGH_INTEGRITY_SID) || groups_output.contains(SYSTEM_INTEGRITY_SID)
}

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use compliance::Authorizer;

/// Ask once on `output`, read one answer line from `input`. Anything other
/// than `y`/`yes` (including EOF and read errors) declines.
pub fn confirm(input: &mut dyn BufRead, output: &mut dyn Write, control_id: &str) -> bool {
    let _ = write!(output, "Apply remediation for control {}? [y/N] ", control_id);
    let _ = output.flush();

    let mut answer = String::new();
    match input.read_line(&mut answer) {
        Ok(0) | Err(_) => false,
        Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
    }
}

/// Prompts on stderr so stdout stays machine-readable JSON.
pub fn stdin_authorizer() -> Authorizer {
    Arc::new(|control_id: &str| {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        let mut output = io::stderr();
        confirm(&mut input, &mut output, control_id)
    })
}

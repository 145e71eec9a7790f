//! Canonical Windows system command paths.
//!
//! Using absolute system paths avoids PATH-search hijacking when spawning
//! privileged subprocesses. The constants are defined on every target so the
//! readers can be exercised against scripted runners off-Windows.

pub const NET_EXE: &str = r"C:\Windows\System32\net.exe";
pub const AUDITPOL_EXE: &str = r"C:\Windows\System32\auditpol.exe";
pub const SECEDIT_EXE: &str = r"C:\Windows\System32\secedit.exe";
pub const WHOAMI_EXE: &str = r"C:\Windows\System32\whoami.exe";

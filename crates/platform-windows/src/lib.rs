//! Platform-windows crate: Windows security policy inspection.
//!
//! Readers for password, account lockout, security option and advanced audit
//! policy state, built on the native `net`, `auditpol`, `secedit` and `whoami`
//! tools. All process execution goes through [`CommandRunner`] so callers can
//! bound it with timeouts and tests can script it.

pub mod policy;
pub mod runner;
pub mod windows_cmd;

pub use policy::{
    AuditInventory, AuditRow, AuditSetting, ExportKind, HostPlatform, PolicyData, PolicyInspector,
    PolicyName, PolicyReader, PolicyValue, ReadError, ReaderSettings, ValueOrigin,
};
pub use runner::{CommandOutput, CommandRunner, SystemCommandRunner};

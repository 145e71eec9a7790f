use anyhow::{bail, Result};

pub const USAGE: &str = "usage: cisguard-agent [check|remediate|audit-inventory]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Evaluate the selection; remediates too when configured.
    Check,
    Remediate,
    AuditInventory,
}

impl Command {
    /// No argument means `check`.
    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut args = args.into_iter();
        let Some(first) = args.next() else {
            return Ok(Self::Check);
        };
        let command = match first.as_ref().trim().to_ascii_lowercase().as_str() {
            "check" => Self::Check,
            "remediate" => Self::Remediate,
            "audit-inventory" | "inventory" => Self::AuditInventory,
            other => bail!("unknown command '{}'\n{}", other, USAGE),
        };
        if let Some(extra) = args.next() {
            bail!("unexpected argument '{}'\n{}", extra.as_ref(), USAGE);
        }
        Ok(command)
    }
}

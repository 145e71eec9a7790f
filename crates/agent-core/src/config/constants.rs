#[cfg(target_os = "windows")]
pub(super) const AGENT_CONFIG_CANDIDATES: [&str; 3] = [
    r"C:\ProgramData\CisGuard\agent.toml",
    r".\conf\agent.toml",
    r".\agent.toml",
];

#[cfg(not(target_os = "windows"))]
pub(super) const AGENT_CONFIG_CANDIDATES: [&str; 3] = [
    "/etc/cisguard/agent.toml",
    "./conf/agent.toml",
    "./agent.toml",
];

#[cfg(target_os = "windows")]
pub(super) const DEFAULT_LOG_PATH: &str = r"C:\ProgramData\CisGuard\Logs\compliance.log";

#[cfg(not(target_os = "windows"))]
pub(super) const DEFAULT_LOG_PATH: &str = "./logs/compliance.log";

pub(super) const CONFIG_PATH_ENV: &str = "CISGUARD_CONFIG";
pub(super) const DEFAULT_LOG_MODULE: &str = "cisguard";
pub(super) const DEFAULT_LOG_MAX_SIZE_MB: u64 = 10;
pub(super) const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 5;
pub(super) const DEFAULT_REMEDIATION_TIMEOUT_SECS: u64 = 120;

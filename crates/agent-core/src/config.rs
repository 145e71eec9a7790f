mod constants;
mod defaults;
mod env;
mod file;
mod load;
mod paths;
mod types;
mod util;

pub use types::AgentConfig;

#[cfg(test)]
use paths::resolve_config_path;
#[cfg(test)]
use util::{parse_bool, split_csv};

//! CLI command implementations

mod config;
mod hosts;
mod keys;
mod run;

pub use config::{config_init, config_path, config_show, load_bench_config};
pub use hosts::{hosts_set, hosts_show};
pub use keys::{keygen_command, keysend_command};
pub use run::run_command;

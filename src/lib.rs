pub mod config;
pub mod core;
pub mod domain;
pub mod ftp;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::CliConfig;

pub use config::{storage::LocalStorage, toml_config::TomlConfig, FtpConfig};
pub use core::transfer::FtpTransfer;
pub use utils::error::{FtpError, Result};

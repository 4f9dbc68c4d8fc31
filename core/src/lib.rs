//! Environment block editing core
//!
//! Low-level operations behind `grub-editenv`:
//! - `envblk`: the fixed-capacity environment block codec
//! - `store`: the file-backed primary block and the raw-sector on-block copy
//! - `probe`: whether the on-block copy is safe to use on this host
//! - `command`: create/list/set/unset built from the above
//!
//! # Usage
//!
//! ```ignore
//! use editenv_core::{command, probe, Config};
//!
//! let config = Config::default();
//! let path = config.default_envblk_path();
//! let placement = probe::resolve_placement(&probe::HostTopology::new(), &config.boot_dir);
//! command::set(&path, &placement, &["saved_entry=1".parse()?])?;
//! ```

pub mod command;
pub mod config;
pub mod envblk;
pub mod error;
pub mod probe;
pub mod store;

pub use command::{Assignment, Command};
pub use config::Config;
pub use envblk::{EnvBlock, Variable};
pub use error::{EditEnvError, EnvBlockError, FormatError, Result};
pub use store::Placement;

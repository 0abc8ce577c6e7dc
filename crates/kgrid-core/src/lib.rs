//! kgrid-core — shared types for kgrid.
//!
//! - **`types`** — grid, cluster and application manifests
//! - **`value`** — credential values that may come from the environment
//! - **`config`** — `kgrid.toml` settings (store path, timeouts, binaries)
//! - **`process`** — bounded subprocess execution shared by every CLI-driven backend

pub mod config;
pub mod process;
pub mod types;
pub mod value;

pub use config::{BinarySettings, ConfigError, Settings, StoreSettings, Timeouts};
pub use process::{CommandSpec, ProcessError};
pub use types::*;
pub use value::{ValueError, ValueFrom, ValueOrValueFrom};

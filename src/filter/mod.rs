//! The script filter stage.
//!
//! # Components
//!
//! - [`codec`]: native readings to and from the engine's object graph
//! - [`binding`]: the loaded script unit, its transform and `set_filter_config`
//! - [`config_channel`]: configuration blob hand-off
//! - [`lifecycle`]: [`ScriptFilter`], its state machine and locking
//!
//! # Data Flow
//!
//! ```text
//! set_script_name ─► configure ─► (per batch) encode ─► invoke ─► decode
//!                                      ▲
//!                    reconfigure ──────┘ (write lock, full rebuild)
//! ```

pub mod binding;
pub mod codec;
pub mod config_channel;
pub mod diagnostics;
pub mod lifecycle;
pub mod script_name;

pub use binding::{ConfigPush, LoadedScript, ScriptBinding, DEFAULT_FILTER_CONFIG_METHOD};
pub use lifecycle::{FilterLock, FilterPhase, ScriptFilter};
pub use script_name::{ScriptName, SCRIPT_METHOD_MARKER};

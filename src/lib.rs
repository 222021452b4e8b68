//! Core library for the script filter stage.
//!
//! This library lets a user script transform sensor readings in flight
//! inside a pipeline filter stage. It loads a script unit by name, converts
//! readings into the scripting engine's object model, calls the script's
//! transform and converts the result back, while the filter can be
//! reconfigured from another thread.
//!
//! # Modules
//!
//! - [`reading`]: native reading records
//! - [`scripting`]: engine-neutral traits and the Rhai, Python and mock backends
//! - [`filter`]: codec, engine binding, configuration channel and lifecycle
//! - [`plugin`]: the surface the pipeline host calls
//! - [`config`]: host configuration categories and process settings
//! - [`error`]: [`FilterError`] and [`AppResult`]
//! - [`logging`]: tracing subscriber bootstrap

pub mod config;
pub mod error;
pub mod filter;
pub mod logging;
pub mod plugin;
pub mod reading;
pub mod scripting;

pub use error::{AppResult, FilterError};
pub use filter::{FilterLock, FilterPhase, ScriptFilter};
pub use plugin::FilterPlugin;
pub use reading::{Datapoint, DatapointValue, Reading};

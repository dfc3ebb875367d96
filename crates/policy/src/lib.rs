//! Launch policy for tool-server subprocesses.
//!
//! Core principle: **launch parameters supplied over the wire are
//! adversarial.** Commands must be allow-listed and arguments and
//! environment checked before anything is handed to process spawn.

mod error;
mod launch;

pub use error::{Error, Result};
pub use launch::{AllowRules, Decision, LaunchPolicy};

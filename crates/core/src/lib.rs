//! Session orchestration core for hostshell.
//!
//! A [`Shell`] drives one login-capture-launch-embed session:
//!
//! 1. The browser view shows the login page while the [`capture`] interceptor
//!    watches responses for the launch credential.
//! 2. Once captured, the client process is started and its window embedded
//!    beneath the host window.
//! 3. Layout changes keep the embedded window on the game region.
//!
//! Every UI command runs through the [`dispatch`] layer and then the session
//! actor, which applies transitions one at a time.

pub mod bounds;
pub mod capture;
pub mod client;
pub mod config;
pub mod dispatch;
mod error;
pub mod session;
mod shell;
pub mod view;

pub use capture::{CaptureOutcome, LaunchCredential, ParseFailure};
pub use config::ShellConfig;
pub use dispatch::{CommandError, CommandFailure};
pub use error::{Result, ShellError};
pub use shell::{Shell, ShellBuilder};
pub use view::{BrowserView, ViewError};

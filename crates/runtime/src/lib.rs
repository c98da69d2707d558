//! Native plumbing for the hostshell session core.
//!
//! * [`bus`]: the contention-tolerant diagnostic bus every command and transition reports to.
//! * [`process`]: spawning, watching, and stopping the external client process.
//! * [`embed`]: attaching the client's top-level window beneath a host window region.
//! * [`testing`]: in-memory window backend for exercising the embedder without a window system.

pub mod bus;
pub mod embed;
mod error;
pub mod process;
pub mod testing;

pub use bus::{BusStats, DiagnosticBus};
pub use embed::{AttachPolicy, EmbeddedWindowHandle, NativeWindow, WindowBackend, WindowEmbedder};
pub use error::{Result, RuntimeError};
pub use process::{ExitInfo, ProcessHandle, ProcessManager};

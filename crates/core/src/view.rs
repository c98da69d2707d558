//! Seam to the host runtime's embedded browser view.

use hs_protocol::LogicalRect;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ViewError(pub String);

/// Browser view owned by the host runtime.
///
/// The session only ever shows, hides, navigates, and lays out the view.
/// Network responses flow the other way, through
/// [`crate::Shell::deliver_response`].
pub trait BrowserView: Send + Sync {
	fn show(&self) -> Result<(), ViewError>;

	fn hide(&self) -> Result<(), ViewError>;

	fn navigate(&self, url: &str) -> Result<(), ViewError>;

	/// Places the view at `rect`, in logical units.
	fn set_bounds(&self, rect: LogicalRect) -> Result<(), ViewError>;
}

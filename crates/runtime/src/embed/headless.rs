use hs_protocol::PhysicalRect;

use super::{NativeWindow, WindowBackend};
use crate::error::{Result, RuntimeError};

/// Backend for platforms without a supported window system.
///
/// It never finds a client window, so every attach ends in `AttachFailed`
/// once the retry budget runs out.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessBackend;

impl WindowBackend for HeadlessBackend {
	fn find_process_window(&self, _pid: u32) -> Option<NativeWindow> {
		None
	}

	fn reparent(&self, _child: NativeWindow, _host: NativeWindow) -> Result<isize> {
		Err(RuntimeError::Backend("window embedding is not supported on this platform".to_string()))
	}

	fn restore(&self, _child: NativeWindow, _saved_style: isize) {}

	fn is_window(&self, _window: NativeWindow) -> bool {
		false
	}

	fn move_window(&self, _window: NativeWindow, _rect: PhysicalRect) {}

	fn bring_to_top(&self, _window: NativeWindow) {}
}

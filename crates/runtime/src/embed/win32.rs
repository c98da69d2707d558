use std::ffi::c_void;

use hs_protocol::PhysicalRect;
use windows::Win32::Foundation::{HWND, LPARAM};
use windows::Win32::UI::WindowsAndMessaging::{
	EnumWindows, GW_OWNER, GWL_STYLE, GetWindow, GetWindowLongPtrW, GetWindowThreadProcessId, HWND_TOP, IsWindow, IsWindowVisible, MoveWindow,
	SWP_FRAMECHANGED, SWP_NOMOVE, SWP_NOSIZE, SWP_NOZORDER, SWP_SHOWWINDOW, SetParent, SetWindowLongPtrW, SetWindowPos, WS_CHILD, WS_OVERLAPPEDWINDOW,
	WS_POPUP, WS_VISIBLE,
};
use windows::core::BOOL;

use super::{NativeWindow, WindowBackend};
use crate::error::{Result, RuntimeError};

/// Embeds windows with `SetParent` and child window styles.
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32Backend;

fn hwnd(window: NativeWindow) -> HWND {
	HWND(window.0 as *mut c_void)
}

struct Search {
	pid: u32,
	found: Option<HWND>,
	fallback: Option<HWND>,
}

unsafe extern "system" fn visit_window(window: HWND, lparam: LPARAM) -> BOOL {
	// SAFETY: `lparam` is the `Search` owned by `find_process_window` for the
	// duration of the enclosing `EnumWindows` call.
	let search = unsafe { &mut *(lparam.0 as *mut Search) };
	let mut owner_pid = 0u32;
	unsafe { GetWindowThreadProcessId(window, Some(&mut owner_pid)) };
	if owner_pid != search.pid {
		return BOOL(1);
	}
	let unowned = unsafe { GetWindow(window, GW_OWNER) }.map_or(true, |owner| owner.0.is_null());
	if !unowned {
		return BOOL(1);
	}
	if unsafe { IsWindowVisible(window) }.as_bool() {
		search.found = Some(window);
		return BOOL(0);
	}
	search.fallback.get_or_insert(window);
	BOOL(1)
}

impl WindowBackend for Win32Backend {
	fn find_process_window(&self, pid: u32) -> Option<NativeWindow> {
		let mut search = Search { pid, found: None, fallback: None };
		// EnumWindows reports an error when the callback stops early; that is the success path here.
		let _ = unsafe { EnumWindows(Some(visit_window), LPARAM(&mut search as *mut Search as isize)) };
		search.found.or(search.fallback).map(|window| NativeWindow(window.0 as isize))
	}

	fn reparent(&self, child: NativeWindow, host: NativeWindow) -> Result<isize> {
		let child = hwnd(child);
		unsafe {
			let saved_style = GetWindowLongPtrW(child, GWL_STYLE);
			let mut style = saved_style;
			style &= !(WS_OVERLAPPEDWINDOW.0 as isize | WS_POPUP.0 as isize);
			style |= (WS_CHILD.0 | WS_VISIBLE.0) as isize;
			// A null previous parent with no last-error set is not a failure.
			if let Err(err) = SetParent(child, Some(hwnd(host))) {
				if err.code().is_err() {
					return Err(RuntimeError::Backend(format!("SetParent failed: {err}")));
				}
			}
			SetWindowLongPtrW(child, GWL_STYLE, style);
			let _ = SetWindowPos(child, None, 0, 0, 1, 1, SWP_FRAMECHANGED | SWP_NOZORDER | SWP_SHOWWINDOW);
			Ok(saved_style)
		}
	}

	fn restore(&self, child: NativeWindow, saved_style: isize) {
		let child = hwnd(child);
		unsafe {
			let _ = SetParent(child, None);
			SetWindowLongPtrW(child, GWL_STYLE, saved_style);
			let _ = SetWindowPos(child, None, 0, 0, 1, 1, SWP_FRAMECHANGED | SWP_NOZORDER | SWP_SHOWWINDOW);
		}
	}

	fn is_window(&self, window: NativeWindow) -> bool {
		unsafe { IsWindow(Some(hwnd(window))) }.as_bool()
	}

	fn move_window(&self, window: NativeWindow, rect: PhysicalRect) {
		let _ = unsafe { MoveWindow(hwnd(window), rect.x, rect.y, rect.w, rect.h, true) };
	}

	fn bring_to_top(&self, window: NativeWindow) {
		let _ = unsafe {
			SetWindowPos(
				hwnd(window),
				Some(HWND_TOP),
				0,
				0,
				0,
				0,
				SWP_FRAMECHANGED | SWP_SHOWWINDOW | SWP_NOMOVE | SWP_NOSIZE,
			)
		};
	}
}

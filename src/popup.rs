use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{LinkError, Result};

/// A top-level browser window as seen from the window that opened it.
pub trait PopupWindow: Send + Sync {
    fn is_closed(&self) -> bool;
    fn close(&self);
}

/// Host capability to open popups. `None` means the browser blocked it.
pub trait PopupOpener: Send + Sync {
    fn open(&self, url: &str, name: &str, features: &PopupFeatures)
        -> Option<Arc<dyn PopupWindow>>;

    fn screen(&self) -> ScreenArea {
        ScreenArea::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenArea {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Default for ScreenArea {
    fn default() -> Self {
        Self {
            left: 0,
            top: 0,
            width: 1920,
            height: 1080,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupFeatures {
    pub width: u32,
    pub height: u32,
    pub left: i32,
    pub top: i32,
}

impl PopupFeatures {
    /// Centers a `width` x `height` window on `screen`, clamped to its edges.
    pub fn centered(screen: ScreenArea, width: u32, height: u32) -> Self {
        let offset = |outer: u32, inner: u32| (i64::from(outer) - i64::from(inner)).max(0) / 2;
        let left = i64::from(screen.left) + offset(screen.width, width);
        let top = i64::from(screen.top) + offset(screen.height, height);
        Self {
            width,
            height,
            left: i32::try_from(left).unwrap_or(i32::MAX),
            top: i32::try_from(top).unwrap_or(i32::MAX),
        }
    }
}

impl fmt::Display for PopupFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "width={},height={},left={},top={},toolbar=no,menubar=no,location=yes,resizable=yes,scrollbars=yes",
            self.width, self.height, self.left, self.top
        )
    }
}

/// Owned handle to an opened popup. Only the reconciler's cleanup closes it.
pub struct PopupHandle {
    window: Arc<dyn PopupWindow>,
    close_requested: AtomicBool,
}

impl PopupHandle {
    pub fn new(window: Arc<dyn PopupWindow>) -> Self {
        Self {
            window,
            close_requested: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.window.is_closed()
    }

    /// Idempotent: closing a closed window, or closing twice, does nothing.
    pub fn close(&self) {
        if self.window.is_closed() {
            return;
        }
        if self.close_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        self.window.close();
    }
}

impl fmt::Debug for PopupHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PopupHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}

pub struct PopupController {
    opener: Arc<dyn PopupOpener>,
    width: u32,
    height: u32,
}

impl PopupController {
    pub fn new(opener: Arc<dyn PopupOpener>, width: u32, height: u32) -> Self {
        Self {
            opener,
            width,
            height,
        }
    }

    pub fn open(&self, auth_url: &str, title: &str) -> Result<PopupHandle> {
        let features = PopupFeatures::centered(self.opener.screen(), self.width, self.height);
        match self.opener.open(auth_url, title, &features) {
            Some(window) => {
                log::info!("[popup] opened title={title} features={features}");
                Ok(PopupHandle::new(window))
            }
            None => {
                log::warn!("[popup] blocked by the browser title={title}");
                Err(LinkError::PopupBlocked)
            }
        }
    }
}

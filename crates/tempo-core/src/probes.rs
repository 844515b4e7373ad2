//! Platform probe interfaces.
//!
//! The OS-specific mechanics of reading the active window, idle time,
//! and the screen are external collaborators; the tracker only depends
//! on these traits. Implementations must absorb platform failures:
//! a failed window probe reports no window, a failed idle probe reports
//! zero idle seconds, and a failed screenshot returns an error that the
//! caller logs and degrades on.

use std::io;
use std::path::Path;

/// Active window metadata at capture time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub app_name: String,
    pub title: String,
    pub bundle_id: Option<String>,
    pub pid: Option<i32>,
}

/// Reports the currently focused window, or `None` when no window is
/// available (no focus, permission denied, probe failure).
pub trait WindowProbe {
    fn active_window(&self) -> Option<WindowInfo>;
}

/// Reports seconds since the last user input. Unsupported platforms
/// and probe failures report 0 (assume active).
pub trait IdleProbe {
    fn idle_seconds(&self) -> u64;
}

/// Captures the screen to the given path.
pub trait ScreenshotProbe {
    fn capture(&self, dest: &Path) -> io::Result<()>;
}

//! Platform probe wiring.
//!
//! The OS backends for window focus, input idle time, and screen
//! capture are platform-specific and plug in behind the `tempo-core`
//! probe traits. On platforms without a backend the probes degrade:
//! no active window, zero idle seconds, screenshot unsupported. The
//! tracker keeps running, it just skips capture cycles.

use std::io;
use std::path::Path;

use tempo_core::{IdleProbe, ScreenshotProbe, WindowInfo, WindowProbe};

/// Probes backed by whatever the current platform supports.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbes;

impl SystemProbes {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl WindowProbe for SystemProbes {
    fn active_window(&self) -> Option<WindowInfo> {
        tracing::debug!("no window probe backend on this platform");
        None
    }
}

impl IdleProbe for SystemProbes {
    fn idle_seconds(&self) -> u64 {
        0
    }
}

impl ScreenshotProbe for SystemProbes {
    fn capture(&self, _dest: &Path) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "no screenshot backend on this platform",
        ))
    }
}

#[cfg(windows)]
use std::os::windows::process::CommandExt;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x08000000;

/// Extension trait for helper processes spawned by the installer
/// (install profile processors).
pub trait HopperCommandExt {
    /// Hides the console window on Windows. No-op on other platforms.
    fn suppress_console(&mut self) -> &mut Self;
}

impl HopperCommandExt for tokio::process::Command {
    fn suppress_console(&mut self) -> &mut Self {
        #[cfg(windows)]
        {
            self.creation_flags(CREATE_NO_WINDOW);
        }
        self
    }
}

/// Platform classpath separator for `java -cp`.
pub fn classpath_separator() -> &'static str {
    if cfg!(windows) {
        ";"
    } else {
        ":"
    }
}

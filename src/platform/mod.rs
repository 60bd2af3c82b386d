use std::path::{Path, PathBuf};

/// Platform-specific operations abstracted behind a common interface.
/// Each OS provides its own `NativePlatform` implementation so call sites
/// remain free of `#[cfg]` blocks.
pub trait Platform {
    /// Set restrictive *directory* permissions (0o700 on Unix, no-op on Windows).
    fn restrict_dir_permissions(path: &Path);

    /// Set restrictive *file* permissions (0o600 on Unix, no-op on Windows).
    fn restrict_file_permissions(path: &Path);

    /// Root data directory for the control core.
    /// Unix: `~/.clipforge`, Windows: `%APPDATA%\clipforge`.
    fn data_dir() -> PathBuf;
}

/// Honor `CLIPFORGE_DATA_DIR` before falling back to the platform default.
fn resolve_data_dir(default: PathBuf) -> PathBuf {
    std::env::var("CLIPFORGE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or(default)
}

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::NativePlatform;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::NativePlatform;

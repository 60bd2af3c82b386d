use std::path::{Path, PathBuf};

use super::{Platform, resolve_data_dir};

pub struct NativePlatform;

impl Platform for NativePlatform {
    fn restrict_dir_permissions(_path: &Path) {
        // NTFS ACLs inherit from the profile directory; nothing to tighten here.
    }

    fn restrict_file_permissions(_path: &Path) {}

    fn data_dir() -> PathBuf {
        resolve_data_dir(
            dirs::data_dir()
                .expect("Could not find AppData directory")
                .join("clipforge"),
        )
    }
}

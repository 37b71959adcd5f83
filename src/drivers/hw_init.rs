//! One-shot platform initialization: flash filesystem and local timezone.
//!
//! Called once from `main()` before the configuration is read, since the
//! config file itself lives on the flash partition.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

use crate::error::HwSetupError;

/// VFS mount point of the SPIFFS data partition.
pub const FLASH_MOUNT: &str = "/flash";

#[cfg(target_os = "espidf")]
pub fn mount_flash() -> Result<(), HwSetupError> {
    let conf = esp_vfs_spiffs_conf_t {
        base_path: b"/flash\0".as_ptr() as *const _,
        partition_label: core::ptr::null(),
        max_files: 4,
        format_if_mount_failed: true,
    };
    // SAFETY: called once from main() before any file access.
    let ret = unsafe { esp_vfs_spiffs_register(&conf) };
    if ret != ESP_OK {
        return Err(HwSetupError::FilesystemMountFailed(ret));
    }
    log::info!("hw_init: SPIFFS mounted at {}", FLASH_MOUNT);
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn mount_flash() -> Result<(), HwSetupError> {
    log::info!("hw_init(sim): flash mount skipped");
    Ok(())
}

/// Apply a POSIX TZ string (e.g. `CET-1CEST,M3.5.0,M10.5.0/3`) to
/// `localtime_r`.
#[cfg(target_os = "espidf")]
pub fn set_timezone(tz: &str) {
    let Ok(value) = std::ffi::CString::new(tz) else {
        log::warn!("hw_init: timezone contains NUL, keeping UTC");
        return;
    };
    // SAFETY: single-threaded init path; nothing reads TZ concurrently.
    unsafe {
        setenv(b"TZ\0".as_ptr() as *const _, value.as_ptr(), 1);
        tzset();
    }
    log::info!("hw_init: timezone set to {}", tz);
}

#[cfg(not(target_os = "espidf"))]
pub fn set_timezone(tz: &str) {
    log::info!("hw_init(sim): timezone {} ignored, host zone in use", tz);
}

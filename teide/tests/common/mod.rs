use teide::{create_headless_device, DevicePtr, DeviceSettings};

/// Creates a headless test device, preferring a software implementation.
/// Returns `None` (and the test passes vacuously) when no Vulkan
/// implementation is available on the machine.
pub fn test_device() -> Option<DevicePtr> {
    let _ = env_logger::builder().is_test(true).try_init();
    teide::enable_software_rendering();
    match create_headless_device(&DeviceSettings { num_threads: 2 }) {
        Ok(device) => Some(device),
        Err(e) => {
            eprintln!("skipping test: no usable Vulkan device ({e})");
            None
        }
    }
}

//! Vulkan backing for the runtime: instance and device bootstrap plus the
//! resource, surface, renderer and graph implementations.

pub mod buffer;
pub mod command_buffer;
pub mod device;
pub mod graph;
pub mod memory;
pub mod mesh;
pub mod parameter_block;
pub mod pipeline;
pub mod render_pass;
pub mod renderer;
pub mod shader;
pub mod surface;
pub mod texture;

use std::ffi::CStr;
use std::sync::atomic::{AtomicBool, Ordering};

use ash::vk;
use log::info;

use crate::error::{Error, Result};

static SOFTWARE_RENDERING: AtomicBool = AtomicBool::new(false);

/// Makes subsequent device creation prefer a CPU (software) physical device.
pub fn enable_software_rendering() {
    SOFTWARE_RENDERING.store(true, Ordering::Release);
}

pub(crate) fn software_rendering_enabled() -> bool {
    SOFTWARE_RENDERING.load(Ordering::Acquire)
}

/// Returns validation layer names to enable if validation is requested
/// (feature or TEIDE_VALIDATION=1).
#[cfg(feature = "validation")]
fn validation_layer_names(entry: &ash::Entry) -> Vec<&'static CStr> {
    let disabled =
        std::env::var("TEIDE_VALIDATION").is_ok_and(|v| v == "0" || v.eq_ignore_ascii_case("false"));
    if disabled {
        return vec![];
    }
    const KHRONOS: &CStr = c"VK_LAYER_KHRONOS_validation";
    let layers = match unsafe { entry.enumerate_instance_layer_properties() } {
        Ok(layers) => layers,
        Err(_) => return vec![],
    };
    for prop in &layers {
        let name = unsafe { CStr::from_ptr(prop.layer_name.as_ptr()) };
        if name == KHRONOS {
            return vec![KHRONOS];
        }
    }
    vec![]
}

#[cfg(not(feature = "validation"))]
fn validation_layer_names(_entry: &ash::Entry) -> Vec<&'static CStr> {
    if std::env::var("TEIDE_VALIDATION").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true")) {
        log::warn!("TEIDE_VALIDATION=1 set but teide built without the 'validation' feature");
    }
    vec![]
}

pub(crate) fn create_instance(entry: &ash::Entry, extensions: &[*const std::ffi::c_char]) -> Result<ash::Instance> {
    let app_name = c"Teide";
    let app_info = vk::ApplicationInfo::default()
        .api_version(vk::API_VERSION_1_0)
        .application_name(app_name)
        .engine_name(app_name);

    let layer_names = validation_layer_names(entry);
    let layer_ptrs: Vec<*const std::ffi::c_char> = layer_names.iter().map(|name| name.as_ptr()).collect();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(extensions)
        .enabled_layer_names(&layer_ptrs);

    unsafe {
        entry
            .create_instance(&create_info, None)
            .map_err(|e| Error::DeviceCreation(format!("failed to create instance: {e}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics_family: u32,
    pub present_family: Option<u32>,
}

/// The selected physical device with its cached properties.
pub struct PhysicalDeviceInfo {
    pub physical_device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: QueueFamilies,
}

fn find_queue_families(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    surface: Option<(&ash::khr::surface::Instance, vk::SurfaceKHR)>,
) -> Option<QueueFamilies> {
    let queue_families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    let mut graphics_family = None;
    let mut present_family = None;
    for (i, family) in queue_families.iter().enumerate() {
        if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && graphics_family.is_none() {
            graphics_family = Some(i as u32);
        }
        if let Some((loader, surface)) = surface {
            let supported = unsafe {
                loader
                    .get_physical_device_surface_support(physical_device, i as u32, surface)
                    .unwrap_or(false)
            };
            if supported && present_family.is_none() {
                present_family = Some(i as u32);
            }
        }
    }

    let graphics_family = graphics_family?;
    if surface.is_some() && present_family.is_none() {
        return None;
    }
    Some(QueueFamilies { graphics_family, present_family })
}

/// Total preference order over device types; lower ranks first. The
/// software-rendering flag flips CPU devices to the front.
fn device_type_rank(device_type: vk::PhysicalDeviceType) -> u32 {
    let prefer_cpu = software_rendering_enabled();
    match device_type {
        vk::PhysicalDeviceType::CPU if prefer_cpu => 0,
        vk::PhysicalDeviceType::DISCRETE_GPU => 1,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 2,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 3,
        vk::PhysicalDeviceType::CPU => 4,
        _ => 5,
    }
}

/// Picks the most preferred physical device that supports the required
/// extensions and queue families.
pub(crate) fn find_physical_device(
    instance: &ash::Instance,
    surface: Option<(&ash::khr::surface::Instance, vk::SurfaceKHR)>,
    required_extensions: &[&CStr],
) -> Result<PhysicalDeviceInfo> {
    let mut physical_devices = unsafe {
        instance
            .enumerate_physical_devices()
            .map_err(|e| Error::DeviceCreation(format!("failed to enumerate devices: {e}")))?
    };
    if physical_devices.is_empty() {
        return Err(Error::DeviceCreation("no GPU found".into()));
    }

    physical_devices.sort_by_key(|&device| {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        device_type_rank(properties.device_type)
    });

    let selected = physical_devices.into_iter().find_map(|device| {
        let supported = unsafe { instance.enumerate_device_extension_properties(device) }.ok()?;
        let supports_all = required_extensions.iter().all(|&required| {
            supported
                .iter()
                .any(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) } == required)
        });
        if !supports_all {
            return None;
        }
        // Samplers may enable anisotropic filtering, so the feature must be
        // present on any device we pick.
        let features = unsafe { instance.get_physical_device_features(device) };
        if features.sampler_anisotropy == vk::FALSE {
            return None;
        }
        let queue_families = find_queue_families(instance, device, surface)?;
        Some((device, queue_families))
    });

    let (physical_device, queue_families) =
        selected.ok_or_else(|| Error::DeviceCreation("no suitable GPU found".into()))?;

    let properties = unsafe { instance.get_physical_device_properties(physical_device) };
    let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) };
    info!("Selected physical device: {}", device_name.to_string_lossy());

    let memory_properties = unsafe { instance.get_physical_device_memory_properties(physical_device) };
    Ok(PhysicalDeviceInfo { physical_device, properties, memory_properties, queue_families })
}

/// Creates the logical device with one queue per distinct family.
pub(crate) fn create_logical_device(
    instance: &ash::Instance,
    physical_device: &PhysicalDeviceInfo,
    extensions: &[&CStr],
) -> Result<ash::Device> {
    let mut family_indices = vec![physical_device.queue_families.graphics_family];
    if let Some(present) = physical_device.queue_families.present_family {
        if !family_indices.contains(&present) {
            family_indices.push(present);
        }
    }

    let queue_priorities = [1.0f32];
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = family_indices
        .iter()
        .map(|&index| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(index)
                .queue_priorities(&queue_priorities)
        })
        .collect();

    let extension_ptrs: Vec<*const std::ffi::c_char> = extensions.iter().map(|ext| ext.as_ptr()).collect();
    let enabled_features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);
    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_ptrs)
        .enabled_features(&enabled_features);

    unsafe {
        instance
            .create_device(physical_device.physical_device, &create_info, None)
            .map_err(|e| Error::DeviceCreation(format!("failed to create device: {e}")))
    }
}

// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation with validation layers
// - Surface creation (via ash-window, platform-independent)
// - Physical device selection (graphics + present queues, required extensions)
// - Logical device + queue creation

use ash::{vk, Entry};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::{CStr, CString};
use std::sync::Arc;

use super::error::{RenderError, RenderResult};
use super::swapchain::SwapchainSupport;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Device extensions every candidate must support
fn required_device_extensions() -> [&'static CStr; 1] {
    [ash::extensions::khr::Swapchain::name()]
}

/// Queue family assignment for a selected device.
///
/// Graphics and present may resolve to the same family index; the logical
/// device then only requests a single queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

/// Partial result of the queue family search
#[derive(Debug, Clone, Copy, Default)]
struct QueueFamilyIndices {
    graphics: Option<u32>,
    present: Option<u32>,
}

impl QueueFamilyIndices {
    fn complete(self) -> Option<QueueFamilies> {
        Some(QueueFamilies {
            graphics: self.graphics?,
            present: self.present?,
        })
    }
}

/// Everything the selection predicate needs to know about one candidate.
///
/// Kept as plain data so the tie-break logic can be exercised without a GPU.
#[derive(Debug, Clone)]
pub(crate) struct CandidateReport {
    pub queue_families: Option<QueueFamilies>,
    pub extensions_supported: bool,
    pub has_surface_formats: bool,
    pub has_present_modes: bool,
    pub discrete: bool,
}

impl CandidateReport {
    fn suitable(&self) -> bool {
        self.queue_families.is_some()
            && self.extensions_supported
            && self.has_surface_formats
            && self.has_present_modes
    }
}

/// Pick one candidate: first suitable device, upgraded to the first suitable
/// discrete device if one appears later in the list.
///
/// The discrete preference is a heuristic, not a measured choice.
fn select_candidate(reports: &[CandidateReport]) -> Option<usize> {
    let mut best: Option<usize> = None;

    for (i, report) in reports.iter().enumerate() {
        if !report.suitable() {
            continue;
        }
        match best {
            None => best = Some(i),
            Some(b) => {
                if report.discrete && !reports[b].discrete {
                    best = Some(i);
                }
            }
        }
    }

    best
}

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    // Vulkan handles (order matters for drop!)
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub surface: vk::SurfaceKHR,
    pub surface_loader: ash::extensions::khr::Surface,
    pub instance: ash::Instance,
    _entry: Entry,

    // Queue handles
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub queue_families: QueueFamilies,

    // Debug utils messenger (validation output routed to the log crate)
    debug_utils: (ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT),

    // Device properties (cached)
    pub properties: vk::PhysicalDeviceProperties,
}

impl VulkanDevice {
    /// Create the Vulkan instance, surface, and logical device.
    ///
    /// # Arguments
    /// * `app_name` - Application name reported to the driver
    /// * `display_handle` / `window_handle` - Raw handles of the target window
    pub fn new(
        app_name: &str,
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
    ) -> RenderResult<Arc<Self>> {
        log::info!("Creating Vulkan device: {}", app_name);

        // Step 1: Load Vulkan library
        let entry = unsafe { Entry::load() }?;

        // Step 2: Create instance
        let instance = Self::create_instance(&entry, app_name, display_handle)?;

        // Step 3: Register the debug messenger (always on)
        let debug_utils = Self::setup_debug_messenger(&entry, &instance)?;

        // Step 4: Create the presentation surface
        let surface_loader = ash::extensions::khr::Surface::new(&entry, &instance);
        let surface = unsafe {
            ash_window::create_surface(&entry, &instance, display_handle, window_handle, None)
        }?;

        // Step 5: Pick physical device (needs the surface for present support)
        let (physical_device, queue_families) =
            Self::pick_physical_device(&instance, &surface_loader, surface)?;

        // Step 6: Create logical device and fetch the queues
        let (device, graphics_queue, present_queue) =
            Self::create_logical_device(&instance, physical_device, queue_families)?;

        // Step 7: Cache device properties
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };

        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );

        Ok(Arc::new(Self {
            device,
            physical_device,
            surface,
            surface_loader,
            instance,
            _entry: entry,
            graphics_queue,
            present_queue,
            queue_families,
            debug_utils,
            properties,
        }))
    }

    fn create_instance(
        entry: &Entry,
        app_name: &str,
        display_handle: RawDisplayHandle,
    ) -> RenderResult<ash::Instance> {
        let app_name_cstr = CString::new(app_name).unwrap_or_default();
        let engine_name = CString::new("No Engine").unwrap_or_default();

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        // Surface extensions for the running platform, plus debug utils
        let mut extensions = ash_window::enumerate_required_extensions(display_handle)?.to_vec();
        extensions.push(ash::extensions::ext::DebugUtils::name().as_ptr());

        // Enable the validation layer only when the loader actually has it
        let available_layers = unsafe { entry.enumerate_instance_layer_properties() }?;
        let validation_available = available_layers
            .iter()
            .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER);

        let layer_names = if validation_available {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            log::warn!("Validation layer not available, continuing without it");
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }?;

        Ok(instance)
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> RenderResult<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ash::extensions::ext::DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }?;

        Ok((debug_utils, messenger))
    }

    /// Find the queue families we need on one device.
    ///
    /// Graphics and present are searched independently; the first matching
    /// family wins for each, and they may coincide.
    fn find_queue_families(
        instance: &ash::Instance,
        surface_loader: &ash::extensions::khr::Surface,
        surface: vk::SurfaceKHR,
        device: vk::PhysicalDevice,
    ) -> RenderResult<QueueFamilyIndices> {
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(device) };

        let mut indices = QueueFamilyIndices::default();

        for (i, family) in queue_families.iter().enumerate() {
            let i = i as u32;

            if indices.graphics.is_none()
                && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            {
                indices.graphics = Some(i);
            }

            let present_support = unsafe {
                surface_loader.get_physical_device_surface_support(device, i, surface)
            }?;
            if indices.present.is_none() && present_support {
                indices.present = Some(i);
            }
        }

        Ok(indices)
    }

    fn check_device_extensions(
        instance: &ash::Instance,
        device: vk::PhysicalDevice,
    ) -> RenderResult<bool> {
        let available = unsafe { instance.enumerate_device_extension_properties(device) }?;

        let all_found = required_device_extensions().iter().all(|required| {
            available
                .iter()
                .any(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) } == *required)
        });

        Ok(all_found)
    }

    fn survey_device(
        instance: &ash::Instance,
        surface_loader: &ash::extensions::khr::Surface,
        surface: vk::SurfaceKHR,
        device: vk::PhysicalDevice,
    ) -> RenderResult<CandidateReport> {
        let props = unsafe { instance.get_physical_device_properties(device) };

        let queue_families =
            Self::find_queue_families(instance, surface_loader, surface, device)?.complete();
        let extensions_supported = Self::check_device_extensions(instance, device)?;

        // Only query swapchain support once the extension is known to exist
        let (has_surface_formats, has_present_modes) = if extensions_supported {
            let support = SwapchainSupport::query(surface_loader, device, surface)?;
            (!support.formats.is_empty(), !support.present_modes.is_empty())
        } else {
            (false, false)
        };

        Ok(CandidateReport {
            queue_families,
            extensions_supported,
            has_surface_formats,
            has_present_modes,
            discrete: props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU,
        })
    }

    fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &ash::extensions::khr::Surface,
        surface: vk::SurfaceKHR,
    ) -> RenderResult<(vk::PhysicalDevice, QueueFamilies)> {
        let devices = unsafe { instance.enumerate_physical_devices() }?;

        let reports = devices
            .iter()
            .map(|&device| Self::survey_device(instance, surface_loader, surface, device))
            .collect::<RenderResult<Vec<_>>>()?;

        let chosen = select_candidate(&reports).ok_or(RenderError::NoSuitableDevice)?;
        let families = reports[chosen]
            .queue_families
            .ok_or(RenderError::NoSuitableDevice)?;

        Ok((devices[chosen], families))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_families: QueueFamilies,
    ) -> RenderResult<(ash::Device, vk::Queue, vk::Queue)> {
        let queue_priorities = [1.0];

        // One queue per distinct family - graphics and present usually share
        let mut unique_families = vec![queue_families.graphics];
        if queue_families.present != queue_families.graphics {
            unique_families.push(queue_families.present);
        }

        let queue_create_infos: Vec<_> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let extensions: Vec<_> = required_device_extensions()
            .iter()
            .map(|ext| ext.as_ptr())
            .collect();

        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .map_err(RenderError::DeviceCreationFailed)?;

        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(queue_families.present, 0) };

        Ok((device, graphics_queue, present_queue))
    }

    /// Wait for the device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> RenderResult<()> {
        unsafe { self.device.device_wait_idle() }?;
        Ok(())
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        // Wait for device to finish
        let _ = self.wait_idle();

        // Cleanup in reverse order
        unsafe {
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            self.debug_utils
                .0
                .destroy_debug_utils_messenger(self.debug_utils.1, None);
            self.instance.destroy_instance(None);
        }
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suitable(discrete: bool) -> CandidateReport {
        CandidateReport {
            queue_families: Some(QueueFamilies {
                graphics: 0,
                present: 0,
            }),
            extensions_supported: true,
            has_surface_formats: true,
            has_present_modes: true,
            discrete,
        }
    }

    #[test]
    fn prefers_discrete_regardless_of_order() {
        let integrated_first = [suitable(false), suitable(true)];
        let discrete_first = [suitable(true), suitable(false)];

        assert_eq!(select_candidate(&integrated_first), Some(1));
        assert_eq!(select_candidate(&discrete_first), Some(0));
    }

    #[test]
    fn keeps_first_suitable_when_no_discrete() {
        let reports = [suitable(false), suitable(false)];
        assert_eq!(select_candidate(&reports), Some(0));
    }

    #[test]
    fn rejects_candidate_without_present_support() {
        let mut report = suitable(true);
        report.queue_families = None; // graphics found, present missing
        assert_eq!(select_candidate(&[report]), None);
    }

    #[test]
    fn rejects_candidate_missing_extensions_or_formats() {
        let mut no_ext = suitable(true);
        no_ext.extensions_supported = false;

        let mut no_formats = suitable(true);
        no_formats.has_surface_formats = false;

        let mut no_modes = suitable(true);
        no_modes.has_present_modes = false;

        assert_eq!(select_candidate(&[no_ext, no_formats, no_modes]), None);
    }

    #[test]
    fn empty_candidate_list_selects_nothing() {
        assert_eq!(select_candidate(&[]), None);
    }

    #[test]
    fn queue_family_indices_complete_requires_both() {
        let both = QueueFamilyIndices {
            graphics: Some(0),
            present: Some(2),
        };
        assert_eq!(
            both.complete(),
            Some(QueueFamilies {
                graphics: 0,
                present: 2
            })
        );

        let graphics_only = QueueFamilyIndices {
            graphics: Some(0),
            present: None,
        };
        assert_eq!(graphics_only.complete(), None);
    }
}

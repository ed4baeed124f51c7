// SPDX-License-Identifier: CEPL-1.0
//! Instance, surface and logical-device bootstrap. Everything here is created
//! once at startup and survives every swapchain rebuild.
use anyhow::{Context, Result};
use ash::ext::debug_utils;
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use std::ffi::{c_char, CStr};
use tracing::{debug, error, info, trace, warn};

use crate::error::{SetupContext, VkError};

const APP_NAME: &CStr = c"quad";
const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Queue family slots, each unset until a family qualifies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueIndices {
    pub graphics: Option<u32>,
    pub presentation: Option<u32>,
}

impl QueueIndices {
    /// Walks families in order and stops as soon as both roles are filled.
    pub fn resolve(
        families: &[vk::QueueFamilyProperties],
        mut presents: impl FnMut(u32) -> bool,
    ) -> Self {
        let mut indices = Self::default();
        for (i, family) in families.iter().enumerate() {
            let i = i as u32;
            if family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                indices.graphics = Some(i);
            }
            if presents(i) {
                indices.presentation = Some(i);
            }
            if indices.is_complete() {
                break;
            }
        }
        indices
    }

    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.presentation.is_some()
    }

    pub fn complete(&self) -> Option<QueueFamilies> {
        Some(QueueFamilies {
            graphics: self.graphics?,
            presentation: self.presentation?,
        })
    }
}

/// Resolved families; fixed for the life of the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub presentation: u32,
}

impl QueueFamilies {
    /// Sorted, deduplicated family list (one queue is created per entry).
    pub fn unique(&self) -> Vec<u32> {
        let mut list = vec![self.graphics, self.presentation];
        list.sort_unstable();
        list.dedup();
        list
    }

    /// Images are shared concurrently only when two distinct families touch them.
    pub fn sharing(&self) -> (vk::SharingMode, Vec<u32>) {
        if self.graphics == self.presentation {
            (vk::SharingMode::EXCLUSIVE, Vec::new())
        } else {
            (vk::SharingMode::CONCURRENT, self.unique())
        }
    }
}

/// Instance-level objects created so far, destroyed newest-first on drop
/// unless the bootstrap got far enough to hand them to a `Gpu`.
#[derive(Default)]
struct Unwind {
    steps: Vec<(&'static str, Box<dyn FnOnce()>)>,
}

impl Unwind {
    fn push(&mut self, what: &'static str, destroy: impl FnOnce() + 'static) {
        self.steps.push((what, Box::new(destroy)));
    }

    fn disarm(mut self) {
        self.steps.clear();
    }
}

impl Drop for Unwind {
    fn drop(&mut self) {
        while let Some((what, destroy)) = self.steps.pop() {
            debug!("bootstrap failed: destroying {what}");
            destroy();
        }
    }
}

/// The opened device and everything it hangs off. Components borrow this
/// read-only; only `Drop` tears it down.
pub struct Gpu {
    _entry: Entry,
    pub instance: Instance,
    debug: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    pub surface_loader: surface::Instance,
    pub surface: vk::SurfaceKHR,
    pub phys: vk::PhysicalDevice,
    pub device: ash::Device,
    pub swapchain_loader: swapchain::Device,
    pub families: QueueFamilies,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    memory: vk::PhysicalDeviceMemoryProperties,
}

impl Gpu {
    // ORDER: instance -> surface (from this instance) -> physical device
    // queried against this surface -> logical device.
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        validation: bool,
    ) -> Result<Self> {
        let dh = display.display_handle().context("display_handle")?.as_raw();
        let wh = window.window_handle().context("window_handle")?.as_raw();

        let entry = unsafe { Entry::load() }.context("load Vulkan loader")?;
        let validation = validation && unsafe { has_validation_layer(&entry) };
        if !validation {
            debug!("validation layer disabled or unavailable");
        }

        let instance = unsafe { create_instance(&entry, dh, validation)? };
        let mut unwind = Unwind::default();
        let inst = instance.clone();
        unwind.push("instance", move || unsafe { inst.destroy_instance(None) });

        let debug = if validation {
            let (loader, messenger) = unsafe { create_debug_messenger(&entry, &instance)? };
            let l = loader.clone();
            unwind.push("debug messenger", move || unsafe {
                l.destroy_debug_utils_messenger(messenger, None)
            });
            Some((loader, messenger))
        } else {
            None
        };

        let surface_loader = surface::Instance::new(&entry, &instance);
        let surface = unsafe { ash_window::create_surface(&entry, &instance, dh, wh, None) }
            .context("ash_window::create_surface")?;
        let l = surface_loader.clone();
        unwind.push("surface", move || unsafe { l.destroy_surface(surface, None) });

        let (phys, families) =
            unsafe { pick_physical_device(&instance, &surface_loader, surface)? };
        let device = unsafe { create_device(&instance, phys, families)? };
        // `Gpu`'s own Drop owns these from here on.
        unwind.disarm();

        let graphics_queue = unsafe { device.get_device_queue(families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(families.presentation, 0) };
        let swapchain_loader = swapchain::Device::new(&instance, &device);
        let memory = unsafe { instance.get_physical_device_memory_properties(phys) };

        Ok(Self {
            _entry: entry,
            instance,
            debug,
            surface_loader,
            surface,
            phys,
            device,
            swapchain_loader,
            families,
            graphics_queue,
            present_queue,
            memory,
        })
    }

    pub fn wait_idle(&self) -> Result<(), VkError> {
        unsafe { self.device.device_wait_idle() }.setup("device_wait_idle")
    }

    pub fn find_memory_type(
        &self,
        type_bits: u32,
        flags: vk::MemoryPropertyFlags,
    ) -> Result<u32, VkError> {
        memory_type_index(&self.memory, type_bits, flags)
            .ok_or(VkError::NoMemoryType { type_bits, flags })
    }
}

// Teardown: device, surface, messenger, instance. Callers destroy every
// device-owned object before this runs.
impl Drop for Gpu {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

pub(crate) fn memory_type_index(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..props.memory_type_count).find(|&i| {
        (type_bits & (1 << i)) != 0 && props.memory_types[i as usize].property_flags.contains(flags)
    })
}

unsafe fn has_validation_layer(entry: &Entry) -> bool {
    unsafe { entry.enumerate_instance_layer_properties() }
        .map(|layers| {
            layers
                .iter()
                .any(|l| unsafe { CStr::from_ptr(l.layer_name.as_ptr()) } == VALIDATION_LAYER)
        })
        .unwrap_or(false)
}

unsafe fn create_instance(
    entry: &Entry,
    display_raw: RawDisplayHandle,
    validation: bool,
) -> Result<Instance> {
    let app_info = vk::ApplicationInfo::default()
        .application_name(APP_NAME)
        .engine_name(APP_NAME)
        .api_version(vk::API_VERSION_1_0);

    let mut extensions = ash_window::enumerate_required_extensions(display_raw)
        .context("enumerate_required_extensions")?
        .to_vec();
    let mut layers: Vec<*const c_char> = Vec::new();
    if validation {
        extensions.push(debug_utils::NAME.as_ptr());
        layers.push(VALIDATION_LAYER.as_ptr());
    }

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layers);

    Ok(unsafe { entry.create_instance(&create_info, None) }.context("create_instance")?)
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if data.is_null() || unsafe { (*data).p_message.is_null() } {
        return vk::FALSE;
    }
    let msg = unsafe { CStr::from_ptr((*data).p_message) }.to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!("[vulkan] {msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!("[vulkan] {msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        debug!("[vulkan] {msg}");
    } else {
        trace!("[vulkan] {msg}");
    }
    vk::FALSE
}

unsafe fn create_debug_messenger(
    entry: &Entry,
    instance: &Instance,
) -> Result<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
    let loader = debug_utils::Instance::new(entry, instance);
    let info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback));
    let messenger = unsafe { loader.create_debug_utils_messenger(&info, None) }
        .context("create_debug_utils_messenger")?;
    Ok((loader, messenger))
}

unsafe fn supports_swapchain(instance: &Instance, phys: vk::PhysicalDevice) -> bool {
    unsafe { instance.enumerate_device_extension_properties(phys) }
        .map(|exts| {
            exts.iter()
                .any(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) } == swapchain::NAME)
        })
        .unwrap_or(false)
}

/// First discrete GPU that can draw and present to `surface`, else the first that can.
unsafe fn pick_physical_device(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, QueueFamilies), VkError> {
    let devices =
        unsafe { instance.enumerate_physical_devices() }.setup("enumerate_physical_devices")?;
    let mut fallback = None;

    for phys in devices {
        let props = unsafe { instance.get_physical_device_properties(phys) };
        let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }.to_string_lossy();

        let families = unsafe { instance.get_physical_device_queue_family_properties(phys) };
        let indices = QueueIndices::resolve(&families, |i| unsafe {
            surface_loader
                .get_physical_device_surface_support(phys, i, surface)
                .unwrap_or(false)
        });
        let Some(resolved) = indices.complete() else {
            debug!("skipping {name}: queue families incomplete ({indices:?})");
            continue;
        };
        if !unsafe { supports_swapchain(instance, phys) } {
            debug!("skipping {name}: no {:?}", swapchain::NAME);
            continue;
        }

        if props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
            info!("gpu: {name} (discrete), queues {resolved:?}");
            return Ok((phys, resolved));
        }
        if fallback.is_none() {
            debug!("candidate gpu: {name} ({:?})", props.device_type);
            fallback = Some((phys, resolved));
        }
    }

    let (phys, resolved) = fallback.ok_or(VkError::NoSuitableDevice)?;
    info!("gpu: no discrete device, using first suitable; queues {resolved:?}");
    Ok((phys, resolved))
}

unsafe fn create_device(
    instance: &Instance,
    phys: vk::PhysicalDevice,
    families: QueueFamilies,
) -> Result<ash::Device> {
    let priorities = [1.0_f32];
    let queue_infos: Vec<_> = families
        .unique()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(&priorities)
        })
        .collect();

    let device_exts = [swapchain::NAME.as_ptr()];
    let features = vk::PhysicalDeviceFeatures::default();
    let info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_infos)
        .enabled_extension_names(&device_exts)
        .enabled_features(&features);

    Ok(unsafe { instance.create_device(phys, &info, None) }.context("create_device")?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: count,
            ..Default::default()
        }
    }

    #[test]
    fn shared_family_resolves_to_one_index() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 1)];
        let q = QueueIndices::resolve(&families, |_| true);
        assert_eq!(q.graphics, Some(0));
        assert_eq!(q.presentation, Some(0));
        let resolved = q.complete().unwrap();
        assert_eq!(resolved.unique(), vec![0]);
        let (mode, list) = resolved.sharing();
        assert_eq!(mode, vk::SharingMode::EXCLUSIVE);
        assert!(list.is_empty());
    }

    #[test]
    fn split_families_share_concurrently() {
        let families = [
            family(vk::QueueFlags::TRANSFER, 1),
            family(vk::QueueFlags::GRAPHICS, 1),
            family(vk::QueueFlags::COMPUTE, 1),
        ];
        let q = QueueIndices::resolve(&families, |i| i == 2);
        let resolved = q.complete().unwrap();
        assert_eq!(resolved.graphics, 1);
        assert_eq!(resolved.presentation, 2);
        let (mode, list) = resolved.sharing();
        assert_eq!(mode, vk::SharingMode::CONCURRENT);
        assert_eq!(list, vec![1, 2]);
    }

    #[test]
    fn empty_graphics_family_is_ignored() {
        let families = [family(vk::QueueFlags::GRAPHICS, 0)];
        let q = QueueIndices::resolve(&families, |_| true);
        assert_eq!(q.graphics, None);
        assert!(!q.is_complete());
        assert!(q.complete().is_none());
    }

    #[test]
    fn scan_stops_once_complete() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 1),
            family(vk::QueueFlags::GRAPHICS, 1),
        ];
        let mut asked = Vec::new();
        let q = QueueIndices::resolve(&families, |i| {
            asked.push(i);
            true
        });
        assert_eq!(asked, vec![0]);
        assert_eq!(q.complete().unwrap().graphics, 0);
    }

    #[test]
    fn memory_type_needs_bit_and_flags() {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 3,
            ..Default::default()
        };
        props.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        props.memory_types[1].property_flags =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        props.memory_types[2].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE;

        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(memory_type_index(&props, 0b111, host), Some(1));
        assert_eq!(memory_type_index(&props, 0b101, host), None);
        assert_eq!(
            memory_type_index(&props, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            Some(0)
        );
        assert_eq!(
            memory_type_index(&props, 0b100, vk::MemoryPropertyFlags::HOST_VISIBLE),
            Some(2)
        );
    }

    #[test]
    fn failed_bootstrap_unwinds_newest_first() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let mut unwind = Unwind::default();
            for what in ["instance", "debug messenger", "surface"] {
                let log = Rc::clone(&log);
                unwind.push(what, move || log.borrow_mut().push(what));
            }
        }
        assert_eq!(*log.borrow(), vec!["surface", "debug messenger", "instance"]);
    }

    #[test]
    fn disarmed_unwind_destroys_nothing() {
        use std::cell::Cell;
        use std::rc::Rc;

        let ran = Rc::new(Cell::new(false));
        let mut unwind = Unwind::default();
        let flag = Rc::clone(&ran);
        unwind.push("instance", move || flag.set(true));
        unwind.disarm();
        assert!(!ran.get());
    }
}

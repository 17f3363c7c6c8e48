//! The Vulkan loader/layer ABI (`spec.md` §6 "Vulkan layer ABI").
//!
//! Every real Vulkan layer exports the same five bootstrap functions
//! regardless of what it does once loaded:
//! [`vkNegotiateLoaderLayerInterfaceVersion`], [`vkEnumerateInstanceLayerProperties`],
//! [`vkEnumerateDeviceLayerProperties`], [`vkGetInstanceProcAddr`] and
//! [`vkGetDeviceProcAddr`]. `ash` binds `vulkan_core.h`, not the loader's own
//! `vk_layer.h`, so the structs the loader uses to pass the next link in the
//! dispatch chain down through `vkCreateInstance`/`vkCreateDevice` are
//! hand-declared below from the stable, ABI-frozen loader/layer interface
//! (the shape `original_source/device.cpp` itself walks via its
//! `findChainInfo<VkLayerDeviceCreateInfo, VK_STRUCTURE_TYPE_LOADER_DEVICE_CREATE_INFO>`
//! calls — `original_source` ships no standalone translation unit for the
//! instance-side bootstrap or the negotiate/enumerate exports, so those are
//! grounded directly on the Vulkan loader specification instead).
//!
//! Scope: this module fully implements the handshake (negotiate, enumerate,
//! and instance/device creation with correct chain walking and teardown),
//! device/queue/command-buffer lifetime (`vkGetDeviceQueue`,
//! `vkCreate`/`vkDestroyCommandPool`, `vkAllocate`/`vkFreeCommandBuffers`,
//! `vkBegin`/`vkEnd`/`vkResetCommandBuffer`), the resource shadows the
//! command-recording and submission modules need (`vkCreate`/`vkDestroyBuffer`,
//! `vkCreate`/`vkDestroyImage`, `vkCreate`/`vkDestroyRenderPass`), command
//! recording itself (`vkCmdFillBuffer`, `vkCmdUpdateBuffer`, `vkCmdCopyBuffer`,
//! `vkCmdPipelineBarrier`, `vkCmdBegin`/`vkCmdNextSubpass`/`vkCmdEndRenderPass`,
//! `vkCmdBegin`/`vkCmdEndDebugUtilsLabelEXT`, `vkCmdExecuteCommands`) and the
//! `vkQueueSubmit` capstone that hands all of it to
//! `submission::tracker::SubmissionTracker`.
//!
//! Deliberately out of scope, tracked in DESIGN.md rather than stubbed out
//! silently: pipeline/descriptor-set binding and the draw/dispatch family
//! (`vkCmdBindPipeline`, vertex/index/descriptor-set binding, push constants,
//! `vkCmdDraw*`, `vkCmdDispatch*`), which need pipeline and descriptor-set
//! creation wiring that isn't implemented either; creation of samplers, image
//! views, framebuffers, swapchains, shader modules, query pools, events,
//! buffer views and device memory; and explicit `vkCreateSemaphore`/
//! `vkCreateFence` interception, which this module sidesteps by lazily
//! synthesizing a non-layer-owned shadow for any application-supplied
//! semaphore or fence it first encounters at `vkQueueSubmit` time.

use std::ffi::{c_void, CStr};
use std::os::raw::c_char;
use std::sync::Arc;

use ash::vk;
use ash::vk::Handle;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;

use crate::command::command_buffer::CommandBuffer;
use crate::command::node::ImageBarrier;
use crate::config::LayerConfig;
use crate::objects::buffer::{Buffer, BufferCreateInfo};
use crate::objects::command_pool::CommandPool;
use crate::objects::device::Device;
use crate::objects::fence::Fence;
use crate::objects::image::{Image, ImageCreateInfo};
use crate::objects::instance::Instance;
use crate::objects::physical_device::PhysicalDevice;
use crate::objects::render_pass::{AttachmentDescription, RenderPass, RenderPassDescription, SubpassDescription};
use crate::objects::semaphore::Semaphore;
use crate::submission::driver::AshDriver;
use crate::submission::tracker::SubmitBatch;

const LAYER_NAME: &str = "VK_LAYER_vklens_introspection\0";
const LAYER_DESCRIPTION: &str = "In-process Vulkan introspection and debug-overlay layer\0";
const LOADER_LAYER_INTERFACE_VERSION: u32 = 2;

fn structure_type_loader_instance_create_info() -> vk::StructureType {
    // Reserved loader/layer sType, stable since the interface's introduction;
    // not part of `vulkan_core.h`'s named constants as bound by `ash`.
    vk::StructureType::from_raw(47)
}

fn structure_type_loader_device_create_info() -> vk::StructureType {
    vk::StructureType::from_raw(48)
}

const VK_LAYER_LINK_INFO: i32 = 0;

// `vk::PFN_vk*` aliases are `Option<fn>`; once resolved through a `GetProcAddr`
// call the pointer is known non-null, so these bare aliases let call sites
// invoke it directly instead of matching on `Some` every time.
type PfnCreateInstance = unsafe extern "system" fn(*const vk::InstanceCreateInfo, *const vk::AllocationCallbacks, *mut vk::Instance) -> vk::Result;
type PfnDestroyInstance = unsafe extern "system" fn(vk::Instance, *const vk::AllocationCallbacks);
type PfnCreateDevice = unsafe extern "system" fn(vk::PhysicalDevice, *const vk::DeviceCreateInfo, *const vk::AllocationCallbacks, *mut vk::Device) -> vk::Result;
type PfnDestroyDevice = unsafe extern "system" fn(vk::Device, *const vk::AllocationCallbacks);

#[repr(C)]
struct ChainHeader {
    s_type: vk::StructureType,
    p_next: *const c_void,
}

#[repr(C)]
struct LayerInstanceLink {
    p_next: *mut LayerInstanceLink,
    pfn_next_get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr,
    pfn_next_get_physical_device_proc_addr: Option<unsafe extern "system" fn(vk::Instance, *const c_char) -> vk::PFN_vkVoidFunction>,
}

#[repr(C)]
union LayerInstanceCreateInfoUnion {
    p_layer_info: *mut LayerInstanceLink,
    pfn_set_instance_loader_data: Option<unsafe extern "system" fn(vk::Instance, *mut c_void) -> vk::Result>,
}

#[repr(C)]
struct LayerInstanceCreateInfo {
    s_type: vk::StructureType,
    p_next: *const c_void,
    function: i32,
    u: LayerInstanceCreateInfoUnion,
}

#[repr(C)]
struct LayerDeviceLink {
    p_next: *mut LayerDeviceLink,
    pfn_next_get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr,
    pfn_next_get_device_proc_addr: vk::PFN_vkGetDeviceProcAddr,
}

#[repr(C)]
union LayerDeviceCreateInfoUnion {
    p_layer_info: *mut LayerDeviceLink,
    pfn_set_device_loader_data: Option<unsafe extern "system" fn(vk::Device, *mut c_void) -> vk::Result>,
}

#[repr(C)]
struct LayerDeviceCreateInfo {
    s_type: vk::StructureType,
    p_next: *const c_void,
    function: i32,
    u: LayerDeviceCreateInfoUnion,
}

/// Mirrors the loader's `VkNegotiateLayerInterface`, passed to
/// [`vkNegotiateLoaderLayerInterfaceVersion`].
#[repr(C)]
pub struct NegotiateLayerInterface {
    pub s_type: vk::StructureType,
    pub p_next: *mut c_void,
    pub loader_layer_interface_version: u32,
    pub pfn_get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr,
    pub pfn_get_device_proc_addr: vk::PFN_vkGetDeviceProcAddr,
    pub pfn_get_physical_device_proc_addr: Option<unsafe extern "system" fn(vk::Instance, *const c_char) -> vk::PFN_vkVoidFunction>,
}

/// Walks a `pNext` chain of `{sType, pNext, ...}` structs looking for the
/// first entry of the given loader sType, advancing past ones that aren't
/// the `VK_LAYER_LINK_INFO` variant of that sType (the loader chains
/// multiple entries of the same sType for different purposes).
unsafe fn find_layer_link_instance(mut p_next: *const c_void) -> *const LayerInstanceCreateInfo {
    while !p_next.is_null() {
        let header = &*(p_next as *const ChainHeader);
        if header.s_type == structure_type_loader_instance_create_info() {
            let info = p_next as *const LayerInstanceCreateInfo;
            if (*info).function == VK_LAYER_LINK_INFO {
                return info;
            }
        }
        p_next = header.p_next;
    }
    std::ptr::null()
}

unsafe fn find_layer_link_device(mut p_next: *const c_void) -> *const LayerDeviceCreateInfo {
    while !p_next.is_null() {
        let header = &*(p_next as *const ChainHeader);
        if header.s_type == structure_type_loader_device_create_info() {
            let info = p_next as *const LayerDeviceCreateInfo;
            if (*info).function == VK_LAYER_LINK_INFO {
                return info;
            }
        }
        p_next = header.p_next;
    }
    std::ptr::null()
}

/// What's needed to forward unintercepted entry points down the chain for one
/// instance or device, keyed by the handle's dispatch key — the same key
/// `registry::dispatch_table` uses for the shadow object itself. Kept
/// separate from the shadow structs so this module doesn't have to add
/// fields to already-tested object types just to carry raw function pointers.
#[derive(Clone, Copy)]
struct NextInstanceCalls {
    get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr,
}

#[derive(Clone, Copy)]
struct NextDeviceCalls {
    get_device_proc_addr: vk::PFN_vkGetDeviceProcAddr,
}

struct NextCallTables {
    instances: RwLock<std::collections::HashMap<u64, NextInstanceCalls>>,
    devices: RwLock<std::collections::HashMap<u64, NextDeviceCalls>>,
}

static NEXT: OnceCell<NextCallTables> = OnceCell::new();

fn next_tables() -> &'static NextCallTables {
    NEXT.get_or_init(|| NextCallTables {
        instances: RwLock::new(std::collections::HashMap::new()),
        devices: RwLock::new(std::collections::HashMap::new()),
    })
}

/// Dispatchable handles are pointers whose first machine word is a key the
/// loader/layers use to route calls; reading it is how a layer identifies
/// "which instance/device is this" without loader-provided helpers.
unsafe fn dispatch_key_of(handle: *const c_void) -> u64 {
    *(handle as *const u64)
}

unsafe fn cstr(name: *const c_char) -> &'static str {
    CStr::from_ptr(name).to_str().unwrap_or("")
}

/// Builds a slice from a count/pointer pair, treating a null pointer (which
/// Vulkan allows whenever the paired count is zero) as an empty slice instead
/// of dereferencing it.
unsafe fn slice_or_empty<'a, T>(ptr: *const T, len: u32) -> &'a [T] {
    if ptr.is_null() || len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(ptr, len as usize)
    }
}

/// Where a queue or command buffer routes back to when a `vkCmd*`/
/// `vkQueueSubmit` trampoline only has the sub-object's own handle and needs
/// the device that owns it. Kept separate from `registry::dispatch_table`:
/// a loader is free to write the same dispatch-key word into a device and
/// every queue/command buffer retrieved from it, so registering those in the
/// shared table under their own dispatch key risks silently overwriting the
/// owning device's entry in that table's single flat map. This table is
/// keyed by each handle's own raw value instead, which only needs to be a
/// unique identity, not a real dispatch key.
struct CommandBufferRoute {
    device: Arc<Device>,
    command_buffer: Arc<CommandBuffer>,
}

struct ObjectRoutes {
    queues: RwLock<std::collections::HashMap<u64, Arc<Device>>>,
    command_buffers: RwLock<std::collections::HashMap<u64, CommandBufferRoute>>,
}

static ROUTES: OnceCell<ObjectRoutes> = OnceCell::new();

fn routes() -> &'static ObjectRoutes {
    ROUTES.get_or_init(|| ObjectRoutes {
        queues: RwLock::new(std::collections::HashMap::new()),
        command_buffers: RwLock::new(std::collections::HashMap::new()),
    })
}

/// Look up the `Device` shadow for a raw device handle through the shared
/// dispatch table, the same lookup every trampoline below needs before it can
/// touch that device's object maps.
fn device_shadow(device: vk::Device) -> Option<Arc<Device>> {
    let key = unsafe { dispatch_key_of(device.as_raw() as *const c_void) };
    crate::registry::dispatch_table().get::<Device>(key)
}

/// The owning device and command-buffer shadow for a raw command buffer
/// handle, cloned out of [`routes`] so the lock isn't held across the call.
fn command_buffer_route(command_buffer: vk::CommandBuffer) -> Option<(Arc<Device>, Arc<CommandBuffer>)> {
    let routes = routes().command_buffers.read();
    let route = routes.get(&command_buffer.as_raw())?;
    Some((route.device.clone(), route.command_buffer.clone()))
}

fn semaphore_shadow(device: &Arc<Device>, handle: vk::Semaphore) -> Arc<Semaphore> {
    let raw = handle.as_raw();
    device.semaphores.get(&raw).unwrap_or_else(|| device.semaphores.insert(raw, Semaphore::new(handle, false)))
}

/// Resolves one real driver entry point on demand through the next link's
/// `vkGetDeviceProcAddr`, the same chain-forwarding data `vk_create_device`
/// stashed in [`next_tables`]. Mirrors `submission::driver::resolve`, which
/// instead works off a pre-resolved [`AshDriver`]; this module resolves
/// lazily per call since the entry points wired here aren't part of
/// `DriverDispatch`.
unsafe fn resolve_device_pfn<F>(device: vk::Device, name: &'static [u8]) -> Option<F> {
    let key = dispatch_key_of(device.as_raw() as *const c_void);
    let next = next_tables().devices.read().get(&key).copied()?;
    let gdpa = next.get_device_proc_addr?;
    let f = gdpa(device, name.as_ptr() as *const c_char)?;
    Some(std::mem::transmute_copy(&f))
}

/// `VkResult vkNegotiateLoaderLayerInterfaceVersion`. Accepts any interface
/// version up to the one this layer was written against, downgrading the
/// loader's requested version to ours if it asked for something newer.
///
/// # Safety
/// `p_version_struct` must be non-null and point to a valid, writable
/// `NegotiateLayerInterface`.
#[no_mangle]
pub unsafe extern "system" fn vkNegotiateLoaderLayerInterfaceVersion(p_version_struct: *mut NegotiateLayerInterface) -> vk::Result {
    if p_version_struct.is_null() {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    }
    let iface = &mut *p_version_struct;
    if iface.loader_layer_interface_version > LOADER_LAYER_INTERFACE_VERSION {
        iface.loader_layer_interface_version = LOADER_LAYER_INTERFACE_VERSION;
    }
    if iface.loader_layer_interface_version >= 2 {
        iface.pfn_get_instance_proc_addr = Some(vk_get_instance_proc_addr);
        iface.pfn_get_device_proc_addr = Some(vk_get_device_proc_addr);
        iface.pfn_get_physical_device_proc_addr = None;
    }
    vk::Result::SUCCESS
}

fn layer_properties() -> vk::LayerProperties {
    let mut props = vk::LayerProperties::default();
    copy_cstr(&mut props.layer_name, LAYER_NAME);
    copy_cstr(&mut props.description, LAYER_DESCRIPTION);
    props.spec_version = vk::make_api_version(0, 1, 3, 0);
    props.implementation_version = 1;
    props
}

fn copy_cstr(dst: &mut [c_char], src: &str) {
    for (d, s) in dst.iter_mut().zip(src.bytes()) {
        *d = s as c_char;
    }
}

/// `VkResult vkEnumerateInstanceLayerProperties`. This layer reports exactly
/// one entry, same shape as `vkEnumerateDeviceLayerProperties` below.
///
/// # Safety
/// `p_property_count` must be non-null. If non-null, `p_properties` must
/// point to at least `*p_property_count` writable `VkLayerProperties`.
#[no_mangle]
pub unsafe extern "system" fn vkEnumerateInstanceLayerProperties(p_property_count: *mut u32, p_properties: *mut vk::LayerProperties) -> vk::Result {
    enumerate_one_layer(p_property_count, p_properties)
}

/// `VkResult vkEnumerateDeviceLayerProperties`. Device-level layer
/// enumeration is deprecated by the spec but still required to exist.
///
/// # Safety
/// Same contract as [`vkEnumerateInstanceLayerProperties`]; `_physical_device`
/// is unused (this layer's properties don't depend on it).
#[no_mangle]
pub unsafe extern "system" fn vkEnumerateDeviceLayerProperties(
    _physical_device: vk::PhysicalDevice,
    p_property_count: *mut u32,
    p_properties: *mut vk::LayerProperties,
) -> vk::Result {
    enumerate_one_layer(p_property_count, p_properties)
}

unsafe fn enumerate_one_layer(p_property_count: *mut u32, p_properties: *mut vk::LayerProperties) -> vk::Result {
    if p_property_count.is_null() {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    }
    if p_properties.is_null() {
        *p_property_count = 1;
        return vk::Result::SUCCESS;
    }
    if *p_property_count < 1 {
        *p_property_count = 0;
        return vk::Result::INCOMPLETE;
    }
    *p_properties = layer_properties();
    *p_property_count = 1;
    vk::Result::SUCCESS
}

/// `VkResult vkCreateInstance`. Walks the `pNext` chain for the next link's
/// `vkGetInstanceProcAddr`/`vkCreateInstance`, calls through, then shadows the
/// resulting instance (`spec.md` §4.1/§4.2).
///
/// # Safety
/// Standard `vkCreateInstance` contract: `p_create_info` and `p_instance`
/// must be valid per the Vulkan spec.
unsafe extern "system" fn vk_create_instance(
    p_create_info: *const vk::InstanceCreateInfo,
    p_allocator: *const vk::AllocationCallbacks,
    p_instance: *mut vk::Instance,
) -> vk::Result {
    let create_info = &*p_create_info;
    let link = find_layer_link_instance(create_info.p_next as *const c_void);
    if link.is_null() {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    }
    let layer_info = (*link).u.p_layer_info;
    let get_instance_proc_addr = (*layer_info).pfn_next_get_instance_proc_addr;
    // Advance the chain for the next layer down before calling through.
    (*(link as *mut LayerInstanceCreateInfo)).u.p_layer_info = (*layer_info).p_next;

    let Some(gipa) = get_instance_proc_addr else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let Some(next_create_instance) = gipa(vk::Instance::null(), b"vkCreateInstance\0".as_ptr() as *const c_char) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let next_create_instance: PfnCreateInstance = std::mem::transmute(next_create_instance);
    let result = next_create_instance(p_create_info, p_allocator, p_instance);
    if result != vk::Result::SUCCESS {
        return result;
    }

    let instance = *p_instance;
    let key = dispatch_key_of(instance.as_raw() as *const c_void);
    let api_version = create_info
        .p_application_info
        .as_ref()
        .map(|info| info.api_version)
        .unwrap_or(vk::API_VERSION_1_0);
    Instance::register(instance, key, api_version);
    next_tables()
        .instances
        .write()
        .insert(key, NextInstanceCalls { get_instance_proc_addr });
    vk::Result::SUCCESS
}

/// `VkResult vkCreateDevice`. Same chain-walking shape as `vkCreateInstance`,
/// one link type down (`spec.md` §4.1/§4.2). The physical-device shadow must
/// already be registered (from `vkEnumeratePhysicalDevices`) before this is
/// reached; not yet wired, so callers doing so manually (tests, the
/// integration harness) populate it themselves in the interim.
///
/// # Safety
/// Standard `vkCreateDevice` contract.
unsafe extern "system" fn vk_create_device(
    physical_device: vk::PhysicalDevice,
    p_create_info: *const vk::DeviceCreateInfo,
    p_allocator: *const vk::AllocationCallbacks,
    p_device: *mut vk::Device,
) -> vk::Result {
    let create_info = &*p_create_info;
    let link = find_layer_link_device(create_info.p_next as *const c_void);
    if link.is_null() {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    }
    let layer_info = (*link).u.p_layer_info;
    let get_instance_proc_addr = (*layer_info).pfn_next_get_instance_proc_addr;
    let get_device_proc_addr = (*layer_info).pfn_next_get_device_proc_addr;
    (*(link as *mut LayerDeviceCreateInfo)).u.p_layer_info = (*layer_info).p_next;

    let Some(gipa) = get_instance_proc_addr else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let Some(next_create_device) = gipa(vk::Instance::null(), b"vkCreateDevice\0".as_ptr() as *const c_char) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let next_create_device: PfnCreateDevice = std::mem::transmute(next_create_device);
    let result = next_create_device(physical_device, p_create_info, p_allocator, p_device);
    if result != vk::Result::SUCCESS {
        return result;
    }

    let device = *p_device;
    let key = dispatch_key_of(device.as_raw() as *const c_void);
    let pd_key = dispatch_key_of(physical_device.as_raw() as *const c_void);
    let physical_device_shadow = crate::registry::dispatch_table()
        .get::<PhysicalDevice>(pd_key)
        .unwrap_or_else(|| PhysicalDevice::register(physical_device, pd_key, vk::PhysicalDeviceProperties::default(), Vec::new()));
    let driver = Arc::new(AshDriver::new(device, get_device_proc_addr));
    Device::register(device, key, physical_device_shadow, driver, LayerConfig::from_env());
    next_tables()
        .devices
        .write()
        .insert(key, NextDeviceCalls { get_device_proc_addr });
    vk::Result::SUCCESS
}

/// `VkResult vkDestroyInstance`. Tears down the shadow before calling
/// through, mirroring the create path's register-after-success ordering
/// reversed for teardown (unregister-before-the-call-that-invalidates-it).
///
/// # Safety
/// Standard `vkDestroyInstance` contract.
unsafe extern "system" fn vk_destroy_instance(instance: vk::Instance, p_allocator: *const vk::AllocationCallbacks) {
    let key = dispatch_key_of(instance.as_raw() as *const c_void);
    let next = next_tables().instances.write().remove(&key);
    if let Some(shadow) = crate::registry::dispatch_table().get::<Instance>(key) {
        shadow.unregister();
    }
    if let Some(next) = next {
        if let Some(gipa) = next.get_instance_proc_addr {
            if let Some(f) = gipa(instance, b"vkDestroyInstance\0".as_ptr() as *const c_char) {
                let f: PfnDestroyInstance = std::mem::transmute(f);
                f(instance, p_allocator);
            }
        }
    }
}

/// `VkResult vkDestroyDevice`.
///
/// # Safety
/// Standard `vkDestroyDevice` contract; the device's shadow must be
/// quiescent (`Device::is_quiescent`) before this is called, per `spec.md`
/// §4.2's destroy-order invariant.
unsafe extern "system" fn vk_destroy_device(device: vk::Device, p_allocator: *const vk::AllocationCallbacks) {
    let key = dispatch_key_of(device.as_raw() as *const c_void);
    let next = next_tables().devices.write().remove(&key);
    if let Some(shadow) = crate::registry::dispatch_table().get::<Device>(key) {
        shadow.unregister();
    }
    if let Some(next) = next {
        if let Some(gdpa) = next.get_device_proc_addr {
            if let Some(f) = gdpa(device, b"vkDestroyDevice\0".as_ptr() as *const c_char) {
                let f: PfnDestroyDevice = std::mem::transmute(f);
                f(device, p_allocator);
            }
        }
    }
}

/// `PFN_vkVoidFunction vkGetInstanceProcAddr`. Returns this layer's own
/// trampoline for the handful of entry points it intercepts; every other
/// name is forwarded to the next link's `vkGetInstanceProcAddr` once this
/// instance's create call has registered one.
///
/// # Safety
/// `p_name` must be a valid NUL-terminated C string.
#[no_mangle]
pub unsafe extern "system" fn vk_get_instance_proc_addr(instance: vk::Instance, p_name: *const c_char) -> vk::PFN_vkVoidFunction {
    match cstr(p_name) {
        "vkGetInstanceProcAddr" => return Some(std::mem::transmute(vk_get_instance_proc_addr as usize)),
        "vkGetDeviceProcAddr" => return Some(std::mem::transmute(vk_get_device_proc_addr as usize)),
        "vkNegotiateLoaderLayerInterfaceVersion" => return Some(std::mem::transmute(vkNegotiateLoaderLayerInterfaceVersion as usize)),
        "vkEnumerateInstanceLayerProperties" => return Some(std::mem::transmute(vkEnumerateInstanceLayerProperties as usize)),
        "vkEnumerateDeviceLayerProperties" => return Some(std::mem::transmute(vkEnumerateDeviceLayerProperties as usize)),
        "vkCreateInstance" => return Some(std::mem::transmute(vk_create_instance as usize)),
        "vkDestroyInstance" => return Some(std::mem::transmute(vk_destroy_instance as usize)),
        "vkCreateDevice" => return Some(std::mem::transmute(vk_create_device as usize)),
        "vkDestroyDevice" => return Some(std::mem::transmute(vk_destroy_device as usize)),
        _ => {}
    }
    let key = dispatch_key_of(instance.as_raw() as *const c_void);
    let next = next_tables().instances.read().get(&key).copied();
    next.and_then(|n| n.get_instance_proc_addr).and_then(|f| f(instance, p_name))
}

/// `PFN_vkVoidFunction vkGetDeviceProcAddr`.
///
/// # Safety
/// `p_name` must be a valid NUL-terminated C string.
#[no_mangle]
pub unsafe extern "system" fn vk_get_device_proc_addr(device: vk::Device, p_name: *const c_char) -> vk::PFN_vkVoidFunction {
    match cstr(p_name) {
        "vkGetDeviceProcAddr" => return Some(std::mem::transmute(vk_get_device_proc_addr as usize)),
        "vkDestroyDevice" => return Some(std::mem::transmute(vk_destroy_device as usize)),
        "vkGetDeviceQueue" => return Some(std::mem::transmute(vk_get_device_queue as usize)),
        "vkCreateCommandPool" => return Some(std::mem::transmute(vk_create_command_pool as usize)),
        "vkDestroyCommandPool" => return Some(std::mem::transmute(vk_destroy_command_pool as usize)),
        "vkAllocateCommandBuffers" => return Some(std::mem::transmute(vk_allocate_command_buffers as usize)),
        "vkFreeCommandBuffers" => return Some(std::mem::transmute(vk_free_command_buffers as usize)),
        "vkBeginCommandBuffer" => return Some(std::mem::transmute(vk_begin_command_buffer as usize)),
        "vkEndCommandBuffer" => return Some(std::mem::transmute(vk_end_command_buffer as usize)),
        "vkResetCommandBuffer" => return Some(std::mem::transmute(vk_reset_command_buffer as usize)),
        "vkCreateBuffer" => return Some(std::mem::transmute(vk_create_buffer as usize)),
        "vkDestroyBuffer" => return Some(std::mem::transmute(vk_destroy_buffer as usize)),
        "vkCreateImage" => return Some(std::mem::transmute(vk_create_image as usize)),
        "vkDestroyImage" => return Some(std::mem::transmute(vk_destroy_image as usize)),
        "vkCreateRenderPass" => return Some(std::mem::transmute(vk_create_render_pass as usize)),
        "vkDestroyRenderPass" => return Some(std::mem::transmute(vk_destroy_render_pass as usize)),
        "vkQueueSubmit" => return Some(std::mem::transmute(vk_queue_submit as usize)),
        "vkCmdFillBuffer" => return Some(std::mem::transmute(vk_cmd_fill_buffer as usize)),
        "vkCmdUpdateBuffer" => return Some(std::mem::transmute(vk_cmd_update_buffer as usize)),
        "vkCmdCopyBuffer" => return Some(std::mem::transmute(vk_cmd_copy_buffer as usize)),
        "vkCmdPipelineBarrier" => return Some(std::mem::transmute(vk_cmd_pipeline_barrier as usize)),
        "vkCmdBeginRenderPass" => return Some(std::mem::transmute(vk_cmd_begin_render_pass as usize)),
        "vkCmdNextSubpass" => return Some(std::mem::transmute(vk_cmd_next_subpass as usize)),
        "vkCmdEndRenderPass" => return Some(std::mem::transmute(vk_cmd_end_render_pass as usize)),
        "vkCmdExecuteCommands" => return Some(std::mem::transmute(vk_cmd_execute_commands as usize)),
        "vkCmdBeginDebugUtilsLabelEXT" => return Some(std::mem::transmute(vk_cmd_begin_debug_utils_label_ext as usize)),
        "vkCmdEndDebugUtilsLabelEXT" => return Some(std::mem::transmute(vk_cmd_end_debug_utils_label_ext as usize)),
        _ => {}
    }
    let key = dispatch_key_of(device.as_raw() as *const c_void);
    let next = next_tables().devices.read().get(&key).copied();
    next.and_then(|n| n.get_device_proc_addr).and_then(|f| f(device, p_name))
}

/// `void vkGetDeviceQueue`. Registers a [`crate::objects::queue::Queue`]
/// shadow in the owning device's queue map the first time this
/// `(family, index)` pair is retrieved, and remembers which device owns the
/// handle so [`vk_queue_submit`] can find its submission tracker later.
///
/// # Safety
/// Standard `vkGetDeviceQueue` contract.
unsafe extern "system" fn vk_get_device_queue(device: vk::Device, queue_family_index: u32, queue_index: u32, p_queue: *mut vk::Queue) {
    let pfn: vk::PFN_vkGetDeviceQueue = resolve_device_pfn(device, b"vkGetDeviceQueue\0");
    let Some(f) = pfn else {
        return;
    };
    f(device, queue_family_index, queue_index, p_queue);
    if let Some(device_shadow) = device_shadow(device) {
        let queue = *p_queue;
        let raw = queue.as_raw();
        if !device_shadow.queues.contains(&raw) {
            device_shadow
                .queues
                .insert(raw, crate::objects::queue::Queue::new(queue, queue_family_index, queue_index));
        }
        routes().queues.write().insert(raw, device_shadow);
    }
}

/// `VkResult vkCreateCommandPool`.
///
/// # Safety
/// Standard `vkCreateCommandPool` contract.
unsafe extern "system" fn vk_create_command_pool(
    device: vk::Device,
    p_create_info: *const vk::CommandPoolCreateInfo,
    p_allocator: *const vk::AllocationCallbacks,
    p_command_pool: *mut vk::CommandPool,
) -> vk::Result {
    let pfn: vk::PFN_vkCreateCommandPool = resolve_device_pfn(device, b"vkCreateCommandPool\0");
    let Some(f) = pfn else {
        return vk::Result::ERROR_EXTENSION_NOT_PRESENT;
    };
    let result = f(device, p_create_info, p_allocator, p_command_pool);
    if result != vk::Result::SUCCESS {
        return result;
    }
    if let Some(device_shadow) = device_shadow(device) {
        let create_info = &*p_create_info;
        let pool = *p_command_pool;
        device_shadow
            .command_pools
            .insert(pool.as_raw(), CommandPool::new(pool, create_info.queue_family_index));
    }
    vk::Result::SUCCESS
}

/// `void vkDestroyCommandPool`. Drops the routing entries of every command
/// buffer still allocated from this pool before calling through, since the
/// driver call invalidates them implicitly without a `vkFreeCommandBuffers`.
///
/// # Safety
/// Standard `vkDestroyCommandPool` contract.
unsafe extern "system" fn vk_destroy_command_pool(device: vk::Device, command_pool: vk::CommandPool, p_allocator: *const vk::AllocationCallbacks) {
    if let Some(device_shadow) = device_shadow(device) {
        if let Some(pool) = device_shadow.command_pools.remove(&command_pool.as_raw()) {
            let mut command_buffers = routes().command_buffers.write();
            for cb in pool.live_command_buffers() {
                command_buffers.remove(&cb.handle().as_raw());
                device_shadow.notify_command_buffer_destroyed(&cb);
            }
        }
    }
    let pfn: vk::PFN_vkDestroyCommandPool = resolve_device_pfn(device, b"vkDestroyCommandPool\0");
    if let Some(f) = pfn {
        f(device, command_pool, p_allocator);
    }
}

/// `VkResult vkAllocateCommandBuffers`. Registers a [`CommandBuffer`] shadow
/// for each handle the driver hands back and routes it to its owning device
/// (`spec.md` §4.1/§4.3), so later `vkCmd*`/`vkBeginCommandBuffer` calls on
/// that handle alone can find both.
///
/// # Safety
/// Standard `vkAllocateCommandBuffers` contract.
unsafe extern "system" fn vk_allocate_command_buffers(
    device: vk::Device,
    p_allocate_info: *const vk::CommandBufferAllocateInfo,
    p_command_buffers: *mut vk::CommandBuffer,
) -> vk::Result {
    let pfn: vk::PFN_vkAllocateCommandBuffers = resolve_device_pfn(device, b"vkAllocateCommandBuffers\0");
    let Some(f) = pfn else {
        return vk::Result::ERROR_EXTENSION_NOT_PRESENT;
    };
    let result = f(device, p_allocate_info, p_command_buffers);
    if result != vk::Result::SUCCESS {
        return result;
    }
    let allocate_info = &*p_allocate_info;
    if let Some(device_shadow) = device_shadow(device) {
        if let Some(pool) = device_shadow.command_pools.get(&allocate_info.command_pool.as_raw()) {
            let primary = allocate_info.level == vk::CommandBufferLevel::PRIMARY;
            let handles = slice_or_empty(p_command_buffers as *const vk::CommandBuffer, allocate_info.command_buffer_count);
            let mut command_buffers = routes().command_buffers.write();
            for &handle in handles {
                let cb = Arc::new(CommandBuffer::new(handle, Arc::downgrade(&pool), primary));
                pool.track(&cb);
                command_buffers.insert(
                    handle.as_raw(),
                    CommandBufferRoute {
                        device: device_shadow.clone(),
                        command_buffer: cb,
                    },
                );
            }
        }
    }
    vk::Result::SUCCESS
}

/// `void vkFreeCommandBuffers`.
///
/// # Safety
/// Standard `vkFreeCommandBuffers` contract.
unsafe extern "system" fn vk_free_command_buffers(
    device: vk::Device,
    command_pool: vk::CommandPool,
    command_buffer_count: u32,
    p_command_buffers: *const vk::CommandBuffer,
) {
    let handles = slice_or_empty(p_command_buffers, command_buffer_count);
    {
        let mut command_buffers = routes().command_buffers.write();
        for &handle in handles {
            if let Some(route) = command_buffers.remove(&handle.as_raw()) {
                route.device.notify_command_buffer_destroyed(&route.command_buffer);
            }
        }
    }
    let pfn: vk::PFN_vkFreeCommandBuffers = resolve_device_pfn(device, b"vkFreeCommandBuffers\0");
    if let Some(f) = pfn {
        f(device, command_pool, command_buffer_count, p_command_buffers);
    }
}

/// `VkResult vkBeginCommandBuffer`. Without a routed owning device there is no
/// valid `VkDevice` handle to resolve the next link's entry points with, so a
/// command buffer that never went through [`vk_allocate_command_buffers`]
/// fails here rather than guessing.
///
/// # Safety
/// Standard `vkBeginCommandBuffer` contract.
unsafe extern "system" fn vk_begin_command_buffer(command_buffer: vk::CommandBuffer, p_begin_info: *const vk::CommandBufferBeginInfo) -> vk::Result {
    let Some((owning_device, cb_shadow)) = command_buffer_route(command_buffer) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    if let Err(err) = cb_shadow.begin() {
        return crate::error::to_vk_result(&err);
    }
    let pfn: vk::PFN_vkBeginCommandBuffer = resolve_device_pfn(owning_device.handle(), b"vkBeginCommandBuffer\0");
    match pfn {
        Some(f) => f(command_buffer, p_begin_info),
        None => vk::Result::ERROR_EXTENSION_NOT_PRESENT,
    }
}

/// `VkResult vkEndCommandBuffer`.
///
/// # Safety
/// Standard `vkEndCommandBuffer` contract.
unsafe extern "system" fn vk_end_command_buffer(command_buffer: vk::CommandBuffer) -> vk::Result {
    let Some((owning_device, cb_shadow)) = command_buffer_route(command_buffer) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    if let Err(err) = cb_shadow.end(&owning_device.config) {
        return crate::error::to_vk_result(&err);
    }
    let pfn: vk::PFN_vkEndCommandBuffer = resolve_device_pfn(owning_device.handle(), b"vkEndCommandBuffer\0");
    match pfn {
        Some(f) => f(command_buffer),
        None => vk::Result::ERROR_EXTENSION_NOT_PRESENT,
    }
}

/// `VkResult vkResetCommandBuffer`.
///
/// # Safety
/// Standard `vkResetCommandBuffer` contract.
unsafe extern "system" fn vk_reset_command_buffer(command_buffer: vk::CommandBuffer, flags: vk::CommandBufferResetFlags) -> vk::Result {
    let Some((owning_device, cb_shadow)) = command_buffer_route(command_buffer) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    if let Err(err) = cb_shadow.reset() {
        return crate::error::to_vk_result(&err);
    }
    let pfn: vk::PFN_vkResetCommandBuffer = resolve_device_pfn(owning_device.handle(), b"vkResetCommandBuffer\0");
    match pfn {
        Some(f) => f(command_buffer, flags),
        None => vk::Result::ERROR_EXTENSION_NOT_PRESENT,
    }
}

/// `VkResult vkCreateBuffer`.
///
/// # Safety
/// Standard `vkCreateBuffer` contract.
unsafe extern "system" fn vk_create_buffer(
    device: vk::Device,
    p_create_info: *const vk::BufferCreateInfo,
    p_allocator: *const vk::AllocationCallbacks,
    p_buffer: *mut vk::Buffer,
) -> vk::Result {
    let pfn: vk::PFN_vkCreateBuffer = resolve_device_pfn(device, b"vkCreateBuffer\0");
    let Some(f) = pfn else {
        return vk::Result::ERROR_EXTENSION_NOT_PRESENT;
    };
    let result = f(device, p_create_info, p_allocator, p_buffer);
    if result != vk::Result::SUCCESS {
        return result;
    }
    if let Some(device_shadow) = device_shadow(device) {
        let create_info = &*p_create_info;
        let buffer = *p_buffer;
        device_shadow.buffers.insert(
            buffer.as_raw(),
            Buffer::new(
                buffer,
                BufferCreateInfo {
                    size: create_info.size,
                    usage: create_info.usage,
                    sharing_mode: create_info.sharing_mode,
                },
            ),
        );
    }
    vk::Result::SUCCESS
}

/// `void vkDestroyBuffer`.
///
/// # Safety
/// Standard `vkDestroyBuffer` contract.
unsafe extern "system" fn vk_destroy_buffer(device: vk::Device, buffer: vk::Buffer, p_allocator: *const vk::AllocationCallbacks) {
    if let Some(device_shadow) = device_shadow(device) {
        device_shadow.buffers.remove(&buffer.as_raw());
    }
    let pfn: vk::PFN_vkDestroyBuffer = resolve_device_pfn(device, b"vkDestroyBuffer\0");
    if let Some(f) = pfn {
        f(device, buffer, p_allocator);
    }
}

/// `VkResult vkCreateImage`.
///
/// # Safety
/// Standard `vkCreateImage` contract.
unsafe extern "system" fn vk_create_image(
    device: vk::Device,
    p_create_info: *const vk::ImageCreateInfo,
    p_allocator: *const vk::AllocationCallbacks,
    p_image: *mut vk::Image,
) -> vk::Result {
    let pfn: vk::PFN_vkCreateImage = resolve_device_pfn(device, b"vkCreateImage\0");
    let Some(f) = pfn else {
        return vk::Result::ERROR_EXTENSION_NOT_PRESENT;
    };
    let result = f(device, p_create_info, p_allocator, p_image);
    if result != vk::Result::SUCCESS {
        return result;
    }
    if let Some(device_shadow) = device_shadow(device) {
        let create_info = &*p_create_info;
        let image = *p_image;
        device_shadow.images.insert(
            image.as_raw(),
            Image::new(
                image,
                ImageCreateInfo {
                    image_type: create_info.image_type,
                    format: create_info.format,
                    extent: create_info.extent,
                    mip_levels: create_info.mip_levels,
                    array_layers: create_info.array_layers,
                    samples: create_info.samples,
                    usage: create_info.usage,
                    initial_layout: create_info.initial_layout,
                },
                false,
            ),
        );
    }
    vk::Result::SUCCESS
}

/// `void vkDestroyImage`.
///
/// # Safety
/// Standard `vkDestroyImage` contract.
unsafe extern "system" fn vk_destroy_image(device: vk::Device, image: vk::Image, p_allocator: *const vk::AllocationCallbacks) {
    if let Some(device_shadow) = device_shadow(device) {
        device_shadow.images.remove(&image.as_raw());
    }
    let pfn: vk::PFN_vkDestroyImage = resolve_device_pfn(device, b"vkDestroyImage\0");
    if let Some(f) = pfn {
        f(device, image, p_allocator);
    }
}

/// `VkResult vkCreateRenderPass`. Decodes attachments and subpasses into a
/// [`RenderPassDescription`] (`spec.md` §3, §4.6's splittability predicate
/// depends on this being decoded correctly rather than approximated).
///
/// # Safety
/// Standard `vkCreateRenderPass` contract.
unsafe extern "system" fn vk_create_render_pass(
    device: vk::Device,
    p_create_info: *const vk::RenderPassCreateInfo,
    p_allocator: *const vk::AllocationCallbacks,
    p_render_pass: *mut vk::RenderPass,
) -> vk::Result {
    let pfn: vk::PFN_vkCreateRenderPass = resolve_device_pfn(device, b"vkCreateRenderPass\0");
    let Some(f) = pfn else {
        return vk::Result::ERROR_EXTENSION_NOT_PRESENT;
    };
    let result = f(device, p_create_info, p_allocator, p_render_pass);
    if result != vk::Result::SUCCESS {
        return result;
    }
    if let Some(device_shadow) = device_shadow(device) {
        let create_info = &*p_create_info;
        let attachments = slice_or_empty(create_info.p_attachments, create_info.attachment_count)
            .iter()
            .map(|a| AttachmentDescription {
                format: a.format,
                samples: a.samples,
                load_op: a.load_op,
                store_op: a.store_op,
                initial_layout: a.initial_layout,
                final_layout: a.final_layout,
            })
            .collect();
        let subpasses = slice_or_empty(create_info.p_subpasses, create_info.subpass_count)
            .iter()
            .map(|s| SubpassDescription {
                input_attachments: slice_or_empty(s.p_input_attachments, s.input_attachment_count)
                    .iter()
                    .map(|r| r.attachment)
                    .collect(),
                color_attachments: slice_or_empty(s.p_color_attachments, s.color_attachment_count)
                    .iter()
                    .map(|r| r.attachment)
                    .collect(),
                resolve_attachments: slice_or_empty(s.p_resolve_attachments, s.color_attachment_count)
                    .iter()
                    .map(|r| r.attachment)
                    .collect(),
                depth_stencil_attachment: s
                    .p_depth_stencil_attachment
                    .as_ref()
                    .map(|r| r.attachment)
                    .filter(|&a| a != vk::ATTACHMENT_UNUSED),
            })
            .collect();
        let render_pass = *p_render_pass;
        device_shadow
            .render_passes
            .insert(render_pass.as_raw(), RenderPass::new(render_pass, RenderPassDescription { attachments, subpasses }));
    }
    vk::Result::SUCCESS
}

/// `void vkDestroyRenderPass`.
///
/// # Safety
/// Standard `vkDestroyRenderPass` contract.
unsafe extern "system" fn vk_destroy_render_pass(device: vk::Device, render_pass: vk::RenderPass, p_allocator: *const vk::AllocationCallbacks) {
    if let Some(device_shadow) = device_shadow(device) {
        device_shadow.render_passes.remove(&render_pass.as_raw());
    }
    let pfn: vk::PFN_vkDestroyRenderPass = resolve_device_pfn(device, b"vkDestroyRenderPass\0");
    if let Some(f) = pfn {
        f(device, render_pass, p_allocator);
    }
}

/// `void vkCmdFillBuffer`.
///
/// # Safety
/// Standard `vkCmdFillBuffer` contract.
unsafe extern "system" fn vk_cmd_fill_buffer(command_buffer: vk::CommandBuffer, dst_buffer: vk::Buffer, dst_offset: vk::DeviceSize, size: vk::DeviceSize, data: u32) {
    let Some((owning_device, cb_shadow)) = command_buffer_route(command_buffer) else {
        return;
    };
    if let Some(buf) = owning_device.buffers.get(&dst_buffer.as_raw()) {
        let _ = cb_shadow.cmd_fill_buffer(&buf, dst_offset, size, data);
    }
    let pfn: vk::PFN_vkCmdFillBuffer = resolve_device_pfn(owning_device.handle(), b"vkCmdFillBuffer\0");
    if let Some(f) = pfn {
        f(command_buffer, dst_buffer, dst_offset, size, data);
    }
}

/// `void vkCmdUpdateBuffer`.
///
/// # Safety
/// Standard `vkCmdUpdateBuffer` contract.
unsafe extern "system" fn vk_cmd_update_buffer(
    command_buffer: vk::CommandBuffer,
    dst_buffer: vk::Buffer,
    dst_offset: vk::DeviceSize,
    data_size: vk::DeviceSize,
    p_data: *const c_void,
) {
    let Some((owning_device, cb_shadow)) = command_buffer_route(command_buffer) else {
        return;
    };
    if let Some(buf) = owning_device.buffers.get(&dst_buffer.as_raw()) {
        let data = slice_or_empty(p_data as *const u8, data_size as u32).to_vec();
        let _ = cb_shadow.cmd_update_buffer(&buf, dst_offset, data);
    }
    let pfn: vk::PFN_vkCmdUpdateBuffer = resolve_device_pfn(owning_device.handle(), b"vkCmdUpdateBuffer\0");
    if let Some(f) = pfn {
        f(command_buffer, dst_buffer, dst_offset, data_size, p_data);
    }
}

/// `void vkCmdCopyBuffer`.
///
/// # Safety
/// Standard `vkCmdCopyBuffer` contract.
unsafe extern "system" fn vk_cmd_copy_buffer(
    command_buffer: vk::CommandBuffer,
    src_buffer: vk::Buffer,
    dst_buffer: vk::Buffer,
    region_count: u32,
    p_regions: *const vk::BufferCopy,
) {
    let Some((owning_device, cb_shadow)) = command_buffer_route(command_buffer) else {
        return;
    };
    if let (Some(src), Some(dst)) = (owning_device.buffers.get(&src_buffer.as_raw()), owning_device.buffers.get(&dst_buffer.as_raw())) {
        let regions = slice_or_empty(p_regions, region_count).to_vec();
        let _ = cb_shadow.cmd_copy_buffer(&src, &dst, regions);
    }
    let pfn: vk::PFN_vkCmdCopyBuffer = resolve_device_pfn(owning_device.handle(), b"vkCmdCopyBuffer\0");
    if let Some(f) = pfn {
        f(command_buffer, src_buffer, dst_buffer, region_count, p_regions);
    }
}

/// `void vkCmdPipelineBarrier`. Only the image memory barriers are decoded
/// into the record (`spec.md` §4.4/§4.6); global and buffer memory barriers
/// carry no layout-tracking information this layer needs.
///
/// # Safety
/// Standard `vkCmdPipelineBarrier` contract.
#[allow(clippy::too_many_arguments)]
unsafe extern "system" fn vk_cmd_pipeline_barrier(
    command_buffer: vk::CommandBuffer,
    src_stage_mask: vk::PipelineStageFlags,
    dst_stage_mask: vk::PipelineStageFlags,
    dependency_flags: vk::DependencyFlags,
    memory_barrier_count: u32,
    p_memory_barriers: *const vk::MemoryBarrier,
    buffer_memory_barrier_count: u32,
    p_buffer_memory_barriers: *const vk::BufferMemoryBarrier,
    image_memory_barrier_count: u32,
    p_image_memory_barriers: *const vk::ImageMemoryBarrier,
) {
    let Some((owning_device, cb_shadow)) = command_buffer_route(command_buffer) else {
        return;
    };
    let image_barriers: Vec<(Arc<Image>, ImageBarrier)> = slice_or_empty(p_image_memory_barriers, image_memory_barrier_count)
        .iter()
        .filter_map(|b| {
            let image = owning_device.images.get(&b.image.as_raw())?;
            let barrier = ImageBarrier {
                image: Arc::downgrade(&image),
                old_layout: b.old_layout,
                new_layout: b.new_layout,
                subresource_range: b.subresource_range,
            };
            Some((image, barrier))
        })
        .collect();
    let _ = cb_shadow.cmd_pipeline_barrier(src_stage_mask, dst_stage_mask, image_barriers);
    let pfn: vk::PFN_vkCmdPipelineBarrier = resolve_device_pfn(owning_device.handle(), b"vkCmdPipelineBarrier\0");
    if let Some(f) = pfn {
        f(
            command_buffer,
            src_stage_mask,
            dst_stage_mask,
            dependency_flags,
            memory_barrier_count,
            p_memory_barriers,
            buffer_memory_barrier_count,
            p_buffer_memory_barriers,
            image_memory_barrier_count,
            p_image_memory_barriers,
        );
    }
}

/// `void vkCmdBeginRenderPass`.
///
/// # Safety
/// Standard `vkCmdBeginRenderPass` contract.
unsafe extern "system" fn vk_cmd_begin_render_pass(command_buffer: vk::CommandBuffer, p_render_pass_begin: *const vk::RenderPassBeginInfo, contents: vk::SubpassContents) {
    let Some((owning_device, cb_shadow)) = command_buffer_route(command_buffer) else {
        return;
    };
    let begin_info = &*p_render_pass_begin;
    if let Some(rp) = owning_device.render_passes.get(&begin_info.render_pass.as_raw()) {
        let _ = cb_shadow.cmd_begin_render_pass(&rp);
    }
    let pfn: vk::PFN_vkCmdBeginRenderPass = resolve_device_pfn(owning_device.handle(), b"vkCmdBeginRenderPass\0");
    if let Some(f) = pfn {
        f(command_buffer, p_render_pass_begin, contents);
    }
}

/// `void vkCmdNextSubpass`.
///
/// # Safety
/// Standard `vkCmdNextSubpass` contract.
unsafe extern "system" fn vk_cmd_next_subpass(command_buffer: vk::CommandBuffer, contents: vk::SubpassContents) {
    let Some((owning_device, cb_shadow)) = command_buffer_route(command_buffer) else {
        return;
    };
    let _ = cb_shadow.cmd_next_subpass();
    let pfn: vk::PFN_vkCmdNextSubpass = resolve_device_pfn(owning_device.handle(), b"vkCmdNextSubpass\0");
    if let Some(f) = pfn {
        f(command_buffer, contents);
    }
}

/// `void vkCmdEndRenderPass`.
///
/// # Safety
/// Standard `vkCmdEndRenderPass` contract.
unsafe extern "system" fn vk_cmd_end_render_pass(command_buffer: vk::CommandBuffer) {
    let Some((owning_device, cb_shadow)) = command_buffer_route(command_buffer) else {
        return;
    };
    let _ = cb_shadow.cmd_end_render_pass();
    let pfn: vk::PFN_vkCmdEndRenderPass = resolve_device_pfn(owning_device.handle(), b"vkCmdEndRenderPass\0");
    if let Some(f) = pfn {
        f(command_buffer);
    }
}

/// `void vkCmdBeginDebugUtilsLabelEXT`, the debug-utils entry point scenario
/// E3 exercises: opens a `DebugLabel` section, tolerated even when never
/// matched by a closing call (`spec.md` §4.3).
///
/// # Safety
/// Standard `vkCmdBeginDebugUtilsLabelEXT` contract.
unsafe extern "system" fn vk_cmd_begin_debug_utils_label_ext(command_buffer: vk::CommandBuffer, p_label_info: *const vk::DebugUtilsLabelEXT) {
    let Some((owning_device, cb_shadow)) = command_buffer_route(command_buffer) else {
        return;
    };
    let label_info = &*p_label_info;
    let label = if label_info.p_label_name.is_null() {
        String::new()
    } else {
        cstr(label_info.p_label_name).to_string()
    };
    let _ = cb_shadow.cmd_begin_debug_label(label);
    let pfn: vk::PFN_vkCmdBeginDebugUtilsLabelEXT = resolve_device_pfn(owning_device.handle(), b"vkCmdBeginDebugUtilsLabelEXT\0");
    if let Some(f) = pfn {
        f(command_buffer, p_label_info);
    }
}

/// `void vkCmdEndDebugUtilsLabelEXT`.
///
/// # Safety
/// Standard `vkCmdEndDebugUtilsLabelEXT` contract.
unsafe extern "system" fn vk_cmd_end_debug_utils_label_ext(command_buffer: vk::CommandBuffer) {
    let Some((owning_device, cb_shadow)) = command_buffer_route(command_buffer) else {
        return;
    };
    let _ = cb_shadow.cmd_end_debug_label();
    let pfn: vk::PFN_vkCmdEndDebugUtilsLabelEXT = resolve_device_pfn(owning_device.handle(), b"vkCmdEndDebugUtilsLabelEXT\0");
    if let Some(f) = pfn {
        f(command_buffer);
    }
}

/// `void vkCmdExecuteCommands`.
///
/// # Safety
/// Standard `vkCmdExecuteCommands` contract.
unsafe extern "system" fn vk_cmd_execute_commands(command_buffer: vk::CommandBuffer, command_buffer_count: u32, p_command_buffers: *const vk::CommandBuffer) {
    let Some((owning_device, cb_shadow)) = command_buffer_route(command_buffer) else {
        return;
    };
    let secondaries: Vec<Arc<CommandBuffer>> = slice_or_empty(p_command_buffers, command_buffer_count)
        .iter()
        .filter_map(|h| routes().command_buffers.read().get(&h.as_raw()).map(|r| r.command_buffer.clone()))
        .collect();
    let _ = cb_shadow.cmd_execute_commands(&secondaries);
    let pfn: vk::PFN_vkCmdExecuteCommands = resolve_device_pfn(owning_device.handle(), b"vkCmdExecuteCommands\0");
    if let Some(f) = pfn {
        f(command_buffer, command_buffer_count, p_command_buffers);
    }
}

/// `VkResult vkQueueSubmit`: decodes every batch's wait/signal semaphores and
/// command buffers into shadow references and hands them to
/// [`crate::submission::tracker::SubmissionTracker::submit`] (`spec.md`
/// §4.5), which is what actually calls through to the driver. Application
/// semaphores/fences with no existing shadow are lazily registered as
/// non-layer-owned on first sight, since this pass doesn't intercept
/// `vkCreateSemaphore`/`vkCreateFence` themselves.
///
/// # Safety
/// Standard `vkQueueSubmit` contract.
unsafe extern "system" fn vk_queue_submit(queue: vk::Queue, submit_count: u32, p_submits: *const vk::SubmitInfo, fence: vk::Fence) -> vk::Result {
    let Some(owning_device) = routes().queues.read().get(&queue.as_raw()).cloned() else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };

    let batches: Vec<SubmitBatch> = slice_or_empty(p_submits, submit_count)
        .iter()
        .map(|submit| {
            let command_buffers = slice_or_empty(submit.p_command_buffers, submit.command_buffer_count)
                .iter()
                .filter_map(|h| routes().command_buffers.read().get(&h.as_raw()).map(|r| r.command_buffer.clone()))
                .collect();
            let mut batch = SubmitBatch::new(command_buffers);
            batch.wait_semaphores = slice_or_empty(submit.p_wait_semaphores, submit.wait_semaphore_count)
                .iter()
                .zip(slice_or_empty(submit.p_wait_dst_stage_mask, submit.wait_semaphore_count).iter())
                .map(|(&s, &stage)| (semaphore_shadow(&owning_device, s), stage))
                .collect();
            batch.signal_semaphores = slice_or_empty(submit.p_signal_semaphores, submit.signal_semaphore_count)
                .iter()
                .map(|&s| semaphore_shadow(&owning_device, s))
                .collect();
            batch
        })
        .collect();

    let app_fence = if fence == vk::Fence::null() {
        None
    } else {
        let raw = fence.as_raw();
        Some(owning_device.fences.get(&raw).unwrap_or_else(|| owning_device.fences.insert(raw, Fence::new(fence, false))))
    };

    match owning_device.submit(queue, batches, app_fence) {
        Ok(_) => vk::Result::SUCCESS,
        Err(err) => crate::error::to_vk_result(&err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiate_reports_supported_version_and_fills_pointers() {
        let mut iface = NegotiateLayerInterface {
            s_type: vk::StructureType::default(),
            p_next: std::ptr::null_mut(),
            loader_layer_interface_version: 5,
            pfn_get_instance_proc_addr: None,
            pfn_get_device_proc_addr: None,
            pfn_get_physical_device_proc_addr: None,
        };
        let result = unsafe { vkNegotiateLoaderLayerInterfaceVersion(&mut iface as *mut _) };
        assert_eq!(result, vk::Result::SUCCESS);
        assert_eq!(iface.loader_layer_interface_version, LOADER_LAYER_INTERFACE_VERSION);
        assert!(iface.pfn_get_instance_proc_addr.is_some());
        assert!(iface.pfn_get_device_proc_addr.is_some());
    }

    #[test]
    fn negotiate_null_struct_fails_cleanly() {
        let result = unsafe { vkNegotiateLoaderLayerInterfaceVersion(std::ptr::null_mut()) };
        assert_eq!(result, vk::Result::ERROR_INITIALIZATION_FAILED);
    }

    #[test]
    fn enumerate_instance_layer_properties_reports_one_entry() {
        let mut count = 0u32;
        let result = unsafe { vkEnumerateInstanceLayerProperties(&mut count as *mut _, std::ptr::null_mut()) };
        assert_eq!(result, vk::Result::SUCCESS);
        assert_eq!(count, 1);

        let mut props = [vk::LayerProperties::default()];
        let result = unsafe { vkEnumerateInstanceLayerProperties(&mut count as *mut _, props.as_mut_ptr()) };
        assert_eq!(result, vk::Result::SUCCESS);
        let name = unsafe { CStr::from_ptr(props[0].layer_name.as_ptr()) };
        assert_eq!(name.to_str().unwrap(), "VK_LAYER_vklens_introspection");
    }

    #[test]
    fn enumerate_with_zero_capacity_reports_incomplete() {
        let mut count = 0u32;
        let mut props = [vk::LayerProperties::default()];
        let result = unsafe { vkEnumerateDeviceLayerProperties(vk::PhysicalDevice::null(), &mut count as *mut _, props.as_mut_ptr()) };
        assert_eq!(result, vk::Result::INCOMPLETE);
        assert_eq!(count, 0);
    }

    #[test]
    fn get_instance_proc_addr_resolves_bootstrap_names() {
        let resolved = unsafe { vk_get_instance_proc_addr(vk::Instance::null(), b"vkGetDeviceProcAddr\0".as_ptr() as *const c_char) };
        assert!(resolved.is_some());
        let missing = unsafe { vk_get_instance_proc_addr(vk::Instance::null(), b"vkSomeUnknownFunction\0".as_ptr() as *const c_char) };
        assert!(missing.is_none());
    }
}

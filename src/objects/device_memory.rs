//! Shadow for `VkDeviceMemory`.

use std::sync::Weak;

use ash::vk;
use parking_lot::Mutex;

use crate::objects::buffer::Buffer;
use crate::objects::handle::{HandleMeta, Nameable};
use crate::objects::image::Image;

/// The resource a memory range is bound to. Held weakly: destroying the owning
/// resource removes its allocation record without needing the memory object to
/// know about it proactively.
#[derive(Clone)]
pub enum AllocationOwner {
    Image(Weak<Image>),
    Buffer(Weak<Buffer>),
}

/// One `(offset, size, owner)` binding record within a `VkDeviceMemory` allocation.
#[derive(Clone)]
pub struct AllocationRecord {
    pub offset: vk::DeviceSize,
    pub size: vk::DeviceSize,
    pub owner: AllocationOwner,
}

#[derive(Default)]
struct Allocations {
    records: Vec<AllocationRecord>,
}

impl Allocations {
    fn overlaps(&self, offset: vk::DeviceSize, size: vk::DeviceSize) -> bool {
        let end = offset + size;
        self.records
            .iter()
            .any(|r| offset < r.offset + r.size && r.offset < end)
    }

    /// Insert a new binding record if the requested range is free. Mirrors
    /// `spec.md` §3: "adding an allocation requires a free range".
    fn try_insert(&mut self, record: AllocationRecord) -> bool {
        if self.overlaps(record.offset, record.size) {
            return false;
        }
        self.records.push(record);
        true
    }

    fn remove_owned_by(&mut self, is_owner: impl Fn(&AllocationOwner) -> bool) {
        self.records.retain(|r| !is_owner(&r.owner));
    }
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct DeviceMemory {
    meta: HandleMeta,
    #[derivative(Debug = "ignore")]
    handle: vk::DeviceMemory,
    pub size: vk::DeviceSize,
    pub memory_type_index: u32,
    #[derivative(Debug = "ignore")]
    allocations: Mutex<Allocations>,
}

impl DeviceMemory {
    pub fn new(handle: vk::DeviceMemory, size: vk::DeviceSize, memory_type_index: u32) -> Self {
        Self {
            meta: HandleMeta::new(),
            handle,
            size,
            memory_type_index,
            allocations: Mutex::new(Allocations::default()),
        }
    }

    pub fn handle(&self) -> vk::DeviceMemory {
        self.handle
    }

    /// Bind a resource to a range of this memory. Returns `false` (and binds
    /// nothing) if the range is already occupied. Rebinding an already-bound
    /// resource is illegal per Vulkan and is only asserted by the caller, not
    /// checked here.
    pub fn bind(&self, offset: vk::DeviceSize, size: vk::DeviceSize, owner: AllocationOwner) -> bool {
        self.allocations.lock().try_insert(AllocationRecord {
            offset,
            size,
            owner,
        })
    }

    /// Remove every allocation record owned by a resource that just got destroyed.
    pub fn release_image(&self, image: &std::sync::Arc<Image>) {
        self.allocations.lock().remove_owned_by(|owner| match owner {
            AllocationOwner::Image(w) => w.upgrade().is_some_and(|i| std::sync::Arc::ptr_eq(&i, image)),
            _ => false,
        });
    }

    pub fn release_buffer(&self, buffer: &std::sync::Arc<Buffer>) {
        self.allocations.lock().remove_owned_by(|owner| match owner {
            AllocationOwner::Buffer(w) => w.upgrade().is_some_and(|b| std::sync::Arc::ptr_eq(&b, buffer)),
            _ => false,
        });
    }

    pub fn allocation_count(&self) -> usize {
        self.allocations.lock().records.len()
    }
}

impl Nameable for DeviceMemory {
    fn meta(&self) -> &HandleMeta {
        &self.meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_binds_are_rejected() {
        let mem = DeviceMemory::new(vk::DeviceMemory::null(), 1024, 0);
        let img = std::sync::Arc::new(Image::new_for_test(256));
        assert!(mem.bind(0, 256, AllocationOwner::Image(std::sync::Arc::downgrade(&img))));
        let img2 = std::sync::Arc::new(Image::new_for_test(256));
        assert!(!mem.bind(128, 256, AllocationOwner::Image(std::sync::Arc::downgrade(&img2))));
        assert!(mem.bind(256, 256, AllocationOwner::Image(std::sync::Arc::downgrade(&img2))));
        assert_eq!(mem.allocation_count(), 2);
    }

    #[test]
    fn release_frees_the_range() {
        let mem = DeviceMemory::new(vk::DeviceMemory::null(), 1024, 0);
        let img = std::sync::Arc::new(Image::new_for_test(256));
        mem.bind(0, 256, AllocationOwner::Image(std::sync::Arc::downgrade(&img)));
        mem.release_image(&img);
        assert_eq!(mem.allocation_count(), 0);
        let img2 = std::sync::Arc::new(Image::new_for_test(256));
        assert!(mem.bind(0, 256, AllocationOwner::Image(std::sync::Arc::downgrade(&img2))));
    }
}

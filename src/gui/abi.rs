//! The `extern "C"` public API (`spec.md` §6 "Public C API"), exported from
//! the shared library for a host application to drive the overlay.
//!
//! One-for-one with `original_source/api.h`'s `FuenApi` function-pointer
//! table (`fuenOverlayShow`, `fuenOverlayMouseMoveEvent`, …), renamed to this
//! crate's own `vklens_overlay_*` prefix and given the create/destroy pair
//! `spec.md` §4.9 additionally calls for. Every overlay is keyed by the
//! `(VkDevice, VkSwapchainKHR)` pair it was created for — the same
//! process-wide-singleton-keyed-by-handle shape as
//! [`crate::registry::dispatch_table`], since the loader ABI gives this
//! surface no other place to hang state.

use std::collections::HashMap;
use std::os::raw::c_char;

use ash::vk;
use ash::vk::Handle;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};

/// One overlay's externally-visible state: shown/hidden, and the input-
/// capture flags the (external) ImGui-style renderer reports back after each
/// frame. While hidden, every input-forwarding function reports
/// not-consumed regardless of these flags (scenario E6).
struct OverlayState {
    visible: Mutex<bool>,
    want_capture_mouse: Mutex<bool>,
    want_capture_keyboard: Mutex<bool>,
}

impl OverlayState {
    fn new() -> Self {
        Self {
            visible: Mutex::new(false),
            want_capture_mouse: Mutex::new(true),
            want_capture_keyboard: Mutex::new(true),
        }
    }
}

type Key = (u64, u64);

#[derive(Default)]
struct OverlayRegistry {
    overlays: RwLock<HashMap<Key, OverlayState>>,
}

static REGISTRY: OnceCell<OverlayRegistry> = OnceCell::new();

fn registry() -> &'static OverlayRegistry {
    REGISTRY.get_or_init(OverlayRegistry::default)
}

fn key(device: vk::Device, swapchain: vk::SwapchainKHR) -> Key {
    (device.as_raw(), swapchain.as_raw())
}

/// Creates an overlay for `swapchain` on `device`, or is a no-op if one
/// already exists. Returns `true` if a new overlay was created.
#[no_mangle]
pub extern "C" fn vklens_overlay_create(device: vk::Device, swapchain: vk::SwapchainKHR) -> bool {
    let reg = registry();
    let k = key(device, swapchain);
    if reg.overlays.read().contains_key(&k) {
        return false;
    }
    let mut overlays = reg.overlays.write();
    if overlays.contains_key(&k) {
        return false;
    }
    overlays.insert(k, OverlayState::new());
    true
}

/// Destroys the overlay for `swapchain` on `device`, if one exists.
#[no_mangle]
pub extern "C" fn vklens_overlay_destroy(device: vk::Device, swapchain: vk::SwapchainKHR) {
    registry().overlays.write().remove(&key(device, swapchain));
}

#[no_mangle]
pub extern "C" fn vklens_overlay_show(device: vk::Device, swapchain: vk::SwapchainKHR, show: bool) {
    let reg = registry();
    if let Some(overlay) = reg.overlays.read().get(&key(device, swapchain)) {
        *overlay.visible.lock() = show;
    }
}

/// Sets the input-capture flags the (external) renderer reports after laying
/// out a frame — mirrors ImGui's `io.WantCaptureMouse`/`WantCaptureKeyboard`.
/// Not part of `api.h`'s surface (which has no such hook); this crate adds it
/// because without it every visible overlay would have to claim every event.
#[no_mangle]
pub extern "C" fn vklens_overlay_set_capture(device: vk::Device, swapchain: vk::SwapchainKHR, want_mouse: bool, want_keyboard: bool) {
    let reg = registry();
    if let Some(overlay) = reg.overlays.read().get(&key(device, swapchain)) {
        *overlay.want_capture_mouse.lock() = want_mouse;
        *overlay.want_capture_keyboard.lock() = want_keyboard;
    }
}

fn consumes_mouse(device: vk::Device, swapchain: vk::SwapchainKHR) -> bool {
    registry()
        .overlays
        .read()
        .get(&key(device, swapchain))
        .is_some_and(|o| *o.visible.lock() && *o.want_capture_mouse.lock())
}

fn consumes_keyboard(device: vk::Device, swapchain: vk::SwapchainKHR) -> bool {
    registry()
        .overlays
        .read()
        .get(&key(device, swapchain))
        .is_some_and(|o| *o.visible.lock() && *o.want_capture_keyboard.lock())
}

#[no_mangle]
pub extern "C" fn vklens_overlay_mouse_move_event(_device: vk::Device, _swapchain: vk::SwapchainKHR, _x: i32, _y: i32) {
    // Position-only; nothing to report back per `api.h`'s signature.
}

#[no_mangle]
pub extern "C" fn vklens_overlay_mouse_button_event(device: vk::Device, swapchain: vk::SwapchainKHR, _button: u32, _press: bool) -> bool {
    consumes_mouse(device, swapchain)
}

#[no_mangle]
pub extern "C" fn vklens_overlay_mouse_wheel_event(device: vk::Device, swapchain: vk::SwapchainKHR, _x: f32, _y: f32) -> bool {
    consumes_mouse(device, swapchain)
}

#[no_mangle]
pub extern "C" fn vklens_overlay_key_event(device: vk::Device, swapchain: vk::SwapchainKHR, _keycode: u32, _pressed: bool) -> bool {
    consumes_keyboard(device, swapchain)
}

/// `utf8` must be a valid NUL-terminated UTF-8 C string for the duration of
/// this call — the same contract `api.h`'s `PFN_fuenOverlayTextEvent` places
/// on its caller.
///
/// # Safety
/// `utf8` must be non-null and point to a valid NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn vklens_overlay_text_event(device: vk::Device, swapchain: vk::SwapchainKHR, utf8: *const c_char) -> bool {
    if utf8.is_null() {
        return false;
    }
    consumes_keyboard(device, swapchain)
}

#[no_mangle]
pub extern "C" fn vklens_overlay_keyboard_modifier(device: vk::Device, swapchain: vk::SwapchainKHR, _modifier: u32, _active: bool) {
    let _ = consumes_keyboard(device, swapchain);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handles(n: u64) -> (vk::Device, vk::SwapchainKHR) {
        (vk::Device::from_raw(n), vk::SwapchainKHR::from_raw(n))
    }

    #[test]
    fn scenario_e6_visible_overlay_consumes_input_hidden_does_not() {
        let (device, swapchain) = handles(1001);
        assert!(vklens_overlay_create(device, swapchain));
        assert!(!vklens_overlay_create(device, swapchain), "second create is a no-op");

        vklens_overlay_show(device, swapchain, true);
        assert!(vklens_overlay_mouse_button_event(device, swapchain, 0, true));

        vklens_overlay_show(device, swapchain, false);
        assert!(!vklens_overlay_mouse_button_event(device, swapchain, 0, true));

        vklens_overlay_destroy(device, swapchain);
    }

    #[test]
    fn unknown_overlay_never_consumes() {
        let (device, swapchain) = handles(2002);
        assert!(!vklens_overlay_mouse_button_event(device, swapchain, 1, true));
        assert!(!vklens_overlay_key_event(device, swapchain, 65, true));
    }

    #[test]
    fn capture_flags_gate_consumption_independently() {
        let (device, swapchain) = handles(3003);
        vklens_overlay_create(device, swapchain);
        vklens_overlay_show(device, swapchain, true);
        vklens_overlay_set_capture(device, swapchain, false, true);
        assert!(!vklens_overlay_mouse_wheel_event(device, swapchain, 0.0, 1.0));
        assert!(vklens_overlay_key_event(device, swapchain, 9, true));
        vklens_overlay_destroy(device, swapchain);
    }
}

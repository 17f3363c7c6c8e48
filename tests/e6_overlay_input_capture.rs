//! Scenario E6 (`spec.md` §7): a hidden overlay never reports consuming
//! input, regardless of the capture flags the renderer last reported; a
//! visible one does, gated per input kind.

use ash::vk;
use ash::vk::Handle;

use vklens::gui::abi::{
    vklens_overlay_create, vklens_overlay_destroy, vklens_overlay_key_event,
    vklens_overlay_mouse_button_event, vklens_overlay_set_capture, vklens_overlay_show,
};

fn handles(n: u64) -> (vk::Device, vk::SwapchainKHR) {
    (vk::Device::from_raw(n), vk::SwapchainKHR::from_raw(n))
}

#[test]
fn e6_overlay_input_capture_gated_on_visibility() {
    // A handle value distinct from any used by gui::abi's own colocated unit
    // tests, since the overlay registry is a process-wide singleton.
    let (device, swapchain) = handles(0xE6_0001);

    assert!(vklens_overlay_create(device, swapchain));
    vklens_overlay_set_capture(device, swapchain, true, true);

    vklens_overlay_show(device, swapchain, false);
    assert!(
        !vklens_overlay_mouse_button_event(device, swapchain, 0, true),
        "a hidden overlay never consumes input even though it wants to capture it"
    );
    assert!(!vklens_overlay_key_event(device, swapchain, 32, true));

    vklens_overlay_show(device, swapchain, true);
    assert!(
        vklens_overlay_mouse_button_event(device, swapchain, 0, true),
        "a visible overlay that wants mouse capture consumes the click"
    );
    assert!(vklens_overlay_key_event(device, swapchain, 32, true));

    vklens_overlay_destroy(device, swapchain);
}

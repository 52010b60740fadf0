// Window provider
//
// The bootstrap never creates or polls windows itself. It only needs the raw
// handles to create a surface and the framebuffer size to pick an extent.

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// Framebuffer size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferSize {
    pub width: u32,
    pub height: u32,
}

pub trait WindowProvider: HasWindowHandle + HasDisplayHandle {
    fn framebuffer_size(&self) -> FramebufferSize;

    /// Whether the user has asked for the window to close.
    fn close_requested(&self) -> bool;
}

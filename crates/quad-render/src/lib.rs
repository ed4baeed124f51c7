// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A minimized window reports a zero-area size.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Startup knobs handed to a backend; everything else is derived from the surface.
#[derive(Clone, Debug, Default)]
pub struct RenderOptions {
    pub validation: bool,
    /// Directory with `vert.spv` / `frag.spv` overriding the built-in shaders.
    pub shader_dir: Option<PathBuf>,
    /// PNG used for the quad; a checkerboard is generated when absent.
    pub texture: Option<PathBuf>,
}

/// What a single `render` call ended up doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// Presented, but the chain reported itself stale and was rebuilt afterwards.
    PresentedThenRebuilt,
    /// Acquire found the chain out of date; it was rebuilt and nothing was submitted.
    Rebuilt,
    /// The surface has zero area; no work was done.
    Skipped,
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        options: &RenderOptions,
    ) -> Result<Self>
    where
        Self: Sized;

    fn resize(&mut self, size: RenderSize) -> Result<()>;
    fn render(&mut self) -> Result<FrameOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_on_either_axis_is_empty() {
        assert!(RenderSize::new(0, 600).is_empty());
        assert!(RenderSize::new(800, 0).is_empty());
        assert!(!RenderSize::new(1, 1).is_empty());
    }
}

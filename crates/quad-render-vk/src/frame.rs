// SPDX-License-Identifier: CEPL-1.0
//! Per-frame acquire → submit → present, and whole-generation rebuilds.
use ash::prelude::VkResult;
use ash::vk;
use quad_render::{FrameOutcome, RenderSize};
use tracing::{debug, info, warn};

use crate::commands::{CommandRecorder, DrawInputs};
use crate::device::Gpu;
use crate::error::{SetupContext, VkError};
use crate::framebuffers::FrameBufferSet;
use crate::render_target::{RenderTarget, VertexLayout};
use crate::shaders::ShaderSet;
use crate::swapchain::Swapchain;

/// One binary semaphore each way. Only one frame is ever in flight.
pub struct SyncPair {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
}

impl SyncPair {
    pub fn new(device: &ash::Device) -> Result<Self, VkError> {
        let info = vk::SemaphoreCreateInfo::default();
        let image_available =
            unsafe { device.create_semaphore(&info, None) }.setup("create_semaphore")?;
        let render_finished = match unsafe { device.create_semaphore(&info, None) } {
            Ok(sem) => sem,
            Err(result) => {
                unsafe { device.destroy_semaphore(image_available, None) };
                return Err(VkError::Setup {
                    what: "create_semaphore",
                    result,
                });
            }
        };
        Ok(Self {
            image_available,
            render_finished,
        })
    }

    pub fn destroy(self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_semaphore(self.image_available, None);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireStatus {
    Ready { index: u32, suboptimal: bool },
    Stale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    /// Shown, but the chain no longer matches the surface.
    Stale,
}

/// Out-of-date means rebuild and submit nothing. Suboptimal images are still
/// rendered to; the present that follows reports it again.
pub fn classify_acquire(result: VkResult<(u32, bool)>) -> Result<AcquireStatus, VkError> {
    match result {
        Ok((index, suboptimal)) => Ok(AcquireStatus::Ready { index, suboptimal }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireStatus::Stale),
        Err(result) => Err(VkError::Status {
            op: "acquire_next_image",
            result,
        }),
    }
}

pub fn classify_present(result: VkResult<bool>) -> Result<PresentStatus, VkError> {
    match result {
        Ok(false) => Ok(PresentStatus::Presented),
        Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::Stale),
        Err(result) => Err(VkError::Status {
            op: "queue_present",
            result,
        }),
    }
}

/// What `draw_frame` does before touching the GPU.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStep {
    /// Paused: no acquire, no submit, no present.
    Skip,
    /// Unpaused with nothing built.
    Rebuild,
    Draw,
}

pub fn plan_frame(paused: bool, has_generation: bool) -> FrameStep {
    match (paused, has_generation) {
        (true, _) => FrameStep::Skip,
        (false, false) => FrameStep::Rebuild,
        (false, true) => FrameStep::Draw,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireStep {
    Submit(u32),
    /// Nothing is submitted or presented this frame.
    Rebuild,
}

pub fn after_acquire(status: AcquireStatus) -> AcquireStep {
    match status {
        AcquireStatus::Ready { index, .. } => AcquireStep::Submit(index),
        AcquireStatus::Stale => AcquireStep::Rebuild,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStep {
    Done,
    Rebuild,
}

pub fn after_present(status: PresentStatus) -> PresentStep {
    match status {
        PresentStatus::Presented => PresentStep::Done,
        PresentStatus::Stale => PresentStep::Rebuild,
    }
}

/// Outcome of a frame that ended in a rebuild attempt. `built` is false when
/// the surface reported zero area and nothing replaced the old generation.
pub fn rebuilt_outcome(presented: bool, built: bool) -> FrameOutcome {
    match (presented, built) {
        (false, true) => FrameOutcome::Rebuilt,
        (false, false) => FrameOutcome::Skipped,
        (true, true) => FrameOutcome::PresentedThenRebuilt,
        (true, false) => FrameOutcome::Presented,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResizeAction {
    Rebuild,
    /// Zero area: keep the current generation and stop drawing.
    Pause,
}

/// Last size the window asked for, and whether drawing is suspended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SizeTracker {
    requested: RenderSize,
    paused: bool,
}

impl SizeTracker {
    pub fn new(initial: RenderSize) -> Self {
        Self {
            requested: initial,
            paused: initial.is_empty(),
        }
    }

    /// A zero-area size never replaces the last usable one.
    pub fn on_resize(&mut self, size: RenderSize) -> ResizeAction {
        if size.is_empty() {
            self.paused = true;
            ResizeAction::Pause
        } else {
            self.requested = size;
            self.paused = false;
            ResizeAction::Rebuild
        }
    }

    /// The surface itself reported zero area despite a usable window size.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn requested(&self) -> RenderSize {
        self.requested
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

/// Views, framebuffers and command buffers are built and dropped together,
/// one of each per chain image.
pub fn check_frame_counts(
    image_views: usize,
    framebuffers: usize,
    command_buffers: usize,
) -> Result<(), VkError> {
    if image_views == framebuffers && framebuffers == command_buffers {
        Ok(())
    } else {
        Err(VkError::FrameCountMismatch {
            image_views,
            framebuffers,
            command_buffers,
        })
    }
}

/// Inputs that outlive every generation.
pub struct FrameRecipe {
    pub command_pool: vk::CommandPool,
    pub shaders: ShaderSet,
    pub vertex_layout: VertexLayout,
    pub set_layout: vk::DescriptorSetLayout,
    pub draw: DrawInputs,
}

/// Everything that is tied to one chain's images, format and extent.
pub struct Generation {
    chain: Swapchain,
    target: RenderTarget,
    framebuffers: FrameBufferSet,
    commands: CommandRecorder,
}

impl Generation {
    /// Builds on top of a freshly created chain. On failure the chain is
    /// torn down along with whatever else was already built.
    fn assemble(gpu: &Gpu, chain: Swapchain, recipe: &FrameRecipe) -> Result<Self, VkError> {
        let device = &gpu.device;
        let target = match RenderTarget::build(
            device,
            &chain,
            &recipe.shaders,
            &recipe.vertex_layout,
            recipe.set_layout,
        ) {
            Ok(target) => target,
            Err(err) => {
                chain.teardown(gpu);
                return Err(err);
            }
        };
        let framebuffers = match FrameBufferSet::build(
            device,
            chain.image_views(),
            target.render_pass,
            chain.extent(),
        ) {
            Ok(fbs) => fbs,
            Err(err) => {
                target.teardown(device);
                chain.teardown(gpu);
                return Err(err);
            }
        };
        let commands = match CommandRecorder::record(
            device,
            recipe.command_pool,
            &target,
            framebuffers.handles(),
            chain.extent(),
            &recipe.draw,
        ) {
            Ok(commands) => commands,
            Err(err) => {
                framebuffers.teardown(device);
                target.teardown(device);
                chain.teardown(gpu);
                return Err(err);
            }
        };

        let generation = Self {
            chain,
            target,
            framebuffers,
            commands,
        };
        if let Err(err) = generation.check_counts() {
            generation.teardown(gpu, recipe.command_pool);
            return Err(err);
        }
        Ok(generation)
    }

    fn check_counts(&self) -> Result<(), VkError> {
        check_frame_counts(
            self.chain.image_views().len(),
            self.framebuffers.len(),
            self.commands.len(),
        )
    }

    // Reverse build order: commands, framebuffers, target, chain.
    fn teardown(self, gpu: &Gpu, pool: vk::CommandPool) {
        let device = &gpu.device;
        self.commands.free(device, pool);
        self.framebuffers.teardown(device);
        self.target.teardown(device);
        self.chain.teardown(gpu);
    }
}

/// Owns the live generation and the semaphore pair; single-threaded.
pub struct FrameScheduler {
    generation: Option<Generation>,
    sync: SyncPair,
    size: SizeTracker,
    recipe: FrameRecipe,
}

impl FrameScheduler {
    /// Builds the first generation unless the window starts out empty.
    pub fn new(gpu: &Gpu, size: RenderSize, recipe: FrameRecipe) -> Result<Self, VkError> {
        let sync = SyncPair::new(&gpu.device)?;
        let mut scheduler = Self {
            generation: None,
            sync,
            size: SizeTracker::new(size),
            recipe,
        };
        if !scheduler.size.is_paused() {
            if let Err(err) = scheduler.rebuild(gpu) {
                scheduler.destroy(gpu);
                return Err(err);
            }
        }
        Ok(scheduler)
    }

    /// Extent of the live chain, if any.
    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.generation.as_ref().map(|g| g.chain.extent())
    }

    pub fn is_paused(&self) -> bool {
        self.size.is_paused()
    }

    /// Zero area pauses; anything else rebuilds right away.
    pub fn on_resize(&mut self, gpu: &Gpu, size: RenderSize) -> Result<(), VkError> {
        match self.size.on_resize(size) {
            ResizeAction::Pause => {
                info!("resize to {}x{}: paused", size.width, size.height);
                Ok(())
            }
            ResizeAction::Rebuild => self.rebuild(gpu).map(|_| ()),
        }
    }

    /// Replaces the whole generation. The new chain is created while the old
    /// one is still alive (as its recycling hint); the old generation is torn
    /// down only once the new one is complete.
    ///
    /// Returns false when the surface reports zero area and nothing was built.
    pub fn rebuild(&mut self, gpu: &Gpu) -> Result<bool, VkError> {
        gpu.wait_idle()?;

        let config = Swapchain::plan(gpu, self.size.requested())?;
        if config.extent.width == 0 || config.extent.height == 0 {
            info!("surface extent is 0x0: paused");
            self.size.pause();
            return Ok(false);
        }

        let previous = self.generation.as_ref().map(|g| &g.chain);
        let chain = Swapchain::create(gpu, config, previous)?;
        let next = Generation::assemble(gpu, chain, &self.recipe)?;

        if let Some(old) = self.generation.replace(next) {
            old.teardown(gpu, self.recipe.command_pool);
        }
        Ok(true)
    }

    /// One acquire → submit → present cycle, ending with the present queue idle.
    pub fn draw_frame(&mut self, gpu: &Gpu) -> Result<FrameOutcome, VkError> {
        match plan_frame(self.size.is_paused(), self.generation.is_some()) {
            FrameStep::Skip => return Ok(FrameOutcome::Skipped),
            FrameStep::Rebuild => {
                // Unpaused but nothing built yet: the surface was empty last time.
                let built = self.rebuild(gpu)?;
                return Ok(rebuilt_outcome(false, built));
            }
            FrameStep::Draw => {}
        }
        let Some(generation) = self.generation.as_ref() else {
            return Ok(FrameOutcome::Skipped);
        };

        let acquired = unsafe {
            gpu.swapchain_loader.acquire_next_image(
                generation.chain.handle(),
                u64::MAX,
                self.sync.image_available,
                vk::Fence::null(),
            )
        };
        let status = classify_acquire(acquired)?;
        if let AcquireStatus::Ready {
            index,
            suboptimal: true,
        } = status
        {
            debug!("acquire: image {index} is suboptimal");
        }
        let index = match after_acquire(status) {
            AcquireStep::Submit(index) => index,
            AcquireStep::Rebuild => {
                info!("acquire: chain out of date, rebuilding");
                let built = self.rebuild(gpu)?;
                return Ok(rebuilt_outcome(false, built));
            }
        };

        let wait_semaphores = [self.sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [self.sync.render_finished];
        let command_buffers = [generation.commands.buffers()[index as usize]];
        let submit = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);
        unsafe {
            gpu.device
                .queue_submit(gpu.graphics_queue, &[submit], vk::Fence::null())
                .map_err(|result| VkError::Status {
                    op: "queue_submit",
                    result,
                })?;
        }

        let swapchains = [generation.chain.handle()];
        let indices = [index];
        let present = vk::PresentInfoKHR::default()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices);
        let presented =
            unsafe { gpu.swapchain_loader.queue_present(gpu.present_queue, &present) };
        let status = classify_present(presented)?;

        // Idle before any rebuild: the presented image must be released first.
        unsafe { gpu.device.queue_wait_idle(gpu.present_queue) }.map_err(|result| {
            VkError::Status {
                op: "queue_wait_idle",
                result,
            }
        })?;

        match after_present(status) {
            PresentStep::Done => Ok(FrameOutcome::Presented),
            PresentStep::Rebuild => {
                info!("present: chain stale, rebuilding");
                let built = self.rebuild(gpu)?;
                Ok(rebuilt_outcome(true, built))
            }
        }
    }

    /// Waits for the device, then releases the generation and the semaphores.
    pub fn destroy(mut self, gpu: &Gpu) {
        if let Err(err) = gpu.wait_idle() {
            warn!("device_wait_idle before teardown: {err}");
        }
        if let Some(generation) = self.generation.take() {
            generation.teardown(gpu, self.recipe.command_pool);
        }
        self.sync.destroy(&gpu.device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_success_is_ready() {
        assert_eq!(
            classify_acquire(Ok((2, false))).unwrap(),
            AcquireStatus::Ready {
                index: 2,
                suboptimal: false
            }
        );
    }

    #[test]
    fn acquire_suboptimal_still_renders() {
        assert_eq!(
            classify_acquire(Ok((0, true))).unwrap(),
            AcquireStatus::Ready {
                index: 0,
                suboptimal: true
            }
        );
    }

    #[test]
    fn acquire_out_of_date_is_stale_not_error() {
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            AcquireStatus::Stale
        );
    }

    #[test]
    fn acquire_other_failures_are_fatal() {
        for result in [
            vk::Result::ERROR_DEVICE_LOST,
            vk::Result::ERROR_SURFACE_LOST_KHR,
            vk::Result::ERROR_OUT_OF_HOST_MEMORY,
        ] {
            let err = classify_acquire(Err(result)).unwrap_err();
            assert!(matches!(
                err,
                VkError::Status { op: "acquire_next_image", result: r } if r == result
            ));
        }
    }

    #[test]
    fn present_classification() {
        assert_eq!(classify_present(Ok(false)).unwrap(), PresentStatus::Presented);
        assert_eq!(classify_present(Ok(true)).unwrap(), PresentStatus::Stale);
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            PresentStatus::Stale
        );
        assert!(matches!(
            classify_present(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(VkError::Status {
                op: "queue_present",
                ..
            })
        ));
    }

    #[test]
    fn zero_area_resize_pauses_without_forgetting_size() {
        let mut t = SizeTracker::new(RenderSize::new(800, 600));
        assert!(!t.is_paused());

        assert_eq!(t.on_resize(RenderSize::new(0, 600)), ResizeAction::Pause);
        assert!(t.is_paused());
        assert_eq!(t.requested(), RenderSize::new(800, 600));

        assert_eq!(t.on_resize(RenderSize::new(1024, 0)), ResizeAction::Pause);
        assert_eq!(t.requested(), RenderSize::new(800, 600));
    }

    #[test]
    fn nonzero_resize_resumes_and_rebuilds() {
        let mut t = SizeTracker::new(RenderSize::new(800, 600));
        t.on_resize(RenderSize::new(0, 0));
        assert_eq!(t.on_resize(RenderSize::new(640, 480)), ResizeAction::Rebuild);
        assert!(!t.is_paused());
        assert_eq!(t.requested(), RenderSize::new(640, 480));
    }

    #[test]
    fn empty_initial_size_starts_paused() {
        assert!(SizeTracker::new(RenderSize::new(0, 0)).is_paused());
    }

    #[test]
    fn surface_pause_holds_until_next_resize() {
        let mut t = SizeTracker::new(RenderSize::new(500, 500));
        t.pause();
        assert!(t.is_paused());
        assert_eq!(t.on_resize(RenderSize::new(500, 500)), ResizeAction::Rebuild);
        assert!(!t.is_paused());
    }

    #[test]
    fn matching_frame_counts_pass() {
        assert!(check_frame_counts(3, 3, 3).is_ok());
        assert!(check_frame_counts(0, 0, 0).is_ok());
    }

    #[test]
    fn any_mismatch_is_reported() {
        for (v, f, c) in [(3, 2, 3), (3, 3, 2), (2, 3, 3)] {
            let err = check_frame_counts(v, f, c).unwrap_err();
            assert!(matches!(
                err,
                VkError::FrameCountMismatch {
                    image_views,
                    framebuffers,
                    command_buffers,
                } if (image_views, framebuffers, command_buffers) == (v, f, c)
            ));
        }
    }

    #[test]
    fn paused_frame_skips_regardless_of_generation() {
        assert_eq!(plan_frame(true, true), FrameStep::Skip);
        assert_eq!(plan_frame(true, false), FrameStep::Skip);
    }

    #[test]
    fn zero_resize_then_frame_is_skipped() {
        let mut t = SizeTracker::new(RenderSize::new(800, 600));
        t.on_resize(RenderSize::new(0, 0));
        assert_eq!(plan_frame(t.is_paused(), true), FrameStep::Skip);
        assert_eq!(plan_frame(t.is_paused(), false), FrameStep::Skip);
    }

    #[test]
    fn unpaused_without_generation_rebuilds() {
        assert_eq!(plan_frame(false, false), FrameStep::Rebuild);
        assert_eq!(plan_frame(false, true), FrameStep::Draw);
    }

    #[test]
    fn stale_acquire_rebuilds_without_submitting() {
        let step = after_acquire(classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap());
        assert_eq!(step, AcquireStep::Rebuild);
    }

    #[test]
    fn ready_acquire_submits_that_image() {
        let status = classify_acquire(Ok((1, true))).unwrap();
        assert_eq!(after_acquire(status), AcquireStep::Submit(1));
        let status = classify_acquire(Ok((2, false))).unwrap();
        assert_eq!(after_acquire(status), AcquireStep::Submit(2));
    }

    #[test]
    fn stale_present_rebuilds_after_showing() {
        let status = classify_present(Ok(true)).unwrap();
        assert_eq!(after_present(status), PresentStep::Rebuild);
        let status = classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap();
        assert_eq!(after_present(status), PresentStep::Rebuild);
        let status = classify_present(Ok(false)).unwrap();
        assert_eq!(after_present(status), PresentStep::Done);
    }

    #[test]
    fn empty_surface_rebuild_reports_what_happened() {
        assert_eq!(rebuilt_outcome(false, true), FrameOutcome::Rebuilt);
        assert_eq!(rebuilt_outcome(false, false), FrameOutcome::Skipped);
        assert_eq!(rebuilt_outcome(true, true), FrameOutcome::PresentedThenRebuilt);
        assert_eq!(rebuilt_outcome(true, false), FrameOutcome::Presented);
    }
}

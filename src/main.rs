// =============================================================================
// VULKAN TRIANGLE PRESENTER
// =============================================================================
//
// Minimal real-time presentation pipeline: pick a GPU, build a swapchain,
// compile one fixed pipeline, pre-record one command buffer per swapchain
// image, then run a steady-state acquire/submit/present loop with a small
// configurable number of frames in flight (two by default).
//
// FRAME FLOW (per iteration):
// 1. Wait for the current slot's fence
// 2. Acquire a swapchain image
// 3. Wait for whichever older frame still owns that image
// 4. Submit the image's pre-recorded commands
// 5. Present, advance the ring cursor
//
// =============================================================================

mod backend;
mod config;

use anyhow::{Context, Result};
use ash::vk;
use backend::sync::FrameSynchronizer;
use backend::{Swapchain, VulkanDevice};
use config::Config;
use glam::UVec2;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let config = Config::load();

    init_logging();
    log::info!("Starting Vulkan triangle presenter");
    log::info!("Window: {}x{}", config.window.width, config.window.height);

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

/// Info by default; RUST_LOG still wins when set
fn init_logging() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Main application struct holding all Vulkan resources.
///
/// IMPORTANT: resources must be destroyed in reverse order of creation to
/// avoid use-after-free; see the Drop impl.
pub struct App {
    // ─────────────────────────────────────────────────────────────────────────
    // CONFIGURATION
    // ─────────────────────────────────────────────────────────────────────────
    config: Config,

    // ─────────────────────────────────────────────────────────────────────────
    // WINDOW & VULKAN CORE
    // ─────────────────────────────────────────────────────────────────────────
    window: Option<Arc<Window>>,
    device: Option<Arc<VulkanDevice>>,
    swapchain: Option<Swapchain>,

    // ─────────────────────────────────────────────────────────────────────────
    // RENDER CONFIGURATION & FRAME TARGETS
    // ─────────────────────────────────────────────────────────────────────────
    render_pass: Option<vk::RenderPass>,
    pipeline_layout: Option<vk::PipelineLayout>,
    pipeline: Option<vk::Pipeline>,
    /// One framebuffer per swapchain image view
    framebuffers: Vec<vk::Framebuffer>,

    // ─────────────────────────────────────────────────────────────────────────
    // COMMANDS
    // ─────────────────────────────────────────────────────────────────────────
    command_pool: Option<vk::CommandPool>,
    /// One command buffer per swapchain image (pre-recorded once at startup)
    command_buffers: Vec<vk::CommandBuffer>,

    // ─────────────────────────────────────────────────────────────────────────
    // SYNCHRONIZATION
    // ─────────────────────────────────────────────────────────────────────────
    sync: Option<FrameSynchronizer>,

    // Pre-allocated to avoid a per-frame array on the hot path
    wait_stages: [vk::PipelineStageFlags; 1],

    /// Whether we already warned about a stale swapchain
    reported_out_of_date: bool,

    // ─────────────────────────────────────────────────────────────────────────
    // FPS TRACKING
    // ─────────────────────────────────────────────────────────────────────────
    frame_count: u32,
    last_fps_update: Instant,
    last_frame_time: Instant,
}

impl App {
    pub fn new(config: Config) -> Self {
        let now = Instant::now();
        Self {
            config,
            window: None,
            device: None,
            swapchain: None,
            render_pass: None,
            pipeline_layout: None,
            pipeline: None,
            framebuffers: Vec::new(),
            command_pool: None,
            command_buffers: Vec::new(),
            sync: None,
            wait_stages: [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
            reported_out_of_date: false,
            frame_count: 0,
            last_fps_update: now,
            last_frame_time: now,
        }
    }

    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    /// Initialize all Vulkan resources, in dependency order:
    /// device -> swapchain -> render pass -> pipeline -> framebuffers ->
    /// command buffers -> sync objects.
    fn init_vulkan(&mut self, window: Arc<Window>) -> Result<()> {
        log::info!("Initializing Vulkan...");

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Device (instance, surface, physical pick, logical device)
        // ─────────────────────────────────────────────────────────────────────
        let device = VulkanDevice::new(
            &self.config.window.title,
            window.raw_display_handle(),
            window.raw_window_handle(),
        )?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Swapchain
        // ─────────────────────────────────────────────────────────────────────
        let size = window.inner_size();
        let swapchain = Swapchain::new(device.clone(), UVec2::new(size.width, size.height))?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Render pass + fixed graphics pipeline
        // ─────────────────────────────────────────────────────────────────────
        let render_pass = backend::pipeline::create_render_pass(&device, swapchain.format)?;
        let (pipeline, pipeline_layout) = backend::pipeline::create_graphics_pipeline(
            &device,
            render_pass,
            swapchain.extent,
            Path::new(&self.config.shaders.vertex),
            Path::new(&self.config.shaders.fragment),
        )?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 4: Frame targets (one framebuffer per swapchain image)
        // ─────────────────────────────────────────────────────────────────────
        let framebuffers = backend::pipeline::create_framebuffers(
            &device,
            &swapchain.image_views,
            render_pass,
            swapchain.extent,
        )?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 5: Command pool + pre-recorded command buffers
        // ─────────────────────────────────────────────────────────────────────
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(device.queue_families.graphics);
        let command_pool = unsafe { device.device.create_command_pool(&pool_info, None)? };

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(framebuffers.len() as u32);

        let command_buffers = unsafe { device.device.allocate_command_buffers(&alloc_info)? };

        Self::record_command_buffers(
            &device.device,
            &command_buffers,
            &framebuffers,
            render_pass,
            pipeline,
            swapchain.extent,
            self.config.graphics.clear_color,
        )?;

        log::info!("Recorded {} command buffers", command_buffers.len());

        // ─────────────────────────────────────────────────────────────────────
        // STEP 6: Frame synchronizer
        // ─────────────────────────────────────────────────────────────────────
        let sync = FrameSynchronizer::new(
            &device,
            swapchain.images.len(),
            self.config.graphics.max_frames_in_flight,
        )?;

        self.device = Some(device);
        self.swapchain = Some(swapchain);
        self.render_pass = Some(render_pass);
        self.pipeline = Some(pipeline);
        self.pipeline_layout = Some(pipeline_layout);
        self.framebuffers = framebuffers;
        self.command_pool = Some(command_pool);
        self.command_buffers = command_buffers;
        self.sync = Some(sync);

        log::info!("Vulkan initialized successfully!");
        Ok(())
    }

    // =========================================================================
    // COMMAND RECORDING
    // =========================================================================

    /// Pre-record one command buffer per frame target.
    ///
    /// The content is static (clear, bind, one draw), so recording happens
    /// exactly once; the steady-state loop only resubmits.
    fn record_command_buffers(
        device: &ash::Device,
        command_buffers: &[vk::CommandBuffer],
        framebuffers: &[vk::Framebuffer],
        render_pass: vk::RenderPass,
        pipeline: vk::Pipeline,
        extent: vk::Extent2D,
        clear_color: [f32; 4],
    ) -> Result<()> {
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: clear_color,
            },
        }];

        for (&cmd, &framebuffer) in command_buffers.iter().zip(framebuffers) {
            unsafe {
                let begin_info = vk::CommandBufferBeginInfo::builder();
                device.begin_command_buffer(cmd, &begin_info)?;

                let render_pass_info = vk::RenderPassBeginInfo::builder()
                    .render_pass(render_pass)
                    .framebuffer(framebuffer)
                    .render_area(vk::Rect2D {
                        offset: vk::Offset2D { x: 0, y: 0 },
                        extent,
                    })
                    .clear_values(&clear_values);

                device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);

                device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);

                // 3 vertices, 1 instance - the whole scene
                device.cmd_draw(cmd, 3, 1, 0, 0);

                device.cmd_end_render_pass(cmd);

                device.end_command_buffer(cmd)?;
            }
        }

        Ok(())
    }

    // =========================================================================
    // RENDER LOOP
    // =========================================================================

    /// Render a single frame. This is the hot path - called every frame.
    ///
    /// Within one slot the steps are strictly sequential; overlap only
    /// happens across slots, bounded by the ring capacity.
    pub fn render_frame(&mut self) -> Result<bool> {
        let device = self.device.clone().context("Device not initialized")?;
        let swapchain = self.swapchain.as_ref().context("Swapchain not initialized")?;
        let sync = self.sync.as_mut().context("Sync objects not initialized")?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Wait for the frame that last used this ring slot
        // ─────────────────────────────────────────────────────────────────────
        sync.wait_for_current(&device.device)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Acquire the next swapchain image
        // ─────────────────────────────────────────────────────────────────────
        // The acquired index is driver-determined and unrelated to the ring
        // cursor.
        let acquire_result =
            swapchain.acquire_next_image(u64::MAX, sync.current().image_available);

        let (image_index, suboptimal) = match acquire_result {
            Ok(result) => result,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                // Swapchain recreation is not implemented; keep presenting
                // at the stale extent and say so once
                if !self.reported_out_of_date {
                    log::warn!("Swapchain out of date (resize?); recreation is not implemented");
                    self.reported_out_of_date = true;
                }
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        if suboptimal {
            log::debug!("Swapchain suboptimal for the surface");
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Cross-frame hazard - the acquired image may still be owned
        // by an older in-flight frame; wait on that frame's fence too
        // ─────────────────────────────────────────────────────────────────────
        sync.claim_image(&device.device, image_index as usize)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 4: Submit the image's pre-recorded command buffer
        // ─────────────────────────────────────────────────────────────────────
        let slot = sync.current();
        let image_available = slot.image_available;
        let render_finished = slot.render_finished;
        let in_flight_fence = slot.in_flight_fence;

        let wait_semaphores = [image_available];
        let signal_semaphores = [render_finished];
        let command_buffers = [self.command_buffers[image_index as usize]];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&self.wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device.device.reset_fences(&[in_flight_fence])?;
            device.device.queue_submit(
                device.graphics_queue,
                &[submit_info.build()],
                in_flight_fence,
            )?;
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 5: Present, then advance the ring cursor
        // ─────────────────────────────────────────────────────────────────────
        let present_result =
            swapchain.present(device.present_queue, image_index, &signal_semaphores);

        match present_result {
            Ok(suboptimal) => {
                if suboptimal {
                    log::debug!("Present reported a suboptimal swapchain");
                }
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                if !self.reported_out_of_date {
                    log::warn!("Swapchain out of date (resize?); recreation is not implemented");
                    self.reported_out_of_date = true;
                }
            }
            Err(e) => return Err(e.into()),
        }

        sync.advance();

        Ok(true)
    }

    // =========================================================================
    // FPS TRACKING
    // =========================================================================

    pub fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.frame_count += 1;

        // Update title every second
        if now.duration_since(self.last_fps_update).as_secs_f32() >= 1.0 {
            let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
            let fps = self.frame_count as f32 / elapsed;

            if let Some(ref window) = self.window {
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms)",
                    self.config.window.title,
                    fps,
                    frame_time * 1000.0,
                ));
            }

            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        if let Err(e) = self.init_vulkan(window.clone()) {
            log::error!("Failed to initialize Vulkan: {:?}", e);
            event_loop.exit();
            return;
        }

        self.window = Some(window);
    }

    /// Handle window events.
    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                if let Some(ref device) = self.device {
                    let _ = device.wait_idle();
                }
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                // Not handled: the swapchain keeps its original extent
                log::debug!("Window resized to {}x{} (ignored)", size.width, size.height);
            }

            WindowEvent::RedrawRequested => match self.render_frame() {
                Ok(rendered) => {
                    if rendered {
                        self.update_fps();
                    }
                }
                Err(e) => {
                    log::error!("Render error: {:?}", e);
                    event_loop.exit();
                }
            },

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() {
                    if let PhysicalKey::Code(KeyCode::Escape) = event.physical_key {
                        log::info!("ESC pressed, exiting...");
                        if let Some(ref device) = self.device {
                            let _ = device.wait_idle();
                        }
                        event_loop.exit();
                    }
                }
            }

            _ => {}
        }
    }

    /// Request continuous redraws so the loop runs every vsync interval.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for App {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        if let Some(ref device) = self.device {
            // Drain all in-flight GPU work before destroying anything
            let _ = device.wait_idle();

            unsafe {
                // Destroy in reverse order of creation!

                // 1. Sync objects
                if let Some(ref sync) = self.sync {
                    sync.destroy(&device.device);
                }

                // 2. Command pool (also frees the command buffers)
                if let Some(pool) = self.command_pool {
                    device.device.destroy_command_pool(pool, None);
                }

                // 3. Framebuffers
                for &framebuffer in &self.framebuffers {
                    device.device.destroy_framebuffer(framebuffer, None);
                }

                // 4. Pipeline, layout, render pass
                if let Some(pipeline) = self.pipeline {
                    device.device.destroy_pipeline(pipeline, None);
                }
                if let Some(layout) = self.pipeline_layout {
                    device.device.destroy_pipeline_layout(layout, None);
                }
                if let Some(render_pass) = self.render_pass {
                    device.device.destroy_render_pass(render_pass, None);
                }
            }
        }

        // 5. Swapchain (image views + swapchain handle)
        self.swapchain = None;

        // 6. Device, surface, instance are destroyed when the Arc drops
        self.device = None;

        log::info!("Cleanup complete");
    }
}

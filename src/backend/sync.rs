// Synchronization primitives
//
// Fences and semaphores for CPU-GPU and GPU-GPU sync, plus the frame ring
// that bounds how many frames may be in flight at once. The ring itself is
// plain data with no Vulkan handles so its invariants are unit-testable.

use ash::vk;
use std::sync::Arc;

use super::error::{RenderError, RenderResult};
use super::VulkanDevice;

/// Sync objects for one ring slot
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &ash::Device) -> RenderResult<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Fences start signaled so the first wait on each slot returns
        // immediately
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        unsafe {
            Ok(Self {
                image_available: device
                    .create_semaphore(&semaphore_info, None)
                    .map_err(RenderError::SyncObjectCreationFailed)?,
                render_finished: device
                    .create_semaphore(&semaphore_info, None)
                    .map_err(RenderError::SyncObjectCreationFailed)?,
                in_flight_fence: device
                    .create_fence(&fence_info, None)
                    .map_err(RenderError::SyncObjectCreationFailed)?,
            })
        }
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_fence(self.in_flight_fence, None);
        }
    }
}

/// Bookkeeping for frames in flight.
///
/// `cursor` walks the ring of sync slots; `image_owners` records, per swap
/// image, which slot last submitted work touching that image. Acquisition
/// order is driver-determined, so the acquired image index is unrelated to
/// the cursor and the same image can come back while an older frame still
/// owns it.
pub struct FrameRing {
    cursor: usize,
    slots: usize,
    image_owners: Vec<Option<usize>>,
}

impl FrameRing {
    pub fn new(slots: usize, image_count: usize) -> Self {
        Self {
            cursor: 0,
            slots,
            image_owners: vec![None; image_count],
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Claim `image` for the current slot.
    ///
    /// Returns the slot that previously owned the image when that slot is a
    /// different, possibly still in-flight frame - the caller must wait on
    /// that slot's fence before touching the image.
    pub fn claim(&mut self, image: usize) -> Option<usize> {
        let previous = self.image_owners[image];
        self.image_owners[image] = Some(self.cursor);
        previous.filter(|&slot| slot != self.cursor)
    }

    pub fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.slots;
    }
}

/// Owns the per-slot sync objects and the frame ring
pub struct FrameSynchronizer {
    frames: Vec<FrameSync>,
    ring: FrameRing,
}

impl FrameSynchronizer {
    /// `frames_in_flight` is how many frames the CPU may record ahead of
    /// the GPU; a zero from a bad config is bumped to one.
    pub fn new(
        device: &Arc<VulkanDevice>,
        image_count: usize,
        frames_in_flight: usize,
    ) -> RenderResult<Self> {
        let slots = frames_in_flight.max(1);

        let frames = (0..slots)
            .map(|_| FrameSync::new(&device.device))
            .collect::<RenderResult<Vec<_>>>()?;

        Ok(Self {
            frames,
            ring: FrameRing::new(slots, image_count),
        })
    }

    pub fn current(&self) -> &FrameSync {
        &self.frames[self.ring.cursor()]
    }

    /// Block until the current slot's previous submission has completed
    pub fn wait_for_current(&self, device: &ash::Device) -> RenderResult<()> {
        unsafe {
            device.wait_for_fences(&[self.current().in_flight_fence], true, u64::MAX)?;
        }
        Ok(())
    }

    /// Wait for whichever in-flight frame still owns `image`, then claim it
    /// for the current slot
    pub fn claim_image(&mut self, device: &ash::Device, image: usize) -> RenderResult<()> {
        if let Some(previous) = self.ring.claim(image) {
            unsafe {
                device.wait_for_fences(&[self.frames[previous].in_flight_fence], true, u64::MAX)?;
            }
        }
        Ok(())
    }

    pub fn advance(&mut self) {
        self.ring.advance();
    }

    pub fn destroy(&self, device: &ash::Device) {
        for frame in &self.frames {
            frame.destroy(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn cursor_advances_by_one_mod_slots() {
        let mut ring = FrameRing::new(2, 3);
        assert_eq!(ring.cursor(), 0);
        ring.advance();
        assert_eq!(ring.cursor(), 1);
        ring.advance();
        assert_eq!(ring.cursor(), 0);

        // Claims do not move the cursor
        ring.claim(2);
        assert_eq!(ring.cursor(), 0);
    }

    #[test]
    fn first_claim_of_an_image_has_no_prior_owner() {
        let mut ring = FrameRing::new(2, 3);
        assert_eq!(ring.claim(0), None);
        assert_eq!(ring.claim(1), None);
    }

    #[test]
    fn reclaiming_from_a_different_slot_reports_the_owner() {
        let mut ring = FrameRing::new(2, 3);
        assert_eq!(ring.claim(0), None); // slot 0 takes image 0
        ring.advance();
        assert_eq!(ring.claim(0), Some(0)); // slot 1 must wait on slot 0
    }

    #[test]
    fn reclaiming_from_the_same_slot_reports_nothing() {
        let mut ring = FrameRing::new(2, 3);
        ring.claim(1); // slot 0
        ring.advance();
        ring.advance(); // back to slot 0
        assert_eq!(ring.claim(1), None);
    }

    #[test]
    fn in_flight_slots_never_exceed_ring_capacity() {
        // Model one loop iteration: wait on the slot fence, wait on the
        // image's previous owner, submit (slot becomes in flight), advance.
        // Acquisition order is deliberately non-monotonic.
        let acquired = [0usize, 1, 2, 0, 0, 2, 1, 1, 0, 2, 2, 1];

        for slots in [2usize, 3] {
            let mut ring = FrameRing::new(slots, 3);
            let mut in_flight: HashSet<usize> = HashSet::new();

            for &image in &acquired {
                in_flight.remove(&ring.cursor());
                if let Some(previous) = ring.claim(image) {
                    in_flight.remove(&previous);
                }
                in_flight.insert(ring.cursor());
                assert!(in_flight.len() <= slots);
                ring.advance();
            }
        }
    }

    #[test]
    fn cursor_wraps_at_configured_slot_count() {
        let mut ring = FrameRing::new(3, 3);
        for expected in [0usize, 1, 2, 0, 1, 2] {
            assert_eq!(ring.cursor(), expected);
            ring.advance();
        }
    }
}

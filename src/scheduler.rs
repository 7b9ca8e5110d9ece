//! The frames-in-flight protocol.
//!
//! Each frame slot owns a fence, two semaphores and a command buffer. A
//! frame waits for its slot's fence, acquires an image, waits for whichever
//! slot last rendered to that image, and only then resets the fence,
//! records, submits and presents.
//!
//! The fence is reset after the acquire succeeds. If the acquire reports an
//! out-of-date swapchain, the frame is abandoned with the fence still
//! signaled, so the next wait on the slot cannot deadlock.

use crate::error::Result;

/// Outcome of acquiring a swapchain image.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Acquired {
    Image { index: u32, suboptimal: bool },
    OutOfDate,
}

/// Outcome of queuing an image for presentation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Presented {
    Optimal,
    Suboptimal,
    OutOfDate,
}

/// The operations a frame is made of, in the order the scheduler calls
/// them.
pub trait FrameTarget {
    /// Number of images in the current swapchain.
    fn image_count(&self) -> usize;

    /// Blocks until the last submission from `slot` has completed.
    fn wait_for_slot(&mut self, slot: usize) -> Result<()>;

    /// Unsignals the fence of `slot`.
    fn reset_slot(&mut self, slot: usize) -> Result<()>;

    /// Acquires the next image, signaling the image-available semaphore of
    /// `slot`.
    fn acquire_image(&mut self, slot: usize) -> Result<Acquired>;

    /// Records the command buffer of `slot` to render into `image_index`.
    fn record(&mut self, slot: usize, image_index: u32) -> Result<()>;

    /// Submits the command buffer of `slot`, signaling its fence.
    fn submit(&mut self, slot: usize) -> Result<()>;

    fn present(&mut self, slot: usize, image_index: u32) -> Result<Presented>;

    /// Waits for the device to idle and rebuilds the swapchain.
    ///
    /// Returns false if the rebuild was deferred, as it is while the window
    /// has no area.
    fn recreate_swapchain(&mut self) -> Result<bool>;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Presented { image_index: u32 },
    /// Nothing was submitted this frame.
    Skipped,
}

pub struct FrameScheduler {
    frames_in_flight: usize,
    frame_counter: u64,
    /// The slot that last rendered to each swapchain image.
    image_owners: Vec<Option<usize>>,
    resize_pending: bool,
}

impl FrameScheduler {
    pub fn new(frames_in_flight: usize) -> FrameScheduler {
        assert!(frames_in_flight > 0, "at least one frame must be in flight");

        FrameScheduler {
            frames_in_flight,
            frame_counter: 0,
            image_owners: Vec::new(),
            resize_pending: false,
        }
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Number of frames submitted so far.
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// The slot the next frame will use.
    pub fn current_slot(&self) -> usize {
        (self.frame_counter % self.frames_in_flight as u64) as usize
    }

    pub fn resize_pending(&self) -> bool {
        self.resize_pending
    }

    /// Requests a swapchain rebuild after the next present.
    pub fn notify_resized(&mut self) {
        self.resize_pending = true;
    }

    pub fn draw_frame<T>(&mut self, target: &mut T) -> Result<FrameStatus>
    where
        T: FrameTarget + ?Sized,
    {
        let slot = self.current_slot();

        target.wait_for_slot(slot)?;

        let (image_index, suboptimal) = match target.acquire_image(slot)? {
            Acquired::Image { index, suboptimal } => (index, suboptimal),
            Acquired::OutOfDate => {
                log::debug!("swapchain out of date on acquire");
                self.recreate_swapchain(target)?;
                return Ok(FrameStatus::Skipped);
            }
        };

        let image_count = target.image_count();
        if self.image_owners.len() != image_count {
            self.image_owners = vec![None; image_count];
        }

        let image = image_index as usize;
        if let Some(owner) = self.image_owners[image] {
            if owner != slot {
                target.wait_for_slot(owner)?;
            }
        }
        self.image_owners[image] = Some(slot);

        target.reset_slot(slot)?;
        target.record(slot, image_index)?;
        target.submit(slot)?;

        let presented = target.present(slot, image_index)?;
        self.frame_counter += 1;

        if suboptimal || presented != Presented::Optimal || self.resize_pending {
            log::debug!(
                "recreating swapchain (suboptimal: {}, present: {:?}, resized: {})",
                suboptimal,
                presented,
                self.resize_pending
            );
            self.recreate_swapchain(target)?;
        }

        Ok(FrameStatus::Presented { image_index })
    }

    /// Rebuilds the target's swapchain and forgets which slot owned each
    /// old image. A deferred rebuild is retried after the next present.
    pub fn recreate_swapchain<T>(&mut self, target: &mut T) -> Result<bool>
    where
        T: FrameTarget + ?Sized,
    {
        let done = target.recreate_swapchain()?;
        if done {
            self.resize_pending = false;
            self.image_owners.clear();
        } else {
            self.resize_pending = true;
        }
        Ok(done)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    enum Fence {
        Signaled,
        Unsignaled,
        Pending,
    }

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    enum Event {
        Wait(usize),
        Reset(usize),
        Acquire(usize),
        Record(usize, u32),
        Submit(usize),
        Present(usize, u32),
        Recreate,
    }

    /// A target whose GPU finishes work as soon as it is waited on.
    struct MockTarget {
        images: usize,
        fences: Vec<Fence>,
        acquires: VecDeque<Acquired>,
        presents: VecDeque<Presented>,
        next_image: u32,
        defer_recreate: bool,
        events: Vec<Event>,
    }

    impl MockTarget {
        fn new(frames: usize, images: usize) -> MockTarget {
            MockTarget {
                images,
                fences: vec![Fence::Signaled; frames],
                acquires: VecDeque::new(),
                presents: VecDeque::new(),
                next_image: 0,
                defer_recreate: false,
                events: Vec::new(),
            }
        }

        fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
            self.events.iter().filter(|e| pred(e)).count()
        }
    }

    impl FrameTarget for MockTarget {
        fn image_count(&self) -> usize {
            self.images
        }

        fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
            self.events.push(Event::Wait(slot));
            match self.fences[slot] {
                Fence::Unsignaled => panic!("waiting on slot {} would never return", slot),
                _ => self.fences[slot] = Fence::Signaled,
            }
            Ok(())
        }

        fn reset_slot(&mut self, slot: usize) -> Result<()> {
            self.events.push(Event::Reset(slot));
            assert_eq!(
                self.fences[slot],
                Fence::Signaled,
                "slot {} reset before its submission completed",
                slot
            );
            self.fences[slot] = Fence::Unsignaled;
            Ok(())
        }

        fn acquire_image(&mut self, slot: usize) -> Result<Acquired> {
            self.events.push(Event::Acquire(slot));
            Ok(self.acquires.pop_front().unwrap_or_else(|| {
                let index = self.next_image;
                self.next_image = (self.next_image + 1) % self.images as u32;
                Acquired::Image {
                    index,
                    suboptimal: false,
                }
            }))
        }

        fn record(&mut self, slot: usize, image_index: u32) -> Result<()> {
            assert_eq!(self.fences[slot], Fence::Unsignaled);
            self.events.push(Event::Record(slot, image_index));
            Ok(())
        }

        fn submit(&mut self, slot: usize) -> Result<()> {
            assert_eq!(self.fences[slot], Fence::Unsignaled);
            self.fences[slot] = Fence::Pending;
            self.events.push(Event::Submit(slot));
            Ok(())
        }

        fn present(&mut self, slot: usize, image_index: u32) -> Result<Presented> {
            self.events.push(Event::Present(slot, image_index));
            Ok(self.presents.pop_front().unwrap_or(Presented::Optimal))
        }

        fn recreate_swapchain(&mut self) -> Result<bool> {
            // Device idle.
            for fence in &mut self.fences {
                if *fence == Fence::Pending {
                    *fence = Fence::Signaled;
                }
            }
            self.events.push(Event::Recreate);
            self.next_image = 0;
            Ok(!self.defer_recreate)
        }
    }

    #[test]
    fn slots_rotate_and_fences_wait_before_reset() {
        let mut target = MockTarget::new(2, 3);
        let mut scheduler = FrameScheduler::new(2);

        for _ in 0..6 {
            let status = scheduler.draw_frame(&mut target).unwrap();
            assert!(matches!(status, FrameStatus::Presented { .. }));
        }

        assert_eq!(scheduler.frame_counter(), 6);
        assert_eq!(target.count(|e| matches!(e, Event::Submit(_))), 6);

        let slots: Vec<usize> = target
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Submit(slot) => Some(*slot),
                _ => None,
            })
            .collect();
        assert_eq!(slots, [0, 1, 0, 1, 0, 1]);

        let first: Vec<Event> = target.events[..6].to_vec();
        assert_eq!(
            first,
            [
                Event::Wait(0),
                Event::Acquire(0),
                Event::Reset(0),
                Event::Record(0, 0),
                Event::Submit(0),
                Event::Present(0, 0),
            ]
        );
    }

    #[test]
    fn out_of_date_acquire_skips_frame_without_resetting_fence() {
        let mut target = MockTarget::new(2, 3);
        let mut scheduler = FrameScheduler::new(2);

        scheduler.draw_frame(&mut target).unwrap();
        target.acquires.push_back(Acquired::OutOfDate);

        let status = scheduler.draw_frame(&mut target).unwrap();
        assert_eq!(status, FrameStatus::Skipped);
        assert_eq!(scheduler.frame_counter(), 1);
        assert_eq!(target.fences[1], Fence::Signaled);
        assert_eq!(target.count(|e| *e == Event::Recreate), 1);
        assert_eq!(target.count(|e| *e == Event::Reset(1)), 0);

        // The same slot is retried and its wait returns.
        let status = scheduler.draw_frame(&mut target).unwrap();
        assert_eq!(status, FrameStatus::Presented { image_index: 0 });
        assert_eq!(target.count(|e| *e == Event::Submit(1)), 1);
    }

    #[test]
    fn suboptimal_acquire_presents_then_recreates() {
        let mut target = MockTarget::new(2, 3);
        let mut scheduler = FrameScheduler::new(2);

        target.acquires.push_back(Acquired::Image {
            index: 1,
            suboptimal: true,
        });

        let status = scheduler.draw_frame(&mut target).unwrap();
        assert_eq!(status, FrameStatus::Presented { image_index: 1 });

        let tail = &target.events[target.events.len() - 2..];
        assert_eq!(tail, [Event::Present(0, 1), Event::Recreate]);
    }

    #[test]
    fn out_of_date_present_recreates() {
        let mut target = MockTarget::new(2, 3);
        let mut scheduler = FrameScheduler::new(2);

        target.presents.push_back(Presented::OutOfDate);
        scheduler.draw_frame(&mut target).unwrap();
        assert_eq!(target.events.last(), Some(&Event::Recreate));

        target.presents.push_back(Presented::Suboptimal);
        scheduler.draw_frame(&mut target).unwrap();
        assert_eq!(target.count(|e| *e == Event::Recreate), 2);
    }

    #[test]
    fn image_held_by_other_slot_is_waited_on() {
        let mut target = MockTarget::new(2, 3);
        let mut scheduler = FrameScheduler::new(2);

        for index in [0, 0] {
            target.acquires.push_back(Acquired::Image {
                index,
                suboptimal: false,
            });
        }

        scheduler.draw_frame(&mut target).unwrap();
        target.events.clear();
        scheduler.draw_frame(&mut target).unwrap();

        assert_eq!(
            &target.events[..3],
            [Event::Wait(1), Event::Acquire(1), Event::Wait(0)]
        );
        assert_eq!(target.fences[0], Fence::Signaled);
    }

    #[test]
    fn resize_recreates_after_present() {
        let mut target = MockTarget::new(2, 3);
        let mut scheduler = FrameScheduler::new(2);

        scheduler.notify_resized();
        assert!(scheduler.resize_pending());

        scheduler.draw_frame(&mut target).unwrap();
        assert!(!scheduler.resize_pending());
        assert_eq!(target.events.last(), Some(&Event::Recreate));

        scheduler.draw_frame(&mut target).unwrap();
        assert_eq!(target.count(|e| *e == Event::Recreate), 1);
    }

    #[test]
    fn deferred_recreation_stays_pending() {
        let mut target = MockTarget::new(1, 2);
        let mut scheduler = FrameScheduler::new(1);

        target.defer_recreate = true;
        target.acquires.push_back(Acquired::OutOfDate);
        assert_eq!(
            scheduler.draw_frame(&mut target).unwrap(),
            FrameStatus::Skipped
        );
        assert!(scheduler.resize_pending());

        target.defer_recreate = false;
        scheduler.draw_frame(&mut target).unwrap();
        assert!(!scheduler.resize_pending());
    }

    #[test]
    fn single_frame_in_flight() {
        let mut target = MockTarget::new(1, 2);
        let mut scheduler = FrameScheduler::new(1);

        for _ in 0..4 {
            scheduler.draw_frame(&mut target).unwrap();
        }
        assert!(target
            .events
            .iter()
            .all(|e| !matches!(e, Event::Submit(s) | Event::Wait(s) if *s != 0)));
    }
}

//! GPU queue executor: ordered command-buffer submission with fence-driven
//! completion callbacks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use ash::vk;
use log::error;

use crate::sync_util::Synchronized;

const POLL_INTERVAL: Duration = Duration::from_millis(2);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

pub type OnCompleteFunction = Box<dyn FnOnce() + Send + 'static>;

struct InFlightSubmit {
    fence: vk::Fence,
    callbacks: Vec<OnCompleteFunction>,
}

/// The submission queue state, only reachable under its mutex.
struct Queue {
    device: ash::Device,
    queue: vk::Queue,
    ready_command_buffers: Vec<Option<vk::CommandBuffer>>,
    completion_handlers: Vec<Option<OnCompleteFunction>>,
    num_submitted: usize,
    unused_submit_fences: VecDeque<vk::Fence>,
    in_flight_submits: Vec<InFlightSubmit>,
}

impl Queue {
    fn in_flight_fences(&self) -> Vec<vk::Fence> {
        self.in_flight_submits.iter().map(|s| s.fence).collect()
    }

    fn add_command_buffer_slot(&mut self) -> u32 {
        self.ready_command_buffers.push(None);
        self.completion_handlers.push(None);
        (self.ready_command_buffers.len() - 1) as u32
    }

    fn submit(&mut self, index: u32, command_buffer: vk::CommandBuffer, callback: Option<OnCompleteFunction>) {
        self.ready_command_buffers[index as usize] = Some(command_buffer);
        self.completion_handlers[index as usize] = callback;

        // Submit the contiguous run of filled slots starting at the
        // submission watermark, if any.
        let run: Vec<vk::CommandBuffer> = self.ready_command_buffers[self.num_submitted..]
            .iter()
            .map_while(|cb| *cb)
            .collect();
        if run.is_empty() {
            return;
        }

        let fence = self.get_fence();
        let first = self.num_submitted;
        self.num_submitted += run.len();

        let submit_info = vk::SubmitInfo::default().command_buffers(&run);
        unsafe {
            self.device
                .queue_submit(self.queue, &[submit_info], fence)
                .expect("failed to submit command buffers");
        }

        // Callbacks fire in slot-index order within the submission.
        let callbacks: Vec<OnCompleteFunction> = self.completion_handlers[first..self.num_submitted]
            .iter_mut()
            .filter_map(Option::take)
            .collect();
        self.in_flight_submits.push(InFlightSubmit { fence, callbacks });
    }

    fn get_fence(&mut self) -> vk::Fence {
        if let Some(fence) = self.unused_submit_fences.pop_front() {
            return fence;
        }
        unsafe {
            self.device
                .create_fence(&vk::FenceCreateInfo::default(), None)
                .expect("failed to create submit fence")
        }
    }

    /// Invokes the callbacks of every signalled submission and returns its
    /// fence to the pool.
    fn flush(&mut self) {
        let device = self.device.clone();
        let mut remaining = Vec::with_capacity(self.in_flight_submits.len());
        for submit in self.in_flight_submits.drain(..) {
            let signalled = unsafe { device.get_fence_status(submit.fence) }.unwrap_or(false);
            if signalled {
                for callback in submit.callbacks {
                    callback();
                }
                unsafe {
                    let _ = device.reset_fences(&[submit.fence]);
                }
                self.unused_submit_fences.push_back(submit.fence);
            } else {
                remaining.push(submit);
            }
        }
        self.in_flight_submits = remaining;
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        unsafe {
            for submit in &self.in_flight_submits {
                self.device.destroy_fence(submit.fence, None);
            }
            for fence in &self.unused_submit_fences {
                self.device.destroy_fence(*fence, None);
            }
        }
    }
}

/// Guarantees GPU submission order matches slot-allocation order while
/// command buffers are recorded on any worker thread in any order.
///
/// A dedicated scheduler thread waits on the in-flight fences and invokes
/// completion callbacks as submissions finish executing.
pub struct GpuExecutor {
    device: ash::Device,
    queue: Arc<Synchronized<Queue>>,
    scheduler_stop: Arc<AtomicBool>,
    scheduler_thread: Option<JoinHandle<()>>,
}

impl GpuExecutor {
    pub fn new(device: ash::Device, queue: vk::Queue) -> Self {
        let queue = Arc::new(Synchronized::new(Queue {
            device: device.clone(),
            queue,
            ready_command_buffers: Vec::new(),
            completion_handlers: Vec::new(),
            num_submitted: 0,
            unused_submit_fences: VecDeque::new(),
            in_flight_submits: Vec::new(),
        }));

        let scheduler_stop = Arc::new(AtomicBool::new(false));
        let scheduler_thread = {
            let queue = Arc::clone(&queue);
            let device = device.clone();
            let stop = Arc::clone(&scheduler_stop);
            std::thread::Builder::new()
                .name("teide-gpu-scheduler".into())
                .spawn(move || {
                    while !stop.load(Ordering::Acquire) {
                        let fences = queue.lock(|q| q.in_flight_fences());
                        if fences.is_empty() {
                            std::thread::sleep(POLL_INTERVAL);
                            continue;
                        }
                        let wait =
                            unsafe { device.wait_for_fences(&fences, false, POLL_INTERVAL.as_nanos() as u64) };
                        match wait {
                            Ok(()) => queue.lock(Queue::flush),
                            Err(vk::Result::TIMEOUT) => {}
                            Err(result) => {
                                error!("Device lost while waiting for fences: {result}");
                                std::process::abort();
                            }
                        }
                    }
                })
                .expect("failed to spawn GPU scheduler thread")
        };

        Self { device, queue, scheduler_stop, scheduler_thread: Some(scheduler_thread) }
    }

    /// Reserves the next ordinal in the submission sequence. Must be called
    /// from a single coordinating thread.
    pub fn add_command_buffer_slot(&self) -> u32 {
        self.queue.lock(Queue::add_command_buffer_slot)
    }

    /// Places an ended command buffer into its slot and submits any
    /// contiguous run this completes. May be called from any thread.
    pub fn submit_command_buffer(
        &self,
        index: u32,
        command_buffer: vk::CommandBuffer,
        callback: Option<OnCompleteFunction>,
    ) {
        self.queue.lock(|q| q.submit(index, command_buffer, callback));
    }

    /// Submits work outside the slot sequence (frame presentation) while
    /// holding the same queue lock, so the `vk::Queue` is never used from
    /// two threads unsynchronized.
    pub fn submit_with_sync(
        &self,
        command_buffers: &[vk::CommandBuffer],
        wait_semaphores: &[vk::Semaphore],
        wait_stages: &[vk::PipelineStageFlags],
        signal_semaphores: &[vk::Semaphore],
        fence: vk::Fence,
    ) -> Result<(), vk::Result> {
        self.queue.lock(|q| {
            let submit_info = vk::SubmitInfo::default()
                .command_buffers(command_buffers)
                .wait_semaphores(wait_semaphores)
                .wait_dst_stage_mask(wait_stages)
                .signal_semaphores(signal_semaphores);
            unsafe { self.device.queue_submit(q.queue, &[submit_info], fence) }
        })
    }

    /// Runs `f` with the raw queue while holding the queue lock. Used for
    /// presentation.
    pub fn lock_queue<R>(&self, f: impl FnOnce(vk::Queue) -> R) -> R {
        self.queue.lock(|q| f(q.queue))
    }

    /// Blocks until every in-flight submission has executed, then runs the
    /// outstanding completion callbacks.
    pub fn wait_for_tasks(&self) {
        let fences = self.queue.lock(|q| q.in_flight_fences());
        if !fences.is_empty() {
            let wait =
                unsafe { self.device.wait_for_fences(&fences, true, SHUTDOWN_TIMEOUT.as_nanos() as u64) };
            if wait == Err(vk::Result::TIMEOUT) {
                error!("Timeout while waiting for command buffer execution to complete!");
            }
        }
        self.queue.lock(Queue::flush);
    }
}

impl Drop for GpuExecutor {
    fn drop(&mut self) {
        self.scheduler_stop.store(true, Ordering::Release);
        if let Some(thread) = self.scheduler_thread.take() {
            let _ = thread.join();
        }
        self.wait_for_tasks();
    }
}

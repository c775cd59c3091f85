//! CPU and GPU executors and the unified scheduler that fuses them.

pub mod cpu;
pub mod gpu;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ash::vk;

use crate::task::{make_promise, Task};
use crate::vulkan::command_buffer::{CommandBuffer, CommandBufferPool};
use cpu::CpuExecutor;
use gpu::GpuExecutor;

/// Frames the CPU may be working on while the GPU executes earlier ones.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

struct FrameCommandPools {
    /// One command pool per worker thread, indexed by the pool's worker id.
    pools: Vec<Mutex<CommandBufferPool>>,
}

struct FrameState {
    device: ash::Device,
    frames: [FrameCommandPools; MAX_FRAMES_IN_FLIGHT],
    frame_index: AtomicUsize,
}

impl Drop for FrameState {
    fn drop(&mut self) {
        for frame in &mut self.frames {
            for pool in &mut frame.pools {
                pool.get_mut().unwrap().destroy(&self.device);
            }
        }
    }
}

impl FrameState {
    fn acquire_command_buffer(&self, worker: u32) -> CommandBuffer {
        let frame = self.frame_index.load(Ordering::Acquire);
        let command_buffer =
            self.frames[frame].pools[worker as usize].lock().unwrap().acquire(&self.device);
        CommandBuffer::new(self.device.clone(), command_buffer)
    }
}

/// Hands out per-worker, per-frame pooled command buffers to tasks that
/// record outside the GPU executor's slot sequence.
#[derive(Clone)]
pub struct CommandBufferSource {
    state: Arc<FrameState>,
}

impl CommandBufferSource {
    pub fn acquire(&self, worker: u32) -> CommandBuffer {
        self.state.acquire_command_buffer(worker)
    }
}

/// Fuses the CPU and GPU executors into one scheduling surface and owns the
/// per-frame command buffer pools that back them.
pub struct Scheduler {
    cpu: CpuExecutor,
    gpu: Arc<GpuExecutor>,
    state: Arc<FrameState>,
}

impl Scheduler {
    pub fn new(num_threads: u32, device: ash::Device, queue: vk::Queue, queue_family_index: u32) -> Self {
        let num_threads = num_threads.max(1);
        let make_frame = || FrameCommandPools {
            pools: (0..num_threads)
                .map(|_| Mutex::new(CommandBufferPool::new(&device, queue_family_index)))
                .collect(),
        };
        let state = Arc::new(FrameState {
            device: device.clone(),
            frames: [make_frame(), make_frame()],
            frame_index: AtomicUsize::new(0),
        });
        Self {
            cpu: CpuExecutor::new(num_threads),
            gpu: Arc::new(GpuExecutor::new(device, queue)),
            state,
        }
    }

    pub fn thread_count(&self) -> u32 {
        self.cpu.thread_count()
    }

    /// Worker index of the calling thread, when called from a pool worker.
    pub fn thread_index() -> Option<u32> {
        cpu::current_worker_index()
    }

    pub fn gpu(&self) -> &GpuExecutor {
        &self.gpu
    }

    pub fn command_buffer_source(&self) -> CommandBufferSource {
        CommandBufferSource { state: Arc::clone(&self.state) }
    }

    /// Schedules a CPU-only task.
    pub fn schedule<T, F>(&self, f: F) -> Task<T>
    where
        T: Send + 'static,
        F: FnOnce(u32) -> T + Send + 'static,
    {
        self.cpu.launch_task(f)
    }

    /// Schedules a task that records GPU commands. The returned task is
    /// fulfilled with the callable's result only once the GPU has finished
    /// executing the recorded commands; the command buffer's resource
    /// references are released at the same point.
    pub fn schedule_gpu<T, F>(&self, f: F) -> Task<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut CommandBuffer) -> T + Send + 'static,
    {
        let sequence_index = self.gpu.add_command_buffer_slot();
        let (promise, task) = make_promise();
        let gpu = Arc::clone(&self.gpu);
        let state = Arc::clone(&self.state);

        self.cpu.launch_task(move |worker| {
            let mut command_buffer = state.acquire_command_buffer(worker);
            let ret = f(&mut command_buffer);
            let (raw, resources) = command_buffer.finish();
            gpu.submit_command_buffer(
                sequence_index,
                raw,
                Some(Box::new(move || {
                    drop(resources);
                    promise.set(ret);
                })),
            );
        });

        task
    }

    /// Schedules a CPU task gated on `dependency`; the dependency's value is
    /// passed as the callable's argument.
    pub fn schedule_after<In, Out, F>(&self, dependency: Task<In>, f: F) -> Task<Out>
    where
        In: Clone + Send + 'static,
        Out: Send + 'static,
        F: FnOnce(In) -> Out + Send + 'static,
    {
        self.cpu.launch_task_after(dependency, f)
    }

    /// Advances per-frame state, recycling the command buffers of the frame
    /// slot being entered (whose GPU work the caller has already waited on).
    pub fn next_frame(&self) {
        let next = (self.state.frame_index.load(Ordering::Acquire) + 1) % MAX_FRAMES_IN_FLIGHT;
        self.state.frame_index.store(next, Ordering::Release);
        for pool in &self.state.frames[next].pools {
            pool.lock().unwrap().reset(&self.state.device);
        }
    }

    /// Drains the CPU executor.
    pub fn wait_for_cpu(&self) {
        self.cpu.wait_for_tasks();
    }

    /// Drains the CPU executor, then waits for all in-flight GPU work.
    pub fn wait_for_gpu(&self) {
        self.wait_for_cpu();
        self.gpu.wait_for_tasks();
    }
}

mod common;

use std::sync::{Arc, Mutex};

use common::test_device;

#[test]
fn gpu_tasks_complete_in_slot_order() {
    let Some(device) = test_device() else { return };
    let scheduler = device.scheduler();

    // Submit command buffers out of order; completion callbacks must still
    // fire in slot order.
    let gpu = scheduler.gpu();
    let source = scheduler.command_buffer_source();
    let completed: Arc<Mutex<Vec<u32>>> = Arc::default();

    let slots: Vec<u32> = (0..4).map(|_| gpu.add_command_buffer_slot()).collect();
    for &slot in [slots[2], slots[0], slots[3], slots[1]].iter() {
        let cmd = source.acquire(0);
        let (raw, resources) = cmd.finish();
        let completed = Arc::clone(&completed);
        gpu.submit_command_buffer(
            slot,
            raw,
            Some(Box::new(move || {
                drop(resources);
                completed.lock().unwrap().push(slot);
            })),
        );
    }

    scheduler.wait_for_gpu();
    assert_eq!(*completed.lock().unwrap(), vec![0, 1, 2, 3]);
}

#[test]
fn schedule_gpu_resolves_after_execution() {
    let Some(device) = test_device() else { return };
    let scheduler = device.scheduler();

    let task = scheduler.schedule_gpu(|_cmd| 42u32);
    assert_eq!(task.get(), 42);
}

#[test]
fn schedule_after_chains_gpu_results_to_cpu_tasks() {
    let Some(device) = test_device() else { return };
    let scheduler = device.scheduler();

    let gpu_task = scheduler.schedule_gpu(|_cmd| 10u32);
    let chained = scheduler.schedule_after(gpu_task, |value| value + 1);
    assert_eq!(chained.get(), 11);
}

#[test]
fn wait_for_gpu_drains_everything() {
    let Some(device) = test_device() else { return };
    let scheduler = device.scheduler();

    let tasks: Vec<_> = (0..8).map(|i| scheduler.schedule_gpu(move |_cmd| i)).collect();
    scheduler.wait_for_gpu();
    for (i, task) in tasks.iter().enumerate() {
        assert!(task.is_ready());
        assert_eq!(task.get(), i);
    }
}

#[test]
fn next_frame_recycles_command_buffers() {
    let Some(device) = test_device() else { return };
    let scheduler = device.scheduler();

    for _ in 0..4 {
        scheduler.schedule_gpu(|_cmd| ()).wait();
        scheduler.wait_for_gpu();
        scheduler.next_frame();
    }
}

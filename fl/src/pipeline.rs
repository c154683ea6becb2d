//! Finalization pipeline: background image writers.
//!
//! The run command hands each rendered buffer to the pipeline and moves on
//! to the next program while worker threads read the pixels back, encode
//! them and write the file.
//!
//! # Shutdown
//!
//! Workers read the shutdown flag *before* popping the queue and exit only
//! when that pop came back empty. A task enqueued before
//! [`FinalizationPipeline::shutdown`] is therefore always written, no matter
//! how the flag store interleaves with the pops.

use anyhow::{Context, Result, anyhow};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::backend::{ComputeDevice, DeviceBuffer, ImageSink};

/// A rendered image waiting to be written.
pub struct SaveTask {
    /// Owned by the task; released by the worker once handled.
    pub image: DeviceBuffer,
    pub device: Arc<dyn ComputeDevice>,
    pub source: PathBuf,
    pub dest: PathBuf,
}

/// Counters reported when the pipeline shuts down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub produced: usize,
    /// Tasks written successfully.
    pub consumed: usize,
    /// Tasks whose buffer was already released.
    pub skipped: usize,
    /// Tasks whose read-back or write failed.
    pub failed: usize,
}

impl PipelineStats {
    /// Tasks a worker has taken off the queue.
    pub fn processed(&self) -> usize {
        self.consumed + self.skipped + self.failed
    }
}

struct Shared {
    queue: Mutex<VecDeque<SaveTask>>,
    shutdown: AtomicBool,
    produced: AtomicUsize,
    consumed: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
}

impl Shared {
    fn pop(&self) -> Option<SaveTask> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    fn stats(&self) -> PipelineStats {
        PipelineStats {
            produced: self.produced.load(Ordering::SeqCst),
            consumed: self.consumed.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}

/// Shortest sleep between polls of an empty queue.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Unbounded queue of [`SaveTask`]s drained by a fixed set of workers.
pub struct FinalizationPipeline {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    poll_interval: Duration,
}

impl FinalizationPipeline {
    /// Start `workers` writer threads. Use inline writes instead of a
    /// pipeline when no workers are wanted.
    ///
    /// `poll_interval` is raised to [`MIN_POLL_INTERVAL`] so idle workers
    /// never spin.
    pub fn start(workers: usize, sink: Arc<dyn ImageSink>, poll_interval: Duration) -> Result<Self> {
        if workers == 0 {
            return Err(anyhow!("A finalization pipeline needs at least one worker"));
        }
        let poll_interval = poll_interval.max(MIN_POLL_INTERVAL);

        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            shutdown: AtomicBool::new(false),
            produced: AtomicUsize::new(0),
            consumed: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        });

        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let shared = Arc::clone(&shared);
            let sink = Arc::clone(&sink);
            let handle = thread::Builder::new()
                .name(format!("fl-save-{id}"))
                .spawn(move || worker_loop(id, &shared, sink.as_ref(), poll_interval))
                .context("Failed to spawn save worker")?;
            handles.push(handle);
        }
        debug!(workers, ?poll_interval, "Finalization pipeline started");

        Ok(Self {
            shared,
            workers: handles,
            poll_interval,
        })
    }

    /// Queue a task. Never blocks.
    pub fn enqueue(&self, task: SaveTask) {
        debug!(dest = %task.dest.display(), "Queued image");
        self.shared
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(task);
        self.shared.produced.fetch_add(1, Ordering::SeqCst);
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn stats(&self) -> PipelineStats {
        self.shared.stats()
    }

    /// Request shutdown, wait for the queue to drain and join every worker.
    pub fn shutdown(mut self) -> Result<PipelineStats> {
        self.join_workers()?;
        Ok(self.shared.stats())
    }

    fn join_workers(&mut self) -> Result<()> {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        let mut panicked = 0;
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                panicked += 1;
            }
        }
        if panicked > 0 {
            return Err(anyhow!("{panicked} save worker(s) panicked"));
        }
        Ok(())
    }
}

impl Drop for FinalizationPipeline {
    fn drop(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        if let Err(e) = self.join_workers() {
            error!("Finalization pipeline: {e:#}");
        }
    }
}

fn worker_loop(id: usize, shared: &Shared, sink: &dyn ImageSink, poll_interval: Duration) {
    debug!(worker = id, "Save worker started");
    loop {
        let shutdown_requested = shared.shutdown.load(Ordering::SeqCst);
        match shared.pop() {
            Some(task) => process(shared, sink, task),
            None if shutdown_requested => break,
            None => thread::sleep(poll_interval),
        }
    }
    debug!(worker = id, "Save worker exiting");
}

fn process(shared: &Shared, sink: &dyn ImageSink, task: SaveTask) {
    if task.image.is_released() {
        warn!(
            "[run] Buffer for {} was released before it could be saved, skipping",
            task.source.display()
        );
        shared.skipped.fetch_add(1, Ordering::SeqCst);
        return;
    }

    let written = write_task(sink, &task);
    task.image.release();
    match written {
        Ok(()) => {
            info!("[run] Saved {}", task.dest.display());
            shared.consumed.fetch_add(1, Ordering::SeqCst);
        }
        Err(e) => {
            error!("[run] Failed to save {}: {e:#}", task.dest.display());
            shared.failed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Read the task's buffer back and write it through `sink`. Used inline
/// when there are no workers.
pub fn write_task(sink: &dyn ImageSink, task: &SaveTask) -> Result<()> {
    let image = task.device.read_back(&task.image)?;
    sink.write(&image, &task.dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::host::HostDevice;
    use anyhow::bail;
    use image::RgbaImage;
    use std::path::Path;

    /// Records destinations instead of touching the filesystem.
    #[derive(Default)]
    struct RecordingSink {
        written: Mutex<Vec<PathBuf>>,
    }

    impl ImageSink for RecordingSink {
        fn write(&self, _image: &RgbaImage, dest: &Path) -> Result<()> {
            if dest.ends_with("fail.png") {
                bail!("disk full");
            }
            self.written.lock().unwrap().push(dest.to_path_buf());
            Ok(())
        }
    }

    fn task(device: &Arc<dyn ComputeDevice>, name: &str) -> SaveTask {
        SaveTask {
            image: device.allocate("Output", 2, 2).unwrap(),
            device: Arc::clone(device),
            source: PathBuf::from(format!("/in/{name}.fl")),
            dest: PathBuf::from(format!("/out/{name}")),
        }
    }

    fn device() -> Arc<dyn ComputeDevice> {
        Arc::new(HostDevice::new())
    }

    #[test]
    fn every_task_is_written_for_any_worker_count() {
        for workers in 1..=4 {
            let sink = Arc::new(RecordingSink::default());
            let pipeline =
                FinalizationPipeline::start(workers, sink.clone(), Duration::from_millis(1))
                    .unwrap();
            let device = device();
            for i in 0..25 {
                pipeline.enqueue(task(&device, &format!("{i}.png")));
            }

            let stats = pipeline.shutdown().unwrap();
            assert_eq!(stats.produced, 25);
            assert_eq!(stats.consumed, 25, "workers = {workers}");

            let mut written = sink.written.lock().unwrap().clone();
            written.sort();
            written.dedup();
            assert_eq!(written.len(), 25, "no task written twice or lost");
        }
    }

    #[test]
    fn released_buffer_is_skipped_and_later_tasks_survive() {
        let sink = Arc::new(RecordingSink::default());
        let pipeline =
            FinalizationPipeline::start(1, sink.clone(), Duration::from_millis(1)).unwrap();
        let device = device();

        let stale = task(&device, "stale.png");
        stale.image.release();
        pipeline.enqueue(stale);
        pipeline.enqueue(task(&device, "fresh.png"));

        let stats = pipeline.shutdown().unwrap();
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.consumed, 1);
        assert_eq!(
            *sink.written.lock().unwrap(),
            vec![PathBuf::from("/out/fresh.png")]
        );
    }

    #[test]
    fn write_failure_releases_buffer_and_continues() {
        let sink = Arc::new(RecordingSink::default());
        let pipeline =
            FinalizationPipeline::start(2, sink.clone(), Duration::from_millis(1)).unwrap();
        let device = device();

        let failing = task(&device, "fail.png");
        let handle = failing.image.clone();
        pipeline.enqueue(failing);
        pipeline.enqueue(task(&device, "ok.png"));

        let stats = pipeline.shutdown().unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.consumed, 1);
        assert_eq!(stats.processed(), stats.produced);
        assert!(handle.is_released());
    }

    #[test]
    fn dropping_without_shutdown_still_drains() {
        let sink = Arc::new(RecordingSink::default());
        {
            let pipeline =
                FinalizationPipeline::start(1, sink.clone(), Duration::from_millis(1)).unwrap();
            pipeline.enqueue(task(&device(), "a.png"));
        }
        assert_eq!(sink.written.lock().unwrap().len(), 1);
    }

    #[test]
    fn zero_workers_is_rejected() {
        let sink = Arc::new(RecordingSink::default());
        assert!(FinalizationPipeline::start(0, sink, Duration::from_millis(1)).is_err());
    }

    #[test]
    fn zero_poll_interval_is_raised_and_still_drains() {
        let sink = Arc::new(RecordingSink::default());
        let pipeline = FinalizationPipeline::start(2, sink.clone(), Duration::ZERO).unwrap();
        assert_eq!(pipeline.poll_interval(), MIN_POLL_INTERVAL);

        let device = device();
        pipeline.enqueue(task(&device, "a.png"));
        pipeline.enqueue(task(&device, "b.png"));
        let stats = pipeline.shutdown().unwrap();
        assert_eq!(stats.consumed, 2);
        assert_eq!(sink.written.lock().unwrap().len(), 2);
    }

    #[test]
    fn inline_write_uses_device_read_back() {
        let sink = RecordingSink::default();
        let device = device();
        write_task(&sink, &task(&device, "inline.png")).unwrap();

        let released = task(&device, "gone.png");
        released.image.release();
        assert!(write_task(&sink, &released).is_err());
    }
}

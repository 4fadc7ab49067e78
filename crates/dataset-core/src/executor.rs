//! Caption fan-out executor
//!
//! A fixed pool of OS threads shares one job channel. Each worker builds its
//! own captioner through the [`CaptionerFactory`] on its first job and keeps
//! it for the lifetime of the pool, so a model is loaded once per worker, not
//! once per frame. Captioners never cross threads and need not be `Send`.
//!
//! ```text
//!             jobs (MPMC)              events
//! [controller] ---------> [worker 0..N] ------> [controller]
//! ```
//!
//! Every submitted frame produces exactly one result. Failures (unreadable
//! image, model load error, inference error, panic, timeout) become a `None`
//! caption for that frame and never affect the other frames.

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use image::RgbImage;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use task_dataset_common::{CaptionedSlice, ProcessingError, Result, SlicePair};
use tracing::{debug, info, warn};

use crate::image_io::load_image;

/// A loaded captioning model. Lives on exactly one worker thread.
pub trait Captioner {
    /// Produce one caption for one image
    fn caption(&mut self, image: &RgbImage) -> Result<String>;

    /// Drop per-item buffers once an item is done
    fn release_transient(&mut self) {}
}

/// Builds one captioner per worker
pub trait CaptionerFactory: Send + Sync + 'static {
    type Captioner: Captioner;

    /// Load a captioner for worker `worker`. Called on the worker's thread.
    fn load(&self, worker: usize) -> Result<Self::Captioner>;
}

/// Worker pool configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Number of worker threads
    pub workers: usize,
    /// Per-item time limit; `None` waits indefinitely
    pub item_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            item_timeout: None,
        }
    }
}

/// Caption of one frame outside of a dataset build
#[derive(Debug)]
pub struct FrameCaption {
    pub frame_path: PathBuf,
    pub caption: Result<String>,
}

struct Job {
    batch: u64,
    seq: usize,
    frame_path: PathBuf,
}

enum Event {
    Started {
        worker: usize,
        batch: u64,
        seq: usize,
    },
    Finished {
        worker: usize,
        batch: u64,
        seq: usize,
        caption: Result<String>,
    },
}

struct Worker {
    retired: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

struct Running {
    seq: usize,
    started: Instant,
}

/// Pool of captioning workers with worker-local models
pub struct CaptionPool<F: CaptionerFactory> {
    factory: Arc<F>,
    config: PoolConfig,
    job_tx: Option<Sender<Job>>,
    job_rx: Receiver<Job>,
    event_tx: Sender<Event>,
    event_rx: Receiver<Event>,
    workers: HashMap<usize, Worker>,
    next_worker_id: usize,
    next_batch: u64,
}

impl<F: CaptionerFactory> CaptionPool<F> {
    /// Start `config.workers` threads. Models are loaded lazily by each worker.
    pub fn new(factory: F, config: PoolConfig) -> Result<Self> {
        if config.workers == 0 {
            return Err(ProcessingError::InvalidConfig(
                "caption pool needs at least one worker".to_string(),
            ));
        }

        let (job_tx, job_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();

        let mut pool = Self {
            factory: Arc::new(factory),
            config,
            job_tx: Some(job_tx),
            job_rx,
            event_tx,
            event_rx,
            workers: HashMap::new(),
            next_worker_id: 0,
            next_batch: 0,
        };

        for _ in 0..pool.config.workers {
            pool.spawn_worker()?;
        }

        info!(
            "Caption pool started with {} workers (timeout: {:?})",
            pool.config.workers, pool.config.item_timeout
        );
        Ok(pool)
    }

    /// Number of live (non-retired) workers
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Caption every pair. Returns exactly one result per pair, in completion
    /// order; a failed caption is `None`.
    pub fn generate(&mut self, pairs: Vec<SlicePair>) -> Vec<CaptionedSlice> {
        let frames = pairs.iter().map(|p| p.frame_path.clone()).collect();
        let mut pairs: Vec<Option<SlicePair>> = pairs.into_iter().map(Some).collect();

        self.run_batch(frames)
            .into_iter()
            .filter_map(|(seq, caption)| {
                let pair = pairs[seq].take()?;
                let caption = match caption {
                    Ok(text) => Some(text),
                    Err(e) => {
                        warn!("Caption failed for {}: {}", pair.slice_id(), e);
                        None
                    }
                };
                Some(CaptionedSlice { pair, caption })
            })
            .collect()
    }

    /// Caption arbitrary frame images, in completion order
    pub fn caption_frames(&mut self, frames: Vec<PathBuf>) -> Vec<FrameCaption> {
        let paths = frames.clone();
        self.run_batch(frames)
            .into_iter()
            .map(|(seq, caption)| FrameCaption {
                frame_path: paths[seq].clone(),
                caption,
            })
            .collect()
    }

    /// Close the job channel and join every live worker. Idempotent.
    pub fn shutdown(&mut self) {
        if self.job_tx.take().is_none() {
            return;
        }

        for (id, worker) in self.workers.drain() {
            if worker.handle.join().is_err() {
                warn!("Caption worker {} panicked during shutdown", id);
            }
        }
        debug!("Caption pool shut down");
    }

    fn spawn_worker(&mut self) -> Result<()> {
        let id = self.next_worker_id;
        self.next_worker_id += 1;

        let retired = Arc::new(AtomicBool::new(false));
        let factory = Arc::clone(&self.factory);
        let jobs = self.job_rx.clone();
        let events = self.event_tx.clone();
        let flag = Arc::clone(&retired);

        let handle = thread::Builder::new()
            .name(format!("caption-worker-{id}"))
            .spawn(move || worker_loop(id, factory.as_ref(), &jobs, &events, &flag))?;

        self.workers.insert(id, Worker { retired, handle });
        Ok(())
    }

    /// Retire a worker stuck on a timed-out item and start a replacement
    fn replace_worker(&mut self, id: usize) {
        if let Some(worker) = self.workers.remove(&id) {
            worker.retired.store(true, Ordering::Release);
            // Detached: it exits after its current item, whose result is discarded.
            drop(worker.handle);
        }
        if let Err(e) = self.spawn_worker() {
            warn!("Failed to spawn replacement caption worker: {}", e);
        }
    }

    /// Submit one job per frame and collect `(seq, caption)` in completion order
    fn run_batch(&mut self, frames: Vec<PathBuf>) -> Vec<(usize, Result<String>)> {
        let total = frames.len();
        let batch = self.next_batch;
        self.next_batch += 1;

        let Some(job_tx) = self.job_tx.clone() else {
            warn!("Caption pool is shut down; {} frames left uncaptioned", total);
            return (0..total)
                .map(|seq| {
                    let err = ProcessingError::CaptionFailure("caption pool is shut down".into());
                    (seq, Err(err))
                })
                .collect();
        };

        let mut results = Vec::with_capacity(total);
        let mut resolved = vec![false; total];

        for (seq, frame_path) in frames.into_iter().enumerate() {
            if job_tx.send(Job { batch, seq, frame_path }).is_err() {
                resolved[seq] = true;
                let err = ProcessingError::CaptionFailure("job channel closed".into());
                results.push((seq, Err(err)));
            }
        }
        drop(job_tx);

        let mut running: HashMap<usize, Running> = HashMap::new();

        while results.len() < total {
            let event = match self.config.item_timeout {
                None => match self.event_rx.recv() {
                    Ok(event) => event,
                    Err(_) => break,
                },
                Some(timeout) => {
                    let now = Instant::now();
                    let wait = running
                        .values()
                        .map(|r| (r.started + timeout).saturating_duration_since(now))
                        .min()
                        .unwrap_or(timeout);

                    match self.event_rx.recv_timeout(wait) {
                        Ok(event) => event,
                        Err(RecvTimeoutError::Timeout) => {
                            self.expire(&mut running, timeout, &mut resolved, &mut results);
                            continue;
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            };

            match event {
                Event::Started { worker, batch: b, seq } if b == batch => {
                    running.insert(
                        worker,
                        Running {
                            seq,
                            started: Instant::now(),
                        },
                    );
                }
                Event::Finished {
                    worker,
                    batch: b,
                    seq,
                    caption,
                } if b == batch => {
                    if running.get(&worker).is_some_and(|r| r.seq == seq) {
                        running.remove(&worker);
                    }
                    if resolved[seq] {
                        debug!("Discarding late result for item {} from worker {}", seq, worker);
                        continue;
                    }
                    resolved[seq] = true;
                    results.push((seq, caption));
                }
                _ => debug!("Discarding event from an earlier batch"),
            }
        }

        // Only reachable if every worker died; keep the one-result-per-item contract.
        for (seq, done) in resolved.iter().enumerate() {
            if !done {
                let err = ProcessingError::CaptionFailure("no worker left to run item".into());
                results.push((seq, Err(err)));
            }
        }

        results
    }

    fn expire(
        &mut self,
        running: &mut HashMap<usize, Running>,
        timeout: Duration,
        resolved: &mut [bool],
        results: &mut Vec<(usize, Result<String>)>,
    ) {
        let expired: Vec<(usize, usize)> = running
            .iter()
            .filter(|(_, r)| r.started.elapsed() >= timeout)
            .map(|(&worker, r)| (worker, r.seq))
            .collect();

        for (worker, seq) in expired {
            running.remove(&worker);
            if !resolved[seq] {
                resolved[seq] = true;
                results.push((seq, Err(ProcessingError::Timeout(timeout))));
            }
            warn!(
                "Caption worker {} exceeded {:?} on item {}; replacing it",
                worker, timeout, seq
            );
            self.replace_worker(worker);
        }
    }
}

impl<F: CaptionerFactory> Drop for CaptionPool<F> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop<F: CaptionerFactory>(
    id: usize,
    factory: &F,
    jobs: &Receiver<Job>,
    events: &Sender<Event>,
    retired: &AtomicBool,
) {
    let mut model: Option<F::Captioner> = None;

    for job in jobs.iter() {
        let Job {
            batch,
            seq,
            frame_path,
        } = job;

        if events
            .send(Event::Started {
                worker: id,
                batch,
                seq,
            })
            .is_err()
        {
            break;
        }

        // Every `Started` must be followed by a `Finished`.
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let caption = caption_one(id, factory, &mut model, &frame_path);
            if let Some(captioner) = model.as_mut() {
                captioner.release_transient();
            }
            caption
        }));

        let caption = match outcome {
            Ok(caption) => caption,
            Err(panic) => {
                // The model may be left in a broken state; reload on the next item.
                model = None;
                Err(ProcessingError::CaptionFailure(format!(
                    "caption worker {} panicked on {}: {}",
                    id,
                    frame_path.display(),
                    panic_message(panic.as_ref())
                )))
            }
        };

        let sent = events.send(Event::Finished {
            worker: id,
            batch,
            seq,
            caption,
        });
        if sent.is_err() || retired.load(Ordering::Acquire) {
            break;
        }
    }

    debug!("Caption worker {} exiting", id);
}

fn caption_one<F: CaptionerFactory>(
    id: usize,
    factory: &F,
    model: &mut Option<F::Captioner>,
    frame_path: &std::path::Path,
) -> Result<String> {
    // A failed load is retried on the worker's next item.
    if model.is_none() {
        debug!("Caption worker {} loading model", id);
        *model = Some(factory.load(id)?);
    }
    let Some(captioner) = model.as_mut() else {
        return Err(ProcessingError::CaptionFailure("model unavailable".into()));
    };

    let image = load_image(frame_path)?;
    captioner.caption(&image)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    /// Captions an image with its top-left pixel's red value
    struct PixelCaptioner {
        fail_on_red: Option<u8>,
        panic_on_red: Option<u8>,
        sleep_on_red: Option<(u8, Duration)>,
        released: Arc<AtomicUsize>,
    }

    impl Captioner for PixelCaptioner {
        fn caption(&mut self, image: &RgbImage) -> Result<String> {
            let red = image.get_pixel(0, 0)[0];
            if self.fail_on_red == Some(red) {
                return Err(ProcessingError::CaptionFailure("model error".into()));
            }
            if self.panic_on_red == Some(red) {
                panic!("inference blew up");
            }
            if let Some((r, d)) = self.sleep_on_red {
                if r == red {
                    thread::sleep(d);
                }
            }
            Ok(format!("red {red}"))
        }

        fn release_transient(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct PixelFactory {
        loads: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
        fail_on_red: Option<u8>,
        panic_on_red: Option<u8>,
        sleep_on_red: Option<(u8, Duration)>,
    }

    impl CaptionerFactory for PixelFactory {
        type Captioner = PixelCaptioner;

        fn load(&self, _worker: usize) -> Result<PixelCaptioner> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(PixelCaptioner {
                fail_on_red: self.fail_on_red,
                panic_on_red: self.panic_on_red,
                sleep_on_red: self.sleep_on_red,
                released: Arc::clone(&self.released),
            })
        }
    }

    struct BrokenFactory;

    impl CaptionerFactory for BrokenFactory {
        type Captioner = PixelCaptioner;

        fn load(&self, _worker: usize) -> Result<PixelCaptioner> {
            Err(ProcessingError::Other("weights missing".into()))
        }
    }

    /// Panics on its first load, then behaves like [`PixelFactory`]
    #[derive(Default)]
    struct PanickyFactory {
        loads: AtomicUsize,
    }

    impl CaptionerFactory for PanickyFactory {
        type Captioner = PixelCaptioner;

        fn load(&self, _worker: usize) -> Result<PixelCaptioner> {
            if self.loads.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("weights corrupted");
            }
            Ok(PixelCaptioner {
                fail_on_red: None,
                panic_on_red: None,
                sleep_on_red: None,
                released: Arc::new(AtomicUsize::new(0)),
            })
        }
    }

    fn write_frames(dir: &Path, count: u8) -> Vec<SlicePair> {
        (1..=count)
            .map(|i| {
                let frame_path = dir.join(format!("frame_{:06}.png", i));
                RgbImage::from_pixel(4, 4, Rgb([i, 0, 0]))
                    .save(&frame_path)
                    .unwrap();
                SlicePair {
                    video: "demo".to_string(),
                    index: u32::from(i),
                    frame_path,
                    audio_path: dir.join(format!("audio.{:06}.wav", i)),
                }
            })
            .collect()
    }

    fn by_index(mut results: Vec<CaptionedSlice>) -> Vec<(u32, Option<String>)> {
        results.sort_by_key(|r| r.pair.index);
        results.into_iter().map(|r| (r.pair.index, r.caption)).collect()
    }

    fn config(workers: usize) -> PoolConfig {
        PoolConfig {
            workers,
            item_timeout: None,
        }
    }

    #[test]
    fn test_exactly_one_result_per_job() {
        let temp = TempDir::new().unwrap();
        let pairs = write_frames(temp.path(), 20);

        let mut pool = CaptionPool::new(PixelFactory::default(), config(4)).unwrap();
        let results = pool.generate(pairs);

        assert_eq!(results.len(), 20);
        let captions = by_index(results);
        for (i, (index, caption)) in captions.iter().enumerate() {
            assert_eq!(*index, i as u32 + 1);
            assert_eq!(caption.as_deref(), Some(format!("red {}", i + 1).as_str()));
        }
    }

    #[test]
    fn test_models_load_once_per_worker() {
        let temp = TempDir::new().unwrap();
        let factory = PixelFactory::default();
        let loads = Arc::clone(&factory.loads);
        let released = Arc::clone(&factory.released);

        let mut pool = CaptionPool::new(factory, config(2)).unwrap();
        pool.generate(write_frames(temp.path(), 10));
        pool.generate(write_frames(temp.path(), 5));
        pool.shutdown();

        assert!(loads.load(Ordering::SeqCst) <= 2);
        assert_eq!(released.load(Ordering::SeqCst), 15);
    }

    #[test]
    fn test_failure_is_isolated() {
        let temp = TempDir::new().unwrap();
        let factory = PixelFactory {
            fail_on_red: Some(3),
            ..Default::default()
        };

        let mut pool = CaptionPool::new(factory, config(3)).unwrap();
        let captions = by_index(pool.generate(write_frames(temp.path(), 5)));

        assert_eq!(captions[1].1.as_deref(), Some("red 2"));
        assert_eq!(captions[2].1, None);
        assert_eq!(captions[3].1.as_deref(), Some("red 4"));
    }

    #[test]
    fn test_panic_is_isolated() {
        let temp = TempDir::new().unwrap();
        let factory = PixelFactory {
            panic_on_red: Some(2),
            ..Default::default()
        };

        let mut pool = CaptionPool::new(factory, config(1)).unwrap();
        let captions = by_index(pool.generate(write_frames(temp.path(), 3)));

        assert_eq!(captions.len(), 3);
        assert_eq!(captions[0].1.as_deref(), Some("red 1"));
        assert_eq!(captions[1].1, None);
        assert_eq!(captions[2].1.as_deref(), Some("red 3"));
    }

    #[test]
    fn test_unreadable_image_is_null_caption() {
        let temp = TempDir::new().unwrap();
        let mut pairs = write_frames(temp.path(), 2);
        std::fs::write(&pairs[0].frame_path, b"garbage").unwrap();
        pairs[1].frame_path = temp.path().join("missing.png");

        let mut pool = CaptionPool::new(PixelFactory::default(), config(2)).unwrap();
        let results = pool.generate(pairs);

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.caption.is_none()));
    }

    #[test]
    fn test_corrupt_jpeg_frames_do_not_stall_batch() {
        let temp = TempDir::new().unwrap();
        let good = temp.path().join("frame_000001.jpg");
        RgbImage::from_pixel(16, 16, Rgb([200, 0, 0])).save(&good).unwrap();
        let bytes = std::fs::read(&good).unwrap();

        let truncated = temp.path().join("frame_000002.jpg");
        std::fs::write(&truncated, &bytes[..bytes.len() / 3]).unwrap();
        let garbage = temp.path().join("frame_000003.jpg");
        std::fs::write(&garbage, [0xFF, 0xD8, 0xFF, 0x00, 0x13, 0x37]).unwrap();
        let empty = temp.path().join("frame_000004.jpg");
        std::fs::write(&empty, b"").unwrap();

        // One worker, no timeout: a dead worker would block forever here
        let mut pool = CaptionPool::new(PixelFactory::default(), config(1)).unwrap();
        let mut results = pool.caption_frames(vec![good, truncated, garbage, empty]);
        results.sort_by(|a, b| a.frame_path.cmp(&b.frame_path));

        assert_eq!(results.len(), 4);
        assert!(results[0].caption.is_ok());
        assert!(results[1..].iter().all(|r| r.caption.is_err()));
        assert_eq!(pool.worker_count(), 1);
    }

    #[test]
    fn test_panicking_model_load_is_isolated() {
        let temp = TempDir::new().unwrap();
        let mut pool = CaptionPool::new(PanickyFactory::default(), config(1)).unwrap();
        let captions = by_index(pool.generate(write_frames(temp.path(), 3)));

        assert_eq!(captions.len(), 3);
        assert_eq!(captions[0].1, None);
        assert_eq!(captions[1].1.as_deref(), Some("red 2"));
        assert_eq!(captions[2].1.as_deref(), Some("red 3"));
    }

    #[test]
    fn test_model_load_failure_fails_every_item() {
        let temp = TempDir::new().unwrap();
        let mut pool = CaptionPool::new(BrokenFactory, config(2)).unwrap();
        let results = pool.generate(write_frames(temp.path(), 4));

        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.caption.is_none()));
    }

    #[test]
    fn test_timeout_resolves_item_and_replaces_worker() {
        let temp = TempDir::new().unwrap();
        let factory = PixelFactory {
            sleep_on_red: Some((2, Duration::from_millis(1500))),
            ..Default::default()
        };
        let mut pool = CaptionPool::new(
            factory,
            PoolConfig {
                workers: 2,
                item_timeout: Some(Duration::from_millis(200)),
            },
        )
        .unwrap();

        let started = Instant::now();
        let captions = by_index(pool.generate(write_frames(temp.path(), 4)));

        assert!(started.elapsed() < Duration::from_millis(1400));
        assert_eq!(captions.len(), 4);
        assert_eq!(captions[1].1, None);
        assert_eq!(captions[0].1.as_deref(), Some("red 1"));
        assert_eq!(captions[2].1.as_deref(), Some("red 3"));
        assert_eq!(captions[3].1.as_deref(), Some("red 4"));
        assert_eq!(pool.worker_count(), 2);
    }

    #[test]
    fn test_empty_batch() {
        let mut pool = CaptionPool::new(PixelFactory::default(), config(2)).unwrap();
        assert!(pool.generate(Vec::new()).is_empty());
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(CaptionPool::new(PixelFactory::default(), config(0)).is_err());
    }

    #[test]
    fn test_generate_after_shutdown_fails_every_item() {
        let temp = TempDir::new().unwrap();
        let mut pool = CaptionPool::new(PixelFactory::default(), config(1)).unwrap();
        pool.shutdown();

        let results = pool.generate(write_frames(temp.path(), 2));
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.caption.is_none()));
    }

    #[test]
    fn test_caption_frames() {
        let temp = TempDir::new().unwrap();
        let frames: Vec<PathBuf> = write_frames(temp.path(), 3)
            .into_iter()
            .map(|p| p.frame_path)
            .collect();

        let mut pool = CaptionPool::new(PixelFactory::default(), config(2)).unwrap();
        let mut results = pool.caption_frames(frames);
        results.sort_by(|a, b| a.frame_path.cmp(&b.frame_path));

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].caption.as_deref().unwrap(), "red 1");
    }
}

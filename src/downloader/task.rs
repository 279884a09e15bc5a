//! Per-episode download task state.
//!
//! A [`DownloadTask`] is the in-memory handle for one episode's in-flight
//! or queued download. At most one task exists per episode at a time; the
//! task map in [`super::QueueState`] enforces this. All fields are atomics
//! or small mutexes so the UI thread, queue workers, and control calls can
//! share the handle without locking around the whole task.

use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, Ordering};

use crate::db::Episode;
use crate::types::{EpisodeId, Status};

/// Suffix for in-progress download files. The partial file on disk is the
/// durable state that allows resuming across restarts.
pub const PARTIAL_SUFFIX: &str = ".partial";

/// In-memory state machine handle for one episode download
pub struct DownloadTask {
    episode_id: EpisodeId,
    title: String,
    /// Enclosure URL as recorded at task creation; each fetch attempt
    /// re-resolves it through the URL resolver
    url: String,
    /// Directory the final file lands in (per-podcast subdirectory)
    target_dir: PathBuf,
    /// Current filename; may change on redirect/mimetype correction
    filename: Mutex<String>,

    status: AtomicI32,
    /// One-shot flag set on every status transition, cleared by
    /// [`take_status_changed`](Self::take_status_changed)
    status_changed: AtomicBool,
    /// Guards the one-time finished/failed notification
    notification_shown: AtomicBool,

    /// Progress fraction stored as f32 bits
    progress_bits: AtomicU32,
    speed_bps: AtomicU64,
    total_size: AtomicU64,

    error_message: Mutex<Option<String>>,
}

impl DownloadTask {
    /// Create a task for an episode, starting in `Queued`.
    ///
    /// Task creation and enqueueing happen together in `add_task`, so
    /// `Queued` is the first observable status.
    pub(crate) fn new(episode: &Episode, target_dir: PathBuf) -> Self {
        Self {
            episode_id: EpisodeId(episode.id),
            title: episode.title.clone(),
            url: episode.url.clone(),
            target_dir,
            filename: Mutex::new(episode.download_filename.clone()),
            status: AtomicI32::new(Status::Queued.to_i32()),
            status_changed: AtomicBool::new(false),
            notification_shown: AtomicBool::new(false),
            progress_bits: AtomicU32::new(0),
            speed_bps: AtomicU64::new(0),
            total_size: AtomicU64::new(episode.file_size.max(0) as u64),
            error_message: Mutex::new(None),
        }
    }

    /// The episode this task downloads
    pub fn episode_id(&self) -> EpisodeId {
        self.episode_id
    }

    /// Episode title (for events and logging)
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Enclosure URL recorded at task creation
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current status
    pub fn status(&self) -> Status {
        Status::from_i32(self.status.load(Ordering::SeqCst))
    }

    /// Transition to a new status.
    ///
    /// Marks the status-changed flag when the value actually changes and
    /// re-arms the one-time terminal notification on re-queue, so a task
    /// that fails, is re-queued, and fails again notifies once per failure.
    pub fn set_status(&self, status: Status) {
        let old = self.status.swap(status.to_i32(), Ordering::SeqCst);
        if old != status.to_i32() {
            self.status_changed.store(true, Ordering::SeqCst);
            if status == Status::Queued {
                self.notification_shown.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Read-and-clear the status-changed flag.
    ///
    /// Returns true at most once per actual transition: reading twice in a
    /// row yields true then false.
    pub fn take_status_changed(&self) -> bool {
        self.status_changed.swap(false, Ordering::SeqCst)
    }

    /// One-time success notification gate.
    ///
    /// Returns true at most once over the task's lifetime, and only while
    /// the status is `Done`.
    pub fn notify_as_finished(&self) -> bool {
        self.status() == Status::Done && !self.notification_shown.swap(true, Ordering::SeqCst)
    }

    /// One-time failure notification gate, analogous to
    /// [`notify_as_finished`](Self::notify_as_finished).
    pub fn notify_as_failed(&self) -> bool {
        self.status() == Status::Failed && !self.notification_shown.swap(true, Ordering::SeqCst)
    }

    /// Progress fraction (0.0 to 1.0)
    pub fn progress(&self) -> f32 {
        f32::from_bits(self.progress_bits.load(Ordering::Relaxed))
    }

    /// Store the progress fraction, clamped to [0.0, 1.0]
    pub fn set_progress(&self, progress: f32) {
        self.progress_bits
            .store(progress.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Current transfer speed in bytes per second
    pub fn speed_bps(&self) -> u64 {
        self.speed_bps.load(Ordering::Relaxed)
    }

    /// Store the current transfer speed
    pub fn set_speed_bps(&self, speed: u64) {
        self.speed_bps.store(speed, Ordering::Relaxed);
    }

    /// Total size in bytes (0 if unknown)
    pub fn total_size(&self) -> u64 {
        self.total_size.load(Ordering::Relaxed)
    }

    /// Store the total size once the server reports it
    pub fn set_total_size(&self, size: u64) {
        self.total_size.store(size, Ordering::Relaxed);
    }

    /// Error message from the last failure, if any
    pub fn error_message(&self) -> Option<String> {
        self.error_message.lock().ok().and_then(|g| g.clone())
    }

    /// Record a failure: stores the message and transitions to `Failed`
    pub fn fail(&self, message: String) {
        if let Ok(mut guard) = self.error_message.lock() {
            *guard = Some(message);
        }
        self.set_status(Status::Failed);
    }

    /// Current filename the download stores into
    pub fn filename(&self) -> String {
        self.filename
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default()
    }

    /// Rename the target file (redirect/mimetype correction)
    pub fn set_filename(&self, filename: String) {
        if let Ok(mut guard) = self.filename.lock() {
            *guard = filename;
        }
    }

    /// Final path of the downloaded file
    pub fn target_path(&self) -> PathBuf {
        self.target_dir.join(self.filename())
    }

    /// Path of the in-progress partial file
    pub fn partial_path(&self) -> PathBuf {
        self.target_dir
            .join(format!("{}{}", self.filename(), PARTIAL_SUFFIX))
    }

    /// Directory the final file lands in
    pub fn target_dir(&self) -> &PathBuf {
        &self.target_dir
    }
}

// In-memory job queue with a serial worker loop.
//
// All queue state lives behind one mutex; the worker dequeues under
// the same lock the control operations take, so a control call either
// observes a job as still queued or as already processing, never in
// between. At most one job is processing at any time, and one job's
// failure never affects the jobs behind it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{Mutex, Notify};
use tracing::{error, info, warn};

use crate::error::{AutocapError, Result};
use crate::job::{Artifact, Job, JobId, JobKind, JobOptions, JobStatus};
use crate::joblog::{JobLog, JobLogEntry};
use crate::progress::{ArtifactRef, EventBody, ProgressEvent};

#[derive(Debug, Default)]
struct JobStream {
    seq: u64,
    events: Vec<ProgressEvent>,
    closed: bool,
    subscriber: Option<UnboundedSender<ProgressEvent>>,
}

#[derive(Debug, Default)]
struct QueueInner {
    jobs: Vec<Job>,
    paused: bool,
    shutdown: bool,
    processing: Option<JobId>,
    streams: HashMap<JobId, JobStream>,
}

impl QueueInner {
    fn job_mut(&mut self, id: JobId) -> Result<&mut Job> {
        self.jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| AutocapError::Queue(format!("Unknown job: {}", id)))
    }

    fn emit(&mut self, id: JobId, body: EventBody) {
        let stream = self.streams.entry(id).or_default();
        if stream.closed {
            // One terminal event per stream; anything after is dropped.
            warn!("Dropping event for closed stream of job {}", id);
            return;
        }
        let terminal = body.is_terminal();
        stream.seq += 1;
        let event = ProgressEvent {
            job_id: id,
            seq: stream.seq,
            body,
        };
        if let Some(tx) = &stream.subscriber {
            let _ = tx.send(event.clone());
        }
        stream.events.push(event);
        if terminal {
            stream.closed = true;
        }
    }
}

pub struct JobQueue {
    inner: Arc<Mutex<QueueInner>>,
    notify: Notify,
    logs_dir: PathBuf,
}

impl JobQueue {
    pub fn new(logs_dir: PathBuf) -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueInner::default())),
            notify: Notify::new(),
            logs_dir,
        }
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    /// Enqueue a new job at the back of the queue.
    pub async fn submit(&self, kind: JobKind, input: PathBuf, options: JobOptions) -> JobId {
        let job = Job::new(kind, input, options);
        let id = job.id;
        let mut inner = self.inner.lock().await;
        inner.streams.insert(id, JobStream::default());
        inner.jobs.push(job);
        info!("Job {} submitted", id);
        drop(inner);
        self.notify.notify_one();
        id
    }

    /// Stop dispatching new jobs. The currently processing job runs to
    /// its natural end; every waiting job is held.
    pub async fn pause(&self) {
        let mut inner = self.inner.lock().await;
        inner.paused = true;
        for job in inner.jobs.iter_mut() {
            if job.status == JobStatus::Pending {
                job.status = JobStatus::Paused;
            }
        }
        info!("Queue paused");
    }

    /// Resume dispatching, releasing held jobs in their queue order.
    pub async fn resume(&self) {
        let mut inner = self.inner.lock().await;
        inner.paused = false;
        for job in inner.jobs.iter_mut() {
            if job.status == JobStatus::Paused {
                job.status = JobStatus::Pending;
            }
        }
        drop(inner);
        info!("Queue resumed");
        self.notify.notify_one();
    }

    /// Put a failed job back in line at its current position. Its
    /// artifacts, error, and log are discarded; its event stream reopens
    /// and the sequence keeps counting from where it stopped.
    pub async fn retry(&self, id: JobId) -> Result<()> {
        let log = {
            let mut inner = self.inner.lock().await;
            let paused = inner.paused;
            let job = inner.job_mut(id)?;
            if job.status != JobStatus::Failed {
                return Err(AutocapError::Queue(format!(
                    "Only failed jobs can be retried (job {} is {})",
                    id, job.status
                )));
            }
            job.status = if paused {
                JobStatus::Paused
            } else {
                JobStatus::Pending
            };
            job.artifacts.clear();
            job.error = None;
            job.log_path = None;
            if let Some(stream) = inner.streams.get_mut(&id) {
                stream.closed = false;
            }
            JobLog::new(&self.logs_dir, id)
        };
        log.remove().await?;
        info!("Job {} queued for retry", id);
        self.notify.notify_one();
        Ok(())
    }

    /// Move a waiting job ahead of every other waiting job. Completed
    /// and failed jobs cannot be moved; a job that just started
    /// processing is left alone.
    pub async fn move_to_top(&self, id: JobId) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let position = inner
            .jobs
            .iter()
            .position(|j| j.id == id)
            .ok_or_else(|| AutocapError::Queue(format!("Unknown job: {}", id)))?;

        match inner.jobs[position].status {
            JobStatus::Pending | JobStatus::Paused => {}
            JobStatus::Processing => {
                info!("Job {} already processing, not moved", id);
                return Ok(());
            }
            status => {
                return Err(AutocapError::Queue(format!(
                    "Only waiting jobs can be moved (job {} is {})",
                    id, status
                )));
            }
        }

        let first_waiting = inner
            .jobs
            .iter()
            .position(|j| matches!(j.status, JobStatus::Pending | JobStatus::Paused))
            .unwrap_or(0);
        let job = inner.jobs.remove(position);
        inner.jobs.insert(first_waiting, job);
        info!("Job {} moved to the front of the queue", id);
        Ok(())
    }

    /// Remove a job that is not currently processing, along with its
    /// event stream and persisted log.
    pub async fn remove(&self, id: JobId) -> Result<()> {
        let log = {
            let mut inner = self.inner.lock().await;
            let position = inner
                .jobs
                .iter()
                .position(|j| j.id == id)
                .ok_or_else(|| AutocapError::Queue(format!("Unknown job: {}", id)))?;
            if inner.jobs[position].status == JobStatus::Processing {
                return Err(AutocapError::Queue(format!(
                    "Job {} is processing and cannot be removed",
                    id
                )));
            }
            inner.jobs.remove(position);
            inner.streams.remove(&id);
            JobLog::new(&self.logs_dir, id)
        };
        log.remove().await?;
        info!("Job {} removed", id);
        Ok(())
    }

    /// Drop every non-processing job, deleting its produced files,
    /// event stream, and persisted log.
    pub async fn clear_history(&self) -> Result<()> {
        let (removed_ids, artifact_paths) = {
            let mut inner = self.inner.lock().await;
            let mut removed = Vec::new();
            let mut artifacts = Vec::new();
            inner.jobs.retain(|job| {
                if job.status == JobStatus::Processing {
                    true
                } else {
                    removed.push(job.id);
                    artifacts.extend(job.artifacts.iter().map(|a| a.path.clone()));
                    false
                }
            });
            for id in &removed {
                inner.streams.remove(id);
            }
            (removed, artifacts)
        };

        for path in artifact_paths {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        for id in &removed_ids {
            JobLog::new(&self.logs_dir, *id).remove().await?;
        }
        info!("Cleared {} jobs from the queue", removed_ids.len());
        Ok(())
    }

    /// Snapshot of all jobs in queue order.
    pub async fn jobs(&self) -> Vec<Job> {
        self.inner.lock().await.jobs.clone()
    }

    pub async fn job(&self, id: JobId) -> Result<Job> {
        self.inner
            .lock()
            .await
            .jobs
            .iter()
            .find(|j| j.id == id)
            .cloned()
            .ok_or_else(|| AutocapError::Queue(format!("Unknown job: {}", id)))
    }

    /// All events recorded for a job so far.
    pub async fn events(&self, id: JobId) -> Vec<ProgressEvent> {
        self.inner
            .lock()
            .await
            .streams
            .get(&id)
            .map(|s| s.events.clone())
            .unwrap_or_default()
    }

    /// Live-subscribe to a job's events. Already-recorded events are
    /// replayed first so late subscribers see the full stream.
    pub async fn subscribe(&self, id: JobId) -> UnboundedReceiver<ProgressEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().await;
        let stream = inner.streams.entry(id).or_default();
        for event in &stream.events {
            let _ = tx.send(event.clone());
        }
        stream.subscriber = Some(tx);
        rx
    }

    async fn emit(&self, id: JobId, body: EventBody) {
        self.inner.lock().await.emit(id, body);
    }

    /// Pick the next dispatchable job, marking it as processing under
    /// the same lock the control operations use.
    async fn dequeue(&self) -> Option<Job> {
        let mut inner = self.inner.lock().await;
        if inner.paused || inner.processing.is_some() {
            return None;
        }
        let position = inner
            .jobs
            .iter()
            .position(|j| j.status == JobStatus::Pending)?;
        inner.jobs[position].status = JobStatus::Processing;
        let job = inner.jobs[position].clone();
        inner.processing = Some(job.id);
        Some(job)
    }

    async fn finalize(&self, id: JobId, outcome: Result<Vec<Artifact>>, log_path: PathBuf) {
        let mut inner = self.inner.lock().await;
        inner.processing = None;
        let Ok(job) = inner.job_mut(id) else {
            // Removed mid-flight; nothing to record.
            return;
        };
        job.log_path = Some(log_path.clone());
        let log_ref = log_path.to_string_lossy().to_string();

        match outcome {
            Ok(artifacts) => {
                job.status = JobStatus::Completed;
                job.error = None;
                let files: Vec<ArtifactRef> = artifacts
                    .iter()
                    .map(|a| ArtifactRef {
                        label: a.label.clone(),
                        file: a.reference.clone(),
                    })
                    .collect();
                job.artifacts = artifacts;
                info!("Job {} completed", id);
                inner.emit(
                    id,
                    EventBody::Result {
                        files,
                        log: Some(log_ref),
                    },
                );
            }
            Err(e) => {
                let message = e.to_string();
                job.status = JobStatus::Failed;
                job.error = Some(message.clone());
                error!("Job {} failed: {}", id, message);
                inner.emit(
                    id,
                    EventBody::Error {
                        message,
                        log: Some(log_ref),
                    },
                );
            }
        }
    }

    async fn process(&self, job: Job, runner: &dyn JobRunner) {
        let log = JobLog::new(&self.logs_dir, job.id);
        let log_path = log.path().to_path_buf();
        let mut ctx = JobContext {
            queue: self,
            job_id: job.id,
            log,
        };
        let outcome = runner.run(&job, &mut ctx).await;
        self.finalize(job.id, outcome, log_path).await;
    }

    /// Run queued jobs one at a time until none are dispatchable.
    /// Each job is fully isolated: a failure records a terminal error
    /// event and the loop moves on to the next job.
    pub async fn run_until_idle(&self, runner: &dyn JobRunner) {
        while let Some(job) = self.dequeue().await {
            self.process(job, runner).await;
        }
    }

    /// Long-running worker loop: drains dispatchable jobs, then parks
    /// until a submit, resume, retry, or shutdown wakes it. Returns
    /// only after `shutdown`; the job in flight at that point runs to
    /// its natural end first.
    pub async fn run(&self, runner: &dyn JobRunner) {
        loop {
            while let Some(job) = self.dequeue().await {
                self.process(job, runner).await;
            }
            if self.inner.lock().await.shutdown {
                info!("Queue worker shutting down");
                return;
            }
            self.notify.notified().await;
        }
    }

    /// Ask the worker loop to stop once the current job finishes.
    pub async fn shutdown(&self) {
        self.inner.lock().await.shutdown = true;
        self.notify.notify_one();
    }
}

/// The work a dequeued job performs. Implemented by the pipeline; tests
/// substitute their own runners.
#[async_trait::async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: &Job, ctx: &mut JobContext<'_>) -> Result<Vec<Artifact>>;
}

/// Handed to the runner for one job: progress events go to the job's
/// stream, stage entries go to the persistent log as well.
pub struct JobContext<'a> {
    queue: &'a JobQueue,
    job_id: JobId,
    log: JobLog,
}

impl JobContext<'_> {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn log_path(&self) -> &Path {
        self.log.path()
    }

    pub async fn progress(&mut self, message: impl Into<String>) {
        self.queue
            .emit(self.job_id, EventBody::progress(message))
            .await;
    }

    pub async fn progress_counted(
        &mut self,
        message: impl Into<String>,
        stage: impl Into<String>,
        current: usize,
        total: usize,
    ) {
        self.queue
            .emit(
                self.job_id,
                EventBody::progress_counted(message, stage, current, total),
            )
            .await;
    }

    /// Record a stage both as a progress event and a log entry.
    pub async fn stage(&mut self, stage: &str, detail: impl Into<String>) -> Result<()> {
        let detail = detail.into();
        self.log.append(&JobLogEntry::new(stage, &detail)).await?;
        self.queue
            .emit(
                self.job_id,
                EventBody::Progress {
                    message: detail,
                    stage: Some(stage.to_string()),
                    current: None,
                    total: None,
                },
            )
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    /// Runner that records the order jobs ran in and fails inputs on a
    /// deny list.
    struct RecordingRunner {
        ran: StdMutex<Vec<PathBuf>>,
        fail: Vec<PathBuf>,
    }

    impl RecordingRunner {
        fn new() -> Self {
            Self {
                ran: StdMutex::new(Vec::new()),
                fail: Vec::new(),
            }
        }

        fn failing(inputs: &[&str]) -> Self {
            Self {
                ran: StdMutex::new(Vec::new()),
                fail: inputs.iter().map(PathBuf::from).collect(),
            }
        }
    }

    #[async_trait::async_trait]
    impl JobRunner for RecordingRunner {
        async fn run(&self, job: &Job, ctx: &mut JobContext<'_>) -> Result<Vec<Artifact>> {
            self.ran.lock().unwrap().push(job.input.clone());
            ctx.progress(format!("running {}", job.input.display()))
                .await;
            if self.fail.contains(&job.input) {
                return Err(AutocapError::Translation("backend unavailable".to_string()));
            }
            Ok(vec![Artifact {
                label: "Original Subtitles (.srt)".to_string(),
                path: PathBuf::from("out.srt"),
                reference: "out.srt".to_string(),
            }])
        }
    }

    fn queue() -> JobQueue {
        let dir = tempfile::tempdir().unwrap();
        JobQueue::new(dir.into_path())
    }

    async fn submit(queue: &JobQueue, input: &str) -> JobId {
        queue
            .submit(JobKind::Media, PathBuf::from(input), JobOptions::default())
            .await
    }

    #[tokio::test]
    async fn test_jobs_run_in_submission_order() {
        let queue = queue();
        submit(&queue, "a.mp4").await;
        submit(&queue, "b.mp4").await;
        submit(&queue, "c.mp4").await;

        let runner = RecordingRunner::new();
        queue.run_until_idle(&runner).await;

        let ran = runner.ran.lock().unwrap().clone();
        assert_eq!(
            ran,
            vec![
                PathBuf::from("a.mp4"),
                PathBuf::from("b.mp4"),
                PathBuf::from("c.mp4")
            ]
        );
    }

    #[tokio::test]
    async fn test_move_to_top_reorders_waiting_jobs() {
        let queue = queue();
        submit(&queue, "j1.mp4").await;
        submit(&queue, "j2.mp4").await;
        let j3 = submit(&queue, "j3.mp4").await;

        queue.move_to_top(j3).await.unwrap();

        let runner = RecordingRunner::new();
        queue.run_until_idle(&runner).await;
        let ran = runner.ran.lock().unwrap().clone();
        assert_eq!(
            ran,
            vec![
                PathBuf::from("j3.mp4"),
                PathBuf::from("j1.mp4"),
                PathBuf::from("j2.mp4")
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_isolation() {
        let queue = queue();
        let a = submit(&queue, "a.mp4").await;
        let b = submit(&queue, "bad.mp4").await;
        let c = submit(&queue, "c.mp4").await;

        let runner = RecordingRunner::failing(&["bad.mp4"]);
        queue.run_until_idle(&runner).await;

        assert_eq!(queue.job(a).await.unwrap().status, JobStatus::Completed);
        let failed = queue.job(b).await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(failed.error.as_deref().unwrap().contains("backend"));
        assert_eq!(queue.job(c).await.unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_pause_holds_waiting_jobs() {
        let queue = queue();
        let a = submit(&queue, "a.mp4").await;
        let b = submit(&queue, "b.mp4").await;

        queue.pause().await;
        assert_eq!(queue.job(a).await.unwrap().status, JobStatus::Paused);

        let runner = RecordingRunner::new();
        queue.run_until_idle(&runner).await;
        assert!(runner.ran.lock().unwrap().is_empty());

        queue.resume().await;
        queue.run_until_idle(&runner).await;
        assert_eq!(queue.job(a).await.unwrap().status, JobStatus::Completed);
        assert_eq!(queue.job(b).await.unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_worker_parks_while_paused_and_wakes_on_resume() {
        let queue = Arc::new(queue());
        queue.pause().await;
        let id = submit(&queue, "a.mp4").await;

        let worker = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                let runner = RecordingRunner::new();
                queue.run(&runner).await;
            })
        };

        tokio::task::yield_now().await;
        assert_eq!(queue.job(id).await.unwrap().status, JobStatus::Paused);

        queue.resume().await;
        let mut waited = 0;
        while queue.job(id).await.unwrap().status != JobStatus::Completed {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            waited += 1;
            assert!(waited < 100, "job never ran after resume");
        }

        queue.shutdown().await;
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_wakes_idle_worker() {
        let queue = Arc::new(queue());
        let worker = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                let runner = RecordingRunner::new();
                queue.run(&runner).await;
            })
        };
        tokio::task::yield_now().await;

        queue.shutdown().await;
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_retry_clears_state_and_continues_sequence() {
        let queue = queue();
        let id = submit(&queue, "bad.mp4").await;

        let failing = RecordingRunner::failing(&["bad.mp4"]);
        queue.run_until_idle(&failing).await;
        assert_eq!(queue.job(id).await.unwrap().status, JobStatus::Failed);
        let seq_after_failure = queue.events(id).await.last().unwrap().seq;

        queue.retry(id).await.unwrap();
        let job = queue.job(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.artifacts.is_empty());
        assert!(job.error.is_none());

        let succeeding = RecordingRunner::new();
        queue.run_until_idle(&succeeding).await;
        assert_eq!(queue.job(id).await.unwrap().status, JobStatus::Completed);

        // Sequence numbers never restart, even across a retry.
        let events = queue.events(id).await;
        assert!(events.iter().all(|e| e.job_id == id));
        assert!(events
            .windows(2)
            .all(|pair| pair[1].seq == pair[0].seq + 1));
        assert!(events.last().unwrap().seq > seq_after_failure);
    }

    #[tokio::test]
    async fn test_retry_rejects_non_failed_jobs() {
        let queue = queue();
        let id = submit(&queue, "a.mp4").await;
        assert!(queue.retry(id).await.is_err());

        queue.run_until_idle(&RecordingRunner::new()).await;
        assert!(queue.retry(id).await.is_err());
    }

    #[tokio::test]
    async fn test_exactly_one_terminal_event() {
        let queue = queue();
        let id = submit(&queue, "a.mp4").await;
        queue.run_until_idle(&RecordingRunner::new()).await;

        let events = queue.events(id).await;
        let terminals = events.iter().filter(|e| e.body.is_terminal()).count();
        assert_eq!(terminals, 1);
        assert!(events.last().unwrap().body.is_terminal());
    }

    #[tokio::test]
    async fn test_remove_rejects_unknown_and_drops_events() {
        let queue = queue();
        let id = submit(&queue, "a.mp4").await;
        queue.remove(id).await.unwrap();
        assert!(queue.job(id).await.is_err());
        assert!(queue.events(id).await.is_empty());
        assert!(queue.remove(id).await.is_err());
    }

    #[tokio::test]
    async fn test_clear_history_drops_finished_jobs() {
        let queue = queue();
        let a = submit(&queue, "a.mp4").await;
        queue.run_until_idle(&RecordingRunner::new()).await;
        let b = submit(&queue, "b.mp4").await;

        queue.clear_history().await.unwrap();
        assert!(queue.job(a).await.is_err());
        assert!(queue.job(b).await.is_err());
        assert!(queue.jobs().await.is_empty());
        assert!(queue.events(a).await.is_empty());
    }

    #[tokio::test]
    async fn test_subscriber_sees_replay_and_live_events() {
        let queue = queue();
        let id = submit(&queue, "a.mp4").await;
        queue.run_until_idle(&RecordingRunner::new()).await;

        let mut rx = queue.subscribe(id).await;
        let mut received = Vec::new();
        while let Ok(event) = rx.try_recv() {
            received.push(event);
        }
        assert_eq!(received, queue.events(id).await);
    }
}

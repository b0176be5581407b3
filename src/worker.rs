use std::path::{Path, PathBuf};
use std::sync::mpsc;

use anyhow::Result;
use log::warn;
use tokio::runtime::Runtime;

use crate::chain::InvocationDescription;
use crate::clip::{Clip, ClipPreview, MissingArtifact};
use crate::engine::SoxEngine;
use crate::output::ClipPlayer;

const PREVIEW_POINTS: usize = 512;

#[derive(Debug)]
pub enum Job {
    Generate(InvocationDescription),
    Play(PathBuf),
    Loop(InvocationDescription),
}

impl Job {
    pub fn kind(&self) -> JobKind {
        match self {
            Job::Generate(_) => JobKind::Generate,
            Job::Play(_) => JobKind::Play,
            Job::Loop(_) => JobKind::Loop,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobKind {
    Generate,
    Play,
    Loop,
}

#[derive(Debug)]
pub enum JobOutput {
    Rendered(ClipPreview),
    Played,
    Looped,
}

#[derive(Debug)]
pub struct JobReport {
    pub kind: JobKind,
    pub result: Result<JobOutput>,
}

impl JobReport {
    /// The one line the console prints when a job settles.
    pub fn status_line(&self) -> &'static str {
        if let Err(err) = &self.result {
            if err.downcast_ref::<MissingArtifact>().is_some() {
                return "NO SOUND FILE";
            }
        }
        match (self.kind, self.result.is_ok()) {
            (JobKind::Generate, true) => "TONE GENERATED",
            (JobKind::Generate, false) => "ERROR: TONE GENERATION FAILED",
            (JobKind::Play, true) => "PLAYBACK FINISHED",
            (JobKind::Play, false) => "ERROR: PLAYBACK FAILED",
            (JobKind::Loop, true) => "LOOP CREATED",
            (JobKind::Loop, false) => "ERROR: LOOP FAILED",
        }
    }
}

/// Anything that can carry out a job. The console uses [`SoxWorkbench`].
pub trait Workbench: Send + 'static {
    fn run(&mut self, job: Job) -> Result<JobOutput>;
}

pub struct SoxWorkbench {
    engine: SoxEngine,
    player: ClipPlayer,
}

impl SoxWorkbench {
    pub fn new(engine: SoxEngine, player: ClipPlayer) -> Self {
        Self { engine, player }
    }
}

impl Workbench for SoxWorkbench {
    fn run(&mut self, job: Job) -> Result<JobOutput> {
        match job {
            Job::Generate(description) => {
                let path = self.engine.render(&description)?;
                Ok(JobOutput::Rendered(scope_preview(&path)))
            }
            Job::Play(path) => {
                self.player.play(&path)?;
                Ok(JobOutput::Played)
            }
            Job::Loop(description) => {
                self.engine.render(&description)?;
                Ok(JobOutput::Looped)
            }
        }
    }
}

/// The artifact is already in place by now, so a decode problem only costs
/// the scope trace.
fn scope_preview(path: &Path) -> ClipPreview {
    match Clip::load(path) {
        Ok(clip) => clip.preview(PREVIEW_POINTS),
        Err(err) => {
            warn!("no scope preview for {}: {err:#}", path.display());
            ClipPreview::default()
        }
    }
}

/// UI-side ends of the worker channels.
pub struct WorkerHandle {
    jobs: mpsc::Sender<Job>,
    reports: mpsc::Receiver<JobReport>,
}

impl WorkerHandle {
    pub fn submit(&self, job: Job) -> Result<()> {
        self.jobs
            .send(job)
            .map_err(|_| anyhow::anyhow!("background worker has stopped"))
    }

    pub fn poll(&self) -> Option<JobReport> {
        self.reports.try_recv().ok()
    }

    #[cfg(test)]
    fn wait(&self) -> Option<JobReport> {
        self.reports
            .recv_timeout(std::time::Duration::from_secs(5))
            .ok()
    }
}

/// Runs jobs one at a time, in submission order, off the UI thread.
pub fn spawn_worker(runtime: &Runtime, mut bench: impl Workbench) -> WorkerHandle {
    let (job_tx, job_rx) = mpsc::channel::<Job>();
    let (report_tx, report_rx) = mpsc::channel();

    runtime.spawn_blocking(move || {
        while let Ok(job) = job_rx.recv() {
            let kind = job.kind();
            let result = bench.run(job);
            if report_tx.send(JobReport { kind, result }).is_err() {
                break;
            }
        }
    });

    WorkerHandle {
        jobs: job_tx,
        reports: report_rx,
    }
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page jobs: the per-page operations the scheduler fans out, in a form that
// can run on a local thread or be shipped to a worker process as JSON.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use blattwerk_core::error::Result;
use blattwerk_core::{ChunkResult, EngineConfig, IsolationMode, RasterFormat, WorkChunk};
use blattwerk_pipeline::{
    ChunkWorker, PageWorkScheduler, ProcessChunkWorker, Progress, WorkerCommand,
    default_worker_count, run_indices, serve_chunk,
};
use blattwerk_render::{PageDocument, RasterBackend, default_backend};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::scan::blank::{BlankSettings, measure_page};
use crate::scan::extract::render_page;

/// Work applied to every page of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageJob {
    BlankScan {
        source: PathBuf,
        dpi: u32,
        settings: BlankSettings,
    },
    Rasterize {
        source: PathBuf,
        output_dir: PathBuf,
        format: RasterFormat,
        dpi: u32,
        jpeg_quality: u8,
    },
}

impl PageJob {
    pub fn source(&self) -> &Path {
        match self {
            Self::BlankScan { source, .. } | Self::Rasterize { source, .. } => source,
        }
    }
}

/// Per-page result of a [`PageJob`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageOutput {
    Whiteness { blank: bool, whiteness: f64 },
    Written { path: PathBuf },
}

/// Run `job` for the page at 0-based `index` of an already open document.
pub fn run_page_job(
    job: &PageJob,
    document: &mut dyn PageDocument,
    index: usize,
) -> Result<PageOutput> {
    match job {
        PageJob::BlankScan { dpi, settings, .. } => {
            let image = document.rasterize(index, *dpi)?;
            let (blank, whiteness) = measure_page(&image, settings);
            Ok(PageOutput::Whiteness { blank, whiteness })
        }
        PageJob::Rasterize {
            source,
            output_dir,
            format,
            dpi,
            jpeg_quality,
        } => {
            let path = render_page(
                document,
                index,
                source,
                output_dir,
                *format,
                *dpi,
                *jpeg_quality,
            )?;
            Ok(PageOutput::Written { path })
        }
    }
}

// -- Workers ------------------------------------------------------------------

/// Runs a chunk in-process, opening its own document handle.
pub struct LocalPageWorker {
    job: PageJob,
    backend: Arc<dyn RasterBackend>,
}

impl LocalPageWorker {
    pub fn new(job: PageJob, backend: Arc<dyn RasterBackend>) -> Self {
        Self { job, backend }
    }
}

impl ChunkWorker for LocalPageWorker {
    type Output = PageOutput;

    fn run_chunk(
        &self,
        chunk: &WorkChunk,
        progress: &dyn Fn(usize),
    ) -> Result<ChunkResult<PageOutput>> {
        let mut document = self.backend.open(self.job.source())?;
        debug!(
            chunk_id = chunk.id,
            backend = self.backend.name(),
            pages = chunk.len(),
            "chunk document opened"
        );
        run_indices(chunk, progress, |index| {
            run_page_job(&self.job, document.as_mut(), index)
        })
    }
}

// -- Dispatch -----------------------------------------------------------------

/// Where chunk workers run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Isolation {
    /// Scoped threads inside this process.
    Thread,
    /// One OS process per chunk, started with this command.
    Process(WorkerCommand),
}

pub type ProgressFn = Arc<dyn Fn(Progress) + Send + Sync>;

/// How a page operation is spread over workers.
#[derive(Clone)]
pub struct PipelineOptions {
    pub worker_count: usize,
    pub isolation: Isolation,
    pub progress: Option<ProgressFn>,
}

impl fmt::Debug for PipelineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineOptions")
            .field("worker_count", &self.worker_count)
            .field("isolation", &self.isolation)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::threads(default_worker_count())
    }
}

impl PipelineOptions {
    pub fn threads(worker_count: usize) -> Self {
        Self {
            worker_count: worker_count.max(1),
            isolation: Isolation::Thread,
            progress: None,
        }
    }

    pub fn processes(worker_count: usize, command: WorkerCommand) -> Self {
        Self {
            worker_count: worker_count.max(1),
            isolation: Isolation::Process(command),
            progress: None,
        }
    }

    /// Options described by `config`. Process isolation re-executes the
    /// running binary's `worker` subcommand.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let workers = config.worker_count.unwrap_or_else(default_worker_count);
        Ok(match config.isolation {
            IsolationMode::Thread => Self::threads(workers),
            IsolationMode::Process => Self::processes(workers, WorkerCommand::current_exe()?),
        })
    }

    pub fn with_progress(mut self, callback: impl Fn(Progress) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(callback));
        self
    }
}

/// Run `job` over `page_count` pages and return outputs in page order.
#[instrument(skip_all, fields(pages = page_count, workers = options.worker_count))]
pub(crate) fn dispatch(
    job: PageJob,
    page_count: usize,
    backend: Arc<dyn RasterBackend>,
    options: &PipelineOptions,
) -> Result<Vec<PageOutput>> {
    let mut scheduler = PageWorkScheduler::new(options.worker_count);
    if let Some(progress) = options.progress.clone() {
        scheduler = scheduler.with_progress(move |p| progress(p));
    }

    match &options.isolation {
        Isolation::Thread => {
            info!(backend = backend.name(), "dispatching to threads");
            scheduler.run(page_count, &LocalPageWorker::new(job, backend))
        }
        Isolation::Process(command) => {
            info!(program = %command.program.display(), "dispatching to worker processes");
            let worker: ProcessChunkWorker<PageJob, PageOutput> =
                ProcessChunkWorker::new(command.clone(), job);
            scheduler.run(page_count, &worker)
        }
    }
}

/// Child side of process isolation: serve one chunk from stdin to stdout
/// with the default backend.
pub fn serve_stdio() -> Result<()> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    serve_chunk(stdin.lock(), stdout.lock(), |job: PageJob| {
        Ok(LocalPageWorker::new(job, default_backend()))
    })
}

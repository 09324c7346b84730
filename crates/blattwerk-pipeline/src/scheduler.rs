// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page work scheduler: partition, dispatch, ordered reassembly.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::mpsc;
use std::thread;
use std::time::Instant;

use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::{ChunkResult, PageResult, RunId, WorkChunk};
use tracing::{Span, debug, info, info_span, warn};

/// Split `page_count` pages into contiguous chunks for `worker_count` workers.
///
/// The worker count is clamped to `[1, page_count]`. Every chunk holds
/// `page_count / workers` pages and the last one absorbs the remainder, so the
/// chunks cover every index exactly once.
pub fn partition(page_count: usize, worker_count: usize) -> Vec<WorkChunk> {
    if page_count == 0 {
        return Vec::new();
    }
    let workers = worker_count.clamp(1, page_count);
    let chunk_size = page_count / workers;

    (0..workers)
        .map(|id| {
            let start = id * chunk_size;
            let end = if id + 1 == workers {
                page_count
            } else {
                start + chunk_size
            };
            WorkChunk {
                id,
                indices: (start..end).collect(),
            }
        })
        .collect()
}

/// One worker per available core, or 1 if that cannot be determined.
pub fn default_worker_count() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Processes one chunk of pages.
///
/// Implementations open their own document handle for each chunk and must
/// return results tagged with the chunk's absolute indices, ascending.
/// `progress` may be called with each finished index.
pub trait ChunkWorker: Sync {
    type Output: Send;

    fn run_chunk(
        &self,
        chunk: &WorkChunk,
        progress: &dyn Fn(usize),
    ) -> Result<ChunkResult<Self::Output>>;
}

/// Run `page` for every index of `chunk` in order, reporting progress.
///
/// Stops at the first failing page.
pub fn run_indices<T>(
    chunk: &WorkChunk,
    progress: &dyn Fn(usize),
    mut page: impl FnMut(usize) -> Result<T>,
) -> Result<ChunkResult<T>> {
    let mut pages = Vec::with_capacity(chunk.len());
    for &index in &chunk.indices {
        let value = page(index)?;
        pages.push(PageResult { index, value });
        progress(index);
    }
    Ok(ChunkResult {
        chunk_id: chunk.id,
        pages,
    })
}

/// Snapshot passed to the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

type ProgressCallback = Box<dyn Fn(Progress) + Send + Sync>;

enum Event<T> {
    PageDone(usize),
    ChunkDone {
        chunk_id: usize,
        outcome: Result<ChunkResult<T>>,
    },
}

/// Fans page work out to one worker per chunk and collects the results in
/// page order.
pub struct PageWorkScheduler {
    worker_count: usize,
    on_progress: Option<ProgressCallback>,
}

impl PageWorkScheduler {
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count: worker_count.max(1),
            on_progress: None,
        }
    }

    /// Scheduler sized by [`default_worker_count`].
    pub fn with_default_workers() -> Self {
        Self::new(default_worker_count())
    }

    /// Install a callback invoked on the dispatching thread after each page.
    pub fn with_progress(mut self, callback: impl Fn(Progress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Process pages `0..page_count` and return one output per page, in page
    /// order.
    ///
    /// Blocks until every worker has finished. If any chunk fails, the error
    /// of the lowest failing chunk id is returned and all results are dropped.
    pub fn run<W: ChunkWorker>(&self, page_count: usize, worker: &W) -> Result<Vec<W::Output>> {
        let run_id = RunId::new();
        let span = info_span!("page_run", %run_id, page_count);
        let _entered = span.enter();

        let chunks = partition(page_count, self.worker_count);
        if chunks.is_empty() {
            debug!("no pages to process");
            return Ok(Vec::new());
        }
        info!(chunks = chunks.len(), "dispatching page chunks");
        let started = Instant::now();

        let (outcomes, panics) = thread::scope(|scope| {
            let (tx, rx) = mpsc::channel::<Event<W::Output>>();

            let handles: Vec<_> = chunks
                .iter()
                .map(|chunk| {
                    let tx = tx.clone();
                    let span = Span::current();
                    scope.spawn(move || {
                        let _entered = span.enter();
                        let progress_tx = tx.clone();
                        let progress = move |index: usize| {
                            let _ = progress_tx.send(Event::PageDone(index));
                        };
                        let outcome = worker.run_chunk(chunk, &progress);
                        let _ = tx.send(Event::ChunkDone {
                            chunk_id: chunk.id,
                            outcome,
                        });
                    })
                })
                .collect();
            drop(tx);

            let outcomes = self.collect(page_count, &chunks, rx);

            let panics: BTreeMap<usize, String> = handles
                .into_iter()
                .zip(&chunks)
                .filter_map(|(handle, chunk)| {
                    handle
                        .join()
                        .err()
                        .map(|payload| (chunk.id, panic_message(payload)))
                })
                .collect();

            (outcomes, panics)
        });

        let output = reassemble(page_count, &chunks, outcomes, panics)?;
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "page run complete"
        );
        Ok(output)
    }

    // -- Collection ---------------------------------------------------------

    /// Drain worker events until every sender is gone.
    fn collect<T>(
        &self,
        page_count: usize,
        chunks: &[WorkChunk],
        rx: mpsc::Receiver<Event<T>>,
    ) -> BTreeMap<usize, Result<ChunkResult<T>>> {
        let mut credited = vec![false; page_count];
        let mut completed = 0usize;
        let mut outcomes = BTreeMap::new();

        for event in rx {
            match event {
                Event::PageDone(index) => {
                    if self.credit(&mut credited, index) {
                        completed += 1;
                        self.report(completed, page_count);
                    }
                }
                Event::ChunkDone { chunk_id, outcome } => {
                    if outcome.is_ok() {
                        // Pages the worker never reported individually.
                        if let Some(chunk) = chunks.get(chunk_id) {
                            for &index in &chunk.indices {
                                if self.credit(&mut credited, index) {
                                    completed += 1;
                                    self.report(completed, page_count);
                                }
                            }
                        }
                    }
                    debug!(chunk_id, ok = outcome.is_ok(), "chunk finished");
                    outcomes.insert(chunk_id, outcome);
                }
            }
        }

        outcomes
    }

    fn credit(&self, credited: &mut [bool], index: usize) -> bool {
        match credited.get_mut(index) {
            Some(seen) if !*seen => {
                *seen = true;
                true
            }
            _ => false,
        }
    }

    fn report(&self, completed: usize, total: usize) {
        if let Some(callback) = &self.on_progress {
            callback(Progress { completed, total });
        }
    }
}

/// Place every chunk's pages into their absolute slots, or surface the first
/// failure by chunk id.
fn reassemble<T>(
    page_count: usize,
    chunks: &[WorkChunk],
    mut outcomes: BTreeMap<usize, Result<ChunkResult<T>>>,
    panics: BTreeMap<usize, String>,
) -> Result<Vec<T>> {
    let mut slots: Vec<Option<T>> = Vec::with_capacity(page_count);
    slots.resize_with(page_count, || None);

    for chunk in chunks {
        if let Some(message) = panics.get(&chunk.id) {
            warn!(chunk_id = chunk.id, %message, "worker panicked");
            return Err(BlattwerkError::Worker {
                chunk_id: chunk.id,
                detail: format!("worker panicked: {message}"),
            });
        }

        let result = match outcomes.remove(&chunk.id) {
            Some(Ok(result)) => result,
            Some(Err(err)) => {
                warn!(chunk_id = chunk.id, error = %err, "chunk failed");
                return Err(err);
            }
            None => {
                return Err(BlattwerkError::Worker {
                    chunk_id: chunk.id,
                    detail: "worker exited without a result".into(),
                });
            }
        };

        check_chunk_result(chunk, &result)?;
        for page in result.pages {
            slots[page.index] = Some(page.value);
        }
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or_else(|| {
                BlattwerkError::WorkerProtocol(format!("no result for page {index}"))
            })
        })
        .collect()
}

fn check_chunk_result<T>(chunk: &WorkChunk, result: &ChunkResult<T>) -> Result<()> {
    let matches = result.chunk_id == chunk.id
        && result.pages.len() == chunk.indices.len()
        && result
            .pages
            .iter()
            .zip(&chunk.indices)
            .all(|(page, &index)| page.index == index);

    if matches {
        Ok(())
    } else {
        Err(BlattwerkError::WorkerProtocol(format!(
            "chunk {} returned pages {:?}, expected {:?}",
            chunk.id,
            result.pages.iter().map(|p| p.index).collect::<Vec<_>>(),
            chunk.indices
        )))
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".into()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use proptest::prelude::*;

    use super::*;

    /// Output embeds the page index so misplacement is visible.
    struct IndexWorker {
        report_pages: bool,
    }

    impl ChunkWorker for IndexWorker {
        type Output = usize;

        fn run_chunk(
            &self,
            chunk: &WorkChunk,
            progress: &dyn Fn(usize),
        ) -> Result<ChunkResult<usize>> {
            // Later chunks finish first.
            thread::sleep(Duration::from_millis(20u64.saturating_sub(chunk.id as u64 * 5)));
            if self.report_pages {
                run_indices(chunk, progress, |index| Ok(index * 10))
            } else {
                run_indices(chunk, &|_: usize| {}, |index| Ok(index * 10))
            }
        }
    }

    struct FailingWorker {
        failing_chunks: Vec<usize>,
    }

    impl ChunkWorker for FailingWorker {
        type Output = usize;

        fn run_chunk(
            &self,
            chunk: &WorkChunk,
            progress: &dyn Fn(usize),
        ) -> Result<ChunkResult<usize>> {
            if self.failing_chunks.contains(&chunk.id) {
                return Err(BlattwerkError::Render(format!("chunk {}", chunk.id)));
            }
            run_indices(chunk, progress, Ok)
        }
    }

    struct PanickingWorker;

    impl ChunkWorker for PanickingWorker {
        type Output = usize;

        fn run_chunk(
            &self,
            chunk: &WorkChunk,
            progress: &dyn Fn(usize),
        ) -> Result<ChunkResult<usize>> {
            if chunk.id == 1 {
                panic!("page renderer crashed");
            }
            run_indices(chunk, progress, Ok)
        }
    }

    struct LyingWorker;

    impl ChunkWorker for LyingWorker {
        type Output = usize;

        fn run_chunk(
            &self,
            chunk: &WorkChunk,
            _progress: &dyn Fn(usize),
        ) -> Result<ChunkResult<usize>> {
            let pages = chunk
                .indices
                .iter()
                .map(|&index| PageResult {
                    index: index + 1,
                    value: index,
                })
                .collect();
            Ok(ChunkResult {
                chunk_id: chunk.id,
                pages,
            })
        }
    }

    #[test]
    fn partition_ten_pages_three_workers() {
        let chunks = partition(10, 3);
        let sizes: Vec<usize> = chunks.iter().map(WorkChunk::len).collect();
        assert_eq!(sizes, vec![3, 3, 4]);
        assert_eq!(chunks[2].indices, vec![6, 7, 8, 9]);
    }

    #[test]
    fn partition_clamps_worker_count() {
        assert!(partition(0, 4).is_empty());
        assert_eq!(partition(3, 8).len(), 3);
        assert_eq!(partition(5, 0).len(), 1);
    }

    #[test]
    fn results_are_in_page_order() {
        let scheduler = PageWorkScheduler::new(4);
        let output = scheduler
            .run(10, &IndexWorker { report_pages: true })
            .unwrap();
        let expected: Vec<usize> = (0..10).map(|i| i * 10).collect();
        assert_eq!(output, expected);
    }

    #[test]
    fn empty_document_yields_no_results() {
        let output = PageWorkScheduler::new(4)
            .run(0, &IndexWorker { report_pages: true })
            .unwrap();
        assert!(output.is_empty());
    }

    #[test]
    fn progress_reaches_total_once_per_page() {
        for report_pages in [true, false] {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&seen);
            let scheduler =
                PageWorkScheduler::new(3).with_progress(move |p| sink.lock().unwrap().push(p));

            scheduler.run(7, &IndexWorker { report_pages }).unwrap();

            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 7);
            let completed: Vec<usize> = seen.iter().map(|p| p.completed).collect();
            assert_eq!(completed, (1..=7).collect::<Vec<_>>());
            assert!(seen.iter().all(|p| p.total == 7));
        }
    }

    #[test]
    fn first_failing_chunk_is_reported() {
        let worker = FailingWorker {
            failing_chunks: vec![2, 1],
        };
        let err = PageWorkScheduler::new(4).run(8, &worker).unwrap_err();
        match err {
            BlattwerkError::Render(detail) => assert_eq!(detail, "chunk 1"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn panicking_worker_becomes_worker_error() {
        let err = PageWorkScheduler::new(3).run(6, &PanickingWorker).unwrap_err();
        match err {
            BlattwerkError::Worker { chunk_id, detail } => {
                assert_eq!(chunk_id, 1);
                assert!(detail.contains("page renderer crashed"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn mismatched_indices_are_rejected() {
        let err = PageWorkScheduler::new(2).run(4, &LyingWorker).unwrap_err();
        assert!(matches!(err, BlattwerkError::WorkerProtocol(_)));
    }

    proptest! {
        /// Property: chunks cover every index exactly once, contiguously.
        #[test]
        fn prop_partition_covers_all_pages(pages in 0usize..500, workers in 0usize..64) {
            let chunks = partition(pages, workers);
            let flattened: Vec<usize> = chunks.iter().flat_map(|c| c.indices.clone()).collect();
            prop_assert_eq!(flattened, (0..pages).collect::<Vec<_>>());

            if pages > 0 {
                let expected_workers = workers.clamp(1, pages);
                prop_assert_eq!(chunks.len(), expected_workers);
                let base = pages / expected_workers;
                for chunk in &chunks[..chunks.len() - 1] {
                    prop_assert_eq!(chunk.len(), base);
                }
                prop_assert_eq!(chunks[chunks.len() - 1].len(), base + pages % expected_workers);
            }
        }

        /// Property: reassembly is ordered for any page and worker count.
        #[test]
        fn prop_reassembly_is_ordered(pages in 0usize..60, workers in 1usize..12) {
            struct Echo;
            impl ChunkWorker for Echo {
                type Output = usize;
                fn run_chunk(
                    &self,
                    chunk: &WorkChunk,
                    progress: &dyn Fn(usize),
                ) -> Result<ChunkResult<usize>> {
                    run_indices(chunk, progress, Ok)
                }
            }

            let output = PageWorkScheduler::new(workers).run(pages, &Echo).unwrap();
            prop_assert_eq!(output, (0..pages).collect::<Vec<_>>());
        }
    }
}

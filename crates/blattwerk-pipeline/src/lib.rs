// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Blattwerk: Parallel page scheduling.
//
// Pages of one document are split into contiguous chunks, each chunk runs on
// its own worker (thread or OS process), and results come back ordered by
// absolute page index.

pub mod process;
pub mod scheduler;

pub use process::{ProcessChunkWorker, WorkerCommand, WorkerMessage, WorkerRequest, serve_chunk};
pub use scheduler::{
    ChunkWorker, PageWorkScheduler, Progress, default_worker_count, partition, run_indices,
};

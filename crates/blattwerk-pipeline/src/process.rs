// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Process-isolated chunk workers.
//
// The parent writes one JSON `WorkerRequest` to the child's stdin and closes
// it. The child answers with newline-delimited JSON `WorkerMessage`s on
// stdout and logs to stderr.

use std::cell::RefCell;
use std::io::{BufRead, BufReader, Read, Write};
use std::marker::PhantomData;
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, Stdio};

use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::{ChunkResult, WorkChunk};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::scheduler::ChunkWorker;

/// Program and arguments that start a worker process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Re-execute the running binary with its `worker` subcommand.
    pub fn current_exe() -> Result<Self> {
        Ok(Self::new(std::env::current_exe()?).arg("worker"))
    }
}

/// First and only message from parent to child.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequest<J> {
    pub chunk: WorkChunk,
    pub job: J,
}

/// One line from child to parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage<O> {
    PageDone { index: usize },
    Finished { result: ChunkResult<O> },
    Failed { kind: String, detail: String },
}

/// Runs each chunk in a fresh OS process.
pub struct ProcessChunkWorker<J, O> {
    command: WorkerCommand,
    job: J,
    _output: PhantomData<fn() -> O>,
}

impl<J, O> ProcessChunkWorker<J, O> {
    pub fn new(command: WorkerCommand, job: J) -> Self {
        Self {
            command,
            job,
            _output: PhantomData,
        }
    }
}

impl<J, O> ChunkWorker for ProcessChunkWorker<J, O>
where
    J: Serialize + Sync,
    O: DeserializeOwned + Send,
{
    type Output = O;

    #[instrument(skip_all, fields(chunk_id = chunk.id, pages = chunk.len()))]
    fn run_chunk(&self, chunk: &WorkChunk, progress: &dyn Fn(usize)) -> Result<ChunkResult<O>> {
        let worker_err = |detail: String| BlattwerkError::Worker {
            chunk_id: chunk.id,
            detail,
        };

        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                worker_err(format!(
                    "failed to start {}: {e}",
                    self.command.program.display()
                ))
            })?;
        debug!(pid = child.id(), "worker process started");

        let sent = send_request(&mut child, chunk, &self.job);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| worker_err("worker stdout was not captured".into()));
        let received = stdout.and_then(|stdout| read_messages::<O>(stdout, chunk.id, progress));
        if received.is_err() {
            // The child may be blocked writing into a pipe nobody drains.
            let _ = child.kill();
        }

        let status = child
            .wait()
            .map_err(|e| worker_err(format!("failed to wait for worker: {e}")))?;

        match received? {
            Reply::Failed(err) => Err(err),
            Reply::Finished(result) if status.success() => Ok(result),
            Reply::Finished(_) => Err(worker_err(format!(
                "worker reported a result but exited with {status}"
            ))),
            Reply::Silent => {
                if let Err(err) = sent {
                    warn!(error = %err, "could not send request to worker");
                }
                Err(worker_err(format!("worker exited with {status} before finishing")))
            }
        }
    }
}

enum Reply<O> {
    Finished(ChunkResult<O>),
    Failed(BlattwerkError),
    Silent,
}

fn send_request<J: Serialize>(child: &mut Child, chunk: &WorkChunk, job: &J) -> Result<()> {
    let mut stdin = child.stdin.take().ok_or_else(|| BlattwerkError::Worker {
        chunk_id: chunk.id,
        detail: "worker stdin was not captured".into(),
    })?;
    let request = WorkerRequest {
        chunk: chunk.clone(),
        job,
    };
    serde_json::to_writer(&mut stdin, &request)?;
    stdin.write_all(b"\n")?;
    stdin.flush()?;
    Ok(())
}

fn read_messages<O: DeserializeOwned>(
    stdout: ChildStdout,
    chunk_id: usize,
    progress: &dyn Fn(usize),
) -> Result<Reply<O>> {
    let mut reply = Reply::Silent;
    for line in BufReader::new(stdout).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let message: WorkerMessage<O> = serde_json::from_str(&line).map_err(|e| {
            BlattwerkError::WorkerProtocol(format!("chunk {chunk_id}: unreadable message: {e}"))
        })?;
        match message {
            WorkerMessage::PageDone { index } => progress(index),
            WorkerMessage::Finished { result } => reply = Reply::Finished(result),
            WorkerMessage::Failed { kind, detail } => {
                reply = Reply::Failed(rebuild_failure(chunk_id, &kind, detail));
            }
        }
    }
    Ok(reply)
}

// -- Child side ---------------------------------------------------------------

/// Serve one chunk request: read it from `input`, build the worker from the
/// job with `make_worker`, run it and stream messages to `output`.
///
/// A failure is reported on `output` and also returned, so the process can
/// exit non-zero.
pub fn serve_chunk<J, W, R, Wr, F>(input: R, output: Wr, make_worker: F) -> Result<()>
where
    J: DeserializeOwned,
    W: ChunkWorker,
    W::Output: Serialize,
    R: Read,
    Wr: Write,
    F: FnOnce(J) -> Result<W>,
{
    let request: WorkerRequest<J> = serde_json::from_reader(input)?;
    let chunk = request.chunk;
    debug!(chunk_id = chunk.id, pages = chunk.len(), "serving chunk");

    let output = RefCell::new(output);
    let emit = |message: &WorkerMessage<W::Output>| -> Result<()> {
        let mut out = output.borrow_mut();
        serde_json::to_writer(&mut *out, message)?;
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    };

    let progress = |index: usize| {
        if let Err(err) = emit(&WorkerMessage::PageDone { index }) {
            warn!(index, error = %err, "could not report page progress");
        }
    };

    match make_worker(request.job).and_then(|worker| worker.run_chunk(&chunk, &progress)) {
        Ok(result) => emit(&WorkerMessage::Finished { result }),
        Err(err) => {
            let (kind, detail) = describe_failure(&err);
            emit(&WorkerMessage::Failed {
                kind: kind.into(),
                detail,
            })?;
            Err(err)
        }
    }
}

/// Split an error into a stable kind tag and its detail text.
fn describe_failure(err: &BlattwerkError) -> (&'static str, String) {
    match err {
        BlattwerkError::CorruptInput(d) => ("corrupt_input", d.clone()),
        BlattwerkError::EmptyDocument(d) => ("empty_document", d.clone()),
        BlattwerkError::EncryptedDocument(d) => ("encrypted_document", d.clone()),
        BlattwerkError::UnsupportedFormat(d) => ("unsupported_format", d.clone()),
        BlattwerkError::RenderUnavailable(d) => ("render_unavailable", d.clone()),
        BlattwerkError::Render(d) => ("render", d.clone()),
        BlattwerkError::InvalidArgument(d) => ("invalid_argument", d.clone()),
        other => ("other", other.to_string()),
    }
}

/// Inverse of [`describe_failure`]; unknown kinds become `Worker` errors.
fn rebuild_failure(chunk_id: usize, kind: &str, detail: String) -> BlattwerkError {
    match kind {
        "corrupt_input" => BlattwerkError::CorruptInput(detail),
        "empty_document" => BlattwerkError::EmptyDocument(detail),
        "encrypted_document" => BlattwerkError::EncryptedDocument(detail),
        "unsupported_format" => BlattwerkError::UnsupportedFormat(detail),
        "render_unavailable" => BlattwerkError::RenderUnavailable(detail),
        "render" => BlattwerkError::Render(detail),
        "invalid_argument" => BlattwerkError::InvalidArgument(detail),
        _ => BlattwerkError::Worker { chunk_id, detail },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::scheduler::{PageWorkScheduler, run_indices};

    struct Multiply {
        factor: usize,
    }

    impl ChunkWorker for Multiply {
        type Output = usize;

        fn run_chunk(
            &self,
            chunk: &WorkChunk,
            progress: &dyn Fn(usize),
        ) -> Result<ChunkResult<usize>> {
            run_indices(chunk, progress, |index| {
                if index == 99 {
                    Err(BlattwerkError::CorruptInput("page 99 is damaged".into()))
                } else {
                    Ok(index * self.factor)
                }
            })
        }
    }

    fn request_bytes(indices: Vec<usize>, factor: usize) -> Vec<u8> {
        serde_json::to_vec(&WorkerRequest {
            chunk: WorkChunk { id: 3, indices },
            job: factor,
        })
        .unwrap()
    }

    fn messages(output: &[u8]) -> Vec<WorkerMessage<usize>> {
        String::from_utf8_lossy(output)
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn serve_chunk_streams_progress_then_result() {
        let input = request_bytes(vec![4, 5, 6], 2);
        let mut output = Vec::new();
        serve_chunk(input.as_slice(), &mut output, |factor| Ok(Multiply { factor })).unwrap();

        let messages = messages(&output);
        assert_eq!(messages.len(), 4);
        assert!(matches!(messages[0], WorkerMessage::PageDone { index: 4 }));
        match &messages[3] {
            WorkerMessage::Finished { result } => {
                assert_eq!(result.chunk_id, 3);
                let values: Vec<usize> = result.pages.iter().map(|p| p.value).collect();
                assert_eq!(values, vec![8, 10, 12]);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn serve_chunk_reports_failure_kind() {
        let input = request_bytes(vec![98, 99], 1);
        let mut output = Vec::new();
        let err = serve_chunk(input.as_slice(), &mut output, |factor| Ok(Multiply { factor }))
            .unwrap_err();
        assert!(matches!(err, BlattwerkError::CorruptInput(_)));

        match messages(&output).last() {
            Some(WorkerMessage::Failed { kind, detail }) => {
                assert_eq!(kind, "corrupt_input");
                assert_eq!(detail, "page 99 is damaged");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn failure_kinds_round_trip() {
        let err = BlattwerkError::EncryptedDocument("locked.pdf".into());
        let (kind, detail) = describe_failure(&err);
        assert!(matches!(
            rebuild_failure(0, kind, detail),
            BlattwerkError::EncryptedDocument(d) if d == "locked.pdf"
        ));
        assert!(matches!(
            rebuild_failure(4, "other", "boom".into()),
            BlattwerkError::Worker { chunk_id: 4, .. }
        ));
    }

    fn shell_worker(script: &str) -> ProcessChunkWorker<usize, usize> {
        ProcessChunkWorker::new(WorkerCommand::new("sh").arg("-c").arg(script), 1)
    }

    #[cfg(unix)]
    #[test]
    fn process_worker_reads_result_and_progress() {
        let worker = shell_worker(
            r#"cat > /dev/null
echo '{"type":"page_done","index":0}'
echo '{"type":"finished","result":{"chunk_id":0,"pages":[{"index":0,"value":42}]}}'"#,
        );
        let seen = Mutex::new(Vec::new());
        let chunk = WorkChunk {
            id: 0,
            indices: vec![0],
        };

        let result = worker
            .run_chunk(&chunk, &|index: usize| seen.lock().unwrap().push(index))
            .unwrap();
        assert_eq!(result.pages[0].value, 42);
        assert_eq!(*seen.lock().unwrap(), vec![0]);
    }

    #[cfg(unix)]
    #[test]
    fn process_worker_through_scheduler() {
        let worker = shell_worker(
            r#"cat > /dev/null
echo '{"type":"finished","result":{"chunk_id":0,"pages":[{"index":0,"value":7},{"index":1,"value":9}]}}'"#,
        );
        let output = PageWorkScheduler::new(1).run(2, &worker).unwrap();
        assert_eq!(output, vec![7, 9]);
    }

    #[cfg(unix)]
    #[test]
    fn process_worker_failure_keeps_error_kind() {
        let worker = shell_worker(
            r#"cat > /dev/null
echo '{"type":"failed","kind":"corrupt_input","detail":"bad xref"}'
exit 1"#,
        );
        let chunk = WorkChunk {
            id: 0,
            indices: vec![0],
        };
        let err = worker.run_chunk(&chunk, &|_: usize| {}).unwrap_err();
        assert!(matches!(err, BlattwerkError::CorruptInput(d) if d == "bad xref"));
    }

    #[cfg(unix)]
    #[test]
    fn crashed_process_is_a_worker_error() {
        let worker = shell_worker("cat > /dev/null; exit 3");
        let chunk = WorkChunk {
            id: 5,
            indices: vec![0],
        };
        let err = worker.run_chunk(&chunk, &|_: usize| {}).unwrap_err();
        assert!(matches!(err, BlattwerkError::Worker { chunk_id: 5, .. }));
    }

    #[cfg(unix)]
    #[test]
    fn garbage_output_is_a_protocol_error() {
        let worker = shell_worker("cat > /dev/null; echo 'not json'");
        let chunk = WorkChunk {
            id: 0,
            indices: vec![0],
        };
        let err = worker.run_chunk(&chunk, &|_: usize| {}).unwrap_err();
        assert!(matches!(err, BlattwerkError::WorkerProtocol(_)));
    }
}

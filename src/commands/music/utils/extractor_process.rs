//! Ownership of the per-guild extractor subprocess and the adapter that turns
//! its piped stdout into something songbird can decode.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use symphonia::core::io::MediaSource;
use symphonia::core::probe::Hint;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::music_manager::{MusicError, MusicResult};

/// Size of each read from the extractor's stdout.
const CHUNK_SIZE: usize = 32 * 1024;
/// Chunks buffered between the async pump and the decoder thread.
const CHUNK_BACKLOG: usize = 64;

/// A running external process that can be asked to terminate.
pub trait SubprocessHandle: Send {
    /// Best-effort kill. Must be safe to call on an already exited process.
    fn terminate(&mut self);
}

impl SubprocessHandle for tokio::process::Child {
    fn terminate(&mut self) {
        if let Err(e) = self.start_kill() {
            debug!("Extractor process already gone: {}", e);
        }
    }
}

#[derive(Default)]
struct SlotState {
    generation: u64,
    process: Option<Box<dyn SubprocessHandle>>,
}

/// Holds at most one live extractor subprocess for a guild.
///
/// Every `begin` or `cancel` kills the parked process and bumps a generation
/// counter, so tickets handed out earlier become stale.
#[derive(Clone, Default)]
pub struct ExtractionSlot {
    inner: Arc<Mutex<SlotState>>,
}

impl ExtractionSlot {
    fn state(&self) -> MutexGuard<'_, SlotState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a new extraction, superseding any previous one.
    pub fn begin(&self) -> ExtractionTicket {
        let mut state = self.state();
        if let Some(mut process) = state.process.take() {
            process.terminate();
        }
        state.generation += 1;
        ExtractionTicket {
            slot: self.clone(),
            generation: state.generation,
        }
    }

    /// Kills the parked process, if any, and invalidates outstanding tickets.
    /// Returns whether a process was terminated.
    pub fn cancel(&self) -> bool {
        let mut state = self.state();
        state.generation += 1;
        match state.process.take() {
            Some(mut process) => {
                process.terminate();
                true
            }
            None => false,
        }
    }

    pub fn has_process(&self) -> bool {
        self.state().process.is_some()
    }
}

/// Permission to run one extraction on behalf of a `play` call.
pub struct ExtractionTicket {
    slot: ExtractionSlot,
    generation: u64,
}

impl ExtractionTicket {
    /// A ticket on a private slot, for extractions no guild owns.
    pub fn detached() -> Self {
        ExtractionSlot::default().begin()
    }

    /// False once a newer `play` or a cancellation has taken over the slot.
    pub fn is_current(&self) -> bool {
        self.slot.state().generation == self.generation
    }

    /// Parks `process` in the slot. A stale ticket kills the process instead.
    pub fn install(&self, mut process: Box<dyn SubprocessHandle>) -> MusicResult<()> {
        let mut state = self.slot.state();
        if state.generation != self.generation {
            process.terminate();
            return Err(MusicError::ExtractionCancelled);
        }
        if let Some(mut previous) = state.process.replace(process) {
            warn!("Replacing an extractor process that was still parked");
            previous.terminate();
        }
        Ok(())
    }

    /// Kills the process this ticket installed, if the ticket is still current.
    pub fn release(&self) {
        let mut state = self.slot.state();
        if state.generation == self.generation {
            if let Some(mut process) = state.process.take() {
                process.terminate();
            }
        }
    }
}

/// Audio arriving on a pipe, exposed as a non-seekable media source.
///
/// An async task pumps the pipe into a bounded channel; reads block on the
/// decoder thread until the next chunk lands.
pub struct PipedAudio {
    buffer: Vec<u8>,
    position: usize,
    chunks: mpsc::Receiver<io::Result<Vec<u8>>>,
    finished: bool,
    hint: Hint,
}

impl PipedAudio {
    /// Wraps `reader`, replaying `first_chunk` (already consumed from it) first.
    pub fn spawn<R>(first_chunk: Vec<u8>, mut reader: R, extension: &str) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (sender, chunks) = mpsc::channel(CHUNK_BACKLOG);

        tokio::spawn(async move {
            let mut buf = vec![0u8; CHUNK_SIZE];
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        if sender.send(Ok(buf[..n].to_vec())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = sender.send(Err(e)).await;
                        break;
                    }
                }
            }
            debug!("Extractor pipe closed");
        });

        let mut hint = Hint::new();
        hint.with_extension(extension);

        Self {
            buffer: first_chunk,
            position: 0,
            chunks,
            finished: false,
            hint,
        }
    }

    pub fn hint(&self) -> Hint {
        self.hint.clone()
    }
}

impl Read for PipedAudio {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.position < self.buffer.len() {
                let available = &self.buffer[self.position..];
                let n = available.len().min(buf.len());
                buf[..n].copy_from_slice(&available[..n]);
                self.position += n;
                return Ok(n);
            }
            if self.finished {
                return Ok(0);
            }
            match self.chunks.blocking_recv() {
                Some(Ok(chunk)) => {
                    self.buffer = chunk;
                    self.position = 0;
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Err(e);
                }
                None => self.finished = true,
            }
        }
    }
}

impl Seek for PipedAudio {
    fn seek(&mut self, _: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "piped audio is not seekable",
        ))
    }
}

impl MediaSource for PipedAudio {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

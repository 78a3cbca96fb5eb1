//! SIGINT handling and interruptible control operations.
//!
//! Outside of a flush, Ctrl-C is counted and ignored; past a few attempts
//! the user is told the process cannot be interrupted. While
//! [`run_interruptible`] is waiting on a flushing request, the first signal
//! asks the engine to stop flushing instead. The request itself decides the
//! outcome.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use console::{Term, style};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::control::{ControlChannel, ControlExt, ControlResult, Request, Response, flush_progress};

/// Signals tolerated before the user is told they have no effect.
const MAX_SIGNALS: usize = 4;
const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Quiet period before a progress bar appears.
const SHOW_PROGRESS_AFTER: Duration = Duration::from_secs(2);
const CANNOT_INTERRUPT: &[u8] = b"Can't interrupt CAS management process\n";

static SIGNALS: AtomicUsize = AtomicUsize::new(0);
static FLUSH_ACTIVE: AtomicBool = AtomicBool::new(false);
static INTERRUPT_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Record one SIGINT. Only touches atomics and `write(2)`.
pub fn note_signal() {
    if FLUSH_ACTIVE.swap(false, Ordering::SeqCst) {
        INTERRUPT_REQUESTED.store(true, Ordering::SeqCst);
        return;
    }
    let count = SIGNALS.fetch_add(1, Ordering::SeqCst) + 1;
    if count > MAX_SIGNALS {
        write_stderr(CANNOT_INTERRUPT);
    }
}

#[cfg(unix)]
fn write_stderr(bytes: &[u8]) {
    // SAFETY: write(2) is async-signal-safe and the buffer outlives the call.
    unsafe {
        libc::write(libc::STDERR_FILENO, bytes.as_ptr().cast(), bytes.len());
    }
}

#[cfg(not(unix))]
fn write_stderr(bytes: &[u8]) {
    use std::io::Write;
    let _ = std::io::stderr().write_all(bytes);
}

#[cfg(unix)]
extern "C" fn on_sigint(_: libc::c_int) {
    note_signal();
}

/// Install the process-wide SIGINT handler.
#[cfg(unix)]
pub fn install() {
    let handler = on_sigint as extern "C" fn(libc::c_int);
    // SAFETY: the handler only touches atomics and calls write(2).
    let previous = unsafe { libc::signal(libc::SIGINT, handler as libc::sighandler_t) };
    if previous == libc::SIG_ERR {
        tracing::warn!("failed to install SIGINT handler");
    }
}

#[cfg(not(unix))]
pub fn install() {}

/// SIGINTs received outside of a flush.
pub fn signal_count() -> usize {
    SIGNALS.load(Ordering::SeqCst)
}

/// Execute `request`, showing flush progress under `title` and turning the
/// first Ctrl-C into an `InterruptFlushing` request on a second handle.
pub fn run_interruptible(
    channel: &mut dyn ControlChannel,
    request: Request,
    title: &str,
) -> ControlResult<Response> {
    let handle = match channel.open_handle() {
        Ok(handle) => handle,
        Err(e) => {
            tracing::debug!(error = %e, "no second handle, running uninterruptibly");
            return channel.execute(request);
        }
    };
    let target = request.progress_target();
    let (done_tx, done_rx) = mpsc::channel::<()>();

    INTERRUPT_REQUESTED.store(false, Ordering::SeqCst);
    FLUSH_ACTIVE.store(true, Ordering::SeqCst);

    thread::scope(|scope| {
        scope.spawn(move || watch(handle, target, title, done_rx));
        let outcome = channel.execute(request);
        FLUSH_ACTIVE.store(false, Ordering::SeqCst);
        drop(done_tx);
        outcome
    })
}

fn watch(
    mut handle: Box<dyn ControlChannel>,
    target: Option<(u16, Option<u16>)>,
    title: &str,
    done: Receiver<()>,
) {
    let started = Instant::now();
    let interactive = Term::stdout().is_term() && Term::stderr().is_term();
    let mut bar: Option<ProgressBar> = None;
    let mut interrupted = false;

    loop {
        match done.recv_timeout(POLL_INTERVAL) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
        if interrupted {
            continue;
        }
        if INTERRUPT_REQUESTED.swap(false, Ordering::SeqCst) {
            interrupted = true;
            tracing::debug!(title, "interrupt requested");
            if let Err(e) = handle.execute(Request::InterruptFlushing) {
                tracing::debug!(error = %e, "interrupt request failed");
            }
            if let Some(bar) = bar.take() {
                bar.finish_and_clear();
            }
            continue;
        }

        let progress = target.and_then(|target| poll_progress(handle.as_mut(), target));
        let progress = progress.unwrap_or(0.0);
        if bar.is_none() && interactive && progress < 50.0 && started.elapsed() >= SHOW_PROGRESS_AFTER {
            bar = Some(progress_bar(title));
        }
        if let Some(bar) = &bar {
            let position = progress as u64;
            if position > bar.position() {
                bar.set_position(position);
            }
        }
    }

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
}

fn poll_progress(handle: &mut dyn ControlChannel, (cache_id, core_id): (u16, Option<u16>)) -> Option<f64> {
    match core_id {
        Some(core_id) => handle
            .core_info(cache_id, core_id)
            .ok()
            .map(|core| flush_progress(core.dirty, core.flushed)),
        None => handle
            .cache_info(cache_id)
            .ok()
            .map(|cache| flush_progress(cache.dirty, cache.flushed)),
    }
}

fn progress_bar(title: &str) -> ProgressBar {
    let bar = ProgressBar::with_draw_target(Some(100), ProgressDrawTarget::stdout());
    if let Ok(style) = ProgressStyle::with_template("{msg}... [{bar:50.cyan}] {pos:>3}% [{eta} remaining]") {
        bar.set_style(style.progress_chars("=- "));
    }
    bar.set_message(style(title).bold().to_string());
    bar
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{ControlError, ErrorCode};
    use serial_test::serial;
    use std::sync::Arc;

    /// Flushes until someone sends `InterruptFlushing` through any handle.
    struct Stubborn {
        interrupted: Arc<AtomicBool>,
        raise_signal: bool,
    }

    impl ControlChannel for Stubborn {
        fn execute(&mut self, request: Request) -> ControlResult<Response> {
            match request {
                Request::InterruptFlushing => {
                    self.interrupted.store(true, Ordering::SeqCst);
                    Ok(Response::Done)
                }
                Request::FlushCache { .. } => {
                    if self.raise_signal {
                        note_signal();
                    }
                    let deadline = Instant::now() + Duration::from_secs(5);
                    while Instant::now() < deadline {
                        if self.interrupted.load(Ordering::SeqCst) {
                            return Err(ErrorCode::CacheFlushingInterrupted.into());
                        }
                        thread::sleep(Duration::from_millis(10));
                    }
                    Ok(Response::Done)
                }
                _ => Err(ControlError::Engine(ErrorCode::CacheNotExist)),
            }
        }

        fn open_handle(&self) -> ControlResult<Box<dyn ControlChannel>> {
            Ok(Box::new(Stubborn {
                interrupted: Arc::clone(&self.interrupted),
                raise_signal: false,
            }))
        }
    }

    #[test]
    #[serial]
    fn signal_during_flush_interrupts_it() {
        let mut channel = Stubborn {
            interrupted: Arc::new(AtomicBool::new(false)),
            raise_signal: true,
        };
        let before = signal_count();
        let err = run_interruptible(&mut channel, Request::FlushCache { cache_id: 1 }, "Flushing cache")
            .unwrap_err();
        assert!(err.is_interrupted());
        assert_eq!(signal_count(), before);
        assert!(!FLUSH_ACTIVE.load(Ordering::SeqCst));
    }

    #[test]
    #[serial]
    fn quick_requests_return_their_result() {
        let mut channel = Stubborn {
            interrupted: Arc::new(AtomicBool::new(false)),
            raise_signal: false,
        };
        let err = run_interruptible(&mut channel, Request::CacheInfo { cache_id: 1 }, "Stopping cache")
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::CacheNotExist));
    }

    #[test]
    #[serial]
    fn signals_outside_flush_are_counted() {
        FLUSH_ACTIVE.store(false, Ordering::SeqCst);
        let before = signal_count();
        note_signal();
        note_signal();
        assert_eq!(signal_count(), before + 2);
        assert!(!INTERRUPT_REQUESTED.load(Ordering::SeqCst));
    }
}

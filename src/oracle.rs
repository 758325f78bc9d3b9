//! Ground-truth sources for active learning.
//!
//! An [`Oracle`] labels candidate links proposed by an active learner. The
//! evaluation engine uses [`SimulatedOracle`], which answers from the training
//! gold standard; [`ConsoleOracle`] asks a human on a terminal and is the only
//! place where the engine may wait on the outside world, so it honours a
//! timeout and a shared [`CancellationToken`].

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::OracleError;
use crate::mapping::{Mapping, POSITIVE_THRESHOLD};

pub type OracleResult<T> = std::result::Result<T, OracleError>;

/// How often a waiting oracle re-checks its cancellation token.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A shared "stop" flag, set by an interrupt handler or by the caller.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// The underlying flag, for registration with `signal_hook::flag`.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

/// Labels candidate links: 1.0 for a match, 0.0 for a non-match.
pub trait Oracle: Send + Sync {
    fn classify(&self, examples: &Mapping) -> OracleResult<Mapping>;
}

/// Answers from a reference mapping.
#[derive(Debug, Clone)]
pub struct SimulatedOracle {
    reference: Mapping,
}

impl SimulatedOracle {
    pub fn new(reference: Mapping) -> Self {
        Self { reference }
    }
}

impl Oracle for SimulatedOracle {
    fn classify(&self, examples: &Mapping) -> OracleResult<Mapping> {
        let mut labeled = Mapping::new();
        for (s, t, _) in examples.pairs() {
            let positive = self
                .reference
                .score(s, t)
                .is_some_and(|score| score >= POSITIVE_THRESHOLD);
            labeled.add(s, t, if positive { 1.0 } else { 0.0 });
        }
        Ok(labeled)
    }
}

/// Asks a human to rate examples in `[-1, +1]`, one per line.
///
/// Each round first expects `r` (rate) or `q` (quit). Input is read on a
/// background thread so that waiting can be interrupted.
///
/// Reaching `max_rounds` only marks the oracle stopped; callers that loop
/// over rounds check [`is_stopped`](Self::is_stopped). Rounds are refused
/// only after the user quits with `q`.
pub struct ConsoleOracle {
    lines: Mutex<Receiver<std::io::Result<String>>>,
    timeout: Duration,
    cancel: CancellationToken,
    max_rounds: usize,
    rounds: AtomicUsize,
    stopped: AtomicBool,
    quit: AtomicBool,
}

impl ConsoleOracle {
    /// An oracle reading from standard input.
    pub fn stdin(max_rounds: usize, timeout: Duration, cancel: CancellationToken) -> Self {
        Self::from_reader(
            std::io::BufReader::new(std::io::stdin()),
            max_rounds,
            timeout,
            cancel,
        )
    }

    pub fn from_reader<R>(
        reader: R,
        max_rounds: usize,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Self
    where
        R: BufRead + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            for line in reader.lines() {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        Self {
            lines: Mutex::new(rx),
            timeout,
            cancel,
            max_rounds,
            rounds: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
            quit: AtomicBool::new(false),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Number of rounds started so far.
    pub fn rounds(&self) -> usize {
        self.rounds.load(Ordering::SeqCst)
    }

    fn next_line(&self, lines: &Receiver<std::io::Result<String>>) -> OracleResult<String> {
        let started = Instant::now();
        loop {
            if self.cancel.is_cancelled() {
                self.stop();
                return Err(OracleError::Cancelled);
            }
            match lines.recv_timeout(POLL_INTERVAL) {
                Ok(Ok(line)) => return Ok(line.trim().to_string()),
                Ok(Err(_)) | Err(RecvTimeoutError::Disconnected) => {
                    return Err(OracleError::InputClosed);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if started.elapsed() >= self.timeout {
                        return Err(OracleError::TimedOut {
                            seconds: self.timeout.as_secs(),
                        });
                    }
                }
            }
        }
    }
}

impl Oracle for ConsoleOracle {
    fn classify(&self, examples: &Mapping) -> OracleResult<Mapping> {
        if self.quit.load(Ordering::SeqCst) {
            return Err(OracleError::Cancelled);
        }
        let round = self.rounds.fetch_add(1, Ordering::SeqCst) + 1;
        if round >= self.max_rounds {
            self.stop();
        }

        let lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        eprintln!(
            "To rate set {round} of examples, write 'r' and press enter.\n\
             To stop learning, write 'q' and press enter.\n\
             Rate examples with numbers in [-1, +1] (-1 strong negative, +1 strong positive)."
        );
        if self.next_line(&lines)? == "q" {
            self.quit.store(true, Ordering::SeqCst);
            self.stop();
            return Err(OracleError::Cancelled);
        }

        let mut labeled = Mapping::new();
        for (j, (s, t, _)) in examples.pairs().enumerate() {
            loop {
                eprintln!("Example #{round}.{}: ({s}, {t})", j + 1);
                let line = self.next_line(&lines)?;
                match line.parse::<f64>() {
                    Ok(rating) if (-1.0..=1.0).contains(&rating) => {
                        labeled.add(s, t, if rating >= 0.0 { 1.0 } else { 0.0 });
                        break;
                    }
                    Ok(_) => eprintln!("Input number out of range [-1, +1], please try again..."),
                    Err(_) => eprintln!("Input did not match a number, please try again..."),
                }
            }
        }
        Ok(labeled)
    }
}

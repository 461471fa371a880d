//! Acne tendency reduction over an observation history.
//!
//! Adjacent pairs are scanned left to right with a counter tracking the
//! current unbroken run of has-acne observations:
//!
//! | old    | new    | event                     | run        |
//! |--------|--------|---------------------------|------------|
//! | clear  | acne   | `AcneAppeared`            | 1          |
//! | acne   | acne   | `SeverityWorse`/`Better`  | +1         |
//! | any    | clear  | none                      | 0          |
//!
//! Once the run reaches [`STABLE_RUN_LENGTH`], each acne→acne pair emits
//! `Stable` after its worse/better event.

use crate::types::{AcneObservation, VerdictEvent, VerdictKind};
use thiserror::Error;

pub const STABLE_RUN_LENGTH: u32 = 10;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TendencyError {
    #[error("insufficient history: need at least 2 observations, have {0}")]
    InsufficientHistory(usize),
}

enum Transition {
    Appeared,
    Continued { worse: bool },
    Cleared,
}

/// Length of the current unbroken run of has-acne observations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsecutiveRun {
    count: u32,
}

impl ConsecutiveRun {
    pub fn count(&self) -> u32 {
        self.count
    }

    fn step(&mut self, old: &AcneObservation, new: &AcneObservation) -> Transition {
        match (old.has_acne, new.has_acne) {
            (false, true) => {
                self.count = 1;
                Transition::Appeared
            }
            (true, true) => {
                self.count += 1;
                Transition::Continued {
                    worse: old.severity_index < new.severity_index,
                }
            }
            (_, false) => {
                self.count = 0;
                Transition::Cleared
            }
        }
    }
}

/// Lazy verdict stream over a history. Cloning restarts from the clone point.
#[derive(Debug, Clone)]
pub struct Verdicts<'a> {
    pairs: std::slice::Windows<'a, AcneObservation>,
    run: ConsecutiveRun,
    pending: Option<VerdictKind>,
}

impl Verdicts<'_> {
    /// Run counter after the pairs consumed so far.
    pub fn run(&self) -> ConsecutiveRun {
        self.run
    }
}

impl Iterator for Verdicts<'_> {
    type Item = VerdictEvent;

    fn next(&mut self) -> Option<VerdictEvent> {
        if let Some(kind) = self.pending.take() {
            return Some(kind.into());
        }

        loop {
            let pair = self.pairs.next()?;
            match self.run.step(&pair[0], &pair[1]) {
                Transition::Appeared => return Some(VerdictKind::AcneAppeared.into()),
                Transition::Continued { worse } => {
                    if self.run.count >= STABLE_RUN_LENGTH {
                        self.pending = Some(VerdictKind::Stable);
                    }
                    let kind = if worse {
                        VerdictKind::SeverityWorse
                    } else {
                        VerdictKind::SeverityBetter
                    };
                    return Some(kind.into());
                }
                Transition::Cleared => continue,
            }
        }
    }
}

/// Start a verdict scan. Needs at least two observations.
pub fn reduce(history: &[AcneObservation]) -> Result<Verdicts<'_>, TendencyError> {
    if history.len() < 2 {
        return Err(TendencyError::InsufficientHistory(history.len()));
    }
    Ok(Verdicts {
        pairs: history.windows(2),
        run: ConsecutiveRun::default(),
        pending: None,
    })
}

/// All verdicts for a history, or a single `NoChange` when the scan is silent.
pub fn summarize(history: &[AcneObservation]) -> Result<Vec<VerdictEvent>, TendencyError> {
    let events: Vec<VerdictEvent> = reduce(history)?.collect();
    if events.is_empty() {
        return Ok(vec![VerdictKind::NoChange.into()]);
    }
    Ok(events)
}

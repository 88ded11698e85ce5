use crate::clause::{Atom, Kind};
use crate::core::Status;
use std::fmt;

/// Basic callbacks to the solver.
///
/// Typically intended for printing/statistics.
pub trait Callbacks: Sized {
    /// Called before starting to solve
    fn on_start(&mut self) {}

    /// Called whenever the solver restarts
    fn on_restart(&mut self) {}

    /// Called whenever a new clause enters the solver.
    ///
    /// ## Params
    /// - `c`: atoms of the clause
    /// - `k`: specifies where the clause comes from
    fn on_new_clause(&mut self, _c: &[Atom], _k: Kind) {}

    /// called on every restart to indicate progress
    fn on_progress<F>(&mut self, _f: F)
    where
        F: FnOnce() -> ProgressStatus,
    {
    }

    /// Called when a result is computed
    fn on_result(&mut self, _s: Status) {}
}

/// Progress indicator from the solver.
///
/// This is given to `Callbacks` regularly so it can log it somehow.
#[derive(Debug, Clone, Copy)]
pub struct ProgressStatus {
    pub restarts: u64,
    pub conflicts: u64,
    pub decisions: u64,
    pub propagations: u64,
    pub n_clauses: usize,
    pub n_learnts: usize,
}

/// Callbacks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Basic;

impl Basic {
    pub fn new() -> Self {
        Basic
    }
}

impl Callbacks for Basic {}

/// Basic set of callbacks, maintaining some clause statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    pub n_restarts: usize,
    pub n_clauses: u64,
    pub n_theory: u64,
    pub n_learnt: u64,
}

impl Callbacks for Stats {
    fn on_restart(&mut self) {
        self.n_restarts += 1
    }
    fn on_new_clause(&mut self, _: &[Atom], k: Kind) {
        self.n_clauses += 1;
        match k {
            Kind::Learnt => self.n_learnt += 1,
            Kind::Theory => self.n_theory += 1,
            Kind::Hypothesis => (),
        }
    }
}

impl Stats {
    /// Allocate a new set of callbacks.
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, out: &mut fmt::Formatter) -> fmt::Result {
        write!(
            out,
            "restarts: {}, clauses: {} (th: {}, learnt: {})",
            self.n_restarts, self.n_clauses, self.n_theory, self.n_learnt
        )
    }
}

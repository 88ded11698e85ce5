/* Main Interface */

use crate::clause::{Atom, CRef};
use crate::core::Status;
use crate::formula::Formula;
use crate::theory::Theory;
use std::fmt;

/// `eval` was called on a formula that is not decided by the current trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndecidedLit;

impl fmt::Display for UndecidedLit {
    fn fmt(&self, out: &mut fmt::Formatter) -> fmt::Result {
        write!(out, "formula is not decided by the current trail")
    }
}

/// Main interface for a solver: queue clauses, solve under assumptions,
/// inspect the trail and the final conflict.
pub trait SolverInterface<F: Formula> {
    /// Opaque payload of theory lemmas this solver stores on clauses.
    type Lemma: Clone + fmt::Debug;

    /// Queue clauses for ingestion at the next solve.
    ///
    /// Permanent clauses hold forever; local clauses hold for the next solve
    /// only. `tag` is an arbitrary user label attached to each clause.
    fn assume(&mut self, clauses: Vec<Vec<F>>, permanent: bool, tag: Option<u32>);

    /// Search for a model under the given local hypotheses, driving `th` to
    /// a fixpoint between propagation rounds.
    fn solve_with<Th: Theory<F, Lemma = Self::Lemma>>(
        &mut self,
        th: &mut Th,
        assumptions: &[F],
    ) -> Status;

    /// Value of `f` under the current trail.
    fn eval(&self, f: &F) -> Result<bool, UndecidedLit>;

    /// The trail: assigned atoms in assignment order (read-only).
    fn trail(&self) -> &[Atom];

    /// Check that every alive clause has at least one true atom under the
    /// current trail; the offending clause is returned otherwise.
    fn check_model(&self) -> Result<(), Vec<Atom>>;

    /// After an Unsat result, the falsified clause that ended the search.
    fn unsat_conflict(&self) -> Option<CRef>;

    /// If `false`, the clause set is unsatisfiable at level 0 and the solver
    /// will keep answering Unsat.
    fn is_ok(&self) -> bool;

    fn num_vars(&self) -> u32;
    fn num_clauses(&self) -> usize;
    fn num_learnts(&self) -> usize;
    fn num_conflicts(&self) -> u64;
    fn num_decisions(&self) -> u64;
    fn num_propagations(&self) -> u64;
    fn num_restarts(&self) -> u64;
}

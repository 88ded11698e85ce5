/*****************************************************************************************[lib.rs]
Copyright (c) 2003-2006, Niklas Een, Niklas Sorensson (MiniSat)
Copyright (c) 2007-2010, Niklas Sorensson (MiniSat)

Permission is hereby granted, free of charge, to any person obtaining a copy of this software and
associated documentation files (the "Software"), to deal in the Software without restriction,
including without limitation the rights to use, copy, modify, merge, publish, distribute,
sublicense, and/or sell copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:

The above copyright notice and this permission notice shall be included in all copies or
substantial portions of the Software.

THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT
NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM,
DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT
OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.
**************************************************************************************************/

//! CDCL SAT solver core with theory hooks and resolution proofs.
//!
//! The solver is polymorphic over an abstract [`Formula`] type and drives an
//! optional [`Theory`] to a fixpoint between propagation rounds. Every learnt
//! clause records the clauses it was resolved from, so an unsatisfiable run
//! can be expanded into a resolution proof and an unsat core on demand.

//======== LOG ============

// stubs when logging is not enabled
#[cfg(not(feature = "logging"))]
#[macro_use]
pub(crate) mod log {
    macro_rules! trace {
        ($( $x:expr ),*) => {};
    }
    macro_rules! debug {
        ($( $x:expr ),*) => {};
    }
    macro_rules! info {
        ($( $x:expr ),*) => {};
    }
}

#[cfg(feature = "logging")]
#[macro_use]
pub extern crate log;

//======== PUBLIC INTERFACE ============

pub mod callbacks;
pub mod clause;
pub mod core;
pub mod formula;
pub mod heap;
pub mod interface;
pub mod intmap;
pub mod proof;
pub mod theory;

pub use crate::{
    callbacks::{Basic as BasicCallbacks, Callbacks, ProgressStatus, Stats as StatsCallbacks},
    clause::{lbool, AMap, ASet, Atom, CRef, Kind as ClauseKind, Premise, VMap, Var},
    core::{Reason, Solver, SolverOpts, Status},
    formula::Formula,
    interface::{SolverInterface, UndecidedLit},
    proof::{ProofError, Step},
    theory::{EmptyTheory, Theory, TheoryArg},
};

/// Basic solver over DIMACS-style `i32` formulas, with basic callbacks and no
/// theory lemma payload.
pub type BasicSolver = Solver<i32, (), BasicCallbacks>;

//! Theory interface.
//!
//! A theory runs synchronously between propagation rounds. The solver hands
//! it the trail slice it has not seen yet, and the theory answers through the
//! [`TheoryArg`] actions: propagating atoms, pushing lemmas, raising a
//! conflict, or registering backtrack hooks.

use crate::clause::Atom;
use crate::formula::Formula;
use std::fmt;

pub use crate::core::TheoryArg;

/// Theory that parametrizes the solver and can react on events.
pub trait Theory<F: Formula> {
    /// Opaque payload attached to every clause the theory produces; it is
    /// recorded on the clause premise and surfaces again in proofs.
    type Lemma: Clone + fmt::Debug;

    /// Check the partial model (best effort).
    ///
    /// `acts.new_assignments()` is the trail slice assigned since the last
    /// call. The theory may propagate, push lemmas, or raise a conflict
    /// through `acts`; it is also allowed to accept silently and leave the
    /// real work to [`Theory::if_sat`].
    fn assume(&mut self, acts: &mut TheoryArg<'_, F, Self::Lemma>);

    /// Check a full model candidate thoroughly.
    ///
    /// Called when every variable is assigned and propagation is at a
    /// fixpoint. If the model is not acceptable the theory *must* raise a
    /// conflict or propagate; if it stays silent, the solver declares Sat.
    fn if_sat(&mut self, acts: &mut TheoryArg<'_, F, Self::Lemma>);

    /// Called each time a new variable is interned from a user formula, so
    /// the theory can internalize it. `atom` is the positive atom of the new
    /// variable.
    fn add_formula(&mut self, f: &F, atom: Atom) {
        let _ = (f, atom);
    }

    /// Undo dispatcher for hooks registered with
    /// [`TheoryArg::on_backtrack`]; hooks of a level fire in reverse
    /// registration order when that level is popped.
    fn undo(&mut self, hook: u64) {
        let _ = hook;
    }
}

/// Trivial theory that accepts every model.
#[derive(Debug, Default)]
pub struct EmptyTheory;

impl EmptyTheory {
    pub fn new() -> Self {
        EmptyTheory
    }
}

impl<F: Formula> Theory<F> for EmptyTheory {
    type Lemma = ();
    fn assume(&mut self, _acts: &mut TheoryArg<'_, F, ()>) {}
    fn if_sat(&mut self, _acts: &mut TheoryArg<'_, F, ()>) {}
}

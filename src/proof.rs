//! Resolution proofs.
//!
//! The premise recorded on every clause forms a DAG whose leaves are
//! hypotheses, assumptions and theory lemmas. [`ClauseAllocator::expand`]
//! turns one node of that DAG into an explicit derivation step; a `History`
//! chain of more than two parents is linearized into pairwise resolutions,
//! materializing the intermediate conclusions as fresh (unattached) clauses.

use crate::clause::{Atom, CRef, ClauseAllocator, Premise, Var};
use std::fmt;

/// One derivation step of a proof node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Leaf: user-provided clause.
    Hypothesis,
    /// Leaf: unit clause standing for a local solve hypothesis.
    Assumption,
    /// Leaf: theory lemma; the payload is on the clause premise.
    Lemma,
    /// Same clause as `parent` with the `dups` occurrences removed.
    Duplicate { parent: CRef, dups: Vec<Atom> },
    /// Resolution of `left` and `right` on `pivot`.
    Resolution { left: CRef, right: CRef, pivot: Var },
}

/// Defects found while checking a proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofError {
    /// Two clauses of a chain share no complementary pair.
    NoPivot,
    /// Two clauses of a chain share more than one complementary pair.
    MultiplePivots(Var, Var),
    /// A chain does not resolve to the clause it is recorded on.
    ConclusionMismatch(CRef),
    /// A derived clause with no parents.
    EmptyHistory(CRef),
}

impl fmt::Display for ProofError {
    fn fmt(&self, out: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProofError::NoPivot => write!(out, "resolution without a pivot"),
            ProofError::MultiplePivots(a, b) => {
                write!(out, "resolution with several pivots ({:?}, {:?})", a, b)
            }
            ProofError::ConclusionMismatch(c) => {
                write!(out, "history does not resolve to its conclusion ({:?})", c)
            }
            ProofError::EmptyHistory(c) => write!(out, "derived clause without parents ({:?})", c),
        }
    }
}

/// Resolve two clauses, returning the conclusion and the pivot variable.
///
/// The pivot must be the unique variable occurring with both polarities
/// across the two sides; duplicate literals are merged.
pub(crate) fn resolve(left: &[Atom], right: &[Atom]) -> Result<(Vec<Atom>, Var), ProofError> {
    let mut atoms: Vec<Atom> = left.iter().chain(right.iter()).cloned().collect();
    // the two polar atoms of a variable have adjacent indices
    atoms.sort_unstable();
    atoms.dedup();

    let mut pivot: Option<Var> = None;
    let mut out = Vec::with_capacity(atoms.len());
    let mut i = 0;
    while i < atoms.len() {
        if i + 1 < atoms.len() && atoms[i].var() == atoms[i + 1].var() {
            match pivot {
                None => pivot = Some(atoms[i].var()),
                Some(p) => return Err(ProofError::MultiplePivots(p, atoms[i].var())),
            }
            i += 2;
        } else {
            out.push(atoms[i]);
            i += 1;
        }
    }
    match pivot {
        Some(p) => Ok((out, p)),
        None => Err(ProofError::NoPivot),
    }
}

/// Occurrences of `parent` that are gone from `child` because they were
/// duplicates.
fn duplicates(parent: &[Atom], child: &[Atom]) -> Vec<Atom> {
    let mut sorted = parent.to_vec();
    sorted.sort_unstable();
    let mut dups = vec![];
    for w in sorted.windows(2) {
        if w[0] == w[1] {
            dups.push(w[0]);
        }
    }
    debug_assert_eq!(parent.len() - dups.len(), child.len());
    dups
}

fn set_of(atoms: &[Atom]) -> Vec<Atom> {
    let mut v = atoms.to_vec();
    v.sort_unstable();
    v.dedup();
    v
}

impl<B: Clone + fmt::Debug> ClauseAllocator<B> {
    /// Expand one proof node into its derivation step.
    ///
    /// Expanding a `History` of more than two parents allocates the
    /// intermediate conclusion of the prefix chain as a fresh clause, so the
    /// step is always a single pairwise resolution.
    pub fn expand(&mut self, c: CRef) -> Step {
        let premise = self.premise(c).clone();
        match premise {
            Premise::Hypothesis => Step::Hypothesis,
            Premise::Assumption => Step::Assumption,
            Premise::Lemma(_) => Step::Lemma,
            Premise::Simplified(parent) => {
                let dups = duplicates(self.get_ref(parent).atoms(), self.get_ref(c).atoms());
                Step::Duplicate { parent, dups }
            }
            Premise::History(parents) => {
                if parents.is_empty() {
                    panic!("empty history while expanding proof node {}", self.name(c));
                }
                if parents.len() == 1 {
                    let parent = parents[0];
                    let dups = duplicates(self.get_ref(parent).atoms(), self.get_ref(c).atoms());
                    return Step::Duplicate { parent, dups };
                }
                let right = *parents.last().unwrap();
                let left = if parents.len() == 2 {
                    parents[0]
                } else {
                    let prefix = parents[..parents.len() - 1].to_vec();
                    let lits = self.chain_conclusion(&prefix).unwrap_or_else(|e| {
                        panic!("invalid resolution under proof node {}: {}", self.name(c), e)
                    });
                    self.make(&lits, Premise::History(prefix), None)
                };
                let (_, pivot) = resolve(self.get_ref(left).atoms(), self.get_ref(right).atoms())
                    .unwrap_or_else(|e| {
                        panic!("invalid resolution at proof node {}: {}", self.name(c), e)
                    });
                Step::Resolution { left, right, pivot }
            }
        }
    }

    /// Conclusion of the pairwise-resolution chain over `parents`.
    fn chain_conclusion(&self, parents: &[CRef]) -> Result<Vec<Atom>, ProofError> {
        let mut lits = set_of(self.get_ref(parents[0]).atoms());
        for &p in &parents[1..] {
            let (next, _) = resolve(&lits, self.get_ref(p).atoms())?;
            lits = next;
        }
        Ok(lits)
    }

    /// Walk the proof rooted at `root` and validate every derivation.
    ///
    /// Visited flags are set during the walk and cleared before returning,
    /// on every exit path.
    pub fn check(&mut self, root: CRef) -> Result<(), ProofError> {
        let mut to_clear = vec![];
        let mut stack = vec![root];
        let mut res = Ok(());

        'walk: while let Some(c) = stack.pop() {
            if self.get_ref(c).visited() {
                continue;
            }
            self.get_mut(c).set_visited(true);
            to_clear.push(c);

            let premise = self.premise(c).clone();
            match premise {
                Premise::Hypothesis | Premise::Assumption | Premise::Lemma(_) => {}
                Premise::Simplified(parent) => {
                    if set_of(self.get_ref(parent).atoms()) != set_of(self.get_ref(c).atoms()) {
                        res = Err(ProofError::ConclusionMismatch(c));
                        break 'walk;
                    }
                    stack.push(parent);
                }
                Premise::History(parents) => {
                    if parents.is_empty() {
                        res = Err(ProofError::EmptyHistory(c));
                        break 'walk;
                    }
                    match self.chain_conclusion(&parents) {
                        Err(e) => {
                            res = Err(e);
                            break 'walk;
                        }
                        Ok(lits) => {
                            if lits != set_of(self.get_ref(c).atoms()) {
                                res = Err(ProofError::ConclusionMismatch(c));
                                break 'walk;
                            }
                        }
                    }
                    stack.extend(parents);
                }
            }
        }

        for c in to_clear {
            self.get_mut(c).set_visited(false);
        }
        res
    }

    /// Collect the hypothesis and theory-lemma leaves the proof rooted at
    /// `root` depends on. Assumption leaves are not part of the core.
    pub fn unsat_core(&mut self, root: CRef) -> Vec<CRef> {
        let mut core = vec![];
        let mut to_clear = vec![];
        let mut stack = vec![root];

        while let Some(c) = stack.pop() {
            if self.get_ref(c).visited() {
                continue;
            }
            self.get_mut(c).set_visited(true);
            to_clear.push(c);

            match self.premise(c) {
                Premise::Hypothesis | Premise::Lemma(_) => core.push(c),
                Premise::Assumption => {}
                Premise::Simplified(parent) => stack.push(*parent),
                Premise::History(parents) => stack.extend(parents.iter().cloned()),
            }
        }

        for c in to_clear {
            self.get_mut(c).set_visited(false);
        }
        core
    }
}

//! Exercises the theory interleave: propagation with reasons, persistent and
//! local lemmas, conflicts, and backtrack hooks.

use modsat::{
    Atom, BasicCallbacks, Solver, SolverInterface, SolverOpts, Status, Theory, TheoryArg,
};

type ThSolver = Solver<i32, &'static str, BasicCallbacks>;

fn solver() -> ThSolver {
    Solver::new(SolverOpts::default(), BasicCallbacks::new())
}

fn add_permanent(s: &mut ThSolver, clauses: &[&[i32]]) {
    s.assume(clauses.iter().map(|c| c.to_vec()).collect(), true, None);
}

/// Refutes any trail where the formula `forbidden` holds.
struct Forbid {
    forbidden: i32,
}

impl Theory<i32> for Forbid {
    type Lemma = &'static str;

    fn assume(&mut self, acts: &mut TheoryArg<'_, i32, &'static str>) {
        let a = acts.mk_atom(self.forbidden);
        if acts.value_atom(a) == modsat::lbool::TRUE {
            acts.raise_conflict(&[a], "forbidden");
        }
    }

    fn if_sat(&mut self, acts: &mut TheoryArg<'_, i32, &'static str>) {
        let a = acts.mk_atom(self.forbidden);
        if acts.value_atom(a) == modsat::lbool::TRUE {
            acts.raise_conflict(&[a], "forbidden");
        }
    }
}

#[test]
fn test_theory_conflict_redirects_search() {
    let mut s = solver();
    let mut th = Forbid { forbidden: 1 };
    add_permanent(&mut s, &[&[1, 2]]);
    assert_eq!(s.solve_with(&mut th, &[]), Status::Sat);
    assert_eq!(s.eval(&1), Ok(false));
    assert_eq!(s.eval(&2), Ok(true));
    assert_eq!(s.check_model(), Ok(()));
}

#[test]
fn test_theory_refutes_clause_set() {
    let mut s = solver();
    let mut th = Forbid { forbidden: 1 };
    add_permanent(&mut s, &[&[1]]);
    assert_eq!(s.solve_with(&mut th, &[]), Status::Unsat);

    let root = s.proof().expect("unsat must have a proof");
    assert_eq!(s.check_proof(root), Ok(()));
    let core = s.unsat_core(root);
    // the hypothesis and the theory lemma together are the refutation
    let mut names: Vec<String> = core.iter().map(|&c| s.clause_name(c)).collect();
    names.sort();
    assert_eq!(names, vec!["H0".to_string(), "T0".to_string()]);
}

/// Propagates `conclusion` whenever it sees `premise` on the trail.
struct Implies {
    premise: i32,
    conclusion: i32,
}

impl Theory<i32> for Implies {
    type Lemma = &'static str;

    fn assume(&mut self, acts: &mut TheoryArg<'_, i32, &'static str>) {
        let p = acts.mk_atom(self.premise);
        if acts.value_atom(p) == modsat::lbool::TRUE {
            acts.propagate(self.conclusion, &[p], "implies");
        }
    }

    fn if_sat(&mut self, _acts: &mut TheoryArg<'_, i32, &'static str>) {}
}

#[test]
fn test_theory_propagation_with_reason() {
    let mut s = solver();
    let mut th = Implies {
        premise: 1,
        conclusion: 2,
    };
    add_permanent(&mut s, &[&[1]]);
    assert_eq!(s.solve_with(&mut th, &[]), Status::Sat);
    assert_eq!(s.eval(&1), Ok(true));
    assert_eq!(s.eval(&2), Ok(true));
}

#[test]
fn test_theory_propagation_conflict_is_analyzed() {
    let mut s = solver();
    let mut th = Implies {
        premise: 1,
        conclusion: 2,
    };
    // 2 is forced false, so propagating it from 1 refutes 1
    add_permanent(&mut s, &[&[-2], &[1, 3]]);
    assert_eq!(s.solve_with(&mut th, &[]), Status::Sat);
    assert_eq!(s.eval(&1), Ok(false));
    assert_eq!(s.eval(&3), Ok(true));
}

#[test]
fn test_theory_propagation_unsat_proof_has_lemma() {
    let mut s = solver();
    let mut th = Implies {
        premise: 1,
        conclusion: 2,
    };
    add_permanent(&mut s, &[&[1], &[-2]]);
    assert_eq!(s.solve_with(&mut th, &[]), Status::Unsat);
    let root = s.proof().expect("unsat must have a proof");
    assert_eq!(s.check_proof(root), Ok(()));
    let core = s.unsat_core(root);
    assert!(core.iter().any(|&c| s.clause_name(c).starts_with('T')));
    assert!(core.iter().any(|&c| s.clause_name(c).starts_with('H')));
}

/// Pushes a persistent lemma once, through the queue rather than by direct
/// propagation.
struct LemmaPusher {
    pushed: bool,
}

impl Theory<i32> for LemmaPusher {
    type Lemma = &'static str;

    fn assume(&mut self, acts: &mut TheoryArg<'_, i32, &'static str>) {
        if !self.pushed {
            self.pushed = true;
            let a1 = acts.mk_atom(1);
            let a2 = acts.mk_atom(2);
            acts.push_persistent(&[!a1, a2], "lemma");
        }
    }

    fn if_sat(&mut self, _acts: &mut TheoryArg<'_, i32, &'static str>) {}
}

#[test]
fn test_persistent_lemma_constrains_model() {
    let mut s = solver();
    let mut th = LemmaPusher { pushed: false };
    add_permanent(&mut s, &[&[1]]);
    assert_eq!(s.solve_with(&mut th, &[]), Status::Sat);
    assert_eq!(s.eval(&1), Ok(true));
    assert_eq!(s.eval(&2), Ok(true));
    assert_eq!(s.check_model(), Ok(()));
}

/// Locally assumes a fresh case (`3`) behind a scoped lemma, then retracts
/// it, so the lemma's level is popped and the clause dies.
struct LocalSplit {
    rounds: u32,
}

impl Theory<i32> for LocalSplit {
    type Lemma = &'static str;

    fn assume(&mut self, acts: &mut TheoryArg<'_, i32, &'static str>) {
        if acts.at_level_0() {
            return;
        }
        self.rounds += 1;
        let a3 = acts.mk_atom(3);
        if self.rounds == 1 {
            acts.push_local(&[a3], "case");
        } else if self.rounds == 2 {
            assert_eq!(acts.value_atom(a3), modsat::lbool::TRUE);
            acts.raise_conflict(&[a3], "retract");
        }
    }

    fn if_sat(&mut self, _acts: &mut TheoryArg<'_, i32, &'static str>) {}
}

#[test]
fn test_local_lemma_dies_with_its_level() {
    let mut s = solver();
    let mut th = LocalSplit { rounds: 0 };
    add_permanent(&mut s, &[&[1, 2]]);
    assert_eq!(s.solve_with(&mut th, &[]), Status::Sat);
    // the retracted case no longer constrains the model, and the dead local
    // clause is out of the checked set (it has no true atom)
    assert_eq!(s.eval(&3), Ok(false));
    assert_eq!(s.check_model(), Ok(()));
}

/// Pushes two persistent lemmas in one round, then a third that refutes the
/// branch, so a single backtrack detaches and re-adds both earlier lemmas
/// at once.
struct RedoPusher {
    rounds: u32,
}

impl Theory<i32> for RedoPusher {
    type Lemma = &'static str;

    fn assume(&mut self, acts: &mut TheoryArg<'_, i32, &'static str>) {
        if acts.at_level_0() {
            return;
        }
        self.rounds += 1;
        let a1 = acts.mk_atom(1);
        let a4 = acts.mk_atom(4);
        let a5 = acts.mk_atom(5);
        if self.rounds == 1 {
            acts.push_persistent(&[a1, a4], "one-or-four");
            acts.push_persistent(&[a1, a5], "one-or-five");
        } else if self.rounds == 2 {
            acts.push_persistent(&[!a1, a4], "not-one-or-four");
        }
    }

    fn if_sat(&mut self, _acts: &mut TheoryArg<'_, i32, &'static str>) {}
}

#[test]
fn test_multiple_persistent_lemmas_redone_together() {
    let mut s = solver();
    let mut th = RedoPusher { rounds: 0 };
    // 4 and 5 are fixed false at level 0; the decision on the third clause
    // opens the level all three lemmas land on, and the refutation of that
    // level re-adds both round-one lemmas in one backtrack, falsified
    add_permanent(&mut s, &[&[-4], &[-5], &[2, 3]]);
    assert_eq!(s.solve_with(&mut th, &[]), Status::Unsat);

    let root = s.proof().expect("unsat must have a proof");
    assert_eq!(s.check_proof(root), Ok(()));
    let core = s.unsat_core(root);
    assert!(core.iter().any(|&c| s.clause_name(c).starts_with('T')));
    assert!(core.iter().any(|&c| s.clause_name(c).starts_with('H')));
}

/// Counts the undo hooks handed back on backtracking.
struct HookCounter {
    registered: u64,
    undone: Vec<u64>,
    forbidden: i32,
}

impl Theory<i32> for HookCounter {
    type Lemma = &'static str;

    fn assume(&mut self, acts: &mut TheoryArg<'_, i32, &'static str>) {
        if !acts.at_level_0() {
            self.registered += 1;
            acts.on_backtrack(self.registered);
        }
        let a = acts.mk_atom(self.forbidden);
        if acts.value_atom(a) == modsat::lbool::TRUE {
            acts.raise_conflict(&[a], "forbidden");
        }
    }

    fn if_sat(&mut self, _acts: &mut TheoryArg<'_, i32, &'static str>) {}

    fn undo(&mut self, hook: u64) {
        self.undone.push(hook);
    }
}

#[test]
fn test_backtrack_hooks_fire_in_reverse_order() {
    let mut s = solver();
    let mut th = HookCounter {
        registered: 0,
        undone: vec![],
        // the default polarity tries `-1` first, which the theory rejects,
        // so at least one conflict pops a level with hooks in it
        forbidden: -1,
    };
    add_permanent(&mut s, &[&[1, 2], &[1, 3]]);
    assert_eq!(s.solve_with(&mut th, &[]), Status::Sat);
    assert_eq!(s.eval(&1), Ok(true));
    assert!(!th.undone.is_empty());
    let mut sorted = th.undone.clone();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(th.undone, sorted, "hooks must fire newest first");
}

/// A theory may keep steering decisions through the single-slot override.
struct Steer {
    formula: i32,
}

impl Theory<i32> for Steer {
    type Lemma = &'static str;

    fn assume(&mut self, acts: &mut TheoryArg<'_, i32, &'static str>) {
        let a = acts.mk_atom(self.formula);
        if acts.value_atom(a) == modsat::lbool::UNDEF {
            acts.set_next_decision(a);
        }
    }

    fn if_sat(&mut self, _acts: &mut TheoryArg<'_, i32, &'static str>) {}
}

#[test]
fn test_theory_steers_next_decision() {
    let mut s = solver();
    let mut th = Steer { formula: 3 };
    add_permanent(&mut s, &[&[1, 2, 3]]);
    assert_eq!(s.solve_with(&mut th, &[]), Status::Sat);
    // the suggested atom was decided rather than derived
    assert_eq!(s.eval(&3), Ok(true));
    assert!(s.num_decisions() >= 1);
}

#[test]
fn test_formulas_reach_the_theory() {
    struct Collect {
        seen: Vec<i32>,
    }
    impl Theory<i32> for Collect {
        type Lemma = &'static str;
        fn assume(&mut self, _acts: &mut TheoryArg<'_, i32, &'static str>) {}
        fn if_sat(&mut self, _acts: &mut TheoryArg<'_, i32, &'static str>) {}
        fn add_formula(&mut self, f: &i32, _atom: Atom) {
            self.seen.push(*f);
        }
    }

    let mut s = solver();
    let mut th = Collect { seen: vec![] };
    add_permanent(&mut s, &[&[1, -2], &[2, -3]]);
    assert_eq!(s.solve_with(&mut th, &[]), Status::Sat);
    let mut seen = th.seen.clone();
    seen.sort_unstable();
    // the canonical representative of every mentioned formula, once
    assert_eq!(seen, vec![1, 2, 3]);
}

/*****************************************************************************************[core.rs]
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

use {
    crate::callbacks::{Callbacks, ProgressStatus},
    crate::clause::{
        lbool, Atom, CRef, ClauseAllocator, DeletePred, Kind, OccListsData, Premise, VMap, Var,
    },
    crate::formula::Formula,
    crate::heap::{Comparator, Heap, HeapData},
    crate::interface::{SolverInterface, UndecidedLit},
    crate::proof::{ProofError, Step},
    crate::theory::Theory,
    fnv::FnvHashMap,
    std::{cmp, fmt, mem},
};

/// Outcome of a solve call. The conflict clause and its proof are exposed
/// separately after an `Unsat` answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Sat,
    Unsat,
}

/// Why an atom sits on the trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// Not assigned.
    None,
    /// Free decision.
    Decision,
    /// Forced by the given clause, whose first atom is the assigned one.
    Propagated(CRef),
    /// Forced by a local assumption, recorded as a unit clause.
    Local(CRef),
}

impl Reason {
    /// The justifying clause, for both propagations and local assumptions.
    #[inline(always)]
    pub fn clause(&self) -> Option<CRef> {
        match *self {
            Reason::Propagated(c) | Reason::Local(c) => Some(c),
            Reason::None | Reason::Decision => None,
        }
    }
}

/// The main solver structure.
///
/// A `Solver` contains the whole state of the engine: variable and clause
/// stores, trail, decision heap, undo stack and statistics. It is
/// parametrized by the formula type `F`, the opaque theory-lemma payload `B`
/// and the callbacks `Cb`. The theory itself is bound at each entry point as
/// `&mut Th`.
pub struct Solver<F: Formula, B: Clone + fmt::Debug, Cb: Callbacks> {
    cb: Cb,
    /// User clauses queued for ingestion at the next solve.
    pending: Vec<PendingClause<F>>,
    /// Cap on the learnt set; only a hook, nothing is evicted.
    max_learnts: f64,

    // restart control
    luby_restart: bool,
    restart_first: i32,
    restart_inc: f64,
    learntsize_factor: f64,
    learntsize_inc: f64,

    v: SolverV<F, B>,
}

struct PendingClause<F> {
    formulas: Vec<F>,
    permanent: bool,
    tag: Option<u32>,
}

/// Variable store: interned formulas, assignments and the trail.
struct VarState<F: Formula> {
    /// A heuristic measurement of the activity of a variable.
    activity: VMap<f64>,
    /// Current assignment for each variable.
    ass: VMap<lbool>,
    /// Stores reason and level for each variable.
    vardata: VMap<VarData>,
    /// Amount to bump next variable with.
    var_inc: f64,
    var_decay: f64,

    /// Interning map from canonical formulas to variables.
    fmap: FnvHashMap<F, Var>,
    /// Formula denoted by each variable, indexed by variable id.
    formulas: Vec<F>,

    /// Assignment stack; stores all assignments made in the order they were made.
    trail: Vec<Atom>,
    /// Separator indices for different decision levels in `trail`.
    trail_lim: Vec<usize>,
}

/// Level-scoped mutations to run backwards on backtracking.
#[derive(Debug, Clone, Copy)]
enum Undo {
    /// Mark the clause dead when its level is popped.
    KillClause(CRef),
    /// Detach the clause and install it again once unwinding is done; the
    /// re-add re-registers itself until the solver lands at level 0.
    ReaddClause(CRef),
    /// Hand the token back to the theory.
    TheoryHook(u64),
}

#[derive(Debug, Default)]
struct UndoStack {
    actions: Vec<Undo>,
    /// Frame boundaries, parallel to `trail_lim`.
    lim: Vec<usize>,
}

/// Clauses pushed by the theory during a callback, drained afterwards.
struct TheoryState<B> {
    queued: Vec<QueuedClause<B>>,
}

struct QueuedClause<B> {
    atoms: Vec<Atom>,
    lemma: B,
    permanent: bool,
}

impl<B> TheoryState<B> {
    fn new() -> Self {
        TheoryState { queued: vec![] }
    }
    fn clear(&mut self) {
        self.queued.clear();
    }
}

struct SolverV<F: Formula, B> {
    vars: VarState<F>,

    /// Hypotheses and theory clauses.
    clauses: Vec<CRef>,
    /// Clauses learnt by conflict analysis.
    learnts: Vec<CRef>,

    /// `watches[a]` is the list of clauses watching `a` (they go there when
    /// `a` becomes true).
    watches_data: OccListsData<Atom, Watcher>,
    /// A priority queue of variables ordered with respect to the variable activity.
    order_heap_data: HeapData<Var>,
    ca: ClauseAllocator<B>,

    /// If `false`, the clause set is unsatisfiable at level 0.
    ok: bool,
    /// The falsified clause that ended the last unsatisfiable solve.
    unsat_conflict: Option<CRef>,
    /// Conflicts discovered while re-adding clauses during backtracking.
    /// Several re-added clauses can be falsified by the same landing state,
    /// so all of them are kept; entries are validated when drained.
    pending_conflicts: Vec<CRef>,

    /// Amount to bump next clause with.
    cla_inc: f64,
    clause_decay: f64,

    /// Head of the propagation queue (index into the trail).
    qhead: usize,
    /// First trail entry the theory has not seen yet; `th_head <= qhead`.
    th_head: usize,
    /// Level local hypotheses live at; 0 when there are none.
    base_level: u32,

    /// Single-slot decision override, set by theories to steer the search.
    next_decision: Option<Atom>,

    undo: UndoStack,
    th_st: TheoryState<B>,

    // analysis temporaries
    seen: VMap<Seen>,
    analyze_toclear: Vec<Atom>,

    /// The preferred polarity of each variable.
    polarity: VMap<bool>,
    /// The user's preferred polarity of each variable.
    user_pol: VMap<lbool>,
    phase_saving: i32,

    /// Memoized unit-resolution proofs for level-0 atoms.
    unit_proofs: VMap<CRef>,

    // statistics
    solves: u64,
    starts: u64,
    decisions: u64,
    propagations: u64,
    conflicts: u64,
}

/// Learnt clause produced by `analyze`.
struct LearntClause {
    /// Atoms sorted by decreasing level; the asserting atom comes first.
    atoms: Vec<Atom>,
    backtrack_lvl: i32,
    /// Whether the first atom is a unique implication point at its level.
    is_uip: bool,
    /// Conflict clause followed by every resolvent, in resolution order.
    history: Vec<CRef>,
}

/// Result of handing the trail to the theory.
enum TheoryCallRes {
    /// Nothing new: the theory accepts the partial model.
    Done,
    /// The theory propagated atoms or pushed lemmas.
    Progress,
    /// The theory refuted the partial model with this falsified clause.
    Conflict(CRef),
}

enum SearchResult {
    Sat,
    Unsat,
    Restart,
}

// public API
impl<F: Formula, B: Clone + fmt::Debug, Cb: Callbacks> SolverInterface<F> for Solver<F, B, Cb> {
    type Lemma = B;

    fn assume(&mut self, clauses: Vec<Vec<F>>, permanent: bool, tag: Option<u32>) {
        for formulas in clauses {
            self.pending.push(PendingClause {
                formulas,
                permanent,
                tag,
            });
        }
    }

    fn solve_with<Th: Theory<F, Lemma = B>>(&mut self, th: &mut Th, assumptions: &[F]) -> Status {
        self.solve_internal(th, assumptions)
    }

    fn eval(&self, f: &F) -> Result<bool, UndecidedLit> {
        let (repr, negated) = f.norm();
        let var = match self.v.vars.fmap.get(&repr) {
            Some(&v) => v,
            None => return Err(UndecidedLit),
        };
        let val = self.v.vars.value(var);
        if val == lbool::UNDEF {
            return Err(UndecidedLit);
        }
        Ok((val == lbool::TRUE) ^ negated)
    }

    fn trail(&self) -> &[Atom] {
        &self.v.vars.trail
    }

    fn check_model(&self) -> Result<(), Vec<Atom>> {
        for &cr in self.v.clauses.iter().chain(self.v.learnts.iter()) {
            let c = self.v.ca.get_ref(cr);
            if c.dead() {
                continue;
            }
            if !c.iter().any(|&a| self.v.vars.value_atom(a) == lbool::TRUE) {
                return Err(c.atoms().to_vec());
            }
        }
        Ok(())
    }

    fn unsat_conflict(&self) -> Option<CRef> {
        self.v.unsat_conflict
    }

    fn is_ok(&self) -> bool {
        self.v.ok
    }

    fn num_vars(&self) -> u32 {
        self.v.num_vars()
    }
    fn num_clauses(&self) -> usize {
        self.v.clauses.len()
    }
    fn num_learnts(&self) -> usize {
        self.v.learnts.len()
    }
    fn num_conflicts(&self) -> u64 {
        self.v.conflicts
    }
    fn num_decisions(&self) -> u64 {
        self.v.decisions
    }
    fn num_propagations(&self) -> u64 {
        self.v.propagations
    }
    fn num_restarts(&self) -> u64 {
        self.v.starts
    }
}

impl<F: Formula, Cb: Callbacks> Solver<F, (), Cb> {
    /// Solve without a theory.
    pub fn solve(&mut self, assumptions: &[F]) -> Status {
        let mut th = crate::theory::EmptyTheory::new();
        self.solve_with(&mut th, assumptions)
    }
}

impl<F: Formula, B: Clone + fmt::Debug, Cb: Callbacks + Default> Default for Solver<F, B, Cb> {
    fn default() -> Self {
        Solver::new(SolverOpts::default(), Cb::default())
    }
}

// proof accessors
impl<F: Formula, B: Clone + fmt::Debug, Cb: Callbacks> Solver<F, B, Cb> {
    /// Build the proof of the empty clause after an Unsat answer: the final
    /// conflict resolved against the unit proofs of its atoms.
    ///
    /// Must be called before the next solve, while the refuting trail is
    /// still in place.
    pub fn proof(&mut self) -> Option<CRef> {
        let confl = self.v.unsat_conflict?;
        let atoms = self.v.ca.get_ref(confl).atoms().to_vec();
        if atoms.is_empty() {
            return Some(confl);
        }
        let mut history = vec![confl];
        for q in atoms {
            history.push(self.v.unit_proof(q));
        }
        Some(self.v.ca.make(&[], Premise::History(history), None))
    }

    /// Expand one proof node into its derivation step.
    pub fn expand(&mut self, c: CRef) -> Step {
        self.v.ca.expand(c)
    }

    /// Validate every resolution of the proof rooted at `root`.
    pub fn check_proof(&mut self, root: CRef) -> Result<(), ProofError> {
        self.v.ca.check(root)
    }

    /// Hypothesis and theory-lemma clauses the proof depends on.
    pub fn unsat_core(&mut self, root: CRef) -> Vec<CRef> {
        self.v.ca.unsat_core(root)
    }

    pub fn clause_atoms(&self, c: CRef) -> &[Atom] {
        self.v.ca.get_ref(c).atoms()
    }

    pub fn clause_name(&self, c: CRef) -> String {
        format!("{}", self.v.ca.name(c))
    }

    pub fn clause_tag(&self, c: CRef) -> Option<u32> {
        self.v.ca.tag(c)
    }

    /// Formula denoted by this variable.
    pub fn formula(&self, v: Var) -> &F {
        &self.v.vars.formulas[v.idx() as usize]
    }

    /// Decision level of an assigned atom, `-1` when unassigned.
    pub fn atom_level(&self, a: Atom) -> i32 {
        self.v.vars.level(a.var())
    }

    /// Force the polarity used when deciding this formula's variable;
    /// `lbool::UNDEF` clears the preference.
    pub fn set_user_polarity(&mut self, f: &F, pol: lbool) {
        let (repr, negated) = f.norm();
        let (var, _) = self.v.intern(repr);
        self.v.user_pol[var] = pol ^ negated;
    }
}

// main algorithm
impl<F: Formula, B: Clone + fmt::Debug, Cb: Callbacks> Solver<F, B, Cb> {
    /// Create a new solver with the given options and callbacks.
    pub fn new(opts: SolverOpts, cb: Cb) -> Self {
        Self::with_size_hint(opts, cb, 1024)
    }

    /// Create a new solver, reserving room for roughly `size_hint` clauses.
    pub fn with_size_hint(opts: SolverOpts, cb: Cb, size_hint: usize) -> Self {
        assert!(opts.check(), "invalid solver options");
        Self {
            cb,
            pending: vec![],
            max_learnts: 0.0,
            luby_restart: opts.luby_restart,
            restart_first: opts.restart_first,
            restart_inc: opts.restart_inc,
            learntsize_factor: opts.learntsize_factor,
            learntsize_inc: opts.learntsize_inc,
            v: SolverV::new(&opts, size_hint),
        }
    }

    /// Temporary access to the callbacks
    pub fn cb_mut(&mut self) -> &mut Cb {
        &mut self.cb
    }

    /// Temporary access to the callbacks
    pub fn cb(&self) -> &Cb {
        &self.cb
    }

    /// Intern a formula, notifying the theory when a new variable appears.
    fn make_atom_th<Th: Theory<F, Lemma = B>>(&mut self, th: &mut Th, f: &F) -> Atom {
        let (repr, negated) = f.norm();
        let (var, created) = self.v.intern(repr);
        if created {
            th.add_formula(&self.v.vars.formulas[var.idx() as usize], var.pos_atom());
        }
        Atom::new(var, !negated)
    }

    fn report_unsat(&mut self, confl: CRef) {
        debug!("unsat, conflict clause {:?}", self.v.ca.get_ref(confl).atoms());
        self.v.unsat_conflict = Some(confl);
        if self.v.base_level == 0 {
            self.v.ok = false;
        }
    }

    /// Main solve method.
    fn solve_internal<Th: Theory<F, Lemma = B>>(
        &mut self,
        th: &mut Th,
        assumptions: &[F],
    ) -> Status {
        self.v.solves += 1;
        self.cancel_until(th, 0);
        self.v.base_level = 0;
        if !self.v.ok {
            return Status::Unsat;
        }
        self.v.unsat_conflict = None;
        self.v.next_decision = None;
        info!("solve.start");
        self.cb.on_start();

        // ingest queued user clauses; locals wait for their own level
        let pending = mem::take(&mut self.pending);
        let mut locals = vec![];
        for pc in pending {
            if !pc.permanent {
                locals.push(pc);
                continue;
            }
            let atoms: Vec<Atom> = pc.formulas.iter().map(|f| self.make_atom_th(th, f)).collect();
            match self.add_clause_internal(atoms, Premise::Hypothesis, pc.tag, Kind::Hypothesis) {
                Err(cr) => {
                    self.report_unsat(cr);
                    self.cb.on_result(Status::Unsat);
                    return Status::Unsat;
                }
                Ok(Some(cr)) => self.v.clauses.push(cr),
                Ok(None) => {}
            }
        }

        // local hypotheses are introduced at a dedicated decision level so
        // the next solve pops them together with everything they implied
        if !assumptions.is_empty() || !locals.is_empty() {
            self.v.new_decision_level();
        }
        self.v.base_level = self.v.vars.decision_level();

        for f in assumptions {
            let a = self.make_atom_th(th, f);
            let value = self.v.vars.value_atom(a);
            if value == lbool::TRUE {
                continue;
            }
            let cr = self.v.ca.make(&[a], Premise::Assumption, None);
            self.v.undo.actions.push(Undo::KillClause(cr));
            if value == lbool::FALSE {
                debug!("assumption {:?} already refuted", a);
                self.report_unsat(cr);
                self.cb.on_result(Status::Unsat);
                return Status::Unsat;
            }
            self.v.vars.unchecked_enqueue(a, Reason::Local(cr));
        }

        for pc in locals {
            let atoms: Vec<Atom> = pc.formulas.iter().map(|f| self.make_atom_th(th, f)).collect();
            match self.add_clause_internal(atoms, Premise::Hypothesis, pc.tag, Kind::Hypothesis) {
                Err(cr) => {
                    self.report_unsat(cr);
                    self.cb.on_result(Status::Unsat);
                    return Status::Unsat;
                }
                Ok(Some(cr)) => {
                    self.v.clauses.push(cr);
                    self.v.undo.actions.push(Undo::KillClause(cr));
                }
                Ok(None) => {}
            }
        }

        self.max_learnts = self.v.clauses.len() as f64 * self.learntsize_factor;

        // search, widening the conflict budget on every restart
        let mut curr_restarts = 0;
        let status = loop {
            let rest_base = if self.luby_restart {
                utils::luby(self.restart_inc, curr_restarts)
            } else {
                f64::powi(self.restart_inc, curr_restarts)
            };
            let nof_conflicts = (rest_base * self.restart_first as f64) as i32;
            match self.search(th, nof_conflicts) {
                SearchResult::Restart => {
                    info!("search.restart({})", curr_restarts);
                    curr_restarts += 1;
                    self.max_learnts *= self.learntsize_inc;
                    self.cb.on_restart();
                    let v = &self.v;
                    self.cb.on_progress(|| ProgressStatus {
                        restarts: v.starts,
                        conflicts: v.conflicts,
                        decisions: v.decisions,
                        propagations: v.propagations,
                        n_clauses: v.clauses.len(),
                        n_learnts: v.learnts.len(),
                    });
                }
                SearchResult::Sat => break Status::Sat,
                SearchResult::Unsat => break Status::Unsat,
            }
        };

        // the trail is kept in place: it is the model on Sat, and the
        // refutation context for proof building on Unsat
        debug!("result: {:?}", status);
        self.cb.on_result(status);
        status
    }

    /// Search until a result or until the conflict budget runs out.
    fn search<Th: Theory<F, Lemma = B>>(&mut self, th: &mut Th, nof_conflicts: i32) -> SearchResult {
        debug_assert!(self.v.ok);
        let mut conflict_c = 0;
        self.v.starts += 1;

        loop {
            if let Some(confl) = self.propagate_fixpoint(th) {
                conflict_c += 1;
                if !self.handle_conflict(th, confl) {
                    return SearchResult::Unsat;
                }
                continue;
            }

            // propagation and theory fixpoint reached with no conflict
            if self.v.vars.trail.len() == self.v.num_vars() as usize {
                // full trail: the theory has the last word
                match self.call_theory(th, true) {
                    TheoryCallRes::Done => return SearchResult::Sat,
                    TheoryCallRes::Progress => continue,
                    TheoryCallRes::Conflict(confl) => {
                        conflict_c += 1;
                        if !self.handle_conflict(th, confl) {
                            return SearchResult::Unsat;
                        }
                        continue;
                    }
                }
            }

            if nof_conflicts >= 0 && conflict_c >= nof_conflicts {
                debug!("restart after {} conflicts", conflict_c);
                self.cancel_until(th, self.v.base_level);
                return SearchResult::Restart;
            }

            if self.v.learnts.len() as f64 - self.v.vars.trail.len() as f64 >= self.max_learnts {
                self.reduce_db();
            }

            let next = match self.v.next_decision.take() {
                Some(a) if self.v.vars.value_atom(a) == lbool::UNDEF => Some(a),
                _ => self.v.pick_branch_lit(),
            };
            match next {
                Some(a) => {
                    self.v.decisions += 1;
                    self.v.new_decision_level();
                    trace!("decide {:?}", a);
                    self.v.vars.unchecked_enqueue(a, Reason::Decision);
                }
                None => {
                    // heap exhausted: every variable is assigned
                    match self.call_theory(th, true) {
                        TheoryCallRes::Done => return SearchResult::Sat,
                        TheoryCallRes::Progress => continue,
                        TheoryCallRes::Conflict(confl) => {
                            conflict_c += 1;
                            if !self.handle_conflict(th, confl) {
                                return SearchResult::Unsat;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Run propagation and theory rounds until nothing moves or a clause is
    /// falsified.
    fn propagate_fixpoint<Th: Theory<F, Lemma = B>>(&mut self, th: &mut Th) -> Option<CRef> {
        loop {
            if let Some(confl) = self.v.propagate() {
                return Some(confl);
            }
            if self.v.th_head < self.v.vars.trail.len() {
                match self.call_theory(th, false) {
                    TheoryCallRes::Conflict(confl) => return Some(confl),
                    TheoryCallRes::Progress => continue,
                    TheoryCallRes::Done => return None,
                }
            } else {
                return None;
            }
        }
    }

    /// Present the unseen trail slice (or the full trail for a final check)
    /// to the theory and apply what it answered.
    fn call_theory<Th: Theory<F, Lemma = B>>(&mut self, th: &mut Th, final_check: bool) -> TheoryCallRes {
        let th_start = if final_check { 0 } else { self.v.th_head };
        let th_end = self.v.vars.trail.len();
        let (conflict, has_propagated) = {
            let mut acts = TheoryArg {
                v: &mut self.v,
                th_start,
                th_end,
                has_propagated: false,
                conflict: None,
            };
            if final_check {
                th.if_sat(&mut acts);
            } else {
                th.assume(&mut acts);
            }
            (acts.conflict, acts.has_propagated)
        };
        self.v.th_head = th_end;

        match conflict {
            Some(TheoryConflict::Prop(cr)) => {
                // propagation of an atom that is already false
                debug!("theory propagation conflicts with the trail");
                self.v.th_st.clear();
                return TheoryCallRes::Conflict(cr);
            }
            Some(TheoryConflict::Raised { causes, lemma }) => {
                self.v.th_st.clear();
                let mut atoms: Vec<Atom> = causes.iter().map(|&a| !a).collect();
                atoms.sort_unstable();
                atoms.dedup();
                debug_assert!(
                    atoms.iter().all(|&a| self.v.vars.value_atom(a) == lbool::FALSE),
                    "theory conflict must contradict the trail"
                );
                debug!("theory conflict {:?}", atoms);
                let cr = self.v.ca.make(&atoms, Premise::Lemma(lemma), None);
                self.cb.on_new_clause(self.v.ca.get_ref(cr).atoms(), Kind::Theory);
                return TheoryCallRes::Conflict(cr);
            }
            None => {}
        }

        // drain lemmas pushed during the callback
        let queued = mem::take(&mut self.v.th_st.queued);
        let progressed = has_propagated || !queued.is_empty();
        for qc in queued {
            let level = self.v.vars.decision_level();
            match self.add_clause_internal(qc.atoms, Premise::Lemma(qc.lemma), None, Kind::Theory) {
                Err(cr) => {
                    if qc.permanent {
                        self.v.clauses.push(cr);
                        if level > 0 {
                            self.v.undo.actions.push(Undo::ReaddClause(cr));
                        }
                    }
                    self.v.th_st.clear();
                    return TheoryCallRes::Conflict(cr);
                }
                Ok(Some(cr)) => {
                    self.v.clauses.push(cr);
                    if qc.permanent {
                        if level > 0 {
                            self.v.undo.actions.push(Undo::ReaddClause(cr));
                        }
                    } else if level > 0 {
                        self.v.undo.actions.push(Undo::KillClause(cr));
                    }
                }
                Ok(None) => {}
            }
        }

        if progressed {
            TheoryCallRes::Progress
        } else {
            TheoryCallRes::Done
        }
    }

    /// Analyze a falsified clause, learn, backtrack and assert the learnt
    /// clause. Returns `false` when the conflict refutes the clause set at
    /// the base level.
    fn handle_conflict<Th: Theory<F, Lemma = B>>(&mut self, th: &mut Th, confl: CRef) -> bool {
        self.v.conflicts += 1;
        self.v.next_decision = None;

        let c_level = self.v.clause_level(confl);
        if c_level <= self.v.base_level as i32 {
            self.report_unsat(confl);
            return false;
        }
        // theory conflicts can sit below the current decision level
        self.cancel_until(th, c_level as u32);

        let learnt = self.v.analyze(confl);
        debug!(
            "learnt {:?} (backtrack to {})",
            &learnt.atoms, learnt.backtrack_lvl
        );
        self.add_learnt_and_backtrack(th, learnt);

        self.v.vars.var_decay_activity();
        self.v.cla_decay_activity();
        true
    }

    /// Add a learnt clause and backtrack so it asserts its first atom.
    fn add_learnt_and_backtrack<Th: Theory<F, Lemma = B>>(&mut self, th: &mut Th, learnt: LearntClause) {
        debug_assert!(!learnt.atoms.is_empty());
        debug_assert!(learnt.is_uip || learnt.atoms.len() >= 2);
        self.cb.on_new_clause(&learnt.atoms, Kind::Learnt);

        let bt = cmp::max(learnt.backtrack_lvl, self.v.base_level as i32);
        self.cancel_until(th, bt as u32);

        let cr = self.v.ca.make(&learnt.atoms, Premise::History(learnt.history), None);
        self.v.learnts.push(cr);
        if learnt.atoms.len() >= 2 {
            self.v.attach_clause(cr);
            self.v.cla_bump_activity(cr);
        }
        // a clause re-added while unwinding may have assigned the asserting
        // atom already, in either polarity
        let a0 = learnt.atoms[0];
        let v0 = self.v.vars.value_atom(a0);
        if v0 == lbool::UNDEF {
            self.v.vars.unchecked_enqueue(a0, Reason::Propagated(cr));
        } else if v0 == lbool::FALSE && !self.v.pending_conflicts.contains(&cr) {
            self.v.pending_conflicts.push(cr);
        }
    }

    /// Learnt clauses are never evicted: proof parents must stay alive while
    /// the clauses derived from them are. The learnt set only grows.
    fn reduce_db(&mut self) {
        debug!("learnt cap reached ({} learnts), nothing evicted", self.v.learnts.len());
    }

    /// Add a clause to the store: drop tautologies, record duplicate removal
    /// as a `Simplified` derivation, pick the watches, attach and propagate.
    ///
    /// `Err` carries the clause when it is falsified under the current
    /// trail. `Ok(None)` means the clause was a tautology and was dropped.
    /// Listing the clause (and its permanence bookkeeping) is left to the
    /// caller.
    fn add_clause_internal(
        &mut self,
        atoms: Vec<Atom>,
        premise: Premise<B>,
        tag: Option<u32>,
        kind: Kind,
    ) -> Result<Option<CRef>, CRef> {
        let mut sorted = atoms.clone();
        sorted.sort_unstable();
        for w in sorted.windows(2) {
            if w[1] == !w[0] {
                debug!("drop tautological clause {:?}", atoms);
                return Ok(None);
            }
        }
        sorted.dedup();

        let cr = if sorted.len() != atoms.len() {
            let parent = self.v.ca.make(&atoms, premise, tag);
            self.v.ca.make(&sorted, Premise::Simplified(parent), None)
        } else {
            self.v.ca.make(&atoms, premise, tag)
        };
        self.cb.on_new_clause(self.v.ca.get_ref(cr).atoms(), kind);

        let n = self.v.ca.get_ref(cr).size() as usize;
        if n == 0 {
            return Err(cr);
        }
        {
            let mut tmp = self.v.ca.get_ref(cr).atoms().to_vec();
            self.v.sort_clause_atoms(&mut tmp);
            self.v.ca.get_mut(cr).atoms_mut().copy_from_slice(&tmp);
        }

        let c0 = self.v.ca.get_ref(cr)[0];
        let v0 = self.v.vars.value_atom(c0);
        if n == 1 {
            if v0 == lbool::FALSE {
                return Err(cr);
            }
            if v0 == lbool::UNDEF {
                self.v.vars.unchecked_enqueue(c0, Reason::Propagated(cr));
            }
            return Ok(Some(cr));
        }

        if v0 == lbool::FALSE {
            // watch order puts watchable atoms first: everything is false
            return Err(cr);
        }
        self.v.attach_clause(cr);
        let c1 = self.v.ca.get_ref(cr)[1];
        if v0 == lbool::UNDEF && self.v.vars.value_atom(c1) == lbool::FALSE {
            self.v.vars.unchecked_enqueue(c0, Reason::Propagated(cr));
        }
        Ok(Some(cr))
    }

    /// Revert to the state at the given level (keeping all assignments at
    /// `level` but not beyond).
    fn cancel_until<Th: Theory<F, Lemma = B>>(&mut self, th: &mut Th, level: u32) {
        self.v.cancel_until(th, level);
    }
}

impl<F: Formula, B: Clone + fmt::Debug> SolverV<F, B> {
    fn new(opts: &SolverOpts, size_hint: usize) -> Self {
        Self {
            vars: VarState::new(opts),
            clauses: vec![],
            learnts: vec![],
            watches_data: OccListsData::new(),
            order_heap_data: HeapData::new(),
            ca: ClauseAllocator::with_start_cap(size_hint),
            ok: true,
            unsat_conflict: None,
            pending_conflicts: vec![],
            cla_inc: 1.0,
            clause_decay: opts.clause_decay,
            qhead: 0,
            th_head: 0,
            base_level: 0,
            next_decision: None,
            undo: UndoStack::default(),
            th_st: TheoryState::new(),
            seen: VMap::new(),
            analyze_toclear: vec![],
            polarity: VMap::new(),
            user_pol: VMap::new(),
            phase_saving: opts.phase_saving,
            unit_proofs: VMap::new(),
            solves: 0,
            starts: 0,
            decisions: 0,
            propagations: 0,
            conflicts: 0,
        }
    }

    #[inline(always)]
    fn num_vars(&self) -> u32 {
        self.vars.formulas.len() as u32
    }

    /// Intern a canonical formula, creating its variable on first mention.
    fn intern(&mut self, f: F) -> (Var, bool) {
        if let Some(&v) = self.vars.fmap.get(&f) {
            return (v, false);
        }
        let v = Var::from_idx(self.vars.formulas.len() as u32);
        self.vars.fmap.insert(f.clone(), v);
        self.vars.formulas.push(f);
        self.vars.ass.insert_default(v, lbool::UNDEF);
        self.vars.vardata.insert_default(v, VarData::default());
        self.vars.activity.insert_default(v, 0.0);
        self.seen.insert_default(v, Seen::UNDEF);
        self.polarity.insert_default(v, false);
        self.user_pol.insert_default(v, lbool::UNDEF);
        self.unit_proofs.insert(v, CRef::UNDEF, CRef::UNDEF);
        self.watches_data.init(v.pos_atom());
        self.watches_data.init(v.neg_atom());
        self.insert_var_order(v);
        trace!("new variable {:?}", v);
        (v, true)
    }

    fn order_heap(&mut self) -> Heap<Var, VarOrder> {
        self.order_heap_data.promote(VarOrder {
            activity: &self.vars.activity,
        })
    }

    fn insert_var_order(&mut self, x: Var) {
        if !self.order_heap_data.in_heap(x) {
            self.order_heap().insert(x);
        }
    }

    fn new_decision_level(&mut self) {
        trace!("new decision level {}", 1 + self.vars.decision_level());
        self.vars.new_decision_level();
        self.undo.lim.push(self.undo.actions.len());
    }

    fn cla_decay_activity(&mut self) {
        self.cla_inc *= 1.0 / self.clause_decay;
    }

    fn cla_bump_activity(&mut self, cr: CRef) {
        let new_activity = {
            let mut c = self.ca.get_mut(cr);
            let r = c.activity() + self.cla_inc as f32;
            c.set_activity(r);
            r
        };
        if new_activity > 1e20 {
            // Rescale:
            for i in 0..self.learnts.len() {
                let l = self.learnts[i];
                let mut c = self.ca.get_mut(l);
                let r = c.activity() * 1e-20;
                c.set_activity(r);
            }
            self.cla_inc *= 1e-20;
        }
    }

    /// Pick the unassigned variable with the highest activity, with its
    /// preferred polarity.
    fn pick_branch_lit(&mut self) -> Option<Atom> {
        let mut next = Var::UNDEF;
        while next == Var::UNDEF || self.vars.value(next) != lbool::UNDEF {
            let mut heap = self.order_heap();
            if heap.is_empty() {
                return None;
            }
            next = heap.remove_min();
        }
        let pol = if self.user_pol[next] != lbool::UNDEF {
            self.user_pol[next] == lbool::TRUE
        } else {
            self.polarity[next]
        };
        Some(Atom::new(next, pol))
    }

    /// Maximum decision level among the atoms of the clause.
    fn clause_level(&self, cr: CRef) -> i32 {
        self.ca
            .get_ref(cr)
            .iter()
            .map(|&a| {
                debug_assert_ne!(self.vars.value_atom(a), lbool::UNDEF);
                self.vars.level(a.var())
            })
            .max()
            .unwrap_or(0)
    }

    /// Attach a clause to watcher lists
    fn attach_clause(&mut self, cr: CRef) {
        let (c0, c1) = {
            let c = self.ca.get_ref(cr);
            debug_assert!(c.size() > 1);
            debug_assert!(!c.attached() && !c.dead());
            (c[0], c[1])
        };
        self.ca.get_mut(cr).set_attached(true);
        self.watches_data[!c0].push(Watcher::new(cr, c1));
        self.watches_data[!c1].push(Watcher::new(cr, c0));
    }

    /// Remove the clause from its two watch lists eagerly.
    fn detach_clause(&mut self, cr: CRef) {
        let (attached, c0, c1) = {
            let c = self.ca.get_ref(cr);
            (c.attached(), c[0], c[1])
        };
        if !attached {
            return;
        }
        let pos = self.watches_data[!c0]
            .iter()
            .position(|w| w.cref == cr)
            .expect("watcher not found");
        self.watches_data[!c0].remove(pos);
        let pos = self.watches_data[!c1]
            .iter()
            .position(|w| w.cref == cr)
            .expect("watcher not found");
        self.watches_data[!c1].remove(pos);
        self.ca.get_mut(cr).set_attached(false);
    }

    /// Flag the clause dead; its watch lists are cleaned in passing by BCP.
    fn kill_clause(&mut self, cr: CRef) {
        trace!("kill clause {:?}", cr);
        let (attached, c0, c1) = {
            let c = self.ca.get_ref(cr);
            if c.size() >= 2 {
                (c.attached(), c[0], c[1])
            } else {
                (false, Atom::UNDEF, Atom::UNDEF)
            }
        };
        self.ca.mark_dead(cr);
        if attached {
            self.ca.get_mut(cr).set_attached(false);
            self.watches_data.smudge(!c0);
            self.watches_data.smudge(!c1);
        }
    }

    /// Install a permanent clause again after backtracking moved the trail
    /// under it: re-pick the watches, re-propagate if it became unit, and
    /// keep a redo scheduled until the solver lands at level 0.
    fn readd_clause(&mut self, cr: CRef) {
        debug_assert!(!self.ca.get_ref(cr).dead());
        let mut atoms = self.ca.get_ref(cr).atoms().to_vec();
        self.sort_clause_atoms(&mut atoms);
        self.ca.get_mut(cr).atoms_mut().copy_from_slice(&atoms);

        let a0 = atoms[0];
        let v0 = self.vars.value_atom(a0);
        if atoms.len() >= 2 {
            self.attach_clause(cr);
            if v0 == lbool::UNDEF && self.vars.value_atom(atoms[1]) == lbool::FALSE {
                self.vars.unchecked_enqueue(a0, Reason::Propagated(cr));
            }
        } else if v0 == lbool::UNDEF {
            self.vars.unchecked_enqueue(a0, Reason::Propagated(cr));
        }
        if v0 == lbool::FALSE && !self.pending_conflicts.contains(&cr) {
            self.pending_conflicts.push(cr);
        }
        if self.vars.decision_level() > 0 {
            self.undo.actions.push(Undo::ReaddClause(cr));
        }
    }

    /// Sort atoms so the two watch positions are the most useful ones:
    /// unassigned first, then satisfied, then falsified by decreasing level.
    fn sort_clause_atoms(&self, atoms: &mut [Atom]) {
        let vars = &self.vars;
        atoms.sort_unstable_by(|&a, &b| {
            let rank = |x: Atom| {
                let val = vars.value_atom(x);
                if val == lbool::UNDEF {
                    (0, 0)
                } else if val == lbool::TRUE {
                    (1, -vars.level(x.var()))
                } else {
                    (2, -vars.level(x.var()))
                }
            };
            rank(a).cmp(&rank(b)).then(a.cmp(&b))
        });
    }

    /// Revert to the state at given level: unassign the trail above it, run
    /// the undo frames in reverse push order, then run the scheduled
    /// re-adds.
    fn cancel_until<Th: Theory<F, Lemma = B>>(&mut self, th: &mut Th, level: u32) {
        if self.vars.decision_level() <= level {
            return;
        }
        trace!("cancel until {}", level);
        let trail_lim_last = *self.vars.trail_lim.last().expect("trail_lim is empty");
        let trail_lim_level = self.vars.trail_lim[level as usize];
        for c in (trail_lim_level..self.vars.trail.len()).rev() {
            let a = self.vars.trail[c];
            let x = a.var();
            self.vars.ass[x] = lbool::UNDEF;
            self.vars.vardata[x] = VarData::default();
            if self.phase_saving > 1 || (self.phase_saving == 1 && c > trail_lim_last) {
                self.polarity[x] = a.pos();
            }
            self.insert_var_order(x);
        }
        self.qhead = trail_lim_level;
        if self.th_head > trail_lim_level {
            self.th_head = trail_lim_level;
        }
        self.vars.trail.truncate(trail_lim_level);
        self.vars.trail_lim.truncate(level as usize);

        // undo frames, newest first
        let undo_mark = self.undo.lim[level as usize];
        let mut redo = vec![];
        while self.undo.actions.len() > undo_mark {
            match self.undo.actions.pop().unwrap() {
                Undo::KillClause(cr) => self.kill_clause(cr),
                Undo::ReaddClause(cr) => {
                    self.detach_clause(cr);
                    redo.push(cr);
                }
                Undo::TheoryHook(h) => th.undo(h),
            }
        }
        self.undo.lim.truncate(level as usize);
        self.th_st.clear();

        for cr in redo {
            self.readd_clause(cr);
        }
    }

    /// Propagates all enqueued facts.
    ///
    /// If a conflict arises, the conflicting clause is returned, otherwise
    /// `None`.
    ///
    /// # Post-conditions:
    ///
    /// - the propagation queue is empty, even if there was a conflict.
    fn propagate(&mut self) -> Option<CRef> {
        while let Some(cr) = self.pending_conflicts.pop() {
            // a backtrack in between may have released the clause
            let falsified = self
                .ca
                .get_ref(cr)
                .iter()
                .all(|&a| self.vars.value_atom(a) == lbool::FALSE);
            if falsified {
                self.qhead = self.vars.trail.len();
                return Some(cr);
            }
        }
        let mut confl = None;

        while self.qhead < self.vars.trail.len() {
            // `p` is the next enqueued fact to propagate.
            let p = self.vars.trail[self.qhead];
            self.qhead += 1;
            self.propagations += 1;

            let watches_data_ptr: *mut OccListsData<Atom, Watcher> = &mut self.watches_data;
            let ws = self
                .watches_data
                .lookup_mut_pred(p, &WatcherDeleted { ca: &self.ca });
            let mut i: usize = 0;
            let mut j: usize = 0;
            let end: usize = ws.len();
            'clauses: while i < end {
                // Try to avoid inspecting the clause:
                let blocker = ws[i].blocker;
                if self.vars.value_atom(blocker) == lbool::TRUE {
                    ws[j] = ws[i];
                    j += 1;
                    i += 1;
                    continue;
                }

                // Make sure the false atom is data[1]:
                let cr = ws[i].cref;
                let mut c = self.ca.get_mut(cr);
                let false_atom = !p;
                if c[0] == false_atom {
                    let tmp = c[1];
                    c[1] = false_atom;
                    c[0] = tmp;
                }
                debug_assert_eq!(c[1], false_atom);
                i += 1;

                // If 0th watch is true, then clause is already satisfied.
                let first = c[0];
                let w = Watcher::new(cr, first);
                if first != blocker && self.vars.value_atom(first) == lbool::TRUE {
                    ws[j] = w;
                    j += 1;
                    continue;
                }

                // Look for new watch:
                for k in 2..c.size() {
                    if self.vars.value_atom(c[k]) != lbool::FALSE {
                        let ck = c[k];
                        c[1] = ck;
                        c[k] = false_atom;

                        // safe because `!c[1] != p`, so watches are not aliased
                        debug_assert_ne!(!ck, p);
                        unsafe { &mut (&mut *watches_data_ptr)[!ck] }.push(w);
                        continue 'clauses;
                    }
                }

                // Did not find watch -- clause is unit under assignment:
                ws[j] = w;
                j += 1;
                if self.vars.value_atom(first) == lbool::FALSE {
                    confl = Some(cr);
                    self.qhead = self.vars.trail.len();
                    // Copy the remaining watches:
                    while i < end {
                        ws[j] = ws[i];
                        j += 1;
                        i += 1;
                    }
                } else {
                    self.vars.unchecked_enqueue(first, Reason::Propagated(cr));
                }
            }
            ws.truncate(j);
        }

        confl
    }

    /// Analyze a falsified clause and produce a learnt clause (first-UIP).
    ///
    /// # Pre-conditions:
    ///
    /// - the decision level equals the conflict level of `confl` and is
    ///   above the base level;
    /// - every atom of `confl` is false in the current trail.
    ///
    /// # Post-conditions:
    ///
    /// - the learnt atoms are sorted by decreasing level and the first one
    ///   asserts after backtracking to `backtrack_lvl`;
    /// - the history lists the conflict and every resolvent in resolution
    ///   order, closed under level-0 unit proofs;
    /// - all `seen` marks are cleared.
    fn analyze(&mut self, confl: CRef) -> LearntClause {
        let conflict_level = self.vars.decision_level() as i32;
        debug!("analyze {:?} at level {}", self.ca.get_ref(confl).atoms(), conflict_level);
        debug_assert!(conflict_level > self.base_level as i32);
        debug_assert_eq!(self.clause_level(confl), conflict_level);

        let mut learnt: Vec<Atom> = vec![Atom::UNDEF]; // leave room for the UIP
        let mut history = vec![confl];
        let mut lvl0: Vec<Atom> = vec![];
        let mut path_c = 0;
        #[allow(unused_assignments)]
        let mut p = Atom::UNDEF;
        let mut index = self.vars.trail.len();
        let mut cur = confl;
        let mut first_iter = true;

        loop {
            // clauses used as resolvents bump their activity
            if self.ca.is_derived(cur) {
                self.cla_bump_activity(cur);
            }
            let c = self.ca.get_ref(cur);
            // for a reason clause, skip the atom it propagated
            let lits = if first_iter { c.atoms() } else { &c.atoms()[1..] };
            trace!("analyze.resolve-with {:?} (path_c {})", lits, path_c);

            for &q in lits {
                let vq = q.var();
                let lvl = self.vars.level(vq);
                debug_assert!(lvl <= conflict_level);
                if self.seen[vq].is_seen() {
                    continue;
                }
                self.seen[vq] = Seen::SOURCE;
                self.analyze_toclear.push(q);
                if lvl == conflict_level {
                    self.vars.var_bump_activity(&mut self.order_heap_data, vq);
                    path_c += 1;
                } else if lvl > 0 {
                    self.vars.var_bump_activity(&mut self.order_heap_data, vq);
                    learnt.push(q);
                } else {
                    // resolved away at level 0; its unit proof joins the
                    // history once the walk is done
                    lvl0.push(q);
                }
            }

            // next marked atom down the trail
            while !self.seen[self.vars.trail[index - 1].var()].is_seen() {
                index -= 1;
            }
            p = self.vars.trail[index - 1];
            index -= 1;
            path_c -= 1;
            if path_c <= 0 {
                break; // p is the first UIP
            }
            let reason = match self.vars.reason(p.var()).clause() {
                Some(c) => c,
                None => panic!(
                    "analyze reached decision {:?} with {} unresolved paths",
                    p, path_c
                ),
            };
            history.push(reason);
            cur = reason;
            first_iter = false;
        }

        debug_assert_eq!(self.vars.value_atom(p), lbool::TRUE);
        learnt[0] = !p;

        for q in lvl0 {
            let u = self.unit_proof(q);
            history.push(u);
        }

        // decreasing level order; the spot after the asserting atom decides
        // the backtrack level
        {
            let vars = &self.vars;
            learnt[1..].sort_unstable_by(|&a, &b| {
                vars.level(b.var()).cmp(&vars.level(a.var())).then(a.cmp(&b))
            });
        }
        let (backtrack_lvl, is_uip) = if learnt.len() == 1 {
            (0, true)
        } else {
            let l0 = self.vars.level(learnt[0].var());
            let l1 = self.vars.level(learnt[1].var());
            if l1 == l0 {
                (cmp::max(l0 - 1, 0), false)
            } else {
                (l1, true)
            }
        };

        for i in 0..self.analyze_toclear.len() {
            let q = self.analyze_toclear[i];
            self.seen[q.var()] = Seen::UNDEF;
        }
        self.analyze_toclear.clear();
        debug_assert!(learnt.iter().all(|&a| self.vars.value_atom(a) == lbool::FALSE));

        LearntClause {
            atoms: learnt,
            backtrack_lvl,
            is_uip,
            history,
        }
    }

    /// Clause proving the unit `!q`, for an atom `q` false at or below the
    /// base level: its reason resolved against the unit proofs of the other
    /// reason atoms. Memoized for level-0 atoms, which never unassign.
    fn unit_proof(&mut self, q: Atom) -> CRef {
        let v = q.var();
        debug_assert_eq!(self.vars.value_atom(q), lbool::FALSE);
        let lvl = self.vars.level(v);
        if lvl == 0 && self.unit_proofs[v] != CRef::UNDEF {
            return self.unit_proofs[v];
        }
        let reason = match self.vars.reason(v).clause() {
            Some(c) => c,
            None => panic!("atom {:?} has no reason clause for its unit proof", q),
        };
        let r_atoms = self.ca.get_ref(reason).atoms().to_vec();
        debug_assert_eq!(r_atoms[0], !q);
        let res = if r_atoms.len() == 1 {
            reason
        } else {
            let mut history = vec![reason];
            for &s in &r_atoms[1..] {
                history.push(self.unit_proof(s));
            }
            self.ca.make(&[!q], Premise::History(history), None)
        };
        if lvl == 0 {
            self.unit_proofs[v] = res;
        }
        res
    }
}

/// Theory-triggered conflict.
enum TheoryConflict<B> {
    /// The theory refuted the partial model with these true atoms.
    Raised { causes: Vec<Atom>, lemma: B },
    /// The theory propagated an atom that is already false; the clause
    /// encoding the propagation is the conflict.
    Prop(CRef),
}

/// The actions a theory can perform, handed to every theory callback.
pub struct TheoryArg<'a, F: Formula, B> {
    v: &'a mut SolverV<F, B>,
    th_start: usize,
    th_end: usize,
    has_propagated: bool,
    conflict: Option<TheoryConflict<B>>,
}

impl<'a, F: Formula, B: Clone + fmt::Debug> TheoryArg<'a, F, B> {
    /// `false` once a conflict was raised in this callback.
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.conflict.is_none()
    }

    /// Current (possibly partial) model, in assignment order.
    #[inline(always)]
    pub fn model(&self) -> &[Atom] {
        &self.v.vars.trail
    }

    /// The trail slice this callback is asked about: atoms assigned since
    /// the last time the theory was consulted.
    #[inline(always)]
    pub fn new_assignments(&self) -> &[Atom] {
        &self.v.vars.trail[self.th_start..self.th_end]
    }

    /// Value of the variable in the current model.
    #[inline(always)]
    pub fn value(&self, v: Var) -> lbool {
        self.v.vars.value(v)
    }

    /// Value of the atom in the current model.
    #[inline(always)]
    pub fn value_atom(&self, a: Atom) -> lbool {
        self.v.vars.value_atom(a)
    }

    /// Formula denoted by this variable.
    #[inline(always)]
    pub fn formula(&self, v: Var) -> &F {
        &self.v.vars.formulas[v.idx() as usize]
    }

    /// Intern a formula from the theory side. No `add_formula` callback is
    /// issued: the theory already knows this formula.
    pub fn mk_atom(&mut self, f: F) -> Atom {
        let (repr, negated) = f.norm();
        let (var, _) = self.v.intern(repr);
        Atom::new(var, !negated)
    }

    /// Is the solver at decision level 0?
    pub fn at_level_0(&self) -> bool {
        self.v.vars.decision_level() == 0
    }

    /// Push a lemma valid for the current scope only; it is dropped when
    /// the current decision level is popped.
    pub fn push_local(&mut self, atoms: &[Atom], lemma: B) {
        if self.is_ok() {
            self.v.th_st.queued.push(QueuedClause {
                atoms: atoms.to_vec(),
                lemma,
                permanent: false,
            });
        }
    }

    /// Push a lemma valid forever.
    pub fn push_persistent(&mut self, atoms: &[Atom], lemma: B) {
        if self.is_ok() {
            self.v.th_st.queued.push(QueuedClause {
                atoms: atoms.to_vec(),
                lemma,
                permanent: true,
            });
        }
    }

    /// Assert that `causes` (true in the trail) imply `f`, encoded as the
    /// clause `{f, ¬c₁, …, ¬cₙ}`. If `f` is unassigned it is enqueued with
    /// that clause as reason; if it is already true this is a no-op; if it
    /// is false the clause becomes a conflict.
    ///
    /// Returns `false` on conflict; the theory should then return as early
    /// as reasonably possible.
    pub fn propagate(&mut self, f: F, causes: &[Atom], lemma: B) -> bool {
        if !self.is_ok() {
            return false;
        }
        debug_assert!(causes
            .iter()
            .all(|&c| self.v.vars.value_atom(c) == lbool::TRUE));
        let (repr, negated) = f.norm();
        let (var, _) = self.v.intern(repr);
        let a = Atom::new(var, !negated);
        if self.v.vars.value_atom(a) == lbool::TRUE {
            return true;
        }

        let mut atoms = Vec::with_capacity(1 + causes.len());
        atoms.push(a);
        atoms.extend(causes.iter().map(|&c| !c));
        {
            // watch the propagated atom and the latest cause
            let vars = &self.v.vars;
            atoms[1..].sort_unstable_by(|&x, &y| {
                vars.level(y.var()).cmp(&vars.level(x.var())).then(x.cmp(&y))
            });
        }
        let cr = self.v.ca.make(&atoms, Premise::Lemma(lemma), None);
        if self.v.vars.value_atom(a) == lbool::FALSE {
            trace!("theory propagation of {:?} is a conflict", a);
            self.conflict = Some(TheoryConflict::Prop(cr));
            return false;
        }
        if atoms.len() >= 2 {
            self.v.attach_clause(cr);
            if self.v.vars.decision_level() > 0 {
                self.v.undo.actions.push(Undo::ReaddClause(cr));
            }
        }
        self.v.clauses.push(cr);
        self.v.vars.unchecked_enqueue(a, Reason::Propagated(cr));
        self.has_propagated = true;
        true
    }

    /// Refute the current partial model: `causes` are atoms of the trail
    /// that cannot all hold according to the theory. The solver negates
    /// them into a conflict clause with the lemma as premise.
    pub fn raise_conflict(&mut self, causes: &[Atom], lemma: B) {
        if self.is_ok() {
            self.conflict = Some(TheoryConflict::Raised {
                causes: causes.to_vec(),
                lemma,
            });
        }
    }

    /// Register a scoped undo: `hook` is handed back to
    /// [`Theory::undo`] when the current decision level is popped.
    pub fn on_backtrack(&mut self, hook: u64) {
        if self.v.vars.decision_level() > 0 {
            self.v.undo.actions.push(Undo::TheoryHook(hook));
        }
    }

    /// Suggest the next decision; a single-slot override consumed by the
    /// next decision and cleared on conflict.
    pub fn set_next_decision(&mut self, a: Atom) {
        self.v.next_decision = Some(a);
    }
}

#[derive(Debug, Clone, Copy)]
struct VarData {
    reason: Reason,
    level: i32,
}

impl Default for VarData {
    fn default() -> Self {
        Self {
            reason: Reason::None,
            level: -1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Watcher {
    cref: CRef,
    blocker: Atom,
}

impl Watcher {
    fn new(cref: CRef, blocker: Atom) -> Self {
        Self { cref, blocker }
    }
}

impl PartialEq for Watcher {
    #[inline(always)]
    fn eq(&self, rhs: &Self) -> bool {
        self.cref == rhs.cref
    }
}
impl Eq for Watcher {}

struct VarOrder<'a> {
    activity: &'a VMap<f64>,
}

impl<'a> Comparator<Var> for VarOrder<'a> {
    fn cmp(&self, lhs: &Var, rhs: &Var) -> cmp::Ordering {
        PartialOrd::partial_cmp(&self.activity[*rhs], &self.activity[*lhs]).expect("NaN activity")
    }
}

/// Predicate to test whether a clause has been removed from some atom's watchlist
struct WatcherDeleted<'a, B> {
    ca: &'a ClauseAllocator<B>,
}

impl<'a, B> DeletePred<Watcher> for WatcherDeleted<'a, B> {
    #[inline]
    fn deleted(&self, w: &Watcher) -> bool {
        self.ca.get_ref(w.cref).dead()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Seen {
    UNDEF,
    SOURCE,
}

impl Default for Seen {
    #[inline]
    fn default() -> Self {
        Seen::UNDEF
    }
}

impl Seen {
    #[inline(always)]
    fn is_seen(&self) -> bool {
        *self != Seen::UNDEF
    }
}

impl<F: Formula> VarState<F> {
    fn new(opts: &SolverOpts) -> Self {
        Self {
            activity: VMap::new(),
            ass: VMap::new(),
            vardata: VMap::new(),
            var_inc: 1.0,
            var_decay: opts.var_decay,
            fmap: FnvHashMap::default(),
            formulas: vec![],
            trail: vec![],
            trail_lim: vec![],
        }
    }

    /// Begins a new decision level.
    fn new_decision_level(&mut self) {
        self.trail_lim.push(self.trail.len());
    }

    #[inline(always)]
    fn value(&self, x: Var) -> lbool {
        self.ass[x]
    }

    #[inline(always)]
    fn value_atom(&self, a: Atom) -> lbool {
        self.ass[a.var()] ^ !a.pos()
    }

    #[inline(always)]
    fn level(&self, x: Var) -> i32 {
        self.vardata[x].level
    }

    #[inline(always)]
    fn reason(&self, x: Var) -> Reason {
        self.vardata[x].reason
    }

    #[inline(always)]
    fn decision_level(&self) -> u32 {
        self.trail_lim.len() as u32
    }

    fn var_decay_activity(&mut self) {
        self.var_inc *= 1.0 / self.var_decay;
    }

    fn unchecked_enqueue(&mut self, a: Atom, reason: Reason) {
        debug_assert_eq!(
            self.value_atom(a),
            lbool::UNDEF,
            "atom {:?} enqueued twice",
            a
        );
        self.ass[a.var()] = lbool::new(a.pos());
        self.vardata[a.var()] = VarData {
            reason,
            level: self.decision_level() as i32,
        };
        self.trail.push(a);
    }

    /// Increase a variable with the current 'bump' value.
    fn var_bump_activity(&mut self, order_heap_data: &mut HeapData<Var>, v: Var) {
        self.activity[v] += self.var_inc;
        if self.activity[v] > 1e100 {
            // Rescale:
            for (_, x) in self.activity.iter_mut() {
                *x *= 1e-100;
            }
            self.var_inc *= 1e-100;
        }

        // Update order_heap with respect to new activity:
        let mut order_heap = order_heap_data.promote(VarOrder {
            activity: &self.activity,
        });
        if order_heap.in_heap(v) {
            order_heap.decrease(v);
        }
    }
}

mod utils {
    /// Finite subsequences of the Luby-sequence:
    ///
    /// > 0: 1
    /// > 1: 1 1 2
    /// > 2: 1 1 2 1 1 2 4
    /// > 3: 1 1 2 1 1 2 4 1 1 2 1 1 2 4 8
    /// ...
    pub(super) fn luby(y: f64, mut x: i32) -> f64 {
        // Find the finite subsequence that contains index 'x', and the
        // size of that subsequence:
        let mut size = 1;
        let mut seq = 0;
        while size < x + 1 {
            seq += 1;
            size = 2 * size + 1;
        }

        while size - 1 != x {
            size = (size - 1) >> 1;
            seq -= 1;
            x = x % size;
        }

        f64::powi(y, seq)
    }
}

pub struct SolverOpts {
    pub var_decay: f64,
    pub clause_decay: f64,
    /// The initial restart limit. (default 100)
    pub restart_first: i32,
    /// The factor with which the restart limit is multiplied in each restart. (default 1.5)
    pub restart_inc: f64,
    /// Use the Luby sequence over plain geometric growth of the budget.
    pub luby_restart: bool,
    /// The initial limit for learnt clauses is a factor of the original clauses. (default 1 / 3)
    pub learntsize_factor: f64,
    /// The limit for learnt clauses is multiplied with this factor each restart. (default 1.1)
    pub learntsize_inc: f64,
    /// Controls the level of phase saving (0=none, 1=limited, 2=full).
    pub phase_saving: i32,
}

impl Default for SolverOpts {
    fn default() -> SolverOpts {
        Self {
            var_decay: 0.95,
            clause_decay: 0.999,
            restart_first: 100,
            restart_inc: 1.5,
            luby_restart: false,
            learntsize_factor: 1.0 / 3.0,
            learntsize_inc: 1.1,
            phase_saving: 2,
        }
    }
}

impl SolverOpts {
    /// Check that options are valid.
    pub fn check(&self) -> bool {
        (0.0 < self.var_decay && self.var_decay < 1.0)
            && (0.0 < self.clause_decay && self.clause_decay < 1.0)
            && 1 <= self.restart_first
            && (1.0 < self.restart_inc && self.restart_inc < f64::INFINITY)
            && (0.0 < self.learntsize_factor)
            && (1.0 <= self.learntsize_inc)
            && (0 <= self.phase_saving && self.phase_saving <= 2)
    }
}

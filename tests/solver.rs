//! End-to-end scenarios for the boolean engine, driving the solver through
//! the public interface with DIMACS-style `i32` formulas.

use modsat::{
    BasicCallbacks, BasicSolver, SolverInterface, SolverOpts, Status, Step,
};

fn solver() -> BasicSolver {
    BasicSolver::new(SolverOpts::default(), BasicCallbacks::new())
}

fn solver_with(opts: SolverOpts) -> BasicSolver {
    BasicSolver::new(opts, BasicCallbacks::new())
}

fn add_permanent(s: &mut BasicSolver, clauses: &[&[i32]]) {
    s.assume(clauses.iter().map(|c| c.to_vec()).collect(), true, None);
}

#[test]
fn test_trivially_sat() {
    let mut s = solver();
    add_permanent(&mut s, &[&[1, 2], &[-1, 3]]);
    assert_eq!(s.solve(&[]), Status::Sat);
    assert_eq!(s.check_model(), Ok(()));
    // the model satisfies both clauses
    assert!(s.eval(&1).unwrap() || s.eval(&2).unwrap());
    assert!(!s.eval(&1).unwrap() || s.eval(&3).unwrap());
}

#[test]
fn test_forced_unit_chain() {
    let mut s = solver();
    add_permanent(&mut s, &[&[1], &[-1, 2], &[-2, 3], &[-3, 4]]);
    assert_eq!(s.solve(&[]), Status::Sat);
    for f in 1..=4 {
        assert_eq!(s.eval(&f), Ok(true));
    }
    // everything was forced: four atoms on the trail, all at level 0
    assert_eq!(s.trail().len(), 4);
    assert!(s.trail().iter().all(|&a| s.atom_level(a) == 0));
    assert_eq!(s.num_decisions(), 0);
    assert_eq!(s.check_model(), Ok(()));
}

#[test]
fn test_immediate_contradiction() {
    let mut s = solver();
    add_permanent(&mut s, &[&[1], &[-1]]);
    assert_eq!(s.solve(&[]), Status::Unsat);
    assert!(!s.is_ok());

    let root = s.proof().expect("unsat must have a proof");
    assert_eq!(s.check_proof(root), Ok(()));
    assert!(s.clause_atoms(root).is_empty());

    // a single resolution of the two hypotheses
    match s.expand(root) {
        Step::Resolution { left, right, .. } => {
            assert_eq!(s.expand(left), Step::Hypothesis);
            assert_eq!(s.expand(right), Step::Hypothesis);
        }
        step => panic!("expected a resolution, got {:?}", step),
    }
    let core = s.unsat_core(root);
    assert_eq!(core.len(), 2);

    // the solver stays refuted
    assert_eq!(s.solve(&[]), Status::Unsat);
}

#[test]
fn test_empty_clause_is_immediately_unsat() {
    let mut s = solver();
    s.assume(vec![vec![]], true, None);
    assert_eq!(s.solve(&[]), Status::Unsat);
    let root = s.proof().unwrap();
    assert_eq!(s.expand(root), Step::Hypothesis);
    assert_eq!(s.check_proof(root), Ok(()));
    assert_eq!(s.unsat_core(root), vec![root]);
}

#[test]
fn test_tautology_is_a_noop() {
    let mut s = solver();
    add_permanent(&mut s, &[&[1, -1]]);
    assert_eq!(s.solve(&[]), Status::Sat);
    assert_eq!(s.num_clauses(), 0);
}

#[test]
fn test_true_unit_enqueues_nothing() {
    let mut s = solver();
    add_permanent(&mut s, &[&[1]]);
    assert_eq!(s.solve(&[]), Status::Sat);
    let trail_len = s.trail().len();
    let props = s.num_propagations();
    // a unit whose atom is already true adds no propagation
    add_permanent(&mut s, &[&[1]]);
    assert_eq!(s.solve(&[]), Status::Sat);
    assert_eq!(s.trail().len(), trail_len);
    assert_eq!(s.num_propagations(), props);
}

#[test]
fn test_duplicate_atoms_are_merged() {
    let mut s = solver();
    add_permanent(&mut s, &[&[1, 1, 2], &[-1, -1]]);
    assert_eq!(s.solve(&[]), Status::Sat);
    assert_eq!(s.eval(&1), Ok(false));
    assert_eq!(s.check_model(), Ok(()));
}

/// 3 pigeons, 2 holes: every pigeon gets a hole, no hole gets two pigeons.
/// Variable `p(i, h)` is `2 * i + h - 2` for pigeon `i` in `1..=3` and hole
/// `h` in `1..=2`.
fn pigeonhole_3_2() -> Vec<Vec<i32>> {
    let p = |i: i32, h: i32| 2 * i + h - 2;
    let mut clauses = vec![];
    for i in 1..=3 {
        clauses.push(vec![p(i, 1), p(i, 2)]);
    }
    for h in 1..=2 {
        for i in 1..=3 {
            for j in (i + 1)..=3 {
                clauses.push(vec![-p(i, h), -p(j, h)]);
            }
        }
    }
    clauses
}

#[test]
fn test_pigeonhole_unsat_with_checked_proof() {
    let mut s = solver();
    let clauses = pigeonhole_3_2();
    let n_clauses = clauses.len() as u32;
    for (i, c) in clauses.into_iter().enumerate() {
        s.assume(vec![c], true, Some(i as u32));
    }
    assert_eq!(s.solve(&[]), Status::Unsat);
    assert!(s.num_learnts() >= 1);
    assert!(s.num_conflicts() >= 1);

    let root = s.proof().expect("unsat must have a proof");
    assert_eq!(s.check_proof(root), Ok(()));

    // the encoding is minimally unsatisfiable: the core is all 9 hypotheses
    let core = s.unsat_core(root);
    assert!(core
        .iter()
        .all(|&c| s.clause_name(c).starts_with('H')));
    let mut tags: Vec<u32> = core.iter().filter_map(|&c| s.clause_tag(c)).collect();
    tags.sort_unstable();
    assert_eq!(tags, (0..n_clauses).collect::<Vec<u32>>());
}

#[test]
fn test_assumption_toggling() {
    let mut s = solver();
    add_permanent(&mut s, &[&[-1, 2], &[-1, 3], &[-2, -3, 4]]);

    assert_eq!(s.solve(&[1, -4]), Status::Unsat);
    // unsat holds only under the assumptions
    assert!(s.is_ok());
    let root = s.proof().expect("unsat under assumptions has a proof");
    assert_eq!(s.check_proof(root), Ok(()));
    let core = s.unsat_core(root);
    assert!(!core.is_empty());
    assert!(core.iter().all(|&c| s.clause_name(c).starts_with('H')));

    // assumptions are cleared by the next solve
    assert_eq!(s.solve(&[]), Status::Sat);
    assert_eq!(s.check_model(), Ok(()));

    assert_eq!(s.solve(&[1]), Status::Sat);
    assert_eq!(s.eval(&2), Ok(true));
    assert_eq!(s.eval(&3), Ok(true));
    assert_eq!(s.eval(&4), Ok(true));
    assert_eq!(s.check_model(), Ok(()));
}

#[test]
fn test_contradictory_assumptions() {
    let mut s = solver();
    add_permanent(&mut s, &[&[1, 2]]);
    assert_eq!(s.solve(&[1, -1]), Status::Unsat);
    assert!(s.is_ok());
    assert_eq!(s.solve(&[]), Status::Sat);
}

#[test]
fn test_local_clauses_last_one_solve() {
    let mut s = solver();
    s.assume(vec![vec![1]], false, None);
    assert_eq!(s.solve(&[]), Status::Sat);
    assert_eq!(s.eval(&1), Ok(true));

    // the local unit is gone, so its negation is now satisfiable
    s.assume(vec![vec![-1]], false, None);
    assert_eq!(s.solve(&[]), Status::Sat);
    assert_eq!(s.eval(&1), Ok(false));
}

#[test]
fn test_user_polarity_steers_model() {
    let mut s = solver();
    add_permanent(&mut s, &[&[1, 2]]);
    s.set_user_polarity(&1, modsat::lbool::TRUE);
    assert_eq!(s.solve(&[]), Status::Sat);
    assert_eq!(s.eval(&1), Ok(true));

    // a polarity on the negated side maps onto the representative
    let mut s = solver();
    add_permanent(&mut s, &[&[1, 2]]);
    s.set_user_polarity(&-1, modsat::lbool::TRUE);
    assert_eq!(s.solve(&[]), Status::Sat);
    assert_eq!(s.eval(&1), Ok(false));
    assert_eq!(s.eval(&2), Ok(true));
}

#[test]
fn test_eval_unknown_formula() {
    let mut s = solver();
    add_permanent(&mut s, &[&[1, 2]]);
    assert_eq!(s.solve(&[]), Status::Sat);
    assert!(s.eval(&1).is_ok());
    assert!(s.eval(&99).is_err());
}

// deterministic multiply-and-floor generator
fn drand(seed: &mut f64) -> f64 {
    *seed *= 1389796.0;
    let q = (*seed / 2147483647.0) as i32;
    *seed -= q as f64 * 2147483647.0;
    *seed / 2147483647.0
}

fn gen_3sat(seed: &mut f64, n_vars: i32, n_clauses: usize) -> Vec<Vec<i32>> {
    (0..n_clauses)
        .map(|_| {
            let mut c: Vec<i32> = vec![];
            while c.len() < 3 {
                let v = ((drand(seed) * n_vars as f64) as i32 + 1).min(n_vars);
                if c.iter().any(|&l| l.abs() == v) {
                    continue;
                }
                let sign = if drand(seed) < 0.5 { -1 } else { 1 };
                c.push(v * sign);
            }
            c
        })
        .collect()
}

/// Plain DPLL with unit propagation, as an independent reference.
fn dpll(clauses: &[Vec<i32>], mut assign: Vec<i8>) -> bool {
    loop {
        let mut unit = None;
        let mut conflict = false;
        for c in clauses {
            let mut unassigned = 0;
            let mut last = 0;
            let mut sat = false;
            for &l in c {
                let s = assign[l.abs() as usize];
                if s == 0 {
                    unassigned += 1;
                    last = l;
                } else if (s > 0) == (l > 0) {
                    sat = true;
                    break;
                }
            }
            if sat {
                continue;
            }
            if unassigned == 0 {
                conflict = true;
                break;
            }
            if unassigned == 1 {
                unit = Some(last);
                break;
            }
        }
        if conflict {
            return false;
        }
        match unit {
            Some(l) => assign[l.abs() as usize] = if l > 0 { 1 } else { -1 },
            None => match (1..assign.len()).find(|&v| assign[v] == 0) {
                None => return true,
                Some(v) => {
                    let mut pos = assign.clone();
                    pos[v] = 1;
                    if dpll(clauses, pos) {
                        return true;
                    }
                    assign[v] = -1;
                }
            },
        }
    }
}

#[test]
fn test_random_3sat_agrees_with_reference() {
    let n_vars = 40;
    let n_clauses = 168; // ratio 4.2
    let mut seed = 91648253.0;
    for _ in 0..20 {
        let clauses = gen_3sat(&mut seed, n_vars, n_clauses);
        let expected = dpll(&clauses, vec![0i8; n_vars as usize + 1]);

        let mut opts = SolverOpts::default();
        opts.restart_first = 20; // tight budget, forces frequent restarts
        let mut s = solver_with(opts);
        add_permanent(&mut s, &clauses.iter().map(|c| &c[..]).collect::<Vec<_>>());
        let res = s.solve(&[]);
        assert_eq!(res == Status::Sat, expected);

        if res == Status::Sat {
            assert_eq!(s.check_model(), Ok(()));
        } else {
            let root = s.proof().expect("unsat must have a proof");
            assert_eq!(s.check_proof(root), Ok(()));
            assert!(!s.unsat_core(root).is_empty());
        }
    }
}

#[test]
fn test_restart_robustness_on_larger_instances() {
    let n_vars = 100;
    let n_clauses = 420; // ratio 4.2
    let mut seed = 123456789.0;
    for _ in 0..5 {
        let clauses = gen_3sat(&mut seed, n_vars, n_clauses);

        // tight restart budget, geometric growth
        let mut opts = SolverOpts::default();
        opts.restart_first = 20;
        let mut geo = solver_with(opts);
        add_permanent(&mut geo, &clauses.iter().map(|c| &c[..]).collect::<Vec<_>>());
        let res_geo = geo.solve(&[]);

        // same instance under Luby restarts must agree
        let mut opts = SolverOpts::default();
        opts.restart_first = 20;
        opts.luby_restart = true;
        opts.restart_inc = 2.0;
        let mut luby = solver_with(opts);
        add_permanent(&mut luby, &clauses.iter().map(|c| &c[..]).collect::<Vec<_>>());
        let res_luby = luby.solve(&[]);

        assert_eq!(res_geo, res_luby);
        match res_geo {
            Status::Sat => assert_eq!(geo.check_model(), Ok(())),
            Status::Unsat => {
                let root = geo.proof().unwrap();
                assert_eq!(geo.check_proof(root), Ok(()));
            }
        }
    }
}

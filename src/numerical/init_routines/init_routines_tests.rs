use crate::numerical::ODE_problem::ODEProblem;
use crate::numerical::init_routines::autodiff_routines::{ForwardMode, ForwardModeJVP, ReverseMode, TaylorMode};
use crate::numerical::init_routines::config::{RoutineKind, build_routine};
use crate::numerical::init_routines::init_error::InitError;
use crate::numerical::init_routines::interface::InitializationRoutine;
use crate::numerical::init_routines::non_probabilistic_fit::{
    FitSolver, NonProbabilisticFit, NonProbabilisticFitWithJacobian,
};
use crate::numerical::init_routines::stack::{Stack, StackWithJacobian};
use crate::numerical::prior_process::{PriorProcess, StateOrdering};
use crate::symbolic::symbolic_engine::Expr;
use approx::assert_relative_eq;
use nalgebra::{DMatrix, DVector};
use strum::IntoEnumIterator;

fn lotka_volterra() -> ODEProblem {
    ODEProblem::from_strings(
        &["1.5*x - x*y", "x*y - 3*y"],
        &["x", "y"],
        "t",
        0.0,
        DVector::from_vec(vec![1.2, 0.8]),
    )
    .unwrap()
}

fn forced() -> ODEProblem {
    ODEProblem::from_strings(
        &["sin(x)*exp(-t) + y", "-x*cos(t)"],
        &["x", "y"],
        "t",
        0.3,
        DVector::from_vec(vec![0.4, -0.7]),
    )
    .unwrap()
}

fn autodiff_routines() -> Vec<(Box<dyn InitializationRoutine>, usize)> {
    vec![
        (Box::new(ForwardMode), 5),
        (Box::new(ForwardModeJVP), 7),
        (Box::new(ReverseMode), 4),
        (Box::new(TaylorMode::new()), 6),
    ]
}

/// `y^(k)(t0)` for k = 0..=order by repeated symbolic differentiation,
/// `g_{k+1} = dg_k/dt + J_{g_k} f`.
fn symbolic_derivatives(
    equations: &[&str],
    values: &[&str],
    arg: &str,
    t0: f64,
    y0: &[f64],
    order: usize,
) -> Vec<Vec<f64>> {
    let f: Vec<Expr> = Expr::parse_vector_expression(equations.to_vec());
    let mut names: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    names.push(arg.to_string());
    let mut point = y0.to_vec();
    point.push(t0);
    let mut out = vec![y0.to_vec()];
    let mut g = f.clone();
    for _ in 0..order {
        out.push(
            g.iter()
                .map(|e| e.eval_generic(&names, &point).unwrap())
                .collect(),
        );
        g = g
            .iter()
            .map(|gi| {
                let mut next = gi.diff(arg);
                for (j, var) in values.iter().enumerate() {
                    next = next + gi.diff(var) * f[j].clone();
                }
                next.simplify_()
            })
            .collect();
    }
    out
}

#[test]
fn test_mean_length_for_every_routine() {
    let ivp = lotka_volterra();
    let prior = PriorProcess::new(3, 2);
    for kind in RoutineKind::iter() {
        let rv = build_routine(kind).initialize(&ivp, &prior).unwrap();
        assert_eq!(rv.mean.len(), prior.state_dimension(), "{}", kind);
        assert_eq!(rv.cov.dim(), prior.state_dimension(), "{}", kind);
        assert_relative_eq!(rv.mean[0], 1.2);
        assert_relative_eq!(rv.mean[1], 0.8);
    }
}

#[test]
fn test_stack_starts_with_initial_value_and_field() {
    let ivp = lotka_volterra();
    let prior = PriorProcess::new(4, 2);
    let f0 = ivp.f(0.0, ivp.y0());
    for routine in [
        Box::new(Stack::new()) as Box<dyn InitializationRoutine>,
        Box::new(StackWithJacobian::new()),
    ] {
        let rv = routine.initialize(&ivp, &prior).unwrap();
        assert_eq!(rv.mean.rows(0, 2), ivp.y0().rows(0, 2));
        assert_eq!(rv.mean.rows(2, 2), f0.rows(0, 2));
        assert!(rv.mean.rows(6, 4).iter().all(|v| *v == 0.0));
        assert!(rv.is_exact());
    }
}

#[test]
fn test_stack_with_jacobian_on_linear_system() {
    let a = DMatrix::from_row_slice(2, 2, &[-0.5, 2.0, -1.0, 0.1]);
    let y0 = DVector::from_vec(vec![1.0, 3.0]);
    let ivp = ODEProblem::from_strings(&["-0.5*u + 2*v", "-u + 0.1*v"], &["u", "v"], "t", 0.0, y0.clone()).unwrap();
    let rv = StackWithJacobian::new()
        .initialize(&ivp, &PriorProcess::new(2, 2))
        .unwrap();
    let expected = &a * (&a * &y0);
    assert_relative_eq!(rv.mean[4], expected[0], epsilon = 1e-12);
    assert_relative_eq!(rv.mean[5], expected[1], epsilon = 1e-12);
}

#[test]
fn test_autodiff_matches_symbolic_differentiation() {
    let ivp = lotka_volterra();
    for (routine, max) in autodiff_routines() {
        let prior = PriorProcess::new(max, 2);
        let rv = routine.initialize(&ivp, &prior).unwrap();
        let blocks = prior.state_to_derivatives(&rv.mean).unwrap();
        let expected = symbolic_derivatives(&["1.5*x - x*y", "x*y - 3*y"], &["x", "y"], "t", 0.0, &[1.2, 0.8], max);
        for k in 0..=max {
            for i in 0..2 {
                assert_relative_eq!(blocks[k][i], expected[k][i], epsilon = 1e-8, max_relative = 1e-10);
            }
        }
    }
}

#[test]
fn test_autodiff_on_non_autonomous_field() {
    let ivp = forced();
    let expected = symbolic_derivatives(
        &["sin(x)*exp(-t) + y", "-x*cos(t)"],
        &["x", "y"],
        "t",
        0.3,
        &[0.4, -0.7],
        4,
    );
    let prior = PriorProcess::new(4, 2);
    for (routine, _) in autodiff_routines() {
        let blocks = prior
            .state_to_derivatives(&routine.initialize(&ivp, &prior).unwrap().mean)
            .unwrap();
        for k in 0..=4 {
            for i in 0..2 {
                assert_relative_eq!(blocks[k][i], expected[k][i], epsilon = 1e-9, max_relative = 1e-9);
            }
        }
    }
}

#[test]
fn test_taylor_mode_agrees_with_nested_modes() {
    let ivp = forced();
    let prior = PriorProcess::new(4, 2);
    let reference = TaylorMode::new().initialize(&ivp, &prior).unwrap();
    for (routine, _) in autodiff_routines() {
        let rv = routine.initialize(&ivp, &prior).unwrap();
        for (a, b) in rv.mean.iter().zip(reference.mean.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-8);
        }
    }
}

#[test]
fn test_high_order_taylor_mode() {
    // y' = y^2, y(0) = 1 has y^(k)(0) = k!
    let ivp = ODEProblem::from_strings(&["y^2"], &["y"], "t", 0.0, DVector::from_vec(vec![1.0])).unwrap();
    let prior = PriorProcess::new(10, 1);
    let rv = TaylorMode::new().initialize(&ivp, &prior).unwrap();
    let mut factorial = 1.0;
    for k in 0..=10 {
        if k > 0 {
            factorial *= k as f64;
        }
        assert_relative_eq!(rv.mean[k], factorial, max_relative = 1e-12);
    }
}

#[test]
fn test_reverse_mode_ceiling() {
    let err = ReverseMode
        .initialize(&lotka_volterra(), &PriorProcess::new(5, 2))
        .unwrap_err();
    assert_eq!(
        err,
        InitError::UnsupportedOrder {
            routine: "ReverseMode",
            requested: 5,
            max: 4
        }
    );
    assert!(matches!(
        ForwardModeJVP.initialize(&lotka_volterra(), &PriorProcess::new(8, 2)),
        Err(InitError::UnsupportedOrder { max: 7, .. })
    ));
}

#[test]
fn test_closure_only_problem_has_no_autodiff() {
    let ivp = ODEProblem::new(
        |_t, y| DVector::from_vec(vec![y[1], -y[0]]),
        0.0,
        DVector::from_vec(vec![1.0, 0.0]),
    );
    let prior = PriorProcess::new(3, 2);
    for (routine, _) in autodiff_routines() {
        assert!(matches!(
            routine.initialize(&ivp, &prior),
            Err(InitError::AutodiffUnavailable(_))
        ));
    }
    assert!(matches!(
        StackWithJacobian::new().initialize(&ivp, &prior),
        Err(InitError::MissingJacobian(_))
    ));
    assert!(Stack::new().initialize(&ivp, &prior).is_ok());
}

#[test]
fn test_dimension_mismatch_for_every_routine() {
    let planar = lotka_volterra();
    let spatial = ODEProblem::from_strings(
        &["-x + y", "-y*z", "x - z"],
        &["x", "y", "z"],
        "t",
        0.0,
        DVector::from_vec(vec![1.0, 2.0, 3.0]),
    )
    .unwrap();
    let cases = [
        (&planar, PriorProcess::new(2, 3), 3, 2),
        (&spatial, PriorProcess::new(2, 2), 2, 3),
    ];
    for (ivp, prior, expected, found) in cases.iter() {
        for kind in RoutineKind::iter() {
            assert_eq!(
                build_routine(kind).initialize(ivp, prior).unwrap_err(),
                InitError::DimensionMismatch {
                    expected: *expected,
                    found: *found
                },
                "{}",
                kind
            );
        }
    }
}

#[test]
fn test_chaining_stack_into_fit() {
    let ivp = lotka_volterra();
    let prior = PriorProcess::new(3, 2);
    let seed = Stack::new().initialize(&ivp, &prior).unwrap();
    let seeded = prior.clone().with_initrv(seed.clone()).unwrap();
    assert!(seeded.has_initrv());
    assert_eq!(seeded.initrv(), seed);
    let rv = NonProbabilisticFitWithJacobian::default()
        .initialize(&ivp, &seeded)
        .unwrap();
    assert_eq!(rv.mean.len(), seeded.state_dimension());
    let rv = TaylorMode::new().initialize(&ivp, &seeded).unwrap();
    assert_eq!(rv.mean.len(), seeded.state_dimension());
}

#[test]
fn test_fit_agrees_with_taylor_mode() {
    let ivp = ODEProblem::from_strings(&["-2*y + t"], &["y"], "t", 0.0, DVector::from_vec(vec![1.0])).unwrap();
    let prior = PriorProcess::new(3, 1);
    let exact = TaylorMode::new().initialize(&ivp, &prior).unwrap();
    for (value, expected) in exact.mean.iter().zip([1.0, -2.0, 5.0, -10.0]) {
        assert_relative_eq!(*value, expected, max_relative = 1e-14);
    }
    for solver in FitSolver::iter() {
        let rv = NonProbabilisticFitWithJacobian::new(solver, 1e-8, 1e-10)
            .unwrap()
            .with_dt(5e-3)
            .unwrap()
            .initialize(&ivp, &prior)
            .unwrap();
        assert_relative_eq!(rv.mean[1], -2.0, max_relative = 1e-12);
        assert_relative_eq!(rv.mean[2], 5.0, max_relative = 1e-10);
        assert_relative_eq!(rv.mean[3], -10.0, max_relative = 5e-2);
    }
    assert!(!NonProbabilisticFit::default().is_exact());
}

#[test]
fn test_coordinate_ordering() {
    let ivp = lotka_volterra();
    let prior = PriorProcess::new(2, 2).with_ordering(StateOrdering::Coordinate);
    let rv = Stack::new().initialize(&ivp, &prior).unwrap();
    let f0 = ivp.f(0.0, ivp.y0());
    assert_eq!(rv.mean.as_slice(), &[1.2, f0[0], 0.0, 0.8, f0[1], 0.0]);
    let taylor = TaylorMode::new().initialize(&ivp, &prior).unwrap();
    let derivative_first = TaylorMode::new()
        .initialize(&ivp, &PriorProcess::new(2, 2))
        .unwrap();
    assert_eq!(taylor.mean[4], derivative_first.mean[3]);
    assert_eq!(taylor.mean[2], derivative_first.mean[4]);
}

#[test]
fn test_idempotence() {
    let ivp = lotka_volterra();
    let prior = PriorProcess::new(3, 2);
    for kind in RoutineKind::iter() {
        let routine = build_routine(kind);
        let first = routine.initialize(&ivp, &prior).unwrap();
        let second = routine.initialize(&ivp, &prior).unwrap();
        assert_eq!(first, second, "{}", kind);
    }
}

#[test]
fn test_routines_are_thread_safe() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Box<dyn InitializationRoutine>>();
    assert_send_sync::<ODEProblem>();
    let ivp = lotka_volterra();
    let prior = PriorProcess::new(3, 2);
    let handles: Vec<_> = RoutineKind::iter()
        .map(|kind| {
            let ivp = ivp.clone();
            let prior = prior.clone();
            std::thread::spawn(move || build_routine(kind).initialize(&ivp, &prior).map(|rv| rv.mean.len()))
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), Ok(8));
    }
}

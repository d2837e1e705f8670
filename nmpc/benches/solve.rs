//! # Solve Benchmark

use criterion::{criterion_group, criterion_main, Criterion};

use nmpc::{Bounds, Desired, Forward, HessianMode, Limits, Nmpc, Params, SolverSettings, State, Weights};

fn params() -> Params {
    Params {
        forward: Forward {
            timesteps: 12,
            dt: 0.1,
        },
        desired: Desired {
            vel: 0.5,
            ..Default::default()
        },
        limits: Limits {
            omega: Bounds::symmetric(2.0),
            throttle: Bounds::symmetric(1.0),
        },
        weights: Weights {
            cte: 87.859183,
            etheta: 99.532785,
            vel: 54.116644,
            omega: 47.430096,
            acc: 2.185306,
            omega_d: 4.6115,
            acc_d: 66.870729,
        },
    }
}

fn solve_benchmark(c: &mut Criterion) {
    let coeffs = vec![-1.5 / 0.6f64.cos(), 0.6f64.tan(), 0.0, 0.0];
    let state = State::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0, -1.81744, -0.6);

    let exact = Nmpc::new(params(), coeffs.clone()).unwrap();
    c.bench_function("cold solve, exact hessian", |b| {
        b.iter(|| exact.solve_cold(&state).unwrap())
    });

    let settings = SolverSettings {
        hessian: HessianMode::GaussNewton,
        ..Default::default()
    };
    let gauss_newton = Nmpc::with_settings(params(), coeffs, settings).unwrap();
    c.bench_function("cold solve, gauss-newton", |b| {
        b.iter(|| gauss_newton.solve_cold(&state).unwrap())
    });
}

criterion_group!(benches, solve_benchmark);
criterion_main!(benches);

use std::f64::consts::FRAC_1_SQRT_2;

use num_complex::Complex64;
use qmdd_rs::engine::Engine;
use qmdd_rs::error::EngineError;
use qmdd_rs::gate::{GateMatrix, Line};
use qmdd_rs::node::Edge;
use qmdd_rs::scalar::Scalar;
use qmdd_rs::types::Var;
use test_log::test;

fn assert_close(actual: &[Vec<Complex64>], expected: &[Vec<Complex64>]) {
    assert_eq!(actual.len(), expected.len());
    for (r, (ra, re)) in actual.iter().zip(expected).enumerate() {
        for (c, (a, e)) in ra.iter().zip(re).enumerate() {
            assert!((a - e).norm() < 1e-9, "entry ({}, {}): {} != {}", r, c, a, e);
        }
    }
}

fn real_matrix(rows: &[&[f64]]) -> Vec<Vec<Complex64>> {
    rows.iter()
        .map(|row| row.iter().map(|&x| Complex64::new(x, 0.0)).collect())
        .collect()
}

/// `H ⊗ H` with row and column bits indexed by variable.
fn hadamard_square() -> Vec<Vec<Complex64>> {
    (0..4)
        .map(|r: usize| {
            (0..4)
                .map(|c: usize| {
                    let sign = if (r & c).count_ones() % 2 == 0 { 1.0 } else { -1.0 };
                    Complex64::new(0.5 * sign, 0.0)
                })
                .collect()
        })
        .collect()
}

#[test]
fn test_cnot_two_ways() -> color_eyre::Result<()> {
    let mut engine = Engine::new(2);
    let x = GateMatrix::not();

    let a = engine.gate(&x, 2, &[Var::new(1)], Var::new(0))?;
    let b = engine.make_gate(&x, &[Line::Target, Line::Control(1)])?;
    assert_eq!(a, b);

    // |0⟩⟨0| ⊗ I + |1⟩⟨1| ⊗ X
    let (one, zero) = (Scalar::ONE, Scalar::ZERO);
    let p0 = engine.make_matrix_node(Var::new(1), [[one, zero], [zero, zero]])?;
    let p1 = engine.make_matrix_node(Var::new(1), [[zero, zero], [zero, one]])?;
    let x0 = engine.make_matrix_node(Var::new(0), [[zero, one], [one, zero]])?;
    let i1 = engine.identity(1)?;
    let left = engine.kronecker(p0, i1)?;
    let right = engine.kronecker(p1, x0)?;
    let c = engine.add(left, right)?;
    assert_eq!(a, c);

    let expected = real_matrix(&[
        &[1.0, 0.0, 0.0, 0.0],
        &[0.0, 1.0, 0.0, 0.0],
        &[0.0, 0.0, 0.0, 1.0],
        &[0.0, 0.0, 1.0, 0.0],
    ]);
    assert_close(&engine.to_matrix(a, 2), &expected);
    Ok(())
}

#[test]
fn test_kron_hadamard_survives_gc_and_sift() -> color_eyre::Result<()> {
    let mut engine = Engine::new(2);
    let h = engine.scalars_mut().intern(FRAC_1_SQRT_2, 0.0)?;
    let hm = [[h, h], [h, h.negate()]];

    let a = engine.make_matrix_node(Var::new(1), hm)?;
    let b = engine.make_matrix_node(Var::new(0), hm)?;
    let k = engine.kronecker(a, b)?;

    let g1 = engine.gate(&GateMatrix::hadamard(), 2, &[], Var::new(1))?;
    let g0 = engine.gate(&GateMatrix::hadamard(), 2, &[], Var::new(0))?;
    let m = engine.multiply(g1, g0)?;
    assert_eq!(k, m);
    assert_close(&engine.to_matrix(k, 2), &hadamard_square());

    engine.incref(k);
    engine.collect_now();
    assert_close(&engine.to_matrix(k, 2), &hadamard_square());

    let mut roots = [k];
    engine.sift(&mut roots, 2)?;
    assert_close(&engine.to_matrix(roots[0], 2), &hadamard_square());

    let g1 = engine.gate(&GateMatrix::hadamard(), 2, &[], Var::new(1))?;
    let g0 = engine.gate(&GateMatrix::hadamard(), 2, &[], Var::new(0))?;
    let m = engine.multiply(g0, g1)?;
    assert_eq!(roots[0], m);
    Ok(())
}

#[test]
fn test_sifting_preserves_semantics() -> color_eyre::Result<()> {
    let n = 4;
    let mut engine = Engine::new(n);
    let x = GateMatrix::not();

    // Long-range CNOTs couple x0 with x3 and x1 with x2.
    let mut f = engine.identity(n)?;
    for (control, target) in [(3, 0), (0, 3), (2, 1), (1, 2)] {
        let h = engine.gate(&GateMatrix::hadamard(), n, &[], Var::new(control))?;
        let g = engine.gate(&x, n, &[Var::new(control)], Var::new(target))?;
        f = engine.multiply(h, f)?;
        f = engine.multiply(g, f)?;
    }
    engine.incref(f);
    let before = engine.to_matrix(f, n);
    let size_before = engine.node_count(f);

    let mut roots = [f];
    let stats = engine.sift(&mut roots, n)?;
    assert_eq!(stats.variables_processed, n);
    assert!(stats.swaps > 0);
    assert!(stats.final_size <= stats.initial_size);
    assert!(engine.node_count(roots[0]) <= size_before);
    assert_close(&engine.to_matrix(roots[0], n), &before);

    // The order is a permutation.
    let mut order: Vec<u32> = engine.order().iter().map(|v| v.id()).collect();
    order.sort_unstable();
    assert_eq!(order, vec![0, 1, 2, 3]);

    // Handles keep working after the pass.
    let adj = engine.conjugate_transpose(roots[0])?;
    let p = engine.multiply(adj, roots[0])?;
    assert_eq!(p, engine.identity(n)?);
    Ok(())
}

#[test]
fn test_refcount_conservation() -> color_eyre::Result<()> {
    let n = 3;
    let mut engine = Engine::new(n);
    for k in 0..=n {
        engine.identity(k)?;
    }
    engine.collect_now();
    let baseline = engine.num_nodes();
    let terminal_refs = engine.ref_count(Edge::ONE);

    let h = engine.gate(&GateMatrix::hadamard(), n, &[], Var::new(2))?;
    let c = engine.gate(&GateMatrix::not(), n, &[Var::new(2)], Var::new(0))?;
    let t = engine.gate(&GateMatrix::s(), n, &[Var::new(0)], Var::new(1))?;
    let f = engine.multiply(c, h)?;
    let f = engine.multiply(t, f)?;
    assert!(engine.num_nodes() > baseline);

    let handles = [h, c, t, f];
    for &e in &handles {
        engine.incref(e);
    }
    let active = engine.active_count();
    engine.collect_now();
    assert_eq!(engine.active_count(), active);

    for &e in &handles {
        engine.decref(e);
    }
    assert_eq!(engine.ref_count(Edge::ONE), terminal_refs);
    engine.collect_now();
    assert_eq!(engine.num_nodes(), baseline);
    Ok(())
}

#[test]
fn test_gc_soundness() -> color_eyre::Result<()> {
    let n = 3;
    let mut engine = Engine::new(n);
    let a = engine.gate(&GateMatrix::v(), n, &[Var::new(0)], Var::new(2))?;
    let b = engine.gate(&GateMatrix::hadamard(), n, &[], Var::new(1))?;
    engine.incref(a);
    engine.incref(b);

    let r1 = engine.multiply(a, b)?;
    let m1 = engine.to_matrix(r1, n);
    engine.collect_now();
    let r2 = engine.multiply(a, b)?;
    assert_eq!(engine.to_matrix(r2, n), m1);

    // A pinned result survives and is found again.
    engine.incref(r2);
    engine.collect_now();
    let r3 = engine.multiply(a, b)?;
    assert_eq!(r3, r2);
    Ok(())
}

#[test]
fn test_canonicity() -> color_eyre::Result<()> {
    let mut engine = Engine::new(1);
    let t = Var::new(0);
    let h = engine.gate(&GateMatrix::hadamard(), 1, &[], t)?;
    let x = engine.gate(&GateMatrix::not(), 1, &[], t)?;
    let y = engine.gate(&GateMatrix::pauli_y(), 1, &[], t)?;
    let z = engine.gate(&GateMatrix::pauli_z(), 1, &[], t)?;
    let s = engine.gate(&GateMatrix::s(), 1, &[], t)?;

    // HXH = Z
    let hx = engine.multiply(h, x)?;
    let hxh = engine.multiply(hx, h)?;
    assert_eq!(hxh, z);

    // S² = Z
    let ss = engine.multiply(s, s)?;
    assert_eq!(ss, z);

    // Y = i·X·Z
    let xz = engine.multiply(x, z)?;
    let ixz = engine.scale(xz, Scalar::I)?;
    assert_eq!(ixz, y);

    // X + Z = √2·H
    let sum = engine.add(x, z)?;
    let sqrt2 = engine.scalars_mut().intern(std::f64::consts::SQRT_2, 0.0)?;
    let scaled = engine.scale(h, sqrt2)?;
    assert_eq!(sum, scaled);
    Ok(())
}

#[test]
fn test_trace() -> color_eyre::Result<()> {
    let mut engine = Engine::new(3);
    let id = engine.identity(3)?;
    let t = engine.trace_all(id)?;
    assert!(t.is_terminal());
    assert_eq!(engine.scalars().value(t.weight), Complex64::new(8.0, 0.0));

    // tr(CNOT) = 2
    let cnot = engine.gate(&GateMatrix::not(), 2, &[Var::new(1)], Var::new(0))?;
    let t = engine.trace(cnot, &[true, true])?;
    assert_eq!(engine.scalars().value(t.weight), Complex64::new(2.0, 0.0));

    // Tracing out the target of CNOT leaves 2·|0⟩⟨0| on the control.
    let partial = engine.trace(cnot, &[true, false])?;
    let m = engine.to_matrix(partial, 2);
    assert_eq!(m[0][0], Complex64::new(2.0, 0.0));
    assert_eq!(m[2][2], Complex64::new(0.0, 0.0));
    Ok(())
}

#[test]
fn test_errors() -> color_eyre::Result<()> {
    let mut engine = Engine::new(2);
    let x = GateMatrix::not();

    let err = engine.make_gate(&x, &[Line::Idle, Line::Idle]).unwrap_err();
    assert!(matches!(err, EngineError::InvalidGate(_)));
    let err = engine.make_gate(&x, &[Line::Target, Line::Target]).unwrap_err();
    assert!(matches!(err, EngineError::InvalidGate(_)));
    let err = engine.gate(&x, 2, &[], Var::new(5)).unwrap_err();
    assert!(matches!(err, EngineError::UnknownVariable { .. }));

    // Kronecker operands must not overlap.
    let (one, zero) = (Scalar::ONE, Scalar::ZERO);
    let low = engine.make_matrix_node(Var::new(0), [[zero, one], [one, zero]])?;
    let high = engine.make_matrix_node(Var::new(1), [[zero, one], [one, zero]])?;
    assert!(engine.kronecker(high, low).is_ok());
    let err = engine.kronecker(low, high).unwrap_err();
    assert!(matches!(err, EngineError::InvalidGate(_)));
    Ok(())
}

#[test]
fn test_cnot_times_identity() -> color_eyre::Result<()> {
    let mut engine = Engine::new(2);
    let cnot = engine.make_gate(&GateMatrix::not(), &[Line::Target, Line::Control(1)])?;
    let id = engine.make_gate(&GateMatrix::identity(), &[Line::Target, Line::Idle])?;
    assert_eq!(id, engine.identity(2)?);

    assert_eq!(engine.multiply(cnot, id)?, cnot);
    assert_eq!(engine.multiply(id, cnot)?, cnot);

    // CNOT is its own inverse.
    let sq = engine.multiply(cnot, cnot)?;
    assert_eq!(sq, id);
    Ok(())
}

#[test]
fn test_sifting_reaches_fixed_point() -> color_eyre::Result<()> {
    let n = 5;
    let mut engine = Engine::new(n);
    let x = GateMatrix::not();

    let mut f = engine.identity(n)?;
    for (control, target) in [(4, 0), (0, 4), (3, 1), (1, 3), (2, 0)] {
        let h = engine.gate(&GateMatrix::hadamard(), n, &[], Var::new(control))?;
        let g = engine.gate(&x, n, &[Var::new(control)], Var::new(target))?;
        f = engine.multiply(h, f)?;
        f = engine.multiply(g, f)?;
    }
    engine.incref(f);
    let before = engine.to_matrix(f, n);

    let mut roots = [f];
    let mut size = engine.node_count(roots[0]);
    let mut rounds = 0;
    loop {
        engine.sift(&mut roots, n)?;
        rounds += 1;
        let next = engine.node_count(roots[0]);
        assert!(next <= size, "sifting grew the diagram from {} to {}", size, next);
        assert_close(&engine.to_matrix(roots[0], n), &before);
        if next == size {
            break;
        }
        size = next;
        assert!(rounds < 20, "sifting did not settle");
    }
    assert_eq!(engine.active_count() + 1, engine.node_count(roots[0]));
    Ok(())
}

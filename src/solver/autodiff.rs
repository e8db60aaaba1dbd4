//! Forward-mode automatic differentiation of cost terms.
//!
//! Each scalar of the stacked parameter vector is seeded with a unit dual
//! perturbation, the term is evaluated once over dual numbers, and the
//! Jacobian rows fall out of the dual parts. This gives exact derivatives for
//! every residual formula without hand-written Jacobians, robust weighting
//! included.

use nalgebra::{Const, DMatrix, DVector, Dyn};
use num_dual::{Derivative, DualDVec64};

use crate::solver::{CostTerm, Residual};

/// Evaluate a cost term and its Jacobian with respect to all parameters.
///
/// The Jacobian columns follow the concatenation of the parameter vectors in
/// argument order.
pub fn residual_and_jacobian(
    term: &dyn CostTerm,
    params: &[DVector<f64>],
) -> (DVector<f64>, DMatrix<f64>) {
    let total: usize = params.iter().map(DVector::len).sum();

    let mut dual_params: Vec<DVector<DualDVec64>> = Vec::with_capacity(params.len());
    let mut offset = 0;
    for param in params {
        let base = offset;
        let seeded = DVector::from_iterator(
            param.len(),
            param.iter().enumerate().map(|(i, &value)| {
                DualDVec64::new(
                    value,
                    Derivative::derivative_generic(Dyn(total), Const::<1>, base + i),
                )
            }),
        );
        dual_params.push(seeded);
        offset += param.len();
    }

    let dual_residual = <dyn CostTerm as Residual<DualDVec64>>::residual(term, &dual_params);

    let dim = dual_residual.len();
    let mut residual = DVector::zeros(dim);
    let mut jacobian = DMatrix::zeros(dim, total);
    for (i, value) in dual_residual.iter().enumerate() {
        residual[i] = value.re;
        let gradient = value.eps.clone().unwrap_generic(Dyn(total), Const::<1>);
        jacobian.row_mut(i).copy_from(&gradient.transpose());
    }

    (residual, jacobian)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::RealField;

    struct PlanarRange {
        beacon: DVector<f64>,
        measured: f64,
    }

    impl<T: RealField> Residual<T> for PlanarRange {
        fn residual(&self, params: &[DVector<T>]) -> DVector<T> {
            let beacon = self.beacon.map(|x| nalgebra::convert::<f64, T>(x));
            let diff = &params[0] - beacon;
            let range = diff.norm();
            DVector::from_vec(vec![range - nalgebra::convert::<f64, T>(self.measured)])
        }
    }

    impl CostTerm for PlanarRange {
        fn dimension(&self) -> usize {
            1
        }
    }

    #[test]
    fn test_range_jacobian_is_unit_direction() {
        let term = PlanarRange {
            beacon: DVector::from_vec(vec![0.0, 0.0]),
            measured: 5.0,
        };
        let params = vec![DVector::from_vec(vec![3.0, 4.0])];
        let (residual, jacobian) = residual_and_jacobian(&term, &params);

        assert_eq!(residual.len(), 1);
        assert!(residual[0].abs() < 1e-12);
        // d|p|/dp = p / |p|
        assert!((jacobian[(0, 0)] - 0.6).abs() < 1e-12);
        assert!((jacobian[(0, 1)] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_jacobian_columns_follow_argument_order() {
        struct Sum;
        impl<T: RealField> Residual<T> for Sum {
            fn residual(&self, params: &[DVector<T>]) -> DVector<T> {
                let two = nalgebra::convert::<f64, T>(2.0);
                DVector::from_vec(vec![
                    params[0][0].clone() + params[1][0].clone() * two,
                ])
            }
        }
        impl CostTerm for Sum {
            fn dimension(&self) -> usize {
                1
            }
        }

        let params = vec![
            DVector::from_vec(vec![1.0]),
            DVector::from_vec(vec![10.0]),
        ];
        let (residual, jacobian) = residual_and_jacobian(&Sum, &params);
        assert!((residual[0] - 21.0).abs() < 1e-12);
        assert!((jacobian[(0, 0)] - 1.0).abs() < 1e-12);
        assert!((jacobian[(0, 1)] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_jacobian_against_finite_differences() {
        let term = PlanarRange {
            beacon: DVector::from_vec(vec![-10.0, 10.0]),
            measured: 12.0,
        };
        let point = DVector::from_vec(vec![1.0, 2.5]);
        let (_, jacobian) = residual_and_jacobian(&term, &[point.clone()]);

        let eps = 1e-7;
        for j in 0..2 {
            let mut perturbed = point.clone();
            perturbed[j] += eps;
            let plus = <PlanarRange as Residual<f64>>::residual(&term, &[perturbed]);
            let base = <PlanarRange as Residual<f64>>::residual(&term, &[point.clone()]);
            let fd = (plus[0] - base[0]) / eps;
            assert!((jacobian[(0, j)] - fd).abs() < 1e-5);
        }
    }
}

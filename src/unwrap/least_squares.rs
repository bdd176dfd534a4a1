//! Least-squares phase unwrapping.
//!
//! Minimizes the squared difference between the gradients of the unwrapped phase and the
//! wrapped gradients of the input. The unweighted problem is a discrete Poisson equation with
//! Neumann boundaries, solved directly with a cosine-transform equivalent FFT solver. With
//! weights the problem is solved by preconditioned conjugate gradients, using the unweighted
//! solver as preconditioner.
//!
//! Reference:
//! Ghiglia DC, Romero LA. Robust two-dimensional weighted and unweighted phase unwrapping that
//! uses fast transforms and iterative methods. JOSA A. 1994;11(1):107-117.

use crate::fft::solve_neumann_poisson;
use crate::math_tools::wrap_phase;
use ndarray::{Array2, ArrayView2, Zip};
use num_complex::Complex64;
use std::f64::consts::PI;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum UnwrapError {
    #[error("cannot unwrap an empty phase array")]
    EmptyPhase,
    #[error("phase contains {count} non-finite samples")]
    NonFinitePhase { count: usize },
    #[error("weights have shape {found:?}, expected {expected:?}")]
    WeightShape {
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("conjugate gradient broke down at iteration {iteration}")]
    Breakdown { iteration: usize },
}

/// Solver settings for the least-squares unwrap.
#[derive(Debug, Clone)]
pub struct LeastSquaresUnwrap {
    pub max_iterations: usize,
    /// Relative residual at which the weighted iteration stops.
    pub tolerance: f64,
}

impl Default for LeastSquaresUnwrap {
    fn default() -> Self {
        LeastSquaresUnwrap {
            max_iterations: 50,
            tolerance: 1e-8,
        }
    }
}

/// Edge weights of the weighted Laplacian: `u` couples `(y, x)` with `(y, x + 1)` and `v`
/// couples `(y, x)` with `(y + 1, x)`. Edges leaving the array have zero weight.
struct EdgeWeights {
    u: Array2<f64>,
    v: Array2<f64>,
}

impl EdgeWeights {
    fn from_weights(weights: Option<&Array2<f64>>, shape: (usize, usize)) -> Self {
        let (ny, nx) = shape;
        let w2 = |y: usize, x: usize| weights.map_or(1.0, |w| w[[y, x]] * w[[y, x]]);
        let u = Array2::from_shape_fn(shape, |(y, x)| {
            if x + 1 < nx {
                w2(y, x).min(w2(y, x + 1))
            } else {
                0.0
            }
        });
        let v = Array2::from_shape_fn(shape, |(y, x)| {
            if y + 1 < ny {
                w2(y, x).min(w2(y + 1, x))
            } else {
                0.0
            }
        });
        EdgeWeights { u, v }
    }

    /// Weighted divergence of the gradient field `(gx, gy)`.
    fn divergence(&self, gx: &Array2<f64>, gy: &Array2<f64>) -> Array2<f64> {
        let (ny, nx) = gx.dim();
        Array2::from_shape_fn((ny, nx), |(y, x)| {
            let mut d = self.u[[y, x]] * gx[[y, x]] + self.v[[y, x]] * gy[[y, x]];
            if x > 0 {
                d -= self.u[[y, x - 1]] * gx[[y, x - 1]];
            }
            if y > 0 {
                d -= self.v[[y - 1, x]] * gy[[y - 1, x]];
            }
            d
        })
    }

    /// Weighted Laplacian of `phi` with Neumann boundaries.
    fn laplacian(&self, phi: &Array2<f64>) -> Array2<f64> {
        let (gx, gy) = forward_differences(phi, |d| d);
        self.divergence(&gx, &gy)
    }
}

/// Forward differences along x and y, with `map` applied to each difference. Differences across
/// the last column or row are zero.
fn forward_differences(phi: &Array2<f64>, map: impl Fn(f64) -> f64) -> (Array2<f64>, Array2<f64>) {
    let (ny, nx) = phi.dim();
    let gx = Array2::from_shape_fn((ny, nx), |(y, x)| {
        if x + 1 < nx {
            map(phi[[y, x + 1]] - phi[[y, x]])
        } else {
            0.0
        }
    });
    let gy = Array2::from_shape_fn((ny, nx), |(y, x)| {
        if y + 1 < ny {
            map(phi[[y + 1, x]] - phi[[y, x]])
        } else {
            0.0
        }
    });
    (gx, gy)
}

fn dot(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
    Zip::from(a).and(b).fold(0.0, |acc, x, y| acc + x * y)
}

impl LeastSquaresUnwrap {
    /// Unwraps `phase` (wrapped into (-pi, pi]).
    ///
    /// `weights` are non-negative per-pixel reliabilities of the same shape; `None` solves the
    /// unweighted problem directly. The result is congruent with the input: wrapping it
    /// reproduces `phase`.
    pub fn unwrap(
        &self,
        phase: ArrayView2<f64>,
        weights: Option<&Array2<f64>>,
    ) -> Result<Array2<f64>, UnwrapError> {
        let shape = phase.dim();
        if phase.is_empty() {
            return Err(UnwrapError::EmptyPhase);
        }
        let count = phase.iter().filter(|v| !v.is_finite()).count();
        if count > 0 {
            return Err(UnwrapError::NonFinitePhase { count });
        }
        if let Some(w) = weights {
            if w.dim() != shape {
                return Err(UnwrapError::WeightShape {
                    expected: shape,
                    found: w.dim(),
                });
            }
        }
        let psi = phase.to_owned();

        let solution = match weights {
            None => {
                let edges = EdgeWeights::from_weights(None, shape);
                let (gx, gy) = forward_differences(&psi, wrap_phase);
                solve_neumann_poisson(&edges.divergence(&gx, &gy))
            }
            Some(w) => {
                let w = w.mapv(|v| if v.is_finite() { v.max(0.0) } else { 0.0 });
                self.solve_weighted(&psi, &EdgeWeights::from_weights(Some(&w), shape))?
            }
        };

        if solution.iter().any(|v| !v.is_finite()) {
            return Err(UnwrapError::NonFinitePhase {
                count: solution.iter().filter(|v| !v.is_finite()).count(),
            });
        }
        Ok(make_congruent(&psi, &solution))
    }

    /// Preconditioned conjugate gradients on `-Q phi = -b`, where `Q` is the weighted Laplacian
    /// and `b` the weighted divergence of the wrapped gradients.
    fn solve_weighted(&self, psi: &Array2<f64>, edges: &EdgeWeights) -> Result<Array2<f64>, UnwrapError> {
        let (gx, gy) = forward_differences(psi, wrap_phase);
        let rhs = edges.divergence(&gx, &gy).mapv(|v| -v);
        let rhs_norm = dot(&rhs, &rhs).sqrt();

        let mut phi = Array2::zeros(psi.dim());
        if rhs_norm == 0.0 {
            return Ok(phi);
        }
        let mut residual = rhs;
        let mut direction = Array2::<f64>::zeros(psi.dim());
        let mut rho_prev = 0.0;

        for iteration in 0..self.max_iterations {
            let z = solve_neumann_poisson(&residual).mapv(|v| -v);
            let rho = dot(&residual, &z);
            if iteration == 0 {
                direction = z;
            } else {
                let beta = rho / rho_prev;
                direction = z + &(direction * beta);
            }
            let a_dir = edges.laplacian(&direction).mapv(|v| -v);
            let curvature = dot(&direction, &a_dir);
            if !curvature.is_finite() || !rho.is_finite() {
                return Err(UnwrapError::Breakdown { iteration });
            }
            if curvature <= f64::EPSILON * rhs_norm * rhs_norm {
                // the remaining residual lies in the null space of the weighted operator
                return Ok(phi);
            }
            let alpha = rho / curvature;
            phi.scaled_add(alpha, &direction);
            residual.scaled_add(-alpha, &a_dir);
            rho_prev = rho;

            let relative = dot(&residual, &residual).sqrt() / rhs_norm;
            if relative < self.tolerance {
                log::debug!("weighted unwrap converged after {} iterations", iteration + 1);
                return Ok(phi);
            }
        }
        log::debug!(
            "weighted unwrap stopped at the iteration cap of {}",
            self.max_iterations
        );
        Ok(phi)
    }
}

/// Adds the multiple of 2 pi to each wrapped sample that brings it closest to the least-squares
/// solution, after aligning the solution's free constant with the data by circular mean.
fn make_congruent(psi: &Array2<f64>, solution: &Array2<f64>) -> Array2<f64> {
    let mean_offset: Complex64 = Zip::from(solution)
        .and(psi)
        .fold(Complex64::new(0.0, 0.0), |acc, s, p| acc + Complex64::from_polar(1.0, s - p));
    let offset = if mean_offset.norm() > 0.0 { mean_offset.arg() } else { 0.0 };
    Zip::from(psi)
        .and(solution)
        .map_collect(|&p, &s| p + 2.0 * PI * ((s - offset - p) / (2.0 * PI)).round())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn smooth_surface(ny: usize, nx: usize) -> Array2<f64> {
        Array2::from_shape_fn((ny, nx), |(y, x)| {
            0.45 * x as f64 - 0.3 * y as f64 + 2.0 * ((x as f64) / 7.0).sin() * ((y as f64) / 9.0).cos()
        })
    }

    fn assert_equal_up_to_constant(a: &Array2<f64>, b: &Array2<f64>) {
        let offset = a[[0, 0]] - b[[0, 0]];
        assert_abs_diff_eq!(offset / (2.0 * PI), (offset / (2.0 * PI)).round(), epsilon = 1e-9);
        for (u, v) in a.iter().zip(b.iter()) {
            assert_abs_diff_eq!(*u, *v + offset, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_ramp_rewraps_to_input() {
        let truth = Array2::from_shape_fn((24, 32), |(y, x)| 0.9 * x as f64 + 0.6 * y as f64);
        let wrapped = truth.mapv(wrap_phase);
        let unwrapped = LeastSquaresUnwrap::default().unwrap(wrapped.view(), None).unwrap();
        for (u, w) in unwrapped.iter().zip(wrapped.iter()) {
            assert_abs_diff_eq!(wrap_phase(*u), *w, epsilon = 1e-9);
        }
        assert_equal_up_to_constant(&unwrapped, &truth);
    }

    #[test]
    fn test_smooth_surface_is_recovered() {
        let truth = smooth_surface(40, 36);
        let wrapped = truth.mapv(wrap_phase);
        let unwrapped = LeastSquaresUnwrap::default().unwrap(wrapped.view(), None).unwrap();
        assert_equal_up_to_constant(&unwrapped, &truth);
    }

    #[test]
    fn test_weighted_solution_matches_unweighted_for_consistent_data() {
        let truth = smooth_surface(20, 24);
        let wrapped = truth.mapv(wrap_phase);
        let weights = Array2::from_shape_fn(truth.dim(), |(y, x)| 0.2 + ((x + y) % 5) as f64 * 0.2);
        let unwrapped = LeastSquaresUnwrap::default()
            .unwrap(wrapped.view(), Some(&weights))
            .unwrap();
        assert_equal_up_to_constant(&unwrapped, &truth);
    }

    #[test]
    fn test_zero_weights_stay_congruent() {
        let wrapped = smooth_surface(8, 8).mapv(wrap_phase);
        let weights = Array2::zeros((8, 8));
        let unwrapped = LeastSquaresUnwrap::default()
            .unwrap(wrapped.view(), Some(&weights))
            .unwrap();
        for (u, w) in unwrapped.iter().zip(wrapped.iter()) {
            assert_abs_diff_eq!(wrap_phase(*u), *w, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_invalid_inputs_are_reported() {
        let solver = LeastSquaresUnwrap::default();
        let empty = Array2::<f64>::zeros((0, 4));
        assert_eq!(solver.unwrap(empty.view(), None), Err(UnwrapError::EmptyPhase));

        let mut nan = Array2::<f64>::zeros((4, 4));
        nan[[1, 1]] = f64::NAN;
        nan[[2, 3]] = f64::INFINITY;
        assert_eq!(
            solver.unwrap(nan.view(), None),
            Err(UnwrapError::NonFinitePhase { count: 2 })
        );

        let ok = Array2::<f64>::zeros((4, 4));
        let weights = Array2::<f64>::ones((3, 4));
        assert_eq!(
            solver.unwrap(ok.view(), Some(&weights)),
            Err(UnwrapError::WeightShape {
                expected: (4, 4),
                found: (3, 4)
            })
        );
    }
}

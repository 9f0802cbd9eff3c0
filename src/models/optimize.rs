//! Derivative-free minimization for the likelihood fits
//!
//! Both models are fit over log-parameters with Nelder-Mead. The method is
//! deterministic for a fixed starting point, so repeated fits on the same data
//! give bit-identical parameters.

use tracing::debug;

/// How an optimization run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceStatus {
    /// Simplex spread fell below both tolerances
    Converged,
    /// Reached the iteration limit
    MaxIterations,
    /// The objective was not finite at the best point
    NumericalError,
}

/// Result of a minimization run
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    pub point: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub status: ConvergenceStatus,
}

/// Nelder-Mead simplex minimizer (standard reflection/expansion/contraction/shrink
/// coefficients 1, 2, 0.5, 0.5)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NelderMead {
    pub max_iterations: usize,
    /// Spread of objective values across the simplex
    pub f_tolerance: f64,
    /// Spread of vertex coordinates across the simplex
    pub x_tolerance: f64,
    /// Offset of the initial simplex vertices from the starting point
    pub initial_step: f64,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self {
            max_iterations: 20_000,
            f_tolerance: 1e-10,
            x_tolerance: 1e-7,
            initial_step: 0.5,
        }
    }
}

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;

impl NelderMead {
    pub fn minimize<F>(&self, objective: F, x0: &[f64]) -> Minimum
    where
        F: Fn(&[f64]) -> f64,
    {
        // Non-finite values are treated as +inf so the simplex moves away from them.
        let eval = |x: &[f64]| {
            let value = objective(x);
            if value.is_finite() {
                value
            } else {
                f64::INFINITY
            }
        };

        let n = x0.len();
        let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
        simplex.push(x0.to_vec());
        for i in 0..n {
            let mut vertex = x0.to_vec();
            vertex[i] += self.initial_step;
            simplex.push(vertex);
        }
        let mut values: Vec<f64> = simplex.iter().map(|x| eval(x)).collect();

        let mut iterations = 0;
        let status = loop {
            order_simplex(&mut simplex, &mut values);

            if !values[0].is_finite() {
                break ConvergenceStatus::NumericalError;
            }
            if self.has_converged(&simplex, &values) {
                break ConvergenceStatus::Converged;
            }
            if iterations >= self.max_iterations {
                break ConvergenceStatus::MaxIterations;
            }
            iterations += 1;

            let worst = &simplex[n];
            let centroid = centroid(&simplex[..n]);
            let along = |coef: f64| -> Vec<f64> {
                centroid
                    .iter()
                    .zip(worst)
                    .map(|(c, w)| c + coef * (c - w))
                    .collect()
            };

            let reflected = along(REFLECTION);
            let f_reflected = eval(&reflected);

            if f_reflected < values[0] {
                let expanded = along(REFLECTION * EXPANSION);
                let f_expanded = eval(&expanded);
                if f_expanded < f_reflected {
                    simplex[n] = expanded;
                    values[n] = f_expanded;
                } else {
                    simplex[n] = reflected;
                    values[n] = f_reflected;
                }
                continue;
            }

            if f_reflected < values[n - 1] {
                simplex[n] = reflected;
                values[n] = f_reflected;
                continue;
            }

            let contracted = if f_reflected < values[n] {
                let outside = along(CONTRACTION * REFLECTION);
                let f_outside = eval(&outside);
                (f_outside <= f_reflected).then_some((outside, f_outside))
            } else {
                let inside = along(-CONTRACTION);
                let f_inside = eval(&inside);
                (f_inside < values[n]).then_some((inside, f_inside))
            };

            match contracted {
                Some((point, value)) => {
                    simplex[n] = point;
                    values[n] = value;
                }
                None => {
                    let best = simplex[0].clone();
                    for i in 1..=n {
                        let shrunk: Vec<f64> = best
                            .iter()
                            .zip(&simplex[i])
                            .map(|(b, x)| b + SHRINK * (x - b))
                            .collect();
                        values[i] = eval(&shrunk);
                        simplex[i] = shrunk;
                    }
                }
            }
        };

        debug!(iterations, value = values[0], ?status, "nelder-mead finished");

        Minimum {
            point: simplex.swap_remove(0),
            value: values[0],
            iterations,
            status,
        }
    }

    fn has_converged(&self, simplex: &[Vec<f64>], values: &[f64]) -> bool {
        let best = &simplex[0];
        let f_spread = values[1..]
            .iter()
            .map(|v| (v - values[0]).abs())
            .fold(0.0, f64::max);
        let x_spread = simplex[1..]
            .iter()
            .flat_map(|vertex| vertex.iter().zip(best).map(|(x, b)| (x - b).abs()))
            .fold(0.0, f64::max);
        f_spread <= self.f_tolerance && x_spread <= self.x_tolerance
    }
}

/// Sort vertices by ascending objective value; ties keep their order
fn order_simplex(simplex: &mut Vec<Vec<f64>>, values: &mut Vec<f64>) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&i, &j| values[i].total_cmp(&values[j]));
    *simplex = order.iter().map(|&i| simplex[i].clone()).collect();
    *values = order.iter().map(|&i| values[i]).collect();
}

fn centroid(vertices: &[Vec<f64>]) -> Vec<f64> {
    let n = vertices.len() as f64;
    let mut center = vec![0.0; vertices[0].len()];
    for vertex in vertices {
        for (c, x) in center.iter_mut().zip(vertex) {
            *c += x / n;
        }
    }
    center
}

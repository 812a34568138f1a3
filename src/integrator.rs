use crate::{
    bounds::FlatBounds, error::Result, hamiltonian::PhasePoint, mass_matrix::MassMatrix,
    math::axpy, posterior::LogpFunc,
};

/// Leapfrog integration of Hamiltonian dynamics with reflecting walls.
pub(crate) struct Leapfrog<'a> {
    mass_matrix: &'a MassMatrix,
    bounds: &'a FlatBounds,
}

impl<'a> Leapfrog<'a> {
    pub(crate) fn new(mass_matrix: &'a MassMatrix, bounds: &'a FlatBounds) -> Self {
        Self {
            mass_matrix,
            bounds,
        }
    }

    /// Advance `point` by exactly `num_steps` leapfrog steps of size `step_size`.
    ///
    /// The momentum, position and gradient of `point` are updated in place,
    /// as are its log density and kinetic energy. Non-finite values are not
    /// treated specially, they end up in the energy of the final point.
    /// Only a gradient of the wrong shape produces an error.
    pub(crate) fn trajectory<F: LogpFunc>(
        &self,
        logp: &F,
        point: &mut PhasePoint,
        step_size: f64,
        num_steps: u64,
    ) -> Result<()> {
        for _ in 0..num_steps {
            self.step(logp, point, step_size)?;
        }
        self.mass_matrix
            .update_velocity(&point.momentum, &mut point.velocity);
        point.update_kinetic_energy(self.mass_matrix);
        Ok(())
    }

    fn step<F: LogpFunc>(&self, logp: &F, point: &mut PhasePoint, epsilon: f64) -> Result<()> {
        self.first_momentum_halfstep(point, epsilon);
        self.position_step(point, epsilon);
        point.update_potential_gradient(logp)?;
        self.second_momentum_halfstep(point, epsilon);
        Ok(())
    }

    fn first_momentum_halfstep(&self, point: &mut PhasePoint, epsilon: f64) {
        axpy(&point.gradient, &mut point.momentum, epsilon / 2.);
    }

    fn position_step(&self, point: &mut PhasePoint, epsilon: f64) {
        self.mass_matrix
            .update_velocity(&point.momentum, &mut point.velocity);
        axpy(&point.velocity, &mut point.position, epsilon);
        self.bounds.apply(&mut point.position, &mut point.momentum);
    }

    fn second_momentum_halfstep(&self, point: &mut PhasePoint, epsilon: f64) {
        axpy(&point.gradient, &mut point.momentum, epsilon / 2.);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        bounds::BoundTable,
        hamiltonian::energy_change,
        position::ParameterLayout,
    };
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    /// `log p(x) = -sum(x^2) / 2`, optionally with support `[lower, upper]`.
    pub(crate) struct Quadratic {
        pub(crate) dim: usize,
        pub(crate) support: Option<(f64, f64)>,
    }

    impl LogpFunc for Quadratic {
        fn logp(&self, position: &[f64], gradient: &mut [f64]) -> Result<f64> {
            let mut logp = 0f64;
            for (&x, g) in position.iter().zip(gradient.iter_mut()) {
                logp -= x * x / 2.;
                *g = -x;
            }
            if let Some((lower, upper)) = self.support {
                if position.iter().any(|&x| (x < lower) | (x > upper)) {
                    return Ok(f64::NEG_INFINITY);
                }
            }
            Ok(logp)
        }

        fn dim(&self) -> usize {
            self.dim
        }
    }

    fn energy_error(step_size: f64, num_steps: u64) -> f64 {
        let logp = Quadratic {
            dim: 1,
            support: None,
        };
        let mass = MassMatrix::Unit;
        let bounds = FlatBounds::unbounded(1);
        let leapfrog = Leapfrog::new(&mass, &bounds);

        let mut point = PhasePoint::init(&logp, &[1.]).unwrap();
        point.momentum[0] = 0.5;
        point.update_kinetic_energy(&mass);
        let initial = point.energy();

        leapfrog
            .trajectory(&logp, &mut point, step_size, num_steps)
            .unwrap();
        energy_change(initial, point.energy())
    }

    #[test]
    fn energy_error_is_second_order() {
        let coarse = energy_error(0.1, 10).abs();
        let fine = energy_error(0.05, 20).abs();
        let finer = energy_error(0.025, 40).abs();

        assert!(coarse > 0.);
        let ratio = coarse / fine;
        assert!((3. ..5.).contains(&ratio), "ratio {}", ratio);
        let ratio = fine / finer;
        assert!((3. ..5.).contains(&ratio), "ratio {}", ratio);
    }

    #[test]
    fn reversible() {
        let logp = Quadratic {
            dim: 2,
            support: None,
        };
        let mass = MassMatrix::new(Some(&[1., 2.][..]), 2).unwrap();
        let bounds = FlatBounds::unbounded(2);
        let leapfrog = Leapfrog::new(&mass, &bounds);

        let mut point = PhasePoint::init(&logp, &[0.5, -1.]).unwrap();
        point.momentum.copy_from_slice(&[0.3, 0.7]);
        let start = point.clone();

        leapfrog.trajectory(&logp, &mut point, 0.1, 15).unwrap();
        point.momentum.iter_mut().for_each(|p| *p = -*p);
        leapfrog.trajectory(&logp, &mut point, 0.1, 15).unwrap();

        for (a, b) in point.position.iter().zip(start.position.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-10);
        }
        for (a, b) in point.momentum.iter().zip(start.momentum.iter()) {
            assert_relative_eq!(-a, b, epsilon = 1e-10);
        }
    }

    #[test]
    fn reflects_at_bounds() {
        // Flat density inside the box, so the momentum is only changed by the wall.
        struct Flat;
        impl LogpFunc for Flat {
            fn logp(&self, _position: &[f64], gradient: &mut [f64]) -> Result<f64> {
                gradient.fill(0.);
                Ok(0.)
            }
            fn dim(&self) -> usize {
                1
            }
        }

        let layout = ParameterLayout::new([("x", 1)]);
        let mut table = BoundTable::new();
        table.insert("x", vec![0.], vec![1.]);
        let bounds = FlatBounds::new(&layout, &table).unwrap();
        let mass = MassMatrix::Unit;
        let leapfrog = Leapfrog::new(&mass, &bounds);

        let mut point = PhasePoint::init(&Flat, &[0.8]).unwrap();
        point.momentum[0] = 1.;
        leapfrog.trajectory(&Flat, &mut point, 0.5, 1).unwrap();

        assert_relative_eq!(point.position[0], 0.7, epsilon = 1e-12);
        assert_eq!(point.momentum[0], -1.);
        assert_eq!(point.velocity[0], -1.);
    }

    #[test]
    fn degenerate_density_runs_all_steps() {
        let logp = Quadratic {
            dim: 1,
            support: Some((-0.1, 0.1)),
        };
        let mass = MassMatrix::Unit;
        let bounds = FlatBounds::unbounded(1);
        let leapfrog = Leapfrog::new(&mass, &bounds);

        let mut point = PhasePoint::init(&logp, &[0.]).unwrap();
        point.momentum[0] = 10.;
        leapfrog.trajectory(&logp, &mut point, 0.1, 10).unwrap();
        assert_eq!(point.log_pdf, f64::NEG_INFINITY);
        assert_eq!(energy_change(0., point.energy()), f64::INFINITY);
    }
}

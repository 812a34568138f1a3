//! Box constraints and the reflection of trajectories at their walls.

use std::collections::HashMap;

use crate::{
    error::{HmcError, Result},
    position::{ParameterId, ParameterLayout},
};

/// Fold `x` back into `[lower, upper]`.
///
/// Returns the reflected value and whether the conjugate momentum has to be
/// negated. Values inside the interval, including the end points, are
/// returned unchanged. Excursions of any length are folded in one step by
/// reducing the offset modulo the reflection period `2 * (upper - lower)`.
///
/// If only one of the bounds is finite, `x` is mirrored at that wall. An
/// empty interval (`lower >= upper`, or a NaN bound) leaves `x` unchanged.
pub fn reflect(x: f64, lower: f64, upper: f64) -> (f64, bool) {
    if (lower <= x) & (x <= upper) {
        return (x, false);
    }
    if !(lower < upper) {
        return (x, false);
    }

    let width = upper - lower;
    if !width.is_finite() {
        return if x < lower {
            (2. * lower - x, true)
        } else if x > upper {
            (2. * upper - x, true)
        } else {
            // x is nan
            (x, false)
        };
    }

    let period = 2. * width;
    let offset = (x - lower).rem_euclid(period);
    if offset <= width {
        ((lower + offset).clamp(lower, upper), false)
    } else {
        ((lower + period - offset).clamp(lower, upper), true)
    }
}

/// Lower and upper bounds for a subset of the parameters, as collected from
/// constrained priors.
#[derive(Debug, Clone, Default)]
pub struct BoundTable {
    bounds: HashMap<ParameterId, (Box<[f64]>, Box<[f64]>)>,
}

impl BoundTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound every coordinate of `id`. `lower` and `upper` need one entry per coordinate.
    pub fn insert(
        &mut self,
        id: impl Into<ParameterId>,
        lower: impl Into<Box<[f64]>>,
        upper: impl Into<Box<[f64]>>,
    ) {
        self.bounds.insert(id.into(), (lower.into(), upper.into()));
    }

    pub fn get(&self, id: &ParameterId) -> Option<(&[f64], &[f64])> {
        self.bounds
            .get(id)
            .map(|(lower, upper)| (&lower[..], &upper[..]))
    }

    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Interval {
    pub(crate) lower: f64,
    pub(crate) upper: f64,
}

/// Bounds per flat coordinate, in the canonical layout.
#[derive(Debug, Clone)]
pub(crate) struct FlatBounds {
    bounds: Box<[Option<Interval>]>,
    any_bounded: bool,
}

impl FlatBounds {
    pub(crate) fn unbounded(dim: usize) -> Self {
        FlatBounds {
            bounds: vec![None; dim].into(),
            any_bounded: false,
        }
    }

    pub(crate) fn new(layout: &ParameterLayout, table: &BoundTable) -> Result<Self> {
        let mut bounds = vec![None; layout.dim()];

        for (id, (lower, upper)) in table.bounds.iter() {
            let range = layout
                .range(id)
                .ok_or_else(|| HmcError::UnknownParameter(id.clone()))?;
            for values in [lower, upper] {
                if values.len() != range.len() {
                    return Err(HmcError::DimensionMismatch {
                        id: id.clone(),
                        expected: range.len(),
                        found: values.len(),
                    });
                }
            }

            for (index, ((&lower, &upper), out)) in lower
                .iter()
                .zip(upper.iter())
                .zip(bounds[range].iter_mut())
                .enumerate()
            {
                // Also rejects nan
                if !(lower < upper) {
                    return Err(HmcError::InvalidBounds {
                        id: id.clone(),
                        index,
                        lower,
                        upper,
                    });
                }
                if lower.is_finite() | upper.is_finite() {
                    *out = Some(Interval { lower, upper });
                }
            }
        }

        let any_bounded = bounds.iter().any(Option::is_some);
        Ok(FlatBounds {
            bounds: bounds.into(),
            any_bounded,
        })
    }

    pub(crate) fn is_bounded(&self) -> bool {
        self.any_bounded
    }

    /// Reflect all bounded coordinates of `position` into range and negate the
    /// momentum wherever a reflection requires it.
    pub(crate) fn apply(&self, position: &mut [f64], momentum: &mut [f64]) {
        if !self.any_bounded {
            return;
        }
        assert!(position.len() == self.bounds.len());
        assert!(momentum.len() == self.bounds.len());

        for ((x, p), bound) in position
            .iter_mut()
            .zip(momentum.iter_mut())
            .zip(self.bounds.iter())
        {
            let Some(Interval { lower, upper }) = *bound else {
                continue;
            };
            let (reflected, negate) = reflect(*x, lower, upper);
            *x = reflected;
            if negate {
                *p = -*p;
            }
        }
    }
}

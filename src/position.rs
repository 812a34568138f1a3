//! Keyed parameter vectors and the canonical flat layout.
//!
//! The posterior hands out positions and gradients as a mapping from
//! parameter identifier to a vector, while the integrator works on one flat
//! slice. [`ParameterLayout`] fixes the order of the identifiers once and
//! converts between both representations.

use std::{
    collections::HashMap,
    fmt::{self, Display},
    ops::Range,
    sync::Arc,
};

use itertools::Itertools;

use crate::{
    error::{HmcError, Result},
    math::vector_dot,
};

/// The name of one block of the parameter space, eg a vector valued variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParameterId(Arc<str>);

impl ParameterId {
    pub fn new(name: impl AsRef<str>) -> Self {
        ParameterId(name.as_ref().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParameterId {
    fn from(value: &str) -> Self {
        ParameterId::new(value)
    }
}

impl From<String> for ParameterId {
    fn from(value: String) -> Self {
        ParameterId(value.into())
    }
}

#[derive(Debug, Clone, PartialEq)]
struct LayoutEntry {
    id: ParameterId,
    offset: usize,
    dim: usize,
}

/// Ordered identifiers with their dimensions.
///
/// Cloning is cheap, all clones share the same entries.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterLayout {
    entries: Arc<[LayoutEntry]>,
    dim: usize,
}

impl ParameterLayout {
    /// Create a layout from `(identifier, dimension)` pairs in canonical order.
    ///
    /// # Panics
    ///
    /// If an identifier appears more than once.
    pub fn new<I, K>(parameters: I) -> Self
    where
        I: IntoIterator<Item = (K, usize)>,
        K: Into<ParameterId>,
    {
        let mut offset = 0;
        let entries: Vec<LayoutEntry> = parameters
            .into_iter()
            .map(|(id, dim)| {
                let entry = LayoutEntry {
                    id: id.into(),
                    offset,
                    dim,
                };
                offset += dim;
                entry
            })
            .collect();
        assert!(
            entries.iter().map(|entry| &entry.id).all_unique(),
            "Duplicate parameter in layout"
        );
        ParameterLayout {
            entries: entries.into(),
            dim: offset,
        }
    }

    /// Total number of flat coordinates.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of parameter blocks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParameterId, usize)> + '_ {
        self.entries.iter().map(|entry| (&entry.id, entry.dim))
    }

    /// The slice of the flat vector that belongs to `id`.
    pub fn range(&self, id: &ParameterId) -> Option<Range<usize>> {
        self.entries
            .iter()
            .find(|entry| &entry.id == id)
            .map(|entry| entry.offset..entry.offset + entry.dim)
    }

    /// Check that `position` has exactly the identifiers and dimensions of the layout.
    pub fn check(&self, position: &Position) -> Result<()> {
        for entry in self.entries.iter() {
            let values = position
                .get(&entry.id)
                .ok_or_else(|| HmcError::MissingParameter(entry.id.clone()))?;
            if values.len() != entry.dim {
                return Err(HmcError::DimensionMismatch {
                    id: entry.id.clone(),
                    expected: entry.dim,
                    found: values.len(),
                });
            }
        }
        if let Some(unknown) = position.ids().find(|id| self.range(id).is_none()) {
            return Err(HmcError::UnknownParameter(unknown.clone()));
        }
        Ok(())
    }

    pub fn flatten(&self, position: &Position) -> Result<Box<[f64]>> {
        let mut out = vec![0f64; self.dim];
        self.flatten_into(position, &mut out)?;
        Ok(out.into())
    }

    /// Write `position` into `out` in canonical order.
    pub fn flatten_into(&self, position: &Position, out: &mut [f64]) -> Result<()> {
        if out.len() != self.dim {
            return Err(HmcError::LengthMismatch {
                expected: self.dim,
                found: out.len(),
            });
        }
        self.check(position)?;
        for entry in self.entries.iter() {
            if let Some(values) = position.get(&entry.id) {
                out[entry.offset..entry.offset + entry.dim].copy_from_slice(values);
            }
        }
        Ok(())
    }

    pub fn unflatten(&self, flat: &[f64]) -> Result<Position> {
        if flat.len() != self.dim {
            return Err(HmcError::LengthMismatch {
                expected: self.dim,
                found: flat.len(),
            });
        }
        let values = self
            .entries
            .iter()
            .map(|entry| {
                let values: Box<[f64]> = flat[entry.offset..entry.offset + entry.dim].into();
                (entry.id.clone(), values)
            })
            .collect();
        Ok(Position { values })
    }
}

/// A point in parameter space, or a momentum, or a gradient.
///
/// Two positions are compatible if they have the same identifiers and the
/// same dimension for each identifier. All binary operations fail with a
/// dimension mismatch error otherwise.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Position {
    values: HashMap<ParameterId, Box<[f64]>>,
}

impl Position {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the values of one parameter, returning the previous values.
    pub fn insert(
        &mut self,
        id: impl Into<ParameterId>,
        values: impl Into<Box<[f64]>>,
    ) -> Option<Box<[f64]>> {
        self.values.insert(id.into(), values.into())
    }

    pub fn get(&self, id: &ParameterId) -> Option<&[f64]> {
        self.values.get(id).map(|values| &values[..])
    }

    pub fn get_mut(&mut self, id: &ParameterId) -> Option<&mut [f64]> {
        self.values.get_mut(id).map(|values| &mut values[..])
    }

    pub fn ids(&self) -> impl Iterator<Item = &ParameterId> + '_ {
        self.values.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParameterId, &[f64])> + '_ {
        self.values.iter().map(|(id, values)| (id, &values[..]))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_compatible(&self, other: &Position) -> bool {
        self.check_compatible(other).is_ok()
    }

    fn check_compatible(&self, other: &Position) -> Result<()> {
        for (id, values) in self.values.iter() {
            let other_values = other
                .values
                .get(id)
                .ok_or_else(|| HmcError::MissingParameter(id.clone()))?;
            if values.len() != other_values.len() {
                return Err(HmcError::DimensionMismatch {
                    id: id.clone(),
                    expected: values.len(),
                    found: other_values.len(),
                });
            }
        }
        if let Some(id) = other.ids().find(|id| !self.values.contains_key(*id)) {
            return Err(HmcError::UnknownParameter(id.clone()));
        }
        Ok(())
    }

    fn zip_with(&self, other: &Position, func: impl Fn(f64, f64) -> f64) -> Result<Position> {
        self.check_compatible(other)?;
        let values = self
            .values
            .iter()
            .map(|(id, values)| {
                let other_values = &other.values[id];
                let combined: Box<[f64]> = values
                    .iter()
                    .zip(other_values.iter())
                    .map(|(&a, &b)| func(a, b))
                    .collect();
                (id.clone(), combined)
            })
            .collect();
        Ok(Position { values })
    }

    pub fn add(&self, other: &Position) -> Result<Position> {
        self.zip_with(other, |a, b| a + b)
    }

    pub fn sub(&self, other: &Position) -> Result<Position> {
        self.zip_with(other, |a, b| a - b)
    }

    /// Elementwise (Hadamard) product.
    pub fn hadamard(&self, other: &Position) -> Result<Position> {
        self.zip_with(other, |a, b| a * b)
    }

    pub fn scale(&self, factor: f64) -> Position {
        let values = self
            .values
            .iter()
            .map(|(id, values)| {
                let scaled: Box<[f64]> = values.iter().map(|val| val * factor).collect();
                (id.clone(), scaled)
            })
            .collect();
        Position { values }
    }

    pub fn dot(&self, other: &Position) -> Result<f64> {
        self.check_compatible(other)?;
        Ok(self
            .values
            .iter()
            .map(|(id, values)| vector_dot(values, &other.values[id]))
            .sum())
    }
}

impl<K, V> FromIterator<(K, V)> for Position
where
    K: Into<ParameterId>,
    V: Into<Box<[f64]>>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let values = iter
            .into_iter()
            .map(|(id, values)| (id.into(), values.into()))
            .collect();
        Position { values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn layout() -> ParameterLayout {
        ParameterLayout::new([("mu", 2), ("sigma", 1)])
    }

    fn position(mu: [f64; 2], sigma: f64) -> Position {
        [("mu", mu.to_vec()), ("sigma", vec![sigma])]
            .into_iter()
            .collect()
    }

    #[test]
    fn flatten_uses_canonical_order() {
        let layout = layout();
        assert_eq!(layout.dim(), 3);
        assert_eq!(layout.range(&"sigma".into()), Some(2..3));

        let pos = position([1., 2.], 3.);
        let flat = layout.flatten(&pos).unwrap();
        assert_eq!(&flat[..], &[1., 2., 3.]);
        assert_eq!(layout.unflatten(&flat).unwrap(), pos);
    }

    #[test]
    fn flatten_rejects_mismatched_positions() {
        let layout = layout();

        let short: Position = [("mu", vec![1.]), ("sigma", vec![1.])].into_iter().collect();
        assert!(matches!(
            layout.flatten(&short),
            Err(HmcError::DimensionMismatch { expected: 2, found: 1, .. })
        ));

        let missing: Position = [("mu", vec![1., 2.])].into_iter().collect();
        assert!(matches!(
            layout.flatten(&missing),
            Err(HmcError::MissingParameter(id)) if id.as_str() == "sigma"
        ));

        let mut extra = position([1., 2.], 3.);
        extra.insert("tau", vec![0.5]);
        let err = layout.flatten(&extra).unwrap_err();
        assert!(err.is_dimension_mismatch());
        assert!(matches!(err, HmcError::UnknownParameter(id) if id.as_str() == "tau"));

        assert!(matches!(
            layout.unflatten(&[1., 2.]),
            Err(HmcError::LengthMismatch { expected: 3, found: 2 })
        ));
    }

    #[test]
    fn position_algebra() {
        let a = position([1., 2.], 3.);
        let b = position([4., 5.], 6.);

        assert_eq!(a.add(&b).unwrap(), position([5., 7.], 9.));
        assert_eq!(b.sub(&a).unwrap(), position([3., 3.], 3.));
        assert_eq!(a.hadamard(&b).unwrap(), position([4., 10.], 18.));
        assert_eq!(a.scale(2.), position([2., 4.], 6.));
        assert_eq!(a.dot(&b).unwrap(), 4. + 10. + 18.);
    }

    #[test]
    fn incompatible_positions() {
        let a = position([1., 2.], 3.);
        let b: Position = [("mu", vec![1., 2., 3.]), ("sigma", vec![1.])]
            .into_iter()
            .collect();
        assert!(!a.is_compatible(&b));
        assert!(a.add(&b).unwrap_err().is_dimension_mismatch());

        let c: Position = [("mu", vec![1., 2.])].into_iter().collect();
        assert!(matches!(a.dot(&c), Err(HmcError::MissingParameter(_))));
        assert!(matches!(c.dot(&a), Err(HmcError::UnknownParameter(_))));
    }

    #[test]
    #[should_panic(expected = "Duplicate parameter")]
    fn duplicate_layout_entries() {
        ParameterLayout::new([("a", 1), ("a", 2)]);
    }
}

//! Spectral index registry
//!
//! Indices are data: a name, a [`Formula`] over the standard band names
//! (`BLUE`, `GREEN`, `RED`, `NIR`, `SSWIR`, `LSWIR`), a display range and
//! the direction in which the index moves over a burn scar. The delta and
//! classifier stages only ever look indices up by name.

use std::collections::BTreeMap;

use firescar_core::{Error, Image, Raster, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::formula::Formula;

/// Indices computed when a run does not name its own
pub const DEFAULT_INDICES: [&str; 5] = ["NDVI", "MIRBI", "NBR", "NBR4", "BAI"];

/// How an index changes from pre-fire to post-fire over burned ground
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BurnDirection {
    /// Burn lowers the index; burned iff `delta < threshold`
    #[default]
    Decrease,
    /// Burn raises the index; burned iff `delta > threshold`
    Increase,
}

/// A named spectral index
#[derive(Debug, Clone)]
pub struct IndexDefinition {
    pub name: String,
    pub formula: Formula,
    /// Typical `(min, max)` for display
    pub display_range: (f64, f64),
    pub burn_direction: BurnDirection,
}

impl IndexDefinition {
    /// Parse `formula` into a new definition
    pub fn new(
        name: impl Into<String>,
        formula: &str,
        display_range: (f64, f64),
        burn_direction: BurnDirection,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            formula: Formula::parse(formula)?,
            display_range,
            burn_direction,
        })
    }

    /// Evaluate on a composite
    pub fn compute(&self, composite: &Image) -> Result<Raster<f64>> {
        self.formula.apply(composite)
    }
}

/// Name → index lookup with aliases
#[derive(Debug, Clone)]
pub struct IndexRegistry {
    entries: BTreeMap<String, IndexDefinition>,
    aliases: BTreeMap<String, String>,
}

// (name, formula, display range, direction)
const BUILTIN: [(&str, &str, (f64, f64), BurnDirection); 14] = [
    ("RED", "RED", (0.0, 0.3), BurnDirection::Decrease),
    ("GREEN", "GREEN", (0.0, 0.3), BurnDirection::Decrease),
    ("BLUE", "BLUE", (0.0, 0.3), BurnDirection::Decrease),
    ("NDVI", "(NIR - RED) / (NIR + RED)", (-1.0, 1.0), BurnDirection::Decrease),
    (
        "EVI",
        "2.5 * (NIR - RED) / (NIR + 6 * RED - 7.5 * BLUE + 1)",
        (-1.0, 1.0),
        BurnDirection::Decrease,
    ),
    ("SAVI", "0.5 * (NIR - RED) / (NIR + RED + 0.5)", (-1.0, 1.0), BurnDirection::Decrease),
    ("MSI", "SSWIR / NIR", (0.0, 3.0), BurnDirection::Increase),
    ("MIRBI", "10 * SSWIR - 9.8 * LSWIR + 2", (1.0, 4.0), BurnDirection::Increase),
    ("BR", "NIR / LSWIR", (0.0, 5.0), BurnDirection::Decrease),
    ("NBR", "(NIR - LSWIR) / (NIR + LSWIR)", (-1.0, 1.0), BurnDirection::Decrease),
    ("NBR2", "2 * NIR / (SSWIR + LSWIR)", (0.0, 2.0), BurnDirection::Decrease),
    ("NBR3", "(SSWIR - LSWIR) / (SSWIR + LSWIR)", (-1.0, 1.0), BurnDirection::Decrease),
    (
        "NBR4",
        "(NIR - LSWIR) / (((NIR + LSWIR) * GREEN) + 1)",
        (-0.5, 0.5),
        BurnDirection::Decrease,
    ),
    (
        "BAI",
        "1 / ((0.1 - RED) ** 2 + (0.06 - NIR) ** 2)",
        (0.0, 500.0),
        BurnDirection::Increase,
    ),
];

impl IndexRegistry {
    /// Registry with no indices
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
            aliases: BTreeMap::new(),
        }
    }

    /// Registry with the built-in indices and the `NBR1` alias for `NBR`
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for (name, formula, range, direction) in BUILTIN {
            match IndexDefinition::new(name, formula, range, direction) {
                Ok(def) => registry.insert(def),
                Err(e) => debug_assert!(false, "built-in index {} does not parse: {}", name, e),
            }
        }
        registry.aliases.insert("NBR1".into(), "NBR".into());
        registry
    }

    /// Add or replace an index
    pub fn insert(&mut self, definition: IndexDefinition) {
        self.aliases.remove(&definition.name);
        self.entries.insert(definition.name.clone(), definition);
    }

    /// Parse and add a custom index
    pub fn register(
        &mut self,
        name: &str,
        formula: &str,
        burn_direction: BurnDirection,
    ) -> Result<()> {
        let def = IndexDefinition::new(name, formula, (-1.0, 1.0), burn_direction)?;
        debug!(index = name, formula, "registered custom index");
        self.insert(def);
        Ok(())
    }

    /// Make `alias` resolve to the existing index `target`
    pub fn alias(&mut self, alias: &str, target: &str) -> Result<()> {
        let target = self.resolve(target)?.name.clone();
        self.aliases.insert(alias.to_string(), target);
        Ok(())
    }

    fn resolve(&self, name: &str) -> Result<&IndexDefinition> {
        let key = self.aliases.get(name).map(String::as_str).unwrap_or(name);
        self.entries.get(key).ok_or_else(|| Error::InvalidParameter {
            name: "index",
            value: name.to_string(),
            reason: format!("unknown index; available: {}", self.names().join(", ")),
        })
    }

    /// Look up an index by name or alias
    pub fn get(&self, name: &str) -> Result<&IndexDefinition> {
        self.resolve(name)
    }

    /// Whether `name` is a known index or alias
    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_ok()
    }

    /// Index names (aliases excluded), sorted
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Registered aliases as `(alias, target)`
    pub fn aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases.iter().map(|(a, t)| (a.as_str(), t.as_str()))
    }

    /// All definitions, sorted by name
    pub fn iter(&self) -> impl Iterator<Item = &IndexDefinition> {
        self.entries.values()
    }
}

impl Default for IndexRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Compute the requested indices on a composite.
///
/// The output holds exactly one band per requested name, named as requested
/// (an alias keeps the alias as band name), in request order.
pub fn compute_indices<S: AsRef<str>>(
    registry: &IndexRegistry,
    composite: &Image,
    names: &[S],
) -> Result<Image> {
    let mut out = Image::new();
    for name in names {
        let name = name.as_ref();
        let band = registry.get(name)?.compute(composite)?;
        out.push_band(name, band)?;
    }
    debug!(count = out.len(), "computed indices");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn composite() -> Image {
        let bands = [
            ("BLUE", 0.05),
            ("GREEN", 0.08),
            ("RED", 0.06),
            ("NIR", 0.30),
            ("SSWIR", 0.20),
            ("LSWIR", 0.12),
        ];
        Image::from_bands(bands.iter().map(|&(n, v)| (n, Raster::filled(2, 2, v)))).unwrap()
    }

    #[test]
    fn test_all_builtins_parse_and_evaluate() {
        let registry = IndexRegistry::builtin();
        assert_eq!(registry.names().len(), BUILTIN.len());
        let img = composite();
        for def in registry.iter() {
            let v = def.compute(&img).unwrap().get(0, 0).unwrap();
            assert!(v.is_finite(), "{} gave {}", def.name, v);
        }
    }

    #[test]
    fn test_builtin_values() {
        let registry = IndexRegistry::builtin();
        let img = composite();
        let value = |name: &str| registry.get(name).unwrap().compute(&img).unwrap().get(1, 1).unwrap();

        assert_relative_eq!(value("NDVI"), 0.24 / 0.36, epsilon = 1e-12);
        assert_relative_eq!(value("NBR"), 0.18 / 0.42, epsilon = 1e-12);
        assert_relative_eq!(value("MIRBI"), 10.0 * 0.2 - 9.8 * 0.12 + 2.0, epsilon = 1e-12);
        assert_relative_eq!(value("MSI"), 0.2 / 0.3, epsilon = 1e-12);
        assert_relative_eq!(
            value("BAI"),
            1.0 / ((0.1f64 - 0.06).powi(2) + (0.06f64 - 0.30).powi(2)),
            epsilon = 1e-9
        );
        assert_relative_eq!(value("SAVI"), 0.5 * 0.24 / (0.36 + 0.5), epsilon = 1e-12);
        assert_relative_eq!(value("RED"), 0.06);
    }

    #[test]
    fn test_alias_resolves_and_keeps_requested_name() {
        let registry = IndexRegistry::builtin();
        let out = compute_indices(&registry, &composite(), &["NBR1", "NBR"]).unwrap();
        assert_eq!(out.band_names(), &["NBR1".to_string(), "NBR".to_string()]);
        assert_relative_eq!(
            out.band("NBR1").unwrap().get(0, 0).unwrap(),
            out.band("NBR").unwrap().get(0, 0).unwrap()
        );
    }

    #[test]
    fn test_compute_is_idempotent() {
        let registry = IndexRegistry::builtin();
        let img = composite();
        let a = compute_indices(&registry, &img, &DEFAULT_INDICES).unwrap();
        let b = compute_indices(&registry, &img, &DEFAULT_INDICES).unwrap();
        for ((_, x), (_, y)) in a.iter().zip(b.iter()) {
            assert_eq!(x.data(), y.data());
        }
        assert_eq!(a.len(), DEFAULT_INDICES.len());
    }

    #[test]
    fn test_burn_directions() {
        let registry = IndexRegistry::builtin();
        assert_eq!(registry.get("NDVI").unwrap().burn_direction, BurnDirection::Decrease);
        assert_eq!(registry.get("BAI").unwrap().burn_direction, BurnDirection::Increase);
        assert_eq!(registry.get("MIRBI").unwrap().burn_direction, BurnDirection::Increase);
    }

    #[test]
    fn test_custom_index() {
        let mut registry = IndexRegistry::builtin();
        registry.register("GNDVI", "(NIR - GREEN) / (NIR + GREEN)", BurnDirection::Decrease).unwrap();
        let v = registry.get("GNDVI").unwrap().compute(&composite()).unwrap().get(0, 0).unwrap();
        assert_relative_eq!(v, 0.22 / 0.38, epsilon = 1e-12);

        assert!(registry.register("BAD", "NIR +", BurnDirection::Decrease).is_err());
        assert!(registry.get("NOPE").is_err());
    }

    #[test]
    fn test_zero_denominator_is_nan() {
        let img = Image::from_bands([("NIR", Raster::filled(1, 1, 0.0)), ("RED", Raster::filled(1, 1, 0.0))]).unwrap();
        let v = IndexRegistry::builtin().get("NDVI").unwrap().compute(&img).unwrap();
        assert!(v.get(0, 0).unwrap().is_nan());
    }
}

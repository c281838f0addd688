//! Metadata attached to meshes, iterations and series.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::internal_prelude::*;

/// One of the seven SI base quantities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BaseUnit {
    /// Length (m).
    L = 0,
    /// Mass (kg).
    M = 1,
    /// Time (s).
    T = 2,
    /// Electric current (A).
    I = 3,
    /// Thermodynamic temperature (K).
    Theta = 4,
    /// Amount of substance (mol).
    N = 5,
    /// Luminous intensity (cd).
    J = 6,
}

impl BaseUnit {
    pub const ALL: [Self; 7] =
        [Self::L, Self::M, Self::T, Self::I, Self::Theta, Self::N, Self::J];

    pub fn symbol(self) -> &'static str {
        match self {
            Self::L => "m",
            Self::M => "kg",
            Self::T => "s",
            Self::I => "A",
            Self::Theta => "K",
            Self::N => "mol",
            Self::J => "cd",
        }
    }
}

/// Powers of the SI base quantities that make up the unit of a record.
///
/// ```text
/// UnitDimension::new().with(BaseUnit::L, 1.0).with(BaseUnit::M, 2.0)  =>  "m * kg^2"
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitDimension([f64; 7]);

impl UnitDimension {
    /// A dimensionless quantity.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, base: BaseUnit, exponent: f64) -> Self {
        self.0[base as usize] = exponent;
        self
    }

    pub fn exponent(&self, base: BaseUnit) -> f64 {
        self.0[base as usize]
    }

    pub fn exponents(&self) -> &[f64; 7] {
        &self.0
    }

    pub fn is_dimensionless(&self) -> bool {
        self.0.iter().all(|&e| e == 0.0)
    }
}

impl Display for UnitDimension {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_dimensionless() {
            return f.write_str("1");
        }
        let parts: Vec<String> = BaseUnit::ALL
            .iter()
            .filter(|&&base| self.exponent(base) != 0.0)
            .map(|&base| {
                // exponents are printed truncated to integers
                let exponent = self.exponent(base) as i64;
                if exponent == 1 {
                    base.symbol().to_owned()
                } else {
                    format!("{}^{}", base.symbol(), exponent)
                }
            })
            .collect();
        f.write_str(&parts.join(" * "))
    }
}

/// Geometry and units of a mesh record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshMeta {
    pub axis_labels: Vec<String>,
    pub grid_spacing: Vec<f64>,
    pub grid_global_offset: Vec<f64>,
    pub grid_unit_si: f64,
    /// Position of the sample within a cell, per axis, in `[0, 1]`.
    pub position: Vec<f64>,
    pub unit_si: f64,
    pub unit_dimension: UnitDimension,
    pub attributes: BTreeMap<String, Value>,
}

impl Default for MeshMeta {
    fn default() -> Self {
        Self {
            axis_labels: Vec::new(),
            grid_spacing: Vec::new(),
            grid_global_offset: Vec::new(),
            grid_unit_si: 1.0,
            position: Vec::new(),
            unit_si: 1.0,
            unit_dimension: UnitDimension::new(),
            attributes: BTreeMap::new(),
        }
    }
}

impl MeshMeta {
    /// Default metadata for an `ndim`-dimensional mesh: axes labelled from the fastest
    /// varying one (`"x"`) backwards, unit spacing, zero offset and cell-centered position.
    pub fn for_ndim(ndim: usize) -> Self {
        let labels = ["x", "y", "z"];
        let axis_labels = (0..ndim)
            .rev()
            .map(|i| labels.get(i).map_or_else(|| format!("axis{i}"), |s| (*s).to_owned()))
            .collect();
        Self {
            axis_labels,
            grid_spacing: vec![1.0; ndim],
            grid_global_offset: vec![0.0; ndim],
            position: vec![0.5; ndim],
            ..Self::default()
        }
    }

    /// Checks that every per-axis field is either unset or has `ndim` entries.
    pub fn validate(&self, ndim: usize) -> Result<()> {
        let fields = [
            ("axis_labels", self.axis_labels.len()),
            ("grid_spacing", self.grid_spacing.len()),
            ("grid_global_offset", self.grid_global_offset.len()),
            ("position", self.position.len()),
        ];
        for (name, len) in fields {
            ensure!(
                len == 0 || len == ndim,
                "mesh {} has {} entries, expected {}",
                name,
                len,
                ndim
            );
        }
        ensure!(self.grid_unit_si > 0.0, "grid unit SI must be positive: {}", self.grid_unit_si);
        Ok(())
    }

    /// Physical coordinate of the first grid point along `axis`, in SI units.
    pub fn origin_si(&self, axis: usize) -> Option<f64> {
        self.grid_global_offset.get(axis).map(|offset| offset * self.grid_unit_si)
    }

    /// Physical grid spacing along `axis`, in SI units.
    pub fn spacing_si(&self, axis: usize) -> Option<f64> {
        self.grid_spacing.get(axis).map(|spacing| spacing * self.grid_unit_si)
    }
}

/// Time and record metadata of one iteration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IterationMeta {
    pub time: f64,
    pub dt: f64,
    pub time_unit_si: f64,
    pub attributes: BTreeMap<String, Value>,
    pub meshes: BTreeMap<String, MeshMeta>,
}

impl Default for IterationMeta {
    fn default() -> Self {
        Self {
            time: 0.0,
            dt: 1.0,
            time_unit_si: 1.0,
            attributes: BTreeMap::new(),
            meshes: BTreeMap::new(),
        }
    }
}

/// Series-wide metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub software: Option<String>,
}

#[cfg(test)]
pub mod tests {
    use super::{BaseUnit, IterationMeta, MeshMeta, UnitDimension};

    #[test]
    pub fn test_unit_dimension() {
        assert_eq!(UnitDimension::new().to_string(), "1");
        let ud = UnitDimension::new().with(BaseUnit::L, 1.0).with(BaseUnit::M, 2.0);
        assert_eq!(ud.to_string(), "m * kg^2");
        assert_eq!(ud.exponent(BaseUnit::M), 2.0);

        let force = UnitDimension::new()
            .with(BaseUnit::L, 1.0)
            .with(BaseUnit::M, 1.0)
            .with(BaseUnit::T, -2.0);
        assert_eq!(force.to_string(), "m * kg * s^-2");
        assert_eq!(UnitDimension::new().with(BaseUnit::Theta, 1.0).to_string(), "K");

        let json = serde_json::to_string(&force).unwrap();
        assert_eq!(json, "[1.0,1.0,-2.0,0.0,0.0,0.0,0.0]");
    }

    #[test]
    pub fn test_mesh_meta() {
        let mesh = MeshMeta::for_ndim(2);
        assert_eq!(mesh.axis_labels, vec!["y", "x"]);
        assert_eq!(mesh.position, vec![0.5, 0.5]);
        mesh.validate(2).unwrap();
        assert_err!(mesh.validate(3), "mesh axis_labels has 2 entries, expected 3");

        let mut mesh = MeshMeta::default();
        mesh.validate(5).unwrap();
        mesh.grid_spacing = vec![0.5, 0.25];
        mesh.grid_global_offset = vec![1.0, 2.0];
        mesh.grid_unit_si = 1e-3;
        assert_eq!(mesh.spacing_si(1), Some(0.25e-3));
        assert_eq!(mesh.origin_si(0), Some(1e-3));
        assert_eq!(mesh.origin_si(2), None);

        mesh.grid_unit_si = 0.0;
        assert_err!(mesh.validate(2), "grid unit SI must be positive");

        let labels = MeshMeta::for_ndim(4).axis_labels;
        assert_eq!(labels, vec!["axis3", "z", "y", "x"]);
    }

    #[test]
    pub fn test_iteration_meta_defaults() {
        let meta: IterationMeta = serde_json::from_str("{\"time\": 2.5}").unwrap();
        assert_eq!(meta.time, 2.5);
        assert_eq!(meta.dt, 1.0);
        assert!(meta.meshes.is_empty());
    }
}

//! Cut configuration.
//!
//! [`Options`] is built with [`OptionsBuilder`]; every field has a default, so
//! `OptionsBuilder::default().build()` is equivalent to [`Options::default`].
//!
//! # Examples
//!
//! ```rust
//! use xfem_cut::core::options::{IntegrationMode, OptionsBuilder};
//!
//! let options = OptionsBuilder::default()
//!     .point_tolerance(1e-9)
//!     .integration_mode(IntegrationMode::DirectDivergence)
//!     .build()
//!     .unwrap();
//! assert_eq!(options.volume_rule_degree, 2);
//! ```

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geometry::quadrature::MAX_DEGREE;

/// How quadrature rules on volume cells are generated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntegrationMode {
    /// Decompose every volume cell into tetrahedra.
    #[default]
    Tessellation,
    /// Integrate over the cell boundary using the divergence theorem.
    DirectDivergence,
}

impl fmt::Display for IntegrationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tessellation => write!(f, "tessellation"),
            Self::DirectDivergence => write!(f, "direct-divergence"),
        }
    }
}

/// How bilinear cutter quads are turned into cutting triangles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuadSplit {
    /// Two triangles along the 0–2 diagonal.
    #[default]
    Diagonal,
    /// Four triangles around the mean of the corners.
    CenterPoint,
}

/// Tolerances and switches of the cut pipeline.
#[derive(Builder, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[builder(build_fn(validate = "Self::check"))]
pub struct Options {
    /// Absolute distance below which points merge and lie on planes.
    #[builder(default = "1e-10")]
    pub point_tolerance: f64,
    /// Relative tolerance for volume and area comparisons.
    #[builder(default = "1e-8")]
    pub relative_tolerance: f64,
    /// Volume-cell quadrature strategy.
    #[builder(default)]
    pub integration_mode: IntegrationMode,
    /// Polynomial degree integrated exactly by volume-cell rules.
    #[builder(default = "2")]
    pub volume_rule_degree: usize,
    /// Polynomial degree integrated exactly by boundary-cell rules.
    #[builder(default = "2")]
    pub boundary_rule_degree: usize,
    /// Determine inside/outside positions of cells and nodes.
    #[builder(default = "true")]
    pub find_positions: bool,
    /// Create nodal DOF sets for inside regions as well.
    #[builder(default = "false")]
    pub include_inner: bool,
    /// Triangulation of bilinear cutter quads.
    #[builder(default)]
    pub quad_split: QuadSplit,
    /// Check volume conservation and facet closure after every cut.
    #[builder(default = "true")]
    pub validate: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            point_tolerance: 1e-10,
            relative_tolerance: 1e-8,
            integration_mode: IntegrationMode::Tessellation,
            volume_rule_degree: 2,
            boundary_rule_degree: 2,
            find_positions: true,
            include_inner: false,
            quad_split: QuadSplit::Diagonal,
            validate: true,
        }
    }
}

impl OptionsBuilder {
    fn check(&self) -> Result<(), String> {
        for (name, value) in [
            ("point_tolerance", self.point_tolerance),
            ("relative_tolerance", self.relative_tolerance),
        ] {
            match value {
                Some(value) if !(value.is_finite() && value > 0.0) => {
                    return Err(format!("{name} must be positive and finite, got {value}"));
                }
                _ => {}
            }
        }
        for (name, value) in [
            ("volume_rule_degree", self.volume_rule_degree),
            ("boundary_rule_degree", self.boundary_rule_degree),
        ] {
            match value {
                Some(value) if value > MAX_DEGREE => {
                    return Err(format!("{name} must not exceed {MAX_DEGREE}, got {value}"));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_match_default() {
        let built = OptionsBuilder::default().build().unwrap();
        assert_eq!(built, Options::default());
    }

    #[test]
    fn test_builder_rejects_invalid_tolerances() {
        assert!(OptionsBuilder::default().point_tolerance(0.0).build().is_err());
        assert!(OptionsBuilder::default().relative_tolerance(f64::NAN).build().is_err());
        assert!(OptionsBuilder::default().volume_rule_degree(MAX_DEGREE + 1).build().is_err());
        let err = OptionsBuilder::default().point_tolerance(-1.0).build().unwrap_err();
        assert!(err.to_string().contains("point_tolerance"));
    }

    #[test]
    fn test_builder_validate_switch_is_a_setter() {
        let options = OptionsBuilder::default().validate(false).build().unwrap();
        assert!(!options.validate);
        assert!(OptionsBuilder::default().validate(false).point_tolerance(0.0).build().is_err());
    }

    #[test]
    fn test_options_serde_roundtrip() {
        let options = OptionsBuilder::default()
            .include_inner(true)
            .quad_split(QuadSplit::CenterPoint)
            .build()
            .unwrap();
        let json = serde_json::to_string(&options).unwrap();
        let back: Options = serde_json::from_str(&json).unwrap();
        assert_eq!(back, options);
        assert_eq!(IntegrationMode::DirectDivergence.to_string(), "direct-divergence");
    }
}

//! Placer configuration knobs and their defaults.

use serde::{Deserialize, Serialize};

/// Configuration for the placement pipeline.
///
/// All knobs have working defaults; callers typically override only the grid
/// step and the symmetry-related thresholds. The struct deserializes from
/// TOML/JSON with every field optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacerParams {
    /// Initial wirelength multiplier for the hard-coded multiplier policy.
    pub lambda_hpwl_init: f64,
    /// Initial overlap-penalty multiplier for the hard-coded multiplier policy.
    pub lambda_ovl_init: f64,
    /// Initial out-of-boundary multiplier for the hard-coded multiplier policy.
    pub lambda_oob_init: f64,
    /// Initial asymmetry multiplier for the hard-coded multiplier policy.
    pub lambda_asym_init: f64,
    /// Ceiling for the overlap multiplier; overlap pressure may exceed the
    /// generic [`lambda_max`](Self::lambda_max).
    pub lambda_maxovl: f64,
    /// Overlap-area ratio (of total cell area) above which the overlap
    /// multiplier keeps growing.
    pub ovl_threshold: f64,
    /// Out-of-boundary area ratio (of boundary area) above which the
    /// out-of-boundary multiplier keeps growing.
    pub oob_threshold: f64,
    /// Asymmetry distance ratio (of the square root of total cell area)
    /// above which the asymmetry multiplier keeps growing.
    pub asym_threshold: f64,
    /// Relative-improvement floor for the inner first-order solve; doubles as
    /// the target of the smoothing-parameter decay schedule.
    pub alpha_decay_target: f64,
    /// Maximum number of outer (multiplier) iterations in global placement.
    pub max_outer_iter: usize,
    /// Maximum number of inner first-order iterations per outer iteration.
    pub max_inner_iter: usize,
    /// Ceiling for the out-of-boundary and asymmetry multipliers.
    pub lambda_max: f64,
    /// Extra whitespace granted to the placement region, as a fraction of
    /// total cell area.
    pub whitespace_ratio: f64,
    /// Spacing between consecutive ring pin sites.
    pub virtual_pin_interval: i64,
    /// How far the virtual-pin ring extends beyond the cell bounding box.
    pub virtual_boundary_extension: i64,
    /// Placement grid pitch; 0 disables grid alignment.
    pub grid_step: i64,
    /// Thread count handed to the LP backend.
    pub num_threads: usize,
    /// Start directly in tough mode (doubled multipliers, raised outer cap).
    pub tough_mode: bool,
    /// Seed for the initial random cell spreading.
    pub seed: u64,
    /// Weight of the synthetic nets realizing proximity groups.
    pub proximity_net_weight: f64,
    /// Whether ring pin sites are generated on the top and bottom edges in
    /// addition to the left and right edges.
    pub ring_top_bottom_sites: bool,
    /// Use the exact (single program) pin-assignment formulation instead of
    /// the fast sequential-matching path.
    pub exact_pin_assign: bool,
}

impl Default for PlacerParams {
    fn default() -> Self {
        Self {
            lambda_hpwl_init: 32.0,
            lambda_ovl_init: 4.0,
            lambda_oob_init: 1.0,
            lambda_asym_init: 16.0,
            lambda_maxovl: 5000.0,
            ovl_threshold: 0.08,
            oob_threshold: 0.05,
            asym_threshold: 0.5,
            alpha_decay_target: 0.05,
            max_outer_iter: 20,
            max_inner_iter: 200,
            lambda_max: 2048.0,
            whitespace_ratio: 0.2,
            virtual_pin_interval: 1000,
            virtual_boundary_extension: 1000,
            grid_step: 0,
            num_threads: 1,
            tough_mode: false,
            seed: 0,
            proximity_net_weight: 16.0,
            ring_top_bottom_sites: false,
            exact_pin_assign: false,
        }
    }
}

impl PlacerParams {
    /// Returns `true` when grid alignment is requested.
    pub fn has_grid_step(&self) -> bool {
        self.grid_step > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_constants() {
        let p = PlacerParams::default();
        assert_eq!(p.lambda_hpwl_init, 32.0);
        assert_eq!(p.lambda_ovl_init, 4.0);
        assert_eq!(p.lambda_oob_init, 1.0);
        assert_eq!(p.lambda_asym_init, 16.0);
        assert_eq!(p.lambda_maxovl, 5000.0);
        assert_eq!(p.ovl_threshold, 0.08);
        assert_eq!(p.oob_threshold, 0.05);
        assert_eq!(p.asym_threshold, 0.5);
        assert_eq!(p.alpha_decay_target, 0.05);
        assert_eq!(p.max_outer_iter, 20);
        assert_eq!(p.lambda_max, 2048.0);
        assert_eq!(p.whitespace_ratio, 0.2);
        assert_eq!(p.virtual_pin_interval, 1000);
        assert_eq!(p.virtual_boundary_extension, 1000);
    }

    #[test]
    fn grid_step_flag() {
        let mut p = PlacerParams::default();
        assert!(!p.has_grid_step());
        p.grid_step = 2;
        assert!(p.has_grid_step());
    }

    #[test]
    fn deserialize_partial_config() {
        let p: PlacerParams = serde_json::from_str(r#"{"grid_step": 4, "tough_mode": true}"#).unwrap();
        assert_eq!(p.grid_step, 4);
        assert!(p.tough_mode);
        // Everything else keeps its default
        assert_eq!(p.max_outer_iter, 20);
        assert_eq!(p.whitespace_ratio, 0.2);
    }
}

//! Differentiable penalty operators for the global-placement objective.
//!
//! Each operator family exposes a smoothed `value` and a scatter-add
//! `add_gradient` over the flat coordinate vector, plus an exact
//! (non-smoothed) violation measure used by the outer loop's stop test.
//! Operators store only indices into the vector; the vector itself is owned
//! by the enclosing problem.

use opal_db::PlaceDb;

/// Index layout of the flat optimization vector.
///
/// The vector holds the cell x block, then the cell y block, then one axis
/// variable per symmetry group.
#[derive(Clone, Copy, Debug)]
pub(crate) struct VarLayout {
    /// Number of cells.
    pub num_cells: usize,
    /// Number of symmetry groups (each contributes an axis variable).
    pub num_groups: usize,
}

impl VarLayout {
    /// Index of cell `i`'s x coordinate.
    pub fn x(&self, i: usize) -> usize {
        i
    }

    /// Index of cell `i`'s y coordinate.
    pub fn y(&self, i: usize) -> usize {
        self.num_cells + i
    }

    /// Index of symmetry group `g`'s axis variable.
    pub fn axis(&self, g: usize) -> usize {
        2 * self.num_cells + g
    }

    /// Total vector length.
    pub fn len(&self) -> usize {
        2 * self.num_cells + self.num_groups
    }
}

/// `ln(1 + e^z)` without overflow for large `|z|`.
fn softplus(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

/// The logistic function `1 / (1 + e^-z)` without overflow.
fn logistic(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// `alpha * ln(1 + e^(z/alpha))`, a smooth max(0, z) sharpening as alpha shrinks.
fn smooth_max_zero(z: f64, alpha: f64) -> f64 {
    alpha * softplus(z / alpha)
}

/// `alpha * ln(sum e^(v/alpha))`, shifted by the maximum for stability.
fn log_sum_exp(vals: &[f64], alpha: f64) -> f64 {
    let m = vals.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let sum: f64 = vals.iter().map(|&v| ((v - m) / alpha).exp()).sum();
    m + alpha * sum.ln()
}

/// Softmax weights `e^(v_i/alpha) / sum e^(v_j/alpha)` written into `out`.
fn softmax_weights(vals: &[f64], alpha: f64, out: &mut Vec<f64>) {
    let m = vals.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    out.clear();
    let mut sum = 0.0;
    for &v in vals {
        let w = ((v - m) / alpha).exp();
        sum += w;
        out.push(w);
    }
    for w in out.iter_mut() {
        *w /= sum;
    }
}

/// `-alpha * ln(sum e^(-v/alpha))`, a smooth minimum, with its weights.
///
/// Returns the smoothed minimum and fills `weights` with the softmin weight
/// of each input (the partial derivative of the result with respect to it).
fn smooth_min(vals: &[f64], alpha: f64, weights: &mut Vec<f64>) -> f64 {
    let m = vals.iter().cloned().fold(f64::INFINITY, f64::min);
    weights.clear();
    let mut sum = 0.0;
    for &v in vals {
        let w = (-(v - m) / alpha).exp();
        sum += w;
        weights.push(w);
    }
    for w in weights.iter_mut() {
        *w /= sum;
    }
    m - alpha * sum.ln()
}

/// Smoothed half-perimeter wirelength of one net.
pub(crate) struct HpwlOp {
    /// (cell index, pin offset x, pin offset y) per pin on the net.
    pins: Vec<(usize, f64, f64)>,
    /// Net weight.
    weight: f64,
}

impl HpwlOp {
    /// Log-sum-exp smoothed half-perimeter, scaled by the net weight.
    pub fn value(&self, p: &[f64], layout: &VarLayout, alpha: f64) -> f64 {
        let xs: Vec<f64> = self
            .pins
            .iter()
            .map(|&(c, ox, _)| p[layout.x(c)] + ox)
            .collect();
        let ys: Vec<f64> = self
            .pins
            .iter()
            .map(|&(c, _, oy)| p[layout.y(c)] + oy)
            .collect();
        let neg_xs: Vec<f64> = xs.iter().map(|&v| -v).collect();
        let neg_ys: Vec<f64> = ys.iter().map(|&v| -v).collect();
        self.weight
            * (log_sum_exp(&xs, alpha)
                + log_sum_exp(&neg_xs, alpha)
                + log_sum_exp(&ys, alpha)
                + log_sum_exp(&neg_ys, alpha))
    }

    /// Scatter-adds `scale` times the gradient of [`value`](Self::value) into `grad`.
    pub fn add_gradient(&self, p: &[f64], layout: &VarLayout, alpha: f64, scale: f64, grad: &mut [f64]) {
        let factor = scale * self.weight;
        let mut vals = Vec::with_capacity(self.pins.len());
        let mut w_hi = Vec::with_capacity(self.pins.len());
        let mut w_lo = Vec::with_capacity(self.pins.len());

        // x direction
        vals.clear();
        vals.extend(self.pins.iter().map(|&(c, ox, _)| p[layout.x(c)] + ox));
        softmax_weights(&vals, alpha, &mut w_hi);
        let neg: Vec<f64> = vals.iter().map(|&v| -v).collect();
        softmax_weights(&neg, alpha, &mut w_lo);
        for (k, &(c, _, _)) in self.pins.iter().enumerate() {
            grad[layout.x(c)] += factor * (w_hi[k] - w_lo[k]);
        }

        // y direction
        vals.clear();
        vals.extend(self.pins.iter().map(|&(c, _, oy)| p[layout.y(c)] + oy));
        softmax_weights(&vals, alpha, &mut w_hi);
        let neg: Vec<f64> = vals.iter().map(|&v| -v).collect();
        softmax_weights(&neg, alpha, &mut w_lo);
        for (k, &(c, _, _)) in self.pins.iter().enumerate() {
            grad[layout.y(c)] += factor * (w_hi[k] - w_lo[k]);
        }
    }
}

/// Smoothed pairwise overlap area between two cells.
pub(crate) struct OverlapOp {
    i: usize,
    j: usize,
    wi: f64,
    hi: f64,
    wj: f64,
    hj: f64,
}

impl OverlapOp {
    fn axis_terms(&self, p: &[f64], layout: &VarLayout) -> ([f64; 4], [f64; 4]) {
        let xi = p[layout.x(self.i)];
        let xj = p[layout.x(self.j)];
        let yi = p[layout.y(self.i)];
        let yj = p[layout.y(self.j)];
        // d1 = right edge of i past left edge of j; d2 the mirror image.
        // The true overlap length is min(d1, d2, wi, wj) clamped at zero.
        let dx = [xi + self.wi - xj, xj + self.wj - xi, self.wi, self.wj];
        let dy = [yi + self.hi - yj, yj + self.hj - yi, self.hi, self.hj];
        (dx, dy)
    }

    /// Smoothed overlap area.
    pub fn value(&self, p: &[f64], layout: &VarLayout, alpha: f64) -> f64 {
        let (dx, dy) = self.axis_terms(p, layout);
        let mut scratch = Vec::with_capacity(4);
        let mx = smooth_min(&dx, alpha, &mut scratch);
        let my = smooth_min(&dy, alpha, &mut scratch);
        smooth_max_zero(mx, alpha) * smooth_max_zero(my, alpha)
    }

    /// Scatter-adds `scale` times the gradient of the smoothed area into `grad`.
    pub fn add_gradient(&self, p: &[f64], layout: &VarLayout, alpha: f64, scale: f64, grad: &mut [f64]) {
        let (dx, dy) = self.axis_terms(p, layout);
        let mut qx = Vec::with_capacity(4);
        let mut qy = Vec::with_capacity(4);
        let mx = smooth_min(&dx, alpha, &mut qx);
        let my = smooth_min(&dy, alpha, &mut qy);
        let sx = smooth_max_zero(mx, alpha);
        let sy = smooth_max_zero(my, alpha);
        let sig_x = logistic(mx / alpha);
        let sig_y = logistic(my / alpha);

        // d(sx)/dxi = sigma(mx/alpha) * (q1 - q2), mirrored for xj
        let gx = scale * sy * sig_x * (qx[0] - qx[1]);
        grad[layout.x(self.i)] += gx;
        grad[layout.x(self.j)] -= gx;
        let gy = scale * sx * sig_y * (qy[0] - qy[1]);
        grad[layout.y(self.i)] += gy;
        grad[layout.y(self.j)] -= gy;
    }

    /// Exact (non-smoothed) overlap area at the current coordinates.
    pub fn exact_area(&self, p: &[f64], layout: &VarLayout) -> f64 {
        let (dx, dy) = self.axis_terms(p, layout);
        let ox = dx.iter().cloned().fold(f64::INFINITY, f64::min).max(0.0);
        let oy = dy.iter().cloned().fold(f64::INFINITY, f64::min).max(0.0);
        ox * oy
    }
}

/// Smoothed out-of-boundary penalty for one cell.
pub(crate) struct OobOp {
    cell: usize,
    w: f64,
    h: f64,
    xlo: f64,
    ylo: f64,
    xhi: f64,
    yhi: f64,
}

impl OobOp {
    /// Smoothed distance of the cell outside each boundary edge.
    pub fn value(&self, p: &[f64], layout: &VarLayout, alpha: f64) -> f64 {
        let x = p[layout.x(self.cell)];
        let y = p[layout.y(self.cell)];
        smooth_max_zero(self.xlo - x, alpha)
            + smooth_max_zero(x + self.w - self.xhi, alpha)
            + smooth_max_zero(self.ylo - y, alpha)
            + smooth_max_zero(y + self.h - self.yhi, alpha)
    }

    /// Scatter-adds `scale` times the gradient into `grad`.
    pub fn add_gradient(&self, p: &[f64], layout: &VarLayout, alpha: f64, scale: f64, grad: &mut [f64]) {
        let x = p[layout.x(self.cell)];
        let y = p[layout.y(self.cell)];
        grad[layout.x(self.cell)] += scale
            * (logistic((x + self.w - self.xhi) / alpha) - logistic((self.xlo - x) / alpha));
        grad[layout.y(self.cell)] += scale
            * (logistic((y + self.h - self.yhi) / alpha) - logistic((self.ylo - y) / alpha));
    }

    /// Exact cell area lying outside the boundary.
    pub fn exact_area(&self, p: &[f64], layout: &VarLayout) -> f64 {
        let x = p[layout.x(self.cell)];
        let y = p[layout.y(self.cell)];
        let inside_x = (x + self.w).min(self.xhi) - x.max(self.xlo);
        let inside_y = (y + self.h).min(self.yhi) - y.max(self.ylo);
        self.w * self.h - inside_x.max(0.0) * inside_y.max(0.0)
    }
}

/// Quadratic asymmetry penalty for one symmetry group.
///
/// The group's axis is itself an optimization variable; pairs pull their
/// mirrored centers onto it and self-symmetric cells pull their center x
/// onto it.
pub(crate) struct AsymOp {
    group: usize,
    /// (cell a, cell b, width a, width b) per mirrored pair.
    pairs: Vec<(usize, usize, f64, f64)>,
    /// (cell, width) per self-symmetric cell.
    selfs: Vec<(usize, f64)>,
}

impl AsymOp {
    /// Quadratic asymmetry penalty.
    pub fn value(&self, p: &[f64], layout: &VarLayout) -> f64 {
        let s = p[layout.axis(self.group)];
        let mut total = 0.0;
        for &(a, b, wa, wb) in &self.pairs {
            let t = p[layout.x(a)] + wa / 2.0 + p[layout.x(b)] + wb / 2.0 - 2.0 * s;
            let dy = p[layout.y(a)] - p[layout.y(b)];
            total += t * t + dy * dy;
        }
        for &(c, wc) in &self.selfs {
            let u = p[layout.x(c)] + wc / 2.0 - s;
            total += u * u;
        }
        total
    }

    /// Scatter-adds `scale` times the gradient into `grad`.
    pub fn add_gradient(&self, p: &[f64], layout: &VarLayout, scale: f64, grad: &mut [f64]) {
        let s = p[layout.axis(self.group)];
        for &(a, b, wa, wb) in &self.pairs {
            let t = p[layout.x(a)] + wa / 2.0 + p[layout.x(b)] + wb / 2.0 - 2.0 * s;
            grad[layout.x(a)] += scale * 2.0 * t;
            grad[layout.x(b)] += scale * 2.0 * t;
            grad[layout.axis(self.group)] -= scale * 4.0 * t;
            let dy = p[layout.y(a)] - p[layout.y(b)];
            grad[layout.y(a)] += scale * 2.0 * dy;
            grad[layout.y(b)] -= scale * 2.0 * dy;
        }
        for &(c, wc) in &self.selfs {
            let u = p[layout.x(c)] + wc / 2.0 - s;
            grad[layout.x(c)] += scale * 2.0 * u;
            grad[layout.axis(self.group)] -= scale * 2.0 * u;
        }
    }

    /// Exact asymmetry distance: per pair, the offset of the pair midline
    /// from the axis plus the vertical mismatch; per self cell, the offset
    /// of its center from the axis.
    pub fn exact_distance(&self, p: &[f64], layout: &VarLayout) -> f64 {
        let s = p[layout.axis(self.group)];
        let mut total = 0.0;
        for &(a, b, wa, wb) in &self.pairs {
            let t = p[layout.x(a)] + wa / 2.0 + p[layout.x(b)] + wb / 2.0 - 2.0 * s;
            let dy = p[layout.y(a)] - p[layout.y(b)];
            total += t.abs() / 2.0 + dy.abs();
        }
        for &(c, wc) in &self.selfs {
            total += (p[layout.x(c)] + wc / 2.0 - s).abs();
        }
        total
    }
}

/// Angular alignment penalty for one signal-flow net.
///
/// Penalizes `1 - cos` between consecutive pin-to-pin segments so the net's
/// pins line up instead of zigzagging.
pub(crate) struct CosOp {
    pins: Vec<(usize, f64, f64)>,
    weight: f64,
}

const COS_EPS: f64 = 1e-8;

impl CosOp {
    fn pin_pos(&self, k: usize, p: &[f64], layout: &VarLayout) -> (f64, f64) {
        let (c, ox, oy) = self.pins[k];
        (p[layout.x(c)] + ox, p[layout.y(c)] + oy)
    }

    /// Sum of `1 - cos(angle)` over consecutive segment pairs.
    pub fn value(&self, p: &[f64], layout: &VarLayout) -> f64 {
        let mut total = 0.0;
        for k in 0..self.pins.len().saturating_sub(2) {
            let (ax, ay) = self.pin_pos(k, p, layout);
            let (bx, by) = self.pin_pos(k + 1, p, layout);
            let (cx, cy) = self.pin_pos(k + 2, p, layout);
            let (ux, uy) = (bx - ax, by - ay);
            let (vx, vy) = (cx - bx, cy - by);
            let nu = (ux * ux + uy * uy).sqrt();
            let nv = (vx * vx + vy * vy).sqrt();
            if nu < COS_EPS || nv < COS_EPS {
                continue;
            }
            total += 1.0 - (ux * vx + uy * vy) / (nu * nv);
        }
        self.weight * total
    }

    /// Scatter-adds `scale` times the gradient into `grad`.
    pub fn add_gradient(&self, p: &[f64], layout: &VarLayout, scale: f64, grad: &mut [f64]) {
        let factor = scale * self.weight;
        for k in 0..self.pins.len().saturating_sub(2) {
            let (ax, ay) = self.pin_pos(k, p, layout);
            let (bx, by) = self.pin_pos(k + 1, p, layout);
            let (cx, cy) = self.pin_pos(k + 2, p, layout);
            let (ux, uy) = (bx - ax, by - ay);
            let (vx, vy) = (cx - bx, cy - by);
            let nu = (ux * ux + uy * uy).sqrt();
            let nv = (vx * vx + vy * vy).sqrt();
            if nu < COS_EPS || nv < COS_EPS {
                continue;
            }
            let dot = ux * vx + uy * vy;
            let inv = 1.0 / (nu * nv);
            // d(cos)/du and d(cos)/dv
            let dcos_ux = vx * inv - dot * ux / (nu * nu * nu * nv);
            let dcos_uy = vy * inv - dot * uy / (nu * nu * nu * nv);
            let dcos_vx = ux * inv - dot * vx / (nu * nv * nv * nv);
            let dcos_vy = uy * inv - dot * vy / (nu * nv * nv * nv);

            let (a, _, _) = self.pins[k];
            let (b, _, _) = self.pins[k + 1];
            let (c, _, _) = self.pins[k + 2];
            // value = 1 - cos, u = pb - pa, v = pc - pb
            grad[layout.x(a)] += factor * dcos_ux;
            grad[layout.y(a)] += factor * dcos_uy;
            grad[layout.x(b)] += factor * (dcos_vx - dcos_ux);
            grad[layout.y(b)] += factor * (dcos_vy - dcos_uy);
            grad[layout.x(c)] -= factor * dcos_vx;
            grad[layout.y(c)] -= factor * dcos_vy;
        }
    }
}

/// All operators built for one global-placement run.
pub(crate) struct OperatorSet {
    /// One wirelength operator per net with at least two pins.
    pub hpwl: Vec<HpwlOp>,
    /// One overlap operator per movable unordered cell pair.
    pub ovl: Vec<OverlapOp>,
    /// One boundary operator per cell.
    pub oob: Vec<OobOp>,
    /// One asymmetry operator per symmetry group.
    pub asym: Vec<AsymOp>,
    /// One alignment operator per signal-flow net with at least three pins.
    pub cos: Vec<CosOp>,
}

/// Builds the operator set from the database over the given boundary.
pub(crate) fn build_operators(db: &PlaceDb, boundary: (f64, f64, f64, f64)) -> OperatorSet {
    let (xlo, ylo, xhi, yhi) = boundary;

    let mut hpwl = Vec::new();
    let mut cos = Vec::new();
    for net in &db.nets {
        let pins: Vec<(usize, f64, f64)> = net
            .pins
            .iter()
            .map(|&pid| {
                let pin = db.pin(pid);
                let off = pin.offset_center();
                (pin.cell.index(), off.x as f64, off.y as f64)
            })
            .collect();
        if pins.len() >= 2 {
            hpwl.push(HpwlOp {
                pins: pins.clone(),
                weight: net.weight,
            });
        }
        if net.is_signal_flow && pins.len() >= 3 {
            cos.push(CosOp {
                pins,
                weight: net.weight,
            });
        }
    }

    let mut ovl = Vec::new();
    for i in 0..db.cells.len() {
        for j in (i + 1)..db.cells.len() {
            if db.cells[i].is_fixed && db.cells[j].is_fixed {
                continue;
            }
            ovl.push(OverlapOp {
                i,
                j,
                wi: db.cells[i].width as f64,
                hi: db.cells[i].height as f64,
                wj: db.cells[j].width as f64,
                hj: db.cells[j].height as f64,
            });
        }
    }

    let oob = (0..db.cells.len())
        .map(|i| OobOp {
            cell: i,
            w: db.cells[i].width as f64,
            h: db.cells[i].height as f64,
            xlo,
            ylo,
            xhi,
            yhi,
        })
        .collect();

    let asym = db
        .sym_groups
        .iter()
        .enumerate()
        .map(|(g, group)| AsymOp {
            group: g,
            pairs: group
                .pairs
                .iter()
                .map(|&(a, b)| {
                    (
                        a.index(),
                        b.index(),
                        db.cell(a).width as f64,
                        db.cell(b).width as f64,
                    )
                })
                .collect(),
            selfs: group
                .self_cells
                .iter()
                .map(|&c| (c.index(), db.cell(c).width as f64))
                .collect(),
        })
        .collect();

    OperatorSet {
        hpwl,
        ovl,
        oob,
        asym,
        cos,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finite_difference(
        f: &dyn Fn(&[f64]) -> f64,
        p: &[f64],
        idx: usize,
        eps: f64,
    ) -> f64 {
        let mut hi = p.to_vec();
        hi[idx] += eps;
        let mut lo = p.to_vec();
        lo[idx] -= eps;
        (f(&hi) - f(&lo)) / (2.0 * eps)
    }

    #[test]
    fn softplus_matches_naive_in_range() {
        for &z in &[-5.0f64, -1.0, 0.0, 1.0, 5.0] {
            let naive = (1.0f64 + z.exp()).ln();
            assert!((softplus(z) - naive).abs() < 1e-12);
        }
        // Large argument approaches identity without overflow
        assert!((softplus(800.0) - 800.0).abs() < 1e-9);
        assert_eq!(softplus(-800.0), 0.0);
    }

    #[test]
    fn log_sum_exp_approaches_max() {
        let vals = [1.0, 5.0, 3.0];
        // Small alpha sharpens toward the true maximum
        assert!((log_sum_exp(&vals, 0.01) - 5.0).abs() < 1e-6);
        // Result always upper-bounds the maximum
        assert!(log_sum_exp(&vals, 1.0) >= 5.0);
    }

    #[test]
    fn smooth_min_approaches_min() {
        let vals = [4.0, 2.0, 9.0, 7.0];
        let mut w = Vec::new();
        assert!((smooth_min(&vals, 0.01, &mut w) - 2.0).abs() < 1e-6);
        let sum: f64 = w.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn hpwl_value_approaches_half_perimeter() {
        let layout = VarLayout {
            num_cells: 2,
            num_groups: 0,
        };
        let op = HpwlOp {
            pins: vec![(0, 0.0, 0.0), (1, 0.0, 0.0)],
            weight: 1.0,
        };
        // Cells at (0, 0) and (30, 40): HPWL = 70
        let p = vec![0.0, 30.0, 0.0, 40.0];
        let smooth = op.value(&p, &layout, 0.05);
        assert!((smooth - 70.0).abs() < 0.1);
    }

    #[test]
    fn hpwl_gradient_matches_finite_difference() {
        let layout = VarLayout {
            num_cells: 2,
            num_groups: 0,
        };
        let op = HpwlOp {
            pins: vec![(0, 2.0, 3.0), (1, 5.0, 1.0)],
            weight: 2.0,
        };
        let p = vec![0.0, 17.0, 4.0, 9.0];
        let alpha = 1.0;
        let mut grad = vec![0.0; layout.len()];
        op.add_gradient(&p, &layout, alpha, 1.0, &mut grad);
        for idx in 0..p.len() {
            let fd = finite_difference(&|q| op.value(q, &layout, alpha), &p, idx, 1e-5);
            assert!(
                (grad[idx] - fd).abs() < 1e-5,
                "index {idx}: analytic {} vs fd {fd}",
                grad[idx]
            );
        }
    }

    #[test]
    fn overlap_exact_area() {
        let layout = VarLayout {
            num_cells: 2,
            num_groups: 0,
        };
        let op = OverlapOp {
            i: 0,
            j: 1,
            wi: 10.0,
            hi: 10.0,
            wj: 10.0,
            hj: 10.0,
        };
        // Offset by (4, 6): overlap is 6 x 4 = 24
        let p = vec![0.0, 4.0, 0.0, 6.0];
        assert!((op.exact_area(&p, &layout) - 24.0).abs() < 1e-12);
        // Disjoint cells have zero overlap
        let p = vec![0.0, 50.0, 0.0, 0.0];
        assert_eq!(op.exact_area(&p, &layout), 0.0);
    }

    #[test]
    fn overlap_gradient_matches_finite_difference() {
        let layout = VarLayout {
            num_cells: 2,
            num_groups: 0,
        };
        let op = OverlapOp {
            i: 0,
            j: 1,
            wi: 10.0,
            hi: 8.0,
            wj: 6.0,
            hj: 12.0,
        };
        let p = vec![0.0, 5.0, 0.0, 3.0];
        let alpha = 0.8;
        let mut grad = vec![0.0; layout.len()];
        op.add_gradient(&p, &layout, alpha, 1.0, &mut grad);
        for idx in 0..p.len() {
            let fd = finite_difference(&|q| op.value(q, &layout, alpha), &p, idx, 1e-5);
            assert!(
                (grad[idx] - fd).abs() < 1e-4,
                "index {idx}: analytic {} vs fd {fd}",
                grad[idx]
            );
        }
    }

    #[test]
    fn oob_exact_area_inside_is_zero() {
        let layout = VarLayout {
            num_cells: 1,
            num_groups: 0,
        };
        let op = OobOp {
            cell: 0,
            w: 10.0,
            h: 10.0,
            xlo: 0.0,
            ylo: 0.0,
            xhi: 100.0,
            yhi: 100.0,
        };
        let p = vec![20.0, 20.0];
        assert_eq!(op.exact_area(&p, &layout), 0.0);
        // Half sticking out on the left: 5 x 10 = 50
        let p = vec![-5.0, 20.0];
        assert!((op.exact_area(&p, &layout) - 50.0).abs() < 1e-12);
    }

    #[test]
    fn oob_gradient_matches_finite_difference() {
        let layout = VarLayout {
            num_cells: 1,
            num_groups: 0,
        };
        let op = OobOp {
            cell: 0,
            w: 10.0,
            h: 10.0,
            xlo: 0.0,
            ylo: 0.0,
            xhi: 30.0,
            yhi: 30.0,
        };
        let p = vec![-3.0, 27.0];
        let alpha = 0.7;
        let mut grad = vec![0.0; layout.len()];
        op.add_gradient(&p, &layout, alpha, 1.0, &mut grad);
        for idx in 0..p.len() {
            let fd = finite_difference(&|q| op.value(q, &layout, alpha), &p, idx, 1e-5);
            assert!((grad[idx] - fd).abs() < 1e-5);
        }
    }

    #[test]
    fn asym_value_zero_when_symmetric() {
        let layout = VarLayout {
            num_cells: 2,
            num_groups: 1,
        };
        let op = AsymOp {
            group: 0,
            pairs: vec![(0, 1, 10.0, 10.0)],
            selfs: vec![],
        };
        // Cells at x = 0 and x = 30, both width 10, axis at 20: centers 5 and 35
        let p = vec![0.0, 30.0, 7.0, 7.0, 20.0];
        assert_eq!(op.value(&p, &layout), 0.0);
        assert_eq!(op.exact_distance(&p, &layout), 0.0);
    }

    #[test]
    fn asym_gradient_matches_finite_difference() {
        let layout = VarLayout {
            num_cells: 3,
            num_groups: 1,
        };
        let op = AsymOp {
            group: 0,
            pairs: vec![(0, 1, 10.0, 10.0)],
            selfs: vec![(2, 6.0)],
        };
        let p = vec![1.0, 27.0, 14.0, 3.0, 8.0, 2.5, 19.0];
        let mut grad = vec![0.0; layout.len()];
        op.add_gradient(&p, &layout, 1.0, &mut grad);
        for idx in 0..p.len() {
            let fd = finite_difference(&|q| op.value(q, &layout), &p, idx, 1e-5);
            assert!(
                (grad[idx] - fd).abs() < 1e-4,
                "index {idx}: analytic {} vs fd {fd}",
                grad[idx]
            );
        }
    }

    #[test]
    fn cos_value_zero_for_collinear() {
        let layout = VarLayout {
            num_cells: 3,
            num_groups: 0,
        };
        let op = CosOp {
            pins: vec![(0, 0.0, 0.0), (1, 0.0, 0.0), (2, 0.0, 0.0)],
            weight: 1.0,
        };
        // Collinear: all on a line
        let p = vec![0.0, 10.0, 20.0, 0.0, 10.0, 20.0];
        assert!(op.value(&p, &layout).abs() < 1e-12);
        // Right angle: 1 - cos(90deg) = 1
        let p = vec![0.0, 10.0, 10.0, 0.0, 0.0, 10.0];
        assert!((op.value(&p, &layout) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn cos_gradient_matches_finite_difference() {
        let layout = VarLayout {
            num_cells: 3,
            num_groups: 0,
        };
        let op = CosOp {
            pins: vec![(0, 1.0, 0.0), (1, 0.0, 2.0), (2, 0.0, 0.0)],
            weight: 1.5,
        };
        let p = vec![0.0, 11.0, 23.0, 0.0, 6.0, 1.0];
        let mut grad = vec![0.0; layout.len()];
        op.add_gradient(&p, &layout, 1.0, &mut grad);
        for idx in 0..p.len() {
            let fd = finite_difference(&|q| op.value(q, &layout), &p, idx, 1e-6);
            assert!(
                (grad[idx] - fd).abs() < 1e-4,
                "index {idx}: analytic {} vs fd {fd}",
                grad[idx]
            );
        }
    }
}

//! A single diffusible substrate on the simulation grid.
//!
//! Concentrations live in a flat `Vec<f32>` indexed `(i*ny + j)*nz + k`.
//! Agents and vessels never write concentrations directly; they accumulate
//! into a per-voxel source/sink buffer that is reconciled once per step, so
//! the result is independent of the order agents act in.

use crate::config::Boundary;

/// Summary statistics over a field, for metrics and snapshots.
#[derive(Clone, Copy, Debug, serde::Serialize)]
pub struct SubstrateSummary {
    pub mean: f32,
    pub min: f32,
    pub max: f32,
}

pub struct SubstrateField {
    pub name: String,
    data: Vec<f32>,
    source_sink: Vec<f32>,
    nx: usize,
    ny: usize,
    nz: usize,
    /// µm²/min.
    pub diffusion_coeff: f32,
    /// 1/min.
    pub decay_rate: f32,
    pub boundary: Boundary,
}

impl SubstrateField {
    pub fn new(
        name: String,
        shape: (usize, usize, usize),
        diffusion_coeff: f32,
        decay_rate: f32,
        initial_value: f32,
        boundary: Boundary,
    ) -> Self {
        let (nx, ny, nz) = shape;
        let len = nx * ny * nz;
        SubstrateField {
            name,
            data: vec![initial_value; len],
            source_sink: vec![0.0; len],
            nx,
            ny,
            nz,
            diffusion_coeff,
            decay_rate,
            boundary,
        }
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.nx, self.ny, self.nz)
    }

    #[inline]
    fn idx(&self, i: usize, j: usize, k: usize) -> usize {
        (i * self.ny + j) * self.nz + k
    }

    #[inline]
    fn clamp_voxel(&self, voxel: (usize, usize, usize)) -> (usize, usize, usize) {
        (
            voxel.0.min(self.nx - 1),
            voxel.1.min(self.ny - 1),
            voxel.2.min(self.nz - 1),
        )
    }

    /// Concentration at a voxel; out-of-range indices clamp to the edge.
    pub fn get(&self, voxel: (usize, usize, usize)) -> f32 {
        let (i, j, k) = self.clamp_voxel(voxel);
        self.data[self.idx(i, j, k)]
    }

    /// Overwrite a voxel concentration (initialization and tests).
    pub fn set(&mut self, voxel: (usize, usize, usize), value: f32) {
        let (i, j, k) = self.clamp_voxel(voxel);
        let idx = self.idx(i, j, k);
        self.data[idx] = value;
    }

    /// Accumulate production at a voxel. Deferred until `step`.
    pub fn add_source(&mut self, voxel: (usize, usize, usize), amount: f32) {
        let (i, j, k) = self.clamp_voxel(voxel);
        let idx = self.idx(i, j, k);
        self.source_sink[idx] += amount;
    }

    /// Accumulate consumption at a voxel. Deferred until `step`.
    pub fn add_sink(&mut self, voxel: (usize, usize, usize), amount: f32) {
        let (i, j, k) = self.clamp_voxel(voxel);
        let idx = self.idx(i, j, k);
        self.source_sink[idx] -= amount;
    }

    pub fn clear_sources(&mut self) {
        self.source_sink.fill(0.0);
    }

    /// Advance the field one timestep.
    ///
    /// Explicit Euler for dC/dt = D∇²C − λC + S: boundary enforcement on
    /// the current state, then interior Laplacian (5-point stencil in 2D,
    /// 7-point in 3D), decay and accumulated sources/sinks, clamp to ≥ 0,
    /// clear buffers. The boundary rule runs first so deposits landing on
    /// edge voxels (including clamped out-of-range ones) survive the step.
    /// Stability requires D·dt/dx² ≤ 0.5 per dimension; the
    /// microenvironment recomputes dt to satisfy this whenever a substrate
    /// is added.
    pub fn step(&mut self, dt: f32, spacing: (f32, f32, f32), dimensionality: usize) {
        self.enforce_boundary(dimensionality);

        let (nx, ny, nz) = (self.nx, self.ny, self.nz);
        let (dx, dy, dz) = spacing;
        let dx2_inv = 1.0 / (dx * dx);
        let dy2_inv = 1.0 / (dy * dy);
        let dz2_inv = 1.0 / (dz * dz);
        let d = self.diffusion_coeff;
        let lambda = self.decay_rate;

        let mut next = self.data.clone();

        for i in 0..nx {
            for j in 0..ny {
                for k in 0..nz {
                    let idx = self.idx(i, j, k);
                    let c = self.data[idx];
                    // Laplacian only where a full stencil fits; edge voxels
                    // see decay and sources, then the boundary rule below.
                    let mut lap = 0.0;
                    if i >= 1 && i + 1 < nx && j >= 1 && j + 1 < ny {
                        lap = dx2_inv
                            * (self.data[self.idx(i + 1, j, k)] - 2.0 * c
                                + self.data[self.idx(i - 1, j, k)])
                            + dy2_inv
                                * (self.data[self.idx(i, j + 1, k)] - 2.0 * c
                                    + self.data[self.idx(i, j - 1, k)]);
                        if dimensionality == 3 && nz > 2 {
                            if k >= 1 && k + 1 < nz {
                                lap += dz2_inv
                                    * (self.data[self.idx(i, j, k + 1)] - 2.0 * c
                                        + self.data[self.idx(i, j, k - 1)]);
                            } else {
                                lap = 0.0;
                            }
                        }
                    }
                    next[idx] = c + dt * (d * lap - lambda * c + self.source_sink[idx]);
                }
            }
        }

        self.data = next;
        for v in &mut self.data {
            if *v < 0.0 {
                *v = 0.0;
            }
        }
        self.clear_sources();
    }

    fn enforce_boundary(&mut self, dimensionality: usize) {
        let (nx, ny, nz) = (self.nx, self.ny, self.nz);
        match self.boundary {
            Boundary::Dirichlet(value) => {
                for j in 0..ny {
                    for k in 0..nz {
                        let a = self.idx(0, j, k);
                        let b = self.idx(nx - 1, j, k);
                        self.data[a] = value;
                        self.data[b] = value;
                    }
                }
                for i in 0..nx {
                    for k in 0..nz {
                        let a = self.idx(i, 0, k);
                        let b = self.idx(i, ny - 1, k);
                        self.data[a] = value;
                        self.data[b] = value;
                    }
                }
                if dimensionality == 3 && nz > 1 {
                    for i in 0..nx {
                        for j in 0..ny {
                            let a = self.idx(i, j, 0);
                            let b = self.idx(i, j, nz - 1);
                            self.data[a] = value;
                            self.data[b] = value;
                        }
                    }
                }
            }
            Boundary::NoFlux => {
                if nx > 1 {
                    for j in 0..ny {
                        for k in 0..nz {
                            let inner = self.data[self.idx(1, j, k)];
                            let idx0 = self.idx(0, j, k);
                            self.data[idx0] = inner;
                            let inner = self.data[self.idx(nx - 2, j, k)];
                            let idx1 = self.idx(nx - 1, j, k);
                            self.data[idx1] = inner;
                        }
                    }
                }
                if ny > 1 {
                    for i in 0..nx {
                        for k in 0..nz {
                            let inner = self.data[self.idx(i, 1, k)];
                            let idx0 = self.idx(i, 0, k);
                            self.data[idx0] = inner;
                            let inner = self.data[self.idx(i, ny - 2, k)];
                            let idx1 = self.idx(i, ny - 1, k);
                            self.data[idx1] = inner;
                        }
                    }
                }
                if dimensionality == 3 && nz > 2 {
                    for i in 0..nx {
                        for j in 0..ny {
                            let inner = self.data[self.idx(i, j, 1)];
                            let idx0 = self.idx(i, j, 0);
                            self.data[idx0] = inner;
                            let inner = self.data[self.idx(i, j, nz - 2)];
                            let idx1 = self.idx(i, j, nz - 1);
                            self.data[idx1] = inner;
                        }
                    }
                }
            }
        }
    }

    pub fn summary(&self) -> SubstrateSummary {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut sum = 0.0f64;
        for &v in &self.data {
            min = min.min(v);
            max = max.max(v);
            sum += v as f64;
        }
        SubstrateSummary {
            mean: (sum / self.data.len().max(1) as f64) as f32,
            min,
            max,
        }
    }

    /// Raw concentration values, row-major, for grid snapshots.
    pub fn values(&self) -> &[f32] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn field_2d(n: usize, d: f32, decay: f32, initial: f32, boundary: Boundary) -> SubstrateField {
        SubstrateField::new("test".into(), (n, n, 1), d, decay, initial, boundary)
    }

    #[test]
    fn out_of_range_deposits_clamp_to_edge() {
        let mut f = field_2d(8, 0.0, 0.0, 0.0, Boundary::NoFlux);
        f.add_source((100, 100, 100), 3.0);
        f.step(0.1, (10.0, 10.0, 10.0), 2);
        assert!(f.get((7, 7, 0)) > 0.0);
    }

    #[test]
    fn decay_only_matches_exponential() {
        let mut f = field_2d(8, 0.0, 0.1, 10.0, Boundary::NoFlux);
        let dt = 0.01;
        let steps = 100; // one minute
        for _ in 0..steps {
            f.step(dt, (10.0, 10.0, 10.0), 2);
        }
        let expected = 10.0 * (-0.1f32 * dt * steps as f32).exp();
        assert_relative_eq!(f.get((4, 4, 0)), expected, max_relative = 1e-3);
    }

    #[test]
    fn point_source_diffusion_stays_symmetric() {
        let n = 15;
        let mut f = field_2d(n, 100.0, 0.0, 0.0, Boundary::Dirichlet(0.0));
        let c = n / 2;
        f.set((c, c, 0), 100.0);
        for _ in 0..50 {
            f.step(0.1, (10.0, 10.0, 10.0), 2);
        }
        for off in 1..c {
            let east = f.get((c + off, c, 0));
            let west = f.get((c - off, c, 0));
            let north = f.get((c, c + off, 0));
            let south = f.get((c, c - off, 0));
            assert_relative_eq!(east, west, max_relative = 1e-5);
            assert_relative_eq!(north, south, max_relative = 1e-5);
            assert_relative_eq!(east, north, max_relative = 1e-5);
        }
    }

    #[test]
    fn concentration_never_negative() {
        let mut f = field_2d(10, 50.0, 0.2, 1.0, Boundary::NoFlux);
        for _ in 0..200 {
            f.add_sink((5, 5, 0), 1000.0);
            f.step(0.1, (10.0, 10.0, 10.0), 2);
            assert!(f.values().iter().all(|&v| v >= 0.0));
        }
    }

    #[test]
    fn dirichlet_edges_hold_boundary_value() {
        let mut f = field_2d(10, 10.0, 0.05, 0.0, Boundary::Dirichlet(38.0));
        for _ in 0..20 {
            f.step(0.05, (10.0, 10.0, 10.0), 2);
        }
        // Edges are re-pinned at the start of each step, then see one
        // step of decay.
        assert_relative_eq!(f.get((0, 4, 0)), 38.0, max_relative = 1e-2);
        assert_relative_eq!(f.get((9, 4, 0)), 38.0, max_relative = 1e-2);
        // Interior fills in from the boundary.
        assert!(f.get((5, 5, 0)) > 0.0);
    }

    #[test]
    fn edge_deposits_survive_the_boundary_rule() {
        // NoFlux edge: the copy-from-neighbor runs before the update, so
        // a source accumulated on the edge voxel still lands.
        let mut f = field_2d(8, 0.0, 0.0, 0.0, Boundary::NoFlux);
        f.add_source((0, 3, 0), 3.0);
        f.step(0.1, (10.0, 10.0, 10.0), 2);
        assert_relative_eq!(f.get((0, 3, 0)), 0.3);

        // Same for a Dirichlet edge.
        let mut f = field_2d(8, 0.0, 0.0, 0.0, Boundary::Dirichlet(0.0));
        f.add_source((7, 3, 0), 3.0);
        f.step(0.1, (10.0, 10.0, 10.0), 2);
        assert_relative_eq!(f.get((7, 3, 0)), 0.3);
    }

    #[test]
    fn sources_cleared_after_step() {
        let mut f = field_2d(8, 0.0, 0.0, 0.0, Boundary::NoFlux);
        f.add_source((4, 4, 0), 5.0);
        f.step(1.0, (10.0, 10.0, 10.0), 2);
        let after_first = f.get((4, 4, 0));
        f.step(1.0, (10.0, 10.0, 10.0), 2);
        // No re-application of the old source.
        assert_relative_eq!(f.get((4, 4, 0)), after_first);
    }
}

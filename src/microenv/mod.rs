//! The microenvironment: a set of named substrate fields sharing one grid.
//!
//! Finite-volume reaction-diffusion on a regular mesh, following the
//! BioFVM formulation: ∂C/∂t = D∇²C − λC + S. All fields share the same
//! geometry; point queries clamp out-of-range positions to the nearest
//! valid voxel and absent substrates read as zero.

pub mod substrate;

use crate::config::{ConfigError, SubstrateSpec, CM2_PER_S_TO_UM2_PER_MIN, MAX_DT_MIN};
use glam::Vec2;
use substrate::SubstrateField;
use tracing::{debug, info};

pub struct Microenvironment {
    pub x_range: (f32, f32),
    pub y_range: (f32, f32),
    pub z_range: (f32, f32),
    pub dx: f32,
    pub dy: f32,
    pub dz: f32,
    pub dimensionality: usize,
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    substrates: Vec<SubstrateField>,
    /// Simulation time in minutes; monotonically advances.
    pub time: f32,
    /// Timestep in minutes, recomputed for stability as substrates are added.
    pub dt: f32,
}

impl Microenvironment {
    pub fn new(
        x_range: (f32, f32),
        y_range: (f32, f32),
        z_range: (f32, f32),
        voxel_size: f32,
        dimensionality: usize,
    ) -> Result<Self, ConfigError> {
        if dimensionality != 2 && dimensionality != 3 {
            return Err(ConfigError::InvalidDimensionality(dimensionality));
        }
        if voxel_size <= 0.0 {
            return Err(ConfigError::InvalidVoxelSize(voxel_size));
        }
        if x_range.1 <= x_range.0 || y_range.1 <= y_range.0 {
            return Err(ConfigError::InvalidDomain(x_range.1 - x_range.0));
        }

        let nx = ((x_range.1 - x_range.0) / voxel_size) as usize + 1;
        let ny = ((y_range.1 - y_range.0) / voxel_size) as usize + 1;
        let (nz, dz) = if dimensionality == 2 {
            (1, 1.0)
        } else {
            (((z_range.1 - z_range.0) / voxel_size) as usize + 1, voxel_size)
        };

        info!(
            dimensionality,
            nx, ny, nz, voxel_size, "initialized microenvironment grid"
        );

        Ok(Microenvironment {
            x_range,
            y_range,
            z_range,
            dx: voxel_size,
            dy: voxel_size,
            dz,
            dimensionality,
            nx,
            ny,
            nz,
            substrates: Vec::new(),
            time: 0.0,
            dt: MAX_DT_MIN,
        })
    }

    /// Register a new substrate sharing the grid. Duplicate names are a
    /// configuration error. Recomputes the stable timestep.
    pub fn add_substrate(&mut self, spec: &SubstrateSpec) -> Result<(), ConfigError> {
        if self.substrates.iter().any(|s| s.name == spec.name) {
            return Err(ConfigError::DuplicateSubstrate(spec.name.clone()));
        }
        let d_um2_min = spec.diffusion_cm2_per_s * CM2_PER_S_TO_UM2_PER_MIN;
        self.substrates.push(SubstrateField::new(
            spec.name.clone(),
            (self.nx, self.ny, self.nz),
            d_um2_min,
            spec.decay_rate,
            spec.initial_value,
            spec.boundary,
        ));
        self.update_timestep();
        info!(
            name = %spec.name,
            diffusion_um2_per_min = d_um2_min,
            decay_rate = spec.decay_rate,
            dt = self.dt,
            "registered substrate"
        );
        Ok(())
    }

    /// Explicit-scheme stability: dt ≤ 0.25·dx²/(2·D·dim), capped at
    /// [`MAX_DT_MIN`]. Recomputed whenever the substrate set changes.
    fn update_timestep(&mut self) {
        let max_d = self
            .substrates
            .iter()
            .map(|s| s.diffusion_coeff)
            .fold(0.0f32, f32::max);
        if max_d <= 0.0 {
            self.dt = MAX_DT_MIN;
            return;
        }
        let min_spacing = if self.dimensionality == 3 {
            self.dx.min(self.dy).min(self.dz)
        } else {
            self.dx.min(self.dy)
        };
        let dt_max =
            0.25 * min_spacing * min_spacing / (2.0 * max_d * self.dimensionality as f32);
        self.dt = dt_max.min(MAX_DT_MIN);
        debug!(dt = self.dt, "recomputed stable timestep");
    }

    pub fn field(&self, name: &str) -> Option<&SubstrateField> {
        self.substrates.iter().find(|s| s.name == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut SubstrateField> {
        self.substrates.iter_mut().find(|s| s.name == name)
    }

    pub fn substrate_names(&self) -> impl Iterator<Item = &str> {
        self.substrates.iter().map(|s| s.name.as_str())
    }

    /// Clear transient source/sink buffers on every field. Called once per
    /// simulation step before any agent acts.
    pub fn reset_all_sources_sinks(&mut self) {
        for s in &mut self.substrates {
            s.clear_sources();
        }
    }

    /// Advance every field one timestep, then the clock.
    pub fn step(&mut self) {
        let dt = self.dt;
        let spacing = (self.dx, self.dy, self.dz);
        let dim = self.dimensionality;
        for s in &mut self.substrates {
            s.step(dt, spacing, dim);
        }
        self.time += dt;
    }

    /// Deterministic world-to-voxel mapping, clamped into the grid.
    pub fn position_to_voxel(&self, pos: Vec2) -> (usize, usize, usize) {
        let i = ((pos.x - self.x_range.0) / self.dx).max(0.0) as usize;
        let j = ((pos.y - self.y_range.0) / self.dy).max(0.0) as usize;
        (i.min(self.nx - 1), j.min(self.ny - 1), 0)
    }

    /// World position of a voxel center.
    pub fn voxel_center(&self, voxel: (usize, usize, usize)) -> Vec2 {
        Vec2::new(
            self.x_range.0 + voxel.0 as f32 * self.dx,
            self.y_range.0 + voxel.1 as f32 * self.dy,
        )
    }

    /// Nearest-voxel concentration at a world position. Unknown substrates
    /// read as zero; that is a normal configuration state, not an error.
    pub fn concentration_at(&self, name: &str, pos: Vec2) -> f32 {
        let Some(field) = self.field(name) else {
            return 0.0;
        };
        let i = ((pos.x - self.x_range.0) / self.dx)
            .round()
            .clamp(0.0, (self.nx - 1) as f32) as usize;
        let j = ((pos.y - self.y_range.0) / self.dy)
            .round()
            .clamp(0.0, (self.ny - 1) as f32) as usize;
        field.get((i, j, 0))
    }

    /// Central-difference gradient at a world position, for chemotaxis.
    /// Centered on the same nearest voxel as [`Self::concentration_at`];
    /// indices clamp one voxel in from the edge so the stencil always fits,
    /// and unknown substrates give the zero vector.
    pub fn gradient_at(&self, name: &str, pos: Vec2) -> Vec2 {
        let Some(field) = self.field(name) else {
            return Vec2::ZERO;
        };
        if self.nx < 3 || self.ny < 3 {
            return Vec2::ZERO;
        }
        let i = (((pos.x - self.x_range.0) / self.dx).round() as isize)
            .clamp(1, self.nx as isize - 2) as usize;
        let j = (((pos.y - self.y_range.0) / self.dy).round() as isize)
            .clamp(1, self.ny as isize - 2) as usize;
        let gx = (field.get((i + 1, j, 0)) - field.get((i - 1, j, 0))) / (2.0 * self.dx);
        let gy = (field.get((i, j + 1, 0)) - field.get((i, j - 1, 0))) / (2.0 * self.dy);
        Vec2::new(gx, gy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Boundary;
    use approx::assert_relative_eq;

    fn env() -> Microenvironment {
        Microenvironment::new((0.0, 100.0), (0.0, 100.0), (0.0, 100.0), 10.0, 2).unwrap()
    }

    #[test]
    fn duplicate_substrate_name_rejected() {
        let mut m = env();
        m.add_substrate(&SubstrateSpec::signal("trail", 0.1)).unwrap();
        let err = m.add_substrate(&SubstrateSpec::signal("trail", 0.2));
        assert!(matches!(err, Err(ConfigError::DuplicateSubstrate(_))));
    }

    #[test]
    fn absent_substrate_reads_zero() {
        let m = env();
        assert_eq!(m.concentration_at("nope", Vec2::new(50.0, 50.0)), 0.0);
        assert_eq!(m.gradient_at("nope", Vec2::new(50.0, 50.0)), Vec2::ZERO);
    }

    #[test]
    fn position_mapping_clamps_out_of_range() {
        let m = env();
        assert_eq!(m.position_to_voxel(Vec2::new(-500.0, -500.0)), (0, 0, 0));
        assert_eq!(
            m.position_to_voxel(Vec2::new(5000.0, 5000.0)),
            (m.nx - 1, m.ny - 1, 0)
        );
        // Exactly on the boundary is valid.
        assert_eq!(m.position_to_voxel(Vec2::new(100.0, 100.0)), (10, 10, 0));
    }

    #[test]
    fn timestep_respects_stability_bound() {
        let mut m = env();
        m.add_substrate(&SubstrateSpec::oxygen(38.0)).unwrap();
        let d = 1.0e-5 * CM2_PER_S_TO_UM2_PER_MIN;
        assert!(d * m.dt / (m.dx * m.dx) <= 0.5);
    }

    #[test]
    fn gradient_points_up_slope() {
        let mut m = env();
        m.add_substrate(&SubstrateSpec {
            name: "ramp".into(),
            diffusion_cm2_per_s: 0.0,
            decay_rate: 0.0,
            initial_value: 0.0,
            boundary: Boundary::NoFlux,
        })
        .unwrap();
        let nx = m.nx;
        let field = m.field_mut("ramp").unwrap();
        for i in 0..nx {
            for j in 0..11 {
                field.set((i, j, 0), i as f32);
            }
        }
        let g = m.gradient_at("ramp", Vec2::new(50.0, 50.0));
        assert_relative_eq!(g.x, 0.1, max_relative = 1e-5);
        assert_relative_eq!(g.y, 0.0);
    }

    #[test]
    fn gradient_centers_on_the_nearest_voxel() {
        let mut m = env();
        m.add_substrate(&SubstrateSpec {
            name: "spike".into(),
            diffusion_cm2_per_s: 0.0,
            decay_rate: 0.0,
            initial_value: 0.0,
            boundary: Boundary::NoFlux,
        })
        .unwrap();
        let ny = m.ny;
        let field = m.field_mut("spike").unwrap();
        for j in 0..ny {
            field.set((7, j, 0), 5.0);
        }
        // 56 µm rounds to voxel 6, whose stencil reaches the spike at
        // voxel 7. Truncation would center on voxel 5 and see nothing.
        let g = m.gradient_at("spike", Vec2::new(56.0, 50.0));
        assert_relative_eq!(g.x, 0.25, max_relative = 1e-5);
        assert_relative_eq!(g.y, 0.0);
    }

    #[test]
    fn time_advances_monotonically() {
        let mut m = env();
        m.add_substrate(&SubstrateSpec::signal("trail", 0.1)).unwrap();
        let dt = m.dt;
        m.step();
        m.step();
        assert_relative_eq!(m.time, 2.0 * dt);
    }
}

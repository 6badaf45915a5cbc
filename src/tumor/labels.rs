//! Build a tumor geometry from a segmented label volume.
//!
//! The image loader hands over a 3D array of region labels plus physical
//! voxel spacing; everything image-format specific stays on its side of the
//! boundary. Labels follow the usual glioma segmentation convention:
//! 0 background, 1 necrotic core, 2 edema, 4 enhancing tumor.

use glam::Vec2;
use rand::Rng;
use tracing::info;

use super::cell::{CellPhase, TumorCell};
use super::TumorGeometry;

pub const LABEL_BACKGROUND: u8 = 0;
pub const LABEL_NECROTIC: u8 = 1;
pub const LABEL_EDEMA: u8 = 2;
pub const LABEL_ENHANCING: u8 = 4;

/// A segmented 3D volume with physical voxel spacing in mm. Data is
/// row-major, indexed `(i * ny + j) * nz + k`.
pub struct LabelVolume {
    pub data: Vec<u8>,
    pub shape: (usize, usize, usize),
    pub spacing_mm: (f32, f32, f32),
}

impl LabelVolume {
    pub fn get(&self, i: usize, j: usize, k: usize) -> u8 {
        let (_, ny, nz) = self.shape;
        self.data[(i * ny + j) * nz + k]
    }
}

impl TumorGeometry {
    /// Build a geometry from a label volume.
    ///
    /// The volume is flattened along its third axis onto the simulation
    /// plane (a voxel column counts as tumor if any slice in it carries a
    /// tumor label, necrotic labels winning over enhancing). Cells are
    /// placed per labeled column with expected count `density ×
    /// column area`, phase Necrotic under necrotic labels and Viable under
    /// enhancing labels; edema carries no cells. Center and radii derive
    /// from the label masses. `scale` converts mm to simulation µm
    /// (1000.0 for a 1:1 physical mapping).
    pub fn from_labels<R: Rng>(
        volume: &LabelVolume,
        scale: f32,
        cell_density: f32,
        rng: &mut R,
    ) -> Self {
        let (nx, ny, nz) = volume.shape;
        let (sx, sy, _) = volume.spacing_mm;
        let voxel_um = (sx * scale, sy * scale);
        let column_area = voxel_um.0 * voxel_um.1;

        // Collapse the stack into one label per column.
        let mut columns: Vec<(usize, usize, u8)> = Vec::new();
        for i in 0..nx {
            for j in 0..ny {
                let mut label = LABEL_BACKGROUND;
                for k in 0..nz {
                    match volume.get(i, j, k) {
                        LABEL_NECROTIC => {
                            label = LABEL_NECROTIC;
                            break;
                        }
                        LABEL_ENHANCING => label = LABEL_ENHANCING,
                        LABEL_EDEMA if label == LABEL_BACKGROUND => label = LABEL_EDEMA,
                        _ => {}
                    }
                }
                if label != LABEL_BACKGROUND {
                    columns.push((i, j, label));
                }
            }
        }

        let world = |i: usize, j: usize| {
            Vec2::new((i as f32 + 0.5) * voxel_um.0, (j as f32 + 0.5) * voxel_um.1)
        };

        // Center of mass over all tumor-bearing columns, radius from the
        // farthest one, necrotic radius from the necrotic mass alone.
        let tumor_columns: Vec<&(usize, usize, u8)> = columns
            .iter()
            .filter(|(_, _, l)| *l != LABEL_EDEMA)
            .collect();
        let center = if tumor_columns.is_empty() {
            Vec2::ZERO
        } else {
            tumor_columns
                .iter()
                .fold(Vec2::ZERO, |acc, (i, j, _)| acc + world(*i, *j))
                / tumor_columns.len() as f32
        };
        let tumor_radius = tumor_columns
            .iter()
            .map(|(i, j, _)| center.distance(world(*i, *j)))
            .fold(0.0f32, f32::max)
            .max(1.0);
        let necrotic_area: f32 = columns
            .iter()
            .filter(|(_, _, l)| *l == LABEL_NECROTIC)
            .count() as f32
            * column_area;
        let necrotic_core_radius = (necrotic_area / std::f32::consts::PI).sqrt();

        let mut geo = TumorGeometry::new(center, tumor_radius, necrotic_core_radius);

        let expected_per_column = cell_density * column_area;
        let mut id: u32 = 0;
        for (i, j, label) in &columns {
            let phase = match *label {
                LABEL_NECROTIC => CellPhase::Necrotic,
                LABEL_ENHANCING => CellPhase::Viable,
                _ => continue,
            };
            let mut remaining = expected_per_column;
            while remaining > 0.0 {
                if remaining < 1.0 && rng.gen::<f32>() >= remaining {
                    break;
                }
                let jitter = Vec2::new(
                    rng.gen_range(-0.5..0.5) * voxel_um.0,
                    rng.gen_range(-0.5..0.5) * voxel_um.1,
                );
                let position = world(*i, *j) + jitter;
                let band = (center.distance(position) - necrotic_core_radius)
                    / (tumor_radius - necrotic_core_radius).max(1.0);
                let kind = super::assign_cell_kind(band.clamp(0.0, 1.0), rng);
                geo.cells.push(TumorCell::new(id, position, phase, kind));
                id += 1;
                remaining -= 1.0;
            }
        }

        geo.generate_peripheral_vasculature(0.01, rng);
        geo.generate_immune_cells(rng);

        info!(
            columns = columns.len(),
            cells = geo.cells.len(),
            radius = geo.tumor_radius,
            core = geo.necrotic_core_radius,
            "built tumor geometry from label volume"
        );
        geo
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    /// A disc of enhancing tumor with a necrotic center, one slice deep.
    fn disc_volume(n: usize) -> LabelVolume {
        let mut data = vec![LABEL_BACKGROUND; n * n];
        let c = n as f32 / 2.0;
        for i in 0..n {
            for j in 0..n {
                let d = ((i as f32 - c).powi(2) + (j as f32 - c).powi(2)).sqrt();
                if d < n as f32 * 0.1 {
                    data[i * n + j] = LABEL_NECROTIC;
                } else if d < n as f32 * 0.4 {
                    data[i * n + j] = LABEL_ENHANCING;
                } else if d < n as f32 * 0.45 {
                    data[i * n + j] = LABEL_EDEMA;
                }
            }
        }
        LabelVolume {
            data,
            shape: (n, n, 1),
            spacing_mm: (0.01, 0.01, 0.01),
        }
    }

    #[test]
    fn disc_volume_yields_centered_geometry() {
        let mut rng = StdRng::seed_from_u64(7);
        let volume = disc_volume(40);
        // 0.01 mm spacing × 1000 scale = 10 µm voxels on a 400 µm domain.
        let geo = TumorGeometry::from_labels(&volume, 1000.0, 0.005, &mut rng);

        assert!(!geo.cells.is_empty());
        assert!(geo.center.distance(Vec2::new(200.0, 200.0)) < 20.0);
        assert!(geo.necrotic_core_radius > 0.0);
        assert!(geo.necrotic_core_radius < geo.tumor_radius);
    }

    #[test]
    fn necrotic_labels_produce_dead_cells() {
        let mut rng = StdRng::seed_from_u64(7);
        let volume = disc_volume(40);
        let geo = TumorGeometry::from_labels(&volume, 1000.0, 0.005, &mut rng);

        let necrotic = geo
            .cells
            .iter()
            .filter(|c| c.phase == CellPhase::Necrotic)
            .count();
        let viable = geo
            .cells
            .iter()
            .filter(|c| c.phase == CellPhase::Viable)
            .count();
        assert!(necrotic > 0);
        assert!(viable > necrotic);
    }

    #[test]
    fn edema_carries_no_cells() {
        let mut rng = StdRng::seed_from_u64(7);
        let volume = LabelVolume {
            data: vec![LABEL_EDEMA; 16],
            shape: (4, 4, 1),
            spacing_mm: (0.01, 0.01, 0.01),
        };
        let geo = TumorGeometry::from_labels(&volume, 1000.0, 0.01, &mut rng);
        assert!(geo.cells.is_empty());
    }
}

//! Blood vessels as stationary point sources of oxygen and drug.

use glam::Vec2;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VesselKind {
    Normal,
    Tumor,
    /// Blood-brain-barrier vessel; drug supply is heavily attenuated.
    Bbb,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VesselPoint {
    pub position: Vec2,
    /// mmHg supplied per minute at the vessel voxel.
    pub oxygen_supply: f32,
    /// µg of drug supplied per minute before permeability scaling.
    pub drug_supply: f32,
    /// Effective perfusion range in µm.
    pub supply_radius: f32,
    pub kind: VesselKind,
    /// Fractional drug transmission, 0..1.
    pub bbb_permeability: f32,
}

impl VesselPoint {
    pub fn normal(position: Vec2) -> Self {
        VesselPoint {
            position,
            oxygen_supply: 38.0,
            drug_supply: 0.0,
            supply_radius: 50.0,
            kind: VesselKind::Normal,
            bbb_permeability: 0.1,
        }
    }

    pub fn bbb(position: Vec2) -> Self {
        VesselPoint {
            bbb_permeability: 0.05,
            kind: VesselKind::Bbb,
            ..VesselPoint::normal(position)
        }
    }

    /// Drug actually crossing into the tissue per minute.
    pub fn effective_drug_supply(&self) -> f32 {
        self.drug_supply * self.bbb_permeability
    }
}

//! End-to-end scenarios exercising the whole engine.

use std::collections::BTreeMap;

use glam::Vec2;
use nanoswarm_core::config::{
    Boundary, QueenConfig, SimulationConfig, SubstrateSpec, TumorConfig,
};
use nanoswarm_core::swarm::nanobot::{BotContext, BotState, Nanobot};
use nanoswarm_core::swarm::QueenCoordinator;
use nanoswarm_core::tumor::cell::{CellKind, CellPhase, TumorCell};
use nanoswarm_core::tumor::vessel::VesselPoint;
use nanoswarm_core::{Microenvironment, TumorGeometry, TumorNanobotModel};
use rand::{rngs::StdRng, SeedableRng};

/// Oxygen with near-zero diffusion so the stability bound allows the full
/// 0.1 min timestep and hypoxia timescales fit in a short run.
fn slow_oxygen() -> SubstrateSpec {
    SubstrateSpec {
        name: "oxygen".into(),
        diffusion_cm2_per_s: 1.0e-9,
        decay_rate: 0.1,
        initial_value: 38.0,
        boundary: Boundary::Dirichlet(38.0),
    }
}

fn swarm_microenv() -> Microenvironment {
    let mut m = Microenvironment::new((0.0, 600.0), (0.0, 600.0), (0.0, 0.0), 10.0, 2).unwrap();
    m.add_substrate(&SubstrateSpec::drug(1.0e-7)).unwrap();
    m.add_substrate(&SubstrateSpec::signal("trail", 0.1)).unwrap();
    m.add_substrate(&SubstrateSpec::signal("chemokine_signal", 0.08))
        .unwrap();
    m
}

/// Scenario 1: no nanobots and no vessels. Ambient oxygen decays, the
/// population starves, and necrosis appears on its own.
#[test]
fn starving_tumor_develops_necrosis() {
    let config = SimulationConfig {
        domain_size: 400.0,
        voxel_size: 10.0,
        n_nanobots: 0,
        tumor: TumorConfig {
            radius: 120.0,
            vessel_density: 0.0,
            ..TumorConfig::default()
        },
        queen: QueenConfig::default(),
        substrates: vec![slow_oxygen()],
        chemotaxis_weights: BTreeMap::new(),
        seed: 42,
        ..SimulationConfig::default()
    };

    let mut model = TumorNanobotModel::new(config).unwrap();
    assert!(model.geometry.vessels.is_empty());
    assert_eq!(model.geometry.count_in_phase(CellPhase::Necrotic), 0);

    // dt is 0.1 min here; 600 steps cover a full hour of starvation.
    model.run(600);

    assert!(model.geometry.count_in_phase(CellPhase::Necrotic) > 0);
}

/// Scenario 2: one bot, one cell 20 µm away, full payload. The kill lands
/// at exactly step 3: lock, approach and capture, first delivery
/// (2 µg × 5 amplification ≥ 0.5 µg lethal dose).
#[test]
fn single_target_dies_on_the_third_step() {
    let mut rng = StdRng::seed_from_u64(1);
    let mut m = swarm_microenv();
    let mut geo = TumorGeometry::new(Vec2::new(300.0, 300.0), 200.0, 50.0);
    geo.cells.push(TumorCell::new(
        0,
        Vec2::new(320.0, 300.0),
        CellPhase::Viable,
        CellKind::Differentiated,
    ));
    geo.vessels.push(VesselPoint::normal(Vec2::new(300.0, 490.0)));

    let mut bot = Nanobot::new(0, Vec2::new(300.0, 300.0));
    let weights = BTreeMap::new();

    for step in 1..=3 {
        let mut ctx = BotContext {
            microenv: &mut m,
            geometry: &mut geo,
            guidance: None,
            policy: None,
            chemotaxis_weights: &weights,
        };
        bot.step(&mut ctx, &mut rng);

        match step {
            1 => {
                assert_eq!(bot.state, BotState::Targeting);
                assert!(geo.cells[0].is_alive);
            }
            2 => {
                assert_eq!(bot.state, BotState::Delivering);
                assert!(geo.cells[0].is_alive);
            }
            3 => {
                assert_eq!(geo.cells[0].phase, CellPhase::Apoptotic);
                assert!(!geo.cells[0].is_alive);
            }
            _ => unreachable!(),
        }
    }
}

/// Scenario 4: same seed, queen on versus off. Guidance can only help:
/// the directed swarm delivers at least as much drug.
#[test]
fn queen_guidance_never_hurts_delivery() {
    let delivered = |queen_enabled: bool| -> f32 {
        let mut rng = StdRng::seed_from_u64(9);
        let mut m = swarm_microenv();
        let mut geo = TumorGeometry::new(Vec2::new(300.0, 300.0), 200.0, 50.0);
        let mut cell = TumorCell::new(
            0,
            Vec2::new(450.0, 300.0),
            CellPhase::Hypoxic,
            CellKind::Differentiated,
        );
        cell.hypoxic_duration = 5.0;
        geo.cells.push(cell);
        geo.vessels.push(VesselPoint::normal(Vec2::new(300.0, 490.0)));

        let queen = QueenCoordinator::new(QueenConfig {
            enabled: queen_enabled,
            interval: 10,
            enhanced: false,
            payload_threshold: 10.0,
        });

        let mut bot = Nanobot::new(0, Vec2::new(300.0, 300.0));
        let weights = BTreeMap::new();
        let mut guidance = BTreeMap::new();
        let mut total = 0.0;

        for step in 0..100 {
            if step % 10 == 0 {
                guidance =
                    queen.compute_guidance(std::slice::from_ref(&bot), &geo);
            }
            let mut ctx = BotContext {
                microenv: &mut m,
                geometry: &mut geo,
                guidance: guidance.get(&bot.id).copied(),
                policy: None,
                chemotaxis_weights: &weights,
            };
            let outcome = bot.step(&mut ctx, &mut rng);
            total += outcome.delivered;
        }
        total
    };

    let with_queen = delivered(true);
    let without_queen = delivered(false);
    assert!(with_queen > 0.0);
    assert!(with_queen >= without_queen);
}

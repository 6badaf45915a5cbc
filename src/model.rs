//! The top-level model: wires the microenvironment, tumor, swarm, queen,
//! policy and telemetry together and advances them in a fixed order each
//! step.
//!
//! Step order: reset transient sources → tumor cells (oxygen status, drug
//! absorption, consumption, toxicity, growth) → immune cells → vessel
//! sources → queen guidance (periodic) → nanobots → diffusion integration
//! → metrics. Agent and policy failures are collected per step, never
//! propagated out of `step`.

use std::collections::{BTreeMap, BTreeSet};

use glam::Vec2;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{info, warn};

use crate::config::{ConfigError, SimulationConfig};
use crate::microenv::Microenvironment;
use crate::policy::DecisionPolicy;
use crate::snapshot::{BotSnapshot, FieldFrame, StepSnapshot, SubstrateSnapshot};
use crate::swarm::nanobot::{BotContext, Nanobot};
use crate::swarm::queen::QueenCoordinator;
use crate::telemetry::{NullSink, TelemetryEvent, TelemetryEventKind, TelemetrySink};
use crate::tumor::cell::CauseOfDeath;
use crate::tumor::TumorGeometry;

/// Spread of agent spawn positions around their home vessel, µm.
const SPAWN_SCATTER: f32 = 20.0;

pub struct TumorNanobotModel {
    pub config: SimulationConfig,
    pub microenv: Microenvironment,
    pub geometry: TumorGeometry,
    pub bots: Vec<Nanobot>,
    queen: QueenCoordinator,
    policy: Option<Box<dyn DecisionPolicy>>,
    telemetry: Box<dyn TelemetrySink>,
    rng: StdRng,
    guidance: BTreeMap<u32, Vec2>,
    reported_dead: BTreeSet<u32>,
    pub step_count: usize,
    /// Full-grid frames, one every `field_snapshot_interval` steps.
    pub field_history: Vec<FieldFrame>,
    pub total_deliveries: usize,
    pub total_drug_delivered: f32,
    pub cells_killed: usize,
    pub errors: Vec<String>,
}

impl TumorNanobotModel {
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);

        let extent = (0.0, config.domain_size);
        let mut microenv = Microenvironment::new(
            extent,
            extent,
            extent,
            config.voxel_size,
            config.dimensionality,
        )?;
        for spec in &config.substrates {
            microenv.add_substrate(spec)?;
        }

        let center = Vec2::splat(config.domain_size / 2.0);
        let core_radius = config.tumor.radius * config.tumor.necrotic_core_fraction;
        let mut geometry = TumorGeometry::new(center, config.tumor.radius, core_radius);
        geometry.generate(&config.tumor, config.dimensionality, &mut rng);

        let bots = (0..config.n_nanobots)
            .map(|id| {
                let home = if geometry.vessels.is_empty() {
                    center
                } else {
                    geometry.vessels[rng.gen_range(0..geometry.vessels.len())].position
                };
                let scatter = Vec2::new(
                    rng.gen_range(-SPAWN_SCATTER..SPAWN_SCATTER),
                    rng.gen_range(-SPAWN_SCATTER..SPAWN_SCATTER),
                );
                Nanobot::new(id as u32, home + scatter)
            })
            .collect();

        let queen = QueenCoordinator::new(config.queen.clone());
        let telemetry: Box<dyn TelemetrySink> = Box::new(NullSink);
        telemetry.record(&TelemetryEvent::now(TelemetryEventKind::SimulationStarted));

        info!(
            bots = config.n_nanobots,
            seed = config.seed,
            "model initialized"
        );

        Ok(TumorNanobotModel {
            config,
            microenv,
            geometry,
            bots,
            queen,
            policy: None,
            telemetry,
            rng,
            guidance: BTreeMap::new(),
            reported_dead: BTreeSet::new(),
            step_count: 0,
            field_history: Vec::new(),
            total_deliveries: 0,
            total_drug_delivered: 0.0,
            cells_killed: 0,
            errors: Vec::new(),
        })
    }

    pub fn with_policy(mut self, policy: Box<dyn DecisionPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Box<dyn TelemetrySink>) -> Self {
        telemetry.record(&TelemetryEvent::now(TelemetryEventKind::SimulationStarted));
        self.telemetry = telemetry;
        self
    }

    /// Advance the whole model one timestep.
    pub fn step(&mut self) {
        self.errors.clear();
        self.microenv.reset_all_sources_sinks();
        let dt = self.microenv.dt;

        self.step_tumor_cells(dt);
        self.step_immune_cells(dt);
        self.apply_vessel_sources();

        if self.queen.interval() > 0 && self.step_count % self.queen.interval() == 0 {
            self.guidance = self.queen.compute_guidance(&self.bots, &self.geometry);
        }

        self.step_bots();
        self.flush_death_events();

        self.microenv.step();
        self.step_count += 1;

        let interval = self.config.field_snapshot_interval;
        if interval > 0 && self.step_count % interval == 0 {
            self.record_field_frame();
        }
    }

    /// Run `steps` timesteps and emit the completion event.
    pub fn run(&mut self, steps: usize) {
        for _ in 0..steps {
            self.step();
        }
        self.telemetry
            .record(&TelemetryEvent::now(TelemetryEventKind::SimulationCompleted {
                steps: self.step_count,
                deliveries: self.total_deliveries,
                kills: self.cells_killed,
            }));
    }

    fn step_tumor_cells(&mut self, dt: f32) {
        let mut daughters = Vec::new();
        let mut next_id = self
            .geometry
            .cells
            .iter()
            .map(|c| c.id)
            .max()
            .map(|m| m + 1)
            .unwrap_or(0);

        for i in 0..self.geometry.cells.len() {
            let position = self.geometry.cells[i].position;
            let oxygen = self.microenv.concentration_at("oxygen", position);
            let drug = self.microenv.concentration_at("drug", position);
            let voxel = self.microenv.position_to_voxel(position);

            let cell = &mut self.geometry.cells[i];
            cell.update_oxygen_status(oxygen, dt);
            cell.absorb_drug(drug, dt, &mut self.rng);

            let consumption = cell.oxygen_consumption();
            let toxicity = cell.toxicity_emission(drug);
            let divides = cell.update_growth(oxygen, dt, &mut self.rng);
            if divides {
                daughters.push(cell.divide(next_id, &mut self.rng));
                next_id += 1;
            }

            if consumption > 0.0 {
                if let Some(field) = self.microenv.field_mut("oxygen") {
                    field.add_sink(voxel, consumption);
                }
            }
            if toxicity > 0.0 {
                if let Some(field) = self.microenv.field_mut("toxicity_signal") {
                    field.add_source(voxel, toxicity);
                }
            }
        }

        if !daughters.is_empty() {
            self.geometry.cells.extend(daughters);
            self.geometry.relax_overlaps();
        }
    }

    fn step_immune_cells(&mut self, dt: f32) {
        let TumorGeometry {
            cells,
            immune_cells,
            ..
        } = &mut self.geometry;
        for immune in immune_cells.iter_mut() {
            immune.update(dt, cells, &mut self.rng);
        }
        for immune in self.geometry.immune_cells.iter() {
            immune.secrete(&mut self.microenv);
        }
    }

    /// Vessels feed the fields at their own voxel; diffusion spreads the
    /// supply over their effective radius.
    fn apply_vessel_sources(&mut self) {
        for vessel in &self.geometry.vessels {
            let voxel = self.microenv.position_to_voxel(vessel.position);
            if let Some(oxygen) = self.microenv.field_mut("oxygen") {
                oxygen.add_source(voxel, vessel.oxygen_supply * 0.5);
            }
            let drug_in = vessel.effective_drug_supply();
            if drug_in > 0.0 {
                if let Some(drug) = self.microenv.field_mut("drug") {
                    drug.add_source(voxel, drug_in);
                }
            }
        }
    }

    fn step_bots(&mut self) {
        let TumorNanobotModel {
            bots,
            microenv,
            geometry,
            policy,
            config,
            rng,
            guidance,
            errors,
            telemetry,
            total_deliveries,
            total_drug_delivered,
            ..
        } = self;

        for bot in bots.iter_mut() {
            let mut ctx = BotContext {
                microenv: &mut *microenv,
                geometry: &mut *geometry,
                guidance: guidance.get(&bot.id).copied(),
                policy: policy.as_deref(),
                chemotaxis_weights: &config.chemotaxis_weights,
            };
            let outcome = bot.step(&mut ctx, rng);

            if outcome.delivered > 0.0 {
                *total_deliveries += 1;
                *total_drug_delivered += outcome.delivered;
                telemetry.record(&TelemetryEvent::now(TelemetryEventKind::DrugDelivery {
                    bot: bot.id,
                    position: [bot.position.x, bot.position.y],
                    amount: outcome.delivered,
                }));
            }
            if let Some(failure) = outcome.policy_failure {
                warn!(error = %failure, "decision policy failed, agent exploring");
                errors.push(failure);
            }
        }
    }

    /// Report each cell death exactly once, whatever pathway caused it.
    fn flush_death_events(&mut self) {
        for cell in &self.geometry.cells {
            if cell.is_alive || self.reported_dead.contains(&cell.id) {
                continue;
            }
            self.reported_dead.insert(cell.id);
            let cause = cell.cause_of_death.unwrap_or(CauseOfDeath::Necrosis);
            if matches!(cause, CauseOfDeath::Apoptosis | CauseOfDeath::ImmuneAttack) {
                self.cells_killed += 1;
            }
            self.telemetry
                .record(&TelemetryEvent::now(TelemetryEventKind::CellKilled {
                    cell: cell.id,
                    position: [cell.position.x, cell.position.y],
                    cause,
                }));
        }
    }

    pub fn snapshot(&self) -> StepSnapshot {
        let substrates = self
            .microenv
            .substrate_names()
            .map(|name| {
                let summary = self
                    .microenv
                    .field(name)
                    .map(|f| f.summary())
                    .unwrap_or(crate::microenv::substrate::SubstrateSummary {
                        mean: 0.0,
                        min: 0.0,
                        max: 0.0,
                    });
                (name.to_string(), summary)
            })
            .collect();

        StepSnapshot {
            step: self.step_count,
            time: self.microenv.time,
            tumor: self.geometry.statistics(),
            bots: self
                .bots
                .iter()
                .map(|b| BotSnapshot {
                    id: b.id,
                    position: [b.position.x, b.position.y],
                    state: b.state,
                    payload: b.payload,
                    deliveries: b.deliveries,
                })
                .collect(),
            substrates,
            total_deliveries: self.total_deliveries,
            total_drug_delivered: self.total_drug_delivered,
            cells_killed: self.cells_killed,
            errors_last_step: self.errors.len(),
        }
    }

    fn record_field_frame(&mut self) {
        let fields = self
            .microenv
            .substrate_names()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .into_iter()
            .filter_map(|name| self.substrate_snapshot(&name))
            .collect();
        self.field_history.push(FieldFrame {
            step: self.step_count,
            time: self.microenv.time,
            fields,
        });
    }

    /// Full-grid dump of one substrate. The model records one frame of
    /// these per `field_snapshot_interval` steps into `field_history`; the
    /// grids are too large to include in every step snapshot.
    pub fn substrate_snapshot(&self, name: &str) -> Option<SubstrateSnapshot> {
        self.microenv.field(name).map(|f| SubstrateSnapshot {
            name: name.to_string(),
            shape: f.shape(),
            values: f.values().to_vec(),
        })
    }
}

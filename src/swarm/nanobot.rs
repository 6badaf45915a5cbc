//! A single drug-delivery nanobot.
//!
//! Five-state machine: SEARCHING hunts for a target by direct proximity,
//! queen guidance, policy advice, and chemotaxis, in that order; TARGETING
//! closes on a locked cell; DELIVERING pumps payload into it; RETURNING
//! docks at a vessel; RELOADING refills and goes out again. Movement is
//! heading-based with inertia so trajectories curve instead of jittering.

use std::collections::BTreeMap;

use glam::Vec2;
use rand::Rng;
use serde::Serialize;
use tracing::debug;

use crate::microenv::Microenvironment;
use crate::policy::{DecisionPolicy, PolicyAction, PolicyObservation};
use crate::tumor::cell::CellPhase;
use crate::tumor::TumorGeometry;

/// µm traveled per step.
pub const SPEED: f32 = 30.0;
/// µg of drug a bot can carry.
pub const MAX_PAYLOAD: f32 = 20.0;
/// µg pumped into the target per delivery tick.
pub const DELIVERY_RATE: f32 = 2.0;
/// µm within which a locked target is captured.
pub const CAPTURE_RADIUS: f32 = 5.0;
/// µm within which a bot docks at a vessel.
pub const DOCK_RADIUS: f32 = 10.0;
/// µg refilled per reloading tick.
pub const RELOAD_RATE: f32 = 5.0;
/// Fraction of capacity at which a reloading bot resumes the search.
pub const RESUME_FRACTION: f32 = 0.9;
/// µm radius of the direct target search.
pub const SEARCH_RADIUS: f32 = 30.0;
/// Minimum payload worth engaging a target with.
pub const MIN_ENGAGE_PAYLOAD: f32 = 2.0;
/// µm radius when a policy Target action is allowed to lock.
pub const POLICY_LOCK_RADIUS: f32 = 100.0;
/// Deposits per delivery tick.
pub const TRAIL_DEPOSIT: f32 = 3.0;
pub const CHEMOKINE_DEPOSIT: f32 = 4.0;
/// Alarm raised when the decision policy fails.
pub const ALARM_DEPOSIT: f32 = 5.0;
/// µm inside the tumor edge that an escaped bot is snapped back to.
pub const EDGE_MARGIN: f32 = 5.0;
/// µm: a returning bot farther than this from every vessel gets a
/// half-speed correction toward the nearest one.
pub const STRAY_RETURN_DISTANCE: f32 = 100.0;
/// Radius of the neighborhood summarized for the decision policy.
pub const OBSERVATION_RADIUS: f32 = 50.0;

const HISTORY_LEN: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BotState {
    Searching,
    Targeting,
    Delivering,
    Returning,
    Reloading,
}

/// Everything a bot needs to see and touch during one step. The model
/// destructures itself to hand these out with disjoint borrows.
pub struct BotContext<'a> {
    pub microenv: &'a mut Microenvironment,
    pub geometry: &'a mut TumorGeometry,
    /// Direction suggested by the queen for this bot, if any.
    pub guidance: Option<Vec2>,
    pub policy: Option<&'a dyn DecisionPolicy>,
    pub chemotaxis_weights: &'a BTreeMap<String, f32>,
}

/// What a step did, for the model to fold into metrics and telemetry.
#[derive(Default)]
pub struct BotOutcome {
    pub delivered: f32,
    pub killed: Option<(u32, Vec2)>,
    pub policy_failure: Option<String>,
}

pub struct Nanobot {
    pub id: u32,
    pub position: Vec2,
    pub heading: Vec2,
    pub state: BotState,
    pub payload: f32,
    /// Index into the geometry's cell vec, revalidated every step.
    pub target_cell: Option<usize>,
    pub target_vessel: Option<usize>,
    pub deliveries: usize,
    pub drug_delivered: f32,
    pub history: Vec<Vec2>,
}

impl Nanobot {
    pub fn new(id: u32, position: Vec2) -> Self {
        Nanobot {
            id,
            position,
            heading: Vec2::X,
            state: BotState::Searching,
            payload: MAX_PAYLOAD,
            target_cell: None,
            target_vessel: None,
            deliveries: 0,
            drug_delivered: 0.0,
            history: Vec::new(),
        }
    }

    /// Execute one state-machine transition, then enforce the boundary
    /// rules on wherever the bot ended up.
    pub fn step<R: Rng>(&mut self, ctx: &mut BotContext, rng: &mut R) -> BotOutcome {
        let mut outcome = BotOutcome::default();

        match self.state {
            BotState::Searching => self.step_searching(ctx, rng, &mut outcome),
            BotState::Targeting => self.step_targeting(ctx),
            BotState::Delivering => self.step_delivering(ctx, &mut outcome),
            BotState::Returning => self.step_returning(ctx),
            BotState::Reloading => self.step_reloading(),
        }

        self.enforce_boundary(ctx);
        self.push_history();
        outcome
    }

    /// SEARCHING resolves in a fixed order: direct proximity lock, queen
    /// guidance, policy advice, weighted chemotaxis, random walk.
    fn step_searching<R: Rng>(
        &mut self,
        ctx: &mut BotContext,
        rng: &mut R,
        outcome: &mut BotOutcome,
    ) {
        if self.payload < MIN_ENGAGE_PAYLOAD {
            self.target_vessel = nearest_vessel_index(ctx.geometry, self.position);
            self.state = BotState::Returning;
            return;
        }

        // 1. Direct search: nearest living cell in range, hypoxic preferred,
        //    and only inside the tumor boundary.
        if let Some(idx) = self.find_direct_target(ctx.geometry, SEARCH_RADIUS) {
            self.target_cell = Some(idx);
            self.state = BotState::Targeting;
            debug!(bot = self.id, cell = idx, "locked target");
            return;
        }

        // 2. Queen guidance.
        if let Some(direction) = ctx.guidance {
            if direction.length_squared() > 0.0 {
                self.steer(direction, rng);
                return;
            }
        }

        // 3. Decision policy. A failing policy raises an alarm and falls
        //    through to chemotaxis; it never aborts the step.
        if let Some(policy) = ctx.policy {
            let observation = self.observe(ctx);
            match policy.decide(&observation) {
                Ok(PolicyAction::Target) => {
                    if let Some(idx) = self.find_direct_target(ctx.geometry, POLICY_LOCK_RADIUS) {
                        self.target_cell = Some(idx);
                        self.state = BotState::Targeting;
                        return;
                    }
                }
                Ok(PolicyAction::FollowTrail) => {
                    let gradient = ctx.microenv.gradient_at("trail", self.position);
                    if gradient.length_squared() > 0.0 {
                        self.steer(gradient, rng);
                        return;
                    }
                }
                Ok(PolicyAction::Return) => {
                    self.target_vessel = nearest_vessel_index(ctx.geometry, self.position);
                    self.state = BotState::Returning;
                    return;
                }
                Ok(PolicyAction::Explore) => {}
                Err(e) => {
                    let voxel = ctx.microenv.position_to_voxel(self.position);
                    if let Some(alarm) = ctx.microenv.field_mut("alarm") {
                        alarm.add_source(voxel, ALARM_DEPOSIT);
                    }
                    outcome.policy_failure = Some(format!("bot {}: {e:#}", self.id));
                }
            }
        }

        // 4. Multi-substrate chemotaxis.
        let mut combined = Vec2::ZERO;
        for (name, weight) in ctx.chemotaxis_weights {
            combined += ctx.microenv.gradient_at(name, self.position) * *weight;
        }
        if combined.length_squared() > 1e-12 {
            self.steer(combined, rng);
            return;
        }

        // 5. Nothing to follow: wander inside the tumor, head for the
        //    center when outside it.
        if ctx.geometry.is_inside_tumor(self.position) {
            let angle = rng.gen_range(0.0..std::f32::consts::TAU);
            self.steer(Vec2::from_angle(angle), rng);
        } else {
            self.steer(ctx.geometry.center - self.position, rng);
        }
    }

    fn step_targeting(&mut self, ctx: &mut BotContext) {
        let Some(idx) = self.target_cell else {
            self.state = BotState::Searching;
            return;
        };
        let target_alive = ctx
            .geometry
            .cells
            .get(idx)
            .map(|c| c.is_alive)
            .unwrap_or(false);
        if !target_alive {
            self.target_cell = None;
            self.state = BotState::Searching;
            return;
        }

        let target_pos = ctx.geometry.cells[idx].position;
        self.move_toward(target_pos, SPEED);
        if self.position.distance(target_pos) <= CAPTURE_RADIUS {
            self.state = BotState::Delivering;
        }
    }

    fn step_delivering(&mut self, ctx: &mut BotContext, outcome: &mut BotOutcome) {
        let Some(idx) = self.target_cell else {
            self.begin_return(ctx.geometry);
            return;
        };
        if ctx.geometry.cells.get(idx).map(|c| c.is_alive) != Some(true) {
            self.begin_return(ctx.geometry);
            return;
        }

        let amount = DELIVERY_RATE.min(self.payload);
        self.payload -= amount;
        self.deliveries += 1;
        self.drug_delivered += amount;
        outcome.delivered = amount;

        let voxel = ctx.microenv.position_to_voxel(self.position);
        if let Some(drug) = ctx.microenv.field_mut("drug") {
            drug.add_source(voxel, amount);
        }
        if let Some(trail) = ctx.microenv.field_mut("trail") {
            trail.add_source(voxel, TRAIL_DEPOSIT);
        }
        if let Some(chemokine) = ctx.microenv.field_mut("chemokine_signal") {
            chemokine.add_source(voxel, CHEMOKINE_DEPOSIT);
        }

        let cell = &mut ctx.geometry.cells[idx];
        let killed = cell.accumulate_drug(amount);
        if killed {
            outcome.killed = Some((cell.id, cell.position));
            debug!(bot = self.id, cell = cell.id, "target eliminated");
        }

        if killed || self.payload < MIN_ENGAGE_PAYLOAD {
            self.begin_return(ctx.geometry);
        }
    }

    fn step_returning(&mut self, ctx: &mut BotContext) {
        let Some(idx) = self
            .target_vessel
            .filter(|i| *i < ctx.geometry.vessels.len())
            .or_else(|| nearest_vessel_index(ctx.geometry, self.position))
        else {
            self.state = BotState::Searching;
            return;
        };
        self.target_vessel = Some(idx);

        let vessel_pos = ctx.geometry.vessels[idx].position;
        self.move_toward(vessel_pos, SPEED);
        if self.position.distance(vessel_pos) <= DOCK_RADIUS {
            self.state = BotState::Reloading;
        }
    }

    fn step_reloading(&mut self) {
        self.payload = (self.payload + RELOAD_RATE).min(MAX_PAYLOAD);
        if self.payload >= RESUME_FRACTION * MAX_PAYLOAD {
            self.target_vessel = None;
            self.state = BotState::Searching;
        }
    }

    /// Nearest living cell within `radius`, hypoxic cells taking priority,
    /// restricted to cells inside the tumor boundary.
    fn find_direct_target(&self, geometry: &TumorGeometry, radius: f32) -> Option<usize> {
        let eligible = |phase_filter: Option<CellPhase>| {
            geometry
                .cells
                .iter()
                .enumerate()
                .filter(|(_, c)| {
                    c.is_alive
                        && geometry.is_inside_tumor(c.position)
                        && phase_filter.map(|p| c.phase == p).unwrap_or(true)
                        && self.position.distance(c.position) <= radius
                })
                .min_by(|(_, a), (_, b)| {
                    self.position
                        .distance_squared(a.position)
                        .total_cmp(&self.position.distance_squared(b.position))
                })
                .map(|(i, _)| i)
        };
        eligible(Some(CellPhase::Hypoxic)).or_else(|| eligible(None))
    }

    fn begin_return(&mut self, geometry: &TumorGeometry) {
        self.target_cell = None;
        self.target_vessel = nearest_vessel_index(geometry, self.position);
        self.state = BotState::Returning;
    }

    /// Inertial steering: blend the desired direction into the current
    /// heading, perturb slightly, advance one step.
    fn steer<R: Rng>(&mut self, desired: Vec2, rng: &mut R) {
        let desired = desired.normalize_or_zero();
        if desired == Vec2::ZERO {
            return;
        }
        let blended = (desired * 0.7 + self.heading * 0.3).normalize_or_zero();
        let jitter = rng.gen_range(-0.1..0.1);
        self.heading = Vec2::from_angle(jitter).rotate(blended);
        self.position += self.heading * SPEED;
    }

    /// Direct pursuit without inertia; never overshoots the goal.
    fn move_toward(&mut self, goal: Vec2, speed: f32) {
        let delta = goal - self.position;
        let distance = delta.length();
        if distance <= f32::EPSILON {
            return;
        }
        self.heading = delta / distance;
        self.position += self.heading * speed.min(distance);
    }

    /// Boundary rules, applied after every movement in precedence order:
    /// domain clamp first, then tumor containment for bots with no business
    /// outside, then a corridor correction for returning bots that have
    /// strayed far from the vasculature.
    fn enforce_boundary(&mut self, ctx: &mut BotContext) {
        let (x0, x1) = ctx.microenv.x_range;
        let (y0, y1) = ctx.microenv.y_range;
        self.position.x = self.position.x.clamp(x0, x1);
        self.position.y = self.position.y.clamp(y0, y1);

        let geometry = &ctx.geometry;
        if geometry.is_inside_tumor(self.position) {
            return;
        }

        let targeting_inside = self
            .target_cell
            .and_then(|i| geometry.cells.get(i))
            .map(|c| geometry.is_inside_tumor(c.position))
            .unwrap_or(false);
        let exempt = matches!(self.state, BotState::Returning | BotState::Reloading)
            || self.payload < MIN_ENGAGE_PAYLOAD
            || targeting_inside;

        if !exempt {
            let ray = (self.position - geometry.center).normalize_or_zero();
            self.position = geometry.center + ray * (geometry.tumor_radius - EDGE_MARGIN);
            self.target_cell = None;
            self.state = BotState::Searching;
            return;
        }

        if self.state == BotState::Returning {
            if let Some(idx) = nearest_vessel_index(geometry, self.position) {
                let vessel_pos = geometry.vessels[idx].position;
                if self.position.distance(vessel_pos) > STRAY_RETURN_DISTANCE {
                    self.move_toward(vessel_pos, SPEED * 0.5);
                }
            }
        }
    }

    /// Situation report for the decision policy.
    fn observe(&self, ctx: &BotContext) -> PolicyObservation {
        let at = |name: &str| ctx.microenv.concentration_at(name, self.position);
        let cytokines = at("ifn_gamma") + at("tnf_alpha") + at("perforin");

        let mut by_kind: BTreeMap<String, usize> = BTreeMap::new();
        let mut resistance_sum = 0.0;
        let mut nearby = 0usize;
        let mut stem = 0usize;
        for cell in ctx.geometry.living_cells() {
            if self.position.distance(cell.position) > OBSERVATION_RADIUS {
                continue;
            }
            nearby += 1;
            resistance_sum += cell.resistance_level;
            *by_kind
                .entry(format!("{:?}", cell.kind).to_lowercase())
                .or_default() += 1;
            if cell.kind == crate::tumor::cell::CellKind::Stem {
                stem += 1;
            }
        }
        let active_immune = ctx
            .geometry
            .immune_cells
            .iter()
            .filter(|c| c.is_active && self.position.distance(c.position) <= OBSERVATION_RADIUS)
            .count();

        PolicyObservation {
            position: [self.position.x, self.position.y],
            payload: self.payload,
            max_payload: MAX_PAYLOAD,
            deliveries: self.deliveries,
            oxygen: at("oxygen"),
            drug: at("drug"),
            trail: at("trail"),
            alarm: at("alarm"),
            cytokines,
            nearby_cells_by_kind: by_kind,
            nearby_mean_resistance: if nearby > 0 {
                resistance_sum / nearby as f32
            } else {
                0.0
            },
            nearby_stem_count: stem,
            nearby_active_immune: active_immune,
            nearest_vessel_bbb_permeability: ctx
                .geometry
                .find_nearest_vessel(self.position)
                .map(|v| v.bbb_permeability)
                .unwrap_or(0.0),
        }
    }

    fn push_history(&mut self) {
        self.history.push(self.position);
        if self.history.len() > HISTORY_LEN {
            self.history.remove(0);
        }
    }
}

fn nearest_vessel_index(geometry: &TumorGeometry, position: Vec2) -> Option<usize> {
    geometry
        .vessels
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            position
                .distance_squared(a.position)
                .total_cmp(&position.distance_squared(b.position))
        })
        .map(|(i, _)| i)
}

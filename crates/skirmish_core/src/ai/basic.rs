//! A small rule-based AI used by the headless runner and the test fixtures.
//!
//! Every few ticks it sends idle harvesters to the nearest known deposit,
//! keeps producers busy while the stockpile allows, turns idle fighters on
//! the first enemy seen near home and sends a wave at the oldest enemy
//! warning position once enough fighters idle at once.

use serde::{Deserialize, Serialize};

use super::brain::AiBrain;
use super::context::{AiContext, AiOrder, CommandSpec, OrderTarget, UnitRef};
use crate::components::{CommandResult, Unit};
use crate::error::{GameError, Result};
use crate::tech::{CommandClass, UnitType};

/// Tuning for [`BasicAi`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicAiSettings {
    /// Ticks between decisions.
    pub think_interval: u64,
    /// Distance from home at which enemies draw a response.
    pub defence_radius: i32,
    /// Stop producing at this many units.
    pub max_units: usize,
    /// Harvesters wanted before fighters are produced.
    pub target_harvesters: usize,
    /// Idle fighters needed to attack a warning position.
    pub wave_size: usize,
}

impl Default for BasicAiSettings {
    fn default() -> Self {
        Self {
            think_interval: 5,
            defence_radius: 16,
            max_units: 24,
            target_harvesters: 5,
            wave_size: 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Memory {
    orders: u64,
    produced: u64,
    waves: u64,
}

/// Rule-based AI brain.
#[derive(Debug, Clone, Default)]
pub struct BasicAi {
    settings: BasicAiSettings,
    memory: Memory,
}

fn is_harvester(ut: &UnitType) -> bool {
    ut.first_command_of_class(CommandClass::Harvest).is_some()
}

fn is_fighter(ut: &UnitType) -> bool {
    ut.attack > 0
        && ut.first_command_of_class(CommandClass::Attack).is_some()
        && !is_harvester(ut)
}

impl BasicAi {
    /// Brain with the given tuning.
    #[must_use]
    pub fn new(settings: BasicAiSettings) -> Self {
        Self {
            settings,
            memory: Memory::default(),
        }
    }

    /// Orders issued so far.
    #[must_use]
    pub fn orders_issued(&self) -> u64 {
        self.memory.orders
    }

    fn issue(&mut self, ctx: &mut AiContext<'_>, order: AiOrder) -> Result<CommandResult> {
        let (result, message) = ctx.issue_command(order)?;
        self.memory.orders += 1;
        if result != CommandResult::Success {
            ctx.print_log(3, &format!("Order {order:?} failed: {result:?} {message}"));
        }
        Ok(result)
    }

    fn send_harvesters(&mut self, ctx: &mut AiContext<'_>, units: &[(Unit, UnitType)]) -> Result<()> {
        let resources = ctx.resource_types();
        for (unit, ut) in units.iter().filter(|(u, ut)| u.is_idle() && is_harvester(ut)) {
            for rt in &resources {
                let Some(command) = ut.first_harvest_command(rt.id) else {
                    continue;
                };
                let command = command.id;
                if let Some(pos) = ctx.nearest_sighted_resource(rt.id, unit.pos, true) {
                    ctx.print_log(3, &format!("Unit {} harvests {} at {pos}", unit.id, rt.name));
                    self.issue(
                        ctx,
                        AiOrder::new(
                            UnitRef::Id(unit.id),
                            CommandSpec::Type(command),
                            OrderTarget::Position(pos),
                        ),
                    )?;
                    break;
                }
            }
        }
        Ok(())
    }

    fn produce(&mut self, ctx: &mut AiContext<'_>, units: &[(Unit, UnitType)]) -> Result<()> {
        if units.len() >= self.settings.max_units {
            return Ok(());
        }
        let harvesters = units.iter().filter(|(_, ut)| is_harvester(ut)).count();
        let want_harvester = harvesters < self.settings.target_harvesters;

        for (unit, ut) in units.iter().filter(|(u, _)| u.is_idle()) {
            let mut options: Vec<_> = ut
                .command_types
                .iter()
                .filter(|ct| ct.class == CommandClass::Produce)
                .filter_map(|ct| Some((ct.id, ctx.unit_type(ct.produces?)?)))
                .collect();
            // Preferred product first; stable so tech order breaks ties.
            options.sort_by_key(|(_, product)| is_harvester(product) != want_harvester);

            for (command, product) in options {
                if !ctx.check_costs(product.id)
                    || !ctx.reqs_ok(command)
                    || !ctx.unit_type_reqs_ok(product.id)
                {
                    continue;
                }
                let result = self.issue(
                    ctx,
                    AiOrder::new(
                        UnitRef::Id(unit.id),
                        CommandSpec::Type(command),
                        OrderTarget::None,
                    ),
                )?;
                if result == CommandResult::Success {
                    self.memory.produced += 1;
                    ctx.print_log(2, &format!("Producing {}", product.name));
                    break;
                }
            }
        }
        Ok(())
    }

    /// Returns whether any fighter was sent.
    fn defend(&mut self, ctx: &mut AiContext<'_>, units: &[(Unit, UnitType)]) -> Result<bool> {
        let Some(enemy) = ctx.first_sighted_enemy(self.settings.defence_radius) else {
            return Ok(false);
        };
        let mut sent = false;
        for (unit, _) in units.iter().filter(|(u, ut)| u.is_idle() && is_fighter(ut)) {
            self.issue(
                ctx,
                AiOrder::new(
                    UnitRef::Id(unit.id),
                    CommandSpec::Class(CommandClass::Attack),
                    OrderTarget::Unit(enemy.id),
                ),
            )?;
            sent = true;
        }
        Ok(sent)
    }

    fn send_wave(&mut self, ctx: &mut AiContext<'_>, units: &[(Unit, UnitType)]) -> Result<()> {
        let Some(&target) = ctx.enemy_warning_positions().first() else {
            return Ok(());
        };
        let fighters: Vec<_> = units
            .iter()
            .filter(|(u, ut)| u.is_idle() && is_fighter(ut))
            .map(|(u, _)| u.id)
            .collect();
        if fighters.len() < self.settings.wave_size {
            return Ok(());
        }
        let group = i32::try_from(self.memory.waves).unwrap_or(i32::MAX);
        for id in fighters {
            self.issue(
                ctx,
                AiOrder::new(
                    UnitRef::Id(id),
                    CommandSpec::Class(CommandClass::Attack),
                    OrderTarget::Position(target),
                )
                .in_group(group),
            )?;
        }
        ctx.remove_enemy_warning_position(target);
        self.memory.waves += 1;
        ctx.print_log(1, &format!("Attack wave {group} sent to {target}"));
        Ok(())
    }
}

impl AiBrain for BasicAi {
    fn init(&mut self, ctx: &mut AiContext<'_>) -> Result<()> {
        ctx.print_log(1, "Basic AI started");
        Ok(())
    }

    fn update(&mut self, ctx: &mut AiContext<'_>) -> Result<()> {
        if ctx.tick_counter() % self.settings.think_interval.max(1) != 0 {
            return Ok(());
        }
        let units: Vec<(Unit, UnitType)> = ctx
            .my_units()
            .into_iter()
            .filter_map(|u| {
                let ut = ctx.unit_type(u.unit_type)?;
                Some((u, ut))
            })
            .collect();

        if !self.defend(ctx, &units)? {
            self.send_wave(ctx, &units)?;
        }
        self.send_harvesters(ctx, &units)?;
        self.produce(ctx, &units)
    }

    fn save_state(&self) -> Option<String> {
        ron::to_string(&self.memory).ok()
    }

    fn load_state(&mut self, state: &str) -> Result<()> {
        self.memory = ron::from_str(state)
            .map_err(|e| GameError::SaveState(format!("Basic AI state: {e}")))?;
        Ok(())
    }
}

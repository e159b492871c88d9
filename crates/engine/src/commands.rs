//! World action commands and their registry.
//!
//! Every player-visible verb is a [`Command`] registered by name at startup.
//! Instant commands (equip, use_item, ...) run inside `handle_action`;
//! durational ones (move, rest, attack) run as the terminal effect when the
//! scheduled action completes. `validate` runs before scheduling either way,
//! so a request that can never succeed is rejected before it occupies the
//! actor.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use wayfarer_domain::{
    ChannelId, CharacterId, CraftingJob, ItemId, ItemOwner, LocationId, NpcId, PartyId, TenantId,
};
use wayfarer_shared::ActionOutcome;

use crate::error::EngineError;
use crate::ports::Ports;
use crate::state::WorldState;

/// Fraction of max hp restored by a completed rest.
const REST_HEAL_FRACTION: f64 = 0.25;
/// Flat attack damage before the strength scaling kicks in.
const BASE_ATTACK_DAMAGE: i32 = 1;
/// One extra point of damage per this many points of strength.
const ATTACK_STRENGTH_DIVISOR: f64 = 4.0;
/// Crafting time per unit when content declares none.
const DEFAULT_CRAFT_SECONDS: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorRef {
    Character(CharacterId),
    Npc(NpcId),
    Party(PartyId),
}

impl ActorRef {
    pub fn as_character(&self) -> Option<CharacterId> {
        match self {
            Self::Character(id) => Some(*id),
            _ => None,
        }
    }
}

/// Everything a command may rely on besides its own parameters.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub tenant: TenantId,
    pub channel: ChannelId,
    pub actor: ActorRef,
}

impl OperationContext {
    /// Context for engine-driven execution (tick completions, auto
    /// transitions) that no chat channel originated.
    pub fn internal(tenant: TenantId, actor: ActorRef) -> Self {
        Self {
            tenant,
            channel: ChannelId::new("internal"),
            actor,
        }
    }
}

#[async_trait]
pub trait Command: Send + Sync {
    fn name(&self) -> &'static str;

    /// Instant commands execute inside `handle_action`; the rest are
    /// scheduled and execute on completion.
    fn is_instant(&self) -> bool {
        false
    }

    /// Pre-flight check run before the action is scheduled or executed.
    /// `EngineError::Validation` here becomes a failed outcome for the
    /// requester.
    async fn validate(
        &self,
        _state: &WorldState,
        _ports: &Ports,
        _ctx: &OperationContext,
        _params: &Value,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    async fn execute(
        &self,
        state: &mut WorldState,
        ports: &Ports,
        ctx: &OperationContext,
        params: &Value,
    ) -> Result<ActionOutcome, EngineError>;
}

pub struct CommandRegistry {
    commands: HashMap<&'static str, Arc<dyn Command>>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::with_builtin_handlers()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
        }
    }

    /// The standard verb set. Hosts may register more before wiring the
    /// service.
    pub fn with_builtin_handlers() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(MoveCommand));
        registry.register(Arc::new(RestCommand));
        registry.register(Arc::new(AttackCommand));
        registry.register(Arc::new(UseItemCommand));
        registry.register(Arc::new(EquipCommand));
        registry.register(Arc::new(UnequipCommand));
        registry.register(Arc::new(CraftCommand));
        registry.register(Arc::new(DropCommand));
        registry.register(Arc::new(PickupCommand));
        registry
    }

    pub fn register(&mut self, command: Arc<dyn Command>) {
        self.commands.insert(command.name(), command);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.commands.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

// =============================================================================
// Parameter helpers
// =============================================================================

fn param_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

fn param_f64(params: &Value, key: &str) -> Option<f64> {
    params.get(key).and_then(Value::as_f64)
}

fn require_character(ctx: &OperationContext) -> Result<CharacterId, EngineError> {
    ctx.actor
        .as_character()
        .ok_or_else(|| EngineError::validation("Only characters can do that"))
}

fn character_location(
    state: &WorldState,
    tenant: &TenantId,
    character: CharacterId,
) -> Result<LocationId, EngineError> {
    state
        .characters
        .get(tenant, character)
        .and_then(|c| c.location_id)
        .ok_or_else(|| EngineError::validation("You are nowhere in particular"))
}

/// Resolve an `item` parameter against a character's belongings. Accepts an
/// instance id or a template key.
fn resolve_owned_item(
    state: &WorldState,
    tenant: &TenantId,
    character: CharacterId,
    params: &Value,
) -> Result<ItemId, EngineError> {
    let reference = param_str(params, "item")
        .ok_or_else(|| EngineError::validation("No item named"))?;
    let owner = ItemOwner::Character(character);

    if let Ok(id) = ItemId::parse(reference) {
        if state
            .items
            .get(tenant, id)
            .is_some_and(|i| i.owner == owner)
        {
            return Ok(id);
        }
    }
    state
        .items
        .find_by_template(tenant, &owner, reference)
        .ok_or_else(|| EngineError::validation(format!("You are not carrying '{reference}'")))
}

/// Effective stats with base values as the floor, the map the rules adapter
/// rolls against.
pub(crate) fn stats_for_rules(
    state: &WorldState,
    tenant: &TenantId,
    character: CharacterId,
) -> HashMap<String, f64> {
    state
        .characters
        .get(tenant, character)
        .map(|c| {
            let mut stats = c.base_stats.clone();
            for (key, value) in &c.effective_stats {
                stats.insert(key.clone(), *value);
            }
            stats
        })
        .unwrap_or_default()
}

// =============================================================================
// Built-in commands
// =============================================================================

/// Relocate along a declared exit. Durational.
pub struct MoveCommand;

#[async_trait]
impl Command for MoveCommand {
    fn name(&self) -> &'static str {
        "move"
    }

    async fn validate(
        &self,
        state: &WorldState,
        _ports: &Ports,
        ctx: &OperationContext,
        params: &Value,
    ) -> Result<(), EngineError> {
        let destination = parse_destination(params)?;
        if !state.locations.contains(&ctx.tenant, destination) {
            return Err(EngineError::validation("That place does not exist"));
        }
        let character = require_character(ctx)?;
        let current = state
            .characters
            .get(&ctx.tenant, character)
            .and_then(|c| c.location_id);
        // A character not yet placed in the world may go anywhere known.
        if let Some(from) = current {
            if from == destination {
                return Err(EngineError::validation("You are already there"));
            }
            if !state.locations.is_exit(&ctx.tenant, from, destination) {
                return Err(EngineError::validation("No path leads there from here"));
            }
        }
        Ok(())
    }

    async fn execute(
        &self,
        state: &mut WorldState,
        _ports: &Ports,
        ctx: &OperationContext,
        params: &Value,
    ) -> Result<ActionOutcome, EngineError> {
        let destination = parse_destination(params)?;
        let character = require_character(ctx)?;
        state
            .characters
            .update(&ctx.tenant, character, |c| c.location_id = Some(destination));
        let name = state
            .locations
            .get(&ctx.tenant, destination)
            .map(|l| l.name.clone())
            .unwrap_or_else(|| "an unknown place".to_string());
        Ok(ActionOutcome::success("moved", format!("Arrived at {name}.")))
    }
}

fn parse_destination(params: &Value) -> Result<LocationId, EngineError> {
    let raw = param_str(params, "to")
        .ok_or_else(|| EngineError::validation("No destination named"))?;
    LocationId::parse(raw).map_err(|_| EngineError::validation("That place does not exist"))
}

/// Recover a fraction of max hp. Durational.
pub struct RestCommand;

#[async_trait]
impl Command for RestCommand {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn execute(
        &self,
        state: &mut WorldState,
        _ports: &Ports,
        ctx: &OperationContext,
        _params: &Value,
    ) -> Result<ActionOutcome, EngineError> {
        let character = require_character(ctx)?;
        let healed = state
            .characters
            .update(&ctx.tenant, character, |c| {
                let amount = ((f64::from(c.max_hp) * REST_HEAL_FRACTION).ceil() as i32).max(1);
                let before = c.hp;
                c.apply_hp_delta(amount);
                c.hp - before
            })
            .ok_or_else(|| EngineError::validation("No such character"))?;
        Ok(ActionOutcome::success(
            "rested",
            format!("Rested and recovered {healed} hp."),
        ))
    }
}

/// Strike an NPC at the actor's location. Durational; the outcome roll
/// happens on completion.
pub struct AttackCommand;

#[async_trait]
impl Command for AttackCommand {
    fn name(&self) -> &'static str {
        "attack"
    }

    async fn validate(
        &self,
        state: &WorldState,
        _ports: &Ports,
        ctx: &OperationContext,
        params: &Value,
    ) -> Result<(), EngineError> {
        let character = require_character(ctx)?;
        let location = character_location(state, &ctx.tenant, character)?;
        let target = resolve_target(state, &ctx.tenant, location, params)?;
        let alive = state
            .npcs
            .get(&ctx.tenant, target)
            .is_some_and(|n| n.is_alive());
        if !alive {
            return Err(EngineError::validation("That target is already down"));
        }
        Ok(())
    }

    async fn execute(
        &self,
        state: &mut WorldState,
        ports: &Ports,
        ctx: &OperationContext,
        params: &Value,
    ) -> Result<ActionOutcome, EngineError> {
        let character = require_character(ctx)?;
        let location = character_location(state, &ctx.tenant, character)?;
        let target = match resolve_target(state, &ctx.tenant, location, params) {
            Ok(id) => id,
            // The target may have died or left while the swing was underway.
            Err(e) if e.is_validation() => {
                return Ok(ActionOutcome::failure("missed", "Your target is gone."))
            }
            Err(e) => return Err(e),
        };

        let stats = stats_for_rules(state, &ctx.tenant, character);
        let outcome = ports.rules.resolve_outcome("attack", &stats).await;
        if outcome != "success" {
            return Ok(ActionOutcome::success("missed", "The attack goes wide.").without_state_change());
        }

        let strength = stats.get("strength").copied().unwrap_or(0.0);
        let damage = BASE_ATTACK_DAMAGE + (strength / ATTACK_STRENGTH_DIVISOR).floor() as i32;
        let (name, felled) = state
            .npcs
            .update(&ctx.tenant, target, |n| {
                n.apply_hp_delta(-damage);
                (n.name.clone(), !n.is_alive())
            })
            .ok_or_else(|| EngineError::validation("That target is gone"))?;

        let message = if felled {
            format!("Hit {name} for {damage}. {name} goes down!")
        } else {
            format!("Hit {name} for {damage}.")
        };
        Ok(ActionOutcome::success("hit", message))
    }
}

fn resolve_target(
    state: &WorldState,
    tenant: &TenantId,
    location: LocationId,
    params: &Value,
) -> Result<NpcId, EngineError> {
    let reference = param_str(params, "target")
        .ok_or_else(|| EngineError::validation("No target named"))?;
    if let Ok(id) = NpcId::parse(reference) {
        if state
            .npcs
            .get(tenant, id)
            .is_some_and(|n| n.location_id == Some(location))
        {
            return Ok(id);
        }
    }
    state
        .npcs
        .at_location(tenant, location)
        .into_iter()
        .find(|id| {
            state
                .npcs
                .get(tenant, *id)
                .is_some_and(|n| n.name.eq_ignore_ascii_case(reference) || n.template_id == reference)
        })
        .ok_or_else(|| EngineError::validation(format!("No '{reference}' here")))
}

/// Apply an item's effects through the rules capability. Instant.
pub struct UseItemCommand;

#[async_trait]
impl Command for UseItemCommand {
    fn name(&self) -> &'static str {
        "use_item"
    }

    fn is_instant(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        state: &mut WorldState,
        ports: &Ports,
        ctx: &OperationContext,
        params: &Value,
    ) -> Result<ActionOutcome, EngineError> {
        let character = require_character(ctx)?;
        let item_id = resolve_owned_item(state, &ctx.tenant, character, params)?;
        let template_id = state
            .items
            .get(&ctx.tenant, item_id)
            .map(|i| i.template_id.clone())
            .ok_or_else(|| EngineError::validation("That item is gone"))?;
        let template = state
            .content
            .item(&template_id)
            .cloned()
            .ok_or_else(|| EngineError::content(format!("unknown item template '{template_id}'")))?;

        let stats = stats_for_rules(state, &ctx.tenant, character);
        let result = ports.rules.resolve_item_use(&template, &stats).await;

        state.characters.update(&ctx.tenant, character, |c| {
            if result.hp_delta != 0 {
                c.apply_hp_delta(result.hp_delta);
            }
            for status in &result.statuses {
                c.status_effects.push(status.clone());
            }
        });
        if result.consumed {
            state.items.consume(&ctx.tenant, item_id, 1.0);
        }

        let message = if result.message.is_empty() {
            format!("Used {}.", template.name)
        } else {
            result.message.clone()
        };
        Ok(ActionOutcome::success("used", message))
    }
}

/// Equip into a compatible slot, displacing the current occupant. Instant.
pub struct EquipCommand;

#[async_trait]
impl Command for EquipCommand {
    fn name(&self) -> &'static str {
        "equip"
    }

    fn is_instant(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        state: &mut WorldState,
        _ports: &Ports,
        ctx: &OperationContext,
        params: &Value,
    ) -> Result<ActionOutcome, EngineError> {
        let character = require_character(ctx)?;
        let item_id = resolve_owned_item(state, &ctx.tenant, character, params)?;
        let template_id = state
            .items
            .get(&ctx.tenant, item_id)
            .map(|i| i.template_id.clone())
            .ok_or_else(|| EngineError::validation("That item is gone"))?;
        let item_type = state
            .content
            .item(&template_id)
            .map(|t| t.item_type.clone())
            .ok_or_else(|| EngineError::content(format!("unknown item template '{template_id}'")))?;

        let slot = match param_str(params, "slot") {
            Some(requested) => {
                let def = state
                    .content
                    .equip_slots()
                    .iter()
                    .find(|d| d.id == requested)
                    .ok_or_else(|| EngineError::validation(format!("No slot called '{requested}'")))?;
                if !def.accepts(&item_type) {
                    return Err(EngineError::validation(format!(
                        "A {item_type} does not fit in {requested}"
                    )));
                }
                def.id.clone()
            }
            None => state
                .content
                .equip_slots()
                .iter()
                .find(|d| d.accepts(&item_type))
                .map(|d| d.id.clone())
                .ok_or_else(|| {
                    EngineError::validation(format!("Nothing a {item_type} could be equipped to"))
                })?,
        };

        // One occupant per slot.
        let occupant = state
            .items
            .character_items(&ctx.tenant, character)
            .into_iter()
            .find(|id| {
                *id != item_id
                    && state.items.get(&ctx.tenant, *id).is_some_and(|i| {
                        i.is_equipped() && i.state.slot.as_deref() == Some(slot.as_str())
                    })
            });
        if let Some(displaced) = occupant {
            state.items.update(&ctx.tenant, displaced, |i| i.unequip());
        }

        state
            .items
            .update(&ctx.tenant, item_id, |i| i.equip(slot.clone()));
        state.recompute_effective_stats(&ctx.tenant, character);

        Ok(ActionOutcome::success(
            "equipped",
            format!("Equipped {template_id} in {slot}."),
        ))
    }
}

/// Take an equipped item off. Instant.
pub struct UnequipCommand;

#[async_trait]
impl Command for UnequipCommand {
    fn name(&self) -> &'static str {
        "unequip"
    }

    fn is_instant(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        state: &mut WorldState,
        _ports: &Ports,
        ctx: &OperationContext,
        params: &Value,
    ) -> Result<ActionOutcome, EngineError> {
        let character = require_character(ctx)?;

        let item_id = if params.get("item").is_some() {
            resolve_owned_item(state, &ctx.tenant, character, params)?
        } else if let Some(slot) = param_str(params, "slot") {
            state
                .items
                .character_items(&ctx.tenant, character)
                .into_iter()
                .find(|id| {
                    state.items.get(&ctx.tenant, *id).is_some_and(|i| {
                        i.is_equipped() && i.state.slot.as_deref() == Some(slot)
                    })
                })
                .ok_or_else(|| EngineError::validation(format!("Nothing equipped in {slot}")))?
        } else {
            return Err(EngineError::validation("Name an item or a slot"));
        };

        let was_equipped = state
            .items
            .update(&ctx.tenant, item_id, |i| {
                let was = i.is_equipped();
                i.unequip();
                was
            })
            .ok_or_else(|| EngineError::validation("That item is gone"))?;
        if !was_equipped {
            return Ok(ActionOutcome::failure("not_equipped", "That is not equipped."));
        }

        state.recompute_effective_stats(&ctx.tenant, character);
        Ok(ActionOutcome::success("unequipped", "Unequipped."))
    }
}

/// Queue a crafting job. Instant; the job itself progresses with world time.
pub struct CraftCommand;

#[async_trait]
impl Command for CraftCommand {
    fn name(&self) -> &'static str {
        "craft"
    }

    fn is_instant(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        state: &mut WorldState,
        ports: &Ports,
        ctx: &OperationContext,
        params: &Value,
    ) -> Result<ActionOutcome, EngineError> {
        let character = require_character(ctx)?;
        let recipe = param_str(params, "recipe")
            .ok_or_else(|| EngineError::validation("No recipe named"))?
            .to_string();
        if state.content.item(&recipe).is_none() {
            return Err(EngineError::validation(format!("No recipe for '{recipe}'")));
        }
        let quantity = param_f64(params, "quantity").unwrap_or(1.0);
        if quantity <= 0.0 {
            return Err(EngineError::validation("Quantity must be positive"));
        }

        let duration = ports
            .rules
            .calculate_duration("craft", params)
            .await
            .unwrap_or(DEFAULT_CRAFT_SECONDS);

        state
            .characters
            .update(&ctx.tenant, character, |c| {
                c.crafting.push(CraftingJob::new(recipe.clone(), duration, quantity));
            })
            .ok_or_else(|| EngineError::validation("No such character"))?;

        Ok(ActionOutcome::success(
            "crafting",
            format!("Started crafting {quantity} x {recipe}."),
        ))
    }
}

/// Put an item on the ground here. Instant.
pub struct DropCommand;

#[async_trait]
impl Command for DropCommand {
    fn name(&self) -> &'static str {
        "drop"
    }

    fn is_instant(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        state: &mut WorldState,
        _ports: &Ports,
        ctx: &OperationContext,
        params: &Value,
    ) -> Result<ActionOutcome, EngineError> {
        let character = require_character(ctx)?;
        let location = character_location(state, &ctx.tenant, character)?;
        let item_id = resolve_owned_item(state, &ctx.tenant, character, params)?;

        let was_equipped = state
            .items
            .get(&ctx.tenant, item_id)
            .is_some_and(|i| i.is_equipped());
        state
            .items
            .move_owner(&ctx.tenant, item_id, ItemOwner::Location(location));
        if was_equipped {
            state.recompute_effective_stats(&ctx.tenant, character);
        }

        Ok(ActionOutcome::success("dropped", "Dropped it."))
    }
}

/// Take an item off the ground here. Instant.
pub struct PickupCommand;

#[async_trait]
impl Command for PickupCommand {
    fn name(&self) -> &'static str {
        "pickup"
    }

    fn is_instant(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        state: &mut WorldState,
        _ports: &Ports,
        ctx: &OperationContext,
        params: &Value,
    ) -> Result<ActionOutcome, EngineError> {
        let character = require_character(ctx)?;
        let location = character_location(state, &ctx.tenant, character)?;

        let reference = param_str(params, "item")
            .ok_or_else(|| EngineError::validation("No item named"))?;
        let ground = ItemOwner::Location(location);
        let item_id = ItemId::parse(reference)
            .ok()
            .filter(|id| {
                state
                    .items
                    .get(&ctx.tenant, *id)
                    .is_some_and(|i| i.owner == ground)
            })
            .or_else(|| state.items.find_by_template(&ctx.tenant, &ground, reference))
            .ok_or_else(|| EngineError::validation(format!("There is no '{reference}' here")))?;

        state
            .items
            .move_owner(&ctx.tenant, item_id, ItemOwner::Character(character));
        Ok(ActionOutcome::success("picked_up", "Picked it up."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use wayfarer_domain::{Character, ItemInstance, Location, NpcInstance, NpcTemplate};

    use crate::test_support;

    fn ctx(tenant: &TenantId, actor: ActorRef) -> OperationContext {
        OperationContext {
            tenant: tenant.clone(),
            channel: ChannelId::new("channel-1"),
            actor,
        }
    }

    #[tokio::test]
    async fn move_rejects_unconnected_destination() {
        let tenant = TenantId::new("guild-1");
        let mut state = WorldState::new(test_support::content());
        let ports = test_support::ports();

        let square = state.locations.create(Location::new(tenant.clone(), "Square"));
        let gate = state.locations.create(Location::new(tenant.clone(), "Gate"));
        let island = state.locations.create(Location::new(tenant.clone(), "Island"));
        state.locations.update(&tenant, square, |l| l.add_exit(gate));
        let hero = state
            .characters
            .create(Character::new(tenant.clone(), "Mira").with_location(square));
        let ctx = ctx(&tenant, ActorRef::Character(hero));

        let ok = MoveCommand
            .validate(&state, &ports, &ctx, &json!({ "to": gate.to_string() }))
            .await;
        assert!(ok.is_ok());

        let blocked = MoveCommand
            .validate(&state, &ports, &ctx, &json!({ "to": island.to_string() }))
            .await;
        assert!(matches!(blocked, Err(EngineError::Validation(_))));
    }

    #[tokio::test]
    async fn move_execute_relocates() {
        let tenant = TenantId::new("guild-1");
        let mut state = WorldState::new(test_support::content());
        let ports = test_support::ports();

        let square = state.locations.create(Location::new(tenant.clone(), "Square"));
        let gate = state.locations.create(Location::new(tenant.clone(), "Gate"));
        state.locations.update(&tenant, square, |l| l.add_exit(gate));
        let hero = state
            .characters
            .create(Character::new(tenant.clone(), "Mira").with_location(square));
        let ctx = ctx(&tenant, ActorRef::Character(hero));

        let outcome = MoveCommand
            .execute(&mut state, &ports, &ctx, &json!({ "to": gate.to_string() }))
            .await
            .expect("move");
        assert!(outcome.success);
        assert_eq!(
            state.characters.get(&tenant, hero).expect("hero").location_id,
            Some(gate)
        );
    }

    #[tokio::test]
    async fn rest_heals_a_quarter_of_max() {
        let tenant = TenantId::new("guild-1");
        let mut state = WorldState::new(test_support::content());
        let ports = test_support::ports();

        let hero = state
            .characters
            .create(Character::new(tenant.clone(), "Mira").with_hp(10, 20));
        let ctx = ctx(&tenant, ActorRef::Character(hero));

        let outcome = RestCommand
            .execute(&mut state, &ports, &ctx, &Value::Null)
            .await
            .expect("rest");
        assert!(outcome.success);
        assert_eq!(state.characters.get(&tenant, hero).expect("hero").hp, 15);
    }

    #[tokio::test]
    async fn use_item_heals_and_consumes() {
        let tenant = TenantId::new("guild-1");
        let mut state = WorldState::new(test_support::content());
        let ports = test_support::ports();

        let hero = state
            .characters
            .create(Character::new(tenant.clone(), "Mira").with_hp(4, 20));
        let potion = state.items.grant(
            ItemInstance::new(tenant.clone(), "healing_potion", ItemOwner::Character(hero)),
            true,
        );
        let ctx = ctx(&tenant, ActorRef::Character(hero));

        let outcome = UseItemCommand
            .execute(&mut state, &ports, &ctx, &json!({ "item": "healing_potion" }))
            .await
            .expect("use");
        assert!(outcome.success);
        assert_eq!(state.characters.get(&tenant, hero).expect("hero").hp, 14);
        assert!(state.items.get(&tenant, potion).is_none());
    }

    #[tokio::test]
    async fn equip_auto_slots_and_displaces() {
        let tenant = TenantId::new("guild-1");
        let mut state = WorldState::new(test_support::content());
        let ports = test_support::ports();

        let hero = state
            .characters
            .create(Character::new(tenant.clone(), "Mira").with_stat("strength", 10.0));
        let old_sword = state.items.grant(
            ItemInstance::new(tenant.clone(), "iron_sword", ItemOwner::Character(hero)),
            false,
        );
        let new_sword = state.items.grant(
            ItemInstance::new(tenant.clone(), "iron_sword", ItemOwner::Character(hero)),
            false,
        );
        let ctx = ctx(&tenant, ActorRef::Character(hero));

        EquipCommand
            .execute(&mut state, &ports, &ctx, &json!({ "item": old_sword.to_string() }))
            .await
            .expect("equip first");
        EquipCommand
            .execute(&mut state, &ports, &ctx, &json!({ "item": new_sword.to_string() }))
            .await
            .expect("equip second");

        assert!(!state.items.get(&tenant, old_sword).expect("old").is_equipped());
        assert!(state.items.get(&tenant, new_sword).expect("new").is_equipped());
        // One sword's strength bonus, not two.
        assert_eq!(
            state
                .characters
                .get(&tenant, hero)
                .expect("hero")
                .effective_stat("strength"),
            Some(12.0)
        );
    }

    #[tokio::test]
    async fn drop_and_pickup_move_ownership_through_the_ground() {
        let tenant = TenantId::new("guild-1");
        let mut state = WorldState::new(test_support::content());
        let ports = test_support::ports();

        let square = state.locations.create(Location::new(tenant.clone(), "Square"));
        let hero = state
            .characters
            .create(Character::new(tenant.clone(), "Mira").with_location(square));
        let sword = state.items.grant(
            ItemInstance::new(tenant.clone(), "iron_sword", ItemOwner::Character(hero)),
            false,
        );
        let ctx = ctx(&tenant, ActorRef::Character(hero));

        DropCommand
            .execute(&mut state, &ports, &ctx, &json!({ "item": "iron_sword" }))
            .await
            .expect("drop");
        assert_eq!(state.items.ground_items(&tenant, square), vec![sword]);

        PickupCommand
            .execute(&mut state, &ports, &ctx, &json!({ "item": "iron_sword" }))
            .await
            .expect("pickup");
        assert_eq!(state.items.character_items(&tenant, hero), vec![sword]);
    }

    #[tokio::test]
    async fn craft_queues_a_job() {
        let tenant = TenantId::new("guild-1");
        let mut state = WorldState::new(test_support::content());
        let ports = test_support::ports();

        let hero = state.characters.create(Character::new(tenant.clone(), "Mira"));
        let ctx = ctx(&tenant, ActorRef::Character(hero));

        let outcome = CraftCommand
            .execute(
                &mut state,
                &ports,
                &ctx,
                &json!({ "recipe": "healing_potion", "quantity": 2.0 }),
            )
            .await
            .expect("craft");
        assert!(outcome.success);

        let jobs = &state.characters.get(&tenant, hero).expect("hero").crafting;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].recipe, "healing_potion");
        assert_eq!(jobs[0].quantity, 2.0);
    }

    #[tokio::test]
    async fn attack_fells_a_weakened_npc() {
        let tenant = TenantId::new("guild-1");
        let mut state = WorldState::new(test_support::content());
        let ports = test_support::ports_with_rules(test_support::always_success_rules());

        let square = state.locations.create(Location::new(tenant.clone(), "Square"));
        let hero = state.characters.create(
            Character::new(tenant.clone(), "Mira")
                .with_location(square)
                .with_stat("strength", 8.0),
        );
        let template = NpcTemplate {
            key: "bandit".into(),
            name: "Bandit".into(),
            max_hp: 3,
            stats: Default::default(),
            description: None,
        };
        let bandit = state.npcs.spawn(
            NpcInstance::from_template(tenant.clone(), &template).with_location(square),
        );
        let ctx = ctx(&tenant, ActorRef::Character(hero));

        let outcome = AttackCommand
            .execute(&mut state, &ports, &ctx, &json!({ "target": "bandit" }))
            .await
            .expect("attack");
        assert!(outcome.success);
        // 1 base + 8 strength / 4 = 3 damage.
        assert!(!state.npcs.get(&tenant, bandit).expect("bandit").is_alive());
    }

    #[test]
    fn builtin_registry_covers_the_verb_set() {
        let registry = CommandRegistry::with_builtin_handlers();
        assert_eq!(
            registry.names(),
            vec!["attack", "craft", "drop", "equip", "move", "pickup", "rest", "unequip", "use_item"]
        );
        assert!(registry.get("move").is_some_and(|c| !c.is_instant()));
        assert!(registry.get("equip").is_some_and(|c| c.is_instant()));
    }
}

//! Event stage state machine.
//!
//! A live event is always in exactly one stage of the graph it copied from
//! its template. Stages move forward two ways: a player action matched
//! against the stage's allowed list (outcome-routed), or an automatic rule
//! the world tick evaluates. Entering the reserved `event_end` stage ends
//! the event: spawned entities despawn, linked combat ends, a terminal
//! notification goes out and the record begins its two-phase purge.

use tracing::{debug, warn};

use wayfarer_domain::{
    AutoTransitionRule, ChannelId, EventId, ItemInstance, ItemOwner, LocationId, NpcInstance,
    OnEnter, TenantId, WorldEvent, EVENT_END_STAGE,
};
use wayfarer_shared::{ActionOutcome, Notification};

use crate::commands::{stats_for_rules, OperationContext};
use crate::error::EngineError;
use crate::ports::Ports;
use crate::state::WorldState;

/// Upper bound on zero-delay transition chains resolved in one pass. A graph
/// that chains deeper than this is cut off with a warning.
const MAX_TRANSITION_CHAIN: usize = 8;

// =============================================================================
// Lifecycle
// =============================================================================

/// Starts an event from a content template, bound to a channel. One active
/// event per channel; the initial stage's entry effects run before this
/// returns, including any zero-delay transition chain.
pub async fn start_event(
    state: &mut WorldState,
    ports: &Ports,
    tenant: &TenantId,
    template_key: &str,
    channel: &ChannelId,
) -> Result<EventId, EngineError> {
    if let Some(running) = state.events.active_in_channel(tenant, channel) {
        debug!(tenant = %tenant, channel = %channel, event = %running, "Channel already has an event");
        return Err(EngineError::validation(
            "An event is already running in this channel",
        ));
    }
    let template = state
        .content
        .event(template_key)
        .cloned()
        .ok_or_else(|| EngineError::validation(format!("No event template '{template_key}'")))?;

    let event = WorldEvent::from_template(tenant.clone(), &template, channel.clone());
    let event_id = state.events.create(event);
    debug!(tenant = %tenant, event = %event_id, template = template_key, "Event started");

    apply_on_enter(state, ports, tenant, event_id).await;
    follow_zero_delay_transitions(state, ports, tenant, event_id).await;
    Ok(event_id)
}

/// Moves an event into a stage, running the target's entry effects and any
/// zero-delay transition chain it sets off. A transition into `event_end`
/// ends the event instead. Unknown stages and vanished events are logged
/// and skipped.
pub async fn advance_stage(
    state: &mut WorldState,
    ports: &Ports,
    tenant: &TenantId,
    event_id: EventId,
    target_stage_id: &str,
) {
    let mut next = Some(target_stage_id.to_string());
    let mut depth = 0;

    while let Some(stage_id) = next.take() {
        if depth >= MAX_TRANSITION_CHAIN {
            warn!(
                tenant = %tenant,
                event = %event_id,
                stage = %stage_id,
                "Transition chain cut off at depth limit"
            );
            break;
        }
        depth += 1;

        if stage_id == EVENT_END_STAGE {
            end_event(state, ports, tenant, event_id).await;
            break;
        }

        let known = state
            .events
            .get(tenant, event_id)
            .is_some_and(|e| e.is_active && e.has_stage(&stage_id));
        if !known {
            warn!(
                tenant = %tenant,
                event = %event_id,
                stage = %stage_id,
                "Transition target unknown or event gone"
            );
            break;
        }

        state
            .events
            .update(tenant, event_id, |e| e.enter_stage(stage_id.clone()));
        debug!(tenant = %tenant, event = %event_id, stage = %stage_id, "Stage entered");

        apply_on_enter(state, ports, tenant, event_id).await;
        next = due_transition(state, ports, tenant, event_id).await;
    }
}

/// Ends an event and runs its cleanup. Idempotent: ending an inactive or
/// absent event is a no-op.
pub async fn end_event(state: &mut WorldState, ports: &Ports, tenant: &TenantId, event_id: EventId) {
    let Some(event) = state.events.get(tenant, event_id) else {
        return;
    };
    if !event.is_active {
        return;
    }
    let channel = event.channel.clone();
    let template_id = event.template_id.clone();
    let spawned_npcs = event.spawned_npcs.clone();
    let spawned_items = event.spawned_items.clone();

    // Despawn in list order; one missing entity never blocks the rest.
    for npc_id in spawned_npcs {
        if state.npcs.remove(tenant, npc_id).is_none() {
            debug!(tenant = %tenant, event = %event_id, npc = %npc_id, "Spawned NPC already gone");
        }
    }
    for item_id in spawned_items {
        if state.items.remove(tenant, item_id).is_none() {
            debug!(tenant = %tenant, event = %event_id, item = %item_id, "Spawned item already gone");
        }
    }
    // Backstop sweep for entities tagged with the event but missing from the
    // recorded lists.
    for npc_id in state.npcs.spawned_by_event(tenant, event_id) {
        warn!(tenant = %tenant, event = %event_id, npc = %npc_id, "Spawned NPC was not recorded on the event");
        state.npcs.remove(tenant, npc_id);
    }
    for item_id in state.items.spawned_by_event(tenant, event_id) {
        warn!(tenant = %tenant, event = %event_id, item = %item_id, "Spawned item was not recorded on the event");
        state.items.remove(tenant, item_id);
    }

    ports.combat.end_combat_for_event(tenant, event_id).await;
    clear_event_status_effects(state, tenant, event_id);

    let notification = Notification::new(
        tenant.as_str(),
        channel.as_str(),
        format!("The event '{template_id}' has concluded."),
    );
    if let Err(e) = ports.notifier.notify(notification).await {
        debug!(tenant = %tenant, event = %event_id, error = %e, "Terminal notification not delivered");
    }

    state.events.retire(tenant, event_id);
    debug!(tenant = %tenant, event = %event_id, "Event ended");
}

fn clear_event_status_effects(state: &mut WorldState, tenant: &TenantId, event_id: EventId) {
    for character_id in state.characters.ids(tenant) {
        let affected = state
            .characters
            .get(tenant, character_id)
            .is_some_and(|c| {
                c.status_effects
                    .iter()
                    .any(|s| s.source_event == Some(event_id))
            });
        if affected {
            state.characters.update(tenant, character_id, |c| {
                c.status_effects
                    .retain(|s| s.source_event != Some(event_id));
            });
        }
    }
}

// =============================================================================
// Manual transitions
// =============================================================================

/// Runs a player action that the event's current stage declares. The rules
/// capability rolls the outcome keyword; the stage routes that keyword to a
/// destination (or stays put when the outcome has no route).
pub async fn execute_stage_action(
    state: &mut WorldState,
    ports: &Ports,
    ctx: &OperationContext,
    event_id: EventId,
    keyword: &str,
) -> Result<ActionOutcome, EngineError> {
    let action = state
        .events
        .get(&ctx.tenant, event_id)
        .filter(|e| e.is_active)
        .and_then(|e| e.current_stage())
        .and_then(|s| s.action(keyword))
        .cloned()
        .ok_or_else(|| EngineError::validation("You cannot do that here right now"))?;

    if let Some(character) = ctx.actor.as_character() {
        state
            .events
            .update(&ctx.tenant, event_id, |e| e.add_player(character));
    }

    let stats = ctx
        .actor
        .as_character()
        .map(|c| stats_for_rules(state, &ctx.tenant, c))
        .unwrap_or_default();
    let outcome_key = ports.rules.resolve_outcome(&action.command, &stats).await;
    let destination = action
        .outcome
        .destination(&outcome_key)
        .map(str::to_string);

    debug!(
        tenant = %ctx.tenant,
        event = %event_id,
        keyword,
        outcome = %outcome_key,
        destination = destination.as_deref().unwrap_or("(stay)"),
        "Stage action resolved"
    );

    match destination {
        Some(stage) => {
            advance_stage(state, ports, &ctx.tenant, event_id, &stage).await;
            Ok(ActionOutcome::success(
                outcome_key,
                "It works. The situation moves on.",
            ))
        }
        None => Ok(ActionOutcome::success(outcome_key, "Nothing comes of it.")
            .without_state_change()),
    }
}

// =============================================================================
// Automatic transitions
// =============================================================================

/// Tick entry point: advances every active event's timers by `delta`, then
/// fires the first matching auto-transition rule per event.
pub async fn evaluate_auto_transitions(
    state: &mut WorldState,
    ports: &Ports,
    tenant: &TenantId,
    delta: f64,
) {
    for event_id in state.events.active_ids(tenant) {
        state
            .events
            .update(tenant, event_id, |e| e.advance_timers(delta));
        if let Some(target) = due_transition(state, ports, tenant, event_id).await {
            advance_stage(state, ports, tenant, event_id, &target).await;
        }
    }
}

/// First matching rule of the event's current stage, in declaration order.
/// Timer rules are engine bookkeeping and evaluate locally; state-variable
/// comparisons go through the rules capability like every other condition.
async fn due_transition(
    state: &WorldState,
    ports: &Ports,
    tenant: &TenantId,
    event_id: EventId,
) -> Option<String> {
    let event = state.events.get(tenant, event_id).filter(|e| e.is_active)?;
    let stage = event.current_stage()?;
    for rule in &stage.auto_transitions {
        let fires = match rule {
            AutoTransitionRule::TimeElapsed {
                timer, threshold, ..
            } => event.timer(timer).is_some_and(|t| t >= *threshold),
            AutoTransitionRule::StateVariableThreshold {
                variable, op, value, ..
            } => {
                let condition = format!("{variable} {op} {value}");
                ports
                    .rules
                    .check_conditions(std::slice::from_ref(&condition), &event.state_variables)
                    .await
            }
        };
        if fires {
            return Some(rule.target_stage().to_string());
        }
    }
    None
}

/// Resolves chained zero-delay transitions after an event starts.
async fn follow_zero_delay_transitions(
    state: &mut WorldState,
    ports: &Ports,
    tenant: &TenantId,
    event_id: EventId,
) {
    if let Some(target) = due_transition(state, ports, tenant, event_id).await {
        advance_stage(state, ports, tenant, event_id, &target).await;
    }
}

// =============================================================================
// Entry effects
// =============================================================================

/// Runs the current stage's on-enter effects: spawn NPCs and items (recorded
/// on the event for cleanup), and the optional narrative hook. All failures
/// degrade to logs; entry never blocks the transition.
async fn apply_on_enter(
    state: &mut WorldState,
    ports: &Ports,
    tenant: &TenantId,
    event_id: EventId,
) {
    let Some((on_enter, channel)) = state
        .events
        .get(tenant, event_id)
        .and_then(|e| e.current_stage().map(|s| (s.on_enter.clone(), e.channel.clone())))
    else {
        return;
    };
    if on_enter.is_empty() {
        return;
    }

    let stage_location = event_location(state, tenant, event_id);
    spawn_entities(state, tenant, event_id, &on_enter, stage_location);

    if let Some(prompt) = &on_enter.narrative_prompt {
        match ports
            .narrative
            .generate("You narrate scenes in a persistent fantasy world.", prompt)
            .await
        {
            Ok(text) => {
                let notification = Notification::new(tenant.as_str(), channel.as_str(), text);
                if let Err(e) = ports.notifier.notify(notification).await {
                    debug!(tenant = %tenant, event = %event_id, error = %e, "Narration not delivered");
                }
            }
            // Flavor only; the stage change already happened.
            Err(e) => debug!(tenant = %tenant, event = %event_id, error = %e, "Narration unavailable"),
        }
    }
}

fn spawn_entities(
    state: &mut WorldState,
    tenant: &TenantId,
    event_id: EventId,
    on_enter: &OnEnter,
    location: Option<LocationId>,
) {
    for spawn in &on_enter.spawn_npcs {
        let Some(template) = state.content.npc(&spawn.template).cloned() else {
            warn!(tenant = %tenant, event = %event_id, template = %spawn.template, "Unknown NPC template in stage");
            continue;
        };
        let mut npc = NpcInstance::from_template(tenant.clone(), &template).spawned_by(event_id);
        if let Some(name) = &spawn.name_override {
            npc = npc.with_name(name.clone());
        }
        if let Some(location) = location {
            npc = npc.with_location(location);
        }
        let npc_id = state.npcs.spawn(npc);
        state
            .events
            .update(tenant, event_id, |e| e.spawned_npcs.push(npc_id));
    }

    for spawn in &on_enter.spawn_items {
        if state.content.item(&spawn.template).is_none() {
            warn!(tenant = %tenant, event = %event_id, template = %spawn.template, "Unknown item template in stage");
            continue;
        }
        let owner = location.map_or(ItemOwner::None, ItemOwner::Location);
        let item = ItemInstance::new(tenant.clone(), spawn.template.clone(), owner)
            .with_quantity(spawn.quantity)
            .spawned_by(event_id);
        // Spawned items never merge into existing stacks; the event must be
        // able to take exactly these back at cleanup.
        let item_id = state.items.grant(item, false);
        state
            .events
            .update(tenant, event_id, |e| e.spawned_items.push(item_id));
    }
}

/// Where event spawns land: the first participant with a location, falling
/// back to unplaced.
fn event_location(state: &WorldState, tenant: &TenantId, event_id: EventId) -> Option<LocationId> {
    let event = state.events.get(tenant, event_id)?;
    event
        .players
        .iter()
        .find_map(|player| state.characters.get(tenant, *player).and_then(|c| c.location_id))
}

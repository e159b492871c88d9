//! Action scheduler.
//!
//! Every actor (character, NPC, party) runs at most one action at a time
//! plus a FIFO queue of pending requests. Scheduling computes the duration
//! once, up front; the world tick accrues progress and runs the terminal
//! effect through the command registry when an action completes. A queued
//! request chains within the same tick pass, so a busy actor never idles
//! between back-to-back actions.

use tracing::{debug, error, warn};

use wayfarer_domain::{ActionState, ActiveAction, QueuedAction, TenantId};

use crate::commands::{ActorRef, CommandRegistry, OperationContext};
use crate::error::EngineError;
use crate::ports::Ports;
use crate::state::WorldState;

/// World-seconds assigned when neither the rules capability nor the request
/// names a duration.
pub const DEFAULT_ACTION_DURATION: f64 = 60.0;

/// Duration precedence: rules capability, then the request's hint, then the
/// engine default.
pub async fn compute_duration(ports: &Ports, request: &QueuedAction) -> f64 {
    ports
        .rules
        .calculate_duration(&request.action_type, &request.params)
        .await
        .or(request.duration_hint)
        .unwrap_or(DEFAULT_ACTION_DURATION)
}

/// Starts an action immediately. Rejected when the actor is already running
/// one, or when a character's owning party is mid-action.
pub async fn start_action(
    state: &mut WorldState,
    ports: &Ports,
    ctx: &OperationContext,
    request: QueuedAction,
) -> Result<(), EngineError> {
    if is_actor_busy(state, &ctx.tenant, ctx.actor) {
        return Err(EngineError::validation(
            "Already busy with another action. Queue it or wait.",
        ));
    }
    if let ActorRef::Character(id) = ctx.actor {
        let party = state.characters.get(&ctx.tenant, id).and_then(|c| c.party_id);
        if state.parties.is_character_party_busy(&ctx.tenant, party) {
            return Err(EngineError::validation(
                "Your party is in the middle of something.",
            ));
        }
    }
    begin(state, ports, ctx, request).await
}

/// Queues the request behind the running action, or starts it when idle.
pub async fn enqueue_action(
    state: &mut WorldState,
    ports: &Ports,
    ctx: &OperationContext,
    request: QueuedAction,
) -> Result<(), EngineError> {
    if is_actor_busy(state, &ctx.tenant, ctx.actor) {
        with_action_state(state, &ctx.tenant, ctx.actor, |actions| {
            actions.enqueue(request)
        })
        .ok_or_else(|| EngineError::validation("No such actor"))
    } else {
        start_action(state, ports, ctx, request).await
    }
}

pub fn is_actor_busy(state: &WorldState, tenant: &TenantId, actor: ActorRef) -> bool {
    match actor {
        ActorRef::Character(id) => state
            .characters
            .get(tenant, id)
            .is_some_and(|c| c.actions.is_busy()),
        ActorRef::Npc(id) => state.npcs.get(tenant, id).is_some_and(|n| n.actions.is_busy()),
        ActorRef::Party(id) => state
            .parties
            .get(tenant, id)
            .is_some_and(|p| p.actions.is_busy()),
    }
}

/// Advances every actor's current action for one tick: characters first,
/// then NPCs, then parties.
pub async fn tick_tenant_actions(
    state: &mut WorldState,
    ports: &Ports,
    registry: &CommandRegistry,
    tenant: &TenantId,
    delta: f64,
) {
    for id in state.characters.ids(tenant) {
        advance_actor(state, ports, registry, tenant, ActorRef::Character(id), delta).await;
    }
    for id in state.npcs.ids(tenant) {
        advance_actor(state, ports, registry, tenant, ActorRef::Npc(id), delta).await;
    }
    for id in state.parties.ids(tenant) {
        advance_actor(state, ports, registry, tenant, ActorRef::Party(id), delta).await;
    }
}

/// Accrues progress on one actor; on completion runs the terminal effect and
/// chains the next queued request in the same pass. A failed effect is
/// logged and the action is still cleared, so the actor never wedges.
async fn advance_actor(
    state: &mut WorldState,
    ports: &Ports,
    registry: &CommandRegistry,
    tenant: &TenantId,
    actor: ActorRef,
    delta: f64,
) {
    // Idle actors are left untouched (and stay clean for the next save).
    if !is_actor_busy(state, tenant, actor) {
        return;
    }
    let completed = with_action_state(state, tenant, actor, |actions| {
        let current = actions.current.as_mut()?;
        current.progress += delta;
        if !current.is_complete() {
            return None;
        }
        let finished = current.clone();
        let next = actions.finish_current();
        Some((finished, next))
    });
    let Some(Some((finished, next))) = completed else {
        return;
    };

    run_terminal_effect(state, ports, registry, tenant, actor, &finished).await;

    if let Some(request) = next {
        let ctx = OperationContext::internal(tenant.clone(), actor);
        // Chained requests were accepted when queued; only a vanished actor
        // stops them now.
        if let Err(error) = begin(state, ports, &ctx, request).await {
            warn!(tenant = %tenant, error = %error, "Queued action could not start");
        }
    }
}

async fn begin(
    state: &mut WorldState,
    ports: &Ports,
    ctx: &OperationContext,
    request: QueuedAction,
) -> Result<(), EngineError> {
    let duration = compute_duration(ports, &request).await;
    let action = ActiveAction {
        action_type: request.action_type,
        params: request.params,
        started_at: ports.clock.now(),
        progress: 0.0,
        duration,
    };
    debug!(
        tenant = %ctx.tenant,
        action = %action.action_type,
        duration,
        "Action started"
    );
    with_action_state(state, &ctx.tenant, ctx.actor, |actions| actions.begin(action))
        .ok_or_else(|| EngineError::validation("No such actor"))
}

async fn run_terminal_effect(
    state: &mut WorldState,
    ports: &Ports,
    registry: &CommandRegistry,
    tenant: &TenantId,
    actor: ActorRef,
    action: &ActiveAction,
) {
    let ctx = OperationContext::internal(tenant.clone(), actor);
    let Some(command) = registry.get(&action.action_type) else {
        warn!(
            tenant = %tenant,
            action = %action.action_type,
            "Completed action has no registered command"
        );
        return;
    };
    match command.execute(state, ports, &ctx, &action.params).await {
        Ok(outcome) => {
            debug!(
                tenant = %tenant,
                action = %action.action_type,
                success = outcome.success,
                "Action completed"
            );
        }
        // The world moved while the action ran (target gone, exit closed).
        Err(e) if e.is_validation() => {
            debug!(
                tenant = %tenant,
                action = %action.action_type,
                reason = %e,
                "Completed action no longer applies"
            );
        }
        Err(e) => {
            error!(
                tenant = %tenant,
                action = %action.action_type,
                error = %e,
                "Terminal action effect failed"
            );
        }
    }
}

/// Runs a closure against the actor's [`ActionState`] through the owning
/// manager, so dirty tracking is never bypassed. `None` when the actor does
/// not exist.
fn with_action_state<R>(
    state: &mut WorldState,
    tenant: &TenantId,
    actor: ActorRef,
    f: impl FnOnce(&mut ActionState) -> R,
) -> Option<R> {
    match actor {
        ActorRef::Character(id) => state.characters.update(tenant, id, |c| f(&mut c.actions)),
        ActorRef::Npc(id) => state.npcs.update(tenant, id, |n| f(&mut n.actions)),
        ActorRef::Party(id) => state.parties.update(tenant, id, |p| f(&mut p.actions)),
    }
}

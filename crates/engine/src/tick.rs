//! World tick driver.
//!
//! [`process_world_tick`] advances every loaded tenant through a fixed
//! subsystem order: world clock, status effects, crafting, combat rounds,
//! entity actions, event auto-transitions, periodic save. Subsystems handle
//! their own per-entity failures and continue; the only step that fails
//! outright is the save, and a failed save keeps its accumulated time so the
//! next pass retries. [`run_tick_loop`] is the background worker driving
//! passes on a real-time interval until cancelled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wayfarer_domain::{CharacterId, ItemInstance, ItemOwner, PeriodicKind, StatusEffect, TenantId};
use wayfarer_shared::Notification;

use crate::actions;
use crate::commands::CommandRegistry;
use crate::config::TickConfig;
use crate::persistence::Persistence;
use crate::ports::Ports;
use crate::stages;
use crate::state::WorldState;

/// Shortest real-time period the loop accepts; `tokio::time::interval`
/// panics on zero.
const MIN_TICK_SECONDS: f64 = 0.05;

/// One full pass over every loaded tenant, `delta` world-seconds forward.
pub async fn process_world_tick(
    state: &mut WorldState,
    ports: &Ports,
    registry: &CommandRegistry,
    persistence: &Persistence,
    save_interval: f64,
    delta: f64,
) {
    for tenant in state.loaded_tenants() {
        advance_world_clock(state, ports, &tenant, delta).await;
        tick_status_effects(state, &tenant, delta);
        tick_crafting(state, &tenant, delta);
        settle_finished_combats(ports, &tenant, delta).await;
        actions::tick_tenant_actions(state, ports, registry, &tenant, delta).await;
        stages::evaluate_auto_transitions(state, ports, &tenant, delta).await;
        maybe_save(state, persistence, save_interval, &tenant, delta).await;
    }
}

/// World time. A change of day period is announced in every channel that
/// currently has a live event; quiet channels hear nothing.
async fn advance_world_clock(state: &mut WorldState, ports: &Ports, tenant: &TenantId, delta: f64) {
    let before = state.clocks.get(tenant).map(|c| c.time_of_day());
    state.clocks.advance(tenant, delta);
    let Some(clock) = state.clocks.get(tenant) else {
        return;
    };
    let after = clock.time_of_day();
    if before == Some(after) {
        return;
    }
    debug!(tenant = %tenant, period = after.display_name(), "Day period changed");

    let mut channels = Vec::new();
    for event_id in state.events.active_ids(tenant) {
        if let Some(event) = state.events.get(tenant, event_id) {
            if !channels.contains(&event.channel) {
                channels.push(event.channel.clone());
            }
        }
    }
    for channel in channels {
        let body = format!("It is now {}.", after.display_name().to_lowercase());
        let notification = Notification::new(tenant.as_str(), channel.as_str(), body);
        if let Err(e) = ports.notifier.notify(notification).await {
            debug!(tenant = %tenant, error = %e, "Day period notification not delivered");
        }
    }
}

/// Status effect expiry and periodic damage or healing, characters then
/// NPCs. Actors with no effects are never touched, so they stay clean for
/// the next save.
fn tick_status_effects(state: &mut WorldState, tenant: &TenantId, delta: f64) {
    for id in state.characters.ids(tenant) {
        let affected = state
            .characters
            .get(tenant, id)
            .is_some_and(|c| !c.status_effects.is_empty());
        if !affected {
            continue;
        }
        state.characters.update(tenant, id, |character| {
            let hp_delta = advance_effects(&mut character.status_effects, delta);
            character.status_effects.retain(|e| !e.is_expired());
            character.apply_hp_delta(hp_delta);
        });
    }

    for id in state.npcs.ids(tenant) {
        let affected = state
            .npcs
            .get(tenant, id)
            .is_some_and(|n| !n.status_effects.is_empty());
        if !affected {
            continue;
        }
        state.npcs.update(tenant, id, |npc| {
            let hp_delta = advance_effects(&mut npc.status_effects, delta);
            npc.status_effects.retain(|e| !e.is_expired());
            npc.apply_hp_delta(hp_delta);
        });
    }
}

/// Decrements remaining time and accrues periodic components, returning the
/// net hit-point change. A periodic component sees the whole delta even when
/// the same delta expires its effect; expiry granularity is one tick.
fn advance_effects(effects: &mut [StatusEffect], delta: f64) -> i32 {
    let mut hp_delta = 0;
    for effect in effects.iter_mut() {
        effect.remaining -= delta;
        let Some(periodic) = &mut effect.periodic else {
            continue;
        };
        let applications = periodic.advance(delta);
        if applications == 0 {
            continue;
        }
        let per_application = match periodic.kind {
            PeriodicKind::Damage => -periodic.amount,
            PeriodicKind::Heal => periodic.amount,
        };
        hp_delta += per_application * applications as i32;
    }
    hp_delta
}

/// Crafting queues. Only the head job advances; every finished unit mints an
/// item from the recipe's template into the crafter's inventory, and a
/// drained job is popped so the next one starts on the following pass.
fn tick_crafting(state: &mut WorldState, tenant: &TenantId, delta: f64) {
    for id in state.characters.ids(tenant) {
        let crafting = state
            .characters
            .get(tenant, id)
            .is_some_and(|c| !c.crafting.is_empty());
        if !crafting {
            continue;
        }
        let produced = state
            .characters
            .update(tenant, id, |character| {
                let mut produced = Vec::new();
                let mut drained = false;
                if let Some(job) = character.crafting.first_mut() {
                    job.progress += delta;
                    while job.unit_complete() && job.quantity > 0.0 {
                        job.progress -= job.duration;
                        job.quantity -= 1.0;
                        produced.push(job.recipe.clone());
                    }
                    drained = job.quantity <= 0.0;
                }
                if drained {
                    character.crafting.remove(0);
                }
                produced
            })
            .unwrap_or_default();
        for recipe in produced {
            mint_crafted_item(state, tenant, id, &recipe);
        }
    }
}

fn mint_crafted_item(state: &mut WorldState, tenant: &TenantId, crafter: CharacterId, recipe: &str) {
    let stackable = match state.content.item(recipe) {
        Some(template) => template.stackable,
        None => {
            warn!(tenant = %tenant, recipe, "Finished crafting job has no item template");
            return;
        }
    };
    let item = ItemInstance::new(tenant.clone(), recipe, ItemOwner::Character(crafter));
    state.items.grant(item, stackable);
    debug!(tenant = %tenant, recipe, "Crafted item granted");
}

/// Combat rounds through the combat capability. Every combat reported
/// finished is closed out immediately.
async fn settle_finished_combats(ports: &Ports, tenant: &TenantId, delta: f64) {
    for finished in ports.combat.advance_rounds(tenant, delta).await {
        debug!(
            tenant = %tenant,
            combat = %finished.combat_id,
            summary = %finished.summary,
            "Combat finished"
        );
        ports.combat.end_combat(tenant, &finished.combat_id).await;
    }
}

/// Periodic save once enough world time has accumulated since the last one.
async fn maybe_save(
    state: &mut WorldState,
    persistence: &Persistence,
    save_interval: f64,
    tenant: &TenantId,
    delta: f64,
) {
    let accumulated = state.accumulate_save_time(tenant, delta);
    if accumulated < save_interval {
        return;
    }
    match persistence.save_tenant(state, tenant).await {
        Ok(_) => state.reset_save_accumulator(tenant),
        Err(e) => error!(tenant = %tenant, error = %e, "Periodic save failed"),
    }
}

/// Background worker driving tick passes until the token is cancelled.
///
/// The write guard is held for one whole pass, so command handling
/// interleaves only between passes.
pub async fn run_tick_loop(
    state: Arc<RwLock<WorldState>>,
    ports: Ports,
    registry: Arc<CommandRegistry>,
    persistence: Persistence,
    config: TickConfig,
    cancel_token: CancellationToken,
) {
    let period = Duration::from_secs_f64(config.interval_seconds.max(MIN_TICK_SECONDS));
    let delta = period.as_secs_f64() * config.time_scale;
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // An interval's first tick completes immediately; consume it so the
    // first world advance comes one full period after startup.
    ticker.tick().await;

    info!(
        interval_seconds = period.as_secs_f64(),
        time_scale = config.time_scale,
        "Tick loop started"
    );
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("Tick loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                let mut world = state.write().await;
                process_world_tick(
                    &mut world,
                    &ports,
                    &registry,
                    &persistence,
                    config.save_interval,
                    delta,
                )
                .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use wayfarer_domain::{
        ChannelId, Character, CraftingJob, EventTemplate, NpcInstance, PeriodicEffect,
        StageDefinition, WorldEvent,
    };

    use crate::adapters::{NullCombat, NullNarrative, NullNotifier, StaticRules, SystemClock};
    use crate::ports::{FinishedCombat, MockCombatPort, MockNotifierPort};
    use crate::test_support;

    fn tenant() -> TenantId {
        TenantId::new("guild-1")
    }

    async fn open(dir: &tempfile::TempDir) -> Persistence {
        let path = dir.path().join("world.db");
        let persistence = Persistence::connect(&path.to_string_lossy())
            .await
            .expect("connect");
        persistence.ensure_schema().await.expect("schema");
        persistence
    }

    fn quiet_event(tenant: TenantId, channel: &str) -> WorldEvent {
        let template = EventTemplate {
            key: "vigil".to_string(),
            name: "Vigil".to_string(),
            initial_stage: "watch".to_string(),
            stages: HashMap::from([("watch".to_string(), StageDefinition::default())]),
            description: None,
        };
        WorldEvent::from_template(tenant, &template, ChannelId::new(channel))
    }

    #[tokio::test]
    async fn periodic_effects_apply_and_expired_ones_clear() {
        let tenant = tenant();
        let mut state = WorldState::new(test_support::content());

        let hero = state.characters.create(
            Character::new(tenant.clone(), "Mira")
                .with_hp(20, 20)
                .with_status_effect(
                    StatusEffect::new("poisoned", 10.0).with_periodic(PeriodicEffect {
                        kind: PeriodicKind::Damage,
                        amount: 2,
                        every: 3.0,
                        accrued: 0.0,
                    }),
                )
                .with_status_effect(StatusEffect::new("blessed", 30.0)),
        );
        let bandit_template = test_support::content().npc("bandit").expect("bandit").clone();
        let bandit = state.npcs.spawn(
            NpcInstance::from_template(tenant.clone(), &bandit_template)
                .with_status_effect(StatusEffect::new("singed", 4.0)),
        );

        tick_status_effects(&mut state, &tenant, 6.0);
        let mira = state.characters.get(&tenant, hero).expect("hero");
        assert_eq!(mira.hp, 16);
        assert_eq!(mira.status_effects.len(), 2);
        let npc = state.npcs.get(&tenant, bandit).expect("bandit");
        assert!(npc.status_effects.is_empty());
        assert_eq!(npc.hp, 8);

        tick_status_effects(&mut state, &tenant, 6.0);
        let mira = state.characters.get(&tenant, hero).expect("hero");
        assert_eq!(mira.hp, 12);
        assert_eq!(mira.status_effects.len(), 1);
        assert_eq!(mira.status_effects[0].key, "blessed");
    }

    #[tokio::test]
    async fn crafting_head_job_mints_units_in_order() {
        let tenant = tenant();
        let mut state = WorldState::new(test_support::content());

        let smith = state.characters.create(Character::new(tenant.clone(), "Bron"));
        state.characters.update(&tenant, smith, |c| {
            c.crafting.push(CraftingJob::new("healing_potion", 4.0, 2.0));
            c.crafting.push(CraftingJob::new("iron_sword", 10.0, 1.0));
        });

        tick_crafting(&mut state, &tenant, 5.0);
        let potion_id = state
            .items
            .find_by_template(&tenant, &ItemOwner::Character(smith), "healing_potion")
            .expect("potion");
        let potion = state.items.get(&tenant, potion_id).expect("potion");
        assert_eq!(potion.quantity, 1.0);

        // Second unit finishes, the job drains, the sword job becomes head
        // untouched.
        tick_crafting(&mut state, &tenant, 5.0);
        let smith_state = state.characters.get(&tenant, smith).expect("smith");
        assert_eq!(smith_state.crafting.len(), 1);
        assert_eq!(smith_state.crafting[0].recipe, "iron_sword");
        assert_eq!(smith_state.crafting[0].progress, 0.0);
        let potion = state.items.get(&tenant, potion_id).expect("potion");
        assert_eq!(potion.quantity, 2.0);

        tick_crafting(&mut state, &tenant, 10.0);
        let smith_state = state.characters.get(&tenant, smith).expect("smith");
        assert!(smith_state.crafting.is_empty());
        assert!(state
            .items
            .find_by_template(&tenant, &ItemOwner::Character(smith), "iron_sword")
            .is_some());
    }

    #[tokio::test]
    async fn one_tick_can_finish_multiple_crafting_units() {
        let tenant = tenant();
        let mut state = WorldState::new(test_support::content());

        let smith = state.characters.create(Character::new(tenant.clone(), "Bron"));
        state.characters.update(&tenant, smith, |c| {
            c.crafting.push(CraftingJob::new("healing_potion", 4.0, 3.0));
        });

        tick_crafting(&mut state, &tenant, 20.0);
        let smith_state = state.characters.get(&tenant, smith).expect("smith");
        assert!(smith_state.crafting.is_empty());
        let potion_id = state
            .items
            .find_by_template(&tenant, &ItemOwner::Character(smith), "healing_potion")
            .expect("potion");
        let potion = state.items.get(&tenant, potion_id).expect("potion");
        assert_eq!(potion.quantity, 3.0);
    }

    #[tokio::test]
    async fn unknown_recipe_completes_without_minting() {
        let tenant = tenant();
        let mut state = WorldState::new(test_support::content());

        let smith = state.characters.create(Character::new(tenant.clone(), "Bron"));
        state.characters.update(&tenant, smith, |c| {
            c.crafting.push(CraftingJob::new("phantom_blade", 2.0, 1.0));
        });

        tick_crafting(&mut state, &tenant, 2.0);
        let smith_state = state.characters.get(&tenant, smith).expect("smith");
        assert!(smith_state.crafting.is_empty());
        assert!(state.items.character_items(&tenant, smith).is_empty());
    }

    #[tokio::test]
    async fn finished_combats_are_closed_through_the_port() {
        let dir = tempfile::tempdir().expect("tempdir");
        let persistence = open(&dir).await;
        let tenant = tenant();

        let mut state = WorldState::new(test_support::content());
        state.register_loaded(&tenant);

        let mut combat = MockCombatPort::new();
        combat.expect_advance_rounds().times(1).returning(|_, _| {
            vec![FinishedCombat {
                combat_id: "c-1".to_string(),
                event_id: None,
                summary: "The bandits scatter.".to_string(),
            }]
        });
        combat
            .expect_end_combat()
            .withf(|_, combat_id| combat_id == "c-1")
            .times(1)
            .returning(|_, _| ());

        let ports = Ports {
            rules: Arc::new(StaticRules::new(test_support::content())),
            narrative: Arc::new(NullNarrative),
            notifier: Arc::new(NullNotifier),
            combat: Arc::new(combat),
            clock: Arc::new(SystemClock),
        };
        let registry = CommandRegistry::with_builtin_handlers();

        process_world_tick(&mut state, &ports, &registry, &persistence, f64::MAX, 10.0).await;
    }

    #[tokio::test]
    async fn day_period_change_announces_to_event_channels() {
        let dir = tempfile::tempdir().expect("tempdir");
        let persistence = open(&dir).await;
        let tenant = tenant();

        let mut state = WorldState::new(test_support::content());
        state.register_loaded(&tenant);
        // Position the clock just before morning (hour 5).
        state.clocks.advance(&tenant, 17_995.0);
        state.events.create(quiet_event(tenant.clone(), "watchtower"));

        let mut notifier = MockNotifierPort::new();
        notifier
            .expect_notify()
            .withf(|n| n.channel_id == "watchtower" && n.body.contains("morning"))
            .times(1)
            .returning(|_| Ok(()));

        let ports = Ports {
            rules: Arc::new(StaticRules::new(test_support::content())),
            narrative: Arc::new(NullNarrative),
            notifier: Arc::new(notifier),
            combat: Arc::new(NullCombat),
            clock: Arc::new(SystemClock),
        };
        let registry = CommandRegistry::with_builtin_handlers();

        process_world_tick(&mut state, &ports, &registry, &persistence, f64::MAX, 10.0).await;
        // Still morning on the next pass; the mock would reject a second call.
        process_world_tick(&mut state, &ports, &registry, &persistence, f64::MAX, 10.0).await;
    }

    #[tokio::test]
    async fn periodic_save_fires_once_interval_accumulates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let persistence = open(&dir).await;
        let tenant = tenant();

        let mut state = WorldState::new(test_support::content());
        state.register_loaded(&tenant);
        let hero = state
            .characters
            .create(Character::new(tenant.clone(), "Mira").with_hp(15, 20));

        let ports = test_support::ports();
        let registry = CommandRegistry::with_builtin_handlers();

        process_world_tick(&mut state, &ports, &registry, &persistence, 5.0, 3.0).await;
        assert!(state.characters.has_pending(&tenant));

        process_world_tick(&mut state, &ports, &registry, &persistence, 5.0, 3.0).await;
        assert!(!state.characters.has_pending(&tenant));

        // Nothing touches the idle character, so nothing re-dirties it.
        process_world_tick(&mut state, &ports, &registry, &persistence, 5.0, 3.0).await;
        assert!(!state.characters.has_pending(&tenant));

        let mut fresh = WorldState::new(test_support::content());
        persistence
            .load_tenant(&mut fresh, &tenant)
            .await
            .expect("reload");
        let loaded = fresh.characters.get(&tenant, hero).expect("hero");
        assert_eq!(loaded.hp, 15);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_loop_advances_time_and_stops_on_cancel() {
        let dir = tempfile::tempdir().expect("tempdir");
        let persistence = open(&dir).await;
        let tenant = tenant();

        let mut world = WorldState::new(test_support::content());
        world.register_loaded(&tenant);
        let state = Arc::new(RwLock::new(world));

        let config = TickConfig {
            interval_seconds: 1.0,
            time_scale: 1.0,
            save_interval: f64::MAX,
        };
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(run_tick_loop(
            state.clone(),
            test_support::ports(),
            Arc::new(CommandRegistry::with_builtin_handlers()),
            persistence.clone(),
            config,
            cancel_token.clone(),
        ));

        // Paused time: the loop ticks at 1s, 2s and 3s while we sleep.
        tokio::time::sleep(Duration::from_millis(3500)).await;
        cancel_token.cancel();
        handle.await.expect("join");

        let world = state.read().await;
        let elapsed = world.clocks.get(&tenant).expect("clock").elapsed;
        assert!((elapsed - 3.0).abs() < 1e-9, "elapsed was {elapsed}");
    }
}

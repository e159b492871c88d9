//! Tenant-facing service facade.
//!
//! [`WorldService`] is the single surface the presentation layer talks to.
//! It owns the shared state lock and hides tenant loading, stage routing and
//! command dispatch behind plain methods. [`WorldService::handle_action`]
//! never returns an error: player-facing rejections come back as failed
//! outcomes and internal faults become a generic failure plus a full log
//! entry, so one bad request cannot take the caller down.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::error;
use wayfarer_domain::{
    ChannelId, Character, CharacterId, EventId, InventoryEntry, Location, LocationId, Party,
    PartyId, QueuedAction, TenantId,
};
use wayfarer_shared::{ActionOutcome, ActionRequest, WorldStatus};

use crate::actions;
use crate::commands::{ActorRef, CommandRegistry, OperationContext};
use crate::error::{EngineError, StoreError};
use crate::persistence::Persistence;
use crate::ports::Ports;
use crate::stages;
use crate::state::WorldState;
use crate::tick;

/// The facade the presentation layer drives. Cloning shares the same world.
#[derive(Clone)]
pub struct WorldService {
    state: Arc<RwLock<WorldState>>,
    ports: Ports,
    persistence: Persistence,
    registry: Arc<CommandRegistry>,
}

impl WorldService {
    pub fn new(
        state: Arc<RwLock<WorldState>>,
        ports: Ports,
        persistence: Persistence,
        registry: Arc<CommandRegistry>,
    ) -> Self {
        Self {
            state,
            ports,
            persistence,
            registry,
        }
    }

    /// Shared state handle, for background workers.
    pub fn state(&self) -> Arc<RwLock<WorldState>> {
        Arc::clone(&self.state)
    }

    pub fn ports(&self) -> &Ports {
        &self.ports
    }

    pub fn persistence(&self) -> &Persistence {
        &self.persistence
    }

    pub fn registry(&self) -> Arc<CommandRegistry> {
        Arc::clone(&self.registry)
    }

    // =========================================================================
    // Action dispatch
    // =========================================================================

    /// Runs one player request end to end.
    pub async fn handle_action(&self, request: ActionRequest) -> ActionOutcome {
        match self.dispatch(&request).await {
            Ok(outcome) => outcome,
            Err(EngineError::Validation(message)) => ActionOutcome::failure("invalid", message),
            Err(EngineError::Domain(err)) => ActionOutcome::failure("invalid", err.to_string()),
            Err(err) => {
                error!(
                    tenant = %request.tenant_id,
                    action = %request.action,
                    error = %err,
                    "Action dispatch failed"
                );
                ActionOutcome::failure("error", "Something went wrong. Try again in a moment.")
            }
        }
    }

    async fn dispatch(&self, request: &ActionRequest) -> Result<ActionOutcome, EngineError> {
        let tenant = TenantId::new(&request.tenant_id);
        let channel = ChannelId::new(&request.channel_id);
        let Ok(character) = CharacterId::parse(&request.character_id) else {
            return Ok(ActionOutcome::failure("invalid", "No such character."));
        };

        let mut state = self.state.write().await;
        self.persistence.load_tenant(&mut state, &tenant).await?;
        if state.characters.get(&tenant, character).is_none() {
            return Ok(ActionOutcome::failure("invalid", "No such character."));
        }

        let ctx = OperationContext {
            tenant: tenant.clone(),
            channel: channel.clone(),
            actor: ActorRef::Character(character),
        };

        // A keyword declared by the channel's active event outranks the
        // command registry; everything else falls through to normal verbs.
        if let Some(event_id) = stage_event_for(&state, &tenant, &channel, &request.action) {
            return stages::execute_stage_action(
                &mut state,
                &self.ports,
                &ctx,
                event_id,
                &request.action,
            )
            .await;
        }

        let Some(command) = self.registry.get(&request.action) else {
            return Ok(ActionOutcome::failure(
                "unknown_action",
                format!("Nobody here knows how to {}.", request.action),
            ));
        };

        command
            .validate(&state, &self.ports, &ctx, &request.params)
            .await?;
        if command.is_instant() {
            return command
                .execute(&mut state, &self.ports, &ctx, &request.params)
                .await;
        }

        let mut queued = QueuedAction::new(&request.action, request.params.clone());
        if let Some(duration) = request.duration {
            queued = queued.with_hint(duration);
        }
        let was_busy = actions::is_actor_busy(&state, &tenant, ctx.actor);
        actions::enqueue_action(&mut state, &self.ports, &ctx, queued).await?;
        Ok(if was_busy {
            ActionOutcome::success("queued", "Queued behind the current action.")
        } else {
            ActionOutcome::success("started", format!("You begin to {}.", request.action))
        })
    }

    // =========================================================================
    // Entity queries and creation
    // =========================================================================

    pub async fn get_character(&self, tenant: &TenantId, id: CharacterId) -> Option<Character> {
        self.state.read().await.characters.get(tenant, id).cloned()
    }

    /// Ownership projection for one character, in display order.
    pub async fn inventory(
        &self,
        tenant: &TenantId,
        character: CharacterId,
    ) -> Vec<InventoryEntry> {
        self.state.read().await.inventory(tenant, character)
    }

    /// Creates the character in its tenant's resident state. The tenant is
    /// brought in first so the new entity is covered by ticking and by
    /// shutdown saves.
    pub async fn create_character(&self, character: Character) -> Result<CharacterId, EngineError> {
        let tenant = character.tenant.clone();
        let mut state = self.state.write().await;
        self.persistence.load_tenant(&mut state, &tenant).await?;
        Ok(state.characters.create(character))
    }

    pub async fn create_location(&self, location: Location) -> Result<LocationId, EngineError> {
        let tenant = location.tenant.clone();
        let mut state = self.state.write().await;
        self.persistence.load_tenant(&mut state, &tenant).await?;
        Ok(state.locations.create(location))
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Starts a templated event in a channel. One active event per channel.
    pub async fn start_event(
        &self,
        tenant: &TenantId,
        template_key: &str,
        channel: &ChannelId,
    ) -> Result<EventId, EngineError> {
        let mut state = self.state.write().await;
        self.persistence.load_tenant(&mut state, tenant).await?;
        stages::start_event(&mut state, &self.ports, tenant, template_key, channel).await
    }

    /// Force-ends an event, reclaiming whatever it spawned.
    pub async fn end_event(&self, tenant: &TenantId, event_id: EventId) -> Result<(), EngineError> {
        let mut state = self.state.write().await;
        self.persistence.load_tenant(&mut state, tenant).await?;
        stages::end_event(&mut state, &self.ports, tenant, event_id).await;
        Ok(())
    }

    // =========================================================================
    // Parties
    // =========================================================================

    /// Creates a party led by `leader`. The leader must exist and be
    /// partyless; the party starts at the leader's location.
    pub async fn create_party(
        &self,
        tenant: &TenantId,
        name: &str,
        leader: CharacterId,
    ) -> Result<PartyId, EngineError> {
        let mut state = self.state.write().await;
        self.persistence.load_tenant(&mut state, tenant).await?;
        let location = {
            let character = state
                .characters
                .get(tenant, leader)
                .ok_or_else(|| EngineError::validation("No such character."))?;
            if character.party_id.is_some() {
                return Err(EngineError::validation("Already in a party. Leave it first."));
            }
            character.location_id
        };
        let mut party = Party::new(tenant.clone(), name, leader);
        party.location_id = location;
        let party_id = state.parties.create(party);
        state
            .characters
            .update(tenant, leader, |c| c.party_id = Some(party_id));
        Ok(party_id)
    }

    pub async fn join_party(
        &self,
        tenant: &TenantId,
        party_id: PartyId,
        character_id: CharacterId,
    ) -> Result<(), EngineError> {
        let mut state = self.state.write().await;
        self.persistence.load_tenant(&mut state, tenant).await?;
        if state.parties.get(tenant, party_id).is_none() {
            return Err(EngineError::validation("That party no longer exists."));
        }
        let character = state
            .characters
            .get(tenant, character_id)
            .ok_or_else(|| EngineError::validation("No such character."))?;
        if character.party_id.is_some() {
            return Err(EngineError::validation("Already in a party. Leave it first."));
        }
        state
            .parties
            .update(tenant, party_id, |p| p.add_member(character_id));
        state
            .characters
            .update(tenant, character_id, |c| c.party_id = Some(party_id));
        Ok(())
    }

    /// Takes the character out of its party. Leadership passes to the next
    /// member; an emptied party is removed.
    pub async fn leave_party(
        &self,
        tenant: &TenantId,
        character_id: CharacterId,
    ) -> Result<(), EngineError> {
        let mut state = self.state.write().await;
        self.persistence.load_tenant(&mut state, tenant).await?;
        let party_id = state
            .characters
            .get(tenant, character_id)
            .and_then(|c| c.party_id)
            .ok_or_else(|| EngineError::validation("Not in a party."))?;
        state
            .characters
            .update(tenant, character_id, |c| c.party_id = None);
        let emptied = state
            .parties
            .update(tenant, party_id, |p| {
                p.remove_member(character_id);
                p.is_empty()
            })
            .unwrap_or(false);
        if emptied {
            state.parties.remove(tenant, party_id);
        }
        Ok(())
    }

    /// Dissolves the party and clears every member's membership.
    pub async fn disband_party(
        &self,
        tenant: &TenantId,
        party_id: PartyId,
    ) -> Result<(), EngineError> {
        let mut state = self.state.write().await;
        self.persistence.load_tenant(&mut state, tenant).await?;
        let members = state
            .parties
            .get(tenant, party_id)
            .map(|p| p.members.clone())
            .ok_or_else(|| EngineError::validation("That party no longer exists."))?;
        for member in members {
            state
                .characters
                .update(tenant, member, |c| c.party_id = None);
        }
        state.parties.remove(tenant, party_id);
        Ok(())
    }

    // =========================================================================
    // World status
    // =========================================================================

    /// Snapshot for channel displays: world date, day period, activity counts.
    pub async fn status(&self, tenant: &TenantId) -> Result<WorldStatus, EngineError> {
        let mut state = self.state.write().await;
        self.persistence.load_tenant(&mut state, tenant).await?;
        state.clocks.ensure_clock(tenant);
        let (date_display, period) = state
            .clocks
            .get(tenant)
            .map(|clock| {
                (
                    clock.display_date(),
                    clock.time_of_day().display_name().to_string(),
                )
            })
            .unwrap_or_default();
        let busy_characters = state
            .characters
            .list(tenant)
            .iter()
            .filter(|c| c.actions.is_busy())
            .count() as u32;
        Ok(WorldStatus {
            date_display,
            period,
            active_events: state.events.active_ids(tenant).len() as u32,
            busy_characters,
        })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Brings a tenant's world into memory. A no-op when already resident.
    pub async fn load_tenant(&self, tenant: &TenantId) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        self.persistence.load_tenant(&mut state, tenant).await
    }

    /// Flushes the tenant's dirty entities. Returns the rows written.
    pub async fn save_tenant(&self, tenant: &TenantId) -> Result<usize, StoreError> {
        let mut state = self.state.write().await;
        self.persistence.save_tenant(&mut state, tenant).await
    }

    /// Saves and evicts one tenant.
    pub async fn unload_tenant(&self, tenant: &TenantId) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        self.persistence.unload_tenant(&mut state, tenant).await
    }

    /// Saves every resident tenant. Returns how many tenants failed to save.
    pub async fn save_all(&self) -> usize {
        let mut state = self.state.write().await;
        self.persistence.save_all_loaded_tenants(&mut state).await
    }

    /// Drives one tick by hand, `delta` world-seconds forward. Periodic saves
    /// belong to the background loop; callers ticking manually save
    /// explicitly.
    pub async fn process_world_tick(&self, delta: f64) {
        let mut state = self.state.write().await;
        tick::process_world_tick(
            &mut state,
            &self.ports,
            &self.registry,
            &self.persistence,
            f64::MAX,
            delta,
        )
        .await;
    }
}

/// The channel's active event, when its current stage declares `keyword`.
fn stage_event_for(
    state: &WorldState,
    tenant: &TenantId,
    channel: &ChannelId,
    keyword: &str,
) -> Option<EventId> {
    let event_id = state.events.active_in_channel(tenant, channel)?;
    state
        .events
        .get(tenant, event_id)
        .and_then(|event| event.current_stage())
        .is_some_and(|stage| stage.action(keyword).is_some())
        .then_some(event_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wayfarer_domain::{EventTemplate, ItemInstance, ItemOwner};

    use crate::content::ContentLibrary;
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

    async fn service(dir: &tempfile::TempDir) -> WorldService {
        service_with(dir, test_support::content(), test_support::ports()).await
    }

    async fn service_with(
        dir: &tempfile::TempDir,
        content: Arc<ContentLibrary>,
        ports: Ports,
    ) -> WorldService {
        WorldService::new(
            Arc::new(RwLock::new(WorldState::new(content))),
            ports,
            open(dir).await,
            Arc::new(CommandRegistry::default()),
        )
    }

    /// An event whose opening stage claims the "rest" keyword for itself.
    fn watch_content() -> Arc<ContentLibrary> {
        let template: EventTemplate = serde_json::from_value(json!({
            "key": "night_watch",
            "name": "Night Watch",
            "initial_stage": "lookout",
            "stages": {
                "lookout": {
                    "allowed_actions": {
                        "rest": {"command": "rest", "outcome": {"success": "alarm"}}
                    }
                },
                "alarm": {}
            }
        }))
        .expect("template");
        let library = ContentLibrary::from_parts(
            Vec::new(),
            Vec::new(),
            vec![template],
            Vec::new(),
            [("rest".to_string(), 10.0)].into(),
        )
        .expect("content");
        Arc::new(library)
    }

    #[tokio::test]
    async fn bad_character_ids_fail_without_erroring() {
        let dir = tempfile::tempdir().expect("tempdir");
        let svc = service(&dir).await;

        let garbled = ActionRequest::new("guild-1", "channel-1", "not-a-uuid", "rest");
        let outcome = svc.handle_action(garbled).await;
        assert!(!outcome.success);
        assert_eq!(outcome.outcome, "invalid");

        let ghost = ActionRequest::new(
            "guild-1",
            "channel-1",
            CharacterId::new().to_string(),
            "rest",
        );
        let outcome = svc.handle_action(ghost).await;
        assert!(!outcome.success);
        assert_eq!(outcome.outcome, "invalid");
    }

    #[tokio::test]
    async fn use_item_resolves_instantly_through_the_facade() {
        let dir = tempfile::tempdir().expect("tempdir");
        let svc = service(&dir).await;
        let tenant = tenant();

        let hero = svc
            .create_character(Character::new(tenant.clone(), "Mira").with_hp(5, 20))
            .await
            .expect("create");
        {
            let mut state = svc.state.write().await;
            state.items.grant(
                ItemInstance::new(tenant.clone(), "healing_potion", ItemOwner::Character(hero)),
                true,
            );
        }

        let request = ActionRequest::new("guild-1", "channel-1", hero.to_string(), "use_item")
            .with_params(json!({ "item": "healing_potion" }));
        let outcome = svc.handle_action(request).await;
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.outcome, "used");

        let hero_after = svc.get_character(&tenant, hero).await.expect("hero");
        assert_eq!(hero_after.hp, 15);
        assert!(svc.inventory(&tenant, hero).await.is_empty());
    }

    #[tokio::test]
    async fn durational_actions_start_queue_and_complete() {
        let dir = tempfile::tempdir().expect("tempdir");
        let svc = service(&dir).await;
        let tenant = tenant();
        svc.load_tenant(&tenant).await.expect("load");

        let (gate, market) = {
            let mut state = svc.state.write().await;
            let market = state
                .locations
                .create(Location::new(tenant.clone(), "Market"));
            let mut gate = Location::new(tenant.clone(), "Gate");
            gate.exits.push(market);
            (state.locations.create(gate), market)
        };
        let hero = svc
            .create_character(Character::new(tenant.clone(), "Mira").with_location(gate))
            .await
            .expect("create");

        let outcome = svc
            .handle_action(
                ActionRequest::new("guild-1", "channel-1", hero.to_string(), "move")
                    .with_params(json!({ "to": market.to_string() })),
            )
            .await;
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.outcome, "started");

        let outcome = svc
            .handle_action(ActionRequest::new(
                "guild-1",
                "channel-1",
                hero.to_string(),
                "rest",
            ))
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.outcome, "queued");

        // The move takes 5 world-seconds; completing it chains the queued
        // rest in the same pass.
        svc.process_world_tick(6.0).await;
        let hero_mid = svc.get_character(&tenant, hero).await.expect("hero");
        assert_eq!(hero_mid.location_id, Some(market));
        assert!(hero_mid.actions.is_busy());

        svc.process_world_tick(10.0).await;
        let hero_done = svc.get_character(&tenant, hero).await.expect("hero");
        assert!(!hero_done.actions.is_busy());
    }

    #[tokio::test]
    async fn stage_keywords_outrank_registry_verbs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let svc = service_with(
            &dir,
            watch_content(),
            test_support::ports_with_rules(test_support::always_success_rules()),
        )
        .await;
        let tenant = tenant();
        svc.load_tenant(&tenant).await.expect("load");

        let hero = svc
            .create_character(Character::new(tenant.clone(), "Rook"))
            .await
            .expect("create");
        let channel = ChannelId::new("watch-1");
        let event_id = svc
            .start_event(&tenant, "night_watch", &channel)
            .await
            .expect("event");

        // "rest" is declared by the lookout stage, so the event machine gets
        // it instead of the rest command.
        let outcome = svc
            .handle_action(ActionRequest::new(
                "guild-1",
                "watch-1",
                hero.to_string(),
                "rest",
            ))
            .await;
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.outcome, "success");
        {
            let state = svc.state.read().await;
            let event = state.events.get(&tenant, event_id).expect("event");
            assert_eq!(event.current_stage_id, "alarm");
        }

        // The alarm stage declares nothing, so the same verb now reaches the
        // registry and starts a normal rest.
        let outcome = svc
            .handle_action(ActionRequest::new(
                "guild-1",
                "watch-1",
                hero.to_string(),
                "rest",
            ))
            .await;
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.outcome, "started");

        let outcome = svc
            .handle_action(ActionRequest::new(
                "guild-1",
                "watch-1",
                hero.to_string(),
                "scout",
            ))
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.outcome, "unknown_action");
    }

    #[tokio::test]
    async fn party_membership_rules_are_enforced() {
        let dir = tempfile::tempdir().expect("tempdir");
        let svc = service(&dir).await;
        let tenant = tenant();
        svc.load_tenant(&tenant).await.expect("load");

        let mira = svc
            .create_character(Character::new(tenant.clone(), "Mira"))
            .await
            .expect("mira");
        let rook = svc
            .create_character(Character::new(tenant.clone(), "Rook"))
            .await
            .expect("rook");

        let party = svc
            .create_party(&tenant, "Lantern Bearers", mira)
            .await
            .expect("party");
        svc.join_party(&tenant, party, rook).await.expect("join");

        let double_lead = svc.create_party(&tenant, "Second", mira).await;
        assert!(double_lead.is_err_and(|e| e.is_validation()));
        let double_join = svc.join_party(&tenant, party, rook).await;
        assert!(double_join.is_err_and(|e| e.is_validation()));

        // The leader leaving promotes the next member.
        svc.leave_party(&tenant, mira).await.expect("leave");
        {
            let state = svc.state.read().await;
            let p = state.parties.get(&tenant, party).expect("party");
            assert_eq!(p.leader, rook);
            assert_eq!(p.members, vec![rook]);
            assert_eq!(
                state.characters.get(&tenant, mira).expect("mira").party_id,
                None
            );
        }

        // The last member leaving removes the party outright.
        svc.leave_party(&tenant, rook).await.expect("leave");
        {
            let state = svc.state.read().await;
            assert!(state.parties.get(&tenant, party).is_none());
        }
        let gone = svc.join_party(&tenant, party, rook).await;
        assert!(gone.is_err_and(|e| e.is_validation()));
    }

    #[tokio::test]
    async fn disbanding_clears_every_membership() {
        let dir = tempfile::tempdir().expect("tempdir");
        let svc = service(&dir).await;
        let tenant = tenant();
        svc.load_tenant(&tenant).await.expect("load");

        let mira = svc
            .create_character(Character::new(tenant.clone(), "Mira"))
            .await
            .expect("mira");
        let rook = svc
            .create_character(Character::new(tenant.clone(), "Rook"))
            .await
            .expect("rook");
        let party = svc
            .create_party(&tenant, "Lantern Bearers", mira)
            .await
            .expect("party");
        svc.join_party(&tenant, party, rook).await.expect("join");

        svc.disband_party(&tenant, party).await.expect("disband");

        let state = svc.state.read().await;
        assert!(state.parties.get(&tenant, party).is_none());
        assert_eq!(
            state.characters.get(&tenant, mira).expect("mira").party_id,
            None
        );
        assert_eq!(
            state.characters.get(&tenant, rook).expect("rook").party_id,
            None
        );
    }

    #[tokio::test]
    async fn status_reports_clock_events_and_activity() {
        let dir = tempfile::tempdir().expect("tempdir");
        let svc = service_with(&dir, watch_content(), test_support::ports()).await;
        let tenant = tenant();

        let fresh = svc.status(&tenant).await.expect("status");
        assert!(fresh.date_display.starts_with("Day 1"));
        assert_eq!(fresh.period, "Night");
        assert_eq!(fresh.active_events, 0);
        assert_eq!(fresh.busy_characters, 0);

        let hero = svc
            .create_character(Character::new(tenant.clone(), "Mira"))
            .await
            .expect("hero");
        let outcome = svc
            .handle_action(ActionRequest::new(
                "guild-1",
                "channel-1",
                hero.to_string(),
                "rest",
            ))
            .await;
        assert!(outcome.success, "{}", outcome.message);
        svc.start_event(&tenant, "night_watch", &ChannelId::new("watch-1"))
            .await
            .expect("event");

        let busy = svc.status(&tenant).await.expect("status");
        assert_eq!(busy.active_events, 1);
        assert_eq!(busy.busy_characters, 1);
    }

    #[tokio::test]
    async fn actions_load_the_tenant_on_demand() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tenant = tenant();
        let hero = {
            let svc = service(&dir).await;
            let hero = svc
                .create_character(Character::new(tenant.clone(), "Mira").with_hp(5, 20))
                .await
                .expect("create");
            {
                let mut state = svc.state.write().await;
                state.items.grant(
                    ItemInstance::new(
                        tenant.clone(),
                        "healing_potion",
                        ItemOwner::Character(hero),
                    ),
                    true,
                );
            }
            svc.save_tenant(&tenant).await.expect("save");
            hero
        };

        // A fresh service over the same database; nothing loaded explicitly.
        let svc = service(&dir).await;
        let outcome = svc
            .handle_action(
                ActionRequest::new("guild-1", "channel-1", hero.to_string(), "use_item")
                    .with_params(json!({ "item": "healing_potion" })),
            )
            .await;
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(svc.get_character(&tenant, hero).await.expect("hero").hp, 15);
    }
}

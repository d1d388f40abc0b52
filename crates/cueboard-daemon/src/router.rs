//! Request handling for the IPC server.

use std::net::SocketAddr;
use std::sync::Arc;

use cueboard_core::{
    ConfigurationResolver, ConfigurationStore, Error, LinkState, ResolvedConfiguration, Result, SessionRegistry,
};
use cueboard_ipc::{
    ChangeKind, ConfigErrorData, ConfigurationChangedData, Event, HealthReport, Method, Registered, Response,
    ServerInfo, ServerMessage, SourceVisibilityReply,
};
use cueboard_switcher::SwitcherConnection;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broadcaster::StatusBroadcaster;
use crate::dispatcher::ActionDispatcher;

/// Where a request came from.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub client_id: u64,
    pub peer: SocketAddr,
    /// Outbound event channel of the requesting connection
    pub outbox: mpsc::Sender<Event>,
}

/// Routes IPC methods to the store, registry, dispatcher and broadcaster.
pub struct RequestRouter {
    store: Arc<ConfigurationStore>,
    resolver: ConfigurationResolver,
    registry: Arc<SessionRegistry>,
    dispatcher: ActionDispatcher,
    broadcaster: Arc<StatusBroadcaster>,
    connection: Arc<SwitcherConnection>,
    /// Events for every connected client
    events: broadcast::Sender<Event>,
    listen_addr: SocketAddr,
}

impl RequestRouter {
    #[must_use]
    pub fn new(
        store: Arc<ConfigurationStore>,
        registry: Arc<SessionRegistry>,
        connection: Arc<SwitcherConnection>,
        broadcaster: Arc<StatusBroadcaster>,
        events: broadcast::Sender<Event>,
        listen_addr: SocketAddr,
    ) -> Self {
        Self {
            resolver: ConfigurationResolver::new(Arc::clone(&store)),
            dispatcher: ActionDispatcher::new(Arc::clone(&registry), Arc::clone(&connection)),
            store,
            registry,
            broadcaster,
            connection,
            events,
            listen_addr,
        }
    }

    /// Handle one request.
    ///
    /// # Errors
    /// Returns the typed error the client sees in the response envelope.
    pub async fn handle(&self, ctx: &RequestContext, method: Method) -> Result<Value> {
        match method {
            Method::Register { client_id, client_name } => {
                let session = self.registry.register(&client_id, &client_name, &ctx.peer.ip().to_string())?;
                let configuration = self.resolver.resolve(&session.config_id)?;
                Ok(to_json(&Registered { session, configuration }))
            }

            Method::SelectConfiguration { session_id, config_id } => {
                let session = self.registry.bind(&session_id, &config_id)?;
                Ok(to_json(&self.resolve_for(&session.session_id, &session.config_id)?))
            }

            Method::GetSessionConfiguration { session_id } => {
                let session = self.registry.touch(&session_id)?;
                Ok(to_json(&self.resolve_for(&session.session_id, &session.config_id)?))
            }

            Method::ListSessions => Ok(to_json(&self.registry.list())),

            Method::ExecuteAction { session_id, action } => {
                self.dispatcher.execute(&session_id, &action).await?;
                Ok(json!({ "success": true }))
            }

            Method::GetStatus => Ok(to_json(&self.broadcaster.status())),

            Method::GetSourceVisibility { scene, source } => {
                let visible = self.broadcaster.source_visibility(&scene, &source).await;
                Ok(to_json(&SourceVisibilityReply { scene, source, visible }))
            }

            Method::ListScenes => {
                let scenes = self.connection.list_scenes().await.map_err(Error::from)?;
                Ok(to_json(&scenes))
            }

            Method::ListInputs => {
                let inputs = self.connection.list_inputs().await.map_err(Error::from)?;
                Ok(to_json(&inputs))
            }

            Method::Health => Ok(to_json(&HealthReport {
                status: "ok".to_string(),
                switcher: self.connection.link_state(),
                sessions: self.registry.len(),
            })),

            Method::GetServerInfo => Ok(to_json(&ServerInfo {
                version: env!("CARGO_PKG_VERSION").to_string(),
                listen_addr: self.listen_addr.to_string(),
                switcher_connected: self.connection.link_state() == LinkState::Connected,
                active_sessions: self.registry.len(),
                configurations: self.store.list_configurations().len(),
                buttons: self.store.list_buttons().len(),
            })),

            Method::ListButtons => Ok(to_json(&self.store.list_buttons())),

            Method::GetButton { id } => Ok(to_json(&self.store.get_button(&id)?)),

            Method::CreateButton { button } => {
                let button = self.store.create_button(button)?;
                self.button_changed(&button.id, ChangeKind::Created);
                Ok(to_json(&button))
            }

            Method::UpdateButton { id, button } => {
                let button = self.store.update_button(&id, button)?;
                self.button_changed(&button.id, ChangeKind::Updated);
                Ok(to_json(&button))
            }

            Method::DeleteButton { id } => {
                let button = self.store.delete_button(&id)?;
                self.button_changed(&button.id, ChangeKind::Deleted);
                Ok(to_json(&button))
            }

            Method::ListConfigurations => Ok(to_json(&self.store.list_configurations())),

            Method::GetConfiguration { id } => Ok(to_json(&self.store.get_configuration(&id)?)),

            Method::GetDefaultConfiguration => {
                let configuration =
                    self.store.default_configuration().ok_or_else(|| Error::not_found("configuration", "default"))?;
                Ok(to_json(&configuration))
            }

            Method::CreateConfiguration { configuration } => {
                let configuration = self.store.create_configuration(configuration)?;
                self.configuration_changed(&configuration.id, ChangeKind::Created);
                Ok(to_json(&configuration))
            }

            Method::UpdateConfiguration { id, configuration } => {
                let configuration = self.store.update_configuration(&id, configuration)?;
                self.configuration_changed(&configuration.id, ChangeKind::Updated);
                Ok(to_json(&configuration))
            }

            Method::DeleteConfiguration { id, promote } => self.delete_configuration(&id, promote.as_deref()),

            Method::SetDefaultConfiguration { id } => {
                let configuration = self.store.set_default(&id)?;
                self.configuration_changed(&configuration.id, ChangeKind::Updated);
                Ok(to_json(&configuration))
            }

            Method::Subscribe { session_id } => {
                self.registry.touch(&session_id)?;
                self.broadcaster.subscribe(&session_id, ctx.client_id, ctx.outbox.clone());
                Ok(json!({ "subscribed": true }))
            }

            Method::Unsubscribe { session_id } => {
                let removed = self.broadcaster.unsubscribe(&session_id, ctx.client_id);
                Ok(json!({ "subscribed": false, "removed": removed }))
            }
        }
    }

    /// Serve requests from the IPC server until `cancel` fires or the
    /// server goes away.
    pub async fn serve(self: Arc<Self>, mut messages: mpsc::Receiver<ServerMessage>, cancel: CancellationToken) {
        loop {
            let message = tokio::select! {
                () = cancel.cancelled() => break,
                message = messages.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            match message {
                ServerMessage::Request(incoming) => {
                    let router = Arc::clone(&self);
                    tokio::spawn(async move {
                        let ctx = RequestContext {
                            client_id: incoming.client_id,
                            peer: incoming.peer,
                            outbox: incoming.events,
                        };
                        let id = incoming.request.id;
                        debug!(client_id = ctx.client_id, request_id = id, "Handling IPC request");
                        let response = match router.handle(&ctx, incoming.request.method).await {
                            Ok(value) => Response::ok(id, value),
                            Err(e) => {
                                debug!(client_id = ctx.client_id, request_id = id, error = %e, "Request failed");
                                Response::err(id, e.into())
                            }
                        };
                        let _ = incoming.reply.send(response).await;
                    });
                }
                ServerMessage::Disconnected { client_id } => {
                    self.broadcaster.remove_client(client_id);
                }
            }
        }
        info!("Request router stopped");
    }

    /// Resolve a session's configuration.
    fn resolve_for(&self, session_id: &str, config_id: &str) -> Result<ResolvedConfiguration> {
        self.resolver.resolve(config_id).inspect_err(|e| {
            warn!(session_id, config_id, error = %e, "Bound configuration does not resolve");
        })
    }

    /// Delete a configuration and move its sessions to the default.
    fn delete_configuration(&self, id: &str, promote: Option<&str>) -> Result<Value> {
        let deleted = self.store.delete_configuration(id, promote)?;
        self.configuration_changed(id, ChangeKind::Deleted);
        if let Some(promoted) = deleted.promoted.as_deref() {
            self.configuration_changed(promoted, ChangeKind::Updated);
        }

        let Some(fallback) = deleted.default_id.as_deref() else {
            warn!(config_id = id, "No default configuration left to rebind sessions to");
            return Ok(to_json(&deleted.configuration));
        };
        for session in self.registry.rebind_orphans(id, fallback) {
            let event = Event::config_error(&ConfigErrorData {
                session_id: session.session_id.clone(),
                deleted_config_id: id.to_string(),
                fallback_config_id: fallback.to_string(),
                message: format!("Configuration '{}' was deleted", deleted.configuration.name),
            });
            self.broadcaster.send_to_session(&session.session_id, &event);
        }
        Ok(to_json(&deleted.configuration))
    }

    fn button_changed(&self, button_id: &str, change: ChangeKind) {
        let _ = self.events.send(Event::configuration_changed(&ConfigurationChangedData::button(button_id, change)));
    }

    fn configuration_changed(&self, config_id: &str, change: ChangeKind) {
        let _ = self
            .events
            .send(Event::configuration_changed(&ConfigurationChangedData::configuration(config_id, change)));
    }
}

fn to_json(value: &impl Serialize) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use cueboard_core::{
        ButtonAction, ButtonDraft, ClientSession, Configuration, ConfigurationDraft, GridConfig, LinkState, Position,
        RawAction, SwitcherCommand, SwitcherStatus,
    };
    use cueboard_ipc::EventType;
    use cueboard_switcher::{ConnectionConfig, SimulatedSwitcher};

    use super::*;
    use crate::broadcaster::BroadcasterConfig;

    struct Fixture {
        sim: SimulatedSwitcher,
        connection: Arc<SwitcherConnection>,
        broadcaster: Arc<StatusBroadcaster>,
        router: RequestRouter,
        events: broadcast::Receiver<Event>,
        cancel: CancellationToken,
    }

    fn fixture() -> Fixture {
        let sim = SimulatedSwitcher::new();
        let store = Arc::new(ConfigurationStore::new());
        store.seed_default(GridConfig::new(3, 4)).unwrap();
        let registry = Arc::new(SessionRegistry::new(Arc::clone(&store)));
        let connection = Arc::new(SwitcherConnection::new(
            Arc::new(sim.clone()),
            ConnectionConfig { command_timeout: Duration::from_millis(200), ..ConnectionConfig::default() },
        ));
        let broadcaster = Arc::new(StatusBroadcaster::new(
            Arc::clone(&connection),
            ConfigurationResolver::new(Arc::clone(&store)),
            BroadcasterConfig { poll_interval: Duration::from_millis(100), query_timeout: Duration::from_millis(50) },
        ));
        let (events_tx, events) = broadcast::channel(16);
        let router = RequestRouter::new(
            store,
            registry,
            Arc::clone(&connection),
            Arc::clone(&broadcaster),
            events_tx,
            "127.0.0.1:8080".parse().unwrap(),
        );
        Fixture { sim, connection, broadcaster, router, events, cancel: CancellationToken::new() }
    }

    fn ctx(client_id: u64) -> (RequestContext, mpsc::Receiver<Event>) {
        let (outbox, rx) = mpsc::channel(16);
        (RequestContext { client_id, peer: "10.0.0.7:51000".parse().unwrap(), outbox }, rx)
    }

    async fn call<T: serde::de::DeserializeOwned>(fixture: &Fixture, ctx: &RequestContext, method: Method) -> T {
        serde_json::from_value(fixture.router.handle(ctx, method).await.unwrap()).unwrap()
    }

    async fn register(fixture: &Fixture, ctx: &RequestContext, client_id: &str) -> Registered {
        call(fixture, ctx, Method::Register { client_id: client_id.into(), client_name: "Host".into() }).await
    }

    fn scene_button(scene: &str) -> ButtonDraft {
        let action = RawAction::new("switch_scene", json!({ "scene_name": scene }));
        ButtonDraft::new(scene, &ButtonAction::parse(&action).unwrap())
    }

    #[tokio::test]
    async fn test_register_binds_default_configuration() {
        let fixture = fixture();
        let (ctx, _rx) = ctx(1);

        let registered = register(&fixture, &ctx, "web-host-123").await;
        assert_eq!(registered.session.client_id, "web-host-123");
        assert_eq!(registered.session.ip_address, "10.0.0.7");

        let configurations: Vec<Configuration> = call(&fixture, &ctx, Method::ListConfigurations).await;
        let default = configurations.iter().find(|c| c.is_default).unwrap();
        assert_eq!(registered.session.config_id, default.id);
        assert_eq!(registered.configuration.id, default.id);

        let again = register(&fixture, &ctx, "web-host-123").await;
        assert_eq!(again.session.session_id, registered.session.session_id);
        assert_eq!(again.session.config_id, registered.session.config_id);

        let sessions: Vec<ClientSession> = call(&fixture, &ctx, Method::ListSessions).await;
        assert_eq!(sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_select_configuration_resolves_grid() {
        let fixture = fixture();
        let (ctx, _rx) = ctx(1);
        let registered = register(&fixture, &ctx, "c1").await;

        let button: cueboard_core::Button =
            call(&fixture, &ctx, Method::CreateButton { button: scene_button("Scene A") }).await;
        let configuration: Configuration = call(
            &fixture,
            &ctx,
            Method::CreateConfiguration {
                configuration: ConfigurationDraft::new("Small", GridConfig::new(2, 2))
                    .with_button(Position::new(0, 0), &button.id),
            },
        )
        .await;

        let resolved: ResolvedConfiguration = call(
            &fixture,
            &ctx,
            Method::SelectConfiguration {
                session_id: registered.session.session_id.clone(),
                config_id: configuration.id.clone(),
            },
        )
        .await;
        assert_eq!(resolved.buttons.len(), 1);
        assert_eq!((resolved.buttons[0].row, resolved.buttons[0].col), (0, 0));
        assert_eq!(resolved.buttons[0].action, button.action);

        let bound: ResolvedConfiguration = call(
            &fixture,
            &ctx,
            Method::GetSessionConfiguration { session_id: registered.session.session_id },
        )
        .await;
        assert_eq!(bound, resolved);
    }

    #[tokio::test]
    async fn test_errors_are_typed() {
        let fixture = fixture();
        let (ctx, _rx) = ctx(1);

        let err = fixture
            .router
            .handle(&ctx, Method::SelectConfiguration { session_id: "ghost".into(), config_id: "x".into() })
            .await
            .unwrap_err();
        assert_matches!(err, Error::Unauthenticated(_));

        let err = fixture.router.handle(&ctx, Method::GetButton { id: "missing".into() }).await.unwrap_err();
        assert_matches!(err, Error::NotFound { kind: "button", .. });

        let err = fixture
            .router
            .handle(
                &ctx,
                Method::CreateConfiguration { configuration: ConfigurationDraft::new("Huge", GridConfig::new(11, 2)) },
            )
            .await
            .unwrap_err();
        assert_matches!(err, Error::Validation { ref field, .. } if field == "grid.rows");

        let err = fixture.router.handle(&ctx, Method::ListScenes).await.unwrap_err();
        assert_matches!(err, Error::SwitcherUnavailable(_));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_action_and_inventory() {
        let mut fixture = fixture();
        tokio::spawn(Arc::clone(&fixture.connection).run(fixture.cancel.clone()));
        fixture.connection.subscribe_link().wait_for(|s| *s == LinkState::Connected).await.unwrap();
        let (ctx, _rx) = ctx(1);
        let registered = register(&fixture, &ctx, "web-host-123").await;

        let result: Value = call(
            &fixture,
            &ctx,
            Method::ExecuteAction {
                session_id: registered.session.session_id,
                action: RawAction::new("set_input_volume", json!({ "input_name": "Mic", "volume_db": -6 })),
            },
        )
        .await;
        assert_eq!(result["success"], true);
        assert_eq!(fixture.sim.commands(), vec![SwitcherCommand::SetInputVolume { input: "Mic".into(), volume_db: -6.0 }]);

        let scenes: Vec<String> = call(&fixture, &ctx, Method::ListScenes).await;
        assert_eq!(scenes, vec!["Scene A", "Scene B"]);
        let inputs: Vec<String> = call(&fixture, &ctx, Method::ListInputs).await;
        assert!(inputs.contains(&"Mic".to_string()));

        let health: HealthReport = call(&fixture, &ctx, Method::Health).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.switcher, LinkState::Connected);
        assert_eq!(health.sessions, 1);

        let info: ServerInfo = call(&fixture, &ctx, Method::GetServerInfo).await;
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(info.listen_addr, "127.0.0.1:8080");
        assert!(info.switcher_connected);
        assert_eq!(info.active_sessions, 1);
        assert_eq!(info.configurations, 1);
        assert_eq!(info.buttons, 6);

        // Nothing was edited, so nothing was announced.
        assert!(fixture.events.try_recv().is_err());
        fixture.cancel.cancel();
    }

    #[tokio::test]
    async fn test_mutations_broadcast_configuration_changed() {
        let mut fixture = fixture();
        let (ctx, _rx) = ctx(1);

        let button: cueboard_core::Button =
            call(&fixture, &ctx, Method::CreateButton { button: scene_button("Scene B") }).await;
        let event = fixture.events.try_recv().unwrap();
        assert_eq!(event.event, EventType::ConfigurationChanged);
        assert_eq!(event.data["button_id"], button.id.as_str());
        assert_eq!(event.data["change"], "created");

        let _: cueboard_core::Button = call(&fixture, &ctx, Method::DeleteButton { id: button.id.clone() }).await;
        let event = fixture.events.try_recv().unwrap();
        assert_eq!(event.data["change"], "deleted");
    }

    #[tokio::test]
    async fn test_get_default_configuration() {
        let fixture = fixture();
        let (ctx, _rx) = ctx(1);
        let registered = register(&fixture, &ctx, "c1").await;

        let default: Configuration = call(&fixture, &ctx, Method::GetDefaultConfiguration).await;
        assert!(default.is_default);
        assert_eq!(default.id, registered.session.config_id);

        let next: Configuration = call(
            &fixture,
            &ctx,
            Method::CreateConfiguration { configuration: ConfigurationDraft::new("Next", GridConfig::new(2, 2)) },
        )
        .await;
        let _: Configuration = call(&fixture, &ctx, Method::SetDefaultConfiguration { id: next.id.clone() }).await;
        let default: Configuration = call(&fixture, &ctx, Method::GetDefaultConfiguration).await;
        assert_eq!(default.id, next.id);
    }

    #[tokio::test]
    async fn test_renaming_default_keeps_it_default() {
        let fixture = fixture();
        let (ctx, _rx) = ctx(1);
        let default: Configuration = call(&fixture, &ctx, Method::GetDefaultConfiguration).await;

        let configuration: ConfigurationDraft =
            serde_json::from_value(json!({ "name": "Main", "grid": { "rows": 3, "cols": 4 } })).unwrap();
        let renamed: Configuration =
            call(&fixture, &ctx, Method::UpdateConfiguration { id: default.id.clone(), configuration }).await;
        assert!(renamed.is_default);

        let registered = register(&fixture, &ctx, "after-rename").await;
        assert_eq!(registered.session.config_id, default.id);
        assert_eq!(registered.configuration.name, "Main");
    }

    #[tokio::test]
    async fn test_promote_ignored_for_non_default_delete() {
        let mut fixture = fixture();
        let (ctx, _rx) = ctx(1);
        let a: Configuration = call(
            &fixture,
            &ctx,
            Method::CreateConfiguration { configuration: ConfigurationDraft::new("A", GridConfig::new(1, 1)) },
        )
        .await;
        let b: Configuration = call(
            &fixture,
            &ctx,
            Method::CreateConfiguration { configuration: ConfigurationDraft::new("B", GridConfig::new(1, 1)) },
        )
        .await;
        while fixture.events.try_recv().is_ok() {}

        let _: Configuration =
            call(&fixture, &ctx, Method::DeleteConfiguration { id: a.id.clone(), promote: Some(b.id.clone()) }).await;
        let event = fixture.events.try_recv().unwrap();
        assert_eq!(event.data["config_id"], a.id.as_str());
        assert_eq!(event.data["change"], "deleted");
        assert!(fixture.events.try_recv().is_err());

        let b: Configuration = call(&fixture, &ctx, Method::GetConfiguration { id: b.id }).await;
        assert!(!b.is_default);
    }

    #[tokio::test]
    async fn test_status_pull_and_subscribe() {
        let fixture = fixture();
        let (ctx, mut rx) = ctx(4);
        let registered = register(&fixture, &ctx, "c1").await;

        let status: SwitcherStatus = call(&fixture, &ctx, Method::GetStatus).await;
        assert!(!status.connected);

        let _: Value = call(&fixture, &ctx, Method::Subscribe { session_id: registered.session.session_id.clone() }).await;
        let event = rx.try_recv().unwrap();
        assert_eq!(event.event, EventType::StatusUpdate);
        assert_eq!(event.data["status"]["connected"], false);

        let reply: SourceVisibilityReply =
            call(&fixture, &ctx, Method::GetSourceVisibility { scene: "Scene A".into(), source: "Cam".into() }).await;
        assert!(!reply.visible);

        let result: Value =
            call(&fixture, &ctx, Method::Unsubscribe { session_id: registered.session.session_id }).await;
        assert_eq!(result["removed"], true);
        assert_eq!(fixture.broadcaster.subscribed_sessions(), 0);
    }

    #[tokio::test]
    async fn test_deleting_bound_configuration_rebinds_and_notifies() {
        let fixture = fixture();
        let (ctx, mut rx) = ctx(1);
        let registered = register(&fixture, &ctx, "c1").await;
        let default_id = registered.session.config_id.clone();
        let session_id = registered.session.session_id.clone();

        let stage: Configuration = call(
            &fixture,
            &ctx,
            Method::CreateConfiguration { configuration: ConfigurationDraft::new("Stage", GridConfig::new(1, 1)) },
        )
        .await;
        let _: ResolvedConfiguration = call(
            &fixture,
            &ctx,
            Method::SelectConfiguration { session_id: session_id.clone(), config_id: stage.id.clone() },
        )
        .await;
        let _: Value = call(&fixture, &ctx, Method::Subscribe { session_id: session_id.clone() }).await;
        let _ = rx.try_recv().unwrap();

        let _: Configuration =
            call(&fixture, &ctx, Method::DeleteConfiguration { id: stage.id.clone(), promote: None }).await;

        let event = rx.try_recv().unwrap();
        assert_eq!(event.event, EventType::ConfigError);
        let data: ConfigErrorData = serde_json::from_value(event.data).unwrap();
        assert_eq!(data.session_id, session_id);
        assert_eq!(data.deleted_config_id, stage.id);
        assert_eq!(data.fallback_config_id, default_id);

        let bound: ResolvedConfiguration =
            call(&fixture, &ctx, Method::GetSessionConfiguration { session_id }).await;
        assert_eq!(bound.id, default_id);
    }

    #[tokio::test]
    async fn test_deleting_default_needs_promotion() {
        let fixture = fixture();
        let (ctx, mut rx) = ctx(1);
        let registered = register(&fixture, &ctx, "c1").await;
        let default_id = registered.session.config_id.clone();
        let _: Value = call(&fixture, &ctx, Method::Subscribe { session_id: registered.session.session_id.clone() }).await;
        let _ = rx.try_recv().unwrap();

        let err = fixture
            .router
            .handle(&ctx, Method::DeleteConfiguration { id: default_id.clone(), promote: None })
            .await
            .unwrap_err();
        assert_matches!(err, Error::Validation { ref field, .. } if field == "is_default");

        let next: Configuration = call(
            &fixture,
            &ctx,
            Method::CreateConfiguration { configuration: ConfigurationDraft::new("Next", GridConfig::new(2, 2)) },
        )
        .await;
        let _: Configuration = call(
            &fixture,
            &ctx,
            Method::DeleteConfiguration { id: default_id, promote: Some(next.id.clone()) },
        )
        .await;

        let event = rx.try_recv().unwrap();
        let data: ConfigErrorData = serde_json::from_value(event.data).unwrap();
        assert_eq!(data.fallback_config_id, next.id);

        let configurations: Vec<Configuration> = call(&fixture, &ctx, Method::ListConfigurations).await;
        assert_eq!(configurations.len(), 1);
        assert!(configurations[0].is_default);
    }
}

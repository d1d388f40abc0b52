//! Action execution on behalf of a session.

use std::sync::Arc;

use cueboard_core::{ButtonAction, RawAction, Result, SessionRegistry, SwitcherCommand};
use cueboard_switcher::SwitcherConnection;
use tracing::{debug, info, warn};

/// Turns a session's raw action into exactly one switcher command.
pub struct ActionDispatcher {
    registry: Arc<SessionRegistry>,
    connection: Arc<SwitcherConnection>,
}

impl ActionDispatcher {
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>, connection: Arc<SwitcherConnection>) -> Self {
        Self { registry, connection }
    }

    /// Validate `action` and run it on the switcher.
    ///
    /// On success the session is touched and becomes active. A failed
    /// command leaves the session as it was.
    ///
    /// # Errors
    /// `Unauthenticated` for an unknown session, `Validation` for an unknown
    /// tag or missing params, `SwitcherUnavailable` while the switcher is
    /// down, `Timeout` past the command deadline and `CommandFailed` when
    /// the switcher rejects the command.
    pub async fn execute(&self, session_id: &str, action: &RawAction) -> Result<()> {
        self.registry.lookup(session_id)?;
        let action = ButtonAction::parse(action)?;
        let command = SwitcherCommand::from(&action);

        debug!(session_id, action = %action.kind(), "Dispatching action");
        if let Err(e) = self.connection.execute(&command).await {
            warn!(session_id, action = %action.kind(), error = %e, "Action failed");
            return Err(e.into());
        }

        self.registry.mark_active(session_id)?;
        info!(session_id, action = %action.kind(), "Action executed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use cueboard_core::{ConfigurationStore, Error, GridConfig, LinkState, SessionState};
    use cueboard_switcher::{ConnectionConfig, SimulatedSwitcher};
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use super::*;

    struct Fixture {
        sim: SimulatedSwitcher,
        registry: Arc<SessionRegistry>,
        connection: Arc<SwitcherConnection>,
        dispatcher: ActionDispatcher,
        cancel: CancellationToken,
    }

    fn fixture(sim: SimulatedSwitcher) -> Fixture {
        let store = Arc::new(ConfigurationStore::new());
        store.seed_default(GridConfig::new(2, 2)).unwrap();
        let registry = Arc::new(SessionRegistry::new(Arc::clone(&store)));
        let config = ConnectionConfig { command_timeout: Duration::from_millis(200), ..ConnectionConfig::default() };
        let connection = Arc::new(SwitcherConnection::new(Arc::new(sim.clone()), config));
        let dispatcher = ActionDispatcher::new(Arc::clone(&registry), Arc::clone(&connection));
        Fixture { sim, registry, connection, dispatcher, cancel: CancellationToken::new() }
    }

    async fn connect(fixture: &Fixture) {
        tokio::spawn(Arc::clone(&fixture.connection).run(fixture.cancel.clone()));
        let mut link = fixture.connection.subscribe_link();
        link.wait_for(|state| *state == LinkState::Connected).await.unwrap();
    }

    fn volume() -> RawAction {
        RawAction::new("set_input_volume", json!({ "input_name": "Mic", "volume_db": -6 }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_volume_action_issues_one_command() {
        let fixture = fixture(SimulatedSwitcher::new());
        connect(&fixture).await;
        let session = fixture.registry.register("web-host-123", "Host", "10.0.0.2").unwrap();

        fixture.dispatcher.execute(&session.session_id, &volume()).await.unwrap();

        assert_eq!(
            fixture.sim.commands(),
            vec![SwitcherCommand::SetInputVolume { input: "Mic".into(), volume_db: -6.0 }]
        );
        let session = fixture.registry.lookup(&session.session_id).unwrap();
        assert_eq!(session.state, SessionState::Active);
        fixture.cancel.cancel();
    }

    #[tokio::test]
    async fn test_unknown_session_is_unauthenticated() {
        let fixture = fixture(SimulatedSwitcher::new());
        let err = fixture.dispatcher.execute("nope", &volume()).await.unwrap_err();
        assert_matches!(err, Error::Unauthenticated(_));
    }

    #[tokio::test]
    async fn test_invalid_action_never_reaches_switcher() {
        let fixture = fixture(SimulatedSwitcher::new());
        let session = fixture.registry.register("c1", "", "").unwrap();

        let err = fixture
            .dispatcher
            .execute(&session.session_id, &RawAction::new("switch_scene", json!({})))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Validation { ref field, .. } if field == "params.scene_name");

        let err = fixture
            .dispatcher
            .execute(&session.session_id, &RawAction::new("launch_rocket", json!({})))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Validation { ref field, .. } if field == "type");
        assert!(fixture.sim.commands().is_empty());
    }

    #[tokio::test]
    async fn test_disconnected_switcher_fails_fast() {
        let fixture = fixture(SimulatedSwitcher::new());
        let session = fixture.registry.register("c1", "", "").unwrap();

        let err = fixture.dispatcher.execute(&session.session_id, &volume()).await.unwrap_err();
        assert_matches!(err, Error::SwitcherUnavailable(_));
        assert_eq!(fixture.registry.lookup(&session.session_id).unwrap().state, SessionState::Registered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_switcher_times_out() {
        let fixture = fixture(SimulatedSwitcher::new().with_delay(Duration::from_millis(350)));
        connect(&fixture).await;
        let session = fixture.registry.register("c1", "", "").unwrap();

        let err = fixture.dispatcher.execute(&session.session_id, &volume()).await.unwrap_err();
        assert_matches!(err, Error::Timeout(_));
        fixture.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_command_is_command_failed() {
        let fixture = fixture(SimulatedSwitcher::new());
        connect(&fixture).await;
        let session = fixture.registry.register("c1", "", "").unwrap();

        let action = RawAction::new("switch_scene", json!({ "scene_name": "Nowhere" }));
        let err = fixture.dispatcher.execute(&session.session_id, &action).await.unwrap_err();
        assert_matches!(err, Error::CommandFailed(_));
        fixture.cancel.cancel();
    }
}

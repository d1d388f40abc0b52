//! OBS Studio backend speaking obs-websocket protocol v5.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use cueboard_core::{Output, Switch, SwitcherCommand, SwitcherStatus};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{SwitcherBackend, SwitcherSession};
use crate::error::{SwitcherError, SwitcherResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<RequestResponse>>>>;

const RPC_VERSION: u32 = 1;

/// Message opcodes.
mod op {
    pub const HELLO: u8 = 0;
    pub const IDENTIFY: u8 = 1;
    pub const IDENTIFIED: u8 = 2;
    pub const REQUEST: u8 = 6;
    pub const REQUEST_RESPONSE: u8 = 7;
}

#[derive(Debug, Deserialize)]
struct Envelope {
    op: u8,
    #[serde(default)]
    d: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Hello {
    #[serde(default)]
    authentication: Option<AuthChallenge>,
    #[serde(default)]
    obs_web_socket_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthChallenge {
    challenge: String,
    salt: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Identified {
    #[serde(default)]
    negotiated_rpc_version: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestResponse {
    request_id: String,
    request_status: RequestStatus,
    #[serde(default)]
    response_data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RequestStatus {
    result: bool,
    code: i64,
    #[serde(default)]
    comment: Option<String>,
}

/// Authentication string for the Identify message:
/// `base64(sha256(base64(sha256(password + salt)) + challenge))`.
#[must_use]
pub fn auth_response(password: &str, salt: &str, challenge: &str) -> String {
    let secret = BASE64.encode(Sha256::digest(format!("{password}{salt}").as_bytes()));
    BASE64.encode(Sha256::digest(format!("{secret}{challenge}").as_bytes()))
}

fn identify_message(hello: &Hello, password: Option<&str>) -> SwitcherResult<Value> {
    let mut d = json!({ "rpcVersion": RPC_VERSION, "eventSubscriptions": 0 });
    if let Some(auth) = &hello.authentication {
        let password =
            password.ok_or_else(|| SwitcherError::Handshake("OBS requires a password but none is configured".into()))?;
        d["authentication"] = Value::String(auth_response(password, &auth.salt, &auth.challenge));
    }
    Ok(json!({ "op": op::IDENTIFY, "d": d }))
}

fn output_request(output: Output, switch: Switch) -> String {
    let verb = match switch {
        Switch::On => "Start",
        Switch::Off => "Stop",
        Switch::Toggle => "Toggle",
    };
    let noun = match output {
        Output::Stream => "Stream",
        Output::Record => "Record",
        Output::ReplayBuffer => "ReplayBuffer",
        Output::VirtualCam => "VirtualCam",
    };
    format!("{verb}{noun}")
}

fn describe_close(frame: Option<&CloseFrame<'_>>) -> String {
    frame.map_or_else(
        || "connection closed".to_string(),
        |f| format!("connection closed with code {}: {}", u16::from(f.code), f.reason),
    )
}

/// Wait for a message with opcode `expected`, skipping anything else.
async fn expect_op<T: DeserializeOwned>(ws: &mut WsStream, expected: u8) -> SwitcherResult<T> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                let envelope: Envelope = serde_json::from_str(&text)?;
                if envelope.op == expected {
                    return Ok(serde_json::from_value(envelope.d)?);
                }
                debug!(op = envelope.op, expected, "Skipping message during handshake");
            }
            Some(Ok(Message::Close(frame))) => return Err(SwitcherError::Handshake(describe_close(frame.as_ref()))),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
            None => return Err(SwitcherError::Handshake("connection closed".into())),
        }
    }
}

/// Connects to OBS over WebSocket.
#[derive(Debug, Clone)]
pub struct ObsBackend {
    url: String,
    password: Option<String>,
}

impl ObsBackend {
    #[must_use]
    pub fn new(url: impl Into<String>, password: Option<String>) -> Self {
        Self { url: url.into(), password: password.filter(|p| !p.is_empty()) }
    }
}

#[async_trait]
impl SwitcherBackend for ObsBackend {
    fn name(&self) -> &'static str {
        "obs"
    }

    async fn connect(&self) -> SwitcherResult<Box<dyn SwitcherSession>> {
        let (mut ws, _) = connect_async(self.url.as_str()).await?;

        let hello: Hello = expect_op(&mut ws, op::HELLO).await?;
        let identify = identify_message(&hello, self.password.as_deref())?;
        ws.send(Message::Text(identify.to_string())).await?;
        let identified: Identified = expect_op(&mut ws, op::IDENTIFIED).await?;

        info!(
            url = %self.url,
            obs_websocket = hello.obs_web_socket_version.as_deref().unwrap_or("unknown"),
            rpc_version = identified.negotiated_rpc_version,
            "Connected to OBS"
        );

        let (sink, stream) = ws.split();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let closed = CancellationToken::new();
        tokio::spawn(read_loop(stream, Arc::clone(&pending), closed.clone()));

        Ok(Box::new(ObsSession { sink, pending, closed, next_id: 1 }))
    }
}

/// Route request responses to their waiters until the socket closes.
async fn read_loop(mut stream: SplitStream<WsStream>, pending: Pending, closed: CancellationToken) {
    loop {
        let message = tokio::select! {
            () = closed.cancelled() => break,
            message = stream.next() => message,
        };
        match message {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<Envelope>(&text) {
                Ok(envelope) if envelope.op == op::REQUEST_RESPONSE => {
                    match serde_json::from_value::<RequestResponse>(envelope.d) {
                        Ok(response) => {
                            let waiter = pending.lock().remove(&response.request_id);
                            match waiter {
                                Some(tx) => {
                                    let _ = tx.send(response);
                                }
                                None => debug!(request_id = %response.request_id, "Response for unknown request"),
                            }
                        }
                        Err(e) => warn!(error = %e, "Malformed OBS request response"),
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Malformed OBS message"),
            },
            Some(Ok(Message::Close(frame))) => {
                info!(reason = %describe_close(frame.as_ref()), "OBS closed the connection");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(error = %e, "OBS connection error");
                break;
            }
            None => break,
        }
    }

    pending.lock().clear();
    closed.cancel();
}

struct ObsSession {
    sink: SplitSink<WsStream, Message>,
    pending: Pending,
    closed: CancellationToken,
    next_id: u64,
}

impl Drop for ObsSession {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

impl ObsSession {
    async fn request(&mut self, request_type: &str, data: Value) -> SwitcherResult<Value> {
        if self.closed.is_cancelled() {
            return Err(SwitcherError::ConnectionLost("OBS connection closed".into()));
        }

        let request_id = self.next_id.to_string();
        self.next_id += 1;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id.clone(), tx);

        let mut d = json!({ "requestType": request_type, "requestId": request_id });
        if !data.is_null() {
            d["requestData"] = data;
        }
        let message = json!({ "op": op::REQUEST, "d": d }).to_string();
        if let Err(e) = self.sink.send(Message::Text(message)).await {
            self.pending.lock().remove(&request_id);
            return Err(e.into());
        }

        let response = rx.await.map_err(|_| {
            SwitcherError::ConnectionLost(format!("OBS closed the connection before answering {request_type}"))
        })?;
        if response.request_status.result {
            debug!(request_type, "OBS request succeeded");
            Ok(response.response_data.unwrap_or(Value::Null))
        } else {
            Err(SwitcherError::Rejected {
                request: request_type.to_string(),
                code: response.request_status.code,
                comment: response.request_status.comment.unwrap_or_default(),
            })
        }
    }

    async fn call(&mut self, request_type: &str) -> SwitcherResult<()> {
        self.request(request_type, Value::Null).await.map(drop)
    }

    async fn field<T: DeserializeOwned>(&mut self, request_type: &str, data: Value, field: &str) -> SwitcherResult<T> {
        let mut response = self.request(request_type, data).await?;
        let value = response
            .get_mut(field)
            .map(Value::take)
            .ok_or_else(|| SwitcherError::Protocol(format!("{request_type} response lacks {field}")))?;
        Ok(serde_json::from_value(value)?)
    }

    /// Read a flag that older or stripped-down OBS builds may not support.
    async fn optional_flag(&mut self, request_type: &str, field: &str) -> SwitcherResult<bool> {
        match self.field(request_type, Value::Null, field).await {
            Ok(flag) => Ok(flag),
            Err(e) if e.is_connection_loss() => Err(e),
            Err(e) => {
                debug!(request_type, error = %e, "Treating unavailable flag as off");
                Ok(false)
            }
        }
    }

    async fn program_scene(&mut self) -> SwitcherResult<String> {
        self.field("GetCurrentProgramScene", Value::Null, "currentProgramSceneName").await
    }

    async fn scene_item_id(&mut self, scene: &str, source: &str) -> SwitcherResult<i64> {
        self.field("GetSceneItemId", json!({ "sceneName": scene, "sourceName": source }), "sceneItemId").await
    }

    async fn set_studio_mode(&mut self, switch: Switch) -> SwitcherResult<()> {
        let current = match switch {
            Switch::Toggle => self.field("GetStudioModeEnabled", Value::Null, "studioModeEnabled").await?,
            Switch::On | Switch::Off => false,
        };
        self.request("SetStudioModeEnabled", json!({ "studioModeEnabled": switch.apply(current) })).await.map(drop)
    }

    async fn set_visibility(&mut self, scene: Option<&str>, source: &str, switch: Switch) -> SwitcherResult<()> {
        let scene = match scene {
            Some(scene) => scene.to_string(),
            None => self.program_scene().await?,
        };
        let item_id = self.scene_item_id(&scene, source).await?;
        let current = match switch {
            Switch::Toggle => {
                self.field(
                    "GetSceneItemEnabled",
                    json!({ "sceneName": scene, "sceneItemId": item_id }),
                    "sceneItemEnabled",
                )
                .await?
            }
            Switch::On | Switch::Off => false,
        };
        let data = json!({ "sceneName": scene, "sceneItemId": item_id, "sceneItemEnabled": switch.apply(current) });
        self.request("SetSceneItemEnabled", data).await.map(drop)
    }

    async fn set_filter(&mut self, source: &str, filter: &str, switch: Switch) -> SwitcherResult<()> {
        let current = match switch {
            Switch::Toggle => {
                self.field("GetSourceFilter", json!({ "sourceName": source, "filterName": filter }), "filterEnabled")
                    .await?
            }
            Switch::On | Switch::Off => false,
        };
        let data = json!({ "sourceName": source, "filterName": filter, "filterEnabled": switch.apply(current) });
        self.request("SetSourceFilterEnabled", data).await.map(drop)
    }

    async fn names(&mut self, request_type: &str, list: &str, key: &str) -> SwitcherResult<Vec<String>> {
        let entries: Vec<Value> = self.field(request_type, Value::Null, list).await?;
        Ok(entries.iter().filter_map(|e| e.get(key).and_then(Value::as_str)).map(str::to_string).collect())
    }
}

#[async_trait]
impl SwitcherSession for ObsSession {
    async fn execute(&mut self, command: &SwitcherCommand) -> SwitcherResult<()> {
        match command {
            SwitcherCommand::SetProgramScene { scene } => {
                self.request("SetCurrentProgramScene", json!({ "sceneName": scene })).await.map(drop)
            }
            SwitcherCommand::SetPreviewScene { scene } => {
                self.request("SetCurrentPreviewScene", json!({ "sceneName": scene })).await.map(drop)
            }
            SwitcherCommand::SetOutput { output, switch } => self.call(&output_request(*output, *switch)).await,
            SwitcherCommand::PauseRecord => self.call("PauseRecord").await,
            SwitcherCommand::ResumeRecord => self.call("ResumeRecord").await,
            SwitcherCommand::SaveReplayBuffer => self.call("SaveReplayBuffer").await,
            SwitcherCommand::SetStudioMode { switch } => self.set_studio_mode(*switch).await,
            SwitcherCommand::TriggerStudioTransition => self.call("TriggerStudioModeTransition").await,
            SwitcherCommand::SetCurrentTransition { transition } => {
                self.request("SetCurrentSceneTransition", json!({ "transitionName": transition })).await.map(drop)
            }
            SwitcherCommand::SetTransitionDuration { duration_ms } => self
                .request("SetCurrentSceneTransitionDuration", json!({ "transitionDuration": duration_ms }))
                .await
                .map(drop),
            SwitcherCommand::SetInputVolume { input, volume_db } => self
                .request("SetInputVolume", json!({ "inputName": input, "inputVolumeDb": volume_db }))
                .await
                .map(drop),
            SwitcherCommand::SetInputMute { input, switch: Switch::Toggle } => {
                self.request("ToggleInputMute", json!({ "inputName": input })).await.map(drop)
            }
            SwitcherCommand::SetInputMute { input, switch } => self
                .request("SetInputMute", json!({ "inputName": input, "inputMuted": *switch == Switch::On }))
                .await
                .map(drop),
            SwitcherCommand::SetSourceVisibility { scene, source, switch } => {
                self.set_visibility(scene.as_deref(), source, *switch).await
            }
            SwitcherCommand::SetSourceFilter { source, filter, switch } => {
                self.set_filter(source, filter, *switch).await
            }
            SwitcherCommand::SaveScreenshot { source, file_path } => self
                .request(
                    "SaveSourceScreenshot",
                    json!({ "sourceName": source, "imageFormat": "png", "imageFilePath": file_path }),
                )
                .await
                .map(drop),
        }
    }

    async fn status(&mut self) -> SwitcherResult<SwitcherStatus> {
        let streaming = self.field("GetStreamStatus", Value::Null, "outputActive").await?;
        let recording = self.field("GetRecordStatus", Value::Null, "outputActive").await?;
        let current_scene = self.program_scene().await?;
        let virtual_cam_active = self.optional_flag("GetVirtualCamStatus", "outputActive").await?;
        let replay_buffer_active = self.optional_flag("GetReplayBufferStatus", "outputActive").await?;
        let studio_mode_active = self.optional_flag("GetStudioModeEnabled", "studioModeEnabled").await?;

        Ok(SwitcherStatus {
            connected: true,
            streaming,
            recording,
            current_scene: Some(current_scene),
            virtual_cam_active,
            replay_buffer_active,
            studio_mode_active,
            sources: Vec::new(),
        })
    }

    async fn source_visible(&mut self, scene: &str, source: &str) -> SwitcherResult<bool> {
        let item_id = self.scene_item_id(scene, source).await?;
        self.field("GetSceneItemEnabled", json!({ "sceneName": scene, "sceneItemId": item_id }), "sceneItemEnabled")
            .await
    }

    async fn list_scenes(&mut self) -> SwitcherResult<Vec<String>> {
        self.names("GetSceneList", "scenes", "sceneName").await
    }

    async fn list_inputs(&mut self) -> SwitcherResult<Vec<String>> {
        self.names("GetInputList", "inputs", "inputName").await
    }

    fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }
}

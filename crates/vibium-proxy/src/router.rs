//! The proxy core: session table, verbatim forwarding, and the `vibium:`
//! extension methods.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use vibium::browser::{launch, LaunchOptions};
use vibium::transport::{Transport, WsTransport};
use vibium::wait::{self, WaitOptions};
use vibium::{actions, Error, Result};

use crate::client::ClientHandle;
use crate::session::Session;

/// Manages one browser session per connected client.
pub struct Router {
    sessions: StdMutex<HashMap<u64, Arc<Session>>>,
    headless: bool,
}

#[derive(Deserialize)]
struct ClientCommand {
    #[serde(default)]
    id: i64,
    #[serde(default)]
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Deserialize)]
struct TargetParams {
    selector: String,
    #[serde(default)]
    context: Option<String>,
    /// Milliseconds; missing or zero means the 30 s default.
    #[serde(default)]
    timeout: Option<u64>,
}

#[derive(Deserialize)]
struct TypeParams {
    selector: String,
    #[serde(default)]
    context: Option<String>,
    text: String,
    #[serde(default)]
    timeout: Option<u64>,
}

impl Router {
    pub fn new(headless: bool) -> Self {
        Self {
            sessions: StdMutex::new(HashMap::new()),
            headless,
        }
    }

    /// A client connected: give it a browser and start proxying.
    pub async fn on_client_connect(&self, client: ClientHandle) {
        info!(client = client.id(), "launching browser");

        let browser = match launch(LaunchOptions {
            headless: self.headless,
        })
        .await
        {
            Ok(browser) => browser,
            Err(err) => {
                error!(client = client.id(), error = %err, "browser launch failed");
                let _ = client.send(connect_error_frame("Failed to launch browser", &err));
                client.close();
                return;
            }
        };
        info!(
            client = client.id(),
            url = browser.websocket_url(),
            "browser launched"
        );

        let transport = match WsTransport::connect(browser.websocket_url()).await {
            Ok(transport) => Arc::new(transport) as Arc<dyn Transport>,
            Err(err) => {
                error!(client = client.id(), error = %err, "browser connection failed");
                let mut browser = browser;
                browser.close().await;
                let _ = client.send(connect_error_frame("Failed to connect to browser", &err));
                client.close();
                return;
            }
        };

        let session = self.register_session(client, transport);
        session.attach_browser(browser).await;
    }

    /// Wire an already-established downstream transport to a client: build
    /// the session, insert it into the table, and start its pump.
    pub fn register_session(
        &self,
        client: ClientHandle,
        transport: Arc<dyn Transport>,
    ) -> Arc<Session> {
        let session = Session::new(client.clone(), transport);
        self.sessions
            .lock()
            .unwrap()
            .insert(client.id(), session.clone());
        session.clone().spawn_pump();
        session
    }

    /// A frame arrived from a client: answer `vibium:` extension methods
    /// locally, forward everything else (including unparseable frames)
    /// verbatim.
    pub async fn on_client_message(&self, client_id: u64, frame: String) {
        let Some(session) = self.session(client_id) else {
            debug!(client = client_id, "no session for message");
            return;
        };
        if session.is_closed() {
            return;
        }

        let command: ClientCommand = match serde_json::from_str(&frame) {
            Ok(command) => command,
            Err(_) => {
                session.forward_to_browser(&frame).await;
                return;
            }
        };

        match command.method.as_str() {
            "vibium:find" => {
                tokio::spawn(handle_find(session, command.id, command.params));
            }
            "vibium:click" => {
                tokio::spawn(handle_click(session, command.id, command.params));
            }
            "vibium:type" => {
                tokio::spawn(handle_type(session, command.id, command.params));
            }
            _ => session.forward_to_browser(&frame).await,
        }
    }

    /// A client disconnected: drop and close its session.
    pub async fn on_client_disconnect(&self, client_id: u64) {
        let session = self.sessions.lock().unwrap().remove(&client_id);
        if let Some(session) = session {
            session.close().await;
        }
    }

    /// Close every session (server shutdown).
    pub async fn close_all(&self) {
        let sessions: Vec<Arc<Session>> = self.sessions.lock().unwrap().drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.close().await;
        }
    }

    fn session(&self, client_id: u64) -> Option<Arc<Session>> {
        self.sessions.lock().unwrap().get(&client_id).cloned()
    }
}

async fn handle_find(session: Arc<Session>, id: i64, params: Value) {
    let outcome = find_flow(&session, params).await;
    respond(&session, id, outcome);
}

async fn find_flow(session: &Session, params: Value) -> Result<Value> {
    let params: TargetParams = parse_params(params)?;
    let opts = wait_options(params.timeout);
    let context = actions::resolve_context(session, params.context.as_deref()).await?;
    let info = wait::wait_for_selector(session, &context, &params.selector, opts).await?;
    Ok(serde_json::to_value(info)?)
}

async fn handle_click(session: Arc<Session>, id: i64, params: Value) {
    let outcome = click_flow(&session, params).await;
    respond(&session, id, outcome);
}

async fn click_flow(session: &Session, params: Value) -> Result<Value> {
    let params: TargetParams = parse_params(params)?;
    let opts = wait_options(params.timeout);
    let context = actions::resolve_context(session, params.context.as_deref()).await?;
    actions::click(session, &context, &params.selector, opts).await?;
    Ok(json!({ "clicked": true }))
}

async fn handle_type(session: Arc<Session>, id: i64, params: Value) {
    let outcome = type_flow(&session, params).await;
    respond(&session, id, outcome);
}

async fn type_flow(session: &Session, params: Value) -> Result<Value> {
    let params: TypeParams = parse_params(params)?;
    let opts = wait_options(params.timeout);
    let context = actions::resolve_context(session, params.context.as_deref()).await?;
    actions::type_text(session, &context, &params.selector, &params.text, opts).await?;
    Ok(json!({ "typed": true }))
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params).map_err(|e| Error::Protocol(format!("bad params: {e}")))
}

fn wait_options(timeout_ms: Option<u64>) -> WaitOptions {
    match timeout_ms {
        Some(ms) if ms > 0 => WaitOptions::with_timeout(Duration::from_millis(ms)),
        _ => WaitOptions::default(),
    }
}

/// Reply to an extension command. Failures all wear the `timeout` tag in
/// this release, whatever the underlying cause.
fn respond(session: &Session, id: i64, outcome: Result<Value>) {
    let frame = match outcome {
        Ok(result) => json!({ "id": id, "type": "success", "result": result }),
        Err(err) => {
            debug!(client = session.client().id(), id, error = %err, "extension command failed");
            json!({
                "id": id,
                "type": "error",
                "error": { "error": "timeout", "message": err.to_string() },
            })
        }
    };
    let _ = session.client().send(frame.to_string());
}

/// JSON-RPC-style error frame for connect-time failures, before any BiDi
/// traffic has flowed.
fn connect_error_frame(what: &str, err: &Error) -> String {
    json!({ "error": { "code": -32000, "message": format!("{what}: {err}") } }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_options_default_and_override() {
        assert_eq!(wait_options(None).timeout, Duration::from_secs(30));
        assert_eq!(wait_options(Some(0)).timeout, Duration::from_secs(30));
        assert_eq!(
            wait_options(Some(500)).timeout,
            Duration::from_millis(500)
        );
    }

    #[test]
    fn client_commands_tolerate_missing_fields() {
        let cmd: ClientCommand = serde_json::from_str(r#"{"id": 3}"#).unwrap();
        assert_eq!(cmd.id, 3);
        assert!(cmd.method.is_empty());

        let cmd: ClientCommand =
            serde_json::from_str(r##"{"method": "vibium:find", "params": {"selector": "#x"}}"##)
                .unwrap();
        assert_eq!(cmd.method, "vibium:find");
        assert_eq!(cmd.params["selector"], "#x");
    }

    #[test]
    fn connect_error_frame_shape() {
        let frame = connect_error_frame("Failed to launch browser", &Error::Launch("boom".into()));
        let v: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(v["error"]["code"], -32000);
        assert_eq!(
            v["error"]["message"],
            "Failed to launch browser: launch error: boom"
        );
    }
}

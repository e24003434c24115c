use super::{ConnectionState, MessageSink, PublishOptions};
use crate::error::{ConfigError, SinkError};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, NetworkOptions, Outgoing, Packet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long a clean disconnect may take before the driver is cancelled outright.
const DISCONNECT_GRACE: Duration = Duration::from_secs(5);

/// Capacity of the request channel between [`AsyncClient`] and its event loop.
const REQUEST_CAPACITY: usize = 32;

/// Host, port and transport of a broker, parsed from an `mqtt://` style URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl BrokerAddress {
    /// Parses `mqtt://`, `tcp://`, `mqtts://` and `ssl://` URLs.
    ///
    /// The port defaults to 1883, or 8883 for the TLS schemes.
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        BrokerUrl::parse(url).map(|parsed| parsed.address)
    }
}

/// A parsed broker URL, including any `user:password@` it carries.
#[derive(Clone, PartialEq, Eq)]
pub struct BrokerUrl {
    pub address: BrokerAddress,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for BrokerUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerUrl")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl BrokerUrl {
    /// Parses a broker URL the same way as [`BrokerAddress::parse`], keeping its credentials.
    ///
    /// Percent-encoded credentials are rejected rather than passed to the broker verbatim.
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        // never echo the password back in an error
        let shown = match reqwest::Url::parse(url) {
            Ok(mut parsed) if parsed.password().is_some() => {
                let _ = parsed.set_password(Some("redacted"));
                parsed.to_string()
            }
            _ => url.to_string(),
        };
        let invalid = |reason: &str| ConfigError::InvalidBrokerUrl {
            url: shown.clone(),
            reason: reason.to_string(),
        };
        let parsed = reqwest::Url::parse(url).map_err(|e| invalid(&e.to_string()))?;

        let username = Some(parsed.username()).filter(|u| !u.is_empty());
        let password = parsed.password();
        if username.is_some_and(|u| u.contains('%')) || password.is_some_and(|p| p.contains('%'))
        {
            return Err(invalid(
                "percent-encoded credentials are not supported, use MQTT_USERNAME and MQTT_PASSWORD",
            ));
        }
        let username = username.map(str::to_string);
        let password = password.map(str::to_string);
        let tls = match parsed.scheme() {
            "mqtt" | "tcp" => false,
            "mqtts" | "ssl" => true,
            _ => return Err(invalid("scheme must be mqtt, tcp, mqtts or ssl")),
        };
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("missing host"))?;
        Ok(Self {
            address: BrokerAddress {
                host: host.to_string(),
                port: parsed.port().unwrap_or(if tls { 8883 } else { 1883 }),
                tls,
            },
            username,
            password,
        })
    }
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.tls { "mqtts" } else { "mqtt" };
        write!(f, "{scheme}://{}:{}", self.host, self.port)
    }
}

/// Everything needed to open a session.
#[derive(Clone)]
pub struct SinkOptions {
    pub broker: BrokerAddress,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive: Duration,
    /// Upper bound on the initial handshake.
    pub connect_timeout: Duration,
    /// Pause between attempts to re-establish a lost session.
    pub reconnect_period: Duration,
}

impl fmt::Debug for SinkOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkOptions")
            .field("broker", &self.broker)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("keep_alive", &self.keep_alive)
            .field("connect_timeout", &self.connect_timeout)
            .field("reconnect_period", &self.reconnect_period)
            .finish()
    }
}

/// Generates a client identifier of the form `{prefix}-{8 hex digits}`.
pub fn generate_client_id(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &id[..8])
}

/// [`MessageSink`] backed by a rumqttc session.
///
/// Cheap to clone; clones share the session.
#[derive(Debug, Clone)]
pub struct MqttSink {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    options: SinkOptions,
    state: watch::Sender<ConnectionState>,
    session: Mutex<Option<Session>>,
}

#[derive(Debug)]
struct Session {
    client: AsyncClient,
    driver: JoinHandle<()>,
    cancel: CancellationToken,
}

impl MqttSink {
    pub fn new(options: SinkOptions) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                options,
                state,
                session: Mutex::new(None),
            }),
        }
    }

    pub fn options(&self) -> &SinkOptions {
        &self.inner.options
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    /// Observes connection state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    fn mqtt_options(&self) -> MqttOptions {
        let opts = &self.inner.options;
        let mut mqtt_options =
            MqttOptions::new(&opts.client_id, &opts.broker.host, opts.broker.port);
        mqtt_options
            .set_keep_alive(opts.keep_alive)
            .set_clean_session(true);
        if let Some(username) = &opts.username {
            mqtt_options.set_credentials(username, opts.password.as_deref().unwrap_or(""));
        }
        if opts.broker.tls {
            mqtt_options.set_transport(rumqttc::Transport::tls_with_default_config());
        }
        mqtt_options
    }

    async fn open_session(&self) -> Result<Session, SinkError> {
        let opts = &self.inner.options;
        let (client, mut event_loop) = AsyncClient::new(self.mqtt_options(), REQUEST_CAPACITY);
        let mut network_options = NetworkOptions::new();
        network_options.set_connection_timeout(opts.connect_timeout.as_secs().max(1));
        event_loop.set_network_options(network_options);

        let (ready_tx, ready_rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let driver = tokio::spawn(drive(
            event_loop,
            self.inner.state.clone(),
            ready_tx,
            cancel.clone(),
            opts.reconnect_period,
        ));
        // stops the driver if this handshake is abandoned, e.g. on shutdown
        let abandon = cancel.clone().drop_guard();

        let failure = match tokio::time::timeout(opts.connect_timeout, ready_rx).await {
            Ok(Ok(Ok(()))) => {
                abandon.disarm();
                return Ok(Session {
                    client,
                    driver,
                    cancel,
                });
            }
            Ok(Ok(Err(reason))) => reason,
            Ok(Err(_)) => "connection driver exited".to_string(),
            Err(_) => format!("no CONNACK within {:?}", opts.connect_timeout),
        };

        cancel.cancel();
        let _ = driver.await;
        set_state(&self.inner.state, ConnectionState::Disconnected);
        Err(SinkError::Connection {
            broker: opts.broker.to_string(),
            reason: failure,
        })
    }
}

impl MessageSink for MqttSink {
    async fn connect(&self) -> Result<(), SinkError> {
        let mut session = self.inner.session.lock().await;
        if self.is_connected() {
            return Ok(());
        }
        // a session that exists but is not connected is mid-reconnect; leave it to the driver
        if let Some(existing) = session.as_ref()
            && !existing.driver.is_finished()
        {
            return Err(SinkError::Connection {
                broker: self.inner.options.broker.to_string(),
                reason: format!("session is {}", self.state()),
            });
        }

        tracing::info!(
            broker = %self.inner.options.broker,
            client_id = %self.inner.options.client_id,
            "connecting to MQTT broker"
        );
        set_state(&self.inner.state, ConnectionState::Connecting);
        *session = Some(self.open_session().await?);
        Ok(())
    }

    async fn disconnect(&self) {
        let Some(mut session) = self.inner.session.lock().await.take() else {
            set_state(&self.inner.state, ConnectionState::Disconnected);
            return;
        };

        let mut driver_done = false;
        if self.is_connected() {
            match session.client.disconnect().await {
                Err(e) => tracing::warn!(error = %e, "failed to request MQTT disconnect"),
                Ok(()) => match tokio::time::timeout(DISCONNECT_GRACE, &mut session.driver).await
                {
                    Ok(_) => driver_done = true,
                    Err(_) => tracing::warn!("MQTT disconnect did not complete in time"),
                },
            }
        }

        if !driver_done {
            session.cancel.cancel();
            let _ = session.driver.await;
        }
        set_state(&self.inner.state, ConnectionState::Disconnected);
        tracing::info!("disconnected from MQTT broker");
    }

    fn is_connected(&self) -> bool {
        self.inner.state.borrow().is_connected()
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        options: PublishOptions,
    ) -> Result<(), SinkError> {
        if !self.is_connected() {
            return Err(SinkError::NotConnected);
        }
        let client = self
            .inner
            .session
            .lock()
            .await
            .as_ref()
            .map(|s| s.client.clone())
            .ok_or(SinkError::NotConnected)?;

        tracing::trace!(topic, bytes = payload.len(), ?options, "publishing");
        client
            .publish(topic, options.qos, options.retain, payload)
            .await
            .map_err(|source| SinkError::Publish {
                topic: topic.to_string(),
                source,
            })
    }
}

fn set_state(state: &watch::Sender<ConnectionState>, next: ConnectionState) {
    let changed = state.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next.clone();
            true
        }
    });
    if changed {
        tracing::debug!(state = %next, "MQTT connection state changed");
    }
}

/// Pumps the rumqttc event loop until cancelled or until the session is closed.
///
/// The first handshake outcome is reported through `ready`. A failure before that ends the
/// driver; a failure after it is retried every `reconnect_period`, since polling the event loop
/// again makes rumqttc reconnect.
async fn drive(
    mut event_loop: EventLoop,
    state: watch::Sender<ConnectionState>,
    ready: oneshot::Sender<Result<(), String>>,
    cancel: CancellationToken,
    reconnect_period: Duration,
) {
    let mut ready = Some(ready);
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = event_loop.poll() => event,
        };

        match event {
            // rumqttc reports refused CONNACKs as errors, so any CONNACK here is a success
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                if ready.is_none() {
                    tracing::info!("reconnected to MQTT broker");
                } else {
                    tracing::info!("connected to MQTT broker");
                }
                set_state(&state, ConnectionState::Connected);
                if let Some(ready) = ready.take() {
                    let _ = ready.send(Ok(()));
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::warn!("disconnected by MQTT broker");
                set_state(
                    &state,
                    ConnectionState::Reconnecting("disconnected by broker".into()),
                );
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!("sent DISCONNECT");
                set_state(&state, ConnectionState::Disconnected);
                break;
            }
            Ok(event) => {
                tracing::trace!(?event, "MQTT event");
            }
            Err(e) => {
                if let Some(ready) = ready.take() {
                    tracing::error!(error = %e, "MQTT connection error");
                    let _ = ready.send(Err(e.to_string()));
                    break;
                }
                tracing::warn!(
                    error = %e,
                    retry_in = ?reconnect_period,
                    "lost MQTT connection, reconnecting"
                );
                set_state(&state, ConnectionState::Reconnecting(e.to_string()));
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(reconnect_period) => {}
                }
            }
        }
    }
}

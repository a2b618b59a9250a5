//! SIP User Agent
//!
//! Trunk registration with periodic refresh and backoff, and the inbound
//! INVITE path: decision callback before media, SDP negotiation, RTP setup.
//! Uses ftth-rsipstack for SIP signaling.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use ftth_rsipstack::{
    dialog::{
        authenticate::Credential,
        dialog::DialogState,
        dialog_layer::DialogLayer,
        registration::Registration,
        server_dialog::ServerInviteDialog,
    },
    rsip,
    rsip::prelude::HeadersExt,
    transaction::transaction::Transaction,
    transport::{udp::UdpConnection, TransportLayer},
    EndpointBuilder,
};

use super::config::SipConfig;
use super::rtp::RtpSession;
use super::sdp;
use super::SipError;

/// Re-register backoff bounds for transient network failures
const BACKOFF_START: Duration = Duration::from_secs(2);
const BACKOFF_CAP: Duration = Duration::from_secs(60);

/// Registration state of the user agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    /// Not registered
    Unregistered,
    /// REGISTER in flight
    Registering,
    /// Registered and accepting calls
    Registered,
    /// Permanent failure (bad credentials), no retry
    AuthFailed,
}

/// Synchronously-required decision for an inbound INVITE, made before media
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallDecision {
    Accept,
    /// Reject with the given SIP status code (403 blacklist, 488 codec)
    Reject(u16),
}

/// Events emitted to the platform
#[derive(Debug)]
pub enum SipEvent {
    RegistrationChanged(RegistrationState),
    /// INVITE arrived and passed the decision callback; media follows
    IncomingCall { caller_id: String },
    /// INVITE was rejected by the decision callback
    CallRejected { caller_id: String, code: u16 },
    /// Dialog confirmed and media is flowing
    CallActive {
        caller_id: String,
        media: super::rtp::MediaChannels,
    },
    /// Dialog terminated (remote BYE, local hangup or error)
    CallEnded { reason: String },
}

/// Callback deciding whether to take an inbound call, given the caller id
pub type IncomingDecider =
    Arc<dyn Fn(String) -> BoxFuture<'static, CallDecision> + Send + Sync>;

struct ActiveCall {
    dialog: ServerInviteDialog,
    cancel: CancellationToken,
}

/// SIP user agent: one registration, at most one active call
pub struct SipUserAgent {
    config: SipConfig,
    state: RwLock<RegistrationState>,
    event_tx: mpsc::Sender<SipEvent>,
    decider: RwLock<Option<IncomingDecider>>,
    active_call: RwLock<Option<ActiveCall>>,
    cancel: CancellationToken,
    local_ip: RwLock<Option<String>>,
}

impl SipUserAgent {
    pub fn new(config: SipConfig) -> (Arc<Self>, mpsc::Receiver<SipEvent>) {
        let (event_tx, event_rx) = mpsc::channel(100);

        let agent = Arc::new(Self {
            config,
            state: RwLock::new(RegistrationState::Unregistered),
            event_tx,
            decider: RwLock::new(None),
            active_call: RwLock::new(None),
            cancel: CancellationToken::new(),
            local_ip: RwLock::new(None),
        });

        (agent, event_rx)
    }

    /// Install the inbound-call decision callback (must be set before `run`)
    pub async fn set_incoming_decider(&self, decider: IncomingDecider) {
        *self.decider.write().await = Some(decider);
    }

    pub async fn registration_state(&self) -> RegistrationState {
        *self.state.read().await
    }

    pub async fn is_registered(&self) -> bool {
        *self.state.read().await == RegistrationState::Registered
    }

    pub fn config(&self) -> &SipConfig {
        &self.config
    }

    async fn set_state(&self, state: RegistrationState) {
        *self.state.write().await = state;
        let _ = self
            .event_tx
            .send(SipEvent::RegistrationChanged(state))
            .await;
    }

    /// First non-loopback IPv4 address
    fn local_ipv4() -> Result<std::net::IpAddr, SipError> {
        for iface in get_if_addrs::get_if_addrs().map_err(|e| SipError::Transport(e.to_string()))? {
            if !iface.is_loopback() {
                if let get_if_addrs::IfAddr::V4(ref addr) = iface.addr {
                    return Ok(std::net::IpAddr::V4(addr.ip));
                }
            }
        }
        Err(SipError::Transport("no IPv4 interface found".to_string()))
    }

    /// The address written into Contact and SDP
    async fn advertised_ip(&self) -> String {
        if let Some(ip) = &self.config.public_ip {
            return ip.clone();
        }
        self.local_ip
            .read()
            .await
            .clone()
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    /// Build the endpoint, register, and serve inbound transactions.
    /// Runs until the agent is cancelled.
    pub async fn run(self: Arc<Self>) -> Result<(), SipError> {
        self.config
            .validate()
            .map_err(SipError::RegistrationFailed)?;

        let local_ip = Self::local_ipv4()?;
        *self.local_ip.write().await = Some(local_ip.to_string());
        tracing::info!("SIP user agent local IP: {}", local_ip);

        // Resolve the trunk up front so a DNS outage fails fast
        let trunk_addr = format!("{}:{}", self.config.server, self.config.port);
        let resolved: Vec<std::net::SocketAddr> = tokio::net::lookup_host(&trunk_addr)
            .await
            .map_err(|e| SipError::Transport(format!("DNS resolution failed: {}", e)))?
            .collect();
        let server_addr = *resolved
            .first()
            .ok_or_else(|| SipError::Transport("no address for SIP trunk".to_string()))?;
        tracing::info!("SIP trunk {} resolved to {}", self.config.server, server_addr);

        let token = self.cancel.clone();
        let mut transport_layer = TransportLayer::new(token.clone());
        transport_layer.outbound = Some(ftth_rsipstack::transport::SipAddr::from(server_addr));

        let local_addr: std::net::SocketAddr =
            format!("{}:{}", local_ip, self.config.local_port)
                .parse()
                .map_err(|e: std::net::AddrParseError| SipError::Transport(e.to_string()))?;

        let connection =
            UdpConnection::create_connection(local_addr, None, Some(token.child_token()))
                .await
                .map_err(|e| SipError::Transport(format!("UDP bind: {}", e)))?;
        transport_layer.add_transport(connection.into());

        let endpoint = EndpointBuilder::new()
            .with_cancel_token(token.clone())
            .with_transport_layer(transport_layer)
            .build();

        let credential = Credential {
            username: self.config.username.clone(),
            password: self.config.password.clone(),
            realm: Some(self.config.server.clone()),
        };

        let endpoint_inner = endpoint.inner.clone();
        let dialog_layer = Arc::new(DialogLayer::new(endpoint_inner.clone()));
        let mut incoming = endpoint
            .incoming_transactions()
            .map_err(|e| SipError::Transport(e.to_string()))?;

        // Endpoint event loop
        let endpoint_task = tokio::spawn(async move { endpoint.serve().await });

        // Registration loop with refresh and backoff
        let agent = self.clone();
        let reg_credential = credential.clone();
        let registration_task = tokio::spawn(async move {
            agent.registration_loop(endpoint_inner, reg_credential).await;
        });

        // Inbound transaction loop
        let agent = self.clone();
        loop {
            let tx = tokio::select! {
                _ = self.cancel.cancelled() => break,
                tx = incoming.recv() => match tx {
                    Some(tx) => tx,
                    None => break,
                },
            };

            if let Err(e) = agent.handle_transaction(tx, &dialog_layer).await {
                tracing::warn!("inbound transaction error: {}", e);
            }
        }

        registration_task.abort();
        endpoint_task.abort();
        Ok(())
    }

    /// REGISTER every `register_expires` seconds; exponential backoff on
    /// transient failures; permanent stop on auth rejection.
    async fn registration_loop(
        &self,
        endpoint: ftth_rsipstack::transaction::endpoint::EndpointInnerRef,
        credential: Credential,
    ) {
        let registrar = match rsip::Uri::try_from(self.config.registrar_uri().as_str()) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::error!("invalid registrar URI: {:?}", e);
                self.set_state(RegistrationState::AuthFailed).await;
                return;
            }
        };

        let mut registration = Registration::new(endpoint, Some(credential));
        let mut backoff = BACKOFF_START;

        loop {
            if self.cancel.is_cancelled() {
                return;
            }

            self.set_state(RegistrationState::Registering).await;

            let attempt = tokio::time::timeout(
                Duration::from_secs(10),
                registration.register(registrar.clone(), Some(self.config.register_expires)),
            )
            .await;

            match attempt {
                Ok(Ok(response)) if response.status_code == rsip::StatusCode::OK => {
                    tracing::info!(
                        "SIP registration ok, refresh in {}s",
                        self.config.register_expires
                    );
                    self.set_state(RegistrationState::Registered).await;
                    backoff = BACKOFF_START;

                    // Refresh before expiry
                    let refresh =
                        Duration::from_secs((self.config.register_expires as u64 * 3 / 4).max(30));
                    tokio::select! {
                        _ = self.cancel.cancelled() => return,
                        _ = tokio::time::sleep(refresh) => {}
                    }
                }
                Ok(Ok(response))
                    if matches!(
                        response.status_code,
                        rsip::StatusCode::Unauthorized | rsip::StatusCode::Forbidden
                    ) =>
                {
                    tracing::error!(
                        "SIP registration rejected ({}), not retrying",
                        response.status_code
                    );
                    self.set_state(RegistrationState::AuthFailed).await;
                    return;
                }
                Ok(Ok(response)) => {
                    tracing::warn!(
                        "SIP registration failed: {}, retry in {:?}",
                        response.status_code,
                        backoff
                    );
                    self.set_state(RegistrationState::Unregistered).await;
                    tokio::select! {
                        _ = self.cancel.cancelled() => return,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(BACKOFF_CAP);
                }
                Ok(Err(e)) => {
                    tracing::warn!("SIP registration error: {:?}, retry in {:?}", e, backoff);
                    self.set_state(RegistrationState::Unregistered).await;
                    tokio::select! {
                        _ = self.cancel.cancelled() => return,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(BACKOFF_CAP);
                }
                Err(_) => {
                    tracing::warn!("SIP registration timed out, retry in {:?}", backoff);
                    self.set_state(RegistrationState::Unregistered).await;
                    tokio::select! {
                        _ = self.cancel.cancelled() => return,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(BACKOFF_CAP);
                }
            }
        }
    }

    async fn handle_transaction(
        self: &Arc<Self>,
        mut tx: Transaction,
        dialog_layer: &Arc<DialogLayer>,
    ) -> Result<(), SipError> {
        match tx.original.method {
            rsip::Method::Invite => self.handle_invite(tx, dialog_layer).await,
            rsip::Method::Bye => {
                // Remote hangup: let the dialog answer the BYE, then tear down
                if let Some(mut dialog) = dialog_layer.match_dialog(&tx.original) {
                    dialog
                        .handle(&mut tx)
                        .await
                        .map_err(|e| SipError::Transport(format!("BYE handling: {:?}", e)))?;
                }
                self.finish_call("remote_hangup").await;
                Ok(())
            }
            rsip::Method::Ack | rsip::Method::Cancel => {
                if let Some(mut dialog) = dialog_layer.match_dialog(&tx.original) {
                    let _ = dialog.handle(&mut tx).await;
                }
                Ok(())
            }
            _ => {
                let _ = tx.reply(rsip::StatusCode::MethodNotAllowed).await;
                Ok(())
            }
        }
    }

    async fn handle_invite(
        self: &Arc<Self>,
        mut tx: Transaction,
        dialog_layer: &Arc<DialogLayer>,
    ) -> Result<(), SipError> {
        let from = tx
            .original
            .from_header()
            .map(|h| h.to_string())
            .unwrap_or_default();
        let caller_id = extract_caller_id(&from);

        tracing::info!("incoming INVITE from {}", caller_id);

        if self.active_call.read().await.is_some() {
            tracing::warn!("INVITE while call active, answering busy");
            let _ = tx.reply(rsip::StatusCode::BusyHere).await;
            return Ok(());
        }

        // Access decision before any media resources are touched
        let decision = {
            let decider = self.decider.read().await;
            match decider.as_ref() {
                Some(decide) => decide(caller_id.clone()).await,
                None => CallDecision::Reject(503),
            }
        };

        if let CallDecision::Reject(code) = decision {
            tracing::warn!("rejecting call from {} with {}", caller_id, code);
            let status = match code {
                403 => rsip::StatusCode::Forbidden,
                486 => rsip::StatusCode::BusyHere,
                488 => rsip::StatusCode::NotAcceptableHere,
                _ => rsip::StatusCode::ServiceUnavailable,
            };
            tx.reply(status)
                .await
                .map_err(|e| SipError::Transport(format!("reject: {:?}", e)))?;
            let _ = self
                .event_tx
                .send(SipEvent::CallRejected { caller_id, code })
                .await;
            return Ok(());
        }

        // Negotiate a codec from the offer
        let body = String::from_utf8_lossy(&tx.original.body).to_string();
        let offer = match sdp::parse_offer(&body) {
            Ok(offer) => offer,
            Err(e) => {
                tracing::warn!("unusable SDP offer from {}: {}", caller_id, e);
                let _ = tx.reply(rsip::StatusCode::NotAcceptableHere).await;
                let _ = self
                    .event_tx
                    .send(SipEvent::CallRejected {
                        caller_id,
                        code: 488,
                    })
                    .await;
                return Ok(());
            }
        };

        let codec = match super::codec::negotiate(&offer.payload_types, offer.offers_opus) {
            Some(codec) => codec,
            None => {
                tracing::warn!(
                    "no supported codec in offer from {} ({:?})",
                    caller_id,
                    offer.payload_types
                );
                let _ = tx.reply(rsip::StatusCode::NotAcceptableHere).await;
                let _ = self
                    .event_tx
                    .send(SipEvent::CallRejected {
                        caller_id,
                        code: 488,
                    })
                    .await;
                return Ok(());
            }
        };

        let _ = self
            .event_tx
            .send(SipEvent::IncomingCall {
                caller_id: caller_id.clone(),
            })
            .await;

        // Media setup inside the firewall-visible port window
        let rtp_socket =
            RtpSession::bind(self.config.rtp_port_start, self.config.rtp_port_end).await?;
        let rtp_port = rtp_socket.local_addr()?.port();

        let advertised = self.advertised_ip().await;
        let answer = sdp::build_answer(&advertised, rtp_port, codec);

        let contact = rsip::Uri::try_from(
            self.config
                .contact_uri(&advertised)
                .as_str(),
        )
        .map_err(|e| SipError::Transport(format!("contact URI: {:?}", e)))?;

        let (state_tx, mut state_rx) = tokio::sync::mpsc::unbounded_channel();
        let dialog = dialog_layer
            .get_or_create_server_invite(&tx, state_tx, None, Some(contact))
            .map_err(|e| SipError::Transport(format!("server dialog: {:?}", e)))?;

        tracing::info!(
            "accepting call from {} with {} (RTP port {})",
            caller_id,
            codec.sdp_name(),
            rtp_port
        );

        dialog
            .accept(None, Some(answer.into_bytes()))
            .map_err(|e| SipError::Transport(format!("200 OK: {:?}", e)))?;

        let call_cancel = self.cancel.child_token();
        *self.active_call.write().await = Some(ActiveCall {
            dialog: dialog.clone(),
            cancel: call_cancel.clone(),
        });

        // Drive the INVITE transaction to completion
        let mut dialog_for_tx = dialog.clone();
        tokio::spawn(async move {
            if let Err(e) = dialog_for_tx.handle(&mut tx).await {
                tracing::warn!("INVITE transaction ended with error: {:?}", e);
            }
        });

        // Watch dialog state; start media on confirmation
        let agent = self.clone();
        let remote_rtp = offer.remote_rtp;
        tokio::spawn(async move {
            while let Some(state) = state_rx.recv().await {
                match state {
                    DialogState::Confirmed(_, _) => {
                        tracing::info!("call confirmed, starting media");

                        let session =
                            RtpSession::new(rtp_socket, codec, remote_rtp, call_cancel.clone());
                        match session.start() {
                            Ok(media) => {
                                let _ = agent
                                    .event_tx
                                    .send(SipEvent::CallActive {
                                        caller_id: caller_id.clone(),
                                        media,
                                    })
                                    .await;
                            }
                            Err(e) => {
                                tracing::error!("media start failed: {}", e);
                                agent.finish_call("media failure").await;
                            }
                        }
                        break;
                    }
                    DialogState::Terminated(_, reason) => {
                        tracing::info!("dialog terminated before media: {:?}", reason);
                        agent.finish_call("terminated").await;
                        break;
                    }
                    other => {
                        tracing::debug!("dialog state: {}", other);
                    }
                }
            }
        });

        Ok(())
    }

    /// Tear down the active dialog and both media channels
    pub async fn hangup(&self) -> Result<(), SipError> {
        let call = self.active_call.write().await.take();
        match call {
            Some(call) => {
                call.cancel.cancel();
                if let Err(e) = call.dialog.bye().await {
                    tracing::warn!("BYE failed: {:?}", e);
                }
                let _ = self
                    .event_tx
                    .send(SipEvent::CallEnded {
                        reason: "local_hangup".to_string(),
                    })
                    .await;
                Ok(())
            }
            None => Err(SipError::NoActiveCall),
        }
    }

    /// Internal teardown used for remote BYE and errors
    async fn finish_call(&self, reason: &str) {
        if let Some(call) = self.active_call.write().await.take() {
            call.cancel.cancel();
            let _ = self
                .event_tx
                .send(SipEvent::CallEnded {
                    reason: reason.to_string(),
                })
                .await;
        }
    }

    pub async fn in_call(&self) -> bool {
        self.active_call.read().await.is_some()
    }

    /// Stop the agent entirely
    pub async fn shutdown(&self) {
        if self.in_call().await {
            let _ = self.hangup().await;
        }
        self.cancel.cancel();
        *self.state.write().await = RegistrationState::Unregistered;
    }
}

impl Drop for SipUserAgent {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Extract the caller's number from a SIP From header.
///
/// `"015901969502" <sip:015901969502@example.de>` and
/// `<sip:015901969502@example.de>` both yield `015901969502`.
pub fn extract_caller_id(from: &str) -> String {
    // Quoted display name first
    if let Some(start) = from.find('"') {
        if let Some(len) = from[start + 1..].find('"') {
            let quoted = &from[start + 1..start + 1 + len];
            if !quoted.is_empty() {
                return quoted.to_string();
            }
        }
    }

    // Then the user part of the SIP URI
    if let Some(start) = from.find("sip:") {
        let rest = &from[start + 4..];
        if let Some(at) = rest.find('@') {
            let user = &rest[..at];
            if !user.is_empty() {
                return user.to_string();
            }
        }
    }

    from.trim().to_string()
}

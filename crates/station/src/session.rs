//! Broker session lifecycle: resolve → connect → subscribe → steady state →
//! graceful unsubscribe/disconnect.
//!
//! Split into a pure state machine (`SessionCore`) that turns protocol
//! events into actions, and a driver (`Session`) that owns the rumqttc
//! client and applies them. Every callback arrives through the main loop's
//! `pump` step; handlers never re-enter the pump.
//!
//! There is deliberately no reconnect path: a lost session is fatal and
//! restart belongs to the external supervisor.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, ensure, Context, Result};
use rumqttc::{
    Client, ConnectReturnCode, Connection, Event, LastWill, MqttOptions, Outgoing, Packet, QoS,
    SubscribeReasonCode, TryRecvError,
};
use tracing::{debug, error, info, trace, warn};

use crate::config::BrokerConfig;
use crate::sensors::Readings;
use crate::topics::{self, InboundCommand, TopicScheme, COMMAND_SUFFIXES};

/// Request queue capacity for the rumqttc client, comfortably above the
/// five messages one publish cycle can enqueue between pumps.
const REQUEST_QUEUE_CAP: usize = 16;

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Forward-only session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unresolved,
    Resolving,
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

/// Protocol event fed into the state machine, stripped of transport detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    ConnAckAccepted,
    ConnAckRefused(String),
    SubAck { failures: usize },
    UnsubAck,
    Command(InboundCommand),
    DisconnectSent,
    TransportClosed(String),
}

/// Side effect requested by the state machine, executed by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    PublishOnline,
    SubscribeCommands,
    PublishTelemetry,
    PublishUptime,
    UnsubscribeCommands,
    Disconnect,
}

// ---------------------------------------------------------------------------
// Pure state machine
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct SessionCore {
    phase: Phase,
    /// Subscribe requests issued and not yet discharged by an unsubscribe
    /// acknowledgement. Barrier for the shutdown handshake; never negative.
    pending_subscriptions: i32,
    shutdown_requested: bool,
    disconnect_issued: bool,
    topic_count: i32,
}

impl SessionCore {
    pub fn new(topic_count: usize) -> Self {
        Self {
            phase: Phase::Unresolved,
            pending_subscriptions: 0,
            shutdown_requested: false,
            disconnect_issued: false,
            topic_count: topic_count as i32,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Address resolution started.
    pub fn begin_resolve(&mut self) {
        self.phase = Phase::Resolving;
    }

    /// Resolution produced an address; the connect attempt is underway.
    pub fn address_resolved(&mut self) {
        self.phase = Phase::Connecting;
    }

    /// Single entry point for every protocol event, whether it arrives from
    /// the pump or synchronously.
    pub fn handle_event(&mut self, event: SessionEvent) -> Result<Vec<SessionAction>> {
        match event {
            SessionEvent::ConnAckAccepted => {
                ensure!(
                    self.phase == Phase::Connecting,
                    "connection accepted in phase {:?}",
                    self.phase
                );
                self.phase = Phase::Connected;
                // One pending entry per subscribe request the driver issues
                // for SubscribeCommands.
                self.pending_subscriptions += self.topic_count;
                info!("session established");
                Ok(vec![
                    SessionAction::PublishOnline,
                    SessionAction::SubscribeCommands,
                    SessionAction::PublishTelemetry,
                ])
            }
            SessionEvent::ConnAckRefused(code) => bail!("broker refused connection: {code}"),
            SessionEvent::SubAck { failures } => {
                ensure!(failures == 0, "broker rejected {failures} subscription(s)");
                debug!("subscription acknowledged");
                Ok(Vec::new())
            }
            SessionEvent::UnsubAck => {
                self.pending_subscriptions -= 1;
                ensure!(
                    self.pending_subscriptions >= 0,
                    "subscription accounting went negative"
                );
                if self.pending_subscriptions == 0
                    && self.shutdown_requested
                    && !self.disconnect_issued
                {
                    self.disconnect_issued = true;
                    self.phase = Phase::Disconnecting;
                    info!("all unsubscribes acknowledged, disconnecting");
                    return Ok(vec![SessionAction::Disconnect]);
                }
                Ok(Vec::new())
            }
            SessionEvent::Command(cmd) => self.handle_command(cmd),
            SessionEvent::DisconnectSent => {
                ensure!(
                    self.phase == Phase::Disconnecting,
                    "disconnect sent in phase {:?}",
                    self.phase
                );
                self.phase = Phase::Disconnected;
                info!("session closed");
                Ok(Vec::new())
            }
            SessionEvent::TransportClosed(detail) => {
                if matches!(self.phase, Phase::Disconnecting | Phase::Disconnected) {
                    self.phase = Phase::Disconnected;
                    return Ok(Vec::new());
                }
                bail!("connection lost: {detail}");
            }
        }
    }

    fn handle_command(&mut self, cmd: InboundCommand) -> Result<Vec<SessionAction>> {
        if self.phase != Phase::Connected {
            warn!(?cmd, "command ignored outside connected phase");
            return Ok(Vec::new());
        }
        match cmd {
            InboundCommand::Print(text) => {
                info!(target: "remote", "{text}");
                Ok(Vec::new())
            }
            InboundCommand::Ping => Ok(vec![SessionAction::PublishUptime]),
            InboundCommand::Exit => {
                if self.shutdown_requested {
                    debug!("exit already in progress");
                    return Ok(Vec::new());
                }
                self.shutdown_requested = true;
                info!("exit requested, unsubscribing");
                Ok(vec![SessionAction::UnsubscribeCommands])
            }
        }
    }
}

// ---------------------------------------------------------------------------
// rumqttc driver
// ---------------------------------------------------------------------------

pub struct Session {
    core: SessionCore,
    client: Client,
    connection: Connection,
    scheme: TopicScheme,
    started_at: Instant,
}

impl Session {
    /// Resolve the broker address and open the connection. The MQTT
    /// handshake itself completes over subsequent `pump` calls.
    pub fn connect(cfg: &BrokerConfig, started_at: Instant) -> Result<Self> {
        let mut core = SessionCore::new(COMMAND_SUFFIXES.len());
        let client_id = cfg.client_id();
        let scheme = TopicScheme::new(cfg.unique_topic, &client_id);

        core.begin_resolve();
        let addr = resolve(&cfg.host, cfg.port)
            .with_context(|| format!("resolving broker address {}:{}", cfg.host, cfg.port))?;
        core.address_resolved();
        info!(broker = %addr, client_id = %client_id, "connecting");

        let mut options = MqttOptions::new(client_id, addr.ip().to_string(), addr.port());
        options.set_keep_alive(Duration::from_secs(cfg.keep_alive_s));
        options.set_last_will(LastWill::new(
            scheme.topic(topics::ONLINE_SUFFIX),
            "0",
            QoS::AtLeastOnce,
            true,
        ));
        if let (Some(user), Some(pass)) = (&cfg.username, &cfg.password) {
            options.set_credentials(user, pass);
        }

        let (client, connection) = Client::new(options, REQUEST_QUEUE_CAP);
        Ok(Self {
            core,
            client,
            connection,
            scheme,
            started_at,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.core.phase() == Phase::Connected
    }

    pub fn is_disconnected(&self) -> bool {
        self.core.phase() == Phase::Disconnected
    }

    /// Drain every network event that is ready, without blocking. This is
    /// the loop's only suspension point; event handlers never call back
    /// into it.
    pub fn pump(&mut self, readings: &Readings) -> Result<()> {
        while !self.is_disconnected() {
            match self.connection.try_recv() {
                Ok(Ok(event)) => self.handle_wire_event(event, readings)?,
                Ok(Err(e)) => {
                    self.dispatch(SessionEvent::TransportClosed(e.to_string()), readings)?;
                    break;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.dispatch(
                        SessionEvent::TransportClosed("event channel closed".to_string()),
                        readings,
                    )?;
                    break;
                }
            }
        }
        Ok(())
    }

    fn handle_wire_event(&mut self, event: Event, readings: &Readings) -> Result<()> {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => match ack.code {
                ConnectReturnCode::Success => {
                    self.dispatch(SessionEvent::ConnAckAccepted, readings)
                }
                code => {
                    self.dispatch(SessionEvent::ConnAckRefused(format!("{code:?}")), readings)
                }
            },
            Event::Incoming(Packet::SubAck(ack)) => {
                let failures = ack
                    .return_codes
                    .iter()
                    .filter(|c| matches!(c, SubscribeReasonCode::Failure))
                    .count();
                self.dispatch(SessionEvent::SubAck { failures }, readings)
            }
            Event::Incoming(Packet::UnsubAck(_)) => {
                self.dispatch(SessionEvent::UnsubAck, readings)
            }
            Event::Incoming(Packet::Publish(publish)) => {
                let Some(suffix) = self.scheme.suffix(&publish.topic) else {
                    debug!(topic = %publish.topic, "publish outside our namespace");
                    return Ok(());
                };
                match InboundCommand::parse(suffix, &publish.payload) {
                    Some(cmd) => self.dispatch(SessionEvent::Command(cmd), readings),
                    None => {
                        debug!(topic = %publish.topic, "unrecognised command topic");
                        Ok(())
                    }
                }
            }
            Event::Incoming(Packet::Disconnect) => self.dispatch(
                SessionEvent::TransportClosed("broker sent disconnect".to_string()),
                readings,
            ),
            Event::Outgoing(Outgoing::Disconnect) => {
                self.dispatch(SessionEvent::DisconnectSent, readings)
            }
            other => {
                trace!(?other, "wire event");
                Ok(())
            }
        }
    }

    fn dispatch(&mut self, event: SessionEvent, readings: &Readings) -> Result<()> {
        for action in self.core.handle_event(event)? {
            self.apply(action, readings)?;
        }
        Ok(())
    }

    fn apply(&mut self, action: SessionAction, readings: &Readings) -> Result<()> {
        match action {
            SessionAction::PublishOnline => {
                self.publish_logged(self.scheme.topic(topics::ONLINE_SUFFIX), "1".to_string(), true);
                Ok(())
            }
            SessionAction::SubscribeCommands => {
                for suffix in COMMAND_SUFFIXES {
                    self.client
                        .subscribe(self.scheme.topic(suffix), QoS::AtLeastOnce)
                        .with_context(|| format!("subscribing to {suffix}"))?;
                }
                Ok(())
            }
            SessionAction::PublishTelemetry => {
                self.publish_telemetry(readings);
                Ok(())
            }
            SessionAction::PublishUptime => {
                let uptime = topics::format_uptime_secs(self.started_at.elapsed().as_secs());
                self.publish_logged(self.scheme.topic(topics::UPTIME_SUFFIX), uptime, false);
                Ok(())
            }
            SessionAction::UnsubscribeCommands => {
                for suffix in COMMAND_SUFFIXES {
                    self.client
                        .unsubscribe(self.scheme.topic(suffix))
                        .with_context(|| format!("unsubscribing from {suffix}"))?;
                }
                Ok(())
            }
            SessionAction::Disconnect => self.client.disconnect().context("issuing disconnect"),
        }
    }

    /// One message per reading kind. Failures are logged, never retried;
    /// the next interval publishes fresh values anyway.
    pub fn publish_telemetry(&mut self, r: &Readings) {
        self.publish_logged(
            self.scheme.topic(topics::TEMPERATURE_SUFFIX),
            topics::format_celsius(r.temperature),
            false,
        );
        self.publish_logged(
            self.scheme.topic(topics::HUMIDITY_SUFFIX),
            topics::format_humidity(r.humidity),
            false,
        );
        self.publish_logged(
            self.scheme.topic(topics::LUMINOSITY_SUFFIX),
            topics::format_lux(r.luminosity),
            false,
        );
        self.publish_logged(
            self.scheme.topic(topics::RAIN_SUFFIX),
            topics::format_rain(r.raining).to_string(),
            false,
        );
    }

    fn publish_logged(&mut self, topic: String, payload: String, retain: bool) {
        if let Err(e) = self
            .client
            .publish(topic.as_str(), QoS::AtLeastOnce, retain, payload)
        {
            error!(topic = %topic, "publish failed: {e}");
        }
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| anyhow!("no address records for {host}"))
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn connected_core(topic_count: usize) -> SessionCore {
        let mut core = SessionCore::new(topic_count);
        core.begin_resolve();
        core.address_resolved();
        core.handle_event(SessionEvent::ConnAckAccepted).unwrap();
        core
    }

    // -- Connect round -----------------------------------------------------

    #[test]
    fn lifecycle_reaches_connecting_through_resolution() {
        let mut core = SessionCore::new(3);
        assert_eq!(core.phase(), Phase::Unresolved);
        core.begin_resolve();
        assert_eq!(core.phase(), Phase::Resolving);
        core.address_resolved();
        assert_eq!(core.phase(), Phase::Connecting);
    }

    #[test]
    fn connack_publishes_subscribes_and_primes_telemetry() {
        let mut core = SessionCore::new(3);
        core.begin_resolve();
        core.address_resolved();
        let actions = core.handle_event(SessionEvent::ConnAckAccepted).unwrap();
        assert_eq!(
            actions,
            vec![
                SessionAction::PublishOnline,
                SessionAction::SubscribeCommands,
                SessionAction::PublishTelemetry,
            ]
        );
        assert_eq!(core.phase(), Phase::Connected);
    }

    #[test]
    fn full_subscribe_round_counts_every_topic() {
        let mut core = connected_core(3);
        assert_eq!(core.pending_subscriptions, 3);
        core.handle_event(SessionEvent::SubAck { failures: 0 }).unwrap();
        assert_eq!(core.pending_subscriptions, 3);
    }

    #[test]
    fn connack_refused_is_fatal() {
        let mut core = SessionCore::new(3);
        core.begin_resolve();
        core.address_resolved();
        assert!(core
            .handle_event(SessionEvent::ConnAckRefused("BadUserNamePassword".into()))
            .is_err());
    }

    #[test]
    fn duplicate_connack_is_fatal() {
        let mut core = connected_core(3);
        assert!(core.handle_event(SessionEvent::ConnAckAccepted).is_err());
    }

    #[test]
    fn rejected_subscription_is_fatal() {
        let mut core = connected_core(3);
        assert!(core
            .handle_event(SessionEvent::SubAck { failures: 1 })
            .is_err());
    }

    // -- Command dispatch --------------------------------------------------

    #[test]
    fn ping_requests_uptime_publish() {
        let mut core = connected_core(3);
        let actions = core
            .handle_event(SessionEvent::Command(InboundCommand::Ping))
            .unwrap();
        assert_eq!(actions, vec![SessionAction::PublishUptime]);
    }

    #[test]
    fn print_produces_no_actions() {
        let mut core = connected_core(3);
        let actions = core
            .handle_event(SessionEvent::Command(InboundCommand::Print("hi".into())))
            .unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn commands_ignored_before_connected() {
        let mut core = SessionCore::new(3);
        core.begin_resolve();
        core.address_resolved();
        let actions = core
            .handle_event(SessionEvent::Command(InboundCommand::Ping))
            .unwrap();
        assert!(actions.is_empty());
    }

    // -- Shutdown handshake ------------------------------------------------

    #[test]
    fn exit_issues_one_unsubscribe_round() {
        let mut core = connected_core(2);
        let actions = core
            .handle_event(SessionEvent::Command(InboundCommand::Exit))
            .unwrap();
        assert_eq!(actions, vec![SessionAction::UnsubscribeCommands]);
        assert!(core.shutdown_requested);
        // Unsubscribe requests do not change the outstanding count.
        assert_eq!(core.pending_subscriptions, 2);
    }

    #[test]
    fn repeated_exit_ignored() {
        let mut core = connected_core(2);
        core.handle_event(SessionEvent::Command(InboundCommand::Exit))
            .unwrap();
        let actions = core
            .handle_event(SessionEvent::Command(InboundCommand::Exit))
            .unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn disconnect_waits_for_every_unsub_ack() {
        // Two subscribed topics: two unsubscribe acks, disconnect exactly
        // once, on the last one.
        let mut core = connected_core(2);
        core.handle_event(SessionEvent::Command(InboundCommand::Exit))
            .unwrap();

        let actions = core.handle_event(SessionEvent::UnsubAck).unwrap();
        assert!(actions.is_empty());
        assert_eq!(core.pending_subscriptions, 1);

        let actions = core.handle_event(SessionEvent::UnsubAck).unwrap();
        assert_eq!(actions, vec![SessionAction::Disconnect]);
        assert_eq!(core.pending_subscriptions, 0);
        assert_eq!(core.phase(), Phase::Disconnecting);
    }

    #[test]
    fn unsub_ack_without_shutdown_does_not_disconnect() {
        let mut core = connected_core(1);
        let actions = core.handle_event(SessionEvent::UnsubAck).unwrap();
        assert!(actions.is_empty());
        assert_eq!(core.phase(), Phase::Connected);
    }

    #[test]
    fn unsub_ack_underflow_is_fatal() {
        let mut core = connected_core(1);
        core.handle_event(SessionEvent::UnsubAck).unwrap();
        assert!(core.handle_event(SessionEvent::UnsubAck).is_err());
    }

    #[test]
    fn disconnect_sent_completes_lifecycle() {
        let mut core = connected_core(1);
        core.handle_event(SessionEvent::Command(InboundCommand::Exit))
            .unwrap();
        core.handle_event(SessionEvent::UnsubAck).unwrap();
        core.handle_event(SessionEvent::DisconnectSent).unwrap();
        assert_eq!(core.phase(), Phase::Disconnected);
    }

    // -- Transport loss ----------------------------------------------------

    #[test]
    fn transport_loss_while_connected_is_fatal() {
        let mut core = connected_core(3);
        assert!(core
            .handle_event(SessionEvent::TransportClosed("reset by peer".into()))
            .is_err());
    }

    #[test]
    fn transport_loss_while_connecting_is_fatal() {
        let mut core = SessionCore::new(3);
        core.begin_resolve();
        core.address_resolved();
        assert!(core
            .handle_event(SessionEvent::TransportClosed("refused".into()))
            .is_err());
    }

    #[test]
    fn transport_close_during_shutdown_is_clean() {
        let mut core = connected_core(1);
        core.handle_event(SessionEvent::Command(InboundCommand::Exit))
            .unwrap();
        core.handle_event(SessionEvent::UnsubAck).unwrap();
        let actions = core
            .handle_event(SessionEvent::TransportClosed("closed".into()))
            .unwrap();
        assert!(actions.is_empty());
        assert_eq!(core.phase(), Phase::Disconnected);
    }
}

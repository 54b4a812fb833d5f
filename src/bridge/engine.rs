//! Bridge: the bus-facing half of the gateway. Owns the MQTT client and the
//! per-device state store; translates parsed protocol events into bus
//! publications and bus commands into protocol frames.

use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, Event, LastWill, MqttOptions, Packet, Publish, QoS};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::bridge::commands::{build_frames, parse_command_topic, CommandError};
use crate::bridge::discovery::{self, find_entity};
use crate::bridge::state::BridgeStore;
use crate::codec::bitfields::AdvanceState;
use crate::codec::messages::{MessageFlags, MessageType, Params};
use crate::error::GatewayError;
use crate::relay::engine::{InboundEvent, OutboundCommand};
use crate::relay::mode::Direction;

/// Bus-facing configuration, assembled from the CLI at startup.
pub struct BridgeConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_clientid: String,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub root_topic: String,
    pub discovery_root: Option<String>,
    pub homeassistant_status_topic: String,
    pub device_online_timeout: Duration,
}

pub struct Bridge {
    client: AsyncClient,
    eventloop: rumqttc::EventLoop,
    store: BridgeStore,
    cfg: BridgeConfig,
}

impl Bridge {
    pub fn new(cfg: BridgeConfig) -> Result<Self, GatewayError> {
        let mut options = MqttOptions::new(cfg.mqtt_clientid.as_str(), cfg.mqtt_host.as_str(), cfg.mqtt_port);
        options.set_keep_alive(Duration::from_secs(30));
        if let Some(username) = &cfg.mqtt_username {
            options.set_credentials(username.as_str(), cfg.mqtt_password.clone().unwrap_or_default());
        }
        options.set_last_will(LastWill::new(
            format!("{}/lwt", cfg.root_topic),
            b"offline".to_vec(),
            QoS::AtLeastOnce,
            true,
        ));

        let (client, eventloop) = AsyncClient::new(options, 256);
        Ok(Bridge {
            client,
            eventloop,
            store: BridgeStore::new(),
            cfg,
        })
    }

    pub async fn run(
        mut self,
        mut event_rx: mpsc::Receiver<InboundEvent>,
        command_tx: mpsc::Sender<OutboundCommand>,
        shutdown: CancellationToken,
    ) {
        if let Err(err) = self.startup().await {
            error!("bridge startup failed: {err}");
            return;
        }

        let mut housekeeping = tokio::time::interval(Duration::from_secs(5));

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    self.shutdown().await;
                    break;
                }
                Some(event) = event_rx.recv() => {
                    self.handle_inbound_event(event, &command_tx).await;
                }
                poll = self.eventloop.poll() => {
                    match poll {
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            self.handle_bus_publish(publish, &command_tx).await;
                        }
                        Ok(_) => {}
                        Err(err) => {
                            warn!("mqtt connection error, relying on internal reconnect: {err}");
                        }
                    }
                }
                _ = housekeeping.tick() => {
                    self.evict_idle_devices().await;
                }
            }
        }
    }

    async fn startup(&mut self) -> Result<(), GatewayError> {
        self.client
            .publish(format!("{}/lwt", self.cfg.root_topic), QoS::AtLeastOnce, true, b"online".to_vec())
            .await
            .map_err(GatewayError::Mqtt)?;
        self.client
            .subscribe(self.cfg.homeassistant_status_topic.as_str(), QoS::AtLeastOnce)
            .await
            .map_err(GatewayError::Mqtt)?;
        self.client
            .subscribe(format!("{}/+/+/set", self.cfg.root_topic), QoS::AtLeastOnce)
            .await
            .map_err(GatewayError::Mqtt)?;
        info!("bridge connected, root topic {}", self.cfg.root_topic);
        Ok(())
    }

    async fn shutdown(&mut self) {
        let device_ids: Vec<u32> = self.store.iter().map(|(&id, _)| id).collect();
        for device_id in device_ids {
            self.publish_device_lwt(device_id, false).await;
        }
        let _ = self
            .client
            .publish(format!("{}/lwt", self.cfg.root_topic), QoS::AtLeastOnce, true, b"offline".to_vec())
            .await;
        self.client.disconnect().await.ok();
        info!("bridge shut down");
    }

    fn device_hex(device_id: u32) -> String {
        format!("{device_id:08x}")
    }

    async fn publish_device_lwt(&self, device_id: u32, online: bool) {
        let topic = format!("{}/{}/lwt", self.cfg.root_topic, Self::device_hex(device_id));
        let payload: &[u8] = if online { b"online" } else { b"offline" };
        if let Err(err) = self.client.publish(topic, QoS::AtLeastOnce, true, payload.to_vec()).await {
            error!("failed to publish device lwt: {err}");
        }
    }

    async fn publish_param(&self, device_id: u32, key: &str, value: &str) {
        let topic = format!("{}/{}/{key}", self.cfg.root_topic, Self::device_hex(device_id));
        if let Err(err) = self
            .client
            .publish(topic, QoS::AtLeastOnce, false, value.as_bytes().to_vec())
            .await
        {
            error!("failed to publish {topic}: {err}");
        }
    }

    async fn enqueue_command(&self, command_tx: &mpsc::Sender<OutboundCommand>, frame: crate::codec::Frame) {
        let _ = command_tx.send(OutboundCommand { frame }).await;
    }

    async fn publish_discovery_for_device(&mut self, device_id: u32) {
        let Some(discovery_root) = self.cfg.discovery_root.clone() else {
            return;
        };
        let hex = Self::device_hex(device_id);
        for entity in discovery::ENTITIES {
            if entity.key == "active_schedule" {
                continue; // published once schedule names are known, see publish_schedule_selector
            }
            let (topic, payload) =
                discovery::build_config(&discovery_root, &self.cfg.root_topic, &hex, device_id, entity, None);
            let body = payload.to_string().into_bytes();
            if let Err(err) = self.client.publish(topic, QoS::AtLeastOnce, true, body).await {
                error!("discovery publish failed for device {hex}: {err}");
            }
        }
    }

    async fn publish_schedule_selector(&mut self, device_id: u32) {
        let Some(discovery_root) = self.cfg.discovery_root.clone() else {
            return;
        };
        let Some(state) = self.store.get(device_id) else {
            return;
        };
        let options = state.schedule_options();
        let hex = Self::device_hex(device_id);
        let entity = find_entity("active_schedule").expect("active_schedule entity is always defined");
        let (topic, payload) = discovery::build_config(
            &discovery_root,
            &self.cfg.root_topic,
            &hex,
            device_id,
            entity,
            Some(&options),
        );
        let body = payload.to_string().into_bytes();
        if let Err(err) = self.client.publish(topic, QoS::AtLeastOnce, true, body).await {
            error!("active_schedule discovery publish failed for device {hex}: {err}");
        }
    }

    async fn handle_inbound_event(&mut self, event: InboundEvent, command_tx: &mpsc::Sender<OutboundCommand>) {
        if event.direction != Direction::FromDevice {
            return;
        }
        let device_id = event.frame.payload.device_id;
        let now = Instant::now();
        let (state, created) = self.store.get_or_create(device_id, now);
        state.touch(now);
        let discovery_pending = created || !state.discovery_published;

        if discovery_pending {
            self.publish_discovery_for_device(device_id).await;
            self.publish_device_lwt(device_id, true).await;
            if let Some(state) = self.store.get_mut(device_id) {
                state.discovery_published = true;
            }
        }

        match &event.frame.payload.params {
            Params::PingRequest(ping) => self.handle_ping(device_id, ping, command_tx).await,
            Params::ReportCodeVersionRequest { code_version } => {
                self.publish_param(device_id, "code_version", code_version).await;
                if let Some(state) = self.store.get_mut(device_id) {
                    state.params.insert("code_version", code_version.clone());
                    state.code_version_known = true;
                }
            }
            Params::GetScheduleInfoResponse(info) | Params::SetScheduleInfoResponse(info) => {
                self.handle_schedule_info(device_id, info).await;
            }
            Params::GetCurrentScheduleResponse { schedule_id }
            | Params::SetCurrentScheduleResponse { schedule_id } => {
                self.handle_active_schedule(device_id, *schedule_id).await;
            }
            Params::SetScheduleNameResponse { schedule_id } => {
                let frame = build_query(device_id, MessageType::Schedule, Params::GetScheduleInfoRequest { schedule_id: *schedule_id });
                self.enqueue_command(command_tx, frame).await;
            }
            _ => {}
        }
    }

    async fn handle_ping(
        &mut self,
        device_id: u32,
        ping: &crate::codec::messages::PingRequestBody,
        command_tx: &mpsc::Sender<OutboundCommand>,
    ) {
        let candidates: [(&'static str, String); 8] = [
            ("uptime", ping.uptime.to_string()),
            ("switch_state", bool_label(matches!(ping.state.switch_state, crate::codec::bitfields::SwitchState::On))),
            ("load_detected", bool_label(ping.state.load_detected)),
            ("advance_mode", bool_label(matches!(ping.state.advance_mode_state, AdvanceState::On))),
            (
                "load_was_detected_previously",
                bool_label(ping.state.load_was_detected_previously),
            ),
            ("boost", boost_label(ping.boost.boost_type).to_string()),
            ("work_mode", work_mode_label(ping.work_mode).to_string()),
            ("boost_duration_left", format_boost_duration_left(ping.boost.expected_finish_time)),
        ];

        let mut changed: Vec<(&'static str, String)> = Vec::new();
        let mut needs_code_version = false;
        let mut needs_active_schedule = false;
        let mut missing_schedules: Vec<u8> = Vec::new();

        if let Some(state) = self.store.get_mut(device_id) {
            for (key, value) in &candidates {
                if state.params.get(key) != Some(value) {
                    state.params.insert(key, value.clone());
                    changed.push((key, value.clone()));
                }
            }
            needs_code_version = !state.code_version_known;
            needs_active_schedule = state.active_schedule_id.is_none();
            if !state.all_schedules_known() {
                missing_schedules = (0..crate::constants::SCHEDULE_COUNT as u8)
                    .filter(|id| !state.schedule_names.contains_key(id))
                    .collect();
            }
        }

        for (key, value) in &changed {
            self.publish_param(device_id, key, value).await;
        }

        if needs_code_version {
            let frame = build_query(device_id, MessageType::CodeVersion, Params::GetCodeVersionRequest);
            self.enqueue_command(command_tx, frame).await;
        }
        if needs_active_schedule {
            let frame = build_query(device_id, MessageType::ActiveSchedule, Params::GetCurrentScheduleRequest);
            self.enqueue_command(command_tx, frame).await;
        }
        for schedule_id in missing_schedules {
            let frame = build_query(device_id, MessageType::Schedule, Params::GetScheduleInfoRequest { schedule_id });
            self.enqueue_command(command_tx, frame).await;
        }
    }

    async fn handle_schedule_info(&mut self, device_id: u32, info: &crate::codec::messages::ScheduleInfo) {
        let mut became_complete = false;
        if let Some(state) = self.store.get_mut(device_id) {
            state.schedule_names.insert(info.schedule_id, info.name.clone());
            if let Some(first_window) = info.windows.first() {
                state.schedules.insert(info.schedule_id, *first_window);
            }
            became_complete = state.all_schedules_known();
        }
        if became_complete {
            self.publish_schedule_selector(device_id).await;
        }
    }

    async fn handle_active_schedule(&mut self, device_id: u32, schedule_id: u8) {
        let mut label = None;
        if let Some(state) = self.store.get_mut(device_id) {
            state.active_schedule_id = Some(schedule_id);
            if state.all_schedules_known() {
                label = state.active_schedule_label();
            }
        }
        self.publish_param(device_id, "active_schedule_id", &schedule_id.to_string()).await;
        if let Some(label) = label {
            self.publish_param(device_id, "active_schedule", &label).await;
        }
    }

    async fn handle_bus_publish(&mut self, publish: Publish, command_tx: &mpsc::Sender<OutboundCommand>) {
        let payload = String::from_utf8_lossy(&publish.payload).to_string();

        if publish.topic == self.cfg.homeassistant_status_topic {
            if payload == "online" {
                self.recover_after_restart(command_tx).await;
            }
            return;
        }

        let Some((device_id, entity)) = parse_command_topic(&self.cfg.root_topic, &publish.topic) else {
            return;
        };
        match build_frames(device_id, &entity, &payload) {
            Ok(frames) => {
                for frame in frames {
                    self.enqueue_command(command_tx, frame).await;
                }
            }
            Err(CommandError::UnknownEntity(entity)) => {
                warn!("bus command for unknown entity {entity:?} on device {device_id:#010x}");
            }
            Err(err) => {
                warn!("bus command rejected for device {device_id:#010x}: {err}");
            }
        }
    }

    async fn recover_after_restart(&mut self, _command_tx: &mpsc::Sender<OutboundCommand>) {
        info!("home-automation status went online; republishing gateway and device state");
        let _ = self
            .client
            .publish(format!("{}/lwt", self.cfg.root_topic), QoS::AtLeastOnce, true, b"online".to_vec())
            .await;
        let device_ids: Vec<u32> = self.store.iter().map(|(&id, _)| id).collect();
        for device_id in device_ids {
            self.publish_device_lwt(device_id, true).await;
            let params: Vec<(&'static str, String)> = self
                .store
                .get(device_id)
                .map(|state| state.params.iter().map(|(&k, v)| (k, v.clone())).collect())
                .unwrap_or_default();
            for (key, value) in params {
                self.publish_param(device_id, key, &value).await;
            }
        }
    }

    async fn evict_idle_devices(&mut self) {
        let now = Instant::now();
        let idle = self.store.idle_devices(now, self.cfg.device_online_timeout);
        for device_id in idle {
            self.publish_device_lwt(device_id, false).await;
            self.store.remove(device_id);
            debug!("device {device_id:#010x} evicted after idle timeout");
        }
    }
}

fn build_query(device_id: u32, message_type: MessageType, params: Params) -> crate::codec::Frame {
    crate::codec::Frame {
        message_id: rand::random(),
        payload: crate::codec::Payload {
            message_type,
            message_flags: MessageFlags::server(false),
            seq: rand_seq(),
            unknown: [0, 0, 0],
            device_id,
            params,
        },
    }
}

fn rand_seq() -> u8 {
    use rand::Rng;
    rand::thread_rng().gen_range(0..=crate::constants::SEQ_MAX_TRACKED)
}

fn boost_label(kind: crate::codec::bitfields::BoostKind) -> &'static str {
    use crate::codec::bitfields::BoostKind::*;
    match kind {
        Off => "Off",
        OneHour => "1 hour",
        TwoHours => "2 hours",
        Unspecified => "Unspecified",
    }
}

fn work_mode_label(mode: crate::codec::bitfields::WorkMode) -> &'static str {
    use crate::codec::bitfields::WorkMode::*;
    match mode {
        Auto => "Auto",
        AlwaysOff => "Always off",
        AlwaysOn => "Always on",
        Holiday => "Holiday",
    }
}

/// HA's conventional binary-sensor/switch payload casing.
fn bool_label(value: bool) -> String {
    if value { "ON" } else { "OFF" }.to_string()
}

/// `HH:MM` remaining until `expected_finish_time` (minutes since the most
/// recent Sunday midnight, local time), clamped to zero if already past.
fn format_boost_duration_left(expected_finish_time: u32) -> String {
    use chrono::{Datelike, Local, Timelike};

    let now = Local::now();
    let minutes_since_midnight = now.hour() * 60 + now.minute();
    let days_since_sunday = now.weekday().num_days_from_sunday();
    let minutes_since_sunday_midnight = days_since_sunday * 24 * 60 + minutes_since_midnight;

    let remaining = expected_finish_time.saturating_sub(minutes_since_sunday_midnight);
    format!("{:02}:{:02}", remaining / 60, remaining % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boost_label_matches_kind() {
        assert_eq!(boost_label(crate::codec::bitfields::BoostKind::OneHour), "1 hour");
    }

    fn test_config() -> BridgeConfig {
        BridgeConfig {
            mqtt_host: "localhost".to_string(),
            mqtt_port: 1883,
            mqtt_clientid: "test".to_string(),
            mqtt_username: None,
            mqtt_password: None,
            root_topic: "timeguard".to_string(),
            discovery_root: None,
            homeassistant_status_topic: "homeassistant/status".to_string(),
            device_online_timeout: Duration::from_secs(50),
        }
    }

    fn sample_ping(uptime: u32) -> crate::codec::messages::PingRequestBody {
        use crate::codec::bitfields::{Boost, BoostKind, DeviceState, SwitchState};
        crate::codec::messages::PingRequestBody {
            state: DeviceState {
                switch_state: SwitchState::On,
                unknown1: 0,
                load_detected: false,
                advance_mode_state: AdvanceState::Off,
                load_was_detected_previously: false,
                unknown2: 0,
            },
            unknown2: [0, 0, 0],
            work_mode: crate::codec::bitfields::WorkMode::Auto,
            unknown3: [0, 0, 0],
            uptime,
            boost: Boost {
                boost_type: BoostKind::Off,
                minutes_from_sunday: 0,
                duration_in_minutes: 0,
                expected_finish_time: 0,
            },
            unknown4: 0,
        }
    }

    /// Invariant 8 (proxy): each PING updates the stored per-key value, so a
    /// later diff against freshly observed values only republishes what
    /// actually changed between successive pings.
    #[tokio::test]
    async fn handle_ping_updates_only_touched_state() {
        let mut bridge = Bridge::new(test_config()).unwrap();
        let (command_tx, _command_rx) = mpsc::channel(8);
        let device_id = 0x1234_5678;
        let now = Instant::now();
        bridge.store.get_or_create(device_id, now);

        bridge.handle_ping(device_id, &sample_ping(100), &command_tx).await;
        let state = bridge.store.get(device_id).unwrap();
        assert_eq!(state.params.get("uptime"), Some(&"100".to_string()));
        assert_eq!(state.params.get("switch_state"), Some(&"ON".to_string()));
        assert!(state.params.contains_key("boost_duration_left"));

        bridge.handle_ping(device_id, &sample_ping(200), &command_tx).await;
        let state = bridge.store.get(device_id).unwrap();
        assert_eq!(state.params.get("uptime"), Some(&"200".to_string()));
        // Untouched field should still carry its prior value unchanged.
        assert_eq!(state.params.get("switch_state"), Some(&"ON".to_string()));
    }
}

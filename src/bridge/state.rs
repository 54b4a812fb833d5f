//! Per-device state held by the Bridge: the latest known value of every
//! bus-published parameter, plus cached schedule data used to derive the
//! `active_schedule` selector options.

use std::collections::HashMap;
use std::time::Instant;

use crate::codec::bitfields::Schedule;
use crate::constants::SCHEDULE_COUNT;

/// One device's bridge-side state, created on its first client-originated
/// frame and torn down after `device_online_timeout` of silence.
#[derive(Debug, Clone)]
pub struct DeviceState {
    pub params: HashMap<&'static str, String>,
    pub schedule_names: HashMap<u8, String>,
    pub schedules: HashMap<u8, Schedule>,
    pub active_schedule_id: Option<u8>,
    pub code_version_known: bool,
    pub last_command: Instant,
    pub discovery_published: bool,
    pub schedule_selector_published: bool,
}

impl DeviceState {
    pub fn new(now: Instant) -> Self {
        Self {
            params: HashMap::new(),
            schedule_names: HashMap::new(),
            schedules: HashMap::new(),
            active_schedule_id: None,
            code_version_known: false,
            last_command: now,
            discovery_published: false,
            schedule_selector_published: false,
        }
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_command = now;
    }

    pub fn is_idle(&self, now: Instant, timeout: std::time::Duration) -> bool {
        now.saturating_duration_since(self.last_command) > timeout
    }

    pub fn all_schedules_known(&self) -> bool {
        self.schedule_names.len() >= SCHEDULE_COUNT
    }

    /// `["#1: A", "#2: B", ...]` skipping schedules with an empty name,
    /// in ascending `schedule_id` order, 1-based in the label.
    pub fn schedule_options(&self) -> Vec<String> {
        let mut ids: Vec<&u8> = self.schedule_names.keys().collect();
        ids.sort();
        ids.into_iter()
            .filter(|id| !self.schedule_names[id].is_empty())
            .map(|id| format!("#{}: {}", id + 1, self.schedule_names[id]))
            .collect()
    }

    pub fn active_schedule_label(&self) -> Option<String> {
        let id = self.active_schedule_id?;
        let name = self.schedule_names.get(&id)?;
        Some(format!("#{}: {}", id + 1, name))
    }
}

/// All known devices, keyed by `device_id`.
#[derive(Debug, Default)]
pub struct BridgeStore {
    devices: HashMap<u32, DeviceState>,
}

impl BridgeStore {
    pub fn new() -> Self {
        Self {
            devices: HashMap::new(),
        }
    }

    /// Returns the device's state, creating it if this is the first time
    /// it's been seen, along with whether it was just created.
    pub fn get_or_create(&mut self, device_id: u32, now: Instant) -> (&mut DeviceState, bool) {
        let created = !self.devices.contains_key(&device_id);
        let entry = self
            .devices
            .entry(device_id)
            .or_insert_with(|| DeviceState::new(now));
        (entry, created)
    }

    pub fn get(&self, device_id: u32) -> Option<&DeviceState> {
        self.devices.get(&device_id)
    }

    pub fn get_mut(&mut self, device_id: u32) -> Option<&mut DeviceState> {
        self.devices.get_mut(&device_id)
    }

    pub fn remove(&mut self, device_id: u32) -> Option<DeviceState> {
        self.devices.remove(&device_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u32, &DeviceState)> {
        self.devices.iter()
    }

    pub fn idle_devices(&self, now: Instant, timeout: std::time::Duration) -> Vec<u32> {
        self.devices
            .iter()
            .filter(|(_, state)| state.is_idle(now, timeout))
            .map(|(&id, _)| id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_options_skip_empty_names_and_are_one_based() {
        let mut state = DeviceState::new(Instant::now());
        for (id, name) in [(0, "A"), (1, "B"), (2, ""), (3, "C")] {
            state.schedule_names.insert(id, name.to_string());
        }
        assert_eq!(
            state.schedule_options(),
            vec!["#1: A".to_string(), "#2: B".to_string(), "#4: C".to_string()]
        );
    }

    #[test]
    fn idle_detection_respects_timeout() {
        let now = Instant::now();
        let mut state = DeviceState::new(now);
        assert!(!state.is_idle(now, std::time::Duration::from_secs(50)));
        let later = now + std::time::Duration::from_secs(51);
        assert!(state.is_idle(later, std::time::Duration::from_secs(50)));
    }

    /// S5: ten schedule responses, four with non-empty names, produce the
    /// expected discovery option list.
    #[test]
    fn s5_schedule_discovery_lists_named_schedules() {
        let mut state = DeviceState::new(Instant::now());
        let names = ["A", "B", "", "C", "D", "", "", "", "", "J"];
        for (id, name) in names.iter().enumerate() {
            state.schedule_names.insert(id as u8, name.to_string());
        }
        assert!(state.all_schedules_known());
        assert_eq!(
            state.schedule_options(),
            vec![
                "#1: A".to_string(),
                "#2: B".to_string(),
                "#4: C".to_string(),
                "#5: D".to_string(),
                "#10: J".to_string(),
            ]
        );
    }

    /// S6: after 51s of silence against a 50s timeout, the device is idle
    /// and eviction removes it from the store.
    #[test]
    fn s6_idle_eviction_removes_device() {
        let t0 = Instant::now();
        let mut store = BridgeStore::new();
        store.get_or_create(0x1234_5678, t0);

        let idle = store.idle_devices(t0 + std::time::Duration::from_secs(51), std::time::Duration::from_secs(50));
        assert_eq!(idle, vec![0x1234_5678]);

        for device_id in idle {
            store.remove(device_id);
        }
        assert!(store.get(0x1234_5678).is_none());
    }
}

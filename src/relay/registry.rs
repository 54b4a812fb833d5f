//! Device Registry: maps a device id to its last-known UDP source address.

use std::collections::HashMap;
use std::net::SocketAddr;

/// First-write-wins mapping of `device_id -> (ip, port)`.
///
/// Devices behind NAT are expected to keep the same mapping for the life of
/// the process; a changed source address is more likely spoofing than a
/// legitimate move, so later `learn` calls for a known device are ignored.
/// There is no eviction here — device churn is handled by the Bridge's
/// lifecycle timer instead.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<u32, SocketAddr>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            devices: HashMap::new(),
        }
    }

    /// Records `addr` for `device_id` unless an address is already known.
    pub fn learn(&mut self, device_id: u32, addr: SocketAddr) {
        self.devices.entry(device_id).or_insert(addr);
    }

    pub fn lookup(&self, device_id: u32) -> Option<SocketAddr> {
        self.devices.get(&device_id).copied()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, SocketAddr)> + '_ {
        self.devices.iter().map(|(&id, &addr)| (id, addr))
    }
}

//! Registry of advertisers seen during a session

use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use sniff_protocol::{AddressKind, DeviceAddress, Packet};
use tracing::info;

use crate::bus::{EventBus, SubscriptionId};
use crate::events::{Notification, Topic};

/// An advertiser and its latest metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub address: DeviceAddress,
    pub kind: AddressKind,
    /// Advertised local name, if any packet carried one
    pub name: Option<String>,
    pub rssi: Option<i8>,
    pub channel: Option<u8>,
    pub last_seen: SystemTime,
    /// Advertising packets attributed to this device
    pub adv_count: u64,
}

impl Device {
    /// Build from an advertising packet carrying an address
    pub fn from_packet(packet: &Packet) -> Option<Self> {
        if !packet.announces_device() {
            return None;
        }
        Some(Self {
            address: packet.advertiser?,
            kind: packet.address_kind,
            name: packet.name.clone(),
            rssi: packet.rssi(),
            channel: packet.channel(),
            last_seen: packet.received_at,
            adv_count: 1,
        })
    }

    /// Fold a newer sighting of the same device into this one
    fn merge(&mut self, seen: &Device) {
        self.kind = seen.kind;
        if seen.name.is_some() {
            self.name = seen.name.clone();
        }
        self.rssi = seen.rssi.or(self.rssi);
        self.channel = seen.channel.or(self.channel);
        self.last_seen = seen.last_seen;
        self.adv_count += seen.adv_count;
    }
}

/// Devices keyed by address, in discovery order
#[derive(Debug, Clone, Default)]
pub struct DeviceList {
    devices: Arc<Mutex<Vec<Device>>>,
}

impl DeviceList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep this list updated from `DeviceFound` notifications on `bus`
    pub fn attach(&self, bus: &EventBus) -> SubscriptionId {
        let list = self.clone();
        bus.subscribe(Topic::DeviceFound, move |notification| {
            if let Notification::DeviceFound { device } = notification {
                list.record(device);
            }
            Ok(())
        })
    }

    /// Insert a device or update the existing entry for its address
    pub fn record(&self, device: &Device) {
        let mut devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
        match devices.iter_mut().find(|d| d.address == device.address) {
            Some(existing) => existing.merge(device),
            None => {
                info!(
                    "Discovered device {} {}",
                    device.address,
                    device.name.as_deref().unwrap_or("")
                );
                devices.push(device.clone());
            }
        }
    }

    pub fn snapshot(&self) -> Vec<Device> {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, address: &DeviceAddress) -> Option<Device> {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|d| d.address == *address)
            .cloned()
    }

    pub fn contains(&self, address: &DeviceAddress) -> bool {
        self.get(address).is_some()
    }

    pub fn len(&self) -> usize {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sniff_protocol::PacketKind;

    fn device(address: &str, name: Option<&str>, rssi: i8) -> Device {
        Device {
            address: address.parse().unwrap(),
            kind: AddressKind::Public,
            name: name.map(str::to_string),
            rssi: Some(rssi),
            channel: Some(37),
            last_seen: SystemTime::now(),
            adv_count: 1,
        }
    }

    #[test]
    fn test_record_updates_in_place() {
        let list = DeviceList::new();
        list.record(&device("AA:BB:CC:DD:EE:FF", Some("Thermo"), -60));
        list.record(&device("11:22:33:44:55:66", None, -80));
        list.record(&device("AA:BB:CC:DD:EE:FF", None, -50));

        let devices = list.snapshot();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].address.to_string(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(devices[0].name.as_deref(), Some("Thermo"));
        assert_eq!(devices[0].rssi, Some(-50));
        assert_eq!(devices[0].adv_count, 2);
    }

    #[test]
    fn test_attach_follows_bus() {
        let bus = EventBus::new();
        let list = DeviceList::new();
        list.attach(&bus);

        let address: DeviceAddress = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        assert!(!list.contains(&address));

        bus.publish(&Notification::DeviceFound {
            device: device("AA:BB:CC:DD:EE:FF", None, -70),
        });
        assert!(list.contains(&address));
        assert_eq!(list.get(&address).unwrap().rssi, Some(-70));
    }

    #[test]
    fn test_from_packet_requires_advertisement() {
        let address: DeviceAddress = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        let data = Packet::new(0x06, 1, PacketKind::Data, vec![]).with_advertiser(address);
        assert!(Device::from_packet(&data).is_none());

        let adv = Packet::new(0x06, 2, PacketKind::Advertisement, vec![]).with_advertiser(address);
        let found = Device::from_packet(&adv).unwrap();
        assert_eq!(found.address, address);
        assert_eq!(found.adv_count, 1);
    }
}

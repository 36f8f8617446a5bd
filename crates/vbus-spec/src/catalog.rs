//! Knowledge-base front end.
//!
//! Turns channel-independent knowledge-base entries into per-channel
//! [`DeviceSpec`]s and [`PacketSpec`]s. Lookups are total: unknown devices
//! and packets are synthesized as placeholders. Only specs backed by the
//! knowledge base are cached; placeholders are rebuilt on every lookup so
//! that unknown traffic cannot grow the caches.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::config::defaults;
use crate::ids::{DeviceId, PacketId};
use crate::knowledge::KnowledgeBase;
use crate::model::{DeviceSpec, PacketFieldSpec, PacketSpec};

/// Cached view of a knowledge base.
pub struct Catalog {
    knowledge: Arc<dyn KnowledgeBase>,
    /// Device specs by identity, for pairs of known devices
    devices: DashMap<DeviceId, Arc<DeviceSpec>>,
    /// Known packet specs by query ID, version included when one was asked for
    packets: DashMap<PacketId, Arc<PacketSpec>>,
}

impl Catalog {
    pub fn new(knowledge: Arc<dyn KnowledgeBase>) -> Self {
        Self {
            knowledge,
            devices: DashMap::new(),
            packets: DashMap::new(),
        }
    }

    pub fn knowledge(&self) -> &Arc<dyn KnowledgeBase> {
        &self.knowledge
    }

    /// Device as seen on `channel`, talking to `peer_address`.
    pub fn device_spec(&self, channel: u8, self_address: u16, peer_address: u16) -> Arc<DeviceSpec> {
        let id = DeviceId::new(channel, self_address, peer_address);
        if let Some(spec) = self.devices.get(&id) {
            return Arc::clone(spec.value());
        }

        let definition = self.knowledge.device(self_address, peer_address);
        let name = match definition {
            Some(definition) => definition.name.clone(),
            None => {
                debug!("No device definition for 0x{:04X}, synthesizing placeholder", self_address);
                DeviceSpec::unknown_name(self_address)
            }
        };

        let spec = Arc::new(DeviceSpec {
            device_id: id.to_string(),
            channel,
            self_address,
            peer_address,
            full_name: DeviceSpec::full_name_for(channel, &name),
            name,
        });

        let known_peer = self.knowledge.device(peer_address, self_address).is_some();
        if definition.is_none() || !known_peer {
            return spec;
        }
        Arc::clone(self.devices.entry(id).or_insert(spec).value())
    }

    /// Packet spec for the given identity.
    ///
    /// `protocol_version` of `None` accepts whichever version the knowledge
    /// base knows. An unknown packet, or a known packet asked for with a
    /// different version, yields a placeholder without fields.
    pub fn packet_spec(
        &self,
        channel: u8,
        destination_address: u16,
        source_address: u16,
        command: u16,
        protocol_version: Option<u8>,
    ) -> Arc<PacketSpec> {
        let key = PacketId::new(
            channel,
            destination_address,
            source_address,
            protocol_version,
            command,
        );
        if let Some(spec) = self.packets.get(&key) {
            return Arc::clone(spec.value());
        }

        let definition = self
            .knowledge
            .packet(destination_address, source_address, command)
            .filter(|definition| {
                protocol_version.is_none_or(|version| version == definition.protocol_version)
            });

        let known = definition.is_some();
        let (version, packet_fields): (u8, Arc<[PacketFieldSpec]>) = match definition {
            Some(definition) => (definition.protocol_version, Arc::clone(&definition.packet_fields)),
            None => {
                debug!("No packet definition for {}, synthesizing placeholder", key);
                (
                    protocol_version.unwrap_or(defaults::PROTOCOL_VERSION),
                    Arc::from(Vec::new()),
                )
            }
        };

        let destination_device = self.device_spec(channel, destination_address, source_address);
        let source_device = self.device_spec(channel, source_address, destination_address);
        let packet_id = PacketId::new(
            channel,
            destination_address,
            source_address,
            Some(version),
            command,
        );

        let spec = Arc::new(PacketSpec {
            packet_id: packet_id.to_string(),
            channel,
            destination_address,
            source_address,
            protocol_version: version,
            command,
            full_name: source_device.full_name.clone(),
            destination_device,
            source_device,
            packet_fields,
        });

        if !known {
            return spec;
        }
        Arc::clone(self.packets.entry(key).or_insert(spec).value())
    }

    /// Packet spec for a textual packet ID, `None` if it does not parse.
    pub fn packet_spec_by_id(&self, packet_id: &str) -> Option<Arc<PacketSpec>> {
        let id = PacketId::parse(packet_id)?;
        Some(self.packet_spec_for_id(&id))
    }

    pub fn packet_spec_for_id(&self, id: &PacketId) -> Arc<PacketSpec> {
        self.packet_spec(
            id.channel,
            id.destination_address,
            id.source_address,
            id.command,
            id.protocol_version,
        )
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("cached_devices", &self.devices.len())
            .field("cached_packets", &self.packets.len())
            .finish()
    }
}

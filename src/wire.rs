//! # AVDECC Wire Format
//!
//! Encoding and decoding of IEEE 1722.1 PDUs. This module provides
//! low-level access to the wire format for testing, debugging and
//! interoperability verification.
//!
//! ## Frame layout
//!
//! ```text
//! Offset  Size  Field
//! ──────────────────────────────────────────────────────
//!   0      6    Destination MAC (91:E0:F0:01:00:00 multicast)
//!   6      6    Source MAC
//!  12      2    EtherType (0x22F0)
//! ──────────────────────────────────────────────────────
//!  14           AVTPDU common control header:
//!   +0     1    cd (1, always set) | subtype (7)
//!   +1     1    sv (1) | version (3, always 0) | message_type (4)
//!   +2     2    status (5) | control_data_length (11)
//!   +4     8    entity_id / target_entity_id / stream_id
//! ──────────────────────────────────────────────────────
//!  26           Sub-protocol payload (control_data_length octets)
//! ```
//!
//! ## Sub-protocols
//!
//! | Subtype | Protocol | control_data_length |
//! |---------|----------|---------------------|
//! | 0x7A | ADP (discovery) | 56 |
//! | 0x7B | AECP (AEM / AA / MVU) | variable, ≤ 512 by default |
//! | 0x7C | ACMP (connection management) | 44 |
//!
//! All multi-byte fields are big-endian. `parse` returns `None` for any
//! nonconforming input; the only tolerated deviations are the explicit
//! [`AecpParseLimits`] toggles on the AECP receive path.
//!
//! ## Usage
//!
//! ```
//! use avdecc_runtime::wire::{Adpdu, AdpMessageType};
//! use avdecc_runtime::EntityId;
//! use bytes::BytesMut;
//!
//! let pdu = Adpdu::entity_discover(EntityId::ZERO);
//! let mut buf = BytesMut::new();
//! pdu.serialize(&mut buf);
//!
//! let parsed = Adpdu::parse(&mut buf.freeze()).expect("valid ADPDU");
//! assert_eq!(parsed.message_type, AdpMessageType::EntityDiscover);
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::config::EngineConfig;
use crate::entity::{
    ControllerCapabilities, DiscoveredEntity, EntityCapabilities, ListenerCapabilities,
    TalkerCapabilities,
};
use crate::status::AcmpStatus;
use crate::{EntityId, MacAddress, StreamIdentification};

/// EtherType of all AVDECC traffic.
pub const AVDECC_ETHERTYPE: u16 = 0x22F0;

/// AVTP control subtype values
pub const SUBTYPE_ADP: u8 = 0x7A;
pub const SUBTYPE_AECP: u8 = 0x7B;
pub const SUBTYPE_ACMP: u8 = 0x7C;

/// Maximum serialized AECPDU size (IEEE 1722.1 §9.2.1.1.7), header included.
pub const AECP_MAX_SIZE: usize = 524;

/// Milan vendor-unique protocol identifier (Milan §5.4).
pub const MILAN_PROTOCOL_ID: [u8; 6] = [0x00, 0x1B, 0xC5, 0x0A, 0xC1, 0x00];

// ============================================================================
// ETHERNET HEADER
// ============================================================================

/// Ethernet II header (14 bytes on wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    pub dst: MacAddress,
    pub src: MacAddress,
    pub ethertype: u16,
}

impl EthernetHeader {
    pub const SIZE: usize = 14;

    pub fn avdecc(dst: MacAddress, src: MacAddress) -> Self {
        Self {
            dst,
            src,
            ethertype: AVDECC_ETHERTYPE,
        }
    }

    pub fn parse(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < Self::SIZE {
            return None;
        }
        let mut dst = [0u8; 6];
        let mut src = [0u8; 6];
        buf.copy_to_slice(&mut dst);
        buf.copy_to_slice(&mut src);
        let ethertype = buf.get_u16();
        Some(Self {
            dst: MacAddress::new(dst),
            src: MacAddress::new(src),
            ethertype,
        })
    }

    pub fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_slice(&self.dst.octets());
        buf.put_slice(&self.src.octets());
        buf.put_u16(self.ethertype);
    }
}

// ============================================================================
// AVTPDU COMMON CONTROL HEADER
// ============================================================================

/// The 12-byte control header every AVDECC PDU starts with.
///
/// `message_type` and `status` are raw sub-fields; each PDU kind gives
/// them meaning (ADP stores valid_time in the status bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvtpControlHeader {
    pub subtype: u8,
    pub message_type: u8,
    pub status: u8,
    pub control_data_length: u16,
    /// entity_id (ADP), target_entity_id (AECP) or stream_id (ACMP).
    pub id: u64,
}

impl AvtpControlHeader {
    pub const SIZE: usize = 12;

    pub fn parse(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < Self::SIZE {
            return None;
        }
        let first = buf.get_u8();
        // cd must be set on control PDUs
        if first & 0x80 == 0 {
            return None;
        }
        let subtype = first & 0x7F;
        let second = buf.get_u8();
        let sv = second & 0x80;
        let version = (second >> 4) & 0x07;
        if sv != 0 || version != 0 {
            return None;
        }
        let message_type = second & 0x0F;
        let status_and_len = buf.get_u16();
        let status = (status_and_len >> 11) as u8;
        let control_data_length = status_and_len & 0x07FF;
        let id = buf.get_u64();
        Some(Self {
            subtype,
            message_type,
            status,
            control_data_length,
            id,
        })
    }

    pub fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_u8(0x80 | (self.subtype & 0x7F));
        buf.put_u8(self.message_type & 0x0F);
        buf.put_u16(((self.status as u16 & 0x1F) << 11) | (self.control_data_length & 0x07FF));
        buf.put_u64(self.id);
    }
}

// ============================================================================
// ADP
// ============================================================================

/// ADP message types (IEEE 1722.1 Table 6.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AdpMessageType {
    EntityAvailable = 0,
    EntityDeparting = 1,
    EntityDiscover = 2,
}

impl AdpMessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::EntityAvailable),
            1 => Some(Self::EntityDeparting),
            2 => Some(Self::EntityDiscover),
            _ => None,
        }
    }
}

/// A parsed ADP PDU.
///
/// `valid_time` is in seconds; the wire carries it in 2-second units in
/// the 5-bit status field, so only even values in [2, 62] survive a
/// round trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adpdu {
    pub message_type: AdpMessageType,
    pub valid_time: u8,
    pub entity_id: EntityId,
    pub entity_model_id: EntityId,
    pub entity_capabilities: EntityCapabilities,
    pub talker_stream_sources: u16,
    pub talker_capabilities: TalkerCapabilities,
    pub listener_stream_sinks: u16,
    pub listener_capabilities: ListenerCapabilities,
    pub controller_capabilities: ControllerCapabilities,
    pub available_index: u32,
    pub gptp_grandmaster_id: EntityId,
    pub gptp_domain_number: u8,
    pub identify_control_index: u16,
    pub interface_index: u16,
    pub association_id: EntityId,
}

impl Adpdu {
    pub const CONTROL_DATA_LENGTH: u16 = 56;
    /// Serialized size without the Ethernet header.
    pub const SIZE: usize = AvtpControlHeader::SIZE + Self::CONTROL_DATA_LENGTH as usize;

    fn empty(message_type: AdpMessageType) -> Self {
        Self {
            message_type,
            valid_time: 0,
            entity_id: EntityId::ZERO,
            entity_model_id: EntityId::ZERO,
            entity_capabilities: EntityCapabilities::default(),
            talker_stream_sources: 0,
            talker_capabilities: TalkerCapabilities::default(),
            listener_stream_sinks: 0,
            listener_capabilities: ListenerCapabilities::default(),
            controller_capabilities: ControllerCapabilities::default(),
            available_index: 0,
            gptp_grandmaster_id: EntityId::ZERO,
            gptp_domain_number: 0,
            identify_control_index: 0,
            interface_index: 0,
            association_id: EntityId::ZERO,
        }
    }

    /// Build an ENTITY_AVAILABLE advertisement from an entity snapshot.
    pub fn entity_available(entity: &DiscoveredEntity, available_index: u32) -> Self {
        Self {
            message_type: AdpMessageType::EntityAvailable,
            valid_time: entity.clamped_valid_time(),
            entity_id: entity.entity_id,
            entity_model_id: entity.entity_model_id,
            entity_capabilities: entity.capabilities,
            talker_stream_sources: entity.talker_stream_sources,
            talker_capabilities: entity.talker_capabilities,
            listener_stream_sinks: entity.listener_stream_sinks,
            listener_capabilities: entity.listener_capabilities,
            controller_capabilities: entity.controller_capabilities,
            available_index,
            gptp_grandmaster_id: entity.gptp_grandmaster_id,
            gptp_domain_number: entity.gptp_domain_number,
            identify_control_index: entity.identify_control_index,
            interface_index: entity.interface_index,
            association_id: entity.association_id,
        }
    }

    /// Build an ENTITY_DEPARTING notification for an entity snapshot.
    pub fn entity_departing(entity: &DiscoveredEntity, available_index: u32) -> Self {
        let mut pdu = Self::entity_available(entity, available_index);
        pdu.message_type = AdpMessageType::EntityDeparting;
        pdu.valid_time = 0;
        pdu
    }

    /// Build an ENTITY_DISCOVER request. `EntityId::ZERO` addresses all
    /// entities.
    pub fn entity_discover(target: EntityId) -> Self {
        let mut pdu = Self::empty(AdpMessageType::EntityDiscover);
        pdu.entity_id = target;
        pdu
    }

    /// Snapshot this advertisement as a [`DiscoveredEntity`], stamped
    /// with the MAC address and interface it arrived on.
    pub fn to_discovered_entity(&self, source: MacAddress, interface_index: u16) -> DiscoveredEntity {
        DiscoveredEntity {
            entity_id: self.entity_id,
            entity_model_id: self.entity_model_id,
            mac_address: source,
            interface_index,
            capabilities: self.entity_capabilities,
            talker_stream_sources: self.talker_stream_sources,
            talker_capabilities: self.talker_capabilities,
            listener_stream_sinks: self.listener_stream_sinks,
            listener_capabilities: self.listener_capabilities,
            controller_capabilities: self.controller_capabilities,
            gptp_grandmaster_id: self.gptp_grandmaster_id,
            gptp_domain_number: self.gptp_domain_number,
            identify_control_index: self.identify_control_index,
            association_id: self.association_id,
            valid_time: self.valid_time,
        }
    }

    pub fn parse(buf: &mut impl Buf) -> Option<Self> {
        let header = AvtpControlHeader::parse(buf)?;
        if header.subtype != SUBTYPE_ADP {
            return None;
        }
        if header.control_data_length != Self::CONTROL_DATA_LENGTH {
            return None;
        }
        if buf.remaining() < Self::CONTROL_DATA_LENGTH as usize {
            return None;
        }
        let message_type = AdpMessageType::from_u8(header.message_type)?;

        let entity_model_id = EntityId::new(buf.get_u64());
        let entity_capabilities = EntityCapabilities::new(buf.get_u32());
        let talker_stream_sources = buf.get_u16();
        let talker_capabilities = TalkerCapabilities::new(buf.get_u16());
        let listener_stream_sinks = buf.get_u16();
        let listener_capabilities = ListenerCapabilities::new(buf.get_u16());
        let controller_capabilities = ControllerCapabilities::new(buf.get_u32());
        let available_index = buf.get_u32();
        let gptp_grandmaster_id = EntityId::new(buf.get_u64());
        let gptp_domain_number = buf.get_u8();
        buf.advance(3); // reserved
        let identify_control_index = buf.get_u16();
        let interface_index = buf.get_u16();
        let association_id = EntityId::new(buf.get_u64());
        buf.advance(4); // reserved

        Some(Self {
            message_type,
            valid_time: header.status * 2,
            entity_id: EntityId::new(header.id),
            entity_model_id,
            entity_capabilities,
            talker_stream_sources,
            talker_capabilities,
            listener_stream_sinks,
            listener_capabilities,
            controller_capabilities,
            available_index,
            gptp_grandmaster_id,
            gptp_domain_number,
            identify_control_index,
            interface_index,
            association_id,
        })
    }

    pub fn serialize(&self, buf: &mut impl BufMut) {
        let header = AvtpControlHeader {
            subtype: SUBTYPE_ADP,
            message_type: self.message_type as u8,
            status: self.valid_time / 2,
            control_data_length: Self::CONTROL_DATA_LENGTH,
            id: self.entity_id.value(),
        };
        header.serialize(buf);
        buf.put_u64(self.entity_model_id.value());
        buf.put_u32(self.entity_capabilities.0);
        buf.put_u16(self.talker_stream_sources);
        buf.put_u16(self.talker_capabilities.0);
        buf.put_u16(self.listener_stream_sinks);
        buf.put_u16(self.listener_capabilities.0);
        buf.put_u32(self.controller_capabilities.0);
        buf.put_u32(self.available_index);
        buf.put_u64(self.gptp_grandmaster_id.value());
        buf.put_u8(self.gptp_domain_number);
        buf.put_bytes(0, 3); // reserved
        buf.put_u16(self.identify_control_index);
        buf.put_u16(self.interface_index);
        buf.put_u64(self.association_id.value());
        buf.put_bytes(0, 4); // reserved
    }
}

// ============================================================================
// AECP
// ============================================================================

/// AECP message types (IEEE 1722.1 Table 9.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AecpMessageType {
    AemCommand = 0,
    AemResponse = 1,
    AddressAccessCommand = 2,
    AddressAccessResponse = 3,
    VendorUniqueCommand = 6,
    VendorUniqueResponse = 7,
}

impl AecpMessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::AemCommand),
            1 => Some(Self::AemResponse),
            2 => Some(Self::AddressAccessCommand),
            3 => Some(Self::AddressAccessResponse),
            6 => Some(Self::VendorUniqueCommand),
            7 => Some(Self::VendorUniqueResponse),
            _ => None,
        }
    }

    pub fn is_command(&self) -> bool {
        matches!(
            self,
            Self::AemCommand | Self::AddressAccessCommand | Self::VendorUniqueCommand
        )
    }

    pub fn is_response(&self) -> bool {
        !self.is_command()
    }

    /// The response type a command of this type expects.
    pub fn response_type(&self) -> Option<Self> {
        match self {
            Self::AemCommand => Some(Self::AemResponse),
            Self::AddressAccessCommand => Some(Self::AddressAccessResponse),
            Self::VendorUniqueCommand => Some(Self::VendorUniqueResponse),
            _ => None,
        }
    }
}

/// AEM command type (IEEE 1722.1 Table 7.126)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AemCommandType(pub u16);

impl AemCommandType {
    pub const ACQUIRE_ENTITY: Self = Self(0x0000);
    pub const LOCK_ENTITY: Self = Self(0x0001);
    pub const ENTITY_AVAILABLE: Self = Self(0x0002);
    pub const CONTROLLER_AVAILABLE: Self = Self(0x0003);
    pub const READ_DESCRIPTOR: Self = Self(0x0004);
    pub const WRITE_DESCRIPTOR: Self = Self(0x0005);
    pub const SET_CONFIGURATION: Self = Self(0x0006);
    pub const GET_CONFIGURATION: Self = Self(0x0007);
    pub const SET_STREAM_FORMAT: Self = Self(0x0008);
    pub const GET_STREAM_FORMAT: Self = Self(0x0009);
    pub const SET_STREAM_INFO: Self = Self(0x000A);
    pub const GET_STREAM_INFO: Self = Self(0x000B);
    pub const SET_NAME: Self = Self(0x0010);
    pub const GET_NAME: Self = Self(0x0011);
    pub const SET_SAMPLING_RATE: Self = Self(0x0016);
    pub const GET_SAMPLING_RATE: Self = Self(0x0017);
    pub const SET_CLOCK_SOURCE: Self = Self(0x0018);
    pub const GET_CLOCK_SOURCE: Self = Self(0x0019);
    pub const START_STREAMING: Self = Self(0x0022);
    pub const STOP_STREAMING: Self = Self(0x0023);
    pub const REGISTER_UNSOLICITED_NOTIFICATION: Self = Self(0x0024);
    pub const DEREGISTER_UNSOLICITED_NOTIFICATION: Self = Self(0x0025);
    pub const GET_AVB_INFO: Self = Self(0x0027);
    pub const GET_COUNTERS: Self = Self(0x0029);
    pub const GET_AUDIO_MAP: Self = Self(0x002B);
    pub const ADD_AUDIO_MAPPINGS: Self = Self(0x002C);
    pub const REMOVE_AUDIO_MAPPINGS: Self = Self(0x002D);
}

/// Payload length constraint from the AEM size table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSize {
    Exact(usize),
    AtLeast(usize),
}

impl PayloadSize {
    pub fn accepts(&self, len: usize) -> bool {
        match self {
            Self::Exact(n) => len == *n,
            Self::AtLeast(n) => len >= *n,
        }
    }
}

/// Payload size table for AEM commands and responses (IEEE 1722.1 §7.4).
///
/// Returns `None` for command types this implementation does not
/// constrain; their payloads pass through unchecked.
pub fn aem_payload_size(
    message_type: AecpMessageType,
    command_type: AemCommandType,
) -> Option<PayloadSize> {
    use PayloadSize::{AtLeast, Exact};
    let command = matches!(message_type, AecpMessageType::AemCommand);
    Some(match command_type {
        AemCommandType::ACQUIRE_ENTITY | AemCommandType::LOCK_ENTITY => Exact(16),
        AemCommandType::ENTITY_AVAILABLE | AemCommandType::CONTROLLER_AVAILABLE => Exact(0),
        AemCommandType::READ_DESCRIPTOR => {
            if command {
                Exact(8)
            } else {
                AtLeast(8)
            }
        }
        AemCommandType::WRITE_DESCRIPTOR => AtLeast(8),
        AemCommandType::SET_CONFIGURATION => Exact(4),
        AemCommandType::GET_CONFIGURATION => {
            if command {
                Exact(0)
            } else {
                Exact(4)
            }
        }
        AemCommandType::SET_STREAM_FORMAT => Exact(12),
        AemCommandType::GET_STREAM_FORMAT => {
            if command {
                Exact(4)
            } else {
                Exact(12)
            }
        }
        AemCommandType::SET_STREAM_INFO => Exact(48),
        AemCommandType::GET_STREAM_INFO => {
            if command {
                Exact(4)
            } else {
                AtLeast(48)
            }
        }
        AemCommandType::SET_NAME => Exact(72),
        AemCommandType::GET_NAME => {
            if command {
                Exact(8)
            } else {
                Exact(72)
            }
        }
        AemCommandType::SET_SAMPLING_RATE | AemCommandType::SET_CLOCK_SOURCE => Exact(8),
        AemCommandType::GET_SAMPLING_RATE | AemCommandType::GET_CLOCK_SOURCE => {
            if command {
                Exact(4)
            } else {
                Exact(8)
            }
        }
        AemCommandType::START_STREAMING | AemCommandType::STOP_STREAMING => Exact(4),
        AemCommandType::REGISTER_UNSOLICITED_NOTIFICATION
        | AemCommandType::DEREGISTER_UNSOLICITED_NOTIFICATION => Exact(0),
        AemCommandType::GET_AVB_INFO => {
            if command {
                Exact(4)
            } else {
                AtLeast(20)
            }
        }
        AemCommandType::GET_COUNTERS => {
            if command {
                Exact(4)
            } else {
                Exact(136)
            }
        }
        AemCommandType::GET_AUDIO_MAP => {
            if command {
                Exact(8)
            } else {
                AtLeast(12)
            }
        }
        AemCommandType::ADD_AUDIO_MAPPINGS | AemCommandType::REMOVE_AUDIO_MAPPINGS => AtLeast(8),
        _ => return None,
    })
}

/// Receive-path relaxations for the AECP codec.
///
/// The strict default rejects every deviation from 1722.1.
#[derive(Debug, Clone, Copy, Default)]
pub struct AecpParseLimits {
    pub ignore_invalid_control_data_length: bool,
    pub allow_big_payloads: bool,
    pub ignore_invalid_non_success_aem_responses: bool,
}

impl From<&EngineConfig> for AecpParseLimits {
    fn from(config: &EngineConfig) -> Self {
        Self {
            ignore_invalid_control_data_length: config.ignore_invalid_control_data_length,
            allow_big_payloads: config.allow_recv_big_aecp_payloads,
            ignore_invalid_non_success_aem_responses: config
                .ignore_invalid_non_success_aem_responses,
        }
    }
}

/// AEM flavored AECPDU (IEEE 1722.1 §9.2.1.2)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AemAecpdu {
    pub message_type: AecpMessageType,
    /// Raw 5-bit wire status; decode with [`crate::AemCommandStatus::from_wire`].
    pub status: u8,
    pub target_entity_id: EntityId,
    pub controller_entity_id: EntityId,
    pub sequence_id: u16,
    /// The `u` bit: set on responses emitted without a matching command.
    pub unsolicited: bool,
    pub command_type: AemCommandType,
    pub payload: Bytes,
}

impl AemAecpdu {
    /// Build a command with unstamped controller/sequence fields; the
    /// engine fills those in at send time.
    pub fn command(target: EntityId, command_type: AemCommandType, payload: Bytes) -> Self {
        Self {
            message_type: AecpMessageType::AemCommand,
            status: 0,
            target_entity_id: target,
            controller_entity_id: EntityId::ZERO,
            sequence_id: 0,
            unsolicited: false,
            command_type,
            payload,
        }
    }

    /// Build the response to a received command, echoing its identity.
    pub fn response_to(command: &Self, status: u8, payload: Bytes) -> Self {
        Self {
            message_type: AecpMessageType::AemResponse,
            status,
            target_entity_id: command.target_entity_id,
            controller_entity_id: command.controller_entity_id,
            sequence_id: command.sequence_id,
            unsolicited: false,
            command_type: command.command_type,
            payload,
        }
    }

    fn control_data_length(&self) -> usize {
        10 + 2 + self.payload.len()
    }
}

/// Address Access TLV mode (IEEE 1722.1 Table 9.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AaMode {
    Read = 0,
    Write = 1,
    Execute = 2,
}

impl AaMode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Read),
            1 => Some(Self::Write),
            2 => Some(Self::Execute),
            _ => None,
        }
    }
}

/// One Address Access TLV.
///
/// `length` is the addressed byte count; `data` is empty in read
/// commands and carries `length` bytes everywhere else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AaTlv {
    pub mode: AaMode,
    pub address: u64,
    pub length: u16,
    pub data: Bytes,
}

impl AaTlv {
    pub fn read_request(address: u64, length: u16) -> Self {
        Self {
            mode: AaMode::Read,
            address,
            length,
            data: Bytes::new(),
        }
    }

    pub fn read_response(address: u64, data: Bytes) -> Self {
        Self {
            mode: AaMode::Read,
            address,
            length: data.len() as u16,
            data,
        }
    }

    pub fn write(address: u64, data: Bytes) -> Self {
        Self {
            mode: AaMode::Write,
            address,
            length: data.len() as u16,
            data,
        }
    }

    fn wire_size(&self) -> usize {
        10 + self.data.len()
    }

    fn parse(buf: &mut impl Buf, message_type: AecpMessageType) -> Option<Self> {
        if buf.remaining() < 10 {
            return None;
        }
        let mode_and_length = buf.get_u16();
        let mode = AaMode::from_u8((mode_and_length >> 12) as u8)?;
        let length = mode_and_length & 0x0FFF;
        let address = buf.get_u64();

        // A read command only names the region; the data travels in the
        // response.
        let carries_data =
            !(matches!(message_type, AecpMessageType::AddressAccessCommand) && mode == AaMode::Read);
        let data = if carries_data {
            if buf.remaining() < length as usize {
                return None;
            }
            buf.copy_to_bytes(length as usize)
        } else {
            Bytes::new()
        };
        Some(Self {
            mode,
            address,
            length,
            data,
        })
    }

    fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_u16(((self.mode as u16) << 12) | (self.length & 0x0FFF));
        buf.put_u64(self.address);
        buf.put_slice(&self.data);
    }
}

/// Address Access flavored AECPDU (IEEE 1722.1 §9.2.1.3)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AaAecpdu {
    pub message_type: AecpMessageType,
    pub status: u8,
    pub target_entity_id: EntityId,
    pub controller_entity_id: EntityId,
    pub sequence_id: u16,
    pub tlvs: Vec<AaTlv>,
}

impl AaAecpdu {
    pub fn command(target: EntityId, tlvs: Vec<AaTlv>) -> Self {
        Self {
            message_type: AecpMessageType::AddressAccessCommand,
            status: 0,
            target_entity_id: target,
            controller_entity_id: EntityId::ZERO,
            sequence_id: 0,
            tlvs,
        }
    }

    fn control_data_length(&self) -> usize {
        10 + 2 + self.tlvs.iter().map(AaTlv::wire_size).sum::<usize>()
    }
}

/// Milan Vendor Unique command type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MvuCommandType(pub u16);

impl MvuCommandType {
    pub const GET_MILAN_INFO: Self = Self(0x0000);
}

/// Milan Vendor Unique flavored AECPDU (Milan §5.4)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MvuAecpdu {
    pub message_type: AecpMessageType,
    pub status: u8,
    pub target_entity_id: EntityId,
    pub controller_entity_id: EntityId,
    pub sequence_id: u16,
    pub command_type: MvuCommandType,
    pub payload: Bytes,
}

impl MvuAecpdu {
    pub fn command(target: EntityId, command_type: MvuCommandType, payload: Bytes) -> Self {
        Self {
            message_type: AecpMessageType::VendorUniqueCommand,
            status: 0,
            target_entity_id: target,
            controller_entity_id: EntityId::ZERO,
            sequence_id: 0,
            command_type,
            payload,
        }
    }

    fn control_data_length(&self) -> usize {
        10 + 6 + 2 + self.payload.len()
    }
}

/// GET_MILAN_INFO response body (Milan §5.4.4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MilanInfo {
    pub protocol_version: u32,
    pub features_flags: u32,
    pub certification_version: u32,
}

impl MilanInfo {
    pub const SIZE: usize = 12;
    /// features_flags bit for redundant-stream support.
    pub const FEATURE_REDUNDANCY: u32 = 0x0000_0001;

    pub fn supports_redundancy(&self) -> bool {
        self.features_flags & Self::FEATURE_REDUNDANCY != 0
    }

    pub fn parse(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < Self::SIZE {
            return None;
        }
        Some(Self {
            protocol_version: buf.get_u32(),
            features_flags: buf.get_u32(),
            certification_version: buf.get_u32(),
        })
    }

    pub fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.protocol_version);
        buf.put_u32(self.features_flags);
        buf.put_u32(self.certification_version);
    }
}

/// Any AECPDU, dispatched by payload flavor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aecpdu {
    Aem(AemAecpdu),
    Aa(AaAecpdu),
    Mvu(MvuAecpdu),
}

impl Aecpdu {
    pub fn message_type(&self) -> AecpMessageType {
        match self {
            Self::Aem(pdu) => pdu.message_type,
            Self::Aa(pdu) => pdu.message_type,
            Self::Mvu(pdu) => pdu.message_type,
        }
    }

    pub fn target_entity_id(&self) -> EntityId {
        match self {
            Self::Aem(pdu) => pdu.target_entity_id,
            Self::Aa(pdu) => pdu.target_entity_id,
            Self::Mvu(pdu) => pdu.target_entity_id,
        }
    }

    pub fn controller_entity_id(&self) -> EntityId {
        match self {
            Self::Aem(pdu) => pdu.controller_entity_id,
            Self::Aa(pdu) => pdu.controller_entity_id,
            Self::Mvu(pdu) => pdu.controller_entity_id,
        }
    }

    pub fn sequence_id(&self) -> u16 {
        match self {
            Self::Aem(pdu) => pdu.sequence_id,
            Self::Aa(pdu) => pdu.sequence_id,
            Self::Mvu(pdu) => pdu.sequence_id,
        }
    }

    /// Raw 5-bit status field.
    pub fn status(&self) -> u8 {
        match self {
            Self::Aem(pdu) => pdu.status,
            Self::Aa(pdu) => pdu.status,
            Self::Mvu(pdu) => pdu.status,
        }
    }

    pub fn is_command(&self) -> bool {
        self.message_type().is_command()
    }

    pub fn is_response(&self) -> bool {
        self.message_type().is_response()
    }

    /// The `u` bit of an AEM response; other flavors have none.
    pub fn is_unsolicited(&self) -> bool {
        matches!(self, Self::Aem(pdu) if pdu.unsolicited && pdu.message_type.is_response())
    }

    /// Stamp the identity fields the engine owns at send time.
    pub(crate) fn stamp(&mut self, controller: EntityId, sequence_id: u16) {
        match self {
            Self::Aem(pdu) => {
                pdu.controller_entity_id = controller;
                pdu.sequence_id = sequence_id;
            }
            Self::Aa(pdu) => {
                pdu.controller_entity_id = controller;
                pdu.sequence_id = sequence_id;
            }
            Self::Mvu(pdu) => {
                pdu.controller_entity_id = controller;
                pdu.sequence_id = sequence_id;
            }
        }
    }

    fn control_data_length(&self) -> usize {
        match self {
            Self::Aem(pdu) => pdu.control_data_length(),
            Self::Aa(pdu) => pdu.control_data_length(),
            Self::Mvu(pdu) => pdu.control_data_length(),
        }
    }

    /// Serialized size without the Ethernet header.
    pub fn wire_size(&self) -> usize {
        AvtpControlHeader::SIZE + self.control_data_length()
    }

    pub fn parse(buf: &mut impl Buf, limits: &AecpParseLimits) -> Option<Self> {
        let header = AvtpControlHeader::parse(buf)?;
        if header.subtype != SUBTYPE_AECP {
            return None;
        }
        let message_type = AecpMessageType::from_u8(header.message_type)?;

        let declared = header.control_data_length as usize;
        if !limits.ignore_invalid_control_data_length && declared > buf.remaining() {
            return None;
        }
        if !limits.allow_big_payloads && AvtpControlHeader::SIZE + declared > AECP_MAX_SIZE {
            return None;
        }
        let body_len = declared.min(buf.remaining());
        if body_len < 10 {
            return None;
        }

        let target_entity_id = EntityId::new(header.id);
        let controller_entity_id = EntityId::new(buf.get_u64());
        let sequence_id = buf.get_u16();
        let mut rest = buf.copy_to_bytes(body_len - 10);

        match message_type {
            AecpMessageType::AemCommand | AecpMessageType::AemResponse => {
                if rest.remaining() < 2 {
                    return None;
                }
                let u_and_type = rest.get_u16();
                let unsolicited = u_and_type & 0x8000 != 0;
                let command_type = AemCommandType(u_and_type & 0x7FFF);
                let payload = rest.copy_to_bytes(rest.remaining());

                if let Some(size) = aem_payload_size(message_type, command_type) {
                    if !size.accepts(payload.len()) {
                        // A failure response may legally truncate its
                        // payload; keeping it is opt-in.
                        let tolerated = limits.ignore_invalid_non_success_aem_responses
                            && message_type == AecpMessageType::AemResponse
                            && header.status != 0;
                        if !tolerated && !limits.ignore_invalid_control_data_length {
                            return None;
                        }
                    }
                }

                Some(Self::Aem(AemAecpdu {
                    message_type,
                    status: header.status,
                    target_entity_id,
                    controller_entity_id,
                    sequence_id,
                    unsolicited,
                    command_type,
                    payload,
                }))
            }
            AecpMessageType::AddressAccessCommand | AecpMessageType::AddressAccessResponse => {
                if rest.remaining() < 2 {
                    return None;
                }
                let tlv_count = rest.get_u16();
                let mut tlvs = Vec::with_capacity(tlv_count as usize);
                for _ in 0..tlv_count {
                    tlvs.push(AaTlv::parse(&mut rest, message_type)?);
                }
                Some(Self::Aa(AaAecpdu {
                    message_type,
                    status: header.status,
                    target_entity_id,
                    controller_entity_id,
                    sequence_id,
                    tlvs,
                }))
            }
            AecpMessageType::VendorUniqueCommand | AecpMessageType::VendorUniqueResponse => {
                if rest.remaining() < 8 {
                    return None;
                }
                let mut protocol_id = [0u8; 6];
                rest.copy_to_slice(&mut protocol_id);
                if protocol_id != MILAN_PROTOCOL_ID {
                    return None;
                }
                let command_type = MvuCommandType(rest.get_u16() & 0x7FFF);
                let payload = rest.copy_to_bytes(rest.remaining());
                Some(Self::Mvu(MvuAecpdu {
                    message_type,
                    status: header.status,
                    target_entity_id,
                    controller_entity_id,
                    sequence_id,
                    command_type,
                    payload,
                }))
            }
        }
    }

    pub fn serialize(&self, buf: &mut impl BufMut) {
        let header = AvtpControlHeader {
            subtype: SUBTYPE_AECP,
            message_type: self.message_type() as u8,
            status: self.status(),
            control_data_length: self.control_data_length() as u16,
            id: self.target_entity_id().value(),
        };
        header.serialize(buf);
        buf.put_u64(self.controller_entity_id().value());
        buf.put_u16(self.sequence_id());
        match self {
            Self::Aem(pdu) => {
                let unsolicited = if pdu.unsolicited { 0x8000 } else { 0 };
                buf.put_u16(unsolicited | (pdu.command_type.0 & 0x7FFF));
                buf.put_slice(&pdu.payload);
            }
            Self::Aa(pdu) => {
                buf.put_u16(pdu.tlvs.len() as u16);
                for tlv in &pdu.tlvs {
                    tlv.serialize(buf);
                }
            }
            Self::Mvu(pdu) => {
                buf.put_slice(&MILAN_PROTOCOL_ID);
                buf.put_u16(pdu.command_type.0 & 0x7FFF);
                buf.put_slice(&pdu.payload);
            }
        }
    }
}

// ============================================================================
// ACMP
// ============================================================================

/// ACMP message types (IEEE 1722.1 Table 8.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AcmpMessageType {
    ConnectTxCommand = 0,
    ConnectTxResponse = 1,
    DisconnectTxCommand = 2,
    DisconnectTxResponse = 3,
    GetTxStateCommand = 4,
    GetTxStateResponse = 5,
    ConnectRxCommand = 6,
    ConnectRxResponse = 7,
    DisconnectRxCommand = 8,
    DisconnectRxResponse = 9,
    GetRxStateCommand = 10,
    GetRxStateResponse = 11,
    GetTxConnectionCommand = 12,
    GetTxConnectionResponse = 13,
}

impl AcmpMessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::ConnectTxCommand),
            1 => Some(Self::ConnectTxResponse),
            2 => Some(Self::DisconnectTxCommand),
            3 => Some(Self::DisconnectTxResponse),
            4 => Some(Self::GetTxStateCommand),
            5 => Some(Self::GetTxStateResponse),
            6 => Some(Self::ConnectRxCommand),
            7 => Some(Self::ConnectRxResponse),
            8 => Some(Self::DisconnectRxCommand),
            9 => Some(Self::DisconnectRxResponse),
            10 => Some(Self::GetRxStateCommand),
            11 => Some(Self::GetRxStateResponse),
            12 => Some(Self::GetTxConnectionCommand),
            13 => Some(Self::GetTxConnectionResponse),
            _ => None,
        }
    }

    /// Commands are even, responses odd.
    pub fn is_command(&self) -> bool {
        (*self as u8) % 2 == 0
    }

    pub fn is_response(&self) -> bool {
        !self.is_command()
    }

    /// The response type a command of this type expects.
    pub fn response_type(&self) -> Option<Self> {
        if self.is_command() {
            Self::from_u8(*self as u8 + 1)
        } else {
            None
        }
    }
}

/// ACMP flags field (IEEE 1722.1 Table 8.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionFlags(pub u16);

impl ConnectionFlags {
    pub const CLASS_B: u16 = 0x0001;
    pub const FAST_CONNECT: u16 = 0x0002;
    pub const SAVED_STATE: u16 = 0x0004;
    pub const STREAMING_WAIT: u16 = 0x0008;
    pub const SUPPORTS_ENCRYPTED: u16 = 0x0010;
    pub const ENCRYPTED_PDU: u16 = 0x0020;
    pub const TALKER_FAILED: u16 = 0x0040;

    pub const fn new(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn contains(&self, flag: u16) -> bool {
        self.0 & flag == flag
    }
}

/// A parsed ACMP PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acmpdu {
    pub message_type: AcmpMessageType,
    /// Raw 5-bit wire status; decode with [`Acmpdu::acmp_status`].
    pub status: u8,
    pub stream_id: u64,
    pub controller_entity_id: EntityId,
    pub talker_entity_id: EntityId,
    pub listener_entity_id: EntityId,
    pub talker_unique_id: u16,
    pub listener_unique_id: u16,
    pub stream_dest_mac: MacAddress,
    pub connection_count: u16,
    pub sequence_id: u16,
    pub flags: ConnectionFlags,
    pub stream_vlan_id: u16,
}

impl Acmpdu {
    pub const CONTROL_DATA_LENGTH: u16 = 44;
    /// Serialized size without the Ethernet header.
    pub const SIZE: usize = AvtpControlHeader::SIZE + Self::CONTROL_DATA_LENGTH as usize;

    /// Build a command for a talker/listener stream pair; the engine
    /// stamps `controller_entity_id` and `sequence_id` at send time.
    pub fn command(
        message_type: AcmpMessageType,
        talker: StreamIdentification,
        listener: StreamIdentification,
    ) -> Self {
        Self {
            message_type,
            status: 0,
            stream_id: 0,
            controller_entity_id: EntityId::ZERO,
            talker_entity_id: talker.entity_id,
            listener_entity_id: listener.entity_id,
            talker_unique_id: talker.stream_index,
            listener_unique_id: listener.stream_index,
            stream_dest_mac: MacAddress::default(),
            connection_count: 0,
            sequence_id: 0,
            flags: ConnectionFlags::default(),
            stream_vlan_id: 0,
        }
    }

    pub fn talker_stream(&self) -> StreamIdentification {
        StreamIdentification::new(self.talker_entity_id, self.talker_unique_id)
    }

    pub fn listener_stream(&self) -> StreamIdentification {
        StreamIdentification::new(self.listener_entity_id, self.listener_unique_id)
    }

    pub fn acmp_status(&self) -> AcmpStatus {
        AcmpStatus::from_wire(self.status)
    }

    pub(crate) fn stamp(&mut self, controller: EntityId, sequence_id: u16) {
        self.controller_entity_id = controller;
        self.sequence_id = sequence_id;
    }

    pub fn parse(buf: &mut impl Buf) -> Option<Self> {
        let header = AvtpControlHeader::parse(buf)?;
        if header.subtype != SUBTYPE_ACMP {
            return None;
        }
        if header.control_data_length != Self::CONTROL_DATA_LENGTH {
            return None;
        }
        if buf.remaining() < Self::CONTROL_DATA_LENGTH as usize {
            return None;
        }
        let message_type = AcmpMessageType::from_u8(header.message_type)?;

        let controller_entity_id = EntityId::new(buf.get_u64());
        let talker_entity_id = EntityId::new(buf.get_u64());
        let listener_entity_id = EntityId::new(buf.get_u64());
        let talker_unique_id = buf.get_u16();
        let listener_unique_id = buf.get_u16();
        let mut mac = [0u8; 6];
        buf.copy_to_slice(&mut mac);
        let connection_count = buf.get_u16();
        let sequence_id = buf.get_u16();
        let flags = ConnectionFlags::new(buf.get_u16());
        let stream_vlan_id = buf.get_u16();
        buf.advance(2); // reserved

        Some(Self {
            message_type,
            status: header.status,
            stream_id: header.id,
            controller_entity_id,
            talker_entity_id,
            listener_entity_id,
            talker_unique_id,
            listener_unique_id,
            stream_dest_mac: MacAddress::new(mac),
            connection_count,
            sequence_id,
            flags,
            stream_vlan_id,
        })
    }

    pub fn serialize(&self, buf: &mut impl BufMut) {
        let header = AvtpControlHeader {
            subtype: SUBTYPE_ACMP,
            message_type: self.message_type as u8,
            status: self.status,
            control_data_length: Self::CONTROL_DATA_LENGTH,
            id: self.stream_id,
        };
        header.serialize(buf);
        buf.put_u64(self.controller_entity_id.value());
        buf.put_u64(self.talker_entity_id.value());
        buf.put_u64(self.listener_entity_id.value());
        buf.put_u16(self.talker_unique_id);
        buf.put_u16(self.listener_unique_id);
        buf.put_slice(&self.stream_dest_mac.octets());
        buf.put_u16(self.connection_count);
        buf.put_u16(self.sequence_id);
        buf.put_u16(self.flags.0);
        buf.put_u16(self.stream_vlan_id);
        buf.put_bytes(0, 2); // reserved
    }
}

// ============================================================================
// FRAME-LEVEL DISPATCH
// ============================================================================

/// Any AVDECC PDU, tagged by sub-protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pdu {
    Adp(Adpdu),
    Aecp(Aecpdu),
    Acmp(Acmpdu),
}

/// Parse a complete Ethernet frame into its AVDECC PDU.
///
/// Returns `None` for non-AVDECC ethertypes and for any PDU the codec
/// rejects.
pub fn parse_frame(frame: &[u8], limits: &AecpParseLimits) -> Option<(EthernetHeader, Pdu)> {
    let mut buf = frame;
    let ethernet = EthernetHeader::parse(&mut buf)?;
    if ethernet.ethertype != AVDECC_ETHERTYPE {
        return None;
    }
    if buf.remaining() < 1 {
        return None;
    }
    let subtype = buf.chunk()[0] & 0x7F;
    let pdu = match subtype {
        SUBTYPE_ADP => Pdu::Adp(Adpdu::parse(&mut buf)?),
        SUBTYPE_AECP => Pdu::Aecp(Aecpdu::parse(&mut buf, limits)?),
        SUBTYPE_ACMP => Pdu::Acmp(Acmpdu::parse(&mut buf)?),
        _ => return None,
    };
    Some((ethernet, pdu))
}

/// Serialize a PDU into a complete Ethernet frame.
pub fn serialize_frame(dst: MacAddress, src: MacAddress, pdu: &Pdu) -> Bytes {
    let mut buf = BytesMut::with_capacity(EthernetHeader::SIZE + 68);
    EthernetHeader::avdecc(dst, src).serialize(&mut buf);
    match pdu {
        Pdu::Adp(adpdu) => adpdu.serialize(&mut buf),
        Pdu::Aecp(aecpdu) => aecpdu.serialize(&mut buf),
        Pdu::Acmp(acmpdu) => acmpdu.serialize(&mut buf),
    }
    buf.freeze()
}

// ============================================================================
// AEM DESCRIPTOR PAYLOADS
// ============================================================================

/// AEM descriptor types (IEEE 1722.1 Table 7.1), the subset the
/// controller role reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorType(pub u16);

impl DescriptorType {
    pub const ENTITY: Self = Self(0x0000);
    pub const CONFIGURATION: Self = Self(0x0001);
    pub const AUDIO_UNIT: Self = Self(0x0002);
    pub const STREAM_INPUT: Self = Self(0x0005);
    pub const STREAM_OUTPUT: Self = Self(0x0006);
    pub const AVB_INTERFACE: Self = Self(0x0009);
    pub const CLOCK_SOURCE: Self = Self(0x000A);
    pub const LOCALE: Self = Self(0x000C);
    pub const STRINGS: Self = Self(0x000D);
    pub const CLOCK_DOMAIN: Self = Self(0x0024);
}

/// 64-byte padded UTF-8 string used throughout the entity model.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AvdeccFixedString(pub [u8; 64]);

impl AvdeccFixedString {
    pub fn new(text: &str) -> Self {
        let mut bytes = [0u8; 64];
        let len = text.len().min(64);
        bytes[..len].copy_from_slice(&text.as_bytes()[..len]);
        Self(bytes)
    }

    /// The string up to the first NUL, lossily decoded.
    pub fn to_string_lossy(&self) -> String {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(64);
        String::from_utf8_lossy(&self.0[..end]).into_owned()
    }
}

impl Default for AvdeccFixedString {
    fn default() -> Self {
        Self([0; 64])
    }
}

impl std::fmt::Debug for AvdeccFixedString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.to_string_lossy())
    }
}

/// READ_DESCRIPTOR command payload (IEEE 1722.1 §7.4.5.1), 8 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadDescriptorCommand {
    pub configuration_index: u16,
    pub descriptor_type: DescriptorType,
    pub descriptor_index: u16,
}

impl ReadDescriptorCommand {
    pub const SIZE: usize = 8;

    pub fn new(
        configuration_index: u16,
        descriptor_type: DescriptorType,
        descriptor_index: u16,
    ) -> Self {
        Self {
            configuration_index,
            descriptor_type,
            descriptor_index,
        }
    }

    pub fn parse(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < Self::SIZE {
            return None;
        }
        let configuration_index = buf.get_u16();
        buf.advance(2); // reserved
        let descriptor_type = DescriptorType(buf.get_u16());
        let descriptor_index = buf.get_u16();
        Some(Self {
            configuration_index,
            descriptor_type,
            descriptor_index,
        })
    }

    pub fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_u16(self.configuration_index);
        buf.put_u16(0); // reserved
        buf.put_u16(self.descriptor_type.0);
        buf.put_u16(self.descriptor_index);
    }

    pub fn to_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        self.serialize(&mut buf);
        buf.freeze()
    }
}

/// ENTITY descriptor (IEEE 1722.1 Table 7.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    pub entity_id: EntityId,
    pub entity_model_id: EntityId,
    pub entity_capabilities: EntityCapabilities,
    pub talker_stream_sources: u16,
    pub talker_capabilities: TalkerCapabilities,
    pub listener_stream_sinks: u16,
    pub listener_capabilities: ListenerCapabilities,
    pub controller_capabilities: ControllerCapabilities,
    pub available_index: u32,
    pub association_id: EntityId,
    pub entity_name: AvdeccFixedString,
    pub vendor_name_string: u16,
    pub model_name_string: u16,
    pub firmware_version: AvdeccFixedString,
    pub group_name: AvdeccFixedString,
    pub serial_number: AvdeccFixedString,
    pub configurations_count: u16,
    pub current_configuration: u16,
}

impl EntityDescriptor {
    /// Size of the descriptor body, excluding the 4-byte
    /// descriptor_type/descriptor_index prefix.
    pub const SIZE: usize = 308;

    pub fn parse(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < Self::SIZE {
            return None;
        }
        let entity_id = EntityId::new(buf.get_u64());
        let entity_model_id = EntityId::new(buf.get_u64());
        let entity_capabilities = EntityCapabilities::new(buf.get_u32());
        let talker_stream_sources = buf.get_u16();
        let talker_capabilities = TalkerCapabilities::new(buf.get_u16());
        let listener_stream_sinks = buf.get_u16();
        let listener_capabilities = ListenerCapabilities::new(buf.get_u16());
        let controller_capabilities = ControllerCapabilities::new(buf.get_u32());
        let available_index = buf.get_u32();
        let association_id = EntityId::new(buf.get_u64());
        let mut entity_name = [0u8; 64];
        buf.copy_to_slice(&mut entity_name);
        let vendor_name_string = buf.get_u16();
        let model_name_string = buf.get_u16();
        let mut firmware_version = [0u8; 64];
        buf.copy_to_slice(&mut firmware_version);
        let mut group_name = [0u8; 64];
        buf.copy_to_slice(&mut group_name);
        let mut serial_number = [0u8; 64];
        buf.copy_to_slice(&mut serial_number);
        let configurations_count = buf.get_u16();
        let current_configuration = buf.get_u16();

        Some(Self {
            entity_id,
            entity_model_id,
            entity_capabilities,
            talker_stream_sources,
            talker_capabilities,
            listener_stream_sinks,
            listener_capabilities,
            controller_capabilities,
            available_index,
            association_id,
            entity_name: AvdeccFixedString(entity_name),
            vendor_name_string,
            model_name_string,
            firmware_version: AvdeccFixedString(firmware_version),
            group_name: AvdeccFixedString(group_name),
            serial_number: AvdeccFixedString(serial_number),
            configurations_count,
            current_configuration,
        })
    }

    pub fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_u64(self.entity_id.value());
        buf.put_u64(self.entity_model_id.value());
        buf.put_u32(self.entity_capabilities.0);
        buf.put_u16(self.talker_stream_sources);
        buf.put_u16(self.talker_capabilities.0);
        buf.put_u16(self.listener_stream_sinks);
        buf.put_u16(self.listener_capabilities.0);
        buf.put_u32(self.controller_capabilities.0);
        buf.put_u32(self.available_index);
        buf.put_u64(self.association_id.value());
        buf.put_slice(&self.entity_name.0);
        buf.put_u16(self.vendor_name_string);
        buf.put_u16(self.model_name_string);
        buf.put_slice(&self.firmware_version.0);
        buf.put_slice(&self.group_name.0);
        buf.put_slice(&self.serial_number.0);
        buf.put_u16(self.configurations_count);
        buf.put_u16(self.current_configuration);
    }
}

/// Decode a READ_DESCRIPTOR response payload into its entity descriptor.
///
/// Returns `None` unless the payload carries an ENTITY descriptor.
pub fn parse_entity_descriptor_response(payload: &Bytes) -> Option<(u16, EntityDescriptor)> {
    let mut buf = &payload[..];
    if buf.remaining() < 8 {
        return None;
    }
    let configuration_index = buf.get_u16();
    buf.advance(2); // reserved
    let descriptor_type = DescriptorType(buf.get_u16());
    let _descriptor_index = buf.get_u16();
    if descriptor_type != DescriptorType::ENTITY {
        return None;
    }
    let descriptor = EntityDescriptor::parse(&mut buf)?;
    Some((configuration_index, descriptor))
}

/// Encode a READ_DESCRIPTOR response payload for an entity descriptor.
pub fn build_entity_descriptor_response(
    configuration_index: u16,
    descriptor: &EntityDescriptor,
) -> Bytes {
    let mut buf = BytesMut::with_capacity(8 + EntityDescriptor::SIZE);
    buf.put_u16(configuration_index);
    buf.put_u16(0); // reserved
    buf.put_u16(DescriptorType::ENTITY.0);
    buf.put_u16(0); // descriptor_index
    descriptor.serialize(&mut buf);
    buf.freeze()
}

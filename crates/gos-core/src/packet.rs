//! # Packet model
//!
//! The scheduler only needs a handful of header fields from a packet, exposed
//! through [`GosPacket`]. [`SimPacket`] is the reference implementation used by
//! the simulation harness and the tests.

use serde::{Deserialize, Serialize};

/// MPLS top label reserved for GoS-marked traffic.
pub const GOS_RESERVED_LABEL: u32 = 1;

/// Protocol family of a packet, as far as classification is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketKind {
    /// Label distribution signalling.
    Signalling,
    /// Store-and-retransmit request.
    RetransmissionRequest,
    /// Resource reservation signalling.
    Reservation,
    Mpls,
    Ipv4,
    Other,
}

/// Header accessors consumed by the classifier and the EPCD admission check.
///
/// Only the accessors matching [`GosPacket::kind`] are consulted; the defaults
/// cover every other kind.
pub trait GosPacket: Send + 'static {
    /// Size on the wire, in bytes.
    fn size(&self) -> usize;
    fn kind(&self) -> PacketKind;

    fn top_label_is_reserved(&self) -> bool {
        false
    }

    /// EXP bits of the top label, `0..=7`.
    fn exp_field(&self) -> u8 {
        0
    }

    fn has_gos_options(&self) -> bool {
        false
    }

    /// GoS field carried in the IPv4 options, `0..=7`.
    fn gos_level(&self) -> u8 {
        0
    }

    /// MPLS data packet travelling under the reserved GoS label.
    fn is_gos_marked(&self) -> bool {
        self.kind() == PacketKind::Mpls && self.top_label_is_reserved()
    }
}

// ─── GoS level encoding ─────────────────────────────────────────────────────

/// Requested GoS level as carried in the 3-bit EXP / options field.
///
/// Values `0..=3` request levels 0 to 3 without a backup LSP, values `4..=7`
/// the same levels with a backup LSP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GosLevel {
    pub level: u8,
    pub backup: bool,
}

impl GosLevel {
    pub const MAX_LEVEL: u8 = 3;

    /// Decodes the 3-bit field. Bits above the low three are ignored.
    pub const fn from_field(field: u8) -> Self {
        let field = field & 0b111;
        GosLevel {
            level: field & 0b011,
            backup: field & 0b100 != 0,
        }
    }

    pub const fn to_field(self) -> u8 {
        (self.level & 0b011) | if self.backup { 0b100 } else { 0 }
    }
}

// ─── Reference packet ───────────────────────────────────────────────────────

/// One entry of an MPLS label stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MplsLabel {
    pub label: u32,
    pub exp: u8,
    pub bottom_of_stack: bool,
    pub ttl: u8,
}

impl MplsLabel {
    pub fn new(label: u32, exp: u8) -> Self {
        MplsLabel {
            label,
            exp: exp & 0b111,
            bottom_of_stack: true,
            ttl: 64,
        }
    }

    /// Label under the reserved GoS value carrying the given level.
    pub fn gos(level: GosLevel) -> Self {
        MplsLabel::new(GOS_RESERVED_LABEL, level.to_field())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PacketBody {
    Signalling,
    RetransmissionRequest { lost_packet: u64, port: usize },
    Reservation,
    /// Label stack, top label first.
    Mpls { labels: Vec<MplsLabel> },
    Ipv4 { gos_options: Option<u8> },
    Other,
}

/// Simulated packet: an identifier, a wire size and the relevant headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimPacket {
    pub id: u64,
    pub size: usize,
    pub body: PacketBody,
}

impl SimPacket {
    pub fn new(id: u64, size: usize, body: PacketBody) -> Self {
        SimPacket { id, size, body }
    }

    pub fn signalling(id: u64, size: usize) -> Self {
        SimPacket::new(id, size, PacketBody::Signalling)
    }

    pub fn reservation(id: u64, size: usize) -> Self {
        SimPacket::new(id, size, PacketBody::Reservation)
    }

    pub fn retransmission_request(id: u64, size: usize, lost_packet: u64, port: usize) -> Self {
        SimPacket::new(
            id,
            size,
            PacketBody::RetransmissionRequest { lost_packet, port },
        )
    }

    /// MPLS packet under the reserved GoS label.
    pub fn mpls_gos(id: u64, size: usize, level: GosLevel) -> Self {
        SimPacket::new(
            id,
            size,
            PacketBody::Mpls {
                labels: vec![MplsLabel::gos(level)],
            },
        )
    }

    /// MPLS packet under an ordinary label.
    pub fn mpls(id: u64, size: usize, label: u32, exp: u8) -> Self {
        SimPacket::new(
            id,
            size,
            PacketBody::Mpls {
                labels: vec![MplsLabel::new(label, exp)],
            },
        )
    }

    pub fn ipv4(id: u64, size: usize, gos: Option<GosLevel>) -> Self {
        SimPacket::new(
            id,
            size,
            PacketBody::Ipv4 {
                gos_options: gos.map(GosLevel::to_field),
            },
        )
    }

    pub fn other(id: u64, size: usize) -> Self {
        SimPacket::new(id, size, PacketBody::Other)
    }

    fn top_label(&self) -> Option<&MplsLabel> {
        match &self.body {
            PacketBody::Mpls { labels } => labels.first(),
            _ => None,
        }
    }
}

impl GosPacket for SimPacket {
    fn size(&self) -> usize {
        self.size
    }

    fn kind(&self) -> PacketKind {
        match self.body {
            PacketBody::Signalling => PacketKind::Signalling,
            PacketBody::RetransmissionRequest { .. } => PacketKind::RetransmissionRequest,
            PacketBody::Reservation => PacketKind::Reservation,
            PacketBody::Mpls { .. } => PacketKind::Mpls,
            PacketBody::Ipv4 { .. } => PacketKind::Ipv4,
            PacketBody::Other => PacketKind::Other,
        }
    }

    fn top_label_is_reserved(&self) -> bool {
        self.top_label()
            .is_some_and(|l| l.label == GOS_RESERVED_LABEL)
    }

    fn exp_field(&self) -> u8 {
        self.top_label().map_or(0, |l| l.exp & 0b111)
    }

    fn has_gos_options(&self) -> bool {
        matches!(
            self.body,
            PacketBody::Ipv4 {
                gos_options: Some(_)
            }
        )
    }

    fn gos_level(&self) -> u8 {
        match self.body {
            PacketBody::Ipv4 {
                gos_options: Some(field),
            } => field & 0b111,
            _ => 0,
        }
    }
}

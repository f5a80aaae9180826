//! Packet → priority mapping.
//!
//! The table is the contract between the data-plane marking scheme and the
//! scheduler:
//!
//! | packet                                   | priority |
//! |------------------------------------------|----------|
//! | label distribution signalling            | 10       |
//! | retransmission request                   | 9        |
//! | reservation signalling                   | 8        |
//! | MPLS under the reserved label, EXP field | 0..=7    |
//! | IPv4 with GoS options, GoS field         | 0..=7    |
//! | anything else                            | 0        |
//!
//! For the 3-bit field: level 3 + backup → 7, level 3 → 6, level 2 + backup
//! → 5, level 2 → 4, level 1 + backup → 3, level 1 → 2, level 0 + backup → 1,
//! level 0 → 0.

use crate::packet::{GosLevel, GosPacket, PacketKind};
use crate::priority::Priority;

/// Priority for a decoded GoS level.
pub const fn priority_for_gos(level: GosLevel) -> Priority {
    let lvl = if level.level > GosLevel::MAX_LEVEL {
        GosLevel::MAX_LEVEL
    } else {
        level.level
    };
    Priority::from_index((lvl * 2 + level.backup as u8) as usize)
}

/// Priority for a raw 3-bit EXP / GoS options field.
pub const fn priority_for_field(field: u8) -> Priority {
    priority_for_gos(GosLevel::from_field(field))
}

pub fn classify<P: GosPacket + ?Sized>(packet: &P) -> Priority {
    match packet.kind() {
        PacketKind::Signalling => Priority::SIGNALLING,
        PacketKind::RetransmissionRequest => Priority::RETRANSMISSION_REQUEST,
        PacketKind::Reservation => Priority::RESERVATION,
        PacketKind::Mpls if packet.top_label_is_reserved() => {
            priority_for_field(packet.exp_field())
        }
        PacketKind::Ipv4 if packet.has_gos_options() => priority_for_field(packet.gos_level()),
        PacketKind::Mpls | PacketKind::Ipv4 | PacketKind::Other => Priority::BEST_EFFORT,
    }
}

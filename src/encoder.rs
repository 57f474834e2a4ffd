//! Landmark set -> outbound OSC messages.
//!
//! For every landmark in index order: `/pose/<joint>/position` (x, y, z)
//! and, when visibility is known, `/pose/<joint>/visibility`. Then one
//! `/pose/all` carrying x, y, z of every landmark.

use crate::osc::OscCommand;
use crate::pose::{joint_name, LandmarkSet};

pub const ADDRESS_PREFIX: &str = "/pose";
pub const ALL_POSITIONS_ADDRESS: &str = "/pose/all";

pub fn position_address(index: usize) -> String {
    format!("{}/{}/position", ADDRESS_PREFIX, joint_name(index))
}

pub fn visibility_address(index: usize) -> String {
    format!("{}/{}/visibility", ADDRESS_PREFIX, joint_name(index))
}

/// Deterministic fan-out, one entry per datagram.
pub fn encode_landmarks(set: &LandmarkSet) -> Vec<OscCommand> {
    let mut commands = Vec::with_capacity(set.len() * 2 + 1);

    for (index, lm) in set.iter().enumerate() {
        commands.push(OscCommand::floats(position_address(index), [lm.x, lm.y, lm.z]));
        if let Some(visibility) = lm.visibility {
            commands.push(OscCommand::floats(visibility_address(index), [visibility]));
        }
    }

    commands.push(OscCommand::floats(
        ALL_POSITIONS_ADDRESS,
        set.iter().flat_map(|lm| [lm.x, lm.y, lm.z]),
    ));
    commands
}

/// Telemetry count for one sent frame: one per landmark (its position and
/// visibility together) plus `/pose/all`.
pub fn message_count(set: &LandmarkSet) -> usize {
    set.len() + 1
}

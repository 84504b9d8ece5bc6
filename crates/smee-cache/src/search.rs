//! Lookups over the resident issue set.

use std::collections::HashMap;

use smee_core::types::Issue;

/// Finds the room's active issue in the resident map, if any.
///
/// The resident set is small (active issues only), so a linear scan is
/// fine here.
pub(crate) fn active_room_issue<'a>(
    issues: &'a HashMap<String, Issue>,
    room_id: &str,
) -> Option<&'a Issue> {
    issues
        .values()
        .find(|issue| issue.active() && issue.room.id == room_id)
}

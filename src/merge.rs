use crate::answers::{Normalized, Vector84};

/// Whether merge applies. A submission without answers never wipes a stored vector.
pub fn effective_merge(existing: Option<&Vector84>, incoming: &Normalized, merge_requested: bool) -> bool {
    merge_requested || (!incoming.has_incoming && existing.is_some())
}

/// Final answer vector for a submission.
///
/// In merge mode only the slots the caller actually supplied overwrite the stored
/// vector; in replace mode the normalized incoming vector is taken as-is.
pub fn resolve_answers(existing: Option<&Vector84>, incoming: &Normalized, merge_requested: bool) -> Vector84 {
    match existing {
        Some(stored) if effective_merge(existing, incoming, merge_requested) => {
            let mut resolved = *stored;
            for slot in incoming.supplied_slots() {
                resolved.set(slot, incoming.values.get(slot));
            }
            resolved
        }
        _ => incoming.values,
    }
}

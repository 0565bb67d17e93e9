//! Deterministic row-lock ordering

use crate::types::RecordId;

/// Order in which the rows of two accounts must be locked
///
/// The smaller ID always comes first, whichever direction the money moves.
/// Two transfers between the same pair of accounts therefore request their
/// locks in the same sequence and can never wait on each other in a cycle.
pub fn lock_order(a: RecordId, b: RecordId) -> (RecordId, RecordId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

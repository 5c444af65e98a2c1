//! Slot naming
//!
//! Slots are addressed by a two-digit number. The directory name, the slot
//! name stored in the pool document, and the placeholder branch that keeps an
//! idle worktree checked out are all derived from that number.

/// Prefix shared by every managed slot name
pub const SLOT_PREFIX: &str = "erk-managed-wt-";

/// Largest pool a two-digit slot suffix can address
pub const MAX_POOL_SIZE: u32 = 99;

const PLACEHOLDER_PREFIX: &str = "__erk-slot-";
const PLACEHOLDER_SUFFIX: &str = "-placeholder__";

/// Slot name for slot number `n`, e.g. `erk-managed-wt-03`
pub fn generate_slot_name(n: u32) -> String {
    format!("{SLOT_PREFIX}{n:02}")
}

/// The two-digit suffix of a slot name, or `None` if `name` is not a slot name
pub fn extract_slot_number(name: &str) -> Option<&str> {
    let suffix = name.strip_prefix(SLOT_PREFIX)?;
    if suffix.len() == 2 && suffix.bytes().all(|b| b.is_ascii_digit()) {
        Some(suffix)
    } else {
        None
    }
}

/// Numeric slot number of a slot name
pub fn slot_number(name: &str) -> Option<u32> {
    extract_slot_number(name).and_then(|s| s.parse().ok())
}

/// True if `name` has the shape of a slot name
pub fn is_slot_name(name: &str) -> bool {
    extract_slot_number(name).is_some()
}

/// Disposable branch kept checked out in an idle slot, e.g. `__erk-slot-03-placeholder__`
pub fn placeholder_branch_name(slot_name: &str) -> Option<String> {
    extract_slot_number(slot_name).map(|nn| format!("{PLACEHOLDER_PREFIX}{nn}{PLACEHOLDER_SUFFIX}"))
}

/// True if `branch` is a slot placeholder branch
pub fn is_placeholder_branch(branch: &str) -> bool {
    branch
        .strip_prefix(PLACEHOLDER_PREFIX)
        .and_then(|rest| rest.strip_suffix(PLACEHOLDER_SUFFIX))
        .is_some_and(|nn| nn.len() == 2 && nn.bytes().all(|b| b.is_ascii_digit()))
}

//! Identifier construction/parsing and the name-discipline rule (spec §3
//! invariant 1, §4.3 step 3).

use rand::RngCore;

/// `workflow_id = "{name}-{job_id}"` (spec §3 invariant 1).
pub fn construct_workflow_id(workflow_name: &str, job_id: u64) -> String {
    format!("{workflow_name}-{job_id}")
}

/// Splits a `workflow_id` back into `(name, job_id)`. The name may itself
/// contain hyphens, so this splits on the last `-` followed only by digits.
pub fn deconstruct_workflow_id(workflow_id: &str) -> Option<(String, u64)> {
    let dash = workflow_id.rfind('-')?;
    let (name, rest) = workflow_id.split_at(dash);
    let job_id: u64 = rest[1..].parse().ok()?;
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), job_id))
}

/// A synthetic job identifier for a forced cancellation (spec §4.6, §8 scenario 8).
pub fn force_cancel_job_id(workflow_uuid: &str) -> String {
    format!("{workflow_uuid}-{}-force-cancel", generate_unique_id(6))
}

/// Generates a random lowercase-hex identifier of `num_hex_chars` characters.
/// With no argument-equivalent default (32), this mirrors the opaque 32-hex
/// IDs used throughout the data model (spec §3).
pub fn generate_unique_id(num_hex_chars: usize) -> String {
    let num_bytes = num_hex_chars.div_ceil(2);
    let mut bytes = vec![0u8; num_bytes];
    rand::thread_rng().fill_bytes(&mut bytes);
    let mut hex = hex::encode(bytes);
    hex.truncate(num_hex_chars);
    hex
}

/// Task/group name discipline: `[a-zA-Z]([a-zA-Z0-9_-]*[a-zA-Z0-9])?` (spec §4.3 step 3).
pub fn is_valid_token_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    if bytes.is_empty() || !bytes[0].is_ascii_alphabetic() {
        return false;
    }
    if bytes.len() == 1 {
        return true;
    }
    let last = bytes[bytes.len() - 1];
    if !(last.is_ascii_alphanumeric()) {
        return false;
    }
    bytes[1..bytes.len() - 1]
        .iter()
        .all(|b| b.is_ascii_alphanumeric() || *b == b'_' || *b == b'-')
}

/// Normalizes a name for case-insensitive, `_`/`-`-equivalent comparison
/// (spec §4.3 step 3: "compare case-insensitively with `_` and `-` treated as equal").
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase().replace('_', "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_workflow_id() {
        let id = construct_workflow_id("my-workflow", 7);
        assert_eq!(id, "my-workflow-7");
        assert_eq!(
            deconstruct_workflow_id(&id),
            Some(("my-workflow".to_string(), 7))
        );
    }

    #[test]
    fn name_validation_matches_grammar() {
        assert!(is_valid_token_name("a"));
        assert!(is_valid_token_name("task-1_b"));
        assert!(!is_valid_token_name("1task"));
        assert!(!is_valid_token_name("task-"));
        assert!(!is_valid_token_name(""));
    }

    #[test]
    fn normalize_treats_underscore_and_hyphen_as_equal() {
        assert_eq!(normalize_name("My_Task"), normalize_name("my-task"));
    }

    #[test]
    fn unique_id_has_requested_length() {
        assert_eq!(generate_unique_id(32).len(), 32);
    }
}

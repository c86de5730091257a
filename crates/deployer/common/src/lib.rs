#![allow(clippy::must_use_candidate)]

pub mod args;

/// Maps a user supplied contract name (`registry`, `whitelistedMinter`) onto the
/// artifact and ledger name (`Registry`, `WhitelistedMinter`).
pub fn contract_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

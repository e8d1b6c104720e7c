//! Name and address helpers.
//!
//! Hub addresses are MAC strings in whatever form the user or host supplies
//! (`AA:BB:CC:DD:EE:FF`, `aa-bb-cc-dd-ee-ff`, `aabbccddeeff`). Everything keyed
//! by a hub goes through [`normalize_mac`] first so one hub maps to one store.

use tracing::trace;

use crate::error::{CodesError, Result};

const MAC_HEX_DIGITS: usize = 12;

/// Normalize a MAC address: strip `:`/`-`/`.` separators and lowercase it.
pub fn normalize_mac(mac: &str) -> Result<String> {
    let normalized: String = mac
        .trim()
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .map(|c| c.to_ascii_lowercase())
        .collect();

    if normalized.len() != MAC_HEX_DIGITS {
        return Err(CodesError::InvalidAddress {
            address: mac.to_string(),
            reason: format!("expected {MAC_HEX_DIGITS} hex digits, got {}", normalized.len()),
        });
    }
    if let Some(bad) = normalized.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(CodesError::InvalidAddress {
            address: mac.to_string(),
            reason: format!("'{bad}' is not a hex digit"),
        });
    }

    trace!(input = %mac, normalized = %normalized, "Normalized hub address");
    Ok(normalized)
}

/// Compare two MAC strings ignoring case and separators.
pub fn macs_match(a: &str, b: &str) -> bool {
    match (normalize_mac(a), normalize_mac(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Render a normalized MAC with colon separators (`aa:bb:cc:dd:ee:ff`).
pub fn colon_mac(normalized: &str) -> String {
    normalized
        .as_bytes()
        .chunks(2)
        .map(|pair| String::from_utf8_lossy(pair).into_owned())
        .collect::<Vec<_>>()
        .join(":")
}

/// Storage key of the codes file for a hub.
pub fn store_key(normalized_mac: &str) -> String {
    format!("broadlink_remote_{normalized_mac}_codes")
}

/// Identifier of a controlled device hanging off a hub.
pub fn device_identifier(normalized_mac: &str, device: &str) -> String {
    format!("{normalized_mac}_{device}")
}

/// Unique id of the button entity for one command.
pub fn button_unique_id(normalized_mac: &str, device: &str, command: &str) -> String {
    format!("{normalized_mac}_{device}_{command}")
}

/// Turn `snake_case` names into display names.
///
/// Underscores become spaces and each all-lowercase word is capitalized.
/// Words that already carry an uppercase letter (`HDMI`, `iPad`) are kept.
pub fn format_name(name: &str) -> String {
    name.split('_')
        .map(|word| {
            if word.chars().any(char::is_uppercase) {
                word.to_string()
            } else {
                capitalize(word)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

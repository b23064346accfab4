//! Address normalization for outbound entities.
//!
//! Destination numbers arrive from task arguments in loose form (`"341234567"`,
//! `"341234567-1446578937"` for groups). The remote side only accepts fully
//! qualified addresses, so every outbound entity goes through
//! [`normalize_address`] first.

/// Suffix appended to direct peer numbers.
pub const PEER_SUFFIX: &str = "@s.whatsapp.net";

/// Suffix appended to group identifiers (those containing a hyphen).
pub const GROUP_SUFFIX: &str = "@g.us";

/// Returns the fully qualified address for `number`.
///
/// Input that already carries an `@` separator is returned unchanged. Group
/// identifiers contain a hyphen and receive [`GROUP_SUFFIX`]; anything else is
/// treated as a direct peer and receives [`PEER_SUFFIX`].
pub fn normalize_address(number: &str) -> String {
	if number.contains('@') {
		number.to_string()
	} else if number.contains('-') {
		format!("{number}{GROUP_SUFFIX}")
	} else {
		format!("{number}{PEER_SUFFIX}")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn peer_number_gets_peer_suffix() {
		assert_eq!(normalize_address("341234567"), "341234567@s.whatsapp.net");
	}

	#[test]
	fn hyphenated_number_is_a_group() {
		assert_eq!(normalize_address("123-456"), "123-456@g.us");
	}

	#[test]
	fn qualified_address_is_unchanged() {
		assert_eq!(normalize_address("a@b"), "a@b");
		assert_eq!(normalize_address("123-456@g.us"), "123-456@g.us");
	}

	#[test]
	fn separator_wins_over_hyphen() {
		assert_eq!(normalize_address("12-34@s.whatsapp.net"), "12-34@s.whatsapp.net");
	}
}

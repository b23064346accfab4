//! Account credentials: `phone:password` logins and key=value files.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use chatq_protocol::normalize_address;
use chatq_runtime::{Error, Result};

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
	pub phone: String,
	pub password: String,
	/// Any other keys found in a credentials file, e.g. `cc`.
	pub extra: BTreeMap<String, String>,
}

impl fmt::Debug for Credentials {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Credentials")
			.field("phone", &self.phone)
			.field("password", &"<redacted>")
			.field("extra", &self.extra.keys().collect::<Vec<_>>())
			.finish()
	}
}

impl Credentials {
	/// Parses a `phone:password` pair.
	pub fn from_login(login: &str) -> Result<Self> {
		match login.split_once(':') {
			Some((phone, password)) if !phone.trim().is_empty() && !password.trim().is_empty() => Ok(Self {
				phone: phone.trim().to_string(),
				password: password.trim().to_string(),
				extra: BTreeMap::new(),
			}),
			_ => Err(Error::Configuration("login must be in the format phone:password".to_string())),
		}
	}

	/// Reads a key=value credentials file. See [`parse_key_values`].
	pub fn from_file(path: &Path) -> Result<Self> {
		let text = std::fs::read_to_string(path).map_err(|e| {
			tracing::error!(target: "chatq::config", path = %path.display(), error = %e, "Invalid config path");
			Error::Configuration(format!("Invalid config path: {}", path.display()))
		})?;
		Self::from_values(parse_key_values(&text)?)
	}

	fn from_values(mut values: BTreeMap<String, String>) -> Result<Self> {
		match (values.remove("phone"), values.remove("password")) {
			(Some(phone), Some(password)) if !phone.is_empty() && !password.is_empty() => Ok(Self {
				phone,
				password,
				extra: values,
			}),
			_ => Err(Error::Configuration(
				"Must specify at least phone number and password in config file".to_string(),
			)),
		}
	}

	/// Address of the account itself.
	pub fn jid(&self) -> String {
		normalize_address(&self.phone)
	}
}

/// Parses key=value lines.
///
/// Blank lines and lines starting with `#` or `;` are skipped, anything
/// after an inline `#` or `;` is dropped, the split happens on the first
/// `=`, and hyphens in keys become underscores.
pub fn parse_key_values(text: &str) -> Result<BTreeMap<String, String>> {
	let mut out = BTreeMap::new();
	for (n, raw) in text.lines().enumerate() {
		let line = raw.trim();
		if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
			continue;
		}
		let line = line.split('#').next().unwrap_or_default();
		let line = line.split(';').next().unwrap_or_default();
		let Some((key, value)) = line.split_once('=') else {
			return Err(Error::Configuration(format!("line {}: expected key=value, got '{}'", n + 1, raw.trim())));
		};
		out.insert(key.trim().replace('-', "_"), value.trim().to_string());
	}
	Ok(out)
}

/// Picks the credentials source.
///
/// Exactly one of `login` and `config` may be given. With neither, the
/// `fallback` file from the worker configuration is used.
pub fn resolve_credentials(login: Option<&str>, config: Option<&Path>, fallback: Option<&Path>) -> Result<Credentials> {
	match (login, config) {
		(Some(_), Some(_)) => Err(Error::Configuration(
			"Ambiguous configuration: specify either a login or a configuration file, not both".to_string(),
		)),
		(Some(login), None) => Credentials::from_login(login),
		(None, Some(path)) => Credentials::from_file(path),
		(None, None) => match fallback {
			Some(path) => Credentials::from_file(path),
			None => Err(Error::Configuration("You must specify a configuration method".to_string())),
		},
	}
}

use std::io::Write;
use std::path::PathBuf;

use tempfile::NamedTempFile;

use super::*;

fn write_file(contents: &str) -> NamedTempFile {
	let mut file = NamedTempFile::new().unwrap();
	file.write_all(contents.as_bytes()).unwrap();
	file
}

#[test]
fn key_values_skip_comments_and_normalize_keys() {
	let text = "\
# account
; legacy comment
cc=34
phone = 34123456789  # inline
password=c2VjcmV0PT0=
id-token = abc ; trailing

";
	let values = parse_key_values(text).unwrap();
	assert_eq!(values.get("cc").map(String::as_str), Some("34"));
	assert_eq!(values.get("phone").map(String::as_str), Some("34123456789"));
	assert_eq!(values.get("password").map(String::as_str), Some("c2VjcmV0PT0="));
	assert_eq!(values.get("id_token").map(String::as_str), Some("abc"));
	assert_eq!(values.len(), 4);
}

#[test]
fn key_values_reject_line_without_separator() {
	let err = parse_key_values("phone=1\njust some words\n").unwrap_err();
	assert!(matches!(&err, Error::Configuration(msg) if msg.contains("line 2")), "got {err:?}");
}

#[test]
fn login_pair() {
	let creds = Credentials::from_login("34123456789:c2VjcmV0").unwrap();
	assert_eq!(creds.phone, "34123456789");
	assert_eq!(creds.password, "c2VjcmV0");
	assert_eq!(creds.jid(), "34123456789@s.whatsapp.net");

	assert!(Credentials::from_login("34123456789").is_err());
	assert!(Credentials::from_login(":secret").is_err());
	assert!(Credentials::from_login("34123456789:").is_err());
}

#[test]
fn debug_redacts_password() {
	let creds = Credentials::from_login("341:hunter2").unwrap();
	let rendered = format!("{creds:?}");
	assert!(!rendered.contains("hunter2"));
	assert!(rendered.contains("341"));
}

#[test]
fn credentials_file_keeps_extra_keys() {
	let file = write_file("cc=34\nphone=34123456789\npassword=secret\n");
	let creds = Credentials::from_file(file.path()).unwrap();
	assert_eq!(creds.phone, "34123456789");
	assert_eq!(creds.extra.get("cc").map(String::as_str), Some("34"));
}

#[test]
fn credentials_file_needs_phone_and_password() {
	let file = write_file("phone=34123456789\n");
	let err = Credentials::from_file(file.path()).unwrap_err();
	assert!(err.to_string().contains("phone number and password"), "got {err}");
}

#[test]
fn unreadable_credentials_file_names_path() {
	let path = PathBuf::from("/nonexistent/chatq/credentials.conf");
	let err = Credentials::from_file(&path).unwrap_err();
	assert!(err.to_string().contains("/nonexistent/chatq/credentials.conf"));
}

#[test]
fn exactly_one_credentials_source() {
	let file = write_file("phone=1\npassword=2\n");

	let err = resolve_credentials(Some("1:2"), Some(file.path()), None).unwrap_err();
	assert!(err.to_string().contains("Ambiguous"));

	let err = resolve_credentials(None, None, None).unwrap_err();
	assert!(err.to_string().contains("You must specify a configuration method"));
	assert!(err.is_startup_error());

	assert_eq!(resolve_credentials(Some("5:6"), None, None).unwrap().phone, "5");
	assert_eq!(resolve_credentials(None, Some(file.path()), None).unwrap().phone, "1");
	assert_eq!(resolve_credentials(None, None, Some(file.path())).unwrap().password, "2");
}

#[test]
fn worker_config_defaults() {
	let config: WorkerConfig = serde_json::from_str("{}").unwrap();
	assert_eq!(config, WorkerConfig::default());
	assert_eq!(config.queues, vec!["default".to_string()]);
	assert_eq!(config.concurrency, 2);
	assert_eq!(config.loop_options().timeout, Duration::from_secs(10));
	assert_eq!(config.detached_delay(), Duration::from_millis(200));
	assert_eq!(config.retry_policy(), RetryPolicy::default());
	assert!(config.encryption);
}

#[test]
fn worker_config_load_and_validate() {
	let file = write_file(r#"{"queues": ["wa", "media"], "concurrency": 4, "extensions": ["stats"]}"#);
	let config = WorkerConfig::load(file.path()).unwrap();
	assert_eq!(config.queues, vec!["wa".to_string(), "media".to_string()]);
	assert_eq!(config.concurrency, 4);
	assert_eq!(config.extensions, vec!["stats".to_string()]);

	let file = write_file(r#"{"concurrency": 1}"#);
	let err = WorkerConfig::load(file.path()).unwrap_err();
	assert!(err.to_string().contains("at least 2"));

	let file = write_file(r#"{"queues": []}"#);
	assert!(WorkerConfig::load(file.path()).is_err());

	let file = write_file(r#"{"concurency": 3}"#);
	assert!(matches!(WorkerConfig::load(file.path()), Err(Error::Configuration(_))));
}

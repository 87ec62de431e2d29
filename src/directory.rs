//! DirectoryStorage - file-backed key-value storage for native hosts
//!
//! Each key is stored as its own file inside a directory. Writes go to a
//! temporary file first and are renamed into place, so a crash mid-write
//! leaves either the old value or the new one.

use crate::{Result, Storage};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const TEMP_EXTENSION: &str = ".tmp";

/// Configuration for the directory-based store.
#[derive(Clone, Debug)]
pub struct DirectoryConfig {
	/// Directory holding one file per key. Created if missing.
	pub storage_location: PathBuf,
}

/// Durable storage keeping each key in its own file.
#[derive(Debug)]
pub struct DirectoryStorage {
	config: DirectoryConfig,
}

impl DirectoryStorage {
	/// Opens (or creates) the storage directory.
	pub fn new(config: DirectoryConfig) -> Result<Self> {
		fs::create_dir_all(&config.storage_location)?;
		Ok(Self { config })
	}

	pub fn location(&self) -> &Path {
		&self.config.storage_location
	}

	fn path_for(&self, key: &str) -> PathBuf {
		self.config.storage_location.join(encode_key(key))
	}
}

impl Storage for DirectoryStorage {
	fn get_item(&self, key: &str) -> Result<Option<String>> {
		match fs::read_to_string(self.path_for(key)) {
			Ok(s) => Ok(Some(s)),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
			Err(e) => Err(e.into()),
		}
	}

	fn set_item(&self, key: &str, value: &str) -> Result<()> {
		let path = self.path_for(key);
		let mut temp = path.clone().into_os_string();
		temp.push(TEMP_EXTENSION);
		fs::write(&temp, value)?;
		fs::rename(&temp, &path)?;
		Ok(())
	}

	fn remove_item(&self, key: &str) -> Result<()> {
		match fs::remove_file(self.path_for(key)) {
			Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
			_ => Ok(()),
		}
	}

	fn keys(&self) -> Result<Vec<String>> {
		let mut keys = Vec::new();
		for entry in fs::read_dir(&self.config.storage_location)? {
			let entry = entry?;
			if !entry.file_type()?.is_file() {
				continue;
			}
			let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
				continue;
			};
			if name.ends_with(TEMP_EXTENSION) {
				continue;
			}
			if let Some(key) = decode_key(&name) {
				keys.push(key);
			}
		}
		keys.sort();
		Ok(keys)
	}
}

fn is_plain(b: u8) -> bool {
	b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-')
}

/// Percent-escapes every byte outside `[A-Za-z0-9._-]`.
fn encode_key(key: &str) -> String {
	let mut out = String::with_capacity(key.len());
	for b in key.bytes() {
		if is_plain(b) {
			out.push(b as char);
		} else {
			out.push_str(&format!("%{:02X}", b));
		}
	}
	// "." and ".." are not usable as file names.
	if out.chars().all(|c| c == '.') {
		out = out.replace('.', "%2E");
	}
	out
}

fn decode_key(name: &str) -> Option<String> {
	let bytes = name.as_bytes();
	let mut out = Vec::with_capacity(bytes.len());
	let mut i = 0;
	while i < bytes.len() {
		if bytes[i] == b'%' {
			let hex = name.get(i + 1..i + 3)?;
			out.push(u8::from_str_radix(hex, 16).ok()?);
			i += 3;
		} else {
			out.push(bytes[i]);
			i += 1;
		}
	}
	String::from_utf8(out).ok()
}

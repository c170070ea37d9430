//! File-backed [`CacheStorage`] so ciphertext survives process restarts.
//!
//! The file holds a versioned JSON document:
//!
//! ```json
//! { "version": 1, "entries": { "<key>": "<value>" } }
//! ```
//!
//! Every mutation rewrites the document through a sibling `.tmp` file and an atomic
//! rename, so readers never observe a half-written snapshot.

// std
use std::{
	fs::{self, File},
	io::{self, Write},
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	obs::{self, FlowKind},
	store::{CacheStorage, StoreError},
};

const FORMAT_VERSION: u32 = 1;

type Entries = BTreeMap<String, String>;

#[derive(Serialize, Deserialize)]
struct Snapshot<E> {
	version: u32,
	entries: E,
}

/// Origin storage persisted to a single JSON file.
///
/// Clones share the in-memory entries and the file, like two tabs sharing one
/// origin's local storage.
#[derive(Clone, Debug)]
pub struct FileStorage {
	path: PathBuf,
	entries: Arc<RwLock<Entries>>,
}
impl FileStorage {
	/// Opens storage at `path`, creating parent directories and loading any existing
	/// snapshot.
	///
	/// Fails with [`StoreError::Serialization`] when the file is not a snapshot this
	/// version understands.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| io_error("create", parent, e))?;
		}

		let entries = read_snapshot(&path)?;

		Ok(Self { path, entries: Arc::new(RwLock::new(entries)) })
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn write_snapshot(&self, entries: &Entries) -> Result<(), StoreError> {
		let bytes = serde_json::to_vec_pretty(&Snapshot { version: FORMAT_VERSION, entries })
			.map_err(|e| StoreError::Serialization { message: e.to_string() })?;
		let tmp = self.path.with_extension("tmp");
		let mut file = File::create(&tmp).map_err(|e| io_error("create", &tmp, e))?;

		file.write_all(&bytes)
			.and_then(|()| file.sync_all())
			.map_err(|e| io_error("write", &tmp, e))?;
		fs::rename(&tmp, &self.path).map_err(|e| io_error("replace", &self.path, e))
	}

	// Removals cannot report failure through the storage contract.
	fn write_snapshot_or_log(&self, entries: &Entries) {
		if let Err(e) = self.write_snapshot(entries) {
			obs::absorbed_fault(FlowKind::StorageInit, "file_write", &e.to_string());
		}
	}
}
impl CacheStorage for FileStorage {
	fn get_item(&self, key: &str) -> Option<String> {
		self.entries.read().get(key).cloned()
	}

	fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
		let mut entries = self.entries.write();
		let previous = entries.insert(key.to_owned(), value.to_owned());

		if previous.as_deref() == Some(value) {
			return Ok(());
		}

		self.write_snapshot(&entries)
	}

	fn remove_item(&self, key: &str) {
		let mut entries = self.entries.write();

		if entries.remove(key).is_some() {
			self.write_snapshot_or_log(&entries);
		}
	}

	fn get_keys(&self) -> Vec<String> {
		self.entries.read().keys().cloned().collect()
	}

	fn contains_key(&self, key: &str) -> bool {
		self.entries.read().contains_key(key)
	}

	fn clear(&self) {
		let mut entries = self.entries.write();

		entries.clear();

		self.write_snapshot_or_log(&entries);
	}
}

fn read_snapshot(path: &Path) -> Result<Entries, StoreError> {
	let bytes = match fs::read(path) {
		Ok(bytes) => bytes,
		Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Entries::new()),
		Err(e) => return Err(io_error("read", path, e)),
	};

	if bytes.is_empty() {
		return Ok(Entries::new());
	}

	let snapshot: Snapshot<Entries> = serde_json::from_slice(&bytes).map_err(|e| {
		StoreError::Serialization { message: format!("{} is not a cache snapshot: {e}", path.display()) }
	})?;

	if snapshot.version != FORMAT_VERSION {
		return Err(StoreError::Serialization {
			message: format!("{} uses unsupported snapshot version {}", path.display(), snapshot.version),
		});
	}

	Ok(snapshot.entries)
}

fn io_error(action: &str, path: &Path, e: io::Error) -> StoreError {
	StoreError::Backend { message: format!("Failed to {action} {}: {e}", path.display()) }
}

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::os::unix::fs::PermissionsExt;
use std::{env, fs, io};

/// Names of the executables reachable through `PATH`, used for completion.
#[derive(Debug, Default)]
pub struct SearchCache {
	imp: BTreeSet<String>,
}

const PATH_KEY: &str = "PATH";

impl SearchCache {
	pub fn new() -> SearchCache {
		let mut this = SearchCache::default();
		this.rehash();
		this
	}

	fn add_entry(&mut self, entry: io::Result<fs::DirEntry>) -> io::Result<()> {
		let e = entry?;
		let metadata = fs::metadata(e.path())?;
		if metadata.is_file() && metadata.permissions().mode() & 0o111 != 0 {
			if let Some(name) = e.file_name().to_str() {
				self.imp.insert(name.to_owned());
			}
		}
		Ok(())
	}

	pub fn rehash(&mut self) {
		self.imp.clear();
		let path = env::var_os(PATH_KEY).unwrap_or_default();
		self.rehash_from(&path);
	}

	fn rehash_from(&mut self, path: &OsStr) {
		for dir in env::split_paths(path) {
			if let Ok(entries) = fs::read_dir(dir) {
				for entry in entries {
					let _ = self.add_entry(entry);
				}
			}
		}
	}

	/// Sorted names starting with `prefix`.
	pub fn matching<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
		self.imp.range(prefix.to_owned() ..)
			.take_while(move |name| name.starts_with(prefix))
			.map(|name| name.as_str())
	}

	pub fn len(&self) -> usize {
		self.imp.len()
	}

	pub fn is_empty(&self) -> bool {
		self.imp.is_empty()
	}
}

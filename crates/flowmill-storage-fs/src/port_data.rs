use std::{
	fmt,
	fs,
	path::PathBuf,
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
};

use flowmill_core::{PortData, PortDataHandle};
use tracing::warn;

/// What a handle actually is. Only `Join` ever reports non-empty `sources`:
/// a source port's own data has none, and a linked port's data is
/// literally the upstream's handle passed through unchanged, so neither ever
/// reaches this enum with something to report.
#[derive(Clone)]
enum FsKind {
	/// Freshly allocated storage for a source port: numbered partition files
	/// directly under `root`, handed out one at a time by `get_partition`.
	Source { root: PathBuf, next: Arc<AtomicU64> },
	/// One appendable partition a task writes its output into.
	Partition { path: PathBuf },
	/// A read-only view of a known size into some upstream range. Nothing
	/// downstream of connect-time needs to know which upstream a slice came
	/// from, only how big it is.
	Slice { size: u64 },
	/// The concatenation of a join's upstreams, in declaration order.
	Join { parts: Vec<PortDataHandle> },
}

#[derive(Clone)]
pub struct FsPortData(FsKind);

impl fmt::Debug for FsPortData {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.0 {
			FsKind::Source { root, .. } => f.debug_struct("FsPortData::Source").field("root", root).finish(),
			FsKind::Partition { path } => f.debug_struct("FsPortData::Partition").field("path", path).finish(),
			FsKind::Slice { size } => f.debug_struct("FsPortData::Slice").field("size", size).finish(),
			FsKind::Join { parts } => f.debug_struct("FsPortData::Join").field("parts", &parts.len()).finish(),
		}
	}
}

impl FsPortData {
	pub(crate) fn source(root: PathBuf) -> Self {
		Self(FsKind::Source { root, next: Arc::new(AtomicU64::new(0)) })
	}

	pub(crate) fn join(parts: Vec<PortDataHandle>) -> Self {
		Self(FsKind::Join { parts })
	}
}

fn dir_size(root: &std::path::Path) -> u64 {
	let Ok(entries) = fs::read_dir(root) else {
		return 0;
	};
	entries
		.filter_map(|e| e.ok())
		.filter_map(|e| e.metadata().ok())
		.filter(|m| m.is_file())
		.map(|m| m.len())
		.sum()
}

impl PortData for FsPortData {
	fn size(&self) -> u64 {
		match &self.0 {
			FsKind::Source { root, .. } => dir_size(root),
			FsKind::Partition { path } => fs::metadata(path).map(|m| m.len()).unwrap_or(0),
			FsKind::Slice { size } => *size,
			FsKind::Join { parts } => parts.iter().map(|p| p.size()).sum(),
		}
	}

	fn get_partition(&self) -> PortDataHandle {
		match &self.0 {
			FsKind::Source { root, next } => {
				let n = next.fetch_add(1, Ordering::SeqCst);
				if let Err(source) = fs::create_dir_all(root) {
					warn!(message = "could not create port data root", root = %root.display(), %source);
				}
				let path = root.join(format!("{n:06}.part"));
				if let Err(source) = fs::File::create(&path) {
					warn!(message = "could not create partition file", path = %path.display(), %source);
				}
				Arc::new(FsPortData(FsKind::Partition { path }))
			}
			_ => {
				// Only source ports (unlinked out ports) are ever handed out
				// as fresh output targets; reaching this means a view or
				// join was asked to produce one, which the model never does.
				warn!(message = "get_partition called on a non-source port handle");
				let root = std::env::temp_dir().join("flowmill-orphan-partitions");
				let _ = fs::create_dir_all(&root);
				let path = root.join(format!("{}.part", uuid::Uuid::new_v4()));
				let _ = fs::File::create(&path);
				Arc::new(FsPortData(FsKind::Partition { path }))
			}
		}
	}

	fn get_slice(&self, start: u64, size: u64) -> PortDataHandle {
		match &self.0 {
			FsKind::Join { parts } => {
				let mut remaining_start = start;
				let mut remaining_size = size;
				let mut pieces = Vec::new();
				for part in parts {
					if remaining_size == 0 {
						break;
					}
					let len = part.size();
					if remaining_start >= len {
						remaining_start -= len;
						continue;
					}
					let take = remaining_size.min(len - remaining_start);
					pieces.push(part.get_slice(remaining_start, take));
					remaining_start = 0;
					remaining_size -= take;
				}
				match pieces.len() {
					1 => pieces.into_iter().next().unwrap(),
					_ => Arc::new(FsPortData(FsKind::Join { parts: pieces })),
				}
			}
			_ => Arc::new(FsPortData(FsKind::Slice { size })),
		}
	}

	fn sources(&self) -> Vec<PortDataHandle> {
		match &self.0 {
			FsKind::Join { parts } => parts.clone(),
			_ => Vec::new(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn write_file(path: &std::path::Path, contents: &[u8]) {
		fs::write(path, contents).unwrap();
	}

	#[test]
	fn source_size_sums_partition_files() {
		let root = std::env::temp_dir().join(format!("flowmill-fspd-test-{}", uuid::Uuid::new_v4()));
		fs::create_dir_all(&root).unwrap();
		let data = FsPortData::source(root.clone());
		assert_eq!(data.size(), 0);

		let p0 = data.get_partition();
		write_file(&root.join("000000.part"), b"hello");
		let p1 = data.get_partition();
		write_file(&root.join("000001.part"), b"world!");

		assert_eq!(p0.size(), 5);
		assert_eq!(p1.size(), 6);
		assert_eq!(data.size(), 11);
		assert!(p0.sources().is_empty());
		fs::remove_dir_all(&root).ok();
	}

	#[test]
	fn join_size_is_sum_of_parts_and_slicing_walks_the_concatenation() {
		let a = std::env::temp_dir().join(format!("flowmill-fspd-test-a-{}", uuid::Uuid::new_v4()));
		let b = std::env::temp_dir().join(format!("flowmill-fspd-test-b-{}", uuid::Uuid::new_v4()));
		fs::create_dir_all(&a).unwrap();
		fs::create_dir_all(&b).unwrap();
		write_file(&a.join("000000.part"), &[0u8; 10]);
		write_file(&b.join("000000.part"), &[0u8; 15]);

		let source_a: PortDataHandle = Arc::new(FsPortData::source(a.clone()));
		let source_b: PortDataHandle = Arc::new(FsPortData::source(b.clone()));
		let joined = FsPortData::join(vec![source_a.clone(), source_b.clone()]);

		assert_eq!(joined.size(), 25);
		assert_eq!(joined.sources().len(), 2);

		// A slice entirely within the first upstream.
		let s1 = joined.get_slice(0, 5);
		assert_eq!(s1.size(), 5);

		// A slice straddling the boundary between the two upstreams.
		let s2 = joined.get_slice(8, 4);
		assert_eq!(s2.size(), 4);

		// A slice entirely within the second upstream.
		let s3 = joined.get_slice(12, 13);
		assert_eq!(s3.size(), 13);

		fs::remove_dir_all(&a).ok();
		fs::remove_dir_all(&b).ok();
	}
}

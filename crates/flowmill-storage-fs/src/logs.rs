use std::{fs, path::PathBuf};

use flowmill_core::{Ident, StorageError, TaskLogLine, TaskLogs, TaskNode};

/// Reads combined stdout/stderr logs a job scheduler wrote to
/// `output/<task-id>.txt`. Lines are expected in the form
///
/// ```text
/// YYYY-MM-DD HH:MM:SS,mmm <task-id> (DEBUG|INFO|WARN|ERROR) : <text>
/// ```
///
/// but a worker's own unstructured stdout is still surfaced, just with an
/// empty timestamp/level, rather than dropped.
///
/// `instance_name` is part of the [`TaskLogs`] contract so multi-instance
/// backends can partition by it; this backend's `work_path` already scopes a
/// single running instance, so it's accepted but not used to build the path
/// — logs live flatly at `output/<task-id>.txt`, exactly where the local
/// scheduler wrote them.
pub struct FsTaskLogs {
	output_path: PathBuf,
}

impl FsTaskLogs {
	pub fn new(output_path: PathBuf) -> Self {
		Self { output_path }
	}

	fn path(&self, module_id: &str, task_index: u32) -> PathBuf {
		let task_id = TaskNode::task_id(module_id, task_index);
		self.output_path.join(format!("{task_id}.txt"))
	}
}

fn parse_line(task_id: &str, line: &str) -> TaskLogLine {
	let mut fields = line.splitn(4, ' ');
	let (date, time, tid) = match (fields.next(), fields.next(), fields.next()) {
		(Some(date), Some(time), Some(tid)) if tid == task_id => (date, time, tid),
		_ => {
			return TaskLogLine {
				timestamp: String::new(),
				task_id: Ident::from(task_id),
				level: String::new(),
				text: line.to_string(),
			}
		}
	};
	let rest = fields.next().unwrap_or("");
	let (level, text) = match rest.split_once(" : ") {
		Some((level, text)) => (level.trim(), text),
		None => ("", rest),
	};
	TaskLogLine {
		timestamp: format!("{date} {time}"),
		task_id: Ident::from(tid),
		level: level.to_string(),
		text: text.to_string(),
	}
}

impl TaskLogs for FsTaskLogs {
	fn exists(&self, _instance_name: &str, module_id: &str, task_index: u32) -> bool {
		self.path(module_id, task_index).is_file()
	}

	fn query(&self, _instance_name: &str, module_id: &str, task_index: u32) -> Result<Vec<TaskLogLine>, StorageError> {
		let path = self.path(module_id, task_index);
		let task_id = TaskNode::task_id(module_id, task_index);
		let body = fs::read_to_string(&path).map_err(|source| {
			if source.kind() == std::io::ErrorKind::NotFound {
				StorageError::NoLogs { task_id: task_id.clone() }
			} else {
				StorageError::Io { path: path.display().to_string(), source }
			}
		})?;
		Ok(body.lines().filter(|l| !l.is_empty()).map(|line| parse_line(&task_id, line)).collect())
	}

	fn raw_output(&self, _instance_name: &str, module_id: &str, task_index: u32) -> Result<String, StorageError> {
		let path = self.path(module_id, task_index);
		let task_id = TaskNode::task_id(module_id, task_index);
		fs::read_to_string(&path).map_err(|source| {
			if source.kind() == std::io::ErrorKind::NotFound {
				StorageError::NoLogs { task_id }
			} else {
				StorageError::Io { path: path.display().to_string(), source }
			}
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_structured_lines_and_passes_through_unstructured_ones() {
		let root = std::env::temp_dir().join(format!("flowmill-fslogs-test-{}", uuid::Uuid::new_v4()));
		fs::create_dir_all(&root).unwrap();
		let logs = FsTaskLogs::new(root.clone());
		let task_id = TaskNode::task_id("m", 0);
		fs::write(
			root.join(format!("{task_id}.txt")),
			format!("2026-07-30 10:15:23,456 {task_id} INFO : started\nraw stdout line with no structure\n"),
		)
		.unwrap();

		assert!(logs.exists("inst", "m", 0));
		let lines = logs.query("inst", "m", 0).unwrap();
		assert_eq!(lines.len(), 2);
		assert_eq!(lines[0].level, "INFO");
		assert_eq!(lines[0].text, "started");
		assert_eq!(lines[1].level, "");
		assert_eq!(lines[1].text, "raw stdout line with no structure");
		fs::remove_dir_all(&root).ok();
	}

	#[test]
	fn missing_log_file_is_reported_as_no_logs() {
		let root = std::env::temp_dir().join(format!("flowmill-fslogs-test-missing-{}", uuid::Uuid::new_v4()));
		let logs = FsTaskLogs::new(root);
		assert!(!logs.exists("inst", "m", 0));
		assert!(matches!(logs.query("inst", "m", 0), Err(StorageError::NoLogs { .. })));
	}
}

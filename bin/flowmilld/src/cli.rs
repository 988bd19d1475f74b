use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Drive a workflow through the engine, or inspect a prior run's persisted
/// logs.
#[derive(Debug, Parser)]
#[command(name = "flowmilld", about = "Flow execution engine CLI")]
pub struct Cli {
	/// Path to the root flow's TOML definition.
	pub flow: PathBuf,

	/// Name this instance runs under; defaults to the flow file's stem.
	#[arg(long)]
	pub instance_name: Option<String>,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Initialize and run the flow to completion, then report final state.
	Run,
	/// Run the flow, then print the root instance's reduced state.
	State,
	/// Run the flow, then print one module's state.
	ModuleState {
		/// Dotted module id.
		module_id: String,
	},
	/// Run the flow, then print one task's state.
	TaskState {
		/// Dotted module id the task belongs to.
		module_id: String,
		/// 0-based task index within the module.
		index: u32,
	},
	/// Run the flow, then print one task's merged configuration.
	TaskConf {
		/// Dotted module id the task belongs to.
		module_id: String,
		/// 0-based task index within the module.
		index: u32,
	},
	/// Run the flow, then print one task's raw combined stdout/stderr.
	TaskOutput {
		/// Dotted module id the task belongs to.
		module_id: String,
		/// 0-based task index within the module.
		index: u32,
	},
	/// Run the flow, then print every task output for one module, concatenated.
	ModuleOutput {
		/// Dotted module id.
		module_id: String,
	},
	/// Print the recorded combined stdout/stderr log for one task.
	TaskLogs {
		/// Dotted module id the task belongs to.
		module_id: String,
		/// 0-based task index within the module.
		index: u32,
	},
}

use std::{process::ExitCode, sync::Arc};

use clap::Parser;
use flowmill_core::{Instance, InstanceStatus, Storage, TaskLogs};
use flowmill_model::TomlFlowLoader;
use flowmill_scheduler_local::LocalScheduler;
use flowmill_storage_fs::FsStorage;
use flowmill_util::{load_env, LoadedEnv};
use tracing::{error, info};

mod cli;
mod config;

use cli::{Cli, Command};
use config::FlowmilldConfig;

#[tokio::main]
async fn main() -> ExitCode {
	let cli = Cli::parse();

	let config_res = match load_env::<FlowmilldConfig>() {
		Ok(x) => x,
		Err(err) => {
			println!("Error while loading .env: {err}");
			return ExitCode::FAILURE;
		}
	};
	let config: Arc<FlowmilldConfig> = Arc::new(config_res.get_config().clone());

	tracing_subscriber::fmt()
		.with_env_filter(config.loglevel.get_config())
		.without_time()
		.with_ansi(true)
		.init();

	match &config_res {
		LoadedEnv::FoundFile { config, path } => {
			info!(message = "loaded config from .env", ?path, ?config);
		}
		LoadedEnv::OnlyVars(config) => {
			info!(message = "no `.env` found, loaded config from environment", ?config);
		}
	}

	if config.scheduler != "local" {
		error!(message = "unknown scheduler backend", scheduler = %config.scheduler, note = "only `local` is shipped");
		return ExitCode::FAILURE;
	}

	let storage = Box::new(FsStorage::new(config.work_path.clone()));
	if config.clean {
		if let Err(source) = storage.clean() {
			error!(message = "could not clean work path", %source);
			return ExitCode::FAILURE;
		}
	} else if let Err(source) = storage.prepare() {
		error!(message = "could not prepare work path", %source);
		return ExitCode::FAILURE;
	}

	let scheduler = Box::new(LocalScheduler::new(config.local_scheduler_config()));

	let instance_name = cli
		.instance_name
		.clone()
		.or_else(|| cli.flow.file_stem().map(|s| s.to_string_lossy().into_owned()))
		.unwrap_or_else(|| "flowmilld".to_string());

	let instance = Instance::new(
		instance_name,
		config.instance_config(),
		Box::new(TomlFlowLoader::new()),
		storage,
		scheduler,
	);

	match cli.command {
		Command::Run => run(&instance, &cli.flow).await,
		Command::State => {
			run_quiet(&instance, &cli.flow).await;
			println!("state: {:?}", instance.state().await);
			ExitCode::SUCCESS
		}
		Command::ModuleState { module_id } => {
			run_quiet(&instance, &cli.flow).await;
			match instance.module_state(&module_id).await {
				Some(state) => {
					println!("{state:?}");
					ExitCode::SUCCESS
				}
				None => {
					println!("no such module: {module_id}");
					ExitCode::FAILURE
				}
			}
		}
		Command::TaskState { module_id, index } => {
			run_quiet(&instance, &cli.flow).await;
			match instance.task_state(&module_id, index as usize).await {
				Some(state) => {
					println!("{state:?}");
					ExitCode::SUCCESS
				}
				None => {
					println!("no such task: {module_id}-{index:04}");
					ExitCode::FAILURE
				}
			}
		}
		Command::TaskConf { module_id, index } => {
			run_quiet(&instance, &cli.flow).await;
			match instance.task_conf(&module_id, index as usize).await {
				Some(conf) => {
					println!("{}", serde_json::to_string_pretty(&conf).unwrap_or_else(|_| format!("{conf:?}")));
					ExitCode::SUCCESS
				}
				None => {
					println!("no such task: {module_id}-{index:04}");
					ExitCode::FAILURE
				}
			}
		}
		Command::TaskOutput { module_id, index } => {
			run_quiet(&instance, &cli.flow).await;
			match instance.task_output(&module_id, index).await {
				Ok(body) => {
					print!("{body}");
					ExitCode::SUCCESS
				}
				Err(source) => {
					error!(message = "could not read task output", module_id, index, %source);
					ExitCode::FAILURE
				}
			}
		}
		Command::ModuleOutput { module_id } => {
			run_quiet(&instance, &cli.flow).await;
			print!("{}", instance.module_output(&module_id).await);
			ExitCode::SUCCESS
		}
		Command::TaskLogs { module_id, index } => task_logs(&config, &module_id, index),
	}
}

async fn run(instance: &Instance, flow_file: &std::path::Path) -> ExitCode {
	let status = match run_quiet(instance, flow_file).await {
		Some(status) => status,
		None => return ExitCode::FAILURE,
	};

	let state = instance.state().await;
	info!(message = "run finished", ?status, ?state);
	println!("status: {status:?}");
	println!("state: {state:?}");

	match status {
		InstanceStatus::Finished => ExitCode::SUCCESS,
		_ => ExitCode::FAILURE,
	}
}

/// Initialize and run the flow, for subcommands that report some view of the
/// result rather than the full status/state pair `run` prints. Errors are
/// logged the same way `run` logs them; callers that don't need the status
/// value can ignore the `Option`.
async fn run_quiet(instance: &Instance, flow_file: &std::path::Path) -> Option<InstanceStatus> {
	if let Err(source) = instance.initialize(flow_file).await {
		error!(message = "could not initialize instance", %source);
		return None;
	}
	if let Err(source) = instance.run().await {
		error!(message = "instance run failed", %source);
		return None;
	}
	Some(instance.status().await)
}

fn task_logs(config: &FlowmilldConfig, module_id: &str, index: u32) -> ExitCode {
	let storage = FsStorage::new(config.work_path.clone());
	let logs = storage.logs();
	if !logs.exists("", module_id, index) {
		println!("no logs recorded for {module_id}-{index:04}");
		return ExitCode::FAILURE;
	}
	match logs.query("", module_id, index) {
		Ok(lines) => {
			for line in lines {
				if line.timestamp.is_empty() {
					println!("{}", line.text);
				} else {
					println!("{} {} {} : {}", line.timestamp, line.task_id, line.level, line.text);
				}
			}
			ExitCode::SUCCESS
		}
		Err(source) => {
			error!(message = "could not read task logs", module_id, index, %source);
			ExitCode::FAILURE
		}
	}
}

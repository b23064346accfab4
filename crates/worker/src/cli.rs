use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::WorkerConfig;
use crate::step::StartOptions;

#[derive(Parser, Debug)]
#[command(name = "chatq")]
#[command(about = "Drive a persistent chat session from task-queue workers")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug, -vvv trace)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Run a worker that reads tasks as JSON lines from stdin and prints their results
	Worker(WorkerArgs),
}

#[derive(Args, Debug, Clone)]
pub struct WorkerArgs {
	/// Login credentials in the format phone:password
	#[arg(long, value_name = "PHONE:PASSWORD")]
	pub login: Option<String>,

	/// Credentials file with key=value lines (phone, password, ...)
	#[arg(long, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Worker configuration in JSON
	#[arg(long, value_name = "FILE")]
	pub worker_config: Option<PathBuf>,

	/// Disable end-to-end encryption
	#[arg(long)]
	pub unmoxie: bool,

	/// Queue to consume; repeat for several. The first one receives stdin tasks
	#[arg(short = 'Q', long = "queue", value_name = "NAME")]
	pub queues: Vec<String>,

	/// Consumers per queue (at least 2)
	#[arg(short = 'c', long)]
	pub concurrency: Option<usize>,

	/// Seconds to wait for each task's final result
	#[arg(long, default_value_t = 60, value_name = "SECS")]
	pub result_timeout: u64,
}

impl WorkerArgs {
	pub fn start_options(&self) -> StartOptions {
		StartOptions {
			login: self.login.clone(),
			config: self.config.clone(),
			unmoxie: self.unmoxie,
		}
	}

	/// Applies command-line overrides on top of the file configuration.
	pub fn apply_to(&self, config: &mut WorkerConfig) {
		if !self.queues.is_empty() {
			config.queues = self.queues.clone();
		}
		if let Some(concurrency) = self.concurrency {
			config.concurrency = concurrency;
		}
	}
}

//! Polling lifecycle for the sync engine.
//!
//! [`SyncEngine::start`] spawns a [`LifecycleManager`] task that owns the controller and drives
//! it on a cooperative schedule: it waits `poll_interval`, runs a tick, and only starts the
//! next wait once that tick has settled, so ticks never overlap. Pause, resume and resync
//! requests reach the task over a command channel and refresh requests through a [`Notify`];
//! both are handled between ticks.
//!
//! Disposal cancels a shared token. The loop exits at its next suspension point and the
//! controller stops publishing immediately, even from a tick that is still in flight.

use crate::probe::ChainProbe;
use crate::sync::{
	config::SyncConfig,
	controller::DataSyncController,
	hooks::{DataLoader, SyncHooks},
	progress_tracker::SyncStats,
	types::{SyncError, SyncState},
};
use std::sync::Arc;
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
	Pause,
	Resume,
	Resync,
}

/// Owns the controller inside the spawned polling task.
pub struct LifecycleManager<T> {
	controller: DataSyncController<T>,
	config: SyncConfig,
	commands: mpsc::UnboundedReceiver<Command>,
	/// Holds at most one pending refresh, so bursts collapse into a single tick
	refresh: Arc<Notify>,
	shutdown: CancellationToken,
	paused: bool,
	/// When the next scheduled tick is due; only moves after a tick settles
	next_tick: Instant,
}

impl<T: Clone + Send + Sync + 'static> LifecycleManager<T> {
	/// Run the polling loop until the engine is disposed or every handle is dropped.
	pub async fn run(mut self) -> SyncStats {
		info!(
			"Starting chain sync loop (poll interval {:?})",
			self.config.poll_interval
		);

		if self.config.tick_on_start && !self.shutdown.is_cancelled() {
			self.tick().await;
		}

		loop {
			let paused = self.paused;
			let deadline = self.next_tick;
			let refresh = self.refresh.clone();

			tokio::select! {
				biased;

				_ = self.shutdown.cancelled() => break,
				command = self.commands.recv() => match command {
					Some(command) => self.handle(command).await,
					None => {
						debug!("All engine handles dropped, stopping sync loop");
						break;
					}
				},
				_ = refresh.notified() => {
					self.controller.refresh().await;
					self.schedule_next();
				}
				_ = tokio::time::sleep_until(deadline), if !paused => {
					self.tick().await;
				}
			}
		}

		let stats = self.controller.stats();
		info!("Chain sync loop stopped: {}", stats.summary());
		stats
	}

	async fn handle(&mut self, command: Command) {
		match command {
			Command::Pause => {
				if !self.paused {
					info!("Pausing chain sync");
					self.paused = true;
					self.controller.set_paused(true);
				}
			}
			Command::Resume => {
				if self.paused {
					info!("Resuming chain sync");
					self.paused = false;
					self.controller.set_paused(false);
					self.tick().await;
				}
			}
			Command::Resync => {
				self.controller.reset();
				self.tick().await;
			}
		}
	}

	async fn tick(&mut self) {
		self.controller.tick().await;
		self.schedule_next();
	}

	fn schedule_next(&mut self) {
		self.next_tick = Instant::now() + self.config.poll_interval;
	}
}

/// Handle to a running sync engine.
///
/// Dropping the handle disposes the engine.
pub struct SyncEngine<T> {
	state: watch::Receiver<SyncState<T>>,
	commands: mpsc::UnboundedSender<Command>,
	refresh: Arc<Notify>,
	shutdown: CancellationToken,
	task: Option<JoinHandle<SyncStats>>,
}

impl<T: Clone + Send + Sync + 'static> SyncEngine<T> {
	/// Validate `config` and spawn the polling loop on the current Tokio runtime.
	pub fn start(
		probe: Arc<dyn ChainProbe>,
		loader: impl DataLoader<T> + 'static,
		hooks: impl SyncHooks + 'static,
		config: SyncConfig,
	) -> Result<Self, SyncError> {
		config.validate()?;

		let shutdown = CancellationToken::new();
		let controller =
			DataSyncController::new(probe, loader, hooks, &config, shutdown.child_token());
		let state = controller.subscribe();
		let (commands_tx, commands_rx) = mpsc::unbounded_channel();
		let refresh = Arc::new(Notify::new());

		let manager = LifecycleManager {
			controller,
			next_tick: Instant::now() + config.poll_interval,
			config,
			commands: commands_rx,
			refresh: refresh.clone(),
			shutdown: shutdown.clone(),
			paused: false,
		};
		let task = tokio::spawn(manager.run());

		Ok(Self {
			state,
			commands: commands_tx,
			refresh,
			shutdown,
			task: Some(task),
		})
	}

	/// Snapshot of the published state.
	pub fn state(&self) -> SyncState<T> {
		self.state.borrow().clone()
	}

	/// Receiver that observes every state change.
	pub fn subscribe(&self) -> watch::Receiver<SyncState<T>> {
		self.state.clone()
	}

	/// Run a tick as soon as the current one (if any) settles.
	///
	/// Requests made while a tick is running collapse into one follow-up tick.
	pub fn refresh(&self) {
		self.refresh.notify_one();
	}

	/// Stop scheduling ticks. An in-flight tick still completes.
	pub fn pause(&self) {
		self.send(Command::Pause);
	}

	/// Clear the pause flag, tick immediately and resume the regular interval.
	pub fn resume(&self) {
		self.send(Command::Resume);
	}

	/// Drop the sync position and cache, then bootstrap again from the current head.
	pub fn resync(&self) {
		self.send(Command::Resync);
	}

	/// Stop the engine. No state is published after this returns.
	pub fn dispose(&self) {
		if !self.shutdown.is_cancelled() {
			info!("Disposing chain sync engine");
			self.shutdown.cancel();
		}
	}

	pub fn is_disposed(&self) -> bool {
		self.shutdown.is_cancelled()
	}

	/// Dispose the engine and wait for the polling task to finish.
	///
	/// Returns the session statistics, or `None` if the task did not finish cleanly.
	pub async fn shutdown(mut self) -> Option<SyncStats> {
		self.dispose();
		let task = self.task.take()?;
		task.await.ok()
	}

	fn send(&self, command: Command) {
		if self.commands.send(command).is_err() {
			debug!(?command, "Sync loop has stopped, ignoring command");
		}
	}
}

impl<T> Drop for SyncEngine<T> {
	fn drop(&mut self) {
		self.shutdown.cancel();
	}
}

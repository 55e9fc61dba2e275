//! Threshold batching of events for one account's run.
//!
//! `push` appends to an in-memory batch. Once the batch grows past the flush threshold it is
//! swapped out and handed to a background worker over an unbounded channel, so pushing never
//! waits on the sink, however far behind the worker is. The worker emits batches strictly in
//! hand-off order. `drain` hands over the remainder, closes the channel and waits for every
//! in-flight flush.
//!
//! Threshold flushes are only awaited at drain time: if the process dies in between, batches
//! already handed off may be lost.

use crate::sink::EventSink;
use crate::sync::events::Event;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Default number of events that may accumulate before a flush.
pub const FLUSH_THRESHOLD: usize = 2000;

/// What the flush worker did over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
	/// Batches handed to the sink.
	pub batches: usize,
	/// Events contained in those batches.
	pub events: usize,
	pub failed_batches: usize,
	pub failed_events: usize,
}

impl FlushReport {
	fn record(&mut self, size: usize, ok: bool) {
		self.batches += 1;
		self.events += size;
		if !ok {
			self.failed_batches += 1;
			self.failed_events += size;
		}
	}

	fn merge(&mut self, other: FlushReport) {
		self.batches += other.batches;
		self.events += other.events;
		self.failed_batches += other.failed_batches;
		self.failed_events += other.failed_events;
	}
}

pub struct EventBatcher {
	hub_id: String,
	threshold: usize,
	pending: Vec<Event>,
	sender: mpsc::UnboundedSender<Vec<Event>>,
	worker: JoinHandle<FlushReport>,
	/// Batches that could not be handed to the worker.
	lost: FlushReport,
}

impl EventBatcher {
	/// Start the flush worker for one account.
	pub fn spawn(hub_id: &str, sink: Arc<dyn EventSink>, threshold: usize) -> Self {
		let (sender, receiver) = mpsc::unbounded_channel();
		let worker = tokio::spawn(flush_worker(hub_id.to_string(), sink, receiver));

		Self {
			hub_id: hub_id.to_string(),
			threshold,
			pending: Vec::new(),
			sender,
			worker,
			lost: FlushReport::default(),
		}
	}

	/// Events pushed but not yet handed off.
	#[cfg(test)]
	pub fn pending(&self) -> usize {
		self.pending.len()
	}

	pub fn push(&mut self, event: Event) {
		self.pending.push(event);
		if self.pending.len() > self.threshold {
			let batch = std::mem::take(&mut self.pending);
			info!(hub_id = %self.hub_id, events = batch.len(), "Flush threshold exceeded, handing off batch");
			self.hand_off(batch);
		}
	}

	pub fn extend(&mut self, events: impl IntoIterator<Item = Event>) {
		for event in events {
			self.push(event);
		}
	}

	fn hand_off(&mut self, batch: Vec<Event>) {
		let size = batch.len();
		if let Err(err) = self.sender.send(batch) {
			error!(
				hub_id = %self.hub_id,
				stage = "drain_events",
				events = size,
				"Flush worker is gone, dropping batch: {}",
				err
			);
			self.lost.record(size, false);
		}
	}

	/// Flush the remainder and wait until the worker has emitted everything.
	pub async fn drain(mut self) -> FlushReport {
		if !self.pending.is_empty() {
			let batch = std::mem::take(&mut self.pending);
			debug!(hub_id = %self.hub_id, events = batch.len(), "Handing off final batch");
			self.hand_off(batch);
		}

		let Self {
			hub_id,
			sender,
			worker,
			lost,
			..
		} = self;
		drop(sender);

		let mut report = match worker.await {
			Ok(report) => report,
			Err(err) => {
				error!(hub_id = %hub_id, stage = "drain_events", "Flush worker failed: {}", err);
				FlushReport::default()
			}
		};
		report.merge(lost);
		report
	}
}

async fn flush_worker(
	hub_id: String,
	sink: Arc<dyn EventSink>,
	mut receiver: mpsc::UnboundedReceiver<Vec<Event>>,
) -> FlushReport {
	let mut report = FlushReport::default();

	while let Some(batch) = receiver.recv().await {
		match sink.emit(&batch).await {
			Ok(()) => {
				debug!(hub_id = %hub_id, sink = sink.name(), events = batch.len(), "Batch emitted");
				report.record(batch.len(), true);
			}
			Err(err) => {
				error!(
					hub_id = %hub_id,
					stage = "drain_events",
					sink = sink.name(),
					events = batch.len(),
					"Failed to emit batch: {}",
					err
				);
				report.record(batch.len(), false);
			}
		}
	}

	report
}

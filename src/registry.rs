//! Bidirectional request/transport-task registry with per-task completion bookkeeping.
//!
//! Every in-flight transport task maps to exactly one logical request and back. An entry
//! survives until both "the task completed" and "metrics were gathered for the task" have
//! been observed, in either order, because the two signals arrive from independent callback
//! sources. Misuse (double binding, unknown keys, duplicate signals) is a contract violation in
//! the surrounding session layer and panics instead of returning an error.

pub mod shared;

pub use shared::TaskRegistry;

// self
use crate::{_prelude::*, obs};

/// Which side of the mapping a key belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyKind {
	/// Transport task key.
	Task,
	/// Logical request key.
	Request,
}
impl KeyKind {
	/// Returns a stable label suitable for messages.
	pub const fn as_str(self) -> &'static str {
		match self {
			KeyKind::Task => "task",
			KeyKind::Request => "request",
		}
	}
}
impl Display for KeyKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Lifecycle signal reported for a transport task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskSignal {
	/// The network operation finished.
	Completed,
	/// Diagnostic metrics were collected.
	MetricsGathered,
}
impl TaskSignal {
	/// Returns a stable label suitable for messages.
	pub const fn as_str(self) -> &'static str {
		match self {
			TaskSignal::Completed => "completed",
			TaskSignal::MetricsGathered => "metrics_gathered",
		}
	}
}
impl Display for TaskSignal {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Signals observed so far for one bound task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TaskEvents {
	/// The task reported completion.
	pub completed: bool,
	/// Metrics were gathered for the task.
	pub metrics_gathered: bool,
}

/// Registry contract violations; each one aborts the offending call with a panic.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RegistryViolation {
	/// The key is already bound.
	#[error("The {kind} {key} is already bound.")]
	DuplicateBinding {
		/// Side of the mapping the key belongs to.
		kind: KeyKind,
		/// Debug rendering of the key.
		key: String,
	},
	/// The key is not bound.
	#[error("The {kind} {key} is not bound.")]
	UnknownKey {
		/// Side of the mapping the key belongs to.
		kind: KeyKind,
		/// Debug rendering of the key.
		key: String,
	},
	/// The task already reported this signal.
	#[error("The task {task} already reported {signal}.")]
	DuplicateCompletionSignal {
		/// Repeated signal.
		signal: TaskSignal,
		/// Debug rendering of the task.
		task: String,
	},
}

/// Mirror-image maps between transport tasks and logical requests.
///
/// The three internal maps always hold the same set of tasks: `bind` creates all three
/// records and every removal deletes all three.
#[derive(Clone)]
pub struct RequestTaskMap<T, R> {
	task_to_request: HashMap<T, R>,
	request_to_task: HashMap<R, T>,
	task_events: HashMap<T, TaskEvents>,
	gathers_metrics: bool,
}
impl<T, R> RequestTaskMap<T, R>
where
	T: Clone + Debug + Eq + Hash,
	R: Clone + Debug + Eq + Hash,
{
	/// Creates an empty map that waits for both completion and metrics before unbinding.
	pub fn new() -> Self {
		Self {
			task_to_request: HashMap::new(),
			request_to_task: HashMap::new(),
			task_events: HashMap::new(),
			gathers_metrics: true,
		}
	}

	/// Creates an empty map for transports that never gather metrics; completion alone unbinds.
	pub fn without_metrics() -> Self {
		Self { gathers_metrics: false, ..Self::new() }
	}

	/// Returns `true` when entries wait for the metrics signal.
	pub fn gathers_metrics(&self) -> bool {
		self.gathers_metrics
	}

	/// Binds `task` to `request` with fresh events.
	///
	/// # Panics
	///
	/// Panics with [`RegistryViolation::DuplicateBinding`] if either key is already bound.
	pub fn bind(&mut self, task: T, request: R) {
		if self.task_to_request.contains_key(&task) {
			violated(RegistryViolation::DuplicateBinding { kind: KeyKind::Task, key: format!("{task:?}") });
		}
		if self.request_to_task.contains_key(&request) {
			violated(RegistryViolation::DuplicateBinding {
				kind: KeyKind::Request,
				key: format!("{request:?}"),
			});
		}

		self.task_to_request.insert(task.clone(), request.clone());
		self.request_to_task.insert(request, task.clone());
		self.task_events.insert(task, TaskEvents::default());
		self.check_invariants();
	}

	/// Removes the entry for `task` and returns the request it was bound to.
	///
	/// # Panics
	///
	/// Panics with [`RegistryViolation::UnknownKey`] if `task` is not bound.
	pub fn unbind_task(&mut self, task: &T) -> R {
		let Some(request) = self.task_to_request.remove(task) else {
			violated(RegistryViolation::UnknownKey { kind: KeyKind::Task, key: format!("{task:?}") });
		};

		self.request_to_task.remove(&request);
		self.task_events.remove(task);
		self.check_invariants();

		request
	}

	/// Removes the entry for `request` and returns the task it was bound to.
	///
	/// # Panics
	///
	/// Panics with [`RegistryViolation::UnknownKey`] if `request` is not bound.
	pub fn unbind_request(&mut self, request: &R) -> T {
		let Some(task) = self.request_to_task.remove(request) else {
			violated(RegistryViolation::UnknownKey {
				kind: KeyKind::Request,
				key: format!("{request:?}"),
			});
		};

		self.task_to_request.remove(&task);
		self.task_events.remove(&task);
		self.check_invariants();

		task
	}

	/// Records that metrics were gathered for `task`.
	///
	/// Returns `true` when this was the last missing signal and the entry was removed.
	///
	/// # Panics
	///
	/// Panics if `task` is unknown or already reported its metrics.
	pub fn on_metrics_gathered(&mut self, task: &T) -> bool {
		let events = self.events_mut(task);

		match (events.completed, events.metrics_gathered) {
			(_, true) => violated(RegistryViolation::DuplicateCompletionSignal {
				signal: TaskSignal::MetricsGathered,
				task: format!("{task:?}"),
			}),
			(false, false) => {
				events.metrics_gathered = true;

				false
			},
			(true, false) => {
				self.unbind_task(task);

				true
			},
		}
	}

	/// Records that `task` completed.
	///
	/// Returns `true` when this was the last missing signal and the entry was removed.
	///
	/// # Panics
	///
	/// Panics if `task` is unknown or already reported completion.
	pub fn on_completed(&mut self, task: &T) -> bool {
		let gathers_metrics = self.gathers_metrics;
		let events = self.events_mut(task);

		match (events.completed, events.metrics_gathered) {
			(true, _) => violated(RegistryViolation::DuplicateCompletionSignal {
				signal: TaskSignal::Completed,
				task: format!("{task:?}"),
			}),
			_ if !gathers_metrics => {
				self.unbind_task(task);

				true
			},
			(false, false) => {
				events.completed = true;

				false
			},
			(false, true) => {
				self.unbind_task(task);

				true
			},
		}
	}

	/// Request bound to `task`.
	pub fn request_for(&self, task: &T) -> Option<&R> {
		self.task_to_request.get(task)
	}

	/// Task bound to `request`.
	pub fn task_for(&self, request: &R) -> Option<&T> {
		self.request_to_task.get(request)
	}

	/// Signals recorded so far for `task`.
	pub fn events_for(&self, task: &T) -> Option<TaskEvents> {
		self.task_events.get(task).copied()
	}

	/// Iterates over every bound request, in no particular order.
	pub fn requests(&self) -> impl Iterator<Item = &R> {
		self.task_to_request.values()
	}

	/// Number of bound task/request pairs.
	pub fn len(&self) -> usize {
		self.task_to_request.len()
	}

	/// Returns `true` when nothing is bound.
	pub fn is_empty(&self) -> bool {
		self.task_to_request.is_empty()
	}

	/// Number of tracked event records; always equal to [`RequestTaskMap::len`].
	pub fn event_count(&self) -> usize {
		self.task_events.len()
	}

	fn events_mut(&mut self, task: &T) -> &mut TaskEvents {
		match self.task_events.get_mut(task) {
			Some(events) => events,
			None =>
				violated(RegistryViolation::UnknownKey { kind: KeyKind::Task, key: format!("{task:?}") }),
		}
	}

	fn check_invariants(&self) {
		debug_assert_eq!(self.task_to_request.len(), self.request_to_task.len());
		debug_assert_eq!(self.task_to_request.len(), self.task_events.len());
	}
}
impl<T, R> Default for RequestTaskMap<T, R>
where
	T: Clone + Debug + Eq + Hash,
	R: Clone + Debug + Eq + Hash,
{
	fn default() -> Self {
		Self::new()
	}
}
impl<T, R> Debug for RequestTaskMap<T, R>
where
	T: Debug,
	R: Debug,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestTaskMap")
			.field("task_to_request", &self.task_to_request)
			.field("task_events", &self.task_events)
			.field("gathers_metrics", &self.gathers_metrics)
			.finish()
	}
}

fn violated(violation: RegistryViolation) -> ! {
	obs::error_registry_violation(&violation);

	panic!("{violation}")
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn bound(task: u64, request: &'static str) -> RequestTaskMap<u64, &'static str> {
		let mut map = RequestTaskMap::new();

		map.bind(task, request);

		map
	}

	#[test]
	fn bind_creates_all_three_records() {
		let map = bound(1, "a");

		assert_eq!(map.request_for(&1), Some(&"a"));
		assert_eq!(map.task_for(&"a"), Some(&1));
		assert_eq!(map.events_for(&1), Some(TaskEvents::default()));
		assert_eq!((map.len(), map.event_count()), (1, 1));
	}

	#[test]
	fn completion_then_metrics_unbinds_on_the_second_signal() {
		let mut map = bound(1, "a");

		assert!(!map.on_completed(&1));
		assert_eq!(map.events_for(&1), Some(TaskEvents { completed: true, metrics_gathered: false }));
		assert!(map.on_metrics_gathered(&1));
		assert!(map.is_empty());
		assert_eq!(map.event_count(), 0);
		assert!(map.task_for(&"a").is_none());
	}

	#[test]
	fn metrics_then_completion_unbinds_on_the_second_signal() {
		let mut map = bound(1, "a");

		assert!(!map.on_metrics_gathered(&1));
		assert_eq!(map.len(), 1);
		assert!(map.on_completed(&1));
		assert!(map.is_empty());
	}

	#[test]
	fn completion_alone_unbinds_without_metrics() {
		let mut map = RequestTaskMap::without_metrics();

		map.bind(7_u64, "b");

		assert!(!map.gathers_metrics());
		assert!(map.on_completed(&7));
		assert!(map.is_empty());
	}

	#[test]
	#[should_panic(expected = "is not bound")]
	fn late_metrics_after_completion_without_metrics_panics() {
		let mut map = RequestTaskMap::without_metrics();

		map.bind(7_u64, "b");

		assert!(map.on_completed(&7));

		map.on_metrics_gathered(&7);
	}

	#[test]
	fn unbind_by_either_key_removes_every_record() {
		let mut map = bound(1, "a");

		map.bind(2, "b");

		assert_eq!(map.unbind_request(&"a"), 1);
		assert_eq!(map.unbind_task(&2), "b");
		assert!(map.is_empty());
		assert_eq!(map.event_count(), 0);
	}

	#[test]
	#[should_panic(expected = "The task 1 is already bound.")]
	fn double_bind_of_a_task_panics() {
		let mut map = bound(1, "a");

		map.bind(1, "b");
	}

	#[test]
	#[should_panic(expected = "The request \"a\" is already bound.")]
	fn double_bind_of_a_request_panics() {
		let mut map = bound(1, "a");

		map.bind(2, "a");
	}

	#[test]
	#[should_panic(expected = "is not bound")]
	fn unbinding_an_unknown_task_panics() {
		RequestTaskMap::<u64, &str>::new().unbind_task(&9);
	}

	#[test]
	#[should_panic(expected = "already reported completed")]
	fn duplicate_completion_panics() {
		let mut map = bound(1, "a");

		map.on_completed(&1);
		map.on_completed(&1);
	}

	#[test]
	#[should_panic(expected = "already reported metrics_gathered")]
	fn duplicate_metrics_panics() {
		let mut map = bound(1, "a");

		map.on_metrics_gathered(&1);
		map.on_metrics_gathered(&1);
	}

	#[test]
	#[should_panic(expected = "is not bound")]
	fn signal_for_an_unknown_task_panics() {
		RequestTaskMap::<u64, &str>::new().on_metrics_gathered(&3);
	}
}

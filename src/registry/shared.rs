//! Thread-safe [`RequestTaskMap`] handle for sessions driven by concurrent network callbacks.

// self
use crate::{
	_prelude::*,
	registry::{RequestTaskMap, TaskEvents},
};

type SharedMap<T, R> = Arc<Mutex<RequestTaskMap<T, R>>>;

/// Cloneable registry handle; every operation runs under a single lock.
///
/// Lookups return owned clones so no caller ever holds a reference into the map across a
/// suspension point.
pub struct TaskRegistry<T, R>(SharedMap<T, R>);
impl<T, R> TaskRegistry<T, R>
where
	T: Clone + Debug + Eq + Hash,
	R: Clone + Debug + Eq + Hash,
{
	/// Creates an empty registry that waits for both completion and metrics.
	pub fn new() -> Self {
		Self(Arc::new(Mutex::new(RequestTaskMap::new())))
	}

	/// Creates an empty registry for transports that never gather metrics.
	pub fn without_metrics() -> Self {
		Self(Arc::new(Mutex::new(RequestTaskMap::without_metrics())))
	}

	/// See [`RequestTaskMap::bind`].
	pub fn bind(&self, task: T, request: R) {
		self.0.lock().bind(task, request);
	}

	/// See [`RequestTaskMap::unbind_task`].
	pub fn unbind_task(&self, task: &T) -> R {
		self.0.lock().unbind_task(task)
	}

	/// See [`RequestTaskMap::unbind_request`].
	pub fn unbind_request(&self, request: &R) -> T {
		self.0.lock().unbind_request(request)
	}

	/// See [`RequestTaskMap::on_completed`].
	pub fn on_completed(&self, task: &T) -> bool {
		self.0.lock().on_completed(task)
	}

	/// See [`RequestTaskMap::on_metrics_gathered`].
	pub fn on_metrics_gathered(&self, task: &T) -> bool {
		self.0.lock().on_metrics_gathered(task)
	}

	/// Request bound to `task`.
	pub fn request_for(&self, task: &T) -> Option<R> {
		self.0.lock().request_for(task).cloned()
	}

	/// Task bound to `request`.
	pub fn task_for(&self, request: &R) -> Option<T> {
		self.0.lock().task_for(request).cloned()
	}

	/// Signals recorded so far for `task`.
	pub fn events_for(&self, task: &T) -> Option<TaskEvents> {
		self.0.lock().events_for(task)
	}

	/// Snapshot of every bound request.
	pub fn requests(&self) -> Vec<R> {
		self.0.lock().requests().cloned().collect()
	}

	/// Number of bound task/request pairs.
	pub fn len(&self) -> usize {
		self.0.lock().len()
	}

	/// Returns `true` when nothing is bound.
	pub fn is_empty(&self) -> bool {
		self.0.lock().is_empty()
	}

	/// Number of tracked event records.
	pub fn event_count(&self) -> usize {
		self.0.lock().event_count()
	}

	/// Runs `f` against the map while holding the lock, for multi-step reads.
	pub fn inspect<O>(&self, f: impl FnOnce(&RequestTaskMap<T, R>) -> O) -> O {
		f(&*self.0.lock())
	}
}
impl<T, R> Clone for TaskRegistry<T, R> {
	fn clone(&self) -> Self {
		Self(self.0.clone())
	}
}
impl<T, R> Default for TaskRegistry<T, R>
where
	T: Clone + Debug + Eq + Hash,
	R: Clone + Debug + Eq + Hash,
{
	fn default() -> Self {
		Self::new()
	}
}
impl<T, R> Debug for TaskRegistry<T, R>
where
	T: Debug,
	R: Debug,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TaskRegistry").field(&*self.0.lock()).finish()
	}
}

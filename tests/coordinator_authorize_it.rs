// std
use std::time::Duration as StdDuration;
// crates.io
use tokio::runtime::{Builder, Runtime};
// self
use auth_coordinator::{
	_preludet::*,
	coordinator::RefreshWindow,
};

fn current_thread_runtime() -> Runtime {
	Builder::new_current_thread().enable_all().build().expect("Runtime should build.")
}

#[tokio::test]
async fn fresh_credential_signs_immediately() {
	let coordinator =
		build_mock_coordinator(MockAuthenticator::new(), Some(MockCredential::fresh("live")));
	let signed = coordinator
		.authorize(MockRequest::new("r1"), &())
		.await
		.expect("A fresh credential should sign the request.");

	assert_eq!(signed.authorization.as_deref(), Some("Bearer live"));
	assert_eq!(coordinator.authenticator().refresh_calls(), 0);
	assert!(coordinator.refresh_history().is_empty());
}

#[tokio::test]
async fn missing_credential_fails_immediately() {
	let coordinator = build_mock_coordinator(MockAuthenticator::new(), None);
	let err = coordinator
		.authorize(MockRequest::new("r1"), &())
		.await
		.expect_err("Authorization without a credential should fail.");

	assert!(matches!(err, Error::MissingCredential));
	assert_eq!(coordinator.authenticator().refresh_calls(), 0);
}

#[tokio::test]
async fn cleared_credential_fails_with_missing_credential() {
	let coordinator =
		build_mock_coordinator(MockAuthenticator::new(), Some(MockCredential::fresh("live")));

	coordinator.set_credential(None);

	let err = coordinator
		.authorize(MockRequest::new("r1"), &())
		.await
		.expect_err("Authorization after clearing the credential should fail.");

	assert!(matches!(err, Error::MissingCredential));
	assert!(coordinator.credential().is_none());
}

#[tokio::test]
async fn concurrent_authorizations_share_one_refresh() {
	let coordinator = build_mock_coordinator(
		MockAuthenticator::new().held(),
		Some(MockCredential::stale("expired")),
	);
	let first = tokio::spawn({
		let coordinator = coordinator.clone();

		async move { coordinator.authorize(MockRequest::new("first"), &()).await }
	});
	let second = tokio::spawn({
		let coordinator = coordinator.clone();

		async move { coordinator.authorize(MockRequest::new("second"), &()).await }
	});

	wait_until("the refresh starts", || coordinator.authenticator().refresh_calls() == 1).await;
	tokio::time::sleep(StdDuration::from_millis(20)).await;

	assert!(coordinator.is_refreshing());
	assert!(!first.is_finished(), "No waiter may be answered before the refresh resolves.");
	assert!(!second.is_finished(), "No waiter may be answered before the refresh resolves.");

	coordinator.authenticator().release(1);

	let first = first.await.expect("First task should not panic.").expect("First should sign.");
	let second = second.await.expect("Second task should not panic.").expect("Second should sign.");

	assert_eq!(first.authorization.as_deref(), Some("Bearer refreshed-1"));
	assert_eq!(second.authorization.as_deref(), Some("Bearer refreshed-1"));
	assert_eq!(coordinator.authenticator().refresh_calls(), 1);
	assert_eq!(coordinator.authenticator().refreshed_from(), vec!["expired".to_string()]);
	assert_eq!(coordinator.refresh_history().len(), 1);
	assert!(!coordinator.is_refreshing());
	assert_eq!(coordinator.credential(), Some(MockCredential::fresh("refreshed-1")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_concurrent_waiter_gets_exactly_one_answer() {
	let coordinator = build_mock_coordinator(
		MockAuthenticator::new().held(),
		Some(MockCredential::stale("expired")),
	);
	let handles: Vec<_> = (0..32)
		.map(|i| {
			let coordinator = coordinator.clone();

			tokio::spawn(async move {
				coordinator.authorize(MockRequest::new(format!("r{i}")), &()).await
			})
		})
		.collect();

	wait_until("the refresh starts", || coordinator.authenticator().refresh_calls() == 1).await;
	tokio::time::sleep(StdDuration::from_millis(20)).await;

	assert!(handles.iter().all(|handle| !handle.is_finished()));

	coordinator.authenticator().release(1);

	for (i, handle) in handles.into_iter().enumerate() {
		let signed = handle
			.await
			.expect("Authorization task should not panic.")
			.expect("Every queued authorization should be signed after the refresh.");

		assert_eq!(signed.id, format!("r{i}"));
		assert_eq!(signed.authorization.as_deref(), Some("Bearer refreshed-1"));
	}

	assert_eq!(coordinator.authenticator().refresh_calls(), 1);
	assert_eq!(coordinator.metrics().attempts(), 1);
	assert_eq!(coordinator.metrics().successes(), 1);
}

#[tokio::test]
async fn requests_after_a_refresh_use_the_new_credential() {
	let coordinator =
		build_mock_coordinator(MockAuthenticator::new(), Some(MockCredential::stale("expired")));

	coordinator.authorize(MockRequest::new("r1"), &()).await.expect("First request should sign.");

	let signed = coordinator
		.authorize(MockRequest::new("r2"), &())
		.await
		.expect("Second request should sign without queuing.");

	assert_eq!(signed.authorization.as_deref(), Some("Bearer refreshed-1"));
	assert_eq!(coordinator.authenticator().refresh_calls(), 1);
}

#[tokio::test]
async fn refresh_failure_fails_every_queued_authorization() {
	let authenticator = MockAuthenticator::new()
		.held()
		.with_script([RefreshScript::Fail("refresh token revoked".into())]);
	let coordinator = build_mock_coordinator(authenticator, Some(MockCredential::stale("expired")));
	let handles: Vec<_> = (0..3)
		.map(|i| {
			let coordinator = coordinator.clone();

			tokio::spawn(async move {
				coordinator.authorize(MockRequest::new(format!("r{i}")), &()).await
			})
		})
		.collect();

	wait_until("the refresh starts", || coordinator.authenticator().refresh_calls() == 1).await;
	tokio::time::sleep(StdDuration::from_millis(20)).await;
	coordinator.authenticator().release(1);

	for handle in handles {
		let err = handle
			.await
			.expect("Authorization task should not panic.")
			.expect_err("Queued authorizations should fail with the refresh error.");

		assert!(matches!(err, Error::RefreshFailed { .. }));
		assert!(err.to_string().contains("refresh token revoked"));
	}

	assert_eq!(coordinator.credential(), Some(MockCredential::stale("expired")));
	assert_eq!(coordinator.metrics().failures(), 1);
	assert!(!coordinator.is_refreshing());
}

#[tokio::test]
async fn sixth_refresh_inside_the_window_is_rejected_without_calling_the_authenticator() {
	// Every refresh yields another stale credential, so one authorization keeps refreshing
	// until the window gives out.
	let authenticator = MockAuthenticator::new()
		.with_script((0..10).map(|i| RefreshScript::Succeed(MockCredential::stale(format!("s{i}")))));
	let window =
		RefreshWindow::new(Duration::seconds(30), 5).expect("Window fixture should be valid.");
	let coordinator =
		build_mock_coordinator(authenticator, Some(MockCredential::stale("expired")))
			.with_refresh_window(Some(window));
	let err = coordinator
		.authorize(MockRequest::new("r1"), &())
		.await
		.expect_err("Refresh churn should be rejected by the window.");

	assert!(matches!(err, Error::ExcessiveRefresh));
	assert_eq!(coordinator.authenticator().refresh_calls(), 5);
	assert_eq!(coordinator.refresh_history().len(), 5);
	assert_eq!(coordinator.metrics().rejections(), 1);
	assert_eq!(coordinator.credential(), Some(MockCredential::stale("s4")));
	assert!(!coordinator.is_refreshing());
}

#[tokio::test]
async fn disabled_window_allows_unbounded_refreshes() {
	let authenticator = MockAuthenticator::new().with_script(
		(0..7)
			.map(|i| RefreshScript::Succeed(MockCredential::stale(format!("s{i}"))))
			.chain([RefreshScript::Succeed(MockCredential::fresh("settled"))]),
	);
	let coordinator =
		build_mock_coordinator(authenticator, Some(MockCredential::stale("expired")))
			.with_refresh_window(None);
	let signed = coordinator
		.authorize(MockRequest::new("r1"), &())
		.await
		.expect("Without a window the refresh loop should eventually settle.");

	assert_eq!(signed.authorization.as_deref(), Some("Bearer settled"));
	assert_eq!(coordinator.authenticator().refresh_calls(), 8);
}

#[tokio::test]
async fn panicking_refresh_releases_waiters_as_abandoned() {
	let authenticator = MockAuthenticator::new().with_script([RefreshScript::Panic]);
	let coordinator = build_mock_coordinator(authenticator, Some(MockCredential::stale("expired")));
	let err = coordinator
		.authorize(MockRequest::new("r1"), &())
		.await
		.expect_err("A panicking refresh should not leave the waiter hanging.");

	assert!(matches!(err, Error::RefreshAbandoned));
	assert!(!coordinator.is_refreshing());
	assert_eq!(coordinator.metrics().failures(), 1);

	let signed = coordinator
		.authorize(MockRequest::new("r2"), &())
		.await
		.expect("The coordinator should recover after an abandoned refresh.");

	assert_eq!(signed.authorization.as_deref(), Some("Bearer refreshed-2"));
}

#[test]
fn runtime_shutdown_mid_refresh_releases_the_coordinator() {
	let coordinator = build_mock_coordinator(
		MockAuthenticator::new().held(),
		Some(MockCredential::stale("expired")),
	);
	let first = current_thread_runtime();

	first.block_on(async {
		let orphaned = tokio::spawn({
			let coordinator = coordinator.clone();

			async move { coordinator.authorize(MockRequest::new("orphaned"), &()).await }
		});

		wait_until("the refresh starts", || coordinator.authenticator().refresh_calls() == 1).await;

		assert!(!orphaned.is_finished());
	});
	drop(first);

	assert!(!coordinator.is_refreshing(), "A dropped refresh task must clear the in-flight flag.");
	assert_eq!(coordinator.metrics().failures(), 1);

	coordinator.authenticator().release(1);

	let second = current_thread_runtime();
	let signed = second
		.block_on(async {
			tokio::time::timeout(
				StdDuration::from_millis(500),
				coordinator.authorize(MockRequest::new("after"), &()),
			)
			.await
		})
		.expect("Authorization on a new runtime should not wait on the dropped refresh.")
		.expect("Authorization on a new runtime should start its own refresh and sign.");

	assert_eq!(signed.authorization.as_deref(), Some("Bearer refreshed-2"));
	assert_eq!(coordinator.metrics().snapshot().in_flight(), 0);
}

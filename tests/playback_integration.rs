//! Integration tests driving full playback runs through the public API

use std::time::Duration;

use app_replay::{
    DecisionReply, ElementSelector, FailureMode, FileCacheStore, Guardrails, MockDecision,
    MockDevice, MockElement, MockScreen, PlaybackOptions, ProbeStrategy, Recording,
    ResolutionMethod, RunState, Session, Step, StepExecutor,
};

fn fast_options() -> PlaybackOptions {
    PlaybackOptions::default()
        .guardrails(
            Guardrails::default()
                .step_timeout(Duration::from_secs(2))
                .run_timeout(Duration::from_secs(30)),
        )
        .step_retries(1)
        .retry_delay(Duration::from_millis(1))
}

fn checkout_device() -> MockDevice {
    let mut device = MockDevice::new();
    device.push_screen(
        MockScreen::named("home")
            .with(MockElement::new().identifier("cart_button").label("Cart"))
            .with(MockElement::new().accessibility_label("Search products")),
    );
    device.push_screen(
        MockScreen::named("cart")
            .with(MockElement::new().identifier("checkout_button").label("Checkout")),
    );
    device.push_screen(
        MockScreen::named("checkout").with(MockElement::new().label("Order placed")),
    );
    device
}

#[test]
fn full_walkthrough_produces_result_and_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCacheStore::new(dir.path().join("cache"));
    let session = Session::in_dir(dir.path().join("session"));
    session.init().unwrap();

    let recording = Recording::new(
        "checkout",
        vec![
            Step::tap(ElementSelector::by_identifier("cart_button")).capture(),
            Step::tap(ElementSelector::by_identifier("checkout_button")).capture(),
        ],
    );

    let mut device = checkout_device();
    let result =
        StepExecutor::new(&mut device, &store, &session, fast_options()).run(&recording);

    assert_eq!(result.state, RunState::Completed);
    assert!(result.passed());
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.artifacts.len(), 2);
    for artifact in &result.artifacts {
        assert!(artifact.exists());
        assert!(artifact.with_extension("json").exists());
    }

    let manifest = session.write_result(&result).unwrap();
    let reparsed: app_replay::PlaybackResult =
        serde_json::from_str(&std::fs::read_to_string(manifest).unwrap()).unwrap();
    assert_eq!(reparsed.success_count, 2);
}

#[test]
fn over_long_recording_fails_preflight_with_zero_steps() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCacheStore::new(dir.path().join("cache"));
    let session = Session::in_dir(dir.path().join("session"));

    let recording = Recording::new(
        "too_long",
        (0..5)
            .map(|_| Step::tap(ElementSelector::by_identifier("cart_button")))
            .collect(),
    );
    let options = fast_options().guardrails(
        Guardrails::default()
            .max_steps(3)
            .step_timeout(Duration::from_secs(2)),
    );

    let mut device = checkout_device();
    let result = StepExecutor::new(&mut device, &store, &session, options).run(&recording);

    assert!(result.steps.is_empty());
    assert!(result.artifacts.is_empty());
    assert!(result.error.as_deref().unwrap().starts_with("MAX_STEPS_EXCEEDED"));
    assert!(device.calls().is_empty());
}

#[test]
fn label_only_selector_reports_label_method() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCacheStore::new(dir.path().join("cache"));
    let session = Session::in_dir(dir.path().join("session"));

    let mut device = MockDevice::with_screen(
        MockScreen::named("login").with(MockElement::new().label("Log In")),
    );
    let recording = Recording::new(
        "label_only",
        vec![Step::tap(ElementSelector::by_label("Log In"))],
    );

    let result =
        StepExecutor::new(&mut device, &store, &session, fast_options()).run(&recording);

    assert!(result.passed());
    let resolved = result.steps[0].resolved.as_ref().unwrap();
    assert_eq!(resolved.method, ResolutionMethod::Label);
    assert!(!resolved.used_fallback);
}

#[test]
fn forbidden_value_blocks_step_before_any_backend_call() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCacheStore::new(dir.path().join("cache"));
    let session = Session::in_dir(dir.path().join("session"));

    let mut device = checkout_device();
    let recording = Recording::new(
        "danger",
        vec![Step::type_text(
            ElementSelector::by_identifier("confirm_field"),
            "Delete Account",
        )],
    );
    let options = fast_options()
        .guardrails(
            Guardrails::default()
                .forbidden_actions(vec!["delete".to_string()])
                .step_timeout(Duration::from_secs(2)),
        );

    let result = StepExecutor::new(&mut device, &store, &session, options).run(&recording);

    assert_eq!(result.failure_count, 1);
    assert!(
        result.steps[0]
            .error
            .as_deref()
            .unwrap()
            .starts_with("FORBIDDEN_ACTION")
    );
    assert!(device.calls().is_empty());
}

#[test]
fn run_timeout_stops_gracefully_between_wait_steps() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCacheStore::new(dir.path().join("cache"));
    let session = Session::in_dir(dir.path().join("session"));

    let mut device = MockDevice::with_screen(MockScreen::named("idle"));
    let recording = Recording::new(
        "slow",
        vec![Step::wait_ms(300), Step::wait_ms(300), Step::wait_ms(300)],
    );
    let options =
        fast_options().guardrails(Guardrails::default().run_timeout(Duration::from_millis(500)));

    let result = StepExecutor::new(&mut device, &store, &session, options).run(&recording);

    assert_eq!(result.state, RunState::TimedOut);
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.failure_count, 0);
    assert!(result.error.is_none());
}

#[test]
fn stale_cache_entry_falls_through_to_fresh_resolution() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCacheStore::new(dir.path().join("cache"));

    let recording = Recording::new(
        "drift",
        vec![Step::tap(
            ElementSelector::by_identifier("cart_button").label("Cart"),
        )],
    );

    // First run resolves by identifier and persists the cache
    {
        let session = Session::in_dir(dir.path().join("s1"));
        let mut device = checkout_device();
        let result =
            StepExecutor::new(&mut device, &store, &session, fast_options()).run(&recording);
        assert!(result.passed());
        assert_eq!(
            result.steps[0].resolved.as_ref().unwrap().method,
            ResolutionMethod::Identifier
        );
    }

    // The identifier disappears from the app; the cached entry misses and
    // the cascade recovers via the visible label, without any fallback
    let session = Session::in_dir(dir.path().join("s2"));
    let mut device = MockDevice::new();
    device.push_screen(MockScreen::named("home").with(MockElement::new().label("Cart")));
    device.push_screen(MockScreen::named("cart"));

    let result =
        StepExecutor::new(&mut device, &store, &session, fast_options()).run(&recording);

    assert!(result.passed());
    let resolved = result.steps[0].resolved.as_ref().unwrap();
    assert_eq!(resolved.method, ResolutionMethod::Label);
    assert!(!resolved.used_fallback);
}

#[test]
fn abort_mode_without_fallback_skips_later_steps() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCacheStore::new(dir.path().join("cache"));
    let session = Session::in_dir(dir.path().join("session"));

    let mut device = checkout_device();
    let recording = Recording::new(
        "abort",
        vec![
            Step::tap(ElementSelector::by_identifier("missing_everywhere")),
            Step::tap(ElementSelector::by_identifier("cart_button")),
            Step::tap(ElementSelector::by_identifier("checkout_button")),
        ],
    );
    let options = fast_options().failure_mode(FailureMode::Abort);

    let result = StepExecutor::new(&mut device, &store, &session, options).run(&recording);

    assert_eq!(result.state, RunState::Aborted);
    assert_eq!(result.steps.len(), 1);
    // Later steps never issued a tap
    assert!(device.calls().iter().all(|c| !c.starts_with("tap")));
}

#[test]
fn warm_cache_replay_is_idempotent_and_model_free() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCacheStore::new(dir.path().join("cache"));

    let recording = Recording::new(
        "idempotent",
        vec![
            Step::tap(ElementSelector::by_identifier("cart_button")),
            Step::tap(ElementSelector::by_identifier("checkout_button")),
        ],
    );

    {
        let session = Session::in_dir(dir.path().join("s1"));
        let mut device = checkout_device();
        let result =
            StepExecutor::new(&mut device, &store, &session, fast_options()).run(&recording);
        assert!(result.passed());
    }

    let session = Session::in_dir(dir.path().join("s2"));
    let mut device = checkout_device();
    let mut decision = MockDecision::new();
    let result = StepExecutor::new(&mut device, &store, &session, fast_options())
        .with_fallback(&mut decision)
        .run(&recording);

    assert!(result.passed());
    for step in &result.steps {
        assert_eq!(
            step.resolved.as_ref().unwrap().method,
            ResolutionMethod::Cached
        );
    }
    assert_eq!(decision.call_count(), 0);
    assert_eq!(result.fallback_calls, 0);
}

#[test]
fn editing_the_recording_invalidates_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCacheStore::new(dir.path().join("cache"));

    let original = Recording::new(
        "edited",
        vec![Step::tap(ElementSelector::by_identifier("cart_button"))],
    );

    {
        let session = Session::in_dir(dir.path().join("s1"));
        let mut device = checkout_device();
        assert!(
            StepExecutor::new(&mut device, &store, &session, fast_options())
                .run(&original)
                .passed()
        );
    }

    // Same id, extra step: different template hash, cold cache
    let edited = Recording::new(
        "edited",
        vec![
            Step::tap(ElementSelector::by_identifier("cart_button")),
            Step::tap(ElementSelector::by_identifier("checkout_button")),
        ],
    );
    let session = Session::in_dir(dir.path().join("s2"));
    let mut device = checkout_device();
    let result =
        StepExecutor::new(&mut device, &store, &session, fast_options()).run(&edited);

    assert!(result.passed());
    assert_eq!(
        result.steps[0].resolved.as_ref().unwrap().method,
        ResolutionMethod::Identifier
    );
}

#[test]
fn checkpoint_violations_fail_the_step_after_the_action() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCacheStore::new(dir.path().join("cache"));
    let session = Session::in_dir(dir.path().join("session"));

    let mut device = checkout_device();
    let recording = Recording::new(
        "checkpointed",
        vec![
            Step::tap(ElementSelector::by_identifier("cart_button")).checkpoint(
                app_replay::Checkpoint {
                    required_elements: vec!["Checkout".to_string()],
                    forbidden_elements: vec!["Cart is empty".to_string()],
                    expected_screen: Some("cart".to_string()),
                },
            ),
            Step::tap(ElementSelector::by_identifier("checkout_button")).checkpoint(
                app_replay::Checkpoint {
                    required_elements: vec!["No Such Element".to_string()],
                    ..Default::default()
                },
            ),
        ],
    );
    let options = fast_options().failure_mode(FailureMode::Continue);

    let result = StepExecutor::new(&mut device, &store, &session, options).run(&recording);

    assert_eq!(result.success_count, 1);
    assert_eq!(result.failure_count, 1);
    assert!(
        result.steps[1]
            .error
            .as_deref()
            .unwrap()
            .starts_with("VERIFICATION_FAILED")
    );
}

#[test]
fn fallback_recovers_renamed_element_and_records_cost() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCacheStore::new(dir.path().join("cache"));
    let session = Session::in_dir(dir.path().join("session"));

    let mut device = MockDevice::new();
    device.push_screen(
        MockScreen::named("login").with(MockElement::new().label("Sign In")),
    );
    device.push_screen(MockScreen::named("home"));

    let mut decision = MockDecision::new();
    decision.push_reply(DecisionReply {
        selector: "Sign In".to_string(),
        strategy: ProbeStrategy::Label,
        reasoning: Some("login button was relabeled".to_string()),
        model: "qwen3".to_string(),
        tokens: 180,
    });

    let recording = Recording::new(
        "renamed",
        vec![Step::tap(ElementSelector::by_label("Log In"))],
    );
    let options = fast_options().failure_mode(FailureMode::Continue);

    let result = StepExecutor::new(&mut device, &store, &session, options)
        .with_fallback(&mut decision)
        .run(&recording);

    assert!(result.failure_count == 0);
    assert_eq!(result.fallback_calls, 1);
    assert!(result.cost_usd > 0.0);
    let resolved = result.steps[0].resolved.as_ref().unwrap();
    assert!(resolved.used_fallback);
    assert_eq!(resolved.method, ResolutionMethod::Model("qwen3".to_string()));
}

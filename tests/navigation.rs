mod common;

use std::time::{Duration, Instant};

use adaptive_extractor::NavigationController;
use adaptive_extractor::config::NavigationPolicy;
use adaptive_extractor::dom::DomSnapshot;
use adaptive_extractor::models::navigation_key;
use adaptive_extractor::navigation::NavState;
use common::{Fixture, URL_PATTERN, fast_navigation, session};

const TABS: &str = r##"<body>
  <nav><a class="tab" href="#posts">Posts</a><a class="tab-about" href="#about">About</a></nav>
  <section id="about"><p>Founded 1999</p></section>
</body>"##;

#[tokio::test]
async fn clicks_through_to_a_labelled_section() {
    let fx = Fixture::new().await;
    let mut session = session(TABS).await;

    let report = fx.navigator.navigate_with_report(&mut session, "About", None).await;
    assert!(report.succeeded());
    assert_eq!(
        report.states,
        vec![
            NavState::Idle,
            NavState::Attempting { attempt: 1 },
            NavState::Verifying { attempt: 1 },
            NavState::Succeeded,
        ]
    );
    assert_eq!(report.winning_selector.as_deref(), Some("a.tab-about"));
    assert_eq!(session.url(), "https://social.test/acme#about");

    let snapshot = fx.store.snapshot();
    let record = snapshot
        .bucket(&navigation_key("about"), URL_PATTERN)
        .and_then(|b| b.record("a.tab-about"))
        .unwrap();
    assert_eq!(record.success_count, 1);
}

#[tokio::test]
async fn missing_section_fails_after_exactly_two_attempts() {
    let fx = Fixture::new().await;
    let mut session = session("<body><h1>Acme</h1></body>").await;

    let started = Instant::now();
    let report = fx.navigator.navigate_with_report(&mut session, "About", None).await;

    assert!(!report.succeeded());
    assert_eq!(report.attempts(), 2);
    assert_eq!(
        report.states,
        vec![
            NavState::Idle,
            NavState::Attempting { attempt: 1 },
            NavState::Retrying { attempt: 1 },
            NavState::Attempting { attempt: 2 },
            NavState::Failed,
        ]
    );
    // One backoff of base delay x 1 between the two attempts.
    assert!(started.elapsed() >= Duration::from_millis(10));
}

#[tokio::test]
async fn failed_verification_counts_against_the_selector() {
    let fx = Fixture::new().await;
    let mut session = session(TABS).await;
    let on_team_tab = |snapshot: &DomSnapshot| snapshot.url.ends_with("#team");

    let succeeded = fx.navigator.navigate(&mut session, "About", Some(&on_team_tab)).await;
    assert!(!succeeded);

    let snapshot = fx.store.snapshot();
    let record = snapshot
        .bucket(&navigation_key("About"), URL_PATTERN)
        .and_then(|b| b.record("a.tab-about"))
        .unwrap();
    assert_eq!((record.success_count, record.failure_count), (0, 2));
}

#[tokio::test]
async fn rejected_click_still_moves_the_session_to_the_new_page() {
    let fx = Fixture::new().await;
    let mut session = session(TABS).await;
    let never = |_: &DomSnapshot| false;

    assert!(!fx.navigator.navigate(&mut session, "About", Some(&never)).await);

    // The click landed even though verification failed, so the session
    // tracks the page it is really on and that page was stripped.
    assert_eq!(session.url(), "https://social.test/acme#about");
    assert_eq!(session.url_pattern(), URL_PATTERN);
    assert!(session.traps_cleared());
}

#[tokio::test]
async fn attempts_never_exceed_two() {
    let fx = Fixture::new().await;
    let policy = NavigationPolicy {
        max_attempts: 5,
        ..fast_navigation()
    };
    let navigator = NavigationController::new(fx.store.clone(), fx.detector.clone(), policy);
    let mut session = session("<body><h1>Acme</h1></body>").await;

    let report = navigator.navigate_with_report(&mut session, "About", None).await;
    assert!(!report.succeeded());
    assert_eq!(report.attempts(), 2);
}

#[tokio::test]
async fn learned_navigation_selector_is_reused() {
    let fx = Fixture::new().await;
    let mut first = session(TABS).await;
    assert!(fx.navigator.navigate(&mut first, "About", None).await);

    let mut second = session(TABS).await;
    let report = fx.navigator.navigate_with_report(&mut second, "about", None).await;
    assert!(report.succeeded());
    assert_eq!(report.winning_selector.as_deref(), Some("a.tab-about"));

    let snapshot = fx.store.snapshot();
    let bucket = snapshot.bucket(&navigation_key("about"), URL_PATTERN).unwrap();
    assert_eq!(bucket.selectors.len(), 1);
    assert_eq!(bucket.selectors[0].success_count, 2);
}

#[tokio::test]
async fn cancelled_navigation_stops_immediately() {
    let fx = Fixture::new().await;
    let mut session = session(TABS).await;
    session.cancel_handle().cancel();

    let report = fx.navigator.navigate_with_report(&mut session, "About", None).await;
    assert!(!report.succeeded());
    assert!(report.attempts() <= 1);
    assert!(fx.store.snapshot().buckets.is_empty());
}

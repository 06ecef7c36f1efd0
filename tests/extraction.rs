mod common;

use adaptive_extractor::DataType;
use adaptive_extractor::patterns::default_patterns;
use common::{Fixture, URL, URL_PATTERN, session};

#[tokio::test]
async fn company_name_is_discovered_and_learned() {
    let fx = Fixture::new().await;
    let mut session = session(
        "<html><head><title>Acme Corp | Social</title></head>
         <body><h1>Acme Corp</h1><p>Fresh bread daily</p></body></html>",
    )
    .await;

    let name = fx.extractor.extract(DataType::CompanyName, &mut session).await;
    assert_eq!(name.as_deref(), Some("Acme Corp"));

    let snapshot = fx.store.snapshot();
    let record = snapshot
        .bucket("company_name", URL_PATTERN)
        .and_then(|b| b.record("h1"))
        .unwrap();
    assert_eq!((record.success_count, record.failure_count), (1, 0));

    let reopened = fx.reopen_store().await;
    assert_eq!(reopened.get_adaptive_selectors("company_name", URL_PATTERN), vec!["h1"]);
}

#[tokio::test]
async fn hidden_mailto_trap_never_wins() {
    let fx = Fixture::new().await;
    let mut session = session(
        r#"<body><div class="contact">
             <a class="honeypot-mailto" style="display:none" href="mailto:trap@evil.test">Email</a>
             <a href="mailto:real@acme.test">Email us</a>
           </div></body>"#,
    )
    .await;

    let email = fx.extractor.extract(DataType::Email, &mut session).await;
    assert_eq!(email.as_deref(), Some("real@acme.test"));
    assert!(session.traps_cleared());

    let known = fx.reopen_registry().await.get_known_traps_for(URL);
    assert_eq!(known, vec!["a.honeypot-mailto"]);
}

#[tokio::test]
async fn known_traps_are_stripped_on_later_visits() {
    let fx = Fixture::new().await;
    fx.registry
        .add_traps("https://www.social.test/other", &["a.decoy".to_string()])
        .await;

    // The decoy is rendered this time, but the host already knows it.
    let mut session = session(
        r#"<body>
             <a class="decoy" href="mailto:trap@evil.test">Write</a>
             <a href="mailto:real@acme.test">Email us</a>
           </body>"#,
    )
    .await;
    let report = fx.detector.strip(&mut session).await;
    assert_eq!(report.known, 1);
    assert_eq!(report.removed, 1);

    let email = fx.extractor.extract(DataType::Email, &mut session).await;
    assert_eq!(email.as_deref(), Some("real@acme.test"));
}

#[tokio::test]
async fn full_miss_records_a_failure_for_every_selector_tried() {
    let fx = Fixture::new().await;
    fx.store
        .record_success("email", &["span.mail".to_string()], URL_PATTERN)
        .await;

    let mut session = session("<body><h1>Acme</h1><p>We bake bread.</p></body>").await;
    assert_eq!(fx.extractor.extract(DataType::Email, &mut session).await, None);

    let snapshot = fx.store.snapshot();
    let record = snapshot.bucket("email", URL_PATTERN).and_then(|b| b.record("span.mail")).unwrap();
    assert_eq!((record.success_count, record.failure_count), (1, 1));
    assert!(record.last_failure_at.is_some());
}

#[tokio::test]
async fn weak_recently_failed_bucket_falls_back_to_discovery() {
    let fx = Fixture::new().await;
    fx.store
        .record_failure("company_name", &["span.stale".to_string()], "no match", URL_PATTERN)
        .await;
    assert!(fx.store.should_rediscover("company_name", URL_PATTERN));

    // The stale selector still matches something, so only fresh discovery
    // can make the heading win.
    let mut session = session(
        "<body><span class=\"stale\">Old Name</span><h1>Acme Corp</h1></body>",
    )
    .await;
    let name = fx.extractor.extract(DataType::CompanyName, &mut session).await;
    assert_eq!(name.as_deref(), Some("Acme Corp"));

    let snapshot = fx.store.snapshot();
    let bucket = snapshot.bucket("company_name", URL_PATTERN).unwrap();
    let h1 = bucket.record("h1").unwrap();
    assert_eq!((h1.success_count, h1.failure_count), (1, 0));
    let stale = bucket.record("span.stale").unwrap();
    assert_eq!((stale.success_count, stale.failure_count), (0, 1));
    assert!(!fx.store.should_rediscover("company_name", URL_PATTERN));
}

#[tokio::test]
async fn pattern_fallback_learns_the_winning_regex() {
    let fx = Fixture::new().await;
    fx.store
        .record_success("followers", &["#gone".to_string()], URL_PATTERN)
        .await;

    let mut session = session("<body><h1>Acme</h1><div><span>1.2M</span> followers</div></body>").await;
    let followers = fx.extractor.extract(DataType::Followers, &mut session).await;
    assert_eq!(followers.as_deref(), Some("1.2M"));

    let learned = fx.store.learned_patterns("followers", URL_PATTERN);
    assert_eq!(learned.len(), 1);
    assert!(default_patterns(DataType::Followers).contains(&learned[0].as_str()));

    let snapshot = fx.store.snapshot();
    let record = snapshot.bucket("followers", URL_PATTERN).and_then(|b| b.record("#gone")).unwrap();
    assert_eq!(record.failure_count, 1);
}

#[tokio::test]
async fn title_heuristic_covers_pages_without_a_heading() {
    let fx = Fixture::new().await;
    let mut session = session(
        "<html><head><title>(2) Acme Corp | Social</title></head><body><div>x</div></body></html>",
    )
    .await;

    let name = fx.extractor.extract(DataType::CompanyName, &mut session).await;
    assert_eq!(name.as_deref(), Some("Acme Corp"));
}

#[tokio::test]
async fn cancelled_session_extracts_nothing_and_writes_nothing() {
    let fx = Fixture::new().await;
    let mut session = session("<body><h1>Acme Corp</h1></body>").await;
    session.cancel_handle().cancel();

    assert_eq!(fx.extractor.extract(DataType::CompanyName, &mut session).await, None);
    assert_eq!(fx.store.stats().selectors, 0);
    assert!(fx.registry.get_known_traps_for(URL).is_empty());
}

mod common;

use std::time::Duration;

use adaptive_extractor::driver::StaticPage;
use adaptive_extractor::models::navigation_key;
use adaptive_extractor::{Config, ProfileFinder};
use common::{URL, URL_PATTERN, fast_navigation, session};

const PROFILE: &str = r##"<html>
<head><title>Acme Corp | Social</title></head>
<body>
  <h1>Acme Corp</h1>
  <div class="page-category">Bakery</div>
  <span>1.2K followers</span>
  <span>980 likes</span>
  <img id="avatar" src="/acme.jpg" width="160" height="160">
  <a class="honeypot-mailto" style="display:none" href="mailto:trap@evil.test">mail</a>
  <nav>
    <a class="tab" href="#about">About</a>
    <a class="tab-transparency" href="#transparency">Page transparency</a>
  </nav>
  <section>
    <a href="mailto:real@acme.test">Email us</a>
    <a href="tel:+1%20555%20010%200199">Call</a>
    <address>12 Main Street, Springfield 90210</address>
    <p>Page created - March 3, 2014</p>
  </section>
</body>
</html>"##;

fn config(dir: &tempfile::TempDir) -> Config {
    Config {
        knowledge_path: dir.path().join("knowledge.json"),
        traps_path: dir.path().join("traps.json"),
        navigation: fast_navigation(),
        ..Config::default()
    }
}

#[tokio::test]
async fn scrapes_a_full_profile_and_visits_sections() {
    let dir = tempfile::tempdir().unwrap();
    let finder = ProfileFinder::new(config(&dir)).await.unwrap();
    let mut session = session(PROFILE).await;

    let profile = finder.scrape_profile(&mut session).await;

    assert_eq!(profile.url, URL);
    assert_eq!(profile.name.as_deref(), Some("Acme Corp"));
    assert_eq!(profile.category.as_deref(), Some("Bakery"));
    assert_eq!(profile.followers.as_deref(), Some("1.2K"));
    assert_eq!(profile.likes.as_deref(), Some("980"));
    assert_eq!(profile.profile_photo.as_deref(), Some("/acme.jpg"));
    assert_eq!(profile.email.as_deref(), Some("real@acme.test"));
    assert_eq!(profile.phone.as_deref(), Some("+1 555 010 0199"));
    assert_eq!(profile.address.as_deref(), Some("12 Main Street, Springfield 90210"));
    assert_eq!(profile.website, None);
    assert_eq!(profile.page_created.as_deref(), Some("March 3, 2014"));
    assert!(profile.extracted_at.is_some());

    // Website was missing, so the About tab was opened before the
    // transparency section.
    let snapshot = finder.store().snapshot();
    for label in ["About", "Page transparency"] {
        assert!(
            snapshot.bucket(&navigation_key(label), URL_PATTERN).is_some(),
            "no navigation knowledge for {label}"
        );
    }
    assert_eq!(session.url(), "https://social.test/acme#transparency");
}

#[tokio::test]
async fn expired_deadline_returns_a_partial_profile() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        session_timeout: Duration::ZERO,
        ..config(&dir)
    };
    let finder = ProfileFinder::new(config).await.unwrap();

    let page = StaticPage::from_html(URL, PROFILE);
    let profile = tokio::time::timeout(Duration::from_secs(5), finder.scrape_page(Box::new(page)))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(profile.url, URL);
    assert!(profile.extracted_at.is_some());
}

#[tokio::test]
async fn no_targets_is_an_empty_run() {
    let dir = tempfile::tempdir().unwrap();
    let finder = ProfileFinder::new(config(&dir)).await.unwrap();
    assert!(finder.check_targets().await.unwrap().is_empty());
    assert_eq!(finder.optimize().await, 0);
}

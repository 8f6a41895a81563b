mod test_utils;

use anyhow::Result;

use repo_sync::repositories::OwnerDirectory;
use repo_sync::validator::{ValidationIssue, ValidatorError, is_unique};
use test_utils::Harness;

const WIDGET: &str = "https://github.com/acme/widget";

fn urls(list: &[&str]) -> Vec<String> {
    list.iter().map(|u| u.to_string()).collect()
}

#[tokio::test]
async fn accepts_a_known_repository() -> Result<()> {
    let h = Harness::github_only().await?;
    h.github.set(WIDGET, "acme/widget", 2);

    let report = h.services.validator.validate_urls(&urls(&[WIDGET]), 1).await?;
    assert!(report.is_valid());
    assert_eq!(report.accepted.len(), 1);
    assert_eq!(report.accepted[0].key, "acme/widget");
    Ok(())
}

#[tokio::test]
async fn url_no_provider_accepts_is_invalid() -> Result<()> {
    let h = Harness::github_only().await?;

    let report = h
        .services
        .validator
        .validate_urls(&urls(&["https://example.com/acme/widget"]), 1)
        .await?;
    assert_eq!(
        report.issues,
        vec![ValidationIssue::InvalidUrl {
            url: "https://example.com/acme/widget".into()
        }]
    );
    assert_eq!(
        report.summary(),
        "The repository url https://example.com/acme/widget is not valid."
    );
    Ok(())
}

#[tokio::test]
async fn url_of_a_disabled_provider_is_invalid() -> Result<()> {
    let h = Harness::github_only().await?;
    h.gitlab.set("https://gitlab.com/acme/tool", "acme/tool", 0);

    let report = h
        .services
        .validator
        .validate_urls(&urls(&["https://gitlab.com/acme/tool"]), 1)
        .await?;
    assert!(matches!(report.issues[..], [ValidationIssue::InvalidUrl { .. }]));
    assert_eq!(h.gitlab.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn missing_repository_is_not_found_and_reported() -> Result<()> {
    let h = Harness::github_only().await?;

    let report = h
        .services
        .validator
        .validate_urls(&urls(&["https://github.com/acme/gone"]), 1)
        .await?;
    assert_eq!(
        report.summary(),
        "The repository at the url https://github.com/acme/gone was not found."
    );
    assert_eq!(
        h.messenger.errors(),
        vec!["GitHub error: repository not found".to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn repository_claimed_by_another_owner_is_rejected() -> Result<()> {
    let h = Harness::github_only().await?;
    h.github.set(WIDGET, "acme/widget", 0);
    h.services
        .owners
        .replace_declared_urls(1, &urls(&[WIDGET]))
        .await?;
    h.services.driver.reconcile_one(1, false).await?;

    let report = h.services.validator.validate_urls(&urls(&[WIDGET]), 2).await?;
    assert_eq!(
        report.summary(),
        "The repository at https://github.com/acme/widget has already been added by another user."
    );

    // The holder may resubmit its own repository
    let own = h.services.validator.validate_urls(&urls(&[WIDGET]), 1).await?;
    assert!(own.is_valid());
    Ok(())
}

#[tokio::test]
async fn uniqueness_compares_the_canonical_url() -> Result<()> {
    let h = Harness::github_only().await?;
    h.github.set(WIDGET, "acme/widget", 0);
    h.services
        .owners
        .replace_declared_urls(1, &urls(&[WIDGET]))
        .await?;
    h.services.driver.reconcile_one(1, false).await?;

    let mut metadata = h
        .services
        .validator
        .validate_urls(&urls(&[WIDGET]), 1)
        .await?
        .accepted
        .remove(0);
    assert!(is_unique(h.services.store.as_ref(), &metadata, 1).await?);
    assert!(!is_unique(h.services.store.as_ref(), &metadata, 2).await?);

    metadata.url = "https://github.com/acme/other".into();
    assert!(is_unique(h.services.store.as_ref(), &metadata, 2).await?);
    Ok(())
}

#[tokio::test]
async fn every_url_is_checked_and_blank_entries_skipped() -> Result<()> {
    let h = Harness::github_only().await?;
    h.github.set(WIDGET, "acme/widget", 0);

    let report = h
        .services
        .validator
        .validate_urls(
            &urls(&["  ", WIDGET, "ftp://nope", "https://github.com/acme/gone"]),
            3,
        )
        .await?;
    assert_eq!(report.accepted.len(), 1);
    assert_eq!(report.issues.len(), 2);
    assert_eq!(
        report.summary(),
        "The repository url ftp://nope is not valid. The repository at the url https://github.com/acme/gone was not found."
    );
    Ok(())
}

#[tokio::test]
async fn no_enabled_providers_is_an_error() -> Result<()> {
    let h = Harness::new(&[]).await?;

    let err = h
        .services
        .validator
        .validate_urls(&urls(&[WIDGET]), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, ValidatorError::NoProvidersEnabled));
    assert_eq!(err.to_string(), "There are no enabled repository providers");
    Ok(())
}

#[tokio::test]
async fn help_text_lists_enabled_providers_in_order() -> Result<()> {
    let h = Harness::new(&["gitlab", "github"]).await?;
    assert_eq!(
        h.services.validator.help_text()?,
        "https://gitlab.com/ https://github.com/"
    );
    Ok(())
}

// SPDX-License-Identifier: MIT

use super::*;

#[tokio::test]
async fn null_provider_always_empty() {
    let provider = NullRelationshipProvider;
    assert!(provider.candidate_prs("owner/repo", 1).await.unwrap().is_empty());
    provider.record("owner/repo", 1, "https://host/owner/repo/pull/1").await.unwrap();
    assert!(provider.candidate_prs("owner/repo", 1).await.unwrap().is_empty());
}

#[tokio::test]
async fn fake_provider_seeds_and_records() {
    let provider = FakeRelationshipProvider::new();
    provider.seed("owner/repo", 7, vec!["https://host/owner/repo/pull/9".into()]);
    assert_eq!(provider.candidate_prs("owner/repo", 7).await.unwrap(), vec!["https://host/owner/repo/pull/9"]);

    provider.record("owner/repo", 7, "https://host/owner/repo/pull/10").await.unwrap();
    let candidates = provider.candidate_prs("owner/repo", 7).await.unwrap();
    assert_eq!(candidates[0], "https://host/owner/repo/pull/10");
    assert_eq!(provider.recorded("owner/repo", 7)[0], "https://host/owner/repo/pull/10");
}

// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn parses_valid_repo_ref() {
    let r = RepoRef::parse("octocat/hello-world").unwrap();
    assert_eq!(r.owner, "octocat");
    assert_eq!(r.name, "hello-world");
    assert_eq!(r.to_string(), "octocat/hello-world");
}

#[test]
fn rejects_repo_ref_without_slash() {
    assert_eq!(
        RepoRef::parse("octocat"),
        Err(RefParseError::MalformedRepo("octocat".to_string()))
    );
}

#[test]
fn rejects_repo_ref_with_empty_owner_or_name() {
    assert!(RepoRef::parse("/hello").is_err());
    assert!(RepoRef::parse("octocat/").is_err());
}

#[test]
fn rejects_repo_ref_with_extra_slash() {
    assert!(RepoRef::parse("octocat/hello/world").is_err());
}

#[test]
fn parses_valid_issue_ref() {
    let r = IssueRef::parse("octocat/hello-world#42").unwrap();
    assert_eq!(r.repo.slug(), "octocat/hello-world");
    assert_eq!(r.number, 42);
    assert_eq!(r.to_string(), "octocat/hello-world#42");
}

#[test]
fn rejects_issue_ref_without_hash() {
    assert!(IssueRef::parse("octocat/hello-world").is_err());
}

#[test]
fn rejects_issue_ref_with_non_numeric_issue() {
    assert!(IssueRef::parse("octocat/hello-world#abc").is_err());
}

#[test]
fn rejects_issue_ref_with_malformed_repo_part() {
    assert!(IssueRef::parse("octocat#42").is_err());
}

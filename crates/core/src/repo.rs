// SPDX-License-Identifier: MIT

//! Parsing for the `owner/name` and `owner/name#N` reference strings used
//! throughout the data model (spec §3: `Task.repo`, `Task.issueRef`).

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RefParseError {
    #[error("expected \"owner/name\", got {0:?}")]
    MalformedRepo(String),
    #[error("expected \"owner/name#N\", got {0:?}")]
    MalformedIssueRef(String),
}

/// A parsed `owner/name` repository reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn parse(s: &str) -> Result<Self, RefParseError> {
        let (owner, name) = s
            .split_once('/')
            .ok_or_else(|| RefParseError::MalformedRepo(s.to_string()))?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(RefParseError::MalformedRepo(s.to_string()));
        }
        Ok(Self { owner: owner.to_string(), name: name.to_string() })
    }

    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.slug())
    }
}

/// A parsed `owner/name#N` issue reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IssueRef {
    pub repo: RepoRef,
    pub number: u64,
}

impl IssueRef {
    pub fn parse(s: &str) -> Result<Self, RefParseError> {
        let (repo_part, number_part) = s
            .split_once('#')
            .ok_or_else(|| RefParseError::MalformedIssueRef(s.to_string()))?;
        let repo = RepoRef::parse(repo_part)
            .map_err(|_| RefParseError::MalformedIssueRef(s.to_string()))?;
        let number = number_part
            .parse::<u64>()
            .map_err(|_| RefParseError::MalformedIssueRef(s.to_string()))?;
        Ok(Self { repo, number })
    }
}

impl std::fmt::Display for IssueRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.repo, self.number)
    }
}

#[cfg(test)]
#[path = "repo_tests.rs"]
mod tests;

//! Auth collaborator: resources say whether a request needs scopes, an `Authorizer` checks them.

use crate::error::AuthError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

/// Whether a request must be authorized, and with which scopes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthRequirement {
    pub required: bool,
    pub scopes: Vec<String>,
}

impl AuthRequirement {
    pub fn none() -> Self {
        AuthRequirement::default()
    }

    pub fn scopes<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AuthRequirement {
            required: true,
            scopes: scopes.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Ok when `credentials` grant every scope in `scopes`.
    async fn verify(&self, credentials: Option<&str>, scopes: &[String]) -> Result<(), AuthError>;
}

/// Grants everything. For deployments where the transport already authenticated the caller.
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn verify(&self, _credentials: Option<&str>, _scopes: &[String]) -> Result<(), AuthError> {
        Ok(())
    }
}

/// Fixed bearer tokens, each granted a set of scopes.
#[derive(Clone, Debug, Default)]
pub struct StaticTokens {
    grants: HashMap<String, HashSet<String>>,
}

impl StaticTokens {
    pub fn new() -> Self {
        StaticTokens::default()
    }

    pub fn grant<I, S>(mut self, token: impl Into<String>, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.grants
            .entry(token.into())
            .or_default()
            .extend(scopes.into_iter().map(Into::into));
        self
    }

    /// Parse `token=scope1 scope2;token2=scope3`.
    pub fn parse(text: &str) -> Self {
        text.split(';')
            .filter_map(|entry| entry.split_once('='))
            .fold(StaticTokens::new(), |acc, (token, scopes)| {
                acc.grant(token.trim(), scopes.split_whitespace())
            })
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

#[async_trait]
impl Authorizer for StaticTokens {
    async fn verify(&self, credentials: Option<&str>, scopes: &[String]) -> Result<(), AuthError> {
        let granted = credentials
            .and_then(|token| self.grants.get(token))
            .ok_or(AuthError::Unauthenticated)?;
        match scopes.iter().find(|s| !granted.contains(s.as_str())) {
            Some(missing) => Err(AuthError::Forbidden(missing.clone())),
            None => Ok(()),
        }
    }
}

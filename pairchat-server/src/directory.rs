//! In-memory account directory: issues identity tokens and answers
//! "who is this token" for the chat socket and the HTTP API.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use pairchat_common::Token;
use tokio::sync::RwLock;
use tracing::info;

use crate::{
    error::{ChatError, Result},
    Identity,
};

#[derive(Debug, Clone)]
pub struct Account {
    pub token: Token,
    pub email: String,
}

#[derive(Clone)]
pub struct Directory {
    accounts: Arc<RwLock<HashMap<String, Account>>>,
    logged_in: Arc<RwLock<HashSet<Identity>>>,
    allowed_domain: Arc<str>,
}

impl Directory {
    pub fn new(allowed_domain: impl Into<String>) -> Self {
        let allowed_domain: String = allowed_domain.into();
        Self {
            accounts: Default::default(),
            logged_in: Default::default(),
            allowed_domain: Arc::from(allowed_domain),
        }
    }

    fn domain_allowed(&self, email: &str) -> bool {
        let domain = &*self.allowed_domain;
        email.contains('@') && (domain == "*" || email.ends_with(domain))
    }

    /// Issues a fresh token for `email`. Each login is a new anonymous identity.
    pub async fn login(&self, email: &str) -> Result<Token> {
        let email = email.trim();
        if !self.domain_allowed(email) {
            return Err(ChatError::Authentication(format!(
                "email domain not allowed: {}",
                self.allowed_domain
            )));
        }

        let token = Token::generate();
        self.accounts.write().await.insert(
            token.value.clone(),
            Account {
                token: token.clone(),
                email: email.to_string(),
            },
        );
        self.logged_in
            .write()
            .await
            .insert(Identity::from(token.value.clone()));

        info!(identity = %Identity::from(token.value.as_str()), "login");
        Ok(token)
    }

    /// Resolves a token to the label peers will see.
    pub async fn authenticate(&self, token: &str) -> Result<String> {
        let accounts = self.accounts.read().await;
        match accounts.get(token) {
            Some(account) if account.token.is_valid() => Ok(account.email.clone()),
            Some(_) => Err(ChatError::Authentication("token expired".into())),
            None => Err(ChatError::Authentication("unknown token".into())),
        }
    }

    pub async fn token(&self, token: &str) -> Option<Token> {
        self.accounts.read().await.get(token).map(|a| a.token.clone())
    }

    pub async fn mark_offline(&self, identity: &Identity) {
        self.logged_in.write().await.remove(identity);
    }

    pub async fn logged_in(&self) -> HashSet<Identity> {
        self.logged_in.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn login_issues_usable_token() {
        let directory = Directory::new("*");
        let token = directory.login("someone@example.com").await.unwrap();

        assert_eq!(
            directory.authenticate(&token.value).await,
            Ok("someone@example.com".to_string())
        );
        assert!(directory
            .logged_in()
            .await
            .contains(&Identity::from(token.value.as_str())));
    }

    #[tokio::test]
    async fn domain_restriction_is_enforced() {
        let directory = Directory::new("uni.example.edu");
        assert!(directory.login("student@uni.example.edu").await.is_ok());
        assert!(matches!(
            directory.login("someone@gmail.com").await,
            Err(ChatError::Authentication(_))
        ));
        assert!(directory.login("no-at-sign").await.is_err());
    }

    #[tokio::test]
    async fn unknown_token_is_refused() {
        let directory = Directory::new("*");
        assert!(matches!(
            directory.authenticate("nope").await,
            Err(ChatError::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn mark_offline_keeps_token_valid() {
        let directory = Directory::new("*");
        let token = directory.login("a@example.com").await.unwrap();
        let identity = Identity::from(token.value.as_str());

        directory.mark_offline(&identity).await;
        assert!(directory.logged_in().await.is_empty());
        assert!(directory.authenticate(&token.value).await.is_ok());
    }
}

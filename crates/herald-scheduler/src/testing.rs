//! Scriptable token provider and adapter for unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use herald_auth::{TokenError, TokenProvider};
use herald_platforms::{AccessToken, AdapterError, PlatformAdapter, PostContent, PublishReceipt};
use herald_store::{Metrics, Platform};

use crate::WallClock;

#[derive(Default)]
pub struct FakeTokens {
    tokens: Mutex<HashMap<(String, Platform), String>>,
    pub delay: Option<Duration>,
}

impl FakeTokens {
    pub fn with(entries: &[(&str, Platform)]) -> Self {
        let tokens = entries
            .iter()
            .map(|(user, platform)| ((user.to_string(), *platform), format!("{}-token", platform)))
            .collect();
        Self {
            tokens: Mutex::new(tokens),
            delay: None,
        }
    }
}

#[async_trait]
impl TokenProvider for FakeTokens {
    async fn resolve(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<Option<AccessToken>, TokenError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .tokens
            .lock()
            .unwrap()
            .get(&(user_id.to_string(), platform))
            .map(AccessToken::new))
    }
}

#[derive(Debug, Clone)]
pub enum Script {
    Id(&'static str),
    NoId,
    Fail(&'static str),
    Hang,
}

pub struct FakeAdapter {
    platform: Platform,
    script: Script,
    pub publishes: AtomicUsize,
}

impl FakeAdapter {
    pub fn new(platform: Platform, script: Script) -> Self {
        Self {
            platform,
            script,
            publishes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PlatformAdapter for FakeAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn publish(
        &self,
        _token: &AccessToken,
        _content: &PostContent,
    ) -> Result<PublishReceipt, AdapterError> {
        self.publishes.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Id(id) => Ok(PublishReceipt::with_id(*id)),
            Script::NoId => Ok(PublishReceipt::without_id()),
            Script::Fail(message) => Err(AdapterError::validation(*message)),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(PublishReceipt::without_id())
            }
        }
    }

    async fn fetch_analytics(
        &self,
        _token: &AccessToken,
        platform_post_id: &str,
    ) -> Result<Metrics, AdapterError> {
        match &self.script {
            Script::Fail(message) => Err(AdapterError::validation(*message)),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Metrics::new())
            }
            _ => {
                let mut metrics = Metrics::new();
                metrics.insert("id".to_string(), platform_post_id.into());
                metrics.insert("likes".to_string(), 3.into());
                Ok(metrics)
            }
        }
    }
}

/// Wall clock that advances with tokio's (possibly paused) clock.
pub fn paused_clock() -> WallClock {
    let origin = Utc::now();
    let start = tokio::time::Instant::now();
    Arc::new(move || {
        origin + chrono::Duration::from_std(start.elapsed()).unwrap_or(chrono::Duration::zero())
    })
}

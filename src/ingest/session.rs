// src/ingest/session.rs
//! Scroll sessions over a dynamic search surface, and the two-strategy
//! launcher that opens them.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::ingest::types::RawAssetRef;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{strategy} session failed to start: {message}")]
    Launch {
        strategy: &'static str,
        message: String,
    },

    #[error("page render failed: {0}")]
    Render(String),

    #[error("no session strategy available (primary: {primary}; fallback: {fallback})")]
    Unavailable { primary: String, fallback: String },
}

/// One open crawl session. Each `advance` is one pagination/scroll step and
/// returns the raw references visible after it.
#[async_trait]
pub trait ScrollSession: Send {
    async fn advance(&mut self) -> Result<Vec<RawAssetRef>, SessionError>;

    async fn close(&mut self) {}
}

#[async_trait]
pub trait SessionLauncher: Send + Sync {
    /// Short strategy label used in logs.
    fn strategy(&self) -> &'static str;

    async fn launch(&self, query: &str) -> Result<Box<dyn ScrollSession>, SessionError>;
}

pub type DynLauncher = Arc<dyn SessionLauncher>;

pub enum SessionOutcome {
    Primary(Box<dyn ScrollSession>),
    Fallback {
        session: Box<dyn ScrollSession>,
        primary_error: SessionError,
    },
    Unavailable {
        primary: SessionError,
        fallback: Option<SessionError>,
    },
}

impl SessionOutcome {
    pub fn strategy_label(&self) -> &'static str {
        match self {
            SessionOutcome::Primary(_) => "primary",
            SessionOutcome::Fallback { .. } => "fallback",
            SessionOutcome::Unavailable { .. } => "unavailable",
        }
    }

    pub fn into_session(self) -> Result<Box<dyn ScrollSession>, SessionError> {
        match self {
            SessionOutcome::Primary(s) => Ok(s),
            SessionOutcome::Fallback { session, .. } => Ok(session),
            SessionOutcome::Unavailable { primary, fallback } => Err(SessionError::Unavailable {
                primary: primary.to_string(),
                fallback: fallback
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "not configured".into()),
            }),
        }
    }
}

/// Try the primary strategy, then the fallback. No retries beyond that.
pub async fn open_session(
    primary: &dyn SessionLauncher,
    fallback: Option<&dyn SessionLauncher>,
    query: &str,
) -> SessionOutcome {
    let primary_error = match primary.launch(query).await {
        Ok(session) => {
            info!(target: "crawl", strategy = primary.strategy(), query, "session opened");
            return SessionOutcome::Primary(session);
        }
        Err(e) => e,
    };
    warn!(target: "crawl", strategy = primary.strategy(), error = %primary_error, "primary session failed");

    let Some(fallback) = fallback else {
        return SessionOutcome::Unavailable {
            primary: primary_error,
            fallback: None,
        };
    };

    match fallback.launch(query).await {
        Ok(session) => {
            info!(target: "crawl", strategy = fallback.strategy(), query, "fallback session opened");
            SessionOutcome::Fallback {
                session,
                primary_error,
            }
        }
        Err(e) => {
            warn!(target: "crawl", strategy = fallback.strategy(), error = %e, "fallback session failed");
            SessionOutcome::Unavailable {
                primary: primary_error,
                fallback: Some(e),
            }
        }
    }
}

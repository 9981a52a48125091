// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Load/unload lifecycle and the state shared by every interception.
//!
//! A [`Context`] moves through `Uninitialized -> Ready | Failed -> Finalized`
//! exactly once. The write lock serializes load and unload notifications;
//! interceptions only ever `try_read`, so a call that races with either one
//! forwards without reporting instead of waiting.

use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use tracing::{debug, warn};

use crate::environment::EnvironmentSnapshot;
use crate::error::{InitError, ReportError};
use crate::locale::Locale;
use crate::report;
use crate::string_array::BorrowedStringArray;

/// Everything an interception needs once loading succeeded.
#[derive(Debug)]
pub struct Session {
    locale: Locale,
    environment: EnvironmentSnapshot,
}

impl Session {
    pub fn new(locale: Locale, environment: EnvironmentSnapshot) -> Self {
        Self {
            locale,
            environment,
        }
    }

    /// Build a session from the process locale and environment.
    pub fn capture() -> Result<Self, InitError> {
        let locale = Locale::from_environment()?;
        let environment = EnvironmentSnapshot::capture()?;
        Ok(Self::new(locale, environment))
    }

    pub fn environment(&self) -> &EnvironmentSnapshot {
        &self.environment
    }

    /// Write a report for `command` if an output directory is known.
    pub fn report(&self, command: BorrowedStringArray<'_>) -> Result<Option<PathBuf>, ReportError> {
        match self.environment.output_dir() {
            Some(dir) => report::write_report(dir, command, &self.locale).map(Some),
            None => Ok(None),
        }
    }
}

#[derive(Debug)]
pub enum Lifecycle {
    Uninitialized,
    Ready(Arc<Session>),
    /// Loading failed; calls are forwarded untouched.
    Failed,
    Finalized,
}

#[derive(Debug)]
pub struct Context {
    state: RwLock<Lifecycle>,
}

impl Context {
    pub const fn new() -> Self {
        Self {
            state: RwLock::new(Lifecycle::Uninitialized),
        }
    }

    /// Run `capture` once and keep its session. Later calls, including
    /// calls after [`finalize`](Self::finalize), change nothing.
    ///
    /// Returns whether interceptions will report.
    pub fn initialize<F>(&self, capture: F) -> bool
    where
        F: FnOnce() -> Result<Session, InitError>,
    {
        let mut state = self.write();
        if let Lifecycle::Uninitialized = *state {
            *state = match capture() {
                Ok(session) => {
                    debug!(output_dir = ?session.environment.output_dir(), "initialized");
                    Lifecycle::Ready(Arc::new(session))
                }
                Err(err) => {
                    warn!(error = %err, "initialization failed, calls are forwarded without reports");
                    Lifecycle::Failed
                }
            };
        }
        matches!(*state, Lifecycle::Ready(_))
    }

    /// The active session, or `None` when interceptions must pass through.
    pub fn session(&self) -> Option<Arc<Session>> {
        match &*self.state.try_read().ok()? {
            Lifecycle::Ready(session) => Some(Arc::clone(session)),
            _ => None,
        }
    }

    /// Release the session. Calls already holding it keep it until they
    /// return.
    pub fn finalize(&self) {
        let mut state = self.write();
        if let Lifecycle::Ready(_) = *state {
            debug!("finalized");
        }
        *state = Lifecycle::Finalized;
    }

    fn write(&self) -> RwLockWriteGuard<'_, Lifecycle> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

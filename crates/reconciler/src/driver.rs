//! Retry driver: runs passes until the enforcer stops asking for more.
//!
//! The enforcer itself never sleeps or loops. Callers embedding it in a
//! work queue can requeue on their own; everyone else uses this driver.

use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::DriverConfig;
use crate::converter::Converter;
use crate::enforcer::StateEnforcer;
use crate::error::{Error, Result};
use crate::object::Resource;
use crate::repository::{ObjectRepository, RepositoryError};
use crate::types::{EnforceAction, EnforceResult};

/// Summary of a driven reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriveReport {
    /// Passes run, including the final one.
    pub passes: u32,
    /// Every write performed across all passes, failed ones included.
    pub actions: Vec<EnforceAction>,
    /// Set when the converter reported related state as missing.
    pub pending: Option<String>,
}

impl DriveReport {
    fn absorb(&mut self, result: EnforceResult) {
        self.actions.extend(result.actions);
        self.pending = result.pending;
    }
}

/// Runs [`StateEnforcer::reconcile`] with backoff until converged.
pub struct RetryDriver<'a, R: ObjectRepository> {
    enforcer: &'a StateEnforcer<R>,
    config: DriverConfig,
}

impl<'a, R: ObjectRepository> RetryDriver<'a, R> {
    /// Create a driver.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when `config` does not validate.
    pub fn new(enforcer: &'a StateEnforcer<R>, config: DriverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { enforcer, config })
    }

    /// Get the configuration.
    pub const fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Reconcile `root` until a pass neither fails nor asks for a requeue.
    ///
    /// # Errors
    ///
    /// Terminal errors are returned as soon as they occur. When
    /// `max_passes` is exhausted, [`Error::NotConverged`] carries the last
    /// retryable error, if any.
    pub async fn drive<C>(&self, converter: &mut C, root: C::Root) -> Result<DriveReport>
    where
        C: Converter,
        C::Root: Clone,
    {
        let mut report = DriveReport::default();
        let mut last_error = None;

        for pass in 1..=self.config.max_passes {
            report.passes = pass;
            debug!(pass, root = %root.display_key(), "Starting pass");

            match self.run_pass(converter, root.clone()).await {
                Ok(result) if result.pending.is_some() || !result.requeue => {
                    report.absorb(result);
                    info!(passes = pass, writes = report.actions.len(), "Reconciliation settled");
                    return Ok(report);
                }
                Ok(result) => {
                    report.absorb(result);
                    last_error = None;
                }
                Err(err) if err.is_terminal() => {
                    warn!(pass, error = %err, "Terminal error, giving up");
                    return Err(err);
                }
                Err(err) => {
                    debug!(pass, error = %err, "Retryable error");
                    report.actions.extend_from_slice(err.applied_actions());
                    last_error = Some(Box::new(err));
                }
            }

            if pass < self.config.max_passes {
                sleep(self.config.backoff(pass)).await;
            }
        }

        warn!(passes = self.config.max_passes, "Reconciliation did not converge");
        Err(Error::NotConverged {
            passes: self.config.max_passes,
            last_error,
        })
    }

    async fn run_pass<C: Converter>(&self, converter: &mut C, root: C::Root) -> Result<EnforceResult> {
        let pass = self.enforcer.reconcile(converter, root);
        match self.config.pass_timeout {
            Some(limit) => timeout(limit, pass).await.unwrap_or_else(|_| {
                Err(RepositoryError::cancelled(format!("pass exceeded {limit:?}")).into())
            }),
            None => pass.await,
        }
    }
}

//! Polling waits: converts transient predicate failures into a single
//! timeout error carrying the last observed reason.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::actionability::{self, Check, CLICK_CHECKS, TYPE_CHECKS};
use crate::actions::{self, ElementInfo};
use crate::bidi::Bidi;
use crate::error::TimeoutError;
use crate::{Error, Result};

/// Default deadline for waits.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default polling interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// Wait configuration. Zero values substitute the defaults.
#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl WaitOptions {
    /// Options with a specific deadline and the default interval.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    fn normalized(self) -> Self {
        Self {
            timeout: if self.timeout.is_zero() {
                DEFAULT_TIMEOUT
            } else {
                self.timeout
            },
            interval: if self.interval.is_zero() {
                DEFAULT_INTERVAL
            } else {
                self.interval
            },
        }
    }
}

/// Poll `predicate` until it succeeds or the deadline passes.
///
/// Failures and errors are swallowed and retried; the most recent one
/// becomes the timeout reason. The predicate always runs at least once.
pub async fn wait_for<T, F, Fut>(selector: &str, opts: WaitOptions, mut predicate: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let opts = opts.normalized();
    let deadline = Instant::now() + opts.timeout;
    let mut reason = String::new();

    loop {
        match predicate().await {
            Ok(value) => return Ok(value),
            Err(err) => reason = err.to_string(),
        }

        if Instant::now() > deadline {
            return Err(Error::Timeout(TimeoutError {
                selector: selector.to_string(),
                timeout: opts.timeout,
                reason,
            }));
        }

        sleep(opts.interval).await;
    }
}

/// Wait until an element matching the selector exists; returns its info.
pub async fn wait_for_selector(
    bidi: &dyn Bidi,
    context: &str,
    selector: &str,
    opts: WaitOptions,
) -> Result<ElementInfo> {
    wait_for(selector, opts, || {
        actions::find_element(bidi, context, selector)
    })
    .await
}

/// Wait until every check in `checks` passes, in order.
///
/// Each poll runs the checks front to back and stops at the first failure or
/// error; that check's name is what a timeout reports.
pub async fn wait_for_actionable(
    bidi: &dyn Bidi,
    context: &str,
    selector: &str,
    checks: &[Check],
    opts: WaitOptions,
) -> Result<()> {
    let opts = opts.normalized();
    let deadline = Instant::now() + opts.timeout;

    loop {
        let mut failure = None;
        for &check in checks {
            match actionability::run_check(bidi, context, selector, check).await {
                Ok(true) => {}
                Ok(false) => {
                    failure = Some(format!("check '{check}' failed"));
                    break;
                }
                Err(err) => {
                    failure = Some(format!("check '{check}' failed: {err}"));
                    break;
                }
            }
        }

        let Some(reason) = failure else {
            return Ok(());
        };

        if Instant::now() > deadline {
            return Err(Error::Timeout(TimeoutError {
                selector: selector.to_string(),
                timeout: opts.timeout,
                reason,
            }));
        }

        sleep(opts.interval).await;
    }
}

/// Wait until the element exists and is actionable for clicking.
pub async fn wait_for_click(
    bidi: &dyn Bidi,
    context: &str,
    selector: &str,
    opts: WaitOptions,
) -> Result<ElementInfo> {
    let info = wait_for_selector(bidi, context, selector, opts).await?;
    wait_for_actionable(bidi, context, selector, CLICK_CHECKS, opts).await?;
    Ok(info)
}

/// Wait until the element exists and is actionable for typing.
pub async fn wait_for_type(
    bidi: &dyn Bidi,
    context: &str,
    selector: &str,
    opts: WaitOptions,
) -> Result<ElementInfo> {
    let info = wait_for_selector(bidi, context, selector, opts).await?;
    wait_for_actionable(bidi, context, selector, TYPE_CHECKS, opts).await?;
    Ok(info)
}

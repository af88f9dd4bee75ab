//! The pre-handler check.
//!
//! [`check`] runs once per request on a bound route, before the handler:
//!
//! 1. No limiter installed: skipped, the request proceeds unmetered.
//! 2. Resolve the composite key.
//! 3. Evaluate filters; any false: skipped.
//! 4. `test` the bucket; no capacity: [`RateLimitError::RateLimitExceeded`].
//! 5. Otherwise record the pass in the context so the controller can `hit`
//!    once the response status is known.
//!
//! `test` never consumes capacity, so nothing is counted here.

use std::sync::Arc;
use std::time::Duration;

use crate::binding::LimitBinding;
use crate::context::RequestContext;
use crate::decision::{GateOutcome, SkipReason};
use crate::error::{RateLimitError, Result};
use crate::filter::all_hold;

/// Check a request against a binding.
///
/// Resolver and filter failures are returned unchanged; only an exhausted
/// bucket produces `RateLimitExceeded`.
pub async fn check<R>(
    binding: &Arc<LimitBinding<R>>,
    context: Option<&RequestContext<R>>,
    request: &R,
) -> Result<GateOutcome> {
    let Some(context) = context else {
        tracing::debug!(quota = %binding.quota(), "no limiter installed, skipping");
        return Ok(GateOutcome::Skipped(SkipReason::NoLimiter));
    };

    let keys = binding.resolve_keys(context.default_keys(), request).await?;
    tracing::trace!(keys = ?keys, "resolved composite key");

    if !all_hold(binding.filters(), request).await? {
        tracing::debug!(keys = ?keys, "filtered out, skipping");
        return Ok(GateOutcome::Skipped(SkipReason::FilteredOut));
    }

    let quota = binding.quota();
    let strategy = context.strategy();

    if !strategy.test(quota, &keys).await? {
        let retry_after = match strategy.window_stats(quota, &keys).await {
            Ok(stats) => Some(Duration::from_secs(stats.reset_seconds())),
            Err(err) => {
                tracing::warn!(error = %err, "failed to read window stats");
                None
            }
        };

        tracing::warn!(quota = %quota, keys = ?keys, "rate limit exceeded");
        return Err(RateLimitError::RateLimitExceeded {
            quota: quota.clone(),
            retry_after,
        });
    }

    tracing::trace!(quota = %quota, keys = ?keys, "test passed");
    context.record(binding.clone(), keys.clone());
    Ok(GateOutcome::Passed { keys })
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::algorithm::FixedWindow;
    use crate::binding::LimitBuilder;
    use crate::filter::FnFilter;
    use crate::limiter::Limiter;
    use crate::strategy::RateLimiter;

    fn limiter() -> Limiter<()> {
        Limiter::new(RateLimiter::memory(FixedWindow::new()))
    }

    #[tokio::test]
    async fn test_skips_without_limiter() {
        let binding = Arc::new(LimitBuilder::<()>::new("1/minute").build("get_items").unwrap());

        for _ in 0..5 {
            let outcome = check(&binding, None, &()).await.unwrap();
            assert_eq!(outcome, GateOutcome::Skipped(SkipReason::NoLimiter));
        }
    }

    #[tokio::test]
    async fn test_pass_records_binding() {
        let limiter = limiter();
        let ctx = limiter.context();
        let binding = Arc::new(LimitBuilder::<()>::new("1/minute").build("get_items").unwrap());

        let outcome = check(&binding, Some(&ctx), &()).await.unwrap();

        assert_eq!(outcome.keys(), Some(&["get_items".to_string()][..]));
        assert!(ctx.is_triggered());
    }

    #[tokio::test]
    async fn test_filtered_out_is_not_recorded() {
        let limiter = limiter();
        let ctx = limiter.context();
        let binding = Arc::new(
            LimitBuilder::<()>::new("1/minute")
                .filter(FnFilter::new("never", |_: &()| false))
                .build("get_items")
                .unwrap(),
        );

        let outcome = check(&binding, Some(&ctx), &()).await.unwrap();

        assert_eq!(outcome, GateOutcome::Skipped(SkipReason::FilteredOut));
        assert!(!ctx.is_triggered());
    }

    #[tokio::test]
    async fn test_rejection_carries_quota_and_retry_after() {
        let limiter = limiter();
        let binding = Arc::new(LimitBuilder::<()>::new("1/hour").build("get_items").unwrap());

        let ctx = limiter.context();
        check(&binding, Some(&ctx), &()).await.unwrap();
        assert!(limiter.finish(&ctx, 200).await.unwrap());

        let ctx = limiter.context();
        let err = check(&binding, Some(&ctx), &()).await.unwrap_err();
        match err {
            RateLimitError::RateLimitExceeded { quota, retry_after } => {
                assert_eq!(quota.to_string(), "1 per 1 hour");
                let retry_after = retry_after.unwrap();
                assert!(retry_after > Duration::ZERO && retry_after <= Duration::from_secs(3600));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!ctx.is_triggered());
    }
}

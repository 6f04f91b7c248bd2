//! Bounded waiting for effects the services apply asynchronously.
//!
//! A deleted user may keep resolving for a moment, and a moderation decision
//! reaches the product service through an event. Scenarios wait for such
//! effects with [`assert_eventually`] instead of asserting once.

use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;

const FIRST_RECHECK: Duration = Duration::from_millis(250);

/// Kinds of asynchronous effect, each with its own upper bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyCategory {
    /// Entity deletion becoming visible to reads (10s)
    AsyncDeletion,

    /// Moderation decision reaching the product service (10s)
    ModerationPropagation,
}

impl ConsistencyCategory {
    pub fn bound(&self) -> Duration {
        match self {
            ConsistencyCategory::AsyncDeletion => Duration::from_secs(10),
            ConsistencyCategory::ModerationPropagation => Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Error)]
#[error("{category:?} condition still false after {attempts} checks in {waited:?}")]
pub struct NotConsistent {
    pub category: ConsistencyCategory,
    pub attempts: u32,
    pub waited: Duration,
}

/// Wait until `condition` holds, within the category's bound.
///
/// The condition is checked at once, then again after 250ms, doubling the gap
/// each time. The last gap is shortened so the bound is never overrun.
///
/// # Example
///
/// ```no_run
/// use market_e2e::eventual::{assert_eventually, ConsistencyCategory};
/// use market_e2e::fixtures::UserClient;
/// use market_e2e::seed::UserId;
///
/// # async fn example(users: UserClient, user: UserId) {
/// let users = &users;
/// assert_eventually(ConsistencyCategory::AsyncDeletion, move || async move {
///     matches!(users.get_status(user).await, Ok(s) if s == 404)
/// })
/// .await
/// .expect("user should disappear");
/// # }
/// ```
pub async fn assert_eventually<F, Fut>(
    category: ConsistencyCategory,
    mut condition: F,
) -> Result<(), NotConsistent>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let bound = category.bound();
    let started = Instant::now();
    let mut gap = FIRST_RECHECK;
    let mut attempts = 0;

    loop {
        attempts += 1;
        if condition().await {
            return Ok(());
        }

        let waited = started.elapsed();
        if waited >= bound {
            return Err(NotConsistent {
                category,
                attempts,
                waited,
            });
        }

        sleep(gap.min(bound - waited)).await;
        gap *= 2;
    }
}

// Command rate limiting and duplicate suppression.
//
// Discord's own REST limits are handled by serenity. This module limits how
// often *users* may run commands, and drops gateway events or interactions
// we've already seen.

mod bucket;
mod dedup;
mod limiter;

pub use bucket::SlidingWindowBucket;
pub use dedup::DedupCache;
pub use limiter::{
    CommandRateLimiter, RateLimitKey, RateLimitPolicy, RateLimitScope, RateLimitSubject,
    RateLimited,
};

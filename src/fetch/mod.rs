//! High-resolution image lookup against the upstream source
//!
//! ## Architecture
//!
//! The core abstraction is the [`FetchProvider`] trait. Every attempt yields a
//! [`FetchOutcome`], a closed taxonomy the pipeline dispatches on:
//!
//! | Outcome | Meaning |
//! |---|---|
//! | `Success` | image located |
//! | `NotFound` | missing / private / no picture |
//! | `ChallengeRequired` | anti-automation interstitial |
//! | `AuthExpired` | session credential rejected |
//! | `RateLimited` | HTTP 429 or "please wait" |
//! | `TransientError` | timeout, DNS, reset, gateway error |
//! | `PermanentError` | anything else |
//!
//! [`HttpFetchProvider`] implements the trait against the source's web
//! profile endpoint.

mod http;
mod outcome;
mod traits;

pub use http::HttpFetchProvider;
pub use outcome::{FetchOutcome, ImageRef};
pub use traits::FetchProvider;

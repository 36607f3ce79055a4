//! Source Layer
//!
//! Remote data sources polled by the bridge. A source returns either one
//! [`Reading`](crate::Reading) or a [`FetchError`]; the upstream wire format
//! stays inside the implementation.
//!
//! # Architecture
//!
//! - [`ReadingSource`]: Core trait for implementing sources
//! - [`OpenWeatherSource`]: OpenWeatherMap current-weather endpoint

mod openweather;
mod traits;

pub use openweather::OpenWeatherSource;
pub use traits::{FetchError, ReadingSource};

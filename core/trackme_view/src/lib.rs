//! Range selection, aggregation and view synchronization for the trackme
//! activity viewer.

pub mod aggregate;
pub mod color;
pub mod decompose;
pub mod error;
pub mod explorer;
pub mod format;
pub mod model;
pub mod picker;
pub mod range;
pub mod source;
pub mod sync;
pub mod timeline;

pub use error::{FetchError, InvalidRangeError};
pub use range::{normalize, DateRange, QueryRange};

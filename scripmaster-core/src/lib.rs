//! scripmaster core: instrument model, feed acquisition, vendor extraction and
//! reconciliation.
//!
//! - Domain types (`NormalizedInstrument`, `CommonInstrument`)
//! - Feed fetching with bounded waits, gzip handling and a scoped scratch dir
//! - A generic CSV extractor instantiated per vendor by a `VendorProfile`
//! - The reconciler that splits two sources into common / only-A / only-B

pub mod data;
pub mod domain;
pub mod extract;
pub mod reconcile;

pub use data::{DataError, FeedFetcher, FeedSource, ScratchDir};
pub use domain::{CommonInstrument, InstrumentColumn, NormalizedInstrument};
pub use extract::{extract_file, extract_reader, VendorProfile};
pub use reconcile::{reconcile, ReconciliationCounts, ReconciliationResult};

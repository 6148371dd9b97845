// src/application/service/mod.rs
// Long-running application services

pub mod event_processor;
pub mod listing_detector;

pub use event_processor::EventProcessor;
pub use listing_detector::ListingDetector;

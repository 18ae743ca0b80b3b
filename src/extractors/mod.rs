// src/extractors/mod.rs
pub mod financials;
pub mod locator;
pub mod section;

// Re-export key extraction types for convenience
pub use financials::FinancialFetcher;
pub use locator::ReportLocator;
pub use section::SectionExtractor;

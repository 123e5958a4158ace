pub mod derived;
pub mod history_store;
pub mod quote_source;
pub mod reference_data;

pub use derived::DerivedQueries;
pub use history_store::HistoryStore;
pub use quote_source::QuoteSource;
pub use reference_data::ReferenceData;

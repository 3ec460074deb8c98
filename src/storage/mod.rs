// Persistence: catalog CSV in, result table out, SQLite price history

pub mod catalog;
pub mod sqlite;

pub use catalog::{read_catalog, read_catalog_from, ResultTable, StorefrontColumns};
pub use sqlite::{PriceHistory, PriceObservation};

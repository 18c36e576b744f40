pub mod error;
pub mod index;
pub mod persist;
pub mod search;
pub mod store;
pub mod tokenizer;

mod model;

pub use error::{NormalizeError, SearchError, StoreError};
pub use model::*;
pub use store::{open_store, ComicStore, FlushStats, StoreConfig};

//! Resume analysis records and the results page.

mod page;
mod store;
mod types;

pub use page::*;
pub use store::*;
pub use types::*;

mod base;
mod entry;
mod filter;
mod search;

pub use base::*;
pub use entry::*;
pub use filter::*;
pub use search::*;

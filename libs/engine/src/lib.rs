pub mod directory;
pub mod session;
pub mod storage;

pub use directory::*;
pub use session::*;
pub use storage::*;

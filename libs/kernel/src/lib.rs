pub mod model;
pub mod operations;
pub mod perms;
pub mod plugins;
pub mod schema;

pub mod prelude {
    pub use crate::model::*;
    pub use crate::operations::*;
    pub use crate::perms::*;
    pub use crate::plugins::*;
    pub use crate::schema::*;
}

pub use prelude::*;

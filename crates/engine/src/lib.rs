pub mod clip;
pub mod edit;
pub mod ops;
pub mod plan;
pub mod style;
pub mod timeline;

pub use plan::*;
pub use timeline::*;

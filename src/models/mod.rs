pub mod enums;
pub mod extraction;
pub mod guest;
pub mod scan;

pub use enums::*;
pub use extraction::*;
pub use guest::*;
pub use scan::*;

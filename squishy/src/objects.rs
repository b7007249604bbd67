pub mod material;
pub mod tetsolid;

pub use material::*;
pub use tetsolid::*;

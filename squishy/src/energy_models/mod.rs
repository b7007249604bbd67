pub mod elasticity;

pub use elasticity::*;

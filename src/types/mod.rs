// Type definitions for the signature workflow engine

pub mod certificate;
pub mod model;

pub use certificate::*;
pub use model::*;

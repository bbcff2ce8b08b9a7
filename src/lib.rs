pub mod core;
pub mod data;
pub mod engine;
pub mod klpq;
pub mod map;
pub mod mfvi;
pub mod model;
pub mod numeric;
pub mod variational;

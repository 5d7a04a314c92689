pub mod id;
pub mod model;
pub mod tags;
pub mod validation;

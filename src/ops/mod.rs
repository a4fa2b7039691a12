//! UI-facing operations, one file per feature area.
//!
//! Each operation is a method on `PlantMateClient`: reads go through the
//! query cache, writes through the mutation coordinator, and every
//! authenticated call routes its result through the forced-logout check.

pub mod account;
pub mod care;
pub mod identify;
pub mod plants;

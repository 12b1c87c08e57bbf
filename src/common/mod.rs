//! Small shared helpers used across components: humane duration (de)serialization.

pub mod duration_serde;

//! Traits pools and migration steppers are written against.

pub mod factory;
pub mod stepper;

pub use factory::HandleFactory;
pub use stepper::Stepper;

pub mod charges;
pub mod portfolio;
pub mod simulator;

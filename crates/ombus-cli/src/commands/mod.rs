pub mod consume;
pub mod produce;
pub mod relay;
pub mod serve;

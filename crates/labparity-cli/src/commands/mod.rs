pub mod compare;
pub mod fill;
pub mod serve;

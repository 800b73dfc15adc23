pub mod probe;
pub mod spawn;
pub mod threads;

pub mod functions;
pub mod worker;

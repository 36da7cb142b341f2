pub mod bus;
pub mod payload;
pub mod session;

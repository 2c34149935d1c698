// Services module - Business logic

pub mod password;
pub mod qr_generator;
pub mod seat_admission;
pub mod signature;

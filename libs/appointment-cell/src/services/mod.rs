pub mod availability;
pub mod booking;
pub mod clients;
pub mod lifecycle;
pub mod notifications;
pub mod reservation;

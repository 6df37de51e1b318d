pub mod api;
pub mod events;
pub mod models;
pub mod thread;
pub mod view;
pub mod vote;

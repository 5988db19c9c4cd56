pub mod app;
pub mod outer_app;

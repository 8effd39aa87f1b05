pub mod paper;
pub mod view;

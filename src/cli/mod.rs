pub mod history;
pub mod maintenance;
pub mod portfolio;
pub mod quotes;
pub mod setup;
pub mod status;
pub mod ui;

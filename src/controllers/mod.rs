pub mod admin_controller;
pub mod forecast_controller;
pub mod job_controller;
pub mod topic_controller;

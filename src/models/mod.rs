pub mod forecast;
pub mod job;
pub mod requests;
pub mod topic;
pub mod weather;

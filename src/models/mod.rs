pub mod catalog;
pub mod request;
pub mod role;
pub mod site;
pub mod user;
pub mod workflow;

pub mod agent;
pub mod doctor;
pub mod functions;
pub mod history;

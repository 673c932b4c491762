pub mod csv;
pub mod jobs;
pub mod progress;

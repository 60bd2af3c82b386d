pub mod backend;
pub mod health;
pub mod jobs;
pub mod lifecycle;
pub mod oauth;
pub mod supervisor;
pub mod vault;

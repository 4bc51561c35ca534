pub mod scheduler_auth;

pub mod data;
pub mod dbcheck;

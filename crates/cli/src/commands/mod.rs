pub mod config_cmd;
pub mod pricing;
pub mod run;
pub mod tools;

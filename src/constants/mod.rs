pub mod defaults;
pub mod endpoints;
pub mod envvars;
pub mod files;

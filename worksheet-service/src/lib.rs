pub mod config;
pub mod convert;
pub mod db;
pub mod error;
pub mod generate;
pub mod routes;
pub mod s3;
pub mod status;

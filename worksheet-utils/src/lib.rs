//! Worksheet Utility Functions
//!
//! ## Current API
//!
//! - Clean question text coming from the database
//! - Build worksheets and question banks
//! - Limit questions per type
//! - Render DOCX documents
//!
pub mod build;
pub mod docx;
pub mod error;
pub mod limit;
pub mod question;
pub mod text;

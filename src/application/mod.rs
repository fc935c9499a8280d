//! Application services: resolution, dispatch and event handling.

pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod resolver;

//! purgeman: turns iRODS change notifications into Varnish PURGE fan-out.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod service;

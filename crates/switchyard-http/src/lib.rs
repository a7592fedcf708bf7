//! HTTP request and response types for the switchyard router.
//!
//! This crate holds the passive data carriers the router dispatches on:
//! [`Method`], [`Headers`], [`Request`], [`Response`] and [`StatusCode`].
//! It contains no routing logic.

#![warn(unsafe_code)]

mod request;
mod response;

pub use request::{Headers, Method, Request};
pub use response::{mime_type_for_extension, Response, StatusCode};

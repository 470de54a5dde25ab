//! Gemini model gateway
//!
//! Implements [`crate::agent::ModelGateway`] on top of Gemini's
//! `generateContent` REST endpoint with function calling.

pub mod client;
pub mod tool_use;

pub use client::{GeminiClient, DEFAULT_MODEL, GEMINI_BASE_URL};

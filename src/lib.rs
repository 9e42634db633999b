//! voice_flow: narration pipeline for the Radio Automation Engine.
//!
//! Generates DJ scripts (song intros/outros, time and weather announcements),
//! gates them through an automated audit with feedback-driven regeneration,
//! and synthesizes the passed scripts to audio. Stages are checkpointed so
//! an interrupted run resumes where it stopped.
//!
//! The CLI consumes this crate.

pub mod audit;
pub mod auditing;
pub mod catalog;
pub mod checkpoint;
pub mod config;
pub mod content;
pub mod error;
pub mod generation;
pub mod http_services;
pub mod item_index;
pub mod pipeline;
pub mod prompts;
pub mod ranker;
pub mod regeneration;
pub mod sanitize;
pub mod services;
pub mod store;
pub mod synthesis;
pub mod voice_ref;

//! AQI Tracker - a personal air quality dashboard and "what-if" simulator.
//!
//! # Overview
//!
//! A single user profile (city, sensitivity, commute mode, health conditions)
//! personalizes every request. A generative language model with web search
//! grounding supplies the current AQI, a short forecast, health advice and a
//! climate insight, and answers free-form simulation questions.
//!
//! # Modules
//!
//! - [`model`]: Profile, dashboard and chat types
//! - [`storage`]: SQLite-backed profile store
//! - [`prompt`]: Request construction from the profile and transcript
//! - [`generative`]: Generative backend port and the Gemini adapter
//! - [`decoder`]: Fence stripping and validation of model output
//! - [`controller`]: Session state machine and fetch orchestration
//! - [`api`]: HTTP API handlers
//! - [`config`]: Environment configuration

pub mod api;
pub mod config;
pub mod controller;
pub mod decoder;
pub mod generative;
pub mod model;
pub mod prompt;
pub mod storage;

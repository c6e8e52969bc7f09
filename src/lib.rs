//! Autocap - Batch Subtitle Generation and Translation
//!
//! A job-queue driven pipeline for producing subtitles from media
//! files and translating existing subtitle files, using a whisper CLI,
//! ffmpeg, and LLM translation backends.

pub mod cli;
pub mod config;
pub mod convert;
pub mod error;
pub mod glossary;
pub mod job;
pub mod joblog;
pub mod lang;
pub mod media;
pub mod pipeline;
pub mod progress;
pub mod queue;
pub mod subtitle;
pub mod transcribe;
pub mod translate;

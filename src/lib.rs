//! Chatter Engine — chat-history harvesting and Markov sentence generation.
//!
//! Collects message history from a group-chat server, filters and tokenizes
//! it into a flat newline-delimited corpus, builds a Markov chain from that
//! corpus, and keeps the chain fresh with a daily incremental harvest while
//! serving "say something" requests from the currently published model.

pub mod config;
pub mod core;
pub mod schema;

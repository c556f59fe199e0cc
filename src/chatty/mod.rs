//! Streaming chat gateway: request admission, a distributed inbox/semaphore, an SSE envelope,
//! and a tool-calling agent loop sitting in front of the provider-agnostic LLM client in
//! [`crate::cloudllm`].

pub mod agent_loop;
pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod gated_client;
pub mod guard;
pub mod history;
pub mod id;
pub mod inbox;
pub mod kv;
pub mod metrics;
pub mod real_ip;
pub mod semaphore;
pub mod sse;
pub mod stream_mapper;
pub mod tools;

//! Linaje - task lineage and trace-context correlation engine
//!
//! This library reconstructs the parent/child creation lineage of a
//! cooperatively-scheduled threading runtime and propagates distributed
//! trace context across it, on behalf of a zero-code tracing agent whose
//! probes fire at scheduler transitions and library call sites. Everything
//! is fixed-capacity, lock-free and non-blocking: the probe path may not
//! allocate, sleep, or surface an error to the instrumented application.

pub mod atomic_map;
pub mod cli;
pub mod config;
pub mod context;
pub mod context_map;
pub mod emitter;
pub mod engine;
pub mod extract;
pub mod lineage;
pub mod propagation;
pub mod replay;
pub mod scheduler;
pub mod span_table;
pub mod thread_map;

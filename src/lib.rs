//! Sandboxed Go program execution with virtual-time output playback.
//!
//! `goplay` takes untrusted Go source, compiles it (optionally running
//! `go vet` alongside), runs the binary in an isolated substrate under a
//! wall-clock budget and an output cap, and turns the program's framed output
//! into a timed event stream a client can replay.
//!
//! # Architecture
//!
//! The engine holds the toolchain and the substrate; submitted programs never
//! see either. A program runs with an empty environment, no network, and a
//! synthetic filesystem holding only its executable, `/dev/null` and the
//! time-zone database. Output written through the faketime runtime carries
//! playback headers that are merged and coalesced into [`events::Event`]s.
//!
//! # Modules
//!
//! - [`api`]: Request orchestration and response classification
//! - [`build`]: Bundle preparation, test-main synthesis and `go build`
//! - [`bundle`]: Multi-file source archives and their validation
//! - [`clock`]: The virtual clock programs run against
//! - [`config`]: Configuration system with layered precedence (CLI > env > file > defaults)
//! - [`error`]: Semantic error types for the application
//! - [`events`]: Playback header decoding, stream merging and coalescing
//! - [`sandbox`]: Execution harness and the process and container substrates
//! - [`telemetry`]: Structured logging set-up
//! - [`vet`]: `go vet` driver

pub mod api;
pub mod build;
pub mod bundle;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod sandbox;
pub mod telemetry;
pub mod vet;

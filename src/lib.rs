//! # wirehttp
//!
//! HTTP protocol plumbing written from scratch on Tokio:
//!
//! - [`http`]: incremental HTTP/1.1 request parser, request and response types.
//! - [`cookie`]: strict `Set-Cookie` decoder and canonical encoder.
//! - [`client`]: exponential backoff, a retry loop, and a stream correlator
//!   for multiplexed connections.
//! - [`server`]: a keep-alive TCP server built on the parser.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wirehttp::server::Server;
//! use wirehttp::http::{Request, Response, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     println!("Listening on http://127.0.0.1:8080");
//!     server.run(|req: Request| async move {
//!         Response::new(StatusCode::Ok).body(format!("Hello from {}", req.path()))
//!     }).await?;
//!     Ok(())
//! }
//! ```
//!
//! Feeding the parser by hand:
//!
//! ```
//! use wirehttp::http::{Method, RequestParser};
//!
//! let mut parser = RequestParser::new();
//! assert!(!parser.feed(b"GET /a HT"));
//! assert!(parser.feed(b"TP/1.1\r\nHost: x\r\n\r\n"));
//!
//! let request = parser.request().unwrap();
//! assert_eq!(request.method(), Method::Get);
//! assert_eq!(request.headers().get("host"), Some("x"));
//! ```

pub mod client;
pub mod cookie;
pub mod http;
pub mod server;

pub use client::{ExponentialBackoff, StreamCorrelator};
pub use cookie::{Cookie, SameSite};
pub use http::{Headers, Method, Request, RequestParser, Response, StatusCode};
pub use server::{Server, ServerConfig, ServerError};

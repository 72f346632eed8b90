//! # Trellis Test
//!
//! In-memory testing for Trellis runtimes: requests go through routing, the
//! full behavior chain and the outermost catch without a network.
//!
//! ## Example
//!
//! ```ignore
//! use trellis::prelude::*;
//! use trellis_test::TestHost;
//!
//! #[tokio::test]
//! async fn test_get_user() {
//!     let host = TestHost::new(build_runtime());
//!
//!     let response = host.get("/users/123").bearer_token("t0ken").send().await;
//!
//!     response.assert_status(http::StatusCode::OK);
//!     let user: serde_json::Value = response.json().unwrap();
//!     assert_eq!(user["id"], 123);
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/trellis-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod host;
mod request;
mod response;

pub use error::TestError;
pub use host::{TestHost, TestHostRequest};
pub use request::TestRequestBuilder;
pub use response::TestResponse;

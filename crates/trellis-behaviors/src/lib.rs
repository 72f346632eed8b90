//! # Trellis Behaviors
//!
//! The behavior chain and the built-in behaviors of the Trellis pipeline.
//!
//! - [`BehaviorChainInvoker`] - Runs a request through an action's chain in a fresh scope
//! - [`DefaultBehaviorChain`] - Pops and runs behaviors in configured order
//! - [`ErrorHandlingBehavior`] - 400 for bad requests, 500 for everything else
//! - [`AuthenticationBehavior`] - 401 with `WWW-Authenticate` challenges
//! - [`DefaultBehavior`] - Binds arguments, invokes the handler, writes the result
//! - [`BasicAuthenticator`] / [`BearerTokenAuthenticator`] - Built-in authenticators
//!
//! ## Chain Order
//!
//! ```text
//! ErrorHandlingBehavior
//!   └─► AuthenticationBehavior   (skipped for anonymous actions)
//!         └─► ...user behaviors
//!               └─► DefaultBehavior
//! ```

#![doc(html_root_url = "https://docs.rs/trellis-behaviors/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod authenticators;
pub mod chain;
pub mod debug;
pub mod invoker;
pub mod stages;

pub use authenticators::{
    AuthenticatorOptions, BasicAuthenticator, BasicCredentialValidator, BasicCredentials,
    BearerTokenAuthenticator, BearerTokenValidator,
};
pub use chain::DefaultBehaviorChain;
pub use invoker::BehaviorChainInvoker;
pub use stages::{AuthenticationBehavior, DefaultBehavior, ErrorHandlingBehavior};

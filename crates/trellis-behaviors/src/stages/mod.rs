//! Built-in behaviors.
//!
//! | Behavior | Role |
//! |----------|------|
//! | [`ErrorHandlingBehavior`] | maps errors of the rest of the chain to 400/500 responses |
//! | [`AuthenticationBehavior`] | challenges requests the action's authenticators reject |
//! | [`DefaultBehavior`] | binds arguments, runs the handler, writes the result |

mod authentication;
mod default;
mod error_handling;

pub use authentication::AuthenticationBehavior;
pub use default::DefaultBehavior;
pub use error_handling::ErrorHandlingBehavior;

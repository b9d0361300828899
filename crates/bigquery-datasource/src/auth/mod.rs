//! Google API authentication
//!
//! Two token sources cover the supported authentication types:
//!
//! - [`ServiceAccountTokenSource`] for `jwt`: signs an assertion with the
//!   configured service-account key and exchanges it at the token URI.
//! - [`MetadataTokenSource`] for `gce`: asks the metadata server of the
//!   compute environment for a token of its default service account.
//!
//! Both cache the last token until shortly before it expires.

mod jwt;
mod metadata;
mod token;

pub use jwt::ServiceAccountTokenSource;
pub use metadata::{MetadataProjectResolver, MetadataTokenSource, PROJECT_ENV, ProjectResolver};
pub use token::{AccessToken, StaticTokenSource, TokenSource};

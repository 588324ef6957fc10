//! Earth Engine side of the bridge: expressions, object handles and the REST session.

pub mod expression;
pub mod object;
pub mod session;

use geojson::FeatureCollection;

use crate::error::Result;

pub use expression::Expression;
pub use object::{EeKind, EeObject};
pub use session::{authenticate, Credentials, Session};

/// The calls this crate makes against the remote API.
///
/// [`Session`] talks to the real service; tests substitute their own.
#[allow(async_fn_in_trait)]
pub trait EarthEngine {
    /// Registers a map for an already visualized expression and returns its
    /// tile URL template (with `{x}`, `{y}` and `{z}` placeholders).
    async fn create_map(&self, expression: &Expression) -> Result<String>;

    /// Evaluates a vector expression and returns its features.
    async fn compute_features(&self, expression: &Expression) -> Result<FeatureCollection>;
}

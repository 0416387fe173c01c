//! Variable Store.
//!
//! [`VariableStore`] owns everything rules can look at for one transaction
//! and resolves selectors against it.

mod collection;
mod request;
mod resolver;
mod response;
mod store;
mod value;

pub use collection::Collection;
pub use request::{parse_cookies, RequestData};
pub use response::ResponseData;
pub(crate) use store::parse_selector;
pub use store::{Resolved, VariableStore};
pub use value::Value;

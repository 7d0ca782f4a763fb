//! HTTP transport.
//!
//! One [`RequestExecutor`] call is exactly one attempt; looping and token
//! refresh live in [`retry`](crate::retry) and [`refresh`](crate::refresh).

mod classify;
mod descriptor;
mod endpoints;
mod executor;
mod response;

pub use classify::{classify_status, classify_transport};
pub use descriptor::{RequestBody, RequestDescriptor, UploadFile, UploadForm};
pub(crate) use endpoints::*;
pub use executor::RequestExecutor;
pub use response::ResponseBody;

//! Domain model module declarations.

pub mod directive;
pub mod request;
pub mod response;

pub use directive::{Action, ParsedDirective};
pub use request::{Request, RequestId, SamplingParams, Subject, SubjectId};
pub use response::Response;

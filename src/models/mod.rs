mod link;
mod validate;

pub use link::{
    CreateLinkRequest, CreateLinkResponse, Link, NewLink, OwnerStats, OwnerSummary, StoreTotals,
    VisitEvent,
};
pub use validate::{validate_custom_code, validate_url, ExpiresIn, InvalidInput};

use crate::protocol::{ResourceRequest, ResourceResponse};

/// Outcome of a content-filter check.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterDecision {
    /// Load normally (or continue to host interception).
    Allow,
    /// Answer with an empty response.
    Block,
    /// Answer with this response instead.
    Replace(ResourceResponse),
}

/// Decides whether a subresource load proceeds.
///
/// Called on a resource-loading thread with the URL of the main document,
/// read from the surface on the UI thread beforehand. Matching rules are up
/// to the implementation.
pub trait ContentFilter: Send + Sync {
    fn check(&self, request: &ResourceRequest, main_document_url: Option<&str>) -> FilterDecision;
}

impl<F> ContentFilter for F
where
    F: Fn(&ResourceRequest, Option<&str>) -> FilterDecision + Send + Sync,
{
    fn check(&self, request: &ResourceRequest, main_document_url: Option<&str>) -> FilterDecision {
        self(request, main_document_url)
    }
}

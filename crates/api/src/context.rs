use gatekeep_auth::Principal;

/// Principal context for a request.
///
/// Always present on routed requests; `None` means the request carried no
/// usable bearer token and proceeds anonymously.
#[derive(Debug, Clone, Default)]
pub struct RequestPrincipal(Option<Principal>);

impl RequestPrincipal {
    pub fn new(principal: Option<Principal>) -> Self {
        Self(principal)
    }

    pub fn anonymous() -> Self {
        Self(None)
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.0.as_ref()
    }
}

use crate::shared::error::{ControlPlaneError, ControlPlaneResult};
use ctrlplane_core::Claims;

/// Per-call context handed to every service operation
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    claims: Option<Claims>,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_claims(claims: Claims) -> Self {
        Self {
            claims: Some(claims),
        }
    }

    /// Shorthand for a caller acting as `subject_id` within `tenant_id`
    pub fn for_tenant(tenant_id: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self::with_claims(Claims::new(tenant_id, subject_id))
    }

    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_ref()
    }
}

/// Resolve the caller's claims, failing with `Unauthorized` when absent or
/// when they carry no tenant.
pub fn require_claims(ctx: &RequestContext) -> ControlPlaneResult<&Claims> {
    let claims = ctx
        .claims()
        .ok_or_else(|| ControlPlaneError::Unauthorized("request carries no claims".to_string()))?;

    if claims.tenant_id.is_empty() {
        return Err(ControlPlaneError::Unauthorized(
            "claims carry no tenant".to_string(),
        ));
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_claims_anonymous() {
        let ctx = RequestContext::anonymous();
        let err = require_claims(&ctx).unwrap_err();
        assert!(matches!(err, ControlPlaneError::Unauthorized(_)));
    }

    #[test]
    fn test_require_claims_empty_tenant() {
        let ctx = RequestContext::with_claims(Claims::new("", "user-1"));
        assert!(matches!(
            require_claims(&ctx),
            Err(ControlPlaneError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_require_claims_for_tenant() {
        let ctx = RequestContext::for_tenant("acme", "user-1");
        let claims = require_claims(&ctx).unwrap();
        assert_eq!(claims.tenant_id, "acme");
        assert_eq!(claims.subject_id, "user-1");
    }
}

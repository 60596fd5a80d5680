pub const API_PREFIX: &str = "/api";
pub const ADMIN_API_PREFIX: &str = "/api/admin";
pub const ADMIN_UI_PREFIX: &str = "/admin";

/// Protection class of a path, decided by prefix alone.
///
/// Matching is a plain string prefix, so `/administrator` is admin and
/// `/apiary` is API. Over-matching only adds protection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Public,
    RateLimitedApi,
    AdminProtected,
}

/// Who is on the other end: a script reading JSON or a browser page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Api,
    Ui,
}

impl RouteClass {
    pub fn classify(path: &str) -> Self {
        if path.starts_with(ADMIN_API_PREFIX) || path.starts_with(ADMIN_UI_PREFIX) {
            RouteClass::AdminProtected
        } else if path.starts_with(API_PREFIX) {
            RouteClass::RateLimitedApi
        } else {
            RouteClass::Public
        }
    }

    pub fn requires_authentication(&self) -> bool {
        matches!(self, RouteClass::AdminProtected)
    }

    /// Admin paths are API paths too, so both carry admission control.
    pub fn is_rate_limited(&self) -> bool {
        !matches!(self, RouteClass::Public)
    }
}

impl Surface {
    pub fn of(path: &str) -> Self {
        if path.starts_with(API_PREFIX) {
            Surface::Api
        } else {
            Surface::Ui
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_prefix() {
        assert_eq!(RouteClass::classify("/"), RouteClass::Public);
        assert_eq!(RouteClass::classify("/health"), RouteClass::Public);
        assert_eq!(RouteClass::classify("/api/products"), RouteClass::RateLimitedApi);
        assert_eq!(RouteClass::classify("/api/auth"), RouteClass::RateLimitedApi);
        assert_eq!(RouteClass::classify("/api/admin/products"), RouteClass::AdminProtected);
        assert_eq!(RouteClass::classify("/admin"), RouteClass::AdminProtected);
        assert_eq!(RouteClass::classify("/admin/orders/3"), RouteClass::AdminProtected);
    }

    #[test]
    fn every_protected_class_is_rate_limited() {
        for class in [RouteClass::Public, RouteClass::RateLimitedApi, RouteClass::AdminProtected] {
            if class.requires_authentication() {
                assert!(class.is_rate_limited());
            }
        }
        assert!(!RouteClass::Public.is_rate_limited());
    }

    #[test]
    fn surface_follows_api_prefix() {
        assert_eq!(Surface::of("/api/admin/orders"), Surface::Api);
        assert_eq!(Surface::of("/admin/orders"), Surface::Ui);
    }
}

//! Route table
//!
//! Routes are matched in registration order; the first match wins. Anything
//! unmatched is a 404 for the terminal error handler.

use hyper::Method;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Greeting,
    Health,
    Process,
    SpaFallback,
}

#[derive(Debug, Clone, Copy)]
enum MethodFilter {
    /// GET, and HEAD answered like GET
    Get,
    /// Method checks are left to the handler
    Any,
}

#[derive(Debug, Clone, Copy)]
enum PathPattern {
    Exact(&'static str),
    CatchAll,
}

struct Route {
    method: MethodFilter,
    path: PathPattern,
    endpoint: Endpoint,
}

const ROUTES: &[Route] = &[
    Route {
        method: MethodFilter::Get,
        path: PathPattern::Exact("/api/hello"),
        endpoint: Endpoint::Greeting,
    },
    Route {
        method: MethodFilter::Get,
        path: PathPattern::Exact("/health"),
        endpoint: Endpoint::Health,
    },
    Route {
        method: MethodFilter::Any,
        path: PathPattern::Exact("/api/process"),
        endpoint: Endpoint::Process,
    },
    Route {
        method: MethodFilter::Get,
        path: PathPattern::CatchAll,
        endpoint: Endpoint::SpaFallback,
    },
];

impl MethodFilter {
    fn matches(self, method: &Method) -> bool {
        match self {
            Self::Get => method == Method::GET || method == Method::HEAD,
            Self::Any => true,
        }
    }
}

impl PathPattern {
    fn matches(self, path: &str) -> bool {
        match self {
            // Tolerate one trailing slash
            Self::Exact(p) => path == p || path.strip_suffix('/') == Some(p),
            Self::CatchAll => true,
        }
    }
}

pub fn match_route(method: &Method, path: &str) -> Option<Endpoint> {
    ROUTES
        .iter()
        .find(|r| r.method.matches(method) && r.path.matches(path))
        .map(|r| r.endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_routes() {
        assert_eq!(match_route(&Method::GET, "/api/hello"), Some(Endpoint::Greeting));
        assert_eq!(match_route(&Method::HEAD, "/health"), Some(Endpoint::Health));
        assert_eq!(match_route(&Method::POST, "/api/process"), Some(Endpoint::Process));
        assert_eq!(match_route(&Method::GET, "/api/process/"), Some(Endpoint::Process));
    }

    #[test]
    fn test_fallback_only_for_get() {
        assert_eq!(match_route(&Method::GET, "/unknown/path"), Some(Endpoint::SpaFallback));
        assert_eq!(match_route(&Method::POST, "/api/hello"), None);
        assert_eq!(match_route(&Method::DELETE, "/unknown"), None);
    }
}

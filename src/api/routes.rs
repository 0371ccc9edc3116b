use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteDomain {
    System,
    Catalog,
    Sessions,
    History,
    Queue,
    Commit,
    Canvas,
    Insights,
}

impl RouteDomain {
    pub fn from_path(path: &str) -> Self {
        if path == "/health" {
            return Self::System;
        }
        if path == "/api/commands" {
            return Self::Catalog;
        }
        if path.ends_with("/undo") || path.ends_with("/redo") || path.contains("/history") || path.ends_with("/settings") {
            return Self::History;
        }
        if path.contains("/queue") || path.contains("/recipes") {
            return Self::Queue;
        }
        if path.ends_with("/commit") || path.ends_with("/replay") || path.ends_with("/cancel") || path.ends_with("/result") {
            return Self::Commit;
        }
        if path.ends_with("/mode") || path.ends_with("/mask") {
            return Self::Canvas;
        }
        if path.ends_with("/analyze") || path.contains("/insights") {
            return Self::Insights;
        }
        Self::Sessions
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteDefinition {
    pub method: HttpMethod,
    pub path: &'static str,
    pub domain: RouteDomain,
}

pub const ROUTES: &[(HttpMethod, &str)] = &[
    (HttpMethod::Get, "/health"),
    (HttpMethod::Get, "/api/commands"),
    (HttpMethod::Post, "/api/sessions"),
    (HttpMethod::Get, "/api/sessions/{id}"),
    (HttpMethod::Delete, "/api/sessions/{id}"),
    (HttpMethod::Post, "/api/sessions/{id}/settings"),
    (HttpMethod::Post, "/api/sessions/{id}/queue/toggle"),
    (HttpMethod::Post, "/api/sessions/{id}/queue/clear"),
    (HttpMethod::Post, "/api/sessions/{id}/recipes/{recipeId}"),
    (HttpMethod::Post, "/api/sessions/{id}/commit"),
    (HttpMethod::Post, "/api/sessions/{id}/replay"),
    (HttpMethod::Post, "/api/sessions/{id}/cancel"),
    (HttpMethod::Post, "/api/sessions/{id}/undo"),
    (HttpMethod::Post, "/api/sessions/{id}/redo"),
    (HttpMethod::Post, "/api/sessions/{id}/history/jump"),
    (HttpMethod::Post, "/api/sessions/{id}/mode"),
    (HttpMethod::Delete, "/api/sessions/{id}/mode"),
    (HttpMethod::Put, "/api/sessions/{id}/mask"),
    (HttpMethod::Delete, "/api/sessions/{id}/mask"),
    (HttpMethod::Post, "/api/sessions/{id}/analyze"),
    (HttpMethod::Post, "/api/sessions/{id}/insights/apply"),
    (HttpMethod::Get, "/api/sessions/{id}/result"),
    (HttpMethod::Get, "/api/sessions/{id}/events"),
];

pub fn route_catalog() -> Vec<RouteDefinition> {
    ROUTES
        .iter()
        .map(|(method, path)| RouteDefinition {
            method: *method,
            path,
            domain: RouteDomain::from_path(path),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn routes_are_unique() {
        let unique = ROUTES.iter().collect::<BTreeSet<_>>();
        assert_eq!(unique.len(), ROUTES.len());
    }

    #[test]
    fn domains_group_session_routes() {
        assert_eq!(RouteDomain::from_path("/api/sessions/{id}/undo"), RouteDomain::History);
        assert_eq!(RouteDomain::from_path("/api/sessions/{id}/recipes/{recipeId}"), RouteDomain::Queue);
        assert_eq!(RouteDomain::from_path("/api/sessions/{id}/mask"), RouteDomain::Canvas);
        assert_eq!(RouteDomain::from_path("/api/sessions/{id}"), RouteDomain::Sessions);
    }
}

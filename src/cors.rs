use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::{Header, Status};
use rocket::{Request, Response};

/// Adds credentialed CORS headers for the configured front-end origins.
pub struct CorsFairing {
    allowed_origins: Vec<String>,
}

impl CorsFairing {
    /// `origins` is a comma separated list, as found in `CORS_ORIGINS`.
    pub fn new(origins: &str) -> Self {
        Self {
            allowed_origins: origins
                .split(',')
                .map(|origin| origin.trim().trim_end_matches('/').to_string())
                .filter(|origin| !origin.is_empty())
                .collect(),
        }
    }

    pub fn allows(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|allowed| allowed == origin)
    }
}

#[rocket::async_trait]
impl Fairing for CorsFairing {
    fn info(&self) -> Info {
        Info {
            name: "CORS",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let Some(origin) = request.headers().get_one("Origin") else {
            return;
        };

        if !self.allows(origin) {
            tracing::debug!(origin = %origin, "Origin not allowed");
            return;
        }

        response.set_header(Header::new(
            "Access-Control-Allow-Origin",
            origin.to_string(),
        ));
        response.set_header(Header::new("Access-Control-Allow-Credentials", "true"));
        response.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "GET, POST, PUT, DELETE, OPTIONS",
        ));
        response.set_header(Header::new("Access-Control-Allow-Headers", "Content-Type"));
        response.set_header(Header::new("Vary", "Origin"));
    }
}

#[options("/<_..>")]
pub fn preflight() -> Status {
    Status::NoContent
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_list_parsing() {
        let cors = CorsFairing::new("http://localhost:3000, https://app.example.com/");

        assert!(cors.allows("http://localhost:3000"));
        assert!(cors.allows("https://app.example.com"));
        assert!(!cors.allows("http://evil.example.com"));
        assert!(!CorsFairing::new("").allows(""));
    }
}

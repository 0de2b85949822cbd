use rocket::fairing::{Fairing, Info, Kind};
use rocket::{Data, Request, Response};
use std::time::Instant;

/// Health probes are logged at debug so they do not drown the import log.
const QUIET_PATHS: &[&str] = &["/-/health"];

/// Fairing to log one line per HTTP request with timing
pub struct RequestLogger;

#[rocket::async_trait]
impl Fairing for RequestLogger {
    fn info(&self) -> Info {
        Info {
            name: "Request Logger",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        request.local_cache(Instant::now);
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let duration = request.local_cache(Instant::now).elapsed();
        let status = response.status();

        let level = if status.code >= 500 {
            log::Level::Warn
        } else if QUIET_PATHS.contains(&request.uri().path().as_str()) {
            log::Level::Debug
        } else {
            log::Level::Info
        };

        log::log!(
            level,
            "{} {} -> {} ({:.2}ms)",
            request.method(),
            request.uri(),
            status.code,
            duration.as_secs_f64() * 1000.0
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::health::health_check;
    use crate::test_support::TestRocketBuilder;
    use rocket::http::Status;

    #[test]
    fn fairing_passes_responses_through() {
        let rocket = TestRocketBuilder::new()
            .mount_routes(routes![health_check])
            .build()
            .attach(RequestLogger);
        let client = rocket::local::blocking::Client::tracked(rocket).expect("valid rocket");

        let response = client.get("/-/health").dispatch();
        assert_eq!(response.status(), Status::Ok);
    }
}
